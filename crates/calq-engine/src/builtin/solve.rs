//! Equation solving.
//!
//! Polynomial equations up to degree two are solved in closed form, higher
//! degrees with Durand-Kerner iteration. Anything else falls back to a sign
//! change scan over `[-10, 10]` refined by bisection.

use std::cmp::Ordering;
use std::ops::{Add, Div, Mul, Sub};

use calq_core::{format_number, CalcError, CalcResult, Value};

use super::ast::Expr;
use super::eval::{constant, eval};
use super::simplify::{build_product, rational, simplify};

/// Highest integer exponent expanded when reading a polynomial.
const MAX_DEGREE: usize = 32;
/// Two roots closer than this are the same root.
const ROOT_EPS: f64 = 1e-9;

const SCAN_RANGE: (f64, f64) = (-10.0, 10.0);
const SCAN_STEPS: usize = 2000;
/// Enough halvings to reach adjacent floats from any scan bracket.
const MAX_BISECTIONS: usize = 200;
const NEWTON_STEPS: usize = 4;

#[derive(Debug, Clone, Copy, PartialEq)]
pub enum Root {
    Real(f64),
    Complex(f64, f64),
}

impl Root {
    fn key(&self) -> (u8, f64, f64) {
        match *self {
            Self::Real(x) => (0, x, 0.0),
            Self::Complex(re, im) => (1, re, im),
        }
    }

    fn near(&self, other: &Self) -> bool {
        let (ka, ra, ia) = self.key();
        let (kb, rb, ib) = other.key();
        ka == kb && (ra - rb).abs() < ROOT_EPS && (ia - ib).abs() < ROOT_EPS
    }
}

/// Real roots ascending, then complex roots by real and imaginary part.
fn order(a: &Root, b: &Root) -> Ordering {
    let (ka, ra, ia) = a.key();
    let (kb, rb, ib) = b.key();
    ka.cmp(&kb)
        .then(ra.total_cmp(&rb))
        .then(ia.total_cmp(&ib))
}

fn format_real(x: f64) -> String {
    let snapped = x.round();
    if (x - snapped).abs() < ROOT_EPS {
        return format_number(snapped + 0.0);
    }
    match rational(x) {
        Some(_) => build_product(x, Vec::new()).to_string(),
        None => format_number(x),
    }
}

impl std::fmt::Display for Root {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match *self {
            Self::Real(x) => f.write_str(&format_real(x)),
            Self::Complex(re, im) => {
                let imag = match im.abs() {
                    m if (m - 1.0).abs() < ROOT_EPS => "i".to_string(),
                    m => format!("{} * i", format_real(m)),
                };
                if re.abs() < ROOT_EPS {
                    let sign = if im < 0.0 { "-" } else { "" };
                    write!(f, "{sign}{imag}")
                } else {
                    let sign = if im < 0.0 { "-" } else { "+" };
                    write!(f, "{} {sign} {imag}", format_real(re))
                }
            }
        }
    }
}

/// Solve `lhs = rhs` for `var`. Roots come back ordered and deduplicated.
pub fn solve(lhs: &Expr, rhs: &Expr, var: &str) -> CalcResult<Vec<Root>> {
    let f = simplify(&Expr::sub(lhs.clone(), rhs.clone()));

    let mut names = Vec::new();
    f.variables(&mut names);
    let unknown: Vec<String> = names
        .into_iter()
        .filter(|n| n != var && constant(n).is_none())
        .collect();
    if !unknown.is_empty() {
        return Err(CalcError::Symbolic(format!(
            "equation has unknowns other than {var}: {}",
            unknown.join(", ")
        )));
    }

    let mut roots = match to_poly(&f, var) {
        Some(coeffs) => polynomial_roots(&coeffs, var)?,
        None => scan_roots(&f, var)?,
    };
    roots.sort_by(order);
    roots.dedup_by(|a, b| a.near(b));
    Ok(roots)
}

// ----------------------------------------------------------------------------
// Polynomials
// ----------------------------------------------------------------------------

/// Coefficients of `e` as a polynomial in `var`, lowest degree first.
fn to_poly(e: &Expr, var: &str) -> Option<Vec<f64>> {
    if !e.contains_var(var) {
        let c = eval(e, &[]).ok()?.as_number()?;
        return c.is_finite().then(|| vec![c]);
    }
    match e {
        Expr::Var(_) => Some(vec![0.0, 1.0]),
        Expr::Neg(a) => Some(to_poly(a, var)?.into_iter().map(|c| -c).collect()),
        Expr::Add(a, b) => Some(poly_add(&to_poly(a, var)?, &to_poly(b, var)?, 1.0)),
        Expr::Sub(a, b) => Some(poly_add(&to_poly(a, var)?, &to_poly(b, var)?, -1.0)),
        Expr::Mul(a, b) => Some(poly_mul(&to_poly(a, var)?, &to_poly(b, var)?)),
        Expr::Div(a, b) if !b.contains_var(var) => {
            let d = eval(b, &[]).ok()?.as_number()?;
            if d == 0.0 || !d.is_finite() {
                return None;
            }
            Some(to_poly(a, var)?.into_iter().map(|c| c / d).collect())
        }
        Expr::Pow(a, b) => {
            let n = b.as_num()?;
            if n < 0.0 || n.fract() != 0.0 || n as usize > MAX_DEGREE {
                return None;
            }
            let base = to_poly(a, var)?;
            Some((0..n as usize).fold(vec![1.0], |acc, _| poly_mul(&acc, &base)))
        }
        _ => None,
    }
}

fn poly_add(a: &[f64], b: &[f64], sign: f64) -> Vec<f64> {
    let mut out = vec![0.0; a.len().max(b.len())];
    for (i, c) in a.iter().enumerate() {
        out[i] += c;
    }
    for (i, c) in b.iter().enumerate() {
        out[i] += sign * c;
    }
    out
}

fn poly_mul(a: &[f64], b: &[f64]) -> Vec<f64> {
    let mut out = vec![0.0; a.len() + b.len() - 1];
    for (i, x) in a.iter().enumerate() {
        for (j, y) in b.iter().enumerate() {
            out[i + j] += x * y;
        }
    }
    out
}

fn polynomial_roots(coeffs: &[f64], var: &str) -> CalcResult<Vec<Root>> {
    let scale = coeffs.iter().fold(0.0_f64, |m, c| m.max(c.abs()));
    let mut coeffs = coeffs.to_vec();
    while coeffs.len() > 1 && coeffs.last().is_some_and(|c| c.abs() <= 1e-12 * scale) {
        coeffs.pop();
    }

    match coeffs.as_slice() {
        [c] if c.abs() <= 1e-12 => Err(CalcError::Symbolic(format!(
            "equation holds for every value of {var}"
        ))),
        [_] => Ok(Vec::new()),
        [b, a] => Ok(vec![Root::Real(-b / a)]),
        [c, b, a] => Ok(quadratic(*a, *b, *c)),
        _ => durand_kerner(&coeffs),
    }
}

fn quadratic(a: f64, b: f64, c: f64) -> Vec<Root> {
    let disc = b * b - 4.0 * a * c;
    if disc.abs() < 1e-12 * (b * b).max(1.0) {
        return vec![Root::Real(-b / (2.0 * a))];
    }
    if disc < 0.0 {
        let re = -b / (2.0 * a);
        let im = (-disc).sqrt() / (2.0 * a).abs();
        return vec![Root::Complex(re, -im), Root::Complex(re, im)];
    }
    // stable form avoids cancellation when b^2 >> 4ac
    let q = -0.5 * (b + b.signum() * disc.sqrt());
    let (r1, r2) = if q == 0.0 {
        let r = (-c / a).sqrt();
        (-r, r)
    } else {
        (q / a, c / q)
    };
    vec![Root::Real(r1), Root::Real(r2)]
}

#[derive(Debug, Clone, Copy, PartialEq)]
struct Complex {
    re: f64,
    im: f64,
}

impl Complex {
    const fn new(re: f64, im: f64) -> Self {
        Self { re, im }
    }

    fn norm(self) -> f64 {
        self.re.hypot(self.im)
    }
}

impl Add for Complex {
    type Output = Self;
    fn add(self, o: Self) -> Self {
        Self::new(self.re + o.re, self.im + o.im)
    }
}

impl Sub for Complex {
    type Output = Self;
    fn sub(self, o: Self) -> Self {
        Self::new(self.re - o.re, self.im - o.im)
    }
}

impl Mul for Complex {
    type Output = Self;
    fn mul(self, o: Self) -> Self {
        Self::new(self.re * o.re - self.im * o.im, self.re * o.im + self.im * o.re)
    }
}

impl Div for Complex {
    type Output = Self;
    fn div(self, o: Self) -> Self {
        let d = o.re * o.re + o.im * o.im;
        Self::new(
            (self.re * o.re + self.im * o.im) / d,
            (self.im * o.re - self.re * o.im) / d,
        )
    }
}

fn horner(coeffs: &[f64], z: Complex) -> Complex {
    coeffs
        .iter()
        .rev()
        .fold(Complex::new(0.0, 0.0), |acc, &c| acc * z + Complex::new(c, 0.0))
}

fn durand_kerner(coeffs: &[f64]) -> CalcResult<Vec<Root>> {
    const MAX_ITER: usize = 1000;
    let lead = coeffs[coeffs.len() - 1];
    let monic: Vec<f64> = coeffs.iter().map(|c| c / lead).collect();
    let degree = monic.len() - 1;

    let seed = Complex::new(0.4, 0.9);
    let mut z: Vec<Complex> = Vec::with_capacity(degree);
    let mut p = Complex::new(1.0, 0.0);
    for _ in 0..degree {
        z.push(p);
        p = p * seed;
    }

    let mut converged = false;
    for _ in 0..MAX_ITER {
        let mut delta = 0.0_f64;
        for i in 0..degree {
            let mut denom = Complex::new(1.0, 0.0);
            for j in 0..degree {
                if i != j {
                    denom = denom * (z[i] - z[j]);
                }
            }
            let step = horner(&monic, z[i]) / denom;
            z[i] = z[i] - step;
            delta = delta.max(step.norm());
        }
        if delta < 1e-12 {
            converged = true;
            break;
        }
    }
    // repeated roots converge slowly; accept them once the residual is tiny
    if !converged {
        converged = z.iter().all(|&r| horner(&monic, r).norm() < 1e-9);
    }
    if !converged || z.iter().any(|r| !r.re.is_finite() || !r.im.is_finite()) {
        return Err(CalcError::Symbolic(
            "root finding did not converge".into(),
        ));
    }

    Ok(z
        .into_iter()
        .map(|r| {
            if r.im.abs() < 1e-7 * r.re.abs().max(1.0) {
                Root::Real(polish(&monic, r.re))
            } else {
                Root::Complex(r.re, r.im)
            }
        })
        .collect())
}

/// A few Newton steps on the real polynomial.
fn polish(coeffs: &[f64], mut x: f64) -> f64 {
    let deriv: Vec<f64> = coeffs
        .iter()
        .enumerate()
        .skip(1)
        .map(|(k, c)| c * k as f64)
        .collect();
    for _ in 0..8 {
        let fx = coeffs.iter().rev().fold(0.0, |acc, c| acc * x + c);
        let dx = deriv.iter().rev().fold(0.0, |acc, c| acc * x + c);
        if dx == 0.0 || fx == 0.0 {
            break;
        }
        x -= fx / dx;
    }
    x
}

// ----------------------------------------------------------------------------
// Numeric scan
// ----------------------------------------------------------------------------

fn sample(f: &Expr, var: &str, x: f64) -> Option<f64> {
    match eval(f, &[(var, x)]) {
        Ok(Value::Number(y)) if y.is_finite() => Some(y),
        _ => None,
    }
}

fn scan_roots(f: &Expr, var: &str) -> CalcResult<Vec<Root>> {
    let (lo, hi) = SCAN_RANGE;
    let step = (hi - lo) / SCAN_STEPS as f64;
    let mut roots = Vec::new();
    let mut prev: Option<(f64, f64)> = None;

    for i in 0..=SCAN_STEPS {
        let x = lo + i as f64 * step;
        let Some(y) = sample(f, var, x) else {
            prev = None;
            continue;
        };
        if y == 0.0 {
            roots.push(Root::Real(x));
        } else if let Some((px, py)) = prev {
            if py != 0.0 && py.signum() != y.signum() {
                if let Some(r) = bisect(f, var, (px, py), (x, y)) {
                    roots.push(Root::Real(r));
                }
            }
        }
        prev = Some((x, y));
    }

    if roots.is_empty() {
        return Err(CalcError::Symbolic(format!(
            "no solution found for {var} in [{}, {}]",
            format_number(lo),
            format_number(hi)
        )));
    }
    Ok(roots)
}

/// Bisect a sign change down to adjacent floats, then keep whichever end
/// has the smaller residual and refine it with Newton steps. Returns `None`
/// for a pole, where |f| grows instead.
fn bisect(f: &Expr, var: &str, (mut a, mut fa): (f64, f64), (mut b, mut fb): (f64, f64)) -> Option<f64> {
    for _ in 0..MAX_BISECTIONS {
        let mid = 0.5 * (a + b);
        if mid <= a || mid >= b {
            break;
        }
        let fm = sample(f, var, mid)?;
        if fm == 0.0 {
            return Some(mid);
        }
        if fm.signum() == fa.signum() {
            a = mid;
            fa = fm;
        } else {
            b = mid;
            fb = fm;
        }
    }
    let best = if fa.abs() <= fb.abs() { (a, fa) } else { (b, fb) };
    let (x, residual) = refine(f, var, best);
    (residual.abs() < 1e-6).then_some(x)
}

/// Newton steps with a central-difference slope, each kept only if it
/// lowers the residual.
fn refine(f: &Expr, var: &str, (mut x, mut fx): (f64, f64)) -> (f64, f64) {
    for _ in 0..NEWTON_STEPS {
        if fx == 0.0 {
            break;
        }
        let h = f64::EPSILON.sqrt() * x.abs().max(1.0);
        let (Some(up), Some(down)) = (sample(f, var, x + h), sample(f, var, x - h)) else {
            break;
        };
        let slope = (up - down) / (2.0 * h);
        if slope == 0.0 || !slope.is_finite() {
            break;
        }
        let next = x - fx / slope;
        match sample(f, var, next) {
            Some(fn_next) if fn_next.abs() < fx.abs() => {
                x = next;
                fx = fn_next;
            }
            _ => break,
        }
    }
    (x, fx)
}
