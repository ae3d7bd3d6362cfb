//! Algebraic simplification by repeated bottom-up rewriting.
//!
//! Sums are flattened into `coefficient * factors` terms and like terms
//! merged. Products are flattened into a coefficient and `base^exponent`
//! factors with like bases merged. Passes repeat until the tree stops
//! changing.

use calq_core::Value;

use super::ast::Expr;
use super::eval;

const MAX_PASSES: usize = 16;

/// Largest denominator tried when printing a coefficient as a fraction.
const MAX_DENOMINATOR: i64 = 100;

/// `base^exponent` pairs of a product.
pub(super) type Factors = Vec<(Expr, Expr)>;

pub fn simplify(expr: &Expr) -> Expr {
    let mut current = expr.clone();
    for _ in 0..MAX_PASSES {
        let next = pass(&current);
        if next == current {
            break;
        }
        current = next;
    }
    current
}

fn pass(e: &Expr) -> Expr {
    match e {
        Expr::Num(_) | Expr::Var(_) => e.clone(),
        Expr::Neg(a) => match pass(a) {
            Expr::Num(n) => Expr::Num(-n),
            Expr::Neg(inner) => *inner,
            a => collect_sum(&Expr::neg(a)),
        },
        Expr::Add(a, b) => collect_sum(&Expr::add(pass(a), pass(b))),
        Expr::Sub(a, b) => collect_sum(&Expr::sub(pass(a), pass(b))),
        Expr::Mul(a, b) => collect_product(&Expr::mul(pass(a), pass(b))),
        Expr::Div(a, b) => collect_product(&Expr::div(pass(a), pass(b))),
        Expr::Pow(a, b) => simplify_pow(pass(a), pass(b)),
        Expr::Factorial(a) => {
            let a = pass(a);
            match a.as_num() {
                Some(n) if n >= 0.0 && n.fract() == 0.0 && n <= 20.0 => {
                    Expr::Num((1..=n as u64).product::<u64>() as f64)
                }
                _ => Expr::Factorial(Box::new(a)),
            }
        }
        Expr::Call(name, args) => {
            let args: Vec<Expr> = args.iter().map(pass).collect();
            fold_call(name, args)
        }
        Expr::Matrix(rows) => Expr::Matrix(
            rows.iter()
                .map(|row| row.iter().map(pass).collect())
                .collect(),
        ),
    }
}

/// Fold a call on literal arguments only when the result is a whole number,
/// so `cos(0)` becomes `1` but `sqrt(2)` stays exact.
fn fold_call(name: &str, args: Vec<Expr>) -> Expr {
    if matches!(name, "log" | "ln") && args == [Expr::var("e")] {
        return Expr::Num(1.0);
    }
    let literals: Option<Vec<Value>> = args.iter().map(|a| a.as_num().map(Value::Number)).collect();
    if let Some(values) = literals {
        if let Ok(Value::Number(r)) = eval::call(name, values) {
            if r.is_finite() && (r - r.round()).abs() < 1e-12 {
                return Expr::Num(r.round() + 0.0);
            }
        }
    }
    Expr::Call(name.to_string(), args)
}

// ----------------------------------------------------------------------------
// Sums
// ----------------------------------------------------------------------------

fn collect_sum(e: &Expr) -> Expr {
    let mut terms: Vec<(f64, Factors)> = Vec::new();
    push_terms(e, 1.0, &mut terms);

    terms.retain(|(c, _)| *c != 0.0);
    // constant term goes last
    terms.sort_by_key(|(_, f)| f.is_empty());

    let mut iter = terms.into_iter();
    let Some((c, f)) = iter.next() else {
        return Expr::Num(0.0);
    };
    let mut acc = build_product(c, f);
    for (c, f) in iter {
        acc = if c < 0.0 {
            Expr::sub(acc, build_product(-c, f))
        } else {
            Expr::add(acc, build_product(c, f))
        };
    }
    acc
}

fn push_terms(e: &Expr, sign: f64, terms: &mut Vec<(f64, Factors)>) {
    match e {
        Expr::Add(a, b) => {
            push_terms(a, sign, terms);
            push_terms(b, sign, terms);
        }
        Expr::Sub(a, b) => {
            push_terms(a, sign, terms);
            push_terms(b, -sign, terms);
        }
        Expr::Neg(a) => push_terms(a, -sign, terms),
        _ => {
            let mut coeff = sign;
            let mut factors = Vec::new();
            product_parts(e, false, &mut coeff, &mut factors);
            factors.retain(|(_, exp)| !exp.is_num(0.0));
            match terms.iter_mut().find(|(_, f)| *f == factors) {
                Some((c, _)) => *c += coeff,
                None => terms.push((coeff, factors)),
            }
        }
    }
}

// ----------------------------------------------------------------------------
// Products
// ----------------------------------------------------------------------------

fn collect_product(e: &Expr) -> Expr {
    let (coeff, factors) = split_product(e);
    build_product(coeff, factors)
}

/// Flatten a product into its numeric coefficient and merged factors.
pub(super) fn split_product(e: &Expr) -> (f64, Factors) {
    let mut coeff = 1.0;
    let mut factors = Vec::new();
    product_parts(e, false, &mut coeff, &mut factors);
    factors.retain(|(_, exp)| !exp.is_num(0.0));
    (coeff, factors)
}

fn product_parts(e: &Expr, invert: bool, coeff: &mut f64, factors: &mut Factors) {
    match e {
        Expr::Num(n) if invert && *n == 0.0 => push_factor(factors, e.clone(), Expr::Num(-1.0)),
        Expr::Num(n) if invert => *coeff /= n,
        Expr::Num(n) => *coeff *= n,
        Expr::Neg(a) => {
            *coeff = -*coeff;
            product_parts(a, invert, coeff, factors);
        }
        Expr::Mul(a, b) => {
            product_parts(a, invert, coeff, factors);
            product_parts(b, invert, coeff, factors);
        }
        Expr::Div(a, b) => {
            product_parts(a, invert, coeff, factors);
            product_parts(b, !invert, coeff, factors);
        }
        Expr::Pow(base, exp) => {
            let exp = if invert { negate(exp) } else { (**exp).clone() };
            push_factor(factors, (**base).clone(), exp);
        }
        _ => {
            let exp = if invert { -1.0 } else { 1.0 };
            push_factor(factors, e.clone(), Expr::Num(exp));
        }
    }
}

fn negate(e: &Expr) -> Expr {
    match e {
        Expr::Num(n) => Expr::Num(-n),
        Expr::Neg(a) => (**a).clone(),
        _ => Expr::neg(e.clone()),
    }
}

fn push_factor(factors: &mut Factors, base: Expr, exp: Expr) {
    match factors.iter_mut().find(|(b, _)| *b == base) {
        Some((_, existing)) => {
            *existing = match (existing.as_num(), exp.as_num()) {
                (Some(x), Some(y)) => Expr::Num(x + y),
                _ => collect_sum(&Expr::add(existing.clone(), exp)),
            };
        }
        None => factors.push((base, exp)),
    }
}

/// Rebuild `coeff * prod(base^exp)` as `numerator / denominator`.
pub(super) fn build_product(coeff: f64, mut factors: Factors) -> Expr {
    if coeff == 0.0 {
        return Expr::Num(0.0);
    }
    factors.retain(|(_, exp)| !exp.is_num(0.0));
    factors.sort_by_key(|(base, _)| !matches!(base, Expr::Var(_)));

    let mut numer: Vec<Expr> = Vec::new();
    let mut denom: Vec<Expr> = Vec::new();
    for (base, exp) in factors {
        let inverted = match &exp {
            Expr::Num(n) => *n < 0.0,
            Expr::Neg(_) => true,
            _ => false,
        };
        let (target, exp) = if inverted {
            (&mut denom, negate(&exp))
        } else {
            (&mut numer, exp)
        };
        target.push(if exp.is_num(1.0) {
            base
        } else {
            Expr::pow(base, exp)
        });
    }

    let magnitude = coeff.abs();
    match rational(magnitude) {
        Some((p, q)) => {
            if p != 1 || numer.is_empty() {
                numer.insert(0, Expr::Num(p as f64));
            }
            if q != 1 {
                denom.insert(0, Expr::Num(q as f64));
            }
        }
        None => numer.insert(0, Expr::Num(magnitude)),
    }

    let numer = join_product(numer).unwrap_or(Expr::Num(1.0));
    let body = match join_product(denom) {
        Some(d) => Expr::div(numer, d),
        None => numer,
    };
    if coeff < 0.0 {
        match body {
            Expr::Num(n) => Expr::Num(-n),
            other => Expr::neg(other),
        }
    } else {
        body
    }
}

fn join_product(items: Vec<Expr>) -> Option<Expr> {
    items.into_iter().reduce(Expr::mul)
}

/// `value` as `p / q` with a small denominator, if it is one.
pub fn rational(value: f64) -> Option<(i64, i64)> {
    if !value.is_finite() || value.abs() > 1e15 {
        return None;
    }
    (1..=MAX_DENOMINATOR).find_map(|q| {
        let scaled = value * q as f64;
        let p = scaled.round();
        ((scaled - p).abs() < 1e-10 * scaled.abs().max(1.0)).then_some((p as i64, q))
    })
}

// ----------------------------------------------------------------------------
// Powers
// ----------------------------------------------------------------------------

fn simplify_pow(base: Expr, exp: Expr) -> Expr {
    if let (Some(a), Some(b)) = (base.as_num(), exp.as_num()) {
        let r = a.powf(b);
        if r.is_finite() && (b.fract() == 0.0 || (r - r.round()).abs() < 1e-12) {
            return Expr::Num(r);
        }
    }
    if exp.is_num(0.0) {
        return Expr::Num(1.0);
    }
    if exp.is_num(1.0) {
        return base;
    }
    if base.is_num(1.0) {
        return Expr::Num(1.0);
    }
    if base.is_num(0.0) && exp.as_num().is_some_and(|n| n > 0.0) {
        return Expr::Num(0.0);
    }
    if let (Expr::Pow(inner, m), Some(n)) = (&base, exp.as_num()) {
        if let Some(m) = m.as_num() {
            if n.fract() == 0.0 {
                return simplify_pow((**inner).clone(), Expr::Num(m * n));
            }
        }
    }
    if exp.as_num().is_some_and(|n| n < 0.0) {
        return collect_product(&Expr::pow(base, exp));
    }
    Expr::pow(base, exp)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::builtin::parse::parse;

    fn simp(src: &str) -> String {
        simplify(&parse(src).unwrap()).to_string()
    }

    #[test]
    fn test_constant_folding() {
        assert_eq!(simp("1 + 2 * 3"), "7");
        assert_eq!(simp("2^10"), "1024");
        assert_eq!(simp("1 / 3"), "1 / 3");
        assert_eq!(simp("cos(0) + 1"), "2");
        assert_eq!(simp("sqrt(2)"), "sqrt(2)");
    }

    #[test]
    fn test_natural_logs_of_e_and_one() {
        assert_eq!(simp("log(e)"), "1");
        assert_eq!(simp("ln(e)"), "1");
        assert_eq!(simp("log(1)"), "0");
        assert_eq!(simp("ln(1) + x"), "x");
        assert_eq!(simp("e^x * log(e)"), "e^x");
        assert_eq!(simp("log(e, 10)"), "log(e, 10)");
    }

    #[test]
    fn test_like_terms() {
        assert_eq!(simp("x + x"), "2 * x");
        assert_eq!(simp("2x + 3x - x"), "4 * x");
        assert_eq!(simp("x - x"), "0");
        assert_eq!(simp("1 + x + 2"), "x + 3");
        assert_eq!(simp("x^2 - 2x + 1"), "x^2 - 2 * x + 1");
    }

    #[test]
    fn test_products() {
        assert_eq!(simp("x * x"), "x^2");
        assert_eq!(simp("x^3 / x"), "x^2");
        assert_eq!(simp("x / x"), "1");
        assert_eq!(simp("0 * sin(x)"), "0");
        assert_eq!(simp("x * 2"), "2 * x");
        assert_eq!(simp("x^3 * 1 / 3"), "x^3 / 3");
        assert_eq!(simp("-(2 * x)"), "-2 * x");
    }

    #[test]
    fn test_powers() {
        assert_eq!(simp("x^0"), "1");
        assert_eq!(simp("x^1"), "x");
        assert_eq!(simp("(x^2)^3"), "x^6");
        assert_eq!(simp("x^-1"), "1 / x");
        assert_eq!(simp("1^y"), "1");
    }

    #[test]
    fn test_division_by_zero_is_kept() {
        assert_eq!(simp("x / 0"), "x / 0");
    }

    #[test]
    fn test_rational() {
        assert_eq!(rational(0.5), Some((1, 2)));
        assert_eq!(rational(-2.0 / 3.0), Some((-2, 3)));
        assert_eq!(rational(std::f64::consts::PI), None);
    }
}
