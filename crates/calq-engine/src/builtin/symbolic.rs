//! Bridge to `symb_anafis` for differentiation, simplification and scalar
//! evaluation.
//!
//! Trees from our parser are lowered to the function set the crate knows
//! (`log` becomes `ln`, `sec` becomes `1 / cos`, `n!` becomes `gamma(n + 1)`)
//! and handed over as text.

use std::collections::{HashMap, HashSet};
use std::fmt::Debug;

use calq_core::{Bindings, CalcError, CalcResult};

use super::ast::Expr;
use super::eval::constant;

/// Functions passed through under the same name.
const NATIVE: &[&str] = &[
    "sin", "cos", "tan", "asin", "acos", "atan", "sinh", "cosh", "tanh", "exp", "sqrt", "abs",
];

/// Rendered numbers at or above this switch to exponent form, which the
/// crate's parser would read as a product with `e`.
const EXPONENT_FORM: f64 = 1e21;

fn cas_err(e: impl Debug) -> CalcError {
    CalcError::Symbolic(format!("{e:?}"))
}

fn ln(u: Expr) -> Expr {
    Expr::call("ln", vec![u])
}

/// Rewrite `e` into functions the crate understands.
pub fn lower(e: &Expr, what: &str) -> CalcResult<Expr> {
    let go = |a: &Expr| lower(a, what);
    Ok(match e {
        Expr::Num(_) | Expr::Var(_) => e.clone(),
        Expr::Neg(a) => Expr::neg(go(a)?),
        Expr::Add(a, b) => Expr::add(go(a)?, go(b)?),
        Expr::Sub(a, b) => Expr::sub(go(a)?, go(b)?),
        Expr::Mul(a, b) => Expr::mul(go(a)?, go(b)?),
        Expr::Div(a, b) => Expr::div(go(a)?, go(b)?),
        Expr::Pow(a, b) => Expr::pow(go(a)?, go(b)?),
        Expr::Factorial(a) => Expr::call("gamma", vec![Expr::add(go(a)?, Expr::Num(1.0))]),
        Expr::Call(name, args) => {
            let args = args.iter().map(go).collect::<CalcResult<Vec<_>>>()?;
            lower_call(name, args).ok_or_else(|| CalcError::Symbolic(format!("cannot {what} {e}")))?
        }
        Expr::Matrix(_) => return Err(CalcError::Symbolic(format!("cannot {what} {e}"))),
    })
}

fn square(u: &Expr) -> Expr {
    Expr::pow(u.clone(), Expr::Num(2.0))
}

fn lower_call(name: &str, mut args: Vec<Expr>) -> Option<Expr> {
    let one = || Expr::Num(1.0);
    if name == "log" && args.len() == 2 {
        let base = args.pop()?;
        let u = args.pop()?;
        return Some(Expr::div(ln(u), ln(base)));
    }
    let [u] = <[Expr; 1]>::try_from(args).ok()?;
    Some(match name {
        n if NATIVE.contains(&n) => Expr::call(n, vec![u]),
        "log" | "ln" => ln(u),
        "log10" => Expr::div(ln(u), ln(Expr::Num(10.0))),
        "log2" => Expr::div(ln(u), ln(Expr::Num(2.0))),
        "sec" => Expr::div(one(), Expr::call("cos", vec![u])),
        "csc" => Expr::div(one(), Expr::call("sin", vec![u])),
        "cot" => Expr::div(Expr::call("cos", vec![u.clone()]), Expr::call("sin", vec![u])),
        "cbrt" => Expr::pow(u, Expr::div(one(), Expr::Num(3.0))),
        "asinh" => ln(Expr::add(
            u.clone(),
            Expr::call("sqrt", vec![Expr::add(square(&u), one())]),
        )),
        "acosh" => ln(Expr::add(
            u.clone(),
            Expr::call("sqrt", vec![Expr::sub(square(&u), one())]),
        )),
        "atanh" => Expr::div(
            ln(Expr::div(Expr::add(one(), u.clone()), Expr::sub(one(), u))),
            Expr::Num(2.0),
        ),
        _ => return None,
    })
}

/// Multi-letter names, which the crate would otherwise split into products.
fn known_symbols(e: &Expr) -> Vec<String> {
    let mut names = Vec::new();
    e.variables(&mut names);
    names.retain(|n| n.chars().count() > 1 && n != "pi");
    names
}

/// d/d`var` of `e` as the crate renders it, already simplified.
pub fn derivative(e: &Expr, var: &str) -> CalcResult<String> {
    if !e.contains_var(var) {
        if let Expr::Matrix(_) = e {
            return Err(CalcError::Symbolic(format!("cannot differentiate {e}")));
        }
        return Ok("0".into());
    }
    let lowered = lower(e, "differentiate")?;
    let known = known_symbols(&lowered);
    let known: Vec<&str> = known.iter().map(String::as_str).collect();
    symb_anafis::diff(&lowered.to_string(), var, &known, None).map_err(cas_err)
}

/// Simplified form of `e` as the crate renders it.
pub fn simplified(e: &Expr) -> CalcResult<String> {
    let lowered = lower(e, "simplify")?;
    simplify_text(&lowered.to_string(), &known_symbols(&lowered))
}

/// Simplify text already in the crate's own syntax.
pub fn simplify_text(text: &str, known: &[String]) -> CalcResult<String> {
    let known: Vec<&str> = known.iter().map(String::as_str).collect();
    symb_anafis::simplify(text, &known, None).map_err(cas_err)
}

fn substitute(e: &Expr, bindings: &Bindings) -> Option<Expr> {
    let go = |a: &Expr| substitute(a, bindings);
    Some(match e {
        Expr::Num(n) if n.abs() >= EXPONENT_FORM => return None,
        Expr::Num(_) => e.clone(),
        Expr::Var(name) => {
            let bound = bindings.iter().find(|(k, _)| *k == name.as_str()).map(|(_, v)| *v);
            let n = bound.or_else(|| constant(name))?;
            if n.abs() >= EXPONENT_FORM {
                return None;
            }
            Expr::Num(n)
        }
        Expr::Neg(a) => Expr::neg(go(a)?),
        Expr::Add(a, b) => Expr::add(go(a)?, go(b)?),
        Expr::Sub(a, b) => Expr::sub(go(a)?, go(b)?),
        Expr::Mul(a, b) => Expr::mul(go(a)?, go(b)?),
        Expr::Div(a, b) => Expr::div(go(a)?, go(b)?),
        Expr::Pow(a, b) => Expr::pow(go(a)?, go(b)?),
        Expr::Factorial(a) => Expr::Factorial(Box::new(go(a)?)),
        Expr::Call(name, args) => Expr::Call(
            name.clone(),
            args.iter().map(go).collect::<Option<Vec<_>>>()?,
        ),
        Expr::Matrix(_) => return None,
    })
}

/// Finite scalar value of `e` computed by the crate.
///
/// `None` means the crate cannot give a plain finite number here (unbound
/// names, matrices, unsupported functions, poles and domain errors); the
/// caller's own evaluator decides what those mean.
pub fn evaluate(e: &Expr, bindings: &Bindings) -> Option<f64> {
    let closed = lower(&substitute(e, bindings)?, "evaluate").ok()?;
    let parsed = symb_anafis::parse(&closed.to_string(), &HashSet::new(), &HashSet::new(), None).ok()?;
    let vars: HashMap<&str, f64> = HashMap::new();
    parsed
        .evaluate(&vars, &HashMap::new())
        .as_number()
        .filter(|n| n.is_finite())
}
