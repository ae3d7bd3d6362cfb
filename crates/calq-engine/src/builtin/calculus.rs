//! Rule-based antiderivative search. Linearity checks lean on the
//! derivative from [`super::symbolic`].

use calq_core::{CalcError, CalcResult};

use super::ast::Expr;
use super::parse::parse;
use super::simplify::{build_product, simplify, split_product};
use super::symbolic;

fn unsupported(what: &str, e: &Expr) -> CalcError {
    CalcError::Symbolic(format!("cannot {what} {e}"))
}

/// An antiderivative of `e` with respect to `var`, without the constant.
pub fn integrate(e: &Expr, var: &str) -> CalcResult<Expr> {
    Ok(simplify(&antiderive(&simplify(e), var)?))
}

fn antiderive(e: &Expr, v: &str) -> CalcResult<Expr> {
    if let Expr::Matrix(_) = e {
        return Err(unsupported("integrate", e));
    }
    if !e.contains_var(v) {
        return Ok(Expr::mul(e.clone(), Expr::var(v)));
    }
    match e {
        Expr::Add(a, b) => return Ok(Expr::add(antiderive(a, v)?, antiderive(b, v)?)),
        Expr::Sub(a, b) => return Ok(Expr::sub(antiderive(a, v)?, antiderive(b, v)?)),
        Expr::Neg(a) => return Ok(Expr::neg(antiderive(a, v)?)),
        _ => {}
    }

    let (coeff, factors) = split_product(e);
    let (dependent, constant): (Vec<_>, Vec<_>) = factors
        .into_iter()
        .partition(|(base, exp)| base.contains_var(v) || exp.contains_var(v));
    let [(base, exp)] = dependent.as_slice() else {
        return Err(unsupported("integrate", e));
    };
    let scale = build_product(coeff, constant);
    let inner = integrate_factor(base, exp, v).ok_or_else(|| unsupported("integrate", e))?;
    Ok(Expr::mul(scale, inner))
}

/// Slope of `u` when it is linear in `v`.
fn linear_slope(u: &Expr, v: &str) -> Option<Expr> {
    let slope = simplify(&parse(&symbolic::derivative(u, v).ok()?).ok()?);
    (!slope.contains_var(v) && !slope.is_num(0.0)).then_some(slope)
}

/// Antiderivative of `base^exp` where at least one side depends on `v`.
fn integrate_factor(base: &Expr, exp: &Expr, v: &str) -> Option<Expr> {
    if exp.contains_var(v) {
        if base.contains_var(v) {
            return None;
        }
        // c^u -> c^u / (u' ln c)
        let a = linear_slope(exp, v)?;
        let power = Expr::pow(base.clone(), exp.clone());
        if *base == Expr::var("e") {
            return Some(Expr::div(power, a));
        }
        let ln_c = Expr::call("log", vec![base.clone()]);
        return Some(Expr::div(power, Expr::mul(a, ln_c)));
    }

    if exp.is_num(1.0) {
        if let Some(found) = integrate_call(base, v) {
            return Some(found);
        }
    }

    if let Expr::Call(name, args) = base {
        if let [u] = args.as_slice() {
            match (name.as_str(), exp.as_num()) {
                ("sqrt", _) => {
                    let half = simplify(&Expr::div(exp.clone(), Expr::Num(2.0)));
                    return integrate_factor(u, &half, v);
                }
                ("sec", Some(n)) if n == 2.0 => {
                    let a = linear_slope(u, v)?;
                    return Some(Expr::div(Expr::call("tan", vec![u.clone()]), a));
                }
                ("csc", Some(n)) if n == 2.0 => {
                    let a = linear_slope(u, v)?;
                    return Some(Expr::neg(Expr::div(Expr::call("cot", vec![u.clone()]), a)));
                }
                _ => {}
            }
        }
    }

    // power rule on a linear base
    let a = linear_slope(base, v)?;
    if exp.is_num(-1.0) {
        let ln = Expr::call("log", vec![Expr::call("abs", vec![base.clone()])]);
        return Some(Expr::div(ln, a));
    }
    let raised = simplify(&Expr::add(exp.clone(), Expr::Num(1.0)));
    Some(Expr::div(
        Expr::pow(base.clone(), raised.clone()),
        Expr::mul(raised, a),
    ))
}

/// Table of antiderivatives for `f(u)` with `u` linear in `v`.
fn integrate_call(base: &Expr, v: &str) -> Option<Expr> {
    let Expr::Call(name, args) = base else {
        return None;
    };
    let [u] = args.as_slice() else {
        return None;
    };
    let a = linear_slope(u, v)?;
    let call = |f: &str| Expr::call(f, vec![u.clone()]);
    let log_abs = |x: Expr| Expr::call("log", vec![Expr::call("abs", vec![x])]);

    let found = match name.as_str() {
        "sin" => Expr::neg(call("cos")),
        "cos" => call("sin"),
        "tan" => Expr::neg(log_abs(call("cos"))),
        "sec" => log_abs(Expr::add(call("sec"), call("tan"))),
        "csc" => Expr::neg(log_abs(Expr::add(call("csc"), call("cot")))),
        "cot" => log_abs(call("sin")),
        "exp" => call("exp"),
        "sinh" => call("cosh"),
        "cosh" => call("sinh"),
        "tanh" => Expr::call("log", vec![call("cosh")]),
        "log" | "ln" => Expr::sub(Expr::mul(u.clone(), Expr::call("log", vec![u.clone()])), u.clone()),
        _ => return None,
    };
    Some(Expr::div(found, a))
}
