use std::f64::consts::{E, PI, TAU};

use calq_core::{Bindings, CalcError, CalcResult, Matrix, Value};

use super::ast::Expr;
use super::linalg;

const GOLDEN_RATIO: f64 = 1.618_033_988_749_895;

/// Named constants available when a name is not bound.
pub fn constant(name: &str) -> Option<f64> {
    match name {
        "pi" => Some(PI),
        "e" => Some(E),
        "tau" => Some(TAU),
        "phi" => Some(GOLDEN_RATIO),
        _ => None,
    }
}

pub fn eval(expr: &Expr, bindings: &Bindings) -> CalcResult<Value> {
    match expr {
        Expr::Num(n) => Ok(Value::Number(*n)),
        Expr::Var(name) => bindings
            .iter()
            .find(|(k, _)| *k == name.as_str())
            .map(|(_, v)| *v)
            .or_else(|| constant(name))
            .map(Value::Number)
            .ok_or_else(|| CalcError::Evaluation(format!("undefined symbol '{name}'"))),
        Expr::Neg(a) => match eval(a, bindings)? {
            Value::Number(n) => Ok(Value::Number(-n)),
            Value::Matrix(m) => Ok(Value::Matrix(m.map(|v| -v))),
        },
        Expr::Add(a, b) => add(eval(a, bindings)?, eval(b, bindings)?),
        Expr::Sub(a, b) => add(eval(a, bindings)?, negate(eval(b, bindings)?)),
        Expr::Mul(a, b) => multiply(eval(a, bindings)?, eval(b, bindings)?),
        Expr::Div(a, b) => divide(eval(a, bindings)?, eval(b, bindings)?),
        Expr::Pow(a, b) => power(eval(a, bindings)?, eval(b, bindings)?),
        Expr::Factorial(a) => factorial(number(eval(a, bindings)?, "factorial")?).map(Value::Number),
        Expr::Call(name, args) => {
            let values = args
                .iter()
                .map(|a| eval(a, bindings))
                .collect::<CalcResult<Vec<_>>>()?;
            call(name, values)
        }
        Expr::Matrix(rows) => {
            let cols = rows.first().map(Vec::len).unwrap_or(0);
            let mut data = Vec::with_capacity(rows.len() * cols);
            for cell in rows.iter().flatten() {
                data.push(number(eval(cell, bindings)?, "matrix element")?);
            }
            Ok(Value::Matrix(Matrix::new(rows.len(), cols, data)?))
        }
    }
}

fn number(v: Value, context: &str) -> CalcResult<f64> {
    match v {
        Value::Number(n) => Ok(n),
        Value::Matrix(_) => Err(CalcError::Evaluation(format!(
            "{context} expects a number, got a matrix"
        ))),
    }
}

fn negate(v: Value) -> Value {
    match v {
        Value::Number(n) => Value::Number(-n),
        Value::Matrix(m) => Value::Matrix(m.map(|x| -x)),
    }
}

fn add(a: Value, b: Value) -> CalcResult<Value> {
    Ok(match (a, b) {
        (Value::Number(x), Value::Number(y)) => Value::Number(x + y),
        (Value::Number(x), Value::Matrix(m)) | (Value::Matrix(m), Value::Number(x)) => {
            Value::Matrix(m.map(|v| v + x))
        }
        (Value::Matrix(a), Value::Matrix(b)) => Value::Matrix(linalg::add(&a, &b)?),
    })
}

fn multiply(a: Value, b: Value) -> CalcResult<Value> {
    Ok(match (a, b) {
        (Value::Number(x), Value::Number(y)) => Value::Number(x * y),
        (Value::Number(x), Value::Matrix(m)) | (Value::Matrix(m), Value::Number(x)) => {
            Value::Matrix(m.map(|v| v * x))
        }
        (Value::Matrix(a), Value::Matrix(b)) => Value::Matrix(linalg::multiply(&a, &b)?),
    })
}

fn divide(a: Value, b: Value) -> CalcResult<Value> {
    Ok(match (a, b) {
        (Value::Number(x), Value::Number(y)) => Value::Number(x / y),
        (Value::Matrix(m), Value::Number(x)) => Value::Matrix(m.map(|v| v / x)),
        (a, Value::Matrix(b)) => multiply(a, Value::Matrix(linalg::inverse(&b)?))?,
    })
}

fn power(a: Value, b: Value) -> CalcResult<Value> {
    let exponent = number(b, "exponent")?;
    match a {
        Value::Number(base) => {
            let r = base.powf(exponent);
            if r.is_nan() && !base.is_nan() && !exponent.is_nan() {
                return Err(CalcError::Evaluation(format!(
                    "domain error: {base}^{exponent} is not real"
                )));
            }
            Ok(Value::Number(r))
        }
        Value::Matrix(m) => {
            if exponent.fract() != 0.0 {
                return Err(CalcError::Evaluation(
                    "matrix powers need an integer exponent".into(),
                ));
            }
            Ok(Value::Matrix(linalg::power(&m, exponent as i64)?))
        }
    }
}

fn factorial(n: f64) -> CalcResult<f64> {
    if n < 0.0 || n.fract() != 0.0 {
        return Err(CalcError::Evaluation(format!(
            "domain error: factorial of {n}"
        )));
    }
    if n > 170.0 {
        return Ok(f64::INFINITY);
    }
    Ok((1..=n as u64).fold(1.0, |acc, k| acc * k as f64))
}

fn arity(name: &str, args: &[Value], expected: usize) -> CalcResult<()> {
    if args.len() != expected {
        return Err(CalcError::Evaluation(format!(
            "{name}() takes {expected} argument(s), got {}",
            args.len()
        )));
    }
    Ok(())
}

fn unary(name: &str, args: Vec<Value>, f: fn(f64) -> f64) -> CalcResult<Value> {
    arity(name, &args, 1)?;
    let Some(x) = args[0].as_number() else {
        return Err(CalcError::Evaluation(format!("{name}() expects a number")));
    };
    checked(name, &[x], f(x))
}

fn binary(name: &str, args: Vec<Value>, f: fn(f64, f64) -> f64) -> CalcResult<Value> {
    arity(name, &args, 2)?;
    match (args[0].as_number(), args[1].as_number()) {
        (Some(a), Some(b)) => checked(name, &[a, b], f(a, b)),
        _ => Err(CalcError::Evaluation(format!("{name}() expects numbers"))),
    }
}

/// NaN from non-NaN inputs means the arguments left the real domain.
fn checked(name: &str, inputs: &[f64], result: f64) -> CalcResult<Value> {
    if result.is_nan() && inputs.iter().all(|x| !x.is_nan()) {
        let shown: Vec<String> = inputs.iter().map(f64::to_string).collect();
        return Err(CalcError::Evaluation(format!(
            "domain error: {name}({}) is not real",
            shown.join(", ")
        )));
    }
    Ok(Value::Number(result))
}

fn matrix_arg<'a>(name: &str, args: &'a [Value]) -> CalcResult<&'a Matrix> {
    arity(name, args, 1)?;
    args[0]
        .as_matrix()
        .ok_or_else(|| CalcError::Evaluation(format!("{name}() expects a matrix")))
}

/// Functions taking anything other than a single real argument.
const SPECIAL_FUNCTIONS: &[&str] = &[
    "log", "round", "pow", "mod", "atan2", "hypot", "factorial", "min", "max", "det", "inv",
    "transpose", "trace",
];

pub fn is_function(name: &str) -> bool {
    call_table(name).is_some() || SPECIAL_FUNCTIONS.contains(&name)
}

fn call_table(name: &str) -> Option<fn(f64) -> f64> {
    let f: fn(f64) -> f64 = match name {
        "sin" => f64::sin,
        "cos" => f64::cos,
        "tan" => f64::tan,
        "sec" => |x| 1.0 / x.cos(),
        "csc" => |x| 1.0 / x.sin(),
        "cot" => |x| 1.0 / x.tan(),
        "asin" => f64::asin,
        "acos" => f64::acos,
        "atan" => f64::atan,
        "sinh" => f64::sinh,
        "cosh" => f64::cosh,
        "tanh" => f64::tanh,
        "asinh" => f64::asinh,
        "acosh" => f64::acosh,
        "atanh" => f64::atanh,
        "exp" => f64::exp,
        "ln" => f64::ln,
        "log10" => f64::log10,
        "log2" => f64::log2,
        "sqrt" => f64::sqrt,
        "cbrt" => f64::cbrt,
        "abs" => f64::abs,
        "floor" => f64::floor,
        "ceil" => f64::ceil,
        "sign" => |x| if x == 0.0 { 0.0 } else { x.signum() },
        _ => return None,
    };
    Some(f)
}

pub fn call(name: &str, args: Vec<Value>) -> CalcResult<Value> {
    if let Some(f) = call_table(name) {
        return unary(name, args, f);
    }
    match name {
        "log" => match args.len() {
            1 => unary(name, args, f64::ln),
            _ => binary(name, args, |x, base| x.ln() / base.ln()),
        },
        "round" => match args.len() {
            1 => unary(name, args, f64::round),
            _ => binary(name, args, |x, digits| {
                let scale = 10f64.powi(digits as i32);
                (x * scale).round() / scale
            }),
        },
        "pow" => binary(name, args, f64::powf),
        "mod" => binary(name, args, |a, b| a - b * (a / b).floor()),
        "atan2" => binary(name, args, f64::atan2),
        "hypot" => binary(name, args, f64::hypot),
        "factorial" => {
            arity(name, &args, 1)?;
            factorial(number(args[0].clone(), name)?).map(Value::Number)
        }
        "min" | "max" => {
            if args.is_empty() {
                return Err(CalcError::Evaluation(format!("{name}() needs arguments")));
            }
            let mut nums = Vec::with_capacity(args.len());
            for a in args {
                nums.push(number(a, name)?);
            }
            let pick = if name == "min" { f64::min } else { f64::max };
            Ok(Value::Number(nums.into_iter().reduce(pick).unwrap_or(f64::NAN)))
        }
        "det" => Ok(Value::Number(linalg::determinant(matrix_arg(name, &args)?)?)),
        "inv" => {
            arity(name, &args, 1)?;
            match &args[0] {
                Value::Number(n) => Ok(Value::Number(1.0 / n)),
                Value::Matrix(m) => Ok(Value::Matrix(linalg::inverse(m)?)),
            }
        }
        "transpose" => Ok(Value::Matrix(linalg::transpose(matrix_arg(name, &args)?)?)),
        "trace" => Ok(Value::Number(linalg::trace(matrix_arg(name, &args)?)?)),
        other => Err(CalcError::Evaluation(format!("undefined function '{other}'"))),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::builtin::parse::parse;

    fn num(src: &str) -> f64 {
        eval(&parse(src).unwrap(), &[]).unwrap().as_number().unwrap()
    }

    fn err(src: &str) -> CalcError {
        eval(&parse(src).unwrap(), &[]).unwrap_err()
    }

    #[test]
    fn test_arithmetic() {
        assert_eq!(num("1 + 2 * 3"), 7.0);
        assert_eq!(num("2^10"), 1024.0);
        assert_eq!(num("-2^2"), -4.0);
        assert_eq!(num("10 / 4"), 2.5);
        assert_eq!(num("5!"), 120.0);
        assert_eq!(num("mod(-1, 3)"), 2.0);
    }

    #[test]
    fn test_functions_and_constants() {
        assert!((num("sin(pi / 2)") - 1.0).abs() < 1e-12);
        assert!((num("log(e)") - 1.0).abs() < 1e-12);
        assert!((num("log(8, 2)") - 3.0).abs() < 1e-12);
        assert_eq!(num("sqrt(16)"), 4.0);
        assert_eq!(num("max(1, 7, 3)"), 7.0);
    }

    #[test]
    fn test_bindings_shadow_constants() {
        let e = parse("x * e").unwrap();
        let v = eval(&e, &[("x", 2.0), ("e", 3.0)]).unwrap();
        assert_eq!(v, Value::Number(6.0));
    }

    #[test]
    fn test_division_by_zero_is_infinite() {
        assert_eq!(num("1 / 0"), f64::INFINITY);
    }

    #[test]
    fn test_domain_errors() {
        assert!(matches!(err("log(-1)"), CalcError::Evaluation(_)));
        assert!(matches!(err("sqrt(-4)"), CalcError::Evaluation(_)));
        assert!(matches!(err("(-8)^0.5"), CalcError::Evaluation(_)));
        assert!(matches!(err("(-1.5)!"), CalcError::Evaluation(_)));
    }

    #[test]
    fn test_unknown_names() {
        assert!(err("foo + 1").to_string().contains("undefined symbol"));
        assert!(err("foo(1)").to_string().contains("undefined function"));
        assert!(err("sin(1, 2)").to_string().contains("argument"));
    }

    #[test]
    fn test_matrix_expressions() {
        let v = eval(&parse("[[1,2],[3,4]] + [[5,6],[7,8]]").unwrap(), &[]).unwrap();
        assert_eq!(v.to_string(), "[[6,8],[10,12]]");
        let v = eval(&parse("[[1,2],[3,4]] * [[5,6],[7,8]]").unwrap(), &[]).unwrap();
        assert_eq!(v.to_string(), "[[19,22],[43,50]]");
        assert_eq!(num("det([[1,2],[3,4]])"), -2.0);
        let v = eval(&parse("2 * [1, 2, 3]").unwrap(), &[]).unwrap();
        assert_eq!(v.to_string(), "[[2,4,6]]");
    }

    #[test]
    fn test_matrix_shape_errors() {
        assert!(matches!(err("[[1,2]] + [[1],[2]]"), CalcError::Dimension(_)));
        assert!(matches!(err("det([[1,2,3],[4,5,6]])"), CalcError::Dimension(_)));
        assert!(matches!(err("sin([[1]])"), CalcError::Evaluation(_)));
    }
}
