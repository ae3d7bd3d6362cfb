//! Default math backend.
//!
//! Input goes through our own recursive-descent parser so matrices,
//! factorials and implicit products read the same everywhere. Differentiation,
//! simplification and scalar evaluation are delegated to `symb_anafis`,
//! matrix algebra to `nalgebra`. Integration, equation solving and the
//! matrix-aware evaluator used for sampling stay local.

mod ast;
mod calculus;
mod eval;
mod linalg;
mod parse;
mod simplify;
mod solve;
mod symbolic;

use calq_core::{Bindings, CalcError, CalcResult, CompiledExpr, MathBackend, Value};

use ast::Expr;
use parse::ParseError;

/// [`MathBackend`] over `symb_anafis` and `nalgebra`.
#[derive(Debug, Default, Clone, Copy)]
pub struct Builtin;

fn numeric_err(e: ParseError) -> CalcError {
    CalcError::Evaluation(e.to_string())
}

fn symbolic_err(e: ParseError) -> CalcError {
    CalcError::Symbolic(e.to_string())
}

/// Reject calls to functions the evaluator does not know before any
/// sampling happens.
fn check_functions(e: &Expr) -> CalcResult<()> {
    match e {
        Expr::Num(_) | Expr::Var(_) => Ok(()),
        Expr::Neg(a) | Expr::Factorial(a) => check_functions(a),
        Expr::Add(a, b) | Expr::Sub(a, b) | Expr::Mul(a, b) | Expr::Div(a, b) | Expr::Pow(a, b) => {
            check_functions(a)?;
            check_functions(b)
        }
        Expr::Call(name, args) => {
            if !eval::is_function(name) {
                return Err(CalcError::Evaluation(format!("undefined function '{name}'")));
            }
            args.iter().try_for_each(check_functions)
        }
        Expr::Matrix(rows) => rows.iter().flatten().try_for_each(check_functions),
    }
}

impl MathBackend for Builtin {
    fn evaluate(&self, expr: &str, bindings: &Bindings) -> CalcResult<Value> {
        let tree = parse::parse(expr).map_err(numeric_err)?;
        match symbolic::evaluate(&tree, bindings) {
            Some(n) => Ok(Value::Number(n)),
            None => eval::eval(&tree, bindings),
        }
    }

    fn differentiate(&self, expr: &str, variable: &str) -> CalcResult<String> {
        let tree = parse::parse(expr).map_err(symbolic_err)?;
        symbolic::derivative(&tree, variable)
    }

    fn integrate(&self, expr: &str, variable: &str) -> CalcResult<String> {
        let tree = parse::parse(expr).map_err(symbolic_err)?;
        Ok(calculus::integrate(&tree, variable)?.to_string())
    }

    fn solve(&self, equation: &str, variable: &str) -> CalcResult<Vec<String>> {
        let (lhs, rhs) = parse::parse_equation(equation).map_err(symbolic_err)?;
        let roots = solve::solve(&lhs, &rhs, variable)?;
        Ok(roots.iter().map(ToString::to_string).collect())
    }

    fn simplify(&self, expr: &str) -> CalcResult<String> {
        match parse::parse(expr) {
            Ok(tree) => match symbolic::lower(&tree, "simplify") {
                Ok(_) => symbolic::simplified(&tree),
                // matrices and piecewise functions
                Err(_) => Ok(simplify::simplify(&tree).to_string()),
            },
            // output of the crate itself, e.g. a derivative
            Err(e) => symbolic::simplify_text(expr, &[]).map_err(|_| symbolic_err(e)),
        }
    }

    fn compile<'a>(&'a self, expr: &str) -> CalcResult<Box<dyn CompiledExpr + 'a>> {
        let tree = parse::parse(expr).map_err(numeric_err)?;
        check_functions(&tree)?;
        Ok(Box::new(Compiled(tree)))
    }
}

/// Parsed once, evaluated per sample.
struct Compiled(Expr);

impl CompiledExpr for Compiled {
    fn eval(&self, bindings: &Bindings) -> CalcResult<Value> {
        eval::eval(&self.0, bindings)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_evaluate_with_bindings() {
        let v = Builtin.evaluate("x^2 + y", &[("x", 3.0), ("y", 1.0)]).unwrap();
        assert_eq!(v, Value::Number(10.0));
    }

    #[test]
    fn test_parse_errors_map_per_operation() {
        assert!(matches!(Builtin.evaluate("2 +", &[]), Err(CalcError::Evaluation(_))));
        assert!(matches!(Builtin.differentiate("2 +", "x"), Err(CalcError::Symbolic(_))));
        assert!(matches!(Builtin.solve("= 1", "x"), Err(CalcError::Symbolic(_))));
    }

    #[test]
    fn test_symbolic_round_trip_through_strings() {
        let d = Builtin.differentiate("x^2", "x").unwrap();
        assert_eq!(d.replace(' ', ""), "2*x");
        // the crate's output reads back through our parser
        let again = Builtin.simplify(&d).unwrap();
        assert_eq!(Builtin.evaluate(&again, &[("x", 4.0)]).unwrap(), Value::Number(8.0));
        assert_eq!(Builtin.integrate("x^2", "x").unwrap(), "x^3 / 3");
        assert_eq!(Builtin.solve("x^2 = 9", "x").unwrap(), vec!["-3", "3"]);
    }

    #[test]
    fn test_simplify_falls_back_for_matrices() {
        assert_eq!(Builtin.simplify("[[1 + 1, x]]").unwrap(), "[[2, x]]");
        assert_eq!(Builtin.simplify("floor(x) + floor(x)").unwrap(), "2 * floor(x)");
    }

    #[test]
    fn test_evaluate_keeps_local_semantics() {
        assert_eq!(Builtin.evaluate("1 / 0", &[]).unwrap(), Value::Number(f64::INFINITY));
        assert_eq!(Builtin.evaluate("5!", &[]).unwrap(), Value::Number(120.0));
        assert!(matches!(Builtin.evaluate("sqrt(-1)", &[]), Err(CalcError::Evaluation(_))));
        assert!(matches!(Builtin.evaluate("q + 1", &[]), Err(CalcError::Evaluation(_))));
        let det = Builtin.evaluate("det([[1, 2], [3, 4]])", &[]).unwrap();
        assert_eq!(det, Value::Number(-2.0));
    }

    #[test]
    fn test_compile_rejects_unknown_functions() {
        assert!(Builtin.compile("foo(x)").is_err());
        let f = Builtin.compile("sin(x)").unwrap();
        assert_eq!(f.eval(&[("x", 0.0)]).unwrap(), Value::Number(0.0));
    }
}
