use crate::error::CalcResult;
use crate::value::Value;

/// Named variable values for one evaluation, e.g. `&[("x", 2.0)]`.
pub type Bindings<'a> = [(&'a str, f64)];

/// Numeric and symbolic math capability the engine is built on.
///
/// All five operations take and return string-encoded expressions so a
/// backend can be swapped without touching the engine.
pub trait MathBackend {
    fn evaluate(&self, expr: &str, bindings: &Bindings) -> CalcResult<Value>;
    fn differentiate(&self, expr: &str, variable: &str) -> CalcResult<String>;
    fn integrate(&self, expr: &str, variable: &str) -> CalcResult<String>;
    fn solve(&self, equation: &str, variable: &str) -> CalcResult<Vec<String>>;
    fn simplify(&self, expr: &str) -> CalcResult<String>;

    /// Validate `expr` once and return a handle for repeated evaluation.
    ///
    /// The default implementation only checks that the expression can be
    /// simplified and then re-evaluates the source text on every call.
    fn compile<'a>(&'a self, expr: &str) -> CalcResult<Box<dyn CompiledExpr + 'a>>
    where
        Self: Sized,
    {
        self.simplify(expr)?;
        Ok(Box::new(Deferred {
            backend: self,
            expr: expr.to_string(),
        }))
    }
}

/// An expression prepared by [`MathBackend::compile`].
pub trait CompiledExpr {
    fn eval(&self, bindings: &Bindings) -> CalcResult<Value>;
}

struct Deferred<'a, B> {
    backend: &'a B,
    expr: String,
}

impl<B: MathBackend> CompiledExpr for Deferred<'_, B> {
    fn eval(&self, bindings: &Bindings) -> CalcResult<Value> {
        self.backend.evaluate(&self.expr, bindings)
    }
}
