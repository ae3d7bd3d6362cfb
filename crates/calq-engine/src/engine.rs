//! Calculation Engine: one entry point per operation type, each returning
//! a complete [`CalculationResult`]. Failures never escape as `Err`; they
//! come back as a result with `error` set and no steps.

use tracing::debug;

use calq_core::{
    format_number, normalize, CalcResult, CalculationResult, GraphRange, GraphSeries,
    MathBackend, Matrix, OperationType,
};

use crate::builtin::Builtin;
use crate::graph::Sampler;
use crate::matrix::MatrixOp;
use crate::stats;

pub struct Engine<B: MathBackend = Builtin> {
    backend: B,
    sampler: Sampler,
}

impl Default for Engine<Builtin> {
    fn default() -> Self {
        Self::new(Builtin)
    }
}

fn join_numbers(data: &[f64], sep: &str) -> String {
    data.iter()
        .map(|&v| format_number(v))
        .collect::<Vec<_>>()
        .join(sep)
}

/// Wrap a failed operation into its result shape.
fn settle(
    op: OperationType,
    expression: &str,
    label: &str,
    outcome: CalcResult<CalculationResult>,
) -> CalculationResult {
    outcome.unwrap_or_else(|e| {
        debug!(operation = %op, expression, error = %e, "calculation failed");
        CalculationResult::failure(op, expression, format!("{label}: {e}"))
    })
}

impl<B: MathBackend> Engine<B> {
    pub fn new(backend: B) -> Self {
        Self {
            backend,
            sampler: Sampler::default(),
        }
    }

    pub fn with_sampler(mut self, sampler: Sampler) -> Self {
        self.sampler = sampler;
        self
    }

    pub fn backend(&self) -> &B {
        &self.backend
    }

    // ------------------------------------------------------------------------
    // Basic evaluation
    // ------------------------------------------------------------------------

    pub fn evaluate_expression(&self, raw: &str) -> CalculationResult {
        settle(
            OperationType::Basic,
            raw,
            "calculation error",
            self.try_evaluate(raw),
        )
    }

    fn try_evaluate(&self, raw: &str) -> CalcResult<CalculationResult> {
        let normalized = normalize(raw);
        let value = self.backend.evaluate(&normalized, &[])?;
        let result = value.to_string();
        let steps = vec![
            format!("Input: {raw}"),
            format!("Normalized: {normalized}"),
            format!("Result: {result}"),
        ];
        Ok(CalculationResult::success(OperationType::Basic, normalized, result, steps))
    }

    // ------------------------------------------------------------------------
    // Graphs
    // ------------------------------------------------------------------------

    /// Sample `expression` in `x` over `range`.
    pub fn generate_graph(&self, expression: &str, range: GraphRange) -> CalculationResult {
        settle(
            OperationType::Graph,
            expression,
            "graph error",
            self.try_graph(expression, range),
        )
    }

    fn try_graph(&self, expression: &str, range: GraphRange) -> CalcResult<CalculationResult> {
        let normalized = normalize(expression);
        let compiled = self.backend.compile(&normalized)?;
        let (x, y) = self.sampler.line(compiled.as_ref(), range);
        let points = x.len();
        let steps = vec![
            format!("Function: f(x) = {normalized}"),
            format!(
                "Domain: [{}, {}]",
                format_number(range.min),
                format_number(range.max)
            ),
            format!("Data points: {points}"),
        ];
        let series = GraphSeries::Scatter {
            x,
            y,
            name: format!("f(x) = {normalized}"),
        };
        Ok(CalculationResult::success(
            OperationType::Graph,
            normalized,
            format!("Graph generated: {points} points"),
            steps,
        )
        .with_graph(series))
    }

    /// Sample `expression` in `x` and `y` over the same range on both axes.
    pub fn generate_surface(&self, expression: &str, range: GraphRange) -> CalculationResult {
        settle(
            OperationType::Graph,
            expression,
            "graph error",
            self.try_surface(expression, range),
        )
    }

    fn try_surface(&self, expression: &str, range: GraphRange) -> CalcResult<CalculationResult> {
        let normalized = normalize(expression);
        let compiled = self.backend.compile(&normalized)?;
        let (x, y, z) = self.sampler.surface(compiled.as_ref(), range);
        let domain = format!(
            "[{}, {}]",
            format_number(range.min),
            format_number(range.max)
        );
        let steps = vec![
            format!("Function: f(x, y) = {normalized}"),
            format!("Domain: x, y in {domain}"),
            format!("Mesh: {}x{}", x.len(), y.len()),
        ];
        let result = format!("Surface generated: {}x{} mesh", x.len(), y.len());
        Ok(
            CalculationResult::success(OperationType::Graph, normalized, result, steps)
                .with_graph(GraphSeries::Surface { x, y, z }),
        )
    }

    // ------------------------------------------------------------------------
    // Calculus and equations
    // ------------------------------------------------------------------------

    pub fn calculate_derivative(&self, expression: &str, variable: &str) -> CalculationResult {
        settle(
            OperationType::Derivative,
            expression,
            "derivative error",
            self.try_derivative(expression, variable),
        )
    }

    fn try_derivative(&self, expression: &str, variable: &str) -> CalcResult<CalculationResult> {
        let normalized = normalize(expression);
        let derivative = self.backend.differentiate(&normalized, variable)?;
        let simplified = self.backend.simplify(&derivative)?;
        let steps = vec![
            format!("Function: f({variable}) = {normalized}"),
            format!("Differentiate: d/d{variable}({normalized})"),
            format!("Derivative: f'({variable}) = {simplified}"),
        ];
        Ok(CalculationResult::success(
            OperationType::Derivative,
            normalized,
            simplified,
            steps,
        ))
    }

    pub fn calculate_integral(&self, expression: &str, variable: &str) -> CalculationResult {
        settle(
            OperationType::Integral,
            expression,
            "integral error",
            self.try_integral(expression, variable),
        )
    }

    fn try_integral(&self, expression: &str, variable: &str) -> CalcResult<CalculationResult> {
        let normalized = normalize(expression);
        let antiderivative = self.backend.integrate(&normalized, variable)?;
        let steps = vec![
            format!("Integrand: f({variable}) = {normalized}"),
            format!("Integrate: ∫{normalized} d{variable}"),
            format!("Antiderivative: F({variable}) = {antiderivative}"),
        ];
        Ok(CalculationResult::success(
            OperationType::Integral,
            normalized,
            antiderivative,
            steps,
        ))
    }

    pub fn solve_equation(&self, equation: &str, variable: &str) -> CalculationResult {
        settle(
            OperationType::Equation,
            equation,
            "equation error",
            self.try_solve(equation, variable),
        )
    }

    fn try_solve(&self, equation: &str, variable: &str) -> CalcResult<CalculationResult> {
        let normalized = normalize(equation);
        let solutions = format!("[{}]", self.backend.solve(&normalized, variable)?.join(", "));
        let steps = vec![
            format!("Equation: {normalized}"),
            format!("Solve for {variable}"),
            format!("Solutions: {variable} = {solutions}"),
        ];
        Ok(CalculationResult::success(
            OperationType::Equation,
            normalized,
            solutions,
            steps,
        ))
    }

    // ------------------------------------------------------------------------
    // Statistics and matrices
    // ------------------------------------------------------------------------

    pub fn calculate_statistics(&self, data: &[f64]) -> CalculationResult {
        let expression = format!("stats([{}])", join_numbers(data, ", "));
        settle(
            OperationType::Statistics,
            &expression,
            "statistics error",
            self.try_statistics(&expression, data),
        )
    }

    fn try_statistics(&self, expression: &str, data: &[f64]) -> CalcResult<CalculationResult> {
        let s = stats::summarize(data)?;
        let steps = vec![
            format!("Count: {}", s.count),
            format!("Data: [{}]", join_numbers(data, ", ")),
            format!(
                "Mean: ({}) / {} = {}",
                join_numbers(data, " + "),
                s.count,
                format_number(s.mean)
            ),
            format!("Variance: {}", format_number(s.variance)),
            format!(
                "Standard deviation: √{} = {}",
                format_number(s.variance),
                format_number(s.standard_deviation)
            ),
            format!(
                "Min: {}, Max: {}",
                format_number(s.min),
                format_number(s.max)
            ),
            format!("Median: {}", format_number(s.median)),
        ];
        let result = serde_json::to_string_pretty(&s)?;
        Ok(CalculationResult::success(
            OperationType::Statistics,
            expression,
            result,
            steps,
        ))
    }

    pub fn calculate_matrix(
        &self,
        op: MatrixOp,
        a: &Matrix,
        b: Option<&Matrix>,
    ) -> CalculationResult {
        let expression = format!("matrix_{op}");
        settle(
            OperationType::Matrix,
            &expression,
            "matrix error",
            self.try_matrix(&expression, op, a, b),
        )
    }

    fn try_matrix(
        &self,
        expression: &str,
        op: MatrixOp,
        a: &Matrix,
        b: Option<&Matrix>,
    ) -> CalcResult<CalculationResult> {
        let literal = op.expression(a, b)?;
        let value = self.backend.evaluate(&literal, &[])?;
        let result = value.to_string();

        let mut steps = vec![format!("Matrix A: {a}")];
        if let Some(b) = b.filter(|_| op.needs_operand()) {
            steps.push(format!("Matrix B: {b}"));
        }
        steps.push(match op {
            MatrixOp::Determinant => format!("Determinant: det(A) = {result}"),
            MatrixOp::Inverse => format!("Inverse: A⁻¹ = {result}"),
            MatrixOp::Transpose => format!("Transpose: Aᵀ = {result}"),
            MatrixOp::Multiply => format!("Product: A × B = {result}"),
            MatrixOp::Add => format!("Sum: A + B = {result}"),
        });
        Ok(CalculationResult::success(
            OperationType::Matrix,
            expression,
            result,
            steps,
        ))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn engine() -> Engine {
        Engine::default()
    }

    fn m(rows: &[&[f64]]) -> Matrix {
        Matrix::from_rows(rows.iter().map(|r| r.to_vec()).collect()).unwrap()
    }

    #[test]
    fn test_basic_steps() {
        let r = engine().evaluate_expression("2×3 + √(16)");
        assert_eq!(r.result, "10");
        assert_eq!(r.expression, "2*3 + sqrt(16)");
        assert_eq!(
            r.steps,
            vec!["Input: 2×3 + √(16)", "Normalized: 2*3 + sqrt(16)", "Result: 10"]
        );
        assert_eq!(r.operation_type, OperationType::Basic);
        assert!(r.error.is_none());
    }

    #[test]
    fn test_basic_failure_shape() {
        let r = engine().evaluate_expression("2 +");
        assert!(r.is_error());
        assert!(r.steps.is_empty());
        assert!(r.result.is_empty());
        assert_eq!(r.operation_type, OperationType::Basic);
        assert!(r.error.unwrap().starts_with("calculation error: "));
    }

    #[test]
    fn test_derivative_is_simplified() {
        let r = engine().calculate_derivative("x^2", "x");
        assert_eq!(r.result.replace(' ', ""), "2*x");
        assert_eq!(r.steps[1], "Differentiate: d/dx(x^2)");
        assert_eq!(r.steps[2], format!("Derivative: f'(x) = {}", r.result));
    }

    #[test]
    fn test_exponential_derivative_is_itself() {
        let r = engine().calculate_derivative("e^x", "x");
        assert!(r.error.is_none(), "{:?}", r.error);
        assert_eq!(r.result.replace(' ', ""), "e^x");
        assert_eq!(engine().calculate_integral("e^x", "x").result, "e^x");
    }

    #[test]
    fn test_inverse_has_no_rounding_noise() {
        let r = engine().calculate_matrix(MatrixOp::Inverse, &m(&[&[1.0, 2.0], &[3.0, 4.0]]), None);
        assert_eq!(r.result, "[[-2,1],[1.5,-0.5]]");
    }

    #[test]
    fn test_integral() {
        let r = engine().calculate_integral("cos(t)", "t");
        assert_eq!(r.result, "sin(t)");
        assert_eq!(r.steps[1], "Integrate: ∫cos(t) dt");
        let bad = engine().calculate_integral("x * exp(x)", "x");
        assert!(bad.error.unwrap().starts_with("integral error: "));
    }

    #[test]
    fn test_equation_ordering() {
        let r = engine().solve_equation("x^2 - x - 6 = 0", "x");
        assert_eq!(r.result, "[-2, 3]");
        assert_eq!(r.steps[2], "Solutions: x = [-2, 3]");
        assert_eq!(engine().solve_equation("x^2 + 1 = 1 + x^2 + 3", "x").result, "[]");
    }

    #[test]
    fn test_statistics() {
        let r = engine().calculate_statistics(&[1.0, 2.0, 3.0, 4.0, 5.0]);
        assert_eq!(r.expression, "stats([1, 2, 3, 4, 5])");
        assert_eq!(r.steps[2], "Mean: (1 + 2 + 3 + 4 + 5) / 5 = 3");
        let v: serde_json::Value = serde_json::from_str(&r.result).unwrap();
        assert_eq!(v["mean"], 3.0);
        assert_eq!(v["variance"], 2.0);
        assert_eq!(v["standardDeviation"], 2f64.sqrt());
        assert_eq!(v["count"], 5);

        let empty = engine().calculate_statistics(&[]);
        assert!(empty.error.unwrap().starts_with("statistics error: "));
    }

    #[test]
    fn test_statistics_never_report_null() {
        let big = engine().calculate_statistics(&[1e308, 1e308]);
        let v: serde_json::Value = serde_json::from_str(&big.result).unwrap();
        assert_eq!(v["mean"], 1e308);
        assert_eq!(v["variance"], 0.0);

        let spread = engine().calculate_statistics(&[1e308, -1e308]);
        assert!(spread.result.is_empty());
        assert!(spread.error.unwrap().starts_with("statistics error: "));
    }

    #[test]
    fn test_matrix_operations() {
        let a = m(&[&[1.0, 2.0], &[3.0, 4.0]]);
        let b = m(&[&[5.0, 6.0], &[7.0, 8.0]]);
        let e = engine();
        assert_eq!(e.calculate_matrix(MatrixOp::Determinant, &a, None).result, "-2");
        let sum = e.calculate_matrix(MatrixOp::Add, &a, Some(&b));
        assert_eq!(sum.result, "[[6,8],[10,12]]");
        assert_eq!(sum.expression, "matrix_add");
        assert_eq!(sum.steps.len(), 3);
        assert_eq!(
            e.calculate_matrix(MatrixOp::Multiply, &a, Some(&b)).result,
            "[[19,22],[43,50]]"
        );
    }

    #[test]
    fn test_matrix_errors() {
        let rect = m(&[&[1.0, 2.0, 3.0], &[4.0, 5.0, 6.0]]);
        let e = engine();
        let det = e.calculate_matrix(MatrixOp::Determinant, &rect, None);
        assert!(det.error.unwrap().contains("dimension error"));
        let add = e.calculate_matrix(MatrixOp::Add, &rect, None);
        assert!(add.error.unwrap().contains("missing operand"));
        let singular = e.calculate_matrix(MatrixOp::Inverse, &m(&[&[1.0, 2.0], &[2.0, 4.0]]), None);
        assert!(singular.is_error());
    }

    #[test]
    fn test_graph_results() {
        let r = engine().generate_graph("1/x", GraphRange::DEFAULT);
        assert_eq!(r.operation_type, OperationType::Graph);
        assert_eq!(r.steps[1], "Domain: [-10, 10]");
        let series = r.graph_data.unwrap();
        assert!(series.is_well_formed());
        assert_eq!(series.point_count(), 200);

        let bad = engine().generate_graph("sin(", GraphRange::DEFAULT);
        assert!(bad.graph_data.is_none());
        assert!(bad.error.unwrap().starts_with("graph error: "));
    }

    #[test]
    fn test_surface_result() {
        let r = engine().generate_surface("x^2 - y^2", GraphRange::DEFAULT);
        match r.graph_data.unwrap() {
            GraphSeries::Surface { x, y, z } => {
                assert_eq!(z.len(), x.len());
                assert!(z.iter().all(|row| row.len() == y.len()));
            }
            other => panic!("expected surface, got {other:?}"),
        }
    }

    #[test]
    fn test_custom_sampler() {
        let e = engine().with_sampler(Sampler {
            samples: 10,
            divisions: 4,
        });
        let r = e.generate_graph("x", GraphRange::DEFAULT);
        assert_eq!(r.graph_data.unwrap().point_count(), 11);
    }
}
