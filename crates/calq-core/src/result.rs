use serde::{Deserialize, Serialize};
use std::fmt;

use crate::graph::GraphSeries;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum OperationType {
    Basic,
    Graph,
    Derivative,
    Integral,
    Equation,
    Statistics,
    Matrix,
}

impl fmt::Display for OperationType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Basic => write!(f, "basic"),
            Self::Graph => write!(f, "graph"),
            Self::Derivative => write!(f, "derivative"),
            Self::Integral => write!(f, "integral"),
            Self::Equation => write!(f, "equation"),
            Self::Statistics => write!(f, "statistics"),
            Self::Matrix => write!(f, "matrix"),
        }
    }
}

impl std::str::FromStr for OperationType {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_lowercase().as_str() {
            "basic" => Ok(Self::Basic),
            "graph" => Ok(Self::Graph),
            "derivative" => Ok(Self::Derivative),
            "integral" => Ok(Self::Integral),
            "equation" => Ok(Self::Equation),
            "statistics" | "stats" => Ok(Self::Statistics),
            "matrix" => Ok(Self::Matrix),
            _ => Err(format!("invalid operation type: {s}")),
        }
    }
}

/// Uniform outcome of every engine operation.
///
/// `error` and a successful payload are mutually exclusive: a failed
/// result carries an empty `result` and no `steps`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CalculationResult {
    pub expression: String,
    pub result: String,
    pub steps: Vec<String>,
    pub operation_type: OperationType,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub graph_data: Option<GraphSeries>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
}

impl CalculationResult {
    pub fn success(
        operation_type: OperationType,
        expression: impl Into<String>,
        result: impl Into<String>,
        steps: Vec<String>,
    ) -> Self {
        Self {
            expression: expression.into(),
            result: result.into(),
            steps,
            operation_type,
            graph_data: None,
            error: None,
        }
    }

    pub fn failure(
        operation_type: OperationType,
        expression: impl Into<String>,
        error: impl Into<String>,
    ) -> Self {
        Self {
            expression: expression.into(),
            result: String::new(),
            steps: Vec::new(),
            operation_type,
            graph_data: None,
            error: Some(error.into()),
        }
    }

    pub fn with_graph(mut self, series: GraphSeries) -> Self {
        self.graph_data = Some(series);
        self
    }

    pub fn is_error(&self) -> bool {
        self.error.is_some()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_operation_type_roundtrip() {
        for op in [
            OperationType::Basic,
            OperationType::Graph,
            OperationType::Derivative,
            OperationType::Integral,
            OperationType::Equation,
            OperationType::Statistics,
            OperationType::Matrix,
        ] {
            assert_eq!(op.to_string().parse::<OperationType>().unwrap(), op);
        }
        assert!("calculus".parse::<OperationType>().is_err());
    }

    #[test]
    fn test_failure_has_no_payload() {
        let r = CalculationResult::failure(OperationType::Basic, "1/", "boom");
        assert!(r.is_error());
        assert!(r.result.is_empty());
        assert!(r.steps.is_empty());
    }

    #[test]
    fn test_json_field_names() {
        let r = CalculationResult::success(OperationType::Basic, "1+1", "2", vec![]);
        let json = serde_json::to_value(&r).unwrap();
        assert_eq!(json["operationType"], "basic");
        assert!(json.get("error").is_none());
        assert!(json.get("graphData").is_none());
    }
}
