use thiserror::Error;

#[derive(Debug, Error)]
pub enum CalcError {
    #[error("evaluation error: {0}")]
    Evaluation(String),

    #[error("symbolic error: {0}")]
    Symbolic(String),

    #[error("dimension error: {0}")]
    Dimension(String),

    #[error("missing operand: {0}")]
    MissingOperand(String),

    #[error("service error: {0}")]
    Service(String),

    #[error("storage error: {0}")]
    Storage(String),

    #[error("migration error: {0}")]
    Migration(String),

    #[error("serialization error: {0}")]
    Serialization(#[from] serde_json::Error),
}

pub type CalcResult<T> = Result<T, CalcError>;
