use std::fmt;
use std::str::FromStr;

use calq_core::{CalcError, CalcResult, Matrix};

/// Matrix operations exposed by the engine. The numeric work happens in
/// the backend; this only builds the evaluator expression.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum MatrixOp {
    Add,
    Multiply,
    Determinant,
    Inverse,
    Transpose,
}

impl MatrixOp {
    pub fn needs_operand(&self) -> bool {
        matches!(self, Self::Add | Self::Multiply)
    }

    pub fn needs_square(&self) -> bool {
        matches!(self, Self::Determinant | Self::Inverse)
    }

    /// Check preconditions and build the evaluator expression.
    pub fn expression(&self, a: &Matrix, b: Option<&Matrix>) -> CalcResult<String> {
        if self.needs_square() && !a.is_square() {
            return Err(CalcError::Dimension(format!(
                "{self} needs a square matrix, got {}x{}",
                a.rows(),
                a.cols()
            )));
        }
        let a = a.to_literal();
        Ok(match self {
            Self::Determinant => format!("det({a})"),
            Self::Inverse => format!("inv({a})"),
            Self::Transpose => format!("transpose({a})"),
            Self::Add | Self::Multiply => {
                let b = b
                    .ok_or_else(|| CalcError::MissingOperand(format!("{self} needs matrix B")))?
                    .to_literal();
                let op = if *self == Self::Add { '+' } else { '*' };
                format!("{a} {op} {b}")
            }
        })
    }
}

impl fmt::Display for MatrixOp {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Add => write!(f, "add"),
            Self::Multiply => write!(f, "multiply"),
            Self::Determinant => write!(f, "determinant"),
            Self::Inverse => write!(f, "inverse"),
            Self::Transpose => write!(f, "transpose"),
        }
    }
}

impl FromStr for MatrixOp {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "add" => Ok(Self::Add),
            "multiply" | "mul" => Ok(Self::Multiply),
            "determinant" | "det" => Ok(Self::Determinant),
            "inverse" | "inv" => Ok(Self::Inverse),
            "transpose" => Ok(Self::Transpose),
            _ => Err(format!("unknown matrix operation: {s}")),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn sample() -> Matrix {
        Matrix::from_rows(vec![vec![1.0, 2.0], vec![3.0, 4.0]]).unwrap()
    }

    #[test]
    fn test_expressions() {
        let a = sample();
        assert_eq!(MatrixOp::Determinant.expression(&a, None).unwrap(), "det([[1,2],[3,4]])");
        assert_eq!(
            MatrixOp::Add.expression(&a, Some(&a)).unwrap(),
            "[[1,2],[3,4]] + [[1,2],[3,4]]"
        );
    }

    #[test]
    fn test_preconditions() {
        let rect = Matrix::from_rows(vec![vec![1.0, 2.0, 3.0]]).unwrap();
        assert!(matches!(
            MatrixOp::Inverse.expression(&rect, None),
            Err(CalcError::Dimension(_))
        ));
        assert!(matches!(
            MatrixOp::Multiply.expression(&sample(), None),
            Err(CalcError::MissingOperand(_))
        ));
        assert!(MatrixOp::Transpose.expression(&rect, None).is_ok());
    }

    #[test]
    fn test_parse_names() {
        assert_eq!("det".parse::<MatrixOp>().unwrap(), MatrixOp::Determinant);
        assert_eq!(MatrixOp::Multiply.to_string(), "multiply");
        assert!("divide".parse::<MatrixOp>().is_err());
    }
}
