use std::fmt;

use serde::{Deserialize, Serialize};

use crate::error::{CalcError, CalcResult};

/// Dense row-major matrix of reals.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(try_from = "Vec<Vec<f64>>", into = "Vec<Vec<f64>>")]
pub struct Matrix {
    rows: usize,
    cols: usize,
    data: Vec<f64>,
}

impl Matrix {
    pub fn new(rows: usize, cols: usize, data: Vec<f64>) -> CalcResult<Self> {
        if rows == 0 || cols == 0 {
            return Err(CalcError::Dimension("matrix must not be empty".into()));
        }
        if data.len() != rows * cols {
            return Err(CalcError::Dimension(format!(
                "expected {} elements for a {rows}x{cols} matrix, got {}",
                rows * cols,
                data.len()
            )));
        }
        Ok(Self { rows, cols, data })
    }

    /// Build from nested rows. Ragged or empty input is a dimension error.
    pub fn from_rows(rows: Vec<Vec<f64>>) -> CalcResult<Self> {
        let cols = rows.first().map(Vec::len).unwrap_or(0);
        if let Some(bad) = rows.iter().position(|r| r.len() != cols) {
            return Err(CalcError::Dimension(format!(
                "row {bad} has {} columns, expected {cols}",
                rows[bad].len()
            )));
        }
        let n = rows.len();
        Self::new(n, cols, rows.into_iter().flatten().collect())
    }

    pub fn identity(n: usize) -> Self {
        let mut data = vec![0.0; n * n];
        for i in 0..n {
            data[i * n + i] = 1.0;
        }
        Self {
            rows: n,
            cols: n,
            data,
        }
    }

    pub fn rows(&self) -> usize {
        self.rows
    }

    pub fn cols(&self) -> usize {
        self.cols
    }

    pub fn is_square(&self) -> bool {
        self.rows == self.cols
    }

    pub fn get(&self, row: usize, col: usize) -> f64 {
        self.data[row * self.cols + col]
    }

    pub fn set(&mut self, row: usize, col: usize, value: f64) {
        self.data[row * self.cols + col] = value;
    }

    pub fn data(&self) -> &[f64] {
        &self.data
    }

    pub fn to_rows(&self) -> Vec<Vec<f64>> {
        self.data.chunks(self.cols).map(<[f64]>::to_vec).collect()
    }

    pub fn map(&self, f: impl Fn(f64) -> f64) -> Self {
        Self {
            rows: self.rows,
            cols: self.cols,
            data: self.data.iter().map(|&v| f(v)).collect(),
        }
    }

    /// Literal syntax understood by the evaluator, e.g. `[[1,2],[3,4]]`.
    /// Also valid JSON as long as every element is finite.
    pub fn to_literal(&self) -> String {
        let rows: Vec<String> = self
            .data
            .chunks(self.cols)
            .map(|row| {
                let cells: Vec<String> = row.iter().map(|&v| format_number(v)).collect();
                format!("[{}]", cells.join(","))
            })
            .collect();
        format!("[{}]", rows.join(","))
    }
}

impl TryFrom<Vec<Vec<f64>>> for Matrix {
    type Error = CalcError;

    fn try_from(rows: Vec<Vec<f64>>) -> Result<Self, Self::Error> {
        Self::from_rows(rows)
    }
}

impl From<Matrix> for Vec<Vec<f64>> {
    fn from(m: Matrix) -> Self {
        m.to_rows()
    }
}

impl fmt::Display for Matrix {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.to_literal())
    }
}

/// Result of a numeric evaluation.
#[derive(Debug, Clone, PartialEq)]
pub enum Value {
    Number(f64),
    Matrix(Matrix),
}

impl Value {
    pub fn as_number(&self) -> Option<f64> {
        match self {
            Self::Number(n) => Some(*n),
            Self::Matrix(_) => None,
        }
    }

    pub fn as_matrix(&self) -> Option<&Matrix> {
        match self {
            Self::Number(_) => None,
            Self::Matrix(m) => Some(m),
        }
    }
}

impl fmt::Display for Value {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Number(n) => f.write_str(&format_number(*n)),
            Self::Matrix(m) => write!(f, "{m}"),
        }
    }
}

/// Render a float the way a calculator display does: integral values
/// without a fractional part, very large magnitudes in exponent form.
pub fn format_number(n: f64) -> String {
    if n.is_nan() {
        return "NaN".into();
    }
    if n.is_infinite() {
        return if n > 0.0 { "Infinity" } else { "-Infinity" }.into();
    }
    if n.abs() >= 1e21 {
        return format!("{n:e}");
    }
    if n == n.trunc() && n.abs() < 1e15 {
        // also folds -0 into 0
        return format!("{}", n as i64);
    }
    format!("{n}")
}

/// Round every decimal fraction in `text` to at most `places` digits.
///
/// Works on already-rendered results so it applies equally to scalars,
/// matrix literals and solution lists. Fractions already short enough are
/// left as written; rounded ones lose their trailing zeros.
pub fn format_decimals(text: &str, places: usize) -> String {
    let chars: Vec<char> = text.chars().collect();
    let mut out = String::with_capacity(text.len());
    let mut i = 0;
    while i < chars.len() {
        let starts_number = chars[i].is_ascii_digit()
            && (i == 0 || !(chars[i - 1].is_ascii_digit() || chars[i - 1] == '.'));
        if !starts_number {
            out.push(chars[i]);
            i += 1;
            continue;
        }
        let start = i;
        while i < chars.len() && chars[i].is_ascii_digit() {
            i += 1;
        }
        let mut fraction = 0;
        if i + 1 < chars.len() && chars[i] == '.' && chars[i + 1].is_ascii_digit() {
            i += 1;
            while i < chars.len() && chars[i].is_ascii_digit() {
                i += 1;
                fraction += 1;
            }
        }
        let token: String = chars[start..i].iter().collect();
        match (fraction > places, token.parse::<f64>()) {
            (true, Ok(v)) => {
                let rounded = round_to(v, places);
                if rounded == "0" {
                    drop_unary_minus(&mut out);
                }
                out.push_str(&rounded);
            }
            _ => out.push_str(&token),
        }
    }
    out
}

fn round_to(v: f64, places: usize) -> String {
    let s = format!("{v:.places$}");
    if s.contains('.') {
        s.trim_end_matches('0').trim_end_matches('.').to_string()
    } else {
        s
    }
}

/// `-0.00001` rounds to `0`, not `-0`. A minus after an operand is binary
/// and stays.
fn drop_unary_minus(out: &mut String) {
    let mut tail = out.chars().rev();
    if tail.next() != Some('-') {
        return;
    }
    let unary = match tail.next() {
        None => true,
        Some(c) => !(c.is_alphanumeric() || c == ')' || c == '_'),
    };
    if unary {
        out.pop();
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_format_number() {
        assert_eq!(format_number(3.0), "3");
        assert_eq!(format_number(-0.0), "0");
        assert_eq!(format_number(0.5), "0.5");
        assert_eq!(format_number(-2.0), "-2");
        assert_eq!(format_number(f64::INFINITY), "Infinity");
        assert_eq!(format_number(1e22), "1e22");
    }

    #[test]
    fn test_matrix_from_rows_rejects_ragged() {
        let err = Matrix::from_rows(vec![vec![1.0, 2.0], vec![3.0]]).unwrap_err();
        assert!(matches!(err, CalcError::Dimension(_)));
        assert!(Matrix::from_rows(vec![]).is_err());
    }

    #[test]
    fn test_matrix_literal() {
        let m = Matrix::from_rows(vec![vec![1.0, 2.0], vec![3.0, 4.5]]).unwrap();
        assert_eq!(m.to_literal(), "[[1,2],[3,4.5]]");
        assert_eq!(m.rows(), 2);
        assert!(m.is_square());
    }

    #[test]
    fn test_matrix_serde() {
        let m: Matrix = serde_json::from_str("[[1,2,3],[4,5,6]]").unwrap();
        assert_eq!(m.cols(), 3);
        assert_eq!(m.get(1, 2), 6.0);
        assert!(serde_json::from_str::<Matrix>("[[1,2],[3]]").is_err());
    }

    #[test]
    fn test_format_decimals_rounds_to_nearest() {
        assert_eq!(format_decimals("1.4999999999999998", 8), "1.5");
        assert_eq!(
            format_decimals("[[-2,1],[1.4999999999999998,-0.49999999999999994]]", 4),
            "[[-2,1],[1.5,-0.5]]"
        );
        assert_eq!(format_decimals("9.9996", 3), "10");
        assert_eq!(format_decimals("-0.00001", 4), "0");
        assert_eq!(format_decimals("x = [-0.00001, 2]", 4), "x = [0, 2]");
        assert_eq!(format_decimals("x-0.00001", 4), "x-0");
        assert_eq!(format_decimals("1.23456e-7", 2), "1.23e-7");
    }

    #[test]
    fn test_format_decimals() {
        assert_eq!(format_decimals("0.333333333333", 4), "0.3333");
        assert_eq!(format_decimals("[[1.23456,2],[3,4.5]]", 2), "[[1.23,2],[3,4.5]]");
        assert_eq!(format_decimals("2.75", 0), "3");
        assert_eq!(format_decimals("x = 1.5", 8), "x = 1.5");
        assert_eq!(format_decimals("1e-7", 2), "1e-7");
    }
}
