//! Matrix operations on top of `nalgebra`, with shape checks reported as
//! [`CalcError::Dimension`] instead of panics.

use nalgebra::DMatrix;

use calq_core::{CalcError, CalcResult, Matrix};

/// Entries smaller than this fraction of the largest entry are noise.
const RELATIVE_EPS: f64 = 1e-12;

/// Significant digits kept when cleaning decomposition results.
const SIGNIFICANT: usize = 12;

fn to_dense(m: &Matrix) -> DMatrix<f64> {
    DMatrix::from_row_slice(m.rows(), m.cols(), m.data())
}

fn from_dense(m: &DMatrix<f64>) -> CalcResult<Matrix> {
    let data = (0..m.nrows())
        .flat_map(|i| (0..m.ncols()).map(move |j| m[(i, j)]))
        .collect();
    Matrix::new(m.nrows(), m.ncols(), data)
}

/// Round to [`SIGNIFICANT`] digits so `1.4999999999999998` reads `1.5`.
fn tidy(v: f64) -> f64 {
    if !v.is_finite() || v == 0.0 {
        return v;
    }
    format!("{v:.prec$e}", prec = SIGNIFICANT - 1)
        .parse::<f64>()
        // avoid -0
        .map(|t| t + 0.0)
        .unwrap_or(v)
}

fn largest(m: &DMatrix<f64>) -> f64 {
    m.iter().fold(0.0_f64, |acc, v| acc.max(v.abs()))
}

/// Zero out entries that are rounding noise relative to the matrix scale,
/// tidy the rest.
fn clean(m: DMatrix<f64>) -> DMatrix<f64> {
    let floor = largest(&m) * RELATIVE_EPS;
    m.map(|v| if v.abs() <= floor { 0.0 } else { tidy(v) })
}

fn same_shape(a: &Matrix, b: &Matrix, op: &str) -> CalcResult<()> {
    if a.rows() != b.rows() || a.cols() != b.cols() {
        return Err(CalcError::Dimension(format!(
            "cannot {op} a {}x{} matrix and a {}x{} matrix",
            a.rows(),
            a.cols(),
            b.rows(),
            b.cols()
        )));
    }
    Ok(())
}

fn require_square(m: &Matrix, op: &str) -> CalcResult<()> {
    if !m.is_square() {
        return Err(CalcError::Dimension(format!(
            "{op} needs a square matrix, got {}x{}",
            m.rows(),
            m.cols()
        )));
    }
    Ok(())
}

pub fn add(a: &Matrix, b: &Matrix) -> CalcResult<Matrix> {
    same_shape(a, b, "add")?;
    from_dense(&(to_dense(a) + to_dense(b)))
}

pub fn multiply(a: &Matrix, b: &Matrix) -> CalcResult<Matrix> {
    if a.cols() != b.rows() {
        return Err(CalcError::Dimension(format!(
            "cannot multiply a {}x{} matrix by a {}x{} matrix",
            a.rows(),
            a.cols(),
            b.rows(),
            b.cols()
        )));
    }
    from_dense(&(to_dense(a) * to_dense(b)))
}

pub fn transpose(m: &Matrix) -> CalcResult<Matrix> {
    from_dense(&to_dense(m).transpose())
}

pub fn trace(m: &Matrix) -> CalcResult<f64> {
    require_square(m, "trace")?;
    Ok(to_dense(m).trace())
}

fn dense_determinant(d: &DMatrix<f64>) -> f64 {
    let det = d.determinant();
    // relative to the largest product of n entries
    let scale = largest(d).powi(d.nrows() as i32);
    if scale.is_finite() && det.abs() <= scale * RELATIVE_EPS {
        0.0
    } else {
        tidy(det)
    }
}

pub fn determinant(m: &Matrix) -> CalcResult<f64> {
    require_square(m, "determinant")?;
    Ok(dense_determinant(&to_dense(m)))
}

pub fn inverse(m: &Matrix) -> CalcResult<Matrix> {
    require_square(m, "inverse")?;
    let d = to_dense(m);
    let singular = || CalcError::Evaluation("matrix is singular and has no inverse".into());
    if dense_determinant(&d) == 0.0 {
        return Err(singular());
    }
    let inv = d.try_inverse().ok_or_else(singular)?;
    from_dense(&clean(inv))
}

/// Integer power by repeated squaring. Negative exponents go through the inverse.
pub fn power(m: &Matrix, exponent: i64) -> CalcResult<Matrix> {
    require_square(m, "matrix power")?;
    let mut base = if exponent < 0 {
        to_dense(&inverse(m)?)
    } else {
        to_dense(m)
    };
    let mut e = exponent.unsigned_abs();
    let mut acc = DMatrix::<f64>::identity(m.rows(), m.rows());
    while e > 0 {
        if e & 1 == 1 {
            acc = &acc * &base;
        }
        base = &base * &base;
        e >>= 1;
    }
    from_dense(&acc)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn m(rows: &[&[f64]]) -> Matrix {
        Matrix::from_rows(rows.iter().map(|r| r.to_vec()).collect()).unwrap()
    }

    #[test]
    fn test_determinant() {
        assert_eq!(determinant(&m(&[&[1.0, 2.0], &[3.0, 4.0]])).unwrap(), -2.0);
        assert_eq!(determinant(&m(&[&[2.0, 4.0], &[1.0, 2.0]])).unwrap(), 0.0);
        let d = determinant(&m(&[&[2.0, 0.0, 1.0], &[1.0, 3.0, 2.0], &[1.0, 1.0, 2.0]])).unwrap();
        assert_eq!(d, 6.0);
    }

    #[test]
    fn test_inverse_is_exact_for_simple_fractions() {
        let inv = inverse(&m(&[&[1.0, 2.0], &[3.0, 4.0]])).unwrap();
        assert_eq!(inv.to_rows(), vec![vec![-2.0, 1.0], vec![1.5, -0.5]]);
        assert_eq!(inv.to_string(), "[[-2,1],[1.5,-0.5]]");

        let inv = inverse(&m(&[&[4.0, 7.0], &[2.0, 6.0]])).unwrap();
        assert_eq!(inv.to_rows(), vec![vec![0.6, -0.7], vec![-0.2, 0.4]]);
    }

    #[test]
    fn test_inverse_round_trips() {
        let a = m(&[&[2.0, 0.0, 1.0], &[1.0, 3.0, 2.0], &[1.0, 1.0, 2.0]]);
        let back = multiply(&inverse(&a).unwrap(), &a).unwrap();
        for (got, want) in back.data().iter().zip(Matrix::identity(3).data()) {
            assert!((got - want).abs() < 1e-12, "{got} != {want}");
        }
    }

    #[test]
    fn test_singular_inverse_fails() {
        let err = inverse(&m(&[&[1.0, 2.0], &[2.0, 4.0]])).unwrap_err();
        assert!(matches!(err, CalcError::Evaluation(_)));
    }

    #[test]
    fn test_non_square_is_dimension_error() {
        let rect = m(&[&[1.0, 2.0, 3.0], &[4.0, 5.0, 6.0]]);
        assert!(matches!(determinant(&rect), Err(CalcError::Dimension(_))));
        assert!(matches!(inverse(&rect), Err(CalcError::Dimension(_))));
        assert!(matches!(trace(&rect), Err(CalcError::Dimension(_))));
        assert!(matches!(multiply(&rect, &rect), Err(CalcError::Dimension(_))));
    }

    #[test]
    fn test_transpose_multiply_and_power() {
        let rect = m(&[&[1.0, 2.0, 3.0], &[4.0, 5.0, 6.0]]);
        let t = transpose(&rect).unwrap();
        assert_eq!(t.to_rows(), vec![vec![1.0, 4.0], vec![2.0, 5.0], vec![3.0, 6.0]]);
        assert_eq!(multiply(&rect, &t).unwrap().to_rows(), vec![vec![14.0, 32.0], vec![32.0, 77.0]]);
        let sq = m(&[&[1.0, 1.0], &[0.0, 1.0]]);
        assert_eq!(power(&sq, 3).unwrap().to_rows(), vec![vec![1.0, 3.0], vec![0.0, 1.0]]);
        assert_eq!(power(&sq, -2).unwrap().to_rows(), vec![vec![1.0, -2.0], vec![0.0, 1.0]]);
        assert_eq!(power(&sq, 0).unwrap(), Matrix::identity(2));
    }
}
