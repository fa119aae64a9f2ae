//! Dense linear-algebra helpers shared by the estimators and the solver.
//!
//! The engine works on `nalgebra` dynamic matrices throughout. The helpers
//! here add the shape and conditioning checks the numerical kernels rely
//! on: a guarded inverse, quadratic forms, symmetrisation, and trailing
//! window slicing over a returns panel.

use crate::error::{PortfolioError, Result};
use nalgebra::{DMatrix, DVector};

/// Normalised determinant magnitude below which a covariance matrix is
/// treated as singular. The determinant is scaled by the product of the
/// diagonal entries, so the test is invariant to the units of the
/// returns (a raw determinant threshold would reject every
/// daily-return covariance once N grows).
pub const DET_TOLERANCE: f64 = 1e-12;

/// Invert a square matrix, failing if it is singular or near-singular.
pub fn invert(matrix: &DMatrix<f64>, operation: &str) -> Result<DMatrix<f64>> {
    if !matrix.is_square() {
        return Err(PortfolioError::shape(
            operation,
            format!("expected square matrix, got {}x{}", matrix.nrows(), matrix.ncols()),
        ));
    }

    let det = matrix.determinant();
    let diag_scale: f64 = matrix
        .diagonal()
        .iter()
        .map(|d| d.abs())
        .product::<f64>()
        .max(f64::MIN_POSITIVE);
    let conditioning = det / diag_scale;
    if !det.is_finite() || conditioning.abs() < DET_TOLERANCE {
        return Err(PortfolioError::numerical(
            operation,
            format!(
                "matrix is singular or ill-conditioned (|det|/diag = {:.3e})",
                conditioning.abs()
            ),
        ));
    }

    matrix.clone().try_inverse().ok_or_else(|| {
        PortfolioError::numerical(operation, "matrix inversion failed".to_string())
    })
}

/// Compute the quadratic form wᵀ M w.
pub fn quadratic_form(weights: &DVector<f64>, matrix: &DMatrix<f64>, operation: &str) -> Result<f64> {
    check_dims(weights, matrix, operation)?;
    Ok((weights.transpose() * matrix * weights)[(0, 0)])
}

/// Symmetrise a matrix by averaging with its transpose. Absorbs the
/// floating-point asymmetry the covariance accumulation can leave behind.
pub fn symmetrize(matrix: &DMatrix<f64>) -> DMatrix<f64> {
    (matrix + matrix.transpose()) * 0.5
}

/// Slice the trailing `size` rows of a panel, ending at row `end`
/// (exclusive). Fails when the requested window does not fit.
pub fn trailing_rows(panel: &DMatrix<f64>, end: usize, size: usize) -> Result<DMatrix<f64>> {
    if size == 0 {
        return Err(PortfolioError::InvalidInput(
            "window size must be positive".to_string(),
        ));
    }
    if end > panel.nrows() || end < size {
        return Err(PortfolioError::shape(
            "trailing_rows",
            format!(
                "window [{}, {}) does not fit a panel with {} rows",
                end.saturating_sub(size),
                end,
                panel.nrows()
            ),
        ));
    }
    Ok(panel.rows(end - size, size).into_owned())
}

/// Check that a weight vector conforms to a matrix.
pub fn check_dims(weights: &DVector<f64>, matrix: &DMatrix<f64>, operation: &str) -> Result<()> {
    if matrix.nrows() != weights.len() || matrix.ncols() != weights.len() {
        return Err(PortfolioError::shape(
            operation,
            format!(
                "weights of length {} incompatible with {}x{} matrix",
                weights.len(),
                matrix.nrows(),
                matrix.ncols()
            ),
        ));
    }
    Ok(())
}

/// Check that two vectors have equal length.
pub fn check_same_len(a: &DVector<f64>, b: &DVector<f64>, operation: &str) -> Result<()> {
    if a.len() != b.len() {
        return Err(PortfolioError::shape(
            operation,
            format!("vector lengths differ: {} vs {}", a.len(), b.len()),
        ));
    }
    Ok(())
}
