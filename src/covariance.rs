//! Covariance estimation over trailing return windows.

use crate::error::{PortfolioError, Result};
use crate::matrix;
use nalgebra::{DMatrix, DVector};

/// Column means of a returns window.
pub fn column_means(window: &DMatrix<f64>) -> DVector<f64> {
    let t = window.nrows() as f64;
    DVector::from_iterator(window.ncols(), window.column_iter().map(|c| c.sum() / t))
}

/// Unbiased sample covariance of a T'xN returns window (divisor T'-1,
/// per-column mean subtracted). The output is symmetrised to absorb
/// floating-point asymmetry in the accumulation.
pub fn sample_covariance(window: &DMatrix<f64>) -> Result<DMatrix<f64>> {
    let t = window.nrows();
    let n = window.ncols();
    if t < 2 {
        return Err(PortfolioError::InvalidInput(format!(
            "covariance needs at least 2 observations, got {}",
            t
        )));
    }

    let means = column_means(window);
    let mut centered = window.clone();
    for (j, mean) in means.iter().enumerate() {
        for i in 0..t {
            centered[(i, j)] -= mean;
        }
    }

    let cov = (centered.transpose() * &centered) / (t as f64 - 1.0);
    debug_assert_eq!(cov.nrows(), n);
    Ok(matrix::symmetrize(&cov))
}

/// Covariance of returns in excess of an aligned benchmark slice.
pub fn excess_covariance(window: &DMatrix<f64>, benchmark: &DVector<f64>) -> Result<DMatrix<f64>> {
    if benchmark.len() != window.nrows() {
        return Err(PortfolioError::shape(
            "excess_covariance",
            format!(
                "benchmark slice of length {} does not align with {} observations",
                benchmark.len(),
                window.nrows()
            ),
        ));
    }

    let mut excess = window.clone();
    for i in 0..window.nrows() {
        for j in 0..window.ncols() {
            excess[(i, j)] -= benchmark[i];
        }
    }
    sample_covariance(&excess)
}

/// Exponentially weighted covariance with decay `lambda` in (0, 1).
/// Recent observations receive weight 1, older ones lambda^age; the
/// accumulated outer products are normalised by the weight sum.
pub fn ewma_covariance(window: &DMatrix<f64>, lambda: f64) -> Result<DMatrix<f64>> {
    if !(0.0..1.0).contains(&lambda) {
        return Err(PortfolioError::InvalidInput(format!(
            "EWMA decay must be in [0, 1), got {}",
            lambda
        )));
    }
    let t = window.nrows();
    let n = window.ncols();
    if t < 2 {
        return Err(PortfolioError::InvalidInput(format!(
            "covariance needs at least 2 observations, got {}",
            t
        )));
    }

    let mut cov = DMatrix::zeros(n, n);
    let mut weight_sum = 0.0;
    for i in (0..t).rev() {
        let weight = lambda.powi((t - 1 - i) as i32);
        weight_sum += weight;
        let row = window.row(i);
        for j in 0..n {
            for k in 0..n {
                cov[(j, k)] += weight * row[j] * row[k];
            }
        }
    }
    cov /= weight_sum;
    Ok(matrix::symmetrize(&cov))
}
