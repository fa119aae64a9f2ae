//! Closed-form Markowitz solver and efficient-frontier sweep.
//!
//! The fully-invested mean-variance problem
//!
//! ```text
//!   minimise wᵀΣw   subject to   μᵀw = τ,  uᵀw = 1
//! ```
//!
//! has the closed-form solution
//!
//! ```text
//!   w = [Σ⁻¹u·(A − Bτ) + Σ⁻¹μ·(Cτ − B)] / (AC − B²)
//! ```
//!
//! with A = μᵀΣ⁻¹μ, B = μᵀΣ⁻¹u, C = uᵀΣ⁻¹u. Tracking-error optimisation
//! is the same problem with the excess-return mean and covariance swapped
//! in. No iterative optimiser is involved; feasibility against position,
//! sector and risk limits is the constraint projector's job.

use crate::error::{PortfolioError, Result};
use crate::matrix;
use nalgebra::{DMatrix, DVector};
use rayon::prelude::*;
use serde::{Deserialize, Serialize};
use tracing::warn;

/// Magnitude below which the frontier discriminant D = A − B²/C is
/// treated as degenerate (μ collinear with the unit vector).
pub const DEGENERACY_TOLERANCE: f64 = 1e-12;

/// Relative floor for the discriminant: D below this fraction of the
/// terms it is the difference of loses enough precision to poison the
/// weights, so the frontier is treated as degenerate there too.
const RELATIVE_DEGENERACY: f64 = 1e-6;

/// One point on the efficient frontier.
#[derive(Debug, Clone, Copy, Serialize, Deserialize)]
pub struct FrontierPoint {
    /// Target daily return the point was solved at.
    pub target_return: f64,
    /// Daily tracking error of the tracking-error-optimal weights.
    pub tracking_error: f64,
    /// Daily volatility of the mean-variance-optimal weights.
    pub volatility: f64,
}

/// Solution of one closed-form optimisation.
#[derive(Debug, Clone)]
pub struct MarkowitzSolution {
    /// Optimal fully-invested weights. May contain shorts and weights
    /// above one; feasibility is enforced downstream.
    pub weights: DVector<f64>,
    /// Return of the global minimum-variance portfolio (B/C).
    pub min_variance_return: f64,
    /// Variance of the global minimum-variance portfolio (1/C).
    pub min_variance: f64,
}

/// Precomputed solver terms for one (μ, Σ) pair. Lets a frontier sweep
/// invert Σ once and then evaluate many targets.
struct ClosedForm {
    inv_sigma_u: DVector<f64>,
    inv_sigma_mu: DVector<f64>,
    a: f64,
    b: f64,
    c: f64,
}

impl ClosedForm {
    fn prepare(mean: &DVector<f64>, covariance: &DMatrix<f64>) -> Result<Self> {
        matrix::check_dims(mean, covariance, "markowitz_solve")?;

        let inv_sigma = matrix::invert(covariance, "markowitz_solve")?;
        let unit = DVector::from_element(mean.len(), 1.0);

        let inv_sigma_u = &inv_sigma * &unit;
        let inv_sigma_mu = &inv_sigma * mean;

        let a = mean.dot(&inv_sigma_mu);
        let b = mean.dot(&inv_sigma_u);
        let c = unit.dot(&inv_sigma_u);

        if c.abs() < DEGENERACY_TOLERANCE {
            return Err(PortfolioError::numerical(
                "markowitz_solve",
                format!("uᵀΣ⁻¹u = {:.3e} is numerically zero", c),
            ));
        }

        let d = a - b * b / c;
        let scale = a.abs().max((b * b / c).abs());
        if d.abs() < DEGENERACY_TOLERANCE || d.abs() < RELATIVE_DEGENERACY * scale {
            return Err(PortfolioError::DegenerateFrontier(format!(
                "discriminant D = A − B²/C = {:.3e}; mean vector is collinear with the unit vector",
                d
            )));
        }

        Ok(Self {
            inv_sigma_u,
            inv_sigma_mu,
            a,
            b,
            c,
        })
    }

    fn solution_at(&self, target_return: f64) -> MarkowitzSolution {
        let delta = self.a * self.c - self.b * self.b;
        let weights = (&self.inv_sigma_u * (self.a - self.b * target_return)
            + &self.inv_sigma_mu * (self.c * target_return - self.b))
            / delta;

        MarkowitzSolution {
            weights,
            min_variance_return: self.b / self.c,
            min_variance: 1.0 / self.c,
        }
    }
}

/// Closed-form fully-invested mean-variance / tracking-error solver.
#[derive(Debug, Clone, Default)]
pub struct MarkowitzSolver;

impl MarkowitzSolver {
    pub fn new() -> Self {
        Self
    }

    /// Solve for the weights minimising wᵀΣw subject to μᵀw = τ and
    /// uᵀw = 1.
    ///
    /// For tracking-error optimisation pass the excess-return mean and
    /// excess covariance; for plain mean-variance pass the raw mean and
    /// covariance.
    pub fn solve(
        &self,
        mean: &DVector<f64>,
        covariance: &DMatrix<f64>,
        target_return: f64,
    ) -> Result<MarkowitzSolution> {
        let terms = ClosedForm::prepare(mean, covariance)?;
        Ok(terms.solution_at(target_return))
    }

    /// Sweep the efficient frontier over the given targets.
    ///
    /// Each point solves the tracking-error objective (excess inputs) for
    /// its tracking error and the mean-variance objective (raw inputs)
    /// for its volatility. Points are independent and evaluated in
    /// parallel; a point whose risk evaluation fails is logged and
    /// omitted while the sweep continues.
    pub fn sweep(&self, inputs: &FrontierInputs<'_>, targets: &[f64]) -> Result<Vec<FrontierPoint>> {
        // Invert both covariances once up front. A degenerate pair fails
        // the whole sweep; per-point failures do not.
        let excess_terms = ClosedForm::prepare(inputs.excess_mean, inputs.excess_covariance)?;
        let raw_terms = ClosedForm::prepare(inputs.mean, inputs.covariance)?;

        let points: Vec<FrontierPoint> = targets
            .par_iter()
            .filter_map(|&target| {
                let te_weights = excess_terms.solution_at(target).weights;
                let mpt_weights = raw_terms.solution_at(target).weights;

                let te_var =
                    matrix::quadratic_form(&te_weights, inputs.excess_covariance, "frontier_sweep");
                let vol_var =
                    matrix::quadratic_form(&mpt_weights, inputs.covariance, "frontier_sweep");

                match (te_var, vol_var) {
                    (Ok(te), Ok(vol)) if te >= 0.0 && vol >= 0.0 => Some(FrontierPoint {
                        target_return: target,
                        tracking_error: te.sqrt(),
                        volatility: vol.sqrt(),
                    }),
                    _ => {
                        warn!(target_return = target, "omitting frontier point that failed to evaluate");
                        None
                    }
                }
            })
            .collect();

        Ok(points)
    }

    /// Equally spaced target grid for a frontier sweep.
    pub fn target_grid(start: f64, step: f64, points: usize) -> Vec<f64> {
        (0..points).map(|i| start + i as f64 * step).collect()
    }

    /// Target grid spanning [min(μ), max(μ)] with the given number of
    /// points.
    pub fn target_grid_spanning(mean: &DVector<f64>, points: usize) -> Vec<f64> {
        let lo = mean.min();
        let hi = mean.max();
        if points <= 1 {
            return vec![lo];
        }
        let step = (hi - lo) / (points as f64 - 1.0);
        (0..points).map(|i| lo + i as f64 * step).collect()
    }
}

/// Borrowed inputs for a frontier sweep.
#[derive(Debug, Clone, Copy)]
pub struct FrontierInputs<'a> {
    pub mean: &'a DVector<f64>,
    pub covariance: &'a DMatrix<f64>,
    pub excess_mean: &'a DVector<f64>,
    pub excess_covariance: &'a DMatrix<f64>,
}
