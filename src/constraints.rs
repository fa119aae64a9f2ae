//! Risk constraint checks and the iterative feasibility projector.
//!
//! The projector does not solve a QP. It repeatedly applies cheap
//! correction passes (position clip, sector scale, volatility scale,
//! liquidity clip) and re-checks the enabled predicates, stopping when
//! all hold or the iteration cap is reached. Risk limits (volatility,
//! tracking error) are quoted annualised and the checks annualise the
//! daily quadratic forms with √252 to match.

use crate::data::SectorMap;
use crate::error::{PortfolioError, Result};
use crate::matrix;
use crate::metrics;
use nalgebra::{DMatrix, DVector};
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use tracing::debug;

/// Iteration cap for the projection loop.
const MAX_PROJECTION_ITERATIONS: usize = 100;

/// Slack applied to clip-style comparisons so a freshly clipped weight
/// passes its own check.
const CLIP_TOLERANCE: f64 = 1e-9;

/// Recognised constraint limits. Optional limits are only enforced when
/// set. `max_factor_exposure`, `min_sharpe` and `max_trade_size` are part
/// of the recognised set for configuration purposes but are not checked
/// by the projector.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ConstraintLimits {
    /// Upper bound per position weight.
    pub max_position_size: f64,
    /// Lower bound per position weight (negative permits shorts).
    pub min_position_size: f64,
    /// Cap on Σ|w_i| over short positions.
    pub max_short_exposure: Option<f64>,
    /// Cap on the absolute weight sum per sector.
    pub max_sector_exposure: Option<f64>,
    /// Cap on factor exposure (recognised; not enforced by the projector).
    pub max_factor_exposure: Option<f64>,
    /// Cap on |β − 1| over the estimation window.
    pub max_beta_deviation: Option<f64>,
    /// Cap on annualised portfolio volatility.
    pub max_volatility: Option<f64>,
    /// Cap on annualised tracking error.
    pub max_tracking_error: Option<f64>,
    /// Floor on the Sharpe ratio (recognised; not enforced by the projector).
    pub min_sharpe: Option<f64>,
    /// Cap on one-way turnover against the current weights.
    pub max_turnover: Option<f64>,
    /// Weight magnitude below which a position does not count as active.
    pub min_trade_size: f64,
    /// Cap per trade (recognised; not enforced by the projector).
    pub max_trade_size: Option<f64>,
    /// Portfolio notional used on the left side of the liquidity check.
    pub min_liquidity: f64,
    /// Cap on position notional as a fraction of average daily volume.
    pub max_adv_percent: Option<f64>,
    /// Minimum number of active positions.
    pub min_positions: Option<usize>,
    /// Maximum number of active positions.
    pub max_positions: Option<usize>,
}

impl Default for ConstraintLimits {
    fn default() -> Self {
        Self {
            max_position_size: 0.15,
            min_position_size: -0.05,
            max_short_exposure: None,
            max_sector_exposure: Some(0.25),
            max_factor_exposure: None,
            max_beta_deviation: None,
            max_volatility: Some(0.20),
            max_tracking_error: Some(0.06),
            min_sharpe: None,
            max_turnover: Some(0.15),
            min_trade_size: 0.0005,
            max_trade_size: None,
            min_liquidity: 1_000_000.0,
            max_adv_percent: None,
            min_positions: None,
            max_positions: None,
        }
    }
}

impl ConstraintLimits {
    /// Limits with everything disabled except wide position bounds.
    /// Useful for solver-only paths and tests.
    pub fn none() -> Self {
        Self {
            max_position_size: f64::INFINITY,
            min_position_size: f64::NEG_INFINITY,
            max_short_exposure: None,
            max_sector_exposure: None,
            max_factor_exposure: None,
            max_beta_deviation: None,
            max_volatility: None,
            max_tracking_error: None,
            min_sharpe: None,
            max_turnover: None,
            min_trade_size: 0.0005,
            max_trade_size: None,
            min_liquidity: 1_000_000.0,
            max_adv_percent: None,
            min_positions: None,
            max_positions: None,
        }
    }
}

/// Outcome of a full constraint check.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ConstraintStatus {
    pub position_limits_ok: bool,
    pub sector_limits_ok: bool,
    pub risk_limits_ok: bool,
    pub trading_limits_ok: bool,
    pub liquidity_limits_ok: bool,
    pub diversification_ok: bool,
    pub violations: Vec<String>,
}

impl Default for ConstraintStatus {
    fn default() -> Self {
        Self {
            position_limits_ok: true,
            sector_limits_ok: true,
            risk_limits_ok: true,
            trading_limits_ok: true,
            liquidity_limits_ok: true,
            diversification_ok: true,
            violations: Vec::new(),
        }
    }
}

impl ConstraintStatus {
    pub fn all_met(&self) -> bool {
        self.position_limits_ok
            && self.sector_limits_ok
            && self.risk_limits_ok
            && self.trading_limits_ok
            && self.liquidity_limits_ok
            && self.diversification_ok
    }

    fn record(&mut self, ok: bool, flag: fn(&mut Self) -> &mut bool, violation: String) {
        if !ok {
            *flag(self) = false;
            self.violations.push(violation);
        }
    }
}

/// Borrowed market state a constraint evaluation runs against.
#[derive(Debug, Clone, Copy)]
pub struct ConstraintContext<'a> {
    /// Weights held before the rebalance (turnover base).
    pub current_weights: &'a DVector<f64>,
    /// Returns window used for the beta check.
    pub returns: &'a DMatrix<f64>,
    /// Covariance over the window.
    pub covariance: &'a DMatrix<f64>,
    /// Excess covariance over the window.
    pub excess_covariance: &'a DMatrix<f64>,
    /// Benchmark slice aligned with the returns window.
    pub benchmark: &'a DVector<f64>,
    /// Asset index → sector assignment.
    pub sector_map: &'a SectorMap,
    /// Average daily volumes, in the notional units fixed at
    /// construction of the limits.
    pub adv: &'a [f64],
}

/// Constraint checker and projector.
#[derive(Debug, Clone)]
pub struct RiskConstraints {
    limits: ConstraintLimits,
    annualization_factor: f64,
}

impl RiskConstraints {
    pub fn new(limits: ConstraintLimits) -> Self {
        Self {
            limits,
            annualization_factor: (metrics::TRADING_DAYS_PER_YEAR as f64).sqrt(),
        }
    }

    pub fn limits(&self) -> &ConstraintLimits {
        &self.limits
    }

    /// Evaluate every enabled predicate, collecting named violations.
    pub fn check_all(
        &self,
        proposed: &DVector<f64>,
        ctx: &ConstraintContext<'_>,
    ) -> Result<ConstraintStatus> {
        let mut status = ConstraintStatus::default();

        status.record(
            self.check_position_limits(proposed),
            |s| &mut s.position_limits_ok,
            "position size limits violated".to_string(),
        );
        status.record(
            self.check_sector_exposure(proposed, ctx.sector_map)?,
            |s| &mut s.sector_limits_ok,
            "sector exposure limits violated".to_string(),
        );

        let risk_ok = self.check_volatility(proposed, ctx.covariance)?
            && self.check_tracking_error(proposed, ctx.excess_covariance)?
            && self.check_beta_deviation(proposed, ctx.returns, ctx.benchmark)?;
        status.record(
            risk_ok,
            |s| &mut s.risk_limits_ok,
            "risk limits violated".to_string(),
        );

        status.record(
            self.check_turnover(ctx.current_weights, proposed),
            |s| &mut s.trading_limits_ok,
            "turnover limits violated".to_string(),
        );
        status.record(
            self.check_liquidity(proposed, ctx.adv)?,
            |s| &mut s.liquidity_limits_ok,
            "liquidity constraints violated".to_string(),
        );
        status.record(
            self.check_diversification(proposed),
            |s| &mut s.diversification_ok,
            "diversification requirements not met".to_string(),
        );

        Ok(status)
    }

    /// Project proposed weights onto the feasible set.
    ///
    /// Applies the correction passes in fixed order, re-checks, and
    /// repeats up to the iteration cap. On success, a single
    /// multiplicative renormalisation restores Σw = 1; the renormalised
    /// vector is returned without re-checking (see DESIGN.md for the
    /// policy discussion).
    pub fn enforce(
        &self,
        proposed: DVector<f64>,
        ctx: &ConstraintContext<'_>,
    ) -> Result<DVector<f64>> {
        let mut weights = proposed;
        let mut last_status = ConstraintStatus::default();

        for iteration in 0..MAX_PROJECTION_ITERATIONS {
            self.clip_positions(&mut weights);
            self.scale_sectors(&mut weights, ctx.sector_map)?;
            self.scale_volatility(&mut weights, ctx.covariance)?;
            self.clip_liquidity(&mut weights, ctx.adv);

            last_status = self.check_all(&weights, ctx)?;
            if last_status.all_met() {
                debug!(iterations = iteration + 1, "constraint projection converged");
                return self.renormalize(weights);
            }
        }

        Err(PortfolioError::ConstraintsUnsatisfiable {
            iterations: MAX_PROJECTION_ITERATIONS,
            violations: last_status.violations,
        })
    }

    // -- predicates ---------------------------------------------------

    fn check_position_limits(&self, weights: &DVector<f64>) -> bool {
        for w in weights.iter() {
            if *w > self.limits.max_position_size + CLIP_TOLERANCE
                || *w < self.limits.min_position_size - CLIP_TOLERANCE
            {
                return false;
            }
        }
        if let Some(max_short) = self.limits.max_short_exposure {
            let short: f64 = weights.iter().filter(|w| **w < 0.0).map(|w| -w).sum();
            if short > max_short + CLIP_TOLERANCE {
                return false;
            }
        }
        true
    }

    fn check_sector_exposure(&self, weights: &DVector<f64>, sectors: &SectorMap) -> Result<bool> {
        let Some(cap) = self.limits.max_sector_exposure else {
            return Ok(true);
        };
        let exposures = sector_exposures(weights, sectors)?;
        Ok(exposures.values().all(|e| e.abs() <= cap + CLIP_TOLERANCE))
    }

    fn check_volatility(&self, weights: &DVector<f64>, covariance: &DMatrix<f64>) -> Result<bool> {
        let Some(cap) = self.limits.max_volatility else {
            return Ok(true);
        };
        let vol = self.annualized_risk(weights, covariance, "volatility_limit")?;
        Ok(vol <= cap + CLIP_TOLERANCE)
    }

    fn check_tracking_error(
        &self,
        weights: &DVector<f64>,
        excess_covariance: &DMatrix<f64>,
    ) -> Result<bool> {
        let Some(cap) = self.limits.max_tracking_error else {
            return Ok(true);
        };
        let te = self.annualized_risk(weights, excess_covariance, "tracking_error_limit")?;
        Ok(te <= cap + CLIP_TOLERANCE)
    }

    fn check_beta_deviation(
        &self,
        weights: &DVector<f64>,
        returns: &DMatrix<f64>,
        benchmark: &DVector<f64>,
    ) -> Result<bool> {
        let Some(cap) = self.limits.max_beta_deviation else {
            return Ok(true);
        };
        let series = metrics::portfolio_returns(weights, returns)?;
        let beta = metrics::beta(&series, benchmark)?;
        Ok((beta - 1.0).abs() <= cap + CLIP_TOLERANCE)
    }

    fn check_turnover(&self, current: &DVector<f64>, proposed: &DVector<f64>) -> bool {
        let Some(cap) = self.limits.max_turnover else {
            return true;
        };
        let turnover: f64 = current
            .iter()
            .zip(proposed.iter())
            .map(|(c, p)| (p - c).abs())
            .sum::<f64>()
            / 2.0;
        turnover <= cap + CLIP_TOLERANCE
    }

    fn check_liquidity(&self, weights: &DVector<f64>, adv: &[f64]) -> Result<bool> {
        let Some(max_adv_pct) = self.limits.max_adv_percent else {
            return Ok(true);
        };
        if adv.len() != weights.len() {
            return Err(PortfolioError::shape(
                "liquidity_limit",
                format!("{} ADV entries for {} assets", adv.len(), weights.len()),
            ));
        }
        for (w, v) in weights.iter().zip(adv.iter()) {
            if w.abs() * self.limits.min_liquidity > v * max_adv_pct + CLIP_TOLERANCE {
                return Ok(false);
            }
        }
        Ok(true)
    }

    fn check_diversification(&self, weights: &DVector<f64>) -> bool {
        if self.limits.min_positions.is_none() && self.limits.max_positions.is_none() {
            return true;
        }
        let active = weights
            .iter()
            .filter(|w| w.abs() > self.limits.min_trade_size)
            .count();
        if let Some(min) = self.limits.min_positions {
            if active < min {
                return false;
            }
        }
        if let Some(max) = self.limits.max_positions {
            if active > max {
                return false;
            }
        }
        true
    }

    // -- projection passes --------------------------------------------

    fn clip_positions(&self, weights: &mut DVector<f64>) {
        for w in weights.iter_mut() {
            *w = w.clamp(self.limits.min_position_size, self.limits.max_position_size);
        }
    }

    fn scale_sectors(&self, weights: &mut DVector<f64>, sectors: &SectorMap) -> Result<()> {
        let Some(cap) = self.limits.max_sector_exposure else {
            return Ok(());
        };
        let exposures = sector_exposures(weights, sectors)?;
        for (sector, exposure) in exposures {
            if exposure.abs() > cap {
                let scale = cap / exposure.abs();
                for i in 0..weights.len() {
                    if sectors.sector_of(i)? == sector {
                        weights[i] *= scale;
                    }
                }
            }
        }
        Ok(())
    }

    fn scale_volatility(&self, weights: &mut DVector<f64>, covariance: &DMatrix<f64>) -> Result<()> {
        let Some(cap) = self.limits.max_volatility else {
            return Ok(());
        };
        let vol = self.annualized_risk(weights, covariance, "volatility_scale")?;
        if vol > cap {
            *weights *= cap / vol;
        }
        Ok(())
    }

    fn clip_liquidity(&self, weights: &mut DVector<f64>, adv: &[f64]) {
        let Some(max_adv_pct) = self.limits.max_adv_percent else {
            return;
        };
        for (w, v) in weights.iter_mut().zip(adv.iter()) {
            let max_weight = v * max_adv_pct / self.limits.min_liquidity;
            if w.abs() > max_weight {
                *w = w.signum() * max_weight;
            }
        }
    }

    fn renormalize(&self, mut weights: DVector<f64>) -> Result<DVector<f64>> {
        let total: f64 = weights.sum();
        if total.abs() < 1e-6 {
            return Err(PortfolioError::numerical(
                "renormalize",
                format!("projected weights sum to {:.3e}; cannot restore budget", total),
            ));
        }
        weights /= total;
        Ok(weights)
    }

    fn annualized_risk(
        &self,
        weights: &DVector<f64>,
        covariance: &DMatrix<f64>,
        operation: &str,
    ) -> Result<f64> {
        let variance = matrix::quadratic_form(weights, covariance, operation)?;
        if variance < 0.0 || !variance.is_finite() {
            return Err(PortfolioError::numerical(
                operation,
                format!("non-finite or negative variance {}", variance),
            ));
        }
        Ok(variance.sqrt() * self.annualization_factor)
    }
}

/// Signed weight sum per sector.
pub fn sector_exposures(
    weights: &DVector<f64>,
    sectors: &SectorMap,
) -> Result<HashMap<String, f64>> {
    let mut exposures: HashMap<String, f64> = HashMap::new();
    for i in 0..weights.len() {
        let sector = sectors.sector_of(i)?;
        *exposures.entry(sector.to_string()).or_insert(0.0) += weights[i];
    }
    Ok(exposures)
}
