//! Transaction cost model: commissions, slippage, and market impact with
//! multi-day execution decay.
//!
//! Costs are returned in absolute currency. Callers comparing against
//! return expectations divide by portfolio value at the boundary.

use crate::error::{PortfolioError, Result};
use nalgebra::DVector;
use serde::{Deserialize, Serialize};

/// Cost model coefficients.
#[derive(Debug, Clone, Copy, Serialize, Deserialize)]
pub struct CostParams {
    /// Fixed commission per executed trade (currency).
    pub fixed_commission: f64,
    /// Variable commission as a fraction of trade notional.
    pub variable_commission: f64,
    /// Slippage coefficient for the square-root participation term.
    pub slippage_coeff: f64,
    /// Market-impact coefficient for the 1.5-power participation term.
    pub impact_coeff: f64,
    /// Days over which a trade is worked (≥ 1).
    pub days_to_execute: usize,
    /// Exponential decay rate of impact across execution days.
    pub impact_decay: f64,
}

impl Default for CostParams {
    fn default() -> Self {
        Self {
            fixed_commission: 0.0001,
            variable_commission: 0.0005,
            slippage_coeff: 0.0002,
            impact_coeff: 0.1,
            days_to_execute: 1,
            impact_decay: 0.1,
        }
    }
}

impl CostParams {
    /// Validate the coefficient ranges.
    pub fn validate(&self) -> Result<()> {
        if self.fixed_commission < 0.0
            || self.variable_commission < 0.0
            || self.slippage_coeff < 0.0
            || self.impact_coeff < 0.0
            || self.impact_decay < 0.0
        {
            return Err(PortfolioError::InvalidInput(
                "cost coefficients must be non-negative".to_string(),
            ));
        }
        if self.days_to_execute == 0 {
            return Err(PortfolioError::InvalidInput(
                "days to execute must be at least 1".to_string(),
            ));
        }
        Ok(())
    }
}

/// Transaction cost model bound to a set of average daily volumes.
#[derive(Debug, Clone)]
pub struct TransactionCostModel {
    params: CostParams,
    avg_volumes: Vec<f64>,
}

impl TransactionCostModel {
    /// Build a cost model; fails on negative coefficients, zero execution
    /// days, or non-positive volumes.
    pub fn new(params: CostParams, avg_volumes: Vec<f64>) -> Result<Self> {
        params.validate()?;
        if avg_volumes.iter().any(|&v| v <= 0.0 || !v.is_finite()) {
            return Err(PortfolioError::InvalidInput(
                "average daily volumes must be positive".to_string(),
            ));
        }
        Ok(Self {
            params,
            avg_volumes,
        })
    }

    pub fn params(&self) -> &CostParams {
        &self.params
    }

    /// Replace the volume vector (e.g. on a market-data refresh).
    pub fn update_volumes(&mut self, avg_volumes: Vec<f64>) -> Result<()> {
        if avg_volumes.iter().any(|&v| v <= 0.0 || !v.is_finite()) {
            return Err(PortfolioError::InvalidInput(
                "average daily volumes must be positive".to_string(),
            ));
        }
        self.avg_volumes = avg_volumes;
        Ok(())
    }

    /// One-way turnover ½ Σ|w1 − w0|.
    pub fn turnover(current: &DVector<f64>, target: &DVector<f64>) -> f64 {
        current
            .iter()
            .zip(target.iter())
            .map(|(c, t)| (t - c).abs())
            .sum::<f64>()
            / 2.0
    }

    /// Total estimated cost of moving from `current` to `target` weights
    /// on a portfolio of the given notional value. Per-leg: fixed
    /// commission, variable commission, market impact with decay, and
    /// square-root slippage.
    pub fn total_cost(
        &self,
        current: &DVector<f64>,
        target: &DVector<f64>,
        portfolio_value: f64,
    ) -> Result<f64> {
        self.check_shapes(current, target)?;

        let mut total = 0.0;
        for i in 0..current.len() {
            let trade_size = (target[i] - current[i]).abs() * portfolio_value;
            if trade_size > 0.0 {
                total += self.params.fixed_commission;
                total += trade_size * self.params.variable_commission;
                total += self.market_impact_decay(trade_size, self.avg_volumes[i]);
                total += self.slippage(trade_size, self.avg_volumes[i]);
            }
        }
        Ok(total)
    }

    /// Rebalancing cost estimate: one fixed commission if anything
    /// trades, turnover-scaled variable commission, then per-asset
    /// impact and slippage.
    pub fn rebalancing_cost(
        &self,
        current: &DVector<f64>,
        target: &DVector<f64>,
        portfolio_value: f64,
    ) -> Result<f64> {
        self.check_shapes(current, target)?;

        let turnover = Self::turnover(current, target);
        let mut total = if turnover > 0.0 {
            self.params.fixed_commission
        } else {
            0.0
        };
        total += turnover * portfolio_value * self.params.variable_commission;

        for i in 0..current.len() {
            let trade_size = (target[i] - current[i]).abs() * portfolio_value;
            if trade_size > 0.0 {
                total += self.market_impact_decay(trade_size, self.avg_volumes[i]);
                total += self.slippage(trade_size, self.avg_volumes[i]);
            }
        }
        Ok(total)
    }

    /// Single-day market impact: coeff · (size / volume)^1.5.
    fn market_impact(&self, trade_size: f64, avg_volume: f64) -> f64 {
        self.params.impact_coeff * (trade_size / avg_volume).powf(1.5)
    }

    /// Impact of a trade worked over `days_to_execute` days: the daily
    /// clip impacts decay exponentially with the execution day.
    fn market_impact_decay(&self, trade_size: f64, avg_volume: f64) -> f64 {
        let days = self.params.days_to_execute;
        let daily_size = trade_size / days as f64;
        (0..days)
            .map(|day| {
                let decay = (-self.params.impact_decay * day as f64).exp();
                self.market_impact(daily_size, avg_volume) * decay
            })
            .sum()
    }

    /// Square-root slippage: coeff · √(size / volume).
    fn slippage(&self, trade_size: f64, avg_volume: f64) -> f64 {
        self.params.slippage_coeff * (trade_size / avg_volume).sqrt()
    }

    fn check_shapes(&self, current: &DVector<f64>, target: &DVector<f64>) -> Result<()> {
        if current.len() != target.len() || current.len() != self.avg_volumes.len() {
            return Err(PortfolioError::shape(
                "transaction_cost",
                format!(
                    "weights {}/{} and volume vector {} must agree",
                    current.len(),
                    target.len(),
                    self.avg_volumes.len()
                ),
            ));
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use nalgebra::dvector;

    fn reference_model() -> TransactionCostModel {
        TransactionCostModel::new(
            CostParams {
                fixed_commission: 100.0,
                variable_commission: 0.0005,
                slippage_coeff: 0.0002,
                impact_coeff: 0.1,
                days_to_execute: 1,
                impact_decay: 0.1,
            },
            vec![1e7, 1e7],
        )
        .unwrap()
    }

    #[test]
    fn turnover_is_half_the_absolute_change() {
        let current = dvector![0.5, 0.5];
        let target = dvector![0.6, 0.4];
        assert!((TransactionCostModel::turnover(&current, &target) - 0.1).abs() < 1e-15);
    }

    #[test]
    fn total_cost_matches_pinned_expectation() {
        // Two legs of 100k notional against 10m ADV:
        //   fixed:     2 · 100                       = 200
        //   variable:  2 · 100_000 · 0.0005          = 100
        //   impact:    2 · 0.1 · 0.01^1.5            = 0.0002
        //   slippage:  2 · 0.0002 · √0.01            = 0.00004
        let model = reference_model();
        let current = dvector![0.5, 0.5];
        let target = dvector![0.6, 0.4];
        let cost = model.total_cost(&current, &target, 1e6).unwrap();

        let expected = 200.0 + 100.0 + 2.0 * 0.1 * 0.01f64.powf(1.5) + 2.0 * 0.0002 * 0.1;
        assert!((cost - expected).abs() < 1e-10);
    }

    #[test]
    fn rebalancing_cost_charges_fixed_once() {
        let model = reference_model();
        let current = dvector![0.5, 0.5];
        let target = dvector![0.6, 0.4];
        let cost = model.rebalancing_cost(&current, &target, 1e6).unwrap();

        // One fixed leg, turnover 0.1 of 1m at 5 bps, same impact and
        // slippage legs as total_cost.
        let expected = 100.0 + 0.1 * 1e6 * 0.0005 + 2.0 * 0.1 * 0.01f64.powf(1.5) + 2.0 * 0.0002 * 0.1;
        assert!((cost - expected).abs() < 1e-10);
    }

    #[test]
    fn no_trade_costs_nothing() {
        let model = reference_model();
        let weights = dvector![0.5, 0.5];
        assert_eq!(model.total_cost(&weights, &weights, 1e6).unwrap(), 0.0);
        assert_eq!(model.rebalancing_cost(&weights, &weights, 1e6).unwrap(), 0.0);
    }

    #[test]
    fn doubling_trades_scales_components_superlinearly() {
        let params = CostParams {
            fixed_commission: 0.0,
            variable_commission: 0.0005,
            slippage_coeff: 0.0002,
            impact_coeff: 0.1,
            days_to_execute: 1,
            impact_decay: 0.1,
        };
        let model = TransactionCostModel::new(params, vec![1e7, 1e7]).unwrap();
        let current = dvector![0.5, 0.5];
        let small = dvector![0.55, 0.45];
        let large = dvector![0.6, 0.4];

        let cost_small = model.total_cost(&current, &small, 1e6).unwrap();
        let cost_large = model.total_cost(&current, &large, 1e6).unwrap();

        // Variable scales linearly, slippage by √2, impact by 2^1.5, so
        // the doubled trade costs at least √2 times more overall and the
        // impact-only model at least 2^1.5 times more.
        assert!(cost_large >= cost_small * 2f64.sqrt());

        let impact_only = TransactionCostModel::new(
            CostParams {
                variable_commission: 0.0,
                slippage_coeff: 0.0,
                ..params
            },
            vec![1e7, 1e7],
        )
        .unwrap();
        let impact_small = impact_only.total_cost(&current, &small, 1e6).unwrap();
        let impact_large = impact_only.total_cost(&current, &large, 1e6).unwrap();
        assert!((impact_large / impact_small - 2f64.powf(1.5)).abs() < 1e-10);
    }

    #[test]
    fn multi_day_execution_decays_impact() {
        let base = CostParams {
            fixed_commission: 0.0,
            variable_commission: 0.0,
            slippage_coeff: 0.0,
            impact_coeff: 0.1,
            days_to_execute: 1,
            impact_decay: 0.5,
        };
        let one_day = TransactionCostModel::new(base, vec![1e6]).unwrap();
        let five_day = TransactionCostModel::new(
            CostParams {
                days_to_execute: 5,
                ..base
            },
            vec![1e6],
        )
        .unwrap();

        let current = dvector![0.0];
        let target = dvector![0.5];
        let cost_one = one_day.total_cost(&current, &target, 1e6).unwrap();
        let cost_five = five_day.total_cost(&current, &target, 1e6).unwrap();

        // Splitting across days reduces the superlinear participation
        // penalty even before decay is applied.
        assert!(cost_five < cost_one);
    }

    #[test]
    fn invalid_parameters_are_rejected() {
        assert!(TransactionCostModel::new(
            CostParams {
                variable_commission: -0.001,
                ..Default::default()
            },
            vec![1e6],
        )
        .is_err());

        assert!(TransactionCostModel::new(
            CostParams {
                days_to_execute: 0,
                ..Default::default()
            },
            vec![1e6],
        )
        .is_err());

        assert!(TransactionCostModel::new(CostParams::default(), vec![1e6, 0.0]).is_err());
        assert!(TransactionCostModel::new(CostParams::default(), vec![-5.0]).is_err());
    }

    #[test]
    fn shape_mismatch_is_rejected() {
        let model = reference_model();
        let current = dvector![0.5, 0.5, 0.0];
        let target = dvector![0.6, 0.4, 0.0];
        assert!(model.total_cost(&current, &target, 1e6).is_err());
    }
}
