//! Scenario stress testing on the historical returns panel.

use crate::error::{PortfolioError, Result};
use crate::metrics::{self, RiskMetrics, RiskParameters};
use nalgebra::{DMatrix, DVector};
use serde::{Deserialize, Serialize};
use tracing::info;

/// A named stress scenario: per-asset multiplicative return shocks.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Scenario {
    pub name: String,
    /// Per-asset shock applied as R · (1 + shock).
    pub market_shocks: Vec<f64>,
}

impl Scenario {
    /// Uniform shock across all assets.
    pub fn uniform(name: impl Into<String>, shock: f64, assets: usize) -> Self {
        Self {
            name: name.into(),
            market_shocks: vec![shock; assets],
        }
    }
}

/// Risk of the portfolio under a stressed history.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct StressResult {
    pub scenario: String,
    /// Compounded total return over the stressed history.
    pub portfolio_return: f64,
    pub max_drawdown: f64,
    pub value_at_risk: f64,
    pub expected_shortfall: f64,
}

/// Applies scenarios to a fixed historical panel.
#[derive(Debug, Clone)]
pub struct StressTester {
    returns: DMatrix<f64>,
    metrics: RiskMetrics,
}

impl StressTester {
    pub fn new(returns: DMatrix<f64>) -> Self {
        Self {
            returns,
            metrics: RiskMetrics::new(RiskParameters::default()),
        }
    }

    pub fn with_params(returns: DMatrix<f64>, params: RiskParameters) -> Self {
        Self {
            returns,
            metrics: RiskMetrics::new(params),
        }
    }

    /// Run one scenario against a weight vector.
    pub fn run(&self, weights: &DVector<f64>, scenario: &Scenario) -> Result<StressResult> {
        if scenario.market_shocks.len() != self.returns.ncols() {
            return Err(PortfolioError::shape(
                "stress_test",
                format!(
                    "{} shocks for {} assets",
                    scenario.market_shocks.len(),
                    self.returns.ncols()
                ),
            ));
        }
        info!(scenario = %scenario.name, "running stress test");

        let stressed = self.stressed_returns(scenario);
        let series = metrics::portfolio_returns(weights, &stressed)?;

        let portfolio_return = series.iter().fold(1.0, |acc, r| acc * (1.0 + r)) - 1.0;

        Ok(StressResult {
            scenario: scenario.name.clone(),
            portfolio_return,
            max_drawdown: metrics::max_drawdown(&series),
            value_at_risk: self.metrics.value_at_risk(&series)?,
            expected_shortfall: self.metrics.expected_shortfall(&series)?,
        })
    }

    fn stressed_returns(&self, scenario: &Scenario) -> DMatrix<f64> {
        let mut stressed = self.returns.clone();
        for j in 0..stressed.ncols() {
            let factor = 1.0 + scenario.market_shocks[j];
            for i in 0..stressed.nrows() {
                stressed[(i, j)] *= factor;
            }
        }
        stressed
    }
}
