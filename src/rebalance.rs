//! Monthly rebalancing loop with a cost/benefit acceptance gate.

use crate::costs::TransactionCostModel;
use crate::engine::PortfolioEngine;
use crate::error::{PortfolioError, Result};
use chrono::NaiveDate;
use nalgebra::DVector;
use serde::{Deserialize, Serialize};
use tracing::{debug, info, warn};

/// Outcome of one rebalance event.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RebalanceRecord {
    pub date: NaiveDate,
    /// Whether the proposed weights were swapped in.
    pub accepted: bool,
    /// One-way turnover of the proposed move.
    pub turnover: f64,
    /// Estimated trading cost as a fraction of portfolio value.
    pub cost_fraction: f64,
    /// Expected excess return over the coming period.
    pub expected_benefit: f64,
}

/// Drives the rebalance calendar over the engine.
///
/// The rebalancer owns the live weight vector and the period counter;
/// the engine is borrowed per tick and never owned, so the rebalancer
/// cannot outlive the data it optimises against.
#[derive(Debug)]
pub struct Rebalancer {
    current_weights: DVector<f64>,
    calendar: Vec<NaiveDate>,
    period: usize,
    last_date: Option<NaiveDate>,
    history: Vec<RebalanceRecord>,
}

impl Rebalancer {
    pub fn new(initial_weights: DVector<f64>, calendar: Vec<NaiveDate>) -> Self {
        Self {
            current_weights: initial_weights,
            calendar,
            period: 0,
            last_date: None,
            history: Vec::new(),
        }
    }

    /// Process one observed date.
    ///
    /// Non-calendar dates are a strict no-op: the weight vector is left
    /// bitwise unchanged. On a calendar date the engine re-optimises,
    /// and the proposed weights are adopted only when the estimated
    /// trading cost is below the expected excess return. A constraint
    /// failure for a single period is logged and skipped; the loop
    /// continues with the current weights.
    pub fn tick(
        &mut self,
        engine: &mut PortfolioEngine,
        date: NaiveDate,
    ) -> Result<Option<RebalanceRecord>> {
        if let Some(last) = self.last_date {
            if date < last {
                warn!(%date, %last, "tick dates arrived out of order");
            }
        }
        self.last_date = Some(date);

        if !self.calendar.contains(&date) {
            return Ok(None);
        }

        engine.set_current_weights(self.current_weights.clone());
        match engine.optimize(self.period) {
            Ok(()) => {}
            Err(PortfolioError::ConstraintsUnsatisfiable { violations, .. }) => {
                warn!(
                    %date,
                    period = self.period,
                    ?violations,
                    "constraints unsatisfiable; retaining current weights"
                );
                self.period += 1;
                return Ok(None);
            }
            Err(e) => return Err(e),
        }

        let proposed = engine.te_weights().clone();
        let turnover = TransactionCostModel::turnover(&self.current_weights, &proposed);
        let cost_fraction = engine.rebalancing_cost_fraction(&proposed)?;
        let expected_benefit = engine.expected_excess_return();

        let accepted = cost_fraction < expected_benefit;
        if accepted {
            debug!(%date, turnover, cost_fraction, expected_benefit, "rebalance accepted");
            self.current_weights = proposed;
        } else {
            info!(%date, turnover, cost_fraction, expected_benefit, "rebalance rejected by cost gate");
        }
        self.period += 1;

        let record = RebalanceRecord {
            date,
            accepted,
            turnover,
            cost_fraction,
            expected_benefit,
        };
        self.history.push(record.clone());
        Ok(Some(record))
    }

    pub fn current_weights(&self) -> &DVector<f64> {
        &self.current_weights
    }

    pub fn period(&self) -> usize {
        self.period
    }

    pub fn history(&self) -> &[RebalanceRecord] {
        &self.history
    }

    pub fn into_history(self) -> Vec<RebalanceRecord> {
        self.history
    }
}
