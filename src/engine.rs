//! Portfolio engine facade.
//!
//! The engine owns the returns panel and the per-period optimisation
//! state. One `optimize` call runs the full pipeline in order: slice the
//! trailing window, refit both covariances, solve the tracking-error and
//! mean-variance objectives, sweep the efficient frontier, project the
//! raw weights onto the feasible set, and compute the risk record.

use crate::constraints::{ConstraintContext, ConstraintLimits, RiskConstraints};
use crate::covariance;
use crate::costs::{CostParams, TransactionCostModel};
use crate::data::{ReturnsPanel, SectorMap};
use crate::error::{PortfolioError, Result};
use crate::metrics::{PortfolioRisk, RiskMetrics, RiskParameters};
use crate::rebalance::{RebalanceRecord, Rebalancer};
use crate::solver::{FrontierInputs, FrontierPoint, MarkowitzSolver};
use indicatif::{ProgressBar, ProgressStyle};
use nalgebra::{DMatrix, DVector};
use serde::{Deserialize, Serialize};
use tracing::{debug, info};

/// Engine configuration.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct EngineConfig {
    /// Trailing estimation window in trading days.
    pub window_size: usize,
    /// Target daily excess return for the tracking-error objective.
    pub target_daily_return: f64,
    /// Trading days per rebalance period.
    pub trading_days_per_month: usize,
    /// Number of points per frontier sweep.
    pub frontier_points: usize,
    /// First target of the tracking-error sweep.
    pub te_frontier_start: f64,
    /// Target spacing of the tracking-error sweep.
    pub te_frontier_step: f64,
    /// Portfolio notional in currency.
    pub portfolio_value: f64,
    /// Show a progress bar during `run`.
    pub show_progress: bool,
    /// Risk metric parameters.
    pub risk: RiskParameters,
    /// Transaction cost coefficients.
    pub costs: CostParams,
    /// Constraint limits for the projector.
    pub limits: ConstraintLimits,
}

impl Default for EngineConfig {
    fn default() -> Self {
        Self {
            window_size: 252,
            target_daily_return: 0.0013,
            trading_days_per_month: 21,
            frontier_points: 50,
            te_frontier_start: -0.001,
            te_frontier_step: 0.00005,
            portfolio_value: 1_000_000.0,
            show_progress: true,
            risk: RiskParameters::default(),
            costs: CostParams::default(),
            limits: ConstraintLimits::default(),
        }
    }
}

/// Facade over the estimator, solver, projector, cost model and metric
/// calculators.
#[derive(Debug)]
pub struct PortfolioEngine {
    config: EngineConfig,
    panel: ReturnsPanel,
    sector_map: SectorMap,
    adv: Vec<f64>,
    solver: MarkowitzSolver,
    constraints: RiskConstraints,
    metrics: RiskMetrics,
    cost_model: TransactionCostModel,
    current_weights: DVector<f64>,
    te_weights: DVector<f64>,
    mpt_weights: DVector<f64>,
    covariance: DMatrix<f64>,
    excess_covariance: DMatrix<f64>,
    frontier: Vec<FrontierPoint>,
    mpt_frontier: Vec<FrontierPoint>,
    risk: Option<PortfolioRisk>,
    expected_excess_return: f64,
}

impl PortfolioEngine {
    /// Build an engine over a panel. The ADV vector must align with the
    /// panel's assets; the window must fit the panel.
    pub fn new(
        panel: ReturnsPanel,
        sector_map: SectorMap,
        adv: Vec<f64>,
        config: EngineConfig,
    ) -> Result<Self> {
        let n = panel.num_assets();
        if adv.len() != n {
            return Err(PortfolioError::shape(
                "engine",
                format!("{} ADV entries for {} assets", adv.len(), n),
            ));
        }
        if config.window_size < 2 || config.window_size > panel.num_days() {
            return Err(PortfolioError::InvalidInput(format!(
                "window of {} days does not fit a panel of {} days",
                config.window_size,
                panel.num_days()
            )));
        }
        if config.portfolio_value <= 0.0 {
            return Err(PortfolioError::InvalidInput(
                "portfolio value must be positive".to_string(),
            ));
        }
        if config.trading_days_per_month == 0 {
            return Err(PortfolioError::InvalidInput(
                "trading days per month must be positive".to_string(),
            ));
        }

        let cost_model = TransactionCostModel::new(config.costs, adv.clone())?;
        let constraints = RiskConstraints::new(config.limits.clone());
        let metrics = RiskMetrics::new(config.risk);
        let equal = DVector::from_element(n, 1.0 / n as f64);

        Ok(Self {
            solver: MarkowitzSolver::new(),
            constraints,
            metrics,
            cost_model,
            current_weights: equal.clone(),
            te_weights: equal.clone(),
            mpt_weights: equal,
            covariance: DMatrix::zeros(n, n),
            excess_covariance: DMatrix::zeros(n, n),
            frontier: Vec::new(),
            mpt_frontier: Vec::new(),
            risk: None,
            expected_excess_return: 0.0,
            config,
            panel,
            sector_map,
            adv,
        })
    }

    /// Run the optimisation pipeline for one rebalance period.
    ///
    /// The trailing window ends at `window_size + period · days_per_month`
    /// rows into the panel, clamped to the panel length, so period 0 uses
    /// the first full window and each later period advances one month.
    pub fn optimize(&mut self, period: usize) -> Result<()> {
        let end = (self.config.window_size + period * self.config.trading_days_per_month)
            .min(self.panel.num_days());
        let window = self.panel.window(end, self.config.window_size)?;
        debug!(period, end, "optimising over trailing window");

        let cov = covariance::sample_covariance(&window.returns)?;
        let excess_cov = covariance::excess_covariance(&window.returns, &window.benchmark)?;
        let mean = covariance::column_means(&window.returns);
        let excess_mean = covariance::column_means(&window.excess);
        let benchmark_mean = window.benchmark.sum() / window.benchmark.len() as f64;

        // Tracking-error objective at the configured target, plain
        // mean-variance at the benchmark-shifted target.
        let target = self.config.target_daily_return;
        let te_solution = self.solver.solve(&excess_mean, &excess_cov, target)?;
        let mpt_solution = self.solver.solve(&mean, &cov, target + benchmark_mean)?;

        let inputs = FrontierInputs {
            mean: &mean,
            covariance: &cov,
            excess_mean: &excess_mean,
            excess_covariance: &excess_cov,
        };
        let te_grid = MarkowitzSolver::target_grid(
            self.config.te_frontier_start,
            self.config.te_frontier_step,
            self.config.frontier_points,
        );
        let mpt_grid = MarkowitzSolver::target_grid_spanning(&mean, self.config.frontier_points);
        let frontier = self.solver.sweep(&inputs, &te_grid)?;
        let mpt_frontier = self.solver.sweep(&inputs, &mpt_grid)?;

        let ctx = ConstraintContext {
            current_weights: &self.current_weights,
            returns: &window.returns,
            covariance: &cov,
            excess_covariance: &excess_cov,
            benchmark: &window.benchmark,
            sector_map: &self.sector_map,
            adv: &self.adv,
        };
        let te_weights = self.constraints.enforce(te_solution.weights, &ctx)?;
        let mpt_weights = self.constraints.enforce(mpt_solution.weights, &ctx)?;

        let risk = self.metrics.calculate(
            &te_weights,
            &window.returns,
            &cov,
            &excess_cov,
            &window.benchmark,
        )?;

        self.expected_excess_return =
            excess_mean.dot(&te_weights) * self.config.trading_days_per_month as f64;
        self.covariance = cov;
        self.excess_covariance = excess_cov;
        self.te_weights = te_weights;
        self.mpt_weights = mpt_weights;
        self.frontier = frontier;
        self.mpt_frontier = mpt_frontier;
        self.risk = Some(risk);
        Ok(())
    }

    /// Drive the rebalancer across every date in the panel and return
    /// the per-period records.
    pub fn run(&mut self) -> Result<Vec<RebalanceRecord>> {
        let calendar = self.panel.rebalance_calendar();
        info!(
            months = calendar.len(),
            days = self.panel.num_days(),
            "starting rebalance loop"
        );

        let dates: Vec<_> = self.panel.dates().to_vec();
        let mut rebalancer = Rebalancer::new(self.current_weights.clone(), calendar);

        let progress = if self.config.show_progress {
            let pb = ProgressBar::new(dates.len() as u64);
            pb.set_style(
                ProgressStyle::default_bar()
                    .template("{spinner:.green} [{elapsed_precise}] [{bar:40.cyan/blue}] {pos}/{len} ({eta})")
                    .unwrap()
                    .progress_chars("#>-"),
            );
            Some(pb)
        } else {
            None
        };

        for date in dates {
            rebalancer.tick(self, date)?;
            if let Some(ref pb) = progress {
                pb.inc(1);
            }
        }
        if let Some(pb) = progress {
            pb.finish_and_clear();
        }

        self.current_weights = rebalancer.current_weights().clone();
        let history = rebalancer.into_history();
        let accepted = history.iter().filter(|r| r.accepted).count();
        info!(
            periods = history.len(),
            accepted,
            "rebalance loop finished"
        );
        Ok(history)
    }

    /// Estimated cost of moving to `target`, as a fraction of portfolio
    /// value.
    pub fn rebalancing_cost_fraction(&self, target: &DVector<f64>) -> Result<f64> {
        let cost = self.cost_model.rebalancing_cost(
            &self.current_weights,
            target,
            self.config.portfolio_value,
        )?;
        Ok(cost / self.config.portfolio_value)
    }

    // -- accessors ----------------------------------------------------

    pub fn config(&self) -> &EngineConfig {
        &self.config
    }

    pub fn panel(&self) -> &ReturnsPanel {
        &self.panel
    }

    pub fn sector_map(&self) -> &SectorMap {
        &self.sector_map
    }

    pub fn cost_model(&self) -> &TransactionCostModel {
        &self.cost_model
    }

    pub fn current_weights(&self) -> &DVector<f64> {
        &self.current_weights
    }

    pub fn set_current_weights(&mut self, weights: DVector<f64>) {
        self.current_weights = weights;
    }

    /// Equal-weight vector for this panel's asset count.
    pub fn equal_weights(&self) -> DVector<f64> {
        let n = self.panel.num_assets();
        DVector::from_element(n, 1.0 / n as f64)
    }

    pub fn te_weights(&self) -> &DVector<f64> {
        &self.te_weights
    }

    pub fn mpt_weights(&self) -> &DVector<f64> {
        &self.mpt_weights
    }

    pub fn covariance(&self) -> &DMatrix<f64> {
        &self.covariance
    }

    pub fn excess_covariance(&self) -> &DMatrix<f64> {
        &self.excess_covariance
    }

    pub fn frontier(&self) -> &[FrontierPoint] {
        &self.frontier
    }

    pub fn mpt_frontier(&self) -> &[FrontierPoint] {
        &self.mpt_frontier
    }

    pub fn risk(&self) -> Option<&PortfolioRisk> {
        self.risk.as_ref()
    }

    /// Expected excess return of the latest proposed weights over one
    /// rebalance period.
    pub fn expected_excess_return(&self) -> f64 {
        self.expected_excess_return
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::testkit;

    fn unconstrained_engine() -> PortfolioEngine {
        let panel = testkit::synthetic_panel(300, 3);
        let config = EngineConfig {
            window_size: 120,
            limits: ConstraintLimits::none(),
            show_progress: false,
            ..EngineConfig::default()
        };
        testkit::engine_for_panel(panel, config)
    }

    #[test]
    fn optimize_populates_state() {
        let mut engine = unconstrained_engine();
        engine.optimize(0).unwrap();

        assert_eq!(engine.te_weights().len(), 3);
        assert!((engine.te_weights().sum() - 1.0).abs() < 1e-8);
        assert!((engine.mpt_weights().sum() - 1.0).abs() < 1e-8);
        assert_eq!(engine.covariance().nrows(), 3);
        assert_eq!(engine.frontier().len(), 50);
        assert_eq!(engine.mpt_frontier().len(), 50);
        assert!(engine.risk().is_some());
    }

    #[test]
    fn optimize_advances_the_window() {
        let mut engine = unconstrained_engine();
        engine.optimize(0).unwrap();
        let cov_first = engine.covariance().clone();
        engine.optimize(3).unwrap();
        let cov_later = engine.covariance().clone();

        // A later window must produce different covariance estimates.
        let diff: f64 = (&cov_first - &cov_later).abs().sum();
        assert!(diff > 0.0);
    }

    #[test]
    fn window_is_clamped_to_panel_end() {
        let mut engine = unconstrained_engine();
        // Far past the end of the 300-day panel.
        engine.optimize(1000).unwrap();
        assert!(engine.risk().is_some());
    }

    #[test]
    fn run_produces_one_record_per_calendar_month() {
        let mut engine = unconstrained_engine();
        let months = engine.panel().rebalance_calendar().len();
        let history = engine.run().unwrap();
        assert_eq!(history.len(), months);
    }

    #[test]
    fn mismatched_adv_is_rejected() {
        let panel = testkit::synthetic_panel(200, 3);
        let config = EngineConfig {
            window_size: 100,
            show_progress: false,
            ..EngineConfig::default()
        };
        let err = PortfolioEngine::new(
            panel.clone(),
            crate::data::SectorMap::one_per_asset(panel.asset_names()),
            vec![1e7; 2],
            config,
        )
        .unwrap_err();
        assert!(matches!(err, PortfolioError::Shape { .. }));
    }

    #[test]
    fn oversized_window_is_rejected() {
        let panel = testkit::synthetic_panel(50, 3);
        let config = EngineConfig {
            window_size: 100,
            show_progress: false,
            ..EngineConfig::default()
        };
        let err = PortfolioEngine::new(
            panel.clone(),
            crate::data::SectorMap::one_per_asset(panel.asset_names()),
            vec![1e7; 3],
            config,
        )
        .unwrap_err();
        assert!(matches!(err, PortfolioError::InvalidInput(_)));
    }

    #[test]
    fn cost_fraction_is_cost_over_value() {
        let mut engine = unconstrained_engine();
        engine.optimize(0).unwrap();
        let target = engine.te_weights().clone();
        let fraction = engine.rebalancing_cost_fraction(&target).unwrap();
        let absolute = engine
            .cost_model()
            .rebalancing_cost(engine.current_weights(), &target, 1_000_000.0)
            .unwrap();
        assert!((fraction - absolute / 1_000_000.0).abs() < 1e-15);
    }
}
