//! Ballast - a portfolio construction engine.
//!
//! # Overview
//!
//! Ballast turns a panel of historical daily asset returns and a
//! benchmark series into portfolio weights, using the closed-form
//! Markowitz solution for both the classical mean-variance problem and
//! benchmark-relative tracking-error minimisation:
//!
//! - **Closed-form solver**: no iterative optimiser; the fully-invested
//!   frontier is available analytically
//! - **Rolling estimation**: covariances are refit on a trailing window
//!   at every rebalance
//! - **Constraint projection**: position, sector, volatility, liquidity,
//!   turnover and diversification limits enforced by fixed-point
//!   projection
//! - **Transaction costs**: commissions, square-root slippage, and
//!   power-law market impact with multi-day execution decay
//! - **Cost-gated rebalancing**: monthly proposals are adopted only when
//!   the expected excess return beats the estimated trading cost
//! - **Risk diagnostics**: tracking error, beta, alpha, Sharpe, Sortino,
//!   drawdown, VaR, expected shortfall, risk contributions, and rolling
//!   variants
//!
//! # Quick Start
//!
//! ```no_run
//! use ballast::data::{PanelConfig, ReturnsPanel, SectorMap};
//! use ballast::engine::{EngineConfig, PortfolioEngine};
//!
//! let panel = ReturnsPanel::from_csv("portfolio.csv", &PanelConfig::default()).unwrap();
//! let sectors = SectorMap::one_per_asset(panel.asset_names());
//! let adv = vec![1e7; panel.num_assets()];
//!
//! let mut engine =
//!     PortfolioEngine::new(panel, sectors, adv, EngineConfig::default()).unwrap();
//! let history = engine.run().unwrap();
//!
//! println!("tracking error: {:.2}%", engine.risk().unwrap().tracking_error * 100.0);
//! println!("{} rebalances", history.len());
//! ```
//!
//! # Modules
//!
//! - [`data`]: returns-panel loading, rebalance calendar, sector map
//! - [`covariance`]: windowed sample and EWMA covariance estimators
//! - [`solver`]: closed-form Markowitz solver and frontier sweep
//! - [`constraints`]: feasibility checks and the iterative projector
//! - [`costs`]: transaction cost model
//! - [`metrics`]: risk and performance metrics
//! - [`rebalance`]: month-end rebalancing loop with a cost/benefit gate
//! - [`engine`]: the facade tying the pipeline together
//! - [`stress`]: scenario stress testing
//! - [`report`]: CSV/text/JSON report writers

pub mod cli;
pub mod constraints;
pub mod costs;
pub mod covariance;
pub mod data;
pub mod engine;
pub mod error;
pub mod matrix;
pub mod metrics;
pub mod rebalance;
pub mod report;
pub mod solver;
pub mod stress;

#[cfg(test)]
pub(crate) mod testkit;

// Re-exports for convenience
pub use constraints::{ConstraintContext, ConstraintLimits, ConstraintStatus, RiskConstraints};
pub use costs::{CostParams, TransactionCostModel};
pub use data::{PanelConfig, ReturnsPanel, SectorMap};
pub use engine::{EngineConfig, PortfolioEngine};
pub use error::{PortfolioError, Result};
pub use metrics::{PortfolioRisk, RiskMetrics, RiskParameters};
pub use rebalance::{RebalanceRecord, Rebalancer};
pub use report::Reporter;
pub use solver::{FrontierPoint, MarkowitzSolution, MarkowitzSolver};
pub use stress::{Scenario, StressResult, StressTester};
