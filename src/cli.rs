//! Command-line interface for the portfolio engine.

use crate::data::{PanelConfig, ReturnsPanel, SectorMap};
use crate::engine::{EngineConfig, PortfolioEngine};
use crate::error::Result;
use crate::report::{self, Reporter};
use crate::stress::{Scenario, StressTester};

use clap::Parser;
use std::path::PathBuf;
use tracing::{info, Level};
use tracing_subscriber::FmtSubscriber;

/// Ballast - portfolio construction with tracking-error control.
#[derive(Parser, Debug)]
#[command(name = "ballast")]
#[command(version)]
#[command(about = "Mean-variance portfolio construction and monthly rebalancing")]
pub struct Cli {
    /// Path to the portfolio returns CSV (index, date, assets..., benchmark)
    pub data: PathBuf,

    /// Directory the reports are written into
    #[arg(short, long, default_value = "reports")]
    pub output: PathBuf,

    /// Trailing estimation window in trading days
    #[arg(short, long, default_value_t = 252)]
    pub window: usize,

    /// Target daily excess return for the tracking-error objective
    #[arg(long, default_value_t = 0.0013, allow_negative_numbers = true)]
    pub target_return: f64,

    /// Portfolio notional value
    #[arg(long, default_value_t = 1_000_000.0)]
    pub value: f64,

    /// Run a uniform market-shock stress test with the given shock
    /// (e.g. -0.10 for a 10% decline)
    #[arg(long, allow_negative_numbers = true)]
    pub stress: Option<f64>,

    /// Disable the progress bar
    #[arg(long)]
    pub no_progress: bool,

    /// Verbosity level (-v info, -vv debug, -vvv trace)
    #[arg(short, long, action = clap::ArgAction::Count)]
    pub verbose: u8,
}

fn init_tracing(verbosity: u8) {
    let level = match verbosity {
        0 => Level::WARN,
        1 => Level::INFO,
        2 => Level::DEBUG,
        _ => Level::TRACE,
    };
    let subscriber = FmtSubscriber::builder().with_max_level(level).finish();
    // A second init (e.g. in tests) is harmless.
    let _ = tracing::subscriber::set_global_default(subscriber);
}

/// Parse arguments, run the full pipeline and write the reports.
pub fn run() -> Result<()> {
    let cli = Cli::parse();
    execute(cli)
}

/// Run the pipeline for already-parsed arguments.
pub fn execute(cli: Cli) -> Result<()> {
    init_tracing(cli.verbose);

    let panel = ReturnsPanel::from_csv(&cli.data, &PanelConfig::default())?;
    info!(
        days = panel.num_days(),
        assets = panel.num_assets(),
        "loaded returns panel"
    );

    // The CSV input carries no sector or volume metadata; each asset is
    // its own sector and ADV is uniform. Library callers supply real
    // values through `PortfolioEngine::new`.
    let sector_map = SectorMap::one_per_asset(panel.asset_names());
    let adv = vec![1e7; panel.num_assets()];

    let config = EngineConfig {
        window_size: cli.window,
        target_daily_return: cli.target_return,
        portfolio_value: cli.value,
        show_progress: !cli.no_progress,
        ..EngineConfig::default()
    };

    let last_date = panel
        .dates()
        .last()
        .copied()
        .expect("panel is never empty after load");
    let date_label = last_date.format("%Y-%m-%d").to_string();

    let mut engine = PortfolioEngine::new(panel, sector_map, adv, config)?;
    let history = engine.run()?;

    let reporter = Reporter::new(&cli.output);
    reporter.write_portfolio_csv(&date_label, &engine)?;
    let last_cost = history.last().map(|r| r.cost_fraction).unwrap_or(0.0);
    reporter.write_risk_report(&date_label, &engine, last_cost)?;
    reporter.write_final_analysis(&engine, &history)?;
    if let Some(risk) = engine.risk() {
        reporter.write_risk_json(&date_label, risk)?;
    }

    if let Some(shock) = cli.stress {
        let scenario = Scenario::uniform(
            format!("uniform {:+.1}% market shock", shock * 100.0),
            shock,
            engine.panel().num_assets(),
        );
        let tester = StressTester::new(engine.panel().returns().clone());
        let result = tester.run(engine.te_weights(), &scenario)?;
        println!(
            "Stress [{}]: return {:.2}%, max drawdown {:.2}%, VaR {:.2}%, ES {:.2}%",
            result.scenario,
            result.portfolio_return * 100.0,
            result.max_drawdown * 100.0,
            result.value_at_risk * 100.0,
            result.expected_shortfall * 100.0,
        );
    }

    println!("{}", report::console_summary(&engine, &history));
    println!("Reports written to {}", reporter.output_dir().display());
    Ok(())
}
