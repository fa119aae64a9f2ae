//! Report writers for the optimisation and rebalance outputs.
//!
//! The reporters are boundary collaborators: all file IO lives here, and
//! the engine's fractional units are converted to display percentages at
//! write time.

use crate::constraints::sector_exposures;
use crate::engine::PortfolioEngine;
use crate::error::Result;
use crate::metrics::PortfolioRisk;
use crate::rebalance::RebalanceRecord;
use colored::Colorize;
use std::fs::{self, File};
use std::io::{BufWriter, Write};
use std::path::{Path, PathBuf};
use tabled::{builder::Builder, settings::Style};
use tracing::info;

/// Writes portfolio, risk and final-analysis reports into one directory.
#[derive(Debug, Clone)]
pub struct Reporter {
    output_dir: PathBuf,
    precision: usize,
}

impl Reporter {
    pub fn new(output_dir: impl Into<PathBuf>) -> Self {
        Self {
            output_dir: output_dir.into(),
            precision: 6,
        }
    }

    pub fn with_precision(mut self, precision: usize) -> Self {
        self.precision = precision;
        self
    }

    pub fn output_dir(&self) -> &Path {
        &self.output_dir
    }

    /// Write the weights / metrics / frontier CSV for one period.
    pub fn write_portfolio_csv(
        &self,
        date_label: &str,
        engine: &PortfolioEngine,
    ) -> Result<PathBuf> {
        let path = self.prepare(format!("portfolio_{}.csv", date_label))?;
        let mut out = BufWriter::new(File::create(&path)?);
        let p = self.precision;

        writeln!(out, "Portfolio Weights Analysis")?;
        writeln!(out, "Asset,TE Weight,MPT Weight")?;
        for (i, name) in engine.panel().asset_names().iter().enumerate() {
            writeln!(
                out,
                "{},{:.p$},{:.p$}",
                name,
                engine.te_weights()[i],
                engine.mpt_weights()[i],
            )?;
        }

        if let Some(risk) = engine.risk() {
            let days_per_month = engine.config().trading_days_per_month as f64;
            let benchmark_daily = engine.panel().mean_benchmark_return();
            writeln!(out)?;
            writeln!(out, "Performance Metrics")?;
            writeln!(out, "Metric,Value")?;
            writeln!(out, "Daily Portfolio Return,{:.p$}", risk.mean_daily_return)?;
            writeln!(
                out,
                "Monthly Portfolio Return,{:.p$}",
                (1.0 + risk.mean_daily_return).powf(days_per_month) - 1.0,
            )?;
            writeln!(out, "Daily Benchmark Return,{:.p$}", benchmark_daily)?;
            writeln!(
                out,
                "Monthly Benchmark Return,{:.p$}",
                (1.0 + benchmark_daily).powf(days_per_month) - 1.0,
            )?;
            writeln!(out, "Daily Portfolio Volatility,{:.p$}", risk.daily_volatility)?;
            writeln!(
                out,
                "Monthly Portfolio Volatility,{:.p$}",
                risk.monthly_volatility,
            )?;
            writeln!(out, "Tracking Error,{:.p$}", risk.tracking_error)?;
        }

        writeln!(out)?;
        writeln!(out, "Efficient Frontier")?;
        writeln!(out, "Expected Return,Tracking Error,Portfolio Volatility")?;
        for point in engine.frontier() {
            writeln!(
                out,
                "{:.p$},{:.p$},{:.p$}",
                point.target_return, point.tracking_error, point.volatility,
            )?;
        }

        info!("wrote portfolio report to {}", path.display());
        Ok(path)
    }

    /// Write the human-readable risk report for one period.
    pub fn write_risk_report(
        &self,
        date_label: &str,
        engine: &PortfolioEngine,
        cost_fraction: f64,
    ) -> Result<PathBuf> {
        let path = self.prepare(format!("risk_report_{}.txt", date_label))?;
        let mut out = BufWriter::new(File::create(&path)?);

        writeln!(out, "Portfolio Statistics")?;
        writeln!(out, "===================")?;
        writeln!(out)?;

        writeln!(out, "Portfolio Composition:")?;
        writeln!(out, "---------------------")?;
        let weights = engine.te_weights();
        let mut total = 0.0;
        for (i, name) in engine.panel().asset_names().iter().enumerate() {
            writeln!(out, "{}: {:.2}%", name, weights[i] * 100.0)?;
            total += weights[i];
        }
        writeln!(out, "Total Weight: {:.2}%", total * 100.0)?;
        writeln!(out)?;

        if let Some(risk) = engine.risk() {
            let confidence = engine.config().risk.confidence_level * 100.0;
            writeln!(out, "Risk Metrics:")?;
            writeln!(out, "-------------")?;
            writeln!(out, "Daily Volatility:       {:.4}%", risk.daily_volatility * 100.0)?;
            writeln!(out, "Monthly Volatility:     {:.4}%", risk.monthly_volatility * 100.0)?;
            writeln!(out, "Annualized Volatility:  {:.4}%", risk.annualized_volatility * 100.0)?;
            writeln!(out, "Tracking Error:         {:.4}%", risk.tracking_error * 100.0)?;
            writeln!(out, "Value at Risk ({:.0}%):   {:.4}%", confidence, risk.value_at_risk * 100.0)?;
            writeln!(out, "Conditional VaR ({:.0}%): {:.4}%", confidence, risk.expected_shortfall * 100.0)?;
            writeln!(out, "Sharpe Ratio:           {:.4}", risk.sharpe_ratio)?;
            writeln!(out, "Sortino Ratio:          {:.4}", risk.sortino_ratio)?;
            writeln!(out, "Information Ratio:      {:.4}", risk.information_ratio)?;
            writeln!(out, "Beta:                   {:.4}", risk.beta)?;
            writeln!(out, "Alpha:                  {:.4}%", risk.alpha * 100.0)?;
            writeln!(out, "Maximum Drawdown:       {:.2}%", risk.max_drawdown * 100.0)?;
            writeln!(out)?;
        }

        let exposures = sector_exposures(engine.te_weights(), engine.sector_map())?;
        if !exposures.is_empty() {
            writeln!(out, "Sector Exposures:")?;
            writeln!(out, "-----------------")?;
            let mut sorted: Vec<_> = exposures.into_iter().collect();
            sorted.sort_by(|a, b| a.0.cmp(&b.0));
            for (sector, exposure) in sorted {
                writeln!(out, "{}: {:.2}%", sector, exposure * 100.0)?;
            }
            writeln!(out)?;
        }

        writeln!(out, "Transaction Costs:")?;
        writeln!(out, "------------------")?;
        writeln!(
            out,
            "Estimated rebalancing cost: {:.4}% of portfolio value",
            cost_fraction * 100.0,
        )?;

        info!("wrote risk report to {}", path.display());
        Ok(path)
    }

    /// Write the end-of-run aggregate: rebalance history and final
    /// weights.
    pub fn write_final_analysis(
        &self,
        engine: &PortfolioEngine,
        history: &[RebalanceRecord],
    ) -> Result<PathBuf> {
        let path = self.prepare("final_portfolio_analysis.csv".to_string())?;
        let mut out = BufWriter::new(File::create(&path)?);
        let p = self.precision;

        writeln!(out, "Rebalance History")?;
        writeln!(out, "Date,Accepted,Turnover,Cost Fraction,Expected Benefit")?;
        for record in history {
            writeln!(
                out,
                "{},{},{:.p$},{:.p$},{:.p$}",
                record.date, record.accepted, record.turnover, record.cost_fraction,
                record.expected_benefit,
            )?;
        }

        writeln!(out)?;
        writeln!(out, "Final Weights")?;
        writeln!(out, "Asset,Weight")?;
        for (i, name) in engine.panel().asset_names().iter().enumerate() {
            writeln!(out, "{},{:.p$}", name, engine.current_weights()[i])?;
        }

        info!("wrote final analysis to {}", path.display());
        Ok(path)
    }

    /// Serialise the risk record as JSON next to the text reports.
    pub fn write_risk_json(&self, date_label: &str, risk: &PortfolioRisk) -> Result<PathBuf> {
        let path = self.prepare(format!("risk_{}.json", date_label))?;
        let file = File::create(&path)?;
        serde_json::to_writer_pretty(BufWriter::new(file), risk)?;
        Ok(path)
    }

    fn prepare(&self, filename: String) -> Result<PathBuf> {
        fs::create_dir_all(&self.output_dir)?;
        Ok(self.output_dir.join(filename))
    }
}

/// Console summary of a finished run.
pub fn console_summary(engine: &PortfolioEngine, history: &[RebalanceRecord]) -> String {
    let mut builder = Builder::default();
    builder.push_record(["Asset", "TE Weight", "MPT Weight"]);
    for (i, name) in engine.panel().asset_names().iter().enumerate() {
        builder.push_record([
            name.clone(),
            format!("{:.4}", engine.te_weights()[i]),
            format!("{:.4}", engine.mpt_weights()[i]),
        ]);
    }
    let table = builder.build().with(Style::rounded()).to_string();

    let accepted = history.iter().filter(|r| r.accepted).count();
    let mut lines = vec![
        format!("{}", "Portfolio optimization complete".bold().green()),
        table,
    ];
    if let Some(risk) = engine.risk() {
        lines.push(format!(
            "Tracking error {:.2}% | Sharpe {:.2} | Max drawdown {:.2}%",
            risk.tracking_error * 100.0,
            risk.sharpe_ratio,
            risk.max_drawdown * 100.0,
        ));
    }
    lines.push(format!(
        "{} of {} rebalances accepted",
        accepted,
        history.len(),
    ));
    lines.join("\n")
}
