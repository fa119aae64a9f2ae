//! Returns-panel loading and calendar derivation.
//!
//! The input CSV carries one row per trading day: an index column, a
//! date, one column of decimal daily returns per asset, and a benchmark
//! return column. The panel is immutable after load; excess returns are
//! derived once at construction.

use crate::error::{PortfolioError, Result};
use chrono::{Datelike, NaiveDate};
use csv::ReaderBuilder;
use nalgebra::{DMatrix, DVector};
use std::collections::HashMap;
use std::path::Path;
use tracing::{debug, info};

/// Column layout and parsing options for the portfolio CSV.
#[derive(Debug, Clone)]
pub struct PanelConfig {
    /// Zero-based column holding the date.
    pub date_column: usize,
    /// Zero-based column of the first asset return.
    pub first_asset_column: usize,
    /// Zero-based benchmark column; defaults to the last column.
    pub benchmark_column: Option<usize>,
    /// Whether the file carries a header row (asset names are taken from
    /// it when present).
    pub has_headers: bool,
    /// Explicit date format; the common formats are tried otherwise.
    pub date_format: Option<String>,
}

impl Default for PanelConfig {
    fn default() -> Self {
        Self {
            date_column: 1,
            first_asset_column: 2,
            benchmark_column: None,
            has_headers: true,
            date_format: None,
        }
    }
}

/// Immutable panel of daily asset returns with an aligned benchmark.
#[derive(Debug, Clone)]
pub struct ReturnsPanel {
    dates: Vec<NaiveDate>,
    assets: Vec<String>,
    returns: DMatrix<f64>,
    benchmark: DVector<f64>,
    excess: DMatrix<f64>,
}

/// One trailing window over the panel, sliced per rebalance period.
#[derive(Debug, Clone)]
pub struct PanelWindow {
    pub returns: DMatrix<f64>,
    pub benchmark: DVector<f64>,
    pub excess: DMatrix<f64>,
}

impl ReturnsPanel {
    /// Build a panel from pre-parsed pieces, deriving excess returns.
    pub fn new(
        dates: Vec<NaiveDate>,
        assets: Vec<String>,
        returns: DMatrix<f64>,
        benchmark: DVector<f64>,
    ) -> Result<Self> {
        let t = returns.nrows();
        let n = returns.ncols();
        if t == 0 || n == 0 {
            return Err(PortfolioError::Input(
                "returns panel is empty".to_string(),
            ));
        }
        if dates.len() != t {
            return Err(PortfolioError::shape(
                "returns_panel",
                format!("{} dates for {} observations", dates.len(), t),
            ));
        }
        if benchmark.len() != t {
            return Err(PortfolioError::shape(
                "returns_panel",
                format!("benchmark of length {} for {} observations", benchmark.len(), t),
            ));
        }
        if assets.len() != n {
            return Err(PortfolioError::shape(
                "returns_panel",
                format!("{} asset names for {} columns", assets.len(), n),
            ));
        }

        let mut excess = returns.clone();
        for i in 0..t {
            for j in 0..n {
                excess[(i, j)] -= benchmark[i];
            }
        }

        Ok(Self {
            dates,
            assets,
            returns,
            benchmark,
            excess,
        })
    }

    /// Load a panel from the portfolio CSV.
    pub fn from_csv(path: impl AsRef<Path>, config: &PanelConfig) -> Result<Self> {
        let path = path.as_ref();
        info!("Loading returns panel from: {}", path.display());

        let mut reader = ReaderBuilder::new()
            .has_headers(config.has_headers)
            .flexible(true)
            .from_path(path)?;

        let mut header_names: Vec<String> = Vec::new();
        if config.has_headers {
            header_names = reader
                .headers()?
                .iter()
                .map(|h| h.trim().to_string())
                .collect();
        }

        let mut dates = Vec::new();
        let mut rows: Vec<Vec<f64>> = Vec::new();
        let mut benchmark = Vec::new();
        let mut num_assets: Option<usize> = None;

        for (row_idx, record) in reader.records().enumerate() {
            let record = record?;
            let row_num = row_idx + 1;

            let benchmark_column = config
                .benchmark_column
                .unwrap_or_else(|| record.len().saturating_sub(1));
            if benchmark_column <= config.first_asset_column || record.len() <= benchmark_column {
                return Err(PortfolioError::Input(format!(
                    "row {}: expected at least one asset column between {} and benchmark column {}",
                    row_num, config.first_asset_column, benchmark_column
                )));
            }

            let n = benchmark_column - config.first_asset_column;
            match num_assets {
                None => num_assets = Some(n),
                Some(expected) if expected != n => {
                    return Err(PortfolioError::Input(format!(
                        "row {}: found {} asset cells, expected {}",
                        row_num, n, expected
                    )));
                }
                _ => {}
            }

            let date_cell = record.get(config.date_column).ok_or_else(|| {
                PortfolioError::Input(format!("row {}: missing date column", row_num))
            })?;
            dates.push(parse_date(date_cell.trim(), config.date_format.as_deref())?);

            let mut row = Vec::with_capacity(n);
            for col in config.first_asset_column..benchmark_column {
                row.push(parse_cell(&record, col, row_num)?);
            }
            rows.push(row);
            benchmark.push(parse_cell(&record, benchmark_column, row_num)?);
        }

        let n = num_assets.ok_or_else(|| {
            PortfolioError::Input("input file contains no data rows".to_string())
        })?;
        let t = rows.len();
        debug!(days = t, assets = n, "parsed returns panel");

        let assets: Vec<String> = if header_names.len() > config.first_asset_column + n - 1 {
            header_names[config.first_asset_column..config.first_asset_column + n].to_vec()
        } else {
            (1..=n).map(|i| format!("Asset {}", i)).collect()
        };

        let returns = DMatrix::from_fn(t, n, |i, j| rows[i][j]);
        Self::new(dates, assets, returns, DVector::from_vec(benchmark))
    }

    pub fn num_days(&self) -> usize {
        self.returns.nrows()
    }

    pub fn num_assets(&self) -> usize {
        self.returns.ncols()
    }

    pub fn dates(&self) -> &[NaiveDate] {
        &self.dates
    }

    pub fn asset_names(&self) -> &[String] {
        &self.assets
    }

    pub fn returns(&self) -> &DMatrix<f64> {
        &self.returns
    }

    pub fn benchmark(&self) -> &DVector<f64> {
        &self.benchmark
    }

    pub fn excess(&self) -> &DMatrix<f64> {
        &self.excess
    }

    /// Mean daily return per asset.
    pub fn mean_returns(&self) -> DVector<f64> {
        crate::covariance::column_means(&self.returns)
    }

    /// Mean daily excess return per asset.
    pub fn mean_excess_returns(&self) -> DVector<f64> {
        crate::covariance::column_means(&self.excess)
    }

    /// Mean daily benchmark return.
    pub fn mean_benchmark_return(&self) -> f64 {
        self.benchmark.sum() / self.benchmark.len() as f64
    }

    /// First trading day of each calendar month, in input order.
    pub fn rebalance_calendar(&self) -> Vec<NaiveDate> {
        let mut calendar = Vec::new();
        let mut current_month: Option<(i32, u32)> = None;
        for date in &self.dates {
            let month = (date.year(), date.month());
            if current_month != Some(month) {
                calendar.push(*date);
                current_month = Some(month);
            }
        }
        calendar
    }

    /// Row index of the given date, if present.
    pub fn row_of(&self, date: NaiveDate) -> Option<usize> {
        self.dates.iter().position(|d| *d == date)
    }

    /// Trailing window of `size` rows ending at row `end` (exclusive).
    pub fn window(&self, end: usize, size: usize) -> Result<PanelWindow> {
        let returns = crate::matrix::trailing_rows(&self.returns, end, size)?;
        let excess = crate::matrix::trailing_rows(&self.excess, end, size)?;
        let benchmark = self.benchmark.rows(end - size, size).into_owned();
        Ok(PanelWindow {
            returns,
            benchmark,
            excess,
        })
    }
}

/// Mapping from asset index to sector name.
#[derive(Debug, Clone, Default)]
pub struct SectorMap {
    sectors: HashMap<usize, String>,
}

impl SectorMap {
    pub fn new() -> Self {
        Self::default()
    }

    /// Build from (asset index, sector) pairs.
    pub fn from_pairs(pairs: impl IntoIterator<Item = (usize, impl Into<String>)>) -> Self {
        Self {
            sectors: pairs.into_iter().map(|(i, s)| (i, s.into())).collect(),
        }
    }

    /// Every asset in its own sector, named after the asset. Used when
    /// the input carries no sector metadata.
    pub fn one_per_asset(assets: &[String]) -> Self {
        Self {
            sectors: assets
                .iter()
                .enumerate()
                .map(|(i, name)| (i, name.clone()))
                .collect(),
        }
    }

    pub fn insert(&mut self, asset: usize, sector: impl Into<String>) {
        self.sectors.insert(asset, sector.into());
    }

    /// Sector of an asset; fails when the asset has no assignment.
    pub fn sector_of(&self, asset: usize) -> Result<&str> {
        self.sectors
            .get(&asset)
            .map(String::as_str)
            .ok_or(PortfolioError::InvalidSectorMap(asset))
    }

    pub fn len(&self) -> usize {
        self.sectors.len()
    }

    pub fn is_empty(&self) -> bool {
        self.sectors.is_empty()
    }
}

/// Parse a date cell, trying the explicit format first and the common
/// layouts otherwise.
fn parse_date(cell: &str, format: Option<&str>) -> Result<NaiveDate> {
    if let Some(fmt) = format {
        return NaiveDate::parse_from_str(cell, fmt).map_err(PortfolioError::from);
    }

    const FORMATS: [&str; 4] = ["%m/%d/%Y", "%Y-%m-%d", "%m/%d/%y", "%d/%m/%Y"];
    for fmt in FORMATS {
        if let Ok(date) = NaiveDate::parse_from_str(cell, fmt) {
            return Ok(date);
        }
    }
    Err(PortfolioError::Input(format!(
        "could not parse date '{}'",
        cell
    )))
}

fn parse_cell(record: &csv::StringRecord, col: usize, row_num: usize) -> Result<f64> {
    let cell = record
        .get(col)
        .ok_or_else(|| PortfolioError::Input(format!("row {}: missing column {}", row_num, col)))?
        .trim();
    let value: f64 = cell.parse().map_err(|_| {
        PortfolioError::Input(format!(
            "row {}: non-numeric cell '{}' in column {}",
            row_num, cell, col
        ))
    })?;
    if !value.is_finite() {
        return Err(PortfolioError::Input(format!(
            "row {}: non-finite value in column {}",
            row_num, col
        )));
    }
    Ok(value)
}
