//! Shared fixtures for unit tests: deterministic synthetic panels and
//! pre-wired engines.

use crate::data::{ReturnsPanel, SectorMap};
use crate::engine::{EngineConfig, PortfolioEngine};
use chrono::{Duration, NaiveDate};
use nalgebra::{DMatrix, DVector};

/// Deterministic synthetic returns panel: assets track a sinusoidal
/// benchmark with asset-specific loadings plus phase-shifted noise, so
/// covariances are well-conditioned and the mean vector is never
/// collinear with the unit vector.
pub fn synthetic_panel(days: usize, assets: usize) -> ReturnsPanel {
    let start = NaiveDate::from_ymd_opt(2021, 1, 4).unwrap();
    let dates: Vec<NaiveDate> = (0..days)
        .map(|i| start + Duration::days(i as i64))
        .collect();

    let benchmark = DVector::from_fn(days, |i, _| ((i as f64) * 0.37).sin() * 0.006 + 0.0004);
    let returns = DMatrix::from_fn(days, assets, |i, j| {
        let loading = 1.0 + 0.15 * j as f64;
        let noise = (((i * (j + 2)) as f64) * 0.61).cos() * 0.004;
        let drift = 0.0002 * (j as f64 + 1.0);
        benchmark[i] * loading + noise + drift
    });

    let names = (0..assets).map(|i| format!("A{}", i)).collect();
    ReturnsPanel::new(dates, names, returns, benchmark).unwrap()
}

/// Engine over a panel with per-asset sectors and uniform ADV.
pub fn engine_for_panel(panel: ReturnsPanel, config: EngineConfig) -> PortfolioEngine {
    let sectors = SectorMap::one_per_asset(panel.asset_names());
    let adv = vec![1e7; panel.num_assets()];
    PortfolioEngine::new(panel, sectors, adv, config).unwrap()
}
