//! Performance benchmarks for the solver and the optimisation pipeline.
//!
//! Run with: cargo bench

use ballast::constraints::ConstraintLimits;
use ballast::covariance;
use ballast::data::{ReturnsPanel, SectorMap};
use ballast::engine::{EngineConfig, PortfolioEngine};
use ballast::solver::{FrontierInputs, MarkowitzSolver};
use chrono::{Duration, NaiveDate};
use criterion::{black_box, criterion_group, criterion_main, BenchmarkId, Criterion};
use nalgebra::{DMatrix, DVector};

/// Generate a synthetic returns panel for benchmarking.
fn generate_panel(days: usize, assets: usize) -> ReturnsPanel {
    let start = NaiveDate::from_ymd_opt(2020, 1, 1).unwrap();
    let dates: Vec<NaiveDate> = (0..days)
        .map(|i| start + Duration::days(i as i64))
        .collect();
    let benchmark = DVector::from_fn(days, |i, _| ((i as f64) * 0.37).sin() * 0.006 + 0.0003);
    let returns = DMatrix::from_fn(days, assets, |i, j| {
        benchmark[i] * (1.0 + 0.1 * j as f64)
            + (((i * (j + 2)) as f64) * 0.61).cos() * 0.004
            + 0.0002 * (j as f64 + 1.0)
    });
    let names = (0..assets).map(|i| format!("A{}", i)).collect();
    ReturnsPanel::new(dates, names, returns, benchmark).unwrap()
}

/// Benchmark the closed-form solver across asset counts.
fn bench_solver(c: &mut Criterion) {
    let mut group = c.benchmark_group("solver");

    for assets in [4, 12, 32].iter() {
        let panel = generate_panel(400, *assets);
        let window = panel.window(400, 252).unwrap();
        let cov = covariance::sample_covariance(&window.returns).unwrap();
        let mean = covariance::column_means(&window.returns);
        let solver = MarkowitzSolver::new();

        group.bench_with_input(BenchmarkId::new("solve", assets), assets, |b, _| {
            b.iter(|| solver.solve(black_box(&mean), black_box(&cov), 0.0013))
        });
    }

    group.finish();
}

/// Benchmark the 50-point frontier sweep.
fn bench_frontier(c: &mut Criterion) {
    let panel = generate_panel(400, 12);
    let window = panel.window(400, 252).unwrap();
    let cov = covariance::sample_covariance(&window.returns).unwrap();
    let excess_cov = covariance::excess_covariance(&window.returns, &window.benchmark).unwrap();
    let mean = covariance::column_means(&window.returns);
    let excess_mean = covariance::column_means(&window.excess);
    let solver = MarkowitzSolver::new();
    let targets = MarkowitzSolver::target_grid(-0.001, 0.00005, 50);

    c.bench_function("frontier_sweep_50", |b| {
        b.iter(|| {
            let inputs = FrontierInputs {
                mean: &mean,
                covariance: &cov,
                excess_mean: &excess_mean,
                excess_covariance: &excess_cov,
            };
            solver.sweep(black_box(&inputs), black_box(&targets))
        })
    });
}

/// Benchmark a full optimisation pass.
fn bench_optimize(c: &mut Criterion) {
    let panel = generate_panel(600, 12);
    let config = EngineConfig {
        window_size: 252,
        limits: ConstraintLimits::none(),
        show_progress: false,
        ..EngineConfig::default()
    };
    let sectors = SectorMap::one_per_asset(panel.asset_names());
    let adv = vec![1e7; panel.num_assets()];
    let mut engine = PortfolioEngine::new(panel, sectors, adv, config).unwrap();

    c.bench_function("optimize_period", |b| {
        b.iter(|| engine.optimize(black_box(2)).unwrap())
    });
}

/// Benchmark covariance estimation.
fn bench_covariance(c: &mut Criterion) {
    let panel = generate_panel(400, 12);
    let window = panel.window(400, 252).unwrap();

    c.bench_function("sample_covariance_252x12", |b| {
        b.iter(|| covariance::sample_covariance(black_box(&window.returns)))
    });
}

criterion_group!(
    benches,
    bench_solver,
    bench_frontier,
    bench_optimize,
    bench_covariance
);
criterion_main!(benches);
