//! Portfolio risk and performance metrics.
//!
//! All scalars are computed on daily data. Volatility-like quantities are
//! annualised with √252 (monthly with √21); ratio metrics guard their
//! denominators and fail with a degenerate-metric error instead of
//! returning ±∞.

use crate::error::{PortfolioError, Result};
use crate::matrix;
use nalgebra::{DMatrix, DVector};
use serde::{Deserialize, Serialize};

/// Trading days per year used for annualisation.
pub const TRADING_DAYS_PER_YEAR: usize = 252;

/// Trading days per month used for monthly scaling.
pub const TRADING_DAYS_PER_MONTH: usize = 21;

/// Tolerance below which a beta denominator is considered zero.
const BETA_TOLERANCE: f64 = 1e-6;

/// Parameters shared by the metric calculations.
#[derive(Debug, Clone, Copy, Serialize, Deserialize)]
pub struct RiskParameters {
    /// Daily risk-free rate.
    pub risk_free_rate: f64,
    /// Confidence level for VaR and expected shortfall (e.g. 0.95).
    pub confidence_level: f64,
    /// Daily threshold return for the Sortino downside deviation.
    pub target_return: f64,
    /// Trading days per year for annualisation.
    pub trading_days_per_year: usize,
}

impl Default for RiskParameters {
    fn default() -> Self {
        Self {
            risk_free_rate: 0.0,
            confidence_level: 0.95,
            target_return: 0.0,
            trading_days_per_year: TRADING_DAYS_PER_YEAR,
        }
    }
}

/// Complete risk record for one set of portfolio weights.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PortfolioRisk {
    /// Mean daily portfolio return.
    pub mean_daily_return: f64,
    /// Daily portfolio volatility √(wᵀΣw).
    pub daily_volatility: f64,
    /// Monthly volatility (daily · √21).
    pub monthly_volatility: f64,
    /// Annualised volatility (daily · √252).
    pub annualized_volatility: f64,
    /// Annualised tracking error √(wᵀΣᵉw) · √252.
    pub tracking_error: f64,
    /// Portfolio beta against the benchmark.
    pub beta: f64,
    /// Jensen's alpha (daily).
    pub alpha: f64,
    /// Information ratio (daily excess return / tracking error).
    pub information_ratio: f64,
    /// Sharpe ratio (daily excess return / daily volatility).
    pub sharpe_ratio: f64,
    /// Sortino ratio about the configured threshold.
    pub sortino_ratio: f64,
    /// Treynor ratio (excess return / beta).
    pub treynor_ratio: f64,
    /// Maximum peak-to-trough drawdown of the compounded value series.
    pub max_drawdown: f64,
    /// Historical value at risk at the configured confidence level.
    pub value_at_risk: f64,
    /// Expected shortfall at the configured confidence level.
    pub expected_shortfall: f64,
}

/// Calculator for portfolio risk metrics.
#[derive(Debug, Clone)]
pub struct RiskMetrics {
    params: RiskParameters,
    annualization_factor: f64,
}

impl Default for RiskMetrics {
    fn default() -> Self {
        Self::new(RiskParameters::default())
    }
}

impl RiskMetrics {
    pub fn new(params: RiskParameters) -> Self {
        let annualization_factor = (params.trading_days_per_year as f64).sqrt();
        Self {
            params,
            annualization_factor,
        }
    }

    pub fn params(&self) -> &RiskParameters {
        &self.params
    }

    /// Compute the full risk record for one weight vector.
    pub fn calculate(
        &self,
        weights: &DVector<f64>,
        returns: &DMatrix<f64>,
        covariance: &DMatrix<f64>,
        excess_covariance: &DMatrix<f64>,
        benchmark: &DVector<f64>,
    ) -> Result<PortfolioRisk> {
        let daily_volatility = self.volatility(weights, covariance, false)?;
        let tracking_error = self.tracking_error(weights, excess_covariance)?;

        let portfolio_returns = portfolio_returns(weights, returns)?;
        let mean_daily_return = portfolio_returns.sum() / portfolio_returns.len() as f64;
        let excess_return = mean_daily_return - self.params.risk_free_rate;

        let beta = self.beta(&portfolio_returns, benchmark)?;
        let alpha = self.alpha(&portfolio_returns, benchmark, beta);

        Ok(PortfolioRisk {
            mean_daily_return,
            daily_volatility,
            monthly_volatility: daily_volatility * (TRADING_DAYS_PER_MONTH as f64).sqrt(),
            annualized_volatility: daily_volatility * self.annualization_factor,
            tracking_error,
            beta,
            alpha,
            information_ratio: self.information_ratio(excess_return, tracking_error)?,
            sharpe_ratio: self.sharpe_ratio(mean_daily_return, daily_volatility)?,
            sortino_ratio: self.sortino_ratio(&portfolio_returns)?,
            treynor_ratio: self.treynor_ratio(mean_daily_return, beta)?,
            max_drawdown: max_drawdown(&portfolio_returns),
            value_at_risk: self.value_at_risk(&portfolio_returns)?,
            expected_shortfall: self.expected_shortfall(&portfolio_returns)?,
        })
    }

    /// Portfolio volatility √(wᵀΣw), optionally annualised.
    pub fn volatility(
        &self,
        weights: &DVector<f64>,
        covariance: &DMatrix<f64>,
        annualized: bool,
    ) -> Result<f64> {
        let variance = matrix::quadratic_form(weights, covariance, "volatility")?;
        if variance < 0.0 || !variance.is_finite() {
            return Err(PortfolioError::numerical(
                "volatility",
                format!("non-finite or negative variance {}", variance),
            ));
        }
        let vol = variance.sqrt();
        Ok(if annualized {
            vol * self.annualization_factor
        } else {
            vol
        })
    }

    /// Annualised tracking error √(wᵀΣᵉw) · √(trading days).
    pub fn tracking_error(
        &self,
        weights: &DVector<f64>,
        excess_covariance: &DMatrix<f64>,
    ) -> Result<f64> {
        let variance = matrix::quadratic_form(weights, excess_covariance, "tracking_error")?;
        if variance < 0.0 || !variance.is_finite() {
            return Err(PortfolioError::numerical(
                "tracking_error",
                format!("non-finite or negative variance {}", variance),
            ));
        }
        Ok(variance.sqrt() * self.annualization_factor)
    }

    /// Beta of a return series against the benchmark (unbiased divisors).
    pub fn beta(&self, portfolio_returns: &DVector<f64>, benchmark: &DVector<f64>) -> Result<f64> {
        beta(portfolio_returns, benchmark)
    }

    /// Jensen's alpha: return net of the CAPM-predicted return.
    pub fn alpha(
        &self,
        portfolio_returns: &DVector<f64>,
        benchmark: &DVector<f64>,
        beta: f64,
    ) -> f64 {
        let p_mean = portfolio_returns.sum() / portfolio_returns.len() as f64;
        let b_mean = benchmark.sum() / benchmark.len() as f64;
        let rf = self.params.risk_free_rate;
        p_mean - (rf + beta * (b_mean - rf))
    }

    /// Information ratio; fails when the tracking error is not positive.
    pub fn information_ratio(&self, excess_return: f64, tracking_error: f64) -> Result<f64> {
        if tracking_error <= 0.0 {
            return Err(PortfolioError::degenerate(
                "information_ratio",
                format!("tracking error must be positive, got {}", tracking_error),
            ));
        }
        Ok(excess_return / tracking_error)
    }

    /// Sharpe ratio; fails when the volatility is not positive.
    pub fn sharpe_ratio(&self, portfolio_return: f64, volatility: f64) -> Result<f64> {
        if volatility <= 0.0 {
            return Err(PortfolioError::degenerate(
                "sharpe_ratio",
                format!("volatility must be positive, got {}", volatility),
            ));
        }
        Ok((portfolio_return - self.params.risk_free_rate) / volatility)
    }

    /// Sortino ratio about the configured threshold return.
    pub fn sortino_ratio(&self, portfolio_returns: &DVector<f64>) -> Result<f64> {
        let threshold = self.params.target_return;
        let downside = downside_deviation(portfolio_returns, threshold);
        if downside <= 0.0 {
            return Err(PortfolioError::degenerate(
                "sortino_ratio",
                "downside deviation is zero (no returns below the threshold)",
            ));
        }
        let mean = portfolio_returns.sum() / portfolio_returns.len() as f64;
        Ok((mean - threshold) / downside)
    }

    /// Treynor ratio; fails when |beta| is below tolerance.
    pub fn treynor_ratio(&self, portfolio_return: f64, beta: f64) -> Result<f64> {
        if beta.abs() < BETA_TOLERANCE {
            return Err(PortfolioError::degenerate(
                "treynor_ratio",
                format!("beta {:.2e} is too close to zero", beta),
            ));
        }
        Ok((portfolio_return - self.params.risk_free_rate) / beta)
    }

    /// Historical value at risk: the negated return at index
    /// ⌊(1 − α)·T⌋ of the ascending sort.
    pub fn value_at_risk(&self, portfolio_returns: &DVector<f64>) -> Result<f64> {
        let sorted = sorted_returns(portfolio_returns)?;
        let index = tail_index(sorted.len(), self.params.confidence_level);
        Ok(-sorted[index.min(sorted.len() - 1)])
    }

    /// Expected shortfall: negated mean of the tail below the VaR cutoff.
    pub fn expected_shortfall(&self, portfolio_returns: &DVector<f64>) -> Result<f64> {
        let sorted = sorted_returns(portfolio_returns)?;
        let cutoff = tail_index(sorted.len(), self.params.confidence_level);
        if cutoff == 0 {
            return Err(PortfolioError::degenerate(
                "expected_shortfall",
                "tail is empty at this confidence level",
            ));
        }
        let tail_sum: f64 = sorted[..cutoff].iter().sum();
        Ok(-tail_sum / cutoff as f64)
    }

    /// Gaussian (parametric) VaR from a mean and standard deviation.
    pub fn parametric_var(&self, mean: f64, std_dev: f64) -> Result<f64> {
        if std_dev < 0.0 {
            return Err(PortfolioError::InvalidInput(
                "standard deviation must be non-negative".to_string(),
            ));
        }
        let z = inverse_normal_cdf(1.0 - self.params.confidence_level)?;
        Ok(-(mean + z * std_dev))
    }

    /// Per-asset risk contributions (Σw)∘w / √(wᵀΣw).
    pub fn risk_contribution(
        &self,
        weights: &DVector<f64>,
        covariance: &DMatrix<f64>,
    ) -> Result<DVector<f64>> {
        let variance = matrix::quadratic_form(weights, covariance, "risk_contribution")?;
        if variance <= 0.0 {
            return Err(PortfolioError::degenerate(
                "risk_contribution",
                "portfolio variance is not positive",
            ));
        }
        let vol = variance.sqrt();
        let marginal = covariance * weights;
        Ok(marginal.component_mul(weights) / vol)
    }

    /// Component VaR: risk contributions scaled by the portfolio VaR.
    pub fn component_var(
        &self,
        weights: &DVector<f64>,
        returns: &DMatrix<f64>,
        covariance: &DMatrix<f64>,
    ) -> Result<DVector<f64>> {
        let portfolio_returns = portfolio_returns(weights, returns)?;
        let var = self.value_at_risk(&portfolio_returns)?;
        let contribution = self.risk_contribution(weights, covariance)?;
        let total: f64 = contribution.sum();
        if total.abs() < f64::EPSILON {
            return Err(PortfolioError::degenerate(
                "component_var",
                "total risk contribution is zero",
            ));
        }
        Ok(contribution * (var / total))
    }

    /// Rolling annualised volatility of the weighted portfolio over
    /// windows of size `window`; produces T − window + 1 values.
    pub fn rolling_volatility(
        &self,
        weights: &DVector<f64>,
        returns: &DMatrix<f64>,
        window: usize,
    ) -> Result<Vec<f64>> {
        let series = portfolio_returns(weights, returns)?;
        rolling_windows(&series, window, |slice| {
            Ok(std_dev(slice) * self.annualization_factor)
        })
    }

    /// Rolling beta of the weighted portfolio against the benchmark. The
    /// portfolio return series is recomputed per window from the fixed
    /// weights under evaluation.
    pub fn rolling_beta(
        &self,
        weights: &DVector<f64>,
        returns: &DMatrix<f64>,
        benchmark: &DVector<f64>,
        window: usize,
    ) -> Result<Vec<f64>> {
        if benchmark.len() != returns.nrows() {
            return Err(PortfolioError::shape(
                "rolling_beta",
                format!(
                    "benchmark of length {} does not align with {} observations",
                    benchmark.len(),
                    returns.nrows()
                ),
            ));
        }
        check_window(returns.nrows(), window)?;

        let mut betas = Vec::with_capacity(returns.nrows() - window + 1);
        for start in 0..=(returns.nrows() - window) {
            let window_returns = returns.rows(start, window).into_owned();
            let window_bench = benchmark.rows(start, window).into_owned();
            let series = portfolio_returns(weights, &window_returns)?;
            betas.push(self.beta(&series, &window_bench)?);
        }
        Ok(betas)
    }

    /// Rolling Sharpe ratio over windows of size `window`.
    pub fn rolling_sharpe(
        &self,
        weights: &DVector<f64>,
        returns: &DMatrix<f64>,
        window: usize,
    ) -> Result<Vec<f64>> {
        let series = portfolio_returns(weights, returns)?;
        rolling_windows(&series, window, |slice| {
            let mean = slice.iter().sum::<f64>() / slice.len() as f64;
            let vol = std_dev(slice);
            self.sharpe_ratio(mean, vol)
        })
    }
}

/// Beta of a return series against a benchmark (unbiased divisors).
pub fn beta(portfolio_returns: &DVector<f64>, benchmark: &DVector<f64>) -> Result<f64> {
    matrix::check_same_len(portfolio_returns, benchmark, "beta")?;
    let t = portfolio_returns.len();
    if t < 2 {
        return Err(PortfolioError::InvalidInput(
            "beta needs at least 2 observations".to_string(),
        ));
    }

    let p_mean = portfolio_returns.sum() / t as f64;
    let b_mean = benchmark.sum() / t as f64;

    let mut covar = 0.0;
    let mut bench_var = 0.0;
    for i in 0..t {
        covar += (portfolio_returns[i] - p_mean) * (benchmark[i] - b_mean);
        bench_var += (benchmark[i] - b_mean).powi(2);
    }
    covar /= t as f64 - 1.0;
    bench_var /= t as f64 - 1.0;

    if bench_var < BETA_TOLERANCE * BETA_TOLERANCE {
        return Err(PortfolioError::degenerate(
            "beta",
            "benchmark variance is numerically zero",
        ));
    }
    Ok(covar / bench_var)
}

/// Daily portfolio return series p[t] = Σ_a w_a · R[t,a].
pub fn portfolio_returns(weights: &DVector<f64>, returns: &DMatrix<f64>) -> Result<DVector<f64>> {
    if returns.ncols() != weights.len() {
        return Err(PortfolioError::shape(
            "portfolio_returns",
            format!(
                "weights of length {} incompatible with {} assets",
                weights.len(),
                returns.ncols()
            ),
        ));
    }
    Ok(returns * weights)
}

/// Maximum peak-to-trough drawdown of the compounded value series.
pub fn max_drawdown(portfolio_returns: &DVector<f64>) -> f64 {
    let mut value: f64 = 1.0;
    let mut peak: f64 = 1.0;
    let mut max_dd: f64 = 0.0;
    for r in portfolio_returns.iter() {
        value *= 1.0 + r;
        peak = peak.max(value);
        max_dd = f64::max(max_dd, (peak - value) / peak);
    }
    max_dd
}

/// Downside deviation about a threshold: root mean square of the
/// shortfalls of returns below the threshold.
pub fn downside_deviation(portfolio_returns: &DVector<f64>, threshold: f64) -> f64 {
    let mut sum_sq = 0.0;
    let mut count = 0usize;
    for r in portfolio_returns.iter() {
        if *r < threshold {
            sum_sq += (threshold - r).powi(2);
            count += 1;
        }
    }
    if count == 0 {
        0.0
    } else {
        (sum_sq / count as f64).sqrt()
    }
}

fn sorted_returns(portfolio_returns: &DVector<f64>) -> Result<Vec<f64>> {
    if portfolio_returns.is_empty() {
        return Err(PortfolioError::InvalidInput(
            "return series is empty".to_string(),
        ));
    }
    let mut sorted: Vec<f64> = portfolio_returns.iter().copied().collect();
    if sorted.iter().any(|v| !v.is_finite()) {
        return Err(PortfolioError::numerical(
            "value_at_risk",
            "return series contains non-finite values",
        ));
    }
    sorted.sort_by(|a, b| a.partial_cmp(b).unwrap());
    Ok(sorted)
}

fn tail_index(len: usize, confidence_level: f64) -> usize {
    ((1.0 - confidence_level) * len as f64).floor() as usize
}

fn check_window(len: usize, window: usize) -> Result<()> {
    if window < 2 || window > len {
        return Err(PortfolioError::InvalidInput(format!(
            "window of {} does not fit a series of {} observations",
            window, len
        )));
    }
    Ok(())
}

fn rolling_windows<F>(series: &DVector<f64>, window: usize, mut f: F) -> Result<Vec<f64>>
where
    F: FnMut(&[f64]) -> Result<f64>,
{
    check_window(series.len(), window)?;
    let values = series.as_slice();
    values.windows(window).map(|slice| f(slice)).collect()
}

fn std_dev(slice: &[f64]) -> f64 {
    let n = slice.len() as f64;
    let mean = slice.iter().sum::<f64>() / n;
    let var = slice.iter().map(|v| (v - mean).powi(2)).sum::<f64>() / (n - 1.0);
    var.sqrt()
}

/// Inverse standard-normal CDF via the Beasley-Springer-Moro
/// approximation. Accurate to ~1e-9 over (0, 1).
fn inverse_normal_cdf(p: f64) -> Result<f64> {
    if !(0.0..1.0).contains(&p) || p == 0.0 {
        return Err(PortfolioError::InvalidInput(format!(
            "quantile probability must be in (0, 1), got {}",
            p
        )));
    }

    const A: [f64; 4] = [2.50662823884, -18.61500062529, 41.39119773534, -25.44106049637];
    const B: [f64; 4] = [-8.47351093090, 23.08336743743, -21.06224101826, 3.13082909833];
    const C: [f64; 9] = [
        0.3374754822726147,
        0.9761690190917186,
        0.1607979714918209,
        0.0276438810333863,
        0.0038405729373609,
        0.0003951896511919,
        0.0000321767881768,
        0.0000002888167364,
        0.0000003960315187,
    ];

    let y = p - 0.5;
    if y.abs() < 0.42 {
        let r = y * y;
        let num = y * (((A[3] * r + A[2]) * r + A[1]) * r + A[0]);
        let den = (((B[3] * r + B[2]) * r + B[1]) * r + B[0]) * r + 1.0;
        return Ok(num / den);
    }

    let r = if y > 0.0 { 1.0 - p } else { p };
    let s = (-r.ln()).ln();
    let mut x = C[0];
    let mut power = 1.0;
    for coeff in &C[1..] {
        power *= s;
        x += coeff * power;
    }
    Ok(if y < 0.0 { -x } else { x })
}
