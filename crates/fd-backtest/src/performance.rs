//! Performance metrics of a daily return series against a benchmark.
//!
//! All metrics assume daily simple returns and annualize with 252 periods
//! per year. Moments are sample moments (n − 1). A metric whose denominator
//! degenerates is reported as `NaN`.

use crate::{
    BacktestError, Result,
    backtest::WeightHistory,
    returns::ReturnSeries,
    stats::{covariance, mean, ratio, std_dev, variance},
};
use serde::{Deserialize, Serialize};
use std::{collections::BTreeMap, fmt};

/// Annualized risk-free rate used when none is given.
pub const DEFAULT_RISK_FREE_RATE: f64 = 0.02;

/// Trading periods per year.
pub const PERIODS_PER_YEAR: f64 = 252.0;

/// Evaluates a portfolio return series against a benchmark.
#[derive(Debug, Clone)]
pub struct PerformanceEvaluator {
    portfolio: Vec<f64>,
    benchmark: Vec<f64>,
    daily_risk_free_rate: f64,
}

impl PerformanceEvaluator {
    /// Evaluate on the dates both series have in common.
    pub fn aligned(
        portfolio: &ReturnSeries,
        benchmark: &ReturnSeries,
        risk_free_rate: f64,
    ) -> Result<Self> {
        let (portfolio, benchmark) = portfolio.align(benchmark);
        Self::from_slices(&portfolio, &benchmark, risk_free_rate)
    }

    /// Evaluate pre-aligned slices.
    ///
    /// The two slices are paired by position and must have equal length.
    pub fn from_slices(portfolio: &[f64], benchmark: &[f64], risk_free_rate: f64) -> Result<Self> {
        if portfolio.len() != benchmark.len() {
            return Err(BacktestError::LengthMismatch {
                portfolio: portfolio.len(),
                benchmark: benchmark.len(),
            });
        }
        if portfolio.is_empty() {
            return Err(BacktestError::EmptySeries(
                "no common portfolio and benchmark observations".to_string(),
            ));
        }

        Ok(Self {
            portfolio: portfolio.to_vec(),
            benchmark: benchmark.to_vec(),
            daily_risk_free_rate: (1.0 + risk_free_rate).powf(1.0 / PERIODS_PER_YEAR) - 1.0,
        })
    }

    /// Number of paired observations.
    pub fn len(&self) -> usize {
        self.portfolio.len()
    }

    /// Always false; construction rejects empty input.
    pub fn is_empty(&self) -> bool {
        self.portfolio.is_empty()
    }

    /// Daily rate equivalent to the annual risk-free rate.
    pub const fn daily_risk_free_rate(&self) -> f64 {
        self.daily_risk_free_rate
    }

    fn excess(&self, returns: &[f64]) -> Vec<f64> {
        returns.iter().map(|r| r - self.daily_risk_free_rate).collect()
    }

    fn active(&self) -> Vec<f64> {
        self.portfolio
            .iter()
            .zip(&self.benchmark)
            .map(|(p, b)| p - b)
            .collect()
    }

    /// Compounded return over the whole series.
    pub fn total_return(&self) -> f64 {
        self.portfolio.iter().map(|r| 1.0 + r).product::<f64>() - 1.0
    }

    /// Geometric annual return.
    pub fn annualized_return(&self) -> f64 {
        let years = self.portfolio.len() as f64 / PERIODS_PER_YEAR;
        let value = (1.0 + self.total_return()).powf(1.0 / years) - 1.0;
        if value.is_finite() { value } else { f64::NAN }
    }

    /// Annualized Sharpe ratio of excess returns.
    pub fn sharpe_ratio(&self) -> f64 {
        annualized_ratio(&self.excess(&self.portfolio))
    }

    /// Largest peak-to-trough decline of the compounded series, as a
    /// non-positive fraction.
    pub fn max_drawdown(&self) -> f64 {
        let mut cumulative = 1.0;
        let mut peak = f64::MIN;
        let mut worst = 0.0_f64;
        for r in &self.portfolio {
            cumulative *= 1.0 + r;
            peak = peak.max(cumulative);
            worst = worst.min(cumulative / peak - 1.0);
        }
        worst
    }

    /// Annualized alpha and beta of excess returns.
    ///
    /// Beta is the sample covariance over the sample variance of the
    /// benchmark, both with an `n − 1` denominator. A population variance in
    /// the denominator would give a beta larger by `n / (n − 1)`.
    pub fn alpha_beta(&self) -> (f64, f64) {
        let portfolio = self.excess(&self.portfolio);
        let benchmark = self.excess(&self.benchmark);

        let beta = match (covariance(&portfolio, &benchmark), variance(&benchmark)) {
            (Some(co), Some(var)) => ratio(co, var),
            _ => f64::NAN,
        };
        let alpha = match (mean(&portfolio), mean(&benchmark)) {
            (Some(p), Some(b)) => (p - beta * b) * PERIODS_PER_YEAR,
            _ => f64::NAN,
        };
        (alpha, beta)
    }

    /// Annualized mean active return over its volatility.
    pub fn information_ratio(&self) -> f64 {
        annualized_ratio(&self.active())
    }

    /// Annualized volatility of active returns.
    pub fn tracking_error(&self) -> f64 {
        std_dev(&self.active()).map_or(f64::NAN, |sd| PERIODS_PER_YEAR.sqrt() * sd)
    }

    /// Annualized mean excess return over downside deviation.
    ///
    /// Downside deviation is the root mean square of the negative excess
    /// returns only.
    pub fn sortino_ratio(&self) -> f64 {
        let excess = self.excess(&self.portfolio);
        let downside: Vec<f64> = excess.iter().filter(|r| **r < 0.0).map(|r| r * r).collect();
        match (mean(&excess), mean(&downside)) {
            (Some(m), Some(d)) => PERIODS_PER_YEAR.sqrt() * ratio(m, d.sqrt()),
            _ => f64::NAN,
        }
    }

    /// Annualized return over the magnitude of the maximum drawdown.
    pub fn calmar_ratio(&self) -> f64 {
        ratio(self.annualized_return(), self.max_drawdown().abs())
    }

    /// All metrics at once.
    pub fn summary(&self) -> PerformanceSummary {
        let (alpha, beta) = self.alpha_beta();
        PerformanceSummary {
            total_return: self.total_return(),
            annualized_return: self.annualized_return(),
            sharpe_ratio: self.sharpe_ratio(),
            max_drawdown: self.max_drawdown(),
            alpha,
            beta,
            information_ratio: self.information_ratio(),
            tracking_error: self.tracking_error(),
            sortino_ratio: self.sortino_ratio(),
            calmar_ratio: self.calmar_ratio(),
        }
    }
}

/// `√252 · mean / stdev`, NaN when undefined.
fn annualized_ratio(values: &[f64]) -> f64 {
    match (mean(values), std_dev(values)) {
        (Some(m), Some(sd)) => PERIODS_PER_YEAR.sqrt() * ratio(m, sd),
        _ => f64::NAN,
    }
}

/// Performance metrics of one portfolio.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct PerformanceSummary {
    /// Compounded return over the period
    pub total_return: f64,
    /// Geometric annual return
    pub annualized_return: f64,
    /// Annualized Sharpe ratio
    pub sharpe_ratio: f64,
    /// Maximum drawdown (≤ 0)
    pub max_drawdown: f64,
    /// Annualized alpha against the benchmark
    pub alpha: f64,
    /// Beta against the benchmark
    pub beta: f64,
    /// Annualized information ratio
    pub information_ratio: f64,
    /// Annualized tracking error
    pub tracking_error: f64,
    /// Annualized Sortino ratio
    pub sortino_ratio: f64,
    /// Calmar ratio
    pub calmar_ratio: f64,
}

impl PerformanceSummary {
    /// Metrics as `(label, value)` pairs in reporting order.
    pub fn metrics(&self) -> [(&'static str, f64); 10] {
        [
            ("Total Return", self.total_return),
            ("Annualized Return", self.annualized_return),
            ("Sharpe Ratio", self.sharpe_ratio),
            ("Max Drawdown", self.max_drawdown),
            ("Alpha", self.alpha),
            ("Beta", self.beta),
            ("Information Ratio", self.information_ratio),
            ("Tracking Error", self.tracking_error),
            ("Sortino Ratio", self.sortino_ratio),
            ("Calmar Ratio", self.calmar_ratio),
        ]
    }

    /// Metrics keyed by label.
    pub fn to_map(&self) -> BTreeMap<String, f64> {
        self.metrics()
            .into_iter()
            .map(|(label, value)| (label.to_string(), value))
            .collect()
    }
}

impl fmt::Display for PerformanceSummary {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        for (label, value) in self.metrics() {
            writeln!(f, "  {label:<18} {value:>10.4}")?;
        }
        Ok(())
    }
}

/// Average one-way turnover over the rebalance dates.
///
/// Each consecutive pair contributes `Σ|w_t − w_{t−1}| / 2`, with assets
/// missing on one side counted as zero weight. The first rebalance counts as
/// a change of zero, so the sum is divided by the number of rebalances.
/// Fewer than two rebalances give zero.
pub fn turnover(history: &WeightHistory) -> f64 {
    let snapshots: Vec<_> = history.iter().map(|(_, weights)| weights).collect();
    if snapshots.len() < 2 {
        return 0.0;
    }

    let changes: f64 = snapshots
        .windows(2)
        .map(|pair| {
            let (previous, current) = (pair[0], pair[1]);
            let assets: std::collections::BTreeSet<&str> = previous
                .iter()
                .chain(current.iter())
                .map(|(asset, _)| asset)
                .collect();
            assets
                .into_iter()
                .map(|asset| (current.get(asset) - previous.get(asset)).abs())
                .sum::<f64>()
                / 2.0
        })
        .sum();

    changes / snapshots.len() as f64
}
