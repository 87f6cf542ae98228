//! Rolling-window factor portfolio backtest.
//!
//! At every rebalance date the backtester slices a trailing calendar window,
//! re-estimates the model on it from scratch, builds weights, and holds them
//! over the next block of realized returns. Nothing computed for one window
//! is reused by the next.

use crate::{
    BacktestError, ExposureCalculator, ExposureTable, PriceFrame, Result,
    estimator::{FactorReturnEstimator, FactorReturns},
    portfolio::{PortfolioWeights, TargetExposures, construct_portfolio},
    returns::ReturnSeries,
    window::WindowData,
};
use chrono::{Datelike, Days, NaiveDate};
use derive_more::Display;
use serde::{Deserialize, Serialize};
use std::{collections::BTreeMap, path::Path, str::FromStr, time::Instant};

/// How often the portfolio is rebalanced.
///
/// Each variant groups trading dates into periods; the last trading date of
/// each period is a rebalance date.
#[derive(Debug, Display, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum RebalanceFrequency {
    /// Every trading day
    Daily,
    /// Last trading day of each ISO week
    Weekly,
    /// Last trading day of each month
    MonthEnd,
    /// Last trading day of each calendar quarter
    QuarterEnd,
    /// Last trading day of each year
    YearEnd,
}

impl RebalanceFrequency {
    /// Period a date belongs to.
    pub fn period(self, date: NaiveDate) -> (i32, u32) {
        match self {
            Self::Daily => (date.year(), date.ordinal()),
            Self::Weekly => {
                let week = date.iso_week();
                (week.year(), week.week())
            }
            Self::MonthEnd => (date.year(), date.month()),
            Self::QuarterEnd => (date.year(), (date.month() - 1) / 3),
            Self::YearEnd => (date.year(), 0),
        }
    }
}

/// Accepts resampling codes (`D`, `W`, `M`, `ME`, `Q`, `QE`, `Y`, `YE`, `A`)
/// and the snake_case variant names.
impl FromStr for RebalanceFrequency {
    type Err = BacktestError;

    fn from_str(s: &str) -> Result<Self> {
        match s.trim() {
            "D" | "daily" => Ok(Self::Daily),
            "W" | "weekly" => Ok(Self::Weekly),
            "M" | "ME" | "month_end" => Ok(Self::MonthEnd),
            "Q" | "QE" | "quarter_end" => Ok(Self::QuarterEnd),
            "Y" | "YE" | "A" | "year_end" => Ok(Self::YearEnd),
            other => Err(BacktestError::InvalidFrequency(other.to_string())),
        }
    }
}

/// What happens when a holding block runs past the next rebalance date.
#[derive(Debug, Display, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum OverlapPolicy {
    /// Every block spans `holding_period` observations; a later rebalance
    /// overwrites the returns of dates the earlier block already covered.
    #[default]
    LastWriteWins,
    /// A block stops at the next rebalance date, so every date is written
    /// at most once.
    UntilNextRebalance,
}

/// Backtest parameters.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct BacktestConfig {
    /// Rebalance schedule
    pub rebalance_frequency: RebalanceFrequency,
    /// Trailing window length in calendar days
    pub window_days: u64,
    /// Number of return observations each rebalance is held for
    pub holding_period: usize,
    /// Handling of blocks that overlap the next rebalance
    pub overlap: OverlapPolicy,
    /// Target exposures, in allocation order
    pub target: TargetExposures,
    /// Symbol excluded from the tradable universe
    pub benchmark: Option<String>,
    /// Annualized risk-free rate for performance reporting
    pub risk_free_rate: f64,
}

impl Default for BacktestConfig {
    fn default() -> Self {
        Self {
            rebalance_frequency: RebalanceFrequency::MonthEnd,
            window_days: 252,
            holding_period: 20,
            overlap: OverlapPolicy::default(),
            target: TargetExposures::default(),
            benchmark: Some("SPY".to_string()),
            risk_free_rate: 0.02,
        }
    }
}

impl BacktestConfig {
    /// Parse a JSON config; missing fields take their defaults.
    pub fn from_json(json: &str) -> Result<Self> {
        Ok(serde_json::from_str(json)?)
    }

    /// Load a JSON config file.
    pub fn from_path(path: impl AsRef<Path>) -> Result<Self> {
        Self::from_json(&std::fs::read_to_string(path)?)
    }
}

/// The three model steps run at every rebalance.
pub trait FactorModel: Send + Sync + std::fmt::Debug {
    /// Exposures of the window's assets.
    fn exposures(&self, window: &WindowData) -> Result<ExposureTable>;

    /// Factor returns of the window given its exposures.
    fn factor_returns(&self, window: &WindowData, exposures: &ExposureTable)
    -> Result<FactorReturns>;

    /// Weights toward `target`.
    fn weights(
        &self,
        exposures: &ExposureTable,
        target: &TargetExposures,
        excluded: Option<&str>,
    ) -> PortfolioWeights;
}

/// Exposure calculator, OLS factor returns and greedy allocator.
#[derive(Debug, Clone, Default)]
pub struct LinearFactorModel {
    calculator: ExposureCalculator,
    estimator: FactorReturnEstimator,
}

impl LinearFactorModel {
    /// Model over a custom exposure calculator.
    pub const fn new(calculator: ExposureCalculator) -> Self {
        Self {
            calculator,
            estimator: FactorReturnEstimator,
        }
    }
}

impl FactorModel for LinearFactorModel {
    fn exposures(&self, window: &WindowData) -> Result<ExposureTable> {
        self.calculator.compute_window(window)
    }

    fn factor_returns(
        &self,
        window: &WindowData,
        exposures: &ExposureTable,
    ) -> Result<FactorReturns> {
        Ok(self.estimator.estimate(&window.returns_table()?, exposures))
    }

    fn weights(
        &self,
        exposures: &ExposureTable,
        target: &TargetExposures,
        excluded: Option<&str>,
    ) -> PortfolioWeights {
        construct_portfolio(exposures, target, excluded)
    }
}

/// Weights per rebalance date.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct WeightHistory(BTreeMap<NaiveDate, PortfolioWeights>);

impl WeightHistory {
    /// Create an empty history.
    pub const fn new() -> Self {
        Self(BTreeMap::new())
    }

    /// Record the weights of a rebalance date.
    pub fn insert(&mut self, date: NaiveDate, weights: PortfolioWeights) {
        self.0.insert(date, weights);
    }

    /// Weights at a rebalance date.
    pub fn get(&self, date: NaiveDate) -> Option<&PortfolioWeights> {
        self.0.get(&date)
    }

    /// Rebalance dates, ascending.
    pub fn dates(&self) -> impl Iterator<Item = NaiveDate> + '_ {
        self.0.keys().copied()
    }

    /// `(date, weights)` pairs in date order.
    pub fn iter(&self) -> impl Iterator<Item = (NaiveDate, &PortfolioWeights)> {
        self.0.iter().map(|(date, weights)| (*date, weights))
    }

    /// Number of rebalances.
    pub fn len(&self) -> usize {
        self.0.len()
    }

    /// Whether no rebalance was recorded.
    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }
}

impl FromIterator<(NaiveDate, PortfolioWeights)> for WeightHistory {
    fn from_iter<I: IntoIterator<Item = (NaiveDate, PortfolioWeights)>>(iter: I) -> Self {
        Self(iter.into_iter().collect())
    }
}

/// Model state of one rebalance.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RebalanceSnapshot {
    /// Rebalance date, the last day of the window
    pub date: NaiveDate,
    /// First calendar day of the window
    pub window_start: NaiveDate,
    /// Exposures estimated on the window
    pub exposures: ExposureTable,
    /// Factor returns estimated on the window
    pub factor_returns: FactorReturns,
    /// Weights over the full tradable universe
    pub weights: PortfolioWeights,
}

/// Output of a backtest run.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct BacktestResult {
    /// Realized daily portfolio returns
    pub returns: ReturnSeries,
    /// Weights at each rebalance date
    pub weights: WeightHistory,
    /// Model state of each rebalance, in date order
    pub snapshots: Vec<RebalanceSnapshot>,
    /// Whether the run stopped early at its deadline
    pub truncated: bool,
}

impl BacktestResult {
    /// Model state of the most recent rebalance.
    pub fn last_snapshot(&self) -> Option<&RebalanceSnapshot> {
        self.snapshots.last()
    }

    /// Whether no return was realized.
    pub fn is_empty(&self) -> bool {
        self.returns.is_empty()
    }
}

/// Last trading date of each period, ascending.
pub fn rebalance_dates(
    dates: impl IntoIterator<Item = NaiveDate>,
    frequency: RebalanceFrequency,
) -> Vec<NaiveDate> {
    let mut last_in_period: BTreeMap<(i32, u32), NaiveDate> = BTreeMap::new();
    for date in dates {
        last_in_period
            .entry(frequency.period(date))
            .and_modify(|last| *last = (*last).max(date))
            .or_insert(date);
    }
    let mut schedule: Vec<NaiveDate> = last_in_period.into_values().collect();
    schedule.sort_unstable();
    schedule
}

/// Runs the rolling-window simulation.
#[derive(Debug, Clone, Default)]
pub struct Backtester {
    config: BacktestConfig,
    deadline: Option<Instant>,
}

impl Backtester {
    /// Create a backtester with the given parameters.
    pub const fn new(config: BacktestConfig) -> Self {
        Self {
            config,
            deadline: None,
        }
    }

    /// Stop starting new rebalances once `deadline` has passed.
    ///
    /// Results up to the last completed rebalance are kept.
    #[must_use]
    pub fn with_deadline(mut self, deadline: Instant) -> Self {
        self.deadline = Some(deadline);
        self
    }

    /// Parameters of this backtester.
    pub const fn config(&self) -> &BacktestConfig {
        &self.config
    }

    /// Run the backtest over `data` with `model`.
    ///
    /// A window whose model step fails recoverably, or whose exposure table
    /// is empty, is held as an all-zero portfolio and the loop moves on.
    pub fn run(&self, data: &PriceFrame, model: &dyn FactorModel) -> Result<BacktestResult> {
        let benchmark = self.config.benchmark.as_deref();
        let returns = data.returns_table(benchmark)?;
        let universe = data.tradable_symbols(benchmark)?;
        let schedule = rebalance_dates(returns.dates(), self.config.rebalance_frequency);

        tracing::info!(
            rebalances = schedule.len(),
            assets = universe.len(),
            frequency = %self.config.rebalance_frequency,
            window_days = self.config.window_days,
            "starting backtest"
        );

        let mut result = BacktestResult::default();

        for (index, &date) in schedule.iter().enumerate() {
            if self.deadline.is_some_and(|deadline| Instant::now() >= deadline) {
                tracing::warn!(%date, completed = index, "deadline reached, stopping backtest");
                result.truncated = true;
                break;
            }

            let window_start = date
                .checked_sub_days(Days::new(self.config.window_days))
                .unwrap_or(NaiveDate::MIN);

            let mut snapshot = match self.rebalance(model, data, window_start, date) {
                Ok(snapshot) => snapshot,
                Err(err) if err.is_recoverable() => {
                    tracing::warn!(%date, error = %err, "rebalance failed, holding no positions");
                    RebalanceSnapshot {
                        date,
                        window_start,
                        exposures: ExposureTable::default(),
                        factor_returns: FactorReturns::default(),
                        weights: PortfolioWeights::zeros(Vec::<String>::new()),
                    }
                }
                Err(err) => return Err(err),
            };

            snapshot.weights = snapshot
                .weights
                .reindex(universe.iter().map(String::as_str));

            if snapshot.weights.is_degenerate() {
                tracing::warn!(
                    %date,
                    eligible = snapshot.exposures.len(),
                    "no allocatable assets in window, holding an all-zero portfolio"
                );
            }

            let block_end = match self.config.overlap {
                OverlapPolicy::LastWriteWins => None,
                OverlapPolicy::UntilNextRebalance => schedule.get(index + 1).copied(),
            };

            let mut realized = 0;
            for (day, row) in returns.after(date, self.config.holding_period) {
                if block_end.is_some_and(|end| day > end) {
                    break;
                }
                if result.returns.insert(day, snapshot.weights.apply(row)).is_some() {
                    tracing::trace!(%day, "overwriting return from earlier rebalance");
                }
                realized += 1;
            }

            tracing::debug!(
                %date,
                assets = snapshot.exposures.len(),
                dropped = snapshot.exposures.coverage().dropped.len(),
                fitted_dates = snapshot.factor_returns.len(),
                realized,
                "rebalanced"
            );

            result.weights.insert(date, snapshot.weights.clone());
            result.snapshots.push(snapshot);
        }

        tracing::info!(
            observations = result.returns.len(),
            rebalances = result.weights.len(),
            truncated = result.truncated,
            "backtest finished"
        );

        Ok(result)
    }

    fn rebalance(
        &self,
        model: &dyn FactorModel,
        data: &PriceFrame,
        window_start: NaiveDate,
        date: NaiveDate,
    ) -> Result<RebalanceSnapshot> {
        let benchmark = self.config.benchmark.as_deref();
        let window = WindowData::new(&data.slice(window_start, date)?, benchmark)?;

        let exposures = model.exposures(&window)?;
        let factor_returns = model.factor_returns(&window, &exposures)?;
        let weights = model.weights(&exposures, &self.config.target, benchmark);

        Ok(RebalanceSnapshot {
            date,
            window_start,
            exposures,
            factor_returns,
            weights,
        })
    }
}

/// Run a backtest with the default linear factor model.
pub fn backtest(data: &PriceFrame, config: BacktestConfig) -> Result<BacktestResult> {
    Backtester::new(config).run(data, &LinearFactorModel::default())
}
