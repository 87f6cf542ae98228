//! Error types for model estimation and backtesting.

use thiserror::Error;

/// Result type for backtest operations.
pub type Result<T> = std::result::Result<T, BacktestError>;

/// Errors that can occur while estimating the model or running a backtest.
///
/// Undefined numeric values (a missing exposure, an infeasible regression
/// date) are not errors; they are represented as `None` or absent entries.
/// Variants here are data-contract violations the caller must see.
#[derive(Debug, Error)]
pub enum BacktestError {
    /// Missing required column in input data
    #[error("Missing required column: {0}")]
    MissingColumn(String),

    /// The same symbol appears twice on one date
    #[error("Duplicate observation for {symbol} on {date}")]
    DuplicateObservation {
        /// Symbol with the duplicate row
        symbol: String,
        /// Date that appears more than once
        date: String,
    },

    /// Invalid date range
    #[error("Invalid date range: start {start} is after end {end}")]
    InvalidDateRange {
        /// Start date of the range
        start: String,
        /// End date of the range
        end: String,
    },

    /// A date string could not be parsed as `YYYY-MM-DD`
    #[error("Invalid date: {0}")]
    InvalidDate(String),

    /// Unrecognized rebalance frequency code
    #[error("Invalid rebalance frequency: {0}")]
    InvalidFrequency(String),

    /// Two series that must be aligned have different lengths
    #[error("Length mismatch: portfolio has {portfolio} observations, benchmark has {benchmark}")]
    LengthMismatch {
        /// Number of portfolio observations
        portfolio: usize,
        /// Number of benchmark observations
        benchmark: usize,
    },

    /// A series needed for a computation has no observations
    #[error("Empty series: {0}")]
    EmptySeries(String),

    /// Factor not found in registry or exposure table
    #[error("Factor not found: {0}")]
    UnknownFactor(String),

    /// Polars DataFrame error
    #[error("DataFrame error: {0}")]
    Polars(#[from] polars::error::PolarsError),

    /// I/O error while reading data files
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    /// Configuration could not be parsed
    #[error("Config error: {0}")]
    Config(#[from] serde_json::Error),

    /// Computation error
    #[error("Computation error: {0}")]
    Computation(String),
}

impl BacktestError {
    /// Returns whether the backtest can skip the unit that raised this error
    /// and carry on with the next one.
    #[must_use]
    pub const fn is_recoverable(&self) -> bool {
        matches!(self, Self::EmptySeries(_) | Self::Computation(_))
    }
}
