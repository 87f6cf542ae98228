#![doc = include_str!("../README.md")]
#![doc(issue_tracker_base_url = "https://github.com/factordynamics/fd-backtest/issues/")]
#![cfg_attr(docsrs, feature(doc_cfg, doc_auto_cfg))]
#![warn(missing_docs)]
#![forbid(unsafe_code)]

pub mod attribution;
pub mod backtest;
pub mod benchmarks;
pub mod data;
pub mod error;
pub mod estimator;
pub mod exposures;
pub mod factors;
pub mod performance;
pub mod portfolio;
pub mod prices;
pub mod registry;
pub mod returns;
mod stats;
pub mod traits;
pub mod window;

// Re-export core types
pub use attribution::{Attribution, factor_attribution};
pub use backtest::{
    BacktestConfig, BacktestResult, Backtester, FactorModel, LinearFactorModel, OverlapPolicy,
    RebalanceFrequency, RebalanceSnapshot, WeightHistory, backtest, rebalance_dates,
};
pub use benchmarks::{equal_weight_returns, market_cap_weight_returns};
pub use data::{
    ConstituentTable, CsvDirectorySource, FetchRequest, PriceSource, Universe, UniverseSource,
};
pub use error::{BacktestError, Result};
pub use estimator::{FactorReturnEstimator, FactorReturns, estimate_factor_returns};
pub use exposures::{Coverage, ExposureCalculator, ExposureTable, compute_exposures};
pub use performance::{
    DEFAULT_RISK_FREE_RATE, PerformanceEvaluator, PerformanceSummary, turnover,
};
pub use portfolio::{FactorTarget, PortfolioWeights, TargetExposures, construct_portfolio};
pub use prices::PriceFrame;
pub use registry::{FactorInfo, FactorRegistry};
pub use returns::{ReturnSeries, ReturnsTable};
pub use traits::{ConfigurableFactor, Factor, FactorConfig, FactorValues};
pub use window::WindowData;

/// Crate version
pub const VERSION: &str = env!("CARGO_PKG_VERSION");
