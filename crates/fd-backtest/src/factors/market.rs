//! Market factor - sensitivity to the equal-weighted market.
//!
//! Beta measures the sensitivity of a security's returns to market returns:
//! `β = Cov(R_i, R_m) / Var(R_m)`
//!
//! The market is the equal-weighted mean return of the window's assets, so
//! the factor needs no external index. Beta = 1 means the security moves in
//! line with that average.

use crate::{
    Result,
    traits::{ConfigurableFactor, Factor, FactorValues, finite},
    window::WindowData,
};
use polars::prelude::*;

/// Configuration for the Market factor.
#[derive(Debug, Clone, serde::Serialize, serde::Deserialize)]
pub struct MarketConfig {
    /// Minimum number of dates on which both the asset and market return are defined.
    pub min_observations: usize,
}

impl Default for MarketConfig {
    fn default() -> Self {
        Self {
            min_observations: 2,
        }
    }
}

/// Market beta factor.
///
/// Covariance and variance are taken over the dates where both the asset and
/// the market return are defined, with the same normalization, so the
/// normalization cancels in the ratio.
///
/// Undefined when fewer than `min_observations` paired dates exist or when
/// the market variance is exactly zero. Zero is a valid beta and is never
/// used as a placeholder.
#[derive(Debug, Clone, Default)]
pub struct Market {
    config: MarketConfig,
}

impl Market {
    /// Create a Market factor with the default configuration.
    pub fn new() -> Self {
        Self::default()
    }
}

impl ConfigurableFactor for Market {
    type Config = MarketConfig;

    fn with_config(config: Self::Config) -> Self {
        Self { config }
    }

    fn config(&self) -> &Self::Config {
        &self.config
    }
}

impl Factor for Market {
    fn name(&self) -> &str {
        "Market"
    }

    fn description(&self) -> &str {
        "Beta to the equal-weighted market - covariance with market returns divided by market variance"
    }

    fn required_columns(&self) -> &[&str] {
        &["symbol", "date", "close"]
    }

    fn min_observations(&self) -> usize {
        self.config.min_observations
    }

    fn compute_raw(&self, window: &WindowData) -> Result<FactorValues> {
        let stats = window
            .returns()
            .clone()
            .lazy()
            .join(
                window.market_returns().clone().lazy(),
                [col("date")],
                [col("date")],
                JoinArgs::new(JoinType::Inner),
            )
            .filter(
                col("return")
                    .is_not_null()
                    .and(col("market_return").is_not_null()),
            )
            .group_by([col("symbol")])
            .agg([
                col("return")
                    .count()
                    .cast(DataType::Float64)
                    .alias("paired"),
                ((col("return") - col("return").mean())
                    * (col("market_return") - col("market_return").mean()))
                .sum()
                .alias("co_moment"),
                ((col("market_return") - col("market_return").mean()).pow(2))
                    .sum()
                    .alias("market_moment"),
            ])
            .collect()?;

        let symbols = stats.column("symbol")?.str()?;
        let paired = stats.column("paired")?.f64()?;
        let co_moment = stats.column("co_moment")?.f64()?;
        let market_moment = stats.column("market_moment")?.f64()?;

        let mut values: FactorValues = window
            .symbols()
            .iter()
            .map(|symbol| (symbol.clone(), None))
            .collect();

        for (((symbol, paired), co_moment), market_moment) in symbols
            .into_iter()
            .zip(paired)
            .zip(co_moment)
            .zip(market_moment)
        {
            let Some(symbol) = symbol else { continue };
            let beta = match (paired, co_moment, market_moment) {
                (Some(n), Some(co), Some(var))
                    if n as usize >= self.config.min_observations && var != 0.0 =>
                {
                    finite(co / var)
                }
                _ => None,
            };
            values.insert(symbol.to_string(), beta);
        }

        Ok(values)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::PriceFrame;
    use approx::assert_relative_eq;
    use chrono::NaiveDate;

    fn window(series: &[(&str, &[f64])]) -> WindowData {
        let rows = series.iter().flat_map(|(symbol, closes)| {
            closes.iter().enumerate().map(move |(i, close)| {
                (
                    *symbol,
                    NaiveDate::from_ymd_opt(2023, 1, i as u32 + 1).unwrap(),
                    *close,
                    1.0,
                )
            })
        });
        WindowData::new(&PriceFrame::from_rows(rows).unwrap(), None).unwrap()
    }

    #[test]
    fn test_single_asset_beta_is_one() {
        let window = window(&[("AAPL", &[100.0, 101.0, 103.0, 102.0, 104.0])]);
        let values = Market::new().compute_raw(&window).unwrap();
        assert_relative_eq!(values["AAPL"].unwrap(), 1.0, epsilon = 1e-9);
    }

    #[test]
    fn test_betas_average_to_one() {
        let window = window(&[
            ("A", &[100.0, 102.0, 101.0, 104.0, 103.0]),
            ("B", &[50.0, 50.5, 50.2, 51.5, 51.0]),
            ("C", &[20.0, 19.0, 19.5, 18.0, 18.5]),
        ]);
        let values = Market::new().compute_raw(&window).unwrap();
        let sum: f64 = values.values().map(|v| v.unwrap()).sum();
        assert_relative_eq!(sum / 3.0, 1.0, epsilon = 1e-9);
    }

    #[test]
    fn test_constant_market_is_undefined() {
        let window = window(&[("FLAT", &[50.0, 50.0, 50.0, 50.0])]);
        let values = Market::new().compute_raw(&window).unwrap();
        assert_eq!(values["FLAT"], None);
    }

    #[test]
    fn test_too_few_observations_is_undefined() {
        let window = window(&[("NEW", &[10.0, 11.0])]);
        let values = Market::new().compute_raw(&window).unwrap();
        assert_eq!(values["NEW"], None);
    }

    #[test]
    fn test_market_metadata() {
        let factor = Market::with_config(MarketConfig {
            min_observations: 20,
        });
        assert_eq!(factor.name(), "Market");
        assert_eq!(factor.min_observations(), 20);
        assert!(factor.required_columns().contains(&"close"));
    }
}
