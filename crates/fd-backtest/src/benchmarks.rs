//! Reference portfolios the factor portfolio is compared against.
//!
//! Both hold fixed weights over the whole history and, like the backtest,
//! sum weight times return over the assets with a defined return each day.

use crate::{
    PriceFrame, Result,
    portfolio::PortfolioWeights,
    returns::{ReturnSeries, ReturnsTable},
};
use polars::prelude::*;
use std::collections::BTreeMap;

/// Equal weights over every asset of the table.
pub fn equal_weights(returns: &ReturnsTable) -> PortfolioWeights {
    let assets = returns.assets();
    if assets.is_empty() {
        return PortfolioWeights::zeros(assets);
    }
    let weight = 1.0 / assets.len() as f64;
    PortfolioWeights::from_weights(
        assets
            .into_iter()
            .map(|asset| (asset.to_string(), weight))
            .collect(),
    )
}

/// Daily returns of the equal-weight portfolio.
pub fn equal_weight_returns(returns: &ReturnsTable) -> ReturnSeries {
    hold(&equal_weights(returns), returns)
}

/// Weights proportional to the last observed `close · volume` per symbol.
///
/// The benchmark is left out. If no symbol has a positive proxy the result
/// is the degenerate all-zero vector.
pub fn market_cap_weights(prices: &PriceFrame, benchmark: Option<&str>) -> Result<PortfolioWeights> {
    let caps = prices
        .excluding(benchmark)
        .group_by([col("symbol")])
        .agg([(col("close")
            .sort_by([col("date")], SortMultipleOptions::default())
            .last()
            * col("volume")
                .sort_by([col("date")], SortMultipleOptions::default())
                .last())
        .alias("market_cap")])
        .collect()?;

    let symbols = caps.column("symbol")?.str()?;
    let values = caps.column("market_cap")?.f64()?;

    let caps: BTreeMap<String, f64> = symbols
        .into_iter()
        .zip(values)
        .filter_map(|(symbol, cap)| match (symbol, cap) {
            (Some(symbol), Some(cap)) if cap.is_finite() && cap > 0.0 => {
                Some((symbol.to_string(), cap))
            }
            _ => None,
        })
        .collect();

    let total: f64 = caps.values().sum();
    if total <= 0.0 {
        tracing::warn!("no positive market-cap proxy, market-cap portfolio is empty");
        return Ok(PortfolioWeights::zeros(prices.tradable_symbols(benchmark)?));
    }

    Ok(PortfolioWeights::from_weights(
        caps.into_iter()
            .map(|(symbol, cap)| (symbol, cap / total))
            .collect(),
    ))
}

/// Daily returns of the market-cap-weight portfolio.
pub fn market_cap_weight_returns(prices: &PriceFrame, benchmark: Option<&str>) -> Result<ReturnSeries> {
    let weights = market_cap_weights(prices, benchmark)?;
    Ok(hold(&weights, &prices.returns_table(benchmark)?))
}

fn hold(weights: &PortfolioWeights, returns: &ReturnsTable) -> ReturnSeries {
    returns
        .iter()
        .map(|(date, row)| (date, weights.apply(row)))
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use approx::assert_relative_eq;
    use chrono::NaiveDate;

    fn day(d: u32) -> NaiveDate {
        NaiveDate::from_ymd_opt(2023, 6, d).unwrap()
    }

    fn prices() -> PriceFrame {
        PriceFrame::from_rows([
            ("A", day(1), 10.0, 100.0),
            ("A", day(2), 11.0, 300.0),
            ("B", day(1), 20.0, 100.0),
            ("B", day(2), 19.0, 100.0),
            ("SPY", day(1), 400.0, 1e6),
            ("SPY", day(2), 404.0, 1e6),
        ])
        .unwrap()
    }

    #[test]
    fn test_equal_weight_returns() {
        let returns = prices().returns_table(Some("SPY")).unwrap();
        let series = equal_weight_returns(&returns);

        assert_eq!(series.len(), 1);
        assert_relative_eq!(series.get(day(2)).unwrap(), 0.5 * 0.1 + 0.5 * -0.05, epsilon = 1e-12);
    }

    #[test]
    fn test_market_cap_weights_use_last_observation() {
        let weights = market_cap_weights(&prices(), Some("SPY")).unwrap();

        // caps 11 · 300 = 3300 and 19 · 100 = 1900
        assert_relative_eq!(weights.get("A"), 3300.0 / 5200.0, epsilon = 1e-12);
        assert_relative_eq!(weights.get("B"), 1900.0 / 5200.0, epsilon = 1e-12);
        assert_eq!(weights.get("SPY"), 0.0);
        assert_relative_eq!(weights.gross(), 1.0, epsilon = 1e-12);
    }

    #[test]
    fn test_market_cap_returns() {
        let series = market_cap_weight_returns(&prices(), Some("SPY")).unwrap();
        let expected = 3300.0 / 5200.0 * 0.1 + 1900.0 / 5200.0 * -0.05;
        assert_relative_eq!(series.get(day(2)).unwrap(), expected, epsilon = 1e-12);
    }

    #[test]
    fn test_empty_table() {
        let weights = equal_weights(&ReturnsTable::default());
        assert!(weights.is_empty());
        assert!(equal_weight_returns(&ReturnsTable::default()).is_empty());
    }
}
