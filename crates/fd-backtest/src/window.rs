//! Per-window inputs shared by every factor.

use crate::{PriceFrame, Result, returns::ReturnsTable};
use polars::prelude::*;
use std::collections::BTreeMap;

/// First and last close of a symbol inside a window.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct CloseEndpoints {
    /// Earliest close in the window
    pub first: f64,
    /// Most recent close in the window
    pub last: f64,
    /// Number of non-null closes
    pub observations: usize,
}

/// A trailing price window prepared for factor computation.
///
/// Holds the benchmark-free prices, the per-symbol returns, and the
/// equal-weighted market return of the window. Built once per rebalance and
/// shared by all factors so the window is scanned only once.
#[derive(Debug, Clone)]
pub struct WindowData {
    prices: DataFrame,
    returns: DataFrame,
    market_returns: DataFrame,
    endpoints: BTreeMap<String, CloseEndpoints>,
    symbols: Vec<String>,
}

impl WindowData {
    /// Prepare a window, leaving out the benchmark symbol if given.
    pub fn new(frame: &PriceFrame, benchmark: Option<&str>) -> Result<Self> {
        let prices = frame.excluding(benchmark).collect()?;
        let returns = frame.returns_frame(benchmark).collect()?;

        let market_returns = returns
            .clone()
            .lazy()
            .group_by([col("date")])
            .agg([col("return").mean().alias("market_return")])
            .sort(["date"], SortMultipleOptions::default())
            .collect()?;

        let endpoints = close_endpoints(&prices)?;
        let symbols = frame.tradable_symbols(benchmark)?;

        Ok(Self {
            prices,
            returns,
            market_returns,
            endpoints,
            symbols,
        })
    }

    /// Prices with columns `symbol`, `date`, `close`, `volume`.
    pub const fn prices(&self) -> &DataFrame {
        &self.prices
    }

    /// Returns with columns `symbol`, `date`, `return`.
    pub const fn returns(&self) -> &DataFrame {
        &self.returns
    }

    /// Market returns with columns `date`, `market_return`.
    pub const fn market_returns(&self) -> &DataFrame {
        &self.market_returns
    }

    /// Close endpoints per symbol.
    pub const fn endpoints(&self) -> &BTreeMap<String, CloseEndpoints> {
        &self.endpoints
    }

    /// Symbols present in the window, benchmark excluded, sorted.
    pub fn symbols(&self) -> &[String] {
        &self.symbols
    }

    /// The window's returns as a sparse table.
    pub fn returns_table(&self) -> Result<ReturnsTable> {
        ReturnsTable::from_frame(&self.returns)
    }
}

fn close_endpoints(prices: &DataFrame) -> Result<BTreeMap<String, CloseEndpoints>> {
    let summary = prices
        .clone()
        .lazy()
        .filter(col("close").is_not_null())
        .group_by([col("symbol")])
        .agg([
            col("close")
                .sort_by([col("date")], SortMultipleOptions::default())
                .first()
                .alias("first_close"),
            col("close")
                .sort_by([col("date")], SortMultipleOptions::default())
                .last()
                .alias("last_close"),
            col("close")
                .count()
                .cast(DataType::Float64)
                .alias("observations"),
        ])
        .collect()?;

    let symbols = summary.column("symbol")?.str()?;
    let first = summary.column("first_close")?.f64()?;
    let last = summary.column("last_close")?.f64()?;
    let observations = summary.column("observations")?.f64()?;

    let mut endpoints = BTreeMap::new();
    for (((symbol, first), last), observations) in
        symbols.into_iter().zip(first).zip(last).zip(observations)
    {
        if let (Some(symbol), Some(first), Some(last), Some(observations)) =
            (symbol, first, last, observations)
        {
            endpoints.insert(
                symbol.to_string(),
                CloseEndpoints {
                    first,
                    last,
                    observations: observations as usize,
                },
            );
        }
    }
    Ok(endpoints)
}
