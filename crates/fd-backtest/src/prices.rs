//! Long-format daily price data.
//!
//! A [`PriceFrame`] wraps a polars `DataFrame` with one row per
//! `(symbol, date)` observation. Dates are stored as ISO `YYYY-MM-DD`
//! strings so that lexicographic and chronological order coincide.

use crate::{BacktestError, Result, returns::ReturnsTable};
use chrono::NaiveDate;
use polars::prelude::*;
use std::collections::BTreeSet;

/// Columns every price frame carries.
pub const REQUIRED_COLUMNS: [&str; 4] = ["symbol", "date", "close", "volume"];

/// Date format used in the `date` column.
pub const DATE_FORMAT: &str = "%Y-%m-%d";

/// Parse an ISO `YYYY-MM-DD` date string.
pub fn parse_date(value: &str) -> Result<NaiveDate> {
    NaiveDate::parse_from_str(value, DATE_FORMAT)
        .map_err(|_| BacktestError::InvalidDate(value.to_string()))
}

/// Validated daily price observations for a set of symbols.
///
/// Rows are sorted by `symbol` then `date`, and no symbol has two rows on the
/// same date. The frame is read-only input to the model.
#[derive(Debug, Clone)]
pub struct PriceFrame {
    data: DataFrame,
}

impl PriceFrame {
    /// Validate and normalize a long-format DataFrame.
    ///
    /// The `date` column may be a string or a polars `Date`; `close` and
    /// `volume` are cast to `f64`.
    pub fn new(data: DataFrame) -> Result<Self> {
        for column in REQUIRED_COLUMNS {
            if data.column(column).is_err() {
                return Err(BacktestError::MissingColumn(column.to_string()));
            }
        }

        let data = data
            .lazy()
            .select([
                col("symbol").cast(DataType::String),
                col("date").cast(DataType::String),
                col("close").cast(DataType::Float64),
                col("volume").cast(DataType::Float64),
            ])
            .sort(
                ["symbol", "date"],
                SortMultipleOptions::default().with_order_descending_multi([false, false]),
            )
            .collect()?;

        let duplicates = data
            .clone()
            .lazy()
            .group_by([col("symbol"), col("date")])
            .agg([col("close").len().alias("rows")])
            .filter(col("rows").gt(lit(1)))
            .sort(
                ["symbol", "date"],
                SortMultipleOptions::default().with_order_descending_multi([false, false]),
            )
            .collect()?;

        if duplicates.height() > 0 {
            let symbol = duplicates.column("symbol")?.str()?.get(0).unwrap_or_default();
            let date = duplicates.column("date")?.str()?.get(0).unwrap_or_default();
            return Err(BacktestError::DuplicateObservation {
                symbol: symbol.to_string(),
                date: date.to_string(),
            });
        }

        Ok(Self { data })
    }

    /// Build a frame from `(symbol, date, close, volume)` rows.
    pub fn from_rows<S: AsRef<str>>(
        rows: impl IntoIterator<Item = (S, NaiveDate, f64, f64)>,
    ) -> Result<Self> {
        let mut symbols = Vec::new();
        let mut dates = Vec::new();
        let mut closes = Vec::new();
        let mut volumes = Vec::new();

        for (symbol, date, close, volume) in rows {
            symbols.push(symbol.as_ref().to_string());
            dates.push(date.format(DATE_FORMAT).to_string());
            closes.push(close);
            volumes.push(volume);
        }

        let data = df![
            "symbol" => symbols,
            "date" => dates,
            "close" => closes,
            "volume" => volumes,
        ]?;

        Self::new(data)
    }

    /// Combine several frames into one, re-validating the result.
    pub fn concat(frames: &[Self]) -> Result<Self> {
        let mut frames = frames.iter();
        let Some(first) = frames.next() else {
            return Self::from_rows(Vec::<(String, NaiveDate, f64, f64)>::new());
        };

        let mut data = first.data.clone();
        for frame in frames {
            data.vstack_mut(&frame.data)?;
        }
        Self::new(data)
    }

    /// The underlying DataFrame.
    pub const fn data(&self) -> &DataFrame {
        &self.data
    }

    /// A lazy view over the frame.
    pub fn lazy(&self) -> LazyFrame {
        self.data.clone().lazy()
    }

    /// Number of observations across all symbols.
    pub fn height(&self) -> usize {
        self.data.height()
    }

    /// Whether the frame has no observations.
    pub fn is_empty(&self) -> bool {
        self.data.height() == 0
    }

    /// Distinct symbols, sorted.
    pub fn symbols(&self) -> Result<Vec<String>> {
        let symbols: BTreeSet<String> = self
            .data
            .column("symbol")?
            .str()?
            .into_iter()
            .flatten()
            .map(str::to_string)
            .collect();
        Ok(symbols.into_iter().collect())
    }

    /// Distinct symbols excluding the benchmark, sorted.
    pub fn tradable_symbols(&self, benchmark: Option<&str>) -> Result<Vec<String>> {
        Ok(self
            .symbols()?
            .into_iter()
            .filter(|symbol| Some(symbol.as_str()) != benchmark)
            .collect())
    }

    /// Observations for `[start, end]`, both ends inclusive.
    pub fn slice(&self, start: NaiveDate, end: NaiveDate) -> Result<Self> {
        if start > end {
            return Err(BacktestError::InvalidDateRange {
                start: start.to_string(),
                end: end.to_string(),
            });
        }

        let data = self
            .lazy()
            .filter(
                col("date")
                    .gt_eq(lit(start.format(DATE_FORMAT).to_string()))
                    .and(col("date").lt_eq(lit(end.format(DATE_FORMAT).to_string()))),
            )
            .collect()?;

        Ok(Self { data })
    }

    /// Observations for a subset of symbols.
    pub fn select_symbols(&self, symbols: &[String]) -> Result<Self> {
        let wanted = Series::new("wanted".into(), symbols.to_vec());
        let data = self
            .lazy()
            .filter(col("symbol").is_in(lit(wanted)))
            .collect()?;
        Ok(Self { data })
    }

    /// Observations with the benchmark symbol removed.
    pub fn excluding(&self, benchmark: Option<&str>) -> LazyFrame {
        match benchmark {
            Some(symbol) => self
                .lazy()
                .filter(col("symbol").neq(lit(symbol.to_string()))),
            None => self.lazy(),
        }
    }

    /// Simple returns per symbol and date, benchmark excluded.
    ///
    /// Returns columns `symbol`, `date`, `return`. The first observation of
    /// each symbol has no previous close and is dropped rather than filled,
    /// as are observations whose previous close is zero or missing.
    pub fn returns_frame(&self, benchmark: Option<&str>) -> LazyFrame {
        self.excluding(benchmark)
            .sort(
                ["symbol", "date"],
                SortMultipleOptions::default().with_order_descending_multi([false, false]),
            )
            .with_column(
                col("close")
                    .shift(lit(1))
                    .over([col("symbol")])
                    .alias("close_lag"),
            )
            .filter(
                col("close_lag")
                    .is_not_null()
                    .and(col("close_lag").neq(lit(0.0)))
                    .and(col("close").is_not_null()),
            )
            .with_column(((col("close") - col("close_lag")) / col("close_lag")).alias("return"))
            .select([col("symbol"), col("date"), col("return")])
    }

    /// Collected returns table, benchmark excluded.
    pub fn returns_table(&self, benchmark: Option<&str>) -> Result<ReturnsTable> {
        let frame = self.returns_frame(benchmark).collect()?;
        ReturnsTable::from_frame(&frame)
    }

    /// First and last observation dates across all symbols.
    pub fn date_range(&self) -> Result<Option<(NaiveDate, NaiveDate)>> {
        let dates = self.data.column("date")?.str()?;
        let first = dates.into_iter().flatten().min();
        let last = dates.into_iter().flatten().max();
        match (first, last) {
            (Some(first), Some(last)) => Ok(Some((parse_date(first)?, parse_date(last)?))),
            _ => Ok(None),
        }
    }
}
