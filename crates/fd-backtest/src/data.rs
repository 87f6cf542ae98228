//! Data sources feeding the engine.
//!
//! The engine only depends on the [`PriceSource`] and [`UniverseSource`]
//! traits. The file-backed implementations here read a directory of
//! per-ticker CSV bars and an index constituent table.

use crate::{
    BacktestError, PriceFrame, Result,
    prices::{DATE_FORMAT, parse_date},
};
use chrono::NaiveDate;
use polars::prelude::*;
use std::{
    collections::BTreeMap,
    fs::File,
    path::{Path, PathBuf},
};

/// Parameters of a bar request.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FetchRequest {
    /// Symbols to load
    pub tickers: Vec<String>,
    /// First date, inclusive
    pub start: NaiveDate,
    /// Last date, inclusive
    pub end: NaiveDate,
    /// Bar size; only `day` is understood by file sources
    pub timespan: String,
    /// Maximum number of bars per ticker
    pub limit: usize,
    /// Whether bars are split and dividend adjusted
    pub adjusted: bool,
}

impl FetchRequest {
    /// Daily adjusted bars for `tickers` over `[start, end]`.
    pub fn new<S: Into<String>>(
        tickers: impl IntoIterator<Item = S>,
        start: NaiveDate,
        end: NaiveDate,
    ) -> Self {
        Self {
            tickers: tickers.into_iter().map(Into::into).collect(),
            start,
            end,
            timespan: "day".to_string(),
            limit: 50_000,
            adjusted: true,
        }
    }
}

/// Provider of daily price bars.
pub trait PriceSource {
    /// Load the requested bars as one long-format frame.
    ///
    /// Tickers the source cannot serve are left out of the result rather
    /// than failing the request.
    fn fetch(&self, request: &FetchRequest) -> Result<PriceFrame>;
}

/// A directory holding one `<TICKER>.csv` per symbol.
///
/// Each file has a `timestamp` or `date` column (anything whose first ten
/// characters are `YYYY-MM-DD`), plus `close` and `volume`. Other columns
/// are ignored. Files never expire.
#[derive(Debug, Clone)]
pub struct CsvDirectorySource {
    dir: PathBuf,
}

impl CsvDirectorySource {
    /// Source reading from `dir`.
    pub fn new(dir: impl Into<PathBuf>) -> Self {
        Self { dir: dir.into() }
    }

    /// Directory the source reads from.
    pub fn dir(&self) -> &Path {
        &self.dir
    }

    fn path(&self, ticker: &str) -> PathBuf {
        self.dir.join(format!("{ticker}.csv"))
    }

    /// Tickers with a file in the directory, sorted.
    pub fn available_tickers(&self) -> Result<Vec<String>> {
        let mut tickers = Vec::new();
        for entry in std::fs::read_dir(&self.dir)? {
            let path = entry?.path();
            if path.extension().is_some_and(|ext| ext == "csv")
                && let Some(stem) = path.file_stem().and_then(|s| s.to_str())
            {
                tickers.push(stem.to_string());
            }
        }
        tickers.sort();
        Ok(tickers)
    }

    /// Write the bars of `ticker` from `frame` to its file, replacing any
    /// existing one.
    pub fn store(&self, ticker: &str, frame: &PriceFrame) -> Result<()> {
        let mut bars = frame
            .lazy()
            .filter(col("symbol").eq(lit(ticker.to_string())))
            .select([
                col("date").alias("timestamp"),
                col("close"),
                col("volume"),
            ])
            .collect()?;

        std::fs::create_dir_all(&self.dir)?;
        let mut file = File::create(self.path(ticker))?;
        CsvWriter::new(&mut file)
            .include_header(true)
            .finish(&mut bars)?;

        tracing::debug!(ticker, rows = bars.height(), "stored bars");
        Ok(())
    }

    fn read(&self, ticker: &str, request: &FetchRequest) -> Result<Option<PriceFrame>> {
        let path = self.path(ticker);
        if !path.is_file() {
            return Ok(None);
        }

        let raw = CsvReadOptions::default()
            .with_has_header(true)
            .try_into_reader_with_file_path(Some(path))?
            .finish()?;

        let date_column = ["timestamp", "date"]
            .into_iter()
            .find(|name| raw.column(name).is_ok())
            .ok_or_else(|| BacktestError::MissingColumn("timestamp".to_string()))?;

        let dates = raw.column(date_column)?.cast(&DataType::String)?;
        let closes = raw.column("close")?.cast(&DataType::Float64)?;
        let volumes = raw.column("volume")?.cast(&DataType::Float64)?;

        let mut rows = Vec::new();
        for ((date, close), volume) in dates.str()?.into_iter().zip(closes.f64()?).zip(volumes.f64()?) {
            let (Some(date), Some(close)) = (date, close) else {
                continue;
            };
            let date = parse_date(date.get(..10).unwrap_or(date))?;
            if date < request.start || date > request.end {
                continue;
            }
            rows.push((ticker, date, close, volume.unwrap_or(0.0)));
        }
        rows.truncate(request.limit);

        Ok(Some(PriceFrame::from_rows(rows)?))
    }
}

impl PriceSource for CsvDirectorySource {
    fn fetch(&self, request: &FetchRequest) -> Result<PriceFrame> {
        if request.timespan != "day" {
            return Err(BacktestError::Computation(format!(
                "{} bars are not available from {}",
                request.timespan,
                self.dir.display()
            )));
        }
        if request.start > request.end {
            return Err(BacktestError::InvalidDateRange {
                start: request.start.format(DATE_FORMAT).to_string(),
                end: request.end.format(DATE_FORMAT).to_string(),
            });
        }

        let mut frames = Vec::with_capacity(request.tickers.len());
        for ticker in &request.tickers {
            match self.read(ticker, request) {
                Ok(Some(frame)) => {
                    tracing::debug!(ticker = %ticker, rows = frame.height(), "loaded bars from file");
                    frames.push(frame);
                }
                Ok(None) => tracing::warn!(ticker = %ticker, dir = %self.dir.display(), "no data file for ticker"),
                Err(err) => tracing::warn!(ticker = %ticker, error = %err, "skipping unreadable data file"),
            }
        }

        tracing::info!(
            requested = request.tickers.len(),
            loaded = frames.len(),
            "fetched price data"
        );
        PriceFrame::concat(&frames)
    }
}

/// An investable universe with reference index weights.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct Universe {
    /// Symbol -> index weight, summing to one
    pub weights: BTreeMap<String, f64>,
    /// Symbols in the order the source lists them
    pub tickers: Vec<String>,
}

/// Provider of the tradable universe.
pub trait UniverseSource {
    /// Load the universe.
    fn load_universe(&self) -> Result<Universe>;
}

/// Index constituents read from a CSV with percent-string weights such as
/// `"6.53%"`.
#[derive(Debug, Clone)]
pub struct ConstituentTable {
    path: PathBuf,
    symbol_column: String,
    weight_column: String,
}

impl ConstituentTable {
    /// Table at `path` with `Symbol` and `Weight` columns.
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self {
            path: path.into(),
            symbol_column: "Symbol".to_string(),
            weight_column: "Weight".to_string(),
        }
    }

    /// Use different column names.
    #[must_use]
    pub fn with_columns(mut self, symbol: impl Into<String>, weight: impl Into<String>) -> Self {
        self.symbol_column = symbol.into();
        self.weight_column = weight.into();
        self
    }
}

/// Parse `"6.53%"` (or `"6.53"`) as the fraction `0.0653`.
pub fn parse_percent(value: &str) -> Option<f64> {
    let number = value.trim().trim_end_matches('%').trim().replace(',', "");
    number
        .parse::<f64>()
        .ok()
        .filter(|v| v.is_finite())
        .map(|v| v / 100.0)
}

impl UniverseSource for ConstituentTable {
    fn load_universe(&self) -> Result<Universe> {
        let raw = CsvReadOptions::default()
            .with_has_header(true)
            .try_into_reader_with_file_path(Some(self.path.clone()))?
            .finish()?;

        let symbols = raw
            .column(&self.symbol_column)
            .map_err(|_| BacktestError::MissingColumn(self.symbol_column.clone()))?
            .cast(&DataType::String)?;
        let weights = raw
            .column(&self.weight_column)
            .map_err(|_| BacktestError::MissingColumn(self.weight_column.clone()))?
            .cast(&DataType::String)?;

        let mut universe = Universe::default();
        for (symbol, weight) in symbols.str()?.into_iter().zip(weights.str()?) {
            let Some(symbol) = symbol.map(str::trim).filter(|s| !s.is_empty()) else {
                continue;
            };
            let Some(weight) = weight.and_then(parse_percent) else {
                tracing::warn!(symbol, "skipping constituent with unparseable weight");
                continue;
            };
            if !universe.weights.contains_key(symbol) {
                universe.tickers.push(symbol.to_string());
            }
            universe.weights.insert(symbol.to_string(), weight);
        }

        let total: f64 = universe.weights.values().sum();
        if total <= 0.0 {
            return Err(BacktestError::EmptySeries(format!(
                "no positive constituent weights in {}",
                self.path.display()
            )));
        }
        for weight in universe.weights.values_mut() {
            *weight /= total;
        }

        tracing::info!(constituents = universe.tickers.len(), "loaded universe");
        Ok(universe)
    }
}
