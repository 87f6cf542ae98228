//! Returns tables and dated return series.

use crate::{Result, prices::parse_date, stats};
use chrono::NaiveDate;
use derive_more::{From, Into};
use polars::prelude::*;
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;

/// Simple returns keyed by date, then by asset.
///
/// The table is sparse: an asset with no defined return on a date has no
/// entry for that date. Nothing is zero-filled.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct ReturnsTable {
    rows: BTreeMap<NaiveDate, BTreeMap<String, f64>>,
}

impl ReturnsTable {
    /// Collect a `symbol`, `date`, `return` frame.
    ///
    /// Null and non-finite returns are left out.
    pub fn from_frame(frame: &DataFrame) -> Result<Self> {
        let symbols = frame.column("symbol")?.str()?;
        let dates = frame.column("date")?.str()?;
        let values = frame.column("return")?.f64()?;

        let mut table = Self::default();
        for ((symbol, date), value) in symbols.into_iter().zip(dates).zip(values) {
            if let (Some(symbol), Some(date), Some(value)) = (symbol, date, value) {
                table.insert(parse_date(date)?, symbol, value);
            }
        }
        Ok(table)
    }

    /// Record a return, ignoring non-finite values.
    pub fn insert(&mut self, date: NaiveDate, asset: impl Into<String>, value: f64) {
        if value.is_finite() {
            self.rows.entry(date).or_default().insert(asset.into(), value);
        }
    }

    /// Return of `asset` on `date`, if defined.
    pub fn get(&self, date: NaiveDate, asset: &str) -> Option<f64> {
        self.rows.get(&date).and_then(|row| row.get(asset)).copied()
    }

    /// All defined returns on `date`.
    pub fn on(&self, date: NaiveDate) -> Option<&BTreeMap<String, f64>> {
        self.rows.get(&date)
    }

    /// Dates with at least one defined return, ascending.
    pub fn dates(&self) -> impl Iterator<Item = NaiveDate> + '_ {
        self.rows.keys().copied()
    }

    /// Rows in date order.
    pub fn iter(&self) -> impl Iterator<Item = (NaiveDate, &BTreeMap<String, f64>)> {
        self.rows.iter().map(|(date, row)| (*date, row))
    }

    /// Up to `count` rows strictly after `date`.
    pub fn after(
        &self,
        date: NaiveDate,
        count: usize,
    ) -> impl Iterator<Item = (NaiveDate, &BTreeMap<String, f64>)> {
        self.rows
            .range(date.succ_opt().unwrap_or(NaiveDate::MAX)..)
            .take(count)
            .map(|(date, row)| (*date, row))
    }

    /// Number of dates.
    pub fn len(&self) -> usize {
        self.rows.len()
    }

    /// Whether the table has no dates.
    pub fn is_empty(&self) -> bool {
        self.rows.is_empty()
    }

    /// Every asset with at least one return, sorted.
    pub fn assets(&self) -> Vec<&str> {
        let assets: std::collections::BTreeSet<&str> = self
            .rows
            .values()
            .flat_map(|row| row.keys().map(String::as_str))
            .collect();
        assets.into_iter().collect()
    }

    /// Return series of a single asset.
    pub fn asset(&self, asset: &str) -> ReturnSeries {
        self.rows
            .iter()
            .filter_map(|(date, row)| row.get(asset).map(|value| (*date, *value)))
            .collect()
    }

    /// Equal-weighted cross-sectional mean return per date.
    ///
    /// Assets without a return on a date do not enter that date's mean.
    pub fn market_returns(&self) -> ReturnSeries {
        self.rows
            .iter()
            .filter_map(|(date, row)| {
                let values: Vec<f64> = row.values().copied().collect();
                stats::mean(&values).map(|mean| (*date, mean))
            })
            .collect()
    }
}

/// A return series ordered by date.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize, From, Into)]
pub struct ReturnSeries(BTreeMap<NaiveDate, f64>);

impl ReturnSeries {
    /// Create an empty series.
    pub const fn new() -> Self {
        Self(BTreeMap::new())
    }

    /// Set the return for a date, replacing any earlier value.
    pub fn insert(&mut self, date: NaiveDate, value: f64) -> Option<f64> {
        self.0.insert(date, value)
    }

    /// Return on `date`.
    pub fn get(&self, date: NaiveDate) -> Option<f64> {
        self.0.get(&date).copied()
    }

    /// Whether `date` has a value.
    pub fn contains(&self, date: NaiveDate) -> bool {
        self.0.contains_key(&date)
    }

    /// Dates, ascending.
    pub fn dates(&self) -> impl Iterator<Item = NaiveDate> + '_ {
        self.0.keys().copied()
    }

    /// Values in date order.
    pub fn values(&self) -> Vec<f64> {
        self.0.values().copied().collect()
    }

    /// `(date, value)` pairs in date order.
    pub fn iter(&self) -> impl Iterator<Item = (NaiveDate, f64)> + '_ {
        self.0.iter().map(|(date, value)| (*date, *value))
    }

    /// Number of observations.
    pub fn len(&self) -> usize {
        self.0.len()
    }

    /// Whether the series has no observations.
    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }

    /// Sum of all returns.
    pub fn sum(&self) -> f64 {
        self.0.values().sum()
    }

    /// Inner join on date: values of both series on their shared dates.
    pub fn align(&self, other: &Self) -> (Vec<f64>, Vec<f64>) {
        self.0
            .iter()
            .filter_map(|(date, left)| other.0.get(date).map(|right| (*left, *right)))
            .unzip()
    }
}

impl FromIterator<(NaiveDate, f64)> for ReturnSeries {
    fn from_iter<I: IntoIterator<Item = (NaiveDate, f64)>>(iter: I) -> Self {
        Self(iter.into_iter().collect())
    }
}
