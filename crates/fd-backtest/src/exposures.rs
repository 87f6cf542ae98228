//! Exposure tables and the exposure calculator.

use crate::{BacktestError, FactorRegistry, PriceFrame, Result, window::WindowData};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;

/// Record of the assets an exposure calculation left out.
///
/// The calculator drops every asset with at least one undefined factor
/// value. Each drop is kept here, with the factors that were undefined, so
/// the shrinking of the cross-section can be audited.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct Coverage {
    /// Number of assets evaluated.
    pub evaluated: usize,
    /// Dropped asset -> names of its undefined factors.
    pub dropped: BTreeMap<String, Vec<String>>,
}

impl Coverage {
    /// Number of assets that kept a complete row.
    pub fn retained(&self) -> usize {
        self.evaluated.saturating_sub(self.dropped.len())
    }

    /// Fraction of evaluated assets that kept a complete row.
    pub fn ratio(&self) -> f64 {
        if self.evaluated == 0 {
            return 0.0;
        }
        self.retained() as f64 / self.evaluated as f64
    }
}

/// Factor exposures per asset.
///
/// Columns are the factor names in a fixed order. Cells are `Option<f64>` so
/// that caller-supplied tables may carry gaps; tables produced by
/// [`ExposureCalculator`] are always complete.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(try_from = "ExposureTableData")]
pub struct ExposureTable {
    factors: Vec<String>,
    rows: BTreeMap<String, Vec<Option<f64>>>,
    coverage: Coverage,
}

/// Unchecked wire form of [`ExposureTable`].
#[derive(Deserialize)]
struct ExposureTableData {
    factors: Vec<String>,
    rows: BTreeMap<String, Vec<Option<f64>>>,
    #[serde(default)]
    coverage: Coverage,
}

impl TryFrom<ExposureTableData> for ExposureTable {
    type Error = BacktestError;

    fn try_from(data: ExposureTableData) -> Result<Self> {
        let mut table = Self::new(data.factors);
        table.coverage = data.coverage;
        for (asset, values) in data.rows {
            table.insert(asset, values)?;
        }
        Ok(table)
    }
}

impl ExposureTable {
    /// Create an empty table with the given factor columns.
    pub fn new<S: Into<String>>(factors: impl IntoIterator<Item = S>) -> Self {
        Self {
            factors: factors.into_iter().map(Into::into).collect(),
            rows: BTreeMap::new(),
            coverage: Coverage::default(),
        }
    }

    /// Insert or replace the row of an asset.
    ///
    /// Non-finite values are stored as undefined.
    pub fn insert(&mut self, asset: impl Into<String>, values: Vec<Option<f64>>) -> Result<()> {
        if values.len() != self.factors.len() {
            return Err(BacktestError::Computation(format!(
                "exposure row has {} values for {} factors",
                values.len(),
                self.factors.len()
            )));
        }
        let values = values
            .into_iter()
            .map(|value| value.filter(|v| v.is_finite()))
            .collect();
        self.rows.insert(asset.into(), values);
        Ok(())
    }

    /// Factor names in column order.
    pub fn factors(&self) -> &[String] {
        &self.factors
    }

    /// Column index of a factor.
    pub fn factor_index(&self, factor: &str) -> Option<usize> {
        self.factors.iter().position(|f| f == factor)
    }

    /// Assets in the table, sorted.
    pub fn assets(&self) -> impl Iterator<Item = &str> {
        self.rows.keys().map(String::as_str)
    }

    /// Row of an asset.
    pub fn row(&self, asset: &str) -> Option<&[Option<f64>]> {
        self.rows.get(asset).map(Vec::as_slice)
    }

    /// Exposure of `asset` to `factor`, if defined.
    pub fn get(&self, asset: &str, factor: &str) -> Option<f64> {
        let index = self.factor_index(factor)?;
        self.rows.get(asset)?.get(index).copied().flatten()
    }

    /// Rows in asset order.
    pub fn iter(&self) -> impl Iterator<Item = (&str, &[Option<f64>])> {
        self.rows
            .iter()
            .map(|(asset, row)| (asset.as_str(), row.as_slice()))
    }

    /// Number of assets.
    pub fn len(&self) -> usize {
        self.rows.len()
    }

    /// Whether the table has no assets.
    pub fn is_empty(&self) -> bool {
        self.rows.is_empty()
    }

    /// Whether every cell is defined.
    pub fn is_complete(&self) -> bool {
        self.rows.values().flatten().all(Option::is_some)
    }

    /// Audit trail of the calculation that produced this table.
    pub const fn coverage(&self) -> &Coverage {
        &self.coverage
    }

    /// Cross-sectional mean exposure per factor, skipping undefined cells.
    pub fn mean_exposures(&self) -> Vec<Option<f64>> {
        (0..self.factors.len())
            .map(|index| {
                let values: Vec<f64> = self.rows.values().filter_map(|row| row[index]).collect();
                crate::stats::mean(&values)
            })
            .collect()
    }
}

/// Computes exposure tables from price windows using a factor registry.
#[derive(Debug, Clone)]
pub struct ExposureCalculator {
    registry: FactorRegistry,
}

impl Default for ExposureCalculator {
    fn default() -> Self {
        Self::new(FactorRegistry::with_defaults())
    }
}

impl ExposureCalculator {
    /// Create a calculator over the given factors.
    pub const fn new(registry: FactorRegistry) -> Self {
        Self { registry }
    }

    /// The factors this calculator evaluates.
    pub const fn registry(&self) -> &FactorRegistry {
        &self.registry
    }

    /// Exposures for every non-benchmark asset in `window`.
    pub fn compute(&self, window: &PriceFrame, benchmark: Option<&str>) -> Result<ExposureTable> {
        self.compute_window(&WindowData::new(window, benchmark)?)
    }

    /// Exposures for a prepared window.
    ///
    /// Assets with any undefined factor value are dropped from the table and
    /// recorded in its [`Coverage`]; rows are never partially filled.
    pub fn compute_window(&self, window: &WindowData) -> Result<ExposureTable> {
        let columns = self
            .registry
            .iter()
            .map(|factor| factor.compute_raw(window))
            .collect::<Result<Vec<_>>>()?;

        let mut table = ExposureTable::new(self.registry.names());
        table.coverage.evaluated = window.symbols().len();

        for symbol in window.symbols() {
            let row: Vec<Option<f64>> = columns
                .iter()
                .map(|values| values.get(symbol).copied().flatten().filter(|v| v.is_finite()))
                .collect();

            if row.iter().all(Option::is_some) {
                table.rows.insert(symbol.clone(), row);
            } else {
                let missing = self
                    .registry
                    .names()
                    .into_iter()
                    .zip(&row)
                    .filter(|(_, value)| value.is_none())
                    .map(|(name, _)| name.to_string())
                    .collect::<Vec<_>>();
                tracing::debug!(symbol = %symbol, missing = ?missing, "dropping asset with undefined exposures");
                table.coverage.dropped.insert(symbol.clone(), missing);
            }
        }

        Ok(table)
    }
}

/// Exposures to the default factors (Market, Size, Value, Momentum).
pub fn compute_exposures(window: &PriceFrame, benchmark: Option<&str>) -> Result<ExposureTable> {
    ExposureCalculator::default().compute(window, benchmark)
}

#[cfg(test)]
mod tests {
    use super::*;
    use approx::assert_relative_eq;
    use chrono::NaiveDate;

    fn frame(series: &[(&str, &[f64])]) -> PriceFrame {
        let rows = series.iter().flat_map(|(symbol, closes)| {
            closes.iter().enumerate().map(move |(i, close)| {
                (
                    *symbol,
                    NaiveDate::from_ymd_opt(2023, 1, i as u32 + 1).unwrap(),
                    *close,
                    1_000_000.0,
                )
            })
        });
        PriceFrame::from_rows(rows).unwrap()
    }

    #[test]
    fn test_benchmark_excluded_and_shape() {
        let frame = frame(&[
            ("AAPL", &[100.0, 101.0, 102.0, 103.0, 104.0]),
            ("GOOGL", &[1500.0, 1510.0, 1520.0, 1530.0, 1540.0]),
            ("SPY", &[400.0, 402.0, 404.0, 406.0, 408.0]),
        ]);
        let table = compute_exposures(&frame, Some("SPY")).unwrap();

        assert_eq!(table.len(), 2);
        assert_eq!(table.factors().len(), 4);
        assert!(table.row("SPY").is_none());
        assert!(table.is_complete());
    }

    #[test]
    fn test_single_asset_exposures() {
        let frame = frame(&[
            ("AAPL", &[100.0, 101.0, 102.0, 103.0, 104.0]),
            ("SPY", &[400.0, 402.0, 404.0, 406.0, 408.0]),
        ]);
        let table = compute_exposures(&frame, Some("SPY")).unwrap();

        assert_relative_eq!(table.get("AAPL", "Momentum").unwrap(), 0.04, epsilon = 1e-12);
        assert_relative_eq!(table.get("AAPL", "Size").unwrap(), 104.0_f64.ln(), epsilon = 1e-12);
        assert_relative_eq!(table.get("AAPL", "Value").unwrap(), 1.0 / 104.0, epsilon = 1e-12);
    }

    #[test]
    fn test_incomplete_rows_are_dropped_and_recorded() {
        let frame = frame(&[
            ("AAPL", &[100.0, 101.0, 102.0, 103.0]),
            ("NEW", &[10.0]),
        ]);
        let table = compute_exposures(&frame, None).unwrap();

        assert!(table.row("NEW").is_none());
        assert!(table.row("AAPL").is_some());
        assert_eq!(table.coverage().evaluated, 2);
        assert_eq!(table.coverage().retained(), 1);
        assert_eq!(
            table.coverage().dropped["NEW"],
            vec!["Market".to_string(), "Momentum".to_string()]
        );
    }

    #[test]
    fn test_constant_universe_yields_empty_table() {
        let frame = frame(&[("FLAT", &[50.0, 50.0, 50.0, 50.0])]);
        let table = compute_exposures(&frame, None).unwrap();

        assert!(table.is_empty());
        assert_eq!(table.coverage().dropped["FLAT"], vec!["Market".to_string()]);
    }

    #[test]
    fn test_idempotent() {
        let frame = frame(&[
            ("A", &[10.0, 11.0, 10.5, 12.0]),
            ("B", &[20.0, 19.0, 19.5, 21.0]),
        ]);
        let first = compute_exposures(&frame, None).unwrap();
        let second = compute_exposures(&frame, None).unwrap();
        assert_eq!(first, second);
    }

    #[test]
    fn test_insert_validates_width() {
        let mut table = ExposureTable::new(["Market", "Size"]);
        assert!(table.insert("A", vec![Some(1.0)]).is_err());
        table.insert("A", vec![Some(1.0), Some(f64::NAN)]).unwrap();
        assert_eq!(table.get("A", "Size"), None);
        assert!(!table.is_complete());
    }

    #[test]
    fn test_mean_exposures_skip_gaps() {
        let mut table = ExposureTable::new(["Market", "Size"]);
        table.insert("A", vec![Some(1.0), None]).unwrap();
        table.insert("B", vec![Some(3.0), Some(2.0)]).unwrap();
        assert_eq!(table.mean_exposures(), vec![Some(2.0), Some(2.0)]);
    }

    #[test]
    fn test_deserialize_rejects_ragged_rows() {
        let json = r#"{"factors":["Market","Size"],"rows":{"A":[1.0,2.0],"B":[0.5]}}"#;
        assert!(serde_json::from_str::<ExposureTable>(json).is_err());

        let json = r#"{"factors":["Market","Size"],"rows":{"A":[1.0,null]}}"#;
        let table: ExposureTable = serde_json::from_str(json).unwrap();
        assert_eq!(table.get("A", "Market"), Some(1.0));
        assert!(!table.is_complete());
    }

    #[test]
    fn test_serde_keeps_coverage() {
        let mut table = ExposureTable::new(["Market"]);
        table.insert("A", vec![Some(1.1)]).unwrap();
        table.coverage.evaluated = 2;
        table.coverage.dropped.insert("B".to_string(), vec!["Market".to_string()]);

        let json = serde_json::to_string(&table).unwrap();
        assert_eq!(serde_json::from_str::<ExposureTable>(&json).unwrap(), table);
    }
}
