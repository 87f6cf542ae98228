//! Cross-sectional factor return estimation.
//!
//! For every date in a window the asset returns of that date are regressed
//! on the assets' exposures:
//!
//! `r_i = a + Σ_f b_f · x_{i,f} + e_i`
//!
//! The slope `b_f` is the estimated return of factor `f` on that date. The
//! intercept absorbs the average return and is not reported.

use crate::{
    BacktestError, ExposureTable, PriceFrame, Result, returns::ReturnSeries, returns::ReturnsTable,
};
use chrono::NaiveDate;
use nalgebra::{DMatrix, DVector};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;

/// Estimated factor returns of a single date.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct FactorReturnRow {
    /// One coefficient per factor, in the series' factor order.
    pub returns: Vec<f64>,
    /// Number of assets in the cross-section.
    pub assets: usize,
    /// Number of exposure cells filled by mean imputation.
    pub imputed: usize,
}

/// Factor returns per date, holding only dates where a fit was feasible.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(try_from = "FactorReturnsData")]
pub struct FactorReturns {
    factors: Vec<String>,
    rows: BTreeMap<NaiveDate, FactorReturnRow>,
}

#[derive(Deserialize)]
struct FactorReturnsData {
    factors: Vec<String>,
    rows: BTreeMap<NaiveDate, FactorReturnRow>,
}

impl TryFrom<FactorReturnsData> for FactorReturns {
    type Error = BacktestError;

    fn try_from(data: FactorReturnsData) -> Result<Self> {
        let width = data.factors.len();
        if let Some((date, row)) = data.rows.iter().find(|(_, row)| row.returns.len() != width) {
            return Err(BacktestError::Computation(format!(
                "factor return row on {date} has {} values for {width} factors",
                row.returns.len()
            )));
        }
        Ok(Self {
            factors: data.factors,
            rows: data.rows,
        })
    }
}

impl FactorReturns {
    /// Create an empty series over the given factors.
    pub fn new(factors: Vec<String>) -> Self {
        Self {
            factors,
            rows: BTreeMap::new(),
        }
    }

    /// Factor names in column order.
    pub fn factors(&self) -> &[String] {
        &self.factors
    }

    /// Fitted row for a date.
    pub fn row(&self, date: NaiveDate) -> Option<&FactorReturnRow> {
        self.rows.get(&date)
    }

    /// Return of `factor` on `date`.
    pub fn get(&self, date: NaiveDate, factor: &str) -> Option<f64> {
        let index = self.factors.iter().position(|f| f == factor)?;
        self.rows.get(&date)?.returns.get(index).copied()
    }

    /// Return series of a single factor.
    pub fn factor(&self, factor: &str) -> Option<ReturnSeries> {
        let index = self.factors.iter().position(|f| f == factor)?;
        Some(
            self.rows
                .iter()
                .filter_map(|(date, row)| Some((*date, *row.returns.get(index)?)))
                .collect(),
        )
    }

    /// Dates with a fit, ascending.
    pub fn dates(&self) -> impl Iterator<Item = NaiveDate> + '_ {
        self.rows.keys().copied()
    }

    /// Rows in date order.
    pub fn iter(&self) -> impl Iterator<Item = (NaiveDate, &FactorReturnRow)> {
        self.rows.iter().map(|(date, row)| (*date, row))
    }

    /// Number of fitted dates.
    pub fn len(&self) -> usize {
        self.rows.len()
    }

    /// Whether no date could be fitted.
    pub fn is_empty(&self) -> bool {
        self.rows.is_empty()
    }
}

/// Runs one ordinary least-squares fit per date.
#[derive(Debug, Clone, Copy, Default)]
pub struct FactorReturnEstimator;

impl FactorReturnEstimator {
    /// Estimate factor returns from a returns table and an exposure table.
    ///
    /// Per date, the cross-section is the set of assets with both an
    /// exposure row and a defined return. Missing exposure cells inside it
    /// are replaced by the factor's cross-sectional mean. A date is skipped
    /// when the cross-section is empty or a factor has no defined exposure
    /// in it. A table without factor columns fits no date.
    pub fn estimate(&self, returns: &ReturnsTable, exposures: &ExposureTable) -> FactorReturns {
        let mut series = FactorReturns::new(exposures.factors().to_vec());
        let width = exposures.factors().len();
        if width == 0 {
            tracing::debug!("exposure table has no factor columns, nothing to estimate");
            return series;
        }

        for (date, row) in returns.iter() {
            let cross_section: Vec<(f64, &[Option<f64>])> = row
                .iter()
                .filter_map(|(asset, value)| exposures.row(asset).map(|x| (*value, x)))
                .collect();

            if cross_section.is_empty() {
                tracing::trace!(%date, "no asset with both exposure and return");
                continue;
            }

            let Some((design, imputed)) = impute(&cross_section, width) else {
                tracing::trace!(%date, "factor column without any defined exposure");
                continue;
            };

            let targets: Vec<f64> = cross_section.iter().map(|(value, _)| *value).collect();
            if let Some(coefficients) = least_squares(&targets, &design, width) {
                series.rows.insert(
                    date,
                    FactorReturnRow {
                        returns: coefficients,
                        assets: targets.len(),
                        imputed,
                    },
                );
            }
        }

        series
    }
}

/// Factor returns over a price window, benchmark excluded.
pub fn estimate_factor_returns(
    window: &PriceFrame,
    exposures: &ExposureTable,
    benchmark: Option<&str>,
) -> Result<FactorReturns> {
    let returns = window.returns_table(benchmark)?;
    Ok(FactorReturnEstimator.estimate(&returns, exposures))
}

/// Fill undefined cells with the column mean of the cross-section.
///
/// Returns the completed design rows and the number of filled cells, or
/// `None` if some column has no defined value to average.
fn impute(cross_section: &[(f64, &[Option<f64>])], width: usize) -> Option<(Vec<Vec<f64>>, usize)> {
    let mut means = Vec::with_capacity(width);
    for column in 0..width {
        let values: Vec<f64> = cross_section
            .iter()
            .filter_map(|(_, row)| row[column])
            .collect();
        means.push(crate::stats::mean(&values)?);
    }

    let mut imputed = 0;
    let design: Vec<Vec<f64>> = cross_section
        .iter()
        .map(|(_, row)| {
            row.iter()
                .zip(&means)
                .map(|(value, mean)| {
                    value.unwrap_or_else(|| {
                        imputed += 1;
                        *mean
                    })
                })
                .collect()
        })
        .collect();

    Some((design, imputed))
}

/// Least-squares slopes of `y` on `x` with an intercept.
///
/// Both sides are centered, which removes the intercept column, then the
/// centered system is solved through the SVD. Singular values below the
/// relative cutoff are treated as zero, giving the minimum-norm solution
/// when the exposures are collinear.
fn least_squares(y: &[f64], x: &[Vec<f64>], width: usize) -> Option<Vec<f64>> {
    let n = y.len();
    if n == 0 || width == 0 || x.len() != n {
        return None;
    }
    let y_mean = crate::stats::mean(y)?;
    let x_means: Vec<f64> = (0..width)
        .map(|j| x.iter().map(|row| row[j]).sum::<f64>() / n as f64)
        .collect();

    let design = DMatrix::from_fn(n, width, |i, j| x[i][j] - x_means[j]);
    let target = DVector::from_fn(n, |i, _| y[i] - y_mean);

    let svd = design.svd(true, true);
    let largest = svd.singular_values.iter().copied().fold(0.0_f64, f64::max);
    let cutoff = largest * f64::EPSILON * n.max(width) as f64;

    let solution = svd.solve(&target, cutoff).ok()?;
    let coefficients: Vec<f64> = solution.iter().copied().collect();
    coefficients
        .iter()
        .all(|c| c.is_finite())
        .then_some(coefficients)
}

#[cfg(test)]
mod tests {
    use super::*;
    use approx::assert_relative_eq;

    fn day(d: u32) -> NaiveDate {
        NaiveDate::from_ymd_opt(2024, 5, d).unwrap()
    }

    fn exposures() -> ExposureTable {
        let mut table = ExposureTable::new(["Market", "Size"]);
        table.insert("A", vec![Some(1.2), Some(3.0)]).unwrap();
        table.insert("B", vec![Some(0.8), Some(5.0)]).unwrap();
        table.insert("C", vec![Some(1.0), Some(4.0)]).unwrap();
        table.insert("D", vec![Some(1.5), Some(2.0)]).unwrap();
        table.insert("E", vec![Some(0.5), Some(6.5)]).unwrap();
        table
    }

    #[test]
    fn test_recovers_exact_factor_returns() {
        let table = exposures();
        let mut returns = ReturnsTable::default();
        for (d, (alpha, market, size)) in [(0.001, 0.02, -0.003), (-0.002, -0.01, 0.004)]
            .into_iter()
            .enumerate()
        {
            for (asset, row) in table.iter() {
                let r = alpha + market * row[0].unwrap() + size * row[1].unwrap();
                returns.insert(day(d as u32 + 1), asset, r);
            }
        }

        let series = FactorReturnEstimator.estimate(&returns, &table);
        assert_eq!(series.len(), 2);
        assert_relative_eq!(series.get(day(1), "Market").unwrap(), 0.02, epsilon = 1e-10);
        assert_relative_eq!(series.get(day(1), "Size").unwrap(), -0.003, epsilon = 1e-10);
        assert_relative_eq!(series.get(day(2), "Market").unwrap(), -0.01, epsilon = 1e-10);
        assert_relative_eq!(series.get(day(2), "Size").unwrap(), 0.004, epsilon = 1e-10);
        assert_eq!(series.row(day(1)).unwrap().assets, 5);
    }

    #[test]
    fn test_dates_without_cross_section_are_dropped() {
        let table = exposures();
        let mut returns = ReturnsTable::default();
        returns.insert(day(1), "UNKNOWN", 0.01);
        returns.insert(day(2), "A", 0.01);
        returns.insert(day(2), "B", 0.02);

        let series = FactorReturnEstimator.estimate(&returns, &table);
        assert_eq!(series.dates().collect::<Vec<_>>(), vec![day(2)]);
    }

    #[test]
    fn test_missing_cells_are_imputed() {
        let mut table = ExposureTable::new(["Market"]);
        table.insert("A", vec![Some(1.0)]).unwrap();
        table.insert("B", vec![None]).unwrap();
        table.insert("C", vec![Some(3.0)]).unwrap();

        let mut returns = ReturnsTable::default();
        returns.insert(day(1), "A", 0.01);
        returns.insert(day(1), "B", 0.02);
        returns.insert(day(1), "C", 0.03);

        let series = FactorReturnEstimator.estimate(&returns, &table);
        let row = series.row(day(1)).unwrap();
        assert_eq!(row.imputed, 1);
        assert_eq!(row.assets, 3);
        assert_relative_eq!(row.returns[0], 0.01, epsilon = 1e-12);
    }

    #[test]
    fn test_column_without_values_drops_date() {
        let mut table = ExposureTable::new(["Market"]);
        table.insert("A", vec![None]).unwrap();

        let mut returns = ReturnsTable::default();
        returns.insert(day(1), "A", 0.01);

        assert!(FactorReturnEstimator.estimate(&returns, &table).is_empty());
    }

    #[test]
    fn test_single_asset_cross_section_is_zero() {
        let mut table = ExposureTable::new(["Market", "Size"]);
        table.insert("A", vec![Some(1.0), Some(4.0)]).unwrap();

        let mut returns = ReturnsTable::default();
        returns.insert(day(1), "A", 0.05);

        let series = FactorReturnEstimator.estimate(&returns, &table);
        assert_eq!(series.row(day(1)).unwrap().returns, vec![0.0, 0.0]);
    }

    #[test]
    fn test_factor_series_extraction() {
        let table = exposures();
        let mut returns = ReturnsTable::default();
        for (asset, row) in table.iter() {
            returns.insert(day(3), asset, 0.5 * row[0].unwrap());
        }

        let series = FactorReturnEstimator.estimate(&returns, &table);
        let market = series.factor("Market").unwrap();
        assert_relative_eq!(market.get(day(3)).unwrap(), 0.5, epsilon = 1e-10);
        assert!(series.factor("Quality").is_none());
    }

    #[test]
    fn test_table_without_factors_fits_nothing() {
        let mut table = ExposureTable::new(Vec::<String>::new());
        table.insert("A", Vec::new()).unwrap();

        let mut returns = ReturnsTable::default();
        returns.insert(day(1), "A", 0.01);

        let series = FactorReturnEstimator.estimate(&returns, &table);
        assert!(series.is_empty());
        assert!(series.factors().is_empty());
        assert!(least_squares(&[0.01], &[Vec::new()], 0).is_none());
    }

    #[test]
    fn test_deserialize_checks_row_width() {
        let json = r#"{"factors":["Market","Size"],"rows":{"2024-05-01":{"returns":[0.1],"assets":3,"imputed":0}}}"#;
        assert!(serde_json::from_str::<FactorReturns>(json).is_err());

        let json = r#"{"factors":["Market"],"rows":{"2024-05-01":{"returns":[0.1],"assets":3,"imputed":0}}}"#;
        let series: FactorReturns = serde_json::from_str(json).unwrap();
        assert_eq!(series.get(day(1), "Market"), Some(0.1));
        assert_eq!(series.get(day(1), "Size"), None);
    }
}
