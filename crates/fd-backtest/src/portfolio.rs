//! Factor-targeted portfolio construction.
//!
//! The constructor is a greedy, sequential-budget allocator: it walks the
//! target factors in their declared order, gives each one a slice of a unit
//! budget, and tilts toward assets whose exposure points in the target's
//! direction. It does not solve for the target exposures exactly.

use crate::{BacktestError, ExposureTable, Result};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::str::FromStr;

/// Desired portfolio exposure to one factor.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct FactorTarget {
    /// Factor name
    pub factor: String,
    /// Desired exposure; may be negative
    pub target: f64,
}

/// Ordered target exposure vector.
///
/// Order matters: the allocator consumes its budget factor by factor in this
/// order. Values are not constrained to sum to one.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct TargetExposures(Vec<FactorTarget>);

impl TargetExposures {
    /// Build from `(factor, target)` pairs, keeping their order.
    pub fn new<S: Into<String>>(targets: impl IntoIterator<Item = (S, f64)>) -> Self {
        Self(
            targets
                .into_iter()
                .map(|(factor, target)| FactorTarget {
                    factor: factor.into(),
                    target,
                })
                .collect(),
        )
    }

    /// Target of a factor.
    pub fn get(&self, factor: &str) -> Option<f64> {
        self.0.iter().find(|t| t.factor == factor).map(|t| t.target)
    }

    /// Targets in allocation order.
    pub fn iter(&self) -> impl Iterator<Item = (&str, f64)> {
        self.0.iter().map(|t| (t.factor.as_str(), t.target))
    }

    /// Factor names in allocation order.
    pub fn factors(&self) -> Vec<&str> {
        self.0.iter().map(|t| t.factor.as_str()).collect()
    }

    /// Number of targeted factors.
    pub fn len(&self) -> usize {
        self.0.len()
    }

    /// Whether no factor is targeted.
    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }
}

impl Default for TargetExposures {
    fn default() -> Self {
        Self::new([
            ("Market", 1.0),
            ("Size", -0.2),
            ("Value", 0.5),
            ("Momentum", 0.3),
        ])
    }
}

/// Parses `Market=1.0,Size=-0.2` style lists.
impl FromStr for TargetExposures {
    type Err = BacktestError;

    fn from_str(s: &str) -> Result<Self> {
        s.split(',')
            .filter(|part| !part.trim().is_empty())
            .map(|part| {
                let (factor, target) = part.split_once('=').ok_or_else(|| {
                    BacktestError::Computation(format!("expected FACTOR=VALUE, got '{part}'"))
                })?;
                let target = target.trim().parse::<f64>().map_err(|_| {
                    BacktestError::Computation(format!("invalid target for {factor}: '{target}'"))
                })?;
                Ok((factor.trim().to_string(), target))
            })
            .collect::<Result<Vec<_>>>()
            .map(Self::new)
    }
}

/// Portfolio weights over an asset universe.
///
/// After construction the absolute weights sum to one, unless allocation
/// was impossible, in which case every weight is zero and the vector is
/// flagged degenerate.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct PortfolioWeights {
    weights: BTreeMap<String, f64>,
    degenerate: bool,
}

impl PortfolioWeights {
    /// All-zero weights over `universe`, flagged degenerate.
    pub fn zeros<S: Into<String>>(universe: impl IntoIterator<Item = S>) -> Self {
        Self {
            weights: universe.into_iter().map(|a| (a.into(), 0.0)).collect(),
            degenerate: true,
        }
    }

    /// Weights taken as given.
    pub fn from_weights(weights: BTreeMap<String, f64>) -> Self {
        let degenerate = weights.values().all(|w| *w == 0.0);
        Self {
            weights,
            degenerate,
        }
    }

    /// Weight of an asset; assets outside the universe weigh zero.
    pub fn get(&self, asset: &str) -> f64 {
        self.weights.get(asset).copied().unwrap_or(0.0)
    }

    /// `(asset, weight)` pairs in asset order.
    pub fn iter(&self) -> impl Iterator<Item = (&str, f64)> {
        self.weights.iter().map(|(asset, w)| (asset.as_str(), *w))
    }

    /// Number of assets in the universe.
    pub fn len(&self) -> usize {
        self.weights.len()
    }

    /// Whether the universe is empty.
    pub fn is_empty(&self) -> bool {
        self.weights.is_empty()
    }

    /// Sum of absolute weights.
    pub fn gross(&self) -> f64 {
        self.weights.values().map(|w| w.abs()).sum()
    }

    /// Sum of signed weights.
    pub fn net(&self) -> f64 {
        self.weights.values().sum()
    }

    /// Whether allocation failed and every weight is zero.
    pub const fn is_degenerate(&self) -> bool {
        self.degenerate
    }

    /// Same weights over `universe`; assets missing here get zero.
    pub fn reindex<'a>(&self, universe: impl IntoIterator<Item = &'a str>) -> Self {
        Self {
            weights: universe
                .into_iter()
                .map(|asset| (asset.to_string(), self.get(asset)))
                .collect(),
            degenerate: self.degenerate,
        }
    }

    /// Weighted sum of the given returns, over assets with a defined return.
    pub fn apply(&self, returns: &BTreeMap<String, f64>) -> f64 {
        returns
            .iter()
            .map(|(asset, r)| self.get(asset) * r)
            .sum()
    }

    /// Portfolio-level exposure to each factor of `exposures`.
    ///
    /// Assets without a defined exposure contribute nothing to that factor.
    pub fn exposures(&self, exposures: &ExposureTable) -> Vec<(String, f64)> {
        exposures
            .factors()
            .iter()
            .map(|factor| {
                let exposure = self
                    .iter()
                    .filter_map(|(asset, w)| exposures.get(asset, factor).map(|x| w * x))
                    .sum();
                (factor.clone(), exposure)
            })
            .collect()
    }
}

/// Allocate weights toward the target exposures.
///
/// The universe is the exposure table's assets minus `excluded`. For each
/// factor in target order, `exposure × target` is normalized to unit
/// absolute sum and scaled by `min(remaining budget, |target|)`. A factor
/// whose column sums to zero in absolute value, or which the table does not
/// carry, is skipped without consuming budget. An asset with an undefined
/// exposure to an allocated factor ends with weight zero.
pub fn construct_portfolio(
    exposures: &ExposureTable,
    target: &TargetExposures,
    excluded: Option<&str>,
) -> PortfolioWeights {
    let universe: Vec<&str> = exposures
        .assets()
        .filter(|asset| Some(*asset) != excluded)
        .collect();

    let mut portfolio: BTreeMap<&str, Option<f64>> =
        universe.iter().map(|asset| (*asset, Some(0.0))).collect();
    let mut remaining_budget = 1.0_f64;

    for (factor, factor_target) in target.iter() {
        if exposures.factor_index(factor).is_none() {
            tracing::warn!(factor, "no exposure column for targeted factor, skipping");
            continue;
        }

        let factor_portfolio: Vec<(&str, Option<f64>)> = universe
            .iter()
            .map(|asset| (*asset, exposures.get(asset, factor).map(|x| x * factor_target)))
            .collect();
        let factor_sum: f64 = factor_portfolio
            .iter()
            .filter_map(|(_, value)| value.map(f64::abs))
            .sum();

        if factor_sum > 0.0 {
            let allocation = remaining_budget.min(factor_target.abs());
            for (asset, value) in factor_portfolio {
                let slot = portfolio.entry(asset).or_insert(Some(0.0));
                *slot = match (*slot, value) {
                    (Some(weight), Some(value)) => Some(weight + value / factor_sum * allocation),
                    _ => None,
                };
            }
            remaining_budget -= allocation;
        } else {
            tracing::warn!(
                factor,
                "unable to allocate to factor due to zero sum of exposures"
            );
        }
    }

    let filled: BTreeMap<String, f64> = portfolio
        .into_iter()
        .map(|(asset, weight)| (asset.to_string(), weight.unwrap_or(0.0)))
        .collect();
    let gross: f64 = filled.values().map(|w| w.abs()).sum();

    if gross > 0.0 {
        PortfolioWeights {
            weights: filled
                .into_iter()
                .map(|(asset, weight)| (asset, weight / gross))
                .collect(),
            degenerate: false,
        }
    } else {
        tracing::warn!(
            assets = universe.len(),
            "unable to construct portfolio due to zero sum of weights"
        );
        PortfolioWeights::zeros(universe)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use approx::assert_relative_eq;
    use rstest::rstest;

    fn table() -> ExposureTable {
        let mut table = ExposureTable::new(["Market", "Size", "Value", "Momentum"]);
        table
            .insert("AAPL", vec![Some(1.1), Some(4.6), Some(0.01), Some(0.04)])
            .unwrap();
        table
            .insert("GOOGL", vec![Some(0.9), Some(7.3), Some(0.0006), Some(0.027)])
            .unwrap();
        table
            .insert("XOM", vec![Some(0.7), Some(4.7), Some(0.009), Some(-0.05)])
            .unwrap();
        table
    }

    #[test]
    fn test_weights_have_unit_gross() {
        let weights = construct_portfolio(&table(), &TargetExposures::default(), None);
        assert_eq!(weights.len(), 3);
        assert!(!weights.is_degenerate());
        assert_relative_eq!(weights.gross(), 1.0, epsilon = 1e-9);
    }

    #[test]
    fn test_positive_exposures_sum_to_one() {
        let mut table = ExposureTable::new(["Market", "Size", "Value", "Momentum"]);
        table
            .insert("AAPL", vec![Some(1.0), Some(4.64), Some(0.0096), Some(0.04)])
            .unwrap();
        table
            .insert("GOOGL", vec![Some(1.0), Some(7.34), Some(0.00065), Some(0.0267)])
            .unwrap();

        let weights = construct_portfolio(&table, &TargetExposures::default(), None);
        assert_relative_eq!(weights.net(), 1.0, epsilon = 1e-6);
    }

    #[test]
    fn test_zero_factor_is_skipped_and_budget_kept() {
        let mut table = ExposureTable::new(["Market", "Value"]);
        table.insert("A", vec![Some(0.0), Some(1.0)]).unwrap();
        table.insert("B", vec![Some(0.0), Some(3.0)]).unwrap();

        let target = TargetExposures::new([("Market", 1.0), ("Value", 1.0)]);
        let weights = construct_portfolio(&table, &target, None);

        // Market is skipped, so Value receives the full unit budget.
        assert_relative_eq!(weights.get("A"), 0.25, epsilon = 1e-12);
        assert_relative_eq!(weights.get("B"), 0.75, epsilon = 1e-12);
    }

    #[test]
    fn test_budget_consumed_in_declared_order() {
        let mut table = ExposureTable::new(["Market", "Value"]);
        table.insert("A", vec![Some(1.0), Some(0.0)]).unwrap();
        table.insert("B", vec![Some(0.0), Some(1.0)]).unwrap();

        let market_first = TargetExposures::new([("Market", 0.8), ("Value", 0.8)]);
        let value_first = TargetExposures::new([("Value", 0.8), ("Market", 0.8)]);

        let w1 = construct_portfolio(&table, &market_first, None);
        let w2 = construct_portfolio(&table, &value_first, None);

        assert_relative_eq!(w1.get("A"), 0.8, epsilon = 1e-12);
        assert_relative_eq!(w1.get("B"), 0.2, epsilon = 1e-12);
        assert_relative_eq!(w2.get("A"), 0.2, epsilon = 1e-12);
        assert_relative_eq!(w2.get("B"), 0.8, epsilon = 1e-12);
    }

    #[test]
    fn test_excluded_asset_is_left_out() {
        let weights = construct_portfolio(&table(), &TargetExposures::default(), Some("XOM"));
        assert_eq!(weights.len(), 2);
        assert_eq!(weights.get("XOM"), 0.0);
        assert_relative_eq!(weights.gross(), 1.0, epsilon = 1e-9);
    }

    #[test]
    fn test_undefined_exposure_zeroes_asset() {
        let mut table = ExposureTable::new(["Market"]);
        table.insert("A", vec![Some(1.0)]).unwrap();
        table.insert("B", vec![None]).unwrap();

        let weights = construct_portfolio(&table, &TargetExposures::new([("Market", 1.0)]), None);
        assert_eq!(weights.get("B"), 0.0);
        assert_relative_eq!(weights.get("A"), 1.0, epsilon = 1e-12);
    }

    #[rstest]
    #[case::empty_table(ExposureTable::new(["Market"]))]
    #[case::all_zero({
        let mut t = ExposureTable::new(["Market"]);
        t.insert("A", vec![Some(0.0)]).unwrap();
        t.insert("B", vec![Some(0.0)]).unwrap();
        t
    })]
    fn test_degenerate_allocation_is_all_zero(#[case] table: ExposureTable) {
        let weights = construct_portfolio(&table, &TargetExposures::new([("Market", 1.0)]), None);
        assert!(weights.is_degenerate());
        assert_eq!(weights.len(), table.len());
        assert!(weights.iter().all(|(_, w)| w == 0.0));
    }

    #[test]
    fn test_unknown_target_factor_is_skipped() {
        let weights = construct_portfolio(
            &table(),
            &TargetExposures::new([("Quality", 1.0), ("Market", 1.0)]),
            None,
        );
        assert_relative_eq!(weights.gross(), 1.0, epsilon = 1e-9);
    }

    #[test]
    fn test_target_parsing_keeps_order() {
        let target: TargetExposures = "Value=0.5, Market=1.0,Size=-0.2".parse().unwrap();
        assert_eq!(target.factors(), vec!["Value", "Market", "Size"]);
        assert_eq!(target.get("Size"), Some(-0.2));
        assert!("Market".parse::<TargetExposures>().is_err());
    }

    #[test]
    fn test_apply_and_portfolio_exposures() {
        let mut table = ExposureTable::new(["Market"]);
        table.insert("A", vec![Some(2.0)]).unwrap();
        table.insert("B", vec![Some(1.0)]).unwrap();
        let weights = PortfolioWeights::from_weights(
            [("A".to_string(), 0.25), ("B".to_string(), 0.75)].into(),
        );

        let returns: BTreeMap<String, f64> =
            [("A".to_string(), 0.04), ("B".to_string(), -0.01)].into();
        assert_relative_eq!(weights.apply(&returns), 0.0025, epsilon = 1e-12);
        assert_relative_eq!(weights.exposures(&table)[0].1, 1.25, epsilon = 1e-12);
    }
}
