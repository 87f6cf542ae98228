//! Factor attribution of realized portfolio returns.

use crate::{ExposureTable, estimator::FactorReturns, returns::ReturnSeries};
use serde::{Deserialize, Serialize};

/// Decomposition of summed portfolio return into factor contributions and a
/// residual.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct Attribution {
    /// `(factor, contribution)` in factor order
    pub contributions: Vec<(String, f64)>,
    /// Part of the total not explained by any factor
    pub residual: f64,
    /// Sum of portfolio returns
    pub total: f64,
}

impl Attribution {
    /// Contribution of a factor.
    pub fn get(&self, factor: &str) -> Option<f64> {
        self.contributions
            .iter()
            .find(|(name, _)| name == factor)
            .map(|(_, value)| *value)
    }

    /// Contributions and residual as fractions of the total.
    ///
    /// `None` when the portfolio returns sum to zero. The residual is the
    /// last entry, labelled `Residual`.
    pub fn fractions(&self) -> Option<Vec<(String, f64)>> {
        if self.total == 0.0 || !self.total.is_finite() {
            return None;
        }
        Some(
            self.contributions
                .iter()
                .cloned()
                .chain(std::iter::once(("Residual".to_string(), self.residual)))
                .map(|(name, value)| (name, value / self.total))
                .collect(),
        )
    }
}

/// Attribute summed portfolio returns to factors.
///
/// Each factor contributes its summed return scaled by the cross-sectional
/// mean exposure of `exposures`. A factor without any defined exposure
/// contributes zero.
pub fn factor_attribution(
    factor_returns: &FactorReturns,
    exposures: &ExposureTable,
    portfolio_returns: &ReturnSeries,
) -> Attribution {
    let means = exposures.mean_exposures();

    let contributions: Vec<(String, f64)> = exposures
        .factors()
        .iter()
        .zip(means)
        .map(|(factor, mean)| {
            let summed = factor_returns.factor(factor).map_or(0.0, |series| series.sum());
            (factor.clone(), mean.map_or(0.0, |m| summed * m))
        })
        .collect();

    let total = portfolio_returns.sum();
    let explained: f64 = contributions.iter().map(|(_, value)| value).sum();

    Attribution {
        contributions,
        residual: total - explained,
        total,
    }
}
