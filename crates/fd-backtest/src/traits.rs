//! Core trait definitions for factors.
//!
//! All factors implement the [`Factor`] trait, which provides a unified interface
//! for computing raw per-asset exposures from a trailing price window.

use crate::{Result, window::WindowData};
use std::collections::BTreeMap;

/// Raw exposures of one factor, keyed by symbol.
///
/// `None` marks an exposure that cannot be defined for that symbol (too few
/// observations, non-positive price, zero market variance). It is never
/// replaced by a numeric placeholder.
pub type FactorValues = BTreeMap<String, Option<f64>>;

/// A factor that can be computed from a price window.
///
/// Factors transform a window of prices into per-asset exposures that
/// capture a systematic source of return.
pub trait Factor: Send + Sync + std::fmt::Debug {
    /// Unique identifier for this factor.
    ///
    /// Used as the column name in exposure tables and as the key in target
    /// exposure vectors.
    fn name(&self) -> &str;

    /// Human-readable description of what this factor measures.
    fn description(&self) -> &str;

    /// Columns of the price frame this factor reads.
    fn required_columns(&self) -> &[&str];

    /// Minimum number of observations per asset for a defined exposure.
    fn min_observations(&self) -> usize;

    /// Compute raw factor values for every symbol in the window.
    fn compute_raw(&self, window: &WindowData) -> Result<FactorValues>;
}

/// Marker trait for factor configuration types.
///
/// All config types should implement Default, Clone, Send, Sync, and Debug.
pub trait FactorConfig: Default + Clone + Send + Sync + std::fmt::Debug {}

/// A factor that supports runtime configuration.
pub trait ConfigurableFactor: Factor {
    /// Configuration type for this factor.
    type Config: FactorConfig;

    /// Create a new factor with the given configuration.
    fn with_config(config: Self::Config) -> Self;

    /// Returns the current configuration.
    fn config(&self) -> &Self::Config;
}

/// Blanket implementation for any type that satisfies the trait bounds.
impl<T: Default + Clone + Send + Sync + std::fmt::Debug> FactorConfig for T {}

/// Keep a value only if it is finite.
pub(crate) fn finite(value: f64) -> Option<f64> {
    value.is_finite().then_some(value)
}
