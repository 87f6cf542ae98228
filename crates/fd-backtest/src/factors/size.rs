//! Size factor - log of the most recent close.
//!
//! Uses the last close in the window as a simple proxy for company size.
//! The log transformation compresses the scale so that a handful of
//! high-priced names do not dominate the cross-sectional regression.

use crate::{
    Result,
    traits::{Factor, FactorValues, finite},
    window::WindowData,
};

/// Size factor.
///
/// # Formula
///
/// `size = ln(last_close)`
///
/// Undefined when the last close is zero or negative.
#[derive(Debug, Clone, Copy, Default)]
pub struct Size;

impl Factor for Size {
    fn name(&self) -> &str {
        "Size"
    }

    fn description(&self) -> &str {
        "Natural logarithm of the most recent close in the window"
    }

    fn required_columns(&self) -> &[&str] {
        &["symbol", "date", "close"]
    }

    fn min_observations(&self) -> usize {
        1
    }

    fn compute_raw(&self, window: &WindowData) -> Result<FactorValues> {
        Ok(window
            .symbols()
            .iter()
            .map(|symbol| {
                let value = window
                    .endpoints()
                    .get(symbol)
                    .filter(|endpoints| endpoints.last > 0.0)
                    .and_then(|endpoints| finite(endpoints.last.ln()));
                (symbol.clone(), value)
            })
            .collect())
    }
}
