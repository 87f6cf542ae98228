//! Value factor - inverse of the most recent close.
//!
//! Without book or earnings data the inverse price stands in for a
//! valuation ratio: cheaper shares score higher.

use crate::{
    Result,
    traits::{Factor, FactorValues, finite},
    window::WindowData,
};

/// Value factor.
///
/// # Formula
///
/// `value = 1 / last_close`
///
/// Undefined when the last close is zero.
#[derive(Debug, Clone, Copy, Default)]
pub struct Value;

impl Factor for Value {
    fn name(&self) -> &str {
        "Value"
    }

    fn description(&self) -> &str {
        "Reciprocal of the most recent close in the window"
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
                    .filter(|endpoints| endpoints.last != 0.0)
                    .and_then(|endpoints| finite(endpoints.last.recip()));
                (symbol.clone(), value)
            })
            .collect())
    }
}
