//! Momentum factor - total return over the window.

use crate::{
    Result,
    traits::{ConfigurableFactor, Factor, FactorValues, finite},
    window::WindowData,
};

/// Configuration for the Momentum factor.
#[derive(Debug, Clone, serde::Serialize, serde::Deserialize)]
pub struct MomentumConfig {
    /// Minimum number of closes in the window (default: 2)
    pub min_observations: usize,
}

impl Default for MomentumConfig {
    fn default() -> Self {
        Self {
            min_observations: 2,
        }
    }
}

/// Momentum factor measuring the price change across the whole window:
/// `(P_last / P_first) - 1`
///
/// The window length is set by the caller (the backtest's trailing window),
/// so with less history than the window the factor uses whatever closes
/// are available. Undefined with fewer than `min_observations` closes.
#[derive(Debug, Clone, Default)]
pub struct Momentum {
    config: MomentumConfig,
}

impl Momentum {
    /// Create a Momentum factor with the default configuration.
    pub fn new() -> Self {
        Self::default()
    }
}

impl ConfigurableFactor for Momentum {
    type Config = MomentumConfig;

    fn with_config(config: Self::Config) -> Self {
        Self { config }
    }

    fn config(&self) -> &Self::Config {
        &self.config
    }
}

impl Factor for Momentum {
    fn name(&self) -> &str {
        "Momentum"
    }

    fn description(&self) -> &str {
        "Total return from the first to the last close in the window"
    }

    fn required_columns(&self) -> &[&str] {
        &["symbol", "date", "close"]
    }

    fn min_observations(&self) -> usize {
        self.config.min_observations
    }

    fn compute_raw(&self, window: &WindowData) -> Result<FactorValues> {
        Ok(window
            .symbols()
            .iter()
            .map(|symbol| {
                let value = window
                    .endpoints()
                    .get(symbol)
                    .filter(|endpoints| endpoints.observations >= self.config.min_observations)
                    .and_then(|endpoints| finite(endpoints.last / endpoints.first - 1.0));
                (symbol.clone(), value)
            })
            .collect())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::PriceFrame;
    use approx::assert_relative_eq;
    use chrono::NaiveDate;

    fn window(series: &[(&str, &[f64])]) -> WindowData {
        let rows = series.iter().flat_map(|(symbol, closes)| {
            closes.iter().enumerate().map(move |(i, close)| {
                (
                    *symbol,
                    NaiveDate::from_ymd_opt(2023, 1, i as u32 + 1).unwrap(),
                    *close,
                    1.0,
                )
            })
        });
        WindowData::new(&PriceFrame::from_rows(rows).unwrap(), None).unwrap()
    }

    #[test]
    fn test_momentum_computation() {
        let window = window(&[("AAPL", &[100.0, 101.0, 102.0, 103.0, 104.0])]);
        let values = Momentum::new().compute_raw(&window).unwrap();
        assert_relative_eq!(values["AAPL"].unwrap(), 0.04, epsilon = 1e-12);
    }

    #[test]
    fn test_constant_price_has_zero_momentum() {
        let window = window(&[("FLAT", &[50.0, 50.0, 50.0])]);
        let values = Momentum::new().compute_raw(&window).unwrap();
        assert_eq!(values["FLAT"], Some(0.0));
    }

    #[test]
    fn test_single_observation_is_undefined() {
        let window = window(&[("NEW", &[10.0]), ("OLD", &[10.0, 12.0])]);
        let values = Momentum::new().compute_raw(&window).unwrap();
        assert_eq!(values["NEW"], None);
        assert_relative_eq!(values["OLD"].unwrap(), 0.2, epsilon = 1e-12);
    }

    #[test]
    fn test_zero_first_close_is_undefined() {
        let window = window(&[("ZERO", &[0.0, 1.0])]);
        let values = Momentum::new().compute_raw(&window).unwrap();
        assert_eq!(values["ZERO"], None);
    }
}
