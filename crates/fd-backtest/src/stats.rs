//! Small descriptive statistics over slices.

use statrs::statistics::Statistics;

/// Arithmetic mean; `None` for an empty slice.
pub(crate) fn mean(values: &[f64]) -> Option<f64> {
    if values.is_empty() {
        return None;
    }
    Some(values.mean())
}

/// Sample covariance (n − 1 denominator) over the common prefix; `None`
/// with fewer than two pairs.
pub(crate) fn covariance(x: &[f64], y: &[f64]) -> Option<f64> {
    let n = x.len().min(y.len());
    if n < 2 {
        return None;
    }
    Some(x[..n].covariance(&y[..n]))
}

/// Sample variance (n − 1 denominator).
pub(crate) fn variance(values: &[f64]) -> Option<f64> {
    if values.len() < 2 {
        return None;
    }
    Some(values.variance())
}

/// Sample standard deviation (n − 1 denominator).
pub(crate) fn std_dev(values: &[f64]) -> Option<f64> {
    if values.len() < 2 {
        return None;
    }
    Some(values.std_dev())
}

/// `numerator / denominator`, or `NaN` when the result is not finite.
pub(crate) fn ratio(numerator: f64, denominator: f64) -> f64 {
    let value = numerator / denominator;
    if value.is_finite() { value } else { f64::NAN }
}
