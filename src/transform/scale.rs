//! Scaling transforms fitted on a training series.
//!
//! Each transform learns an affine map `x -> (x - center) / scale` on the
//! training data so the same map can be inverted on forecasts.

use crate::utils::stats::{mean, median, quantile, std_dev};

/// Result of a scaling transform, containing parameters for inverse transform.
#[derive(Debug, Clone, PartialEq)]
pub struct ScaleResult {
    /// Transformed data
    pub data: Vec<f64>,
    /// Center value used (mean, median or minimum)
    pub center: f64,
    /// Scale value used (std dev, IQR or range)
    pub scale: f64,
}

impl ScaleResult {
    fn fit(series: &[f64], center: f64, spread: f64) -> Self {
        let scale = if spread.is_finite() && spread >= 1e-10 {
            spread
        } else {
            1.0
        };
        let center = if center.is_finite() { center } else { 0.0 };
        let data = series.iter().map(|&x| (x - center) / scale).collect();
        ScaleResult {
            data,
            center,
            scale,
        }
    }

    /// Map one transformed value back to the original scale.
    pub fn invert(&self, value: f64) -> f64 {
        value * self.scale + self.center
    }
}

/// Standardize data to zero mean and unit variance (z-score normalization).
///
/// x_scaled = (x - mean) / std
pub fn standardize(series: &[f64]) -> ScaleResult {
    let spread = if series.len() > 1 { std_dev(series) } else { 0.0 };
    ScaleResult::fit(series, mean(series), spread)
}

/// Normalize data to [0, 1] range (min-max normalization).
pub fn normalize(series: &[f64]) -> ScaleResult {
    let min = series.iter().copied().fold(f64::INFINITY, f64::min);
    let max = series.iter().copied().fold(f64::NEG_INFINITY, f64::max);
    ScaleResult::fit(series, min, max - min)
}

/// Robust scaling using median and IQR.
pub fn robust_scale(series: &[f64]) -> ScaleResult {
    let iqr = quantile(series, 0.75) - quantile(series, 0.25);
    ScaleResult::fit(series, median(series), iqr)
}

/// Offset that lifts the series minimum to at least 1.
pub fn positive_shift(series: &[f64]) -> f64 {
    let min = series.iter().copied().fold(f64::INFINITY, f64::min);
    if min.is_finite() && min <= 0.0 {
        1.0 - min
    } else {
        0.0
    }
}
