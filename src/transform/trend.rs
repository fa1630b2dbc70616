//! Level and trend removal: differencing, detrending, smoothing and clipping.

use crate::error::{ForecastError, Result};
use crate::utils::stats::{mean, std_dev};

/// Lag-`lag` differences `x[t + lag] - x[t]`, plus the values needed to undo them.
#[derive(Debug, Clone, PartialEq)]
pub struct Differenced {
    pub data: Vec<f64>,
    /// Last `lag` original observations.
    pub tail: Vec<f64>,
}

impl Differenced {
    /// Re-integrate a forecast of differences onto the stored tail.
    pub fn integrate(&self, diffs: &[f64]) -> Vec<f64> {
        let lag = self.tail.len();
        let mut out: Vec<f64> = Vec::with_capacity(diffs.len());
        for (h, d) in diffs.iter().enumerate() {
            let base = if h < lag { self.tail[h] } else { out[h - lag] };
            out.push(base + d);
        }
        out
    }
}

pub fn difference(series: &[f64], lag: usize) -> Result<Differenced> {
    if lag == 0 {
        return Err(ForecastError::InvalidParameter(
            "difference lag must be positive".to_string(),
        ));
    }
    if series.len() <= lag + 1 {
        return Err(ForecastError::InsufficientData {
            needed: lag + 2,
            got: series.len(),
        });
    }
    Ok(Differenced {
        data: series.windows(lag + 1).map(|w| w[lag] - w[0]).collect(),
        tail: series[series.len() - lag..].to_vec(),
    })
}

/// Least-squares line `intercept + slope * t` over `t = 0..n`.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct LinearTrend {
    pub intercept: f64,
    pub slope: f64,
}

impl LinearTrend {
    pub fn fit(series: &[f64]) -> Result<Self> {
        let n = series.len();
        if n < 2 {
            return Err(ForecastError::InsufficientData { needed: 2, got: n });
        }
        let t_mean = (n - 1) as f64 / 2.0;
        let y_mean = mean(series);
        let (mut sxy, mut sxx) = (0.0, 0.0);
        for (t, y) in series.iter().enumerate() {
            let dt = t as f64 - t_mean;
            sxy += dt * (y - y_mean);
            sxx += dt * dt;
        }
        let slope = sxy / sxx;
        Ok(Self {
            intercept: y_mean - slope * t_mean,
            slope,
        })
    }

    pub fn at(&self, t: usize) -> f64 {
        self.intercept + self.slope * t as f64
    }
}

/// Trailing rolling mean with a partial window at the start.
pub fn rolling_mean(series: &[f64], window: usize) -> Vec<f64> {
    let window = window.max(1);
    let mut sum = 0.0;
    series
        .iter()
        .enumerate()
        .map(|(i, &x)| {
            sum += x;
            if i >= window {
                sum -= series[i - window];
            }
            sum / (i + 1).min(window) as f64
        })
        .collect()
}

/// Clip values further than `threshold` standard deviations from the mean.
pub fn clip_outliers(series: &[f64], threshold: f64) -> Vec<f64> {
    if series.len() < 2 {
        return series.to_vec();
    }
    let m = mean(series);
    let s = std_dev(series);
    if !(s.is_finite() && s > 0.0) {
        return series.to_vec();
    }
    let (lo, hi) = (m - threshold * s, m + threshold * s);
    series.iter().map(|&x| x.clamp(lo, hi)).collect()
}
