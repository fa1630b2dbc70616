//! Average-value forecaster.
//!
//! Forecasts a flat line at a summary statistic of the recent history.

use crate::error::{ForecastError, Result};
use crate::models::{Forecaster, SeriesForecast};
use crate::utils::stats::{mean, median, quantile, rms};
use serde::{Deserialize, Serialize};

/// Summary statistic used by [`AverageValueNaive`].
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum AverageMethod {
    #[default]
    Mean,
    Median,
    /// Mean of the first and third quartiles.
    Midhinge,
}

impl AverageMethod {
    pub const ALL: [AverageMethod; 3] = [
        AverageMethod::Mean,
        AverageMethod::Median,
        AverageMethod::Midhinge,
    ];

    pub fn apply(&self, values: &[f64]) -> f64 {
        match self {
            AverageMethod::Mean => mean(values),
            AverageMethod::Median => median(values),
            AverageMethod::Midhinge => (quantile(values, 0.25) + quantile(values, 0.75)) / 2.0,
        }
    }
}

/// Parameters of [`AverageValueNaive`].
#[derive(Debug, Clone, Copy, PartialEq, Default, Serialize, Deserialize)]
pub struct AverageValueNaiveParams {
    pub method: AverageMethod,
    /// Trailing window; the full history when absent.
    #[serde(default)]
    pub window: Option<usize>,
}

/// Flat forecast at the mean, median or midhinge of the last `window` values.
#[derive(Debug, Clone)]
pub struct AverageValueNaive {
    method: AverageMethod,
    window: Option<usize>,
    level: Option<f64>,
    fitted: Option<Vec<f64>>,
    residuals: Option<Vec<f64>>,
}

impl AverageValueNaive {
    pub fn new(params: AverageValueNaiveParams) -> Self {
        Self {
            method: params.method,
            window: params.window,
            level: None,
            fitted: None,
            residuals: None,
        }
    }

    pub fn level(&self) -> Option<f64> {
        self.level
    }
}

impl Forecaster for AverageValueNaive {
    fn fit(&mut self, series: &[f64]) -> Result<()> {
        if series.is_empty() {
            return Err(ForecastError::EmptyData);
        }
        if self.window == Some(0) {
            return Err(ForecastError::InvalidParameter(
                "window must be positive".to_string(),
            ));
        }

        let start = match self.window {
            Some(w) => series.len().saturating_sub(w),
            None => 0,
        };
        let level = self.method.apply(&series[start..]);

        self.level = Some(level);
        self.fitted = Some(vec![level; series.len()]);
        self.residuals = Some(series[start..].iter().map(|y| y - level).collect());
        Ok(())
    }

    fn predict(&self, horizon: usize) -> Result<Vec<f64>> {
        let level = self.level.ok_or(ForecastError::FitRequired)?;
        Ok(vec![level; horizon])
    }

    fn predict_with_intervals(&self, horizon: usize, level: f64) -> Result<SeriesForecast> {
        let point = self.predict(horizon)?;
        let sigma = rms(self.residuals.as_deref().unwrap_or(&[]));
        Ok(SeriesForecast::from_standard_errors(
            point,
            &vec![sigma; horizon],
            level,
        ))
    }

    fn fitted_values(&self) -> Option<&[f64]> {
        self.fitted.as_deref()
    }

    fn residuals(&self) -> Option<&[f64]> {
        self.residuals.as_deref()
    }

    fn name(&self) -> &str {
        "AverageValueNaive"
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use approx::assert_relative_eq;

    fn fit(method: AverageMethod, window: Option<usize>, series: &[f64]) -> f64 {
        let mut model = AverageValueNaive::new(AverageValueNaiveParams { method, window });
        model.fit(series).unwrap();
        model.predict(1).unwrap()[0]
    }

    #[test]
    fn methods_over_full_history() {
        let series = [1.0, 2.0, 3.0, 4.0, 100.0];
        assert_relative_eq!(fit(AverageMethod::Mean, None, &series), 22.0, epsilon = 1e-10);
        assert_relative_eq!(fit(AverageMethod::Median, None, &series), 3.0, epsilon = 1e-10);
        assert_relative_eq!(fit(AverageMethod::Midhinge, None, &series), 3.0, epsilon = 1e-10);
    }

    #[test]
    fn window_limits_history() {
        let series = [100.0, 100.0, 1.0, 2.0, 3.0];
        assert_relative_eq!(fit(AverageMethod::Mean, Some(3), &series), 2.0, epsilon = 1e-10);
        // Window larger than history uses everything
        assert_relative_eq!(fit(AverageMethod::Mean, Some(50), &[1.0, 3.0]), 2.0, epsilon = 1e-10);
    }

    #[test]
    fn zero_window_is_invalid() {
        let mut model = AverageValueNaive::new(AverageValueNaiveParams {
            method: AverageMethod::Mean,
            window: Some(0),
        });
        assert!(model.fit(&[1.0]).is_err());
    }

    #[test]
    fn params_serialize_lowercase() {
        let params = AverageValueNaiveParams {
            method: AverageMethod::Midhinge,
            window: Some(7),
        };
        let json = serde_json::to_string(&params).unwrap();
        assert_eq!(json, r#"{"method":"midhinge","window":7}"#);
    }
}
