//! Naive forecasting models.
//!
//! `LastValueNaive` repeats the last observation, `ConstantNaive` forecasts a
//! fixed value regardless of history.

use crate::error::{ForecastError, Result};
use crate::models::{Forecaster, SeriesForecast};
use crate::utils::stats::rms;
use serde::{Deserialize, Serialize};

/// Naive forecaster that repeats the last value.
#[derive(Debug, Clone, Default)]
pub struct LastValueNaive {
    last_value: Option<f64>,
    fitted: Option<Vec<f64>>,
    residuals: Option<Vec<f64>>,
}

impl LastValueNaive {
    pub fn new() -> Self {
        Self::default()
    }
}

impl Forecaster for LastValueNaive {
    fn fit(&mut self, series: &[f64]) -> Result<()> {
        let &last = series.last().ok_or(ForecastError::EmptyData)?;
        self.last_value = Some(last);

        // y_hat[t] = y[t-1]
        let mut fitted = Vec::with_capacity(series.len());
        fitted.push(f64::NAN);
        fitted.extend_from_slice(&series[..series.len() - 1]);

        let residuals = series
            .iter()
            .zip(&fitted)
            .map(|(y, f)| y - f)
            .collect();

        self.fitted = Some(fitted);
        self.residuals = Some(residuals);
        Ok(())
    }

    fn predict(&self, horizon: usize) -> Result<Vec<f64>> {
        let last = self.last_value.ok_or(ForecastError::FitRequired)?;
        Ok(vec![last; horizon])
    }

    fn predict_with_intervals(&self, horizon: usize, level: f64) -> Result<SeriesForecast> {
        let point = self.predict(horizon)?;
        let sigma = rms(self.residuals.as_deref().unwrap_or(&[]));
        // Random-walk errors grow with sqrt(h)
        let se: Vec<f64> = (1..=horizon).map(|h| sigma * (h as f64).sqrt()).collect();
        Ok(SeriesForecast::from_standard_errors(point, &se, level))
    }

    fn fitted_values(&self) -> Option<&[f64]> {
        self.fitted.as_deref()
    }

    fn residuals(&self) -> Option<&[f64]> {
        self.residuals.as_deref()
    }

    fn name(&self) -> &str {
        "LastValueNaive"
    }
}

/// Parameters of [`ConstantNaive`].
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct ConstantNaiveParams {
    pub constant: f64,
}

impl Default for ConstantNaiveParams {
    fn default() -> Self {
        Self { constant: 0.0 }
    }
}

/// Forecasts a fixed constant.
///
/// The interval width comes from the spread of the history around the constant.
#[derive(Debug, Clone)]
pub struct ConstantNaive {
    constant: f64,
    fitted: Option<Vec<f64>>,
    residuals: Option<Vec<f64>>,
}

impl ConstantNaive {
    pub fn new(params: ConstantNaiveParams) -> Self {
        Self {
            constant: params.constant,
            fitted: None,
            residuals: None,
        }
    }
}

impl Forecaster for ConstantNaive {
    fn fit(&mut self, series: &[f64]) -> Result<()> {
        if series.is_empty() {
            return Err(ForecastError::EmptyData);
        }
        if !self.constant.is_finite() {
            return Err(ForecastError::InvalidParameter(
                "constant must be finite".to_string(),
            ));
        }
        self.fitted = Some(vec![self.constant; series.len()]);
        self.residuals = Some(series.iter().map(|y| y - self.constant).collect());
        Ok(())
    }

    fn predict(&self, horizon: usize) -> Result<Vec<f64>> {
        if self.fitted.is_none() {
            return Err(ForecastError::FitRequired);
        }
        Ok(vec![self.constant; horizon])
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
        "ConstantNaive"
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use approx::assert_relative_eq;

    #[test]
    fn last_value_repeats() {
        let mut model = LastValueNaive::new();
        model.fit(&[1.0, 2.0, 3.0, 4.0, 5.0]).unwrap();
        assert_eq!(model.predict(3).unwrap(), vec![5.0, 5.0, 5.0]);
    }

    #[test]
    fn last_value_fitted_are_shifted_history() {
        let mut model = LastValueNaive::new();
        model.fit(&[1.0, 3.0, 6.0]).unwrap();

        let fitted = model.fitted_values().unwrap();
        assert!(fitted[0].is_nan());
        assert_eq!(&fitted[1..], &[1.0, 3.0]);
        assert_eq!(&model.residuals().unwrap()[1..], &[2.0, 3.0]);
    }

    #[test]
    fn last_value_intervals_widen() {
        let mut model = LastValueNaive::new();
        model.fit(&[1.0, 2.0, 1.0, 2.0, 1.0]).unwrap();
        let fc = model.predict_with_intervals(4, 0.9).unwrap();
        let w0 = fc.upper[0] - fc.lower[0];
        let w3 = fc.upper[3] - fc.lower[3];
        assert_relative_eq!(w3 / w0, 2.0, epsilon = 1e-10);
    }

    #[test]
    fn predict_before_fit_fails() {
        assert_eq!(
            LastValueNaive::new().predict(1),
            Err(ForecastError::FitRequired)
        );
        assert!(!ConstantNaive::new(ConstantNaiveParams::default()).is_fitted());
    }

    #[test]
    fn constant_ignores_history() {
        let mut model = ConstantNaive::new(ConstantNaiveParams { constant: 1.0 });
        model.fit(&[10.0, 12.0]).unwrap();
        let fc = model.predict_with_intervals(2, 0.9).unwrap();
        assert_eq!(fc.point, vec![1.0, 1.0]);
        assert!(fc.upper[0] > 1.0);
    }

    #[test]
    fn empty_series_is_rejected() {
        assert_eq!(LastValueNaive::new().fit(&[]), Err(ForecastError::EmptyData));
    }
}
