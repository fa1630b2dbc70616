//! Drift naive model.
//!
//! Forecasts the last value plus a drift term estimated from historical data.

use crate::error::{ForecastError, Result};
use crate::models::{Forecaster, SeriesForecast};
use crate::utils::stats::rms;

/// Random walk with drift forecaster.
///
/// The forecast is: y_hat\[t+h\] = y\[t\] + h * drift
/// where drift is the average change in the series.
#[derive(Debug, Clone, Default)]
pub struct DriftNaive {
    last_value: Option<f64>,
    drift: Option<f64>,
    fitted: Option<Vec<f64>>,
    residuals: Option<Vec<f64>>,
}

impl DriftNaive {
    pub fn new() -> Self {
        Self::default()
    }

    /// Get the estimated drift parameter.
    pub fn drift(&self) -> Option<f64> {
        self.drift
    }
}

impl Forecaster for DriftNaive {
    fn fit(&mut self, series: &[f64]) -> Result<()> {
        let n = series.len();
        if n < 2 {
            return Err(ForecastError::InsufficientData { needed: 2, got: n });
        }

        let drift = (series[n - 1] - series[0]) / (n - 1) as f64;
        let mut fitted = Vec::with_capacity(n);
        fitted.push(f64::NAN);
        fitted.extend(series[..n - 1].iter().map(|y| y + drift));

        self.residuals = Some(series.iter().zip(&fitted).map(|(y, f)| y - f).collect());
        self.fitted = Some(fitted);
        self.last_value = Some(series[n - 1]);
        self.drift = Some(drift);
        Ok(())
    }

    fn predict(&self, horizon: usize) -> Result<Vec<f64>> {
        let last = self.last_value.ok_or(ForecastError::FitRequired)?;
        let drift = self.drift.ok_or(ForecastError::FitRequired)?;
        Ok((1..=horizon).map(|h| last + h as f64 * drift).collect())
    }

    fn predict_with_intervals(&self, horizon: usize, level: f64) -> Result<SeriesForecast> {
        let point = self.predict(horizon)?;
        let sigma = rms(self.residuals.as_deref().unwrap_or(&[]));
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
        "DriftNaive"
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use approx::assert_relative_eq;

    #[test]
    fn extends_linear_trend() {
        let mut model = DriftNaive::new();
        model.fit(&[1.0, 3.0, 5.0, 7.0]).unwrap();
        assert_relative_eq!(model.drift().unwrap(), 2.0, epsilon = 1e-10);
        assert_eq!(model.predict(2).unwrap(), vec![9.0, 11.0]);
    }

    #[test]
    fn perfect_line_has_zero_width_interval() {
        let mut model = DriftNaive::new();
        model.fit(&[1.0, 2.0, 3.0]).unwrap();
        let fc = model.predict_with_intervals(2, 0.9).unwrap();
        assert_eq!(fc.lower, fc.point);
    }

    #[test]
    fn needs_two_points() {
        assert!(DriftNaive::new().fit(&[1.0]).is_err());
    }
}
