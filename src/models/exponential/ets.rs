//! Additive-error exponential smoothing with optional (damped) trend.
//!
//! With no trend parameter this is simple exponential smoothing; with `beta`
//! it is Holt's linear method, optionally damped by `damping`.

use crate::error::{ForecastError, Result};
use crate::models::{Forecaster, SeriesForecast};
use crate::utils::stats::rms;
use serde::{Deserialize, Serialize};

/// Parameters of [`ExponentialSmoothing`].
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct EtsParams {
    /// Level smoothing, in (0, 1].
    pub alpha: f64,
    /// Trend smoothing, in (0, 1]. No trend when absent.
    #[serde(default)]
    pub beta: Option<f64>,
    /// Trend damping, in (0, 1]. Ignored without a trend.
    #[serde(default)]
    pub damping: Option<f64>,
}

impl Default for EtsParams {
    fn default() -> Self {
        Self {
            alpha: 0.3,
            beta: None,
            damping: None,
        }
    }
}

impl EtsParams {
    pub fn validate(&self) -> Result<()> {
        let in_unit = |v: f64| v.is_finite() && v > 0.0 && v <= 1.0;
        if !in_unit(self.alpha) {
            return Err(ForecastError::InvalidParameter(format!(
                "alpha must be in (0, 1], got {}",
                self.alpha
            )));
        }
        for (name, value) in [("beta", self.beta), ("damping", self.damping)] {
            if let Some(v) = value {
                if !in_unit(v) {
                    return Err(ForecastError::InvalidParameter(format!(
                        "{name} must be in (0, 1], got {v}"
                    )));
                }
            }
        }
        Ok(())
    }
}

/// Exponential smoothing forecaster.
///
/// - Level: `l_t = α × y_t + (1-α) × (l_{t-1} + φ b_{t-1})`
/// - Trend: `b_t = β × (l_t - l_{t-1}) + (1-β) × φ b_{t-1}`
/// - Forecast: `ŷ_{t+h} = l_t + (φ + φ² + ... + φ^h) × b_t`
#[derive(Debug, Clone)]
pub struct ExponentialSmoothing {
    params: EtsParams,
    level: Option<f64>,
    trend: Option<f64>,
    fitted: Option<Vec<f64>>,
    residuals: Option<Vec<f64>>,
}

impl ExponentialSmoothing {
    pub fn new(params: EtsParams) -> Self {
        Self {
            params,
            level: None,
            trend: None,
            fitted: None,
            residuals: None,
        }
    }

    fn phi(&self) -> f64 {
        self.params.damping.unwrap_or(1.0)
    }

    /// φ + φ² + ... + φ^h
    fn damped_sum(phi: f64, h: usize) -> f64 {
        if (phi - 1.0).abs() < 1e-12 {
            h as f64
        } else {
            phi * (1.0 - phi.powi(h as i32)) / (1.0 - phi)
        }
    }
}

impl Forecaster for ExponentialSmoothing {
    fn fit(&mut self, series: &[f64]) -> Result<()> {
        self.params.validate()?;
        let needed = if self.params.beta.is_some() { 2 } else { 1 };
        if series.len() < needed {
            return Err(ForecastError::InsufficientData {
                needed,
                got: series.len(),
            });
        }

        let alpha = self.params.alpha;
        let beta = self.params.beta.unwrap_or(0.0);
        let phi = self.phi();

        let mut l = series[0];
        let mut b = match self.params.beta {
            Some(_) => series[1] - series[0],
            None => 0.0,
        };

        let mut fitted = Vec::with_capacity(series.len());
        fitted.push(f64::NAN);
        for &y in &series[1..] {
            fitted.push(l + phi * b);
            let l_prev = l;
            l = alpha * y + (1.0 - alpha) * (l_prev + phi * b);
            b = beta * (l - l_prev) + (1.0 - beta) * phi * b;
        }

        if !(l.is_finite() && b.is_finite()) {
            return Err(ForecastError::ComputationError(
                "exponential smoothing state diverged".to_string(),
            ));
        }

        self.residuals = Some(series.iter().zip(&fitted).map(|(y, f)| y - f).collect());
        self.fitted = Some(fitted);
        self.level = Some(l);
        self.trend = Some(b);
        Ok(())
    }

    fn predict(&self, horizon: usize) -> Result<Vec<f64>> {
        let l = self.level.ok_or(ForecastError::FitRequired)?;
        let b = self.trend.ok_or(ForecastError::FitRequired)?;
        let phi = self.phi();
        Ok((1..=horizon)
            .map(|h| l + Self::damped_sum(phi, h) * b)
            .collect())
    }

    fn predict_with_intervals(&self, horizon: usize, level: f64) -> Result<SeriesForecast> {
        let point = self.predict(horizon)?;
        let sigma = rms(self.residuals.as_deref().unwrap_or(&[]));
        let alpha = self.params.alpha;
        let beta = self.params.beta.unwrap_or(0.0);
        let phi = self.phi();

        let mut c = 1.0;
        let mut se = Vec::with_capacity(horizon);
        for h in 1..=horizon {
            if h > 1 {
                c += (alpha + alpha * beta * Self::damped_sum(phi, h - 1)).powi(2);
            }
            se.push(sigma * c.sqrt());
        }
        Ok(SeriesForecast::from_standard_errors(point, &se, level))
    }

    fn fitted_values(&self) -> Option<&[f64]> {
        self.fitted.as_deref()
    }

    fn residuals(&self) -> Option<&[f64]> {
        self.residuals.as_deref()
    }

    fn name(&self) -> &str {
        match (self.params.beta, self.params.damping) {
            (None, _) => "SES",
            (Some(_), None) => "Holt",
            (Some(_), Some(_)) => "Holt(damped)",
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use approx::assert_relative_eq;

    #[test]
    fn ses_flat_forecast() {
        let mut model = ExponentialSmoothing::new(EtsParams {
            alpha: 0.5,
            ..Default::default()
        });
        model.fit(&[2.0, 4.0]).unwrap();
        // l = 0.5 * 4 + 0.5 * 2
        assert_eq!(model.predict(3).unwrap(), vec![3.0, 3.0, 3.0]);
        assert_eq!(model.name(), "SES");
    }

    #[test]
    fn holt_follows_linear_trend() {
        let series: Vec<f64> = (0..20).map(|i| 10.0 + 2.0 * i as f64).collect();
        let mut model = ExponentialSmoothing::new(EtsParams {
            alpha: 0.8,
            beta: Some(0.2),
            damping: None,
        });
        model.fit(&series).unwrap();
        let fc = model.predict(2).unwrap();
        assert_relative_eq!(fc[0], 50.0, epsilon = 1e-8);
        assert_relative_eq!(fc[1], 52.0, epsilon = 1e-8);
    }

    #[test]
    fn damping_flattens_trend() {
        let series: Vec<f64> = (0..20).map(|i| 2.0 * i as f64).collect();
        let fit = |damping| {
            let mut model = ExponentialSmoothing::new(EtsParams {
                alpha: 0.8,
                beta: Some(0.2),
                damping,
            });
            model.fit(&series).unwrap();
            model.predict(10).unwrap()[9]
        };
        assert!(fit(Some(0.8)) < fit(None));
    }

    #[test]
    fn interval_grows_with_horizon() {
        let mut model = ExponentialSmoothing::new(EtsParams::default());
        model.fit(&[1.0, 3.0, 2.0, 4.0, 3.0, 5.0]).unwrap();
        let fc = model.predict_with_intervals(5, 0.9).unwrap();
        assert!(fc.upper[4] - fc.lower[4] > fc.upper[0] - fc.lower[0]);
    }

    #[test]
    fn rejects_out_of_range_params() {
        let mut model = ExponentialSmoothing::new(EtsParams {
            alpha: 1.5,
            ..Default::default()
        });
        assert!(matches!(
            model.fit(&[1.0, 2.0]),
            Err(ForecastError::InvalidParameter(_))
        ));
    }
}
