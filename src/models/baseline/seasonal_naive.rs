//! Seasonal Naive forecasting model.
//!
//! Forecasts by repeating values from the same position in earlier cycles.

use crate::error::{ForecastError, Result};
use crate::models::{Forecaster, SeriesForecast};
use crate::utils::stats::{mean, median, rms};
use serde::{Deserialize, Serialize};

/// Cycles considered by the mean and median methods.
const MAX_CYCLES: usize = 4;

/// How values from past cycles are combined.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum SeasonalMethod {
    /// Value from the most recent cycle.
    #[default]
    LastValue,
    Mean,
    Median,
}

impl SeasonalMethod {
    pub const ALL: [SeasonalMethod; 3] = [
        SeasonalMethod::LastValue,
        SeasonalMethod::Mean,
        SeasonalMethod::Median,
    ];
}

/// Parameters of [`SeasonalNaive`].
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct SeasonalNaiveParams {
    pub lag_1: usize,
    /// Optional second seasonality, blended equally with the first.
    #[serde(default)]
    pub lag_2: Option<usize>,
    #[serde(default)]
    pub method: SeasonalMethod,
}

impl Default for SeasonalNaiveParams {
    fn default() -> Self {
        Self {
            lag_1: 7,
            lag_2: None,
            method: SeasonalMethod::LastValue,
        }
    }
}

/// Seasonal Naive forecaster.
#[derive(Debug, Clone)]
pub struct SeasonalNaive {
    params: SeasonalNaiveParams,
    history: Option<Vec<f64>>,
    fitted: Option<Vec<f64>>,
    residuals: Option<Vec<f64>>,
}

impl SeasonalNaive {
    pub fn new(params: SeasonalNaiveParams) -> Self {
        Self {
            params,
            history: None,
            fitted: None,
            residuals: None,
        }
    }

    /// Seasonal estimate for step `h` (0-based) using lag `lag`.
    fn seasonal_value(history: &[f64], lag: usize, h: usize, method: SeasonalMethod) -> f64 {
        let n = history.len();
        let offset = h % lag;
        let cycles: Vec<f64> = (1..=MAX_CYCLES)
            .take_while(|k| k * lag <= n)
            .map(|k| history[n - k * lag + offset])
            .collect();
        match method {
            SeasonalMethod::LastValue => cycles[0],
            SeasonalMethod::Mean => mean(&cycles),
            SeasonalMethod::Median => median(&cycles),
        }
    }

    fn forecast_step(&self, history: &[f64], h: usize) -> f64 {
        let first = Self::seasonal_value(history, self.params.lag_1, h, self.params.method);
        match self.params.lag_2 {
            Some(lag_2) => {
                let second = Self::seasonal_value(history, lag_2, h, SeasonalMethod::LastValue);
                (first + second) / 2.0
            }
            None => first,
        }
    }
}

impl Default for SeasonalNaive {
    fn default() -> Self {
        Self::new(SeasonalNaiveParams::default())
    }
}

impl Forecaster for SeasonalNaive {
    fn fit(&mut self, series: &[f64]) -> Result<()> {
        let lag_1 = self.params.lag_1;
        let longest = lag_1.max(self.params.lag_2.unwrap_or(0));
        if lag_1 == 0 || self.params.lag_2 == Some(0) {
            return Err(ForecastError::InvalidParameter(
                "seasonal lag must be positive".to_string(),
            ));
        }
        if series.len() < longest {
            return Err(ForecastError::InsufficientData {
                needed: longest,
                got: series.len(),
            });
        }

        // y_hat[t] = y[t - lag_1]
        let fitted: Vec<f64> = (0..series.len())
            .map(|i| if i < lag_1 { f64::NAN } else { series[i - lag_1] })
            .collect();
        self.residuals = Some(series.iter().zip(&fitted).map(|(y, f)| y - f).collect());
        self.fitted = Some(fitted);
        self.history = Some(series.to_vec());
        Ok(())
    }

    fn predict(&self, horizon: usize) -> Result<Vec<f64>> {
        let history = self.history.as_ref().ok_or(ForecastError::FitRequired)?;
        Ok((0..horizon).map(|h| self.forecast_step(history, h)).collect())
    }

    fn predict_with_intervals(&self, horizon: usize, level: f64) -> Result<SeriesForecast> {
        let point = self.predict(horizon)?;
        let sigma = rms(self.residuals.as_deref().unwrap_or(&[]));
        let lag = self.params.lag_1;
        // Uncertainty grows with each completed cycle
        let se: Vec<f64> = (0..horizon)
            .map(|h| sigma * ((h / lag + 1) as f64).sqrt())
            .collect();
        Ok(SeriesForecast::from_standard_errors(point, &se, level))
    }

    fn fitted_values(&self) -> Option<&[f64]> {
        self.fitted.as_deref()
    }

    fn residuals(&self) -> Option<&[f64]> {
        self.residuals.as_deref()
    }

    fn name(&self) -> &str {
        "SeasonalNaive"
    }
}
