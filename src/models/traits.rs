use crate::error::Result;
use crate::utils::stats::interval_z;

/// Point forecast and interval bounds of a single series.
#[derive(Debug, Clone, PartialEq)]
pub struct SeriesForecast {
    pub point: Vec<f64>,
    pub lower: Vec<f64>,
    pub upper: Vec<f64>,
}

impl SeriesForecast {
    pub fn new(point: Vec<f64>, lower: Vec<f64>, upper: Vec<f64>) -> Self {
        Self {
            point,
            lower,
            upper,
        }
    }

    /// Symmetric normal interval `point ± z * se` for each step.
    pub fn from_standard_errors(point: Vec<f64>, se: &[f64], level: f64) -> Self {
        let z = interval_z(level);
        let lower = point.iter().zip(se).map(|(p, s)| p - z * s).collect();
        let upper = point.iter().zip(se).map(|(p, s)| p + z * s).collect();
        Self {
            point,
            lower,
            upper,
        }
    }

    pub fn horizon(&self) -> usize {
        self.point.len()
    }

    /// Apply `f(step, value)` to point and both bounds.
    pub fn map<F>(self, f: F) -> Self
    where
        F: Fn(usize, f64) -> f64,
    {
        let apply = |values: Vec<f64>| -> Vec<f64> {
            values.into_iter().enumerate().map(|(h, v)| f(h, v)).collect()
        };
        Self {
            point: apply(self.point),
            lower: apply(self.lower),
            upper: apply(self.upper),
        }
    }

    /// Widen bounds where needed so that `lower <= point <= upper`.
    pub fn ordered(mut self) -> Self {
        for h in 0..self.point.len() {
            let (p, l, u) = (self.point[h], self.lower[h], self.upper[h]);
            self.lower[h] = l.min(u).min(p);
            self.upper[h] = u.max(l).max(p);
        }
        self
    }

    pub fn is_finite(&self) -> bool {
        [&self.point, &self.lower, &self.upper]
            .iter()
            .all(|s| s.iter().all(|v| v.is_finite()))
    }
}

/// Univariate forecasting model fitted on one series.
pub trait Forecaster: Send {
    /// Fit the model to a gap-free series.
    fn fit(&mut self, series: &[f64]) -> Result<()>;

    /// Point forecasts for the next `horizon` steps.
    fn predict(&self, horizon: usize) -> Result<Vec<f64>>;

    /// Point forecasts with a central interval of coverage `level`.
    fn predict_with_intervals(&self, horizon: usize, level: f64) -> Result<SeriesForecast>;

    fn fitted_values(&self) -> Option<&[f64]>;

    fn residuals(&self) -> Option<&[f64]>;

    fn name(&self) -> &str;

    fn is_fitted(&self) -> bool {
        self.fitted_values().is_some()
    }
}

pub type BoxedForecaster = Box<dyn Forecaster>;
