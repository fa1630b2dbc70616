//! Composite scoring of evaluation results.
//!
//! Each metric is turned into a loss (lower is better), min-max scaled
//! across the population being compared, then combined with the
//! [`MetricWeighting`] weights. Failed evaluations score `+inf`.

use super::results::EvaluationResult;
use crate::error::{ForecastError, Result};
use crate::utils::metrics::SeriesMetrics;
use serde::{Deserialize, Serialize};

const N_TERMS: usize = 7;

/// Relative weight of each metric in the composite score.
///
/// Zero removes a metric from the score entirely.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct MetricWeighting {
    pub smape_weighting: f64,
    pub mae_weighting: f64,
    pub rmse_weighting: f64,
    pub spl_weighting: f64,
    pub contour_weighting: f64,
    pub containment_weighting: f64,
    pub runtime_weighting: f64,
}

impl Default for MetricWeighting {
    fn default() -> Self {
        Self {
            smape_weighting: 5.0,
            mae_weighting: 2.0,
            rmse_weighting: 2.0,
            spl_weighting: 3.0,
            contour_weighting: 1.0,
            containment_weighting: 0.0,
            runtime_weighting: 0.0,
        }
    }
}

impl MetricWeighting {
    fn as_array(&self) -> [f64; N_TERMS] {
        [
            self.smape_weighting,
            self.mae_weighting,
            self.rmse_weighting,
            self.spl_weighting,
            self.contour_weighting,
            self.containment_weighting,
            self.runtime_weighting,
        ]
    }

    pub fn validate(&self) -> Result<()> {
        let weights = self.as_array();
        if weights.iter().any(|w| !w.is_finite() || *w < 0.0) {
            return Err(ForecastError::InvalidParameter(
                "metric weights must be finite and non-negative".to_string(),
            ));
        }
        if weights.iter().all(|w| *w == 0.0) {
            return Err(ForecastError::InvalidParameter(
                "at least one metric weight must be positive".to_string(),
            ));
        }
        Ok(())
    }
}

/// Per-term minimum and maximum loss over a population.
#[derive(Debug, Clone, PartialEq)]
pub struct MetricScale {
    lo: [f64; N_TERMS],
    hi: [f64; N_TERMS],
}

impl MetricScale {
    fn normalize(&self, term: usize, loss: f64) -> f64 {
        let range = self.hi[term] - self.lo[term];
        if range > 0.0 && range.is_finite() {
            (loss - self.lo[term]) / range
        } else {
            0.0
        }
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct Scorer {
    weighting: MetricWeighting,
    prediction_interval: f64,
}

impl Scorer {
    pub fn new(weighting: MetricWeighting, prediction_interval: f64) -> Self {
        Self {
            weighting,
            prediction_interval,
        }
    }

    pub fn weighting(&self) -> &MetricWeighting {
        &self.weighting
    }

    /// Loss per term: contour is rewarded, containment is judged by its
    /// distance from the nominal interval coverage.
    fn losses(&self, m: &SeriesMetrics, runtime_seconds: f64) -> [f64; N_TERMS] {
        [
            m.smape,
            m.mae,
            m.rmse,
            m.spl,
            1.0 - m.contour,
            (m.containment - self.prediction_interval).abs(),
            runtime_seconds,
        ]
    }

    /// Fit the scaling on a population of `(metrics, runtime_seconds)`.
    pub fn fit_scale<'a, I>(&self, population: I) -> MetricScale
    where
        I: IntoIterator<Item = (&'a SeriesMetrics, f64)>,
    {
        let mut lo = [f64::INFINITY; N_TERMS];
        let mut hi = [f64::NEG_INFINITY; N_TERMS];
        for (metrics, runtime) in population {
            for (term, loss) in self.losses(metrics, runtime).into_iter().enumerate() {
                if loss.is_finite() {
                    lo[term] = lo[term].min(loss);
                    hi[term] = hi[term].max(loss);
                }
            }
        }
        MetricScale { lo, hi }
    }

    /// Weighted sum of scaled losses.
    pub fn score_metrics(
        &self,
        metrics: &SeriesMetrics,
        runtime_seconds: f64,
        scale: &MetricScale,
    ) -> f64 {
        let losses = self.losses(metrics, runtime_seconds);
        let mut score = 0.0;
        for (term, weight) in self.weighting.as_array().into_iter().enumerate() {
            if weight == 0.0 {
                continue;
            }
            let loss = losses[term];
            if !loss.is_finite() {
                return f64::INFINITY;
            }
            score += weight * scale.normalize(term, loss);
        }
        score
    }

    /// Weighted sum of unscaled losses, runtime excluded.
    ///
    /// Unlike scaled scores this keeps the distance between templates, so
    /// it can say how close a runner-up is to the best.
    pub fn raw_loss(&self, metrics: &SeriesMetrics) -> f64 {
        let losses = self.losses(metrics, 0.0);
        let mut total = 0.0;
        for (term, weight) in self.weighting.as_array().into_iter().enumerate() {
            if weight == 0.0 || term == N_TERMS - 1 {
                continue;
            }
            if !losses[term].is_finite() {
                return f64::INFINITY;
            }
            total += weight * losses[term];
        }
        total
    }

    /// Score of one result row; `+inf` for failures.
    pub fn score(&self, row: &EvaluationResult, scale: &MetricScale) -> f64 {
        match &row.metrics {
            Some(m) if row.exception.is_none() => {
                self.score_metrics(&m.aggregate, row.runtime.as_secs_f64(), scale)
            }
            _ => f64::INFINITY,
        }
    }

    /// Score rows against each other, scaling over the successful ones.
    pub fn score_rows(&self, rows: &[&EvaluationResult]) -> Vec<f64> {
        let scale = self.fit_scale(rows.iter().filter_map(|r| {
            r.metrics
                .as_ref()
                .filter(|_| r.exception.is_none())
                .map(|m| (&m.aggregate, r.runtime.as_secs_f64()))
        }));
        rows.iter().map(|r| self.score(r, &scale)).collect()
    }
}
