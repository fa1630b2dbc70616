//! Accuracy metrics for forecast evaluation.

use crate::error::{ForecastError, Result};
use crate::utils::stats::nan_mean;
use serde::{Deserialize, Serialize};

/// Error metrics of one series over one validation window.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct SeriesMetrics {
    /// Symmetric Mean Absolute Percentage Error (0-200)
    pub smape: f64,
    /// Mean Absolute Error
    pub mae: f64,
    /// Root Mean Squared Error
    pub rmse: f64,
    /// Scaled pinball loss of the interval bounds
    pub spl: f64,
    /// Share of steps whose direction of change matches the actuals
    pub contour: f64,
    /// Share of actuals inside [lower, upper]
    pub containment: f64,
}

impl SeriesMetrics {
    /// All metrics as a fixed array, in declaration order.
    pub fn as_array(&self) -> [f64; 6] {
        [
            self.smape,
            self.mae,
            self.rmse,
            self.spl,
            self.contour,
            self.containment,
        ]
    }

    pub fn is_finite(&self) -> bool {
        self.as_array().iter().all(|v| v.is_finite())
    }

    /// Element-wise mean over series, skipping non-finite entries.
    pub fn nan_mean(items: &[SeriesMetrics]) -> SeriesMetrics {
        let column = |f: fn(&SeriesMetrics) -> f64| -> f64 {
            let values: Vec<f64> = items.iter().map(f).collect();
            nan_mean(&values)
        };
        SeriesMetrics {
            smape: column(|m| m.smape),
            mae: column(|m| m.mae),
            rmse: column(|m| m.rmse),
            spl: column(|m| m.spl),
            contour: column(|m| m.contour),
            containment: column(|m| m.containment),
        }
    }
}

/// Inputs for scoring one series' forecast against its holdout.
#[derive(Debug, Clone, Copy)]
pub struct SeriesEvaluation<'a> {
    pub actual: &'a [f64],
    pub point: &'a [f64],
    pub lower: &'a [f64],
    pub upper: &'a [f64],
    /// Last finite training value, anchors the first contour step.
    pub last_train: Option<f64>,
    /// Divisor for the pinball loss, see [`naive_scale`].
    pub scale: f64,
    /// Nominal coverage of [lower, upper].
    pub prediction_interval: f64,
}

/// Calculate all metrics for one series.
///
/// Steps where the actual is missing are ignored. A non-finite forecast at
/// an observed step is an error.
pub fn evaluate_series(eval: &SeriesEvaluation<'_>) -> Result<SeriesMetrics> {
    let n = eval.actual.len();
    for other in [eval.point, eval.lower, eval.upper] {
        if other.len() != n {
            return Err(ForecastError::DimensionMismatch {
                expected: n,
                got: other.len(),
            });
        }
    }

    let observed: Vec<usize> = (0..n).filter(|&i| eval.actual[i].is_finite()).collect();
    if observed.is_empty() {
        return Err(ForecastError::EmptyData);
    }
    for &i in &observed {
        if !(eval.point[i].is_finite() && eval.lower[i].is_finite() && eval.upper[i].is_finite()) {
            return Err(ForecastError::ComputationError(
                "forecast contains non-finite values".to_string(),
            ));
        }
    }

    let pick = |s: &[f64]| -> Vec<f64> { observed.iter().map(|&i| s[i]).collect() };
    let actual = pick(eval.actual);
    let point = pick(eval.point);
    let lower = pick(eval.lower);
    let upper = pick(eval.upper);

    let lower_q = (1.0 - eval.prediction_interval) / 2.0;
    let scale = if eval.scale.is_finite() && eval.scale > 0.0 {
        eval.scale
    } else {
        1.0
    };
    let spl = (pinball_loss(&actual, &upper, 1.0 - lower_q) + pinball_loss(&actual, &lower, lower_q))
        / scale;

    Ok(SeriesMetrics {
        smape: smape(&actual, &point),
        mae: mae(&actual, &point),
        rmse: rmse(&actual, &point),
        spl,
        contour: contour(eval.actual, eval.point, eval.last_train),
        containment: containment(&actual, &lower, &upper),
    })
}

/// Mean absolute first difference of the finite training values.
///
/// Falls back to 1 for flat or too-short histories.
pub fn naive_scale(train: &[f64]) -> f64 {
    let finite: Vec<f64> = train.iter().copied().filter(|v| v.is_finite()).collect();
    if finite.len() < 2 {
        return 1.0;
    }
    let scale = finite.windows(2).map(|w| (w[1] - w[0]).abs()).sum::<f64>()
        / (finite.len() - 1) as f64;
    if scale > 0.0 && scale.is_finite() {
        scale
    } else {
        1.0
    }
}

/// Calculate MAE between two slices.
pub fn mae(actual: &[f64], predicted: &[f64]) -> f64 {
    if actual.len() != predicted.len() || actual.is_empty() {
        return f64::NAN;
    }
    actual
        .iter()
        .zip(predicted)
        .map(|(a, p)| (a - p).abs())
        .sum::<f64>()
        / actual.len() as f64
}

/// Calculate MSE between two slices.
pub fn mse(actual: &[f64], predicted: &[f64]) -> f64 {
    if actual.len() != predicted.len() || actual.is_empty() {
        return f64::NAN;
    }
    actual
        .iter()
        .zip(predicted)
        .map(|(a, p)| (a - p).powi(2))
        .sum::<f64>()
        / actual.len() as f64
}

/// Calculate RMSE between two slices.
pub fn rmse(actual: &[f64], predicted: &[f64]) -> f64 {
    mse(actual, predicted).sqrt()
}

/// Calculate SMAPE between two slices.
pub fn smape(actual: &[f64], predicted: &[f64]) -> f64 {
    if actual.len() != predicted.len() || actual.is_empty() {
        return f64::NAN;
    }
    let n = actual.len() as f64;
    actual
        .iter()
        .zip(predicted.iter())
        .map(|(a, p)| {
            let denom = a.abs() + p.abs();
            if denom == 0.0 {
                0.0
            } else {
                2.0 * (a - p).abs() / denom
            }
        })
        .sum::<f64>()
        * 100.0
        / n
}

/// Mean pinball (quantile) loss of `predicted` as the `quantile` of `actual`.
pub fn pinball_loss(actual: &[f64], predicted: &[f64], quantile: f64) -> f64 {
    if actual.len() != predicted.len() || actual.is_empty() {
        return f64::NAN;
    }
    actual
        .iter()
        .zip(predicted)
        .map(|(a, p)| {
            let diff = a - p;
            (quantile * diff).max((quantile - 1.0) * diff)
        })
        .sum::<f64>()
        / actual.len() as f64
}

/// Share of steps where forecast and actual move in the same direction.
///
/// The first step compares against `last_train`; without it the first step
/// is skipped. Steps with a missing actual on either side are ignored.
pub fn contour(actual: &[f64], predicted: &[f64], last_train: Option<f64>) -> f64 {
    let mut a = Vec::with_capacity(actual.len() + 1);
    let mut p = Vec::with_capacity(predicted.len() + 1);
    if let Some(last) = last_train {
        a.push(last);
        p.push(last);
    }
    a.extend_from_slice(actual);
    p.extend_from_slice(predicted);

    let mut matches = 0usize;
    let mut total = 0usize;
    for i in 1..a.len() {
        let da = a[i] - a[i - 1];
        let dp = p[i] - p[i - 1];
        if !da.is_finite() || !dp.is_finite() {
            continue;
        }
        total += 1;
        if sign(da) == sign(dp) {
            matches += 1;
        }
    }

    if total == 0 {
        1.0
    } else {
        matches as f64 / total as f64
    }
}

/// Share of actuals within `[lower, upper]`.
pub fn containment(actual: &[f64], lower: &[f64], upper: &[f64]) -> f64 {
    if actual.is_empty() {
        return f64::NAN;
    }
    let inside = actual
        .iter()
        .zip(lower.iter().zip(upper))
        .filter(|(a, (l, u))| **a >= **l && **a <= **u)
        .count();
    inside as f64 / actual.len() as f64
}

fn sign(x: f64) -> i8 {
    if x > 0.0 {
        1
    } else if x < 0.0 {
        -1
    } else {
        0
    }
}
