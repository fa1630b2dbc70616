//! Ordered transformer chains attached to a template.
//!
//! A [`TransformationParameters`] value is the serializable description. It
//! is fitted per series on the training window, producing a
//! [`FittedPipeline`] that maps the model's forecast back to the original
//! scale by undoing each step in reverse order.

use super::boxcox::{boxcox_auto, BoxCoxResult};
use super::fill::FillNa;
use super::scale::{normalize, positive_shift, robust_scale, standardize, ScaleResult};
use super::trend::{clip_outliers, difference, rolling_mean, Differenced, LinearTrend};
use crate::error::{ForecastError, Result};
use crate::models::SeriesForecast;
use rand::seq::SliceRandom;
use rand::Rng;
use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;

const SEASONAL_LAGS: [usize; 5] = [2, 4, 7, 12, 24];
const ROLLING_WINDOWS: [usize; 4] = [3, 7, 10, 14];
const CLIP_THRESHOLDS: [f64; 4] = [2.0, 3.0, 3.5, 4.0];

/// One transformer and its parameters.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "transformer", content = "params")]
pub enum Transformer {
    MinMaxScaler,
    StandardScaler,
    RobustScaler,
    PositiveShift,
    BoxCox,
    DifferencedTransformer,
    SeasonalDifference { lag: usize },
    Detrend,
    RollingMean { window: usize },
    ClipOutliers { std_threshold: f64 },
}

/// Transformer identity without parameters, used for search-space lists.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub enum TransformerKind {
    MinMaxScaler,
    StandardScaler,
    RobustScaler,
    PositiveShift,
    BoxCox,
    DifferencedTransformer,
    SeasonalDifference,
    Detrend,
    RollingMean,
    ClipOutliers,
}

impl TransformerKind {
    pub const ALL: [TransformerKind; 10] = [
        TransformerKind::MinMaxScaler,
        TransformerKind::StandardScaler,
        TransformerKind::RobustScaler,
        TransformerKind::PositiveShift,
        TransformerKind::BoxCox,
        TransformerKind::DifferencedTransformer,
        TransformerKind::SeasonalDifference,
        TransformerKind::Detrend,
        TransformerKind::RollingMean,
        TransformerKind::ClipOutliers,
    ];

    pub fn name(&self) -> &'static str {
        match self {
            TransformerKind::MinMaxScaler => "MinMaxScaler",
            TransformerKind::StandardScaler => "StandardScaler",
            TransformerKind::RobustScaler => "RobustScaler",
            TransformerKind::PositiveShift => "PositiveShift",
            TransformerKind::BoxCox => "BoxCox",
            TransformerKind::DifferencedTransformer => "DifferencedTransformer",
            TransformerKind::SeasonalDifference => "SeasonalDifference",
            TransformerKind::Detrend => "Detrend",
            TransformerKind::RollingMean => "RollingMean",
            TransformerKind::ClipOutliers => "ClipOutliers",
        }
    }

    /// Resolve a preset name (`superfast`, `fast`, `all`) to its transformers.
    pub fn preset(name: &str) -> Option<Vec<TransformerKind>> {
        use TransformerKind::*;
        let superfast = vec![MinMaxScaler, StandardScaler, ClipOutliers, PositiveShift];
        match name {
            "superfast" => Some(superfast),
            "fast" => {
                let mut list = superfast;
                list.extend([RobustScaler, DifferencedTransformer, Detrend, RollingMean]);
                Some(list)
            }
            "all" => Some(TransformerKind::ALL.to_vec()),
            _ => None,
        }
    }

    /// Resolve a list entry that is either a preset or a transformer name.
    pub fn resolve_list(entries: &[String]) -> Result<Vec<TransformerKind>> {
        let mut out: Vec<TransformerKind> = Vec::new();
        for entry in entries {
            let kinds = match TransformerKind::preset(entry) {
                Some(kinds) => kinds,
                None => vec![entry.parse()?],
            };
            for kind in kinds {
                if !out.contains(&kind) {
                    out.push(kind);
                }
            }
        }
        Ok(out)
    }
}

impl fmt::Display for TransformerKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}

impl FromStr for TransformerKind {
    type Err = ForecastError;

    fn from_str(s: &str) -> Result<Self> {
        TransformerKind::ALL
            .iter()
            .copied()
            .find(|k| k.name() == s)
            .ok_or_else(|| ForecastError::InvalidParameter(format!("unknown transformer '{s}'")))
    }
}

impl Transformer {
    pub fn kind(&self) -> TransformerKind {
        match self {
            Transformer::MinMaxScaler => TransformerKind::MinMaxScaler,
            Transformer::StandardScaler => TransformerKind::StandardScaler,
            Transformer::RobustScaler => TransformerKind::RobustScaler,
            Transformer::PositiveShift => TransformerKind::PositiveShift,
            Transformer::BoxCox => TransformerKind::BoxCox,
            Transformer::DifferencedTransformer => TransformerKind::DifferencedTransformer,
            Transformer::SeasonalDifference { .. } => TransformerKind::SeasonalDifference,
            Transformer::Detrend => TransformerKind::Detrend,
            Transformer::RollingMean { .. } => TransformerKind::RollingMean,
            Transformer::ClipOutliers { .. } => TransformerKind::ClipOutliers,
        }
    }

    /// Draw parameters for `kind` from its domain.
    pub fn random<R: Rng + ?Sized>(kind: TransformerKind, rng: &mut R) -> Transformer {
        match kind {
            TransformerKind::MinMaxScaler => Transformer::MinMaxScaler,
            TransformerKind::StandardScaler => Transformer::StandardScaler,
            TransformerKind::RobustScaler => Transformer::RobustScaler,
            TransformerKind::PositiveShift => Transformer::PositiveShift,
            TransformerKind::BoxCox => Transformer::BoxCox,
            TransformerKind::DifferencedTransformer => Transformer::DifferencedTransformer,
            TransformerKind::SeasonalDifference => Transformer::SeasonalDifference {
                lag: *SEASONAL_LAGS.choose(rng).unwrap_or(&7),
            },
            TransformerKind::Detrend => Transformer::Detrend,
            TransformerKind::RollingMean => Transformer::RollingMean {
                window: *ROLLING_WINDOWS.choose(rng).unwrap_or(&7),
            },
            TransformerKind::ClipOutliers => Transformer::ClipOutliers {
                std_threshold: *CLIP_THRESHOLDS.choose(rng).unwrap_or(&3.0),
            },
        }
    }

    /// The transformer of `kind` if it takes no parameters.
    pub fn parameterless(kind: TransformerKind) -> Option<Transformer> {
        match kind {
            TransformerKind::MinMaxScaler => Some(Transformer::MinMaxScaler),
            TransformerKind::StandardScaler => Some(Transformer::StandardScaler),
            TransformerKind::RobustScaler => Some(Transformer::RobustScaler),
            TransformerKind::PositiveShift => Some(Transformer::PositiveShift),
            TransformerKind::BoxCox => Some(Transformer::BoxCox),
            TransformerKind::DifferencedTransformer => Some(Transformer::DifferencedTransformer),
            TransformerKind::Detrend => Some(Transformer::Detrend),
            TransformerKind::SeasonalDifference
            | TransformerKind::RollingMean
            | TransformerKind::ClipOutliers => None,
        }
    }

    /// Resample the parameters of a parameterised transformer, keeping its kind.
    pub fn perturb<R: Rng + ?Sized>(&self, rng: &mut R) -> Transformer {
        Transformer::random(self.kind(), rng)
    }

    pub fn has_params(&self) -> bool {
        matches!(
            self,
            Transformer::SeasonalDifference { .. }
                | Transformer::RollingMean { .. }
                | Transformer::ClipOutliers { .. }
        )
    }

    fn fit(&self, series: &[f64]) -> Result<(Vec<f64>, FittedTransformer)> {
        let fitted = match self {
            Transformer::MinMaxScaler => FittedTransformer::Scale(normalize(series)),
            Transformer::StandardScaler => FittedTransformer::Scale(standardize(series)),
            Transformer::RobustScaler => FittedTransformer::Scale(robust_scale(series)),
            Transformer::PositiveShift => FittedTransformer::Shift(positive_shift(series)),
            Transformer::BoxCox => FittedTransformer::BoxCox(boxcox_auto(series)),
            Transformer::DifferencedTransformer => {
                FittedTransformer::Difference(difference(series, 1)?)
            }
            Transformer::SeasonalDifference { lag } => {
                FittedTransformer::Difference(difference(series, *lag)?)
            }
            Transformer::Detrend => FittedTransformer::Detrend {
                trend: LinearTrend::fit(series)?,
                n: series.len(),
            },
            Transformer::RollingMean { window } => {
                if *window == 0 {
                    return Err(ForecastError::InvalidParameter(
                        "rolling window must be positive".to_string(),
                    ));
                }
                return Ok((rolling_mean(series, *window), FittedTransformer::Identity));
            }
            Transformer::ClipOutliers { std_threshold } => {
                if !(std_threshold.is_finite() && *std_threshold > 0.0) {
                    return Err(ForecastError::InvalidParameter(
                        "std_threshold must be positive".to_string(),
                    ));
                }
                return Ok((
                    clip_outliers(series, *std_threshold),
                    FittedTransformer::Identity,
                ));
            }
        };

        let data = match &fitted {
            FittedTransformer::Scale(result) => result.data.clone(),
            FittedTransformer::Shift(shift) => series.iter().map(|x| x + shift).collect(),
            FittedTransformer::BoxCox(result) => result.data.clone(),
            FittedTransformer::Difference(diff) => diff.data.clone(),
            FittedTransformer::Detrend { trend, .. } => series
                .iter()
                .enumerate()
                .map(|(t, x)| x - trend.at(t))
                .collect(),
            FittedTransformer::Identity => series.to_vec(),
        };
        Ok((data, fitted))
    }
}

/// Fill strategy plus ordered transformers for one template.
#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
pub struct TransformationParameters {
    #[serde(default)]
    pub fillna: FillNa,
    #[serde(default)]
    pub transformations: Vec<Transformer>,
}

impl TransformationParameters {
    pub fn new(fillna: FillNa, transformations: Vec<Transformer>) -> Self {
        Self {
            fillna,
            transformations,
        }
    }

    /// Random chain of up to `max_depth` transformers drawn from `kinds`.
    pub fn random<R: Rng + ?Sized>(
        kinds: &[TransformerKind],
        max_depth: usize,
        rng: &mut R,
    ) -> Self {
        let depth = if kinds.is_empty() {
            0
        } else {
            rng.gen_range(0..=max_depth)
        };
        let transformations = (0..depth)
            .filter_map(|_| kinds.choose(rng).map(|&k| Transformer::random(k, rng)))
            .collect();
        Self {
            fillna: FillNa::random(rng),
            transformations,
        }
    }

    /// Apply one structural or parametric edit.
    ///
    /// Operators: insert, remove, replace, perturb a parameter, resample the
    /// fill strategy. Depth stays within `max_depth`.
    pub fn mutate<R: Rng + ?Sized>(
        &self,
        kinds: &[TransformerKind],
        max_depth: usize,
        rng: &mut R,
    ) -> Self {
        let mut next = self.clone();
        let len = next.transformations.len();
        let op = rng.gen_range(0..5);
        match op {
            0 if len < max_depth && !kinds.is_empty() => {
                let kind = kinds[rng.gen_range(0..kinds.len())];
                let at = rng.gen_range(0..=len);
                next.transformations.insert(at, Transformer::random(kind, rng));
            }
            1 if len > 0 => {
                next.transformations.remove(rng.gen_range(0..len));
            }
            2 if len > 0 && !kinds.is_empty() => {
                let kind = kinds[rng.gen_range(0..kinds.len())];
                let at = rng.gen_range(0..len);
                next.transformations[at] = Transformer::random(kind, rng);
            }
            3 if next.transformations.iter().any(|t| t.has_params()) => {
                let candidates: Vec<usize> = (0..len)
                    .filter(|&i| next.transformations[i].has_params())
                    .collect();
                if let Some(&at) = candidates.choose(rng) {
                    let replacement = next.transformations[at].perturb(rng);
                    next.transformations[at] = replacement;
                }
            }
            _ => next.fillna = FillNa::random(rng),
        }
        next
    }

    /// Fill and transform one training series.
    pub fn fit_transform(&self, series: &[f64]) -> Result<(Vec<f64>, FittedPipeline)> {
        let mut data = self.fillna.fill(series)?;
        let mut steps = Vec::with_capacity(self.transformations.len());
        for transformer in &self.transformations {
            let (next, fitted) = transformer.fit(&data)?;
            if next.is_empty() {
                return Err(ForecastError::InsufficientData { needed: 1, got: 0 });
            }
            if next.iter().any(|v| !v.is_finite()) {
                return Err(ForecastError::ComputationError(format!(
                    "{} produced non-finite values",
                    transformer.kind()
                )));
            }
            data = next;
            steps.push(fitted);
        }
        Ok((data, FittedPipeline { steps }))
    }
}

#[derive(Debug, Clone, PartialEq)]
enum FittedTransformer {
    Scale(ScaleResult),
    Shift(f64),
    BoxCox(BoxCoxResult),
    Difference(Differenced),
    Detrend { trend: LinearTrend, n: usize },
    /// Smoothing and clipping only shape the training data.
    Identity,
}

impl FittedTransformer {
    fn inverse(&self, fc: SeriesForecast) -> SeriesForecast {
        match self {
            FittedTransformer::Scale(result) => fc.map(|_, v| result.invert(v)),
            FittedTransformer::Shift(shift) => fc.map(|_, v| v - shift),
            FittedTransformer::BoxCox(result) => fc.map(|_, v| result.invert(v)),
            FittedTransformer::Detrend { trend, n } => fc.map(|h, v| v + trend.at(n + h)),
            FittedTransformer::Difference(diff) => {
                let lag = diff.tail.len();
                let point = diff.integrate(&fc.point);
                // Interval half-widths accumulate with each completed season
                let widen = |h: usize| ((h / lag + 1) as f64).sqrt();
                let lower = (0..point.len())
                    .map(|h| point[h] - (fc.point[h] - fc.lower[h]) * widen(h))
                    .collect();
                let upper = (0..point.len())
                    .map(|h| point[h] + (fc.upper[h] - fc.point[h]) * widen(h))
                    .collect();
                SeriesForecast::new(point, lower, upper)
            }
            FittedTransformer::Identity => fc,
        }
    }
}

/// Per-series fitted state of a [`TransformationParameters`] chain.
#[derive(Debug, Clone, PartialEq)]
pub struct FittedPipeline {
    steps: Vec<FittedTransformer>,
}

impl FittedPipeline {
    /// Undo every step in reverse order and restore `lower <= point <= upper`.
    pub fn inverse(&self, fc: SeriesForecast) -> SeriesForecast {
        self.steps
            .iter()
            .rev()
            .fold(fc, |acc, step| step.inverse(acc))
            .ordered()
    }
}
