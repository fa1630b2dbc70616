//! Catalogue of searchable models and their parameter spaces.
//!
//! [`ModelSpec`] pairs a model name with typed parameters. It is the only
//! place that knows how to sample, mutate, serialize and instantiate each
//! model, so adding a model means adding one variant here.

use super::baseline::{
    AverageMethod, AverageValueNaive, AverageValueNaiveParams, ConstantNaive, ConstantNaiveParams,
    DriftNaive, LastValueNaive, SeasonalMethod, SeasonalNaive, SeasonalNaiveParams,
};
use super::ensemble::EnsembleParams;
use super::exponential::{EtsParams, ExponentialSmoothing};
use super::BoxedForecaster;
use crate::error::{ForecastError, Result};
use rand::seq::SliceRandom;
use rand::Rng;
use serde_json::{json, Value};
use std::fmt;
use std::str::FromStr;

const CONSTANTS: [f64; 3] = [0.0, 1.0, -1.0];
const AVERAGE_WINDOWS: [usize; 6] = [3, 7, 10, 14, 28, 60];
const SEASONAL_LAGS: [usize; 9] = [2, 3, 4, 7, 12, 24, 28, 52, 364];

/// Model identity without parameters.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub enum ModelName {
    ConstantNaive,
    LastValueNaive,
    AverageValueNaive,
    SeasonalNaive,
    DriftNaive,
    Ets,
    Ensemble,
}

impl ModelName {
    /// Every model the search may generate directly.
    pub const SEARCHABLE: [ModelName; 6] = [
        ModelName::ConstantNaive,
        ModelName::LastValueNaive,
        ModelName::AverageValueNaive,
        ModelName::SeasonalNaive,
        ModelName::DriftNaive,
        ModelName::Ets,
    ];

    pub fn as_str(&self) -> &'static str {
        match self {
            ModelName::ConstantNaive => "ConstantNaive",
            ModelName::LastValueNaive => "LastValueNaive",
            ModelName::AverageValueNaive => "AverageValueNaive",
            ModelName::SeasonalNaive => "SeasonalNaive",
            ModelName::DriftNaive => "DriftNaive",
            ModelName::Ets => "ETS",
            ModelName::Ensemble => "Ensemble",
        }
    }

    /// Resolve a preset name (`superfast`, `fast`, `default`, `all`).
    pub fn preset(name: &str) -> Option<Vec<ModelName>> {
        use ModelName::*;
        match name {
            "superfast" => Some(vec![
                ConstantNaive,
                LastValueNaive,
                AverageValueNaive,
                SeasonalNaive,
            ]),
            "fast" | "default" | "all" => Some(ModelName::SEARCHABLE.to_vec()),
            _ => None,
        }
    }

    /// Resolve entries that are either preset names or model names.
    pub fn resolve_list(entries: &[String]) -> Result<Vec<ModelName>> {
        let mut out: Vec<ModelName> = Vec::new();
        for entry in entries {
            let names = match ModelName::preset(entry) {
                Some(names) => names,
                None => {
                    let name: ModelName = entry.parse()?;
                    if name == ModelName::Ensemble {
                        return Err(ForecastError::InvalidParameter(
                            "Ensemble is built by the search, not listed".to_string(),
                        ));
                    }
                    vec![name]
                }
            };
            for name in names {
                if !out.contains(&name) {
                    out.push(name);
                }
            }
        }
        if out.is_empty() {
            return Err(ForecastError::InvalidParameter(
                "model_list is empty".to_string(),
            ));
        }
        Ok(out)
    }
}

impl fmt::Display for ModelName {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for ModelName {
    type Err = ForecastError;

    fn from_str(s: &str) -> Result<Self> {
        ModelName::SEARCHABLE
            .iter()
            .chain(std::iter::once(&ModelName::Ensemble))
            .copied()
            .find(|m| m.as_str() == s)
            .ok_or_else(|| ForecastError::InvalidParameter(format!("unknown model '{s}'")))
    }
}

/// A model with concrete parameters.
#[derive(Debug, Clone, PartialEq)]
pub enum ModelSpec {
    ConstantNaive(ConstantNaiveParams),
    LastValueNaive,
    AverageValueNaive(AverageValueNaiveParams),
    SeasonalNaive(SeasonalNaiveParams),
    DriftNaive,
    Ets(EtsParams),
    Ensemble(Box<EnsembleParams>),
}

impl ModelSpec {
    pub fn name(&self) -> ModelName {
        match self {
            ModelSpec::ConstantNaive(_) => ModelName::ConstantNaive,
            ModelSpec::LastValueNaive => ModelName::LastValueNaive,
            ModelSpec::AverageValueNaive(_) => ModelName::AverageValueNaive,
            ModelSpec::SeasonalNaive(_) => ModelName::SeasonalNaive,
            ModelSpec::DriftNaive => ModelName::DriftNaive,
            ModelSpec::Ets(_) => ModelName::Ets,
            ModelSpec::Ensemble(_) => ModelName::Ensemble,
        }
    }

    pub fn is_ensemble(&self) -> bool {
        matches!(self, ModelSpec::Ensemble(_))
    }

    /// Default parameters of a searchable model.
    pub fn default_for(name: ModelName) -> Result<ModelSpec> {
        Ok(match name {
            ModelName::ConstantNaive => ModelSpec::ConstantNaive(ConstantNaiveParams::default()),
            ModelName::LastValueNaive => ModelSpec::LastValueNaive,
            ModelName::AverageValueNaive => {
                ModelSpec::AverageValueNaive(AverageValueNaiveParams::default())
            }
            ModelName::SeasonalNaive => ModelSpec::SeasonalNaive(SeasonalNaiveParams::default()),
            ModelName::DriftNaive => ModelSpec::DriftNaive,
            ModelName::Ets => ModelSpec::Ets(EtsParams::default()),
            ModelName::Ensemble => {
                return Err(ForecastError::InvalidParameter(
                    "ensembles have no default parameters".to_string(),
                ))
            }
        })
    }

    /// Draw parameters uniformly from the model's domain.
    pub fn random<R: Rng + ?Sized>(name: ModelName, rng: &mut R) -> Result<ModelSpec> {
        Ok(match name {
            ModelName::ConstantNaive => ModelSpec::ConstantNaive(ConstantNaiveParams {
                constant: *CONSTANTS.choose(rng).unwrap_or(&0.0),
            }),
            ModelName::AverageValueNaive => ModelSpec::AverageValueNaive(AverageValueNaiveParams {
                method: *AverageMethod::ALL.choose(rng).unwrap_or(&AverageMethod::Mean),
                window: random_window(rng),
            }),
            ModelName::SeasonalNaive => ModelSpec::SeasonalNaive(SeasonalNaiveParams {
                lag_1: *SEASONAL_LAGS.choose(rng).unwrap_or(&7),
                lag_2: if rng.gen_bool(0.3) {
                    SEASONAL_LAGS.choose(rng).copied()
                } else {
                    None
                },
                method: *SeasonalMethod::ALL
                    .choose(rng)
                    .unwrap_or(&SeasonalMethod::LastValue),
            }),
            ModelName::Ets => {
                let beta = rng.gen_bool(0.5).then(|| round_to(rng.gen_range(0.01..0.5), 3));
                let damping = match beta {
                    Some(_) if rng.gen_bool(0.3) => Some(round_to(rng.gen_range(0.8..0.98), 3)),
                    _ => None,
                };
                ModelSpec::Ets(EtsParams {
                    alpha: round_to(rng.gen_range(0.05..0.95), 3),
                    beta,
                    damping,
                })
            }
            other => ModelSpec::default_for(other)?,
        })
    }

    /// Perturb one parameter, keeping the model.
    ///
    /// Numeric parameters move by a bounded step; categorical ones are
    /// resampled. Parameterless models are returned unchanged.
    pub fn mutate<R: Rng + ?Sized>(&self, rng: &mut R) -> ModelSpec {
        match self {
            ModelSpec::ConstantNaive(_) => ModelSpec::random(ModelName::ConstantNaive, rng)
                .unwrap_or_else(|_| self.clone()),
            ModelSpec::AverageValueNaive(p) => {
                let mut p = *p;
                if rng.gen_bool(0.5) {
                    p.method = *AverageMethod::ALL.choose(rng).unwrap_or(&p.method);
                } else {
                    p.window = random_window(rng);
                }
                ModelSpec::AverageValueNaive(p)
            }
            ModelSpec::SeasonalNaive(p) => {
                let mut p = *p;
                match rng.gen_range(0..3) {
                    0 => p.lag_1 = *SEASONAL_LAGS.choose(rng).unwrap_or(&p.lag_1),
                    1 => {
                        p.lag_2 = match p.lag_2 {
                            Some(_) => None,
                            None => SEASONAL_LAGS.choose(rng).copied(),
                        }
                    }
                    _ => p.method = *SeasonalMethod::ALL.choose(rng).unwrap_or(&p.method),
                }
                ModelSpec::SeasonalNaive(p)
            }
            ModelSpec::Ets(p) => {
                let mut p = *p;
                let step = |v: f64, lo: f64, hi: f64, rng: &mut R| {
                    round_to((v + rng.gen_range(-0.1..0.1)).clamp(lo, hi), 3)
                };
                match rng.gen_range(0..3) {
                    0 => p.alpha = step(p.alpha, 0.01, 1.0, rng),
                    1 => {
                        p.beta = match p.beta {
                            Some(b) if rng.gen_bool(0.7) => Some(step(b, 0.01, 1.0, rng)),
                            Some(_) => {
                                p.damping = None;
                                None
                            }
                            None => Some(round_to(rng.gen_range(0.01..0.5), 3)),
                        }
                    }
                    _ => {
                        if p.beta.is_some() {
                            p.damping = match p.damping {
                                Some(d) => Some(step(d, 0.5, 1.0, rng)),
                                None => Some(round_to(rng.gen_range(0.8..0.98), 3)),
                            }
                        } else {
                            p.alpha = step(p.alpha, 0.01, 1.0, rng);
                        }
                    }
                }
                ModelSpec::Ets(p)
            }
            ModelSpec::LastValueNaive | ModelSpec::DriftNaive | ModelSpec::Ensemble(_) => {
                self.clone()
            }
        }
    }

    /// Parameters as a JSON object.
    pub fn parameters(&self) -> Result<Value> {
        Ok(match self {
            ModelSpec::ConstantNaive(p) => serde_json::to_value(p)?,
            ModelSpec::AverageValueNaive(p) => serde_json::to_value(p)?,
            ModelSpec::SeasonalNaive(p) => serde_json::to_value(p)?,
            ModelSpec::Ets(p) => serde_json::to_value(p)?,
            ModelSpec::Ensemble(p) => serde_json::to_value(p.as_ref())?,
            ModelSpec::LastValueNaive | ModelSpec::DriftNaive => json!({}),
        })
    }

    /// Rebuild a spec from its name and JSON parameters.
    ///
    /// A null or missing parameter object means the model's defaults.
    pub fn from_parts(name: &str, params: &Value) -> Result<ModelSpec> {
        let name: ModelName = name.parse()?;
        if params.is_null() && name != ModelName::Ensemble {
            return ModelSpec::default_for(name);
        }
        let params = params.clone();
        Ok(match name {
            ModelName::ConstantNaive => ModelSpec::ConstantNaive(serde_json::from_value(params)?),
            ModelName::LastValueNaive => ModelSpec::LastValueNaive,
            ModelName::AverageValueNaive => {
                ModelSpec::AverageValueNaive(serde_json::from_value(params)?)
            }
            ModelName::SeasonalNaive => ModelSpec::SeasonalNaive(serde_json::from_value(params)?),
            ModelName::DriftNaive => ModelSpec::DriftNaive,
            ModelName::Ets => ModelSpec::Ets(serde_json::from_value(params)?),
            ModelName::Ensemble => ModelSpec::Ensemble(Box::new(serde_json::from_value(params)?)),
        })
    }

    /// Instantiate an unfitted forecaster. Ensembles are run by the search runner.
    pub fn build(&self) -> Result<BoxedForecaster> {
        Ok(match self {
            ModelSpec::ConstantNaive(p) => Box::new(ConstantNaive::new(*p)),
            ModelSpec::LastValueNaive => Box::new(LastValueNaive::new()),
            ModelSpec::AverageValueNaive(p) => Box::new(AverageValueNaive::new(*p)),
            ModelSpec::SeasonalNaive(p) => Box::new(SeasonalNaive::new(*p)),
            ModelSpec::DriftNaive => Box::new(DriftNaive::new()),
            ModelSpec::Ets(p) => {
                p.validate()?;
                Box::new(ExponentialSmoothing::new(*p))
            }
            ModelSpec::Ensemble(_) => {
                return Err(ForecastError::InvalidParameter(
                    "ensemble specs have no single forecaster".to_string(),
                ))
            }
        })
    }
}

fn random_window<R: Rng + ?Sized>(rng: &mut R) -> Option<usize> {
    if rng.gen_bool(0.4) {
        None
    } else {
        AVERAGE_WINDOWS.choose(rng).copied()
    }
}

fn round_to(value: f64, decimals: i32) -> f64 {
    let factor = 10f64.powi(decimals);
    (value * factor).round() / factor
}

#[cfg(test)]
mod tests {
    use super::*;
    use rand::rngs::StdRng;
    use rand::SeedableRng;

    #[test]
    fn presets_resolve() {
        let superfast = ModelName::preset("superfast").unwrap();
        assert_eq!(superfast.len(), 4);
        assert!(!superfast.contains(&ModelName::Ets));
        assert_eq!(ModelName::preset("fast").unwrap().len(), 6);
        assert!(ModelName::preset("bogus").is_none());
    }

    #[test]
    fn resolve_list_rejects_unknown_and_ensemble() {
        assert!(ModelName::resolve_list(&["Prophet".to_string()]).is_err());
        assert!(ModelName::resolve_list(&["Ensemble".to_string()]).is_err());
        assert!(ModelName::resolve_list(&[]).is_err());

        let names =
            ModelName::resolve_list(&["ETS".to_string(), "superfast".to_string()]).unwrap();
        assert_eq!(names[0], ModelName::Ets);
        assert_eq!(names.len(), 5);
    }

    #[test]
    fn every_searchable_model_builds_and_forecasts() {
        let series: Vec<f64> = (0..30).map(|i| 10.0 + (i % 7) as f64).collect();
        let mut rng = StdRng::seed_from_u64(3);
        for name in ModelName::SEARCHABLE {
            for _ in 0..10 {
                let spec = ModelSpec::random(name, &mut rng).unwrap();
                assert_eq!(spec.name(), name);
                let mut model = spec.build().unwrap();
                // Long seasonal lags need more history than this
                if model.fit(&series).is_ok() {
                    let fc = model.predict_with_intervals(4, 0.9).unwrap();
                    assert_eq!(fc.horizon(), 4);
                    assert!(fc.is_finite());
                }
            }
        }
    }

    #[test]
    fn parameters_round_trip_through_json() {
        let mut rng = StdRng::seed_from_u64(5);
        for name in ModelName::SEARCHABLE {
            let spec = ModelSpec::random(name, &mut rng).unwrap();
            let params = spec.parameters().unwrap();
            let back = ModelSpec::from_parts(name.as_str(), &params).unwrap();
            assert_eq!(back, spec);
        }
    }

    #[test]
    fn null_parameters_mean_defaults() {
        let spec = ModelSpec::from_parts("SeasonalNaive", &Value::Null).unwrap();
        assert_eq!(spec, ModelSpec::SeasonalNaive(SeasonalNaiveParams::default()));
        assert!(ModelSpec::from_parts("Nope", &Value::Null).is_err());
    }

    #[test]
    fn mutation_keeps_model_and_domain() {
        let mut rng = StdRng::seed_from_u64(9);
        let mut spec = ModelSpec::Ets(EtsParams::default());
        for _ in 0..100 {
            spec = spec.mutate(&mut rng);
            match &spec {
                ModelSpec::Ets(p) => {
                    assert!(p.validate().is_ok());
                    assert!(p.damping.is_none() || p.beta.is_some());
                }
                other => panic!("model changed to {:?}", other.name()),
            }
        }
    }
}
