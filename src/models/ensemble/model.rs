//! Ensemble parameters and forecast combination.
//!
//! An ensemble is itself a template whose parameters embed the member
//! templates. Horizontal ensembles assign one member to each series;
//! simple and weighted ensembles average all members on every series.

use crate::core::Forecast;
use crate::error::{ForecastError, Result};
use crate::search::Template;
use serde::{Deserialize, Serialize};
use std::collections::{BTreeMap, BTreeSet};

/// How member forecasts are combined.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum EnsembleKind {
    /// One member per series.
    Horizontal,
    /// Equal-weight mean of all members.
    Simple,
    /// Weighted mean of all members.
    Weighted,
}

/// Parameters of an `Ensemble` template.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct EnsembleParams {
    pub model_name: EnsembleKind,
    pub model_count: usize,
    /// Metric the members were chosen on.
    pub model_metric: String,
    /// Member templates keyed by template id.
    pub models: BTreeMap<String, Template>,
    /// Series name to member id, horizontal ensembles only.
    #[serde(default, skip_serializing_if = "BTreeMap::is_empty")]
    pub series: BTreeMap<String, String>,
    /// Member id to weight, weighted ensembles only.
    #[serde(default, skip_serializing_if = "BTreeMap::is_empty")]
    pub weights: BTreeMap<String, f64>,
}

impl EnsembleParams {
    fn keyed(members: Vec<Template>) -> BTreeMap<String, Template> {
        members
            .into_iter()
            .map(|t| (t.id().to_string(), t))
            .collect()
    }

    /// Horizontal ensemble from a series-to-member assignment.
    pub fn horizontal(
        members: Vec<Template>,
        series: BTreeMap<String, String>,
        model_metric: impl Into<String>,
    ) -> Self {
        let models = Self::keyed(members);
        Self {
            model_name: EnsembleKind::Horizontal,
            model_count: models.len(),
            model_metric: model_metric.into(),
            models,
            series,
            weights: BTreeMap::new(),
        }
    }

    pub fn simple(members: Vec<Template>, model_metric: impl Into<String>) -> Self {
        let models = Self::keyed(members);
        Self {
            model_name: EnsembleKind::Simple,
            model_count: models.len(),
            model_metric: model_metric.into(),
            models,
            series: BTreeMap::new(),
            weights: BTreeMap::new(),
        }
    }

    pub fn weighted(
        members: Vec<Template>,
        weights: BTreeMap<String, f64>,
        model_metric: impl Into<String>,
    ) -> Self {
        let models = Self::keyed(members);
        Self {
            model_name: EnsembleKind::Weighted,
            model_count: models.len(),
            model_metric: model_metric.into(),
            models,
            series: BTreeMap::new(),
            weights,
        }
    }

    /// Check internal consistency of the member references.
    pub fn validate(&self) -> Result<()> {
        if self.models.is_empty() {
            return Err(ForecastError::InvalidParameter(
                "ensemble has no members".to_string(),
            ));
        }
        if self.model_count != self.models.len() {
            return Err(ForecastError::DimensionMismatch {
                expected: self.models.len(),
                got: self.model_count,
            });
        }
        if self.models.values().any(|t| t.is_ensemble()) {
            return Err(ForecastError::InvalidParameter(
                "ensemble members must not be ensembles".to_string(),
            ));
        }
        if let Some((key, member)) = self.models.iter().find(|(key, t)| *key != t.id()) {
            return Err(ForecastError::InvalidParameter(format!(
                "member key {key} does not match its content id {}",
                member.id()
            )));
        }

        match self.model_name {
            EnsembleKind::Horizontal => {
                if self.series.is_empty() {
                    return Err(ForecastError::InvalidParameter(
                        "horizontal ensemble assigns no series".to_string(),
                    ));
                }
                if let Some((name, id)) =
                    self.series.iter().find(|(_, id)| !self.models.contains_key(*id))
                {
                    return Err(ForecastError::InvalidParameter(format!(
                        "series '{name}' refers to unknown member {id}"
                    )));
                }
                let assigned: BTreeSet<&String> = self.series.values().collect();
                if let Some(id) = self.models.keys().find(|id| !assigned.contains(id)) {
                    return Err(ForecastError::InvalidParameter(format!(
                        "member {id} is assigned to no series"
                    )));
                }
            }
            EnsembleKind::Weighted => {
                for id in self.models.keys() {
                    match self.weights.get(id) {
                        Some(w) if w.is_finite() && *w > 0.0 => {}
                        _ => {
                            return Err(ForecastError::InvalidParameter(format!(
                                "member {id} has no positive weight"
                            )))
                        }
                    }
                }
            }
            EnsembleKind::Simple => {}
        }
        Ok(())
    }

    /// Members in id order with their normalized weights.
    pub fn weighted_members(&self) -> Vec<(&Template, f64)> {
        let raw: Vec<(&Template, f64)> = self
            .models
            .iter()
            .map(|(id, t)| {
                let w = match self.model_name {
                    EnsembleKind::Weighted => self.weights.get(id).copied().unwrap_or(0.0),
                    _ => 1.0,
                };
                (t, w)
            })
            .collect();
        let total: f64 = raw.iter().map(|(_, w)| w).sum();
        raw.into_iter().map(|(t, w)| (t, w / total)).collect()
    }

    /// Series names grouped by assigned member, in member id order.
    pub fn series_by_member(&self) -> BTreeMap<&str, Vec<String>> {
        let mut groups: BTreeMap<&str, Vec<String>> = BTreeMap::new();
        for (series, id) in &self.series {
            groups.entry(id.as_str()).or_default().push(series.clone());
        }
        groups
    }
}

/// Weighted average of aligned forecasts, applied to point and both bounds.
///
/// Weights are normalized to sum to one.
pub fn combine_forecasts(parts: &[Forecast], weights: &[f64]) -> Result<Forecast> {
    let first = parts.first().ok_or(ForecastError::EmptyData)?;
    if weights.len() != parts.len() {
        return Err(ForecastError::DimensionMismatch {
            expected: parts.len(),
            got: weights.len(),
        });
    }
    let total: f64 = weights.iter().sum();
    if !(total.is_finite() && total > 0.0) {
        return Err(ForecastError::InvalidParameter(
            "ensemble weights must sum to a positive value".to_string(),
        ));
    }
    for part in parts {
        if part.shape() != first.shape() || part.names() != first.names() {
            return Err(ForecastError::DimensionMismatch {
                expected: first.n_series() * first.horizon(),
                got: part.n_series() * part.horizon(),
            });
        }
    }

    let combine = |select: fn(&Forecast) -> &[Vec<f64>]| -> Vec<Vec<f64>> {
        (0..first.n_series())
            .map(|s| {
                (0..first.horizon())
                    .map(|h| {
                        parts
                            .iter()
                            .zip(weights)
                            .map(|(p, w)| select(p)[s][h] * w)
                            .sum::<f64>()
                            / total
                    })
                    .collect()
            })
            .collect()
    };

    Forecast::new(
        first.timestamps().to_vec(),
        first.names().to_vec(),
        combine(Forecast::point),
        combine(Forecast::lower),
        combine(Forecast::upper),
    )
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::ModelSpec;
    use crate::transform::TransformationParameters;
    use approx::assert_relative_eq;
    use chrono::{Duration, TimeZone, Utc};

    fn member(spec: ModelSpec) -> Template {
        Template::new(spec, TransformationParameters::default())
    }

    fn flat(value: f64) -> Forecast {
        let base = Utc.with_ymd_and_hms(2024, 1, 1, 0, 0, 0).unwrap();
        Forecast::new(
            vec![base, base + Duration::days(1)],
            vec!["y".to_string()],
            vec![vec![value; 2]],
            vec![vec![value - 1.0; 2]],
            vec![vec![value + 1.0; 2]],
        )
        .unwrap()
    }

    #[test]
    fn combine_weights_all_matrices() {
        let combined = combine_forecasts(&[flat(0.0), flat(10.0)], &[3.0, 1.0]).unwrap();
        assert_relative_eq!(combined.point()[0][0], 2.5, epsilon = 1e-12);
        assert_relative_eq!(combined.upper()[0][1], 3.5, epsilon = 1e-12);
    }

    #[test]
    fn combine_rejects_bad_weights() {
        assert!(combine_forecasts(&[flat(0.0)], &[0.0]).is_err());
        assert!(combine_forecasts(&[flat(0.0)], &[1.0, 1.0]).is_err());
    }

    #[test]
    fn horizontal_validation_checks_references() {
        let a = member(ModelSpec::LastValueNaive);
        let mut series = BTreeMap::new();
        series.insert("y".to_string(), a.id().to_string());
        let params = EnsembleParams::horizontal(vec![a.clone()], series, "Score");
        assert!(params.validate().is_ok());
        assert_eq!(params.model_count, 1);

        let mut broken = params.clone();
        broken.series.insert("z".to_string(), "missing".to_string());
        assert!(broken.validate().is_err());
    }

    #[test]
    fn horizontal_validation_requires_every_member_assigned() {
        let a = member(ModelSpec::LastValueNaive);
        let b = member(ModelSpec::DriftNaive);
        let mut series = BTreeMap::new();
        series.insert("y".to_string(), a.id().to_string());
        let params = EnsembleParams::horizontal(vec![a, b], series, "Score");
        let err = params.validate().unwrap_err();
        assert!(err.to_string().contains("assigned to no series"));
    }

    #[test]
    fn member_keys_must_match_content_ids() {
        let a = member(ModelSpec::LastValueNaive);
        let mut params = EnsembleParams::simple(vec![a.clone()], "Score");
        assert!(params.validate().is_ok());

        params.models.clear();
        params.models.insert("0123456789abcdef".to_string(), a);
        let err = params.validate().unwrap_err();
        assert!(err.to_string().contains("does not match its content id"));
    }

    #[test]
    fn weighted_members_normalize() {
        let a = member(ModelSpec::LastValueNaive);
        let b = member(ModelSpec::DriftNaive);
        let mut weights = BTreeMap::new();
        weights.insert(a.id().to_string(), 1.0);
        weights.insert(b.id().to_string(), 3.0);
        let params = EnsembleParams::weighted(vec![a, b], weights, "Score");
        assert!(params.validate().is_ok());

        let total: f64 = params.weighted_members().iter().map(|(_, w)| w).sum();
        assert_relative_eq!(total, 1.0, epsilon = 1e-12);
    }

    #[test]
    fn serializes_with_kind_name() {
        let params = EnsembleParams::simple(vec![member(ModelSpec::DriftNaive)], "Score");
        let json = serde_json::to_value(&params).unwrap();
        assert_eq!(json["model_name"], "Simple");
        assert!(json.get("series").is_none());
        let back: EnsembleParams = serde_json::from_value(json).unwrap();
        assert_eq!(back, params);
    }
}
