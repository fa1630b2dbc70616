//! Templates: a model with parameters plus a transformation chain.
//!
//! A template's id is derived from its canonical JSON, so two templates with
//! identical content always share an id and deduplicate naturally.

use crate::error::{ForecastError, Result};
use crate::models::{ModelName, ModelSpec};
use crate::transform::TransformationParameters;
use serde::ser::Error as _;
use serde::{Deserialize, Serialize, Serializer};
use serde_json::Value;
use sha2::{Digest, Sha256};
use std::fmt;
use tracing::warn;

/// Length of the hex id kept from the SHA-256 digest.
const ID_LEN: usize = 32;

/// A fully specified candidate: model, parameters and transformations.
#[derive(Debug, Clone, PartialEq, Deserialize)]
#[serde(try_from = "TemplateRecord")]
pub struct Template {
    id: String,
    model: ModelSpec,
    transformation: TransformationParameters,
}

/// Wire form of a template.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TemplateRecord {
    model_name: String,
    #[serde(default)]
    model_parameters: Value,
    #[serde(default)]
    transformation_parameters: TransformationParameters,
}

impl Template {
    pub fn new(model: ModelSpec, transformation: TransformationParameters) -> Self {
        let mut template = Self {
            id: String::new(),
            model,
            transformation,
        };
        template.id = template.content_hash();
        template
    }

    /// Stable content hash, identical for identical templates.
    pub fn id(&self) -> &str {
        &self.id
    }

    pub fn model(&self) -> &ModelSpec {
        &self.model
    }

    pub fn model_name(&self) -> ModelName {
        self.model.name()
    }

    pub fn transformation(&self) -> &TransformationParameters {
        &self.transformation
    }

    pub fn is_ensemble(&self) -> bool {
        self.model.is_ensemble()
    }

    /// Model parameters as compact JSON text.
    pub fn model_parameters_json(&self) -> String {
        self.model
            .parameters()
            .map(|params| params.to_string())
            .unwrap_or_default()
    }

    /// Transformation chain as compact JSON text.
    pub fn transformation_parameters_json(&self) -> String {
        serde_json::to_string(&self.transformation).unwrap_or_default()
    }

    pub fn to_json(&self) -> Result<String> {
        Ok(serde_json::to_string(self)?)
    }

    pub fn from_json(json: &str) -> Result<Self> {
        Ok(serde_json::from_str(json)?)
    }

    fn record(&self) -> Result<TemplateRecord> {
        Ok(TemplateRecord {
            model_name: self.model.name().as_str().to_string(),
            model_parameters: self.model.parameters()?,
            transformation_parameters: self.transformation.clone(),
        })
    }

    /// Canonical JSON bytes the id is derived from.
    fn canonical_bytes(&self) -> Result<Vec<u8>> {
        Ok(serde_json::to_vec(&self.record()?)?)
    }

    /// Hash of the canonical JSON. Parameters are plain data, so encoding
    /// only fails on a broken model; such a template is keyed by its debug
    /// form instead, which stays unique per content.
    fn content_hash(&self) -> String {
        match self.canonical_bytes() {
            Ok(bytes) => hash_id(&bytes),
            Err(err) => {
                warn!(model = %self.model.name(), error = %err, "template has no canonical encoding");
                hash_id(format!("{:?}|{:?}", self.model, self.transformation).as_bytes())
            }
        }
    }
}

fn hash_id(bytes: &[u8]) -> String {
    let digest = Sha256::digest(bytes);
    let mut hex: String = digest.iter().map(|b| format!("{b:02x}")).collect();
    hex.truncate(ID_LEN);
    hex
}

impl fmt::Display for Template {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}[{}]", self.model.name(), &self.id[..8.min(self.id.len())])
    }
}

impl Serialize for Template {
    fn serialize<S: Serializer>(&self, serializer: S) -> std::result::Result<S::Ok, S::Error> {
        self.record()
            .map_err(S::Error::custom)?
            .serialize(serializer)
    }
}

impl TryFrom<TemplateRecord> for Template {
    type Error = ForecastError;

    fn try_from(record: TemplateRecord) -> Result<Self> {
        let model = ModelSpec::from_parts(&record.model_name, &record.model_parameters)?;
        if let ModelSpec::Ensemble(params) = &model {
            params
                .validate()
                .map_err(|e| ForecastError::Serialization(format!("invalid ensemble: {e}")))?;
        }
        Ok(Template::new(model, record.transformation_parameters))
    }
}

/// Serialize a list of templates as a JSON array.
pub fn templates_to_json(templates: &[Template]) -> Result<String> {
    Ok(serde_json::to_string_pretty(templates)?)
}

/// Parse a JSON array of templates, or a single template object.
pub fn templates_from_json(json: &str) -> Result<Vec<Template>> {
    let value: Value = serde_json::from_str(json)?;
    match value {
        Value::Array(_) => Ok(serde_json::from_value(value)?),
        Value::Object(_) => Ok(vec![serde_json::from_value(value)?]),
        _ => Err(ForecastError::Serialization(
            "expected a template object or an array of templates".to_string(),
        )),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::baseline::SeasonalNaiveParams;
    use crate::models::exponential::EtsParams;
    use crate::transform::{FillNa, Transformer};

    fn seasonal() -> Template {
        Template::new(
            ModelSpec::SeasonalNaive(SeasonalNaiveParams::default()),
            TransformationParameters::new(FillNa::Ffill, vec![Transformer::Detrend]),
        )
    }

    #[test]
    fn id_is_content_addressed() {
        assert_eq!(seasonal().id(), seasonal().id());
        assert_eq!(seasonal().id().len(), ID_LEN);

        let other = Template::new(
            ModelSpec::SeasonalNaive(SeasonalNaiveParams::default()),
            TransformationParameters::default(),
        );
        assert_ne!(seasonal().id(), other.id());
    }

    #[test]
    fn json_round_trip_preserves_identity() {
        let template = Template::new(
            ModelSpec::Ets(EtsParams {
                alpha: 0.123,
                beta: Some(0.05),
                damping: Some(0.9),
            }),
            TransformationParameters::new(
                FillNa::Median,
                vec![Transformer::ClipOutliers { std_threshold: 3.5 }],
            ),
        );
        let json = template.to_json().unwrap();
        let back = Template::from_json(&json).unwrap();
        assert_eq!(back, template);
        assert_eq!(back.id(), template.id());
    }

    #[test]
    fn id_hashes_the_canonical_encoding() {
        let template = seasonal();
        let bytes = template.canonical_bytes().unwrap();
        assert!(!bytes.is_empty());
        assert_eq!(template.id(), hash_id(&bytes));
        assert_ne!(template.id(), hash_id(&[]));

        let value: Value = serde_json::from_slice(&bytes).unwrap();
        assert_eq!(value, serde_json::to_value(&template).unwrap());
    }

    #[test]
    fn debug_keyed_ids_stay_distinct() {
        let a = seasonal();
        let b = Template::new(ModelSpec::Ets(EtsParams::default()), TransformationParameters::default());
        let key = |t: &Template| hash_id(format!("{:?}|{:?}", t.model, t.transformation).as_bytes());
        assert_ne!(key(&a), key(&b));
        assert_eq!(key(&a), key(&seasonal()));
    }

    #[test]
    fn wire_format_has_three_keys() {
        let value: Value = serde_json::from_str(&seasonal().to_json().unwrap()).unwrap();
        assert_eq!(value["model_name"], "SeasonalNaive");
        assert_eq!(value["model_parameters"]["lag_1"], 7);
        assert_eq!(
            value["transformation_parameters"]["transformations"][0]["transformer"],
            "Detrend"
        );
    }

    #[test]
    fn unknown_model_fails_to_load() {
        let json = r#"{"model_name": "FBProphet", "model_parameters": {}}"#;
        assert!(matches!(
            Template::from_json(json),
            Err(ForecastError::Serialization(_))
        ));
    }

    #[test]
    fn list_helpers_accept_object_or_array() {
        let json = templates_to_json(&[seasonal()]).unwrap();
        assert_eq!(templates_from_json(&json).unwrap(), vec![seasonal()]);

        let single = seasonal().to_json().unwrap();
        assert_eq!(templates_from_json(&single).unwrap().len(), 1);
        assert!(templates_from_json("3").is_err());
    }
}
