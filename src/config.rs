//! Search configuration.

use crate::error::{ForecastError, Result};
use crate::models::ModelName;
use crate::search::{
    EnsemblePolicy, InitialTemplate, MetricWeighting, ModelsToValidate, NJobs, ValidationMethod,
};
use crate::transform::TransformerKind;
use serde::{Deserialize, Serialize};

/// Settings of an [`AutoForecast`](crate::AutoForecast) run.
///
/// Every field has a default, so a JSON document only needs the fields it
/// changes.
///
/// # Example
///
/// ```
/// use anofox_autoforecast::config::AutoForecastConfig;
///
/// let config = AutoForecastConfig::from_json(r#"{"forecast_length": 7, "model_list": ["superfast"]}"#)
///     .unwrap()
///     .with_num_validations(1);
/// assert_eq!(config.forecast_length, 7);
/// assert!(config.validate().is_ok());
/// ```
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct AutoForecastConfig {
    pub forecast_length: usize,
    /// Nominal coverage of the upper/lower forecast.
    pub prediction_interval: f64,
    /// Generations bred after the initial population.
    pub max_generations: usize,
    pub num_validations: usize,
    pub validation_method: ValidationMethod,
    pub models_to_validate: ModelsToValidate,
    /// Preset names and/or model names.
    pub model_list: Vec<String>,
    /// Preset names and/or transformer names.
    pub transformer_list: Vec<String>,
    pub transformer_max_depth: usize,
    pub initial_template: InitialTemplate,
    pub random_template_count: usize,
    pub generation_size: usize,
    /// Ensemble policies; empty disables ensembling.
    pub ensemble: Vec<String>,
    pub metric_weighting: MetricWeighting,
    pub max_per_model_class: Option<usize>,
    /// Abort evaluations that exceed `evaluation_timeout` seconds.
    pub model_interrupt: bool,
    pub evaluation_timeout: f64,
    pub no_negatives: bool,
    pub drop_most_recent: usize,
    pub n_jobs: NJobs,
    pub random_seed: u64,
    /// Index spacing in seconds; inferred from the data when absent.
    pub frequency: Option<i64>,
}

impl Default for AutoForecastConfig {
    fn default() -> Self {
        Self {
            forecast_length: 14,
            prediction_interval: 0.9,
            max_generations: 5,
            num_validations: 2,
            validation_method: ValidationMethod::Backwards,
            models_to_validate: ModelsToValidate::default(),
            model_list: vec!["fast".to_string()],
            transformer_list: vec!["fast".to_string()],
            transformer_max_depth: 4,
            initial_template: InitialTemplate::GeneralRandom,
            random_template_count: 15,
            generation_size: 20,
            ensemble: vec!["simple".to_string(), "horizontal-max".to_string()],
            metric_weighting: MetricWeighting::default(),
            max_per_model_class: None,
            model_interrupt: false,
            evaluation_timeout: 60.0,
            no_negatives: false,
            drop_most_recent: 0,
            n_jobs: NJobs::Auto,
            random_seed: 2022,
            frequency: None,
        }
    }
}

impl AutoForecastConfig {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn from_json(json: &str) -> Result<Self> {
        Ok(serde_json::from_str(json)?)
    }

    pub fn to_json(&self) -> Result<String> {
        Ok(serde_json::to_string_pretty(self)?)
    }

    pub fn with_forecast_length(mut self, forecast_length: usize) -> Self {
        self.forecast_length = forecast_length;
        self
    }

    pub fn with_prediction_interval(mut self, prediction_interval: f64) -> Self {
        self.prediction_interval = prediction_interval;
        self
    }

    pub fn with_max_generations(mut self, max_generations: usize) -> Self {
        self.max_generations = max_generations;
        self
    }

    pub fn with_num_validations(mut self, num_validations: usize) -> Self {
        self.num_validations = num_validations;
        self
    }

    pub fn with_validation_method(mut self, method: ValidationMethod) -> Self {
        self.validation_method = method;
        self
    }

    pub fn with_models_to_validate(mut self, models_to_validate: ModelsToValidate) -> Self {
        self.models_to_validate = models_to_validate;
        self
    }

    pub fn with_model_list<S: Into<String>>(mut self, models: impl IntoIterator<Item = S>) -> Self {
        self.model_list = models.into_iter().map(Into::into).collect();
        self
    }

    pub fn with_transformer_list<S: Into<String>>(
        mut self,
        transformers: impl IntoIterator<Item = S>,
    ) -> Self {
        self.transformer_list = transformers.into_iter().map(Into::into).collect();
        self
    }

    pub fn with_transformer_max_depth(mut self, depth: usize) -> Self {
        self.transformer_max_depth = depth;
        self
    }

    pub fn with_initial_template(mut self, policy: InitialTemplate) -> Self {
        self.initial_template = policy;
        self
    }

    pub fn with_generation_size(mut self, size: usize) -> Self {
        self.generation_size = size;
        self
    }

    pub fn with_random_template_count(mut self, count: usize) -> Self {
        self.random_template_count = count;
        self
    }

    pub fn with_ensemble<S: Into<String>>(mut self, policies: impl IntoIterator<Item = S>) -> Self {
        self.ensemble = policies.into_iter().map(Into::into).collect();
        self
    }

    pub fn with_metric_weighting(mut self, weighting: MetricWeighting) -> Self {
        self.metric_weighting = weighting;
        self
    }

    pub fn with_max_per_model_class(mut self, cap: Option<usize>) -> Self {
        self.max_per_model_class = cap;
        self
    }

    pub fn with_model_interrupt(mut self, enabled: bool, timeout_seconds: f64) -> Self {
        self.model_interrupt = enabled;
        self.evaluation_timeout = timeout_seconds;
        self
    }

    pub fn with_no_negatives(mut self, no_negatives: bool) -> Self {
        self.no_negatives = no_negatives;
        self
    }

    pub fn with_drop_most_recent(mut self, n: usize) -> Self {
        self.drop_most_recent = n;
        self
    }

    pub fn with_n_jobs(mut self, n_jobs: NJobs) -> Self {
        self.n_jobs = n_jobs;
        self
    }

    pub fn with_random_seed(mut self, seed: u64) -> Self {
        self.random_seed = seed;
        self
    }

    pub fn with_frequency(mut self, seconds: Option<i64>) -> Self {
        self.frequency = seconds;
        self
    }

    pub fn models(&self) -> Result<Vec<ModelName>> {
        ModelName::resolve_list(&self.model_list)
    }

    pub fn transformers(&self) -> Result<Vec<TransformerKind>> {
        TransformerKind::resolve_list(&self.transformer_list)
    }

    pub fn ensemble_policies(&self) -> Result<Vec<EnsemblePolicy>> {
        EnsemblePolicy::resolve_list(&self.ensemble)
    }

    /// Check every setting before a search starts.
    pub fn validate(&self) -> Result<()> {
        if self.forecast_length == 0 {
            return Err(ForecastError::InvalidParameter(
                "forecast_length must be positive".to_string(),
            ));
        }
        if !(self.prediction_interval > 0.0 && self.prediction_interval < 1.0) {
            return Err(ForecastError::InvalidParameter(format!(
                "prediction_interval must be in (0, 1), got {}",
                self.prediction_interval
            )));
        }
        if self.generation_size == 0 && self.max_generations > 0 {
            return Err(ForecastError::InvalidParameter(
                "generation_size must be positive".to_string(),
            ));
        }
        if self.model_interrupt && !(self.evaluation_timeout.is_finite() && self.evaluation_timeout > 0.0) {
            return Err(ForecastError::InvalidParameter(
                "evaluation_timeout must be a positive number of seconds".to_string(),
            ));
        }
        if self.frequency.is_some_and(|s| s <= 0) {
            return Err(ForecastError::InvalidParameter(
                "frequency must be a positive number of seconds".to_string(),
            ));
        }
        if self.max_per_model_class == Some(0) {
            return Err(ForecastError::InvalidParameter(
                "max_per_model_class must be positive".to_string(),
            ));
        }
        self.metric_weighting.validate()?;
        self.models()?;
        self.transformers()?;
        self.ensemble_policies()?;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn defaults_are_valid() {
        let config = AutoForecastConfig::default();
        assert!(config.validate().is_ok());
        assert_eq!(config.prediction_interval, 0.9);
        assert_eq!(config.random_seed, 2022);
    }

    #[test]
    fn partial_json_keeps_defaults() {
        let config = AutoForecastConfig::from_json(
            r#"{
                "forecast_length": 8,
                "validation_method": "seasonal 7",
                "models_to_validate": 4,
                "n_jobs": 2,
                "metric_weighting": {"smape_weighting": 1}
            }"#,
        )
        .unwrap();
        assert_eq!(config.forecast_length, 8);
        assert_eq!(config.validation_method, ValidationMethod::Seasonal(7));
        assert_eq!(config.models_to_validate, ModelsToValidate::Count(4));
        assert_eq!(config.n_jobs, NJobs::Fixed(2));
        assert_eq!(config.metric_weighting.smape_weighting, 1.0);
        assert_eq!(config.metric_weighting.mae_weighting, 2.0);
        assert_eq!(config.num_validations, 2);
    }

    #[test]
    fn json_round_trip() {
        let config = AutoForecastConfig::default()
            .with_model_list(["LastValueNaive", "ETS"])
            .with_ensemble(Vec::<String>::new())
            .with_frequency(Some(3600));
        let back = AutoForecastConfig::from_json(&config.to_json().unwrap()).unwrap();
        assert_eq!(back, config);
    }

    #[test]
    fn invalid_settings_are_rejected() {
        assert!(AutoForecastConfig::default()
            .with_forecast_length(0)
            .validate()
            .is_err());
        assert!(AutoForecastConfig::default()
            .with_prediction_interval(1.0)
            .validate()
            .is_err());
        assert!(AutoForecastConfig::default()
            .with_model_list(["Prophet"])
            .validate()
            .is_err());
        assert!(AutoForecastConfig::default()
            .with_ensemble(["dist"])
            .validate()
            .is_err());
        assert!(AutoForecastConfig::default()
            .with_model_interrupt(true, 0.0)
            .validate()
            .is_err());
    }
}
