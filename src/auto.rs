//! Automatic model search and forecasting.
//!
//! [`AutoForecast`] runs the whole pipeline: split the history, breed and
//! score templates on the most recent holdout, cross-validate the best,
//! build ensembles, and keep the overall winner for forecasting.
//!
//! # Example
//!
//! ```
//! use anofox_autoforecast::prelude::*;
//! use chrono::{Duration, TimeZone, Utc};
//!
//! let base = Utc.with_ymd_and_hms(2024, 1, 1, 0, 0, 0).unwrap();
//! let timestamps = (0..60).map(|i| base + Duration::days(i)).collect();
//! let values = (0..60).map(|i| 10.0 + (i % 7) as f64).collect();
//! let data = SeriesSet::univariate(timestamps, "sales", values).unwrap();
//!
//! let config = AutoForecastConfig::default()
//!     .with_forecast_length(7)
//!     .with_num_validations(1)
//!     .with_max_generations(1)
//!     .with_model_list(["superfast"])
//!     .with_n_jobs(NJobs::Fixed(1));
//! let mut auto = AutoForecast::new(config);
//! auto.fit(&data).unwrap();
//!
//! let forecast = auto.predict().unwrap();
//! assert_eq!(forecast.shape(), (7, 1));
//! assert!(!forecast.has_missing_values());
//! ```

use crate::config::AutoForecastConfig;
use crate::core::{Forecast, Frequency, SeriesSet};
use crate::error::{ForecastError, Result};
use crate::models::ModelSpec;
use crate::search::{
    generate_splits, rank_initial, run_template, select_best, select_for_validation,
    templates_from_json, templates_to_json, BestModel, Ensembler, Evaluator, Executor,
    GenerationalSearch, ResultKind, ResultRow, ResultStore, RunContext, Scorer, SearchSettings,
    Template, TemplateSpace, ValidationSplit, Validator,
};
use crate::transform::TransformationParameters;
use std::sync::Arc;
use tracing::{debug, info, warn};

/// Spacing share the modal index step must reach to be taken as the frequency.
const FREQUENCY_TOLERANCE: f64 = 0.5;

/// How imported templates take part in the next fit.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum ImportMode {
    /// Added to the initial population of the search.
    #[default]
    Addon,
    /// Evaluated on their own; no search is run.
    Only,
}

#[derive(Debug)]
struct FittedState {
    data: Arc<SeriesSet>,
    frequency: Frequency,
    splits: Vec<ValidationSplit>,
    store: ResultStore,
    scorer: Scorer,
    models_to_validate: usize,
    best: BestModel,
}

/// Genetic search over forecasting templates for a table of series.
#[derive(Debug)]
pub struct AutoForecast {
    config: AutoForecastConfig,
    imported: Vec<Template>,
    import_mode: ImportMode,
    fitted: Option<FittedState>,
}

impl AutoForecast {
    pub fn new(config: AutoForecastConfig) -> Self {
        Self {
            config,
            imported: Vec::new(),
            import_mode: ImportMode::Addon,
            fitted: None,
        }
    }

    pub fn config(&self) -> &AutoForecastConfig {
        &self.config
    }

    pub fn is_fitted(&self) -> bool {
        self.fitted.is_some()
    }

    /// Search for the best template on `data`.
    pub fn fit(&mut self, data: &SeriesSet) -> Result<()> {
        let config = &self.config;
        config.validate()?;
        if data.is_empty() || data.n_series() == 0 {
            return Err(ForecastError::EmptyData);
        }

        let trimmed = if config.drop_most_recent > 0 {
            data.drop_most_recent(config.drop_most_recent)?
        } else {
            data.clone()
        };
        let frequency = resolve_frequency(&trimmed, config.frequency)?;
        let splits = generate_splits(
            trimmed.len(),
            config.forecast_length,
            config.num_validations,
            config.validation_method,
        )?;
        info!(
            n_obs = trimmed.len(),
            n_series = trimmed.n_series(),
            splits = splits.len(),
            "starting search"
        );

        let timeout = config
            .model_interrupt
            .then(|| std::time::Duration::from_secs_f64(config.evaluation_timeout));
        let executor = Executor::new(config.n_jobs, timeout)?;
        let data = Arc::new(trimmed);
        let evaluator = Evaluator::new(
            Arc::clone(&data),
            RunContext {
                forecast_length: config.forecast_length,
                prediction_interval: config.prediction_interval,
                frequency,
                no_negatives: config.no_negatives,
            },
        );
        let scorer = Scorer::new(config.metric_weighting.clone(), config.prediction_interval);
        let mut store = ResultStore::new();

        let primary = splits.first().ok_or(ForecastError::EmptyData)?;
        let validator = Validator::new(&executor, &evaluator, &splits);
        let models_to_validate = match self.import_mode {
            ImportMode::Only if !self.imported.is_empty() => {
                validator.run(&mut store, &self.imported, 0);
                self.imported.len()
            }
            _ => {
                let space = TemplateSpace::new(
                    config.models()?,
                    config.transformers()?,
                    config.transformer_max_depth,
                )?;
                let settings = SearchSettings {
                    initial_template: config.initial_template,
                    random_template_count: config.random_template_count,
                    generation_size: config.generation_size,
                    max_generations: config.max_generations,
                    models_to_validate: config.models_to_validate,
                    random_seed: config.random_seed,
                };
                let mut search =
                    GenerationalSearch::new(&space, &settings, &executor, &evaluator, &scorer, primary);
                search.run(&mut store, &self.imported)?;

                let candidates = store.templates().filter(|t| !t.is_ensemble()).count();
                let models_to_validate = config.models_to_validate.resolve(candidates);
                let mut selected = {
                    let ranked = rank_initial(&store, &scorer);
                    select_for_validation(&ranked, models_to_validate, config.max_per_model_class)
                };
                // Imported ensembles skip the split-0 ranking
                selected.extend(self.imported.iter().filter(|t| t.is_ensemble()).cloned());
                debug!(selected = selected.len(), models_to_validate, "validating top templates");
                validator.run(&mut store, &selected, 0);
                models_to_validate
            }
        };

        let policies = config.ensemble_policies()?;
        if !policies.is_empty() {
            let ensembles =
                Ensembler::new(&store, &scorer, splits.len(), data.names()).build(&policies);
            if !ensembles.is_empty() {
                validator.run(&mut store, &ensembles, 0);
            }
        }

        let best = select_best(&store, &scorer, splits.len())?;
        info!(best = %best.template, score = best.score, "search complete");

        self.fitted = Some(FittedState {
            data,
            frequency,
            splits,
            store,
            scorer,
            models_to_validate,
            best,
        });
        Ok(())
    }

    fn state(&self) -> Result<&FittedState> {
        self.fitted.as_ref().ok_or(ForecastError::FitRequired)
    }

    fn context(&self, state: &FittedState, forecast_length: usize) -> RunContext {
        RunContext {
            forecast_length,
            prediction_interval: self.config.prediction_interval,
            frequency: state.frequency,
            no_negatives: self.config.no_negatives,
        }
    }

    /// Forecast `forecast_length` steps past the (trimmed) history with the
    /// best template.
    pub fn predict(&self) -> Result<Forecast> {
        let state = self.state()?;
        let ctx = self.context(state, self.config.forecast_length);
        run_template(&state.best.template, &state.data, &ctx)
    }

    /// In-sample forecast covering every observation of the history.
    ///
    /// The history is cut into `n_splits` chunks; each chunk is forecast
    /// from all data before it. The first chunk has no past, so it is
    /// forecast from the reversed remainder of the series. A chunk whose
    /// history is too short for the best template (a seasonal lag longer
    /// than the history, say) is forecast with the last observed value.
    pub fn back_forecast(&self, n_splits: usize) -> Result<Forecast> {
        let state = self.state()?;
        let data = state.data.as_ref();
        let n = data.len();
        if n_splits < 2 || n_splits > n / 2 {
            return Err(ForecastError::InvalidParameter(format!(
                "n_splits must be between 2 and {} for {n} observations",
                n / 2
            )));
        }

        let chunk = n.div_ceil(n_splits);
        let template = &state.best.template;
        let fallback = Template::new(ModelSpec::LastValueNaive, TransformationParameters::default());
        let mut parts = Vec::with_capacity(n_splits);
        let mut start = 0;
        while start < n {
            let end = (start + chunk).min(n);
            let horizon = end - start;
            let ctx = self.context(state, horizon);
            let index = data.timestamps()[start..end].to_vec();
            let part = if start == 0 {
                let future = data.slice(end..n)?.with_reversed_values();
                forecast_chunk(template, &fallback, &future, &ctx)?.reversed()
            } else {
                forecast_chunk(template, &fallback, &data.slice(0..start)?, &ctx)?
            };
            parts.push(part.with_timestamps(index)?);
            start = end;
        }
        Forecast::concat(&parts)
    }

    /// Result table of the last fit.
    pub fn results(&self, kind: ResultKind) -> Result<Vec<ResultRow>> {
        let state = self.state()?;
        Ok(state.store.table(kind, &state.scorer))
    }

    pub fn best_model(&self) -> Option<&BestModel> {
        self.fitted.as_ref().map(|s| &s.best)
    }

    /// Splits of the last fit, most recent first.
    pub fn validation_splits(&self) -> &[ValidationSplit] {
        self.fitted.as_ref().map_or(&[], |s| s.splits.as_slice())
    }

    /// Number of templates carried into validation by the last fit.
    pub fn models_to_validate(&self) -> Option<usize> {
        self.fitted.as_ref().map(|s| s.models_to_validate)
    }

    /// Inferred or configured spacing of the index.
    pub fn frequency(&self) -> Option<Frequency> {
        self.fitted.as_ref().map(|s| s.frequency)
    }

    /// JSON of the best template, or of every validated template in
    /// validation order.
    pub fn export_template(&self, best_only: bool) -> Result<String> {
        let state = self.state()?;
        if best_only {
            return templates_to_json(std::slice::from_ref(&state.best.template));
        }
        let templates: Vec<Template> = state
            .store
            .table(ResultKind::Validation, &state.scorer)
            .iter()
            .filter_map(|row| state.store.template(&row.id).cloned())
            .collect();
        templates_to_json(&templates)
    }

    /// Load templates for the next [`fit`](Self::fit). Returns how many were read.
    pub fn import_templates(&mut self, json: &str, mode: ImportMode) -> Result<usize> {
        let templates = templates_from_json(json)?;
        let count = templates.len();
        self.imported = templates;
        self.import_mode = mode;
        Ok(count)
    }
}

/// Run `template` on one back-forecast chunk, or `fallback` when it fails.
fn forecast_chunk(
    template: &Template,
    fallback: &Template,
    history: &SeriesSet,
    ctx: &RunContext,
) -> Result<Forecast> {
    run_template(template, history, ctx).or_else(|err| {
        warn!(
            template = %template,
            history = history.len(),
            error = %err,
            "back forecast chunk falls back to last value"
        );
        run_template(fallback, history, ctx)
    })
}

fn resolve_frequency(data: &SeriesSet, seconds: Option<i64>) -> Result<Frequency> {
    match seconds {
        Some(s) => Ok(Frequency::seconds(s)),
        None => data.infer_frequency(FREQUENCY_TOLERANCE),
    }
}

/// Fit and forecast a single template without any search.
pub fn model_forecast(
    template: &Template,
    data: &SeriesSet,
    config: &AutoForecastConfig,
) -> Result<Forecast> {
    let data = if config.drop_most_recent > 0 {
        data.drop_most_recent(config.drop_most_recent)?
    } else {
        data.clone()
    };
    let ctx = RunContext {
        forecast_length: config.forecast_length,
        prediction_interval: config.prediction_interval,
        frequency: resolve_frequency(&data, config.frequency)?,
        no_negatives: config.no_negatives,
    };
    run_template(template, &data, &ctx)
}
