//! Cross-validation of the best templates on the remaining splits.

use super::evaluator::Evaluator;
use super::executor::{EvaluationTask, Executor};
use super::results::ResultStore;
use super::scorer::Scorer;
use super::splits::ValidationSplit;
use super::template::Template;
use crate::error::{ForecastError, Result};
use crate::models::ModelName;
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use tracing::{debug, info};

/// How many top templates are carried into validation.
///
/// Deserializes from a number: values below 1 are a fraction of the
/// candidate count, values of 1 or more an absolute count.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(try_from = "f64", into = "f64")]
pub enum ModelsToValidate {
    Count(usize),
    Fraction(f64),
}

impl Default for ModelsToValidate {
    fn default() -> Self {
        ModelsToValidate::Fraction(0.15)
    }
}

impl TryFrom<f64> for ModelsToValidate {
    type Error = ForecastError;

    fn try_from(value: f64) -> Result<Self> {
        if !(value.is_finite() && value > 0.0) {
            return Err(ForecastError::InvalidParameter(format!(
                "models_to_validate must be positive, got {value}"
            )));
        }
        if value < 1.0 {
            Ok(ModelsToValidate::Fraction(value))
        } else {
            Ok(ModelsToValidate::Count(value.round() as usize))
        }
    }
}

impl From<ModelsToValidate> for f64 {
    fn from(value: ModelsToValidate) -> Self {
        match value {
            ModelsToValidate::Count(n) => n as f64,
            ModelsToValidate::Fraction(f) => f,
        }
    }
}

impl ModelsToValidate {
    /// Absolute count for `candidates` templates, at least one.
    pub fn resolve(&self, candidates: usize) -> usize {
        let n = match self {
            ModelsToValidate::Count(n) => *n,
            ModelsToValidate::Fraction(f) => (f * candidates as f64).ceil() as usize,
        };
        n.max(1)
    }
}

/// Non-ensemble templates with a finite split-0 score, best first.
///
/// Ties break on id so the order is reproducible.
pub fn rank_initial<'a>(store: &'a ResultStore, scorer: &Scorer) -> Vec<(&'a Template, f64)> {
    let mut ranked: Vec<(&Template, f64)> = store
        .initial_scores(scorer)
        .into_iter()
        .filter(|(_, score)| score.is_finite())
        .filter_map(|(id, score)| store.template(&id).map(|t| (t, score)))
        .filter(|(t, _)| !t.is_ensemble())
        .collect();
    ranked.sort_by(|a, b| a.1.total_cmp(&b.1).then_with(|| a.0.id().cmp(b.0.id())));
    ranked
}

/// Take the top `count` of `ranked`, with at most `max_per_class` of any
/// one model.
pub fn select_for_validation(
    ranked: &[(&Template, f64)],
    count: usize,
    max_per_class: Option<usize>,
) -> Vec<Template> {
    let mut per_class: BTreeMap<ModelName, usize> = BTreeMap::new();
    let mut out = Vec::with_capacity(count);
    for (template, _) in ranked {
        if out.len() >= count {
            break;
        }
        let used = per_class.entry(template.model_name()).or_insert(0);
        if max_per_class.is_some_and(|cap| *used >= cap) {
            continue;
        }
        *used += 1;
        out.push((*template).clone());
    }
    out
}

/// Runs templates over every split, one barrier per split.
#[derive(Debug)]
pub struct Validator<'a> {
    executor: &'a Executor,
    evaluator: &'a Evaluator,
    splits: &'a [ValidationSplit],
}

impl<'a> Validator<'a> {
    pub fn new(
        executor: &'a Executor,
        evaluator: &'a Evaluator,
        splits: &'a [ValidationSplit],
    ) -> Self {
        Self {
            executor,
            evaluator,
            splits,
        }
    }

    /// Evaluate `templates` on each split they have not run on yet and mark
    /// them validated.
    pub fn run(&self, store: &mut ResultStore, templates: &[Template], generation: usize) {
        for template in templates {
            store.register(template.clone());
        }

        for split in self.splits {
            let tasks: Vec<EvaluationTask> = templates
                .iter()
                .filter(|t| !store.has_run(t.id(), split.index))
                .map(|t| EvaluationTask {
                    template: t.clone(),
                    split: split.clone(),
                    generation,
                })
                .collect();
            if tasks.is_empty() {
                continue;
            }
            let rows = self.executor.run_batch(self.evaluator, &tasks);
            let failed = rows.iter().filter(|r| !r.is_success()).count();
            debug!(split = split.index, evaluated = rows.len(), failed, "validation round complete");
            store.append(rows);
        }

        for template in templates {
            store.mark_validated(template.id());
        }
        info!(templates = templates.len(), splits = self.splits.len(), "validation complete");
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::baseline::ConstantNaiveParams;
    use crate::models::ModelSpec;
    use crate::transform::TransformationParameters;

    #[test]
    fn models_to_validate_from_number() {
        let frac: ModelsToValidate = serde_json::from_str("0.2").unwrap();
        assert_eq!(frac, ModelsToValidate::Fraction(0.2));
        assert_eq!(frac.resolve(50), 10);
        assert_eq!(frac.resolve(1), 1);

        let count: ModelsToValidate = serde_json::from_str("5").unwrap();
        assert_eq!(count, ModelsToValidate::Count(5));
        assert_eq!(count.resolve(100), 5);

        assert!(serde_json::from_str::<ModelsToValidate>("0").is_err());
        assert!(serde_json::from_str::<ModelsToValidate>("-1").is_err());
    }

    #[test]
    fn per_class_cap_is_honoured() {
        let consts: Vec<Template> = (0..3)
            .map(|i| {
                Template::new(
                    ModelSpec::ConstantNaive(ConstantNaiveParams { constant: i as f64 }),
                    TransformationParameters::default(),
                )
            })
            .collect();
        let drift = Template::new(ModelSpec::DriftNaive, TransformationParameters::default());
        let ranked: Vec<(&Template, f64)> = consts
            .iter()
            .chain(std::iter::once(&drift))
            .enumerate()
            .map(|(i, t)| (t, i as f64))
            .collect();

        let picked = select_for_validation(&ranked, 3, Some(1));
        assert_eq!(picked.len(), 2);
        assert_eq!(picked[0].id(), consts[0].id());
        assert_eq!(picked[1].id(), drift.id());

        let uncapped = select_for_validation(&ranked, 3, None);
        assert_eq!(uncapped.len(), 3);
    }
}
