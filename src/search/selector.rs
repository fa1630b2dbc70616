//! Choosing the final template.

use super::results::{ResultKind, ResultStore};
use super::scorer::Scorer;
use super::template::Template;
use crate::error::{ForecastError, Result};
use serde::Serialize;
use tracing::info;

/// The winning template with its validation summary.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct BestModel {
    #[serde(rename = "ID")]
    pub id: String,
    #[serde(rename = "Model")]
    pub model: String,
    #[serde(rename = "ModelParameters")]
    pub model_parameters: String,
    #[serde(rename = "TransformationParameters")]
    pub transformation_parameters: String,
    #[serde(rename = "Score")]
    pub score: f64,
    #[serde(rename = "TotalRuntimeSeconds")]
    pub runtime_seconds: f64,
    #[serde(skip)]
    pub template: Template,
}

/// Lowest validation score among templates that succeeded on all
/// `n_splits` splits; total runtime breaks ties.
pub fn select_best(store: &ResultStore, scorer: &Scorer, n_splits: usize) -> Result<BestModel> {
    let table = store.table(ResultKind::Validation, scorer);
    let best = table
        .iter()
        .filter(|row| row.runs == n_splits && row.score.is_finite())
        .min_by(|a, b| {
            a.score
                .total_cmp(&b.score)
                .then_with(|| a.total_runtime_seconds.total_cmp(&b.total_runtime_seconds))
                .then_with(|| a.id.cmp(&b.id))
        })
        .ok_or_else(|| {
            ForecastError::NoViableModel(format!(
                "none of {} validated templates succeeded on all {n_splits} splits",
                table.len()
            ))
        })?;

    let template = store
        .template(&best.id)
        .cloned()
        .ok_or_else(|| ForecastError::NoViableModel(format!("unknown template {}", best.id)))?;

    info!(template = %template, score = best.score, "selected best model");
    Ok(BestModel {
        id: best.id.clone(),
        model: best.model.clone(),
        model_parameters: best.model_parameters.clone(),
        transformation_parameters: best.transformation_parameters.clone(),
        score: best.score,
        runtime_seconds: best.total_runtime_seconds,
        template,
    })
}
