//! Append-only store of evaluation outcomes and the result tables built
//! from it.

use super::scorer::Scorer;
use super::template::Template;
use crate::utils::metrics::SeriesMetrics;
use serde::Serialize;
use std::collections::{BTreeMap, BTreeSet};
use std::time::Duration;

/// Metrics of one successful evaluation.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct EvaluationMetrics {
    /// Mean over series, ignoring series that produced NaN metrics.
    pub aggregate: SeriesMetrics,
    pub per_series: BTreeMap<String, SeriesMetrics>,
}

/// Outcome of running one template on one validation split.
///
/// Exactly one of `metrics` and `exception` is set.
#[derive(Debug, Clone, PartialEq)]
pub struct EvaluationResult {
    pub template_id: String,
    pub split_index: usize,
    pub generation: usize,
    pub metrics: Option<EvaluationMetrics>,
    pub exception: Option<String>,
    pub runtime: Duration,
}

impl EvaluationResult {
    pub fn success(
        template_id: String,
        split_index: usize,
        generation: usize,
        metrics: EvaluationMetrics,
        runtime: Duration,
    ) -> Self {
        Self {
            template_id,
            split_index,
            generation,
            metrics: Some(metrics),
            exception: None,
            runtime,
        }
    }

    pub fn failure(
        template_id: String,
        split_index: usize,
        generation: usize,
        exception: String,
        runtime: Duration,
    ) -> Self {
        Self {
            template_id,
            split_index,
            generation,
            metrics: None,
            exception: Some(exception),
            runtime,
        }
    }

    pub fn is_success(&self) -> bool {
        self.exception.is_none() && self.metrics.is_some()
    }
}

/// Which result table to build.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ResultKind {
    /// One row per evaluation on the final holdout.
    Initial,
    /// One row per validated template, aggregated over every split.
    Validation,
}

/// One row of a result table.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ResultRow {
    #[serde(rename = "ID")]
    pub id: String,
    #[serde(rename = "Model")]
    pub model: String,
    #[serde(rename = "ModelParameters")]
    pub model_parameters: String,
    #[serde(rename = "TransformationParameters")]
    pub transformation_parameters: String,
    #[serde(rename = "ValidationRound")]
    pub validation_round: usize,
    #[serde(rename = "Generation")]
    pub generation: usize,
    #[serde(rename = "Runs")]
    pub runs: usize,
    pub smape: f64,
    pub mae: f64,
    pub rmse: f64,
    pub spl: f64,
    pub contour: f64,
    pub containment: f64,
    #[serde(rename = "Exceptions")]
    pub exceptions: Option<String>,
    #[serde(rename = "TotalRuntimeSeconds")]
    pub total_runtime_seconds: f64,
    #[serde(rename = "Score")]
    pub score: f64,
}

impl ResultRow {
    fn describe(template: Option<&Template>, id: &str) -> (String, String, String) {
        match template {
            Some(t) => (
                t.model_name().to_string(),
                t.model_parameters_json(),
                t.transformation_parameters_json(),
            ),
            None => (id.to_string(), String::new(), String::new()),
        }
    }

    fn set_metrics(&mut self, m: &SeriesMetrics) {
        self.smape = m.smape;
        self.mae = m.mae;
        self.rmse = m.rmse;
        self.spl = m.spl;
        self.contour = m.contour;
        self.containment = m.containment;
    }
}

/// Every evaluation outcome of a search, plus the templates behind them.
#[derive(Debug, Clone, Default)]
pub struct ResultStore {
    rows: Vec<EvaluationResult>,
    templates: BTreeMap<String, Template>,
    validated: BTreeSet<String>,
}

impl ResultStore {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn register(&mut self, template: Template) {
        self.templates
            .entry(template.id().to_string())
            .or_insert(template);
    }

    /// Append a completed batch, preserving its order.
    pub fn append(&mut self, batch: Vec<EvaluationResult>) {
        self.rows.extend(batch);
    }

    pub fn mark_validated(&mut self, id: &str) {
        self.validated.insert(id.to_string());
    }

    pub fn rows(&self) -> &[EvaluationResult] {
        &self.rows
    }

    pub fn len(&self) -> usize {
        self.rows.len()
    }

    pub fn is_empty(&self) -> bool {
        self.rows.is_empty()
    }

    pub fn template(&self, id: &str) -> Option<&Template> {
        self.templates.get(id)
    }

    pub fn templates(&self) -> impl Iterator<Item = &Template> {
        self.templates.values()
    }

    pub fn contains(&self, id: &str) -> bool {
        self.templates.contains_key(id)
    }

    pub fn validated_ids(&self) -> impl Iterator<Item = &str> {
        self.validated.iter().map(String::as_str)
    }

    pub fn is_validated(&self, id: &str) -> bool {
        self.validated.contains(id)
    }

    pub fn rows_for_split(&self, split: usize) -> impl Iterator<Item = &EvaluationResult> {
        self.rows.iter().filter(move |r| r.split_index == split)
    }

    pub fn rows_for_template<'a>(
        &'a self,
        id: &'a str,
    ) -> impl Iterator<Item = &'a EvaluationResult> + 'a {
        self.rows.iter().filter(move |r| r.template_id == id)
    }

    pub fn has_run(&self, id: &str, split: usize) -> bool {
        self.rows
            .iter()
            .any(|r| r.template_id == id && r.split_index == split)
    }

    /// Scores of every split-0 row, keyed by template id (best row wins).
    pub fn initial_scores(&self, scorer: &Scorer) -> BTreeMap<String, f64> {
        let rows: Vec<&EvaluationResult> = self.rows_for_split(0).collect();
        let scores = scorer.score_rows(&rows);
        let mut best: BTreeMap<String, f64> = BTreeMap::new();
        for (row, score) in rows.iter().zip(scores) {
            best.entry(row.template_id.clone())
                .and_modify(|s| *s = s.min(score))
                .or_insert(score);
        }
        best
    }

    /// Build a result table, sorted by score then id.
    pub fn table(&self, kind: ResultKind, scorer: &Scorer) -> Vec<ResultRow> {
        let mut table = match kind {
            ResultKind::Initial => self.initial_table(scorer),
            ResultKind::Validation => self.validation_table(scorer),
        };
        table.sort_by(|a, b| a.score.total_cmp(&b.score).then_with(|| a.id.cmp(&b.id)));
        table
    }

    fn initial_table(&self, scorer: &Scorer) -> Vec<ResultRow> {
        let rows: Vec<&EvaluationResult> = self.rows_for_split(0).collect();
        let scores = scorer.score_rows(&rows);
        rows.iter()
            .zip(scores)
            .map(|(row, score)| {
                let (model, model_parameters, transformation_parameters) =
                    ResultRow::describe(self.template(&row.template_id), &row.template_id);
                let mut out = ResultRow {
                    id: row.template_id.clone(),
                    model,
                    model_parameters,
                    transformation_parameters,
                    validation_round: row.split_index,
                    generation: row.generation,
                    runs: usize::from(row.is_success()),
                    smape: f64::NAN,
                    mae: f64::NAN,
                    rmse: f64::NAN,
                    spl: f64::NAN,
                    contour: f64::NAN,
                    containment: f64::NAN,
                    exceptions: row.exception.clone(),
                    total_runtime_seconds: row.runtime.as_secs_f64(),
                    score,
                };
                if let Some(m) = &row.metrics {
                    out.set_metrics(&m.aggregate);
                }
                out
            })
            .collect()
    }

    fn validation_table(&self, scorer: &Scorer) -> Vec<ResultRow> {
        let rows: Vec<&EvaluationResult> = self
            .rows
            .iter()
            .filter(|r| self.validated.contains(&r.template_id))
            .collect();
        let scores = scorer.score_rows(&rows);

        let mut grouped: BTreeMap<&str, Vec<(&EvaluationResult, f64)>> = BTreeMap::new();
        for (row, score) in rows.iter().zip(scores) {
            grouped
                .entry(row.template_id.as_str())
                .or_default()
                .push((row, score));
        }

        grouped
            .into_iter()
            .map(|(id, entries)| {
                let (model, model_parameters, transformation_parameters) =
                    ResultRow::describe(self.template(id), id);
                let successes: Vec<&SeriesMetrics> = entries
                    .iter()
                    .filter_map(|(r, _)| r.metrics.as_ref().filter(|_| r.is_success()))
                    .map(|m| &m.aggregate)
                    .collect();
                let failures: Vec<&str> = entries
                    .iter()
                    .filter_map(|(r, _)| r.exception.as_deref())
                    .collect();
                let score = if failures.is_empty() && !entries.is_empty() {
                    entries.iter().map(|(_, s)| s).sum::<f64>() / entries.len() as f64
                } else {
                    f64::INFINITY
                };
                let owned: Vec<SeriesMetrics> = successes.iter().map(|m| **m).collect();
                let mean = SeriesMetrics::nan_mean(&owned);

                let mut out = ResultRow {
                    id: id.to_string(),
                    model,
                    model_parameters,
                    transformation_parameters,
                    validation_round: entries.iter().map(|(r, _)| r.split_index).max().unwrap_or(0),
                    generation: entries.iter().map(|(r, _)| r.generation).min().unwrap_or(0),
                    runs: successes.len(),
                    smape: f64::NAN,
                    mae: f64::NAN,
                    rmse: f64::NAN,
                    spl: f64::NAN,
                    contour: f64::NAN,
                    containment: f64::NAN,
                    exceptions: (!failures.is_empty()).then(|| failures.join("; ")),
                    total_runtime_seconds: entries
                        .iter()
                        .map(|(r, _)| r.runtime.as_secs_f64())
                        .sum(),
                    score,
                };
                out.set_metrics(&mean);
                out
            })
            .collect()
    }
}
