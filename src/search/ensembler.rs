//! Building ensemble templates from validated results.
//!
//! Horizontal ensembles pick members per series using scores computed on
//! that series alone; simple and weighted ensembles blend the overall best.

use super::results::{ResultKind, ResultStore};
use super::scorer::Scorer;
use super::template::Template;
use crate::error::{ForecastError, Result};
use crate::models::{EnsembleParams, ModelSpec};
use crate::transform::TransformationParameters;
use std::collections::{BTreeMap, BTreeSet};
use std::fmt;
use std::str::FromStr;
use tracing::{debug, info};

/// Relative slack within which a template counts as covering a series in
/// a `horizontal-min` ensemble.
const COVER_TOLERANCE: f64 = 0.1;
/// Members of simple and weighted ensembles.
const BLEND_MEMBERS: usize = 3;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub enum EnsemblePolicy {
    /// Best template for every series.
    HorizontalMax,
    /// Smallest set of templates that are near-best on every series.
    HorizontalMin,
    /// Equal-weight blend of the best templates.
    Simple,
    /// Inverse-score weighted blend of the best templates.
    Weighted,
}

impl fmt::Display for EnsemblePolicy {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            EnsemblePolicy::HorizontalMax => "horizontal-max",
            EnsemblePolicy::HorizontalMin => "horizontal-min",
            EnsemblePolicy::Simple => "simple",
            EnsemblePolicy::Weighted => "weighted",
        })
    }
}

impl FromStr for EnsemblePolicy {
    type Err = ForecastError;

    fn from_str(s: &str) -> Result<Self> {
        match s.trim().to_lowercase().as_str() {
            "horizontal" | "horizontal-max" => Ok(EnsemblePolicy::HorizontalMax),
            "horizontal-min" => Ok(EnsemblePolicy::HorizontalMin),
            "simple" => Ok(EnsemblePolicy::Simple),
            "weighted" => Ok(EnsemblePolicy::Weighted),
            _ => Err(ForecastError::InvalidParameter(format!(
                "unknown ensemble policy '{s}'"
            ))),
        }
    }
}

impl EnsemblePolicy {
    /// Parse a list of policy names, dropping duplicates.
    pub fn resolve_list(entries: &[String]) -> Result<Vec<EnsemblePolicy>> {
        let mut out = Vec::new();
        for entry in entries {
            let policy: EnsemblePolicy = entry.parse()?;
            if !out.contains(&policy) {
                out.push(policy);
            }
        }
        Ok(out)
    }
}

type PerSeries = BTreeMap<String, BTreeMap<String, f64>>;
type Sums = BTreeMap<String, BTreeMap<String, (f64, usize)>>;

/// Per-series scores of every eligible template.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct SeriesScores {
    /// template id -> series name -> mean scaled score over splits.
    scores: PerSeries,
    /// template id -> series name -> mean unscaled weighted loss over splits.
    losses: PerSeries,
}

fn lookup(map: &PerSeries, template_id: &str, series: &str) -> f64 {
    map.get(template_id)
        .and_then(|m| m.get(series))
        .copied()
        .unwrap_or(f64::INFINITY)
}

impl SeriesScores {
    pub fn get(&self, template_id: &str, series: &str) -> f64 {
        lookup(&self.scores, template_id, series)
    }

    /// Unscaled loss, comparable in magnitude across templates.
    pub fn loss(&self, template_id: &str, series: &str) -> f64 {
        lookup(&self.losses, template_id, series)
    }

    pub fn template_ids(&self) -> impl Iterator<Item = &str> {
        self.scores.keys().map(String::as_str)
    }

    /// Lowest-scoring template for `series` among `candidates`, id breaks ties.
    fn best_for<'a>(&self, series: &str, candidates: impl Iterator<Item = &'a str>) -> Option<&'a str> {
        candidates
            .map(|id| (id, self.get(id, series)))
            .min_by(|a, b| a.1.total_cmp(&b.1).then_with(|| a.0.cmp(b.0)))
            .map(|(id, _)| id)
    }
}

fn accumulate(sums: &mut Sums, id: &str, series: &str, value: f64) {
    let entry = sums
        .entry(id.to_string())
        .or_default()
        .entry(series.to_string())
        .or_insert((0.0, 0));
    entry.0 += value;
    entry.1 += 1;
}

fn means(sums: Sums) -> PerSeries {
    sums.into_iter()
        .map(|(id, per_series)| {
            let means = per_series
                .into_iter()
                .map(|(series, (sum, n))| (series, sum / n as f64))
                .collect();
            (id, means)
        })
        .collect()
}

/// Builds ensemble templates from a result store.
#[derive(Debug)]
pub struct Ensembler<'a> {
    store: &'a ResultStore,
    scorer: &'a Scorer,
    n_splits: usize,
    series: &'a [String],
}

impl<'a> Ensembler<'a> {
    pub fn new(
        store: &'a ResultStore,
        scorer: &'a Scorer,
        n_splits: usize,
        series: &'a [String],
    ) -> Self {
        Self {
            store,
            scorer,
            n_splits,
            series,
        }
    }

    /// Validated single-model templates that succeeded on every split.
    pub fn eligible(&self) -> Vec<&'a Template> {
        self.store
            .validated_ids()
            .filter_map(|id| self.store.template(id))
            .filter(|t| !t.is_ensemble())
            .filter(|t| {
                (0..self.n_splits).all(|split| {
                    self.store
                        .rows_for_template(t.id())
                        .any(|r| r.split_index == split && r.is_success())
                })
            })
            .collect()
    }

    /// Score each eligible template on each series, scaling within each split.
    pub fn series_scores(&self) -> SeriesScores {
        let eligible = self.eligible();
        let ids: BTreeSet<&str> = eligible.iter().map(|t| t.id()).collect();
        let mut scores = Sums::new();
        let mut losses = Sums::new();

        for split in 0..self.n_splits {
            let rows: Vec<_> = self
                .store
                .rows_for_split(split)
                .filter(|r| r.is_success() && ids.contains(r.template_id.as_str()))
                .collect();
            for series in self.series {
                let population: Vec<(&str, _)> = rows
                    .iter()
                    .filter_map(|r| {
                        r.metrics
                            .as_ref()
                            .and_then(|m| m.per_series.get(series))
                            .map(|m| (r.template_id.as_str(), m))
                    })
                    .collect();
                let scale = self
                    .scorer
                    .fit_scale(population.iter().map(|(_, m)| (*m, 0.0)));
                for (id, metrics) in population {
                    accumulate(
                        &mut scores,
                        id,
                        series,
                        self.scorer.score_metrics(metrics, 0.0, &scale),
                    );
                    accumulate(&mut losses, id, series, self.scorer.raw_loss(metrics));
                }
            }
        }

        SeriesScores {
            scores: means(scores),
            losses: means(losses),
        }
    }

    /// Build one ensemble per policy. Policies without enough eligible
    /// members are skipped.
    pub fn build(&self, policies: &[EnsemblePolicy]) -> Vec<Template> {
        let mut out = Vec::new();
        for &policy in policies {
            match self.build_one(policy) {
                Ok(template) => {
                    info!(%policy, template = %template, "built ensemble");
                    out.push(template);
                }
                Err(err) => debug!(%policy, error = %err, "ensemble skipped"),
            }
        }
        out
    }

    pub fn build_one(&self, policy: EnsemblePolicy) -> Result<Template> {
        let eligible = self.eligible();
        if eligible.len() < 2 {
            return Err(ForecastError::InsufficientData {
                needed: 2,
                got: eligible.len(),
            });
        }
        let params = match policy {
            EnsemblePolicy::HorizontalMax => self.horizontal_max(&eligible)?,
            EnsemblePolicy::HorizontalMin => self.horizontal_min(&eligible)?,
            EnsemblePolicy::Simple => {
                EnsembleParams::simple(self.top_validated(&eligible), "Score")
            }
            EnsemblePolicy::Weighted => {
                let members = self.top_validated_scored(&eligible);
                // Min-max scores can be zero, so the weight is offset by one
                let weights = members
                    .iter()
                    .map(|(t, score)| (t.id().to_string(), 1.0 / (1.0 + score)))
                    .collect();
                EnsembleParams::weighted(
                    members.into_iter().map(|(t, _)| t).collect(),
                    weights,
                    "Score",
                )
            }
        };
        params.validate()?;
        Ok(Template::new(
            ModelSpec::Ensemble(Box::new(params)),
            TransformationParameters::default(),
        ))
    }

    fn horizontal_max(&self, eligible: &[&Template]) -> Result<EnsembleParams> {
        let scores = self.series_scores();
        let mut assignment = BTreeMap::new();
        for series in self.series {
            let best = scores
                .best_for(series, eligible.iter().map(|t| t.id()))
                .ok_or(ForecastError::EmptyData)?;
            assignment.insert(series.clone(), best.to_string());
        }
        Ok(self.horizontal_params(eligible, assignment, "per-series Score"))
    }

    fn horizontal_min(&self, eligible: &[&Template]) -> Result<EnsembleParams> {
        let scores = self.series_scores();
        // Closeness is judged on unscaled losses; scaled scores put every
        // runner-up at the top of the range however close it is.
        let best: BTreeMap<&str, f64> = self
            .series
            .iter()
            .map(|s| {
                let b = eligible
                    .iter()
                    .map(|t| scores.loss(t.id(), s))
                    .fold(f64::INFINITY, f64::min);
                (s.as_str(), b)
            })
            .collect();
        let covers = |id: &str, series: &str| -> bool {
            let b = best[series];
            let loss = scores.loss(id, series);
            loss.is_finite() && loss <= b + COVER_TOLERANCE * b.abs() + 1e-12
        };

        let mut uncovered: BTreeSet<&str> = self.series.iter().map(String::as_str).collect();
        let mut chosen: Vec<&str> = Vec::new();
        while !uncovered.is_empty() {
            let pick = eligible
                .iter()
                .map(|t| t.id())
                .filter(|id| !chosen.contains(id))
                .map(|id| (id, uncovered.iter().filter(|s| covers(id, s)).count()))
                .filter(|(_, n)| *n > 0)
                .max_by(|a, b| a.1.cmp(&b.1).then_with(|| b.0.cmp(a.0)));
            match pick {
                Some((id, _)) => {
                    uncovered.retain(|s| !covers(id, s));
                    chosen.push(id);
                }
                // Series no template scored on fall back to the overall best
                None => break,
            }
        }

        let candidates: Vec<&str> = if chosen.is_empty() {
            eligible.iter().map(|t| t.id()).collect()
        } else {
            chosen
        };
        let mut assignment = BTreeMap::new();
        for series in self.series {
            let id = scores
                .best_for(series, candidates.iter().copied())
                .ok_or(ForecastError::EmptyData)?;
            assignment.insert(series.clone(), id.to_string());
        }
        Ok(self.horizontal_params(eligible, assignment, "per-series Score"))
    }

    fn horizontal_params(
        &self,
        eligible: &[&Template],
        assignment: BTreeMap<String, String>,
        metric: &str,
    ) -> EnsembleParams {
        let used: BTreeSet<&str> = assignment.values().map(String::as_str).collect();
        let members = eligible
            .iter()
            .filter(|t| used.contains(t.id()))
            .map(|t| (*t).clone())
            .collect();
        EnsembleParams::horizontal(members, assignment, metric)
    }

    /// Eligible templates by validation score, best first.
    fn top_validated_scored(&self, eligible: &[&Template]) -> Vec<(Template, f64)> {
        let table = self.store.table(ResultKind::Validation, self.scorer);
        let ids: BTreeSet<&str> = eligible.iter().map(|t| t.id()).collect();
        table
            .iter()
            .filter(|row| ids.contains(row.id.as_str()) && row.score.is_finite())
            .filter_map(|row| self.store.template(&row.id).map(|t| (t.clone(), row.score)))
            .take(BLEND_MEMBERS)
            .collect()
    }

    fn top_validated(&self, eligible: &[&Template]) -> Vec<Template> {
        self.top_validated_scored(eligible)
            .into_iter()
            .map(|(t, _)| t)
            .collect()
    }
}
