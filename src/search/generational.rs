//! The genetic search loop over split 0.

use super::evaluator::Evaluator;
use super::executor::{EvaluationTask, Executor};
use super::generation::{InitialTemplate, TemplateSpace};
use super::results::ResultStore;
use super::scorer::Scorer;
use super::splits::ValidationSplit;
use super::template::Template;
use super::validator::{rank_initial, ModelsToValidate};
use crate::error::Result;
use rand::rngs::StdRng;
use rand::SeedableRng;
use std::collections::BTreeSet;
use tracing::{debug, info};

/// Minimum number of survivors bred from each generation.
const MIN_SURVIVORS: usize = 3;

/// Phase of a [`GenerationalSearch`].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SearchState {
    Initializing,
    Generating,
    Evaluating,
    Selecting,
    Done,
}

#[derive(Debug, Clone, PartialEq)]
pub struct SearchSettings {
    pub initial_template: InitialTemplate,
    pub random_template_count: usize,
    pub generation_size: usize,
    pub max_generations: usize,
    pub models_to_validate: ModelsToValidate,
    pub random_seed: u64,
}

/// Evaluates populations on split 0 and breeds new ones from the best.
pub struct GenerationalSearch<'a> {
    space: &'a TemplateSpace,
    settings: &'a SearchSettings,
    executor: &'a Executor,
    evaluator: &'a Evaluator,
    scorer: &'a Scorer,
    split: &'a ValidationSplit,
    state: SearchState,
    generation: usize,
    rng: StdRng,
}

impl<'a> GenerationalSearch<'a> {
    pub fn new(
        space: &'a TemplateSpace,
        settings: &'a SearchSettings,
        executor: &'a Executor,
        evaluator: &'a Evaluator,
        scorer: &'a Scorer,
        split: &'a ValidationSplit,
    ) -> Self {
        Self {
            space,
            settings,
            executor,
            evaluator,
            scorer,
            split,
            state: SearchState::Initializing,
            generation: 0,
            rng: StdRng::seed_from_u64(settings.random_seed),
        }
    }

    pub fn state(&self) -> SearchState {
        self.state
    }

    /// Generations evaluated so far, the initial population included.
    pub fn generation(&self) -> usize {
        self.generation
    }

    /// Drive the search to `Done`, appending every evaluation to `store`.
    ///
    /// `seed_templates` (e.g. imported ones) join the initial population.
    pub fn run(&mut self, store: &mut ResultStore, seed_templates: &[Template]) -> Result<()> {
        let mut population: Vec<Template> = Vec::new();
        loop {
            match self.state {
                SearchState::Initializing => {
                    population = self.space.initial_population(
                        self.settings.initial_template,
                        self.settings.random_template_count,
                        &mut self.rng,
                    )?;
                    for t in seed_templates {
                        if !population.iter().any(|p| p.id() == t.id()) {
                            population.push(t.clone());
                        }
                    }
                    self.state = SearchState::Evaluating;
                }
                SearchState::Generating => {
                    let survivors = self.survivors(store, population.len());
                    let seen: BTreeSet<String> = store.templates().map(|t| t.id().to_string()).collect();
                    population = self.space.next_generation(
                        &survivors,
                        self.settings.generation_size,
                        &seen,
                        &mut self.rng,
                    )?;
                    if population.is_empty() {
                        debug!(generation = self.generation, "search space exhausted");
                        self.state = SearchState::Done;
                        continue;
                    }
                    self.state = SearchState::Evaluating;
                }
                SearchState::Evaluating => {
                    self.evaluate(store, &population);
                    self.state = SearchState::Selecting;
                }
                SearchState::Selecting => {
                    self.generation += 1;
                    self.state = if self.generation > self.settings.max_generations {
                        SearchState::Done
                    } else {
                        SearchState::Generating
                    };
                }
                SearchState::Done => break,
            }
        }
        info!(
            generations = self.generation,
            templates = store.templates().count(),
            "generational search complete"
        );
        Ok(())
    }

    fn evaluate(&self, store: &mut ResultStore, population: &[Template]) {
        let tasks: Vec<EvaluationTask> = population
            .iter()
            .map(|t| EvaluationTask {
                template: t.clone(),
                split: self.split.clone(),
                generation: self.generation,
            })
            .collect();
        for t in population {
            store.register(t.clone());
        }
        let rows = self.executor.run_batch(self.evaluator, &tasks);
        let failed = rows.iter().filter(|r| !r.is_success()).count();
        info!(
            generation = self.generation,
            evaluated = rows.len(),
            failed,
            "generation evaluated"
        );
        store.append(rows);
    }

    /// Best templates seen so far, across every generation.
    fn survivors(&self, store: &ResultStore, population_len: usize) -> Vec<Template> {
        let n = self
            .settings
            .models_to_validate
            .resolve(population_len)
            .max(MIN_SURVIVORS);
        rank_initial(store, self.scorer)
            .into_iter()
            .take(n)
            .map(|(t, _)| t.clone())
            .collect()
    }
}

impl std::fmt::Debug for GenerationalSearch<'_> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("GenerationalSearch")
            .field("state", &self.state)
            .field("generation", &self.generation)
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::core::{Frequency, SeriesSet};
    use crate::models::ModelName;
    use crate::search::executor::NJobs;
    use crate::search::runner::RunContext;
    use crate::search::scorer::MetricWeighting;
    use crate::search::splits::{generate_splits, ValidationMethod};
    use crate::transform::TransformerKind;
    use chrono::{Duration, TimeZone, Utc};
    use std::sync::Arc;

    fn evaluator() -> Evaluator {
        let base = Utc.with_ymd_and_hms(2024, 1, 1, 0, 0, 0).unwrap();
        let n = 60;
        let ts = (0..n).map(|i| base + Duration::days(i)).collect();
        let values = (0..n).map(|i| 20.0 + (i % 7) as f64 + 0.1 * i as f64).collect();
        Evaluator::new(
            Arc::new(SeriesSet::univariate(ts, "y", values).unwrap()),
            RunContext {
                forecast_length: 7,
                prediction_interval: 0.9,
                frequency: Frequency::Fixed(Duration::days(1)),
                no_negatives: false,
            },
        )
    }

    fn settings(seed: u64) -> SearchSettings {
        SearchSettings {
            initial_template: InitialTemplate::GeneralRandom,
            random_template_count: 5,
            generation_size: 6,
            max_generations: 2,
            models_to_validate: ModelsToValidate::Count(3),
            random_seed: seed,
        }
    }

    fn run(seed: u64) -> (ResultStore, usize) {
        let space = TemplateSpace::new(
            vec![ModelName::LastValueNaive, ModelName::SeasonalNaive, ModelName::Ets],
            TransformerKind::preset("superfast").unwrap(),
            2,
        )
        .unwrap();
        let settings = settings(seed);
        let executor = Executor::new(NJobs::Fixed(2), None).unwrap();
        let evaluator = evaluator();
        let scorer = Scorer::new(MetricWeighting::default(), 0.9);
        let splits = generate_splits(60, 7, 0, ValidationMethod::Backwards).unwrap();

        let mut search =
            GenerationalSearch::new(&space, &settings, &executor, &evaluator, &scorer, &splits[0]);
        let mut store = ResultStore::new();
        search.run(&mut store, &[]).unwrap();
        assert_eq!(search.state(), SearchState::Done);
        (store, search.generation())
    }

    #[test]
    fn runs_initial_plus_max_generations() {
        let (store, generations) = run(2022);
        assert_eq!(generations, 3);
        assert!(store.rows().iter().all(|r| r.split_index == 0));
        let max_gen = store.rows().iter().map(|r| r.generation).max().unwrap();
        assert_eq!(max_gen, 2);
    }

    #[test]
    fn each_template_evaluated_once() {
        let (store, _) = run(11);
        let ids: BTreeSet<&str> = store.rows().iter().map(|r| r.template_id.as_str()).collect();
        assert_eq!(ids.len(), store.len());
    }

    #[test]
    fn seeded_search_is_reproducible() {
        let (a, _) = run(5);
        let (b, _) = run(5);
        let ids = |s: &ResultStore| -> Vec<String> {
            s.rows().iter().map(|r| r.template_id.clone()).collect()
        };
        assert_eq!(ids(&a), ids(&b));
    }
}
