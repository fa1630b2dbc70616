//! Template search: splits, evaluation, scoring, genetic generations,
//! validation, ensembling and final selection.

mod ensembler;
mod evaluator;
mod executor;
mod generation;
mod generational;
mod results;
mod runner;
mod scorer;
mod selector;
mod splits;
mod template;
mod validator;

pub use ensembler::{EnsemblePolicy, Ensembler, SeriesScores};
pub use evaluator::Evaluator;
pub use executor::{EvaluationTask, Executor, NJobs};
pub use generation::{InitialTemplate, TemplateSpace};
pub use generational::{GenerationalSearch, SearchSettings, SearchState};
pub use results::{
    EvaluationMetrics, EvaluationResult, ResultKind, ResultRow, ResultStore,
};
pub use runner::{run_template, RunContext};
pub use scorer::{MetricScale, MetricWeighting, Scorer};
pub use selector::{select_best, BestModel};
pub use splits::{generate_splits, ValidationMethod, ValidationSplit};
pub use template::{templates_from_json, templates_to_json, Template, TemplateRecord};
pub use validator::{rank_initial, select_for_validation, ModelsToValidate, Validator};
