//! Parallel dispatch of evaluation batches.
//!
//! A batch is the unit between two barriers: `run_batch` returns only once
//! every task in it has produced a row, in task order.

use super::evaluator::Evaluator;
use super::results::EvaluationResult;
use super::splits::ValidationSplit;
use super::template::Template;
use crate::error::{ForecastError, Result};
use crossbeam::channel::{bounded, RecvTimeoutError};
use rayon::prelude::*;
use serde::{Deserialize, Serialize};
use std::any::Any;
use std::panic::{self, AssertUnwindSafe};
use std::thread;
use std::time::{Duration, Instant};
use tracing::warn;

/// Worker count of the evaluation pool.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(try_from = "NJobsRepr", into = "NJobsRepr")]
pub enum NJobs {
    /// One worker per available core.
    #[default]
    Auto,
    Fixed(usize),
}

#[derive(Serialize, Deserialize)]
#[serde(untagged)]
enum NJobsRepr {
    Count(usize),
    Name(String),
}

impl TryFrom<NJobsRepr> for NJobs {
    type Error = ForecastError;

    fn try_from(repr: NJobsRepr) -> Result<Self> {
        match repr {
            NJobsRepr::Count(0) => Err(ForecastError::InvalidParameter(
                "n_jobs must be positive".to_string(),
            )),
            NJobsRepr::Count(n) => Ok(NJobs::Fixed(n)),
            NJobsRepr::Name(name) if name.eq_ignore_ascii_case("auto") => Ok(NJobs::Auto),
            NJobsRepr::Name(name) => Err(ForecastError::InvalidParameter(format!(
                "n_jobs must be 'auto' or a count, got '{name}'"
            ))),
        }
    }
}

impl From<NJobs> for NJobsRepr {
    fn from(jobs: NJobs) -> Self {
        match jobs {
            NJobs::Auto => NJobsRepr::Name("auto".to_string()),
            NJobs::Fixed(n) => NJobsRepr::Count(n),
        }
    }
}

impl NJobs {
    pub fn resolve(&self) -> usize {
        match self {
            NJobs::Auto => thread::available_parallelism()
                .map(|n| n.get())
                .unwrap_or(1),
            NJobs::Fixed(n) => (*n).max(1),
        }
    }
}

/// One (template, split) evaluation to dispatch.
#[derive(Debug, Clone)]
pub struct EvaluationTask {
    pub template: Template,
    pub split: ValidationSplit,
    pub generation: usize,
}

/// Worker pool running evaluation batches.
pub struct Executor {
    pool: rayon::ThreadPool,
    workers: usize,
    timeout: Option<Duration>,
}

impl Executor {
    /// Build a pool of `n_jobs` workers. `timeout` bounds each evaluation
    /// when set.
    ///
    /// A timed evaluation runs on its own thread. Threads cannot be
    /// cancelled, so an evaluation that exceeds `timeout` is detached rather
    /// than stopped: it keeps using a core until the model returns, and its
    /// row is discarded. Pick a timeout well above typical fit times when the
    /// pool is small.
    pub fn new(n_jobs: NJobs, timeout: Option<Duration>) -> Result<Self> {
        let workers = n_jobs.resolve();
        let pool = rayon::ThreadPoolBuilder::new()
            .num_threads(workers)
            .thread_name(|i| format!("autoforecast-eval-{i}"))
            .build()
            .map_err(|e| ForecastError::ComputationError(format!("thread pool: {e}")))?;
        Ok(Self {
            pool,
            workers,
            timeout,
        })
    }

    pub fn workers(&self) -> usize {
        self.workers
    }

    pub fn timeout(&self) -> Option<Duration> {
        self.timeout
    }

    /// Evaluate every task and return one row per task, in task order.
    ///
    /// A panicking evaluation becomes a failed row; the rest of the batch
    /// still runs.
    pub fn run_batch(&self, evaluator: &Evaluator, tasks: &[EvaluationTask]) -> Vec<EvaluationResult> {
        self.pool.install(|| {
            tasks
                .par_iter()
                .map(|task| match self.timeout {
                    Some(limit) => {
                        let worker_eval = evaluator.clone();
                        let worker_task = task.clone();
                        run_with_timeout(task, limit, move || {
                            worker_eval.evaluate(
                                &worker_task.template,
                                &worker_task.split,
                                worker_task.generation,
                            )
                        })
                    }
                    None => run_guarded(task, || {
                        evaluator.evaluate(&task.template, &task.split, task.generation)
                    }),
                })
                .collect()
        })
    }
}

impl std::fmt::Debug for Executor {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Executor")
            .field("workers", &self.workers)
            .field("timeout", &self.timeout)
            .finish()
    }
}

fn failed(task: &EvaluationTask, reason: String, elapsed: Duration) -> EvaluationResult {
    EvaluationResult::failure(
        task.template.id().to_string(),
        task.split.index,
        task.generation,
        reason,
        elapsed,
    )
}

fn panic_message(payload: &(dyn Any + Send)) -> &str {
    if let Some(msg) = payload.downcast_ref::<&str>() {
        msg
    } else if let Some(msg) = payload.downcast_ref::<String>() {
        msg
    } else {
        "unknown panic payload"
    }
}

/// Run `run` and turn a panic into a failed row for `task`.
fn run_guarded<F>(task: &EvaluationTask, run: F) -> EvaluationResult
where
    F: FnOnce() -> EvaluationResult,
{
    let start = Instant::now();
    match panic::catch_unwind(AssertUnwindSafe(run)) {
        Ok(row) => row,
        Err(payload) => {
            let reason = panic_message(payload.as_ref());
            warn!(template = %task.template, split = task.split.index, reason, "evaluation panicked");
            failed(task, format!("evaluation panicked: {reason}"), start.elapsed())
        }
    }
}

/// Run one evaluation on its own thread and give up after `limit`.
///
/// An abandoned evaluation keeps running detached; its result is dropped.
fn run_with_timeout<F>(task: &EvaluationTask, limit: Duration, run: F) -> EvaluationResult
where
    F: FnOnce() -> EvaluationResult + Send + 'static,
{
    let (tx, rx) = bounded(1);
    let worker_task = task.clone();
    let start = Instant::now();

    let spawned = thread::Builder::new()
        .name("autoforecast-timed-eval".to_string())
        .spawn(move || {
            let row = run_guarded(&worker_task, run);
            // Receiver may be gone after a timeout
            let _ = tx.send(row);
        });
    if let Err(e) = spawned {
        return failed(task, format!("could not start evaluation: {e}"), start.elapsed());
    }

    match rx.recv_timeout(limit) {
        Ok(row) => row,
        Err(RecvTimeoutError::Timeout) => {
            warn!(template = %task.template, split = task.split.index, ?limit, "evaluation timed out");
            failed(
                task,
                format!("evaluation exceeded {:.1}s", limit.as_secs_f64()),
                start.elapsed(),
            )
        }
        Err(RecvTimeoutError::Disconnected) => failed(
            task,
            "evaluation thread exited without a result".to_string(),
            start.elapsed(),
        ),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::core::{Frequency, SeriesSet};
    use crate::models::ModelSpec;
    use crate::search::runner::RunContext;
    use crate::search::splits::{generate_splits, ValidationMethod};
    use crate::transform::TransformationParameters;
    use chrono::{TimeZone, Utc};
    use std::sync::Arc;

    fn evaluator() -> Evaluator {
        let base = Utc.with_ymd_and_hms(2024, 1, 1, 0, 0, 0).unwrap();
        let ts = (0..40).map(|i| base + chrono::Duration::days(i)).collect();
        let values = (0..40).map(|i| (i as f64 * 0.3).sin() + 5.0).collect();
        let data = SeriesSet::univariate(ts, "y", values).unwrap();
        Evaluator::new(
            Arc::new(data),
            RunContext {
                forecast_length: 4,
                prediction_interval: 0.9,
                frequency: Frequency::Fixed(chrono::Duration::days(1)),
                no_negatives: false,
            },
        )
    }

    fn tasks() -> Vec<EvaluationTask> {
        let splits = generate_splits(40, 4, 1, ValidationMethod::Backwards).unwrap();
        [ModelSpec::LastValueNaive, ModelSpec::DriftNaive]
            .into_iter()
            .flat_map(|spec| {
                let template = Template::new(spec, TransformationParameters::default());
                splits.iter().map(move |split| EvaluationTask {
                    template: template.clone(),
                    split: split.clone(),
                    generation: 0,
                })
            })
            .collect()
    }

    #[test]
    fn batch_preserves_task_order() {
        let executor = Executor::new(NJobs::Fixed(2), None).unwrap();
        let tasks = tasks();
        let rows = executor.run_batch(&evaluator(), &tasks);
        assert_eq!(rows.len(), tasks.len());
        for (row, task) in rows.iter().zip(&tasks) {
            assert_eq!(row.template_id, task.template.id());
            assert_eq!(row.split_index, task.split.index);
            assert!(row.is_success());
        }
    }

    #[test]
    fn timed_batch_matches_untimed() {
        let tasks = tasks();
        let plain = Executor::new(NJobs::Fixed(1), None).unwrap();
        let timed = Executor::new(NJobs::Fixed(1), Some(Duration::from_secs(30))).unwrap();
        let a = plain.run_batch(&evaluator(), &tasks);
        let b = timed.run_batch(&evaluator(), &tasks);
        let metrics = |rows: &[EvaluationResult]| -> Vec<_> {
            rows.iter().map(|r| r.metrics.clone()).collect()
        };
        assert_eq!(metrics(&a), metrics(&b));
    }

    #[test]
    fn panicking_evaluation_becomes_failure_row() {
        let evaluator = evaluator();
        let tasks = tasks();
        let rows: Vec<EvaluationResult> = tasks
            .iter()
            .enumerate()
            .map(|(i, task)| {
                run_guarded(task, || {
                    if i == 1 {
                        panic!("singular design matrix");
                    }
                    evaluator.evaluate(&task.template, &task.split, task.generation)
                })
            })
            .collect();

        assert_eq!(rows.len(), tasks.len());
        let exception = rows[1].exception.as_deref().unwrap();
        assert_eq!(exception, "evaluation panicked: singular design matrix");
        assert_eq!(rows[1].template_id, tasks[1].template.id());
        assert_eq!(rows[1].split_index, tasks[1].split.index);
        assert!(rows.iter().enumerate().all(|(i, r)| i == 1 || r.is_success()));
    }

    #[test]
    fn panicking_timed_evaluation_becomes_failure_row() {
        let task = tasks().remove(0);
        let row = run_with_timeout(&task, Duration::from_secs(30), || {
            panic!("{} exploded", "kernel")
        });
        assert!(!row.is_success());
        assert_eq!(row.exception.as_deref(), Some("evaluation panicked: kernel exploded"));
        assert_eq!(row.template_id, task.template.id());
    }

    #[test]
    fn slow_evaluation_times_out() {
        let task = tasks().remove(0);
        let evaluator = evaluator();
        let worker_task = task.clone();
        let row = run_with_timeout(&task, Duration::from_millis(20), move || {
            thread::sleep(Duration::from_millis(500));
            evaluator.evaluate(&worker_task.template, &worker_task.split, 0)
        });
        assert!(!row.is_success());
        assert!(row.exception.unwrap().contains("exceeded"));
    }

    #[test]
    fn expired_timeout_fails_every_row_in_order() {
        let tasks = tasks();
        let executor = Executor::new(NJobs::Fixed(2), Some(Duration::from_nanos(1))).unwrap();
        let rows = executor.run_batch(&evaluator(), &tasks);
        assert_eq!(rows.len(), tasks.len());
        for (row, task) in rows.iter().zip(&tasks) {
            assert_eq!(row.template_id, task.template.id());
            assert_eq!(row.split_index, task.split.index);
            assert!(!row.is_success());
            assert_eq!(row.exception.as_deref(), Some("evaluation exceeded 0.0s"));
            assert!(row.metrics.is_none());
        }
    }

    #[test]
    fn n_jobs_serde() {
        let auto: NJobs = serde_json::from_str("\"auto\"").unwrap();
        assert_eq!(auto, NJobs::Auto);
        let fixed: NJobs = serde_json::from_str("4").unwrap();
        assert_eq!(fixed, NJobs::Fixed(4));
        assert!(serde_json::from_str::<NJobs>("0").is_err());
        assert!(serde_json::from_str::<NJobs>("\"many\"").is_err());
        assert_eq!(serde_json::to_string(&NJobs::Fixed(3)).unwrap(), "3");
        assert!(NJobs::Auto.resolve() >= 1);
    }
}
