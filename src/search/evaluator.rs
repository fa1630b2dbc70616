//! Evaluating one template on one validation split.

use super::results::{EvaluationMetrics, EvaluationResult};
use super::runner::{run_template, RunContext};
use super::splits::ValidationSplit;
use super::template::Template;
use crate::core::SeriesSet;
use crate::error::{ForecastError, Result};
use crate::utils::metrics::{evaluate_series, naive_scale, SeriesEvaluation, SeriesMetrics};
use std::collections::BTreeMap;
use std::sync::Arc;
use std::time::Instant;
use tracing::debug;

/// Fits templates on training windows and scores them on test windows.
///
/// Cheap to clone: the history is shared.
#[derive(Debug, Clone)]
pub struct Evaluator {
    data: Arc<SeriesSet>,
    ctx: RunContext,
}

impl Evaluator {
    pub fn new(data: Arc<SeriesSet>, ctx: RunContext) -> Self {
        Self { data, ctx }
    }

    pub fn data(&self) -> &SeriesSet {
        &self.data
    }

    pub fn context(&self) -> &RunContext {
        &self.ctx
    }

    /// Evaluate `template` on `split`. Never fails: errors become a failed row.
    pub fn evaluate(
        &self,
        template: &Template,
        split: &ValidationSplit,
        generation: usize,
    ) -> EvaluationResult {
        let start = Instant::now();
        let outcome = self.try_evaluate(template, split);
        let runtime = start.elapsed();
        let id = template.id().to_string();
        match outcome {
            Ok(metrics) => {
                EvaluationResult::success(id, split.index, generation, metrics, runtime)
            }
            Err(err) => {
                debug!(template = %template, split = split.index, error = %err, "evaluation failed");
                EvaluationResult::failure(id, split.index, generation, err.to_string(), runtime)
            }
        }
    }

    fn try_evaluate(&self, template: &Template, split: &ValidationSplit) -> Result<EvaluationMetrics> {
        let train = self.data.slice(split.train.clone())?;
        let ctx = self.ctx.with_forecast_length(split.forecast_length());
        let forecast = run_template(template, &train, &ctx)?;

        let mut per_series = BTreeMap::new();
        for (i, name) in self.data.names().iter().enumerate() {
            let column = self.data.column(i)?;
            let history = &column[split.train.clone()];
            let actual = &column[split.test.clone()];
            let eval = SeriesEvaluation {
                actual,
                point: &forecast.point()[i],
                lower: &forecast.lower()[i],
                upper: &forecast.upper()[i],
                last_train: history.iter().rev().copied().find(|v| v.is_finite()),
                scale: naive_scale(history),
                prediction_interval: self.ctx.prediction_interval,
            };
            match evaluate_series(&eval) {
                Ok(metrics) => {
                    per_series.insert(name.clone(), metrics);
                }
                // A test window with no observations says nothing about this series
                Err(ForecastError::EmptyData) => {}
                Err(err) => return Err(err),
            }
        }

        let values: Vec<SeriesMetrics> = per_series.values().copied().collect();
        let aggregate = SeriesMetrics::nan_mean(&values);
        if !aggregate.is_finite() {
            return Err(ForecastError::ComputationError(
                "no finite metrics on the test window".to_string(),
            ));
        }
        Ok(EvaluationMetrics {
            aggregate,
            per_series,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::core::Frequency;
    use crate::models::baseline::ConstantNaiveParams;
    use crate::models::ModelSpec;
    use crate::search::splits::{generate_splits, ValidationMethod};
    use crate::transform::TransformationParameters;
    use approx::assert_relative_eq;
    use chrono::{DateTime, Duration, TimeZone, Utc};

    fn make_timestamps(n: usize) -> Vec<DateTime<Utc>> {
        let base = Utc.with_ymd_and_hms(2024, 1, 1, 0, 0, 0).unwrap();
        (0..n).map(|i| base + Duration::days(i as i64)).collect()
    }

    fn evaluator(values: Vec<f64>) -> Evaluator {
        let n = values.len();
        let data = SeriesSet::univariate(make_timestamps(n), "y", values).unwrap();
        Evaluator::new(
            Arc::new(data),
            RunContext {
                forecast_length: 5,
                prediction_interval: 0.9,
                frequency: Frequency::Fixed(Duration::days(1)),
                no_negatives: false,
            },
        )
    }

    #[test]
    fn perfect_forecast_scores_zero_error() {
        let eval = evaluator(vec![4.0; 40]);
        let splits = generate_splits(40, 5, 1, ValidationMethod::Backwards).unwrap();
        let template = Template::new(ModelSpec::LastValueNaive, TransformationParameters::default());
        let row = eval.evaluate(&template, &splits[1], 0);

        assert!(row.is_success());
        assert_eq!(row.split_index, 1);
        let m = row.metrics.unwrap();
        assert_relative_eq!(m.aggregate.mae, 0.0, epsilon = 1e-12);
        assert_relative_eq!(m.aggregate.containment, 1.0, epsilon = 1e-12);
        assert!(m.per_series.contains_key("y"));
    }

    #[test]
    fn model_errors_become_failure_rows() {
        let eval = evaluator((0..40).map(|i| i as f64).collect());
        let splits = generate_splits(40, 5, 0, ValidationMethod::Backwards).unwrap();
        let template = Template::new(
            ModelSpec::AverageValueNaive(crate::models::baseline::AverageValueNaiveParams {
                window: Some(0),
                ..Default::default()
            }),
            TransformationParameters::default(),
        );
        let row = eval.evaluate(&template, &splits[0], 3);
        assert!(!row.is_success());
        assert_eq!(row.generation, 3);
        assert!(row.exception.is_some());
    }

    #[test]
    fn constant_forecast_error_matches_offset() {
        let eval = evaluator(vec![10.0; 30]);
        let splits = generate_splits(30, 5, 0, ValidationMethod::Backwards).unwrap();
        let template = Template::new(
            ModelSpec::ConstantNaive(ConstantNaiveParams { constant: 7.0 }),
            TransformationParameters::default(),
        );
        let m = eval.evaluate(&template, &splits[0], 0).metrics.unwrap();
        assert_relative_eq!(m.aggregate.mae, 3.0, epsilon = 1e-12);
        assert_relative_eq!(m.aggregate.rmse, 3.0, epsilon = 1e-12);
    }

    #[test]
    fn repeated_evaluations_are_identical() {
        let eval = evaluator((0..50).map(|i| 20.0 + ((i * 7) % 11) as f64).collect());
        let splits = generate_splits(50, 5, 1, ValidationMethod::Backwards).unwrap();
        let template = Template::new(
            ModelSpec::Ets(crate::models::exponential::EtsParams::default()),
            TransformationParameters::default(),
        );
        let a = eval.evaluate(&template, &splits[1], 0);
        let b = eval.evaluate(&template, &splits[1], 0);
        assert_eq!(a.metrics, b.metrics);
        assert_eq!(a.exception, b.exception);
    }
}
