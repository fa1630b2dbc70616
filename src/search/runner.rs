//! Running a template on a table of series.

use super::template::Template;
use crate::core::{Forecast, Frequency, SeriesSet};
use crate::error::{ForecastError, Result};
use crate::models::{EnsembleKind, EnsembleParams, ModelSpec};
use tracing::trace;

/// Settings shared by every template run of a search.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct RunContext {
    pub forecast_length: usize,
    pub prediction_interval: f64,
    /// Spacing of the future index.
    pub frequency: Frequency,
    /// Floor forecasts at zero.
    pub no_negatives: bool,
}

impl RunContext {
    /// Same settings with a different horizon.
    pub fn with_forecast_length(mut self, forecast_length: usize) -> Self {
        self.forecast_length = forecast_length;
        self
    }
}

/// Forecast `ctx.forecast_length` steps past the end of `data`.
///
/// Each series is transformed, fitted and forecast independently, then the
/// forecast is mapped back through the inverse transformations.
pub fn run_template(template: &Template, data: &SeriesSet, ctx: &RunContext) -> Result<Forecast> {
    if data.is_empty() || data.n_series() == 0 {
        return Err(ForecastError::EmptyData);
    }
    if ctx.forecast_length == 0 {
        return Err(ForecastError::InvalidParameter(
            "forecast_length must be positive".to_string(),
        ));
    }

    let mut forecast = match template.model() {
        ModelSpec::Ensemble(params) => run_ensemble(params, data, ctx)?,
        _ => run_single(template, data, ctx)?,
    };
    if ctx.no_negatives {
        forecast.clip_lower(0.0);
    }
    Ok(forecast)
}

fn run_single(template: &Template, data: &SeriesSet, ctx: &RunContext) -> Result<Forecast> {
    let h = ctx.forecast_length;
    let mut point = Vec::with_capacity(data.n_series());
    let mut lower = Vec::with_capacity(data.n_series());
    let mut upper = Vec::with_capacity(data.n_series());

    for (name, column) in data.names().iter().zip(data.columns()) {
        let (transformed, fitted) = template.transformation().fit_transform(column)?;
        let mut model = template.model().build()?;
        model.fit(&transformed)?;
        let raw = model.predict_with_intervals(h, ctx.prediction_interval)?;
        let restored = fitted.inverse(raw);
        if restored.horizon() != h {
            return Err(ForecastError::DimensionMismatch {
                expected: h,
                got: restored.horizon(),
            });
        }
        if !restored.is_finite() {
            return Err(ForecastError::ComputationError(format!(
                "{} produced non-finite forecasts for series '{name}'",
                template.model_name()
            )));
        }
        trace!(template = %template, series = %name, "series forecast");
        point.push(restored.point);
        lower.push(restored.lower);
        upper.push(restored.upper);
    }

    Forecast::new(
        data.future_timestamps(ctx.frequency, h)?,
        data.names().to_vec(),
        point,
        lower,
        upper,
    )
}

fn run_ensemble(params: &EnsembleParams, data: &SeriesSet, ctx: &RunContext) -> Result<Forecast> {
    params.validate()?;
    match params.model_name {
        EnsembleKind::Horizontal => {
            if let Some(missing) = data.names().iter().find(|n| !params.series.contains_key(*n)) {
                return Err(ForecastError::TemplateEvaluation {
                    template_id: "horizontal ensemble".to_string(),
                    reason: format!("no member assigned to series '{missing}'"),
                });
            }
            let mut parts = Vec::new();
            for (member_id, series) in params.series_by_member() {
                let wanted: Vec<String> = series
                    .into_iter()
                    .filter(|s| data.position(s).is_some())
                    .collect();
                if wanted.is_empty() {
                    continue;
                }
                let member = params.models.get(member_id).ok_or_else(|| {
                    ForecastError::InvalidParameter(format!("unknown member {member_id}"))
                })?;
                parts.push(run_single(member, &data.select(&wanted)?, ctx)?);
            }
            Forecast::stitch(&parts, data.names())
        }
        EnsembleKind::Simple | EnsembleKind::Weighted => {
            let members = params.weighted_members();
            let mut parts = Vec::with_capacity(members.len());
            let mut weights = Vec::with_capacity(members.len());
            for (member, weight) in members {
                parts.push(run_single(member, data, ctx)?);
                weights.push(weight);
            }
            crate::models::ensemble::combine_forecasts(&parts, &weights)
        }
    }
}
