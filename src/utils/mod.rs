//! Statistical helpers and forecast accuracy metrics.

pub mod metrics;
pub mod stats;

pub use metrics::{evaluate_series, naive_scale, SeriesEvaluation, SeriesMetrics};
pub use stats::quantile_normal;
