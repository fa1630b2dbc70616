//! Forecasting models.

mod registry;
mod traits;

pub mod baseline;
pub mod ensemble;
pub mod exponential;

pub use ensemble::{EnsembleKind, EnsembleParams};
pub use registry::{ModelName, ModelSpec};
pub use traits::{BoxedForecaster, Forecaster, SeriesForecast};
