//! # anofox-autoforecast
//!
//! Automated forecasting model search for tables of aligned time series.
//!
//! A genetic search breeds *templates* (a model, its parameters and a chain
//! of data transformations), scores them on time-respecting holdouts,
//! cross-validates the best, builds per-series and blended ensembles from
//! them, and keeps the winner for forecasting.

#![allow(clippy::too_many_arguments)]
#![allow(clippy::needless_range_loop)]

pub mod auto;
pub mod config;
pub mod core;
pub mod error;
pub mod models;
pub mod search;
pub mod transform;
pub mod utils;

pub use auto::{model_forecast, AutoForecast, ImportMode};
pub use config::AutoForecastConfig;
pub use error::{ForecastError, Result};

pub mod prelude {
    pub use crate::auto::{model_forecast, AutoForecast, ImportMode};
    pub use crate::config::AutoForecastConfig;
    pub use crate::core::{Forecast, Frequency, SeriesSet};
    pub use crate::error::{ForecastError, Result};
    pub use crate::models::{Forecaster, ModelName, ModelSpec};
    pub use crate::search::{
        BestModel, MetricWeighting, ModelsToValidate, NJobs, ResultKind, Template,
        ValidationMethod,
    };
    pub use crate::transform::{FillNa, TransformationParameters, Transformer};
    pub use crate::utils::quantile_normal;
}
