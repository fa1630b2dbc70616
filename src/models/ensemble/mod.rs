//! Ensemble templates built from validated member templates.

mod model;

pub use model::{combine_forecasts, EnsembleKind, EnsembleParams};
