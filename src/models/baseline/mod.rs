//! Baseline forecasting models.

mod average;
mod drift;
mod naive;
mod seasonal_naive;

pub use average::{AverageMethod, AverageValueNaive, AverageValueNaiveParams};
pub use drift::DriftNaive;
pub use naive::{ConstantNaive, ConstantNaiveParams, LastValueNaive};
pub use seasonal_naive::{SeasonalMethod, SeasonalNaive, SeasonalNaiveParams};
