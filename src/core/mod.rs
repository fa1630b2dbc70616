//! Core data structures for time series forecasting.

mod forecast;
mod frequency;
mod series_set;

pub use forecast::Forecast;
pub use frequency::Frequency;
pub use series_set::SeriesSet;
