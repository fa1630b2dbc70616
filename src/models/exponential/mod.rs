//! Exponential smoothing models.

mod ets;

pub use ets::{EtsParams, ExponentialSmoothing};
