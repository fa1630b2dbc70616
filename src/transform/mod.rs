//! Data transformations applied to training series before model fitting.
//!
//! # Example
//!
//! ```
//! use anofox_autoforecast::transform::{FillNa, TransformationParameters, Transformer};
//!
//! let params = TransformationParameters::new(
//!     FillNa::Linear,
//!     vec![Transformer::Detrend, Transformer::StandardScaler],
//! );
//! let series = vec![1.0, f64::NAN, 3.0, 4.0, 5.0];
//! let (transformed, _fitted) = params.fit_transform(&series).unwrap();
//! assert_eq!(transformed.len(), 5);
//! ```

pub mod boxcox;
pub mod fill;
pub mod pipeline;
pub mod scale;
pub mod trend;

pub use boxcox::{boxcox_auto, boxcox_lambda, boxcox_value, inv_boxcox_value, BoxCoxResult};
pub use fill::FillNa;
pub use pipeline::{FittedPipeline, TransformationParameters, Transformer, TransformerKind};
pub use scale::{normalize, positive_shift, robust_scale, standardize, ScaleResult};
pub use trend::{clip_outliers, difference, rolling_mean, Differenced, LinearTrend};
