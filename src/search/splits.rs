//! Time-respecting train/test layouts for validation.
//!
//! Split 0 always holds out the final `forecast_length` observations. The
//! additional splits are placed further back in time according to the
//! [`ValidationMethod`]. Every training window starts at the first
//! observation and ends right before its test window.

use crate::core::SeriesSet;
use crate::error::{ForecastError, Result};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::fmt;
use std::ops::Range;
use std::str::FromStr;
use tracing::warn;

/// Placement of validation windows before the final holdout.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(try_from = "String", into = "String")]
pub enum ValidationMethod {
    /// Windows stacked back to back from the end.
    #[default]
    Backwards,
    /// Training cut-offs spread evenly through the history.
    Even,
    /// Windows spaced one seasonal period apart, ending at the final holdout.
    Seasonal(usize),
}

impl fmt::Display for ValidationMethod {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ValidationMethod::Backwards => f.write_str("backwards"),
            ValidationMethod::Even => f.write_str("even"),
            ValidationMethod::Seasonal(period) => write!(f, "seasonal {period}"),
        }
    }
}

impl FromStr for ValidationMethod {
    type Err = ForecastError;

    fn from_str(s: &str) -> Result<Self> {
        let lowered = s.trim().to_lowercase();
        match lowered.as_str() {
            "backwards" | "backward" => Ok(ValidationMethod::Backwards),
            "even" => Ok(ValidationMethod::Even),
            other => {
                let period = other
                    .strip_prefix("seasonal")
                    .map(str::trim)
                    .and_then(|p| p.parse::<usize>().ok())
                    .filter(|&p| p > 0)
                    .ok_or_else(|| {
                        ForecastError::InvalidParameter(format!(
                            "unknown validation method '{s}', expected backwards, even or 'seasonal N'"
                        ))
                    })?;
                Ok(ValidationMethod::Seasonal(period))
            }
        }
    }
}

impl TryFrom<String> for ValidationMethod {
    type Error = ForecastError;

    fn try_from(value: String) -> Result<Self> {
        value.parse()
    }
}

impl From<ValidationMethod> for String {
    fn from(method: ValidationMethod) -> Self {
        method.to_string()
    }
}

/// One train/test layout, as positions into the (trimmed) history.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ValidationSplit {
    pub index: usize,
    pub train: Range<usize>,
    pub test: Range<usize>,
}

impl ValidationSplit {
    /// Timestamps of the training window.
    pub fn train_index<'a>(&self, data: &'a SeriesSet) -> &'a [DateTime<Utc>] {
        &data.timestamps()[self.train.clone()]
    }

    /// Timestamps of the test window.
    pub fn test_index<'a>(&self, data: &'a SeriesSet) -> &'a [DateTime<Utc>] {
        &data.timestamps()[self.test.clone()]
    }

    pub fn forecast_length(&self) -> usize {
        self.test.len()
    }
}

/// Lay out `num_validations + 1` splits over `n_obs` observations.
///
/// When the history is too short, the number of validations is reduced
/// (with a warning) until the layout fits. Fails only when even the single
/// final holdout cannot leave a non-empty training window.
pub fn generate_splits(
    n_obs: usize,
    forecast_length: usize,
    num_validations: usize,
    method: ValidationMethod,
) -> Result<Vec<ValidationSplit>> {
    if forecast_length == 0 {
        return Err(ForecastError::InvalidParameter(
            "forecast_length must be positive".to_string(),
        ));
    }

    let mut k = num_validations;
    loop {
        match layout(n_obs, forecast_length, k, method) {
            Some(splits) => {
                if k < num_validations {
                    warn!(
                        requested = num_validations,
                        used = k,
                        n_obs,
                        forecast_length,
                        %method,
                        "history too short for requested validations, reducing"
                    );
                }
                return Ok(splits);
            }
            None if k > 0 => k -= 1,
            None => {
                return Err(ForecastError::InsufficientHistory {
                    available: n_obs,
                    forecast_length,
                    num_validations,
                })
            }
        }
    }
}

/// Test-window start of each split, or None if the layout is infeasible.
fn layout(
    n: usize,
    fl: usize,
    k: usize,
    method: ValidationMethod,
) -> Option<Vec<ValidationSplit>> {
    let last_start = n.checked_sub(fl)?;
    let starts: Vec<usize> = match method {
        ValidationMethod::Backwards => (0..=k)
            .map(|i| n.checked_sub((i + 1) * fl))
            .collect::<Option<Vec<_>>>()?,
        ValidationMethod::Even => (0..=k)
            .map(|i| last_start * (k + 1 - i) / (k + 1))
            .collect(),
        ValidationMethod::Seasonal(period) => (0..=k)
            .map(|i| last_start.checked_sub(i * period))
            .collect::<Option<Vec<_>>>()?,
    };

    // Every train window non-empty, test windows disjoint and moving back in time
    for (i, &start) in starts.iter().enumerate() {
        if start == 0 {
            return None;
        }
        if i > 0 && start + fl > starts[i - 1] {
            return None;
        }
    }

    Some(
        starts
            .into_iter()
            .enumerate()
            .map(|(index, start)| ValidationSplit {
                index,
                train: 0..start,
                test: start..start + fl,
            })
            .collect(),
    )
}
