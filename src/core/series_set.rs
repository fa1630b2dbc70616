//! Wide, time-indexed table of numeric series.

use super::frequency::Frequency;
use crate::error::{ForecastError, Result};
use chrono::{DateTime, Utc};
use std::collections::{HashMap, HashSet};
use std::ops::Range;

/// A set of aligned series sharing one strictly increasing time index.
///
/// Values are stored column-major: `columns[series][observation]`. Missing
/// observations are represented as NaN.
#[derive(Debug, Clone, PartialEq)]
pub struct SeriesSet {
    timestamps: Vec<DateTime<Utc>>,
    columns: Vec<Vec<f64>>,
    names: Vec<String>,
}

impl SeriesSet {
    /// Create a series set from named columns.
    pub fn new(
        timestamps: Vec<DateTime<Utc>>,
        names: Vec<String>,
        columns: Vec<Vec<f64>>,
    ) -> Result<Self> {
        for i in 1..timestamps.len() {
            if timestamps[i] <= timestamps[i - 1] {
                return Err(ForecastError::TimestampError(
                    "timestamps must be strictly increasing".to_string(),
                ));
            }
        }

        if names.len() != columns.len() {
            return Err(ForecastError::DimensionMismatch {
                expected: columns.len(),
                got: names.len(),
            });
        }

        for column in &columns {
            if column.len() != timestamps.len() {
                return Err(ForecastError::DimensionMismatch {
                    expected: timestamps.len(),
                    got: column.len(),
                });
            }
        }

        let mut seen = HashSet::with_capacity(names.len());
        for name in &names {
            if !seen.insert(name.as_str()) {
                return Err(ForecastError::InvalidParameter(format!(
                    "duplicate series name '{name}'"
                )));
            }
        }

        Ok(Self {
            timestamps,
            columns,
            names,
        })
    }

    /// Create a single-series set.
    pub fn univariate(
        timestamps: Vec<DateTime<Utc>>,
        name: impl Into<String>,
        values: Vec<f64>,
    ) -> Result<Self> {
        Self::new(timestamps, vec![name.into()], vec![values])
    }

    /// Number of observations.
    pub fn len(&self) -> usize {
        self.timestamps.len()
    }

    pub fn is_empty(&self) -> bool {
        self.timestamps.is_empty()
    }

    /// Number of series.
    pub fn n_series(&self) -> usize {
        self.columns.len()
    }

    pub fn timestamps(&self) -> &[DateTime<Utc>] {
        &self.timestamps
    }

    pub fn names(&self) -> &[String] {
        &self.names
    }

    pub fn columns(&self) -> &[Vec<f64>] {
        &self.columns
    }

    /// Values of one series by position.
    pub fn column(&self, index: usize) -> Result<&[f64]> {
        self.columns
            .get(index)
            .map(|c| c.as_slice())
            .ok_or(ForecastError::DimensionMismatch {
                expected: self.columns.len(),
                got: index + 1,
            })
    }

    /// Values of one series by name.
    pub fn column_by_name(&self, name: &str) -> Option<&[f64]> {
        self.position(name).map(|i| self.columns[i].as_slice())
    }

    pub fn position(&self, name: &str) -> Option<usize> {
        self.names.iter().position(|n| n == name)
    }

    /// Rows `range.start..range.end` of every series.
    pub fn slice(&self, range: Range<usize>) -> Result<SeriesSet> {
        if range.start > range.end {
            return Err(ForecastError::InvalidParameter(
                "start must be <= end".to_string(),
            ));
        }
        if range.end > self.len() {
            return Err(ForecastError::InsufficientData {
                needed: range.end,
                got: self.len(),
            });
        }

        Ok(SeriesSet {
            timestamps: self.timestamps[range.clone()].to_vec(),
            columns: self
                .columns
                .iter()
                .map(|c| c[range.clone()].to_vec())
                .collect(),
            names: self.names.clone(),
        })
    }

    /// Remove the `n` most recent observations.
    pub fn drop_most_recent(&self, n: usize) -> Result<SeriesSet> {
        if n >= self.len() {
            return Err(ForecastError::InsufficientData {
                needed: n + 1,
                got: self.len(),
            });
        }
        self.slice(0..self.len() - n)
    }

    /// Subset of series, in the order given.
    pub fn select(&self, names: &[String]) -> Result<SeriesSet> {
        let columns = names
            .iter()
            .map(|name| {
                self.column_by_name(name).map(|c| c.to_vec()).ok_or_else(|| {
                    ForecastError::InvalidParameter(format!("unknown series '{name}'"))
                })
            })
            .collect::<Result<Vec<_>>>()?;

        SeriesSet::new(self.timestamps.clone(), names.to_vec(), columns)
    }

    /// Same index with every series read back to front.
    ///
    /// Used to forecast "into the past" from a later window.
    pub fn with_reversed_values(&self) -> SeriesSet {
        SeriesSet {
            timestamps: self.timestamps.clone(),
            columns: self
                .columns
                .iter()
                .map(|c| c.iter().rev().copied().collect())
                .collect(),
            names: self.names.clone(),
        }
    }

    /// Check if any series has missing values (NaN or Inf).
    pub fn has_missing_values(&self) -> bool {
        self.columns
            .iter()
            .any(|c| c.iter().any(|v| !v.is_finite()))
    }

    /// Infer frequency as the modal spacing of the index.
    ///
    /// Calendar-aligned month steps take precedence, since their spacing in
    /// seconds varies with month length.
    pub fn infer_frequency(&self, tolerance: f64) -> Result<Frequency> {
        if self.len() < 2 {
            return Err(ForecastError::InsufficientData {
                needed: 2,
                got: self.len(),
            });
        }

        if let Some(months) = Frequency::infer_months(&self.timestamps, tolerance) {
            return Ok(months);
        }

        let mut counts: HashMap<i64, usize> = HashMap::new();
        for w in self.timestamps.windows(2) {
            *counts.entry((w[1] - w[0]).num_seconds()).or_insert(0) += 1;
        }

        // Ties resolve to the smaller spacing so the result does not depend on hash order
        let (modal_diff, modal_count) = counts
            .iter()
            .max_by(|a, b| a.1.cmp(b.1).then(b.0.cmp(a.0)))
            .map(|(&diff, &count)| (diff, count))
            .ok_or(ForecastError::FrequencyInference(
                "empty spacing data".to_string(),
            ))?;

        let total_count: usize = counts.values().sum();
        if (modal_count as f64 / total_count as f64) < tolerance {
            return Err(ForecastError::FrequencyInference(
                "no unique modal spacing found".to_string(),
            ));
        }

        Ok(Frequency::seconds(modal_diff))
    }

    /// `horizon` timestamps continuing the index at `frequency`.
    pub fn future_timestamps(
        &self,
        frequency: Frequency,
        horizon: usize,
    ) -> Result<Vec<DateTime<Utc>>> {
        let start = match self.timestamps.last() {
            Some(&last) => last,
            None => return Ok(Vec::new()),
        };
        (1..=horizon)
            .map(|h| {
                let steps = u32::try_from(h).map_err(|_| {
                    ForecastError::InvalidParameter(format!("horizon {horizon} is too long"))
                })?;
                frequency.advance(start, steps)
            })
            .collect()
    }
}
