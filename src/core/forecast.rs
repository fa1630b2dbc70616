//! Forecast result structure for holding predictions.

use crate::error::{ForecastError, Result};
use chrono::{DateTime, Utc};
use serde::Serialize;

/// Point forecast and prediction interval for every series of a table.
///
/// All three matrices are column-major: `point[series][step]`.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct Forecast {
    timestamps: Vec<DateTime<Utc>>,
    names: Vec<String>,
    point: Vec<Vec<f64>>,
    lower: Vec<Vec<f64>>,
    upper: Vec<Vec<f64>>,
}

impl Forecast {
    /// Create a forecast, validating that every matrix matches the index.
    pub fn new(
        timestamps: Vec<DateTime<Utc>>,
        names: Vec<String>,
        point: Vec<Vec<f64>>,
        lower: Vec<Vec<f64>>,
        upper: Vec<Vec<f64>>,
    ) -> Result<Self> {
        for matrix in [&point, &lower, &upper] {
            if matrix.len() != names.len() {
                return Err(ForecastError::DimensionMismatch {
                    expected: names.len(),
                    got: matrix.len(),
                });
            }
            for series in matrix {
                if series.len() != timestamps.len() {
                    return Err(ForecastError::DimensionMismatch {
                        expected: timestamps.len(),
                        got: series.len(),
                    });
                }
            }
        }

        Ok(Self {
            timestamps,
            names,
            point,
            lower,
            upper,
        })
    }

    /// Get the forecast horizon (number of steps).
    pub fn horizon(&self) -> usize {
        self.timestamps.len()
    }

    pub fn n_series(&self) -> usize {
        self.names.len()
    }

    /// `(horizon, n_series)`, i.e. the shape of the wide table.
    pub fn shape(&self) -> (usize, usize) {
        (self.horizon(), self.n_series())
    }

    pub fn timestamps(&self) -> &[DateTime<Utc>] {
        &self.timestamps
    }

    pub fn names(&self) -> &[String] {
        &self.names
    }

    pub fn point(&self) -> &[Vec<f64>] {
        &self.point
    }

    pub fn lower(&self) -> &[Vec<f64>] {
        &self.lower
    }

    pub fn upper(&self) -> &[Vec<f64>] {
        &self.upper
    }

    /// Point, lower and upper of one series.
    pub fn series(&self, name: &str) -> Option<(&[f64], &[f64], &[f64])> {
        let i = self.names.iter().position(|n| n == name)?;
        Some((&self.point[i], &self.lower[i], &self.upper[i]))
    }

    /// Check if any value in point or bounds is NaN or infinite.
    pub fn has_missing_values(&self) -> bool {
        [&self.point, &self.lower, &self.upper]
            .iter()
            .any(|m| m.iter().any(|s| s.iter().any(|v| !v.is_finite())))
    }

    /// Floor every value at `bound`.
    pub fn clip_lower(&mut self, bound: f64) {
        for matrix in [&mut self.point, &mut self.lower, &mut self.upper] {
            for series in matrix.iter_mut() {
                for v in series.iter_mut() {
                    if *v < bound {
                        *v = bound;
                    }
                }
            }
        }
    }

    /// Replace the time index, keeping values.
    pub fn with_timestamps(mut self, timestamps: Vec<DateTime<Utc>>) -> Result<Self> {
        if timestamps.len() != self.horizon() {
            return Err(ForecastError::DimensionMismatch {
                expected: self.horizon(),
                got: timestamps.len(),
            });
        }
        self.timestamps = timestamps;
        Ok(self)
    }

    /// Same index with every series' steps in reverse order.
    pub fn reversed(&self) -> Forecast {
        let flip = |m: &[Vec<f64>]| -> Vec<Vec<f64>> {
            m.iter().map(|s| s.iter().rev().copied().collect()).collect()
        };
        Forecast {
            timestamps: self.timestamps.clone(),
            names: self.names.clone(),
            point: flip(&self.point),
            lower: flip(&self.lower),
            upper: flip(&self.upper),
        }
    }

    /// Assemble a forecast from parts covering disjoint series, ordered by `names`.
    ///
    /// Every name must appear in exactly one part and all parts must share
    /// the same index.
    pub fn stitch(parts: &[Forecast], names: &[String]) -> Result<Forecast> {
        let first = parts.first().ok_or(ForecastError::EmptyData)?;
        for part in parts {
            if part.timestamps != first.timestamps {
                return Err(ForecastError::TimestampError(
                    "stitched forecasts must share one index".to_string(),
                ));
            }
        }

        let mut point = Vec::with_capacity(names.len());
        let mut lower = Vec::with_capacity(names.len());
        let mut upper = Vec::with_capacity(names.len());
        for name in names {
            let mut hits = parts.iter().filter_map(|p| p.series(name));
            let (p, l, u) = hits.next().ok_or_else(|| {
                ForecastError::InvalidParameter(format!("no forecast for series '{name}'"))
            })?;
            if hits.next().is_some() {
                return Err(ForecastError::InvalidParameter(format!(
                    "series '{name}' forecast more than once"
                )));
            }
            point.push(p.to_vec());
            lower.push(l.to_vec());
            upper.push(u.to_vec());
        }

        Forecast::new(first.timestamps.clone(), names.to_vec(), point, lower, upper)
    }

    /// Join forecasts over consecutive index windows into one longer forecast.
    pub fn concat(parts: &[Forecast]) -> Result<Forecast> {
        let first = parts.first().ok_or(ForecastError::EmptyData)?;
        let n = first.n_series();
        let mut timestamps = Vec::new();
        let mut point = vec![Vec::new(); n];
        let mut lower = vec![Vec::new(); n];
        let mut upper = vec![Vec::new(); n];

        for part in parts {
            if part.names != first.names {
                return Err(ForecastError::InvalidParameter(
                    "concatenated forecasts must cover the same series".to_string(),
                ));
            }
            timestamps.extend_from_slice(&part.timestamps);
            for i in 0..n {
                point[i].extend_from_slice(&part.point[i]);
                lower[i].extend_from_slice(&part.lower[i]);
                upper[i].extend_from_slice(&part.upper[i]);
            }
        }

        Forecast::new(timestamps, first.names.clone(), point, lower, upper)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::{Duration, TimeZone};

    fn make_timestamps(n: usize) -> Vec<DateTime<Utc>> {
        let base = Utc.with_ymd_and_hms(2024, 1, 1, 0, 0, 0).unwrap();
        (0..n).map(|i| base + Duration::days(i as i64)).collect()
    }

    fn single(name: &str, value: f64, horizon: usize) -> Forecast {
        Forecast::new(
            make_timestamps(horizon),
            vec![name.to_string()],
            vec![vec![value; horizon]],
            vec![vec![value - 1.0; horizon]],
            vec![vec![value + 1.0; horizon]],
        )
        .unwrap()
    }

    #[test]
    fn rejects_mismatched_shapes() {
        let result = Forecast::new(
            make_timestamps(2),
            vec!["a".to_string()],
            vec![vec![1.0, 2.0]],
            vec![vec![1.0]],
            vec![vec![1.0, 2.0]],
        );
        assert!(matches!(
            result,
            Err(ForecastError::DimensionMismatch { .. })
        ));
    }

    #[test]
    fn stitch_orders_by_requested_names() {
        let parts = vec![single("b", 2.0, 3), single("a", 1.0, 3)];
        let names = vec!["a".to_string(), "b".to_string()];
        let stitched = Forecast::stitch(&parts, &names).unwrap();

        assert_eq!(stitched.shape(), (3, 2));
        assert_eq!(stitched.point()[0], vec![1.0; 3]);
        assert_eq!(stitched.upper()[1], vec![3.0; 3]);
    }

    #[test]
    fn stitch_requires_full_coverage() {
        let parts = vec![single("a", 1.0, 2)];
        let names = vec!["a".to_string(), "b".to_string()];
        assert!(Forecast::stitch(&parts, &names).is_err());
    }

    #[test]
    fn clip_lower_floors_all_matrices() {
        let mut fc = single("a", 0.5, 2);
        fc.clip_lower(0.0);
        assert_eq!(fc.lower()[0], vec![0.0, 0.0]);
        assert_eq!(fc.point()[0], vec![0.5, 0.5]);
        assert!(!fc.has_missing_values());
    }

    #[test]
    fn reversed_flips_steps_only() {
        let fc = Forecast::new(
            make_timestamps(3),
            vec!["a".to_string()],
            vec![vec![1.0, 2.0, 3.0]],
            vec![vec![0.0, 1.0, 2.0]],
            vec![vec![2.0, 3.0, 4.0]],
        )
        .unwrap();
        let rev = fc.reversed();
        assert_eq!(rev.timestamps(), fc.timestamps());
        assert_eq!(rev.point()[0], vec![3.0, 2.0, 1.0]);
        assert_eq!(rev.lower()[0], vec![2.0, 1.0, 0.0]);
    }

    #[test]
    fn concat_appends_steps() {
        let joined = Forecast::concat(&[single("a", 1.0, 2), single("a", 2.0, 3)]).unwrap();
        assert_eq!(joined.horizon(), 5);
        assert_eq!(joined.point()[0], vec![1.0, 1.0, 2.0, 2.0, 2.0]);
    }
}
