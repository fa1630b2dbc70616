//! Missing-value fill strategies applied before any transformer.

use crate::error::{ForecastError, Result};
use crate::utils::stats::{finite_values, mean, median};
use rand::seq::SliceRandom;
use rand::Rng;
use serde::{Deserialize, Serialize};

/// How NaN gaps in a training series are filled.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum FillNa {
    /// Carry the previous observation forward, back-filling a leading gap.
    #[default]
    Ffill,
    Mean,
    Median,
    Zero,
    /// Linear interpolation between neighbours, edges held flat.
    Linear,
}

impl FillNa {
    pub const ALL: [FillNa; 5] = [
        FillNa::Ffill,
        FillNa::Mean,
        FillNa::Median,
        FillNa::Zero,
        FillNa::Linear,
    ];

    /// Forward fill is drawn half the time, the rest uniformly.
    pub fn random<R: Rng + ?Sized>(rng: &mut R) -> FillNa {
        if rng.gen_bool(0.5) {
            FillNa::Ffill
        } else {
            *FillNa::ALL.choose(rng).unwrap_or(&FillNa::Ffill)
        }
    }

    /// Return a copy of `values` with every non-finite entry replaced.
    pub fn fill(&self, values: &[f64]) -> Result<Vec<f64>> {
        let finite = finite_values(values);
        if finite.is_empty() {
            return Err(ForecastError::EmptyData);
        }
        if finite.len() == values.len() {
            return Ok(values.to_vec());
        }

        let filled = match self {
            FillNa::Ffill => forward_fill(values),
            FillNa::Mean => replace_missing(values, mean(&finite)),
            FillNa::Median => replace_missing(values, median(&finite)),
            FillNa::Zero => replace_missing(values, 0.0),
            FillNa::Linear => interpolate(values),
        };
        Ok(filled)
    }
}

fn replace_missing(values: &[f64], fill: f64) -> Vec<f64> {
    values
        .iter()
        .map(|&v| if v.is_finite() { v } else { fill })
        .collect()
}

fn forward_fill(values: &[f64]) -> Vec<f64> {
    let first = values.iter().copied().find(|v| v.is_finite()).unwrap_or(0.0);
    let mut last = first;
    values
        .iter()
        .map(|&v| {
            if v.is_finite() {
                last = v;
            }
            last
        })
        .collect()
}

fn interpolate(values: &[f64]) -> Vec<f64> {
    let known: Vec<usize> = (0..values.len()).filter(|&i| values[i].is_finite()).collect();
    let mut out = values.to_vec();
    let (Some(&first), Some(&last)) = (known.first(), known.last()) else {
        return out;
    };

    for v in out.iter_mut().take(first) {
        *v = values[first];
    }
    for v in out.iter_mut().skip(last + 1) {
        *v = values[last];
    }
    for pair in known.windows(2) {
        let (a, b) = (pair[0], pair[1]);
        let step = (values[b] - values[a]) / (b - a) as f64;
        for i in a + 1..b {
            out[i] = values[a] + step * (i - a) as f64;
        }
    }
    out
}

#[cfg(test)]
mod tests {
    use super::*;
    use approx::assert_relative_eq;
    use rand::rngs::StdRng;
    use rand::SeedableRng;

    const GAPPY: [f64; 5] = [f64::NAN, 1.0, f64::NAN, 3.0, f64::NAN];

    #[test]
    fn ffill_backfills_leading_gap() {
        assert_eq!(FillNa::Ffill.fill(&GAPPY).unwrap(), vec![1.0, 1.0, 1.0, 3.0, 3.0]);
    }

    #[test]
    fn linear_interpolates_interior() {
        let filled = FillNa::Linear.fill(&GAPPY).unwrap();
        assert_relative_eq!(filled[2], 2.0, epsilon = 1e-12);
        assert_relative_eq!(filled[0], 1.0, epsilon = 1e-12);
        assert_relative_eq!(filled[4], 3.0, epsilon = 1e-12);
    }

    #[test]
    fn constant_fills() {
        assert_eq!(FillNa::Zero.fill(&GAPPY).unwrap()[0], 0.0);
        assert_eq!(FillNa::Mean.fill(&GAPPY).unwrap()[2], 2.0);
        assert_eq!(FillNa::Median.fill(&GAPPY).unwrap()[4], 2.0);
    }

    #[test]
    fn all_missing_is_an_error() {
        assert!(FillNa::Mean.fill(&[f64::NAN, f64::NAN]).is_err());
    }

    #[test]
    fn serializes_snake_case() {
        assert_eq!(serde_json::to_string(&FillNa::Ffill).unwrap(), "\"ffill\"");
        let parsed: FillNa = serde_json::from_str("\"linear\"").unwrap();
        assert_eq!(parsed, FillNa::Linear);
    }

    #[test]
    fn random_draws_are_valid() {
        let mut rng = StdRng::seed_from_u64(7);
        for _ in 0..20 {
            assert!(FillNa::ALL.contains(&FillNa::random(&mut rng)));
        }
    }
}
