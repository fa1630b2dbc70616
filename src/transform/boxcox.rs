//! Box-Cox power transformation.
//!
//! Transforms data to be more normally distributed.

use super::scale::positive_shift;

/// Result of Box-Cox transformation.
#[derive(Debug, Clone, PartialEq)]
pub struct BoxCoxResult {
    /// Transformed data
    pub data: Vec<f64>,
    /// Lambda parameter used
    pub lambda: f64,
    /// Offset added before transforming so all inputs are positive
    pub shift: f64,
}

impl BoxCoxResult {
    /// Map one transformed value back to the original scale.
    ///
    /// NaN when the value lies outside the image of the transform.
    pub fn invert(&self, value: f64) -> f64 {
        inv_boxcox_value(value, self.lambda) - self.shift
    }
}

/// Box-Cox of a single positive value.
///
/// For lambda != 0: y = (x^lambda - 1) / lambda
/// For lambda == 0: y = ln(x)
pub fn boxcox_value(x: f64, lambda: f64) -> f64 {
    if x <= 0.0 {
        f64::NAN
    } else if lambda.abs() < 1e-10 {
        x.ln()
    } else {
        (x.powf(lambda) - 1.0) / lambda
    }
}

/// Inverse Box-Cox of a single value.
pub fn inv_boxcox_value(y: f64, lambda: f64) -> f64 {
    if lambda.abs() < 1e-10 {
        return y.exp();
    }
    let base = lambda * y + 1.0;
    if base <= 0.0 {
        f64::NAN
    } else {
        base.powf(1.0 / lambda)
    }
}

/// Shift the series positive, pick lambda by likelihood and transform.
pub fn boxcox_auto(series: &[f64]) -> BoxCoxResult {
    let shift = positive_shift(series);
    let shifted: Vec<f64> = series.iter().map(|&x| x + shift).collect();
    let lambda = boxcox_lambda(&shifted);
    BoxCoxResult {
        data: shifted.iter().map(|&x| boxcox_value(x, lambda)).collect(),
        lambda,
        shift,
    }
}

/// Find the Box-Cox lambda in [-2, 2] maximizing the profile log-likelihood.
///
/// Coarse grid at 0.05 then a local refinement at 0.005.
pub fn boxcox_lambda(series: &[f64]) -> f64 {
    let positive: Vec<f64> = series.iter().copied().filter(|&x| x > 0.0).collect();
    if positive.len() < 2 {
        return 1.0;
    }

    let search = |grid: &mut dyn Iterator<Item = f64>, start: (f64, f64)| -> (f64, f64) {
        grid.fold(start, |(best_lambda, best_llf), lambda| {
            let llf = boxcox_llf(&positive, lambda);
            if llf > best_llf {
                (lambda, llf)
            } else {
                (best_lambda, best_llf)
            }
        })
    };

    let coarse = search(
        &mut (-40..=40).map(|i| i as f64 * 0.05),
        (1.0, f64::NEG_INFINITY),
    );
    let center = coarse.0;
    let (best, _) = search(
        &mut (-10..=10).map(|i| (center + i as f64 * 0.005).clamp(-2.0, 2.0)),
        coarse,
    );
    best
}

/// Profile log-likelihood of normality after transforming with `lambda`.
fn boxcox_llf(series: &[f64], lambda: f64) -> f64 {
    let n = series.len() as f64;
    let transformed: Vec<f64> = series.iter().map(|&x| boxcox_value(x, lambda)).collect();
    if transformed.iter().any(|x| !x.is_finite()) {
        return f64::NEG_INFINITY;
    }

    let mean = transformed.iter().sum::<f64>() / n;
    let variance = transformed.iter().map(|x| (x - mean).powi(2)).sum::<f64>() / n;
    if variance <= 0.0 {
        return f64::NEG_INFINITY;
    }

    let log_sum: f64 = series.iter().map(|x| x.ln()).sum();
    -0.5 * n * variance.ln() + (lambda - 1.0) * log_sum
}

#[cfg(test)]
mod tests {
    use super::*;
    use approx::assert_relative_eq;

    #[test]
    fn lambda_one_is_shift_by_one() {
        assert_relative_eq!(boxcox_value(5.0, 1.0), 4.0, epsilon = 1e-10);
        assert_relative_eq!(boxcox_value(5.0, 0.0), 5.0_f64.ln(), epsilon = 1e-10);
        assert!(boxcox_value(-1.0, 0.5).is_nan());
    }

    #[test]
    fn inverse_recovers_input() {
        for &lambda in &[-1.0, 0.0, 0.5, 2.0] {
            let y = boxcox_value(3.0, lambda);
            assert_relative_eq!(inv_boxcox_value(y, lambda), 3.0, epsilon = 1e-9);
        }
    }

    #[test]
    fn exponential_growth_prefers_log() {
        let series: Vec<f64> = (0..40).map(|i| (0.1 * i as f64).exp()).collect();
        let lambda = boxcox_lambda(&series);
        assert!(lambda.abs() < 0.3, "lambda = {lambda}");
    }

    #[test]
    fn auto_shifts_non_positive_series() {
        let series = vec![-3.0, 0.0, 2.0, 5.0];
        let result = boxcox_auto(&series);
        assert_eq!(result.shift, 4.0);
        assert!(result.data.iter().all(|v| v.is_finite()));
        for (x, y) in series.iter().zip(&result.data) {
            assert_relative_eq!(result.invert(*y), *x, epsilon = 1e-8);
        }
    }
}
