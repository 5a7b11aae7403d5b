//! Detrending and classical seasonal decomposition.

use std::str::FromStr;

use crate::error::{ForecastError, Result};
use crate::regression::polyfit;

/// Method for detrending.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum DetrendMethod {
    /// Linear trend removal using least squares
    Linear,
    /// Quadratic trend removal
    Quadratic,
    /// Cubic trend removal
    Cubic,
    /// Auto-select the degree with the lowest BIC
    #[default]
    Auto,
}

impl FromStr for DetrendMethod {
    type Err = std::convert::Infallible;

    fn from_str(s: &str) -> std::result::Result<Self, Self::Err> {
        Ok(match s.to_lowercase().as_str() {
            "linear" => Self::Linear,
            "quadratic" | "quad" => Self::Quadratic,
            "cubic" => Self::Cubic,
            _ => Self::Auto,
        })
    }
}

/// Result of a detrending operation.
#[derive(Debug, Clone)]
pub struct DetrendResult {
    /// Estimated trend values
    pub trend: Vec<f64>,
    /// Detrended data
    pub detrended: Vec<f64>,
    /// Method used for detrending
    pub method: String,
    /// Polynomial coefficients in ascending order
    pub coefficients: Vec<f64>,
    /// Residual sum of squares
    pub rss: f64,
    /// Number of parameters beyond the intercept
    pub n_params: usize,
}

fn detrend_degree(values: &[f64], degree: usize, name: &str) -> Result<DetrendResult> {
    let fit = polyfit(values, degree)?;
    let detrended: Vec<f64> = values
        .iter()
        .zip(fit.fitted.iter())
        .map(|(v, t)| v - t)
        .collect();
    Ok(DetrendResult {
        trend: fit.fitted,
        detrended,
        method: name.to_string(),
        coefficients: fit.coefficients,
        rss: fit.rss,
        n_params: degree,
    })
}

/// Remove a linear trend fitted by least squares.
pub fn detrend_linear(values: &[f64]) -> Result<DetrendResult> {
    detrend_degree(values, 1, "linear")
}

/// Remove a quadratic trend.
pub fn detrend_quadratic(values: &[f64]) -> Result<DetrendResult> {
    detrend_degree(values, 2, "quadratic")
}

/// Remove a cubic trend.
pub fn detrend_cubic(values: &[f64]) -> Result<DetrendResult> {
    detrend_degree(values, 3, "cubic")
}

/// Detrend with automatic degree selection.
///
/// Fits linear, quadratic and cubic trends and keeps the one with the
/// lowest BIC, so extra parameters must buy a real RSS reduction.
pub fn detrend_auto(values: &[f64]) -> Result<DetrendResult> {
    let n = values.len() as f64;
    let mut best: Option<(f64, DetrendResult)> = None;

    for (degree, name) in [(1usize, "linear"), (2, "quadratic"), (3, "cubic")] {
        let result = match detrend_degree(values, degree, name) {
            Ok(r) => r,
            Err(_) => continue,
        };
        let k = (degree + 1) as f64;
        let bic = n * (result.rss / n).max(1e-300).ln() + k * n.ln();
        match &best {
            Some((best_bic, _)) if *best_bic <= bic => {}
            _ => best = Some((bic, result)),
        }
    }

    best.map(|(_, r)| r).ok_or(ForecastError::InsufficientData {
        needed: 3,
        got: values.len(),
    })
}

/// Detrend by the requested method.
pub fn detrend(values: &[f64], method: DetrendMethod) -> Result<DetrendResult> {
    match method {
        DetrendMethod::Linear => detrend_linear(values),
        DetrendMethod::Quadratic => detrend_quadratic(values),
        DetrendMethod::Cubic => detrend_cubic(values),
        DetrendMethod::Auto => detrend_auto(values),
    }
}

/// Decomposition method for classical seasonal decomposition.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum DecomposeMethod {
    /// data = trend + seasonal + remainder
    #[default]
    Additive,
    /// data = trend * seasonal * remainder
    Multiplicative,
}

impl FromStr for DecomposeMethod {
    type Err = std::convert::Infallible;

    fn from_str(s: &str) -> std::result::Result<Self, Self::Err> {
        Ok(match s.to_lowercase().as_str() {
            "multiplicative" | "mult" | "mul" => Self::Multiplicative,
            _ => Self::Additive,
        })
    }
}

/// Result of a classical seasonal decomposition.
#[derive(Debug, Clone)]
pub struct DecomposeResult {
    /// Trend component
    pub trend: Vec<f64>,
    /// Seasonal component
    pub seasonal: Vec<f64>,
    /// Remainder component
    pub remainder: Vec<f64>,
    /// Period used for decomposition
    pub period: usize,
    /// Decomposition method ("additive" or "multiplicative")
    pub method: String,
}

/// Classical decomposition with a centered moving-average trend and
/// per-position seasonal means. Also the seasonal-state initializer for
/// the exponential-smoothing models.
pub fn decompose(values: &[f64], period: usize, method: DecomposeMethod) -> Result<DecomposeResult> {
    let n = values.len();
    if period < 2 {
        return Err(ForecastError::invalid_parameter(
            "period",
            period,
            "must be at least 2",
        ));
    }
    if n < 2 * period {
        return Err(ForecastError::InsufficientData {
            needed: 2 * period,
            got: n,
        });
    }
    if method == DecomposeMethod::Multiplicative && values.iter().any(|&v| v <= 0.0) {
        return Err(ForecastError::Degenerate(
            "multiplicative decomposition requires strictly positive values".to_string(),
        ));
    }

    // Centered moving average; even periods use a 2×MA.
    let trend = centered_moving_average(values, period);

    // Seasonal means over the detrended series, per seasonal position.
    let mut seasonal_mean = vec![0.0; period];
    let mut seasonal_count = vec![0usize; period];
    for (i, (&v, &t)) in values.iter().zip(trend.iter()).enumerate() {
        if t.is_nan() {
            continue;
        }
        let detrended = match method {
            DecomposeMethod::Additive => v - t,
            DecomposeMethod::Multiplicative => v / t,
        };
        seasonal_mean[i % period] += detrended;
        seasonal_count[i % period] += 1;
    }
    for (s, &c) in seasonal_mean.iter_mut().zip(seasonal_count.iter()) {
        if c > 0 {
            *s /= c as f64;
        }
    }

    // Center the indices: additive seasonals sum to zero, multiplicative
    // ones average to one.
    let grand = seasonal_mean.iter().sum::<f64>() / period as f64;
    for s in seasonal_mean.iter_mut() {
        match method {
            DecomposeMethod::Additive => *s -= grand,
            DecomposeMethod::Multiplicative => {
                if grand.abs() > f64::EPSILON {
                    *s /= grand
                }
            }
        }
    }

    // Fill edge trend with nearest valid value.
    let trend = extend_edges(trend);

    let seasonal: Vec<f64> = (0..n).map(|i| seasonal_mean[i % period]).collect();
    let remainder: Vec<f64> = (0..n)
        .map(|i| match method {
            DecomposeMethod::Additive => values[i] - trend[i] - seasonal[i],
            DecomposeMethod::Multiplicative => values[i] / (trend[i] * seasonal[i]),
        })
        .collect();

    Ok(DecomposeResult {
        trend,
        seasonal,
        remainder,
        period,
        method: match method {
            DecomposeMethod::Additive => "additive".to_string(),
            DecomposeMethod::Multiplicative => "multiplicative".to_string(),
        },
    })
}

fn centered_moving_average(values: &[f64], period: usize) -> Vec<f64> {
    let n = values.len();
    let mut trend = vec![f64::NAN; n];
    if period % 2 == 1 {
        let half = period / 2;
        for i in half..(n - half) {
            let sum: f64 = values[i - half..=i + half].iter().sum();
            trend[i] = sum / period as f64;
        }
    } else {
        // 2×MA: average of two adjacent period-length windows.
        let half = period / 2;
        for i in half..(n - half) {
            let first: f64 = values[i - half..i + half].iter().sum();
            let second: f64 = values[i - half + 1..=i + half].iter().sum();
            trend[i] = (first + second) / (2.0 * period as f64);
        }
    }
    trend
}

fn extend_edges(mut trend: Vec<f64>) -> Vec<f64> {
    let n = trend.len();
    let first_valid = trend.iter().position(|v| !v.is_nan()).unwrap_or(0);
    let last_valid = trend.iter().rposition(|v| !v.is_nan()).unwrap_or(n - 1);
    let first = trend[first_valid];
    let last = trend[last_valid];
    for v in trend.iter_mut().take(first_valid) {
        *v = first;
    }
    for v in trend.iter_mut().skip(last_valid + 1) {
        *v = last;
    }
    trend
}

#[cfg(test)]
mod tests {
    use super::*;
    use approx::assert_relative_eq;
    use std::f64::consts::PI;

    #[test]
    fn test_detrend_linear_removes_trend() {
        let values: Vec<f64> = (0..40).map(|i| 2.0 + 0.7 * i as f64).collect();
        let result = detrend_linear(&values).unwrap();
        for d in &result.detrended {
            assert_relative_eq!(*d, 0.0, epsilon = 1e-8);
        }
        assert_eq!(result.n_params, 1);
    }

    #[test]
    fn test_detrend_auto_picks_quadratic() {
        let values: Vec<f64> = (0..60)
            .map(|i| {
                let x = i as f64;
                1.0 + 0.2 * x + 0.05 * x * x
            })
            .collect();
        let result = detrend_auto(&values).unwrap();
        assert_eq!(result.method, "quadratic");
    }

    #[test]
    fn test_decompose_additive_recovers_components() {
        let period = 12;
        let values: Vec<f64> = (0..96)
            .map(|i| 50.0 + 0.25 * i as f64 + 8.0 * (2.0 * PI * i as f64 / period as f64).sin())
            .collect();
        let result = decompose(&values, period, DecomposeMethod::Additive).unwrap();

        // Seasonal indices sum to ~zero.
        let index_sum: f64 = result.seasonal[..period].iter().sum();
        assert_relative_eq!(index_sum, 0.0, epsilon = 1e-8);

        // Remainder is small away from the edges.
        for r in &result.remainder[period..96 - period] {
            assert!(r.abs() < 1.0, "remainder {r}");
        }
    }

    #[test]
    fn test_decompose_multiplicative_requires_positive() {
        let values = vec![1.0, -2.0, 3.0, 4.0, 1.0, -2.0, 3.0, 4.0];
        assert!(decompose(&values, 4, DecomposeMethod::Multiplicative).is_err());
    }

    #[test]
    fn test_decompose_rejects_short_series() {
        let values = vec![1.0; 10];
        assert!(matches!(
            decompose(&values, 7, DecomposeMethod::Additive),
            Err(ForecastError::InsufficientData { .. })
        ));
    }
}
