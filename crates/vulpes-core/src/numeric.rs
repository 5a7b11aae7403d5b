//! Shared numerical primitives.
//!
//! Low-level building blocks used across the crate: stable log-space
//! reductions, the Student-t log density, order statistics on caller-owned
//! buffers, and autocorrelation helpers. All functions here are pure; hot
//! callers pass in mutable scratch buffers to avoid heap churn.

use statrs::distribution::{ContinuousCDF, Normal};
use statrs::function::gamma::ln_gamma;

/// Stable log(exp(a) + exp(b)).
pub fn log_sum_exp(a: f64, b: f64) -> f64 {
    if a == f64::NEG_INFINITY {
        return b;
    }
    if b == f64::NEG_INFINITY {
        return a;
    }
    let max = a.max(b);
    max + (-(a - b).abs()).exp().ln_1p()
}

/// Stable log of the sum of exponentials over a slice.
///
/// Scans for the maximum first, then accumulates. Returns negative
/// infinity for an empty slice or one containing only `-inf`.
pub fn log_sum_exp_slice(values: &[f64]) -> f64 {
    let max = values.iter().cloned().fold(f64::NEG_INFINITY, f64::max);
    if max == f64::NEG_INFINITY {
        return f64::NEG_INFINITY;
    }
    let sum: f64 = values.iter().map(|&v| (v - max).exp()).sum();
    max + sum.ln()
}

/// Log density of the Student-t distribution with `nu` degrees of freedom,
/// location `mu` and scale `sigma`.
pub fn student_t_logpdf(x: f64, mu: f64, sigma: f64, nu: f64) -> f64 {
    if !(sigma > 0.0) || !sigma.is_finite() || nu <= 0.0 {
        return f64::NEG_INFINITY;
    }
    let z = (x - mu) / sigma;
    ln_gamma((nu + 1.0) / 2.0)
        - ln_gamma(nu / 2.0)
        - 0.5 * (nu * std::f64::consts::PI).ln()
        - sigma.ln()
        - 0.5 * (nu + 1.0) * (z * z / nu).ln_1p()
}

/// Two-sided quantile of the standard normal for a coverage level,
/// e.g. 0.95 -> 1.959964.
pub fn normal_interval_z(coverage: f64) -> f64 {
    let level = coverage.clamp(1e-6, 1.0 - 1e-9);
    let normal = Normal::new(0.0, 1.0).expect("unit normal parameters are valid");
    normal.inverse_cdf(0.5 + level / 2.0)
}

/// Arithmetic mean. Returns NaN for an empty slice.
pub fn mean(values: &[f64]) -> f64 {
    if values.is_empty() {
        return f64::NAN;
    }
    values.iter().sum::<f64>() / values.len() as f64
}

/// Population variance (divisor n). Returns 0 for fewer than 2 values.
pub fn variance(values: &[f64]) -> f64 {
    if values.len() < 2 {
        return 0.0;
    }
    let m = mean(values);
    values.iter().map(|v| (v - m) * (v - m)).sum::<f64>() / values.len() as f64
}

/// Median via partial sort on a caller-owned buffer.
///
/// The buffer is reordered. For even lengths the two middle order
/// statistics are averaged.
pub fn median_in_place(buf: &mut [f64]) -> f64 {
    let n = buf.len();
    if n == 0 {
        return f64::NAN;
    }
    let mid = n / 2;
    let (_, m, _) = buf.select_nth_unstable_by(mid, |a, b| {
        a.partial_cmp(b).unwrap_or(std::cmp::Ordering::Equal)
    });
    let upper = *m;
    if n % 2 == 1 {
        upper
    } else {
        let (_, m2, _) = buf[..mid].select_nth_unstable_by(mid - 1, |a, b| {
            a.partial_cmp(b).unwrap_or(std::cmp::Ordering::Equal)
        });
        (upper + *m2) / 2.0
    }
}

/// Median of a slice, copying into a scratch vector.
pub fn median(values: &[f64]) -> f64 {
    let mut buf = values.to_vec();
    median_in_place(&mut buf)
}

/// Median absolute deviation around the median.
pub fn mad(values: &[f64]) -> f64 {
    if values.is_empty() {
        return f64::NAN;
    }
    let m = median(values);
    let mut devs: Vec<f64> = values.iter().map(|v| (v - m).abs()).collect();
    median_in_place(&mut devs)
}

/// Quantile with linear interpolation over a sorted slice.
pub fn quantile_sorted(sorted: &[f64], p: f64) -> f64 {
    if sorted.is_empty() {
        return f64::NAN;
    }
    if sorted.len() == 1 {
        return sorted[0];
    }
    let idx = p.clamp(0.0, 1.0) * (sorted.len() - 1) as f64;
    let lower = idx.floor() as usize;
    let upper = idx.ceil() as usize;
    let frac = idx - lower as f64;
    if upper >= sorted.len() {
        sorted[sorted.len() - 1]
    } else {
        sorted[lower] * (1.0 - frac) + sorted[upper] * frac
    }
}

/// Autocorrelation at a given lag (denominator over the full series).
pub fn autocorrelation(values: &[f64], lag: usize) -> f64 {
    if values.len() <= lag || lag == 0 {
        return f64::NAN;
    }
    let m = mean(values);
    let mut num = 0.0;
    let mut den = 0.0;
    for (i, &v) in values.iter().enumerate() {
        den += (v - m) * (v - m);
        if i >= lag {
            num += (v - m) * (values[i - lag] - m);
        }
    }
    if den.abs() < f64::EPSILON {
        0.0
    } else {
        num / den
    }
}

/// Normalized autocovariance at a lag, scaled by the per-term count.
///
/// This is the periodogram statistic used by the ACF-based period
/// detector: |Σ (x_t − x̄)(x_{t−p} − x̄)| / ((n − p) · Var).
pub fn lag_power(values: &[f64], lag: usize) -> f64 {
    let n = values.len();
    if n <= lag || lag == 0 {
        return 0.0;
    }
    let m = mean(values);
    let var = variance(values);
    if var < f64::EPSILON {
        return 0.0;
    }
    let mut acc = 0.0;
    for t in lag..n {
        acc += (values[t] - m) * (values[t - lag] - m);
    }
    (acc / ((n - lag) as f64 * var)).abs()
}

/// First-order differences.
pub fn diff(values: &[f64]) -> Vec<f64> {
    values.windows(2).map(|w| w[1] - w[0]).collect()
}

/// True when all values are finite.
pub fn all_finite(values: &[f64]) -> bool {
    values.iter().all(|v| v.is_finite())
}

/// True when the series has no variation beyond epsilon.
pub fn is_constant(values: &[f64]) -> bool {
    match values.first() {
        None => true,
        Some(&first) => values.iter().all(|v| (v - first).abs() < f64::EPSILON),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use approx::assert_relative_eq;

    #[test]
    fn test_log_sum_exp_matches_direct() {
        let a = 0.3_f64.ln();
        let b = 0.5_f64.ln();
        assert_relative_eq!(log_sum_exp(a, b), 0.8_f64.ln(), epsilon = 1e-12);
    }

    #[test]
    fn test_log_sum_exp_neg_inf_guard() {
        assert_eq!(log_sum_exp(f64::NEG_INFINITY, -1.0), -1.0);
        assert_eq!(log_sum_exp(-1.0, f64::NEG_INFINITY), -1.0);
        assert_eq!(
            log_sum_exp_slice(&[f64::NEG_INFINITY, f64::NEG_INFINITY]),
            f64::NEG_INFINITY
        );
    }

    #[test]
    fn test_log_sum_exp_slice() {
        let vals = [0.1_f64.ln(), 0.2_f64.ln(), 0.7_f64.ln()];
        assert_relative_eq!(log_sum_exp_slice(&vals), 0.0, epsilon = 1e-12);
    }

    #[test]
    fn test_median_odd_even() {
        assert_relative_eq!(median(&[3.0, 1.0, 2.0]), 2.0);
        assert_relative_eq!(median(&[4.0, 1.0, 3.0, 2.0]), 2.5);
    }

    #[test]
    fn test_student_t_standard_normal_limit() {
        // For large nu the t density approaches the standard normal.
        let t = student_t_logpdf(0.5, 0.0, 1.0, 1e6);
        let normal = -0.5 * (2.0 * std::f64::consts::PI).ln() - 0.5 * 0.25;
        assert_relative_eq!(t, normal, epsilon = 1e-4);
    }

    #[test]
    fn test_normal_interval_z() {
        assert_relative_eq!(normal_interval_z(0.95), 1.959964, epsilon = 1e-4);
        assert_relative_eq!(normal_interval_z(0.90), 1.644854, epsilon = 1e-4);
    }

    #[test]
    fn test_autocorrelation_of_trend() {
        let values: Vec<f64> = (0..50).map(|i| i as f64).collect();
        assert!(autocorrelation(&values, 1) > 0.9);
    }

    #[test]
    fn test_lag_power_periodic() {
        let values: Vec<f64> = (0..120)
            .map(|i| (2.0 * std::f64::consts::PI * i as f64 / 12.0).sin())
            .collect();
        assert!(lag_power(&values, 12) > lag_power(&values, 5));
    }

    #[test]
    fn test_mad() {
        assert_relative_eq!(mad(&[1.0, 2.0, 3.0, 4.0, 100.0]), 1.0);
    }
}
