//! Locally estimated scatterplot smoothing.
//!
//! Tricube-kernel local linear regression over an implicit integer x-axis,
//! with optional bisquare robustness reweighting. The smoother owns its
//! weight buffers so repeated calls (the STL inner loop) do not allocate.

use crate::error::{ForecastError, Result};

/// LOESS smoother with reusable work buffers.
#[derive(Debug, Clone)]
pub struct Loess {
    /// Smoothing span as a fraction of the series length, in (0, 1].
    span: f64,
    /// Robustness iterations: 0 = plain least squares, 2 = bisquare.
    nsteps: usize,
    kernel_weights: Vec<f64>,
    robust_weights: Vec<f64>,
}

impl Loess {
    /// Create a smoother. `span` is the neighborhood width as a fraction
    /// of n; `nsteps` is the number of bisquare reweighting passes.
    pub fn new(span: f64, nsteps: usize) -> Result<Self> {
        if !(span > 0.0 && span <= 1.0) {
            return Err(ForecastError::invalid_parameter(
                "span",
                span,
                "must be in (0, 1]",
            ));
        }
        Ok(Self {
            span,
            nsteps,
            kernel_weights: Vec::new(),
            robust_weights: Vec::new(),
        })
    }

    /// Change the smoothing span, keeping the allocated buffers.
    pub fn set_span(&mut self, span: f64) -> Result<()> {
        if !(span > 0.0 && span <= 1.0) {
            return Err(ForecastError::invalid_parameter(
                "span",
                span,
                "must be in (0, 1]",
            ));
        }
        self.span = span;
        Ok(())
    }

    /// Change the number of robustness iterations.
    pub fn set_robustness(&mut self, nsteps: usize) {
        self.nsteps = nsteps;
    }

    /// Smooth `y`, writing the result into `out` (resized to `y.len()`).
    pub fn smooth_into(&mut self, y: &[f64], out: &mut Vec<f64>) -> Result<()> {
        let n = y.len();
        if n < 2 {
            return Err(ForecastError::InsufficientData { needed: 2, got: n });
        }

        let window = ((self.span * n as f64).ceil() as usize).clamp(2, n);
        out.clear();
        out.resize(n, 0.0);
        self.kernel_weights.clear();
        self.kernel_weights.resize(n, 0.0);
        self.robust_weights.clear();
        self.robust_weights.resize(n, 1.0);

        // Interpolation skip: points closer than delta to the last fitted
        // x reuse a linear interpolation instead of a fresh regression.
        let delta = 0.01 * (n - 1) as f64;

        for pass in 0..=self.nsteps {
            self.smooth_pass(y, window, delta, out);
            if pass < self.nsteps {
                self.update_robust_weights(y, out);
            }
        }
        Ok(())
    }

    /// Convenience wrapper returning a fresh vector.
    pub fn smooth(&mut self, y: &[f64]) -> Result<Vec<f64>> {
        let mut out = Vec::new();
        self.smooth_into(y, &mut out)?;
        Ok(out)
    }

    fn smooth_pass(&mut self, y: &[f64], window: usize, delta: f64, out: &mut [f64]) {
        let n = y.len();
        let mut last_fit: Option<(usize, f64)> = None;

        let mut i = 0;
        while i < n {
            let fitted = self.fit_local(y, i, window);
            // Fill the skipped stretch by linear interpolation.
            if let Some((j, prev)) = last_fit {
                let gap = i - j;
                if gap > 1 {
                    let slope = (fitted - prev) / gap as f64;
                    for (k, slot) in out.iter_mut().enumerate().take(i).skip(j + 1) {
                        *slot = prev + slope * (k - j) as f64;
                    }
                }
            }
            out[i] = fitted;
            last_fit = Some((i, fitted));

            if i == n - 1 {
                break;
            }
            let next = i + 1 + delta.floor() as usize;
            i = next.min(n - 1);
        }
    }

    /// Weighted local linear fit at position `at`.
    fn fit_local(&mut self, y: &[f64], at: usize, window: usize) -> f64 {
        let n = y.len();
        let half = window / 2;
        let start = at.saturating_sub(half);
        let end = (start + window).min(n);
        let start = end.saturating_sub(window);

        let x_at = at as f64;
        let max_dist = ((at - start).max(end - 1 - at)).max(1) as f64;

        let mut sum_w = 0.0;
        let mut sum_wx = 0.0;
        let mut sum_wy = 0.0;
        let mut sum_wxx = 0.0;
        let mut sum_wxy = 0.0;

        for j in start..end {
            let dist = ((j as f64) - x_at).abs() / max_dist;
            let w = tricube(dist) * self.robust_weights[j];
            if w <= 0.0 {
                continue;
            }
            let x = j as f64 - x_at;
            sum_w += w;
            sum_wx += w * x;
            sum_wy += w * y[j];
            sum_wxx += w * x * x;
            sum_wxy += w * x * y[j];
        }

        if sum_w <= 0.0 {
            return y[at];
        }
        let denom = sum_w * sum_wxx - sum_wx * sum_wx;
        if denom.abs() < 1e-12 * sum_w.max(1.0) {
            // Degenerate local design, fall back to the weighted mean.
            return sum_wy / sum_w;
        }
        let slope = (sum_w * sum_wxy - sum_wx * sum_wy) / denom;
        let intercept = (sum_wy - slope * sum_wx) / sum_w;
        // Evaluated at x = 0 (the centered query point).
        intercept
    }

    fn update_robust_weights(&mut self, y: &[f64], fitted: &[f64]) {
        let mut residuals: Vec<f64> = y
            .iter()
            .zip(fitted.iter())
            .map(|(a, f)| (a - f).abs())
            .collect();
        let s = crate::numeric::median_in_place(&mut residuals);
        let cutoff = 6.0 * s;
        if cutoff < f64::EPSILON {
            self.robust_weights.iter_mut().for_each(|w| *w = 1.0);
            return;
        }
        for (w, (a, f)) in self
            .robust_weights
            .iter_mut()
            .zip(y.iter().zip(fitted.iter()))
        {
            let u = ((a - f).abs() / cutoff).min(1.0);
            let b = 1.0 - u * u;
            *w = b * b;
        }
    }
}

#[inline]
fn tricube(u: f64) -> f64 {
    let u = u.abs();
    if u >= 1.0 {
        0.0
    } else {
        let t = 1.0 - u * u * u;
        t * t * t
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use approx::assert_relative_eq;

    #[test]
    fn test_recovers_linear_signal() {
        let y: Vec<f64> = (0..50).map(|i| 2.0 + 0.5 * i as f64).collect();
        let mut loess = Loess::new(0.3, 0).unwrap();
        let smoothed = loess.smooth(&y).unwrap();
        for (s, v) in smoothed.iter().zip(y.iter()) {
            assert_relative_eq!(s, v, epsilon = 1e-6);
        }
    }

    #[test]
    fn test_smooths_noise() {
        let y: Vec<f64> = (0..100)
            .map(|i| 10.0 + if i % 2 == 0 { 1.0 } else { -1.0 })
            .collect();
        let mut loess = Loess::new(0.5, 0).unwrap();
        let smoothed = loess.smooth(&y).unwrap();
        // Interior points should be pulled toward the 10.0 baseline.
        for s in &smoothed[10..90] {
            assert!((s - 10.0).abs() < 0.5, "got {s}");
        }
    }

    #[test]
    fn test_robust_pass_downweights_outlier() {
        let mut y: Vec<f64> = (0..60).map(|i| 1.0 + 0.1 * i as f64).collect();
        y[30] = 100.0;
        let mut plain = Loess::new(0.4, 0).unwrap();
        let mut robust = Loess::new(0.4, 2).unwrap();
        let p = plain.smooth(&y).unwrap();
        let r = robust.smooth(&y).unwrap();
        let truth = 1.0 + 0.1 * 30.0;
        assert!((r[30] - truth).abs() < (p[30] - truth).abs());
    }

    #[test]
    fn test_invalid_span() {
        assert!(Loess::new(0.0, 0).is_err());
        assert!(Loess::new(1.5, 0).is_err());
    }
}
