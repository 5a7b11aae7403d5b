//! Seasonal-trend decomposition (STL and MSTL).
//!
//! STL runs the classic inner loop: detrend, per-position seasonal means,
//! LOESS trend re-estimation, remainder. MSTL layers one STL per seasonal
//! period in ascending order with seasonal back-substitution between outer
//! iterations. Both decomposers own their work buffers and reuse them
//! across iterations; the MSTL driver keeps one STL decomposer per period
//! alive for the whole fit.

use crate::error::{ForecastError, Result};
use crate::loess::Loess;
use crate::numeric;

/// Round up to the next odd number.
#[inline]
pub(crate) fn ensure_odd(v: usize) -> usize {
    if v % 2 == 0 {
        v + 1
    } else {
        v
    }
}

/// Configuration for a single-period STL decomposition.
#[derive(Debug, Clone)]
pub struct StlConfig {
    /// Cycle-subseries smoothing window in cycles; `None` means periodic
    /// (plain weighted mean over all cycles).
    pub seasonal_smoother: Option<usize>,
    /// Trend LOESS window in observations; `None` picks
    /// `ensure_odd(max(3·period, 7))`.
    pub trend_smoother: Option<usize>,
    /// Inner iterations.
    pub iterations: usize,
    /// Bisquare reweighting of the seasonal means by remainder size.
    pub robust: bool,
}

impl Default for StlConfig {
    fn default() -> Self {
        Self {
            seasonal_smoother: None,
            trend_smoother: None,
            iterations: 2,
            robust: false,
        }
    }
}

/// Result of an STL decomposition.
#[derive(Debug, Clone)]
pub struct StlDecomposition {
    /// Trend component
    pub trend: Vec<f64>,
    /// Seasonal component
    pub seasonal: Vec<f64>,
    /// Remainder component
    pub remainder: Vec<f64>,
}

/// Single-period STL decomposer with reusable buffers.
#[derive(Debug, Clone)]
pub struct StlDecomposer {
    config: StlConfig,
    detrended: Vec<f64>,
    weights: Vec<f64>,
    deseasonalized: Vec<f64>,
    loess: Loess,
}

impl StlDecomposer {
    pub fn new(config: StlConfig) -> Self {
        Self {
            config,
            detrended: Vec::new(),
            weights: Vec::new(),
            deseasonalized: Vec::new(),
            loess: Loess::new(0.5, 0).expect("default span is valid"),
        }
    }

    /// Decompose `values` at the given seasonal period.
    pub fn fit(&mut self, values: &[f64], period: usize) -> Result<StlDecomposition> {
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

        let trend_window = ensure_odd(
            self.config
                .trend_smoother
                .unwrap_or_else(|| (3 * period).max(7)),
        )
        .min(ensure_odd(n.saturating_sub(1).max(3)));
        let span = (trend_window as f64 / n as f64).clamp(1e-3, 1.0);
        self.loess.set_span(span)?;
        self.loess
            .set_robustness(if self.config.robust { 2 } else { 0 });

        let mut trend = vec![0.0; n];
        let mut seasonal = vec![0.0; n];
        let mut remainder = vec![0.0; n];
        self.weights.clear();
        self.weights.resize(n, 1.0);
        self.detrended.clear();
        self.detrended.resize(n, 0.0);
        self.deseasonalized.clear();
        self.deseasonalized.resize(n, 0.0);

        let iterations = self.config.iterations.max(1);
        for iter in 0..iterations {
            // 1. Detrend.
            for i in 0..n {
                self.detrended[i] = values[i] - trend[i];
            }

            // 2. Seasonal component from weighted per-position means.
            self.seasonal_means(period, &mut seasonal);

            // 3. Trend from LOESS on the deseasonalized series.
            for i in 0..n {
                self.deseasonalized[i] = values[i] - seasonal[i];
            }
            self.loess.smooth_into(&self.deseasonalized, &mut trend)?;

            // 4. Remainder.
            for i in 0..n {
                remainder[i] = values[i] - trend[i] - seasonal[i];
            }

            if self.config.robust && iter + 1 < iterations {
                self.update_robust_weights(&remainder);
            }
        }

        Ok(StlDecomposition {
            trend,
            seasonal,
            remainder,
        })
    }

    /// Weighted per-position means of the detrended series, centered so a
    /// full period sums to zero.
    fn seasonal_means(&mut self, period: usize, seasonal: &mut [f64]) {
        let n = self.detrended.len();
        let window_cycles = self.config.seasonal_smoother.map(ensure_odd);

        let mut index_mean = vec![0.0; period];
        for (pos, slot) in index_mean.iter_mut().enumerate() {
            let mut num = 0.0;
            let mut den = 0.0;
            let mut cycle = 0;
            let mut i = pos;
            while i < n {
                let keep = match window_cycles {
                    None => true,
                    // Local window: only the last `w` cycles contribute.
                    Some(w) => {
                        let total_cycles = n.div_ceil(period);
                        cycle + w >= total_cycles
                    }
                };
                if keep {
                    let wgt = self.weights[i];
                    num += wgt * self.detrended[i];
                    den += wgt;
                }
                cycle += 1;
                i += period;
            }
            *slot = if den > 0.0 { num / den } else { 0.0 };
        }

        let grand = index_mean.iter().sum::<f64>() / period as f64;
        for slot in index_mean.iter_mut() {
            *slot -= grand;
        }
        for (i, s) in seasonal.iter_mut().enumerate() {
            *s = index_mean[i % period];
        }
    }

    fn update_robust_weights(&mut self, remainder: &[f64]) {
        let mut abs: Vec<f64> = remainder.iter().map(|r| r.abs()).collect();
        let s = numeric::median_in_place(&mut abs);
        let cutoff = 6.0 * s;
        if cutoff < f64::EPSILON {
            self.weights.iter_mut().for_each(|w| *w = 1.0);
            return;
        }
        for (w, r) in self.weights.iter_mut().zip(remainder.iter()) {
            let u = (r.abs() / cutoff).min(1.0);
            let b = 1.0 - u * u;
            *w = b * b;
        }
    }
}

/// Configuration for MSTL decomposition.
#[derive(Debug, Clone)]
pub struct MstlConfig {
    /// Outer iterations over the period set.
    pub iterations: usize,
    /// Clip the working remainder at 6·MAD between outer iterations.
    pub robust: bool,
    /// Per-period STL settings; `seasonal_smoother` is overridden per
    /// period with the 7 + 4·(k+1) window convention when unset.
    pub stl: StlConfig,
}

impl Default for MstlConfig {
    fn default() -> Self {
        Self {
            iterations: 2,
            robust: false,
            stl: StlConfig {
                iterations: 1,
                ..StlConfig::default()
            },
        }
    }
}

/// Result of MSTL decomposition.
#[derive(Debug, Clone)]
pub struct MstlDecomposition {
    /// Trend component
    pub trend: Vec<f64>,
    /// Seasonal components, one per period, in ascending period order
    pub seasonal: Vec<Vec<f64>>,
    /// Seasonal periods actually used, ascending
    pub periods: Vec<usize>,
    /// Remainder component
    pub remainder: Vec<f64>,
}

impl MstlDecomposition {
    /// Variance-explained strength of the combined seasonal component,
    /// clamped into [0, 1].
    pub fn seasonal_strength(&self) -> f64 {
        let combined: Vec<f64> = (0..self.remainder.len())
            .map(|i| {
                self.seasonal.iter().map(|s| s[i]).sum::<f64>() + self.remainder[i]
            })
            .collect();
        strength(&self.remainder, &combined)
    }

    /// Variance-explained strength of the trend component, clamped into
    /// [0, 1].
    pub fn trend_strength(&self) -> f64 {
        let combined: Vec<f64> = self
            .trend
            .iter()
            .zip(self.remainder.iter())
            .map(|(t, r)| t + r)
            .collect();
        strength(&self.remainder, &combined)
    }
}

fn strength(remainder: &[f64], combined: &[f64]) -> f64 {
    let var_combined = numeric::variance(combined);
    if var_combined < f64::EPSILON {
        return 0.0;
    }
    (1.0 - numeric::variance(remainder) / var_combined).clamp(0.0, 1.0)
}

/// Multi-period STL decomposer. Owns one STL decomposer per period so the
/// outer iterations never reallocate.
#[derive(Debug)]
pub struct MstlDecomposer {
    config: MstlConfig,
    decomposers: Vec<StlDecomposer>,
}

impl MstlDecomposer {
    pub fn new(config: MstlConfig) -> Self {
        Self {
            config,
            decomposers: Vec::new(),
        }
    }

    /// Decompose `values` over the given seasonal periods.
    ///
    /// Periods are sorted ascending and deduplicated; a period whose STL
    /// fails (too long for the series) is skipped. `InsufficientData` is
    /// returned only when no period survives.
    pub fn fit(&mut self, values: &[f64], periods: &[usize]) -> Result<MstlDecomposition> {
        let n = values.len();
        if n < 4 {
            return Err(ForecastError::InsufficientData { needed: 4, got: n });
        }

        let mut sorted: Vec<usize> = periods.to_vec();
        sorted.sort_unstable();
        sorted.dedup();
        sorted.retain(|&p| p >= 2 && n >= 2 * p);
        if sorted.is_empty() && !periods.is_empty() {
            return Err(ForecastError::InsufficientData {
                needed: 2 * periods.iter().copied().min().unwrap_or(2),
                got: n,
            });
        }

        // One reusable STL per period, seasonal window 7 + 4·(k+1).
        self.decomposers.clear();
        for (k, _) in sorted.iter().enumerate() {
            let mut stl = self.config.stl.clone();
            if stl.seasonal_smoother.is_none() {
                stl.seasonal_smoother = Some(7 + 4 * (k + 1));
            }
            stl.iterations = 1;
            self.decomposers.push(StlDecomposer::new(stl));
        }

        let mut seasonals: Vec<Vec<f64>> = vec![vec![0.0; n]; sorted.len()];
        let mut deseas = values.to_vec();

        let iterations = if sorted.len() <= 1 {
            1
        } else {
            self.config.iterations.max(1)
        };
        for outer in 0..iterations {
            for (k, &period) in sorted.iter().enumerate() {
                // Re-add this period's current seasonal before refitting it.
                for (d, s) in deseas.iter_mut().zip(seasonals[k].iter()) {
                    *d += s;
                }
                let fit = self.decomposers[k].fit(&deseas, period)?;
                seasonals[k] = fit.seasonal;
                for (d, s) in deseas.iter_mut().zip(seasonals[k].iter()) {
                    *d -= s;
                }
            }

            if self.config.robust && outer + 1 < iterations {
                clip_outliers(&mut deseas);
            }
        }

        // Trend: moving average of the fully deseasonalized series.
        let window = match sorted.iter().copied().max() {
            Some(max_period) => ensure_odd((2 * max_period).min(n.saturating_sub(1).max(3))),
            None => ensure_odd((n / 5).max(3)),
        };
        let trend = moving_average(&deseas, window);

        let remainder: Vec<f64> = (0..n)
            .map(|i| {
                let seasonal_sum: f64 = seasonals.iter().map(|s| s[i]).sum();
                values[i] - trend[i] - seasonal_sum
            })
            .collect();

        Ok(MstlDecomposition {
            trend,
            seasonal: seasonals,
            periods: sorted,
            remainder,
        })
    }
}

/// Decompose a series over multiple seasonal periods.
pub fn mstl_decompose(
    values: &[f64],
    periods: &[usize],
    robust: bool,
    iterations: usize,
) -> Result<MstlDecomposition> {
    let mut decomposer = MstlDecomposer::new(MstlConfig {
        iterations,
        robust,
        ..MstlConfig::default()
    });
    decomposer.fit(values, periods)
}

/// Clip values whose deviation from the median exceeds 6·MAD.
fn clip_outliers(values: &mut [f64]) {
    let center = numeric::median(values);
    let spread = numeric::mad(values);
    let cutoff = 6.0 * spread;
    if !(cutoff > 0.0) {
        return;
    }
    for v in values.iter_mut() {
        *v = v.clamp(center - cutoff, center + cutoff);
    }
}

fn moving_average(values: &[f64], window: usize) -> Vec<f64> {
    let n = values.len();
    let half = window / 2;
    let mut out = vec![0.0; n];
    for i in 0..n {
        let start = i.saturating_sub(half);
        let end = (i + half + 1).min(n);
        let sum: f64 = values[start..end].iter().sum();
        out[i] = sum / (end - start) as f64;
    }
    out
}

#[cfg(test)]
mod tests {
    use super::*;
    use approx::assert_relative_eq;
    use std::f64::consts::PI;

    fn two_season_series(n: usize) -> Vec<f64> {
        (0..n)
            .map(|i| {
                let t = i as f64;
                10.0 + 0.05 * t
                    + 4.0 * (2.0 * PI * t / 12.0).sin()
                    + 2.0 * (2.0 * PI * t / 4.0).sin()
            })
            .collect()
    }

    #[test]
    fn test_stl_additivity() {
        let values = two_season_series(120);
        let mut stl = StlDecomposer::new(StlConfig::default());
        let result = stl.fit(&values, 12).unwrap();
        for i in 0..values.len() {
            let recomposed = result.trend[i] + result.seasonal[i] + result.remainder[i];
            assert_relative_eq!(recomposed, values[i], epsilon = 1e-9);
        }
    }

    #[test]
    fn test_stl_seasonal_centering() {
        let values = two_season_series(120);
        let mut stl = StlDecomposer::new(StlConfig::default());
        let result = stl.fit(&values, 12).unwrap();
        let window_sum: f64 = result.seasonal[..12].iter().sum();
        assert_relative_eq!(window_sum, 0.0, epsilon = 1e-8);
    }

    #[test]
    fn test_stl_rejects_short_series() {
        let values = vec![1.0; 10];
        let mut stl = StlDecomposer::new(StlConfig::default());
        assert!(matches!(
            stl.fit(&values, 7),
            Err(ForecastError::InsufficientData { .. })
        ));
    }

    #[test]
    fn test_mstl_additivity_and_order() {
        let values = two_season_series(144);
        let result = mstl_decompose(&values, &[12, 4], false, 2).unwrap();
        assert_eq!(result.periods, vec![4, 12]);
        assert_eq!(result.seasonal.len(), 2);

        let scale = 1.0 + values.iter().cloned().fold(0.0_f64, |a, b| a.max(b.abs()));
        for i in 0..values.len() {
            let sum: f64 = result.seasonal.iter().map(|s| s[i]).sum();
            let recomposed = result.trend[i] + sum + result.remainder[i];
            assert!(
                (recomposed - values[i]).abs() <= 1e-5 * scale,
                "index {i}: {} vs {}",
                recomposed,
                values[i]
            );
        }
    }

    #[test]
    fn test_mstl_strengths_bounded() {
        let values = two_season_series(144);
        let result = mstl_decompose(&values, &[4, 12], false, 2).unwrap();
        let s = result.seasonal_strength();
        let t = result.trend_strength();
        assert!((0.0..=1.0).contains(&s));
        assert!((0.0..=1.0).contains(&t));
        // A strongly seasonal construction should score high.
        assert!(s > 0.5, "seasonal strength {s}");
    }

    #[test]
    fn test_mstl_skips_oversized_period() {
        let values = two_season_series(40);
        // 30 cannot fit twice into 40 observations; 4 survives.
        let result = mstl_decompose(&values, &[4, 30], false, 2).unwrap();
        assert_eq!(result.periods, vec![4]);
    }

    #[test]
    fn test_mstl_all_periods_too_large() {
        let values = two_season_series(20);
        assert!(mstl_decompose(&values, &[15], false, 2).is_err());
    }
}
