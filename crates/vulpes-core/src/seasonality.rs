//! Seasonality strength analysis.
//!
//! Strength measures over a detected or supplied period, used by the
//! automatic model selectors (the Theta family's multiplicative test in
//! particular) and exposed for series profiling.

use crate::decomposition::{mstl_decompose, StlConfig, StlDecomposer};
use crate::error::{ForecastError, Result};
use crate::numeric;
use crate::periods::{detect_periods, PeriodDetectionConfig};

/// How seasonal strength is measured.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum StrengthMethod {
    /// 1 − Var(remainder)/Var(seasonal + remainder) from an STL fit
    #[default]
    Variance,
    /// Autocorrelation at the seasonal lag
    Autocorrelation,
    /// Share of spectral power near the seasonal frequency
    Spectral,
}

/// Result of seasonality analysis.
#[derive(Debug, Clone)]
pub struct SeasonalityAnalysis {
    /// Detected seasonal periods, ascending
    pub periods: Vec<usize>,
    /// Strength of each detected period (0-1)
    pub strengths: Vec<f64>,
    /// Primary (dominant) period, 0 when none
    pub primary_period: usize,
    /// Overall trend strength (0-1)
    pub trend_strength: f64,
    /// Strength of the primary period (0-1)
    pub seasonal_strength: f64,
    /// Whether the series is considered seasonal
    pub is_seasonal: bool,
}

/// Seasonal strength of `values` at `period` with the requested method,
/// clamped into [0, 1].
pub fn seasonal_strength(values: &[f64], period: usize, method: StrengthMethod) -> Result<f64> {
    if period < 2 {
        return Err(ForecastError::invalid_parameter(
            "period",
            period,
            "must be at least 2",
        ));
    }
    match method {
        StrengthMethod::Variance => {
            let mut stl = StlDecomposer::new(StlConfig::default());
            let fit = stl.fit(values, period)?;
            let combined: Vec<f64> = fit
                .seasonal
                .iter()
                .zip(fit.remainder.iter())
                .map(|(s, r)| s + r)
                .collect();
            let var_combined = numeric::variance(&combined);
            if var_combined < f64::EPSILON {
                return Ok(0.0);
            }
            Ok((1.0 - numeric::variance(&fit.remainder) / var_combined).clamp(0.0, 1.0))
        }
        StrengthMethod::Autocorrelation => {
            let acf = numeric::autocorrelation(values, period);
            if acf.is_finite() {
                Ok(acf.clamp(0.0, 1.0))
            } else {
                Ok(0.0)
            }
        }
        StrengthMethod::Spectral => {
            let n = values.len();
            if n < 2 * period {
                return Err(ForecastError::InsufficientData {
                    needed: 2 * period,
                    got: n,
                });
            }
            // Power at the seasonal lag against the whole candidate range.
            let target = numeric::lag_power(values, period);
            let total: f64 = (2..n / 2).map(|lag| numeric::lag_power(values, lag)).sum();
            if total <= 0.0 {
                return Ok(0.0);
            }
            Ok((target * (n / 2 - 2) as f64 / total / 4.0).clamp(0.0, 1.0))
        }
    }
}

/// Trend strength via an MSTL-style decomposition at the given period,
/// or the linear-regression R when no period is supplied.
pub fn trend_strength(values: &[f64], period: Option<usize>) -> Result<f64> {
    match period {
        Some(p) if values.len() >= 2 * p && p >= 2 => {
            let decomposition = mstl_decompose(values, &[p], false, 2)?;
            Ok(decomposition.trend_strength())
        }
        _ => {
            let (slope, intercept) = crate::regression::linear_trend(values)?;
            let fitted: Vec<f64> = (0..values.len())
                .map(|i| intercept + slope * i as f64)
                .collect();
            let resid: Vec<f64> = values
                .iter()
                .zip(fitted.iter())
                .map(|(v, f)| v - f)
                .collect();
            let var_y = numeric::variance(values);
            if var_y < f64::EPSILON {
                return Ok(0.0);
            }
            Ok((1.0 - numeric::variance(&resid) / var_y).clamp(0.0, 1.0))
        }
    }
}

/// Detect periods and score each one.
pub fn analyze_seasonality(
    values: &[f64],
    max_period: Option<usize>,
) -> Result<SeasonalityAnalysis> {
    let config = PeriodDetectionConfig {
        max_period: max_period.unwrap_or(512),
        threshold: 0.3,
        max_peaks: 5,
        ..PeriodDetectionConfig::default()
    };
    let detection = detect_periods(values, &config)?;

    if detection.periods.is_empty() {
        return Ok(SeasonalityAnalysis {
            periods: vec![],
            strengths: vec![],
            primary_period: 0,
            trend_strength: trend_strength(values, None)?,
            seasonal_strength: 0.0,
            is_seasonal: false,
        });
    }

    let mut strengths = Vec::with_capacity(detection.periods.len());
    for &period in &detection.periods {
        let s = seasonal_strength(values, period, StrengthMethod::Variance).unwrap_or(0.0);
        strengths.push(s);
    }

    let primary = detection.primary_period.unwrap_or(detection.periods[0]);
    let primary_strength = detection
        .periods
        .iter()
        .position(|&p| p == primary)
        .map(|i| strengths[i])
        .unwrap_or(0.0);

    Ok(SeasonalityAnalysis {
        periods: detection.periods,
        strengths,
        primary_period: primary,
        trend_strength: trend_strength(values, Some(primary))?,
        seasonal_strength: primary_strength,
        is_seasonal: primary_strength > 0.1,
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::f64::consts::PI;

    fn seasonal_series(n: usize) -> Vec<f64> {
        (0..n)
            .map(|i| 20.0 + 0.1 * i as f64 + 5.0 * (2.0 * PI * i as f64 / 12.0).sin())
            .collect()
    }

    #[test]
    fn test_variance_strength_high_for_seasonal() {
        let values = seasonal_series(120);
        let s = seasonal_strength(&values, 12, StrengthMethod::Variance).unwrap();
        assert!(s > 0.8, "strength {s}");
    }

    #[test]
    fn test_variance_strength_low_for_noise_free_trend() {
        let values: Vec<f64> = (0..120).map(|i| 1.0 + 0.5 * i as f64).collect();
        let s = seasonal_strength(&values, 12, StrengthMethod::Variance).unwrap();
        assert!(s < 0.7, "strength {s}");
    }

    #[test]
    fn test_strengths_bounded() {
        let values = seasonal_series(96);
        for method in [
            StrengthMethod::Variance,
            StrengthMethod::Autocorrelation,
            StrengthMethod::Spectral,
        ] {
            let s = seasonal_strength(&values, 12, method).unwrap();
            assert!((0.0..=1.0).contains(&s), "{method:?} gave {s}");
        }
    }

    #[test]
    fn test_analyze_seasonality() {
        let values = seasonal_series(120);
        let analysis = analyze_seasonality(&values, Some(24)).unwrap();
        assert!(analysis.is_seasonal);
        assert_eq!(analysis.primary_period, 12);
        assert!(analysis.seasonal_strength > 0.5);
    }

    #[test]
    fn test_invalid_period() {
        let values = seasonal_series(60);
        assert!(seasonal_strength(&values, 1, StrengthMethod::Variance).is_err());
    }
}
