//! Seasonal period detection using multiple methods.
//!
//! The primary detector is an autocorrelation-based periodogram: the
//! normalized autocovariance is scanned over a candidate lag range and its
//! qualifying peaks become periods. Alternative single-period estimators
//! (FFT, ACF, AIC comparison, SSA, STL strength, matrix profile, SAZED)
//! each return a period with a confidence score, and a wavelet-ridge
//! estimator tracks the instantaneous period over time.

use std::str::FromStr;

use crate::decomposition::{MstlConfig, MstlDecomposer, StlConfig, StlDecomposer};
use crate::error::{ForecastError, Result};
use crate::numeric;
use crate::regression::polyfit;

/// Method for period detection.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum PeriodMethod {
    /// Autocorrelation-based periodogram (primary)
    #[default]
    Periodogram,
    /// FFT power spectrum argmax
    Fft,
    /// Autocorrelation peak
    Acf,
    /// AIC comparison over candidate seasonal models
    Aic,
    /// Singular spectrum analysis
    Ssa,
    /// STL seasonal-strength maximization
    Stl,
    /// Matrix-profile motif spacing
    MatrixProfile,
    /// SAZED ensemble (spectral + zero-crossing + ACF)
    Sazed,
}

impl FromStr for PeriodMethod {
    type Err = ForecastError;

    fn from_str(s: &str) -> std::result::Result<Self, Self::Err> {
        Ok(match s.to_lowercase().as_str() {
            "periodogram" | "auto" => Self::Periodogram,
            "fft" => Self::Fft,
            "acf" | "autocorrelation" => Self::Acf,
            "aic" | "aic_comparison" => Self::Aic,
            "ssa" | "singular_spectrum" => Self::Ssa,
            "stl" | "stl_period" | "seasonal_strength" => Self::Stl,
            "matrix_profile" | "matrixprofile" | "mp" => Self::MatrixProfile,
            "sazed" => Self::Sazed,
            other => {
                return Err(ForecastError::invalid_parameter(
                    "method",
                    other,
                    "unknown period detection method",
                ))
            }
        })
    }
}

/// Options for the periodogram detector.
#[derive(Debug, Clone)]
pub struct PeriodDetectionConfig {
    /// Smallest candidate period (inclusive).
    pub min_period: usize,
    /// Largest candidate period (exclusive, additionally capped at n/2).
    pub max_period: usize,
    /// Peaks must exceed `threshold × max_power`.
    pub threshold: f64,
    /// Maximum number of periods to report.
    pub max_peaks: usize,
}

impl Default for PeriodDetectionConfig {
    fn default() -> Self {
        Self {
            min_period: 2,
            max_period: 512,
            threshold: 0.5,
            max_peaks: 3,
        }
    }
}

/// Result of the periodogram detector.
#[derive(Debug, Clone)]
pub struct PeriodDetection {
    /// Detected periods, ascending
    pub periods: Vec<usize>,
    /// Period with the highest power, if any
    pub primary_period: Option<usize>,
    /// Powers aligned with `periods`
    pub powers: Vec<f64>,
}

/// Result from a single-period estimator.
#[derive(Debug, Clone)]
pub struct SinglePeriodResult {
    /// Estimated period (in samples)
    pub period: f64,
    /// Confidence measure in [0, 1]
    pub confidence: f64,
    /// Method used for estimation
    pub method: String,
}

/// Instantaneous-period estimate from the wavelet ridge.
#[derive(Debug, Clone)]
pub struct InstantaneousPeriodResult {
    /// Ridge period per time point
    pub periods: Vec<f64>,
    /// Mean ridge period
    pub mean_period: f64,
    /// Ridge energy concentration in [0, 1]
    pub confidence: f64,
}

/// Detect seasonal periods with the autocorrelation periodogram.
///
/// Powers are the normalized lag autocovariances
/// `|Σ (x_t − x̄)(x_{t−p} − x̄)| / ((n − p)·Var)`. A lag qualifies when it
/// exceeds both neighbors and `threshold × max_power`. The output is
/// limited to `max_peaks` periods, sorted by period ascending for output
/// stability.
pub fn detect_periods(values: &[f64], config: &PeriodDetectionConfig) -> Result<PeriodDetection> {
    let n = values.len();
    if n < 4 {
        return Err(ForecastError::InsufficientData { needed: 4, got: n });
    }
    if config.min_period < 2 {
        return Err(ForecastError::invalid_parameter(
            "min_period",
            config.min_period,
            "must be at least 2",
        ));
    }
    if config.threshold <= 0.0 || config.threshold > 1.0 {
        return Err(ForecastError::invalid_parameter(
            "threshold",
            config.threshold,
            "must be in (0, 1]",
        ));
    }

    let hi = config.max_period.min(n / 2);
    if hi <= config.min_period {
        return Ok(PeriodDetection {
            periods: vec![],
            primary_period: None,
            powers: vec![],
        });
    }

    let lags: Vec<usize> = (config.min_period..hi).collect();
    let powers: Vec<f64> = lags.iter().map(|&p| numeric::lag_power(values, p)).collect();
    let max_power = powers.iter().cloned().fold(0.0_f64, f64::max);
    if max_power <= 0.0 {
        return Ok(PeriodDetection {
            periods: vec![],
            primary_period: None,
            powers: vec![],
        });
    }

    let cutoff = config.threshold * max_power;
    let mut candidates: Vec<(usize, f64)> = Vec::new();
    for i in 0..powers.len() {
        let left = if i == 0 { f64::NEG_INFINITY } else { powers[i - 1] };
        let right = if i + 1 == powers.len() {
            f64::NEG_INFINITY
        } else {
            powers[i + 1]
        };
        if powers[i] >= cutoff && powers[i] > left && powers[i] > right {
            candidates.push((lags[i], powers[i]));
        }
    }

    // Keep the strongest peaks; powers are quantized so a harmonic that
    // ties its base period to within float jitter loses to the shorter
    // lag. Output order is by period ascending for stability.
    let rank = |power: f64| -> i64 { (power / max_power * 1e9).round() as i64 };
    candidates.sort_by(|a, b| rank(b.1).cmp(&rank(a.1)).then(a.0.cmp(&b.0)));
    let primary_period = candidates.first().map(|&(p, _)| p);
    candidates.truncate(config.max_peaks);
    candidates.sort_by_key(|&(p, _)| p);

    Ok(PeriodDetection {
        periods: candidates.iter().map(|&(p, _)| p).collect(),
        primary_period,
        powers: candidates.iter().map(|&(_, pw)| pw).collect(),
    })
}

/// Convenience: the primary period of a series, if one is detectable.
/// Series too short for the periodogram report no period rather than an
/// error.
pub fn detect_seasonality(values: &[f64], max_period: Option<usize>) -> Result<Option<usize>> {
    if values.len() < 4 {
        return Ok(None);
    }
    let config = PeriodDetectionConfig {
        max_period: max_period.unwrap_or(512),
        ..PeriodDetectionConfig::default()
    };
    Ok(detect_periods(values, &config)?.primary_period)
}

/// Estimate a single period with the requested method.
pub fn estimate_period(
    values: &[f64],
    method: PeriodMethod,
    config: &PeriodDetectionConfig,
) -> Result<SinglePeriodResult> {
    match method {
        PeriodMethod::Periodogram => {
            let detection = detect_periods(values, config)?;
            let period = detection
                .primary_period
                .ok_or_else(|| ForecastError::Degenerate("no periodic signal".to_string()))?;
            let power = detection
                .periods
                .iter()
                .position(|&p| p == period)
                .map(|i| detection.powers[i])
                .unwrap_or(0.0);
            Ok(SinglePeriodResult {
                period: period as f64,
                confidence: power.clamp(0.0, 1.0),
                method: "periodogram".to_string(),
            })
        }
        PeriodMethod::Fft => estimate_period_fft(values, config),
        PeriodMethod::Acf => estimate_period_acf(values, config),
        PeriodMethod::Aic => estimate_period_aic(values, config),
        PeriodMethod::Ssa => estimate_period_ssa(values, config),
        PeriodMethod::Stl => estimate_period_stl(values, config),
        PeriodMethod::MatrixProfile => estimate_period_matrix_profile(values, config),
        PeriodMethod::Sazed => estimate_period_sazed(values, config),
    }
}

/// FFT power-spectrum estimator.
pub fn estimate_period_fft(
    values: &[f64],
    config: &PeriodDetectionConfig,
) -> Result<SinglePeriodResult> {
    let n = values.len();
    if n < 8 {
        return Err(ForecastError::InsufficientData { needed: 8, got: n });
    }

    let mean = numeric::mean(values);
    let padded_len = (2 * n).next_power_of_two();
    let mut re: Vec<f64> = values.iter().map(|v| v - mean).collect();
    re.resize(padded_len, 0.0);
    let mut im = vec![0.0; padded_len];
    fft_in_place(&mut re, &mut im);

    let hi = config.max_period.min(n / 2).max(config.min_period + 1);
    let mut best_k = 0;
    let mut best_power = 0.0;
    let mut total_power = 0.0;
    for k in 1..padded_len / 2 {
        let power = re[k] * re[k] + im[k] * im[k];
        total_power += power;
        let period = padded_len as f64 / k as f64;
        if period < config.min_period as f64 || period > hi as f64 {
            continue;
        }
        if power > best_power {
            best_power = power;
            best_k = k;
        }
    }

    if best_k == 0 || total_power <= 0.0 {
        return Err(ForecastError::Degenerate("no spectral peak".to_string()));
    }

    Ok(SinglePeriodResult {
        period: padded_len as f64 / best_k as f64,
        confidence: (best_power / total_power).clamp(0.0, 1.0),
        method: "fft".to_string(),
    })
}

/// ACF-peak estimator.
pub fn estimate_period_acf(
    values: &[f64],
    config: &PeriodDetectionConfig,
) -> Result<SinglePeriodResult> {
    let n = values.len();
    let hi = config.max_period.min(n / 2);
    if hi <= config.min_period {
        return Err(ForecastError::InsufficientData {
            needed: 2 * config.min_period + 2,
            got: n,
        });
    }

    let mut best = None;
    for lag in config.min_period..hi {
        let acf = numeric::autocorrelation(values, lag);
        if !acf.is_finite() {
            continue;
        }
        match best {
            Some((_, v)) if v >= acf => {}
            _ => best = Some((lag, acf)),
        }
    }
    let (lag, acf) = best.ok_or_else(|| ForecastError::Degenerate("flat ACF".to_string()))?;
    Ok(SinglePeriodResult {
        period: lag as f64,
        confidence: acf.clamp(0.0, 1.0),
        method: "acf".to_string(),
    })
}

/// AIC comparison: a seasonal-means model per candidate period, penalized
/// by its parameter count.
pub fn estimate_period_aic(
    values: &[f64],
    config: &PeriodDetectionConfig,
) -> Result<SinglePeriodResult> {
    let n = values.len();
    let hi = config.max_period.min(n / 2);
    if hi <= config.min_period {
        return Err(ForecastError::InsufficientData {
            needed: 2 * config.min_period + 2,
            got: n,
        });
    }

    // Baseline: no seasonality.
    let base_var = numeric::variance(values).max(1e-300);
    let base_aic = n as f64 * base_var.ln() + 2.0;

    let mut best: Option<(usize, f64)> = None;
    for period in config.min_period..hi {
        let rss = seasonal_means_rss(values, period);
        let k = period as f64 + 1.0;
        let aic = n as f64 * (rss / n as f64).max(1e-300).ln() + 2.0 * k;
        match best {
            Some((_, b)) if b <= aic => {}
            _ => best = Some((period, aic)),
        }
    }

    let (period, aic) = best.ok_or_else(|| ForecastError::Degenerate("no candidate".to_string()))?;
    if aic >= base_aic {
        return Err(ForecastError::Degenerate(
            "no seasonal model beats the flat model".to_string(),
        ));
    }
    // Confidence from the AIC margin over the flat model.
    let confidence = (1.0 - (aic - base_aic).exp() / (1.0 + (aic - base_aic).exp())).clamp(0.0, 1.0);
    Ok(SinglePeriodResult {
        period: period as f64,
        confidence,
        method: "aic".to_string(),
    })
}

/// SSA estimator: dominant eigenvector of the lag-covariance matrix,
/// period read off that eigenvector's own periodogram.
pub fn estimate_period_ssa(
    values: &[f64],
    config: &PeriodDetectionConfig,
) -> Result<SinglePeriodResult> {
    let n = values.len();
    if n < 16 {
        return Err(ForecastError::InsufficientData { needed: 16, got: n });
    }

    let window = (n / 3).clamp(8, 96);
    let mean = numeric::mean(values);
    let centered: Vec<f64> = values.iter().map(|v| v - mean).collect();

    // Lag-covariance (Toeplitz) matrix entries.
    let mut cov = vec![0.0; window];
    for (lag, slot) in cov.iter_mut().enumerate() {
        let mut acc = 0.0;
        for t in lag..n {
            acc += centered[t] * centered[t - lag];
        }
        *slot = acc / (n - lag) as f64;
    }

    // Power iteration for the dominant eigenvector.
    let mut v = vec![1.0; window];
    let mut eigenvalue = 0.0;
    for _ in 0..60 {
        let mut w = vec![0.0; window];
        for (i, wi) in w.iter_mut().enumerate() {
            for (j, &vj) in v.iter().enumerate() {
                *wi += cov[i.abs_diff(j)] * vj;
            }
        }
        let norm = w.iter().map(|x| x * x).sum::<f64>().sqrt();
        if norm < 1e-300 {
            return Err(ForecastError::Degenerate("zero covariance".to_string()));
        }
        eigenvalue = norm;
        for (vi, wi) in v.iter_mut().zip(w.iter()) {
            *vi = wi / norm;
        }
    }

    // Period of the oscillatory eigenvector.
    let mut best = (0usize, 0.0f64);
    let hi = config.max_period.min(window.saturating_sub(1));
    for lag in config.min_period..hi.max(config.min_period + 1) {
        if lag >= window {
            break;
        }
        let p = numeric::lag_power(&v, lag);
        if p > best.1 {
            best = (lag, p);
        }
    }
    if best.0 == 0 {
        return Err(ForecastError::Degenerate("aperiodic eigenvector".to_string()));
    }

    let trace: f64 = cov[0] * window as f64;
    let confidence = if trace > 0.0 {
        (eigenvalue / trace).clamp(0.0, 1.0)
    } else {
        0.0
    };

    Ok(SinglePeriodResult {
        period: best.0 as f64,
        confidence,
        method: "ssa".to_string(),
    })
}

/// STL-strength estimator: tries each candidate period and keeps the one
/// whose decomposition explains the most seasonal variance.
pub fn estimate_period_stl(
    values: &[f64],
    config: &PeriodDetectionConfig,
) -> Result<SinglePeriodResult> {
    let n = values.len();
    let hi = config.max_period.min(n / 2);
    if hi <= config.min_period {
        return Err(ForecastError::InsufficientData {
            needed: 2 * config.min_period + 2,
            got: n,
        });
    }

    // Candidate grid from periodogram peaks keeps this affordable.
    let screen = detect_periods(
        values,
        &PeriodDetectionConfig {
            min_period: config.min_period,
            max_period: config.max_period,
            threshold: 0.2,
            max_peaks: 8,
        },
    )?;
    let candidates: Vec<usize> = if screen.periods.is_empty() {
        (config.min_period..hi).collect()
    } else {
        screen.periods
    };

    let mut stl = StlDecomposer::new(StlConfig::default());
    let mut best: Option<(usize, f64)> = None;
    for period in candidates {
        let fit = match stl.fit(values, period) {
            Ok(f) => f,
            Err(_) => continue,
        };
        let combined: Vec<f64> = fit
            .seasonal
            .iter()
            .zip(fit.remainder.iter())
            .map(|(s, r)| s + r)
            .collect();
        let var_combined = numeric::variance(&combined);
        if var_combined < f64::EPSILON {
            continue;
        }
        let strength = (1.0 - numeric::variance(&fit.remainder) / var_combined).clamp(0.0, 1.0);
        match best {
            Some((_, b)) if b >= strength => {}
            _ => best = Some((period, strength)),
        }
    }

    let (period, strength) =
        best.ok_or_else(|| ForecastError::Degenerate("no decomposable period".to_string()))?;
    Ok(SinglePeriodResult {
        period: period as f64,
        confidence: strength,
        method: "stl".to_string(),
    })
}

/// Matrix-profile estimator: mode of nearest-motif offsets over
/// z-normalized subsequences.
pub fn estimate_period_matrix_profile(
    values: &[f64],
    config: &PeriodDetectionConfig,
) -> Result<SinglePeriodResult> {
    let n = values.len();
    let m = config.min_period.max(4);
    if n < 4 * m {
        return Err(ForecastError::InsufficientData { needed: 4 * m, got: n });
    }

    let n_sub = n - m + 1;
    let znorm = |start: usize| -> Vec<f64> {
        let window = &values[start..start + m];
        let mu = numeric::mean(window);
        let sd = numeric::variance(window).sqrt().max(1e-12);
        window.iter().map(|v| (v - mu) / sd).collect()
    };
    let subs: Vec<Vec<f64>> = (0..n_sub).map(znorm).collect();

    let exclusion = m / 2;
    let mut offsets: Vec<usize> = Vec::with_capacity(n_sub);
    for i in 0..n_sub {
        let mut best = (usize::MAX, f64::INFINITY);
        for (j, other) in subs.iter().enumerate() {
            if i.abs_diff(j) <= exclusion {
                continue;
            }
            let dist: f64 = subs[i]
                .iter()
                .zip(other.iter())
                .map(|(a, b)| (a - b) * (a - b))
                .sum();
            if dist < best.1 {
                best = (j, dist);
            }
        }
        if best.0 != usize::MAX {
            offsets.push(i.abs_diff(best.0));
        }
    }

    if offsets.is_empty() {
        return Err(ForecastError::Degenerate("no motif pairs".to_string()));
    }

    // Mode of the offsets within the candidate range.
    let hi = config.max_period.min(n / 2);
    let mut counts = std::collections::HashMap::new();
    for &o in &offsets {
        if o >= config.min_period && o < hi {
            *counts.entry(o).or_insert(0usize) += 1;
        }
    }
    let (&period, &count) = counts
        .iter()
        .max_by_key(|(_, &c)| c)
        .ok_or_else(|| ForecastError::Degenerate("no offsets in range".to_string()))?;

    Ok(SinglePeriodResult {
        period: period as f64,
        confidence: (count as f64 / offsets.len() as f64).clamp(0.0, 1.0),
        method: "matrix_profile".to_string(),
    })
}

/// SAZED ensemble: spectral argmax, zero-crossing spacing and the ACF
/// peak vote; the median wins and agreement sets the confidence.
pub fn estimate_period_sazed(
    values: &[f64],
    config: &PeriodDetectionConfig,
) -> Result<SinglePeriodResult> {
    let mut votes: Vec<f64> = Vec::with_capacity(3);

    if let Ok(r) = estimate_period_fft(values, config) {
        votes.push(r.period);
    }
    if let Some(zc) = zero_crossing_period(values) {
        if zc >= config.min_period as f64 && zc <= config.max_period as f64 {
            votes.push(zc);
        }
    }
    if let Ok(r) = estimate_period_acf(values, config) {
        votes.push(r.period);
    }

    if votes.is_empty() {
        return Err(ForecastError::Degenerate("no estimator voted".to_string()));
    }

    let period = numeric::median(&votes);
    let agreement = votes
        .iter()
        .filter(|&&v| (v - period).abs() <= 0.2 * period)
        .count() as f64
        / votes.len() as f64;

    Ok(SinglePeriodResult {
        period,
        confidence: agreement,
        method: "sazed".to_string(),
    })
}

/// Instantaneous period from the ridge of a Morlet wavelet transform.
pub fn instantaneous_period(
    values: &[f64],
    config: &PeriodDetectionConfig,
) -> Result<InstantaneousPeriodResult> {
    let n = values.len();
    if n < 16 {
        return Err(ForecastError::InsufficientData { needed: 16, got: n });
    }

    let mean = numeric::mean(values);
    let centered: Vec<f64> = values.iter().map(|v| v - mean).collect();

    let lo = config.min_period.max(2) as f64;
    let hi = (config.max_period.min(n / 2) as f64).max(lo + 1.0);
    let n_scales = 24usize;
    let ratio = (hi / lo).powf(1.0 / (n_scales - 1) as f64);
    let scales: Vec<f64> = (0..n_scales).map(|s| lo * ratio.powi(s as i32)).collect();

    // Morlet center frequency (omega0 = 6): period ≈ scale.
    let omega0: f64 = 6.0;
    let fourier_factor = 4.0 * std::f64::consts::PI / (omega0 + (2.0 + omega0 * omega0).sqrt());

    let mut ridge_periods = vec![0.0; n];
    let mut ridge_power = vec![0.0; n];
    let mut total_power = vec![0.0; n];

    for &period in &scales {
        let scale = period / fourier_factor;
        let support = (4.0 * scale).ceil() as isize;
        for (t, (rp, (rpow, tot))) in ridge_periods
            .iter_mut()
            .zip(ridge_power.iter_mut().zip(total_power.iter_mut()))
            .enumerate()
        {
            let mut re = 0.0;
            let mut im = 0.0;
            for dt in -support..=support {
                let idx = t as isize + dt;
                if idx < 0 || idx >= n as isize {
                    continue;
                }
                let u = dt as f64 / scale;
                let envelope = (-0.5 * u * u).exp();
                re += centered[idx as usize] * envelope * (omega0 * u).cos();
                im -= centered[idx as usize] * envelope * (omega0 * u).sin();
            }
            let power = (re * re + im * im) / scale;
            *tot += power;
            if power > *rpow {
                *rpow = power;
                *rp = period;
            }
        }
    }

    let mean_period = numeric::mean(&ridge_periods);
    let concentration = {
        let num: f64 = ridge_power.iter().sum();
        let den: f64 = total_power.iter().sum();
        if den > 0.0 {
            (num / den * n_scales as f64 / 4.0).clamp(0.0, 1.0)
        } else {
            0.0
        }
    };

    Ok(InstantaneousPeriodResult {
        periods: ridge_periods,
        mean_period,
        confidence: concentration,
    })
}

/// Iterative multi-period detection: find the strongest period, remove it
/// by decomposition, repeat on the residual.
pub fn detect_multiple_periods(
    values: &[f64],
    config: &PeriodDetectionConfig,
) -> Result<Vec<SinglePeriodResult>> {
    let mut residual = values.to_vec();
    let mut found: Vec<SinglePeriodResult> = Vec::new();
    let mut mstl = MstlDecomposer::new(MstlConfig::default());

    for _ in 0..config.max_peaks {
        let detection = detect_periods(&residual, config)?;
        let Some(period) = detection.primary_period else {
            break;
        };
        if found.iter().any(|f| f.period as usize == period) {
            break;
        }
        let power = detection
            .periods
            .iter()
            .position(|&p| p == period)
            .map(|i| detection.powers[i])
            .unwrap_or(0.0);
        found.push(SinglePeriodResult {
            period: period as f64,
            confidence: power.clamp(0.0, 1.0),
            method: "periodogram".to_string(),
        });

        let decomposition = match mstl.fit(&residual, &[period]) {
            Ok(d) => d,
            Err(_) => break,
        };
        for (r, s) in residual.iter_mut().zip(decomposition.seasonal[0].iter()) {
            *r -= s;
        }
    }

    found.sort_by(|a, b| a.period.partial_cmp(&b.period).unwrap_or(std::cmp::Ordering::Equal));
    Ok(found)
}

fn seasonal_means_rss(values: &[f64], period: usize) -> f64 {
    let n = values.len();
    let mut means = vec![0.0; period];
    let mut counts = vec![0usize; period];
    for (i, &v) in values.iter().enumerate() {
        means[i % period] += v;
        counts[i % period] += 1;
    }
    for (m, &c) in means.iter_mut().zip(counts.iter()) {
        if c > 0 {
            *m /= c as f64;
        }
    }
    (0..n).map(|i| (values[i] - means[i % period]).powi(2)).sum()
}

/// Mean spacing between zero crossings of the detrended series, doubled
/// to a full cycle.
fn zero_crossing_period(values: &[f64]) -> Option<f64> {
    let detrended = polyfit(values, 1).ok()?;
    let resid: Vec<f64> = values
        .iter()
        .zip(detrended.fitted.iter())
        .map(|(v, t)| v - t)
        .collect();

    let mut crossings: Vec<usize> = Vec::new();
    for i in 1..resid.len() {
        if (resid[i - 1] <= 0.0 && resid[i] > 0.0) || (resid[i - 1] >= 0.0 && resid[i] < 0.0) {
            crossings.push(i);
        }
    }
    if crossings.len() < 2 {
        return None;
    }
    let spacings: Vec<f64> = crossings.windows(2).map(|w| (w[1] - w[0]) as f64).collect();
    Some(2.0 * numeric::mean(&spacings))
}

/// Iterative radix-2 FFT; lengths must be a power of two.
fn fft_in_place(re: &mut [f64], im: &mut [f64]) {
    let n = re.len();
    debug_assert!(n.is_power_of_two());

    // Bit-reversal permutation.
    let mut j = 0;
    for i in 1..n {
        let mut bit = n >> 1;
        while j & bit != 0 {
            j ^= bit;
            bit >>= 1;
        }
        j |= bit;
        if i < j {
            re.swap(i, j);
            im.swap(i, j);
        }
    }

    let mut len = 2;
    while len <= n {
        let angle = -2.0 * std::f64::consts::PI / len as f64;
        let (w_re, w_im) = (angle.cos(), angle.sin());
        for start in (0..n).step_by(len) {
            let mut cur_re = 1.0;
            let mut cur_im = 0.0;
            for k in 0..len / 2 {
                let even = start + k;
                let odd = start + k + len / 2;
                let t_re = re[odd] * cur_re - im[odd] * cur_im;
                let t_im = re[odd] * cur_im + im[odd] * cur_re;
                re[odd] = re[even] - t_re;
                im[odd] = im[even] - t_im;
                re[even] += t_re;
                im[even] += t_im;
                let next_re = cur_re * w_re - cur_im * w_im;
                cur_im = cur_re * w_im + cur_im * w_re;
                cur_re = next_re;
            }
        }
        len <<= 1;
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::f64::consts::PI;

    fn sine_series(n: usize, period: f64) -> Vec<f64> {
        (0..n)
            .map(|i| 10.0 + 5.0 * (2.0 * PI * i as f64 / period).sin())
            .collect()
    }

    #[test]
    fn test_periodogram_finds_period() {
        let values = sine_series(144, 12.0);
        let result = detect_periods(&values, &PeriodDetectionConfig::default()).unwrap();
        assert_eq!(result.primary_period, Some(12));
    }

    #[test]
    fn test_periodogram_sorted_ascending() {
        let values: Vec<f64> = (0..240)
            .map(|i| {
                let t = i as f64;
                (2.0 * PI * t / 6.0).sin() + (2.0 * PI * t / 24.0).sin()
            })
            .collect();
        let result = detect_periods(
            &values,
            &PeriodDetectionConfig {
                threshold: 0.3,
                max_peaks: 4,
                ..PeriodDetectionConfig::default()
            },
        )
        .unwrap();
        let mut sorted = result.periods.clone();
        sorted.sort_unstable();
        assert_eq!(result.periods, sorted);
        assert!(result.periods.contains(&6));
    }

    #[test]
    fn test_constant_series_has_no_period() {
        let values = vec![5.0; 100];
        let result = detect_periods(&values, &PeriodDetectionConfig::default()).unwrap();
        assert!(result.periods.is_empty());
        assert_eq!(result.primary_period, None);
    }

    #[test]
    fn test_fft_estimator() {
        let values = sine_series(256, 16.0);
        let result = estimate_period_fft(&values, &PeriodDetectionConfig::default()).unwrap();
        assert!((result.period - 16.0).abs() < 2.0, "got {}", result.period);
        assert!(result.confidence > 0.3);
    }

    #[test]
    fn test_acf_estimator() {
        let values = sine_series(120, 12.0);
        let result = estimate_period_acf(&values, &PeriodDetectionConfig::default()).unwrap();
        assert_eq!(result.period, 12.0);
    }

    #[test]
    fn test_aic_estimator() {
        let values = sine_series(120, 12.0);
        let result = estimate_period_aic(&values, &PeriodDetectionConfig::default()).unwrap();
        assert_eq!(result.period, 12.0);
    }

    #[test]
    fn test_stl_estimator() {
        let values = sine_series(120, 12.0);
        let result = estimate_period_stl(&values, &PeriodDetectionConfig::default()).unwrap();
        assert_eq!(result.period, 12.0);
        assert!(result.confidence > 0.8);
    }

    #[test]
    fn test_sazed_votes() {
        let values = sine_series(240, 12.0);
        let result = estimate_period_sazed(&values, &PeriodDetectionConfig::default()).unwrap();
        assert!((result.period - 12.0).abs() <= 2.0, "got {}", result.period);
    }

    #[test]
    fn test_matrix_profile_estimator() {
        let values = sine_series(160, 8.0);
        let result =
            estimate_period_matrix_profile(&values, &PeriodDetectionConfig::default()).unwrap();
        assert!((result.period - 8.0).abs() <= 1.0, "got {}", result.period);
    }

    #[test]
    fn test_instantaneous_period_tracks_sine() {
        let values = sine_series(200, 10.0);
        let result = instantaneous_period(
            &values,
            &PeriodDetectionConfig {
                min_period: 4,
                max_period: 32,
                ..PeriodDetectionConfig::default()
            },
        )
        .unwrap();
        // Interior ridge should hover near the true period.
        let interior = &result.periods[40..160];
        let mean = interior.iter().sum::<f64>() / interior.len() as f64;
        assert!((mean - 10.0).abs() < 3.0, "mean ridge {mean}");
    }

    #[test]
    fn test_multi_period_detection() {
        let values: Vec<f64> = (0..480)
            .map(|i| {
                let t = i as f64;
                (2.0 * PI * t / 8.0).sin() * 4.0 + (2.0 * PI * t / 48.0).sin() * 8.0
            })
            .collect();
        let found = detect_multiple_periods(
            &values,
            &PeriodDetectionConfig {
                threshold: 0.3,
                max_peaks: 3,
                ..PeriodDetectionConfig::default()
            },
        )
        .unwrap();
        let periods: Vec<usize> = found.iter().map(|f| f.period as usize).collect();
        assert!(periods.contains(&8), "periods {:?}", periods);
    }

    #[test]
    fn test_unknown_method_string() {
        assert!("banana".parse::<PeriodMethod>().is_err());
    }
}
