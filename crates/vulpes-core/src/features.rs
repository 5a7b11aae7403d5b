//! Time series feature extraction.
//!
//! A registry of named feature calculators (tsfresh-style), each with an
//! optional parameter set. The catalog is built lazily once and is
//! immutable afterwards, so concurrent extraction over many series can
//! share it freely.

use std::collections::BTreeMap;
use std::sync::OnceLock;

use crate::error::{ForecastError, Result};
use crate::numeric;
use crate::regression::linear_trend;
use crate::seasonality::{seasonal_strength, StrengthMethod};

/// Parameters for one feature request.
pub type FeatureParams = BTreeMap<String, f64>;

/// One requested feature: a registry name plus optional parameters.
#[derive(Debug, Clone)]
pub struct FeatureRequest {
    pub name: String,
    pub params: FeatureParams,
}

impl FeatureRequest {
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            params: FeatureParams::new(),
        }
    }

    pub fn with_param(mut self, key: impl Into<String>, value: f64) -> Self {
        self.params.insert(key.into(), value);
        self
    }
}

/// An ordered list of feature requests.
#[derive(Debug, Clone, Default)]
pub struct FeatureConfig {
    pub requests: Vec<FeatureRequest>,
}

impl FeatureConfig {
    /// Every registry feature with its default parameters.
    pub fn all() -> Self {
        Self {
            requests: registry()
                .iter()
                .map(|def| FeatureRequest {
                    name: def.name.to_string(),
                    params: def
                        .default_params
                        .iter()
                        .map(|(k, v)| (k.to_string(), *v))
                        .collect(),
                })
                .collect(),
        }
    }
}

/// One computed feature value.
#[derive(Debug, Clone)]
pub struct FeatureValue {
    /// Output name, including parameter suffixes
    /// (e.g. `autocorrelation__lag_3`).
    pub name: String,
    pub value: f64,
    pub is_nan: bool,
}

/// Precomputed context shared by the calculators for one series.
struct FeatureContext<'a> {
    values: &'a [f64],
    n: f64,
    mean: f64,
    std: f64,
    min: f64,
    max: f64,
    sorted: Vec<f64>,
    diffs: Vec<f64>,
}

impl<'a> FeatureContext<'a> {
    fn new(values: &'a [f64]) -> Self {
        let n = values.len() as f64;
        let mean = numeric::mean(values);
        let variance = numeric::variance(values);
        let mut sorted = values.to_vec();
        sorted.sort_by(|a, b| a.partial_cmp(b).unwrap_or(std::cmp::Ordering::Equal));
        Self {
            values,
            n,
            mean,
            std: variance.sqrt(),
            min: sorted.first().copied().unwrap_or(f64::NAN),
            max: sorted.last().copied().unwrap_or(f64::NAN),
            sorted,
            diffs: numeric::diff(values),
        }
    }
}

type Calculator = fn(&FeatureContext, &FeatureParams) -> f64;

/// Registry entry: the canonical feature name, its default parameters,
/// and the calculator.
pub struct FeatureDef {
    pub name: &'static str,
    pub default_params: &'static [(&'static str, f64)],
    calc: Calculator,
}

fn registry() -> &'static Vec<FeatureDef> {
    static REGISTRY: OnceLock<Vec<FeatureDef>> = OnceLock::new();
    REGISTRY.get_or_init(build_registry)
}

/// Names of every registered feature.
pub fn list_features() -> Vec<&'static str> {
    registry().iter().map(|def| def.name).collect()
}

/// Validate a list of requested feature names, returning the unknown
/// ones.
pub fn validate_feature_names(names: &[String]) -> Vec<String> {
    let known: Vec<&str> = list_features();
    names
        .iter()
        .filter(|name| !known.contains(&name.as_str()))
        .cloned()
        .collect()
}

/// Compute the requested features over a series.
pub fn compute_features(values: &[f64], config: &FeatureConfig) -> Result<Vec<FeatureValue>> {
    if values.is_empty() {
        return Err(ForecastError::InsufficientData { needed: 1, got: 0 });
    }

    let context = FeatureContext::new(values);
    let mut out = Vec::with_capacity(config.requests.len());

    for request in &config.requests {
        let def = registry()
            .iter()
            .find(|def| def.name == request.name)
            .ok_or_else(|| {
                ForecastError::invalid_parameter(
                    "feature",
                    &request.name,
                    "unknown feature name",
                )
            })?;

        // Merge defaults under explicit parameters.
        let mut params: FeatureParams = def
            .default_params
            .iter()
            .map(|(k, v)| (k.to_string(), *v))
            .collect();
        for (k, v) in &request.params {
            if !def.default_params.iter().any(|(dk, _)| dk == k) {
                return Err(ForecastError::invalid_parameter(
                    k,
                    *v,
                    format!("unknown parameter for feature {}", def.name),
                ));
            }
            params.insert(k.clone(), *v);
        }

        let value = (def.calc)(&context, &params);
        out.push(FeatureValue {
            name: output_name(def.name, &params),
            value,
            is_nan: value.is_nan(),
        });
    }

    Ok(out)
}

/// Compute every registered feature with default parameters.
pub fn compute_all_features(values: &[f64]) -> Result<Vec<FeatureValue>> {
    compute_features(values, &FeatureConfig::all())
}

fn output_name(base: &str, params: &FeatureParams) -> String {
    if params.is_empty() {
        return base.to_string();
    }
    let suffix: Vec<String> = params
        .iter()
        .map(|(k, v)| {
            if v.fract() == 0.0 && v.abs() < 1e15 {
                format!("{k}_{}", *v as i64)
            } else {
                format!("{k}_{v}")
            }
        })
        .collect();
    format!("{base}__{}", suffix.join("__"))
}

fn param(params: &FeatureParams, key: &str) -> f64 {
    params.get(key).copied().unwrap_or(f64::NAN)
}

// ---------------------------------------------------------------------------
// Calculators
// ---------------------------------------------------------------------------

fn build_registry() -> Vec<FeatureDef> {
    macro_rules! feature {
        ($name:expr, $calc:expr) => {
            FeatureDef {
                name: $name,
                default_params: &[],
                calc: $calc,
            }
        };
        ($name:expr, $params:expr, $calc:expr) => {
            FeatureDef {
                name: $name,
                default_params: $params,
                calc: $calc,
            }
        };
    }

    vec![
        feature!("length", |c, _| c.n),
        feature!("sum", |c, _| c.values.iter().sum()),
        feature!("mean", |c, _| c.mean),
        feature!("median", |c, _| numeric::quantile_sorted(&c.sorted, 0.5)),
        feature!("minimum", |c, _| c.min),
        feature!("maximum", |c, _| c.max),
        feature!("range", |c, _| c.max - c.min),
        feature!("variance", |c, _| c.std * c.std),
        feature!("standard_deviation", |c, _| c.std),
        feature!("variation_coefficient", |c, _| {
            if c.mean.abs() > f64::EPSILON {
                c.std / c.mean.abs()
            } else {
                f64::NAN
            }
        }),
        feature!(
            "large_standard_deviation",
            &[("r", 0.25)],
            |c, p| {
                if c.std > param(p, "r") * (c.max - c.min) {
                    1.0
                } else {
                    0.0
                }
            }
        ),
        feature!("quantile", &[("q", 0.5)], |c, p| {
            numeric::quantile_sorted(&c.sorted, param(p, "q"))
        }),
        feature!("interquartile_range", |c, _| {
            numeric::quantile_sorted(&c.sorted, 0.75) - numeric::quantile_sorted(&c.sorted, 0.25)
        }),
        feature!("skewness", |c, _| {
            if c.n > 2.0 && c.std > f64::EPSILON {
                c.values
                    .iter()
                    .map(|v| ((v - c.mean) / c.std).powi(3))
                    .sum::<f64>()
                    / c.n
            } else {
                f64::NAN
            }
        }),
        feature!("kurtosis", |c, _| {
            if c.n > 3.0 && c.std > f64::EPSILON {
                c.values
                    .iter()
                    .map(|v| ((v - c.mean) / c.std).powi(4))
                    .sum::<f64>()
                    / c.n
                    - 3.0
            } else {
                f64::NAN
            }
        }),
        feature!("first_value", |c, _| c.values[0]),
        feature!("last_value", |c, _| c.values[c.values.len() - 1]),
        feature!("abs_energy", |c, _| c.values.iter().map(|v| v * v).sum()),
        feature!("root_mean_square", |c, _| {
            (c.values.iter().map(|v| v * v).sum::<f64>() / c.n).sqrt()
        }),
        feature!("mean_change", |c, _| {
            if c.diffs.is_empty() {
                f64::NAN
            } else {
                numeric::mean(&c.diffs)
            }
        }),
        feature!("mean_abs_change", |c, _| {
            if c.diffs.is_empty() {
                f64::NAN
            } else {
                c.diffs.iter().map(|d| d.abs()).sum::<f64>() / c.diffs.len() as f64
            }
        }),
        feature!("absolute_sum_of_changes", |c, _| {
            c.diffs.iter().map(|d| d.abs()).sum()
        }),
        feature!("mean_second_derivative_central", |c, _| {
            if c.values.len() > 2 {
                c.values
                    .windows(3)
                    .map(|w| w[2] - 2.0 * w[1] + w[0])
                    .sum::<f64>()
                    / (c.values.len() - 2) as f64
            } else {
                f64::NAN
            }
        }),
        feature!("cid_ce", |c, _| {
            c.diffs.iter().map(|d| d * d).sum::<f64>().sqrt()
        }),
        feature!("count_above_mean", |c, _| {
            c.values.iter().filter(|&&v| v > c.mean).count() as f64
        }),
        feature!("count_below_mean", |c, _| {
            c.values.iter().filter(|&&v| v < c.mean).count() as f64
        }),
        feature!("percentage_above_mean", |c, _| {
            c.values.iter().filter(|&&v| v > c.mean).count() as f64 / c.n
        }),
        feature!("zero_crossing_rate", |c, _| {
            let crossings = c
                .values
                .windows(2)
                .filter(|w| w[0].signum() != w[1].signum() && w[0] != 0.0 && w[1] != 0.0)
                .count() as f64;
            crossings / (c.n - 1.0).max(1.0)
        }),
        feature!("number_crossing_m", &[("m", 0.0)], |c, p| {
            let m = param(p, "m");
            c.values
                .windows(2)
                .filter(|w| (w[0] < m && w[1] > m) || (w[0] > m && w[1] < m))
                .count() as f64
        }),
        feature!("longest_strike_above_mean", |c, _| {
            longest_strike(c.values, c.mean, true)
        }),
        feature!("longest_strike_below_mean", |c, _| {
            longest_strike(c.values, c.mean, false)
        }),
        feature!("flat_spots", |c, _| {
            // Longest run inside one decile band.
            if c.max - c.min < f64::EPSILON {
                return c.n;
            }
            let mut longest = 0usize;
            let mut current = 1usize;
            let band = |v: f64| (((v - c.min) / (c.max - c.min)) * 10.0).floor().min(9.0) as usize;
            for w in c.values.windows(2) {
                if band(w[0]) == band(w[1]) {
                    current += 1;
                } else {
                    longest = longest.max(current);
                    current = 1;
                }
            }
            longest.max(current) as f64
        }),
        feature!("number_peaks", &[("support", 1.0)], |c, p| {
            let support = param(p, "support").max(1.0) as usize;
            count_peaks(c.values, support) as f64
        }),
        feature!("autocorrelation", &[("lag", 1.0)], |c, p| {
            numeric::autocorrelation(c.values, param(p, "lag").max(0.0) as usize)
        }),
        feature!("partial_autocorrelation", &[("lag", 1.0)], |c, p| {
            partial_autocorrelation(c.values, param(p, "lag").max(0.0) as usize)
        }),
        feature!("first_location_of_maximum", |c, _| {
            location_of(c.values, c.max, true) / c.n
        }),
        feature!("last_location_of_maximum", |c, _| {
            location_of(c.values, c.max, false) / c.n
        }),
        feature!("first_location_of_minimum", |c, _| {
            location_of(c.values, c.min, true) / c.n
        }),
        feature!("last_location_of_minimum", |c, _| {
            location_of(c.values, c.min, false) / c.n
        }),
        feature!("index_mass_quantile", &[("q", 0.5)], |c, p| {
            let q = param(p, "q").clamp(0.0, 1.0);
            let total: f64 = c.values.iter().map(|v| v.abs()).sum();
            if total <= 0.0 {
                return f64::NAN;
            }
            let mut acc = 0.0;
            for (i, v) in c.values.iter().enumerate() {
                acc += v.abs();
                if acc >= q * total {
                    return (i + 1) as f64 / c.n;
                }
            }
            1.0
        }),
        feature!("benford_correlation", |c, _| benford_correlation(c.values)),
        feature!("binned_entropy", &[("bins", 10.0)], |c, p| {
            binned_entropy(c.values, param(p, "bins").max(2.0) as usize)
        }),
        feature!(
            "sample_entropy",
            &[("m", 2.0), ("r", 0.2)],
            |c, p| {
                sample_entropy(
                    c.values,
                    param(p, "m").max(1.0) as usize,
                    param(p, "r") * c.std,
                )
            }
        ),
        feature!(
            "approximate_entropy",
            &[("m", 2.0), ("r", 0.2)],
            |c, p| {
                approximate_entropy(
                    c.values,
                    param(p, "m").max(1.0) as usize,
                    param(p, "r") * c.std,
                )
            }
        ),
        feature!("permutation_entropy", &[("order", 3.0)], |c, p| {
            permutation_entropy(c.values, param(p, "order").clamp(2.0, 6.0) as usize)
        }),
        feature!("spectral_entropy", |c, _| spectral_entropy(c.values)),
        feature!("ratio_beyond_r_sigma", &[("r", 1.0)], |c, p| {
            let threshold = param(p, "r") * c.std;
            c.values
                .iter()
                .filter(|&&v| (v - c.mean).abs() > threshold)
                .count() as f64
                / c.n
        }),
        feature!("count_unique", |c, _| count_unique(&c.sorted) as f64),
        feature!("ratio_value_number_to_length", |c, _| {
            count_unique(&c.sorted) as f64 / c.n
        }),
        feature!("has_duplicate", |c, _| {
            if count_unique(&c.sorted) < c.values.len() {
                1.0
            } else {
                0.0
            }
        }),
        feature!("has_duplicate_max", |c, _| {
            if c.values.iter().filter(|&&v| v == c.max).count() > 1 {
                1.0
            } else {
                0.0
            }
        }),
        feature!("has_duplicate_min", |c, _| {
            if c.values.iter().filter(|&&v| v == c.min).count() > 1 {
                1.0
            } else {
                0.0
            }
        }),
        feature!("mean_n_absolute_max", &[("n", 7.0)], |c, p| {
            let take = (param(p, "n").max(1.0) as usize).min(c.values.len());
            let mut magnitudes: Vec<f64> = c.values.iter().map(|v| v.abs()).collect();
            magnitudes.sort_by(|a, b| b.partial_cmp(a).unwrap_or(std::cmp::Ordering::Equal));
            numeric::mean(&magnitudes[..take])
        }),
        feature!("c3", &[("lag", 1.0)], |c, p| {
            let lag = param(p, "lag").max(1.0) as usize;
            if c.values.len() <= 2 * lag {
                return f64::NAN;
            }
            let count = c.values.len() - 2 * lag;
            (0..count)
                .map(|i| c.values[i + 2 * lag] * c.values[i + lag] * c.values[i])
                .sum::<f64>()
                / count as f64
        }),
        feature!("time_reversal_asymmetry", &[("lag", 1.0)], |c, p| {
            let lag = param(p, "lag").max(1.0) as usize;
            if c.values.len() <= 2 * lag {
                return f64::NAN;
            }
            let count = c.values.len() - 2 * lag;
            (0..count)
                .map(|i| {
                    let a = c.values[i + 2 * lag];
                    let b = c.values[i + lag];
                    let d = c.values[i];
                    a * a * b - b * d * d
                })
                .sum::<f64>()
                / count as f64
        }),
        feature!("linear_trend_slope", |c, _| {
            linear_trend(c.values).map(|(slope, _)| slope).unwrap_or(f64::NAN)
        }),
        feature!("linear_trend_intercept", |c, _| {
            linear_trend(c.values)
                .map(|(_, intercept)| intercept)
                .unwrap_or(f64::NAN)
        }),
        feature!("linear_trend_r_squared", |c, _| {
            linear_trend_r_squared(c.values)
        }),
        feature!("trend_strength", |c, _| {
            crate::seasonality::trend_strength(c.values, None).unwrap_or(f64::NAN)
        }),
        feature!("seasonal_strength", &[("period", 12.0)], |c, p| {
            let period = param(p, "period").max(2.0) as usize;
            seasonal_strength(c.values, period, StrengthMethod::Variance).unwrap_or(f64::NAN)
        }),
        feature!("stability", &[("chunks", 10.0)], |c, p| {
            chunked_moment(c.values, param(p, "chunks").max(2.0) as usize, false)
        }),
        feature!("lumpiness", &[("chunks", 10.0)], |c, p| {
            chunked_moment(c.values, param(p, "chunks").max(2.0) as usize, true)
        }),
        feature!("hurst_exponent", |c, _| hurst_exponent(c.values)),
        feature!(
            "energy_ratio_by_chunks",
            &[("chunks", 10.0), ("focus", 0.0)],
            |c, p| {
                let chunks = param(p, "chunks").max(1.0) as usize;
                let focus = param(p, "focus").max(0.0) as usize;
                energy_ratio_by_chunks(c.values, chunks, focus)
            }
        ),
    ]
}

fn longest_strike(values: &[f64], mean: f64, above: bool) -> f64 {
    let mut longest = 0usize;
    let mut current = 0usize;
    for &v in values {
        let hit = if above { v > mean } else { v < mean };
        if hit {
            current += 1;
            longest = longest.max(current);
        } else {
            current = 0;
        }
    }
    longest as f64
}

fn count_peaks(values: &[f64], support: usize) -> usize {
    let n = values.len();
    if n < 2 * support + 1 {
        return 0;
    }
    (support..n - support)
        .filter(|&i| {
            (1..=support).all(|k| values[i] > values[i - k] && values[i] > values[i + k])
        })
        .count()
}

/// Durbin-Levinson recursion up to the requested lag.
fn partial_autocorrelation(values: &[f64], lag: usize) -> f64 {
    if lag == 0 {
        return 1.0;
    }
    if values.len() <= lag + 1 {
        return f64::NAN;
    }
    let rho: Vec<f64> = (1..=lag)
        .map(|k| numeric::autocorrelation(values, k))
        .collect();
    let mut phi = vec![vec![0.0; lag + 1]; lag + 1];
    phi[1][1] = rho[0];
    for k in 2..=lag {
        let mut num = rho[k - 1];
        let mut den = 1.0;
        for j in 1..k {
            num -= phi[k - 1][j] * rho[k - 1 - j];
            den -= phi[k - 1][j] * rho[j - 1];
        }
        if den.abs() < 1e-12 {
            return f64::NAN;
        }
        phi[k][k] = num / den;
        for j in 1..k {
            phi[k][j] = phi[k - 1][j] - phi[k][k] * phi[k - 1][k - j];
        }
    }
    phi[lag][lag]
}

fn location_of(values: &[f64], target: f64, first: bool) -> f64 {
    let position = if first {
        values.iter().position(|&v| v == target)
    } else {
        values.iter().rposition(|&v| v == target)
    };
    position.map(|i| i as f64).unwrap_or(f64::NAN)
}

fn benford_correlation(values: &[f64]) -> f64 {
    let mut counts = [0.0_f64; 9];
    let mut total = 0.0;
    for &v in values {
        let mut magnitude = v.abs();
        if magnitude == 0.0 || !magnitude.is_finite() {
            continue;
        }
        while magnitude >= 10.0 {
            magnitude /= 10.0;
        }
        while magnitude < 1.0 {
            magnitude *= 10.0;
        }
        counts[(magnitude as usize).clamp(1, 9) - 1] += 1.0;
        total += 1.0;
    }
    if total == 0.0 {
        return f64::NAN;
    }
    let observed: Vec<f64> = counts.iter().map(|c| c / total).collect();
    let expected: Vec<f64> = (1..=9).map(|d| (1.0 + 1.0 / d as f64).log10()).collect();
    correlation(&observed, &expected)
}

fn correlation(a: &[f64], b: &[f64]) -> f64 {
    let mean_a = numeric::mean(a);
    let mean_b = numeric::mean(b);
    let mut num = 0.0;
    let mut da = 0.0;
    let mut db = 0.0;
    for (x, y) in a.iter().zip(b.iter()) {
        num += (x - mean_a) * (y - mean_b);
        da += (x - mean_a).powi(2);
        db += (y - mean_b).powi(2);
    }
    if da <= 0.0 || db <= 0.0 {
        return f64::NAN;
    }
    num / (da * db).sqrt()
}

fn binned_entropy(values: &[f64], bins: usize) -> f64 {
    let min = values.iter().cloned().fold(f64::INFINITY, f64::min);
    let max = values.iter().cloned().fold(f64::NEG_INFINITY, f64::max);
    if max - min < f64::EPSILON {
        return 0.0;
    }
    let mut counts = vec![0usize; bins];
    for &v in values {
        let bin = (((v - min) / (max - min)) * bins as f64) as usize;
        counts[bin.min(bins - 1)] += 1;
    }
    let n = values.len() as f64;
    -counts
        .iter()
        .filter(|&&c| c > 0)
        .map(|&c| {
            let p = c as f64 / n;
            p * p.ln()
        })
        .sum::<f64>()
}

fn phi_entropy(values: &[f64], m: usize, r: f64, average_log: bool) -> f64 {
    let n = values.len();
    if n < m + 1 || r <= 0.0 {
        return f64::NAN;
    }
    let count = n - m + 1;
    let mut total = 0.0;
    let mut matches_log = 0.0;
    for i in 0..count {
        let mut matches = 0usize;
        for j in 0..count {
            let close = (0..m).all(|k| (values[i + k] - values[j + k]).abs() <= r);
            if close {
                matches += 1;
            }
        }
        total += matches as f64;
        matches_log += (matches as f64 / count as f64).ln();
    }
    if average_log {
        matches_log / count as f64
    } else {
        total
    }
}

fn approximate_entropy(values: &[f64], m: usize, r: f64) -> f64 {
    let phi_m = phi_entropy(values, m, r, true);
    let phi_m1 = phi_entropy(values, m + 1, r, true);
    if !phi_m.is_finite() || !phi_m1.is_finite() {
        return f64::NAN;
    }
    phi_m - phi_m1
}

fn sample_entropy(values: &[f64], m: usize, r: f64) -> f64 {
    // Self-matches excluded, unlike approximate entropy.
    let n = values.len();
    if n < m + 2 || r <= 0.0 {
        return f64::NAN;
    }
    let count_pairs = |width: usize| -> f64 {
        let count = n - width + 1;
        let mut matches = 0usize;
        for i in 0..count {
            for j in (i + 1)..count {
                if (0..width).all(|k| (values[i + k] - values[j + k]).abs() <= r) {
                    matches += 1;
                }
            }
        }
        matches as f64
    };
    let b = count_pairs(m);
    let a = count_pairs(m + 1);
    if b <= 0.0 || a <= 0.0 {
        return f64::NAN;
    }
    -(a / b).ln()
}

fn permutation_entropy(values: &[f64], order: usize) -> f64 {
    let n = values.len();
    if n < order + 1 {
        return f64::NAN;
    }
    let mut counts: BTreeMap<Vec<usize>, usize> = BTreeMap::new();
    for window in values.windows(order) {
        let mut ranks: Vec<usize> = (0..order).collect();
        ranks.sort_by(|&a, &b| {
            window[a]
                .partial_cmp(&window[b])
                .unwrap_or(std::cmp::Ordering::Equal)
        });
        *counts.entry(ranks).or_insert(0) += 1;
    }
    let total = (n - order + 1) as f64;
    let entropy = -counts
        .values()
        .map(|&c| {
            let p = c as f64 / total;
            p * p.ln()
        })
        .sum::<f64>();
    // Normalized by the maximum over order! patterns.
    let max_entropy = (1..=order).map(|k| k as f64).map(f64::ln).sum::<f64>();
    if max_entropy > 0.0 {
        entropy / max_entropy
    } else {
        0.0
    }
}

fn spectral_entropy(values: &[f64]) -> f64 {
    let n = values.len();
    if n < 8 {
        return f64::NAN;
    }
    // Power over the lag-autocovariance pseudo-spectrum.
    let powers: Vec<f64> = (1..n / 2).map(|lag| numeric::lag_power(values, lag)).collect();
    let total: f64 = powers.iter().sum();
    if total <= 0.0 {
        return 0.0;
    }
    let entropy = -powers
        .iter()
        .filter(|&&p| p > 0.0)
        .map(|&p| {
            let q = p / total;
            q * q.ln()
        })
        .sum::<f64>();
    entropy / (powers.len() as f64).ln().max(f64::EPSILON)
}

/// Variance of chunked means (stability) or of chunked variances
/// (lumpiness).
fn chunked_moment(values: &[f64], chunks: usize, of_variance: bool) -> f64 {
    let n = values.len();
    let size = (n / chunks).max(1);
    let stats: Vec<f64> = values
        .chunks(size)
        .filter(|chunk| !chunk.is_empty())
        .map(|chunk| {
            if of_variance {
                numeric::variance(chunk)
            } else {
                numeric::mean(chunk)
            }
        })
        .collect();
    if stats.len() < 2 {
        return f64::NAN;
    }
    numeric::variance(&stats)
}

/// Rescaled-range estimate of the Hurst exponent.
fn hurst_exponent(values: &[f64]) -> f64 {
    let n = values.len();
    if n < 20 {
        return f64::NAN;
    }
    let mut log_sizes = Vec::new();
    let mut log_rs = Vec::new();
    let mut size = 8usize;
    while size <= n / 2 {
        let mut rs_values = Vec::new();
        for chunk in values.chunks(size) {
            if chunk.len() < size {
                continue;
            }
            let mean = numeric::mean(chunk);
            let mut cumulative = 0.0;
            let mut min_dev = f64::INFINITY;
            let mut max_dev = f64::NEG_INFINITY;
            for &v in chunk {
                cumulative += v - mean;
                min_dev = min_dev.min(cumulative);
                max_dev = max_dev.max(cumulative);
            }
            let std = numeric::variance(chunk).sqrt();
            if std > f64::EPSILON {
                rs_values.push((max_dev - min_dev) / std);
            }
        }
        if !rs_values.is_empty() {
            log_sizes.push((size as f64).ln());
            log_rs.push(numeric::mean(&rs_values).max(f64::EPSILON).ln());
        }
        size *= 2;
    }
    if log_sizes.len() < 2 {
        return f64::NAN;
    }
    // Slope of log(R/S) against log(size).
    let mean_x = numeric::mean(&log_sizes);
    let mean_y = numeric::mean(&log_rs);
    let mut num = 0.0;
    let mut den = 0.0;
    for (x, y) in log_sizes.iter().zip(log_rs.iter()) {
        num += (x - mean_x) * (y - mean_y);
        den += (x - mean_x).powi(2);
    }
    if den <= 0.0 {
        return f64::NAN;
    }
    num / den
}

fn energy_ratio_by_chunks(values: &[f64], chunks: usize, focus: usize) -> f64 {
    let n = values.len();
    let size = n.div_ceil(chunks.max(1));
    let total: f64 = values.iter().map(|v| v * v).sum();
    if total <= 0.0 {
        return f64::NAN;
    }
    let chunk: Vec<&[f64]> = values.chunks(size).collect();
    match chunk.get(focus) {
        Some(slice) => slice.iter().map(|v| v * v).sum::<f64>() / total,
        None => f64::NAN,
    }
}

fn linear_trend_r_squared(values: &[f64]) -> f64 {
    match linear_trend(values) {
        Ok((slope, intercept)) => {
            let fitted: Vec<f64> = (0..values.len())
                .map(|i| intercept + slope * i as f64)
                .collect();
            let var_y = numeric::variance(values);
            if var_y < f64::EPSILON {
                return f64::NAN;
            }
            let resid: Vec<f64> = values
                .iter()
                .zip(fitted.iter())
                .map(|(y, f)| y - f)
                .collect();
            (1.0 - numeric::variance(&resid) / var_y).clamp(0.0, 1.0)
        }
        Err(_) => f64::NAN,
    }
}

fn count_unique(sorted: &[f64]) -> usize {
    if sorted.is_empty() {
        return 0;
    }
    1 + sorted.windows(2).filter(|w| w[0] != w[1]).count()
}

#[cfg(test)]
mod tests {
    use super::*;
    use approx::assert_relative_eq;

    #[test]
    fn test_registry_size_and_uniqueness() {
        let names = list_features();
        assert!(names.len() >= 55, "registry has {} features", names.len());
        let mut deduped = names.clone();
        deduped.sort_unstable();
        deduped.dedup();
        assert_eq!(deduped.len(), names.len());
    }

    #[test]
    fn test_basic_statistics() {
        let values = vec![1.0, 2.0, 3.0, 4.0, 5.0];
        let config = FeatureConfig {
            requests: vec![
                FeatureRequest::new("mean"),
                FeatureRequest::new("median"),
                FeatureRequest::new("sum"),
                FeatureRequest::new("range"),
            ],
        };
        let out = compute_features(&values, &config).unwrap();
        assert_relative_eq!(out[0].value, 3.0);
        assert_relative_eq!(out[1].value, 3.0);
        assert_relative_eq!(out[2].value, 15.0);
        assert_relative_eq!(out[3].value, 4.0);
    }

    #[test]
    fn test_parameterized_output_names() {
        let values: Vec<f64> = (0..40).map(|i| (i as f64 * 0.5).sin()).collect();
        let config = FeatureConfig {
            requests: vec![
                FeatureRequest::new("autocorrelation").with_param("lag", 3.0),
                FeatureRequest::new("quantile").with_param("q", 0.25),
            ],
        };
        let out = compute_features(&values, &config).unwrap();
        assert_eq!(out[0].name, "autocorrelation__lag_3");
        assert_eq!(out[1].name, "quantile__q_0.25");
    }

    #[test]
    fn test_unknown_feature_fails() {
        let config = FeatureConfig {
            requests: vec![FeatureRequest::new("not_a_feature")],
        };
        assert!(compute_features(&[1.0, 2.0], &config).is_err());
    }

    #[test]
    fn test_unknown_feature_param_fails() {
        let config = FeatureConfig {
            requests: vec![FeatureRequest::new("autocorrelation").with_param("lga", 2.0)],
        };
        assert!(compute_features(&[1.0, 2.0, 3.0], &config).is_err());
    }

    #[test]
    fn test_nan_flag_set() {
        // MAPE-like undefined case: variation coefficient of a zero-mean
        // series.
        let values = vec![-1.0, 1.0, -1.0, 1.0];
        let config = FeatureConfig {
            requests: vec![FeatureRequest::new("variation_coefficient")],
        };
        let out = compute_features(&values, &config).unwrap();
        assert!(out[0].is_nan);
    }

    #[test]
    fn test_all_features_run_on_typical_series() {
        let values: Vec<f64> = (0..120)
            .map(|i| 10.0 + 0.1 * i as f64 + (2.0 * std::f64::consts::PI * i as f64 / 12.0).sin())
            .collect();
        let out = compute_all_features(&values).unwrap();
        assert_eq!(out.len(), list_features().len());
        for feature in &out {
            assert_eq!(feature.is_nan, feature.value.is_nan(), "{}", feature.name);
        }
    }

    #[test]
    fn test_permutation_entropy_ordering() {
        // Monotone input has a single pattern, noise has many.
        let monotone: Vec<f64> = (0..60).map(|i| i as f64).collect();
        let noisy: Vec<f64> = (0..60).map(|i| ((i * 37) % 11) as f64).collect();
        let config = FeatureConfig {
            requests: vec![FeatureRequest::new("permutation_entropy")],
        };
        let low = compute_features(&monotone, &config).unwrap()[0].value;
        let high = compute_features(&noisy, &config).unwrap()[0].value;
        assert!(low < high, "monotone {low} noisy {high}");
    }

    #[test]
    fn test_validate_feature_names() {
        let unknown = validate_feature_names(&[
            "mean".to_string(),
            "bogus".to_string(),
        ]);
        assert_eq!(unknown, vec!["bogus".to_string()]);
    }

    #[test]
    fn test_hurst_of_trending_series() {
        let values: Vec<f64> = (0..160).map(|i| i as f64).collect();
        let config = FeatureConfig {
            requests: vec![FeatureRequest::new("hurst_exponent")],
        };
        let h = compute_features(&values, &config).unwrap()[0].value;
        assert!(h > 0.7, "hurst {h}");
    }
}
