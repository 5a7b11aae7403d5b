//! Baseline and exponential smoothing forecasters.
//!
//! The simple models: Naive, SeasonalNaive, RandomWalkDrift, SMA,
//! SeasonalWindowAverage, and the closed-form smoothing family (SES,
//! Holt, Holt-Winters, SeasonalES) with optional Nelder–Mead parameter
//! search. These are the fast paths; the full state-space treatment
//! lives in the ETS module.

use crate::error::{ForecastError, Result};
use crate::forecast::{validate_horizon_level, Forecast, Forecaster};
use crate::numeric;
use crate::optim::{nelder_mead_minimize, NelderMeadOptions};

const MIN_FIT: usize = 3;

fn require_fit_length(n: usize) -> Result<()> {
    if n < MIN_FIT {
        return Err(ForecastError::InsufficientData {
            needed: MIN_FIT,
            got: n,
        });
    }
    Ok(())
}

fn innovation_sigma(residuals: &[f64]) -> f64 {
    if residuals.is_empty() {
        return 0.0;
    }
    (residuals.iter().map(|r| r * r).sum::<f64>() / residuals.len() as f64).sqrt()
}

fn bands(point: &[f64], sigmas: &[f64], level: f64) -> (Vec<f64>, Vec<f64>) {
    let z = numeric::normal_interval_z(level);
    let lower = point
        .iter()
        .zip(sigmas.iter())
        .map(|(p, s)| p - z * s)
        .collect();
    let upper = point
        .iter()
        .zip(sigmas.iter())
        .map(|(p, s)| p + z * s)
        .collect();
    (lower, upper)
}

/// Last-value forecaster. Interval half-width grows with √h.
#[derive(Debug, Clone, Default)]
pub struct Naive {
    last: f64,
    sigma: f64,
    fitted: Vec<f64>,
    residuals: Vec<f64>,
    is_fit: bool,
}

impl Naive {
    pub fn new() -> Self {
        Self::default()
    }
}

impl Forecaster for Naive {
    fn fit(&mut self, values: &[f64]) -> Result<()> {
        require_fit_length(values.len())?;
        self.last = *values.last().expect("length checked");
        self.fitted = std::iter::once(values[0])
            .chain(values[..values.len() - 1].iter().copied())
            .collect();
        self.residuals = values
            .iter()
            .zip(self.fitted.iter())
            .map(|(y, f)| y - f)
            .collect();
        self.sigma = innovation_sigma(&self.residuals[1..]);
        self.is_fit = true;
        Ok(())
    }

    fn forecast(&self, horizon: usize, level: f64) -> Result<Forecast> {
        ensure_fit(self.is_fit)?;
        validate_horizon_level(horizon, level)?;
        let point = vec![self.last; horizon];
        let sigmas: Vec<f64> = (1..=horizon)
            .map(|h| self.sigma * (h as f64).sqrt())
            .collect();
        let (lower, upper) = bands(&point, &sigmas, level);
        Ok(Forecast {
            point,
            lower,
            upper,
            level,
        })
    }

    fn fitted(&self) -> Option<&[f64]> {
        self.is_fit.then_some(self.fitted.as_slice())
    }

    fn residuals(&self) -> Option<&[f64]> {
        self.is_fit.then_some(self.residuals.as_slice())
    }

    fn name(&self) -> &'static str {
        "Naive"
    }
}

/// Repeats the last full seasonal cycle.
#[derive(Debug, Clone)]
pub struct SeasonalNaive {
    period: usize,
    last_cycle: Vec<f64>,
    sigma: f64,
    fitted: Vec<f64>,
    residuals: Vec<f64>,
    is_fit: bool,
}

impl SeasonalNaive {
    pub fn new(period: usize) -> Result<Self> {
        if period < 1 {
            return Err(ForecastError::invalid_parameter(
                "period",
                period,
                "must be at least 1",
            ));
        }
        Ok(Self {
            period,
            last_cycle: Vec::new(),
            sigma: 0.0,
            fitted: Vec::new(),
            residuals: Vec::new(),
            is_fit: false,
        })
    }
}

impl Forecaster for SeasonalNaive {
    fn fit(&mut self, values: &[f64]) -> Result<()> {
        let n = values.len();
        require_fit_length(n)?;
        if n < self.period {
            return Err(ForecastError::InsufficientData {
                needed: self.period,
                got: n,
            });
        }
        let p = self.period;
        self.last_cycle = values[n - p..].to_vec();
        self.fitted = (0..n)
            .map(|t| if t >= p { values[t - p] } else { values[t % p] })
            .collect();
        self.residuals = values
            .iter()
            .zip(self.fitted.iter())
            .map(|(y, f)| y - f)
            .collect();
        self.sigma = if n > p {
            innovation_sigma(&self.residuals[p..])
        } else {
            0.0
        };
        self.is_fit = true;
        Ok(())
    }

    fn forecast(&self, horizon: usize, level: f64) -> Result<Forecast> {
        ensure_fit(self.is_fit)?;
        validate_horizon_level(horizon, level)?;
        let p = self.period;
        let point: Vec<f64> = (0..horizon).map(|k| self.last_cycle[k % p]).collect();
        // Uncertainty grows with the number of repeated cycles.
        let sigmas: Vec<f64> = (0..horizon)
            .map(|k| self.sigma * ((k / p + 1) as f64).sqrt())
            .collect();
        let (lower, upper) = bands(&point, &sigmas, level);
        Ok(Forecast {
            point,
            lower,
            upper,
            level,
        })
    }

    fn fitted(&self) -> Option<&[f64]> {
        self.is_fit.then_some(self.fitted.as_slice())
    }

    fn residuals(&self) -> Option<&[f64]> {
        self.is_fit.then_some(self.residuals.as_slice())
    }

    fn name(&self) -> &'static str {
        "SeasonalNaive"
    }
}

/// Random walk with drift.
#[derive(Debug, Clone, Default)]
pub struct RandomWalkDrift {
    last: f64,
    drift: f64,
    sigma: f64,
    n: usize,
    fitted: Vec<f64>,
    residuals: Vec<f64>,
    is_fit: bool,
}

impl RandomWalkDrift {
    pub fn new() -> Self {
        Self::default()
    }
}

impl Forecaster for RandomWalkDrift {
    fn fit(&mut self, values: &[f64]) -> Result<()> {
        let n = values.len();
        require_fit_length(n)?;
        self.last = values[n - 1];
        self.drift = (values[n - 1] - values[0]) / (n - 1) as f64;
        self.fitted = (0..n)
            .map(|t| {
                if t == 0 {
                    values[0]
                } else {
                    values[t - 1] + self.drift
                }
            })
            .collect();
        self.residuals = values
            .iter()
            .zip(self.fitted.iter())
            .map(|(y, f)| y - f)
            .collect();
        self.sigma = innovation_sigma(&self.residuals[1..]);
        self.n = n;
        self.is_fit = true;
        Ok(())
    }

    fn forecast(&self, horizon: usize, level: f64) -> Result<Forecast> {
        ensure_fit(self.is_fit)?;
        validate_horizon_level(horizon, level)?;
        let point: Vec<f64> = (1..=horizon)
            .map(|h| self.last + self.drift * h as f64)
            .collect();
        // Drift-adjusted variance: h·(1 + h/(n−1)).
        let sigmas: Vec<f64> = (1..=horizon)
            .map(|h| {
                let h_f = h as f64;
                self.sigma * (h_f * (1.0 + h_f / (self.n - 1) as f64)).sqrt()
            })
            .collect();
        let (lower, upper) = bands(&point, &sigmas, level);
        Ok(Forecast {
            point,
            lower,
            upper,
            level,
        })
    }

    fn fitted(&self) -> Option<&[f64]> {
        self.is_fit.then_some(self.fitted.as_slice())
    }

    fn residuals(&self) -> Option<&[f64]> {
        self.is_fit.then_some(self.residuals.as_slice())
    }

    fn name(&self) -> &'static str {
        "RandomWalkDrift"
    }
}

/// Simple moving average of the last `window` observations.
#[derive(Debug, Clone)]
pub struct Sma {
    window: usize,
    mean: f64,
    sigma: f64,
    fitted: Vec<f64>,
    residuals: Vec<f64>,
    is_fit: bool,
}

impl Sma {
    pub fn new(window: usize) -> Result<Self> {
        if window < 1 {
            return Err(ForecastError::invalid_parameter(
                "window",
                window,
                "must be at least 1",
            ));
        }
        Ok(Self {
            window,
            mean: 0.0,
            sigma: 0.0,
            fitted: Vec::new(),
            residuals: Vec::new(),
            is_fit: false,
        })
    }
}

impl Forecaster for Sma {
    fn fit(&mut self, values: &[f64]) -> Result<()> {
        let n = values.len();
        require_fit_length(n)?;
        let w = self.window.min(n);
        self.mean = values[n - w..].iter().sum::<f64>() / w as f64;
        self.fitted = (0..n)
            .map(|t| {
                let start = t.saturating_sub(w);
                if t == 0 {
                    values[0]
                } else {
                    values[start..t].iter().sum::<f64>() / (t - start) as f64
                }
            })
            .collect();
        self.residuals = values
            .iter()
            .zip(self.fitted.iter())
            .map(|(y, f)| y - f)
            .collect();
        self.sigma = innovation_sigma(&self.residuals[1..]);
        self.is_fit = true;
        Ok(())
    }

    fn forecast(&self, horizon: usize, level: f64) -> Result<Forecast> {
        ensure_fit(self.is_fit)?;
        validate_horizon_level(horizon, level)?;
        let point = vec![self.mean; horizon];
        let sigmas = vec![self.sigma; horizon];
        let (lower, upper) = bands(&point, &sigmas, level);
        Ok(Forecast {
            point,
            lower,
            upper,
            level,
        })
    }

    fn fitted(&self) -> Option<&[f64]> {
        self.is_fit.then_some(self.fitted.as_slice())
    }

    fn residuals(&self) -> Option<&[f64]> {
        self.is_fit.then_some(self.residuals.as_slice())
    }

    fn name(&self) -> &'static str {
        "SMA"
    }
}

/// Mean of the last `window` values at each seasonal position.
#[derive(Debug, Clone)]
pub struct SeasonalWindowAverage {
    period: usize,
    window: usize,
    seasonal_means: Vec<f64>,
    start_pos: usize,
    sigma: f64,
    is_fit: bool,
}

impl SeasonalWindowAverage {
    pub fn new(period: usize, window: usize) -> Result<Self> {
        if period < 1 {
            return Err(ForecastError::invalid_parameter(
                "period",
                period,
                "must be at least 1",
            ));
        }
        if window < 1 {
            return Err(ForecastError::invalid_parameter(
                "window",
                window,
                "must be at least 1",
            ));
        }
        Ok(Self {
            period,
            window,
            seasonal_means: Vec::new(),
            start_pos: 0,
            sigma: 0.0,
            is_fit: false,
        })
    }
}

impl Forecaster for SeasonalWindowAverage {
    fn fit(&mut self, values: &[f64]) -> Result<()> {
        let n = values.len();
        require_fit_length(n)?;
        if n < self.period {
            return Err(ForecastError::InsufficientData {
                needed: self.period,
                got: n,
            });
        }
        let p = self.period;
        let w = self.window;
        let mut means = vec![0.0; p];
        for (pos, slot) in means.iter_mut().enumerate() {
            let at_pos: Vec<f64> = (0..n)
                .rev()
                .filter(|&i| i % p == pos)
                .take(w)
                .map(|i| values[i])
                .collect();
            *slot = if at_pos.is_empty() {
                numeric::mean(values)
            } else {
                numeric::mean(&at_pos)
            };
        }
        let residuals: Vec<f64> = values
            .iter()
            .enumerate()
            .map(|(i, &v)| v - means[i % p])
            .collect();
        self.sigma = innovation_sigma(&residuals);
        self.seasonal_means = means;
        self.start_pos = n % p;
        self.is_fit = true;
        Ok(())
    }

    fn forecast(&self, horizon: usize, level: f64) -> Result<Forecast> {
        ensure_fit(self.is_fit)?;
        validate_horizon_level(horizon, level)?;
        let p = self.period;
        let point: Vec<f64> = (0..horizon)
            .map(|k| self.seasonal_means[(self.start_pos + k) % p])
            .collect();
        let sigmas = vec![self.sigma; horizon];
        let (lower, upper) = bands(&point, &sigmas, level);
        Ok(Forecast {
            point,
            lower,
            upper,
            level,
        })
    }

    fn fitted(&self) -> Option<&[f64]> {
        None
    }

    fn residuals(&self) -> Option<&[f64]> {
        None
    }

    fn name(&self) -> &'static str {
        "SeasonalWindowAverage"
    }
}

/// Simple exponential smoothing with a fixed or optimized alpha.
#[derive(Debug, Clone)]
pub struct Ses {
    alpha: Option<f64>,
    fitted_alpha: f64,
    level: f64,
    sigma: f64,
    fitted: Vec<f64>,
    residuals: Vec<f64>,
    optimized: bool,
    is_fit: bool,
}

impl Ses {
    /// Fixed smoothing parameter.
    pub fn new(alpha: f64) -> Result<Self> {
        if !(0.0 < alpha && alpha < 1.0) {
            return Err(ForecastError::invalid_parameter(
                "alpha",
                alpha,
                "must be in (0, 1)",
            ));
        }
        Ok(Self {
            alpha: Some(alpha),
            fitted_alpha: alpha,
            level: 0.0,
            sigma: 0.0,
            fitted: Vec::new(),
            residuals: Vec::new(),
            optimized: false,
            is_fit: false,
        })
    }

    /// Alpha chosen by one-step MSE search.
    pub fn optimized() -> Self {
        Self {
            alpha: None,
            fitted_alpha: 0.0,
            level: 0.0,
            sigma: 0.0,
            fitted: Vec::new(),
            residuals: Vec::new(),
            optimized: true,
            is_fit: false,
        }
    }

    /// The smoothing parameter in effect after fitting.
    pub fn alpha(&self) -> f64 {
        self.fitted_alpha
    }

    fn sse(values: &[f64], alpha: f64) -> f64 {
        let mut level = values[0];
        let mut sse = 0.0;
        for &y in values.iter().skip(1) {
            let e = y - level;
            sse += e * e;
            level += alpha * e;
        }
        sse
    }
}

impl Forecaster for Ses {
    fn fit(&mut self, values: &[f64]) -> Result<()> {
        require_fit_length(values.len())?;

        let alpha = match self.alpha {
            Some(a) => a,
            None => {
                let result = nelder_mead_minimize(
                    |x| Self::sse(values, x[0]),
                    &[0.3],
                    &[0.01],
                    &[0.99],
                    &NelderMeadOptions::default(),
                )?;
                result.x[0]
            }
        };

        let mut level = values[0];
        let mut fitted = Vec::with_capacity(values.len());
        fitted.push(values[0]);
        for &y in values.iter().skip(1) {
            fitted.push(level);
            level += alpha * (y - level);
        }
        self.residuals = values
            .iter()
            .zip(fitted.iter())
            .map(|(y, f)| y - f)
            .collect();
        self.sigma = innovation_sigma(&self.residuals[1..]);
        self.fitted = fitted;
        self.fitted_alpha = alpha;
        self.level = level;
        self.is_fit = true;
        Ok(())
    }

    fn forecast(&self, horizon: usize, level: f64) -> Result<Forecast> {
        ensure_fit(self.is_fit)?;
        validate_horizon_level(horizon, level)?;
        let point = vec![self.level; horizon];
        let alpha = self.fitted_alpha;
        let sigmas: Vec<f64> = (1..=horizon)
            .map(|h| self.sigma * (1.0 + (h as f64 - 1.0) * alpha * alpha).sqrt())
            .collect();
        let (lower, upper) = bands(&point, &sigmas, level);
        Ok(Forecast {
            point,
            lower,
            upper,
            level,
        })
    }

    fn fitted(&self) -> Option<&[f64]> {
        self.is_fit.then_some(self.fitted.as_slice())
    }

    fn residuals(&self) -> Option<&[f64]> {
        self.is_fit.then_some(self.residuals.as_slice())
    }

    fn name(&self) -> &'static str {
        if self.optimized {
            "SESOptimized"
        } else {
            "SES"
        }
    }
}

/// Holt's linear (optionally damped) trend method.
#[derive(Debug, Clone)]
pub struct Holt {
    alpha: Option<f64>,
    beta: Option<f64>,
    damped: bool,
    params: (f64, f64, f64),
    level: f64,
    trend: f64,
    sigma: f64,
    fitted: Vec<f64>,
    residuals: Vec<f64>,
    is_fit: bool,
}

impl Holt {
    /// `None` parameters are optimized by one-step MSE search.
    pub fn new(alpha: Option<f64>, beta: Option<f64>, damped: bool) -> Result<Self> {
        for (name, value) in [("alpha", alpha), ("beta", beta)] {
            if let Some(v) = value {
                if !(0.0 < v && v < 1.0) {
                    return Err(ForecastError::invalid_parameter(
                        name,
                        v,
                        "must be in (0, 1)",
                    ));
                }
            }
        }
        Ok(Self {
            alpha,
            beta,
            damped,
            params: (0.0, 0.0, 1.0),
            level: 0.0,
            trend: 0.0,
            sigma: 0.0,
            fitted: Vec::new(),
            residuals: Vec::new(),
            is_fit: false,
        })
    }

    fn run(
        values: &[f64],
        alpha: f64,
        beta: f64,
        phi: f64,
        fitted: Option<&mut Vec<f64>>,
    ) -> (f64, f64, f64) {
        let mut level = values[0];
        let mut trend = values[1] - values[0];
        let mut sse = 0.0;
        let mut sink = fitted;
        if let Some(out) = sink.as_mut() {
            out.clear();
            out.push(values[0]);
        }
        for &y in values.iter().skip(1) {
            let f = level + phi * trend;
            if let Some(out) = sink.as_mut() {
                out.push(f);
            }
            let e = y - f;
            sse += e * e;
            let new_level = f + alpha * e;
            trend = phi * trend + alpha * beta * e;
            level = new_level;
        }
        (sse, level, trend)
    }
}

impl Forecaster for Holt {
    fn fit(&mut self, values: &[f64]) -> Result<()> {
        require_fit_length(values.len())?;

        let phi_bounds = if self.damped { (0.8, 0.99) } else { (1.0, 1.0) };
        let (alpha, beta, phi) = match (self.alpha, self.beta) {
            (Some(a), Some(b)) => (a, b, if self.damped { 0.95 } else { 1.0 }),
            _ => {
                let fixed = (self.alpha, self.beta);
                let result = nelder_mead_minimize(
                    |x| {
                        let a = fixed.0.unwrap_or(x[0]);
                        let b = fixed.1.unwrap_or(x[1]);
                        Self::run(values, a, b, x[2], None).0
                    },
                    &[0.3, 0.1, if self.damped { 0.95 } else { 1.0 }],
                    &[0.01, 0.01, phi_bounds.0],
                    &[0.99, 0.99, phi_bounds.1],
                    &NelderMeadOptions::default(),
                )?;
                (
                    fixed.0.unwrap_or(result.x[0]),
                    fixed.1.unwrap_or(result.x[1]),
                    result.x[2],
                )
            }
        };

        let mut fitted = Vec::new();
        let (_, level, trend) = Self::run(values, alpha, beta, phi, Some(&mut fitted));
        self.residuals = values
            .iter()
            .zip(fitted.iter())
            .map(|(y, f)| y - f)
            .collect();
        self.sigma = innovation_sigma(&self.residuals[1..]);
        self.fitted = fitted;
        self.params = (alpha, beta, phi);
        self.level = level;
        self.trend = trend;
        self.is_fit = true;
        Ok(())
    }

    fn forecast(&self, horizon: usize, level: f64) -> Result<Forecast> {
        ensure_fit(self.is_fit)?;
        validate_horizon_level(horizon, level)?;
        let (alpha, beta, phi) = self.params;
        let mut point = Vec::with_capacity(horizon);
        let mut damp = 0.0;
        for h in 1..=horizon {
            damp += phi.powi(h as i32);
            point.push(self.level + damp * self.trend);
        }
        let sigmas: Vec<f64> = (1..=horizon)
            .map(|h| {
                let h_f = h as f64;
                let ab = alpha * beta;
                let growth = 1.0
                    + (h_f - 1.0)
                        * (alpha * alpha
                            + ab * h_f
                            + ab * ab * h_f * (2.0 * h_f - 1.0) / 6.0);
                self.sigma * growth.max(1.0).sqrt()
            })
            .collect();
        let (lower, upper) = bands(&point, &sigmas, level);
        Ok(Forecast {
            point,
            lower,
            upper,
            level,
        })
    }

    fn fitted(&self) -> Option<&[f64]> {
        self.is_fit.then_some(self.fitted.as_slice())
    }

    fn residuals(&self) -> Option<&[f64]> {
        self.is_fit.then_some(self.residuals.as_slice())
    }

    fn name(&self) -> &'static str {
        "Holt"
    }
}

/// Holt-Winters with additive trend and multiplicative or additive
/// seasonality.
#[derive(Debug, Clone)]
pub struct HoltWinters {
    period: usize,
    multiplicative: bool,
    alpha: f64,
    beta: f64,
    gamma: f64,
    level: f64,
    trend: f64,
    seasonal: Vec<f64>,
    n: usize,
    sigma: f64,
    fitted: Vec<f64>,
    residuals: Vec<f64>,
    is_fit: bool,
}

impl HoltWinters {
    pub fn new(period: usize, multiplicative: bool) -> Result<Self> {
        if period < 2 {
            return Err(ForecastError::invalid_parameter(
                "period",
                period,
                "must be at least 2",
            ));
        }
        Ok(Self {
            period,
            multiplicative,
            alpha: 0.3,
            beta: 0.1,
            gamma: 0.1,
            level: 0.0,
            trend: 0.0,
            seasonal: Vec::new(),
            n: 0,
            sigma: 0.0,
            fitted: Vec::new(),
            residuals: Vec::new(),
            is_fit: false,
        })
    }

    /// Override the smoothing parameters.
    pub fn with_params(mut self, alpha: f64, beta: f64, gamma: f64) -> Result<Self> {
        for (name, v) in [("alpha", alpha), ("beta", beta), ("gamma", gamma)] {
            if !(0.0 < v && v < 1.0) {
                return Err(ForecastError::invalid_parameter(
                    name,
                    v,
                    "must be in (0, 1)",
                ));
            }
        }
        self.alpha = alpha;
        self.beta = beta;
        self.gamma = gamma;
        Ok(self)
    }
}

impl Forecaster for HoltWinters {
    fn fit(&mut self, values: &[f64]) -> Result<()> {
        let n = values.len();
        let p = self.period;
        if n < 2 * p {
            return Err(ForecastError::InsufficientData {
                needed: 2 * p,
                got: n,
            });
        }
        if self.multiplicative && values.iter().any(|&v| v <= 0.0) {
            return Err(ForecastError::Degenerate(
                "multiplicative seasonality requires strictly positive values".to_string(),
            ));
        }

        let initial_level = values[..p].iter().sum::<f64>() / p as f64;
        let second_mean = values[p..2 * p].iter().sum::<f64>() / p as f64;
        let mut level = initial_level;
        let mut trend = (second_mean - initial_level) / p as f64;
        let mut seasonal: Vec<f64> = if self.multiplicative {
            values[..p]
                .iter()
                .map(|v| v / initial_level.max(1e-10))
                .collect()
        } else {
            values[..p].iter().map(|v| v - initial_level).collect()
        };

        let mut fitted = values[..p].to_vec();
        for (i, &y) in values.iter().enumerate().skip(p) {
            let idx = i % p;
            let f = if self.multiplicative {
                (level + trend) * seasonal[idx]
            } else {
                level + trend + seasonal[idx]
            };
            fitted.push(f);

            let prev_level = level;
            let deseason = if self.multiplicative {
                y / seasonal[idx].max(1e-10)
            } else {
                y - seasonal[idx]
            };
            level = self.alpha * deseason + (1.0 - self.alpha) * (level + trend);
            trend = self.beta * (level - prev_level) + (1.0 - self.beta) * trend;
            seasonal[idx] = if self.multiplicative {
                self.gamma * (y / level.max(1e-10)) + (1.0 - self.gamma) * seasonal[idx]
            } else {
                self.gamma * (y - level) + (1.0 - self.gamma) * seasonal[idx]
            };
        }

        self.residuals = values
            .iter()
            .zip(fitted.iter())
            .map(|(y, f)| y - f)
            .collect();
        self.sigma = innovation_sigma(&self.residuals[p..]);
        self.fitted = fitted;
        self.level = level;
        self.trend = trend;
        self.seasonal = seasonal;
        self.n = n;
        self.is_fit = true;
        Ok(())
    }

    fn forecast(&self, horizon: usize, level: f64) -> Result<Forecast> {
        ensure_fit(self.is_fit)?;
        validate_horizon_level(horizon, level)?;
        let p = self.period;
        let point: Vec<f64> = (1..=horizon)
            .map(|h| {
                let base = self.level + self.trend * h as f64;
                let s = self.seasonal[(self.n + h - 1) % p];
                if self.multiplicative {
                    base * s
                } else {
                    base + s
                }
            })
            .collect();
        let sigmas: Vec<f64> = (1..=horizon)
            .map(|h| {
                let h_f = h as f64;
                let growth = 1.0
                    + (h_f - 1.0)
                        * (self.alpha * self.alpha + self.alpha * self.beta * h_f)
                    + ((h - 1) / p) as f64 * self.gamma * (2.0 * self.alpha + self.gamma);
                self.sigma * growth.max(1.0).sqrt()
            })
            .collect();
        let (lower, upper) = bands(&point, &sigmas, level);
        Ok(Forecast {
            point,
            lower,
            upper,
            level,
        })
    }

    fn fitted(&self) -> Option<&[f64]> {
        self.is_fit.then_some(self.fitted.as_slice())
    }

    fn residuals(&self) -> Option<&[f64]> {
        self.is_fit.then_some(self.residuals.as_slice())
    }

    fn name(&self) -> &'static str {
        "HoltWinters"
    }
}

/// Seasonal exponential smoothing: a level plus seasonal indices, no
/// trend. Parameters optionally optimized by one-step MSE search.
#[derive(Debug, Clone)]
pub struct SeasonalEs {
    period: usize,
    optimize: bool,
    alpha: f64,
    gamma: f64,
    level: f64,
    seasonal: Vec<f64>,
    n: usize,
    sigma: f64,
    fitted: Vec<f64>,
    residuals: Vec<f64>,
    is_fit: bool,
}

impl SeasonalEs {
    pub fn new(period: usize, optimize: bool) -> Result<Self> {
        if period < 2 {
            return Err(ForecastError::invalid_parameter(
                "period",
                period,
                "must be at least 2",
            ));
        }
        Ok(Self {
            period,
            optimize,
            alpha: 0.3,
            gamma: 0.1,
            level: 0.0,
            seasonal: Vec::new(),
            n: 0,
            sigma: 0.0,
            fitted: Vec::new(),
            residuals: Vec::new(),
            is_fit: false,
        })
    }

    fn run(
        values: &[f64],
        period: usize,
        alpha: f64,
        gamma: f64,
        fitted: Option<&mut Vec<f64>>,
    ) -> (f64, f64, Vec<f64>) {
        let p = period;
        let initial_level = values[..p].iter().sum::<f64>() / p as f64;
        let mut level = initial_level;
        let mut seasonal: Vec<f64> = values[..p].iter().map(|v| v - initial_level).collect();
        let mut sse = 0.0;
        let mut sink = fitted;
        if let Some(out) = sink.as_mut() {
            out.clear();
            out.extend_from_slice(&values[..p]);
        }
        for (i, &y) in values.iter().enumerate().skip(p) {
            let idx = i % p;
            let f = level + seasonal[idx];
            if let Some(out) = sink.as_mut() {
                out.push(f);
            }
            let e = y - f;
            sse += e * e;
            level = alpha * (y - seasonal[idx]) + (1.0 - alpha) * level;
            seasonal[idx] = gamma * (y - level) + (1.0 - gamma) * seasonal[idx];
        }
        (sse, level, seasonal)
    }
}

impl Forecaster for SeasonalEs {
    fn fit(&mut self, values: &[f64]) -> Result<()> {
        let n = values.len();
        let p = self.period;
        if n < 2 * p {
            return Err(ForecastError::InsufficientData {
                needed: 2 * p,
                got: n,
            });
        }

        if self.optimize {
            let result = nelder_mead_minimize(
                |x| Self::run(values, p, x[0], x[1], None).0,
                &[0.3, 0.1],
                &[0.01, 0.01],
                &[0.99, 0.99],
                &NelderMeadOptions::default(),
            )?;
            self.alpha = result.x[0];
            self.gamma = result.x[1];
        }

        let mut fitted = Vec::new();
        let (_, level, seasonal) =
            Self::run(values, p, self.alpha, self.gamma, Some(&mut fitted));
        self.residuals = values
            .iter()
            .zip(fitted.iter())
            .map(|(y, f)| y - f)
            .collect();
        self.sigma = innovation_sigma(&self.residuals[p..]);
        self.fitted = fitted;
        self.level = level;
        self.seasonal = seasonal;
        self.n = n;
        self.is_fit = true;
        Ok(())
    }

    fn forecast(&self, horizon: usize, level: f64) -> Result<Forecast> {
        ensure_fit(self.is_fit)?;
        validate_horizon_level(horizon, level)?;
        let p = self.period;
        let point: Vec<f64> = (1..=horizon)
            .map(|h| self.level + self.seasonal[(self.n + h - 1) % p])
            .collect();
        let sigmas: Vec<f64> = (1..=horizon)
            .map(|h| {
                let growth = 1.0 + (h as f64 - 1.0) * self.alpha * self.alpha
                    + ((h - 1) / p) as f64 * self.gamma * (2.0 * self.alpha + self.gamma);
                self.sigma * growth.max(1.0).sqrt()
            })
            .collect();
        let (lower, upper) = bands(&point, &sigmas, level);
        Ok(Forecast {
            point,
            lower,
            upper,
            level,
        })
    }

    fn fitted(&self) -> Option<&[f64]> {
        self.is_fit.then_some(self.fitted.as_slice())
    }

    fn residuals(&self) -> Option<&[f64]> {
        self.is_fit.then_some(self.residuals.as_slice())
    }

    fn name(&self) -> &'static str {
        if self.optimize {
            "SeasonalESOptimized"
        } else {
            "SeasonalES"
        }
    }
}

fn ensure_fit(is_fit: bool) -> Result<()> {
    if !is_fit {
        return Err(ForecastError::InvalidInput(
            "forecast before fit".to_string(),
        ));
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use approx::assert_relative_eq;

    #[test]
    fn test_naive_constant_series() {
        let values = vec![7.0; 30];
        let mut model = Naive::new();
        model.fit(&values).unwrap();
        let forecast = model.forecast(10, 0.95).unwrap();
        for (p, (lo, hi)) in forecast
            .point
            .iter()
            .zip(forecast.lower.iter().zip(forecast.upper.iter()))
        {
            assert_eq!(*p, 7.0);
            assert_relative_eq!(*lo, 7.0);
            assert_relative_eq!(*hi, 7.0);
        }
    }

    #[test]
    fn test_naive_interval_growth() {
        let values: Vec<f64> = (0..50).map(|i| (i as f64 * 0.7).sin() * 3.0).collect();
        let mut model = Naive::new();
        model.fit(&values).unwrap();
        let forecast = model.forecast(10, 0.95).unwrap();
        let w1 = forecast.upper[0] - forecast.lower[0];
        let w9 = forecast.upper[9] - forecast.lower[9];
        assert_relative_eq!(w9 / w1, (10.0_f64).sqrt(), epsilon = 1e-9);
    }

    #[test]
    fn test_seasonal_naive_repeats_cycle() {
        let cycle = [1.0, 5.0, 3.0, 8.0];
        let values: Vec<f64> = cycle.iter().cycle().take(24).cloned().collect();
        let mut model = SeasonalNaive::new(4).unwrap();
        model.fit(&values).unwrap();
        let forecast = model.forecast(8, 0.95).unwrap();
        for (k, p) in forecast.point.iter().enumerate() {
            assert_eq!(*p, cycle[k % 4]);
        }
    }

    #[test]
    fn test_drift_line() {
        let values: Vec<f64> = (0..20).map(|i| 2.0 * i as f64).collect();
        let mut model = RandomWalkDrift::new();
        model.fit(&values).unwrap();
        let forecast = model.forecast(5, 0.95).unwrap();
        for (k, p) in forecast.point.iter().enumerate() {
            assert_relative_eq!(*p, 38.0 + 2.0 * (k + 1) as f64, epsilon = 1e-10);
        }
    }

    #[test]
    fn test_sma_constant() {
        let values = vec![4.0; 20];
        let mut model = Sma::new(5).unwrap();
        model.fit(&values).unwrap();
        let forecast = model.forecast(6, 0.95).unwrap();
        assert!(forecast.point.iter().all(|&p| p == 4.0));
    }

    #[test]
    fn test_ses_optimized_tracks_level_shift() {
        // A recent level shift should pull alpha up and the forecast near
        // the new level.
        let mut values = vec![10.0; 30];
        values.extend(vec![20.0; 30]);
        let mut model = Ses::optimized();
        model.fit(&values).unwrap();
        let forecast = model.forecast(1, 0.95).unwrap();
        assert!(forecast.point[0] > 18.0, "point {}", forecast.point[0]);
        assert!(model.alpha() > 0.3, "alpha {}", model.alpha());
    }

    #[test]
    fn test_holt_constant_series_is_flat() {
        let values = vec![5.0; 24];
        let mut model = Holt::new(None, None, false).unwrap();
        model.fit(&values).unwrap();
        let forecast = model.forecast(6, 0.95).unwrap();
        for p in &forecast.point {
            assert_relative_eq!(*p, 5.0, epsilon = 1e-9);
        }
    }

    #[test]
    fn test_holt_extrapolates_trend() {
        let values: Vec<f64> = (0..30).map(|i| 1.0 + 0.5 * i as f64).collect();
        let mut model = Holt::new(None, None, false).unwrap();
        model.fit(&values).unwrap();
        let forecast = model.forecast(4, 0.95).unwrap();
        for (k, p) in forecast.point.iter().enumerate() {
            assert_relative_eq!(*p, 15.5 + 0.5 * (k + 1) as f64, epsilon = 0.2);
        }
    }

    #[test]
    fn test_holt_winters_seasonal_shape() {
        let values: Vec<f64> = (0..48)
            .map(|i| {
                50.0 + i as f64 + 10.0 * (2.0 * std::f64::consts::PI * i as f64 / 12.0).sin()
            })
            .collect();
        let mut model = HoltWinters::new(12, false).unwrap();
        model.fit(&values).unwrap();
        let forecast = model.forecast(12, 0.95).unwrap();
        assert_eq!(forecast.point.len(), 12);
        // Seasonal amplitude survives into the forecast.
        let max = forecast.point.iter().cloned().fold(f64::MIN, f64::max);
        let min = forecast.point.iter().cloned().fold(f64::MAX, f64::min);
        assert!(max - min > 8.0, "amplitude {}", max - min);
    }

    #[test]
    fn test_seasonal_es_positions() {
        let cycle = [0.0, 10.0, 0.0, -10.0];
        let values: Vec<f64> = cycle.iter().cycle().take(40).cloned().collect();
        let mut model = SeasonalEs::new(4, true).unwrap();
        model.fit(&values).unwrap();
        let forecast = model.forecast(4, 0.95).unwrap();
        assert!(forecast.point[1] > forecast.point[3]);
    }

    #[test]
    fn test_forecast_before_fit_errors() {
        let model = Naive::new();
        assert!(model.forecast(3, 0.95).is_err());
    }

    #[test]
    fn test_interval_ordering_all_models() {
        let values: Vec<f64> = (0..60)
            .map(|i| 20.0 + (i as f64 * 0.3).sin() * 4.0 + 0.1 * i as f64)
            .collect();
        let mut models: Vec<Box<dyn Forecaster>> = vec![
            Box::new(Naive::new()),
            Box::new(SeasonalNaive::new(12).unwrap()),
            Box::new(RandomWalkDrift::new()),
            Box::new(Sma::new(6).unwrap()),
            Box::new(SeasonalWindowAverage::new(12, 2).unwrap()),
            Box::new(Ses::new(0.3).unwrap()),
            Box::new(Ses::optimized()),
            Box::new(Holt::new(None, None, true).unwrap()),
            Box::new(HoltWinters::new(12, false).unwrap()),
            Box::new(SeasonalEs::new(12, false).unwrap()),
        ];
        for model in models.iter_mut() {
            model.fit(&values).unwrap();
            for level in [0.5, 0.8, 0.95] {
                let forecast = model.forecast(7, level).unwrap();
                assert_eq!(forecast.point.len(), 7, "{}", model.name());
                for i in 0..7 {
                    assert!(
                        forecast.lower[i] <= forecast.point[i]
                            && forecast.point[i] <= forecast.upper[i],
                        "{} at level {}",
                        model.name(),
                        level
                    );
                }
            }
        }
    }
}
