//! ETS (error, trend, seasonal) exponential smoothing state space models.
//!
//! The recursion follows the Hyndman innovations form. State updates are
//! driven by the absolute innovation and are identical for additive and
//! multiplicative error; the two error types differ only in the
//! likelihood (multiplicative error adds the Σ log|f_t| term and measures
//! relative innovations). Parameters are fitted by bounded L-BFGS on an
//! analytical-gradient objective: the forward pass records per-step
//! states and the backward pass accumulates adjoints through the state
//! transitions. For long series the history is checkpointed and forward
//! segments are recomputed on demand during the backward sweep.

use std::str::FromStr;

use crate::detrending::{decompose, DecomposeMethod};
use crate::error::{ForecastError, Result};
use crate::forecast::{Forecast, Forecaster};
use crate::numeric;
use crate::optim::{lbfgs_minimize, LbfgsOptions};

/// Error component.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ErrorComponent {
    Additive,
    Multiplicative,
}

/// Trend component.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TrendComponent {
    None,
    Additive,
    Multiplicative,
    DampedAdditive,
    DampedMultiplicative,
}

impl TrendComponent {
    fn has_trend(self) -> bool {
        self != TrendComponent::None
    }

    fn is_damped(self) -> bool {
        matches!(
            self,
            TrendComponent::DampedAdditive | TrendComponent::DampedMultiplicative
        )
    }

    fn is_multiplicative(self) -> bool {
        matches!(
            self,
            TrendComponent::Multiplicative | TrendComponent::DampedMultiplicative
        )
    }
}

/// Seasonal component.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SeasonalComponent {
    None,
    Additive,
    Multiplicative,
}

impl SeasonalComponent {
    fn has_seasonal(self) -> bool {
        self != SeasonalComponent::None
    }
}

/// An ETS model specification such as ETS(A,Ad,M).
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct EtsSpec {
    pub error: ErrorComponent,
    pub trend: TrendComponent,
    pub seasonal: SeasonalComponent,
}

impl EtsSpec {
    /// Parse notation like "AAA", "MNM" or "AAdA".
    pub fn from_notation(notation: &str) -> Result<Self> {
        let chars: Vec<char> = notation.chars().collect();
        let bad = || {
            ForecastError::InvalidModel(format!(
                "Invalid ETS specification '{}': expected notation like 'AAA', 'MNM' or 'AAdA'",
                notation
            ))
        };

        let (e, t, damped, s) = match chars.len() {
            3 => (chars[0], chars[1], false, chars[2]),
            4 if chars[2] == 'd' => (chars[0], chars[1], true, chars[3]),
            _ => return Err(bad()),
        };

        let error = match e {
            'A' => ErrorComponent::Additive,
            'M' => ErrorComponent::Multiplicative,
            _ => return Err(bad()),
        };
        let trend = match (t, damped) {
            ('N', false) => TrendComponent::None,
            ('A', false) => TrendComponent::Additive,
            ('A', true) => TrendComponent::DampedAdditive,
            ('M', false) => TrendComponent::Multiplicative,
            ('M', true) => TrendComponent::DampedMultiplicative,
            _ => return Err(bad()),
        };
        let seasonal = match s {
            'N' => SeasonalComponent::None,
            'A' => SeasonalComponent::Additive,
            'M' => SeasonalComponent::Multiplicative,
            _ => return Err(bad()),
        };

        Ok(Self {
            error,
            trend,
            seasonal,
        })
    }

    /// Short notation like "AAdM".
    pub fn notation(&self) -> String {
        let e = match self.error {
            ErrorComponent::Additive => 'A',
            ErrorComponent::Multiplicative => 'M',
        };
        let t = match self.trend {
            TrendComponent::None => "N",
            TrendComponent::Additive => "A",
            TrendComponent::DampedAdditive => "Ad",
            TrendComponent::Multiplicative => "M",
            TrendComponent::DampedMultiplicative => "Md",
        };
        let s = match self.seasonal {
            SeasonalComponent::None => 'N',
            SeasonalComponent::Additive => 'A',
            SeasonalComponent::Multiplicative => 'M',
        };
        format!("{e}{t}{s}")
    }

    /// Reject combinations that are numerically unstable: multiplicative
    /// error with additive trend and additive seasonality, and any
    /// multiplicative trend paired with additive seasonality.
    pub fn is_valid(&self) -> bool {
        let maa = self.error == ErrorComponent::Multiplicative
            && matches!(
                self.trend,
                TrendComponent::Additive | TrendComponent::DampedAdditive
            )
            && self.seasonal == SeasonalComponent::Additive;
        let mult_trend_add_season =
            self.trend.is_multiplicative() && self.seasonal == SeasonalComponent::Additive;
        !(maa || mult_trend_add_season)
    }

    /// Whether any component is multiplicative (requires positive data).
    fn needs_positive_data(&self) -> bool {
        self.error == ErrorComponent::Multiplicative
            || self.trend.is_multiplicative()
            || self.seasonal == SeasonalComponent::Multiplicative
    }
}

/// Configuration for fitting one ETS model.
#[derive(Debug, Clone)]
pub struct EtsConfig {
    pub spec: EtsSpec,
    /// Seasonal period; ignored when the spec has no seasonal component.
    pub season_length: usize,
    /// Fixed smoothing parameters; `None` means optimize.
    pub alpha: Option<f64>,
    pub beta: Option<f64>,
    pub gamma: Option<f64>,
    pub phi: Option<f64>,
    /// Checkpoint spacing for the gradient backward pass.
    pub checkpoint_interval: usize,
}

impl EtsConfig {
    pub fn new(spec: EtsSpec, season_length: usize) -> Self {
        Self {
            spec,
            season_length,
            alpha: None,
            beta: None,
            gamma: None,
            phi: None,
            checkpoint_interval: 50,
        }
    }
}

/// Parameter bounds used at the optimizer boundary.
const SMOOTHING_LO: f64 = 0.01;
const SMOOTHING_HI: f64 = 0.99;
const PHI_LO: f64 = 0.8;
const PHI_HI: f64 = 0.99;

/// Checkpointing threshold on the series length.
const CHECKPOINT_MIN_N: usize = 200;

/// Fitted ETS parameters and diagnostics.
#[derive(Debug, Clone)]
pub struct EtsFit {
    pub alpha: f64,
    pub beta: f64,
    pub gamma: f64,
    pub phi: f64,
    pub initial_level: f64,
    pub initial_trend: f64,
    pub initial_seasonal: Vec<f64>,
    /// −2·log-likelihood up to an additive constant.
    pub neg2_loglik: f64,
    /// Akaike information criterion (includes the Σ log f_t term for
    /// multiplicative error).
    pub aic: f64,
    pub bic: f64,
    /// One-step innovation standard deviation (relative for
    /// multiplicative error).
    pub sigma: f64,
    pub converged: bool,
}

/// An ETS forecaster.
#[derive(Debug, Clone)]
pub struct Ets {
    config: EtsConfig,
    fit: Option<EtsFit>,
    final_level: f64,
    final_trend: f64,
    final_seasonal: Vec<f64>,
    n: usize,
    fitted: Vec<f64>,
    residuals: Vec<f64>,
}

impl Ets {
    pub fn new(config: EtsConfig) -> Result<Self> {
        if config.spec.seasonal.has_seasonal() && config.season_length < 2 {
            return Err(ForecastError::invalid_parameter(
                "season_length",
                config.season_length,
                "seasonal models need a period of at least 2",
            ));
        }
        for (name, value) in [
            ("alpha", config.alpha),
            ("beta", config.beta),
            ("gamma", config.gamma),
        ] {
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
        if let Some(phi) = config.phi {
            if !(0.0 < phi && phi <= 1.0) {
                return Err(ForecastError::invalid_parameter(
                    "phi",
                    phi,
                    "must be in (0, 1]",
                ));
            }
        }
        Ok(Self {
            config,
            fit: None,
            final_level: 0.0,
            final_trend: 0.0,
            final_seasonal: Vec::new(),
            n: 0,
            fitted: Vec::new(),
            residuals: Vec::new(),
        })
    }

    /// Fit result accessor for selection logic.
    pub fn fit_result(&self) -> Option<&EtsFit> {
        self.fit.as_ref()
    }

    fn season_length(&self) -> usize {
        if self.config.spec.seasonal.has_seasonal() {
            self.config.season_length
        } else {
            1
        }
    }
}

impl Forecaster for Ets {
    fn fit(&mut self, values: &[f64]) -> Result<()> {
        let spec = self.config.spec;
        let n = values.len();
        let m = self.season_length();
        let needed = if spec.seasonal.has_seasonal() {
            (2 * m).max(4)
        } else {
            4
        };
        if n < needed {
            return Err(ForecastError::InsufficientData { needed, got: n });
        }
        if spec.needs_positive_data() {
            if numeric::is_constant(values) {
                return Err(ForecastError::Degenerate(
                    "constant series cannot drive multiplicative components".to_string(),
                ));
            }
            if values.iter().any(|&v| v <= 0.0) {
                return Err(ForecastError::Degenerate(
                    "multiplicative components require strictly positive values".to_string(),
                ));
            }
        }

        let init = initial_state(values, spec, m)?;
        let fit = optimize(values, &self.config, &init)?;

        // Final pass at the chosen parameters to collect fitted values and
        // the end-of-sample state.
        let mut recursion = Recursion::new(spec, m, &fit);
        let mut fitted = Vec::with_capacity(n);
        let mut residuals = Vec::with_capacity(n);
        for &y in values {
            let f = recursion.one_step_forecast();
            recursion.update(y, f);
            fitted.push(f);
            residuals.push(y - f);
        }

        self.final_level = recursion.level;
        self.final_trend = recursion.trend;
        self.final_seasonal = recursion.seasonal;
        self.n = n;
        self.fitted = fitted;
        self.residuals = residuals;
        self.fit = Some(fit);
        Ok(())
    }

    fn forecast(&self, horizon: usize, level: f64) -> Result<Forecast> {
        let fit = self
            .fit
            .as_ref()
            .ok_or_else(|| ForecastError::InvalidInput("forecast before fit".to_string()))?;
        crate::forecast::validate_horizon_level(horizon, level)?;

        let spec = self.config.spec;
        let m = self.season_length();
        let mut point = Vec::with_capacity(horizon);

        let mut damp_sum = 0.0;
        for h in 1..=horizon {
            damp_sum += fit.phi.powi(h as i32);
            let lb = match spec.trend {
                TrendComponent::None => self.final_level,
                TrendComponent::Additive => self.final_level + h as f64 * self.final_trend,
                TrendComponent::DampedAdditive => self.final_level + damp_sum * self.final_trend,
                TrendComponent::Multiplicative => {
                    self.final_level * self.final_trend.powi(h as i32)
                }
                TrendComponent::DampedMultiplicative => {
                    self.final_level * self.final_trend.powf(damp_sum)
                }
            };
            let value = match spec.seasonal {
                SeasonalComponent::None => lb,
                SeasonalComponent::Additive => lb + self.final_seasonal[(self.n + h - 1) % m],
                SeasonalComponent::Multiplicative => lb * self.final_seasonal[(self.n + h - 1) % m],
            };
            if !value.is_finite() {
                return Err(ForecastError::NumericalFailure(
                    "non-finite forecast value".to_string(),
                ));
            }
            point.push(value);
        }

        let z = numeric::normal_interval_z(level);
        let mut lower = Vec::with_capacity(horizon);
        let mut upper = Vec::with_capacity(horizon);
        for (idx, &p) in point.iter().enumerate() {
            let h = idx + 1;
            let growth = variance_growth(spec, fit, m, h).sqrt();
            let half = match spec.error {
                ErrorComponent::Additive => z * fit.sigma * growth,
                // Relative sigma scales with the forecast magnitude.
                ErrorComponent::Multiplicative => z * fit.sigma * growth * p.abs(),
            };
            lower.push(p - half);
            upper.push(p + half);
        }

        Ok(Forecast {
            point,
            lower,
            upper,
            level,
        })
    }

    fn fitted(&self) -> Option<&[f64]> {
        self.fit.as_ref().map(|_| self.fitted.as_slice())
    }

    fn residuals(&self) -> Option<&[f64]> {
        self.fit.as_ref().map(|_| self.residuals.as_slice())
    }

    fn name(&self) -> &'static str {
        "ETS"
    }
}

/// Initial state produced by classical decomposition, with the heuristic
/// fallback (level = first observation, trend = mean first difference,
/// seasonals = mean-subtracted per-position averages).
#[derive(Debug, Clone)]
struct InitialState {
    level: f64,
    trend: f64,
    seasonal: Vec<f64>,
}

fn initial_state(values: &[f64], spec: EtsSpec, m: usize) -> Result<InitialState> {
    let n = values.len();

    let seasonal = if spec.seasonal.has_seasonal() {
        let method = match spec.seasonal {
            SeasonalComponent::Multiplicative => DecomposeMethod::Multiplicative,
            _ => DecomposeMethod::Additive,
        };
        match decompose(values, m, method) {
            Ok(d) => d.seasonal[..m].to_vec(),
            Err(_) => heuristic_seasonal(values, m, spec.seasonal),
        }
    } else {
        Vec::new()
    };

    // Level and trend from the deseasonalized head of the series.
    let deseason: Vec<f64> = values
        .iter()
        .enumerate()
        .take((2 * m).max(10).min(n))
        .map(|(i, &v)| match spec.seasonal {
            SeasonalComponent::None => v,
            SeasonalComponent::Additive => v - seasonal[i % m],
            SeasonalComponent::Multiplicative => v / seasonal[i % m].max(1e-10),
        })
        .collect();

    let level = deseason[0];
    let trend = if spec.trend.has_trend() {
        let diffs = numeric::diff(&deseason);
        let mean_diff = numeric::mean(&diffs);
        if spec.trend.is_multiplicative() {
            // Growth ratio close to one keeps the recursion stable.
            (1.0 + mean_diff / level.abs().max(1e-10)).clamp(0.5, 2.0)
        } else {
            mean_diff
        }
    } else {
        0.0
    };

    let level = if spec.needs_positive_data() {
        level.max(1e-8)
    } else {
        level
    };

    Ok(InitialState {
        level,
        trend,
        seasonal,
    })
}

fn heuristic_seasonal(values: &[f64], m: usize, seasonal: SeasonalComponent) -> Vec<f64> {
    let mut means = vec![0.0; m];
    let mut counts = vec![0usize; m];
    for (i, &v) in values.iter().enumerate() {
        means[i % m] += v;
        counts[i % m] += 1;
    }
    for (mean, &c) in means.iter_mut().zip(counts.iter()) {
        if c > 0 {
            *mean /= c as f64;
        }
    }
    let grand = means.iter().sum::<f64>() / m as f64;
    match seasonal {
        SeasonalComponent::Multiplicative => means
            .iter()
            .map(|&v| {
                if grand.abs() > f64::EPSILON {
                    (v / grand).max(1e-6)
                } else {
                    1.0
                }
            })
            .collect(),
        _ => means.iter().map(|&v| v - grand).collect(),
    }
}

// ---------------------------------------------------------------------------
// Forward recursion
// ---------------------------------------------------------------------------

/// Mutable recursion state for one pass over the data.
#[derive(Debug, Clone)]
struct Recursion {
    spec: EtsSpec,
    m: usize,
    alpha: f64,
    beta: f64,
    gamma: f64,
    phi: f64,
    level: f64,
    trend: f64,
    seasonal: Vec<f64>,
    t: usize,
}

impl Recursion {
    fn new(spec: EtsSpec, m: usize, fit: &EtsFit) -> Self {
        Self {
            spec,
            m,
            alpha: fit.alpha,
            beta: fit.beta,
            gamma: fit.gamma,
            phi: fit.phi,
            level: fit.initial_level,
            trend: fit.initial_trend,
            seasonal: fit.initial_seasonal.clone(),
            t: 0,
        }
    }

    fn from_params(spec: EtsSpec, m: usize, params: &StepParams, init: &InitialState) -> Self {
        Self {
            spec,
            m,
            alpha: params.alpha,
            beta: params.beta,
            gamma: params.gamma,
            phi: params.phi,
            level: params.level0,
            trend: params.trend0,
            seasonal: init.seasonal.clone(),
            t: 0,
        }
    }

    fn seasonal_at(&self, t: usize) -> f64 {
        if self.spec.seasonal.has_seasonal() {
            self.seasonal[t % self.m]
        } else {
            0.0
        }
    }

    fn level_trend(&self) -> f64 {
        match self.spec.trend {
            TrendComponent::None => self.level,
            TrendComponent::Additive => self.level + self.trend,
            TrendComponent::DampedAdditive => self.level + self.phi * self.trend,
            TrendComponent::Multiplicative => self.level * self.trend,
            TrendComponent::DampedMultiplicative => self.level * self.trend.powf(self.phi),
        }
    }

    fn one_step_forecast(&self) -> f64 {
        let lb = self.level_trend();
        match self.spec.seasonal {
            SeasonalComponent::None => lb,
            SeasonalComponent::Additive => lb + self.seasonal_at(self.t),
            SeasonalComponent::Multiplicative => lb * self.seasonal_at(self.t),
        }
    }

    /// Advance the state by one observation given its one-step forecast.
    fn update(&mut self, y: f64, f: f64) {
        let eps = y - f;
        let lb = self.level_trend();
        let sm = self.seasonal_at(self.t);

        let dl = match self.spec.seasonal {
            SeasonalComponent::Multiplicative => 1.0 / guard(sm),
            _ => 1.0,
        };

        let old_level = self.level;
        let new_level = lb + self.alpha * eps * dl;

        if self.spec.trend.has_trend() {
            if self.spec.trend.is_multiplicative() {
                let g = match self.spec.trend {
                    TrendComponent::Multiplicative => self.trend,
                    _ => self.trend.powf(self.phi),
                };
                self.trend = g + self.beta * eps * dl / guard(old_level);
            } else {
                self.trend = self.phi * self.trend + self.beta * eps * dl;
            }
        }

        if self.spec.seasonal.has_seasonal() {
            let ds = match self.spec.seasonal {
                SeasonalComponent::Multiplicative => 1.0 / guard(lb),
                _ => 1.0,
            };
            let idx = self.t % self.m;
            self.seasonal[idx] = sm + self.gamma * eps * ds;
        }

        self.level = new_level;
        self.t += 1;
    }
}

#[inline]
fn guard(v: f64) -> f64 {
    if v.abs() < 1e-10 {
        if v < 0.0 {
            -1e-10
        } else {
            1e-10
        }
    } else {
        v
    }
}

// ---------------------------------------------------------------------------
// Objective with analytical gradients and checkpointing
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, Copy)]
struct StepParams {
    alpha: f64,
    beta: f64,
    gamma: f64,
    phi: f64,
    level0: f64,
    trend0: f64,
}

/// Gradient of the objective with respect to the step parameters.
#[derive(Debug, Clone, Copy, Default)]
struct StepGrad {
    alpha: f64,
    beta: f64,
    gamma: f64,
    phi: f64,
    level0: f64,
    trend0: f64,
}

/// Per-step record of the incoming state, kept either densely or
/// recomputed from checkpoints.
#[derive(Debug, Clone, Copy, Default)]
struct StepState {
    level: f64,
    trend: f64,
    seasonal_used: f64,
    forecast: f64,
    eps: f64,
}

/// The ETS likelihood objective. Owns the forward history buffers and
/// reuses them across evaluations.
struct EtsObjective<'a> {
    values: &'a [f64],
    spec: EtsSpec,
    m: usize,
    init: &'a InitialState,
    checkpoint_interval: usize,
    /// Dense per-step states (short series) or per-segment scratch.
    steps: Vec<StepState>,
    /// Checkpoint snapshots of (level, trend, seasonal buffer).
    checkpoints: Vec<(f64, f64, Vec<f64>)>,
    use_checkpoints: bool,
}

impl<'a> EtsObjective<'a> {
    fn new(values: &'a [f64], config: &EtsConfig, init: &'a InitialState) -> Self {
        let n = values.len();
        let use_checkpoints = n >= CHECKPOINT_MIN_N;
        let interval = config.checkpoint_interval.max(2);
        let steps = if use_checkpoints {
            vec![StepState::default(); interval]
        } else {
            vec![StepState::default(); n]
        };
        Self {
            values,
            spec: config.spec,
            m: if config.spec.seasonal.has_seasonal() {
                config.season_length
            } else {
                1
            },
            init,
            checkpoint_interval: interval,
            steps,
            checkpoints: Vec::new(),
            use_checkpoints,
        }
    }

    /// Run the forward recursion, filling the dense history (short
    /// series) or the checkpoint list. Returns the two likelihood
    /// accumulators `(sse, log_f_sum)` where `sse` is over absolute or
    /// relative innovations per the error type, plus the final seasonal
    /// adjoint seed buffer size. A non-finite forecast poisons the
    /// objective.
    fn forward(&mut self, params: &StepParams) -> Option<(f64, f64)> {
        let n = self.values.len();
        let mut recursion = Recursion::from_params(self.spec, self.m, params, self.init);
        let mut sse = 0.0;
        let mut log_f = 0.0;
        self.checkpoints.clear();

        for t in 0..n {
            if self.use_checkpoints && t % self.checkpoint_interval == 0 {
                self.checkpoints.push((
                    recursion.level,
                    recursion.trend,
                    recursion.seasonal.clone(),
                ));
            }
            let f = recursion.one_step_forecast();
            if !f.is_finite() {
                return None;
            }
            let eps = self.values[t] - f;
            if !self.use_checkpoints {
                self.steps[t] = StepState {
                    level: recursion.level,
                    trend: recursion.trend,
                    seasonal_used: recursion.seasonal_at(t),
                    forecast: f,
                    eps,
                };
            }
            match self.spec.error {
                ErrorComponent::Additive => sse += eps * eps,
                ErrorComponent::Multiplicative => {
                    if f.abs() < 1e-10 {
                        return None;
                    }
                    let rel = eps / f;
                    sse += rel * rel;
                    log_f += f.abs().ln();
                }
            }
            recursion.update(self.values[t], f);
        }

        if !sse.is_finite() || !log_f.is_finite() {
            return None;
        }
        Some((sse, log_f))
    }

    /// Recompute the dense states for the segment starting at checkpoint
    /// `seg` into `self.steps[..len]`.
    fn recompute_segment(&mut self, params: &StepParams, seg: usize) -> usize {
        let n = self.values.len();
        let start = seg * self.checkpoint_interval;
        let len = self.checkpoint_interval.min(n - start);
        let (level, trend, seasonal) = self.checkpoints[seg].clone();
        let mut recursion = Recursion {
            spec: self.spec,
            m: self.m,
            alpha: params.alpha,
            beta: params.beta,
            gamma: params.gamma,
            phi: params.phi,
            level,
            trend,
            seasonal,
            t: start,
        };
        for offset in 0..len {
            let t = start + offset;
            let f = recursion.one_step_forecast();
            let eps = self.values[t] - f;
            self.steps[offset] = StepState {
                level: recursion.level,
                trend: recursion.trend,
                seasonal_used: recursion.seasonal_at(t),
                forecast: f,
                eps,
            };
            recursion.update(self.values[t], f);
        }
        len
    }

    /// Objective value and gradient. The value is −2·log-likelihood up to
    /// an additive constant: `n·ln(SSE/n)` for additive error plus
    /// `2·Σ log|f_t|` for multiplicative error.
    fn eval(&mut self, params: &StepParams) -> (f64, StepGrad) {
        let n = self.values.len() as f64;
        let Some((sse, log_f)) = self.forward(params) else {
            return (f64::INFINITY, StepGrad::default());
        };
        if sse <= 0.0 {
            // Perfect fit: gradient is flat at this floor.
            return (n * (1e-300_f64).ln(), StepGrad::default());
        }

        let value = match self.spec.error {
            ErrorComponent::Additive => n * (sse / n).ln(),
            ErrorComponent::Multiplicative => n * (sse / n).ln() + 2.0 * log_f,
        };

        let grad = self.backward(params, sse);
        (value, grad)
    }

    /// Reverse sweep accumulating adjoints through the state transitions.
    fn backward(&mut self, params: &StepParams, sse: f64) -> StepGrad {
        let n = self.values.len();
        let spec = self.spec;
        let m = self.m;
        let mut grad = StepGrad::default();
        let mut adj_level = 0.0;
        let mut adj_trend = 0.0;
        let mut adj_seasonal = vec![0.0; m];

        if self.use_checkpoints {
            for seg in (0..self.checkpoints.len()).rev() {
                let len = self.recompute_segment(params, seg);
                let start = seg * self.checkpoint_interval;
                for offset in (0..len).rev() {
                    let state = self.steps[offset];
                    step_adjoint(
                        spec,
                        m,
                        params,
                        start + offset,
                        &state,
                        sse,
                        n as f64,
                        &mut adj_level,
                        &mut adj_trend,
                        &mut adj_seasonal,
                        &mut grad,
                    );
                }
            }
        } else {
            for t in (0..n).rev() {
                let state = self.steps[t];
                step_adjoint(
                    spec,
                    m,
                    params,
                    t,
                    &state,
                    sse,
                    n as f64,
                    &mut adj_level,
                    &mut adj_trend,
                    &mut adj_seasonal,
                    &mut grad,
                );
            }
        }

        grad.level0 = adj_level;
        grad.trend0 = adj_trend;
        grad
    }
}

/// Adjoint of a single recursion step. Consumes the outgoing-state
/// adjoints and produces the incoming-state adjoints plus parameter
/// gradient contributions.
#[allow(clippy::too_many_arguments)]
fn step_adjoint(
    spec: EtsSpec,
    m: usize,
    params: &StepParams,
    t: usize,
    state: &StepState,
    sse: f64,
    n: f64,
    adj_level: &mut f64,
    adj_trend: &mut f64,
    adj_seasonal: &mut [f64],
    grad: &mut StepGrad,
) {
    let StepParams {
        alpha,
        beta,
        gamma,
        phi,
        ..
    } = *params;
    let l = state.level;
    let b = state.trend;
    let sm = state.seasonal_used;
    let f = state.forecast;
    let eps = state.eps;

    // Recompute forward intermediates.
    let (lb, dlb_dl, dlb_db, dlb_dphi) = match spec.trend {
        TrendComponent::None => (l, 1.0, 0.0, 0.0),
        TrendComponent::Additive => (l + b, 1.0, 1.0, 0.0),
        TrendComponent::DampedAdditive => (l + phi * b, 1.0, phi, b),
        TrendComponent::Multiplicative => (l * b, b, l, 0.0),
        TrendComponent::DampedMultiplicative => {
            let g = b.powf(phi);
            (
                l * g,
                g,
                l * phi * b.powf(phi - 1.0),
                l * g * guard(b).abs().max(1e-300).ln(),
            )
        }
    };

    let (dl, ddl_dsm) = match spec.seasonal {
        SeasonalComponent::Multiplicative => {
            let s = guard(sm);
            (1.0 / s, -1.0 / (s * s))
        }
        _ => (1.0, 0.0),
    };
    let (ds, dds_dlb) = match spec.seasonal {
        SeasonalComponent::Multiplicative => {
            let g = guard(lb);
            (1.0 / g, -1.0 / (g * g))
        }
        SeasonalComponent::Additive => (1.0, 0.0),
        SeasonalComponent::None => (0.0, 0.0),
    };

    // Direct objective contributions through eps and f.
    let (d_obj_d_eps, d_obj_d_f) = match spec.error {
        ErrorComponent::Additive => (2.0 * eps * n / sse, 0.0),
        ErrorComponent::Multiplicative => {
            let fg = guard(f);
            (
                (n / sse) * 2.0 * eps / (fg * fg),
                -(n / sse) * 2.0 * eps * eps / (fg * fg * fg) + 2.0 / fg,
            )
        }
    };

    // Outgoing adjoints for the states this step produced.
    let al_out = *adj_level;
    let ab_out = *adj_trend;
    let as_out = if spec.seasonal.has_seasonal() {
        adj_seasonal[t % m]
    } else {
        0.0
    };

    // Trend update partials.
    let (db_db, db_dl, db_dphi, db_deps, db_dbeta, db_ddl) = if spec.trend.has_trend() {
        if spec.trend.is_multiplicative() {
            let lg = guard(l);
            let (dg_db, dg_dphi) = match spec.trend {
                TrendComponent::Multiplicative => (1.0, 0.0),
                _ => (
                    phi * b.powf(phi - 1.0),
                    b.powf(phi) * guard(b).abs().max(1e-300).ln(),
                ),
            };
            (
                dg_db,
                -beta * eps * dl / (lg * lg),
                dg_dphi,
                beta * dl / lg,
                eps * dl / lg,
                beta * eps / lg,
            )
        } else {
            let dphi = if spec.trend.is_damped() { b } else { 0.0 };
            (phi, 0.0, dphi, beta * dl, eps * dl, beta * eps)
        }
    } else {
        (0.0, 0.0, 0.0, 0.0, 0.0, 0.0)
    };

    // eps adjoint gathers every update that consumed it.
    let mut a_eps = al_out * alpha * dl + d_obj_d_eps;
    if spec.trend.has_trend() {
        a_eps += ab_out * db_deps;
    }
    if spec.seasonal.has_seasonal() {
        a_eps += as_out * gamma * ds;
    }

    // f adjoint: eps = y − f.
    let a_f = -a_eps + d_obj_d_f;

    let df_dlb = match spec.seasonal {
        SeasonalComponent::Multiplicative => sm,
        _ => 1.0,
    };
    let df_dsm = match spec.seasonal {
        SeasonalComponent::Multiplicative => lb,
        SeasonalComponent::Additive => 1.0,
        SeasonalComponent::None => 0.0,
    };

    // lb adjoint: level update, forecast, and the seasonal divisor.
    let mut a_lb = al_out + a_f * df_dlb;
    if spec.seasonal == SeasonalComponent::Multiplicative {
        a_lb += as_out * gamma * eps * dds_dlb;
    }

    // sm adjoint: forecast, the dl divisors, and the seasonal carry.
    let mut a_sm = a_f * df_dsm;
    if spec.seasonal == SeasonalComponent::Multiplicative {
        a_sm += al_out * alpha * eps * ddl_dsm;
        if spec.trend.has_trend() {
            a_sm += ab_out * db_ddl * ddl_dsm;
        }
    }
    if spec.seasonal.has_seasonal() {
        a_sm += as_out; // s' = sm + γ·ε·ds carries sm through.
    }

    // Parameter gradients.
    grad.alpha += al_out * eps * dl;
    if spec.trend.has_trend() {
        grad.beta += ab_out * db_dbeta;
    }
    if spec.seasonal.has_seasonal() {
        grad.gamma += as_out * eps * ds;
    }
    if spec.trend.is_damped() {
        grad.phi += a_lb * dlb_dphi + ab_out * db_dphi;
    }

    // Incoming-state adjoints.
    let a_l = a_lb * dlb_dl + ab_out * db_dl;
    let a_b = a_lb * dlb_db + ab_out * db_db;

    *adj_level = a_l;
    *adj_trend = a_b;
    if spec.seasonal.has_seasonal() {
        adj_seasonal[t % m] = a_sm;
    }
}

// ---------------------------------------------------------------------------
// Fitting
// ---------------------------------------------------------------------------

fn optimize(values: &[f64], config: &EtsConfig, init: &InitialState) -> Result<EtsFit> {
    let spec = config.spec;
    let n = values.len() as f64;

    // Free-parameter layout: [alpha?, beta?, gamma?, phi?, level0, trend0?].
    let mut names: Vec<&str> = Vec::new();
    let mut x0: Vec<f64> = Vec::new();
    let mut lower: Vec<f64> = Vec::new();
    let mut upper: Vec<f64> = Vec::new();

    let spread = {
        let min = values.iter().cloned().fold(f64::INFINITY, f64::min);
        let max = values.iter().cloned().fold(f64::NEG_INFINITY, f64::max);
        (max - min).max(1e-6)
    };

    if config.alpha.is_none() {
        names.push("alpha");
        x0.push(0.2);
        lower.push(SMOOTHING_LO);
        upper.push(SMOOTHING_HI);
    }
    if spec.trend.has_trend() && config.beta.is_none() {
        names.push("beta");
        x0.push(0.05);
        lower.push(SMOOTHING_LO);
        upper.push(SMOOTHING_HI);
    }
    if spec.seasonal.has_seasonal() && config.gamma.is_none() {
        names.push("gamma");
        x0.push(0.05);
        lower.push(SMOOTHING_LO);
        upper.push(SMOOTHING_HI);
    }
    if spec.trend.is_damped() && config.phi.is_none() {
        names.push("phi");
        x0.push(0.97);
        lower.push(PHI_LO);
        upper.push(PHI_HI);
    }

    names.push("level0");
    x0.push(init.level);
    if spec.needs_positive_data() {
        lower.push(1e-8);
        upper.push(init.level.abs().max(spread) * 10.0);
    } else {
        lower.push(init.level - 5.0 * spread);
        upper.push(init.level + 5.0 * spread);
    }

    if spec.trend.has_trend() {
        names.push("trend0");
        if spec.trend.is_multiplicative() {
            x0.push(init.trend.clamp(0.5, 2.0));
            lower.push(0.5);
            upper.push(2.0);
        } else {
            x0.push(init.trend);
            lower.push(-spread);
            upper.push(spread);
        }
    }

    let assemble = |x: &[f64]| -> StepParams {
        let mut iter = x.iter();
        let mut next = || *iter.next().expect("layout covers every name");
        let mut params = StepParams {
            alpha: config.alpha.unwrap_or(0.0),
            beta: config.beta.unwrap_or(0.0),
            gamma: config.gamma.unwrap_or(0.0),
            phi: if spec.trend.is_damped() {
                config.phi.unwrap_or(0.97)
            } else {
                1.0
            },
            level0: 0.0,
            trend0: if spec.trend.is_multiplicative() { 1.0 } else { 0.0 },
        };
        for name in &names {
            match *name {
                "alpha" => params.alpha = next(),
                "beta" => params.beta = next(),
                "gamma" => params.gamma = next(),
                "phi" => params.phi = next(),
                "level0" => params.level0 = next(),
                "trend0" => params.trend0 = next(),
                _ => unreachable!(),
            }
        }
        params
    };

    let mut objective = EtsObjective::new(values, config, init);
    let mut closure = |x: &[f64]| -> (f64, Vec<f64>) {
        let params = assemble(x);
        let (value, grad) = objective.eval(&params);
        let mut g = Vec::with_capacity(x.len());
        for name in &names {
            g.push(match *name {
                "alpha" => grad.alpha,
                "beta" => grad.beta,
                "gamma" => grad.gamma,
                "phi" => grad.phi,
                "level0" => grad.level0,
                "trend0" => grad.trend0,
                _ => unreachable!(),
            });
        }
        (value, g)
    };

    let result = lbfgs_minimize(
        &mut closure,
        &x0,
        &lower,
        &upper,
        &LbfgsOptions::default(),
    )?;

    let params = assemble(&result.x);
    let mut check = EtsObjective::new(values, config, init);
    let (value, _) = check.eval(&params);
    if !value.is_finite() {
        return Err(ForecastError::NumericalFailure(
            "likelihood non-finite at the optimum".to_string(),
        ));
    }

    // Innovation variance from a final forward pass.
    let (sse, _) = check
        .forward(&params)
        .ok_or_else(|| ForecastError::NumericalFailure("forward pass diverged".to_string()))?;
    let sigma = (sse / n).sqrt();

    // Parameter count: smoothing parameters + initial states + sigma.
    let m = if spec.seasonal.has_seasonal() {
        config.season_length
    } else {
        0
    };
    let k = names.len() as f64 + m.saturating_sub(1) as f64 + 1.0;
    let aic = value + 2.0 * k;
    let bic = value + k * n.ln();

    Ok(EtsFit {
        alpha: params.alpha,
        beta: params.beta,
        gamma: params.gamma,
        phi: params.phi,
        initial_level: params.level0,
        initial_trend: params.trend0,
        initial_seasonal: init.seasonal.clone(),
        neg2_loglik: value,
        aic,
        bic,
        sigma,
        converged: result.converged,
    })
}

/// Model-specific h-step variance growth factor relative to the one-step
/// innovation variance.
fn variance_growth(spec: EtsSpec, fit: &EtsFit, m: usize, h: usize) -> f64 {
    let h_f = h as f64;
    let alpha = fit.alpha;
    let beta = fit.beta;
    let gamma = fit.gamma;
    let phi = fit.phi;

    let mut growth = match spec.trend {
        TrendComponent::None => 1.0 + alpha * alpha * (h_f - 1.0),
        TrendComponent::Additive | TrendComponent::Multiplicative => {
            1.0 + (h_f - 1.0)
                * (alpha * alpha
                    + alpha * beta * h_f
                    + beta * beta * h_f * (2.0 * h_f - 1.0) / 6.0)
        }
        TrendComponent::DampedAdditive | TrendComponent::DampedMultiplicative => {
            let one_minus = 1.0 - phi;
            let phi_h = phi.powi(h as i32);
            1.0 + alpha * alpha * (h_f - 1.0)
                + (beta * phi * h_f / one_minus.powi(2))
                    * (2.0 * alpha * one_minus + beta * phi)
                - (beta * phi * (1.0 - phi_h) / (one_minus.powi(2) * (1.0 - phi * phi)))
                    * (2.0 * alpha * (1.0 - phi * phi) + beta * phi * (1.0 + 2.0 * phi - phi_h))
        }
    };

    if spec.seasonal.has_seasonal() && m > 1 {
        let cycles = ((h - 1) / m) as f64;
        growth += gamma * cycles * (2.0 * alpha + gamma);
    }

    growth.max(1.0)
}

// ---------------------------------------------------------------------------
// AutoETS
// ---------------------------------------------------------------------------

/// Configuration for automatic ETS selection.
#[derive(Debug, Clone)]
pub struct AutoEtsConfig {
    /// Specification string with A|M|N or Z (automatic) per position,
    /// e.g. "ZZZ", "AZN", "AAdA".
    pub spec: String,
    pub season_length: usize,
}

impl Default for AutoEtsConfig {
    fn default() -> Self {
        Self {
            spec: "ZZZ".to_string(),
            season_length: 1,
        }
    }
}

/// AutoETS: fits the legal specification grid and keeps the model with
/// the lowest AIC (BIC breaks ties, then the canonical ordering of the
/// grid itself).
#[derive(Debug)]
pub struct AutoEts {
    config: AutoEtsConfig,
    chosen: Option<Ets>,
    chosen_spec: Option<EtsSpec>,
}

impl AutoEts {
    pub fn new(config: AutoEtsConfig) -> Result<Self> {
        parse_auto_spec(&config.spec)?;
        Ok(Self {
            config,
            chosen: None,
            chosen_spec: None,
        })
    }

    /// The specification that won selection.
    pub fn selected_spec(&self) -> Option<EtsSpec> {
        self.chosen_spec
    }

    /// Fit diagnostics of the winning model.
    pub fn fit_result(&self) -> Option<&EtsFit> {
        self.chosen.as_ref().and_then(|m| m.fit_result())
    }

    fn candidates(&self, values: &[f64]) -> Result<Vec<EtsSpec>> {
        let (errors, trends, seasonals) = parse_auto_spec(&self.config.spec)?;
        let positive = values.iter().all(|&v| v > 0.0);
        let seasonal_possible =
            self.config.season_length >= 2 && values.len() >= 2 * self.config.season_length;

        let mut specs = Vec::new();
        for &error in &errors {
            for &trend in &trends {
                for &seasonal in &seasonals {
                    let spec = EtsSpec {
                        error,
                        trend,
                        seasonal,
                    };
                    if !spec.is_valid() {
                        continue;
                    }
                    if spec.needs_positive_data() && !positive {
                        continue;
                    }
                    if seasonal.has_seasonal() && !seasonal_possible {
                        continue;
                    }
                    specs.push(spec);
                }
            }
        }
        if specs.is_empty() {
            return Err(ForecastError::InvalidModel(format!(
                "specification '{}' leaves no legal candidate",
                self.config.spec
            )));
        }
        Ok(specs)
    }
}

impl Forecaster for AutoEts {
    fn fit(&mut self, values: &[f64]) -> Result<()> {
        let specs = self.candidates(values)?;
        let mut best: Option<(f64, f64, usize, Ets, EtsSpec)> = None;
        let mut last_error: Option<ForecastError> = None;

        for (order, spec) in specs.into_iter().enumerate() {
            let mut model = match Ets::new(EtsConfig::new(spec, self.config.season_length)) {
                Ok(m) => m,
                Err(e) => {
                    last_error = Some(e);
                    continue;
                }
            };
            match model.fit(values) {
                Ok(()) => {}
                Err(e) => {
                    last_error = Some(e);
                    continue;
                }
            }
            let fit = model.fit_result().expect("fit succeeded");
            let (aic, bic) = (fit.aic, fit.bic);
            log::trace!("AutoETS candidate {} aic={aic:.3}", spec.notation());
            let better = match &best {
                None => true,
                Some((best_aic, best_bic, best_order, _, _)) => {
                    aic < *best_aic
                        || (aic == *best_aic && bic < *best_bic)
                        || (aic == *best_aic && bic == *best_bic && order < *best_order)
                }
            };
            if better {
                best = Some((aic, bic, order, model, spec));
            }
        }

        match best {
            Some((_, _, _, model, spec)) => {
                log::debug!("AutoETS selected {}", spec.notation());
                self.chosen = Some(model);
                self.chosen_spec = Some(spec);
                Ok(())
            }
            None => Err(last_error.unwrap_or_else(|| {
                ForecastError::Degenerate("no ETS candidate could be fitted".to_string())
            })),
        }
    }

    fn forecast(&self, horizon: usize, level: f64) -> Result<Forecast> {
        self.chosen
            .as_ref()
            .ok_or_else(|| ForecastError::InvalidInput("forecast before fit".to_string()))?
            .forecast(horizon, level)
    }

    fn fitted(&self) -> Option<&[f64]> {
        self.chosen.as_ref().and_then(|m| m.fitted())
    }

    fn residuals(&self) -> Option<&[f64]> {
        self.chosen.as_ref().and_then(|m| m.residuals())
    }

    fn name(&self) -> &'static str {
        "AutoETS"
    }
}

type AutoSpecSets = (
    Vec<ErrorComponent>,
    Vec<TrendComponent>,
    Vec<SeasonalComponent>,
);

fn parse_auto_spec(spec: &str) -> Result<AutoSpecSets> {
    let chars: Vec<char> = spec.chars().collect();
    let (e, t, damped, s) = match chars.len() {
        3 => (chars[0], chars[1], None, chars[2]),
        4 if chars[2] == 'd' => (chars[0], chars[1], Some(true), chars[3]),
        _ => {
            return Err(ForecastError::InvalidModel(format!(
                "Invalid AutoETS specification '{spec}'"
            )))
        }
    };

    let errors = match e {
        'A' => vec![ErrorComponent::Additive],
        'M' => vec![ErrorComponent::Multiplicative],
        'Z' => vec![ErrorComponent::Additive, ErrorComponent::Multiplicative],
        _ => {
            return Err(ForecastError::InvalidModel(format!(
                "Invalid error component '{e}' in '{spec}'"
            )))
        }
    };
    let trends = match (t, damped) {
        ('N', None) => vec![TrendComponent::None],
        ('A', None) => vec![TrendComponent::Additive],
        ('A', Some(true)) => vec![TrendComponent::DampedAdditive],
        ('M', None) => vec![TrendComponent::Multiplicative],
        ('M', Some(true)) => vec![TrendComponent::DampedMultiplicative],
        ('Z', None) => vec![
            TrendComponent::None,
            TrendComponent::Additive,
            TrendComponent::DampedAdditive,
            TrendComponent::Multiplicative,
            TrendComponent::DampedMultiplicative,
        ],
        _ => {
            return Err(ForecastError::InvalidModel(format!(
                "Invalid trend component '{t}' in '{spec}'"
            )))
        }
    };
    let seasonals = match s {
        'N' => vec![SeasonalComponent::None],
        'A' => vec![SeasonalComponent::Additive],
        'M' => vec![SeasonalComponent::Multiplicative],
        'Z' => vec![
            SeasonalComponent::None,
            SeasonalComponent::Additive,
            SeasonalComponent::Multiplicative,
        ],
        _ => {
            return Err(ForecastError::InvalidModel(format!(
                "Invalid seasonal component '{s}' in '{spec}'"
            )))
        }
    };

    Ok((errors, trends, seasonals))
}

impl FromStr for EtsSpec {
    type Err = ForecastError;

    fn from_str(s: &str) -> std::result::Result<Self, Self::Err> {
        EtsSpec::from_notation(s)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::forecast::Forecaster;
    use approx::assert_relative_eq;
    use std::f64::consts::PI;

    fn trend_seasonal_series(n: usize) -> Vec<f64> {
        (0..n)
            .map(|i| 100.0 + 0.5 * i as f64 + 10.0 * (2.0 * PI * i as f64 / 12.0).sin())
            .collect()
    }

    #[test]
    fn test_spec_parsing() {
        let spec = EtsSpec::from_notation("AAdM").unwrap();
        assert_eq!(spec.error, ErrorComponent::Additive);
        assert_eq!(spec.trend, TrendComponent::DampedAdditive);
        assert_eq!(spec.seasonal, SeasonalComponent::Multiplicative);
        assert_eq!(spec.notation(), "AAdM");
        assert!(EtsSpec::from_notation("XYZ").is_err());
    }

    #[test]
    fn test_unstable_specs_rejected() {
        assert!(!EtsSpec::from_notation("MAA").unwrap().is_valid());
        assert!(!EtsSpec::from_notation("MAdA").unwrap().is_valid());
        assert!(!EtsSpec::from_notation("AMA").unwrap().is_valid());
        assert!(EtsSpec::from_notation("AAA").unwrap().is_valid());
        assert!(EtsSpec::from_notation("MNM").unwrap().is_valid());
    }

    #[test]
    fn test_gradient_matches_finite_difference() {
        let values = trend_seasonal_series(60);
        let spec = EtsSpec::from_notation("AAA").unwrap();
        let config = EtsConfig::new(spec, 12);
        let init = initial_state(&values, spec, 12).unwrap();

        let params = StepParams {
            alpha: 0.3,
            beta: 0.05,
            gamma: 0.1,
            phi: 1.0,
            level0: init.level,
            trend0: init.trend,
        };

        let mut objective = EtsObjective::new(&values, &config, &init);
        let (value, grad) = objective.eval(&params);
        assert!(value.is_finite());

        let h = 1e-6;
        let numeric_grad = |bump: fn(&mut StepParams, f64)| {
            let mut plus = params;
            bump(&mut plus, h);
            let mut minus = params;
            bump(&mut minus, -h);
            let (fp, _) = EtsObjective::new(&values, &config, &init).eval(&plus);
            let (fm, _) = EtsObjective::new(&values, &config, &init).eval(&minus);
            (fp - fm) / (2.0 * h)
        };

        let g_alpha = numeric_grad(|p, d| p.alpha += d);
        let g_beta = numeric_grad(|p, d| p.beta += d);
        let g_gamma = numeric_grad(|p, d| p.gamma += d);
        let g_level = numeric_grad(|p, d| p.level0 += d);
        let g_trend = numeric_grad(|p, d| p.trend0 += d);

        assert_relative_eq!(grad.alpha, g_alpha, max_relative = 1e-3, epsilon = 1e-5);
        assert_relative_eq!(grad.beta, g_beta, max_relative = 1e-3, epsilon = 1e-5);
        assert_relative_eq!(grad.gamma, g_gamma, max_relative = 1e-3, epsilon = 1e-5);
        assert_relative_eq!(grad.level0, g_level, max_relative = 1e-3, epsilon = 1e-5);
        assert_relative_eq!(grad.trend0, g_trend, max_relative = 1e-3, epsilon = 1e-5);
    }

    #[test]
    fn test_gradient_matches_finite_difference_multiplicative() {
        let values = trend_seasonal_series(60);
        let spec = EtsSpec::from_notation("MAdM").unwrap();
        let config = EtsConfig::new(spec, 12);
        let init = initial_state(&values, spec, 12).unwrap();

        let params = StepParams {
            alpha: 0.3,
            beta: 0.05,
            gamma: 0.1,
            phi: 0.95,
            level0: init.level,
            trend0: init.trend,
        };

        let mut objective = EtsObjective::new(&values, &config, &init);
        let (value, grad) = objective.eval(&params);
        assert!(value.is_finite());

        let h = 1e-6;
        let numeric_grad = |bump: fn(&mut StepParams, f64)| {
            let mut plus = params;
            bump(&mut plus, h);
            let mut minus = params;
            bump(&mut minus, -h);
            let (fp, _) = EtsObjective::new(&values, &config, &init).eval(&plus);
            let (fm, _) = EtsObjective::new(&values, &config, &init).eval(&minus);
            (fp - fm) / (2.0 * h)
        };

        assert_relative_eq!(
            grad.alpha,
            numeric_grad(|p, d| p.alpha += d),
            max_relative = 1e-3,
            epsilon = 1e-4
        );
        assert_relative_eq!(
            grad.phi,
            numeric_grad(|p, d| p.phi += d),
            max_relative = 1e-3,
            epsilon = 1e-4
        );
        assert_relative_eq!(
            grad.level0,
            numeric_grad(|p, d| p.level0 += d),
            max_relative = 1e-3,
            epsilon = 1e-4
        );
    }

    #[test]
    fn test_checkpointed_gradient_matches_dense() {
        let values = trend_seasonal_series(260);
        let spec = EtsSpec::from_notation("AAN").unwrap();
        let config = EtsConfig::new(spec, 1);
        let init = initial_state(&values, spec, 1).unwrap();

        let params = StepParams {
            alpha: 0.25,
            beta: 0.05,
            gamma: 0.0,
            phi: 1.0,
            level0: init.level,
            trend0: init.trend,
        };

        // Dense path: force the no-checkpoint branch on a copy.
        let mut dense = EtsObjective::new(&values, &config, &init);
        dense.use_checkpoints = false;
        dense.steps = vec![StepState::default(); values.len()];
        let (fd, gd) = dense.eval(&params);

        let mut checkpointed = EtsObjective::new(&values, &config, &init);
        assert!(checkpointed.use_checkpoints);
        let (fc, gc) = checkpointed.eval(&params);

        assert_relative_eq!(fd, fc, epsilon = 1e-10);
        assert_relative_eq!(gd.alpha, gc.alpha, epsilon = 1e-10);
        assert_relative_eq!(gd.beta, gc.beta, epsilon = 1e-10);
        assert_relative_eq!(gd.level0, gc.level0, epsilon = 1e-10);
        assert_relative_eq!(gd.trend0, gc.trend0, epsilon = 1e-10);
    }

    #[test]
    fn test_ets_fit_and_forecast_shape() {
        let values = trend_seasonal_series(72);
        let spec = EtsSpec::from_notation("AAA").unwrap();
        let mut model = Ets::new(EtsConfig::new(spec, 12)).unwrap();
        model.fit(&values).unwrap();

        let forecast = model.forecast(12, 0.95).unwrap();
        assert_eq!(forecast.point.len(), 12);
        for i in 0..12 {
            assert!(forecast.point[i].is_finite());
            assert!(forecast.lower[i] <= forecast.point[i]);
            assert!(forecast.point[i] <= forecast.upper[i]);
        }
        assert_eq!(model.fitted().unwrap().len(), 72);
    }

    #[test]
    fn test_ets_multiplicative_rejects_nonpositive() {
        let values: Vec<f64> = (0..40).map(|i| (i as f64) - 20.0).collect();
        let spec = EtsSpec::from_notation("MNN").unwrap();
        let mut model = Ets::new(EtsConfig::new(spec, 1)).unwrap();
        assert!(matches!(
            model.fit(&values),
            Err(ForecastError::Degenerate(_))
        ));
    }

    #[test]
    fn test_auto_ets_beats_candidates_on_aic() {
        let values = trend_seasonal_series(72);
        let mut auto = AutoEts::new(AutoEtsConfig {
            spec: "ZZZ".to_string(),
            season_length: 12,
        })
        .unwrap();
        auto.fit(&values).unwrap();
        let winner_aic = auto.fit_result().unwrap().aic;

        // Any individually fitted candidate must not undercut the winner.
        for notation in ["ANN", "AAN", "AAA"] {
            let spec = EtsSpec::from_notation(notation).unwrap();
            let mut model = Ets::new(EtsConfig::new(spec, 12)).unwrap();
            if model.fit(&values).is_ok() {
                let aic = model.fit_result().unwrap().aic;
                assert!(
                    winner_aic <= aic + 1e-9,
                    "AutoETS {winner_aic} vs {notation} {aic}"
                );
            }
        }
    }

    #[test]
    fn test_auto_spec_filters() {
        let mut auto = AutoEts::new(AutoEtsConfig {
            spec: "AZN".to_string(),
            season_length: 1,
        })
        .unwrap();
        let values = trend_seasonal_series(50);
        auto.fit(&values).unwrap();
        let spec = auto.selected_spec().unwrap();
        assert_eq!(spec.error, ErrorComponent::Additive);
        assert_eq!(spec.seasonal, SeasonalComponent::None);
    }

    #[test]
    fn test_invalid_auto_spec() {
        assert!(AutoEts::new(AutoEtsConfig {
            spec: "QQQ".to_string(),
            season_length: 1,
        })
        .is_err());
    }
}
