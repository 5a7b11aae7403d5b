//! The Theta method family.
//!
//! The series is split into two theta lines: the long-term line is the
//! linear regression of the values on time, and the short-term line is
//! the series re-weighted away from that regression by the theta
//! coefficient. The short-term line is extrapolated by simple
//! exponential smoothing and the long-term line linearly; the forecast
//! recombines them with weights 1/θ and 1−1/θ. The dynamic variants
//! re-estimate the regression recursively as the sample grows, so the
//! drift contribution varies with the horizon step. Parameters are found
//! by Nelder–Mead on the one-step in-sample MSE with a reused workspace.

use crate::decomposition::{MstlConfig, MstlDecomposer};
use crate::error::{ForecastError, Result};
use crate::forecast::{validate_horizon_level, Forecast, Forecaster};
use crate::numeric;
use crate::optim::{
    lbfgs_minimize, nelder_mead_minimize, LbfgsOptions, NelderMeadOptions, NumericalGradient,
};
use crate::seasonality::{seasonal_strength, StrengthMethod};

/// Theta model variant.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum ThetaVariant {
    /// Standard Theta: θ = 2 fixed, α optimized
    Stm,
    /// Optimized Theta: θ and α optimized jointly
    Otm,
    /// Dynamic standard Theta
    Dstm,
    /// Dynamic optimized Theta (default of AutoTheta)
    #[default]
    Dotm,
}

impl ThetaVariant {
    fn is_dynamic(self) -> bool {
        matches!(self, ThetaVariant::Dstm | ThetaVariant::Dotm)
    }

    fn optimizes_theta(self) -> bool {
        matches!(self, ThetaVariant::Otm | ThetaVariant::Dotm)
    }

    fn name(self) -> &'static str {
        match self {
            ThetaVariant::Stm => "Theta",
            ThetaVariant::Otm => "OptimizedTheta",
            ThetaVariant::Dstm => "DynamicTheta",
            ThetaVariant::Dotm => "DynamicOptimizedTheta",
        }
    }
}

/// How the series is deseasonalized before the theta split.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum ThetaDecomposition {
    /// Multiplicative when the data is strictly positive and clearly
    /// seasonal, additive when seasonal but not positive, none otherwise.
    #[default]
    Auto,
    Additive,
    Multiplicative,
    None,
}

/// Configuration for a Theta forecaster.
#[derive(Debug, Clone)]
pub struct ThetaConfig {
    pub variant: ThetaVariant,
    /// Seasonal period; 1 disables deseasonalization.
    pub season_length: usize,
    pub decomposition: ThetaDecomposition,
}

impl ThetaConfig {
    pub fn new(variant: ThetaVariant, season_length: usize) -> Self {
        Self {
            variant,
            season_length,
            decomposition: ThetaDecomposition::Auto,
        }
    }
}

/// Reused buffers for the repeated objective evaluations.
#[derive(Debug, Clone, Default)]
struct ThetaWorkspace {
    /// Running regression state and SES level per step.
    states: Vec<[f64; 4]>,
    /// One-step errors.
    errors: Vec<f64>,
}

/// A fitted Theta forecaster.
#[derive(Debug)]
pub struct Theta {
    config: ThetaConfig,
    alpha: f64,
    theta: f64,
    level: f64,
    slope: f64,
    intercept: f64,
    n: usize,
    mse: f64,
    sigma: f64,
    seasonal: Vec<f64>,
    multiplicative_season: bool,
    fitted: Vec<f64>,
    residuals: Vec<f64>,
    workspace: ThetaWorkspace,
    is_fit: bool,
}

impl Theta {
    pub fn new(config: ThetaConfig) -> Self {
        Self {
            config,
            alpha: 0.3,
            theta: 2.0,
            level: 0.0,
            slope: 0.0,
            intercept: 0.0,
            n: 0,
            mse: f64::NAN,
            sigma: 0.0,
            seasonal: Vec::new(),
            multiplicative_season: false,
            fitted: Vec::new(),
            residuals: Vec::new(),
            workspace: ThetaWorkspace::default(),
            is_fit: false,
        }
    }

    /// In-sample one-step MSE of the fitted model.
    pub fn in_sample_mse(&self) -> f64 {
        self.mse
    }

    /// One pass of the theta recursion at `(alpha, theta)`.
    ///
    /// Returns the SSE; optionally records fitted values and the final
    /// state. The workspace rows are `[level, a, b, mu]` per step, where
    /// `a`/`b` are the regression coefficients in effect at that step.
    fn run(
        values: &[f64],
        variant: ThetaVariant,
        alpha: f64,
        theta: f64,
        workspace: &mut ThetaWorkspace,
        record: bool,
    ) -> f64 {
        workspace.errors.clear();
        if record {
            workspace.states.clear();
        }

        // Full-sample regression for the static variants.
        let (full_a, full_b) = regression_coefficients(values);

        // Running sums for the dynamic regression on y_1..t.
        let mut sum_t = 0.0;
        let mut sum_t2 = 0.0;
        let mut sum_y = 0.0;
        let mut sum_ty = 0.0;

        let mut level = values[0];
        let mut sse = 0.0;

        for (i, &y) in values.iter().enumerate() {
            let t = (i + 1) as f64;

            // Coefficients in effect before seeing y_t.
            let (a, b) = if variant.is_dynamic() {
                if i >= 2 {
                    running_regression(i as f64, sum_t, sum_t2, sum_y, sum_ty)
                } else {
                    (values[0], 0.0)
                }
            } else {
                (full_a, full_b)
            };

            let mu = if i == 0 {
                values[0]
            } else {
                let decay = (1.0 - alpha).powi(i as i32);
                level
                    + (1.0 - 1.0 / theta)
                        * (a * decay + b * (t - 1.0 + 1.0 / alpha - decay / alpha))
            };

            let e = y - mu;
            sse += e * e;
            workspace.errors.push(e);
            if record {
                workspace.states.push([level, a, b, mu]);
            }

            // SES level on the observations.
            level = if i == 0 { y } else { level + alpha * (y - level) };

            sum_t += t;
            sum_t2 += t * t;
            sum_y += y;
            sum_ty += t * y;
        }

        sse
    }
}

fn regression_coefficients(values: &[f64]) -> (f64, f64) {
    let n = values.len() as f64;
    let sum_t = n * (n + 1.0) / 2.0;
    let sum_t2 = n * (n + 1.0) * (2.0 * n + 1.0) / 6.0;
    let sum_y: f64 = values.iter().sum();
    let sum_ty: f64 = values
        .iter()
        .enumerate()
        .map(|(i, &y)| (i + 1) as f64 * y)
        .sum();
    running_regression(n, sum_t, sum_t2, sum_y, sum_ty)
}

/// Intercept and slope of y on t = 1..k from running sums.
fn running_regression(k: f64, sum_t: f64, sum_t2: f64, sum_y: f64, sum_ty: f64) -> (f64, f64) {
    let denom = k * sum_t2 - sum_t * sum_t;
    if denom.abs() < 1e-12 {
        return (sum_y / k.max(1.0), 0.0);
    }
    let b = (k * sum_ty - sum_t * sum_y) / denom;
    let a = (sum_y - b * sum_t) / k;
    (a, b)
}

impl Forecaster for Theta {
    fn fit(&mut self, values: &[f64]) -> Result<()> {
        let n = values.len();
        if n < 3 {
            return Err(ForecastError::InsufficientData { needed: 3, got: n });
        }
        if numeric::is_constant(values) {
            // Constant input short-circuits to a flat model.
            self.alpha = 0.3;
            self.theta = 2.0;
            self.level = values[0];
            self.slope = 0.0;
            self.intercept = values[0];
            self.n = n;
            self.mse = 0.0;
            self.sigma = 0.0;
            self.seasonal = Vec::new();
            self.fitted = values.to_vec();
            self.residuals = vec![0.0; n];
            self.is_fit = true;
            return Ok(());
        }

        // Deseasonalize when a seasonal period is configured.
        let (work, seasonal, multiplicative) = self.deseasonalize(values)?;
        let series = work.as_slice();

        let variant = self.config.variant;
        let mut workspace = std::mem::take(&mut self.workspace);

        // Static variants go through Nelder-Mead (the one-step MSE is not
        // smooth in alpha near the boundary); the dynamic variants use
        // bounded L-BFGS over forward-difference gradients, reusing the
        // same workspace for every probe evaluation.
        let (alpha, theta) = match (variant.is_dynamic(), variant.optimizes_theta()) {
            (false, true) => {
                let result = nelder_mead_minimize(
                    |x| Self::run(series, variant, x[0], x[1], &mut workspace, false),
                    &[0.3, 2.0],
                    &[0.01, 1.0],
                    &[0.99, 5.0],
                    &NelderMeadOptions::default(),
                )?;
                (result.x[0], result.x[1])
            }
            (false, false) => {
                let result = nelder_mead_minimize(
                    |x| Self::run(series, variant, x[0], 2.0, &mut workspace, false),
                    &[0.3],
                    &[0.01],
                    &[0.99],
                    &NelderMeadOptions::default(),
                )?;
                (result.x[0], 2.0)
            }
            (true, optimizes_theta) => {
                let mut objective = NumericalGradient::new(|x: &[f64]| {
                    let theta = if optimizes_theta { x[1] } else { 2.0 };
                    Self::run(series, variant, x[0], theta, &mut workspace, false)
                });
                let (x0, lo, hi): (&[f64], &[f64], &[f64]) = if optimizes_theta {
                    (&[0.3, 2.0], &[0.01, 1.0], &[0.99, 5.0])
                } else {
                    (&[0.3], &[0.01], &[0.99])
                };
                let result =
                    match lbfgs_minimize(&mut objective, x0, lo, hi, &LbfgsOptions::default()) {
                        Ok(r) => r,
                        // A stalled line search on the MSE surface falls
                        // back to the simplex search.
                        Err(_) => {
                            drop(objective);
                            nelder_mead_minimize(
                                |x| {
                                    let theta = if optimizes_theta { x[1] } else { 2.0 };
                                    Self::run(series, variant, x[0], theta, &mut workspace, false)
                                },
                                x0,
                                lo,
                                hi,
                                &NelderMeadOptions::default(),
                            )?
                        }
                    };
                if optimizes_theta {
                    (result.x[0], result.x[1])
                } else {
                    (result.x[0], 2.0)
                }
            }
        };

        let sse = Self::run(series, variant, alpha, theta, &mut workspace, true);
        let fitted_deseason: Vec<f64> = workspace.states.iter().map(|s| s[3]).collect();

        // Final regression state for forecasting.
        let (a, b) = regression_coefficients(series);
        let level = {
            let mut l = series[0];
            for &y in series.iter().skip(1) {
                l += alpha * (y - l);
            }
            l
        };

        // Re-seasonalized fitted values against the original series.
        let fitted: Vec<f64> = fitted_deseason
            .iter()
            .enumerate()
            .map(|(i, &f)| reseasonalize(f, i, &seasonal, multiplicative))
            .collect();
        self.residuals = values
            .iter()
            .zip(fitted.iter())
            .map(|(y, f)| y - f)
            .collect();
        self.sigma = (self
            .residuals
            .iter()
            .skip(1)
            .map(|r| r * r)
            .sum::<f64>()
            / (n - 1) as f64)
            .sqrt();

        self.alpha = alpha;
        self.theta = theta;
        self.level = level;
        self.intercept = a;
        self.slope = b;
        self.n = n;
        self.mse = sse / n as f64;
        self.seasonal = seasonal;
        self.multiplicative_season = multiplicative;
        self.fitted = fitted;
        self.workspace = workspace;
        self.is_fit = true;
        Ok(())
    }

    fn forecast(&self, horizon: usize, level: f64) -> Result<Forecast> {
        if !self.is_fit {
            return Err(ForecastError::InvalidInput(
                "forecast before fit".to_string(),
            ));
        }
        validate_horizon_level(horizon, level)?;

        let n = self.n as f64;
        let decay = (1.0 - self.alpha).powi(self.n as i32);
        let mut point = Vec::with_capacity(horizon);
        for h in 1..=horizon {
            let t = n + h as f64;
            let drift = self.intercept * decay
                + self.slope * (t - 1.0 + 1.0 / self.alpha - decay / self.alpha);
            let raw = self.level + (1.0 - 1.0 / self.theta) * drift;
            point.push(reseasonalize(
                raw,
                self.n + h - 1,
                &self.seasonal,
                self.multiplicative_season,
            ));
        }

        let z = numeric::normal_interval_z(level);
        let mut lower = Vec::with_capacity(horizon);
        let mut upper = Vec::with_capacity(horizon);
        for (idx, &p) in point.iter().enumerate() {
            let h = (idx + 1) as f64;
            let half = z * self.sigma * (1.0 + (h - 1.0) * self.alpha * self.alpha).sqrt();
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
        self.is_fit.then_some(self.fitted.as_slice())
    }

    fn residuals(&self) -> Option<&[f64]> {
        self.is_fit.then_some(self.residuals.as_slice())
    }

    fn name(&self) -> &'static str {
        self.config.variant.name()
    }
}

impl Theta {
    /// Remove the seasonal component when configured. Returns the working
    /// series, the per-position seasonal indices and whether they are
    /// multiplicative.
    fn deseasonalize(&self, values: &[f64]) -> Result<(Vec<f64>, Vec<f64>, bool)> {
        let m = self.config.season_length;
        if m < 2 || values.len() < 2 * m {
            return Ok((values.to_vec(), Vec::new(), false));
        }

        let strongly_seasonal = seasonal_strength(values, m, StrengthMethod::Variance)
            .map(|s| s > 0.5)
            .unwrap_or(false);
        let positive = values.iter().all(|&v| v > 0.0);

        let mode = match self.config.decomposition {
            ThetaDecomposition::None => return Ok((values.to_vec(), Vec::new(), false)),
            ThetaDecomposition::Additive => Some(false),
            ThetaDecomposition::Multiplicative => {
                if !positive {
                    return Err(ForecastError::Degenerate(
                        "multiplicative decomposition requires strictly positive values"
                            .to_string(),
                    ));
                }
                Some(true)
            }
            ThetaDecomposition::Auto => {
                if !strongly_seasonal {
                    None
                } else {
                    Some(positive)
                }
            }
        };

        let Some(multiplicative) = mode else {
            return Ok((values.to_vec(), Vec::new(), false));
        };

        let mut mstl = MstlDecomposer::new(MstlConfig::default());
        let decomposition = mstl.fit(values, &[m])?;
        let seasonal_component = &decomposition.seasonal[0];

        // Collapse the seasonal track to per-position indices.
        let mut indices = vec![0.0; m];
        let mut counts = vec![0usize; m];
        for (i, &s) in seasonal_component.iter().enumerate() {
            indices[i % m] += s;
            counts[i % m] += 1;
        }
        for (s, &c) in indices.iter_mut().zip(counts.iter()) {
            if c > 0 {
                *s /= c as f64;
            }
        }

        let (work, indices) = if multiplicative {
            // Convert the additive seasonal track into ratios around the
            // seasonal-free baseline.
            let base: Vec<f64> = values
                .iter()
                .zip(seasonal_component.iter())
                .map(|(v, s)| v - s)
                .collect();
            let mut ratios = vec![0.0; m];
            let mut counts = vec![0usize; m];
            for (i, (&v, &b)) in values.iter().zip(base.iter()).enumerate() {
                if b.abs() > 1e-10 {
                    ratios[i % m] += v / b;
                    counts[i % m] += 1;
                }
            }
            for (r, &c) in ratios.iter_mut().zip(counts.iter()) {
                *r = if c > 0 { *r / c as f64 } else { 1.0 };
            }
            let work: Vec<f64> = values
                .iter()
                .enumerate()
                .map(|(i, &v)| v / ratios[i % m].max(1e-10))
                .collect();
            (work, ratios)
        } else {
            let work: Vec<f64> = values
                .iter()
                .enumerate()
                .map(|(i, &v)| v - indices[i % m])
                .collect();
            (work, indices)
        };

        Ok((work, indices, multiplicative))
    }
}

fn reseasonalize(value: f64, position: usize, seasonal: &[f64], multiplicative: bool) -> f64 {
    if seasonal.is_empty() {
        return value;
    }
    let s = seasonal[position % seasonal.len()];
    if multiplicative {
        value * s
    } else {
        value + s
    }
}

/// AutoTheta model selection.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum AutoThetaMode {
    /// Use the dynamic optimized model directly.
    #[default]
    Default,
    /// Fit all four variants and keep the lowest in-sample MSE.
    All,
}

/// AutoTheta: DOTM by default, or a sweep over the four variants.
#[derive(Debug)]
pub struct AutoTheta {
    mode: AutoThetaMode,
    season_length: usize,
    chosen: Option<Theta>,
}

impl AutoTheta {
    pub fn new(mode: AutoThetaMode, season_length: usize) -> Self {
        Self {
            mode,
            season_length,
            chosen: None,
        }
    }

    /// The variant that won selection.
    pub fn selected_variant(&self) -> Option<ThetaVariant> {
        self.chosen.as_ref().map(|m| m.config.variant)
    }
}

impl Forecaster for AutoTheta {
    fn fit(&mut self, values: &[f64]) -> Result<()> {
        let variants: &[ThetaVariant] = match self.mode {
            AutoThetaMode::Default => &[ThetaVariant::Dotm],
            AutoThetaMode::All => &[
                ThetaVariant::Stm,
                ThetaVariant::Otm,
                ThetaVariant::Dstm,
                ThetaVariant::Dotm,
            ],
        };

        let mut best: Option<Theta> = None;
        let mut last_error: Option<ForecastError> = None;
        for &variant in variants {
            let mut model = Theta::new(ThetaConfig::new(variant, self.season_length));
            match model.fit(values) {
                Ok(()) => {
                    let better = match &best {
                        None => true,
                        Some(b) => model.in_sample_mse() < b.in_sample_mse(),
                    };
                    if better {
                        best = Some(model);
                    }
                }
                Err(e) => last_error = Some(e),
            }
        }

        match best {
            Some(model) => {
                log::debug!("AutoTheta selected {}", model.config.variant.name());
                self.chosen = Some(model);
                Ok(())
            }
            None => Err(last_error.unwrap_or_else(|| {
                ForecastError::Degenerate("no Theta variant could be fitted".to_string())
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
        "AutoTheta"
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use approx::assert_relative_eq;
    use std::f64::consts::PI;

    fn trend_series(n: usize) -> Vec<f64> {
        (0..n).map(|i| 10.0 + 0.8 * i as f64).collect()
    }

    #[test]
    fn test_theta_on_linear_trend() {
        let values = trend_series(50);
        let mut model = Theta::new(ThetaConfig::new(ThetaVariant::Otm, 1));
        model.fit(&values).unwrap();
        let forecast = model.forecast(5, 0.95).unwrap();
        // A pure trend should be continued closely.
        for (k, p) in forecast.point.iter().enumerate() {
            let expected = 10.0 + 0.8 * (50 + k) as f64;
            assert!((p - expected).abs() < 2.5, "step {k}: {p} vs {expected}");
        }
    }

    #[test]
    fn test_theta_constant_series() {
        let values = vec![3.0; 20];
        let mut model = Theta::new(ThetaConfig::new(ThetaVariant::Stm, 1));
        model.fit(&values).unwrap();
        let forecast = model.forecast(6, 0.9).unwrap();
        for p in &forecast.point {
            assert_relative_eq!(*p, 3.0, epsilon = 1e-9);
        }
    }

    #[test]
    fn test_dynamic_variant_fits() {
        let values: Vec<f64> = (0..60)
            .map(|i| 50.0 + 0.3 * i as f64 + ((i as f64) * 0.7).sin() * 2.0)
            .collect();
        let mut model = Theta::new(ThetaConfig::new(ThetaVariant::Dotm, 1));
        model.fit(&values).unwrap();
        assert!(model.in_sample_mse().is_finite());
        let forecast = model.forecast(10, 0.95).unwrap();
        assert_eq!(forecast.point.len(), 10);
        for i in 0..10 {
            assert!(forecast.lower[i] <= forecast.point[i]);
            assert!(forecast.point[i] <= forecast.upper[i]);
        }
    }

    #[test]
    fn test_seasonal_deseasonalization_roundtrip() {
        let values: Vec<f64> = (0..96)
            .map(|i| 100.0 + 0.2 * i as f64 + 15.0 * (2.0 * PI * i as f64 / 12.0).sin())
            .collect();
        let mut model = Theta::new(ThetaConfig::new(ThetaVariant::Otm, 12));
        model.fit(&values).unwrap();
        let forecast = model.forecast(12, 0.95).unwrap();
        // The forecast should retain the seasonal swing.
        let max = forecast.point.iter().cloned().fold(f64::MIN, f64::max);
        let min = forecast.point.iter().cloned().fold(f64::MAX, f64::min);
        assert!(max - min > 10.0, "amplitude {}", max - min);
    }

    #[test]
    fn test_auto_theta_all_picks_lowest_mse() {
        let values: Vec<f64> = (0..80)
            .map(|i| 30.0 + 0.4 * i as f64 + ((i * 7) % 5) as f64)
            .collect();
        let mut auto = AutoTheta::new(AutoThetaMode::All, 1);
        auto.fit(&values).unwrap();
        let chosen_mse = auto.chosen.as_ref().unwrap().in_sample_mse();

        for variant in [
            ThetaVariant::Stm,
            ThetaVariant::Otm,
            ThetaVariant::Dstm,
            ThetaVariant::Dotm,
        ] {
            let mut model = Theta::new(ThetaConfig::new(variant, 1));
            if model.fit(&values).is_ok() {
                assert!(chosen_mse <= model.in_sample_mse() + 1e-9);
            }
        }
    }

    #[test]
    fn test_auto_theta_default_is_dotm() {
        let values = trend_series(40);
        let mut auto = AutoTheta::new(AutoThetaMode::Default, 1);
        auto.fit(&values).unwrap();
        assert_eq!(auto.selected_variant(), Some(ThetaVariant::Dotm));
    }

    #[test]
    fn test_too_short() {
        let mut model = Theta::new(ThetaConfig::new(ThetaVariant::Stm, 1));
        assert!(model.fit(&[1.0, 2.0]).is_err());
    }
}
