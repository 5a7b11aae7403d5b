//! MFLES: gradient-boosted decomposition forecasting.
//!
//! Each boosting round strips a median baseline, fits a robust trend
//! (OLS, Siegel repeated medians, or piecewise linear), a weighted
//! Fourier seasonal expansion, and a multi-alpha SES ensemble on what
//! remains, then adds the round's fit scaled by the learning rate to the
//! accumulated model. AutoMFLES grid-searches trend method, Fourier
//! order and round count under rolling cross-validation.

use crate::error::{ForecastError, Result};
use crate::forecast::{validate_horizon_level, Forecast, Forecaster};
use crate::numeric;
use crate::regression::{ols, polyfit, siegel_repeated_medians};

/// Trend estimator used inside each boosting round.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum TrendMethod {
    #[default]
    Ols,
    Siegel,
    /// Two linear pieces joined at the midpoint.
    PiecewiseLinear,
}

/// Configuration for MFLES.
#[derive(Debug, Clone)]
pub struct MflesConfig {
    /// Seasonal period; 1 disables the Fourier stage.
    pub season_length: usize,
    pub trend_method: TrendMethod,
    /// Fourier harmonics for the seasonal stage (3..=7 is the useful
    /// range).
    pub fourier_order: usize,
    /// Boosting rounds.
    pub rounds: usize,
    /// Fraction of each round's fit added to the model.
    pub learning_rate: f64,
    /// SES ensemble smoothing parameters.
    pub ses_alphas: Vec<f64>,
}

impl Default for MflesConfig {
    fn default() -> Self {
        Self {
            season_length: 1,
            trend_method: TrendMethod::Ols,
            fourier_order: 3,
            rounds: 3,
            learning_rate: 0.7,
            ses_alphas: vec![0.05, 0.15, 0.3, 0.5],
        }
    }
}

/// One boosting round's fitted pieces, kept for extrapolation.
#[derive(Debug, Clone)]
struct Round {
    median: f64,
    intercept: f64,
    slope: f64,
    /// Second-piece coefficients for the piecewise trend.
    second: Option<(f64, f64, usize)>,
    fourier: Vec<f64>,
    ses_level: f64,
}

/// The MFLES forecaster.
#[derive(Debug)]
pub struct Mfles {
    config: MflesConfig,
    rounds: Vec<Round>,
    exog_coeffs: Vec<f64>,
    n: usize,
    sigma: f64,
    fitted: Vec<f64>,
    residuals: Vec<f64>,
    is_fit: bool,
}

impl Mfles {
    pub fn new(config: MflesConfig) -> Result<Self> {
        if !(0.0 < config.learning_rate && config.learning_rate <= 1.0) {
            return Err(ForecastError::invalid_parameter(
                "learning_rate",
                config.learning_rate,
                "must be in (0, 1]",
            ));
        }
        if config.rounds == 0 {
            return Err(ForecastError::invalid_parameter(
                "rounds",
                config.rounds,
                "must be at least 1",
            ));
        }
        if config.season_length > 1 && !(1..=12).contains(&config.fourier_order) {
            return Err(ForecastError::invalid_parameter(
                "fourier_order",
                config.fourier_order,
                "must be in 1..=12",
            ));
        }
        Ok(Self {
            config,
            rounds: Vec::new(),
            exog_coeffs: Vec::new(),
            n: 0,
            sigma: 0.0,
            fitted: Vec::new(),
            residuals: Vec::new(),
            is_fit: false,
        })
    }

    /// Fit with an optional exogenous linear term. Historical regressors
    /// are absorbed first; the boosted decomposition models the residual.
    pub fn fit_with_exog(&mut self, values: &[f64], exog: &[Vec<f64>]) -> Result<()> {
        let n = values.len();
        if n < 5 {
            return Err(ForecastError::InsufficientData { needed: 5, got: n });
        }

        let (target, coeffs): (Vec<f64>, Vec<f64>) = if exog.is_empty() {
            (values.to_vec(), Vec::new())
        } else {
            let (coeffs, fitted) = ols(values, exog)?;
            let resid = values
                .iter()
                .zip(fitted.iter())
                .map(|(y, f)| y - f)
                .collect();
            (resid, coeffs)
        };

        let mut residual = target.clone();
        let mut accumulated = vec![0.0; n];
        let mut rounds = Vec::with_capacity(self.config.rounds);

        for _ in 0..self.config.rounds {
            let (round, contribution) = self.fit_round(&residual)?;
            let rate = self.config.learning_rate;
            for ((r, a), c) in residual
                .iter_mut()
                .zip(accumulated.iter_mut())
                .zip(contribution.iter())
            {
                *a += rate * c;
                *r -= rate * c;
            }
            rounds.push(round);
        }

        // Exogenous fitted part re-added for reporting.
        let fitted: Vec<f64> = (0..n)
            .map(|i| {
                let exog_part = if coeffs.is_empty() {
                    0.0
                } else {
                    let mut acc = coeffs[0];
                    for (j, col) in exog.iter().enumerate() {
                        acc += coeffs[j + 1] * col[i];
                    }
                    acc
                };
                accumulated[i] + exog_part
            })
            .collect();

        self.residuals = values
            .iter()
            .zip(fitted.iter())
            .map(|(y, f)| y - f)
            .collect();
        self.sigma =
            (self.residuals.iter().map(|r| r * r).sum::<f64>() / n as f64).sqrt();
        self.rounds = rounds;
        self.exog_coeffs = coeffs;
        self.n = n;
        self.fitted = fitted;
        self.is_fit = true;
        Ok(())
    }

    /// One boosting round over the current residual. Returns the round
    /// state and its in-sample contribution (unscaled).
    fn fit_round(&self, residual: &[f64]) -> Result<(Round, Vec<f64>)> {
        let n = residual.len();
        let m = self.config.season_length;

        // 1. Median baseline.
        let median = numeric::median(residual);
        let mut work: Vec<f64> = residual.iter().map(|v| v - median).collect();

        // 2. Robust trend.
        let (intercept, slope, second) = match self.config.trend_method {
            TrendMethod::Ols => {
                let fit = polyfit(&work, 1)?;
                (fit.coefficients[0], fit.coefficients[1], None)
            }
            TrendMethod::Siegel => {
                let (slope, intercept) = siegel_repeated_medians(&work)?;
                (intercept, slope, None)
            }
            TrendMethod::PiecewiseLinear => {
                let split = n / 2;
                let first = polyfit(&work[..split], 1)?;
                let second_fit = polyfit(&work[split..], 1)?;
                (
                    first.coefficients[0],
                    first.coefficients[1],
                    Some((second_fit.coefficients[0], second_fit.coefficients[1], split)),
                )
            }
        };
        for (i, w) in work.iter_mut().enumerate() {
            *w -= eval_trend(intercept, slope, &second, i);
        }

        // 3. Weighted Fourier seasonal expansion.
        let fourier = if m > 1 && n >= 2 * m {
            let order = self.config.fourier_order.min(m / 2).max(1);
            let basis = fourier_basis(n, m, order);
            let (coeffs, fitted) = ols(&work, &basis)?;
            for (w, f) in work.iter_mut().zip(fitted.iter()) {
                *w -= f;
            }
            coeffs
        } else {
            Vec::new()
        };

        // 4. Multi-alpha SES ensemble on the remainder. The ensemble's
        // one-step path joins the in-sample contribution so later rounds
        // boost on what is genuinely left.
        let mut ses_fitted = vec![0.0; n];
        let mut ses_level = 0.0;
        if n > 1 && !self.config.ses_alphas.is_empty() {
            let n_alphas = self.config.ses_alphas.len() as f64;
            for &alpha in &self.config.ses_alphas {
                let mut level = work[0];
                ses_fitted[0] += work[0] / n_alphas;
                for (i, &v) in work.iter().enumerate().skip(1) {
                    ses_fitted[i] += level / n_alphas;
                    level += alpha * (v - level);
                }
                ses_level += level / n_alphas;
            }
        }

        let round = Round {
            median,
            intercept,
            slope,
            second,
            fourier,
            ses_level,
        };
        let contribution: Vec<f64> = (0..n)
            .map(|i| self.eval_round_base(&round, i) + ses_fitted[i])
            .collect();
        Ok((round, contribution))
    }

    /// The round's deterministic part (median + trend + Fourier) at
    /// position `i`.
    fn eval_round_base(&self, round: &Round, i: usize) -> f64 {
        let m = self.config.season_length;
        let mut value = round.median + eval_trend(round.intercept, round.slope, &round.second, i);
        if !round.fourier.is_empty() {
            value += eval_fourier(&round.fourier, i, m);
        }
        value
    }

    /// The round's extrapolated value at a future position.
    fn eval_round(&self, round: &Round, i: usize) -> f64 {
        self.eval_round_base(round, i) + round.ses_level
    }

    /// Forecast with future regressor values, adding back the exogenous
    /// linear term fitted by [`Mfles::fit_with_exog`]. Each future column
    /// must cover the horizon.
    pub fn forecast_with_exog(
        &self,
        horizon: usize,
        level: f64,
        future_exog: &[Vec<f64>],
    ) -> Result<Forecast> {
        let mut forecast = self.forecast(horizon, level)?;
        if self.exog_coeffs.is_empty() {
            return Ok(forecast);
        }
        if future_exog.len() + 1 != self.exog_coeffs.len() {
            return Err(ForecastError::InvalidInput(format!(
                "expected {} future regressors, got {}",
                self.exog_coeffs.len() - 1,
                future_exog.len()
            )));
        }
        for (j, col) in future_exog.iter().enumerate() {
            if col.len() < horizon {
                return Err(ForecastError::InvalidInput(format!(
                    "future regressor {} covers {} steps but horizon is {}",
                    j,
                    col.len(),
                    horizon
                )));
            }
        }
        for k in 0..horizon {
            let mut effect = self.exog_coeffs[0];
            for (j, col) in future_exog.iter().enumerate() {
                effect += self.exog_coeffs[j + 1] * col[k];
            }
            forecast.point[k] += effect;
            forecast.lower[k] += effect;
            forecast.upper[k] += effect;
        }
        Ok(forecast)
    }
}

fn eval_trend(intercept: f64, slope: f64, second: &Option<(f64, f64, usize)>, i: usize) -> f64 {
    match second {
        Some((intercept2, slope2, split)) if i >= *split => {
            intercept2 + slope2 * (i - split) as f64
        }
        _ => intercept + slope * i as f64,
    }
}

/// Fourier regressor columns: sin/cos pairs per harmonic.
fn fourier_basis(n: usize, m: usize, order: usize) -> Vec<Vec<f64>> {
    let mut basis = Vec::with_capacity(2 * order);
    for k in 1..=order {
        let omega = 2.0 * std::f64::consts::PI * k as f64 / m as f64;
        basis.push((0..n).map(|i| (omega * i as f64).sin()).collect());
        basis.push((0..n).map(|i| (omega * i as f64).cos()).collect());
    }
    basis
}

fn eval_fourier(coeffs: &[f64], i: usize, m: usize) -> f64 {
    // coeffs[0] is the OLS intercept, then sin/cos pairs.
    let mut value = coeffs[0];
    let order = (coeffs.len() - 1) / 2;
    for k in 1..=order {
        let omega = 2.0 * std::f64::consts::PI * k as f64 / m as f64;
        value += coeffs[2 * k - 1] * (omega * i as f64).sin();
        value += coeffs[2 * k] * (omega * i as f64).cos();
    }
    value
}

impl Forecaster for Mfles {
    fn fit(&mut self, values: &[f64]) -> Result<()> {
        self.fit_with_exog(values, &[])
    }

    fn forecast(&self, horizon: usize, level: f64) -> Result<Forecast> {
        if !self.is_fit {
            return Err(ForecastError::InvalidInput(
                "forecast before fit".to_string(),
            ));
        }
        validate_horizon_level(horizon, level)?;

        let rate = self.config.learning_rate;
        let point: Vec<f64> = (0..horizon)
            .map(|k| {
                self.rounds
                    .iter()
                    .map(|round| rate * self.eval_round(round, self.n + k))
                    .sum()
            })
            .collect();

        let z = numeric::normal_interval_z(level);
        let mut lower = Vec::with_capacity(horizon);
        let mut upper = Vec::with_capacity(horizon);
        for (k, &p) in point.iter().enumerate() {
            let half = z * self.sigma * (1.0 + k as f64 * 0.1).sqrt();
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
        "MFLES"
    }
}

/// AutoMFLES: rolling-CV grid search over trend method, Fourier order
/// and round count.
#[derive(Debug)]
pub struct AutoMfles {
    season_length: usize,
    /// CV horizon per fold.
    cv_horizon: usize,
    chosen: Option<Mfles>,
}

impl AutoMfles {
    pub fn new(season_length: usize, cv_horizon: usize) -> Result<Self> {
        if cv_horizon < 1 {
            return Err(ForecastError::invalid_parameter(
                "cv_horizon",
                cv_horizon,
                "must be at least 1",
            ));
        }
        Ok(Self {
            season_length,
            cv_horizon,
            chosen: None,
        })
    }

    fn candidate_configs(&self) -> Vec<MflesConfig> {
        let mut configs = Vec::new();
        let orders: &[usize] = if self.season_length > 1 {
            &[3, 5, 7]
        } else {
            &[3]
        };
        for &trend_method in &[TrendMethod::Ols, TrendMethod::Siegel, TrendMethod::PiecewiseLinear]
        {
            for &fourier_order in orders {
                for &rounds in &[1usize, 3, 5] {
                    configs.push(MflesConfig {
                        season_length: self.season_length,
                        trend_method,
                        fourier_order,
                        rounds,
                        ..MflesConfig::default()
                    });
                }
            }
        }
        configs
    }

    /// Rolling-origin MSE of a config over the tail of the series.
    fn cv_score(&self, values: &[f64], config: &MflesConfig) -> Result<f64> {
        let n = values.len();
        let h = self.cv_horizon;
        let min_train = (n / 2).max(5);
        if n < min_train + h {
            return Err(ForecastError::InsufficientData {
                needed: min_train + h,
                got: n,
            });
        }

        let mut sse = 0.0;
        let mut count = 0usize;
        let mut train_end = min_train;
        while train_end + h <= n && count < 5 * h {
            let mut model = Mfles::new(config.clone())?;
            model.fit(&values[..train_end])?;
            let forecast = model.forecast(h, 0.95)?;
            for (k, &p) in forecast.point.iter().enumerate() {
                let e = values[train_end + k] - p;
                sse += e * e;
                count += 1;
            }
            train_end += h;
        }
        if count == 0 {
            return Err(ForecastError::InsufficientData {
                needed: min_train + h,
                got: n,
            });
        }
        Ok(sse / count as f64)
    }
}

impl Forecaster for AutoMfles {
    fn fit(&mut self, values: &[f64]) -> Result<()> {
        let mut best: Option<(f64, MflesConfig)> = None;
        let mut last_error: Option<ForecastError> = None;

        for config in self.candidate_configs() {
            match self.cv_score(values, &config) {
                Ok(score) => {
                    log::trace!(
                        "AutoMFLES {:?}/order{}/rounds{} mse={score:.4}",
                        config.trend_method,
                        config.fourier_order,
                        config.rounds
                    );
                    let better = match &best {
                        None => true,
                        Some((b, _)) => score < *b,
                    };
                    if better {
                        best = Some((score, config));
                    }
                }
                Err(e) => last_error = Some(e),
            }
        }

        let (_, config) = best.ok_or_else(|| {
            last_error.unwrap_or_else(|| {
                ForecastError::Degenerate("no MFLES candidate could be scored".to_string())
            })
        })?;

        let mut model = Mfles::new(config)?;
        model.fit(values)?;
        self.chosen = Some(model);
        Ok(())
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
        "AutoMFLES"
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::f64::consts::PI;

    fn seasonal_trend_series(n: usize) -> Vec<f64> {
        (0..n)
            .map(|i| 40.0 + 0.3 * i as f64 + 6.0 * (2.0 * PI * i as f64 / 12.0).sin())
            .collect()
    }

    #[test]
    fn test_mfles_fits_trend_and_season() {
        let values = seasonal_trend_series(96);
        let mut model = Mfles::new(MflesConfig {
            season_length: 12,
            ..MflesConfig::default()
        })
        .unwrap();
        model.fit(&values).unwrap();
        // In-sample error well below the seasonal amplitude.
        assert!(model.sigma < 3.0, "sigma {}", model.sigma);

        let forecast = model.forecast(12, 0.95).unwrap();
        assert_eq!(forecast.point.len(), 12);
        for i in 0..12 {
            assert!(forecast.lower[i] <= forecast.point[i]);
            assert!(forecast.point[i] <= forecast.upper[i]);
        }
    }

    #[test]
    fn test_mfles_continues_trend() {
        let values: Vec<f64> = (0..60).map(|i| 5.0 + 2.0 * i as f64).collect();
        let mut model = Mfles::new(MflesConfig::default()).unwrap();
        model.fit(&values).unwrap();
        let forecast = model.forecast(5, 0.95).unwrap();
        for (k, p) in forecast.point.iter().enumerate() {
            let expected = 5.0 + 2.0 * (60 + k) as f64;
            assert!(
                (p - expected).abs() < 8.0,
                "step {k}: {p} vs {expected}"
            );
        }
    }

    #[test]
    fn test_mfles_with_exog() {
        // y = 3·x + noiseless trend; the exogenous term should absorb x.
        let x: Vec<f64> = (0..50).map(|i| ((i * 13) % 7) as f64).collect();
        let values: Vec<f64> = (0..50).map(|i| 10.0 + 3.0 * x[i] + 0.1 * i as f64).collect();
        let mut model = Mfles::new(MflesConfig::default()).unwrap();
        model.fit_with_exog(&values, &[x]).unwrap();
        assert!(model.sigma < 1.0, "sigma {}", model.sigma);
    }

    #[test]
    fn test_siegel_trend_resists_outliers() {
        let mut values: Vec<f64> = (0..60).map(|i| 1.0 + 0.5 * i as f64).collect();
        values[10] = 300.0;
        values[40] = -200.0;
        let mut model = Mfles::new(MflesConfig {
            trend_method: TrendMethod::Siegel,
            rounds: 1,
            learning_rate: 1.0,
            ..MflesConfig::default()
        })
        .unwrap();
        model.fit(&values).unwrap();
        let forecast = model.forecast(1, 0.95).unwrap();
        let expected = 1.0 + 0.5 * 60.0;
        assert!(
            (forecast.point[0] - expected).abs() < 5.0,
            "{} vs {expected}",
            forecast.point[0]
        );
    }

    #[test]
    fn test_auto_mfles_selects_and_forecasts() {
        let values = seasonal_trend_series(120);
        let mut auto = AutoMfles::new(12, 6).unwrap();
        auto.fit(&values).unwrap();
        let forecast = auto.forecast(6, 0.95).unwrap();
        assert_eq!(forecast.point.len(), 6);
        assert!(forecast.point.iter().all(|p| p.is_finite()));
    }

    #[test]
    fn test_invalid_config() {
        assert!(Mfles::new(MflesConfig {
            learning_rate: 0.0,
            ..MflesConfig::default()
        })
        .is_err());
        assert!(Mfles::new(MflesConfig {
            rounds: 0,
            ..MflesConfig::default()
        })
        .is_err());
    }
}
