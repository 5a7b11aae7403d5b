//! Multi-seasonal forecasters: MSTL and the TBATS-shape wrapper.
//!
//! The MSTL forecaster decomposes the series, projects each seasonal
//! component by cycling its last full period, and forecasts the
//! deseasonalized remainder with a configurable method. The TBATS-shape
//! wrapper applies a Box-Cox transform around the same machinery.

use crate::decomposition::{mstl_decompose, MstlDecomposition};
use crate::error::{ForecastError, Result};
use crate::ets::{AutoEts, AutoEtsConfig};
use crate::forecast::{validate_horizon_level, Forecast, Forecaster};
use crate::numeric;
use crate::transforms::{BoxCox, Transformer};

/// How the deseasonalized series is forecast.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum DeseasonalizedMethod {
    /// Simple exponential smoothing (fastest, the default).
    #[default]
    ExponentialSmoothing,
    /// Linear extrapolation of the trend.
    Linear,
    /// AutoETS on the deseasonalized series (most accurate, slowest).
    AutoEts,
}

impl DeseasonalizedMethod {
    /// Numeric codes used by the string parameter surface: 0, 1, 2.
    pub fn from_code(code: i64) -> Result<Self> {
        match code {
            0 => Ok(Self::ExponentialSmoothing),
            1 => Ok(Self::Linear),
            2 => Ok(Self::AutoEts),
            other => Err(ForecastError::invalid_parameter(
                "deseasonalized_method",
                other,
                "must be 0 (ES), 1 (linear) or 2 (AutoETS)",
            )),
        }
    }
}

/// Configuration for the MSTL forecaster.
#[derive(Debug, Clone)]
pub struct MstlForecastConfig {
    pub periods: Vec<usize>,
    pub method: DeseasonalizedMethod,
    pub robust: bool,
    pub iterations: usize,
}

impl MstlForecastConfig {
    pub fn new(periods: Vec<usize>) -> Self {
        Self {
            periods,
            method: DeseasonalizedMethod::default(),
            robust: false,
            iterations: 2,
        }
    }
}

enum DeseasonalizedModel {
    Level(f64),
    Linear { intercept: f64, slope: f64 },
    Ets(Box<AutoEts>),
}

impl std::fmt::Debug for DeseasonalizedModel {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Level(l) => write!(f, "Level({l})"),
            Self::Linear { intercept, slope } => write!(f, "Linear({intercept}, {slope})"),
            Self::Ets(_) => write!(f, "Ets"),
        }
    }
}

/// Forecaster built on MSTL decomposition.
#[derive(Debug)]
pub struct MstlForecaster {
    config: MstlForecastConfig,
    decomposition: Option<MstlDecomposition>,
    deseasonalized_model: Option<DeseasonalizedModel>,
    n: usize,
    sigma: f64,
    fitted: Vec<f64>,
    residuals: Vec<f64>,
}

impl MstlForecaster {
    pub fn new(config: MstlForecastConfig) -> Result<Self> {
        if config.periods.is_empty() {
            return Err(ForecastError::invalid_parameter(
                "periods",
                "[]",
                "at least one seasonal period is required",
            ));
        }
        if config.periods.iter().any(|&p| p < 2) {
            return Err(ForecastError::invalid_parameter(
                "periods",
                format!("{:?}", config.periods),
                "every period must be at least 2",
            ));
        }
        Ok(Self {
            config,
            decomposition: None,
            deseasonalized_model: None,
            n: 0,
            sigma: 0.0,
            fitted: Vec::new(),
            residuals: Vec::new(),
        })
    }

    /// Decomposition of the training series, available after fit.
    pub fn decomposition(&self) -> Option<&MstlDecomposition> {
        self.decomposition.as_ref()
    }
}

impl Forecaster for MstlForecaster {
    fn fit(&mut self, values: &[f64]) -> Result<()> {
        let n = values.len();
        let decomposition = mstl_decompose(
            values,
            &self.config.periods,
            self.config.robust,
            self.config.iterations,
        )?;

        // Deseasonalized series: trend + remainder.
        let deseason: Vec<f64> = (0..n)
            .map(|i| {
                let seasonal: f64 = decomposition.seasonal.iter().map(|s| s[i]).sum();
                values[i] - seasonal
            })
            .collect();

        let (model, deseason_fitted): (DeseasonalizedModel, Vec<f64>) = match self.config.method {
            DeseasonalizedMethod::ExponentialSmoothing => {
                let alpha = 0.3;
                let mut level = deseason[0];
                let mut fitted = Vec::with_capacity(n);
                fitted.push(deseason[0]);
                for &v in deseason.iter().skip(1) {
                    fitted.push(level);
                    level += alpha * (v - level);
                }
                (DeseasonalizedModel::Level(level), fitted)
            }
            DeseasonalizedMethod::Linear => {
                let (slope, intercept) = crate::regression::linear_trend(&deseason)?;
                let fitted = (0..n).map(|i| intercept + slope * i as f64).collect();
                (DeseasonalizedModel::Linear { intercept, slope }, fitted)
            }
            DeseasonalizedMethod::AutoEts => {
                let mut ets = AutoEts::new(AutoEtsConfig {
                    spec: "ZZN".to_string(),
                    season_length: 1,
                })?;
                ets.fit(&deseason)?;
                let fitted = ets
                    .fitted()
                    .map(|f| f.to_vec())
                    .unwrap_or_else(|| deseason.clone());
                (DeseasonalizedModel::Ets(Box::new(ets)), fitted)
            }
        };

        // Fitted values: deseasonalized fit plus the seasonal components.
        self.fitted = (0..n)
            .map(|i| {
                let seasonal: f64 = decomposition.seasonal.iter().map(|s| s[i]).sum();
                deseason_fitted[i] + seasonal
            })
            .collect();
        self.residuals = values
            .iter()
            .zip(self.fitted.iter())
            .map(|(y, f)| y - f)
            .collect();
        self.sigma = (self
            .residuals
            .iter()
            .map(|r| r * r)
            .sum::<f64>()
            / n as f64)
            .sqrt();

        self.decomposition = Some(decomposition);
        self.deseasonalized_model = Some(model);
        self.n = n;
        Ok(())
    }

    fn forecast(&self, horizon: usize, level: f64) -> Result<Forecast> {
        let decomposition = self
            .decomposition
            .as_ref()
            .ok_or_else(|| ForecastError::InvalidInput("forecast before fit".to_string()))?;
        let model = self
            .deseasonalized_model
            .as_ref()
            .expect("model present when decomposition is");
        validate_horizon_level(horizon, level)?;

        // Deseasonalized projection.
        let base: Vec<f64> = match model {
            DeseasonalizedModel::Level(l) => vec![*l; horizon],
            DeseasonalizedModel::Linear { intercept, slope } => (0..horizon)
                .map(|k| intercept + slope * (self.n + k) as f64)
                .collect(),
            DeseasonalizedModel::Ets(ets) => ets.forecast(horizon, level)?.point,
        };

        // Seasonal components cycle their last full period.
        let mut point = base;
        for (component, &period) in decomposition
            .seasonal
            .iter()
            .zip(decomposition.periods.iter())
        {
            let last_cycle = &component[self.n - period..];
            for (k, p) in point.iter_mut().enumerate() {
                *p += last_cycle[k % period];
            }
        }

        let z = numeric::normal_interval_z(level);
        let mut lower = Vec::with_capacity(horizon);
        let mut upper = Vec::with_capacity(horizon);
        for (k, &p) in point.iter().enumerate() {
            let half = z * self.sigma * (1.0 + k as f64 * 0.05).sqrt();
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
        self.decomposition.as_ref().map(|_| self.fitted.as_slice())
    }

    fn residuals(&self) -> Option<&[f64]> {
        self.decomposition
            .as_ref()
            .map(|_| self.residuals.as_slice())
    }

    fn name(&self) -> &'static str {
        "MSTL"
    }
}

/// TBATS-shape wrapper: Box-Cox stabilization around a multi-seasonal
/// decomposition forecaster.
#[derive(Debug)]
pub struct Tbats {
    inner: MstlForecaster,
    boxcox: Option<BoxCox>,
}

impl Tbats {
    pub fn new(periods: Vec<usize>) -> Result<Self> {
        let config = MstlForecastConfig {
            method: DeseasonalizedMethod::ExponentialSmoothing,
            ..MstlForecastConfig::new(periods)
        };
        Ok(Self {
            inner: MstlForecaster::new(config)?,
            boxcox: None,
        })
    }
}

impl Forecaster for Tbats {
    fn fit(&mut self, values: &[f64]) -> Result<()> {
        // Box-Cox only applies to strictly positive data.
        if values.iter().all(|&v| v > 0.0) {
            let mut transform = BoxCox::fitted_lambda();
            transform.fit(values)?;
            let transformed = transform.transform(values)?;
            self.inner.fit(&transformed)?;
            self.boxcox = Some(transform);
        } else {
            self.inner.fit(values)?;
            self.boxcox = None;
        }
        Ok(())
    }

    fn forecast(&self, horizon: usize, level: f64) -> Result<Forecast> {
        let forecast = self.inner.forecast(horizon, level)?;
        match &self.boxcox {
            None => Ok(forecast),
            Some(transform) => {
                let point = transform.inverse_transform(&forecast.point)?;
                let lower = transform.inverse_transform(&forecast.lower)?;
                let upper = transform.inverse_transform(&forecast.upper)?;
                Ok(Forecast {
                    point,
                    lower,
                    upper,
                    level,
                })
            }
        }
    }

    fn fitted(&self) -> Option<&[f64]> {
        // Fitted values live on the transformed scale; not reported.
        None
    }

    fn residuals(&self) -> Option<&[f64]> {
        None
    }

    fn name(&self) -> &'static str {
        "TBATS"
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::f64::consts::PI;

    fn two_season_series(n: usize) -> Vec<f64> {
        (0..n)
            .map(|i| {
                let t = i as f64;
                100.0 + 0.1 * t
                    + 8.0 * (2.0 * PI * t / 24.0).sin()
                    + 3.0 * (2.0 * PI * t / 6.0).sin()
            })
            .collect()
    }

    #[test]
    fn test_mstl_forecaster_keeps_seasonal_shape() {
        let values = two_season_series(240);
        let mut model =
            MstlForecaster::new(MstlForecastConfig::new(vec![6, 24])).unwrap();
        model.fit(&values).unwrap();
        let forecast = model.forecast(24, 0.95).unwrap();
        assert_eq!(forecast.point.len(), 24);
        let max = forecast.point.iter().cloned().fold(f64::MIN, f64::max);
        let min = forecast.point.iter().cloned().fold(f64::MAX, f64::min);
        assert!(max - min > 8.0, "amplitude {}", max - min);
    }

    #[test]
    fn test_linear_method_continues_trend() {
        let values = two_season_series(240);
        let mut model = MstlForecaster::new(MstlForecastConfig {
            method: DeseasonalizedMethod::Linear,
            ..MstlForecastConfig::new(vec![24])
        })
        .unwrap();
        model.fit(&values).unwrap();
        let forecast = model.forecast(48, 0.95).unwrap();
        // The far end should sit above the near end by roughly slope·h.
        let early = forecast.point[..8].iter().sum::<f64>() / 8.0;
        let late = forecast.point[40..].iter().sum::<f64>() / 8.0;
        assert!(late > early + 1.0, "late {late} early {early}");
    }

    #[test]
    fn test_interval_ordering() {
        let values = two_season_series(120);
        let mut model =
            MstlForecaster::new(MstlForecastConfig::new(vec![24])).unwrap();
        model.fit(&values).unwrap();
        let forecast = model.forecast(12, 0.8).unwrap();
        for i in 0..12 {
            assert!(forecast.lower[i] <= forecast.point[i]);
            assert!(forecast.point[i] <= forecast.upper[i]);
        }
    }

    #[test]
    fn test_tbats_positive_series() {
        let values = two_season_series(144);
        let mut model = Tbats::new(vec![6, 24]).unwrap();
        model.fit(&values).unwrap();
        let forecast = model.forecast(12, 0.95).unwrap();
        assert!(forecast.point.iter().all(|p| p.is_finite()));
        assert!(forecast.point.iter().all(|&p| p > 0.0));
    }

    #[test]
    fn test_method_codes() {
        assert_eq!(
            DeseasonalizedMethod::from_code(0).unwrap(),
            DeseasonalizedMethod::ExponentialSmoothing
        );
        assert_eq!(
            DeseasonalizedMethod::from_code(2).unwrap(),
            DeseasonalizedMethod::AutoEts
        );
        assert!(DeseasonalizedMethod::from_code(7).is_err());
    }

    #[test]
    fn test_invalid_periods() {
        assert!(MstlForecaster::new(MstlForecastConfig::new(vec![])).is_err());
        assert!(MstlForecaster::new(MstlForecastConfig::new(vec![1])).is_err());
    }
}
