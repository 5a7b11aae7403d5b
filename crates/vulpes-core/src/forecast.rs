//! Forecaster contract, model registry and the dispatch entry point.
//!
//! Missing values are represented as `Option<f64>` (`None` = missing) at
//! this boundary; NULLs are interpolated before model fitting. Inside
//! the numeric paths everything is plain `f64`.

use std::collections::BTreeMap;
use std::str::FromStr;

use crate::baseline::{
    Holt, HoltWinters, Naive, RandomWalkDrift, SeasonalEs, SeasonalNaive, SeasonalWindowAverage,
    Ses, Sma,
};
use crate::error::{ForecastError, Result};
use crate::ets::{AutoEts, AutoEtsConfig, Ets, EtsConfig, EtsSpec};
use crate::imputation::fill_nulls_interpolate;
use crate::intermittent::{Adida, Croston, CrostonVariant, Imapa, Tsb};
use crate::mfles::{AutoMfles, Mfles, MflesConfig, TrendMethod};
use crate::multiseasonal::{
    DeseasonalizedMethod, MstlForecastConfig, MstlForecaster, Tbats,
};
use crate::periods::detect_seasonality;
use crate::theta::{AutoTheta, AutoThetaMode, Theta, ThetaConfig, ThetaVariant};

/// A probabilistic forecast: point predictions with interval bands at a
/// stated coverage level. `point[k]` corresponds to horizon step k + 1.
#[derive(Debug, Clone)]
pub struct Forecast {
    pub point: Vec<f64>,
    pub lower: Vec<f64>,
    pub upper: Vec<f64>,
    /// Nominal coverage of the interval, e.g. 0.95.
    pub level: f64,
}

/// The forecaster capability. A forecaster owns its fitted state from
/// `fit` until drop; `forecast` is a pure function of that state.
pub trait Forecaster {
    /// Fit the model to an equally spaced series.
    fn fit(&mut self, values: &[f64]) -> Result<()>;

    /// Forecast `horizon` steps with intervals at `level` coverage.
    fn forecast(&self, horizon: usize, level: f64) -> Result<Forecast>;

    /// One-step-ahead in-sample predictions, when the model tracks them.
    fn fitted(&self) -> Option<&[f64]>;

    /// In-sample residuals, when the model tracks them.
    fn residuals(&self) -> Option<&[f64]>;

    /// Canonical model name.
    fn name(&self) -> &'static str;
}

/// Shared argument validation for `forecast` implementations.
pub fn validate_horizon_level(horizon: usize, level: f64) -> Result<()> {
    if horizon == 0 {
        return Err(ForecastError::invalid_parameter(
            "horizon",
            horizon,
            "must be at least 1",
        ));
    }
    if !(0.0 < level && level < 1.0) {
        return Err(ForecastError::invalid_parameter(
            "level",
            level,
            "must be in (0, 1)",
        ));
    }
    Ok(())
}

/// Available forecast models. The names are the public API; unknown
/// names fail rather than silently defaulting.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ModelType {
    // Automatic selection
    AutoETS,
    AutoTheta,
    AutoMFLES,
    // Basic
    Naive,
    SMA,
    SeasonalNaive,
    SES,
    SESOptimized,
    RandomWalkDrift,
    // Exponential smoothing
    Holt,
    HoltWinters,
    SeasonalES,
    SeasonalESOptimized,
    SeasonalWindowAverage,
    // Theta methods
    Theta,
    OptimizedTheta,
    DynamicTheta,
    DynamicOptimizedTheta,
    // State space
    ETS,
    // Multiple seasonality
    MFLES,
    MSTL,
    TBATS,
    // Intermittent demand
    CrostonClassic,
    CrostonOptimized,
    CrostonSBA,
    ADIDA,
    IMAPA,
    TSB,
}

const ALL_MODELS: [ModelType; 28] = [
    ModelType::AutoETS,
    ModelType::AutoTheta,
    ModelType::AutoMFLES,
    ModelType::Naive,
    ModelType::SMA,
    ModelType::SeasonalNaive,
    ModelType::SES,
    ModelType::SESOptimized,
    ModelType::RandomWalkDrift,
    ModelType::Holt,
    ModelType::HoltWinters,
    ModelType::SeasonalES,
    ModelType::SeasonalESOptimized,
    ModelType::SeasonalWindowAverage,
    ModelType::Theta,
    ModelType::OptimizedTheta,
    ModelType::DynamicTheta,
    ModelType::DynamicOptimizedTheta,
    ModelType::ETS,
    ModelType::MFLES,
    ModelType::MSTL,
    ModelType::TBATS,
    ModelType::CrostonClassic,
    ModelType::CrostonOptimized,
    ModelType::CrostonSBA,
    ModelType::ADIDA,
    ModelType::IMAPA,
    ModelType::TSB,
];

impl ModelType {
    /// The canonical model name.
    pub fn name(&self) -> &'static str {
        match self {
            ModelType::AutoETS => "AutoETS",
            ModelType::AutoTheta => "AutoTheta",
            ModelType::AutoMFLES => "AutoMFLES",
            ModelType::Naive => "Naive",
            ModelType::SMA => "SMA",
            ModelType::SeasonalNaive => "SeasonalNaive",
            ModelType::SES => "SES",
            ModelType::SESOptimized => "SESOptimized",
            ModelType::RandomWalkDrift => "RandomWalkDrift",
            ModelType::Holt => "Holt",
            ModelType::HoltWinters => "HoltWinters",
            ModelType::SeasonalES => "SeasonalES",
            ModelType::SeasonalESOptimized => "SeasonalESOptimized",
            ModelType::SeasonalWindowAverage => "SeasonalWindowAverage",
            ModelType::Theta => "Theta",
            ModelType::OptimizedTheta => "OptimizedTheta",
            ModelType::DynamicTheta => "DynamicTheta",
            ModelType::DynamicOptimizedTheta => "DynamicOptimizedTheta",
            ModelType::ETS => "ETS",
            ModelType::MFLES => "MFLES",
            ModelType::MSTL => "MSTL",
            ModelType::TBATS => "TBATS",
            ModelType::CrostonClassic => "CrostonClassic",
            ModelType::CrostonOptimized => "CrostonOptimized",
            ModelType::CrostonSBA => "CrostonSBA",
            ModelType::ADIDA => "ADIDA",
            ModelType::IMAPA => "IMAPA",
            ModelType::TSB => "TSB",
        }
    }
}

impl FromStr for ModelType {
    type Err = ForecastError;

    fn from_str(s: &str) -> std::result::Result<Self, Self::Err> {
        // Exact canonical match first.
        for model in ALL_MODELS {
            if s == model.name() {
                return Ok(model);
            }
        }

        // Case-insensitive aliases for convenience.
        match s.to_lowercase().as_str() {
            "autoets" | "auto_ets" | "auto" => Ok(ModelType::AutoETS),
            "autotheta" | "auto_theta" => Ok(ModelType::AutoTheta),
            "automfles" | "auto_mfles" => Ok(ModelType::AutoMFLES),
            "naive" => Ok(ModelType::Naive),
            "sma" => Ok(ModelType::SMA),
            "seasonalnaive" | "seasonal_naive" | "snaive" => Ok(ModelType::SeasonalNaive),
            "ses" => Ok(ModelType::SES),
            "sesoptimized" | "ses_optimized" => Ok(ModelType::SESOptimized),
            "randomwalkdrift" | "random_walk_drift" | "rwd" | "drift"
            | "randomwalkwithdrift" | "random_walk_with_drift" => Ok(ModelType::RandomWalkDrift),
            "holt" => Ok(ModelType::Holt),
            "holtwinters" | "holt_winters" | "hw" => Ok(ModelType::HoltWinters),
            "seasonales" | "seasonal_es" => Ok(ModelType::SeasonalES),
            "seasonalesoptimized" | "seasonal_es_optimized" => Ok(ModelType::SeasonalESOptimized),
            "seasonalwindowaverage" | "seasonal_window_average" | "swa" => {
                Ok(ModelType::SeasonalWindowAverage)
            }
            "theta" => Ok(ModelType::Theta),
            "optimizedtheta" | "optimized_theta" | "otm" => Ok(ModelType::OptimizedTheta),
            "dynamictheta" | "dynamic_theta" | "dstm" => Ok(ModelType::DynamicTheta),
            "dynamicoptimizedtheta" | "dynamic_optimized_theta" | "dotm" => {
                Ok(ModelType::DynamicOptimizedTheta)
            }
            "ets" => Ok(ModelType::ETS),
            "mfles" => Ok(ModelType::MFLES),
            "mstl" => Ok(ModelType::MSTL),
            "tbats" => Ok(ModelType::TBATS),
            "crostonclassic" | "croston_classic" | "croston" => Ok(ModelType::CrostonClassic),
            "crostonoptimized" | "croston_optimized" => Ok(ModelType::CrostonOptimized),
            "crostonsba" | "croston_sba" | "sba" => Ok(ModelType::CrostonSBA),
            "adida" => Ok(ModelType::ADIDA),
            "imapa" => Ok(ModelType::IMAPA),
            "tsb" => Ok(ModelType::TSB),
            _ => Err(ForecastError::InvalidModel(format!("Unknown model: {}", s))),
        }
    }
}

/// All model names recognized by the dispatcher.
pub fn list_models() -> Vec<&'static str> {
    ALL_MODELS.iter().map(|m| m.name()).collect()
}

/// String-keyed model parameters.
pub type ModelParams = BTreeMap<String, String>;

/// Reads parameters out of a map, tracking which keys were consumed so
/// misspelled keys fail instead of silently defaulting.
struct ParamReader<'a> {
    params: &'a ModelParams,
    consumed: Vec<&'a str>,
}

impl<'a> ParamReader<'a> {
    fn new(params: &'a ModelParams) -> Self {
        Self {
            params,
            consumed: Vec::new(),
        }
    }

    fn raw(&mut self, key: &str) -> Option<&'a str> {
        if let Some((stored, value)) = self.params.get_key_value(key) {
            self.consumed.push(stored.as_str());
            Some(value.as_str())
        } else {
            None
        }
    }

    fn f64(&mut self, key: &str) -> Result<Option<f64>> {
        match self.raw(key) {
            None => Ok(None),
            Some(raw) => raw.parse::<f64>().map(Some).map_err(|_| {
                ForecastError::invalid_parameter(key, raw, "expected a number")
            }),
        }
    }

    fn usize(&mut self, key: &str) -> Result<Option<usize>> {
        match self.raw(key) {
            None => Ok(None),
            Some(raw) => raw.parse::<usize>().map(Some).map_err(|_| {
                ForecastError::invalid_parameter(key, raw, "expected a non-negative integer")
            }),
        }
    }

    fn i64(&mut self, key: &str) -> Result<Option<i64>> {
        match self.raw(key) {
            None => Ok(None),
            Some(raw) => raw.parse::<i64>().map(Some).map_err(|_| {
                ForecastError::invalid_parameter(key, raw, "expected an integer")
            }),
        }
    }

    fn bool(&mut self, key: &str) -> Result<Option<bool>> {
        match self.raw(key) {
            None => Ok(None),
            Some(raw) => match raw.to_lowercase().as_str() {
                "true" | "1" | "yes" => Ok(Some(true)),
                "false" | "0" | "no" => Ok(Some(false)),
                _ => Err(ForecastError::invalid_parameter(
                    key,
                    raw,
                    "expected a boolean",
                )),
            },
        }
    }

    fn string(&mut self, key: &str) -> Option<String> {
        self.raw(key).map(|s| s.to_string())
    }

    /// Fails on any key that no reader consumed.
    fn finish(self, model: ModelType) -> Result<()> {
        for key in self.params.keys() {
            if !self.consumed.contains(&key.as_str()) {
                return Err(ForecastError::invalid_parameter(
                    key,
                    self.params[key].clone(),
                    format!("unknown parameter for model {}", model.name()),
                ));
            }
        }
        Ok(())
    }
}

/// Build a forecaster from a model tag, a parameter map and the resolved
/// seasonal period. The recognized keys per model are finite; unknown
/// keys fail with `InvalidParameter`.
pub fn build_forecaster(
    model: ModelType,
    params: &ModelParams,
    period: usize,
) -> Result<Box<dyn Forecaster>> {
    let mut reader = ParamReader::new(params);
    let seasonal_period = reader.usize("seasonal_period")?.unwrap_or(period).max(1);

    let forecaster: Box<dyn Forecaster> = match model {
        ModelType::Naive => Box::new(Naive::new()),
        ModelType::SeasonalNaive => Box::new(SeasonalNaive::new(seasonal_period)?),
        ModelType::RandomWalkDrift => Box::new(RandomWalkDrift::new()),
        ModelType::SMA => {
            let window = reader.usize("window")?.unwrap_or(seasonal_period.max(3));
            Box::new(Sma::new(window)?)
        }
        ModelType::SeasonalWindowAverage => {
            let window = reader.usize("window")?.unwrap_or(2);
            Box::new(SeasonalWindowAverage::new(seasonal_period, window)?)
        }
        ModelType::SES => {
            let alpha = reader.f64("alpha")?.unwrap_or(0.3);
            Box::new(Ses::new(alpha)?)
        }
        ModelType::SESOptimized => Box::new(Ses::optimized()),
        ModelType::Holt => {
            let alpha = reader.f64("alpha")?;
            let beta = reader.f64("beta")?;
            let damped = reader.bool("damped")?.unwrap_or(false);
            Box::new(Holt::new(alpha, beta, damped)?)
        }
        ModelType::HoltWinters => {
            let multiplicative = reader.bool("multiplicative")?.unwrap_or(false);
            let mut model = HoltWinters::new(seasonal_period.max(2), multiplicative)?;
            if let (Some(alpha), Some(beta), Some(gamma)) = (
                reader.f64("alpha")?,
                reader.f64("beta")?,
                reader.f64("gamma")?,
            ) {
                model = model.with_params(alpha, beta, gamma)?;
            }
            Box::new(model)
        }
        ModelType::SeasonalES => Box::new(SeasonalEs::new(seasonal_period.max(2), false)?),
        ModelType::SeasonalESOptimized => {
            Box::new(SeasonalEs::new(seasonal_period.max(2), true)?)
        }
        ModelType::ETS => {
            // Either a compact notation ("AAdM") or per-component keys.
            let spec = match reader.string("model") {
                Some(notation) => EtsSpec::from_notation(&notation)?,
                None => {
                    let component = |reader: &mut ParamReader, key: &str, default: char| {
                        match reader.string(key) {
                            None => Ok(default),
                            Some(raw) => match raw.to_lowercase().as_str() {
                                "additive" | "a" => Ok('A'),
                                "multiplicative" | "m" => Ok('M'),
                                "none" | "n" => Ok('N'),
                                other => Err(ForecastError::invalid_parameter(
                                    key,
                                    other,
                                    "expected 'additive', 'multiplicative' or 'none'",
                                )),
                            },
                        }
                    };
                    let error = component(&mut reader, "error", 'A')?;
                    let trend = component(&mut reader, "trend", 'A')?;
                    let season = component(&mut reader, "season", 'N')?;
                    let damped = reader.bool("damped")?.unwrap_or(false);
                    let notation = if damped && trend != 'N' {
                        format!("{error}{trend}d{season}")
                    } else {
                        format!("{error}{trend}{season}")
                    };
                    EtsSpec::from_notation(&notation)?
                }
            };
            let mut config = EtsConfig::new(spec, seasonal_period.max(1));
            config.alpha = reader.f64("alpha")?;
            config.beta = reader.f64("beta")?;
            config.gamma = reader.f64("gamma")?;
            config.phi = reader.f64("phi")?;
            Box::new(Ets::new(config)?)
        }
        ModelType::AutoETS => {
            let spec = reader.string("model").unwrap_or_else(|| "ZZZ".to_string());
            Box::new(AutoEts::new(AutoEtsConfig {
                spec,
                season_length: seasonal_period,
            })?)
        }
        ModelType::Theta => Box::new(Theta::new(ThetaConfig::new(
            ThetaVariant::Stm,
            seasonal_period,
        ))),
        ModelType::OptimizedTheta => Box::new(Theta::new(ThetaConfig::new(
            ThetaVariant::Otm,
            seasonal_period,
        ))),
        ModelType::DynamicTheta => Box::new(Theta::new(ThetaConfig::new(
            ThetaVariant::Dstm,
            seasonal_period,
        ))),
        ModelType::DynamicOptimizedTheta => Box::new(Theta::new(ThetaConfig::new(
            ThetaVariant::Dotm,
            seasonal_period,
        ))),
        ModelType::AutoTheta => {
            let mode = match reader.string("model").as_deref() {
                Some("all") => AutoThetaMode::All,
                Some(other) if other != "default" => {
                    return Err(ForecastError::invalid_parameter(
                        "model",
                        other,
                        "expected 'default' or 'all'",
                    ))
                }
                _ => AutoThetaMode::Default,
            };
            Box::new(AutoTheta::new(mode, seasonal_period))
        }
        ModelType::MFLES => {
            let mut config = MflesConfig {
                season_length: seasonal_period,
                ..MflesConfig::default()
            };
            if let Some(order) = reader.usize("fourier_order")? {
                config.fourier_order = order;
            }
            if let Some(rounds) = reader.usize("rounds")? {
                config.rounds = rounds;
            }
            if let Some(raw) = reader.string("trend_method") {
                config.trend_method = match raw.to_lowercase().as_str() {
                    "ols" => TrendMethod::Ols,
                    "siegel" => TrendMethod::Siegel,
                    "piecewise" | "piecewise_linear" => TrendMethod::PiecewiseLinear,
                    other => {
                        return Err(ForecastError::invalid_parameter(
                            "trend_method",
                            other,
                            "expected 'ols', 'siegel' or 'piecewise'",
                        ))
                    }
                };
            }
            Box::new(Mfles::new(config)?)
        }
        ModelType::AutoMFLES => {
            let cv_horizon = reader.usize("cv_horizon")?.unwrap_or(seasonal_period.max(4));
            Box::new(AutoMfles::new(seasonal_period, cv_horizon)?)
        }
        ModelType::MSTL => {
            let periods = match reader.string("periods") {
                Some(raw) => parse_period_list(&raw)?,
                None => vec![seasonal_period.max(2)],
            };
            let method = match reader.i64("deseasonalized_method")? {
                Some(code) => DeseasonalizedMethod::from_code(code)?,
                None => DeseasonalizedMethod::default(),
            };
            let robust = reader.bool("robust")?.unwrap_or(false);
            Box::new(MstlForecaster::new(MstlForecastConfig {
                periods,
                method,
                robust,
                iterations: 2,
            })?)
        }
        ModelType::TBATS => {
            let periods = match reader.string("periods") {
                Some(raw) => parse_period_list(&raw)?,
                None => vec![seasonal_period.max(2)],
            };
            Box::new(Tbats::new(periods)?)
        }
        ModelType::CrostonClassic => Box::new(Croston::new(CrostonVariant::Classic)),
        ModelType::CrostonOptimized => Box::new(Croston::new(CrostonVariant::Optimized)),
        ModelType::CrostonSBA => Box::new(Croston::new(CrostonVariant::Sba)),
        ModelType::ADIDA => {
            let bucket = reader.usize("bucket")?;
            Box::new(Adida::new(bucket)?)
        }
        ModelType::IMAPA => Box::new(Imapa::new()),
        ModelType::TSB => {
            let alpha_demand = reader.f64("alpha_demand")?.unwrap_or(0.1);
            let alpha_probability = reader.f64("alpha_probability")?.unwrap_or(0.1);
            Box::new(Tsb::new(alpha_demand, alpha_probability)?)
        }
    };

    reader.finish(model)?;
    Ok(forecaster)
}

fn parse_period_list(raw: &str) -> Result<Vec<usize>> {
    let mut periods = Vec::new();
    for item in raw.split(|c| c == ',' || c == ';') {
        let trimmed = item.trim();
        if trimmed.is_empty() {
            continue;
        }
        let period: usize = trimmed.parse().map_err(|_| {
            ForecastError::invalid_parameter("periods", raw, "expected integers like '24,168'")
        })?;
        periods.push(period);
    }
    if periods.is_empty() {
        return Err(ForecastError::invalid_parameter(
            "periods",
            raw,
            "expected at least one period",
        ));
    }
    Ok(periods)
}

/// Forecast options for the dispatch entry point.
#[derive(Debug, Clone)]
pub struct ForecastOptions {
    pub model: ModelType,
    /// Forecast horizon.
    pub horizon: usize,
    /// Interval coverage level in (0, 1).
    pub level: f64,
    /// Seasonal period; 0 means auto-detect.
    pub seasonal_period: usize,
    /// Model-specific parameters (finite key set per model).
    pub params: ModelParams,
    /// Include in-sample fitted values in the output.
    pub include_fitted: bool,
    /// Include in-sample residuals in the output.
    pub include_residuals: bool,
}

impl Default for ForecastOptions {
    fn default() -> Self {
        Self {
            model: ModelType::AutoETS,
            horizon: 12,
            level: 0.95,
            seasonal_period: 0,
            params: ModelParams::new(),
            include_fitted: false,
            include_residuals: false,
        }
    }
}

/// Forecast result with diagnostics.
#[derive(Debug, Clone)]
pub struct ForecastOutput {
    pub point: Vec<f64>,
    pub lower: Vec<f64>,
    pub upper: Vec<f64>,
    pub fitted: Option<Vec<f64>>,
    pub residuals: Option<Vec<f64>>,
    pub model_name: String,
    /// In-sample MSE when fitted values are available.
    pub mse: Option<f64>,
}

/// Generate forecasts for a series with possible NULLs.
///
/// NULLs are filled by linear interpolation before fitting. When
/// `seasonal_period` is 0 the period is auto-detected from the data.
pub fn forecast(values: &[Option<f64>], options: &ForecastOptions) -> Result<ForecastOutput> {
    let clean = fill_nulls_interpolate(values);
    if clean.iter().any(|v| v.is_nan()) {
        return Err(ForecastError::InsufficientData {
            needed: 1,
            got: 0,
        });
    }
    if clean.len() < 3 {
        return Err(ForecastError::InsufficientData {
            needed: 3,
            got: clean.len(),
        });
    }

    let period = if options.seasonal_period > 0 {
        options.seasonal_period
    } else {
        detect_seasonality(&clean, None)?.unwrap_or(1)
    };

    let mut model = build_forecaster(options.model, &options.params, period)?;
    model.fit(&clean)?;
    let forecast = model.forecast(options.horizon, options.level)?;

    let fitted = model.fitted().map(|f| f.to_vec());
    let residuals = model.residuals().map(|r| r.to_vec());
    let mse = fitted.as_ref().map(|f| {
        let sse: f64 = clean
            .iter()
            .zip(f.iter())
            .map(|(y, p)| (y - p) * (y - p))
            .sum();
        sse / clean.len() as f64
    });

    Ok(ForecastOutput {
        point: forecast.point,
        lower: forecast.lower,
        upper: forecast.upper,
        fitted: if options.include_fitted { fitted } else { None },
        residuals: if options.include_residuals {
            residuals
        } else {
            None
        },
        model_name: model.name().to_string(),
        mse,
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::f64::consts::PI;

    fn series(n: usize) -> Vec<Option<f64>> {
        (0..n)
            .map(|i| Some(20.0 + 0.2 * i as f64 + 4.0 * (2.0 * PI * i as f64 / 12.0).sin()))
            .collect()
    }

    #[test]
    fn test_model_names_round_trip() {
        for name in list_models() {
            let model: ModelType = name.parse().unwrap();
            assert_eq!(model.name(), name);
        }
    }

    #[test]
    fn test_unknown_model_fails() {
        assert!("NotAModel".parse::<ModelType>().is_err());
    }

    #[test]
    fn test_unknown_parameter_key_fails() {
        let mut params = ModelParams::new();
        params.insert("alpa".to_string(), "0.5".to_string());
        let err = build_forecaster(ModelType::SES, &params, 1);
        assert!(matches!(
            err,
            Err(ForecastError::InvalidParameter { .. })
        ));
    }

    #[test]
    fn test_known_parameter_accepted() {
        let mut params = ModelParams::new();
        params.insert("alpha".to_string(), "0.5".to_string());
        assert!(build_forecaster(ModelType::SES, &params, 1).is_ok());
    }

    #[test]
    fn test_forecast_lengths() {
        let values = series(72);
        for model in [
            ModelType::Naive,
            ModelType::SeasonalNaive,
            ModelType::SES,
            ModelType::Theta,
            ModelType::MSTL,
        ] {
            let output = forecast(
                &values,
                &ForecastOptions {
                    model,
                    horizon: 9,
                    ..ForecastOptions::default()
                },
            )
            .unwrap();
            assert_eq!(output.point.len(), 9, "{}", output.model_name);
            assert_eq!(output.lower.len(), 9);
            assert_eq!(output.upper.len(), 9);
        }
    }

    #[test]
    fn test_forecast_interpolates_nulls() {
        let mut values = series(48);
        values[10] = None;
        values[11] = None;
        let output = forecast(
            &values,
            &ForecastOptions {
                model: ModelType::Naive,
                horizon: 3,
                include_fitted: true,
                ..ForecastOptions::default()
            },
        )
        .unwrap();
        assert_eq!(output.fitted.as_ref().unwrap().len(), 48);
    }

    #[test]
    fn test_forecast_too_short() {
        let values = vec![Some(1.0), Some(2.0)];
        assert!(matches!(
            forecast(&values, &ForecastOptions::default()),
            Err(ForecastError::InsufficientData { .. })
        ));
    }

    #[test]
    fn test_negative_level_rejected() {
        assert!(validate_horizon_level(5, -0.5).is_err());
        assert!(validate_horizon_level(0, 0.9).is_err());
        assert!(validate_horizon_level(5, 0.9).is_ok());
    }

    #[test]
    fn test_ets_beats_naive_on_trend_seasonal_continuation() {
        // Trend plus monthly seasonality; ETS(A,A,N) on the first two
        // years must beat Naive on the deterministic continuation.
        let rule = |i: usize| {
            100.0 + 0.5 * i as f64 + 10.0 * (2.0 * PI * i as f64 / 12.0).sin()
        };
        let history: Vec<f64> = (0..24).map(rule).collect();
        let future: Vec<f64> = (24..36).map(rule).collect();

        let mut params = ModelParams::new();
        params.insert("model".to_string(), "AAN".to_string());
        let mut ets = build_forecaster(ModelType::ETS, &params, 1).unwrap();
        ets.fit(&history).unwrap();
        let ets_forecast = ets.forecast(12, 0.95).unwrap();
        assert!(ets_forecast.point.iter().all(|p| p.is_finite()));

        let mut naive = build_forecaster(ModelType::Naive, &ModelParams::new(), 1).unwrap();
        naive.fit(&history).unwrap();
        let naive_forecast = naive.forecast(12, 0.95).unwrap();

        let ets_mae = crate::metrics::mae(&future, &ets_forecast.point).unwrap();
        let naive_mae = crate::metrics::mae(&future, &naive_forecast.point).unwrap();
        assert!(
            ets_mae < naive_mae,
            "ETS {ets_mae} vs Naive {naive_mae}"
        );
    }

    #[test]
    fn test_ets_param_map() {
        let mut params = ModelParams::new();
        params.insert("model".to_string(), "AAA".to_string());
        params.insert("alpha".to_string(), "0.4".to_string());
        params.insert("seasonal_period".to_string(), "12".to_string());
        assert!(build_forecaster(ModelType::ETS, &params, 1).is_ok());

        params.insert("trend".to_string(), "additive".to_string());
        assert!(build_forecaster(ModelType::ETS, &params, 1).is_err());
    }
}
