//! Core time series forecasting and analysis library.
//!
//! This crate is the numerical modeling core behind the vulpes query
//! engine integration: probabilistic forecasters, seasonal
//! decomposition, changepoint detection, feature extraction, accuracy
//! metrics and the cross-validation harness. It performs no I/O and
//! keeps no state between series; the host fans independent series out
//! across threads.
//!
//! Missing values are `Option<f64>` (`None`) at the ingestion boundary
//! and NaN inside the pure-`f64` transform paths.

pub mod baseline;
pub mod changepoint;
pub mod cluster;
pub mod decomposition;
pub mod detrending;
pub mod error;
pub mod ets;
pub mod features;
pub mod filter;
pub mod forecast;
pub mod gaps;
pub mod imputation;
pub mod intermittent;
pub mod loess;
pub mod metrics;
pub mod mfles;
pub mod multiseasonal;
pub mod numeric;
pub mod optim;
pub mod peaks;
pub mod periods;
pub mod regression;
pub mod seasonality;
pub mod theta;
pub mod transforms;
pub mod validation;

// Re-exports for convenience
pub use baseline::{
    Holt, HoltWinters, Naive, RandomWalkDrift, SeasonalEs, SeasonalNaive, SeasonalWindowAverage,
    Ses, Sma,
};
pub use changepoint::{
    detect_changepoints_bocpd, detect_changepoints_pelt, BocpdConfig, BocpdDetector, BocpdResult,
    CostFunction, Hazard, NormalGammaPrior, PeltResult,
};
pub use cluster::{
    dbscan, DbscanConfig, DbscanResult, DistanceMatrix, DistanceMetric,
};
pub use decomposition::{
    mstl_decompose, MstlConfig, MstlDecomposer, MstlDecomposition, StlConfig, StlDecomposer,
    StlDecomposition,
};
pub use detrending::{
    decompose, detrend, detrend_auto, detrend_cubic, detrend_linear, detrend_quadratic,
    DecomposeMethod, DecomposeResult, DetrendMethod, DetrendResult,
};
pub use error::{ForecastError, Result};
pub use ets::{
    AutoEts, AutoEtsConfig, ErrorComponent, Ets, EtsConfig, EtsFit, EtsSpec, SeasonalComponent,
    TrendComponent,
};
pub use features::{
    compute_all_features, compute_features, list_features, validate_feature_names, FeatureConfig,
    FeatureRequest, FeatureValue,
};
pub use filter::{
    diff, drop_edge_zeros, drop_leading_zeros, drop_trailing_zeros, is_constant, is_short,
    SeriesProfile,
};
pub use forecast::{
    build_forecaster, forecast, list_models, Forecast, ForecastOptions, ForecastOutput,
    Forecaster, ModelParams, ModelType,
};
pub use gaps::{detect_frequency, fill_gaps};
pub use imputation::{
    fill_nulls_backward, fill_nulls_const, fill_nulls_forward, fill_nulls_interpolate,
    fill_nulls_mean,
};
pub use intermittent::{Adida, Croston, CrostonVariant, Imapa, Tsb};
pub use loess::Loess;
pub use metrics::{
    bias, coverage, interval_width, mae, mape, mase, mean_interval_width, mqloss, mse,
    quantile_loss, r2, rmae, rmse, smape,
};
pub use mfles::{AutoMfles, Mfles, MflesConfig, TrendMethod};
pub use multiseasonal::{
    DeseasonalizedMethod, MstlForecastConfig, MstlForecaster, Tbats,
};
pub use optim::{
    lbfgs_minimize, nelder_mead_minimize, GradObjective, LbfgsOptions, NelderMeadOptions,
    NumericalGradient, OptimResult,
};
pub use periods::{
    detect_multiple_periods, detect_periods, detect_seasonality, estimate_period,
    estimate_period_acf, estimate_period_aic, estimate_period_fft,
    estimate_period_matrix_profile, estimate_period_sazed, estimate_period_ssa,
    estimate_period_stl, instantaneous_period, InstantaneousPeriodResult, PeriodDetection,
    PeriodDetectionConfig, PeriodMethod, SinglePeriodResult,
};
pub use peaks::{
    detect_peaks, detect_peaks_default, get_peak_indices, get_peak_values, Peak,
    PeakDetectionResult,
};
pub use regression::{linear_trend, ols, polyfit, siegel_repeated_medians, PolyFit};
pub use seasonality::{
    analyze_seasonality, seasonal_strength, trend_strength, SeasonalityAnalysis, StrengthMethod,
};
pub use theta::{
    AutoTheta, AutoThetaMode, Theta, ThetaConfig, ThetaDecomposition, ThetaVariant,
};
pub use transforms::{
    BoxCox, LinearInterpolator, LogTransform, LogitTransform, MinMaxScaler, Pipeline,
    StandardScaler, Transformer, YeoJohnson,
};
pub use validation::{
    auto_select, backtest, cross_validate, generate_folds, BacktestResult, Candidate, CvConfig,
    Fold, FoldResult, RankedModel, SelectionResult, SplitStrategy,
};
