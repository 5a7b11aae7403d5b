//! Value transforms and the transform pipeline.
//!
//! Each transformer exposes fit/transform/inverse-transform. A Pipeline
//! composes transformers in order and is locked once fitted; inverting a
//! forecast applies every inverse in reverse order to the point forecast
//! and both interval bands identically. Missing values are NaN on this
//! surface; transforms propagate NaN positions untouched.

use crate::error::{ForecastError, Result};
use crate::forecast::Forecast;
use crate::numeric;

/// A fittable, invertible value transform.
pub trait Transformer: std::fmt::Debug {
    fn fit(&mut self, values: &[f64]) -> Result<()>;
    fn transform(&self, values: &[f64]) -> Result<Vec<f64>>;
    fn inverse_transform(&self, values: &[f64]) -> Result<Vec<f64>>;

    fn fit_transform(&mut self, values: &[f64]) -> Result<Vec<f64>> {
        self.fit(values)?;
        self.transform(values)
    }
}

fn ensure_fitted<T>(state: &Option<T>) -> Result<&T> {
    state.as_ref().ok_or_else(|| {
        ForecastError::InvalidInput("transform before fit".to_string())
    })
}

/// Scales finite values into [0, 1] over the fitted range.
#[derive(Debug, Clone, Default)]
pub struct MinMaxScaler {
    state: Option<(f64, f64)>,
}

impl MinMaxScaler {
    pub fn new() -> Self {
        Self::default()
    }
}

impl Transformer for MinMaxScaler {
    fn fit(&mut self, values: &[f64]) -> Result<()> {
        let finite: Vec<f64> = values.iter().copied().filter(|v| v.is_finite()).collect();
        if finite.is_empty() {
            return Err(ForecastError::InsufficientData { needed: 1, got: 0 });
        }
        let min = finite.iter().cloned().fold(f64::INFINITY, f64::min);
        let max = finite.iter().cloned().fold(f64::NEG_INFINITY, f64::max);
        if (max - min).abs() < f64::EPSILON {
            return Err(ForecastError::Degenerate(
                "constant series cannot be min-max scaled".to_string(),
            ));
        }
        self.state = Some((min, max));
        Ok(())
    }

    fn transform(&self, values: &[f64]) -> Result<Vec<f64>> {
        let (min, max) = ensure_fitted(&self.state)?;
        Ok(values.iter().map(|v| (v - min) / (max - min)).collect())
    }

    fn inverse_transform(&self, values: &[f64]) -> Result<Vec<f64>> {
        let (min, max) = ensure_fitted(&self.state)?;
        Ok(values.iter().map(|v| v * (max - min) + min).collect())
    }
}

/// Centers to zero mean and unit variance.
#[derive(Debug, Clone, Default)]
pub struct StandardScaler {
    state: Option<(f64, f64)>,
}

impl StandardScaler {
    pub fn new() -> Self {
        Self::default()
    }
}

impl Transformer for StandardScaler {
    fn fit(&mut self, values: &[f64]) -> Result<()> {
        let finite: Vec<f64> = values.iter().copied().filter(|v| v.is_finite()).collect();
        if finite.len() < 2 {
            return Err(ForecastError::InsufficientData {
                needed: 2,
                got: finite.len(),
            });
        }
        let mean = numeric::mean(&finite);
        let std = numeric::variance(&finite).sqrt();
        if std < f64::EPSILON {
            return Err(ForecastError::Degenerate(
                "constant series cannot be standardized".to_string(),
            ));
        }
        self.state = Some((mean, std));
        Ok(())
    }

    fn transform(&self, values: &[f64]) -> Result<Vec<f64>> {
        let (mean, std) = ensure_fitted(&self.state)?;
        Ok(values.iter().map(|v| (v - mean) / std).collect())
    }

    fn inverse_transform(&self, values: &[f64]) -> Result<Vec<f64>> {
        let (mean, std) = ensure_fitted(&self.state)?;
        Ok(values.iter().map(|v| v * std + mean).collect())
    }
}

/// Natural logarithm; requires strictly positive finite values.
#[derive(Debug, Clone, Default)]
pub struct LogTransform {
    fitted: bool,
}

impl LogTransform {
    pub fn new() -> Self {
        Self::default()
    }
}

impl Transformer for LogTransform {
    fn fit(&mut self, values: &[f64]) -> Result<()> {
        if values.iter().any(|&v| v.is_finite() && v <= 0.0) {
            return Err(ForecastError::Degenerate(
                "log transform requires strictly positive values".to_string(),
            ));
        }
        self.fitted = true;
        Ok(())
    }

    fn transform(&self, values: &[f64]) -> Result<Vec<f64>> {
        Ok(values.iter().map(|v| v.ln()).collect())
    }

    fn inverse_transform(&self, values: &[f64]) -> Result<Vec<f64>> {
        Ok(values.iter().map(|v| v.exp()).collect())
    }
}

/// Logit transform for values in (0, 1).
#[derive(Debug, Clone, Default)]
pub struct LogitTransform {
    fitted: bool,
}

impl LogitTransform {
    pub fn new() -> Self {
        Self::default()
    }
}

impl Transformer for LogitTransform {
    fn fit(&mut self, values: &[f64]) -> Result<()> {
        if values
            .iter()
            .any(|&v| v.is_finite() && !(0.0 < v && v < 1.0))
        {
            return Err(ForecastError::Degenerate(
                "logit transform requires values in (0, 1)".to_string(),
            ));
        }
        self.fitted = true;
        Ok(())
    }

    fn transform(&self, values: &[f64]) -> Result<Vec<f64>> {
        Ok(values.iter().map(|v| (v / (1.0 - v)).ln()).collect())
    }

    fn inverse_transform(&self, values: &[f64]) -> Result<Vec<f64>> {
        Ok(values.iter().map(|v| 1.0 / (1.0 + (-v).exp())).collect())
    }
}

/// Box-Cox power transform with a manual or likelihood-fitted lambda.
/// Requires strictly positive data; NaNs pass through when
/// `ignore_nans` is set.
#[derive(Debug, Clone)]
pub struct BoxCox {
    lambda: Option<f64>,
    fit_lambda: bool,
    pub ignore_nans: bool,
}

impl BoxCox {
    /// Fixed lambda.
    pub fn with_lambda(lambda: f64) -> Self {
        Self {
            lambda: Some(lambda),
            fit_lambda: false,
            ignore_nans: false,
        }
    }

    /// Lambda chosen by profile log-likelihood at fit time.
    pub fn fitted_lambda() -> Self {
        Self {
            lambda: None,
            fit_lambda: true,
            ignore_nans: false,
        }
    }

    /// The lambda in effect, if fitted or fixed.
    pub fn lambda(&self) -> Option<f64> {
        self.lambda
    }

    fn apply(lambda: f64, v: f64) -> f64 {
        if v.is_nan() {
            return f64::NAN;
        }
        if lambda.abs() < 1e-12 {
            v.ln()
        } else {
            (v.powf(lambda) - 1.0) / lambda
        }
    }

    fn invert(lambda: f64, v: f64) -> f64 {
        if v.is_nan() {
            return f64::NAN;
        }
        if lambda.abs() < 1e-12 {
            v.exp()
        } else {
            (lambda * v + 1.0).max(0.0).powf(1.0 / lambda)
        }
    }

    fn log_likelihood(values: &[f64], lambda: f64) -> f64 {
        let transformed: Vec<f64> = values.iter().map(|&v| Self::apply(lambda, v)).collect();
        let var = numeric::variance(&transformed).max(1e-300);
        let log_jacobian: f64 = values.iter().map(|v| v.ln()).sum();
        -(values.len() as f64) / 2.0 * var.ln() + (lambda - 1.0) * log_jacobian
    }
}

impl Transformer for BoxCox {
    fn fit(&mut self, values: &[f64]) -> Result<()> {
        let finite: Vec<f64> = values.iter().copied().filter(|v| !v.is_nan()).collect();
        if finite.iter().any(|&v| v <= 0.0) {
            return Err(ForecastError::Degenerate(
                "Box-Cox requires strictly positive values".to_string(),
            ));
        }
        if finite.len() < 3 {
            return Err(ForecastError::InsufficientData {
                needed: 3,
                got: finite.len(),
            });
        }
        if self.fit_lambda {
            self.lambda = Some(golden_section_max(
                |lambda| Self::log_likelihood(&finite, lambda),
                -2.0,
                2.0,
            ));
        }
        if self.lambda.is_none() {
            return Err(ForecastError::InvalidInput(
                "Box-Cox lambda neither fixed nor fitted".to_string(),
            ));
        }
        Ok(())
    }

    fn transform(&self, values: &[f64]) -> Result<Vec<f64>> {
        let lambda = self.lambda.ok_or_else(|| {
            ForecastError::InvalidInput("transform before fit".to_string())
        })?;
        if !self.ignore_nans && values.iter().any(|v| v.is_nan()) {
            return Err(ForecastError::InvalidInput(
                "NaN in input; enable ignore_nans to pass them through".to_string(),
            ));
        }
        Ok(values.iter().map(|&v| Self::apply(lambda, v)).collect())
    }

    fn inverse_transform(&self, values: &[f64]) -> Result<Vec<f64>> {
        let lambda = self.lambda.ok_or_else(|| {
            ForecastError::InvalidInput("inverse transform before fit".to_string())
        })?;
        Ok(values.iter().map(|&v| Self::invert(lambda, v)).collect())
    }
}

/// Yeo-Johnson power transform: Box-Cox generalized to the whole real
/// line.
#[derive(Debug, Clone)]
pub struct YeoJohnson {
    lambda: Option<f64>,
    fit_lambda: bool,
    pub ignore_nans: bool,
}

impl YeoJohnson {
    pub fn with_lambda(lambda: f64) -> Self {
        Self {
            lambda: Some(lambda),
            fit_lambda: false,
            ignore_nans: false,
        }
    }

    pub fn fitted_lambda() -> Self {
        Self {
            lambda: None,
            fit_lambda: true,
            ignore_nans: false,
        }
    }

    pub fn lambda(&self) -> Option<f64> {
        self.lambda
    }

    fn apply(lambda: f64, v: f64) -> f64 {
        if v.is_nan() {
            return f64::NAN;
        }
        if v >= 0.0 {
            if lambda.abs() < 1e-12 {
                (v + 1.0).ln()
            } else {
                ((v + 1.0).powf(lambda) - 1.0) / lambda
            }
        } else if (lambda - 2.0).abs() < 1e-12 {
            -(-v + 1.0).ln()
        } else {
            -((-v + 1.0).powf(2.0 - lambda) - 1.0) / (2.0 - lambda)
        }
    }

    fn invert(lambda: f64, v: f64) -> f64 {
        if v.is_nan() {
            return f64::NAN;
        }
        if v >= 0.0 {
            if lambda.abs() < 1e-12 {
                v.exp() - 1.0
            } else {
                (lambda * v + 1.0).max(0.0).powf(1.0 / lambda) - 1.0
            }
        } else if (lambda - 2.0).abs() < 1e-12 {
            1.0 - (-v).exp()
        } else {
            1.0 - (-(2.0 - lambda) * v + 1.0).max(0.0).powf(1.0 / (2.0 - lambda))
        }
    }

    fn log_likelihood(values: &[f64], lambda: f64) -> f64 {
        let transformed: Vec<f64> = values.iter().map(|&v| Self::apply(lambda, v)).collect();
        let var = numeric::variance(&transformed).max(1e-300);
        let log_jacobian: f64 = values
            .iter()
            .map(|v| v.signum() * (v.abs() + 1.0).ln())
            .sum();
        -(values.len() as f64) / 2.0 * var.ln() + (lambda - 1.0) * log_jacobian
    }
}

impl Transformer for YeoJohnson {
    fn fit(&mut self, values: &[f64]) -> Result<()> {
        let finite: Vec<f64> = values.iter().copied().filter(|v| !v.is_nan()).collect();
        if finite.len() < 3 {
            return Err(ForecastError::InsufficientData {
                needed: 3,
                got: finite.len(),
            });
        }
        if self.fit_lambda {
            self.lambda = Some(golden_section_max(
                |lambda| Self::log_likelihood(&finite, lambda),
                -2.0,
                2.0,
            ));
        }
        if self.lambda.is_none() {
            return Err(ForecastError::InvalidInput(
                "Yeo-Johnson lambda neither fixed nor fitted".to_string(),
            ));
        }
        Ok(())
    }

    fn transform(&self, values: &[f64]) -> Result<Vec<f64>> {
        let lambda = self.lambda.ok_or_else(|| {
            ForecastError::InvalidInput("transform before fit".to_string())
        })?;
        if !self.ignore_nans && values.iter().any(|v| v.is_nan()) {
            return Err(ForecastError::InvalidInput(
                "NaN in input; enable ignore_nans to pass them through".to_string(),
            ));
        }
        Ok(values.iter().map(|&v| Self::apply(lambda, v)).collect())
    }

    fn inverse_transform(&self, values: &[f64]) -> Result<Vec<f64>> {
        let lambda = self.lambda.ok_or_else(|| {
            ForecastError::InvalidInput("inverse transform before fit".to_string())
        })?;
        Ok(values.iter().map(|&v| Self::invert(lambda, v)).collect())
    }
}

/// Fills interior NaN runs by linear interpolation between the nearest
/// finite neighbors. Leading and trailing NaNs are left in place; the
/// inverse is the identity.
#[derive(Debug, Clone, Default)]
pub struct LinearInterpolator;

impl LinearInterpolator {
    pub fn new() -> Self {
        Self
    }
}

impl Transformer for LinearInterpolator {
    fn fit(&mut self, _values: &[f64]) -> Result<()> {
        Ok(())
    }

    fn transform(&self, values: &[f64]) -> Result<Vec<f64>> {
        let mut out = values.to_vec();
        let Some(first) = out.iter().position(|v| !v.is_nan()) else {
            return Ok(out);
        };
        let last = out
            .iter()
            .rposition(|v| !v.is_nan())
            .expect("position above found one");

        let mut prev = first;
        for i in (first + 1)..=last {
            if !out[i].is_nan() {
                let gap = i - prev;
                if gap > 1 {
                    let slope = (out[i] - out[prev]) / gap as f64;
                    for k in 1..gap {
                        out[prev + k] = out[prev] + slope * k as f64;
                    }
                }
                prev = i;
            }
        }
        Ok(out)
    }

    fn inverse_transform(&self, values: &[f64]) -> Result<Vec<f64>> {
        Ok(values.to_vec())
    }
}

/// A pipeline of transformers applied in order. Fitting locks the
/// pipeline: adding further transformers afterwards is a misuse error.
#[derive(Debug, Default)]
pub struct Pipeline {
    transformers: Vec<Box<dyn Transformer>>,
    fitted: bool,
}

impl Pipeline {
    pub fn new() -> Self {
        Self::default()
    }

    /// Append a transformer. Fails once the pipeline has been fitted.
    pub fn add_transformer(&mut self, transformer: Box<dyn Transformer>) -> Result<()> {
        if self.fitted {
            return Err(ForecastError::InvalidInput(
                "pipeline is locked after fit".to_string(),
            ));
        }
        self.transformers.push(transformer);
        Ok(())
    }

    pub fn len(&self) -> usize {
        self.transformers.len()
    }

    pub fn is_empty(&self) -> bool {
        self.transformers.is_empty()
    }

    /// Fit every stage in order, feeding each the previous stage's
    /// output. Fitting twice is a misuse error.
    pub fn fit(&mut self, values: &[f64]) -> Result<()> {
        if self.fitted {
            return Err(ForecastError::InvalidInput(
                "pipeline is already fitted".to_string(),
            ));
        }
        let mut current = values.to_vec();
        for transformer in self.transformers.iter_mut() {
            current = transformer.fit_transform(&current)?;
        }
        self.fitted = true;
        Ok(())
    }

    pub fn transform(&self, values: &[f64]) -> Result<Vec<f64>> {
        if !self.fitted {
            return Err(ForecastError::InvalidInput(
                "transform before fit".to_string(),
            ));
        }
        let mut current = values.to_vec();
        for transformer in &self.transformers {
            current = transformer.transform(&current)?;
        }
        Ok(current)
    }

    pub fn fit_transform(&mut self, values: &[f64]) -> Result<Vec<f64>> {
        self.fit(values)?;
        self.transform(values)
    }

    /// Apply every inverse in reverse order.
    pub fn inverse_transform(&self, values: &[f64]) -> Result<Vec<f64>> {
        if !self.fitted {
            return Err(ForecastError::InvalidInput(
                "inverse transform before fit".to_string(),
            ));
        }
        let mut current = values.to_vec();
        for transformer in self.transformers.iter().rev() {
            current = transformer.inverse_transform(&current)?;
        }
        Ok(current)
    }

    /// Invert a forecast produced on the transformed scale: the point
    /// forecast and both interval bands go through the same inverse
    /// chain.
    pub fn inverse_transform_forecast(&self, forecast: &Forecast) -> Result<Forecast> {
        Ok(Forecast {
            point: self.inverse_transform(&forecast.point)?,
            lower: self.inverse_transform(&forecast.lower)?,
            upper: self.inverse_transform(&forecast.upper)?,
            level: forecast.level,
        })
    }
}

/// Golden-section search for the maximum of a unimodal function.
fn golden_section_max(f: impl Fn(f64) -> f64, mut lo: f64, mut hi: f64) -> f64 {
    const INV_PHI: f64 = 0.618_033_988_749_894_8;
    let mut c = hi - INV_PHI * (hi - lo);
    let mut d = lo + INV_PHI * (hi - lo);
    let mut fc = f(c);
    let mut fd = f(d);
    for _ in 0..80 {
        if fc > fd {
            hi = d;
            d = c;
            fd = fc;
            c = hi - INV_PHI * (hi - lo);
            fc = f(c);
        } else {
            lo = c;
            c = d;
            fc = fd;
            d = lo + INV_PHI * (hi - lo);
            fd = f(d);
        }
    }
    (lo + hi) / 2.0
}

#[cfg(test)]
mod tests {
    use super::*;
    use approx::assert_relative_eq;

    fn assert_round_trip(transformer: &mut dyn Transformer, values: &[f64]) {
        let transformed = transformer.fit_transform(values).unwrap();
        let recovered = transformer.inverse_transform(&transformed).unwrap();
        let scale = 1.0 + values.iter().cloned().fold(0.0_f64, |a, b| a.max(b.abs()));
        for (orig, rec) in values.iter().zip(recovered.iter()) {
            assert!(
                (orig - rec).abs() <= 1e-6 * scale,
                "{orig} vs {rec}"
            );
        }
    }

    #[test]
    fn test_round_trips() {
        let positive = [1.0, 5.0, 2.5, 80.0, 0.3, 12.0];
        assert_round_trip(&mut MinMaxScaler::new(), &positive);
        assert_round_trip(&mut StandardScaler::new(), &positive);
        assert_round_trip(&mut LogTransform::new(), &positive);
        assert_round_trip(&mut BoxCox::with_lambda(0.5), &positive);
        assert_round_trip(&mut BoxCox::fitted_lambda(), &positive);

        let mixed = [-3.0, 0.0, 2.0, 7.5, -0.4];
        assert_round_trip(&mut StandardScaler::new(), &mixed);
        assert_round_trip(&mut YeoJohnson::with_lambda(1.3), &mixed);
        assert_round_trip(&mut YeoJohnson::fitted_lambda(), &mixed);

        let probabilities = [0.1, 0.5, 0.9, 0.25];
        assert_round_trip(&mut LogitTransform::new(), &probabilities);
    }

    #[test]
    fn test_boxcox_lambda_zero_is_log() {
        let values = [1.0, 2.0, 4.0, 8.0];
        let mut transform = BoxCox::with_lambda(0.0);
        let out = transform.fit_transform(&values).unwrap();
        for (o, v) in out.iter().zip(values.iter()) {
            assert_relative_eq!(*o, v.ln(), epsilon = 1e-12);
        }
    }

    #[test]
    fn test_boxcox_fitted_lambda_near_log_for_exponential() {
        // Exponential growth is linearized by the log, so the fitted
        // lambda should land near zero.
        let values: Vec<f64> = (0..40).map(|i| (0.2 * i as f64).exp()).collect();
        let mut transform = BoxCox::fitted_lambda();
        transform.fit(&values).unwrap();
        let lambda = transform.lambda().unwrap();
        assert!(lambda.abs() < 0.3, "lambda {lambda}");
    }

    #[test]
    fn test_boxcox_rejects_nonpositive() {
        let mut transform = BoxCox::with_lambda(0.5);
        assert!(transform.fit(&[1.0, -1.0]).is_err());
    }

    #[test]
    fn test_nan_passthrough_with_ignore_nans() {
        let values = [1.0, f64::NAN, 3.0];
        let mut transform = BoxCox::with_lambda(0.5);
        transform.ignore_nans = true;
        transform.fit(&values).unwrap();
        let out = transform.transform(&values).unwrap();
        assert!(out[1].is_nan());
        assert!(!out[0].is_nan() && !out[2].is_nan());

        let mut strict = BoxCox::with_lambda(0.5);
        strict.fit(&values).unwrap();
        assert!(strict.transform(&values).is_err());
    }

    #[test]
    fn test_linear_interpolator_interior() {
        let values = [1.0, f64::NAN, f64::NAN, 4.0];
        let interpolator = LinearInterpolator::new();
        let out = interpolator.transform(&values).unwrap();
        assert_relative_eq!(out[0], 1.0, epsilon = 1e-12);
        assert_relative_eq!(out[1], 2.0, epsilon = 1e-12);
        assert_relative_eq!(out[2], 3.0, epsilon = 1e-12);
        assert_relative_eq!(out[3], 4.0, epsilon = 1e-12);
    }

    #[test]
    fn test_linear_interpolator_keeps_edges() {
        let values = [f64::NAN, 2.0, f64::NAN, 4.0, f64::NAN];
        let interpolator = LinearInterpolator::new();
        let out = interpolator.transform(&values).unwrap();
        assert!(out[0].is_nan());
        assert_relative_eq!(out[2], 3.0, epsilon = 1e-12);
        assert!(out[4].is_nan());
    }

    #[test]
    fn test_pipeline_round_trip_and_lock() {
        let values = [2.0, 9.0, 4.5, 30.0, 1.2, 6.0];
        let mut pipeline = Pipeline::new();
        pipeline
            .add_transformer(Box::new(LogTransform::new()))
            .unwrap();
        pipeline
            .add_transformer(Box::new(StandardScaler::new()))
            .unwrap();

        let transformed = pipeline.fit_transform(&values).unwrap();
        let recovered = pipeline.inverse_transform(&transformed).unwrap();
        for (orig, rec) in values.iter().zip(recovered.iter()) {
            assert_relative_eq!(orig, rec, epsilon = 1e-8);
        }

        // Locked after fit.
        assert!(pipeline
            .add_transformer(Box::new(MinMaxScaler::new()))
            .is_err());
        // Fitting twice is a misuse error.
        assert!(pipeline.fit(&values).is_err());
    }

    #[test]
    fn test_pipeline_inverse_forecast_bands() {
        let values = [2.0, 9.0, 4.5, 30.0, 1.2, 6.0];
        let mut pipeline = Pipeline::new();
        pipeline
            .add_transformer(Box::new(LogTransform::new()))
            .unwrap();
        pipeline.fit(&values).unwrap();

        let forecast = Forecast {
            point: vec![1.0, 1.1],
            lower: vec![0.5, 0.6],
            upper: vec![1.5, 1.6],
            level: 0.95,
        };
        let inverted = pipeline.inverse_transform_forecast(&forecast).unwrap();
        for i in 0..2 {
            assert!(inverted.lower[i] <= inverted.point[i]);
            assert!(inverted.point[i] <= inverted.upper[i]);
            assert_relative_eq!(inverted.point[i], forecast.point[i].exp(), epsilon = 1e-12);
        }
    }

    #[test]
    fn test_constant_series_degenerate() {
        assert!(MinMaxScaler::new().fit(&[3.0, 3.0, 3.0]).is_err());
        assert!(StandardScaler::new().fit(&[3.0, 3.0, 3.0]).is_err());
    }
}
