//! Intermittent demand models.
//!
//! The Croston family splits a sparse series into demand sizes and
//! inter-arrival intervals and smooths each separately; TSB smooths the
//! demand probability instead of the interval; ADIDA aggregates into
//! buckets before smoothing and IMAPA ensembles ADIDA across bucket
//! sizes.

use crate::error::{ForecastError, Result};
use crate::forecast::{validate_horizon_level, Forecast, Forecaster};
use crate::numeric;
use crate::optim::{nelder_mead_minimize, NelderMeadOptions};

/// Croston variant.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum CrostonVariant {
    /// Fixed smoothing parameter (0.1)
    #[default]
    Classic,
    /// Smoothing parameter chosen by one-step SSE search
    Optimized,
    /// Syntetos-Boylan approximation: the 1 − α/2 bias correction
    Sba,
}

/// Demand sizes and 1-based arrival intervals of the non-zero entries.
fn split_demand(values: &[f64]) -> (Vec<f64>, Vec<f64>) {
    let mut demands = Vec::new();
    let mut intervals = Vec::new();
    let mut last: Option<usize> = None;
    for (i, &v) in values.iter().enumerate() {
        if v != 0.0 {
            let interval = match last {
                None => (i + 1) as f64,
                Some(prev) => (i - prev) as f64,
            };
            demands.push(v);
            intervals.push(interval);
            last = Some(i);
        }
    }
    (demands, intervals)
}

/// SES over a component series, returning the final level.
fn ses_level(values: &[f64], alpha: f64) -> f64 {
    let mut level = values[0];
    for &v in values.iter().skip(1) {
        level += alpha * (v - level);
    }
    level
}

/// One-step SSE of SES at `alpha`, for the optimized variants.
fn ses_sse(values: &[f64], alpha: f64) -> f64 {
    let mut level = values[0];
    let mut sse = 0.0;
    for &v in values.iter().skip(1) {
        let e = v - level;
        sse += e * e;
        level += alpha * e;
    }
    sse
}

fn optimize_alpha(values: &[f64]) -> Result<f64> {
    if values.len() < 2 {
        return Ok(0.1);
    }
    let result = nelder_mead_minimize(
        |x| ses_sse(values, x[0]),
        &[0.1],
        &[0.01],
        &[0.3],
        &NelderMeadOptions::default(),
    )?;
    Ok(result.x[0])
}

fn flat_forecast(rate: f64, sigma: f64, horizon: usize, level: f64) -> Forecast {
    let z = numeric::normal_interval_z(level);
    let point = vec![rate; horizon];
    let lower = (1..=horizon)
        .map(|h| rate - z * sigma * (h as f64).sqrt())
        .collect();
    let upper = (1..=horizon)
        .map(|h| rate + z * sigma * (h as f64).sqrt())
        .collect();
    Forecast {
        point,
        lower,
        upper,
        level,
    }
}

fn demand_sigma(values: &[f64], rate: f64) -> f64 {
    if values.is_empty() {
        return 0.0;
    }
    (values.iter().map(|v| (v - rate) * (v - rate)).sum::<f64>() / values.len() as f64).sqrt()
}

fn check_nonnegative(values: &[f64]) -> Result<()> {
    if values.iter().any(|&v| v < 0.0) {
        return Err(ForecastError::InvalidInput(
            "intermittent demand models require non-negative values".to_string(),
        ));
    }
    Ok(())
}

/// Croston's method.
#[derive(Debug, Clone)]
pub struct Croston {
    variant: CrostonVariant,
    rate: f64,
    sigma: f64,
    is_fit: bool,
}

impl Croston {
    pub fn new(variant: CrostonVariant) -> Self {
        Self {
            variant,
            rate: 0.0,
            sigma: 0.0,
            is_fit: false,
        }
    }

    /// The smoothed demand rate after fitting.
    pub fn rate(&self) -> f64 {
        self.rate
    }
}

impl Forecaster for Croston {
    fn fit(&mut self, values: &[f64]) -> Result<()> {
        let n = values.len();
        if n < 1 {
            return Err(ForecastError::InsufficientData { needed: 1, got: 0 });
        }
        check_nonnegative(values)?;

        let (demands, intervals) = split_demand(values);
        if demands.is_empty() {
            self.rate = 0.0;
            self.sigma = 0.0;
            self.is_fit = true;
            return Ok(());
        }

        let alpha = match self.variant {
            CrostonVariant::Classic | CrostonVariant::Sba => 0.1,
            CrostonVariant::Optimized => optimize_alpha(&demands)?,
        };
        let interval_alpha = match self.variant {
            CrostonVariant::Optimized => optimize_alpha(&intervals)?,
            _ => alpha,
        };

        let demand_level = ses_level(&demands, alpha);
        let interval_level = ses_level(&intervals, interval_alpha).max(1.0);

        let mut rate = demand_level / interval_level;
        if self.variant == CrostonVariant::Sba {
            rate *= 1.0 - interval_alpha / 2.0;
        }

        self.rate = rate;
        self.sigma = demand_sigma(values, rate);
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
        Ok(flat_forecast(self.rate, self.sigma, horizon, level))
    }

    fn fitted(&self) -> Option<&[f64]> {
        None
    }

    fn residuals(&self) -> Option<&[f64]> {
        None
    }

    fn name(&self) -> &'static str {
        match self.variant {
            CrostonVariant::Classic => "CrostonClassic",
            CrostonVariant::Optimized => "CrostonOptimized",
            CrostonVariant::Sba => "CrostonSBA",
        }
    }
}

/// Teunter-Syntetos-Babai: smooths the demand probability rather than
/// the inter-arrival interval.
#[derive(Debug, Clone)]
pub struct Tsb {
    alpha_demand: f64,
    alpha_probability: f64,
    rate: f64,
    sigma: f64,
    is_fit: bool,
}

impl Tsb {
    pub fn new(alpha_demand: f64, alpha_probability: f64) -> Result<Self> {
        for (name, v) in [
            ("alpha_demand", alpha_demand),
            ("alpha_probability", alpha_probability),
        ] {
            if !(0.0 < v && v < 1.0) {
                return Err(ForecastError::invalid_parameter(
                    name,
                    v,
                    "must be in (0, 1)",
                ));
            }
        }
        Ok(Self {
            alpha_demand,
            alpha_probability,
            rate: 0.0,
            sigma: 0.0,
            is_fit: false,
        })
    }
}

impl Forecaster for Tsb {
    fn fit(&mut self, values: &[f64]) -> Result<()> {
        let n = values.len();
        if n < 1 {
            return Err(ForecastError::InsufficientData { needed: 1, got: 0 });
        }
        check_nonnegative(values)?;

        let first_demand = values.iter().find(|&&v| v != 0.0).copied();
        let Some(first) = first_demand else {
            self.rate = 0.0;
            self.sigma = 0.0;
            self.is_fit = true;
            return Ok(());
        };

        let nonzero = values.iter().filter(|&&v| v != 0.0).count() as f64;
        let mut probability = nonzero / n as f64;
        let mut demand = first;

        for &v in values {
            if v != 0.0 {
                probability += self.alpha_probability * (1.0 - probability);
                demand += self.alpha_demand * (v - demand);
            } else {
                probability += self.alpha_probability * (0.0 - probability);
            }
        }

        self.rate = probability * demand;
        self.sigma = demand_sigma(values, self.rate);
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
        Ok(flat_forecast(self.rate, self.sigma, horizon, level))
    }

    fn fitted(&self) -> Option<&[f64]> {
        None
    }

    fn residuals(&self) -> Option<&[f64]> {
        None
    }

    fn name(&self) -> &'static str {
        "TSB"
    }
}

/// Aggregate-disaggregate intermittent demand approach: sum the series
/// into buckets, smooth the bucket totals, then scale back to the
/// original sampling rate.
#[derive(Debug, Clone)]
pub struct Adida {
    /// Bucket size; `None` uses the mean inter-demand interval.
    bucket: Option<usize>,
    rate: f64,
    sigma: f64,
    is_fit: bool,
}

impl Adida {
    pub fn new(bucket: Option<usize>) -> Result<Self> {
        if let Some(b) = bucket {
            if b < 1 {
                return Err(ForecastError::invalid_parameter(
                    "bucket",
                    b,
                    "must be at least 1",
                ));
            }
        }
        Ok(Self {
            bucket,
            rate: 0.0,
            sigma: 0.0,
            is_fit: false,
        })
    }

    fn fit_rate(values: &[f64], bucket: usize) -> Result<f64> {
        let aggregated: Vec<f64> = values
            .chunks(bucket)
            .map(|chunk| chunk.iter().sum::<f64>())
            .collect();
        if aggregated.is_empty() {
            return Ok(0.0);
        }
        let alpha = optimize_alpha(&aggregated)?;
        Ok(ses_level(&aggregated, alpha) / bucket as f64)
    }
}

impl Forecaster for Adida {
    fn fit(&mut self, values: &[f64]) -> Result<()> {
        let n = values.len();
        if n < 1 {
            return Err(ForecastError::InsufficientData { needed: 1, got: 0 });
        }
        check_nonnegative(values)?;

        let (_, intervals) = split_demand(values);
        let bucket = match self.bucket {
            Some(b) => b,
            None => numeric::mean(&intervals).round().max(1.0) as usize,
        };
        let bucket = bucket.min(n.max(1));

        self.rate = Self::fit_rate(values, bucket)?;
        self.sigma = demand_sigma(values, self.rate);
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
        Ok(flat_forecast(self.rate, self.sigma, horizon, level))
    }

    fn fitted(&self) -> Option<&[f64]> {
        None
    }

    fn residuals(&self) -> Option<&[f64]> {
        None
    }

    fn name(&self) -> &'static str {
        "ADIDA"
    }
}

/// Multiple-aggregation prediction: ADIDA averaged over bucket sizes
/// from one up to the mean inter-demand interval.
#[derive(Debug, Clone, Default)]
pub struct Imapa {
    rate: f64,
    sigma: f64,
    is_fit: bool,
}

impl Imapa {
    pub fn new() -> Self {
        Self::default()
    }
}

impl Forecaster for Imapa {
    fn fit(&mut self, values: &[f64]) -> Result<()> {
        let n = values.len();
        if n < 1 {
            return Err(ForecastError::InsufficientData { needed: 1, got: 0 });
        }
        check_nonnegative(values)?;

        let (_, intervals) = split_demand(values);
        let max_bucket = if intervals.is_empty() {
            1
        } else {
            numeric::mean(&intervals).round().max(1.0) as usize
        };
        let max_bucket = max_bucket.min(n.max(1));

        let mut total = 0.0;
        let mut count = 0usize;
        for bucket in 1..=max_bucket {
            total += Adida::fit_rate(values, bucket)?;
            count += 1;
        }
        self.rate = if count > 0 { total / count as f64 } else { 0.0 };
        self.sigma = demand_sigma(values, self.rate);
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
        Ok(flat_forecast(self.rate, self.sigma, horizon, level))
    }

    fn fitted(&self) -> Option<&[f64]> {
        None
    }

    fn residuals(&self) -> Option<&[f64]> {
        None
    }

    fn name(&self) -> &'static str {
        "IMAPA"
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use approx::assert_relative_eq;

    fn sparse_series() -> Vec<f64> {
        let mut values = vec![0.0; 30];
        values[3] = 4.0;
        values[9] = 6.0;
        values[15] = 5.0;
        values[21] = 5.0;
        values[27] = 4.0;
        values
    }

    #[test]
    fn test_croston_single_demand() {
        // One demand of 12 at index 5: interval to the first arrival is 6,
        // so the rate is 12/6.
        let mut values = vec![0.0; 20];
        values[5] = 12.0;
        let mut model = Croston::new(CrostonVariant::Classic);
        model.fit(&values).unwrap();
        assert_relative_eq!(model.rate(), 2.0, epsilon = 1e-9);
        let forecast = model.forecast(5, 0.95).unwrap();
        for p in &forecast.point {
            assert!(*p > 0.0);
            assert_relative_eq!(*p, 2.0, epsilon = 1e-9);
        }
    }

    #[test]
    fn test_croston_regular_demand() {
        let values = sparse_series();
        let mut model = Croston::new(CrostonVariant::Classic);
        model.fit(&values).unwrap();
        // Demand ~4.8 every ~6 steps.
        assert!(model.rate() > 0.5 && model.rate() < 1.2, "rate {}", model.rate());
    }

    #[test]
    fn test_sba_shrinks_classic() {
        let values = sparse_series();
        let mut classic = Croston::new(CrostonVariant::Classic);
        let mut sba = Croston::new(CrostonVariant::Sba);
        classic.fit(&values).unwrap();
        sba.fit(&values).unwrap();
        assert!(sba.rate() < classic.rate());
        assert_relative_eq!(sba.rate(), classic.rate() * 0.95, epsilon = 1e-9);
    }

    #[test]
    fn test_all_zero_series() {
        let values = vec![0.0; 15];
        for mut model in [
            Box::new(Croston::new(CrostonVariant::Classic)) as Box<dyn Forecaster>,
            Box::new(Tsb::new(0.1, 0.1).unwrap()),
            Box::new(Adida::new(None).unwrap()),
            Box::new(Imapa::new()),
        ] {
            model.fit(&values).unwrap();
            let forecast = model.forecast(4, 0.95).unwrap();
            assert!(forecast.point.iter().all(|&p| p == 0.0), "{}", model.name());
        }
    }

    #[test]
    fn test_tsb_rate_positive() {
        let values = sparse_series();
        let mut model = Tsb::new(0.1, 0.1).unwrap();
        model.fit(&values).unwrap();
        let forecast = model.forecast(3, 0.95).unwrap();
        assert!(forecast.point[0] > 0.0);
    }

    #[test]
    fn test_adida_and_imapa_close_to_mean_rate() {
        let values = sparse_series();
        let mean_rate = values.iter().sum::<f64>() / values.len() as f64;
        let mut adida = Adida::new(None).unwrap();
        adida.fit(&values).unwrap();
        let mut imapa = Imapa::new();
        imapa.fit(&values).unwrap();
        for model_rate in [adida.rate, imapa.rate] {
            assert!(
                (model_rate - mean_rate).abs() < mean_rate,
                "rate {model_rate} vs mean {mean_rate}"
            );
        }
    }

    #[test]
    fn test_negative_values_rejected() {
        let mut model = Croston::new(CrostonVariant::Classic);
        assert!(model.fit(&[1.0, -1.0, 0.0]).is_err());
    }
}
