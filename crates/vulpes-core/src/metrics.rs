//! Forecast accuracy metrics.
//!
//! All metrics validate equal-length, non-empty inputs. Metrics whose
//! denominator can vanish (MAPE, sMAPE, MASE, rMAE, R²) return
//! `Ok(None)` in that case rather than NaN, so hosts can distinguish
//! "undefined" from a numerical accident.

use crate::error::{ForecastError, Result};

/// Mean absolute error.
pub fn mae(actual: &[f64], forecast: &[f64]) -> Result<f64> {
    validate_inputs(actual, forecast)?;
    let sum: f64 = actual
        .iter()
        .zip(forecast.iter())
        .map(|(a, f)| (a - f).abs())
        .sum();
    Ok(sum / actual.len() as f64)
}

/// Mean squared error.
pub fn mse(actual: &[f64], forecast: &[f64]) -> Result<f64> {
    validate_inputs(actual, forecast)?;
    let sum: f64 = actual
        .iter()
        .zip(forecast.iter())
        .map(|(a, f)| (a - f) * (a - f))
        .sum();
    Ok(sum / actual.len() as f64)
}

/// Root mean squared error.
pub fn rmse(actual: &[f64], forecast: &[f64]) -> Result<f64> {
    Ok(mse(actual, forecast)?.sqrt())
}

/// Mean absolute percentage error, in percent.
///
/// Terms with a zero actual are excluded; when every term is excluded
/// the metric is undefined.
pub fn mape(actual: &[f64], forecast: &[f64]) -> Result<Option<f64>> {
    validate_inputs(actual, forecast)?;
    let mut sum = 0.0;
    let mut count = 0usize;
    for (a, f) in actual.iter().zip(forecast.iter()) {
        if a.abs() > f64::EPSILON {
            sum += ((a - f) / a).abs();
            count += 1;
        }
    }
    if count == 0 {
        return Ok(None);
    }
    Ok(Some(sum / count as f64 * 100.0))
}

/// Symmetric mean absolute percentage error, in percent.
pub fn smape(actual: &[f64], forecast: &[f64]) -> Result<Option<f64>> {
    validate_inputs(actual, forecast)?;
    let mut sum = 0.0;
    let mut count = 0usize;
    for (a, f) in actual.iter().zip(forecast.iter()) {
        let denom = a.abs() + f.abs();
        if denom > f64::EPSILON {
            sum += 2.0 * (a - f).abs() / denom;
            count += 1;
        }
    }
    if count == 0 {
        return Ok(None);
    }
    Ok(Some(sum / count as f64 * 100.0))
}

/// Mean absolute scaled error: MAE of the forecast over the MAE of a
/// caller-supplied baseline (typically a naive in-sample forecast).
/// Undefined when the baseline has no error.
pub fn mase(actual: &[f64], forecast: &[f64], baseline: &[f64]) -> Result<Option<f64>> {
    validate_inputs(actual, forecast)?;
    if actual.len() != baseline.len() {
        return Err(ForecastError::InvalidInput(format!(
            "Actual and baseline arrays must have the same length: {} vs {}",
            actual.len(),
            baseline.len()
        )));
    }
    let forecast_mae = mae(actual, forecast)?;
    let baseline_mae = mae(actual, baseline)?;
    if baseline_mae.abs() < f64::EPSILON {
        return Ok(None);
    }
    Ok(Some(forecast_mae / baseline_mae))
}

/// Coefficient of determination. Undefined when the actuals have zero
/// variance.
pub fn r2(actual: &[f64], forecast: &[f64]) -> Result<Option<f64>> {
    validate_inputs(actual, forecast)?;
    let mean: f64 = actual.iter().sum::<f64>() / actual.len() as f64;
    let ss_res: f64 = actual
        .iter()
        .zip(forecast.iter())
        .map(|(a, f)| (a - f) * (a - f))
        .sum();
    let ss_tot: f64 = actual.iter().map(|a| (a - mean) * (a - mean)).sum();
    if ss_tot.abs() < f64::EPSILON {
        return Ok(None);
    }
    Ok(Some(1.0 - ss_res / ss_tot))
}

/// Mean error (forecast minus actual).
pub fn bias(actual: &[f64], forecast: &[f64]) -> Result<f64> {
    validate_inputs(actual, forecast)?;
    let sum: f64 = actual.iter().zip(forecast.iter()).map(|(a, f)| f - a).sum();
    Ok(sum / actual.len() as f64)
}

/// Relative MAE of two competing predictions. Undefined when the second
/// prediction fits perfectly.
pub fn rmae(actual: &[f64], pred1: &[f64], pred2: &[f64]) -> Result<Option<f64>> {
    validate_inputs(actual, pred1)?;
    if actual.len() != pred2.len() {
        return Err(ForecastError::InvalidInput(format!(
            "Actual and pred2 arrays must have the same length: {} vs {}",
            actual.len(),
            pred2.len()
        )));
    }
    let mae1 = mae(actual, pred1)?;
    let mae2 = mae(actual, pred2)?;
    if mae2.abs() < f64::EPSILON {
        return Ok(None);
    }
    Ok(Some(mae1 / mae2))
}

/// Pinball loss at a quantile level.
pub fn quantile_loss(actual: &[f64], forecast: &[f64], quantile: f64) -> Result<f64> {
    validate_inputs(actual, forecast)?;
    if !(0.0..=1.0).contains(&quantile) {
        return Err(ForecastError::invalid_parameter(
            "quantile",
            quantile,
            "must be in [0, 1]",
        ));
    }
    let sum: f64 = actual
        .iter()
        .zip(forecast.iter())
        .map(|(a, f)| {
            let error = a - f;
            if error >= 0.0 {
                quantile * error
            } else {
                (quantile - 1.0) * error
            }
        })
        .sum();
    Ok(sum / actual.len() as f64)
}

/// Mean quantile loss across several quantile forecasts.
pub fn mqloss(actual: &[f64], forecasts: &[Vec<f64>], quantiles: &[f64]) -> Result<f64> {
    if forecasts.len() != quantiles.len() {
        return Err(ForecastError::InvalidInput(
            "Number of forecasts must match number of quantiles".to_string(),
        ));
    }
    if quantiles.is_empty() {
        return Err(ForecastError::InvalidInput(
            "At least one quantile is required".to_string(),
        ));
    }
    let mut total = 0.0;
    for (forecast, &q) in forecasts.iter().zip(quantiles.iter()) {
        total += quantile_loss(actual, forecast, q)?;
    }
    Ok(total / quantiles.len() as f64)
}

/// Fraction of actuals inside the interval bands.
pub fn coverage(actual: &[f64], lower: &[f64], upper: &[f64]) -> Result<f64> {
    if actual.len() != lower.len() || actual.len() != upper.len() {
        return Err(ForecastError::InvalidInput(
            "All arrays must have the same length".to_string(),
        ));
    }
    if actual.is_empty() {
        return Err(ForecastError::InsufficientData { needed: 1, got: 0 });
    }
    let covered = actual
        .iter()
        .zip(lower.iter())
        .zip(upper.iter())
        .filter(|((a, l), u)| *a >= *l && *a <= *u)
        .count();
    Ok(covered as f64 / actual.len() as f64)
}

/// Per-step interval widths.
pub fn interval_width(lower: &[f64], upper: &[f64]) -> Result<Vec<f64>> {
    if lower.len() != upper.len() {
        return Err(ForecastError::InvalidInput(
            "Lower and upper arrays must have the same length".to_string(),
        ));
    }
    Ok(lower.iter().zip(upper.iter()).map(|(l, u)| u - l).collect())
}

/// Mean interval width.
pub fn mean_interval_width(lower: &[f64], upper: &[f64]) -> Result<f64> {
    let widths = interval_width(lower, upper)?;
    if widths.is_empty() {
        return Err(ForecastError::InsufficientData { needed: 1, got: 0 });
    }
    Ok(widths.iter().sum::<f64>() / widths.len() as f64)
}

fn validate_inputs(actual: &[f64], forecast: &[f64]) -> Result<()> {
    if actual.len() != forecast.len() {
        return Err(ForecastError::InvalidInput(format!(
            "Actual and forecast arrays must have the same length: {} vs {}",
            actual.len(),
            forecast.len()
        )));
    }
    if actual.is_empty() {
        return Err(ForecastError::InsufficientData { needed: 1, got: 0 });
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use approx::assert_relative_eq;

    #[test]
    fn test_mae_definition() {
        let result = mae(&[1.0, 2.0, 3.0], &[1.5, 2.5, 2.0]).unwrap();
        assert_relative_eq!(result, (0.5 + 0.5 + 1.0) / 3.0, epsilon = 1e-12);
    }

    #[test]
    fn test_rmse_perfect_fit() {
        let result = rmse(&[1.0, 2.0, 3.0], &[1.0, 2.0, 3.0]).unwrap();
        assert_relative_eq!(result, 0.0);
    }

    #[test]
    fn test_mape_undefined_on_zero_actuals() {
        assert_eq!(mape(&[0.0, 0.0], &[1.0, 2.0]).unwrap(), None);
    }

    #[test]
    fn test_smape_skips_zero_pairs() {
        let result = smape(&[0.0, 1.0], &[0.0, 2.0]).unwrap().unwrap();
        assert_relative_eq!(result, 200.0 / 3.0, epsilon = 1e-4);
    }

    #[test]
    fn test_r2_undefined_on_constant_actuals() {
        assert_eq!(r2(&[5.0, 5.0, 5.0], &[4.0, 5.0, 6.0]).unwrap(), None);
    }

    #[test]
    fn test_mase_against_baseline() {
        let actual = [3.0, 4.0, 5.0];
        let forecast = [3.5, 4.5, 5.5];
        let baseline = [2.0, 3.0, 4.0];
        let result = mase(&actual, &forecast, &baseline).unwrap().unwrap();
        assert_relative_eq!(result, 0.5, epsilon = 1e-12);

        // Perfect baseline leaves the ratio undefined.
        assert_eq!(mase(&actual, &forecast, &actual).unwrap(), None);
    }

    #[test]
    fn test_rmae() {
        let actual = [1.0, 2.0];
        let result = rmae(&actual, &[2.0, 3.0], &[1.5, 2.5]).unwrap().unwrap();
        assert_relative_eq!(result, 2.0, epsilon = 1e-12);
        assert_eq!(rmae(&actual, &[2.0, 3.0], &actual).unwrap(), None);
    }

    #[test]
    fn test_quantile_loss() {
        // Median pinball loss is half the MAE.
        let actual = [1.0, 2.0, 3.0];
        let forecast = [2.0, 2.0, 2.0];
        let loss = quantile_loss(&actual, &forecast, 0.5).unwrap();
        let reference = mae(&actual, &forecast).unwrap() / 2.0;
        assert_relative_eq!(loss, reference, epsilon = 1e-12);
    }

    #[test]
    fn test_quantile_loss_asymmetry() {
        // Under-forecasting hurts more at high quantiles.
        let actual = [10.0];
        let under = quantile_loss(&actual, &[5.0], 0.9).unwrap();
        let over = quantile_loss(&actual, &[15.0], 0.9).unwrap();
        assert!(under > over);
    }

    #[test]
    fn test_coverage_and_width() {
        let actual = [1.0, 2.0, 3.0, 10.0];
        let lower = [0.5, 1.5, 2.5, 3.5];
        let upper = [1.5, 2.5, 3.5, 4.5];
        assert_relative_eq!(coverage(&actual, &lower, &upper).unwrap(), 0.75);
        assert_relative_eq!(mean_interval_width(&lower, &upper).unwrap(), 1.0);
    }

    #[test]
    fn test_bias_sign() {
        let result = bias(&[1.0, 2.0], &[2.0, 3.0]).unwrap();
        assert_relative_eq!(result, 1.0);
    }

    #[test]
    fn test_length_mismatch() {
        assert!(mae(&[1.0], &[1.0, 2.0]).is_err());
        assert!(coverage(&[1.0], &[0.0], &[1.0, 2.0]).is_err());
    }

    #[test]
    fn test_empty_inputs() {
        assert!(mae(&[], &[]).is_err());
    }
}
