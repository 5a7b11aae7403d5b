//! Peak detection for time series.
//!
//! Local-maximum detection with prominence filtering. Used by the
//! periodogram peak picker and exposed directly for series analysis.

use crate::error::{ForecastError, Result};

/// A detected peak in the time series.
#[derive(Debug, Clone)]
pub struct Peak {
    /// Index at which the peak occurs
    pub index: usize,
    /// Value at the peak
    pub value: f64,
    /// Prominence of the peak (height relative to surrounding valleys)
    pub prominence: f64,
}

/// Result of peak detection.
#[derive(Debug, Clone)]
pub struct PeakDetectionResult {
    /// Detected peaks, by ascending index
    pub peaks: Vec<Peak>,
    /// Inter-peak distances
    pub inter_peak_distances: Vec<f64>,
    /// Mean period estimated from inter-peak distances
    pub mean_period: f64,
}

/// Detect peaks in a time series.
///
/// A peak is a sample strictly greater than both neighbors. Prominence is
/// measured against the highest of the two flanking valley minima, and
/// peaks closer than `min_distance` keep only the taller one.
pub fn detect_peaks(
    values: &[f64],
    min_distance: Option<usize>,
    min_prominence: Option<f64>,
) -> Result<PeakDetectionResult> {
    let n = values.len();
    if n < 3 {
        return Err(ForecastError::InsufficientData { needed: 3, got: n });
    }

    let mut candidates: Vec<Peak> = Vec::new();
    for i in 1..n - 1 {
        if values[i] > values[i - 1] && values[i] > values[i + 1] {
            candidates.push(Peak {
                index: i,
                value: values[i],
                prominence: prominence_at(values, i),
            });
        }
    }

    if let Some(threshold) = min_prominence {
        candidates.retain(|p| p.prominence >= threshold);
    }

    if let Some(dist) = min_distance {
        // Greedy by height: taller peaks suppress close smaller ones.
        let mut by_height: Vec<usize> = (0..candidates.len()).collect();
        by_height.sort_by(|&a, &b| {
            candidates[b]
                .value
                .partial_cmp(&candidates[a].value)
                .unwrap_or(std::cmp::Ordering::Equal)
        });
        let mut keep = vec![true; candidates.len()];
        for (rank, &i) in by_height.iter().enumerate() {
            if !keep[i] {
                continue;
            }
            for &j in by_height.iter().skip(rank + 1) {
                if keep[j] && candidates[i].index.abs_diff(candidates[j].index) < dist {
                    keep[j] = false;
                }
            }
        }
        candidates = candidates
            .into_iter()
            .zip(keep)
            .filter_map(|(p, k)| k.then_some(p))
            .collect();
    }

    let inter_peak_distances: Vec<f64> = candidates
        .windows(2)
        .map(|w| (w[1].index - w[0].index) as f64)
        .collect();
    let mean_period = if inter_peak_distances.is_empty() {
        f64::NAN
    } else {
        inter_peak_distances.iter().sum::<f64>() / inter_peak_distances.len() as f64
    };

    Ok(PeakDetectionResult {
        peaks: candidates,
        inter_peak_distances,
        mean_period,
    })
}

/// Detect peaks with default parameters.
pub fn detect_peaks_default(values: &[f64]) -> Result<PeakDetectionResult> {
    detect_peaks(values, None, None)
}

/// Peak indices above an optional prominence threshold.
pub fn get_peak_indices(values: &[f64], min_prominence: Option<f64>) -> Result<Vec<usize>> {
    let result = detect_peaks(values, None, min_prominence)?;
    Ok(result.peaks.iter().map(|p| p.index).collect())
}

/// Peak values above an optional prominence threshold.
pub fn get_peak_values(values: &[f64], min_prominence: Option<f64>) -> Result<Vec<f64>> {
    let result = detect_peaks(values, None, min_prominence)?;
    Ok(result.peaks.iter().map(|p| p.value).collect())
}

/// Prominence: height above the higher of the two flanking valleys,
/// where each valley is the minimum between this peak and the nearest
/// higher ground (or the series edge).
fn prominence_at(values: &[f64], peak: usize) -> f64 {
    let height = values[peak];

    let mut left_min = height;
    for i in (0..peak).rev() {
        if values[i] > height {
            break;
        }
        left_min = left_min.min(values[i]);
    }

    let mut right_min = height;
    for &v in values.iter().skip(peak + 1) {
        if v > height {
            break;
        }
        right_min = right_min.min(v);
    }

    height - left_min.max(right_min)
}

#[cfg(test)]
mod tests {
    use super::*;
    use approx::assert_relative_eq;
    use std::f64::consts::PI;

    fn seasonal_series(n: usize, period: f64, amplitude: f64) -> Vec<f64> {
        (0..n)
            .map(|i| amplitude * (2.0 * PI * i as f64 / period).sin())
            .collect()
    }

    #[test]
    fn test_detect_peaks_counts_cycles() {
        let values = seasonal_series(120, 12.0, 5.0);
        let result = detect_peaks_default(&values).unwrap();
        assert_eq!(result.peaks.len(), 10);
        assert_relative_eq!(result.mean_period, 12.0, epsilon = 0.5);
    }

    #[test]
    fn test_prominence_threshold() {
        let mut values = seasonal_series(60, 12.0, 5.0);
        // Inject a tiny ripple that must be filtered out.
        values[30] += 0.01;
        let result = detect_peaks(&values, None, Some(3.0)).unwrap();
        for peak in &result.peaks {
            assert!(peak.prominence >= 3.0);
        }
    }

    #[test]
    fn test_min_distance_keeps_tallest() {
        let values = vec![0.0, 3.0, 0.0, 5.0, 0.0, 3.0, 0.0];
        let result = detect_peaks(&values, Some(3), None).unwrap();
        assert_eq!(result.peaks.len(), 1);
        assert_eq!(result.peaks[0].index, 3);
    }

    #[test]
    fn test_insufficient_data() {
        assert!(detect_peaks_default(&[1.0, 2.0]).is_err());
    }
}
