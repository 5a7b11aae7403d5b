//! Timestamp regularization.
//!
//! The host engine consumes equally spaced arrays; these helpers rebuild
//! an irregular series onto the regular grid a frequency implies and
//! recover that frequency from the observed spacings. Timestamps are
//! `i64` epoch seconds.

use crate::error::{ForecastError, Result};

/// Rebuild a series onto the regular grid starting at its earliest
/// timestamp.
///
/// Every grid tick between the first and last observation gets a slot;
/// observations land on their nearest tick and unclaimed ticks come back
/// NULL. When two observations snap to the same tick the earlier one
/// wins.
pub fn fill_gaps(
    dates: &[i64],
    values: &[Option<f64>],
    frequency_seconds: i64,
) -> Result<(Vec<i64>, Vec<Option<f64>>)> {
    if dates.len() != values.len() {
        return Err(ForecastError::InvalidInput(
            "Dates and values must have the same length".to_string(),
        ));
    }
    if frequency_seconds <= 0 {
        return Err(ForecastError::invalid_parameter(
            "frequency_seconds",
            frequency_seconds,
            "must be positive",
        ));
    }
    if dates.len() <= 1 {
        return Ok((dates.to_vec(), values.to_vec()));
    }

    let mut pairs: Vec<(i64, Option<f64>)> =
        dates.iter().copied().zip(values.iter().copied()).collect();
    pairs.sort_by_key(|(d, _)| *d);

    let first = pairs[0].0;
    let last = pairs[pairs.len() - 1].0;
    let span = last - first;
    let n_ticks = ((span + frequency_seconds / 2) / frequency_seconds) as usize + 1;

    let grid_dates: Vec<i64> = (0..n_ticks)
        .map(|i| first + i as i64 * frequency_seconds)
        .collect();
    let mut grid_values: Vec<Option<f64>> = vec![None; n_ticks];

    for (date, value) in pairs {
        let tick = (((date - first) + frequency_seconds / 2) / frequency_seconds) as usize;
        let tick = tick.min(n_ticks - 1);
        if grid_values[tick].is_none() {
            grid_values[tick] = value;
        }
    }

    Ok((grid_dates, grid_values))
}

/// Recover the sampling frequency as the majority spacing: the lower
/// median of the positive timestamp deltas. Robust as long as more than
/// half the gaps are regular.
pub fn detect_frequency(dates: &[i64]) -> Result<i64> {
    if dates.len() < 2 {
        return Err(ForecastError::InsufficientData {
            needed: 2,
            got: dates.len(),
        });
    }

    let mut sorted = dates.to_vec();
    sorted.sort_unstable();

    let mut deltas: Vec<i64> = sorted
        .windows(2)
        .map(|w| w[1] - w[0])
        .filter(|&d| d > 0)
        .collect();
    if deltas.is_empty() {
        return Err(ForecastError::InvalidInput(
            "could not detect a frequency".to_string(),
        ));
    }

    deltas.sort_unstable();
    Ok(deltas[(deltas.len() - 1) / 2])
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_fill_gaps() {
        let dates = vec![0, 100, 300];
        let values = vec![Some(1.0), Some(2.0), Some(3.0)];
        let (filled_dates, filled_values) = fill_gaps(&dates, &values, 100).unwrap();
        assert_eq!(filled_dates, vec![0, 100, 200, 300]);
        assert_eq!(filled_values, vec![Some(1.0), Some(2.0), None, Some(3.0)]);
    }

    #[test]
    fn test_fill_gaps_unsorted_input() {
        let dates = vec![200, 0, 100];
        let values = vec![Some(3.0), Some(1.0), Some(2.0)];
        let (filled_dates, filled_values) = fill_gaps(&dates, &values, 100).unwrap();
        assert_eq!(filled_dates, vec![0, 100, 200]);
        assert_eq!(filled_values, vec![Some(1.0), Some(2.0), Some(3.0)]);
    }

    #[test]
    fn test_fill_gaps_snaps_jitter_to_grid() {
        // Slightly off-grid timestamps land on their nearest tick.
        let dates = vec![0, 103, 197, 300];
        let values = vec![Some(1.0), Some(2.0), Some(3.0), Some(4.0)];
        let (filled_dates, filled_values) = fill_gaps(&dates, &values, 100).unwrap();
        assert_eq!(filled_dates, vec![0, 100, 200, 300]);
        assert_eq!(
            filled_values,
            vec![Some(1.0), Some(2.0), Some(3.0), Some(4.0)]
        );
    }

    #[test]
    fn test_fill_gaps_collision_keeps_earlier() {
        let dates = vec![0, 90, 110, 200];
        let values = vec![Some(1.0), Some(2.0), Some(9.0), Some(4.0)];
        let (filled_dates, filled_values) = fill_gaps(&dates, &values, 100).unwrap();
        assert_eq!(filled_dates, vec![0, 100, 200]);
        assert_eq!(filled_values, vec![Some(1.0), Some(2.0), Some(4.0)]);
    }

    #[test]
    fn test_detect_frequency() {
        let dates = vec![0, 100, 200, 300, 450];
        assert_eq!(detect_frequency(&dates).unwrap(), 100);
    }

    #[test]
    fn test_detect_frequency_majority_spacing() {
        // One long outage among regular spacings does not skew the
        // estimate.
        let dates = vec![0, 60, 120, 180, 1180, 1240, 1300];
        assert_eq!(detect_frequency(&dates).unwrap(), 60);
    }

    #[test]
    fn test_detect_frequency_too_short() {
        assert!(detect_frequency(&[42]).is_err());
    }
}
