//! Series screening and edge trimming.
//!
//! One forward scan produces a [`SeriesProfile`]: observation and zero
//! counts, the observed value spread, and the positions of the first and
//! last non-zero observations. The degenerate checks and the zero
//! trimming used before model fitting all read off that profile instead
//! of rescanning the series per question. Both of the crate's missing
//! value codings feed the same profile: `None` on the ingestion surface,
//! NaN on the transform surface.

/// Single-pass summary of a series.
#[derive(Debug, Clone, Copy, Default)]
pub struct SeriesProfile {
    /// Total length including missing entries.
    pub len: usize,
    /// Observed (non-missing) entries.
    pub n_observed: usize,
    /// Missing entries.
    pub n_missing: usize,
    /// Observed entries equal to zero.
    pub n_zeros: usize,
    /// Smallest observed value.
    pub min: f64,
    /// Largest observed value.
    pub max: f64,
    /// Index of the first non-zero observation.
    pub first_nonzero: Option<usize>,
    /// Index of the last non-zero observation.
    pub last_nonzero: Option<usize>,
}

impl SeriesProfile {
    /// Profile a series with `None` marking missing entries.
    pub fn scan(values: &[Option<f64>]) -> Self {
        Self::from_observations(
            values.len(),
            values
                .iter()
                .enumerate()
                .filter_map(|(i, v)| v.map(|x| (i, x))),
        )
    }

    /// Profile a NaN-coded series (the transform surface's convention).
    pub fn scan_nan(values: &[f64]) -> Self {
        Self::from_observations(
            values.len(),
            values
                .iter()
                .enumerate()
                .filter(|(_, v)| !v.is_nan())
                .map(|(i, &v)| (i, v)),
        )
    }

    fn from_observations(len: usize, observations: impl Iterator<Item = (usize, f64)>) -> Self {
        let mut profile = Self {
            len,
            min: f64::INFINITY,
            max: f64::NEG_INFINITY,
            ..Self::default()
        };
        for (i, v) in observations {
            profile.n_observed += 1;
            profile.min = profile.min.min(v);
            profile.max = profile.max.max(v);
            if v == 0.0 {
                profile.n_zeros += 1;
            } else {
                if profile.first_nonzero.is_none() {
                    profile.first_nonzero = Some(i);
                }
                profile.last_nonzero = Some(i);
            }
        }
        profile.n_missing = len - profile.n_observed;
        profile
    }

    /// Whether the observed values have no spread. Fewer than two
    /// observations count as constant.
    pub fn is_constant(&self) -> bool {
        self.n_observed < 2 || (self.max - self.min).abs() < f64::EPSILON
    }

    /// Whether fewer than `min_length` entries were observed.
    pub fn is_short(&self, min_length: usize) -> bool {
        self.n_observed < min_length
    }

    /// Index range spanning the first through last non-zero observation;
    /// empty when the series never leaves zero.
    pub fn active_range(&self) -> std::ops::Range<usize> {
        match (self.first_nonzero, self.last_nonzero) {
            (Some(first), Some(last)) => first..last + 1,
            _ => 0..0,
        }
    }
}

/// Whether all observed values are equal within epsilon.
pub fn is_constant(values: &[Option<f64>]) -> bool {
    SeriesProfile::scan(values).is_constant()
}

/// Whether the series has fewer than `min_length` observed values.
pub fn is_short(values: &[Option<f64>], min_length: usize) -> bool {
    SeriesProfile::scan(values).is_short(min_length)
}

/// Indices of series that are not constant.
pub fn filter_constant(series_list: &[Vec<Option<f64>>]) -> Vec<usize> {
    series_list
        .iter()
        .enumerate()
        .filter(|(_, s)| !SeriesProfile::scan(s).is_constant())
        .map(|(i, _)| i)
        .collect()
}

/// Indices of series with at least `min_length` observed values.
pub fn filter_short(series_list: &[Vec<Option<f64>>], min_length: usize) -> Vec<usize> {
    series_list
        .iter()
        .enumerate()
        .filter(|(_, s)| !SeriesProfile::scan(s).is_short(min_length))
        .map(|(i, _)| i)
        .collect()
}

/// Drop everything before the first non-zero observation; a series that
/// never leaves zero trims to empty.
pub fn drop_leading_zeros(values: &[Option<f64>]) -> Vec<Option<f64>> {
    match SeriesProfile::scan(values).first_nonzero {
        Some(first) => values[first..].to_vec(),
        None => Vec::new(),
    }
}

/// Drop everything after the last non-zero observation; a series that
/// never leaves zero trims to empty.
pub fn drop_trailing_zeros(values: &[Option<f64>]) -> Vec<Option<f64>> {
    match SeriesProfile::scan(values).last_nonzero {
        Some(last) => values[..=last].to_vec(),
        None => Vec::new(),
    }
}

/// Trim zeros from both edges in one profile pass.
pub fn drop_edge_zeros(values: &[Option<f64>]) -> Vec<Option<f64>> {
    values[SeriesProfile::scan(values).active_range()].to_vec()
}

/// First-order differences over consecutive observed pairs; a pair with
/// a missing side yields missing.
pub fn diff(values: &[Option<f64>]) -> Vec<Option<f64>> {
    values
        .windows(2)
        .map(|w| match (w[0], w[1]) {
            (Some(a), Some(b)) => Some(b - a),
            _ => None,
        })
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_profile_counts() {
        let values = vec![Some(0.0), None, Some(2.0), Some(0.0), Some(-1.0)];
        let profile = SeriesProfile::scan(&values);
        assert_eq!(profile.len, 5);
        assert_eq!(profile.n_observed, 4);
        assert_eq!(profile.n_missing, 1);
        assert_eq!(profile.n_zeros, 2);
        assert_eq!(profile.first_nonzero, Some(2));
        assert_eq!(profile.last_nonzero, Some(4));
        assert_eq!(profile.min, -1.0);
        assert_eq!(profile.max, 2.0);
    }

    #[test]
    fn test_profile_nan_convention_matches_option() {
        let with_nones = vec![Some(1.0), None, Some(3.0)];
        let with_nans = [1.0, f64::NAN, 3.0];
        let a = SeriesProfile::scan(&with_nones);
        let b = SeriesProfile::scan_nan(&with_nans);
        assert_eq!(a.n_observed, b.n_observed);
        assert_eq!(a.n_missing, b.n_missing);
        assert_eq!(a.min, b.min);
        assert_eq!(a.max, b.max);
    }

    #[test]
    fn test_is_constant() {
        assert!(is_constant(&[Some(5.0), Some(5.0), None, Some(5.0)]));
        assert!(!is_constant(&[Some(1.0), Some(2.0)]));
        assert!(is_constant(&[Some(1.0)]));
        assert!(is_constant(&[]));
    }

    #[test]
    fn test_is_short() {
        assert!(is_short(&[Some(1.0), None, Some(2.0)], 3));
        assert!(!is_short(&[Some(1.0), Some(2.0), Some(3.0)], 3));
    }

    #[test]
    fn test_drop_edge_zeros() {
        let values = vec![Some(0.0), Some(0.0), Some(1.0), Some(2.0), Some(0.0)];
        assert_eq!(drop_edge_zeros(&values), vec![Some(1.0), Some(2.0)]);
    }

    #[test]
    fn test_interior_zeros_survive_trimming() {
        let values = vec![Some(0.0), Some(1.0), Some(0.0), Some(2.0), Some(0.0)];
        assert_eq!(
            drop_edge_zeros(&values),
            vec![Some(1.0), Some(0.0), Some(2.0)]
        );
    }

    #[test]
    fn test_drop_all_zeros() {
        let values = vec![Some(0.0), Some(0.0)];
        assert!(drop_edge_zeros(&values).is_empty());
        assert!(drop_leading_zeros(&values).is_empty());
        assert!(drop_trailing_zeros(&values).is_empty());
    }

    #[test]
    fn test_diff() {
        let values = vec![Some(1.0), Some(4.0), None, Some(9.0)];
        assert_eq!(diff(&values), vec![Some(3.0), None, None]);
    }

    #[test]
    fn test_filters() {
        let series = vec![
            vec![Some(1.0), Some(1.0)],
            vec![Some(1.0), Some(2.0), Some(3.0)],
        ];
        assert_eq!(filter_constant(&series), vec![1]);
        assert_eq!(filter_short(&series, 3), vec![1]);
    }
}
