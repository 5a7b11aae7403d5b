//! Missing value imputation.
//!
//! Every fill strategy is expressed over the gap structure of the
//! series: one pass collects the observed anchors (index, value), then a
//! single engine walks consecutive anchor pairs and applies the
//! strategy's rule for interior gaps and for the unanchored edges.
//! Missing values are `None` on this surface, per the crate's ingestion
//! convention.

/// What a gap between two observed anchors receives.
#[derive(Debug, Clone, Copy)]
enum GapRule {
    /// A fixed constant everywhere, edges included.
    Constant(f64),
    /// The anchor on the left; the leading edge stays missing.
    Previous,
    /// The anchor on the right; the trailing edge stays missing.
    Next,
    /// The mean of all observed values, edges included.
    Mean,
    /// A linear ramp between the flanking anchors; edges take the
    /// nearest anchor value.
    Interpolate,
}

/// Observed entries as (index, value) anchors.
fn observed_anchors(values: &[Option<f64>]) -> Vec<(usize, f64)> {
    values
        .iter()
        .enumerate()
        .filter_map(|(i, v)| v.map(|x| (i, x)))
        .collect()
}

/// Core fill engine: anchors stay as observed, gaps follow the rule.
fn fill_by_rule(values: &[Option<f64>], rule: GapRule) -> Vec<Option<f64>> {
    let mut out: Vec<Option<f64>> = vec![None; values.len()];
    let anchors = observed_anchors(values);

    let Some(&(first_idx, first_value)) = anchors.first() else {
        // Nothing observed: only a constant can say anything.
        if let GapRule::Constant(c) = rule {
            out.iter_mut().for_each(|slot| *slot = Some(c));
        }
        return out;
    };
    let &(last_idx, last_value) = anchors.last().expect("non-empty above");

    let mean = match rule {
        GapRule::Mean => {
            anchors.iter().map(|&(_, v)| v).sum::<f64>() / anchors.len() as f64
        }
        _ => f64::NAN,
    };

    for &(i, v) in &anchors {
        out[i] = Some(v);
    }

    // Unanchored edges.
    let leading = match rule {
        GapRule::Constant(c) => Some(c),
        GapRule::Previous => None,
        GapRule::Next | GapRule::Interpolate => Some(first_value),
        GapRule::Mean => Some(mean),
    };
    let trailing = match rule {
        GapRule::Constant(c) => Some(c),
        GapRule::Next => None,
        GapRule::Previous | GapRule::Interpolate => Some(last_value),
        GapRule::Mean => Some(mean),
    };
    for slot in out.iter_mut().take(first_idx) {
        *slot = leading;
    }
    for slot in out.iter_mut().skip(last_idx + 1) {
        *slot = trailing;
    }

    // Interior gaps between consecutive anchors.
    for pair in anchors.windows(2) {
        let (left_idx, left_value) = pair[0];
        let (right_idx, right_value) = pair[1];
        let gap = right_idx - left_idx;
        if gap < 2 {
            continue;
        }
        for offset in 1..gap {
            out[left_idx + offset] = Some(match rule {
                GapRule::Constant(c) => c,
                GapRule::Previous => left_value,
                GapRule::Next => right_value,
                GapRule::Mean => mean,
                GapRule::Interpolate => {
                    left_value + (right_value - left_value) * offset as f64 / gap as f64
                }
            });
        }
    }

    out
}

/// Fill NULL values with a constant.
pub fn fill_nulls_const(values: &[Option<f64>], fill_value: f64) -> Vec<f64> {
    fill_by_rule(values, GapRule::Constant(fill_value))
        .into_iter()
        .map(|v| v.unwrap_or(fill_value))
        .collect()
}

/// Fill NULL values with the last observed value (forward fill). The
/// leading gap stays missing.
pub fn fill_nulls_forward(values: &[Option<f64>]) -> Vec<Option<f64>> {
    fill_by_rule(values, GapRule::Previous)
}

/// Fill NULL values with the next observed value (backward fill). The
/// trailing gap stays missing.
pub fn fill_nulls_backward(values: &[Option<f64>]) -> Vec<Option<f64>> {
    fill_by_rule(values, GapRule::Next)
}

/// Fill NULL values with the mean of the observed values. A series with
/// nothing observed comes back all NaN.
pub fn fill_nulls_mean(values: &[Option<f64>]) -> Vec<f64> {
    fill_by_rule(values, GapRule::Mean)
        .into_iter()
        .map(|v| v.unwrap_or(f64::NAN))
        .collect()
}

/// Fill NULL values by linear interpolation between the flanking
/// anchors; edges take the nearest observed value. A series with nothing
/// observed comes back all NaN.
pub fn fill_nulls_interpolate(values: &[Option<f64>]) -> Vec<f64> {
    fill_by_rule(values, GapRule::Interpolate)
        .into_iter()
        .map(|v| v.unwrap_or(f64::NAN))
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use approx::assert_relative_eq;

    #[test]
    fn test_fill_nulls_const() {
        let values = vec![Some(1.0), None, Some(3.0), None];
        assert_eq!(fill_nulls_const(&values, 0.0), vec![1.0, 0.0, 3.0, 0.0]);
    }

    #[test]
    fn test_fill_nulls_forward() {
        let values = vec![Some(1.0), None, None, Some(4.0), None];
        assert_eq!(
            fill_nulls_forward(&values),
            vec![Some(1.0), Some(1.0), Some(1.0), Some(4.0), Some(4.0)]
        );
    }

    #[test]
    fn test_forward_keeps_leading_gap() {
        let values = vec![None, None, Some(3.0)];
        assert_eq!(fill_nulls_forward(&values), vec![None, None, Some(3.0)]);
    }

    #[test]
    fn test_fill_nulls_backward() {
        let values = vec![None, Some(2.0), None, Some(4.0), None];
        assert_eq!(
            fill_nulls_backward(&values),
            vec![Some(2.0), Some(2.0), Some(4.0), Some(4.0), None]
        );
    }

    #[test]
    fn test_fill_nulls_mean() {
        let values = vec![Some(1.0), None, Some(3.0), None, Some(5.0)];
        let result = fill_nulls_mean(&values);
        assert_relative_eq!(result[1], 3.0);
        assert_relative_eq!(result[3], 3.0);
    }

    #[test]
    fn test_fill_nulls_interpolate() {
        let values = vec![Some(1.0), None, None, Some(4.0)];
        let result = fill_nulls_interpolate(&values);
        assert_relative_eq!(result[1], 2.0, epsilon = 1e-12);
        assert_relative_eq!(result[2], 3.0, epsilon = 1e-12);
    }

    #[test]
    fn test_interpolate_extends_edges() {
        let values = vec![None, Some(2.0), Some(4.0), None];
        let result = fill_nulls_interpolate(&values);
        assert_relative_eq!(result[0], 2.0);
        assert_relative_eq!(result[3], 4.0);
    }

    #[test]
    fn test_interpolate_all_null() {
        let values = vec![None, None];
        let result = fill_nulls_interpolate(&values);
        assert!(result.iter().all(|v| v.is_nan()));
    }

    #[test]
    fn test_const_fills_fully_missing_series() {
        let values = vec![None, None, None];
        assert_eq!(fill_nulls_const(&values, 7.0), vec![7.0, 7.0, 7.0]);
    }

    #[test]
    fn test_multi_gap_interpolation() {
        let values = vec![Some(0.0), None, Some(10.0), None, None, Some(4.0)];
        let result = fill_nulls_interpolate(&values);
        assert_relative_eq!(result[1], 5.0, epsilon = 1e-12);
        assert_relative_eq!(result[3], 8.0, epsilon = 1e-12);
        assert_relative_eq!(result[4], 6.0, epsilon = 1e-12);
    }
}
