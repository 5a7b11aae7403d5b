//! Regression primitives: polynomial least squares and robust fits.

use faer::prelude::*;
use faer::Mat;

use crate::error::{ForecastError, Result};
use crate::numeric;

/// A fitted polynomial trend.
#[derive(Debug, Clone)]
pub struct PolyFit {
    /// Coefficients in ascending order: c0 + c1·x + c2·x² + …
    pub coefficients: Vec<f64>,
    /// Fitted values at x = 0..n.
    pub fitted: Vec<f64>,
    /// Residual sum of squares.
    pub rss: f64,
}

impl PolyFit {
    /// Evaluate the polynomial at an arbitrary x.
    pub fn eval(&self, x: f64) -> f64 {
        let mut acc = 0.0;
        let mut pow = 1.0;
        for c in &self.coefficients {
            acc += c * pow;
            pow *= x;
        }
        acc
    }
}

/// Least-squares polynomial fit of `y` on x = 0, 1, …, n−1.
///
/// The design matrix uses centered and scaled x to keep the normal
/// equations well conditioned at the cubic degree the auto detrender asks
/// for; coefficients are mapped back to the raw axis before returning.
pub fn polyfit(y: &[f64], degree: usize) -> Result<PolyFit> {
    let n = y.len();
    if n < degree + 2 {
        return Err(ForecastError::InsufficientData {
            needed: degree + 2,
            got: n,
        });
    }

    let k = degree + 1;
    let mid = (n - 1) as f64 / 2.0;
    let scale = ((n - 1) as f64 / 2.0).max(1.0);

    let x_mat = Mat::from_fn(n, k, |i, j| {
        let t = (i as f64 - mid) / scale;
        t.powi(j as i32)
    });
    let y_col = Mat::from_fn(n, 1, |i, _| y[i]);

    // Small k: solve the normal equations with an LU factorization.
    let xtx = x_mat.transpose() * &x_mat;
    let xty = x_mat.transpose() * &y_col;
    let beta = xtx.partial_piv_lu().solve(&xty);

    let mut fitted = Vec::with_capacity(n);
    for i in 0..n {
        let t = (i as f64 - mid) / scale;
        let mut acc = 0.0;
        let mut pow = 1.0;
        for j in 0..k {
            acc += beta[(j, 0)] * pow;
            pow *= t;
        }
        fitted.push(acc);
    }

    if !numeric::all_finite(&fitted) {
        return Err(ForecastError::Degenerate(
            "singular polynomial design matrix".to_string(),
        ));
    }

    let rss: f64 = y
        .iter()
        .zip(fitted.iter())
        .map(|(a, f)| (a - f) * (a - f))
        .sum();

    // Expand the scaled basis back to raw-x coefficients via binomial
    // expansion of ((x - mid)/scale)^j.
    let betas: Vec<f64> = (0..k).map(|j| beta[(j, 0)]).collect();
    let mut coefficients = vec![0.0; k];
    for (j, &b) in betas.iter().enumerate() {
        let mut term = vec![0.0; j + 1];
        term[0] = 1.0;
        // Multiply out (x - mid)^j incrementally.
        for _ in 0..j {
            let mut next = vec![0.0; term.len() + 1];
            for (p, &c) in term.iter().enumerate() {
                next[p + 1] += c;
                next[p] += c * (-mid);
            }
            term = next;
        }
        let denom = scale.powi(j as i32);
        for (p, &c) in term.iter().enumerate() {
            coefficients[p] += b * c / denom;
        }
    }

    Ok(PolyFit {
        coefficients,
        fitted,
        rss,
    })
}

/// Ordinary least squares of `y` on caller-supplied regressor columns,
/// with an intercept. Returns `(coefficients, fitted)` where
/// `coefficients[0]` is the intercept.
pub fn ols(y: &[f64], regressors: &[Vec<f64>]) -> Result<(Vec<f64>, Vec<f64>)> {
    let n = y.len();
    let k = regressors.len();
    if n == 0 {
        return Err(ForecastError::InsufficientData { needed: 1, got: 0 });
    }
    for (idx, col) in regressors.iter().enumerate() {
        if col.len() != n {
            return Err(ForecastError::InvalidInput(format!(
                "Regressor {} has {} values but expected {}",
                idx,
                col.len(),
                n
            )));
        }
    }

    let x_mat = Mat::from_fn(n, k + 1, |i, j| if j == 0 { 1.0 } else { regressors[j - 1][i] });
    let y_col = Mat::from_fn(n, 1, |i, _| y[i]);

    let xtx = x_mat.transpose() * &x_mat;
    let xty = x_mat.transpose() * &y_col;
    let beta = xtx.partial_piv_lu().solve(&xty);

    let mut coeffs = Vec::with_capacity(k + 1);
    for j in 0..(k + 1) {
        coeffs.push(beta[(j, 0)]);
    }
    if !numeric::all_finite(&coeffs) {
        return Err(ForecastError::Degenerate(
            "singular regression design matrix".to_string(),
        ));
    }

    let fitted: Vec<f64> = (0..n)
        .map(|i| {
            let mut acc = coeffs[0];
            for j in 0..k {
                acc += coeffs[j + 1] * regressors[j][i];
            }
            acc
        })
        .collect();

    Ok((coeffs, fitted))
}

/// Slope and intercept of a simple linear regression on x = 0..n.
pub fn linear_trend(y: &[f64]) -> Result<(f64, f64)> {
    let fit = polyfit(y, 1)?;
    Ok((fit.coefficients[1], fit.coefficients[0]))
}

/// Siegel repeated-medians robust line.
///
/// slope = median over i of median over j≠i of pairwise slopes;
/// intercept = median over i of y_i − slope·x_i. Resists up to 50%
/// outliers at O(n² log n) cost.
pub fn siegel_repeated_medians(y: &[f64]) -> Result<(f64, f64)> {
    let n = y.len();
    if n < 2 {
        return Err(ForecastError::InsufficientData { needed: 2, got: n });
    }

    let mut inner = Vec::with_capacity(n - 1);
    let mut slopes = Vec::with_capacity(n);
    for i in 0..n {
        inner.clear();
        for j in 0..n {
            if j == i {
                continue;
            }
            inner.push((y[j] - y[i]) / (j as f64 - i as f64));
        }
        slopes.push(numeric::median_in_place(&mut inner));
    }
    let slope = numeric::median_in_place(&mut slopes);

    let mut intercepts: Vec<f64> = y
        .iter()
        .enumerate()
        .map(|(i, &v)| v - slope * i as f64)
        .collect();
    let intercept = numeric::median_in_place(&mut intercepts);

    Ok((slope, intercept))
}

#[cfg(test)]
mod tests {
    use super::*;
    use approx::assert_relative_eq;

    #[test]
    fn test_polyfit_linear() {
        let y: Vec<f64> = (0..20).map(|i| 3.0 + 2.0 * i as f64).collect();
        let fit = polyfit(&y, 1).unwrap();
        assert_relative_eq!(fit.coefficients[0], 3.0, epsilon = 1e-8);
        assert_relative_eq!(fit.coefficients[1], 2.0, epsilon = 1e-8);
        assert!(fit.rss < 1e-12);
    }

    #[test]
    fn test_polyfit_quadratic() {
        let y: Vec<f64> = (0..30)
            .map(|i| {
                let x = i as f64;
                1.0 - 0.5 * x + 0.25 * x * x
            })
            .collect();
        let fit = polyfit(&y, 2).unwrap();
        assert_relative_eq!(fit.coefficients[2], 0.25, epsilon = 1e-6);
        assert_relative_eq!(fit.eval(10.0), y[10], epsilon = 1e-6);
    }

    #[test]
    fn test_ols_with_regressor() {
        let x = vec![vec![0.0, 1.0, 2.0, 3.0, 4.0]];
        let y = vec![1.0, 3.0, 5.0, 7.0, 9.0];
        let (coeffs, fitted) = ols(&y, &x).unwrap();
        assert_relative_eq!(coeffs[0], 1.0, epsilon = 1e-8);
        assert_relative_eq!(coeffs[1], 2.0, epsilon = 1e-8);
        assert_relative_eq!(fitted[4], 9.0, epsilon = 1e-8);
    }

    #[test]
    fn test_siegel_ignores_outliers() {
        let mut y: Vec<f64> = (0..21).map(|i| 5.0 + 1.5 * i as f64).collect();
        y[3] = 500.0;
        y[15] = -400.0;
        let (slope, intercept) = siegel_repeated_medians(&y).unwrap();
        assert_relative_eq!(slope, 1.5, epsilon = 1e-9);
        assert_relative_eq!(intercept, 5.0, epsilon = 1e-9);
    }

    #[test]
    fn test_polyfit_insufficient() {
        assert!(polyfit(&[1.0, 2.0], 2).is_err());
    }
}
