//! Optimizers: bounded L-BFGS and Nelder–Mead.
//!
//! Both are value types with no state across calls. The L-BFGS variant
//! handles box constraints by projecting iterates into the bounds and
//! zeroing gradient components that push against an active bound; it is
//! used for the smooth ETS likelihood. Nelder–Mead is the derivative-free
//! fallback for non-smooth objectives (Theta MSE, SES alpha search).

use crate::error::{ForecastError, Result};

/// Objective returning value and gradient at a point.
pub trait GradObjective {
    fn eval(&mut self, x: &[f64]) -> (f64, Vec<f64>);
}

impl<F> GradObjective for F
where
    F: FnMut(&[f64]) -> (f64, Vec<f64>),
{
    fn eval(&mut self, x: &[f64]) -> (f64, Vec<f64>) {
        self(x)
    }
}

/// Options for the bounded L-BFGS solver.
#[derive(Debug, Clone)]
pub struct LbfgsOptions {
    /// Hard iteration cap.
    pub max_iterations: usize,
    /// Convergence threshold on the projected gradient norm.
    pub gradient_tolerance: f64,
    /// Convergence threshold on relative objective decrease.
    pub function_tolerance: f64,
    /// History depth for the two-loop recursion.
    pub memory: usize,
}

impl Default for LbfgsOptions {
    fn default() -> Self {
        Self {
            max_iterations: 200,
            gradient_tolerance: 1e-6,
            function_tolerance: 1e-10,
            memory: 8,
        }
    }
}

/// Outcome of an optimizer run.
#[derive(Debug, Clone)]
pub struct OptimResult {
    /// Best point found (within bounds).
    pub x: Vec<f64>,
    /// Objective value at `x`.
    pub f: f64,
    /// Iterations performed.
    pub iterations: usize,
    /// Whether a convergence criterion was met before the cap.
    pub converged: bool,
    /// Human-readable stop reason.
    pub message: String,
}

/// Minimize a smooth objective subject to box constraints.
///
/// Returns best-so-far with `converged: false` when the iteration cap is
/// reached; fails with `NumericalFailure` when the objective turns
/// non-finite or the line search cannot make progress from the very first
/// iterate.
pub fn lbfgs_minimize(
    objective: &mut dyn GradObjective,
    x0: &[f64],
    lower: &[f64],
    upper: &[f64],
    options: &LbfgsOptions,
) -> Result<OptimResult> {
    let dim = x0.len();
    if lower.len() != dim || upper.len() != dim {
        return Err(ForecastError::InvalidInput(
            "bounds must match the dimension of x0".to_string(),
        ));
    }

    let project = |x: &mut [f64]| {
        for ((v, lo), hi) in x.iter_mut().zip(lower.iter()).zip(upper.iter()) {
            *v = v.clamp(*lo, *hi);
        }
    };

    let mut x = x0.to_vec();
    project(&mut x);

    let (mut f, mut grad) = objective.eval(&x);
    if !f.is_finite() || grad.iter().any(|g| !g.is_finite()) {
        return Err(ForecastError::NumericalFailure(
            "objective or gradient non-finite at the initial point".to_string(),
        ));
    }

    // Projected-gradient treatment of active bounds.
    let mask_active = |x: &[f64], grad: &mut [f64]| {
        for i in 0..grad.len() {
            let at_lower = (x[i] - lower[i]).abs() < 1e-12 && grad[i] > 0.0;
            let at_upper = (upper[i] - x[i]).abs() < 1e-12 && grad[i] < 0.0;
            if at_lower || at_upper {
                grad[i] = 0.0;
            }
        }
    };
    mask_active(&x, &mut grad);

    let mut s_hist: Vec<Vec<f64>> = Vec::with_capacity(options.memory);
    let mut y_hist: Vec<Vec<f64>> = Vec::with_capacity(options.memory);
    let mut rho_hist: Vec<f64> = Vec::with_capacity(options.memory);

    let mut iterations = 0;
    for iter in 0..options.max_iterations {
        iterations = iter + 1;

        let gnorm = norm(&grad);
        if gnorm < options.gradient_tolerance {
            return Ok(OptimResult {
                x,
                f,
                iterations,
                converged: true,
                message: "gradient norm below tolerance".to_string(),
            });
        }

        // Two-loop recursion for the search direction.
        let mut direction = grad.clone();
        let mut alphas = vec![0.0; s_hist.len()];
        for k in (0..s_hist.len()).rev() {
            let a = rho_hist[k] * dot(&s_hist[k], &direction);
            alphas[k] = a;
            axpy(-a, &y_hist[k], &mut direction);
        }
        if let (Some(s), Some(y)) = (s_hist.last(), y_hist.last()) {
            let scale = dot(s, y) / dot(y, y).max(1e-300);
            direction.iter_mut().for_each(|d| *d *= scale);
        }
        for k in 0..s_hist.len() {
            let b = rho_hist[k] * dot(&y_hist[k], &direction);
            axpy(alphas[k] - b, &s_hist[k], &mut direction);
        }
        direction.iter_mut().for_each(|d| *d = -*d);

        // Ensure descent; otherwise restart with steepest descent.
        if dot(&direction, &grad) >= 0.0 {
            direction.clone_from(&grad);
            direction.iter_mut().for_each(|d| *d = -*d);
            s_hist.clear();
            y_hist.clear();
            rho_hist.clear();
        }

        // Backtracking line search with projection.
        let mut step = 1.0;
        let slope = dot(&direction, &grad);
        let mut found = false;
        let mut x_new = x.clone();
        let mut f_new = f;
        let mut g_new = grad.clone();
        for _ in 0..40 {
            for i in 0..dim {
                x_new[i] = x[i] + step * direction[i];
            }
            project(&mut x_new);
            let (ft, gt) = objective.eval(&x_new);
            if ft.is_finite() && ft <= f + 1e-4 * step * slope {
                f_new = ft;
                g_new = gt;
                found = true;
                break;
            }
            step *= 0.5;
        }

        if !found {
            // No reduction along the direction. Best-so-far is still a
            // usable answer unless we never moved at all.
            if iter == 0 {
                return Err(ForecastError::NumericalFailure(
                    "line search failed to reduce the objective".to_string(),
                ));
            }
            return Ok(OptimResult {
                x,
                f,
                iterations,
                converged: false,
                message: "no progress in line search".to_string(),
            });
        }
        if g_new.iter().any(|g| !g.is_finite()) {
            return Err(ForecastError::NumericalFailure(
                "gradient non-finite during optimization".to_string(),
            ));
        }

        let f_decrease = (f - f_new).abs() / f.abs().max(1.0);
        let mut s_vec = vec![0.0; dim];
        let mut y_vec = vec![0.0; dim];
        for i in 0..dim {
            s_vec[i] = x_new[i] - x[i];
            y_vec[i] = g_new[i] - grad[i];
        }

        x = x_new.clone();
        f = f_new;
        grad = g_new;
        mask_active(&x, &mut grad);

        let sy = dot(&s_vec, &y_vec);
        if sy > 1e-10 {
            if s_hist.len() == options.memory {
                s_hist.remove(0);
                y_hist.remove(0);
                rho_hist.remove(0);
            }
            rho_hist.push(1.0 / sy);
            s_hist.push(s_vec);
            y_hist.push(y_vec);
        }

        if f_decrease < options.function_tolerance {
            return Ok(OptimResult {
                x,
                f,
                iterations,
                converged: true,
                message: "objective decrease below tolerance".to_string(),
            });
        }
    }

    log::debug!("lbfgs hit the iteration cap at f = {f}");
    Ok(OptimResult {
        x,
        f,
        iterations,
        converged: false,
        message: "iteration cap reached".to_string(),
    })
}

/// Adapts a value-only objective into a gradient objective via forward
/// differences with the parameter-adaptive step `max(1e-8, 1e-4·|x|)`.
/// The probe buffer is reused across evaluations.
pub struct NumericalGradient<F> {
    objective: F,
    probe: Vec<f64>,
}

impl<F: FnMut(&[f64]) -> f64> NumericalGradient<F> {
    pub fn new(objective: F) -> Self {
        Self {
            objective,
            probe: Vec::new(),
        }
    }
}

impl<F: FnMut(&[f64]) -> f64> GradObjective for NumericalGradient<F> {
    fn eval(&mut self, x: &[f64]) -> (f64, Vec<f64>) {
        let base = (self.objective)(x);
        self.probe.clear();
        self.probe.extend_from_slice(x);
        let mut grad = vec![0.0; x.len()];
        for i in 0..x.len() {
            let h = (1e-4 * x[i].abs()).max(1e-8);
            self.probe[i] = x[i] + h;
            grad[i] = ((self.objective)(&self.probe) - base) / h;
            self.probe[i] = x[i];
        }
        (base, grad)
    }
}

/// Options for the Nelder–Mead solver.
#[derive(Debug, Clone)]
pub struct NelderMeadOptions {
    /// Hard iteration cap.
    pub max_iterations: usize,
    /// Convergence threshold on the simplex function spread.
    pub tolerance: f64,
    /// Initial perturbation along each axis when building the simplex.
    pub step: f64,
}

impl Default for NelderMeadOptions {
    fn default() -> Self {
        Self {
            max_iterations: 400,
            tolerance: 1e-8,
            step: 0.1,
        }
    }
}

/// Minimize a (possibly non-smooth) objective with the Nelder–Mead
/// simplex. Candidates are clamped into `[lower, upper]` before every
/// evaluation.
pub fn nelder_mead_minimize(
    mut objective: impl FnMut(&[f64]) -> f64,
    x0: &[f64],
    lower: &[f64],
    upper: &[f64],
    options: &NelderMeadOptions,
) -> Result<OptimResult> {
    const ALPHA: f64 = 1.0; // reflection
    const GAMMA: f64 = 2.0; // expansion
    const RHO: f64 = 0.5; // contraction
    const SIGMA: f64 = 0.5; // shrink

    let dim = x0.len();
    if dim == 0 {
        return Err(ForecastError::InvalidInput(
            "cannot optimize a zero-dimensional point".to_string(),
        ));
    }
    if lower.len() != dim || upper.len() != dim {
        return Err(ForecastError::InvalidInput(
            "bounds must match the dimension of x0".to_string(),
        ));
    }

    let clamp = |x: &mut Vec<f64>| {
        for ((v, lo), hi) in x.iter_mut().zip(lower.iter()).zip(upper.iter()) {
            *v = v.clamp(*lo, *hi);
        }
    };

    // Initial simplex: x0 perturbed along each axis.
    let mut simplex: Vec<Vec<f64>> = Vec::with_capacity(dim + 1);
    let mut start = x0.to_vec();
    clamp(&mut start);
    simplex.push(start.clone());
    for i in 0..dim {
        let mut v = start.clone();
        let span = upper[i] - lower[i];
        let delta = if span.is_finite() && span > 0.0 {
            options.step * span
        } else {
            options.step * v[i].abs().max(1.0)
        };
        v[i] += delta;
        clamp(&mut v);
        if (v[i] - start[i]).abs() < f64::EPSILON {
            v[i] = (start[i] - delta).clamp(lower[i], upper[i]);
        }
        simplex.push(v);
    }

    let mut values: Vec<f64> = simplex.iter().map(|p| objective(p)).collect();

    let mut iterations = 0;
    for iter in 0..options.max_iterations {
        iterations = iter + 1;

        // Order simplex by objective value.
        let mut order: Vec<usize> = (0..simplex.len()).collect();
        order.sort_by(|&a, &b| {
            values[a]
                .partial_cmp(&values[b])
                .unwrap_or(std::cmp::Ordering::Equal)
        });
        let simplex_sorted: Vec<Vec<f64>> = order.iter().map(|&i| simplex[i].clone()).collect();
        let values_sorted: Vec<f64> = order.iter().map(|&i| values[i]).collect();
        simplex = simplex_sorted;
        values = values_sorted;

        let f_best = values[0];
        let f_mean = values.iter().sum::<f64>() / values.len() as f64;
        let spread = values
            .iter()
            .map(|v| (v - f_mean).abs())
            .fold(0.0_f64, f64::max);
        if spread < options.tolerance {
            return Ok(OptimResult {
                x: simplex[0].clone(),
                f: f_best,
                iterations,
                converged: true,
                message: "simplex spread below tolerance".to_string(),
            });
        }

        // Centroid of all but the worst vertex.
        let worst = simplex.len() - 1;
        let mut centroid = vec![0.0; dim];
        for p in simplex.iter().take(worst) {
            for (c, v) in centroid.iter_mut().zip(p.iter()) {
                *c += v;
            }
        }
        centroid.iter_mut().for_each(|c| *c /= worst as f64);

        let blend = |a: f64, from: &[f64], to: &[f64]| -> Vec<f64> {
            let mut p: Vec<f64> = from
                .iter()
                .zip(to.iter())
                .map(|(f, t)| f + a * (f - t))
                .collect();
            clamp(&mut p);
            p
        };

        let reflected = blend(ALPHA, &centroid, &simplex[worst]);
        let f_reflected = objective(&reflected);

        if f_reflected < values[0] {
            let expanded = blend(GAMMA, &centroid, &simplex[worst]);
            let f_expanded = objective(&expanded);
            if f_expanded < f_reflected {
                simplex[worst] = expanded;
                values[worst] = f_expanded;
            } else {
                simplex[worst] = reflected;
                values[worst] = f_reflected;
            }
            continue;
        }

        if f_reflected < values[worst - 1] {
            simplex[worst] = reflected;
            values[worst] = f_reflected;
            continue;
        }

        // Contraction toward the centroid.
        let mut contracted: Vec<f64> = centroid
            .iter()
            .zip(simplex[worst].iter())
            .map(|(c, w)| c + RHO * (w - c))
            .collect();
        clamp(&mut contracted);
        let f_contracted = objective(&contracted);
        if f_contracted < values[worst] {
            simplex[worst] = contracted;
            values[worst] = f_contracted;
            continue;
        }

        // Shrink everything toward the best vertex.
        let best = simplex[0].clone();
        for i in 1..simplex.len() {
            for (v, b) in simplex[i].iter_mut().zip(best.iter()) {
                *v = b + SIGMA * (*v - b);
            }
            clamp(&mut simplex[i]);
            values[i] = objective(&simplex[i]);
        }
    }

    let best_idx = values
        .iter()
        .enumerate()
        .min_by(|a, b| a.1.partial_cmp(b.1).unwrap_or(std::cmp::Ordering::Equal))
        .map(|(i, _)| i)
        .unwrap_or(0);

    Ok(OptimResult {
        x: simplex[best_idx].clone(),
        f: values[best_idx],
        iterations,
        converged: false,
        message: "iteration cap reached".to_string(),
    })
}

#[inline]
fn dot(a: &[f64], b: &[f64]) -> f64 {
    a.iter().zip(b.iter()).map(|(x, y)| x * y).sum()
}

#[inline]
fn norm(a: &[f64]) -> f64 {
    dot(a, a).sqrt()
}

#[inline]
fn axpy(a: f64, x: &[f64], y: &mut [f64]) {
    for (yi, xi) in y.iter_mut().zip(x.iter()) {
        *yi += a * xi;
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use approx::assert_relative_eq;

    #[test]
    fn test_lbfgs_quadratic_bowl() {
        let mut obj = |x: &[f64]| {
            let f = (x[0] - 3.0).powi(2) + 2.0 * (x[1] + 1.0).powi(2);
            let g = vec![2.0 * (x[0] - 3.0), 4.0 * (x[1] + 1.0)];
            (f, g)
        };
        let result = lbfgs_minimize(
            &mut obj,
            &[0.0, 0.0],
            &[-10.0, -10.0],
            &[10.0, 10.0],
            &LbfgsOptions::default(),
        )
        .unwrap();
        assert!(result.converged);
        assert_relative_eq!(result.x[0], 3.0, epsilon = 1e-4);
        assert_relative_eq!(result.x[1], -1.0, epsilon = 1e-4);
    }

    #[test]
    fn test_lbfgs_respects_bounds() {
        let mut obj = |x: &[f64]| {
            let f = (x[0] - 5.0).powi(2);
            let g = vec![2.0 * (x[0] - 5.0)];
            (f, g)
        };
        let result =
            lbfgs_minimize(&mut obj, &[0.5], &[0.0], &[1.0], &LbfgsOptions::default()).unwrap();
        assert_relative_eq!(result.x[0], 1.0, epsilon = 1e-9);
    }

    #[test]
    fn test_lbfgs_rejects_non_finite_start() {
        let mut obj = |_: &[f64]| (f64::NAN, vec![0.0]);
        let err = lbfgs_minimize(&mut obj, &[0.0], &[-1.0], &[1.0], &LbfgsOptions::default());
        assert!(matches!(
            err,
            Err(crate::error::ForecastError::NumericalFailure(_))
        ));
    }

    #[test]
    fn test_numerical_gradient_adapter() {
        let mut adapter = NumericalGradient::new(|x: &[f64]| (x[0] - 2.0).powi(2) + x[1] * x[1]);
        let (value, grad) = adapter.eval(&[1.0, 3.0]);
        assert_relative_eq!(value, 10.0, epsilon = 1e-12);
        assert_relative_eq!(grad[0], -2.0, epsilon = 1e-3);
        assert_relative_eq!(grad[1], 6.0, epsilon = 1e-3);
    }

    #[test]
    fn test_lbfgs_with_numerical_gradients() {
        let mut adapter =
            NumericalGradient::new(|x: &[f64]| (x[0] - 0.4).powi(2) + (x[1] + 0.2).powi(2));
        let result = lbfgs_minimize(
            &mut adapter,
            &[0.0, 0.0],
            &[-1.0, -1.0],
            &[1.0, 1.0],
            &LbfgsOptions::default(),
        )
        .unwrap();
        assert_relative_eq!(result.x[0], 0.4, epsilon = 1e-3);
        assert_relative_eq!(result.x[1], -0.2, epsilon = 1e-3);
    }

    #[test]
    fn test_nelder_mead_rosenbrock_valley() {
        let obj = |x: &[f64]| (1.0 - x[0]).powi(2) + 100.0 * (x[1] - x[0] * x[0]).powi(2);
        let result = nelder_mead_minimize(
            obj,
            &[-1.0, 1.0],
            &[-5.0, -5.0],
            &[5.0, 5.0],
            &NelderMeadOptions {
                max_iterations: 2000,
                tolerance: 1e-12,
                step: 0.1,
            },
        )
        .unwrap();
        assert_relative_eq!(result.x[0], 1.0, epsilon = 1e-3);
        assert_relative_eq!(result.x[1], 1.0, epsilon = 1e-3);
    }

    #[test]
    fn test_nelder_mead_clamps_to_bounds() {
        let obj = |x: &[f64]| (x[0] - 2.0).powi(2);
        let result = nelder_mead_minimize(
            obj,
            &[0.5],
            &[0.0],
            &[1.0],
            &NelderMeadOptions::default(),
        )
        .unwrap();
        assert!(result.x[0] <= 1.0 && result.x[0] >= 0.0);
        assert_relative_eq!(result.x[0], 1.0, epsilon = 1e-6);
    }
}
