//! Hybrid Newton root finder.
//!
//! Powell's dogleg method: each iteration blends the Newton step with the
//! steepest-descent (Cauchy) step of `0.5 * ‖F‖²` inside an adaptive trust
//! region. Far from a root the method behaves like gradient descent; close to
//! it, full Newton steps are taken and convergence is quadratic.

use nalgebra::{DMatrix, DVector};

use super::SolverConfig;
use crate::error::Result;

/// A square system of nonlinear equations `F(x) = 0`.
pub trait NonlinearSystem {
    /// Evaluate `F(x)`.
    fn residual(&mut self, x: &DVector<f64>) -> Result<DVector<f64>>;

    /// Analytic Jacobian at `x`, where `fx = F(x)`.
    ///
    /// Returning `None` makes the solver fall back to forward finite
    /// differences.
    fn jacobian(&mut self, _x: &DVector<f64>, _fx: &DVector<f64>) -> Result<Option<DMatrix<f64>>> {
        Ok(None)
    }
}

/// Adapter turning a closure into a [`NonlinearSystem`] without an analytic
/// Jacobian.
pub struct FnSystem<F>(pub F);

impl<F> FnSystem<F>
where
    F: FnMut(&DVector<f64>) -> Result<DVector<f64>>,
{
    pub fn new(residual: F) -> Self {
        Self(residual)
    }
}

impl<F> NonlinearSystem for FnSystem<F>
where
    F: FnMut(&DVector<f64>) -> Result<DVector<f64>>,
{
    fn residual(&mut self, x: &DVector<f64>) -> Result<DVector<f64>> {
        (self.0)(x)
    }
}

/// Outcome of one [`hybrid_newton`] run.
#[derive(Debug, Clone)]
pub struct RootResult {
    /// Final point
    pub x: DVector<f64>,
    /// `F(x)` at the final point
    pub fun: DVector<f64>,
    /// Jacobian at the final point
    pub jacobian: DMatrix<f64>,
    pub converged: bool,
    pub iterations: usize,
}

impl RootResult {
    /// Euclidean norm of the final residual.
    pub fn residual_norm(&self) -> f64 {
        self.fun.norm()
    }
}

fn jacobian_at<S: NonlinearSystem + ?Sized>(
    system: &mut S,
    x: &DVector<f64>,
    fx: &DVector<f64>,
    config: &SolverConfig,
) -> Result<DMatrix<f64>> {
    if let Some(jac) = system.jacobian(x, fx)? {
        return Ok(jac);
    }

    let n = x.len();
    let mut jac = DMatrix::zeros(fx.len(), n);
    let mut probe = x.clone();
    for j in 0..n {
        let h = config.fd_epsilon * x[j].abs().max(1.0);
        probe[j] = x[j] + h;
        let shifted = system.residual(&probe)?;
        jac.set_column(j, &((shifted - fx) / h));
        probe[j] = x[j];
    }
    Ok(jac)
}

/// Dogleg step for the model `F + J p` within radius `delta`.
///
/// Returns the step and whether it is the full Newton step.
fn dogleg(jac: &DMatrix<f64>, fx: &DVector<f64>, delta: f64) -> (DVector<f64>, bool) {
    let newton = jac.clone().lu().solve(&(-fx)).filter(|p| p.iter().all(|v| v.is_finite()));
    if let Some(p) = &newton {
        if p.norm() <= delta {
            return (p.clone(), true);
        }
    }

    let gradient = jac.transpose() * fx;
    let gradient_norm = gradient.norm();
    if gradient_norm == 0.0 {
        return (DVector::zeros(fx.len()), false);
    }
    let curvature = (jac * &gradient).norm_squared();
    let alpha = if curvature > 0.0 {
        gradient_norm * gradient_norm / curvature
    } else {
        f64::INFINITY
    };
    let cauchy = &gradient * -alpha;
    let cauchy_norm = alpha * gradient_norm;

    match newton {
        Some(p) if cauchy_norm < delta => {
            // Walk from the Cauchy point towards the Newton point until the
            // boundary: ‖c + tau d‖ = delta.
            let d = p - &cauchy;
            let a = d.norm_squared();
            let b = 2.0 * cauchy.dot(&d);
            let c = cauchy_norm * cauchy_norm - delta * delta;
            let tau = (-b + (b * b - 4.0 * a * c).max(0.0).sqrt()) / (2.0 * a);
            (cauchy + d * tau, false)
        }
        _ => (&gradient * (-delta / gradient_norm), false),
    }
}

/// Find a root of `system` starting from `x0`.
///
/// Succeeds when `‖F‖∞ <= ftol`, or when an accepted full Newton step is
/// shorter than `xtol * (‖x‖ + xtol)`. Systems of dimension zero succeed
/// immediately.
pub fn hybrid_newton<S: NonlinearSystem + ?Sized>(
    system: &mut S,
    x0: &DVector<f64>,
    config: &SolverConfig,
) -> Result<RootResult> {
    let mut x = x0.clone();
    let mut fx = system.residual(&x)?;
    let n = x.len();

    if n == 0 {
        return Ok(RootResult {
            x,
            fun: fx,
            jacobian: DMatrix::zeros(0, 0),
            converged: true,
            iterations: 0,
        });
    }

    let mut jac = jacobian_at(system, &x, &fx, config)?;
    let mut delta = match config.initial_trust_factor * x.norm() {
        radius if radius > 0.0 => radius,
        _ => config.initial_trust_factor,
    };

    let mut converged = fx.amax() <= config.ftol;
    let mut iterations = 0;

    while !converged && iterations < config.max_iterations {
        iterations += 1;

        let (step, full_newton) = dogleg(&jac, &fx, delta);
        let step_norm = step.norm();
        if step_norm == 0.0 {
            break;
        }

        let candidate = &x + &step;
        let f_candidate = system.residual(&candidate)?;

        let f_norm_sq = fx.norm_squared();
        let candidate_norm_sq = f_candidate.norm_squared();
        let predicted = f_norm_sq - (&fx + &jac * &step).norm_squared();
        let actual = f_norm_sq - candidate_norm_sq;
        let ratio = if !candidate_norm_sq.is_finite() {
            -1.0
        } else if predicted > 0.0 {
            actual / predicted
        } else if actual > 0.0 {
            1.0
        } else {
            -1.0
        };

        if ratio < 0.25 {
            delta = 0.25 * step_norm;
        } else if ratio > 0.75 && step_norm >= 0.99 * delta {
            delta = 2.0 * step_norm;
        }

        log::trace!(
            "hybrid newton #{}: |F| = {:.3e}, step = {:.3e}, ratio = {:.3}, radius = {:.3e}",
            iterations,
            candidate_norm_sq.sqrt(),
            step_norm,
            ratio,
            delta
        );

        let x_scale = config.xtol * (candidate.norm() + config.xtol);
        if ratio > 1e-4 {
            x = candidate;
            fx = f_candidate;
            jac = jacobian_at(system, &x, &fx, config)?;
            converged = fx.amax() <= config.ftol || (full_newton && step_norm <= x_scale);
        } else if delta <= x_scale {
            // The trust region collapsed without progress.
            break;
        }
    }

    Ok(RootResult {
        x,
        fun: fx,
        jacobian: jac,
        converged,
        iterations,
    })
}
