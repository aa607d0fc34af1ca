//! Retry-and-disturb wrapper around [`hybrid_newton`].
//!
//! When an attempt fails, the next one starts from the failed point pushed
//! away along the direction of `J·x`, by a factor that grows exponentially
//! with the number of times that same point was reached. Attempts are counted
//! per distinct failed point (identified by its norm), so cycling between a
//! few bad points keeps pushing further instead of repeating itself.

use std::fmt;

use nalgebra::DVector;

use super::newton::{hybrid_newton, NonlinearSystem, RootResult};
use super::SolverConfig;
use crate::error::{Result, SimError};

/// Where an unconverged solve happened.
#[derive(Debug, Clone, Copy, PartialEq)]
pub enum SolveContext {
    /// Transient step from `t1` to `t2`
    TransientStep { t1: f64, t2: f64 },
    /// Envelope skip over `skip` periods starting at `time`
    EnvelopeSkip { time: f64, skip: usize },
    /// Single-period steady-state fixed point
    SteadyState,
    /// Envelope-based steady-state fixed point
    MultivariateSteadyState,
}

impl fmt::Display for SolveContext {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            SolveContext::TransientStep { t1, t2 } => write!(f, "transient step {t1:e} -> {t2:e}"),
            SolveContext::EnvelopeSkip { time, skip } => {
                write!(f, "envelope skip of {skip} periods at {time:e}")
            }
            SolveContext::SteadyState => write!(f, "steady state"),
            SolveContext::MultivariateSteadyState => write!(f, "multivariate steady state"),
        }
    }
}

/// A solve that exhausted its attempts; the closest result was used anyway.
#[derive(Debug, Clone)]
pub struct UnmetPrecisionWarning {
    pub context: SolveContext,
    pub attempts: usize,
    /// Euclidean norm of the residual of the chosen solution
    pub residual_norm: f64,
    /// The chosen solution
    pub solution: DVector<f64>,
}

impl fmt::Display for UnmetPrecisionWarning {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "{}: failed to converge after {} attempts, taking the closest result (residual: {:.2e})",
            self.context, self.attempts, self.residual_norm
        )
    }
}

impl UnmetPrecisionWarning {
    /// Convert into a hard error.
    pub fn into_error(self) -> SimError {
        SimError::PrecisionNotMet {
            attempts: self.attempts,
            residual: self.residual_norm,
        }
    }
}

/// Result of [`solve`].
#[derive(Debug, Clone)]
pub struct SolveOutcome {
    pub x: DVector<f64>,
    pub fun: DVector<f64>,
    pub converged: bool,
    /// Number of [`hybrid_newton`] runs
    pub attempts: usize,
}

impl SolveOutcome {
    pub fn residual_norm(&self) -> f64 {
        self.fun.norm()
    }

    /// Warning to record if the solve did not converge.
    pub fn warning(&self, context: SolveContext) -> Option<UnmetPrecisionWarning> {
        (!self.converged).then(|| {
            let warning = UnmetPrecisionWarning {
                context,
                attempts: self.attempts,
                residual_norm: self.residual_norm(),
                solution: self.x.clone(),
            };
            log::warn!("{warning}");
            warning
        })
    }
}

fn is_close(a: f64, b: f64) -> bool {
    a == b || (a - b).abs() <= 1e-9 * a.abs().max(b.abs())
}

/// Residual norm used to pick the closest failed attempt; non-finite norms
/// rank last.
fn ranking_norm(result: &RootResult) -> f64 {
    let norm = result.residual_norm();
    if norm.is_finite() {
        norm
    } else {
        f64::INFINITY
    }
}

/// Push a failed point away along `sign(J·x)`.
fn disturb(result: &RootResult, trial: u32, factor: f64) -> DVector<f64> {
    let direction = &result.jacobian * &result.x;
    let scale = factor.powi(trial as i32);
    result
        .x
        .zip_map(&direction, |x, d| if d < 0.0 { -scale * x } else { scale * x })
}

/// Solve `system` from `x0`, retrying from disturbed points on failure.
///
/// Always produces a vector: if no attempt converges, the attempt with the
/// smallest residual is returned with `converged == false`.
pub fn solve<S: NonlinearSystem + ?Sized>(
    system: &mut S,
    x0: &DVector<f64>,
    config: &SolverConfig,
) -> Result<SolveOutcome> {
    let budget = config.attempts_for(x0.len());
    let mut trials: Vec<(f64, u32)> = Vec::new();
    let mut best: Option<RootResult> = None;
    let mut start = x0.clone();

    for attempt in 1..=budget {
        let result = hybrid_newton(system, &start, config)?;
        log::debug!(
            "attempt {}/{}: converged = {}, residual = {:.3e}, iterations = {}",
            attempt,
            budget,
            result.converged,
            result.residual_norm(),
            result.iterations
        );

        if result.converged {
            return Ok(SolveOutcome {
                x: result.x,
                fun: result.fun,
                converged: true,
                attempts: attempt,
            });
        }

        let norm = result.x.norm();
        let trial = match trials.iter_mut().find(|(seen, _)| is_close(*seen, norm)) {
            Some((_, count)) => {
                *count += 1;
                *count
            }
            None => {
                trials.push((norm, 1));
                1
            }
        };
        start = disturb(&result, trial, config.disturbance_factor);

        if best
            .as_ref()
            .map_or(true, |b| ranking_norm(&result) < ranking_norm(b))
        {
            best = Some(result);
        }
    }

    // budget >= 1 and every failed attempt is considered for `best`
    let best = best.ok_or_else(|| SimError::invalid_param("retry budget must be at least 1"))?;
    Ok(SolveOutcome {
        x: best.x,
        fun: best.fun,
        converged: false,
        attempts: budget,
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::solver::FnSystem;
    use approx::assert_abs_diff_eq;
    use nalgebra::DMatrix;

    #[test]
    fn test_first_attempt_success() {
        let mut system = FnSystem::new(|x: &DVector<f64>| Ok(x.map(|v| v - 2.0)));
        let outcome = solve(&mut system, &DVector::zeros(3), &SolverConfig::default()).unwrap();
        assert!(outcome.converged);
        assert_eq!(outcome.attempts, 1);
        assert!(outcome.warning(SolveContext::SteadyState).is_none());
    }

    #[test]
    fn test_exhausted_budget_returns_best() {
        let mut system = FnSystem::new(|x: &DVector<f64>| Ok(DVector::from_vec(vec![x[0] * x[0] + 1.0])));
        let config = SolverConfig::default().with_max_iterations(5);
        let outcome = solve(&mut system, &DVector::from_vec(vec![2.0]), &config).unwrap();

        assert!(!outcome.converged);
        assert_eq!(outcome.attempts, config.attempts_for(1));
        let warning = outcome.warning(SolveContext::TransientStep { t1: 0.0, t2: 1.0 }).unwrap();
        assert_eq!(warning.attempts, 4);
        assert!(warning.residual_norm >= 1.0);
        assert!(matches!(warning.into_error(), SimError::PrecisionNotMet { attempts: 4, .. }));
    }

    #[test]
    fn test_best_attempt_skips_non_finite_residuals() {
        // Undefined around the starting point, no root anywhere else
        let mut system = FnSystem::new(|x: &DVector<f64>| {
            let v = x[0];
            let f = if v > -1.5 && v < -0.5 { f64::NAN } else { v * v + 1.0 };
            Ok(DVector::from_vec(vec![f]))
        });
        let config = SolverConfig::default().with_max_iterations(5);
        let outcome = solve(&mut system, &DVector::from_vec(vec![-1.0]), &config).unwrap();

        assert!(!outcome.converged);
        assert!(outcome.residual_norm().is_finite());
        assert!(outcome.residual_norm() >= 1.0);
    }

    #[test]
    fn test_ranking_norm_puts_nan_last() {
        let result = |f: f64| RootResult {
            x: DVector::zeros(1),
            fun: DVector::from_vec(vec![f]),
            jacobian: DMatrix::zeros(1, 1),
            converged: false,
            iterations: 1,
        };
        assert_eq!(ranking_norm(&result(f64::NAN)), f64::INFINITY);
        assert!(ranking_norm(&result(1e300)) < ranking_norm(&result(f64::NAN)));
        assert_abs_diff_eq!(ranking_norm(&result(-3.0)), 3.0);
    }

    #[test]
    fn test_disturbance_follows_jacobian_direction() {
        let result = RootResult {
            x: DVector::from_vec(vec![1.0, -2.0, 0.5]),
            fun: DVector::zeros(3),
            jacobian: DMatrix::from_diagonal(&DVector::from_vec(vec![1.0, 1.0, -1.0])),
            converged: false,
            iterations: 1,
        };
        // J·x = [1, -2, -0.5]
        let disturbed = disturb(&result, 2, 100.0);
        assert_abs_diff_eq!(disturbed[0], 1e4);
        assert_abs_diff_eq!(disturbed[1], 2e4);
        assert_abs_diff_eq!(disturbed[2], -0.5e4);
    }

    #[test]
    fn test_norm_closeness() {
        assert!(is_close(0.0, 0.0));
        assert!(is_close(1.0, 1.0 + 1e-12));
        assert!(!is_close(1.0, 1.001));
    }
}
