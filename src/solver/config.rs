//! Solver configuration.

use super::{
    DEFAULT_DISTURBANCE_FACTOR, DEFAULT_FD_EPSILON, DEFAULT_FTOL, DEFAULT_MAX_ITERATIONS,
    DEFAULT_TRUST_FACTOR, DEFAULT_XTOL,
};

/// Configuration for the hybrid Newton solver and its retry wrapper.
#[derive(Debug, Clone, PartialEq)]
pub struct SolverConfig {
    /// Maximum trust-region iterations per attempt.
    pub max_iterations: usize,
    /// Residual tolerance (infinity norm).
    pub ftol: f64,
    /// Relative step tolerance.
    pub xtol: f64,
    /// Initial trust radius is `factor * ‖x0‖` (or `factor` if `x0 = 0`).
    pub initial_trust_factor: f64,
    /// Relative perturbation for finite-difference Jacobians.
    pub fd_epsilon: f64,
    /// Base of the exponential disturbance applied between attempts.
    pub disturbance_factor: f64,
    /// Number of attempts; `None` derives it from the system size.
    pub retry_budget: Option<usize>,
}

impl Default for SolverConfig {
    fn default() -> Self {
        Self {
            max_iterations: DEFAULT_MAX_ITERATIONS,
            ftol: DEFAULT_FTOL,
            xtol: DEFAULT_XTOL,
            initial_trust_factor: DEFAULT_TRUST_FACTOR,
            fd_epsilon: DEFAULT_FD_EPSILON,
            disturbance_factor: DEFAULT_DISTURBANCE_FACTOR,
            retry_budget: None,
        }
    }
}

impl SolverConfig {
    /// Create a new configuration with default values.
    pub fn new() -> Self {
        Self::default()
    }

    /// Set the maximum iterations per attempt.
    pub fn with_max_iterations(mut self, max_iterations: usize) -> Self {
        self.max_iterations = max_iterations;
        self
    }

    /// Set the residual tolerance.
    pub fn with_ftol(mut self, ftol: f64) -> Self {
        self.ftol = ftol;
        self
    }

    /// Set the relative step tolerance.
    pub fn with_xtol(mut self, xtol: f64) -> Self {
        self.xtol = xtol;
        self
    }

    pub fn with_initial_trust_factor(mut self, factor: f64) -> Self {
        self.initial_trust_factor = factor;
        self
    }

    pub fn with_fd_epsilon(mut self, epsilon: f64) -> Self {
        self.fd_epsilon = epsilon;
        self
    }

    /// Set the disturbance base (100 by default).
    pub fn with_disturbance_factor(mut self, factor: f64) -> Self {
        self.disturbance_factor = factor;
        self
    }

    /// Fix the number of attempts instead of deriving it from the system size.
    pub fn with_retry_budget(mut self, attempts: usize) -> Self {
        self.retry_budget = Some(attempts.max(1));
        self
    }

    /// Number of attempts for a system with `n` unknowns.
    ///
    /// Defaults to `floor((log10(n) + 1) * 4)`, at least one.
    pub fn attempts_for(&self, n: usize) -> usize {
        self.retry_budget.unwrap_or_else(|| {
            let n = n.max(1) as f64;
            (((n.log10() + 1.0) * 4.0).floor() as usize).max(1)
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_retry_budget_scales_with_size() {
        let config = SolverConfig::default();
        assert_eq!(config.attempts_for(0), 4);
        assert_eq!(config.attempts_for(1), 4);
        assert_eq!(config.attempts_for(10), 8);
        assert_eq!(config.attempts_for(100), 12);
        assert_eq!(config.attempts_for(5), 6);
    }

    #[test]
    fn test_builder() {
        let config = SolverConfig::new()
            .with_ftol(1e-6)
            .with_retry_budget(0)
            .with_disturbance_factor(10.0);
        assert_eq!(config.ftol, 1e-6);
        assert_eq!(config.attempts_for(1000), 1);
        assert_eq!(config.disturbance_factor, 10.0);
    }
}
