//! MNA equations and the nonlinear solver.
//!
//! ## Modified Nodal Analysis
//!
//! Instead of stamping a linear system `Ax = z`, the circuit is assembled into
//! a system of nonlinear equations `F(x) = 0`:
//!
//! ```text
//! [ KCL for every non-reference node         ]   x = [ v ]  node potentials
//! [ law of every voltage-defining branch     ]       [ j ]  voltage-branch currents
//! ```
//!
//! Component laws are arbitrary functions of their coupled voltages and
//! currents, so every time step is a root-finding problem. It is solved by a
//! hybrid (dogleg trust-region) Newton method, restarted from disturbed points
//! when it fails to reach the requested precision.

mod config;
mod lambdify;
mod mna;
mod newton;
mod retry;

pub use config::SolverConfig;
pub use lambdify::{LambdifiedEquations, LambdifiedJacobian};
pub use mna::{MnaEquationStack, UnknownLayout};
pub use newton::{hybrid_newton, FnSystem, NonlinearSystem, RootResult};
pub use retry::{solve, SolveContext, SolveOutcome, UnmetPrecisionWarning};

/// Maximum trust-region iterations per attempt.
pub const DEFAULT_MAX_ITERATIONS: usize = 100;

/// Residual tolerance (amperes for KCL rows, volts for branch rows).
pub const DEFAULT_FTOL: f64 = 1e-9;

/// Relative step tolerance.
pub const DEFAULT_XTOL: f64 = 1.49012e-8;

/// Initial trust radius relative to the norm of the start vector.
pub const DEFAULT_TRUST_FACTOR: f64 = 100.0;

/// Relative perturbation for finite-difference Jacobians.
pub const DEFAULT_FD_EPSILON: f64 = 1.49012e-8;

/// Base of the exponential retry disturbance.
pub const DEFAULT_DISTURBANCE_FACTOR: f64 = 100.0;
