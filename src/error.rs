//! Error types for the envelope circuit simulator.
//!
//! This module provides a unified error type [`SimError`] that covers
//! topology construction, parameter validation, state handling and
//! solver failures.
//!
//! Unmet solver precision is *not* an error by default: it is reported as an
//! [`UnmetPrecisionWarning`](crate::solver::UnmetPrecisionWarning) attached to
//! the simulation result. [`SimError::PrecisionNotMet`] only appears when a
//! caller asks for it explicitly.

use thiserror::Error;

/// Result type alias using [`SimError`].
pub type Result<T> = std::result::Result<T, SimError>;

/// Unified error type for all simulator operations.
#[derive(Error, Debug)]
pub enum SimError {
    // ============ Topology Errors ============
    /// A component with the same name is already part of the circuit
    #[error("Component '{name}' already added to circuit")]
    DuplicateComponent { name: String },

    /// A branch id is already present in the topology graph
    #[error("Branch {branch} already exists in the topology graph")]
    DuplicateBranch { branch: String },

    /// A component received the wrong number of terminals
    #[error("Component '{component}' expects {expected} terminals, got {actual}")]
    TerminalCount {
        component: String,
        expected: usize,
        actual: usize,
    },

    /// A component connected without contributing any branch
    #[error("Component '{component}' did not contribute any branch")]
    NoBranches { component: String },

    /// A graph edge has no owning component or no branch law
    #[error("Branch {branch} is not owned by any component")]
    UnmappedBranch { branch: String },

    /// Referenced component is not part of the circuit
    #[error("Component {id} not found in circuit")]
    UnknownComponent { id: String },

    // ============ State Errors ============
    /// A compacted state vector does not fit its layout
    #[error("State layout mismatch: expected {expected} values, got {actual}")]
    StateLayoutMismatch { expected: usize, actual: usize },

    /// A component changed the shape of its state during an analysis
    #[error("Component state changed shape during analysis")]
    StateShapeChanged,

    // ============ Simulation Errors ============
    /// Invalid simulation parameter
    #[error("Invalid simulation parameter: {message}")]
    InvalidSimulationParam { message: String },

    /// The nonlinear solver did not reach the requested tolerance
    #[error("Solver did not converge after {attempts} attempts (residual: {residual:.2e})")]
    PrecisionNotMet { attempts: usize, residual: f64 },
}

impl SimError {
    /// Create an invalid simulation parameter error
    pub fn invalid_param(message: impl Into<String>) -> Self {
        Self::InvalidSimulationParam {
            message: message.into(),
        }
    }

    /// Create a terminal count error
    pub fn terminal_count(component: impl Into<String>, expected: usize, actual: usize) -> Self {
        Self::TerminalCount {
            component: component.into(),
            expected,
            actual,
        }
    }

    /// Create a state layout mismatch error
    pub fn layout_mismatch(expected: usize, actual: usize) -> Self {
        Self::StateLayoutMismatch { expected, actual }
    }
}
