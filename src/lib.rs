//! # Envelope Core
//!
//! A transient circuit simulator built on Modified Nodal Analysis (MNA), with
//! envelope-following and periodic steady-state analyses on top.
//!
//! This library provides:
//! - A topology graph of directed branches between arbitrary hashable nodes
//! - An MNA equation stack with an analytic Jacobian and a specialized
//!   ("lambdified") evaluator
//! - A Powell-style hybrid Newton solver with retry-and-disturb
//! - Transient, envelope-following (EFM) and steady-state analyses
//!
//! ## Architecture
//!
//! - [`circuit`] - Topology graph, component ↔ branch mapping, the [`Circuit`]
//! - [`components`] - Component and branch interface, reference components,
//!   state compaction
//! - [`solver`] - MNA equations and the nonlinear solver
//! - [`analysis`] - Transient, EFM and steady-state analyses, and their results
//!
//! ## Usage
//!
//! ```no_run
//! use envelope_core::components::{Resistor, VoltageSource};
//! use envelope_core::Circuit;
//!
//! let mut circuit = Circuit::new();
//! circuit.add(VoltageSource::dc("V1", 5.0), &["a", "gnd"])?;
//! circuit.add(Resistor::new("R1", 10.0), &["a", "gnd"])?;
//!
//! let result = circuit.simulate(0.0, 1.0, 10)?;
//! assert!((result.potentials(&"a")[9] - 5.0).abs() < 1e-9);
//! # Ok::<(), envelope_core::SimError>(())
//! ```
//!
//! ## Simulation Method
//!
//! For each time step `[t1, t2]` the unknowns are the potentials of all
//! non-reference nodes and the currents of all voltage-defining branches.
//! The residual has one Kirchhoff current equation per non-reference node and
//! one branch equation per voltage-defining branch. It is solved from the
//! previous step's solution; afterwards every component updates its state
//! from its solved branch values.
//!
//! Reactive elements (C, L) are discretized using the trapezoidal rule.

pub mod analysis;
pub mod circuit;
pub mod components;
pub mod error;
pub mod solver;

// Re-export main types for convenience
pub use analysis::{SolveReport, SteadyStateResult, TransientResult};
pub use circuit::{BranchId, Circuit, ComponentId};
pub use components::{compact, uncompact, State};
pub use error::{Result, SimError};
pub use solver::SolverConfig;

/// Thermal voltage at room temperature (approximately 26mV)
pub const THERMAL_VOLTAGE: f64 = 0.0258;
