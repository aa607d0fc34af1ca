//! Component and branch interface, plus a small reference component library.
//!
//! The simulator core never knows what a component *is*. It only sees:
//! - [`Component`]: something that, given its terminal nodes, contributes one
//!   or more [`Branch`]es and owns a persistent [`State`];
//! - [`Branch`]: either current-defining (the branch computes its current from
//!   the coupled voltages/currents) or voltage-defining (it computes its
//!   voltage), both expressed through the [`BranchLaw`] capability.
//!
//! The coupled values a law receives are the instantaneous values of all
//! branches of the same component, in the order `connect` returned them: the
//! voltage `v(target) - v(source)` for current-defining branches and the
//! branch current for voltage-defining branches.
//!
//! Library components:
//! - Linear: [`Resistor`], [`Capacitor`], [`Inductor`]
//! - Sources: [`VoltageSource`], [`CurrentSource`] driven by a [`Waveform`]
//! - Nonlinear: [`Diode`]
//! - Controlled: [`Vccs`]

mod controlled;
mod diode;
mod linear;
mod sources;
mod state;

pub use controlled::Vccs;
pub use diode::{Diode, DiodeParams};
pub use linear::{Capacitor, Inductor, Resistor};
pub use sources::{CurrentSource, VoltageSource, Waveform};
pub use state::{compact, uncompact, State, StateLayout};

pub(crate) use state::compact_like;

use std::fmt;

use crate::error::{Result, SimError};

/// Electrical law of one branch.
///
/// `value` is the branch current for current-defining branches and the branch
/// voltage for voltage-defining ones. `t1` is the previous and `t2` the
/// present point in time of the step being solved.
pub trait BranchLaw: fmt::Debug {
    /// Evaluate the branch law.
    fn value(&self, state: &State, coupled: &[f64], t1: f64, t2: f64) -> f64;

    /// Partial derivatives of [`value`](Self::value) with respect to each
    /// coupled value, written into `out` (same length as `coupled`).
    fn jacobian(&self, state: &State, coupled: &[f64], t1: f64, t2: f64, out: &mut [f64]);

    /// Advance the owning component's state after a solved step.
    ///
    /// `value` is the solved branch voltage (current-defining branches) or
    /// branch current (voltage-defining branches).
    fn update(&self, _state: &mut State, _value: f64, _coupled: &[f64], _t1: f64, _t2: f64) {}
}

/// Which quantity a branch defines.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum BranchKind {
    Current,
    Voltage,
}

/// A branch contributed by a component.
#[derive(Debug)]
pub enum Branch {
    /// Computes its current; its voltage is a node-potential difference.
    Current(Box<dyn BranchLaw>),
    /// Computes its voltage; its current becomes an extra unknown.
    Voltage(Box<dyn BranchLaw>),
}

impl Branch {
    /// Create a current-defining branch.
    pub fn current(law: impl BranchLaw + 'static) -> Self {
        Branch::Current(Box::new(law))
    }

    /// Create a voltage-defining branch.
    pub fn voltage(law: impl BranchLaw + 'static) -> Self {
        Branch::Voltage(Box::new(law))
    }

    pub fn kind(&self) -> BranchKind {
        match self {
            Branch::Current(_) => BranchKind::Current,
            Branch::Voltage(_) => BranchKind::Voltage,
        }
    }

    pub fn law(&self) -> &dyn BranchLaw {
        match self {
            Branch::Current(law) | Branch::Voltage(law) => law.as_ref(),
        }
    }
}

/// A circuit component.
///
/// Implementations are free to choose their own state shape; the simulator
/// only stores it, hands it to the branch laws and compacts it for the
/// steady-state and envelope-following analyses.
pub trait Component<N>: fmt::Debug {
    /// Name of the component, unique within a circuit.
    fn name(&self) -> &str;

    /// Create the branches of this component between the given terminals.
    ///
    /// Returns `(source, target, branch)` triples. Called exactly once, when
    /// the component is added to a circuit.
    fn connect(&self, terminals: &[N]) -> Result<Vec<(N, N, Branch)>>;

    /// State the component starts from.
    fn initial_state(&self) -> State {
        State::empty()
    }
}

/// Destructure exactly two terminals.
pub(crate) fn two_terminals<N: Clone>(name: &str, terminals: &[N]) -> Result<(N, N)> {
    match terminals {
        [a, b] => Ok((a.clone(), b.clone())),
        _ => Err(SimError::terminal_count(name, 2, terminals.len())),
    }
}

