//! Voltage and current sources.

use std::f64::consts::TAU;

use super::{two_terminals, Branch, BranchLaw, Component, State};
use crate::error::Result;

/// Time dependence of an independent source.
#[derive(Debug, Clone)]
pub enum Waveform {
    /// Constant value
    Dc(f64),
    /// offset + amplitude * sin(2*pi*frequency*t + phase)
    Sine {
        amplitude: f64,
        frequency: f64,
        phase: f64,
        offset: f64,
    },
    /// Arbitrary function of time
    Function(fn(f64) -> f64),
}

impl Waveform {
    /// Pure sine without offset or phase shift.
    pub fn sine(amplitude: f64, frequency: f64) -> Self {
        Waveform::Sine {
            amplitude,
            frequency,
            phase: 0.0,
            offset: 0.0,
        }
    }

    /// Value at time `t`.
    pub fn at(&self, t: f64) -> f64 {
        match self {
            Waveform::Dc(value) => *value,
            Waveform::Sine {
                amplitude,
                frequency,
                phase,
                offset,
            } => offset + amplitude * (TAU * frequency * t + phase).sin(),
            Waveform::Function(f) => f(t),
        }
    }
}

/// A voltage source component.
///
/// Enforces `v(positive) - v(negative) = waveform(t)`; its branch current is
/// an extra MNA unknown.
#[derive(Debug, Clone)]
pub struct VoltageSource {
    pub name: String,
    pub waveform: Waveform,
}

impl VoltageSource {
    /// Create a new voltage source.
    pub fn new(name: impl Into<String>, waveform: Waveform) -> Self {
        Self {
            name: name.into(),
            waveform,
        }
    }

    /// Constant voltage source.
    pub fn dc(name: impl Into<String>, voltage: f64) -> Self {
        Self::new(name, Waveform::Dc(voltage))
    }
}

impl BranchLaw for VoltageSource {
    fn value(&self, _state: &State, _coupled: &[f64], _t1: f64, t2: f64) -> f64 {
        self.waveform.at(t2)
    }

    fn jacobian(&self, _state: &State, _coupled: &[f64], _t1: f64, _t2: f64, out: &mut [f64]) {
        out.fill(0.0);
    }
}

impl<N: Clone> Component<N> for VoltageSource {
    fn name(&self) -> &str {
        &self.name
    }

    fn connect(&self, terminals: &[N]) -> Result<Vec<(N, N, Branch)>> {
        let (pos, neg) = two_terminals(&self.name, terminals)?;
        Ok(vec![(neg, pos, Branch::voltage(self.clone()))])
    }
}

/// A current source component.
///
/// Drives `waveform(t)` through itself from the positive to the negative
/// terminal, i.e. into the external circuit at the negative terminal.
#[derive(Debug, Clone)]
pub struct CurrentSource {
    pub name: String,
    pub waveform: Waveform,
}

impl CurrentSource {
    /// Create a new current source.
    pub fn new(name: impl Into<String>, waveform: Waveform) -> Self {
        Self {
            name: name.into(),
            waveform,
        }
    }

    /// Constant current source.
    pub fn dc(name: impl Into<String>, current: f64) -> Self {
        Self::new(name, Waveform::Dc(current))
    }
}

impl BranchLaw for CurrentSource {
    fn value(&self, _state: &State, _coupled: &[f64], _t1: f64, t2: f64) -> f64 {
        self.waveform.at(t2)
    }

    fn jacobian(&self, _state: &State, _coupled: &[f64], _t1: f64, _t2: f64, out: &mut [f64]) {
        out.fill(0.0);
    }
}

impl<N: Clone> Component<N> for CurrentSource {
    fn name(&self) -> &str {
        &self.name
    }

    fn connect(&self, terminals: &[N]) -> Result<Vec<(N, N, Branch)>> {
        let (pos, neg) = two_terminals(&self.name, terminals)?;
        Ok(vec![(neg, pos, Branch::current(self.clone()))])
    }
}
