//! Voltage-controlled current source.

use super::{Branch, BranchLaw, Component, State};
use crate::error::{Result, SimError};

/// A voltage-controlled current source, terminals `[out+, out-, ctrl+, ctrl-]`.
///
/// Drives `gm * (v(ctrl+) - v(ctrl-))` from `out+` through the source to
/// `out-`. The control port is a sensing branch with an optional input
/// conductance.
#[derive(Debug, Clone)]
pub struct Vccs {
    pub name: String,
    /// Transconductance in siemens
    pub gm: f64,
    /// Conductance of the control port
    pub input_conductance: f64,
}

impl Vccs {
    pub fn new(name: impl Into<String>, gm: f64) -> Self {
        Self {
            name: name.into(),
            gm,
            input_conductance: 0.0,
        }
    }

    pub fn with_input_conductance(mut self, conductance: f64) -> Self {
        self.input_conductance = conductance;
        self
    }
}

// Coupled values of both branches are `[v_out, v_ctrl]`.

#[derive(Debug)]
struct Output {
    gm: f64,
}

impl BranchLaw for Output {
    fn value(&self, _state: &State, coupled: &[f64], _t1: f64, _t2: f64) -> f64 {
        self.gm * coupled[1]
    }

    fn jacobian(&self, _state: &State, _coupled: &[f64], _t1: f64, _t2: f64, out: &mut [f64]) {
        out[0] = 0.0;
        out[1] = self.gm;
    }
}

#[derive(Debug)]
struct Sense {
    conductance: f64,
}

impl BranchLaw for Sense {
    fn value(&self, _state: &State, coupled: &[f64], _t1: f64, _t2: f64) -> f64 {
        self.conductance * coupled[1]
    }

    fn jacobian(&self, _state: &State, _coupled: &[f64], _t1: f64, _t2: f64, out: &mut [f64]) {
        out[0] = 0.0;
        out[1] = self.conductance;
    }
}

impl<N: Clone> Component<N> for Vccs {
    fn name(&self) -> &str {
        &self.name
    }

    fn connect(&self, terminals: &[N]) -> Result<Vec<(N, N, Branch)>> {
        let [out_pos, out_neg, ctrl_pos, ctrl_neg] = terminals else {
            return Err(SimError::terminal_count(&self.name, 4, terminals.len()));
        };
        Ok(vec![
            (
                out_neg.clone(),
                out_pos.clone(),
                Branch::current(Output { gm: self.gm }),
            ),
            (
                ctrl_neg.clone(),
                ctrl_pos.clone(),
                Branch::current(Sense {
                    conductance: self.input_conductance,
                }),
            ),
        ])
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::components::BranchKind;

    #[test]
    fn test_vccs_branches() {
        let g = Vccs::new("G1", 0.01).with_input_conductance(1e-6);
        let branches = g.connect(&["o", "gnd", "c", "gnd"]).unwrap();
        assert_eq!(branches.len(), 2);
        assert!(branches.iter().all(|(_, _, b)| b.kind() == BranchKind::Current));

        let output = branches[0].2.law();
        assert!((output.value(&State::empty(), &[3.0, 2.0], 0.0, 1.0) - 0.02).abs() < 1e-15);

        let mut jac = [1.0, 1.0];
        output.jacobian(&State::empty(), &[3.0, 2.0], 0.0, 1.0, &mut jac);
        assert_eq!(jac, [0.0, 0.01]);
    }

    #[test]
    fn test_vccs_terminal_count() {
        let g = Vccs::new("G1", 0.01);
        assert!(matches!(
            Component::<u32>::connect(&g, &[1, 2]),
            Err(SimError::TerminalCount { expected: 4, actual: 2, .. })
        ));
    }
}
