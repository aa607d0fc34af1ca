//! Diode model.
//!
//! Uses the Shockley diode equation:
//!   I = Is * (exp(V / (n * Vt)) - 1)
//!
//! Above `v_crit` the characteristic continues as its tangent line so the
//! exponential cannot overflow while the hybrid solver explores large
//! voltages.

use super::{two_terminals, Branch, BranchLaw, Component, State};
use crate::error::Result;
use crate::THERMAL_VOLTAGE;

/// Parameters for a diode model.
#[derive(Debug, Clone)]
pub struct DiodeParams {
    /// Saturation current (Is), typically 1e-14 to 1e-12 A
    pub is: f64,
    /// Ideality factor (n), typically 1.0 to 2.0
    pub n: f64,
    /// Voltage above which the exponential is linearly extrapolated
    pub v_crit: f64,
}

impl Default for DiodeParams {
    fn default() -> Self {
        Self {
            is: 1e-14,
            n: 1.0,
            v_crit: 0.7,
        }
    }
}

impl DiodeParams {
    /// Create parameters for a germanium diode (lower forward voltage).
    pub fn germanium() -> Self {
        Self {
            is: 1e-9,
            n: 1.5,
            v_crit: 0.5,
        }
    }

    /// Thermal voltage times ideality factor.
    pub fn n_vt(&self) -> f64 {
        self.n * THERMAL_VOLTAGE
    }
}

/// A diode component, terminals `[anode, cathode]`.
#[derive(Debug, Clone)]
pub struct Diode {
    pub name: String,
    pub params: DiodeParams,
}

impl Diode {
    /// Create a new diode.
    pub fn new(name: impl Into<String>, params: DiodeParams) -> Self {
        Self {
            name: name.into(),
            params,
        }
    }

    /// Calculate the diode current at a given voltage.
    pub fn current(&self, v: f64) -> f64 {
        let n_vt = self.params.n_vt();
        let v_crit = self.params.v_crit;

        if v > v_crit {
            let i_crit = self.params.is * ((v_crit / n_vt).exp() - 1.0);
            i_crit + self.conductance(v_crit) * (v - v_crit)
        } else {
            self.params.is * ((v / n_vt).exp() - 1.0)
        }
    }

    /// Calculate the conductance (dI/dV) at a given voltage.
    pub fn conductance(&self, v: f64) -> f64 {
        let n_vt = self.params.n_vt();
        // dI/dV = Is/(n*Vt) * exp(V/(n*Vt))
        self.params.is / n_vt * (v.min(self.params.v_crit) / n_vt).exp()
    }
}

impl BranchLaw for Diode {
    fn value(&self, _state: &State, coupled: &[f64], _t1: f64, _t2: f64) -> f64 {
        self.current(coupled[0])
    }

    fn jacobian(&self, _state: &State, coupled: &[f64], _t1: f64, _t2: f64, out: &mut [f64]) {
        out[0] = self.conductance(coupled[0]);
    }
}

impl<N: Clone> Component<N> for Diode {
    fn name(&self) -> &str {
        &self.name
    }

    fn connect(&self, terminals: &[N]) -> Result<Vec<(N, N, Branch)>> {
        let (anode, cathode) = two_terminals(&self.name, terminals)?;
        Ok(vec![(cathode, anode, Branch::current(self.clone()))])
    }
}
