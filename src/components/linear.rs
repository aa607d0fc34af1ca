//! Linear passive components: Resistor, Capacitor, Inductor.
//!
//! All two-terminal components take their terminals as `[positive, negative]`
//! and connect one branch from the negative to the positive terminal, so the
//! branch voltage is `v(positive) - v(negative)` and a positive branch current
//! flows from the positive terminal through the component (passive sign
//! convention).

use super::{two_terminals, Branch, BranchLaw, Component, State};
use crate::error::Result;

/// A resistor component.
#[derive(Debug, Clone)]
pub struct Resistor {
    pub name: String,
    pub resistance: f64,
}

impl Resistor {
    /// Create a new resistor.
    pub fn new(name: impl Into<String>, resistance: f64) -> Self {
        Self {
            name: name.into(),
            // Minimum resistance to avoid singularity
            resistance: resistance.max(1e-12),
        }
    }

    /// Get the conductance (1/R).
    pub fn conductance(&self) -> f64 {
        1.0 / self.resistance
    }
}

impl BranchLaw for Resistor {
    fn value(&self, _state: &State, coupled: &[f64], _t1: f64, _t2: f64) -> f64 {
        coupled[0] * self.conductance()
    }

    fn jacobian(&self, _state: &State, _coupled: &[f64], _t1: f64, _t2: f64, out: &mut [f64]) {
        out[0] = self.conductance();
    }
}

impl<N: Clone> Component<N> for Resistor {
    fn name(&self) -> &str {
        &self.name
    }

    fn connect(&self, terminals: &[N]) -> Result<Vec<(N, N, Branch)>> {
        let (pos, neg) = two_terminals(&self.name, terminals)?;
        Ok(vec![(neg, pos, Branch::current(self.clone()))])
    }
}

/// A capacitor component.
///
/// Discretized with the trapezoidal rule:
///   i(n) = (2C/dt) * (v(n) - v(n-1)) - i(n-1)
///
/// State: `[v_prev, i_prev]`.
#[derive(Debug, Clone)]
pub struct Capacitor {
    pub name: String,
    pub capacitance: f64,
    /// Voltage across the capacitor before the first step
    pub initial_voltage: f64,
}

impl Capacitor {
    /// Create a new, discharged capacitor.
    pub fn new(name: impl Into<String>, capacitance: f64) -> Self {
        Self {
            name: name.into(),
            capacitance,
            initial_voltage: 0.0,
        }
    }

    /// Start from a precharged voltage.
    pub fn with_initial_voltage(mut self, voltage: f64) -> Self {
        self.initial_voltage = voltage;
        self
    }

    /// Equivalent conductance of the trapezoidal companion model.
    pub fn conductance(&self, dt: f64) -> f64 {
        2.0 * self.capacitance / dt
    }

    fn history(state: &State) -> (f64, f64) {
        (
            state.scalar_at(0).unwrap_or(0.0),
            state.scalar_at(1).unwrap_or(0.0),
        )
    }
}

impl BranchLaw for Capacitor {
    fn value(&self, state: &State, coupled: &[f64], t1: f64, t2: f64) -> f64 {
        let (v_prev, i_prev) = Self::history(state);
        self.conductance(t2 - t1) * (coupled[0] - v_prev) - i_prev
    }

    fn jacobian(&self, _state: &State, _coupled: &[f64], t1: f64, t2: f64, out: &mut [f64]) {
        out[0] = self.conductance(t2 - t1);
    }

    fn update(&self, state: &mut State, voltage: f64, coupled: &[f64], t1: f64, t2: f64) {
        let current = self.value(state, coupled, t1, t2);
        *state = State::scalars(&[voltage, current]);
    }
}

impl<N: Clone> Component<N> for Capacitor {
    fn name(&self) -> &str {
        &self.name
    }

    fn connect(&self, terminals: &[N]) -> Result<Vec<(N, N, Branch)>> {
        let (pos, neg) = two_terminals(&self.name, terminals)?;
        Ok(vec![(neg, pos, Branch::current(self.clone()))])
    }

    fn initial_state(&self) -> State {
        State::scalars(&[self.initial_voltage, 0.0])
    }
}

/// An inductor component.
///
/// Discretized with the trapezoidal rule as a voltage-defining branch:
///   v(n) = (2L/dt) * (i(n) - i(n-1)) - v(n-1)
///
/// State: `[i_prev, v_prev]`.
#[derive(Debug, Clone)]
pub struct Inductor {
    pub name: String,
    pub inductance: f64,
    /// Current through the inductor before the first step
    pub initial_current: f64,
}

impl Inductor {
    /// Create a new inductor carrying no current.
    pub fn new(name: impl Into<String>, inductance: f64) -> Self {
        Self {
            name: name.into(),
            inductance,
            initial_current: 0.0,
        }
    }

    /// Start from a given current.
    pub fn with_initial_current(mut self, current: f64) -> Self {
        self.initial_current = current;
        self
    }

    /// Equivalent resistance of the trapezoidal companion model.
    pub fn resistance(&self, dt: f64) -> f64 {
        2.0 * self.inductance / dt
    }

    fn history(state: &State) -> (f64, f64) {
        (
            state.scalar_at(0).unwrap_or(0.0),
            state.scalar_at(1).unwrap_or(0.0),
        )
    }
}

impl BranchLaw for Inductor {
    fn value(&self, state: &State, coupled: &[f64], t1: f64, t2: f64) -> f64 {
        let (i_prev, v_prev) = Self::history(state);
        self.resistance(t2 - t1) * (coupled[0] - i_prev) - v_prev
    }

    fn jacobian(&self, _state: &State, _coupled: &[f64], t1: f64, t2: f64, out: &mut [f64]) {
        out[0] = self.resistance(t2 - t1);
    }

    fn update(&self, state: &mut State, current: f64, coupled: &[f64], t1: f64, t2: f64) {
        let voltage = self.value(state, coupled, t1, t2);
        *state = State::scalars(&[current, voltage]);
    }
}

impl<N: Clone> Component<N> for Inductor {
    fn name(&self) -> &str {
        &self.name
    }

    fn connect(&self, terminals: &[N]) -> Result<Vec<(N, N, Branch)>> {
        let (pos, neg) = two_terminals(&self.name, terminals)?;
        Ok(vec![(neg, pos, Branch::voltage(self.clone()))])
    }

    fn initial_state(&self) -> State {
        State::scalars(&[self.initial_current, 0.0])
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_resistor_conductance() {
        let r = Resistor::new("R1", 1000.0);
        assert!((r.conductance() - 0.001).abs() < 1e-10);
        assert!((r.value(&State::empty(), &[2.0], 0.0, 1.0) - 0.002).abs() < 1e-12);
    }

    #[test]
    fn test_resistor_terminal_count() {
        let r = Resistor::new("R1", 1000.0);
        assert!(Component::<&str>::connect(&r, &["a"]).is_err());
        let branches = r.connect(&["a", "b"]).unwrap();
        assert_eq!(branches.len(), 1);
        assert_eq!((branches[0].0, branches[0].1), ("b", "a"));
    }

    #[test]
    fn test_capacitor_companion_model() {
        let c = Capacitor::new("C1", 1e-6);
        let dt = 1.0 / 48000.0;
        let mut state = Component::<&str>::initial_state(&c);

        // G_eq = 2C/dt = 2 * 1e-6 / (1/48000) = 96 mS
        assert!((c.conductance(dt) - 0.096).abs() < 1e-6);

        // A discharged capacitor held at 0 V draws no current
        assert!(c.value(&state, &[0.0], 0.0, dt).abs() < 1e-12);

        // Update state with 1V across cap
        c.update(&mut state, 1.0, &[1.0], 0.0, dt);
        assert!((state.scalar_at(0).unwrap() - 1.0).abs() < 1e-10);
        assert!((state.scalar_at(1).unwrap() - 0.096).abs() < 1e-9);
    }

    #[test]
    fn test_inductor_companion_model() {
        let l = Inductor::new("L1", 1e-3);
        let mut state = Component::<&str>::initial_state(&l);
        let dt = 1e-4;

        let mut jac = [0.0];
        l.jacobian(&state, &[0.5], 0.0, dt, &mut jac);
        assert!((jac[0] - 20.0).abs() < 1e-9);

        l.update(&mut state, 0.5, &[0.5], 0.0, dt);
        assert_eq!(state.scalar_at(0), Some(0.5));
        assert!((state.scalar_at(1).unwrap() - 10.0).abs() < 1e-9);
    }
}
