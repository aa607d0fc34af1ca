//! Transient (time-domain) analysis.
//!
//! Each step from `t1` to `t2` is a root-finding problem over the MNA unknowns,
//! solved with the previous step's solution as the initial guess (the zero
//! vector for the first step). After every step each component sees its
//! solved branch values and advances its state.

use indexmap::IndexMap;
use nalgebra::{DMatrix, DVector};

use super::linspace;
use super::result::TransientResult;
use crate::circuit::{validate_interval, validate_steps, BranchId, Circuit, ComponentBranches, Node};
use crate::components::{Branch, State};
use crate::error::Result;
use crate::solver::{
    solve, LambdifiedEquations, LambdifiedJacobian, MnaEquationStack, NonlinearSystem,
    SolveContext, SolverConfig,
};

/// The equations of one time step.
struct StepSystem<'e, 's> {
    equations: &'e LambdifiedEquations<'s>,
    jacobian: &'e LambdifiedJacobian<'s>,
    states: &'e [State],
    t1: f64,
    t2: f64,
}

impl NonlinearSystem for StepSystem<'_, '_> {
    fn residual(&mut self, x: &DVector<f64>) -> Result<DVector<f64>> {
        Ok(self.equations.evaluate(x, self.states, self.t1, self.t2))
    }

    fn jacobian(&mut self, x: &DVector<f64>, _fx: &DVector<f64>) -> Result<Option<DMatrix<f64>>> {
        Ok(Some(self.jacobian.evaluate(x, self.states, self.t1, self.t2)))
    }
}

/// Everything needed to simulate a fixed circuit topology.
///
/// The engine never touches the circuit's committed states: every run takes
/// the state snapshot to advance explicitly.
pub(crate) struct TransientEngine<'s, N> {
    stack: &'s MnaEquationStack<'s, N>,
    equations: LambdifiedEquations<'s>,
    jacobian: LambdifiedJacobian<'s>,
    mapping: &'s ComponentBranches,
    laws: &'s IndexMap<BranchId, Branch>,
    pub(crate) config: &'s SolverConfig,
}

impl<'s, N: Node> TransientEngine<'s, N> {
    pub(crate) fn new(stack: &'s MnaEquationStack<'s, N>, circuit: &'s Circuit<N>) -> Self {
        Self {
            stack,
            equations: stack.lambdify(),
            jacobian: stack.lambdify_jacobian(),
            mapping: circuit.mapping(),
            laws: circuit.laws(),
            config: circuit.config(),
        }
    }

    pub(crate) fn empty_result(&self) -> TransientResult<N> {
        TransientResult::new(self.stack.layout().clone(), self.mapping)
    }

    /// Simulate `steps` equal steps from `t1` to `t2`, advancing `states`.
    pub(crate) fn simulate(
        &self,
        t1: f64,
        t2: f64,
        steps: usize,
        states: &mut [State],
    ) -> Result<TransientResult<N>> {
        let mut result = self.empty_result();
        let mut x = DVector::zeros(self.stack.len());

        for window in linspace(t1, t2, steps + 1).windows(2) {
            let (t1, t2) = (window[0], window[1]);
            let mut system = StepSystem {
                equations: &self.equations,
                jacobian: &self.jacobian,
                states,
                t1,
                t2,
            };
            let outcome = solve(&mut system, &x, self.config)?;
            if let Some(warning) = outcome.warning(SolveContext::TransientStep { t1, t2 }) {
                result.push_warning(warning);
            }

            x = outcome.x;
            self.advance_components(&x, states, t1, t2, &mut result);
            result.record_step(t2, x.clone());
        }

        Ok(result)
    }

    /// Hand the solved branch values to every component and record them.
    fn advance_components(
        &self,
        x: &DVector<f64>,
        states: &mut [State],
        t1: f64,
        t2: f64,
        result: &mut TransientResult<N>,
    ) {
        for ((component, branches), state) in self.mapping.iter().zip(states.iter_mut()) {
            let coupled: Vec<f64> = branches
                .iter()
                .map(|&branch| self.stack.coupled_value(x, branch).unwrap_or_default())
                .collect();

            for &branch in branches {
                let (voltage, current) = match &self.laws[&branch] {
                    Branch::Current(law) => {
                        let voltage = self.stack.get_voltage(x, branch).unwrap_or_default();
                        let current = law.value(state, &coupled, t1, t2);
                        law.update(state, voltage, &coupled, t1, t2);
                        (voltage, current)
                    }
                    Branch::Voltage(law) => {
                        let current = self.stack.get_current(x, branch).unwrap_or_default();
                        let voltage = law.value(state, &coupled, t1, t2);
                        law.update(state, current, &coupled, t1, t2);
                        (voltage, current)
                    }
                };
                result.record_branch(branch, voltage, current);
            }

            result.record_state(component, state.clone());
        }
    }
}

impl<N: Node> Circuit<N> {
    /// Simulate from `t1` to `t2` in `steps` equal steps.
    ///
    /// Component states are committed at the end, so a following simulation
    /// continues where this one stopped. On error the circuit keeps its
    /// previous states.
    pub fn simulate(&mut self, t1: f64, t2: f64, steps: usize) -> Result<TransientResult<N>> {
        validate_interval(t1, t2)?;
        validate_steps("steps", steps)?;

        log::debug!("transient analysis {t1:e} -> {t2:e} in {steps} steps");

        let mut states = self.snapshot_states();
        let result = {
            let stack = self.equation_stack()?;
            TransientEngine::new(&stack, self).simulate(t1, t2, steps, &mut states)?
        };
        self.commit_states(states);
        Ok(result)
    }
}

#[cfg(test)]
mod tests {
    use approx::assert_relative_eq;

    use crate::circuit::Circuit;
    use crate::components::{Capacitor, Resistor, VoltageSource};

    #[test]
    fn test_voltage_divider() {
        let mut circuit = Circuit::new();
        circuit.add(VoltageSource::dc("V1", 10.0), &["in", "gnd"]).unwrap();
        let r1 = circuit.add(Resistor::new("R1", 1000.0), &["in", "out"]).unwrap();
        circuit.add(Resistor::new("R2", 3000.0), &["out", "gnd"]).unwrap();

        let result = circuit.simulate(0.0, 1.0, 2).unwrap();
        assert_eq!(result.timesteps(), &[0.5, 1.0]);
        for v in result.potentials(&"out") {
            assert_relative_eq!(v, 7.5, max_relative = 1e-9);
        }
        let branch = circuit.branches(r1).unwrap()[0];
        assert_relative_eq!(result.currents(branch).unwrap()[1], 2.5e-3, max_relative = 1e-9);
        assert!(result.warnings().is_empty());
    }

    #[test]
    fn test_rc_charging_follows_exponential() {
        let r = 1e3;
        let c = 1e-6;
        let tau = r * c;

        let mut circuit = Circuit::new();
        circuit.add(VoltageSource::dc("V1", 1.0), &["in", "gnd"]).unwrap();
        circuit.add(Resistor::new("R1", r), &["in", "out"]).unwrap();
        let cap = circuit.add(Capacitor::new("C1", c), &["out", "gnd"]).unwrap();

        let result = circuit.simulate(0.0, 5.0 * tau, 500).unwrap();
        let v_out = result.potentials(&"out");
        assert!(v_out.windows(2).all(|w| w[1] > w[0]));
        // The start-up error of the trapezoidal rule decays with tau.
        for (t, v) in result.timesteps().iter().zip(&v_out) {
            if *t >= 3.0 * tau {
                let expected = 1.0 - (-t / tau).exp();
                assert!((v - expected).abs() < 1e-3, "t = {t}: {v} vs {expected}");
            }
        }

        // The committed state holds the final capacitor voltage.
        let state = circuit.state(cap).unwrap();
        assert_relative_eq!(state.scalar_at(0).unwrap(), v_out[499], max_relative = 1e-12);
    }

    #[test]
    fn test_invalid_parameters() {
        let mut circuit = Circuit::new();
        circuit.add(Resistor::new("R1", 1.0), &[1, 0]).unwrap();
        assert!(circuit.simulate(0.0, 1.0, 0).is_err());
        assert!(circuit.simulate(1.0, 0.0, 10).is_err());
    }
}
