//! MNA equation stack validation.
//!
//! These tests check the assembled equations of a mixed circuit against:
//! 1. Analytical operating points
//! 2. The specialized (lambdified) evaluators
//! 3. Central finite differences of the residual

use approx::{assert_abs_diff_eq, assert_relative_eq};
use envelope_core::components::{
    Capacitor, CurrentSource, Diode, DiodeParams, Inductor, Resistor, Vccs, VoltageSource,
    Waveform,
};
use envelope_core::{Circuit, State};
use nalgebra::DVector;

/// Small deterministic generator for randomized agreement tests.
struct XorShift(u64);

impl XorShift {
    fn next_f64(&mut self) -> f64 {
        let mut x = self.0;
        x ^= x << 13;
        x ^= x >> 7;
        x ^= x << 17;
        self.0 = x;
        (x >> 11) as f64 / (1u64 << 53) as f64
    }

    fn range(&mut self, lo: f64, hi: f64) -> f64 {
        lo + (hi - lo) * self.next_f64()
    }

    fn vector(&mut self, len: usize, lo: f64, hi: f64) -> DVector<f64> {
        DVector::from_fn(len, |_, _| self.range(lo, hi))
    }

    fn state_like(&mut self, state: &State) -> State {
        match state {
            State::Scalar(_) => State::Scalar(self.range(-1e-3, 1e-3)),
            State::List(items) => State::List(items.iter().map(|item| self.state_like(item)).collect()),
        }
    }
}

/// Circuit: V1 -- R1 -- a -- (D1 || C1) -- gnd, a -- L1 -- b -- (R2 || I1),
/// and G1 driving c from the voltage at a.
fn mixed_circuit() -> Circuit<&'static str> {
    let mut circuit = Circuit::new();
    circuit
        .add(VoltageSource::new("V1", Waveform::sine(1.0, 1e3)), &["in", "gnd"])
        .unwrap();
    circuit.add(Resistor::new("R1", 100.0), &["in", "a"]).unwrap();
    circuit.add(Diode::new("D1", DiodeParams::default()), &["a", "gnd"]).unwrap();
    circuit.add(Capacitor::new("C1", 1e-6), &["a", "gnd"]).unwrap();
    circuit.add(Inductor::new("L1", 1e-3), &["a", "b"]).unwrap();
    circuit.add(Resistor::new("R2", 50.0), &["b", "gnd"]).unwrap();
    circuit.add(CurrentSource::dc("I1", 1e-3), &["gnd", "b"]).unwrap();
    circuit
        .add(Vccs::new("G1", 0.02).with_input_conductance(1e-3), &["c", "gnd", "a", "gnd"])
        .unwrap();
    circuit.add(Resistor::new("R3", 200.0), &["c", "gnd"]).unwrap();
    circuit
}

#[test]
fn test_source_and_resistor_operating_point() {
    let mut circuit = Circuit::new();
    let v1 = circuit.add(VoltageSource::dc("V1", 5.0), &["A", "gnd"]).unwrap();
    let r1 = circuit.add(Resistor::new("R1", 10.0), &["A", "gnd"]).unwrap();

    for (t1, t2) in [(0.0, 1.0), (3.0, 3.5), (-2.0, 100.0)] {
        let result = circuit.simulate(t1, t2, 1).unwrap();
        assert_relative_eq!(result.potentials(&"A")[0], 5.0, max_relative = 1e-12);

        let resistor = circuit.branches(r1).unwrap()[0];
        let source = circuit.branches(v1).unwrap()[0];
        assert_relative_eq!(result.currents(resistor).unwrap()[0], 0.5, max_relative = 1e-12);
        assert_relative_eq!(result.voltages(resistor).unwrap()[0], 5.0, max_relative = 1e-12);
        // The source current flows against the branch direction.
        assert_relative_eq!(result.currents(source).unwrap()[0], -0.5, max_relative = 1e-12);
    }
}

#[test]
fn test_equation_count() {
    let circuit = mixed_circuit();
    let stack = circuit.equation_stack().unwrap();

    // gnd, in, a, b, c: the first node is the reference
    assert_eq!(stack.kirchhoff_count(), 4);
    // V1 and L1
    assert_eq!(stack.consecutive_count(), 2);
    assert_eq!(stack.len(), 6);
    assert_eq!(stack.layout().len(), stack.len());
    assert_eq!(stack.layout().node_index(&"gnd"), None);
    let mut indices: Vec<usize> = ["in", "a", "b", "c"]
        .iter()
        .filter_map(|node| stack.layout().node_index(node))
        .collect();
    indices.sort_unstable();
    assert_eq!(indices, vec![0, 1, 2, 3]);

    let l1 = circuit.find("L1").unwrap();
    let branch = circuit.branches(l1).unwrap()[0];
    assert_eq!(stack.layout().current_index(branch), Some(5));
}

#[test]
fn test_equation_count_per_connected_subset() {
    let mut circuit = Circuit::new();
    circuit.add(VoltageSource::dc("V1", 1.0), &["a", "g1"]).unwrap();
    circuit.add(Resistor::new("R1", 1.0), &["a", "g1"]).unwrap();
    let r2 = circuit.add(Resistor::new("R2", 1.0), &["b", "g2"]).unwrap();
    let l1 = circuit.add(Inductor::new("L1", 1.0), &["b", "g2"]).unwrap();

    {
        let stack = circuit.equation_stack().unwrap();
        assert_eq!(stack.kirchhoff_count(), 2);
        assert_eq!(stack.consecutive_count(), 2);
    }

    // Isolated nodes are the reference of their own subset.
    circuit.remove(r2).unwrap();
    circuit.remove(l1).unwrap();
    let stack = circuit.equation_stack().unwrap();
    assert_eq!(stack.kirchhoff_count(), 1);
    assert_eq!(stack.consecutive_count(), 1);
    assert_eq!(stack.len(), 2);
}

#[test]
fn test_lambdified_agrees_with_interpreted() {
    let circuit = mixed_circuit();
    let stack = circuit.equation_stack().unwrap();
    let equations = stack.lambdify();
    let jacobian = stack.lambdify_jacobian();
    let template = circuit.snapshot_states();
    let mut rng = XorShift(0x9e37_79b9_7f4a_7c15);

    for _ in 0..200 {
        let x = rng.vector(stack.len(), -1.0, 1.0);
        let states: Vec<State> = template.iter().map(|s| rng.state_like(s)).collect();
        let t1 = rng.range(0.0, 1.0);
        let t2 = t1 + rng.range(1e-6, 1e-3);

        let expected = stack.evaluate(&x, &states, t1, t2);
        let actual = equations.evaluate(&x, &states, t1, t2);
        for (a, e) in actual.iter().zip(expected.iter()) {
            assert_relative_eq!(*a, *e, epsilon = 1e-12, max_relative = 1e-12);
        }

        let expected = stack.jacobian(&x, &states, t1, t2);
        let actual = jacobian.evaluate(&x, &states, t1, t2);
        for (a, e) in actual.iter().zip(expected.iter()) {
            assert_relative_eq!(*a, *e, epsilon = 1e-12, max_relative = 1e-12);
        }
    }
}

#[test]
fn test_jacobian_matches_finite_differences() {
    let circuit = mixed_circuit();
    let stack = circuit.equation_stack().unwrap();
    let template = circuit.snapshot_states();
    let mut rng = XorShift(42);
    let h = 1e-6;

    for _ in 0..50 {
        let x = rng.vector(stack.len(), -1.0, 1.0);
        let states: Vec<State> = template.iter().map(|s| rng.state_like(s)).collect();
        let (t1, t2) = (0.0, 1e-4);

        let jac = stack.jacobian(&x, &states, t1, t2);
        for j in 0..stack.len() {
            let mut xp = x.clone();
            let mut xm = x.clone();
            xp[j] += h;
            xm[j] -= h;
            let column = (stack.evaluate(&xp, &states, t1, t2) - stack.evaluate(&xm, &states, t1, t2)) / (2.0 * h);
            for i in 0..stack.len() {
                assert_relative_eq!(jac[(i, j)], column[i], epsilon = 1e-4, max_relative = 1e-4);
            }
        }
    }
}

#[test]
fn test_residual_vanishes_at_solution() {
    let mut circuit = Circuit::new();
    circuit.add(VoltageSource::dc("V1", 10.0), &["in", "gnd"]).unwrap();
    circuit.add(Resistor::new("R1", 1000.0), &["in", "out"]).unwrap();
    circuit.add(Resistor::new("R2", 3000.0), &["out", "gnd"]).unwrap();

    let result = circuit.simulate(0.0, 1.0, 1).unwrap();
    let states = circuit.snapshot_states();
    let stack = circuit.equation_stack().unwrap();
    let residual = stack.evaluate(&result.solutions()[0], &states, 0.0, 1.0);
    for value in residual.iter() {
        assert_abs_diff_eq!(*value, 0.0, epsilon = 1e-9);
    }
    assert_relative_eq!(
        stack.get_voltage_between_nodes(&result.solutions()[0], &"gnd", &"out"),
        7.5,
        max_relative = 1e-9
    );
}
