//! Periodic steady-state analyses.
//!
//! Both analyses search for the compacted component state `x` that maps onto
//! itself after one pass of a periodic simulation, `x - P(x) = 0`, and return
//! one more pass started from the solution.

use nalgebra::DVector;

use super::linspace;
use super::result::{SolveReport, SteadyStateResult, TransientResult};
use super::transient::TransientEngine;
use crate::circuit::{validate_period, validate_steps, validate_time, Circuit, Node};
use crate::components::{compact, compact_like, uncompact, State, StateLayout};
use crate::error::{Result, SimError};
use crate::solver::{solve, NonlinearSystem, SolveContext};

/// One pass of a periodic simulation over compacted states.
enum Pass<'a> {
    Transient { t0: f64, period: f64, steps: usize },
    Envelope {
        t0: f64,
        period: f64,
        steps: usize,
        skips: &'a [usize],
    },
}

impl Pass<'_> {
    fn run<N: Node>(
        &self,
        engine: &TransientEngine<'_, N>,
        states: &mut Vec<State>,
    ) -> Result<TransientResult<N>> {
        match *self {
            Pass::Transient { t0, period, steps } => {
                engine.simulate(t0, t0 + period, steps, states)
            }
            Pass::Envelope {
                t0,
                period,
                steps,
                skips,
            } => engine.simulate_efm(t0, period, steps, skips, states),
        }
    }

    fn context(&self) -> SolveContext {
        match self {
            Pass::Transient { .. } => SolveContext::SteadyState,
            Pass::Envelope { .. } => SolveContext::MultivariateSteadyState,
        }
    }
}

/// `x - P(x)` for a periodic pass `P`.
struct PeriodicSystem<'e, 's, N> {
    engine: &'e TransientEngine<'s, N>,
    layout: &'e StateLayout,
    pass: &'e Pass<'e>,
}

impl<N: Node> NonlinearSystem for PeriodicSystem<'_, '_, N> {
    fn residual(&mut self, x: &DVector<f64>) -> Result<DVector<f64>> {
        let mut states = uncompact(x.as_slice(), self.layout)?;
        self.pass.run(self.engine, &mut states)?;
        Ok(x - compact_like(&states, self.layout)?)
    }
}

impl<N: Node> TransientEngine<'_, N> {
    fn periodic_steady_state(
        &self,
        pass: &Pass<'_>,
        states: &mut Vec<State>,
    ) -> Result<SteadyStateResult<N>> {
        let (x0, layout) = compact(states);
        let mut system = PeriodicSystem {
            engine: self,
            layout: &layout,
            pass,
        };
        let outcome = solve(&mut system, &x0, self.config)?;
        let warning = outcome.warning(pass.context());

        log::debug!(
            "steady state of {} state variable(s) after {} attempt(s), residual = {:.3e}",
            layout.len(),
            outcome.attempts,
            outcome.residual_norm()
        );

        *states = uncompact(outcome.x.as_slice(), &layout)?;
        let mut simulation = pass.run(self, states)?;
        if let Some(warning) = warning {
            simulation.push_warning(warning);
        }

        let report = SolveReport {
            attempts: outcome.attempts,
            converged: outcome.converged,
            residual_norm: outcome.residual_norm(),
        };
        Ok(SteadyStateResult::new(simulation, report))
    }
}

impl<N: Node> Circuit<N> {
    /// Find the periodic steady state for an excitation of period `period`.
    ///
    /// Solves for the component states that repeat after simulating
    /// `[t0, t0 + period]` in `steps` steps, then returns that simulation
    /// started from the solved states.
    pub fn steadystate(&mut self, period: f64, steps: usize, t0: f64) -> Result<SteadyStateResult<N>> {
        validate_period("period", period)?;
        validate_steps("steps", steps)?;
        validate_time("t0", t0)?;

        let pass = Pass::Transient { t0, period, steps };
        self.run_steady_state(&pass)
    }

    /// Find the periodic steady state of a slow envelope of period `t_slow`
    /// driven by a fast excitation of period `t_fast`.
    ///
    /// One slow period is covered by an envelope-following pass simulating
    /// `subdivisions + 1` fast periods of `fast_steps` steps each, following
    /// [`skip_schedule`]. The solved state repeats after that pass.
    ///
    /// [`DEFAULT_FAST_STEPS`](super::DEFAULT_FAST_STEPS) and
    /// [`DEFAULT_SUBDIVISIONS`](super::DEFAULT_SUBDIVISIONS) are reasonable
    /// starting values.
    pub fn multivariate_steadystate(
        &mut self,
        t0: f64,
        t_fast: f64,
        t_slow: f64,
        fast_steps: usize,
        subdivisions: usize,
    ) -> Result<SteadyStateResult<N>> {
        validate_time("t0", t0)?;
        validate_steps("fast_steps", fast_steps)?;
        let skips = skip_schedule(t_fast, t_slow, subdivisions)?;

        log::debug!("multivariate steady state with skips {skips:?}");

        let pass = Pass::Envelope {
            t0,
            period: t_fast,
            steps: fast_steps,
            skips: &skips,
        };
        self.run_steady_state(&pass)
    }

    fn run_steady_state(&mut self, pass: &Pass<'_>) -> Result<SteadyStateResult<N>> {
        let mut states = self.snapshot_states();
        let result = {
            let stack = self.equation_stack()?;
            TransientEngine::new(&stack, self).periodic_steady_state(pass, &mut states)?
        };
        self.commit_states(states);
        Ok(result)
    }
}

/// Envelope-following schedule covering one slow period.
///
/// With `r = floor(t_slow / t_fast)` fast periods per slow period and
/// `s = min(subdivisions, r - 2)`, the simulated fast periods sit at the
/// floored points of `linspace(0, r - 1, s + 2)`; the skips are the gaps
/// between them. The schedule plus the final interval covers exactly `r`
/// fast periods.
pub fn skip_schedule(t_fast: f64, t_slow: f64, subdivisions: usize) -> Result<Vec<usize>> {
    validate_period("t_fast", t_fast)?;
    validate_period("t_slow", t_slow)?;

    let ratio = floor_div(t_slow, t_fast);
    if ratio < 2.0 {
        return Err(SimError::invalid_param(format!(
            "t_slow / t_fast must be at least 2, got t_slow = {t_slow}, t_fast = {t_fast}"
        )));
    }

    let subdivisions = (subdivisions as f64).min(ratio - 2.0) as usize;
    let points: Vec<f64> = linspace(0.0, ratio - 1.0, subdivisions + 2)
        .into_iter()
        .map(f64::floor)
        .collect();
    Ok(points
        .windows(2)
        .map(|w| (w[1] - w[0] - 1.0).max(0.0) as usize)
        .collect())
}

/// Floor division of positive numbers, derived from the exact remainder.
///
/// `1.0 / 0.1` rounds to `10.0` but `1.0 % 0.1` is almost `0.1`, so the
/// floored quotient is 9.
fn floor_div(a: f64, b: f64) -> f64 {
    let rem = a % b;
    let div = (a - rem) / b;
    let mut floor = div.floor();
    if div - floor > 0.5 {
        floor += 1.0;
    }
    floor
}

#[cfg(test)]
mod tests {
    use approx::assert_abs_diff_eq;

    use super::*;
    use crate::components::{Capacitor, Resistor, VoltageSource, Waveform};

    #[test]
    fn test_floor_div() {
        assert_eq!(floor_div(10.0, 0.25), 40.0);
        assert_eq!(floor_div(1.0, 0.1), 9.0);
        assert_eq!(floor_div(7.5, 2.0), 3.0);
    }

    #[test]
    fn test_skip_schedule() {
        assert_eq!(skip_schedule(0.25, 10.0, 2).unwrap(), vec![12, 12, 12]);
        assert_eq!(skip_schedule(1.0, 10.0, crate::analysis::DEFAULT_SUBDIVISIONS).unwrap(), vec![0; 9]);
        assert_eq!(skip_schedule(1.0, 20.0, 4).unwrap(), vec![2, 3, 3, 3, 3]);
        // Subdivisions are capped at r - 2
        assert_eq!(skip_schedule(1.0, 3.0, 8).unwrap(), vec![0, 0]);
        assert_eq!(skip_schedule(1.0, 2.0, 8).unwrap(), vec![0]);
    }

    #[test]
    fn test_skip_schedule_covers_slow_period() {
        let skips = skip_schedule(1e-3, 0.2, 8).unwrap();
        let covered: usize = skips.iter().map(|s| s + 1).sum::<usize>() + 1;
        assert_eq!(covered, 200);
        assert_eq!(skips.len(), 9);
    }

    #[test]
    fn test_skip_schedule_rejects_short_ratio() {
        assert!(skip_schedule(1.0, 1.5, 8).is_err());
        assert!(skip_schedule(0.0, 1.0, 8).is_err());
    }

    #[test]
    fn test_memoryless_circuit_converges_immediately() {
        let mut circuit = Circuit::new();
        circuit.add(VoltageSource::dc("V1", 5.0), &["a", "gnd"]).unwrap();
        circuit.add(Resistor::new("R1", 10.0), &["a", "gnd"]).unwrap();

        let result = circuit.steadystate(1.0, 4, 0.0).unwrap();
        assert!(result.converged());
        assert_eq!(result.report().attempts, 1);
        assert_eq!(result.len(), 4);
        assert_abs_diff_eq!(result.potentials(&"a")[3], 5.0, epsilon = 1e-9);
    }

    fn rc_lowpass(frequency: f64, r: f64, c: f64) -> (Circuit<&'static str>, crate::circuit::ComponentId) {
        let mut circuit = Circuit::new();
        circuit
            .add(VoltageSource::new("V1", Waveform::sine(1.0, frequency)), &["in", "gnd"])
            .unwrap();
        circuit.add(Resistor::new("R1", r), &["in", "out"]).unwrap();
        let cap = circuit.add(Capacitor::new("C1", c), &["out", "gnd"]).unwrap();
        (circuit, cap)
    }

    #[test]
    fn test_rc_steady_state_is_periodic() {
        let (mut circuit, cap) = rc_lowpass(1e3, 1e3, 1e-6);
        let period = 1e-3;

        let steady = circuit.steadystate(period, 50, 0.0).unwrap().ensure_converged().unwrap();
        let v_steady = steady.potentials(&"out");
        let peak = v_steady.iter().fold(0.0f64, |acc, v| acc.max(v.abs()));
        // |H| = 1 / sqrt(1 + (wRC)^2) ~ 0.157
        assert!(peak > 0.1 && peak < 0.2, "peak = {peak}");

        let state = circuit.state(cap).unwrap().clone();
        let next = circuit.simulate(0.0, period, 50).unwrap();
        for (a, b) in v_steady.iter().zip(next.potentials(&"out")) {
            assert_abs_diff_eq!(*a, b, epsilon = 1e-6);
        }
        let repeated = circuit.state(cap).unwrap();
        assert_abs_diff_eq!(
            state.scalar_at(0).unwrap(),
            repeated.scalar_at(0).unwrap(),
            epsilon = 1e-6
        );
    }

    #[test]
    fn test_multivariate_matches_single_period_steady_state() {
        let (mut reference, ref_cap) = rc_lowpass(1.0, 1.0, 5.0);
        reference.steadystate(1.0, 10, 0.0).unwrap();
        let expected = reference.state(ref_cap).unwrap().scalar_at(0).unwrap();

        let (mut circuit, cap) = rc_lowpass(1.0, 1.0, 5.0);
        let result = circuit.multivariate_steadystate(0.0, 1.0, 20.0, crate::analysis::DEFAULT_FAST_STEPS, 4).unwrap();
        assert!(result.converged());
        // Five simulated left intervals plus the final one
        assert_eq!(result.len(), 60);

        let v = circuit.state(cap).unwrap().scalar_at(0).unwrap();
        assert_abs_diff_eq!(v, expected, epsilon = 1e-5);
    }
}
