//! Envelope-following method (EFM).
//!
//! For circuits whose state drifts slowly across many periods `T` of a fast
//! excitation, most periods can be skipped. With `m = skip + 1`, the state at
//! the start of the interval `m` periods ahead is solved from the implicit
//! trapezoidal envelope equation
//!
//! ```text
//! s(t) - s(t + mT) + m/2 * [Δ(t) + Δ(t + mT)] = 0
//! ```
//!
//! where `Δ(τ)` is the change of the compacted state over one simulated
//! period starting at `τ`.

use nalgebra::DVector;

use super::result::TransientResult;
use super::transient::TransientEngine;
use crate::circuit::{validate_period, validate_skips, validate_steps, validate_time, Circuit, Node};
use crate::components::{compact, compact_like, uncompact, State, StateLayout};
use crate::error::Result;
use crate::solver::{solve, NonlinearSystem, SolveContext};

/// The envelope equation of one skip, over the state at the start of the
/// interval `m` periods ahead.
struct EnvelopeSystem<'e, 's, N> {
    engine: &'e TransientEngine<'s, N>,
    layout: &'e StateLayout,
    left: &'e DVector<f64>,
    left_delta: &'e DVector<f64>,
    m: f64,
    t1: f64,
    t2: f64,
    steps: usize,
}

impl<N: Node> NonlinearSystem for EnvelopeSystem<'_, '_, N> {
    fn residual(&mut self, right: &DVector<f64>) -> Result<DVector<f64>> {
        let mut states = uncompact(right.as_slice(), self.layout)?;
        self.engine.simulate(self.t1, self.t2, self.steps, &mut states)?;
        let right_delta = compact_like(&states, self.layout)? - right;
        Ok(self.left - right + (self.left_delta + right_delta) * (self.m * 0.5))
    }
}

impl<N: Node> TransientEngine<'_, N> {
    /// Run the envelope-following method from `t0`, advancing `states`.
    ///
    /// The result holds every simulated left interval plus the final
    /// interval; the probe simulations of the skipped intervals are not part
    /// of it.
    pub(crate) fn simulate_efm(
        &self,
        t0: f64,
        period: f64,
        interval_steps: usize,
        skips: &[usize],
        states: &mut Vec<State>,
    ) -> Result<TransientResult<N>> {
        let mut result = self.empty_result();
        let mut start = t0;

        for &skip in skips {
            let m = (skip + 1) as f64;

            let (left, layout) = compact(states);
            let interval = self.simulate(start, start + period, interval_steps, states)?;
            let left_delta = compact_like(states, &layout)? - &left;
            result.append(interval);

            let right_start = start + m * period;
            let mut system = EnvelopeSystem {
                engine: self,
                layout: &layout,
                left: &left,
                left_delta: &left_delta,
                m,
                t1: right_start,
                t2: right_start + period,
                steps: interval_steps,
            };
            // Forward Euler along the envelope
            let guess = &left + &left_delta * m;
            let outcome = solve(&mut system, &guess, self.config)?;
            if let Some(warning) = outcome.warning(SolveContext::EnvelopeSkip { time: start, skip }) {
                result.push_warning(warning);
            }

            log::debug!(
                "EFM skip of {} periods at {:e}: {} attempt(s)",
                skip,
                start,
                outcome.attempts
            );

            *states = uncompact(outcome.x.as_slice(), &layout)?;
            start = right_start;
        }

        let last = self.simulate(start, start + period, interval_steps, states)?;
        result.append(last);
        Ok(result)
    }
}

impl<N: Node> Circuit<N> {
    /// Simulate with the envelope-following method.
    ///
    /// Starting at `t0`, for every entry `s` of `skips` one period `period`
    /// is simulated in `interval_steps` steps, then `s` periods are skipped by
    /// solving the envelope equation. One more period is simulated at the
    /// end, so `skips` covers `sum(s + 1) + 1` periods in total.
    pub fn simulate_efm(
        &mut self,
        t0: f64,
        period: f64,
        interval_steps: usize,
        skips: &[usize],
    ) -> Result<TransientResult<N>> {
        validate_skips(skips)?;
        validate_steps("interval_steps", interval_steps)?;
        validate_time("t0", t0)?;
        validate_period("period", period)?;

        let mut states = self.snapshot_states();
        let result = {
            let stack = self.equation_stack()?;
            TransientEngine::new(&stack, self).simulate_efm(t0, period, interval_steps, skips, &mut states)?
        };
        self.commit_states(states);
        Ok(result)
    }
}
