//! Time-domain analyses of a [`Circuit`](crate::circuit::Circuit).
//!
//! - `simulate`: plain transient analysis
//! - `simulate_efm`: envelope following, skipping whole periods
//! - `steadystate`: periodic steady state by fixed-point iteration
//! - `multivariate_steadystate`: periodic steady state of a slow envelope
//!   driven by a fast excitation
//!
//! Every analysis works on a snapshot of the component states and commits it
//! back to the circuit only when it succeeds.

mod efm;
mod result;
mod steadystate;
mod transient;

pub use result::{SolveReport, SteadyStateResult, TransientResult};
pub use steadystate::skip_schedule;

/// Default number of steps per fast period in `multivariate_steadystate`.
pub const DEFAULT_FAST_STEPS: usize = 10;

/// Default number of simulated fast periods per slow period.
pub const DEFAULT_SUBDIVISIONS: usize = 8;

/// `num` evenly spaced points over `[start, stop]`, endpoints included.
pub(crate) fn linspace(start: f64, stop: f64, num: usize) -> Vec<f64> {
    match num {
        0 => Vec::new(),
        1 => vec![start],
        _ => {
            let step = (stop - start) / (num - 1) as f64;
            let mut points: Vec<f64> = (0..num).map(|i| start + i as f64 * step).collect();
            points[num - 1] = stop;
            points
        }
    }
}
