//! Simulation results.

use std::sync::Arc;

use indexmap::IndexMap;
use nalgebra::DVector;

use crate::circuit::{BranchId, ComponentBranches, ComponentId, Node};
use crate::components::State;
use crate::error::Result;
use crate::solver::{UnknownLayout, UnmetPrecisionWarning};

/// Result of a transient simulation.
///
/// Every series has one entry per simulated step; the time point of entry `k`
/// is `timesteps()[k]`, the end of that step.
#[derive(Debug, Clone)]
pub struct TransientResult<N> {
    timesteps: Vec<f64>,
    solutions: Vec<DVector<f64>>,
    voltages: IndexMap<BranchId, Vec<f64>>,
    currents: IndexMap<BranchId, Vec<f64>>,
    states: IndexMap<ComponentId, Vec<State>>,
    component_branches: ComponentBranches,
    layout: Arc<UnknownLayout<N>>,
    warnings: Vec<UnmetPrecisionWarning>,
}

impl<N: Node> TransientResult<N> {
    pub(crate) fn new(layout: Arc<UnknownLayout<N>>, component_branches: &ComponentBranches) -> Self {
        Self {
            timesteps: Vec::new(),
            solutions: Vec::new(),
            voltages: component_branches
                .all_branches()
                .map(|branch| (branch, Vec::new()))
                .collect(),
            currents: component_branches
                .all_branches()
                .map(|branch| (branch, Vec::new()))
                .collect(),
            states: component_branches
                .components()
                .map(|component| (component, Vec::new()))
                .collect(),
            component_branches: component_branches.clone(),
            layout,
            warnings: Vec::new(),
        }
    }

    pub(crate) fn record_step(&mut self, t: f64, solution: DVector<f64>) {
        self.timesteps.push(t);
        self.solutions.push(solution);
    }

    pub(crate) fn record_branch(&mut self, branch: BranchId, voltage: f64, current: f64) {
        if let Some(series) = self.voltages.get_mut(&branch) {
            series.push(voltage);
        }
        if let Some(series) = self.currents.get_mut(&branch) {
            series.push(current);
        }
    }

    pub(crate) fn record_state(&mut self, component: ComponentId, state: State) {
        if let Some(series) = self.states.get_mut(&component) {
            series.push(state);
        }
    }

    pub(crate) fn push_warning(&mut self, warning: UnmetPrecisionWarning) {
        self.warnings.push(warning);
    }

    /// Concatenate a later simulation of the same circuit.
    pub(crate) fn append(&mut self, other: TransientResult<N>) {
        self.timesteps.extend(other.timesteps);
        self.solutions.extend(other.solutions);
        for (branch, series) in other.voltages {
            self.voltages.entry(branch).or_default().extend(series);
        }
        for (branch, series) in other.currents {
            self.currents.entry(branch).or_default().extend(series);
        }
        for (component, series) in other.states {
            self.states.entry(component).or_default().extend(series);
        }
        self.warnings.extend(other.warnings);
    }

    /// End time of every step.
    pub fn timesteps(&self) -> &[f64] {
        &self.timesteps
    }

    /// Raw solution vectors, laid out as described by [`layout`](Self::layout).
    pub fn solutions(&self) -> &[DVector<f64>] {
        &self.solutions
    }

    /// Number of recorded steps.
    pub fn len(&self) -> usize {
        self.timesteps.len()
    }

    pub fn is_empty(&self) -> bool {
        self.timesteps.is_empty()
    }

    /// Voltage series of a branch.
    pub fn voltages(&self, branch: BranchId) -> Option<&[f64]> {
        self.voltages.get(&branch).map(Vec::as_slice)
    }

    /// Current series of a branch.
    pub fn currents(&self, branch: BranchId) -> Option<&[f64]> {
        self.currents.get(&branch).map(Vec::as_slice)
    }

    /// State series of a component, each entry taken after its step.
    pub fn states(&self, component: ComponentId) -> Option<&[State]> {
        self.states.get(&component).map(Vec::as_slice)
    }

    /// Last recorded state of a component.
    pub fn final_state(&self, component: ComponentId) -> Option<&State> {
        self.states(component).and_then(<[State]>::last)
    }

    /// Potential series of a node. Reference nodes read as 0.
    pub fn potentials(&self, node: &N) -> Vec<f64> {
        self.solutions
            .iter()
            .map(|solution| self.layout.potential(solution.as_slice(), node))
            .collect()
    }

    /// Branches of every component, as they were when simulating.
    pub fn component_branches(&self) -> &ComponentBranches {
        &self.component_branches
    }

    pub fn layout(&self) -> &UnknownLayout<N> {
        &self.layout
    }

    /// Solves that did not reach the requested precision.
    pub fn warnings(&self) -> &[UnmetPrecisionWarning] {
        &self.warnings
    }

    /// Fail with [`SimError::PrecisionNotMet`](crate::error::SimError::PrecisionNotMet)
    /// if any solve did not converge.
    pub fn ensure_converged(mut self) -> Result<Self> {
        if self.warnings.is_empty() {
            Ok(self)
        } else {
            Err(self.warnings.swap_remove(0).into_error())
        }
    }
}

/// Outcome of the steady-state fixed-point solve.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct SolveReport {
    pub attempts: usize,
    pub converged: bool,
    pub residual_norm: f64,
}

/// Result of a steady-state analysis: the simulation of one period started
/// from the solved steady state.
#[derive(Debug, Clone)]
pub struct SteadyStateResult<N> {
    simulation: TransientResult<N>,
    report: SolveReport,
}

impl<N: Node> SteadyStateResult<N> {
    pub(crate) fn new(simulation: TransientResult<N>, report: SolveReport) -> Self {
        Self { simulation, report }
    }

    pub fn simulation(&self) -> &TransientResult<N> {
        &self.simulation
    }

    pub fn into_simulation(self) -> TransientResult<N> {
        self.simulation
    }

    pub fn report(&self) -> &SolveReport {
        &self.report
    }

    pub fn converged(&self) -> bool {
        self.report.converged
    }

    /// Fail if the fixed point or any step of the final simulation did not
    /// converge.
    pub fn ensure_converged(self) -> Result<Self> {
        let simulation = self.simulation.ensure_converged()?;
        Ok(Self {
            simulation,
            report: self.report,
        })
    }
}

impl<N> std::ops::Deref for SteadyStateResult<N> {
    type Target = TransientResult<N>;

    fn deref(&self) -> &Self::Target {
        &self.simulation
    }
}
