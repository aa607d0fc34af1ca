//! Circuit structure.

use indexmap::IndexMap;

use super::mapping::ComponentBranches;
use super::topology::TopologyGraph;
use super::types::{BranchId, ComponentId, Node};
use crate::components::{Branch, Component, State};
use crate::error::{Result, SimError};
use crate::solver::{MnaEquationStack, SolverConfig};

/// A component together with its committed state.
#[derive(Debug)]
struct Entry<N> {
    component: Box<dyn Component<N>>,
    state: State,
}

/// A circuit: components wired into a topology graph.
///
/// Components are added with the nodes their terminals connect to; each one
/// contributes one or more branches. The circuit owns the committed state of
/// every component. Simulations run on a snapshot of those states and commit
/// it back when they finish, so consecutive simulations continue where the
/// previous one stopped.
#[derive(Debug)]
pub struct Circuit<N> {
    graph: TopologyGraph<N>,
    mapping: ComponentBranches,
    laws: IndexMap<BranchId, Branch>,
    /// Same order as `mapping`
    entries: IndexMap<ComponentId, Entry<N>>,
    config: SolverConfig,
    next_component: usize,
    next_branch: usize,
}

impl<N: Node> Default for Circuit<N> {
    fn default() -> Self {
        Self::new()
    }
}

impl<N: Node> Circuit<N> {
    /// Create an empty circuit with the default solver configuration.
    pub fn new() -> Self {
        Self::with_config(SolverConfig::default())
    }

    /// Create an empty circuit with a custom solver configuration.
    pub fn with_config(config: SolverConfig) -> Self {
        Self {
            graph: TopologyGraph::new(),
            mapping: ComponentBranches::new(),
            laws: IndexMap::new(),
            entries: IndexMap::new(),
            config,
            next_component: 0,
            next_branch: 0,
        }
    }

    /// Add a component connected to `terminals`.
    ///
    /// Fails without changing the circuit if a component with the same name
    /// is already present, or if the component rejects the terminals.
    pub fn add<C: Component<N> + 'static>(&mut self, component: C, terminals: &[N]) -> Result<ComponentId> {
        self.add_boxed(Box::new(component), terminals)
    }

    /// Add an already boxed component.
    pub fn add_boxed(&mut self, component: Box<dyn Component<N>>, terminals: &[N]) -> Result<ComponentId> {
        if self.find(component.name()).is_some() {
            return Err(SimError::DuplicateComponent {
                name: component.name().to_string(),
            });
        }

        let branches = component.connect(terminals)?;
        if branches.is_empty() {
            return Err(SimError::NoBranches {
                component: component.name().to_string(),
            });
        }

        let id = ComponentId(self.next_component);
        let mut ids = Vec::with_capacity(branches.len());
        for (offset, (source, target, branch)) in branches.into_iter().enumerate() {
            let branch_id = BranchId(self.next_branch + offset);
            if let Err(err) = self.graph.add_edge(source, target, branch_id) {
                for added in ids {
                    self.graph.remove_edge(added);
                    self.laws.shift_remove(&added);
                }
                return Err(err);
            }
            self.laws.insert(branch_id, branch);
            ids.push(branch_id);
        }

        log::debug!(
            "added component '{}' as {} with {} branch(es)",
            component.name(),
            id,
            ids.len()
        );

        self.next_branch += ids.len();
        self.next_component += 1;
        self.mapping.insert(id, ids);
        self.entries.insert(
            id,
            Entry {
                state: component.initial_state(),
                component,
            },
        );
        Ok(id)
    }

    /// Remove a component and all of its branches.
    ///
    /// Nodes stay in the topology graph. Returns `None` if the component is
    /// not part of the circuit.
    pub fn remove(&mut self, id: ComponentId) -> Option<Box<dyn Component<N>>> {
        let branches = self.mapping.remove(id)?;
        for branch in branches {
            self.graph.remove_edge(branch);
            self.laws.shift_remove(&branch);
        }
        self.entries.shift_remove(&id).map(|entry| entry.component)
    }

    /// All components, in insertion order.
    pub fn components(&self) -> impl Iterator<Item = (ComponentId, &dyn Component<N>)> {
        self.entries
            .iter()
            .map(|(&id, entry)| (id, entry.component.as_ref()))
    }

    pub fn component(&self, id: ComponentId) -> Option<&dyn Component<N>> {
        self.entries.get(&id).map(|entry| entry.component.as_ref())
    }

    /// Look up a component by name.
    pub fn find(&self, name: &str) -> Option<ComponentId> {
        self.entries
            .iter()
            .find(|(_, entry)| entry.component.name() == name)
            .map(|(&id, _)| id)
    }

    /// Branches of a component, in the order it created them.
    pub fn branches(&self, id: ComponentId) -> Option<&[BranchId]> {
        self.mapping.branches(id)
    }

    /// Component owning a branch.
    pub fn component_of(&self, branch: BranchId) -> Option<ComponentId> {
        self.mapping.component(branch)
    }

    /// Committed state of a component.
    pub fn state(&self, id: ComponentId) -> Option<&State> {
        self.entries.get(&id).map(|entry| &entry.state)
    }

    /// Overwrite the committed state of a component.
    pub fn set_state(&mut self, id: ComponentId, state: State) -> Result<()> {
        let entry = self
            .entries
            .get_mut(&id)
            .ok_or_else(|| SimError::UnknownComponent { id: id.to_string() })?;
        entry.state = state;
        Ok(())
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    pub fn graph(&self) -> &TopologyGraph<N> {
        &self.graph
    }

    pub fn config(&self) -> &SolverConfig {
        &self.config
    }

    pub fn set_config(&mut self, config: SolverConfig) {
        self.config = config;
    }

    /// Build the MNA equations of the present topology.
    pub fn equation_stack(&self) -> Result<MnaEquationStack<'_, N>> {
        MnaEquationStack::new(&self.graph, &self.mapping, &self.laws)
    }

    pub(crate) fn mapping(&self) -> &ComponentBranches {
        &self.mapping
    }

    pub(crate) fn laws(&self) -> &IndexMap<BranchId, Branch> {
        &self.laws
    }

    /// Copy of all committed states, in component order.
    pub fn snapshot_states(&self) -> Vec<State> {
        self.entries.values().map(|entry| entry.state.clone()).collect()
    }

    /// Commit a snapshot taken with [`snapshot_states`](Self::snapshot_states).
    pub(crate) fn commit_states(&mut self, states: Vec<State>) {
        for (entry, state) in self.entries.values_mut().zip(states) {
            entry.state = state;
        }
    }
}
