//! Invertible one-to-many mapping between components and their branches.

use indexmap::IndexMap;

use super::types::{BranchId, ComponentId};

/// Component → branches and branch → component, kept in lockstep.
///
/// Both directions preserve insertion order; component order defines the
/// order of the state snapshot threaded through every analysis.
#[derive(Debug, Clone, Default)]
pub struct ComponentBranches {
    forward: IndexMap<ComponentId, Vec<BranchId>>,
    reverse: IndexMap<BranchId, ComponentId>,
}

impl ComponentBranches {
    pub fn new() -> Self {
        Self::default()
    }

    /// Register a component with all of its branches at once.
    ///
    /// Returns `false` (and changes nothing) if the component or any of the
    /// branches is already mapped.
    pub fn insert(&mut self, component: ComponentId, branches: Vec<BranchId>) -> bool {
        if self.forward.contains_key(&component)
            || branches.iter().any(|branch| self.reverse.contains_key(branch))
        {
            return false;
        }
        for &branch in &branches {
            self.reverse.insert(branch, component);
        }
        self.forward.insert(component, branches);
        true
    }

    /// Drop a component and all of its branches.
    pub fn remove(&mut self, component: ComponentId) -> Option<Vec<BranchId>> {
        let branches = self.forward.shift_remove(&component)?;
        for branch in &branches {
            self.reverse.shift_remove(branch);
        }
        Some(branches)
    }

    pub fn contains(&self, component: ComponentId) -> bool {
        self.forward.contains_key(&component)
    }

    /// Branches of a component, in `connect` order.
    pub fn branches(&self, component: ComponentId) -> Option<&[BranchId]> {
        self.forward.get(&component).map(Vec::as_slice)
    }

    /// Owning component of a branch.
    pub fn component(&self, branch: BranchId) -> Option<ComponentId> {
        self.reverse.get(&branch).copied()
    }

    /// Position of a component in the state snapshot.
    pub fn position(&self, component: ComponentId) -> Option<usize> {
        self.forward.get_index_of(&component)
    }

    pub fn components(&self) -> impl Iterator<Item = ComponentId> + '_ {
        self.forward.keys().copied()
    }

    /// `(component, branches)` pairs in component order.
    pub fn iter(&self) -> impl Iterator<Item = (ComponentId, &[BranchId])> {
        self.forward
            .iter()
            .map(|(&component, branches)| (component, branches.as_slice()))
    }

    /// Every mapped branch, grouped by component.
    pub fn all_branches(&self) -> impl Iterator<Item = BranchId> + '_ {
        self.reverse.keys().copied()
    }

    pub fn len(&self) -> usize {
        self.forward.len()
    }

    pub fn is_empty(&self) -> bool {
        self.forward.is_empty()
    }
}
