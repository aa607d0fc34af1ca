//! Directed multigraph of circuit branches.
//!
//! Nodes are electrical potentials, edges are branches. Every branch id may
//! appear at most once in the whole graph; parallel edges between the same
//! pair of nodes are fine as long as their ids differ.

use std::collections::{HashSet, VecDeque};

use indexmap::{IndexMap, IndexSet};

use super::types::{BranchId, Node};
use crate::error::{Result, SimError};

/// Incident edges of one node, in insertion order.
#[derive(Debug, Clone, Default)]
struct Adjacency {
    incoming: IndexSet<BranchId>,
    outgoing: IndexSet<BranchId>,
}

/// Directed multigraph with unique edge keys.
#[derive(Debug, Clone)]
pub struct TopologyGraph<N> {
    nodes: IndexMap<N, Adjacency>,
    edges: IndexMap<BranchId, (N, N)>,
}

impl<N: Node> Default for TopologyGraph<N> {
    fn default() -> Self {
        Self::new()
    }
}

impl<N: Node> TopologyGraph<N> {
    /// Create an empty graph.
    pub fn new() -> Self {
        Self {
            nodes: IndexMap::new(),
            edges: IndexMap::new(),
        }
    }

    /// Add a branch from `source` to `target`.
    ///
    /// Fails if `branch` is already present anywhere in the graph.
    pub fn add_edge(&mut self, source: N, target: N, branch: BranchId) -> Result<()> {
        if self.edges.contains_key(&branch) {
            return Err(SimError::DuplicateBranch {
                branch: branch.to_string(),
            });
        }

        self.nodes
            .entry(source.clone())
            .or_default()
            .outgoing
            .insert(branch);
        self.nodes
            .entry(target.clone())
            .or_default()
            .incoming
            .insert(branch);
        self.edges.insert(branch, (source, target));
        Ok(())
    }

    /// Remove a branch. No-op if the branch is absent.
    ///
    /// Returns the endpoints of the removed branch. Nodes stay in the graph
    /// even if they lose their last edge.
    pub fn remove_edge(&mut self, branch: BranchId) -> Option<(N, N)> {
        let (source, target) = self.edges.shift_remove(&branch)?;
        if let Some(adjacency) = self.nodes.get_mut(&source) {
            adjacency.outgoing.shift_remove(&branch);
        }
        if let Some(adjacency) = self.nodes.get_mut(&target) {
            adjacency.incoming.shift_remove(&branch);
        }
        Some((source, target))
    }

    /// Endpoints `(source, target)` of a branch.
    pub fn get_nodes(&self, branch: BranchId) -> Option<(&N, &N)> {
        self.edges.get(&branch).map(|(s, t)| (s, t))
    }

    /// Branches ending on `node`, as `(source, target, branch)` triples.
    pub fn in_edges<'g>(&'g self, node: &N) -> impl Iterator<Item = (&'g N, &'g N, BranchId)> + 'g {
        self.incident(node, |adjacency| &adjacency.incoming)
    }

    /// Branches starting at `node`, as `(source, target, branch)` triples.
    pub fn out_edges<'g>(&'g self, node: &N) -> impl Iterator<Item = (&'g N, &'g N, BranchId)> + 'g {
        self.incident(node, |adjacency| &adjacency.outgoing)
    }

    fn incident<'g>(
        &'g self,
        node: &N,
        select: fn(&Adjacency) -> &IndexSet<BranchId>,
    ) -> impl Iterator<Item = (&'g N, &'g N, BranchId)> + 'g {
        self.nodes
            .get(node)
            .into_iter()
            .flat_map(move |adjacency| select(adjacency).iter())
            .filter_map(move |&branch| {
                self.edges
                    .get(&branch)
                    .map(|(source, target)| (source, target, branch))
            })
    }

    /// All branches in insertion order.
    pub fn edges(&self) -> impl Iterator<Item = (&N, &N, BranchId)> {
        self.edges
            .iter()
            .map(|(&branch, (source, target))| (source, target, branch))
    }

    /// All nodes in insertion order.
    pub fn nodes(&self) -> impl Iterator<Item = &N> {
        self.nodes.keys()
    }

    pub fn contains_node(&self, node: &N) -> bool {
        self.nodes.contains_key(node)
    }

    pub fn contains_branch(&self, branch: BranchId) -> bool {
        self.edges.contains_key(&branch)
    }

    pub fn node_count(&self) -> usize {
        self.nodes.len()
    }

    pub fn edge_count(&self) -> usize {
        self.edges.len()
    }

    /// Enumerate weakly-connected node subsets.
    ///
    /// Each subset is seeded at the earliest-inserted node not yet visited, and
    /// that seed is always the first element of the yielded set. The sequence
    /// is lazy and covers every node exactly once.
    pub fn weakly_connected_components(&self) -> WeakComponents<'_, N> {
        WeakComponents {
            graph: self,
            visited: HashSet::new(),
            cursor: 0,
        }
    }

    fn neighbours(&self, index: usize) -> impl Iterator<Item = usize> + '_ {
        self.nodes
            .get_index(index)
            .into_iter()
            .flat_map(move |(_, adjacency)| {
                let upstream = adjacency
                    .incoming
                    .iter()
                    .filter_map(move |branch| self.edges.get(branch).map(|(s, _)| s));
                let downstream = adjacency
                    .outgoing
                    .iter()
                    .filter_map(move |branch| self.edges.get(branch).map(|(_, t)| t));
                upstream.chain(downstream)
            })
            .filter_map(move |node| self.nodes.get_index_of(node))
    }
}

/// Lazy iterator over the weakly-connected subsets of a [`TopologyGraph`].
///
/// Breadth-first from each seed, so iteration order inside a subset is
/// reproducible for a given graph construction.
pub struct WeakComponents<'g, N> {
    graph: &'g TopologyGraph<N>,
    visited: HashSet<usize>,
    cursor: usize,
}

impl<'g, N: Node> Iterator for WeakComponents<'g, N> {
    type Item = Vec<&'g N>;

    fn next(&mut self) -> Option<Self::Item> {
        while self.cursor < self.graph.nodes.len() && self.visited.contains(&self.cursor) {
            self.cursor += 1;
        }
        if self.cursor >= self.graph.nodes.len() {
            return None;
        }

        let mut subset = Vec::new();
        let mut queue = VecDeque::from([self.cursor]);
        self.visited.insert(self.cursor);

        while let Some(index) = queue.pop_front() {
            if let Some((node, _)) = self.graph.nodes.get_index(index) {
                subset.push(node);
            }
            for neighbour in self.graph.neighbours(index) {
                if self.visited.insert(neighbour) {
                    queue.push_back(neighbour);
                }
            }
        }

        Some(subset)
    }
}
