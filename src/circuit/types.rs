//! Core types for circuit representation.

use std::fmt;
use std::hash::Hash;

/// An electrical potential identifier.
///
/// Any hashable, cloneable value can name a node: strings, integers, enums.
/// Nodes have no attributes of their own; a node exists as soon as a branch
/// ends on it.
pub trait Node: Clone + Eq + Hash + fmt::Debug {}

impl<T: Clone + Eq + Hash + fmt::Debug> Node for T {}

/// A unique identifier for a component in a circuit.
///
/// Ids are handed out by [`Circuit::add`](super::Circuit::add) and are never
/// reused, so an id held past a removal simply stops resolving.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct ComponentId(pub usize);

impl fmt::Display for ComponentId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "C{}", self.0)
    }
}

/// A unique identifier for a branch (one edge of the topology graph).
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct BranchId(pub usize);

impl fmt::Display for BranchId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "B{}", self.0)
    }
}
