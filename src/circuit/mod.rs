//! Circuit topology and component bookkeeping.
//!
//! - [`TopologyGraph`]: directed multigraph of branches between nodes
//! - [`ComponentBranches`]: invertible component ↔ branch mapping
//! - [`Circuit`]: owns both, plus the components and their states

mod graph;
mod mapping;
mod topology;
mod types;
mod validate;

pub use graph::Circuit;
pub use mapping::ComponentBranches;
pub use topology::{TopologyGraph, WeakComponents};
pub use types::*;
pub use validate::{
    validate_interval, validate_period, validate_skips, validate_steps, validate_time,
};
