//! MNA equation stack.
//!
//! The stack turns the topology graph into a square system of nonlinear
//! equations `F(x) = 0` over the unknown vector
//!
//! ```text
//! x = [ v(node_1) .. v(node_k) | i(branch_1) .. i(branch_m) ]
//! ```
//!
//! where the nodes are all non-reference nodes and the branches are all
//! voltage-defining branches. Rows are one Kirchhoff current law equation per
//! non-reference node, followed by one branch-consecutive equation per
//! voltage-defining branch:
//!
//! ```text
//! KCL(n):  sum(+i over branches ending at n) + sum(-i over branches starting at n) = 0
//! BCE(b):  law_b(coupled) + v(source_b) - v(target_b) = 0
//! ```
//!
//! [`evaluate`](MnaEquationStack::evaluate) and
//! [`jacobian`](MnaEquationStack::jacobian) walk the equations through hash
//! lookups. [`lambdify`](MnaEquationStack::lambdify) and
//! [`lambdify_jacobian`](MnaEquationStack::lambdify_jacobian) produce
//! specialized evaluators with the same results.

use std::sync::Arc;

use indexmap::{IndexMap, IndexSet};
use nalgebra::{DMatrix, DVector};

use crate::circuit::{BranchId, ComponentBranches, Node, TopologyGraph};
use crate::components::{Branch, BranchKind, BranchLaw, State};
use crate::error::{Result, SimError};

/// Positions of the unknowns in the solution vector.
#[derive(Debug, Clone)]
pub struct UnknownLayout<N> {
    nodes: IndexSet<N>,
    currents: IndexSet<BranchId>,
}

impl<N: Node> UnknownLayout<N> {
    /// Total number of unknowns.
    pub fn len(&self) -> usize {
        self.nodes.len() + self.currents.len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Index of a node potential. `None` for reference nodes.
    pub fn node_index(&self, node: &N) -> Option<usize> {
        self.nodes.get_index_of(node)
    }

    /// Index of the auxiliary current of a voltage-defining branch.
    pub fn current_index(&self, branch: BranchId) -> Option<usize> {
        self.currents
            .get_index_of(&branch)
            .map(|index| index + self.nodes.len())
    }

    /// Non-reference nodes in unknown order.
    pub fn nodes(&self) -> impl Iterator<Item = &N> {
        self.nodes.iter()
    }

    /// Voltage-defining branches in unknown order.
    pub fn currents(&self) -> impl Iterator<Item = BranchId> + '_ {
        self.currents.iter().copied()
    }

    /// Potential of `node` in `solution`; reference nodes read as 0.
    pub fn potential(&self, solution: &[f64], node: &N) -> f64 {
        self.node_index(node).map_or(0.0, |index| solution[index])
    }

    fn current(&self, solution: &[f64], branch: BranchId) -> f64 {
        self.current_index(branch).map_or(0.0, |index| solution[index])
    }
}

/// A graph edge resolved against its owning component.
#[derive(Debug)]
pub(crate) struct Bound<'c, N> {
    pub law: &'c dyn BranchLaw,
    pub kind: BranchKind,
    pub source: &'c N,
    pub target: &'c N,
    /// Position of the owning component in the state snapshot
    pub slot: usize,
    /// All branches of the owning component, in `connect` order
    pub coupled: &'c [BranchId],
}

#[derive(Debug, Clone, Copy)]
pub(crate) enum KirchhoffTerm {
    /// Current computed by a current-defining branch
    Law { negative: bool, branch: BranchId },
    /// Auxiliary current of a voltage-defining branch
    Unknown { negative: bool, branch: BranchId },
}

#[derive(Debug)]
pub(crate) struct ConsecutiveEquation<'c, N> {
    pub branch: BranchId,
    pub source: &'c N,
    pub target: &'c N,
}

pub(crate) fn sign(negative: bool) -> f64 {
    if negative {
        -1.0
    } else {
        1.0
    }
}

/// Kirchhoff and branch-consecutive equations of a circuit.
///
/// The stack borrows the circuit topology, so the circuit cannot change while
/// a stack (or one of its specialized evaluators) is alive.
#[derive(Debug)]
pub struct MnaEquationStack<'c, N> {
    pub(crate) bindings: IndexMap<BranchId, Bound<'c, N>>,
    pub(crate) kirchhoff: Vec<Vec<KirchhoffTerm>>,
    pub(crate) consecutive: Vec<ConsecutiveEquation<'c, N>>,
    pub(crate) layout: Arc<UnknownLayout<N>>,
    graph: &'c TopologyGraph<N>,
}

impl<'c, N: Node> MnaEquationStack<'c, N> {
    /// Build the equations for `graph`.
    ///
    /// Every edge of the graph must be owned by a component in `mapping` and
    /// carry a law in `laws`.
    pub fn new(
        graph: &'c TopologyGraph<N>,
        mapping: &'c ComponentBranches,
        laws: &'c IndexMap<BranchId, Branch>,
    ) -> Result<Self> {
        let mut bindings = IndexMap::with_capacity(graph.edge_count());
        for (source, target, branch) in graph.edges() {
            let unmapped = || SimError::UnmappedBranch {
                branch: branch.to_string(),
            };
            let law = laws.get(&branch).ok_or_else(unmapped)?;
            let component = mapping.component(branch).ok_or_else(unmapped)?;
            let slot = mapping.position(component).ok_or_else(unmapped)?;
            let coupled = mapping.branches(component).ok_or_else(unmapped)?;
            bindings.insert(
                branch,
                Bound {
                    law: law.law(),
                    kind: law.kind(),
                    source,
                    target,
                    slot,
                    coupled,
                },
            );
        }
        if let Some(&missing) = bindings
            .values()
            .flat_map(|bound| bound.coupled.iter())
            .find(|branch| !bindings.contains_key(*branch))
        {
            return Err(SimError::UnmappedBranch {
                branch: missing.to_string(),
            });
        }

        let mut nodes = IndexSet::new();
        let mut kirchhoff = Vec::new();
        for subset in graph.weakly_connected_components() {
            // The first node of every subset is its reference node.
            for node in subset.into_iter().skip(1) {
                let incoming = graph.in_edges(node).map(|(_, _, branch)| (false, branch));
                let outgoing = graph.out_edges(node).map(|(_, _, branch)| (true, branch));
                let terms = incoming
                    .chain(outgoing)
                    .map(|(negative, branch)| match bindings[&branch].kind {
                        BranchKind::Current => KirchhoffTerm::Law { negative, branch },
                        BranchKind::Voltage => KirchhoffTerm::Unknown { negative, branch },
                    })
                    .collect();
                nodes.insert(node.clone());
                kirchhoff.push(terms);
            }
        }

        let mut currents = IndexSet::new();
        let mut consecutive = Vec::new();
        for (source, target, branch) in graph.edges() {
            if bindings[&branch].kind == BranchKind::Voltage {
                currents.insert(branch);
                consecutive.push(ConsecutiveEquation {
                    branch,
                    source,
                    target,
                });
            }
        }

        log::debug!(
            "MNA stack: {} node equations, {} branch equations",
            kirchhoff.len(),
            consecutive.len()
        );

        Ok(Self {
            bindings,
            kirchhoff,
            consecutive,
            layout: Arc::new(UnknownLayout { nodes, currents }),
            graph,
        })
    }

    /// Number of equations (and unknowns).
    pub fn len(&self) -> usize {
        self.kirchhoff.len() + self.consecutive.len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Number of Kirchhoff current law equations.
    pub fn kirchhoff_count(&self) -> usize {
        self.kirchhoff.len()
    }

    /// Number of branch-consecutive equations.
    pub fn consecutive_count(&self) -> usize {
        self.consecutive.len()
    }

    /// Unknown layout, shared with simulation results.
    pub fn layout(&self) -> &Arc<UnknownLayout<N>> {
        &self.layout
    }

    /// Evaluate `F(x)`.
    ///
    /// `states` is the state snapshot in circuit component order.
    pub fn evaluate(&self, x: &DVector<f64>, states: &[State], t1: f64, t2: f64) -> DVector<f64> {
        let x = x.as_slice();
        let mut out = DVector::zeros(self.len());

        for (row, terms) in self.kirchhoff.iter().enumerate() {
            let mut sum = 0.0;
            for term in terms {
                sum += match *term {
                    KirchhoffTerm::Law { negative, branch } => {
                        sign(negative) * self.branch_law_value(x, states, branch, t1, t2)
                    }
                    KirchhoffTerm::Unknown { negative, branch } => {
                        sign(negative) * self.layout.current(x, branch)
                    }
                };
            }
            out[row] = sum;
        }

        let offset = self.kirchhoff.len();
        for (k, equation) in self.consecutive.iter().enumerate() {
            out[offset + k] = self.branch_law_value(x, states, equation.branch, t1, t2)
                + self.layout.potential(x, equation.source)
                - self.layout.potential(x, equation.target);
        }

        out
    }

    /// Analytic Jacobian `dF/dx`.
    pub fn jacobian(&self, x: &DVector<f64>, states: &[State], t1: f64, t2: f64) -> DMatrix<f64> {
        let x = x.as_slice();
        let n = self.len();
        let mut jac = DMatrix::zeros(n, n);

        for (row, terms) in self.kirchhoff.iter().enumerate() {
            for term in terms {
                match *term {
                    KirchhoffTerm::Law { negative, branch } => {
                        self.scatter_law(&mut jac, row, sign(negative), x, states, branch, t1, t2)
                    }
                    KirchhoffTerm::Unknown { negative, branch } => {
                        if let Some(column) = self.layout.current_index(branch) {
                            jac[(row, column)] += sign(negative);
                        }
                    }
                }
            }
        }

        let offset = self.kirchhoff.len();
        for (k, equation) in self.consecutive.iter().enumerate() {
            let row = offset + k;
            self.scatter_law(&mut jac, row, 1.0, x, states, equation.branch, t1, t2);
            if let Some(column) = self.layout.node_index(equation.source) {
                jac[(row, column)] += 1.0;
            }
            if let Some(column) = self.layout.node_index(equation.target) {
                jac[(row, column)] -= 1.0;
            }
        }

        jac
    }

    /// Voltage `v(target) - v(source)` of any branch.
    pub fn get_voltage(&self, solution: &DVector<f64>, branch: BranchId) -> Option<f64> {
        self.graph
            .get_nodes(branch)
            .map(|(source, target)| self.get_voltage_between_nodes(solution, source, target))
    }

    /// Auxiliary current of a voltage-defining branch.
    pub fn get_current(&self, solution: &DVector<f64>, branch: BranchId) -> Option<f64> {
        self.layout
            .current_index(branch)
            .map(|index| solution[index])
    }

    /// Voltage `v(target) - v(source)` between two nodes.
    pub fn get_voltage_between_nodes(&self, solution: &DVector<f64>, source: &N, target: &N) -> f64 {
        let solution = solution.as_slice();
        self.layout.potential(solution, target) - self.layout.potential(solution, source)
    }

    /// The value a branch contributes to its component's coupled values:
    /// its voltage if current-defining, its current if voltage-defining.
    pub fn coupled_value(&self, solution: &DVector<f64>, branch: BranchId) -> Option<f64> {
        self.bindings
            .contains_key(&branch)
            .then(|| self.coupled_at(solution.as_slice(), branch))
    }

    fn coupled_at(&self, x: &[f64], branch: BranchId) -> f64 {
        let bound = &self.bindings[&branch];
        match bound.kind {
            BranchKind::Current => {
                self.layout.potential(x, bound.target) - self.layout.potential(x, bound.source)
            }
            BranchKind::Voltage => self.layout.current(x, branch),
        }
    }

    fn coupled_values(&self, x: &[f64], bound: &Bound<'c, N>) -> Vec<f64> {
        bound
            .coupled
            .iter()
            .map(|&branch| self.coupled_at(x, branch))
            .collect()
    }

    fn branch_law_value(&self, x: &[f64], states: &[State], branch: BranchId, t1: f64, t2: f64) -> f64 {
        let bound = &self.bindings[&branch];
        let coupled = self.coupled_values(x, bound);
        bound.law.value(&states[bound.slot], &coupled, t1, t2)
    }

    #[allow(clippy::too_many_arguments)]
    fn scatter_law(
        &self,
        jac: &mut DMatrix<f64>,
        row: usize,
        sign: f64,
        x: &[f64],
        states: &[State],
        branch: BranchId,
        t1: f64,
        t2: f64,
    ) {
        let bound = &self.bindings[&branch];
        let coupled = self.coupled_values(x, bound);
        let mut partials = vec![0.0; coupled.len()];
        bound
            .law
            .jacobian(&states[bound.slot], &coupled, t1, t2, &mut partials);

        for (&other, &partial) in bound.coupled.iter().zip(&partials) {
            let other_bound = &self.bindings[&other];
            match other_bound.kind {
                BranchKind::Current => {
                    if let Some(column) = self.layout.node_index(other_bound.target) {
                        jac[(row, column)] += sign * partial;
                    }
                    if let Some(column) = self.layout.node_index(other_bound.source) {
                        jac[(row, column)] -= sign * partial;
                    }
                }
                BranchKind::Voltage => {
                    if let Some(column) = self.layout.current_index(other) {
                        jac[(row, column)] += sign * partial;
                    }
                }
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::circuit::ComponentId;
    use crate::components::{Resistor, VoltageSource};

    struct Fixture {
        graph: TopologyGraph<&'static str>,
        mapping: ComponentBranches,
        laws: IndexMap<BranchId, Branch>,
    }

    // V1 = 5 V from gnd to a, R1 = 10 ohm from a to gnd, R2 = 10 ohm from a to b
    // with b left dangling.
    fn fixture() -> Fixture {
        let mut graph = TopologyGraph::new();
        let mut mapping = ComponentBranches::new();
        let mut laws = IndexMap::new();

        graph.add_edge("gnd", "a", BranchId(0)).unwrap();
        mapping.insert(ComponentId(0), vec![BranchId(0)]);
        laws.insert(BranchId(0), Branch::voltage(VoltageSource::dc("V1", 5.0)));

        graph.add_edge("gnd", "a", BranchId(1)).unwrap();
        mapping.insert(ComponentId(1), vec![BranchId(1)]);
        laws.insert(BranchId(1), Branch::current(Resistor::new("R1", 10.0)));

        graph.add_edge("b", "a", BranchId(2)).unwrap();
        mapping.insert(ComponentId(2), vec![BranchId(2)]);
        laws.insert(BranchId(2), Branch::current(Resistor::new("R2", 10.0)));

        Fixture {
            graph,
            mapping,
            laws,
        }
    }

    fn states() -> Vec<State> {
        vec![State::empty(); 3]
    }

    #[test]
    fn test_layout_and_counts() {
        let f = fixture();
        let stack = MnaEquationStack::new(&f.graph, &f.mapping, &f.laws).unwrap();

        assert_eq!(stack.kirchhoff_count(), 2);
        assert_eq!(stack.consecutive_count(), 1);
        assert_eq!(stack.len(), 3);
        assert_eq!(stack.layout().node_index(&"gnd"), None);
        assert_eq!(stack.layout().node_index(&"a"), Some(0));
        assert_eq!(stack.layout().node_index(&"b"), Some(1));
        assert_eq!(stack.layout().current_index(BranchId(0)), Some(2));
    }

    #[test]
    fn test_evaluate_at_solution_is_zero() {
        let f = fixture();
        let stack = MnaEquationStack::new(&f.graph, &f.mapping, &f.laws).unwrap();

        // v(a) = 5, v(b) = 5 (no current through R2), i(V1) = -0.5
        let x = DVector::from_vec(vec![5.0, 5.0, -0.5]);
        let residual = stack.evaluate(&x, &states(), 0.0, 1.0);
        assert!(residual.amax() < 1e-12);

        assert_eq!(stack.get_voltage(&x, BranchId(1)), Some(5.0));
        assert_eq!(stack.get_current(&x, BranchId(0)), Some(-0.5));
        assert_eq!(stack.get_current(&x, BranchId(1)), None);
        assert_eq!(stack.get_voltage_between_nodes(&x, &"a", &"gnd"), -5.0);
        assert_eq!(stack.coupled_value(&x, BranchId(0)), Some(-0.5));
        assert_eq!(stack.coupled_value(&x, BranchId(9)), None);
    }

    #[test]
    fn test_jacobian_entries() {
        let f = fixture();
        let stack = MnaEquationStack::new(&f.graph, &f.mapping, &f.laws).unwrap();
        let x = DVector::from_vec(vec![1.0, 2.0, 3.0]);
        let jac = stack.jacobian(&x, &states(), 0.0, 1.0);

        let expected = DMatrix::from_row_slice(
            3,
            3,
            &[
                0.2, -0.1, 1.0, // KCL(a): R1 + R2 + i(V1)
                -0.1, 0.1, 0.0, // KCL(b): -R2
                -1.0, 0.0, 0.0, // BCE(V1): 5 + v(gnd) - v(a)
            ],
        );
        assert!((jac - expected).amax() < 1e-12);
    }

    #[test]
    fn test_unmapped_branch_is_rejected() {
        let mut f = fixture();
        f.graph.add_edge("a", "c", BranchId(7)).unwrap();
        assert!(matches!(
            MnaEquationStack::new(&f.graph, &f.mapping, &f.laws),
            Err(SimError::UnmappedBranch { .. })
        ));
    }

    #[test]
    fn test_empty_graph() {
        let graph = TopologyGraph::<u8>::new();
        let mapping = ComponentBranches::new();
        let laws = IndexMap::new();
        let stack = MnaEquationStack::new(&graph, &mapping, &laws).unwrap();
        assert!(stack.is_empty());
        assert_eq!(stack.evaluate(&DVector::zeros(0), &[], 0.0, 1.0).len(), 0);
    }
}
