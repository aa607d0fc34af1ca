//! Specialized evaluators for the MNA equation stack.
//!
//! Instead of walking the equations through hash lookups on every call, the
//! stack is flattened once into:
//! - an arena of the branches whose laws appear in any equation, each with the
//!   precomputed positions of its coupled values in the unknown vector;
//! - flat term lists indexing into that arena;
//! - for the Jacobian, a flat list of scatter operations.
//!
//! Every branch law is evaluated once per call. Terms are summed in the same
//! order as the interpreted path, so results match it exactly.

use indexmap::IndexMap;
use nalgebra::{DMatrix, DVector};

use super::mna::{sign, KirchhoffTerm, MnaEquationStack};
use crate::circuit::{BranchId, Node};
use crate::components::{BranchKind, BranchLaw, State};

fn read(x: &[f64], column: Option<usize>) -> f64 {
    column.map_or(0.0, |column| x[column])
}

/// Where a coupled value comes from.
#[derive(Debug, Clone, Copy)]
enum Probe {
    /// `v(target) - v(source)` of a current-defining branch
    Potential {
        target: Option<usize>,
        source: Option<usize>,
    },
    /// Auxiliary current of a voltage-defining branch
    Current(Option<usize>),
}

impl Probe {
    fn read(self, x: &[f64]) -> f64 {
        match self {
            Probe::Potential { target, source } => read(x, target) - read(x, source),
            Probe::Current(column) => read(x, column),
        }
    }
}

#[derive(Debug)]
struct CompiledBranch<'s> {
    law: &'s dyn BranchLaw,
    slot: usize,
    probes: Vec<Probe>,
}

impl CompiledBranch<'_> {
    fn coupled_into(&self, x: &[f64], out: &mut Vec<f64>) {
        out.clear();
        out.extend(self.probes.iter().map(|probe| probe.read(x)));
    }
}

#[derive(Debug, Clone, Copy)]
enum CompiledTerm {
    Law { sign: f64, branch: usize },
    Unknown { sign: f64, column: Option<usize> },
}

#[derive(Debug, Clone, Copy)]
struct CompiledConsecutive {
    branch: usize,
    source: Option<usize>,
    target: Option<usize>,
}

/// Flattened form of an equation stack.
#[derive(Debug)]
struct Program<'s> {
    arena: Vec<CompiledBranch<'s>>,
    terms: Vec<CompiledTerm>,
    /// End of each Kirchhoff row in `terms`
    row_ends: Vec<usize>,
    consecutive: Vec<CompiledConsecutive>,
    size: usize,
}

impl<'s> Program<'s> {
    fn compile<N: Node>(stack: &'s MnaEquationStack<'_, N>) -> Self {
        let layout = &stack.layout;
        let probe = |branch: BranchId| {
            let bound = &stack.bindings[&branch];
            match bound.kind {
                BranchKind::Current => Probe::Potential {
                    target: layout.node_index(bound.target),
                    source: layout.node_index(bound.source),
                },
                BranchKind::Voltage => Probe::Current(layout.current_index(branch)),
            }
        };

        let mut arena: IndexMap<BranchId, CompiledBranch<'s>> = IndexMap::new();
        let mut intern = |branch: BranchId| -> usize {
            if let Some(index) = arena.get_index_of(&branch) {
                return index;
            }
            let bound = &stack.bindings[&branch];
            let compiled = CompiledBranch {
                law: bound.law,
                slot: bound.slot,
                probes: bound.coupled.iter().map(|&other| probe(other)).collect(),
            };
            arena.insert_full(branch, compiled).0
        };

        let mut terms = Vec::new();
        let mut row_ends = Vec::with_capacity(stack.kirchhoff.len());
        for equation in &stack.kirchhoff {
            for term in equation {
                terms.push(match *term {
                    KirchhoffTerm::Law { negative, branch } => CompiledTerm::Law {
                        sign: sign(negative),
                        branch: intern(branch),
                    },
                    KirchhoffTerm::Unknown { negative, branch } => CompiledTerm::Unknown {
                        sign: sign(negative),
                        column: layout.current_index(branch),
                    },
                });
            }
            row_ends.push(terms.len());
        }

        let consecutive = stack
            .consecutive
            .iter()
            .map(|equation| CompiledConsecutive {
                branch: intern(equation.branch),
                source: layout.node_index(equation.source),
                target: layout.node_index(equation.target),
            })
            .collect();

        Self {
            arena: arena.into_values().collect(),
            terms,
            row_ends,
            consecutive,
            size: stack.len(),
        }
    }

    fn kirchhoff_rows(&self) -> impl Iterator<Item = &[CompiledTerm]> {
        let starts = std::iter::once(0).chain(self.row_ends.iter().copied());
        starts
            .zip(self.row_ends.iter().copied())
            .map(move |(start, end)| &self.terms[start..end])
    }
}

/// Specialized `F(x)`, see [`MnaEquationStack::lambdify`].
#[derive(Debug)]
pub struct LambdifiedEquations<'s> {
    program: Program<'s>,
}

impl LambdifiedEquations<'_> {
    /// Number of equations.
    pub fn len(&self) -> usize {
        self.program.size
    }

    pub fn is_empty(&self) -> bool {
        self.program.size == 0
    }

    /// Evaluate `F(x)`; identical to [`MnaEquationStack::evaluate`].
    pub fn evaluate(&self, x: &DVector<f64>, states: &[State], t1: f64, t2: f64) -> DVector<f64> {
        let x = x.as_slice();
        let program = &self.program;

        let mut coupled = Vec::new();
        let values: Vec<f64> = program
            .arena
            .iter()
            .map(|branch| {
                branch.coupled_into(x, &mut coupled);
                branch.law.value(&states[branch.slot], &coupled, t1, t2)
            })
            .collect();

        let mut out = DVector::zeros(program.size);
        for (row, terms) in program.kirchhoff_rows().enumerate() {
            let mut sum = 0.0;
            for term in terms {
                sum += match *term {
                    CompiledTerm::Law { sign, branch } => sign * values[branch],
                    CompiledTerm::Unknown { sign, column } => sign * read(x, column),
                };
            }
            out[row] = sum;
        }

        let offset = program.row_ends.len();
        for (k, equation) in program.consecutive.iter().enumerate() {
            out[offset + k] =
                values[equation.branch] + read(x, equation.source) - read(x, equation.target);
        }

        out
    }
}

#[derive(Debug, Clone, Copy)]
enum JacobianOp {
    /// `J[row, column] += sign * partials[index]`
    Partial {
        row: usize,
        column: usize,
        sign: f64,
        index: usize,
    },
    /// `J[row, column] += value`
    Constant { row: usize, column: usize, value: f64 },
}

/// Specialized `dF/dx`, see [`MnaEquationStack::lambdify_jacobian`].
#[derive(Debug)]
pub struct LambdifiedJacobian<'s> {
    program: Program<'s>,
    /// Start of each arena branch's partial derivatives
    offsets: Vec<usize>,
    partial_count: usize,
    ops: Vec<JacobianOp>,
}

impl<'s> LambdifiedJacobian<'s> {
    fn new(program: Program<'s>) -> Self {
        let mut offsets = Vec::with_capacity(program.arena.len());
        let mut partial_count = 0;
        for branch in &program.arena {
            offsets.push(partial_count);
            partial_count += branch.probes.len();
        }

        let mut ops = Vec::new();
        let scatter = |ops: &mut Vec<JacobianOp>, row: usize, sign: f64, branch: usize| {
            for (k, probe) in program.arena[branch].probes.iter().enumerate() {
                let index = offsets[branch] + k;
                let mut push = |column: Option<usize>, sign: f64| {
                    if let Some(column) = column {
                        ops.push(JacobianOp::Partial {
                            row,
                            column,
                            sign,
                            index,
                        });
                    }
                };
                match *probe {
                    Probe::Potential { target, source } => {
                        push(target, sign);
                        push(source, -sign);
                    }
                    Probe::Current(column) => push(column, sign),
                }
            }
        };

        for (row, terms) in program.kirchhoff_rows().enumerate() {
            for term in terms {
                match *term {
                    CompiledTerm::Law { sign, branch } => scatter(&mut ops, row, sign, branch),
                    CompiledTerm::Unknown { sign, column } => {
                        if let Some(column) = column {
                            ops.push(JacobianOp::Constant {
                                row,
                                column,
                                value: sign,
                            });
                        }
                    }
                }
            }
        }

        let offset = program.row_ends.len();
        for (k, equation) in program.consecutive.iter().enumerate() {
            let row = offset + k;
            scatter(&mut ops, row, 1.0, equation.branch);
            if let Some(column) = equation.source {
                ops.push(JacobianOp::Constant {
                    row,
                    column,
                    value: 1.0,
                });
            }
            if let Some(column) = equation.target {
                ops.push(JacobianOp::Constant {
                    row,
                    column,
                    value: -1.0,
                });
            }
        }

        Self {
            program,
            offsets,
            partial_count,
            ops,
        }
    }

    /// Evaluate `dF/dx`; identical to [`MnaEquationStack::jacobian`].
    pub fn evaluate(&self, x: &DVector<f64>, states: &[State], t1: f64, t2: f64) -> DMatrix<f64> {
        let x = x.as_slice();
        let program = &self.program;

        let mut coupled = Vec::new();
        let mut partials = vec![0.0; self.partial_count];
        for (branch, &offset) in program.arena.iter().zip(&self.offsets) {
            branch.coupled_into(x, &mut coupled);
            let out = &mut partials[offset..offset + coupled.len()];
            branch.law.jacobian(&states[branch.slot], &coupled, t1, t2, out);
        }

        let mut jac = DMatrix::zeros(program.size, program.size);
        for op in &self.ops {
            match *op {
                JacobianOp::Partial {
                    row,
                    column,
                    sign,
                    index,
                } => jac[(row, column)] += sign * partials[index],
                JacobianOp::Constant { row, column, value } => jac[(row, column)] += value,
            }
        }
        jac
    }
}

impl<'c, N: Node> MnaEquationStack<'c, N> {
    /// Flatten the stack into a specialized evaluator of `F(x)`.
    pub fn lambdify(&self) -> LambdifiedEquations<'_> {
        LambdifiedEquations {
            program: Program::compile(self),
        }
    }

    /// Flatten the stack into a specialized evaluator of `dF/dx`.
    pub fn lambdify_jacobian(&self) -> LambdifiedJacobian<'_> {
        LambdifiedJacobian::new(Program::compile(self))
    }
}
