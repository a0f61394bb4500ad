// Copyright 2026 James Casey
// SPDX-License-Identifier: Apache-2.0

//! Sparse conditional constant propagation.
//!
//! Works the classic optimistic worklist over the SSA graph: every
//! variable starts [`Lattice::Unknown`], assignments of folded constants
//! lower it to `Const`, and conflicting or opaque values lower it to
//! `Varying`. Branch tests on proven constants mark only the taken edge
//! executable, and phis meet only over executable incoming edges, so
//! code behind a constant-false test never poisons the values it
//! defines. The executable edge set is the input to the unreachability
//! pass.

use std::collections::{BTreeSet, HashMap, HashSet, VecDeque};

use crate::control_flow::{BlockId, EdgeKind, Graph, Inst, Operand, Var};
use crate::scope::{BindingKind, Bindings};
use crate::tree::ConstValue;

use super::{EdgeSet, FlowPass, MethodAnalysis};

/// A point in the constancy lattice.
#[derive(Debug, Clone, PartialEq)]
pub enum Lattice {
    /// Optimistic start: no value seen yet.
    Unknown,
    /// Every execution produces exactly this value.
    Const(ConstValue),
    /// More than one value, or a value the analysis cannot track.
    Varying,
}

impl Lattice {
    /// The lattice meet. Commutative and idempotent; `Unknown` is the
    /// identity and `Varying` absorbs.
    #[must_use]
    pub fn meet(&self, other: &Lattice) -> Lattice {
        match (self, other) {
            (Lattice::Unknown, x) | (x, Lattice::Unknown) => x.clone(),
            (Lattice::Varying, _) | (_, Lattice::Varying) => Lattice::Varying,
            (Lattice::Const(a), Lattice::Const(b)) => {
                if a == b {
                    Lattice::Const(a.clone())
                } else {
                    Lattice::Varying
                }
            }
        }
    }

    /// The constant value, when proven.
    #[must_use]
    pub fn as_const(&self) -> Option<&ConstValue> {
        match self {
            Lattice::Const(value) => Some(value),
            _ => None,
        }
    }
}

pub(crate) struct ConstantPropagationPass;

impl FlowPass for ConstantPropagationPass {
    fn run(&self, analysis: &mut MethodAnalysis<'_>) {
        let (constants, executable) = propagate(analysis.graph, analysis.bindings);
        analysis.constants = Some(constants);
        analysis.executable = Some(executable);
    }
}

/// Runs the propagation and returns per-variable constancy plus the set
/// of executable edges.
#[must_use]
pub fn propagate(graph: &Graph, bindings: &Bindings) -> (HashMap<Var, Lattice>, EdgeSet) {
    // Blocks that read each variable, so a lowered value re-queues
    // exactly its readers.
    let mut uses: HashMap<Var, BTreeSet<BlockId>> = HashMap::new();
    for block in graph.block_ids() {
        for inst in &graph.block(block).insts {
            if let Inst::Phi { args, .. } = inst {
                for (_, var) in args {
                    uses.entry(*var).or_default().insert(block);
                }
            } else {
                inst.for_each_operand(|operand| {
                    if let Operand::Var(var) = operand {
                        uses.entry(*var).or_default().insert(block);
                    }
                });
            }
        }
    }

    let mut values: HashMap<Var, Lattice> = HashMap::new();
    let mut executable: EdgeSet = BTreeSet::new();
    let mut executable_pairs: HashSet<(BlockId, BlockId)> = HashSet::new();
    let mut block_executable = vec![false; graph.len()];
    let mut worklist: VecDeque<BlockId> = VecDeque::new();

    block_executable[graph.entry().index()] = true;
    worklist.push_back(graph.entry());

    while let Some(block) = worklist.pop_front() {
        let mut lowered: Vec<Var> = Vec::new();
        for inst in &graph.block(block).insts {
            match inst {
                Inst::Assign { dst, src, .. } => {
                    let value = eval_operand(src, &values, bindings);
                    if lower(&mut values, *dst, value) {
                        lowered.push(*dst);
                    }
                }
                Inst::Phi { dst, args, .. } => {
                    let mut met = Lattice::Unknown;
                    for (pred, var) in args {
                        if executable_pairs.contains(&(*pred, block)) {
                            met = met.meet(&var_lattice(var, &values, bindings));
                        }
                    }
                    if lower(&mut values, *dst, met) {
                        lowered.push(*dst);
                    }
                }
                Inst::Construct { dst, .. }
                | Inst::Call { dst, .. }
                | Inst::Super { dst, .. }
                | Inst::Yield { dst, .. } => {
                    if lower(&mut values, *dst, Lattice::Varying) {
                        lowered.push(*dst);
                    }
                }
                Inst::Test { .. } | Inst::Return { .. } | Inst::Raise { .. } => {}
            }
        }

        // The last test in the block governs its branch edges.
        let test = graph.block(block).insts.iter().rev().find_map(|inst| match inst {
            Inst::Test { cond, .. } => Some(eval_operand(cond, &values, bindings)),
            _ => None,
        });

        for &(succ, kind) in &graph.block(block).succs {
            let live = match kind {
                EdgeKind::BranchTrue | EdgeKind::BranchFalse => match &test {
                    // A branch pair without a test takes both arms; that
                    // is how zero-or-more block loops are shaped.
                    None => true,
                    Some(Lattice::Const(value)) => {
                        (value.truthy() && kind == EdgeKind::BranchTrue)
                            || (!value.truthy() && kind == EdgeKind::BranchFalse)
                    }
                    Some(Lattice::Varying) => true,
                    // Optimistic: wait until the condition settles.
                    Some(Lattice::Unknown) => false,
                },
                _ => true,
            };
            if live && executable.insert((block, succ, kind)) {
                executable_pairs.insert((block, succ));
                block_executable[succ.index()] = true;
                // A freshly executable edge re-meets the target's phis.
                worklist.push_back(succ);
            }
        }

        for var in lowered {
            if let Some(readers) = uses.get(&var) {
                for &reader in readers {
                    if block_executable[reader.index()] {
                        worklist.push_back(reader);
                    }
                }
            }
        }
    }

    (values, executable)
}

fn lower(values: &mut HashMap<Var, Lattice>, dst: Var, new: Lattice) -> bool {
    let old = values.get(&dst).cloned().unwrap_or(Lattice::Unknown);
    let met = old.meet(&new);
    if met == old {
        false
    } else {
        values.insert(dst, met);
        true
    }
}

fn eval_operand(operand: &Operand, values: &HashMap<Var, Lattice>, bindings: &Bindings) -> Lattice {
    match operand {
        Operand::Const(value) => Lattice::Const(value.clone()),
        Operand::Var(var) => var_lattice(var, values, bindings),
        Operand::SelfVal | Operand::Arg(_) | Operand::Opaque(_) => Lattice::Varying,
    }
}

fn var_lattice(var: &Var, values: &HashMap<Var, Lattice>, bindings: &Bindings) -> Lattice {
    let binding = bindings.get(var.binding);
    if !matches!(binding.kind, BindingKind::Local) {
        if let Some(value) = &binding.const_value {
            return Lattice::Const(value.clone());
        }
        return Lattice::Varying;
    }
    if var.version == 0 {
        // Reading a local before any write yields nil.
        return Lattice::Const(ConstValue::Nil);
    }
    values.get(var).cloned().unwrap_or(Lattice::Unknown)
}
