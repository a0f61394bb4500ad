// Copyright 2026 James Casey
// SPDX-License-Identifier: Apache-2.0

//! Variable liveness over the SSA graph.
//!
//! Backward fixpoint over reachable blocks, tracking locals only; shared
//! slots (instance variables, globals) escape the method and are never
//! "dead". Phi arguments count as uses at the tail of the matching
//! predecessor, and phi destinations as definitions at the head of their
//! own block, so a value merged at a join is live through the arm that
//! supplies it and no further.

use std::collections::BTreeSet;

use crate::control_flow::{BlockId, Graph, Inst, Operand, Var};
use crate::scope::{BindingKind, Bindings};

use super::{FlowPass, MethodAnalysis};

/// Per-block live-variable sets.
#[derive(Debug, Clone)]
pub struct Liveness {
    live_in: Vec<BTreeSet<Var>>,
    live_out: Vec<BTreeSet<Var>>,
}

pub(crate) struct LifetimePass;

impl FlowPass for LifetimePass {
    fn run(&self, analysis: &mut MethodAnalysis<'_>) {
        analysis.liveness = Some(Liveness::compute(analysis.graph, analysis.bindings));
    }
}

impl Liveness {
    /// Runs the fixpoint.
    #[must_use]
    pub fn compute(graph: &Graph, bindings: &Bindings) -> Self {
        let n = graph.len();
        let mut upward = vec![BTreeSet::new(); n];
        let mut defs = vec![BTreeSet::new(); n];
        for block in graph.block_ids() {
            let i = block.index();
            for inst in &graph.block(block).insts {
                if let Inst::Phi { dst, .. } = inst {
                    defs[i].insert(*dst);
                    continue;
                }
                inst.for_each_operand(|operand| {
                    if let Operand::Var(var) = operand {
                        if is_local(bindings, *var) && !defs[i].contains(var) {
                            upward[i].insert(*var);
                        }
                    }
                });
                if let Some(dst) = inst.dst() {
                    defs[i].insert(dst);
                }
            }
        }

        let mut live_in = vec![BTreeSet::new(); n];
        let mut live_out = vec![BTreeSet::new(); n];
        let blocks: Vec<BlockId> = graph
            .block_ids()
            .filter(|&b| graph.block(b).reachable)
            .collect();
        let mut changed = true;
        while changed {
            changed = false;
            for &block in blocks.iter().rev() {
                let i = block.index();
                let mut out = BTreeSet::new();
                for &(succ, _) in &graph.block(block).succs {
                    if !graph.block(succ).reachable {
                        continue;
                    }
                    out.extend(live_in[succ.index()].iter().copied());
                    for inst in &graph.block(succ).insts {
                        let Inst::Phi { args, .. } = inst else { break };
                        for &(pred, var) in args {
                            if pred == block && is_local(bindings, var) {
                                out.insert(var);
                            }
                        }
                    }
                }
                let mut input = upward[i].clone();
                input.extend(out.difference(&defs[i]).copied());
                if out != live_out[i] || input != live_in[i] {
                    live_out[i] = out;
                    live_in[i] = input;
                    changed = true;
                }
            }
        }
        Liveness { live_in, live_out }
    }

    #[must_use]
    pub fn live_in(&self, block: BlockId) -> &BTreeSet<Var> {
        &self.live_in[block.index()]
    }

    #[must_use]
    pub fn live_out(&self, block: BlockId) -> &BTreeSet<Var> {
        &self.live_out[block.index()]
    }

    /// Whether `var` is still needed after the instruction at `index`.
    #[must_use]
    pub fn live_after(
        &self,
        graph: &Graph,
        bindings: &Bindings,
        block: BlockId,
        index: usize,
        var: Var,
    ) -> bool {
        let insts = &graph.block(block).insts;
        let mut live = self.live_out[block.index()].clone();
        for i in (index + 1..insts.len()).rev() {
            let inst = &insts[i];
            if let Some(dst) = inst.dst() {
                live.remove(&dst);
            }
            inst.for_each_operand(|operand| {
                if let Operand::Var(v) = operand {
                    if is_local(bindings, *v) {
                        live.insert(*v);
                    }
                }
            });
        }
        live.contains(&var)
    }
}

fn is_local(bindings: &Bindings, var: Var) -> bool {
    matches!(bindings.get(var.binding).kind, BindingKind::Local)
}
