// Copyright 2026 James Casey
// SPDX-License-Identifier: Apache-2.0

//! SSA conversion.
//!
//! Phis are inserted for every local binding at the iterated dominance
//! frontier of its definition blocks, with no liveness pruning: a dead
//! phi is harmless, a missing one is not. Renaming then walks the
//! dominator tree with per-binding version stacks. Only local bindings
//! (including builder temporaries) are versioned; instance variables,
//! class variables, globals and constants name shared slots whose
//! versions would be fiction across calls, so their reads and writes keep
//! version 0.
//!
//! A renamed use with no dominating definition keeps version 0 as well:
//! reading a local before any write yields nil, and the type engine
//! treats a version-0 local read exactly that way.

use std::collections::{BTreeMap, BTreeSet, HashMap};

use super::{BlockId, Dominators, Graph, Inst, Operand, Var};
use crate::scope::{BindingId, BindingKind, Bindings};

/// Converts `graph` to SSA form in place.
pub fn convert_to_ssa(graph: &mut Graph, doms: &Dominators, bindings: &Bindings) {
    insert_phis(graph, doms, bindings);
    rename(graph, doms, bindings);
}

fn is_local(bindings: &Bindings, binding: BindingId) -> bool {
    matches!(bindings.get(binding).kind, BindingKind::Local)
}

fn insert_phis(graph: &mut Graph, doms: &Dominators, bindings: &Bindings) {
    let mut defs: BTreeMap<BindingId, BTreeSet<BlockId>> = BTreeMap::new();
    for &block in doms.rpo() {
        for inst in &graph.block(block).insts {
            if let Some(dst) = inst.dst() {
                if is_local(bindings, dst.binding) {
                    defs.entry(dst.binding).or_default().insert(block);
                }
            }
        }
    }

    let mut pending: BTreeMap<BlockId, Vec<BindingId>> = BTreeMap::new();
    for (binding, blocks) in &defs {
        for target in doms.iterated_frontier(blocks) {
            pending.entry(target).or_default().push(*binding);
        }
    }

    for (block, binding_list) in pending {
        let phis: Vec<Inst> = binding_list
            .into_iter()
            .map(|binding| Inst::Phi {
                dst: Var::unversioned(binding),
                args: Vec::new(),
                node: None,
            })
            .collect();
        graph.block_mut(block).insts.splice(0..0, phis);
    }
}

fn top(stacks: &HashMap<BindingId, Vec<u32>>, binding: BindingId) -> u32 {
    stacks
        .get(&binding)
        .and_then(|s| s.last())
        .copied()
        .unwrap_or(0)
}

fn for_each_use(inst: &mut Inst, mut f: impl FnMut(&mut Operand)) {
    match inst {
        Inst::Assign { src, .. } => f(src),
        Inst::Construct { args, .. } | Inst::Super { args, .. } | Inst::Yield { args, .. } => {
            for arg in args {
                f(arg);
            }
        }
        Inst::Call { recv, args, .. } => {
            f(recv);
            for arg in args {
                f(arg);
            }
        }
        Inst::Test { cond, .. } => f(cond),
        Inst::Return { value, .. } => f(value),
        Inst::Raise { value, .. } => {
            if let Some(value) = value {
                f(value);
            }
        }
        // Phi arguments are filled from the predecessor's walk.
        Inst::Phi { .. } => {}
    }
}

fn rename(graph: &mut Graph, doms: &Dominators, bindings: &Bindings) {
    let mut stacks: HashMap<BindingId, Vec<u32>> = HashMap::new();
    let mut counters: HashMap<BindingId, u32> = HashMap::new();
    // (block, exiting): enter frames rename, exit frames pop versions.
    let mut work: Vec<(BlockId, bool)> = vec![(graph.entry(), false)];
    let mut pushed_frames: Vec<Vec<BindingId>> = Vec::new();

    while let Some((block, exiting)) = work.pop() {
        if exiting {
            if let Some(pushed) = pushed_frames.pop() {
                for binding in pushed {
                    if let Some(stack) = stacks.get_mut(&binding) {
                        stack.pop();
                    }
                }
            }
            continue;
        }
        work.push((block, true));

        let mut pushed = Vec::new();
        rename_block(graph, block, bindings, &mut stacks, &mut counters, &mut pushed);

        // One argument per predecessor, however many edge kinds connect
        // the pair.
        let succs: BTreeSet<BlockId> = graph.block(block).succs.iter().map(|&(s, _)| s).collect();
        for succ in succs {
            fill_phi_args(graph, succ, block, &stacks);
        }

        pushed_frames.push(pushed);
        for &child in doms.children(block).iter().rev() {
            work.push((child, false));
        }
    }
}

fn rename_block(
    graph: &mut Graph,
    block: BlockId,
    bindings: &Bindings,
    stacks: &mut HashMap<BindingId, Vec<u32>>,
    counters: &mut HashMap<BindingId, u32>,
    pushed: &mut Vec<BindingId>,
) {
    let mut new_def = |dst: &mut Var,
                       stacks: &mut HashMap<BindingId, Vec<u32>>,
                       counters: &mut HashMap<BindingId, u32>,
                       pushed: &mut Vec<BindingId>| {
        if !is_local(bindings, dst.binding) {
            return;
        }
        let counter = counters.entry(dst.binding).or_insert(0);
        *counter += 1;
        dst.version = *counter;
        stacks.entry(dst.binding).or_default().push(*counter);
        pushed.push(dst.binding);
    };

    for inst in &mut graph.block_mut(block).insts {
        if let Inst::Phi { dst, .. } = inst {
            new_def(dst, stacks, counters, pushed);
            continue;
        }
        for_each_use(inst, |operand| {
            if let Operand::Var(var) = operand {
                if is_local(bindings, var.binding) {
                    var.version = top(stacks, var.binding);
                }
            }
        });
        match inst {
            Inst::Assign { dst, .. }
            | Inst::Construct { dst, .. }
            | Inst::Call { dst, .. }
            | Inst::Super { dst, .. }
            | Inst::Yield { dst, .. } => new_def(dst, stacks, counters, pushed),
            _ => {}
        }
    }
}

fn fill_phi_args(
    graph: &mut Graph,
    succ: BlockId,
    pred: BlockId,
    stacks: &HashMap<BindingId, Vec<u32>>,
) {
    for inst in &mut graph.block_mut(succ).insts {
        let Inst::Phi { dst, args, .. } = inst else {
            // Phis sit at the block head.
            break;
        };
        let binding = dst.binding;
        args.push((
            pred,
            Var {
                binding,
                version: top(stacks, binding),
            },
        ));
    }
}

/// The SSA well-formedness check: every versioned local is defined
/// exactly once, every non-phi use is dominated by its definition, and
/// every phi operand names an actual predecessor and is defined at or
/// above that predecessor's tail. Used by tests, the property suite and
/// debug assertions.
#[must_use]
pub fn verify_ssa(graph: &Graph, doms: &Dominators, bindings: &Bindings) -> bool {
    let mut defs: HashMap<(BindingId, u32), (BlockId, usize)> = HashMap::new();
    for block in graph.block_ids() {
        for (index, inst) in graph.block(block).insts.iter().enumerate() {
            if let Some(dst) = inst.dst() {
                if is_local(bindings, dst.binding)
                    && dst.version != 0
                    && defs.insert((dst.binding, dst.version), (block, index)).is_some()
                {
                    return false;
                }
            }
        }
    }

    // Version 0 is the unset-reads-nil version and needs no definition.
    let def_reaches = |use_block: BlockId, use_index: usize, var: &Var| -> bool {
        if !is_local(bindings, var.binding) || var.version == 0 {
            return true;
        }
        let Some(&(def_block, def_index)) = defs.get(&(var.binding, var.version)) else {
            return false;
        };
        if def_block == use_block {
            def_index < use_index
        } else {
            doms.dominates(def_block, use_block)
        }
    };

    for block in graph.block_ids() {
        if !doms.is_reachable(block) {
            continue;
        }
        let data = graph.block(block);
        for (index, inst) in data.insts.iter().enumerate() {
            if let Inst::Phi { args, .. } = inst {
                for (pred, var) in args {
                    if !data.preds.contains(pred) {
                        return false;
                    }
                    if !def_reaches(*pred, usize::MAX, var) {
                        return false;
                    }
                }
                continue;
            }
            let mut ok = true;
            inst.for_each_operand(|operand| {
                if let Operand::Var(var) = operand {
                    if !def_reaches(block, index, var) {
                        ok = false;
                    }
                }
            });
            if !ok {
                return false;
            }
        }
    }
    true
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::control_flow::EdgeKind;
    use crate::scope::Scopes;
    use crate::tree::{Ast, NodeId};

    fn node() -> NodeId {
        Ast::from_raw(crate::test_helpers::program(vec![])).root()
    }

    struct Env {
        bindings: Bindings,
        x: BindingId,
    }

    fn env() -> Env {
        let mut bindings = Bindings::default();
        let mut scopes = Scopes::new(&mut bindings);
        let global = scopes.global();
        let x = scopes.define_local(&mut bindings, global, "x");
        Env { bindings, x }
    }

    fn assign_const(dst: BindingId, value: i64, node: NodeId) -> Inst {
        Inst::Assign {
            dst: Var::unversioned(dst),
            src: Operand::Const(crate::tree::ConstValue::Int(value)),
            node,
        }
    }

    #[test]
    fn diamond_assignment_meets_in_a_phi() {
        let env = env();
        let n = node();
        let mut graph = Graph::new();
        let fork = graph.add_block();
        let left = graph.add_block();
        let right = graph.add_block();
        let join = graph.add_block();
        graph.add_edge(graph.entry(), fork, EdgeKind::Sequential);
        graph.add_edge(fork, left, EdgeKind::BranchTrue);
        graph.add_edge(fork, right, EdgeKind::BranchFalse);
        graph.add_edge(left, join, EdgeKind::Sequential);
        graph.add_edge(right, join, EdgeKind::Sequential);
        graph.add_edge(join, graph.exit(), EdgeKind::Sequential);
        graph.append(left, assign_const(env.x, 1, n));
        graph.append(right, assign_const(env.x, 2, n));
        graph.append(
            join,
            Inst::Return {
                value: Operand::Var(Var::unversioned(env.x)),
                node: n,
            },
        );

        let doms = Dominators::compute(&graph);
        convert_to_ssa(&mut graph, &doms, &env.bindings);

        let phi = graph.block(join).insts.first().cloned();
        let Some(Inst::Phi { dst, args, .. }) = phi else {
            panic!("join must start with a phi, got {phi:?}");
        };
        assert_eq!(dst.binding, env.x);
        assert_ne!(dst.version, 0);
        assert_eq!(args.len(), 2, "one argument per predecessor");
        let versions: BTreeSet<u32> = args.iter().map(|(_, v)| v.version).collect();
        assert_eq!(versions.len(), 2, "each arm contributes its own version");
        // The return reads the phi's version.
        let Some(Inst::Return { value: Operand::Var(read), .. }) = graph.block(join).insts.last()
        else {
            panic!("return survives conversion");
        };
        assert_eq!(read.version, dst.version);
        assert!(verify_ssa(&graph, &doms, &env.bindings));
    }

    #[test]
    fn loop_head_phi_merges_entry_and_back_edge() {
        let env = env();
        let n = node();
        let mut graph = Graph::new();
        let head = graph.add_block();
        let body = graph.add_block();
        let after = graph.add_block();
        graph.add_edge(graph.entry(), head, EdgeKind::Sequential);
        graph.add_edge(head, body, EdgeKind::BranchTrue);
        graph.add_edge(head, after, EdgeKind::BranchFalse);
        graph.add_edge(body, head, EdgeKind::LoopBack);
        graph.add_edge(after, graph.exit(), EdgeKind::Sequential);
        graph.append(graph.entry(), assign_const(env.x, 0, n));
        graph.append(body, assign_const(env.x, 1, n));

        let doms = Dominators::compute(&graph);
        convert_to_ssa(&mut graph, &doms, &env.bindings);

        let Some(Inst::Phi { args, .. }) = graph.block(head).insts.first() else {
            panic!("loop head needs a phi for x");
        };
        assert_eq!(args.len(), 2, "entry version and loop-back version");
        assert!(verify_ssa(&graph, &doms, &env.bindings));
    }

    #[test]
    fn use_before_any_def_stays_version_zero() {
        let env = env();
        let n = node();
        let mut graph = Graph::new();
        graph.add_edge(graph.entry(), graph.exit(), EdgeKind::Sequential);
        graph.append(
            graph.entry(),
            Inst::Return {
                value: Operand::Var(Var::unversioned(env.x)),
                node: n,
            },
        );
        let doms = Dominators::compute(&graph);
        convert_to_ssa(&mut graph, &doms, &env.bindings);
        let Some(Inst::Return { value: Operand::Var(read), .. }) =
            graph.block(graph.entry()).insts.first()
        else {
            panic!("return survives conversion");
        };
        assert_eq!(read.version, 0, "read before write is the nil version");
    }

    #[test]
    fn straight_line_code_gets_no_phis() {
        let env = env();
        let n = node();
        let mut graph = Graph::new();
        let mid = graph.add_block();
        graph.add_edge(graph.entry(), mid, EdgeKind::Sequential);
        graph.add_edge(mid, graph.exit(), EdgeKind::Sequential);
        graph.append(graph.entry(), assign_const(env.x, 1, n));
        graph.append(mid, assign_const(env.x, 2, n));
        let doms = Dominators::compute(&graph);
        convert_to_ssa(&mut graph, &doms, &env.bindings);
        let phis = graph
            .block_ids()
            .flat_map(|b| graph.block(b).insts.clone())
            .filter(|i| matches!(i, Inst::Phi { .. }))
            .count();
        assert_eq!(phis, 0);
        // Re-definition bumps the version.
        let Some(Inst::Assign { dst, .. }) = graph.block(mid).insts.first() else {
            panic!("assign survives");
        };
        assert_eq!(dst.version, 2);
    }

    #[test]
    fn non_local_slots_are_never_versioned() {
        let mut bindings = Bindings::default();
        let mut scopes = Scopes::new(&mut bindings);
        let mut catalog = crate::entity::builtins::seed(&mut scopes, &mut bindings);
        let global = scopes.global();
        let mut resolver = crate::scope::NameResolver {
            scopes: &mut scopes,
            bindings: &mut bindings,
            catalog: &mut catalog,
        };
        let gvar = resolver.lookup_global("$count");
        let n = node();
        let mut graph = Graph::new();
        graph.add_edge(graph.entry(), graph.exit(), EdgeKind::Sequential);
        graph.append(graph.entry(), assign_const(gvar, 1, n));
        let doms = Dominators::compute(&graph);
        convert_to_ssa(&mut graph, &doms, &bindings);
        let Some(Inst::Assign { dst, .. }) = graph.block(graph.entry()).insts.first() else {
            panic!("assign survives");
        };
        assert_eq!(dst.version, 0, "globals keep the shared-slot version");
    }
}
