// Copyright 2026 James Casey
// SPDX-License-Identifier: Apache-2.0

//! Unreachable code detection.
//!
//! Walks the graph from the entry block over the executable edges the
//! constant propagation pass proved, so code behind a constant-false
//! test counts as unreachable even though a structural path exists.
//! Unreached blocks are flagged and retained: `reachable` is cleared,
//! the block stays in the graph, and later passes skip it.

use std::collections::{BTreeSet, VecDeque};

use crate::control_flow::{BlockId, Graph};
use crate::diagnostics::{Diagnostic, DiagnosticKind};

use super::{EdgeSet, FlowPass, MethodAnalysis};

pub(crate) struct UnreachabilityPass;

impl FlowPass for UnreachabilityPass {
    fn run(&self, analysis: &mut MethodAnalysis<'_>) {
        let reached = reached(analysis.graph, analysis.executable.as_ref());
        let ids: Vec<BlockId> = analysis.graph.block_ids().collect();
        for block in ids {
            if reached.contains(&block) {
                continue;
            }
            analysis.graph.block_mut(block).reachable = false;
            let Some(origin) = analysis.graph.block(block).origin else {
                continue;
            };
            if analysis.ast.has_diagnostic(origin, DiagnosticKind::UnreachableCode) {
                continue;
            }
            let span = analysis.ast.span(origin);
            analysis.ast.attach(
                origin,
                Diagnostic::warning(DiagnosticKind::UnreachableCode, "unreachable code")
                    .with_span_opt(span),
            );
        }
    }
}

fn reached(graph: &Graph, executable: Option<&EdgeSet>) -> BTreeSet<BlockId> {
    let mut seen = BTreeSet::from([graph.entry()]);
    let mut queue = VecDeque::from([graph.entry()]);
    while let Some(block) = queue.pop_front() {
        for &(succ, kind) in &graph.block(block).succs {
            let live = executable.is_none_or(|set| set.contains(&(block, succ, kind)));
            if live && seen.insert(succ) {
                queue.push_back(succ);
            }
        }
    }
    seen
}

#[cfg(test)]
mod tests {
    use super::super::constant_propagation::ConstantPropagationPass;
    use super::*;
    use crate::control_flow::{convert_to_ssa, Dominators, EdgeKind, Inst, Operand, Var};
    use crate::scope::{Bindings, Scopes};
    use crate::test_helpers::{int, program};
    use crate::tree::{Ast, ConstValue, NodeId};

    fn two_node_ast() -> (Ast, NodeId, NodeId) {
        let ast = Ast::from_raw(program(vec![int(1), int(2)]));
        let children = ast.raw_children(ast.root()).to_vec();
        (ast, children[0], children[1])
    }

    #[test]
    fn orphan_block_is_flagged_and_retained() {
        let (mut ast, live_node, dead_node) = two_node_ast();
        let bindings = Bindings::default();

        let mut graph = Graph::new();
        let body = graph.add_block();
        let orphan = graph.add_block();
        graph.add_edge(graph.entry(), body, EdgeKind::Sequential);
        graph.add_edge(body, graph.exit(), EdgeKind::Sequential);
        graph.append(
            body,
            Inst::Return {
                value: Operand::Const(ConstValue::Int(1)),
                node: live_node,
            },
        );
        graph.append(
            orphan,
            Inst::Return {
                value: Operand::Const(ConstValue::Int(2)),
                node: dead_node,
            },
        );
        let before = graph.len();

        let mut analysis = MethodAnalysis::new(&mut ast, &mut graph, &bindings);
        UnreachabilityPass.run(&mut analysis);

        assert!(!graph.block(orphan).reachable);
        assert!(graph.block(body).reachable);
        assert_eq!(graph.len(), before, "flagged blocks are retained");
        assert!(ast.has_diagnostic(dead_node, DiagnosticKind::UnreachableCode));
        assert!(!ast.has_diagnostic(live_node, DiagnosticKind::UnreachableCode));
    }

    #[test]
    fn constant_false_test_kills_its_body() {
        let (mut ast, cond_node, body_node) = two_node_ast();
        let mut bindings = Bindings::default();
        let mut scopes = Scopes::new(&mut bindings);
        let global = scopes.global();
        let flag = scopes.define_local(&mut bindings, global, "flag");

        // flag = false; while flag { body }; after
        let mut graph = Graph::new();
        let head = graph.add_block();
        let body = graph.add_block();
        let after = graph.add_block();
        graph.add_edge(graph.entry(), head, EdgeKind::Sequential);
        graph.add_edge(head, body, EdgeKind::BranchTrue);
        graph.add_edge(head, after, EdgeKind::BranchFalse);
        graph.add_edge(body, head, EdgeKind::LoopBack);
        graph.add_edge(after, graph.exit(), EdgeKind::Sequential);
        graph.append(
            graph.entry(),
            Inst::Assign {
                dst: Var::unversioned(flag),
                src: Operand::Const(ConstValue::Bool(false)),
                node: cond_node,
            },
        );
        graph.append(
            head,
            Inst::Test {
                cond: Operand::Var(Var::unversioned(flag)),
                node: cond_node,
            },
        );
        graph.append(
            body,
            Inst::Return {
                value: Operand::Const(ConstValue::Int(2)),
                node: body_node,
            },
        );
        let doms = Dominators::compute(&graph);
        convert_to_ssa(&mut graph, &doms, &bindings);

        let mut analysis = MethodAnalysis::new(&mut ast, &mut graph, &bindings);
        ConstantPropagationPass.run(&mut analysis);
        UnreachabilityPass.run(&mut analysis);

        assert!(!graph.block(body).reachable, "the loop body never runs");
        assert!(graph.block(after).reachable);
        assert!(ast.has_diagnostic(body_node, DiagnosticKind::UnreachableCode));
    }
}
