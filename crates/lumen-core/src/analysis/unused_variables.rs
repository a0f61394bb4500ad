// Copyright 2026 James Casey
// SPDX-License-Identifier: Apache-2.0

//! Unused variable and parameter detection.
//!
//! A definition is used when some reachable non-phi instruction reads
//! it, directly or through a chain of phis. A phi that nothing reads
//! does not keep its arguments alive, so `x = 1` in both arms of a
//! branch is still reported when the merged value is never consumed.
//! Phis themselves are never reported; the report lands on the user
//! assignment that produced each dead value. Names starting with an
//! underscore and analyzer temporaries are exempt.

use std::collections::{BTreeSet, HashMap};

use crate::control_flow::{Inst, Operand, Var};
use crate::diagnostics::{Diagnostic, DiagnosticKind};
use crate::scope::BindingKind;

use super::{FlowPass, MethodAnalysis};

pub(crate) struct UnusedVariablePass;

impl FlowPass for UnusedVariablePass {
    fn run(&self, analysis: &mut MethodAnalysis<'_>) {
        let graph = &*analysis.graph;
        let bindings = analysis.bindings;

        let mut live: BTreeSet<Var> = BTreeSet::new();
        let mut queue: Vec<Var> = Vec::new();
        let mut phi_args: HashMap<Var, Vec<Var>> = HashMap::new();
        for block in graph.block_ids() {
            if !graph.block(block).reachable {
                continue;
            }
            for inst in &graph.block(block).insts {
                if let Inst::Phi { dst, args, .. } = inst {
                    phi_args
                        .entry(*dst)
                        .or_default()
                        .extend(args.iter().map(|&(_, var)| var));
                } else {
                    inst.for_each_operand(|operand| {
                        if let Operand::Var(var) = operand {
                            if live.insert(*var) {
                                queue.push(*var);
                            }
                        }
                    });
                }
            }
        }
        while let Some(var) = queue.pop() {
            if let Some(args) = phi_args.get(&var) {
                for &arg in args {
                    if live.insert(arg) {
                        queue.push(arg);
                    }
                }
            }
        }

        for block in graph.block_ids() {
            if !graph.block(block).reachable {
                continue;
            }
            for inst in &graph.block(block).insts {
                let Inst::Assign { dst, src, node } = inst else {
                    continue;
                };
                if live.contains(dst) {
                    continue;
                }
                let binding = bindings.get(dst.binding);
                if !matches!(binding.kind, BindingKind::Local)
                    || binding.synthetic
                    || binding.name.starts_with('_')
                {
                    continue;
                }
                if analysis.ast.has_diagnostic(*node, DiagnosticKind::UnusedVariable) {
                    continue;
                }
                let message = if matches!(src, Operand::Arg(_)) {
                    format!("parameter `{}` is never used", binding.name)
                } else {
                    format!("variable `{}` is assigned but never used", binding.name)
                };
                let span = analysis.ast.span(*node);
                analysis.ast.attach(
                    *node,
                    Diagnostic::warning(DiagnosticKind::UnusedVariable, message)
                        .with_span_opt(span),
                );
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::control_flow::{convert_to_ssa, Dominators, EdgeKind, Graph};
    use crate::scope::{Bindings, Scopes};
    use crate::test_helpers::{int, program};
    use crate::tree::{Ast, ConstValue, NodeId};

    struct Fixture {
        ast: Ast,
        nodes: Vec<NodeId>,
        bindings: Bindings,
        scopes: Scopes,
    }

    fn fixture() -> Fixture {
        let ast = Ast::from_raw(program(vec![int(1), int(2), int(3)]));
        let nodes = ast.raw_children(ast.root()).to_vec();
        let mut bindings = Bindings::default();
        let scopes = Scopes::new(&mut bindings);
        Fixture { ast, nodes, bindings, scopes }
    }

    impl Fixture {
        fn local(&mut self, name: &str) -> crate::scope::BindingId {
            let global = self.scopes.global();
            self.scopes.define_local(&mut self.bindings, global, name)
        }

        fn finish(&mut self, graph: &mut Graph) {
            let doms = Dominators::compute(graph);
            convert_to_ssa(graph, &doms, &self.bindings);
            let mut analysis = MethodAnalysis::new(&mut self.ast, graph, &self.bindings);
            UnusedVariablePass.run(&mut analysis);
        }
    }

    #[test]
    fn dead_assignment_is_reported_and_live_one_is_not() {
        let mut fx = fixture();
        let x = fx.local("x");
        let y = fx.local("y");

        let mut graph = Graph::new();
        let body = graph.add_block();
        graph.add_edge(graph.entry(), body, EdgeKind::Sequential);
        graph.add_edge(body, graph.exit(), EdgeKind::Sequential);
        graph.append(
            body,
            Inst::Assign {
                dst: Var::unversioned(x),
                src: Operand::Const(ConstValue::Int(1)),
                node: fx.nodes[0],
            },
        );
        graph.append(
            body,
            Inst::Assign {
                dst: Var::unversioned(y),
                src: Operand::Const(ConstValue::Int(2)),
                node: fx.nodes[1],
            },
        );
        graph.append(
            body,
            Inst::Return {
                value: Operand::Var(Var::unversioned(y)),
                node: fx.nodes[2],
            },
        );
        fx.finish(&mut graph);

        assert!(fx.ast.has_diagnostic(fx.nodes[0], DiagnosticKind::UnusedVariable));
        assert!(!fx.ast.has_diagnostic(fx.nodes[1], DiagnosticKind::UnusedVariable));
        let diags = fx.ast.diagnostics_of(fx.nodes[0]);
        assert!(diags[0].message.contains("`x` is assigned but never used"));
    }

    #[test]
    fn unused_parameter_gets_its_own_wording() {
        let mut fx = fixture();
        let count = fx.local("count");

        let mut graph = Graph::new();
        let body = graph.add_block();
        graph.add_edge(graph.entry(), body, EdgeKind::Sequential);
        graph.add_edge(body, graph.exit(), EdgeKind::Sequential);
        graph.append(
            body,
            Inst::Assign {
                dst: Var::unversioned(count),
                src: Operand::Arg(0),
                node: fx.nodes[0],
            },
        );
        fx.finish(&mut graph);

        let diags = fx.ast.diagnostics_of(fx.nodes[0]);
        assert_eq!(diags.len(), 1);
        assert!(diags[0].message.contains("parameter `count` is never used"));
    }

    #[test]
    fn underscore_names_are_exempt() {
        let mut fx = fixture();
        let ignored = fx.local("_ignored");

        let mut graph = Graph::new();
        let body = graph.add_block();
        graph.add_edge(graph.entry(), body, EdgeKind::Sequential);
        graph.add_edge(body, graph.exit(), EdgeKind::Sequential);
        graph.append(
            body,
            Inst::Assign {
                dst: Var::unversioned(ignored),
                src: Operand::Arg(0),
                node: fx.nodes[0],
            },
        );
        fx.finish(&mut graph);

        assert_eq!(fx.ast.all_diagnostics().count(), 0);
    }

    #[test]
    fn unread_phi_does_not_keep_its_arms_alive() {
        let mut fx = fixture();
        let x = fx.local("x");

        let mut graph = Graph::new();
        let cond = graph.add_block();
        let then_arm = graph.add_block();
        let else_arm = graph.add_block();
        let join = graph.add_block();
        graph.add_edge(graph.entry(), cond, EdgeKind::Sequential);
        graph.add_edge(cond, then_arm, EdgeKind::BranchTrue);
        graph.add_edge(cond, else_arm, EdgeKind::BranchFalse);
        graph.add_edge(then_arm, join, EdgeKind::Sequential);
        graph.add_edge(else_arm, join, EdgeKind::Sequential);
        graph.add_edge(join, graph.exit(), EdgeKind::Sequential);
        graph.append(
            cond,
            Inst::Test { cond: Operand::Opaque(crate::types::Ty::Top), node: fx.nodes[2] },
        );
        graph.append(
            then_arm,
            Inst::Assign {
                dst: Var::unversioned(x),
                src: Operand::Const(ConstValue::Int(1)),
                node: fx.nodes[0],
            },
        );
        graph.append(
            else_arm,
            Inst::Assign {
                dst: Var::unversioned(x),
                src: Operand::Const(ConstValue::Int(2)),
                node: fx.nodes[1],
            },
        );
        fx.finish(&mut graph);

        assert!(fx.ast.has_diagnostic(fx.nodes[0], DiagnosticKind::UnusedVariable));
        assert!(fx.ast.has_diagnostic(fx.nodes[1], DiagnosticKind::UnusedVariable));
    }

    #[test]
    fn a_read_through_a_phi_counts_as_use() {
        let mut fx = fixture();
        let x = fx.local("x");

        let mut graph = Graph::new();
        let cond = graph.add_block();
        let then_arm = graph.add_block();
        let else_arm = graph.add_block();
        let join = graph.add_block();
        graph.add_edge(graph.entry(), cond, EdgeKind::Sequential);
        graph.add_edge(cond, then_arm, EdgeKind::BranchTrue);
        graph.add_edge(cond, else_arm, EdgeKind::BranchFalse);
        graph.add_edge(then_arm, join, EdgeKind::Sequential);
        graph.add_edge(else_arm, join, EdgeKind::Sequential);
        graph.add_edge(join, graph.exit(), EdgeKind::Sequential);
        graph.append(
            cond,
            Inst::Test { cond: Operand::Opaque(crate::types::Ty::Top), node: fx.nodes[2] },
        );
        graph.append(
            then_arm,
            Inst::Assign {
                dst: Var::unversioned(x),
                src: Operand::Const(ConstValue::Int(1)),
                node: fx.nodes[0],
            },
        );
        graph.append(
            else_arm,
            Inst::Assign {
                dst: Var::unversioned(x),
                src: Operand::Const(ConstValue::Int(2)),
                node: fx.nodes[1],
            },
        );
        graph.append(
            join,
            Inst::Return {
                value: Operand::Var(Var::unversioned(x)),
                node: fx.nodes[2],
            },
        );
        fx.finish(&mut graph);

        assert_eq!(fx.ast.all_diagnostics().count(), 0);
    }

    #[test]
    fn analyzer_temporaries_are_never_reported() {
        let mut fx = fixture();
        let temp = fx.bindings.fresh_temp();

        let mut graph = Graph::new();
        let body = graph.add_block();
        graph.add_edge(graph.entry(), body, EdgeKind::Sequential);
        graph.add_edge(body, graph.exit(), EdgeKind::Sequential);
        graph.append(
            body,
            Inst::Assign {
                dst: Var::unversioned(temp),
                src: Operand::Const(ConstValue::Int(1)),
                node: fx.nodes[0],
            },
        );
        fx.finish(&mut graph);

        assert_eq!(fx.ast.all_diagnostics().count(), 0);
    }
}
