// Copyright 2026 James Casey
// SPDX-License-Identifier: Apache-2.0

//! May-alias sets and in-place mutation warnings.
//!
//! Aliasing is a union-find over SSA values, seeded by copies, phis,
//! and call results: a send may return its own receiver (every bang
//! method does), so `b = a.sort` keeps `b` and `a` in one set. `dup`
//! and `clone` are the two sends guaranteed to produce a fresh object;
//! their results start a new set. The pass then warns on `!`-suffixed
//! sends whose receiver is shared with a parameter, with `self`, or
//! with another variable that is still live after the call. Implicit
//! self-sends are exempt; mutating your own receiver is the method's
//! business.

use std::collections::{BTreeSet, HashMap};

use ecow::EcoString;

use crate::control_flow::{Inst, Operand, Var};
use crate::diagnostics::{Diagnostic, DiagnosticKind};
use crate::scope::Bindings;

use super::{FlowPass, Liveness, MethodAnalysis};

/// Union-find over SSA values.
#[derive(Debug, Clone, Default)]
pub struct AliasSets {
    parent: HashMap<Var, Var>,
    known: BTreeSet<Var>,
}

impl AliasSets {
    fn note(&mut self, var: Var) {
        self.known.insert(var);
    }

    fn union(&mut self, a: Var, b: Var) {
        self.note(a);
        self.note(b);
        let ra = self.root(a);
        let rb = self.root(b);
        if ra != rb {
            self.parent.insert(ra, rb);
        }
    }

    fn root(&self, var: Var) -> Var {
        let mut current = var;
        while let Some(&next) = self.parent.get(&current) {
            current = next;
        }
        current
    }

    /// Whether the two values may refer to the same object.
    #[must_use]
    pub fn may_alias(&self, a: Var, b: Var) -> bool {
        self.root(a) == self.root(b)
    }

    /// Every value known to share `var`'s set, including `var`.
    #[must_use]
    pub fn members(&self, var: Var) -> Vec<Var> {
        let root = self.root(var);
        let mut out: Vec<Var> = self
            .known
            .iter()
            .copied()
            .filter(|&other| self.root(other) == root)
            .collect();
        if !out.contains(&var) {
            out.push(var);
        }
        out
    }
}

pub(crate) struct AliasPass;

impl FlowPass for AliasPass {
    fn run(&self, analysis: &mut MethodAnalysis<'_>) {
        let graph = &*analysis.graph;
        let bindings = analysis.bindings;
        let liveness = match analysis.liveness.take() {
            Some(liveness) => liveness,
            None => Liveness::compute(graph, bindings),
        };

        let mut sets = AliasSets::default();
        let mut param_vars: BTreeSet<Var> = BTreeSet::new();
        let mut self_vars: BTreeSet<Var> = BTreeSet::new();
        for block in graph.block_ids() {
            if !graph.block(block).reachable {
                continue;
            }
            for inst in &graph.block(block).insts {
                match inst {
                    Inst::Assign { dst, src: Operand::Var(src), .. } => sets.union(*dst, *src),
                    Inst::Assign { dst, src: Operand::Arg(_), .. } => {
                        sets.note(*dst);
                        param_vars.insert(*dst);
                    }
                    Inst::Assign { dst, src: Operand::SelfVal, .. } => {
                        sets.note(*dst);
                        self_vars.insert(*dst);
                    }
                    Inst::Phi { dst, args, .. } => {
                        for &(_, arg) in args {
                            sets.union(*dst, arg);
                        }
                    }
                    Inst::Call { dst, recv: Operand::Var(recv), name, .. } => {
                        if *name != "dup" && *name != "clone" {
                            sets.union(*dst, *recv);
                        }
                    }
                    _ => {}
                }
            }
        }

        for block in graph.block_ids() {
            if !graph.block(block).reachable {
                continue;
            }
            for (index, inst) in graph.block(block).insts.iter().enumerate() {
                let Inst::Call { recv: Operand::Var(recv), name, node, .. } = inst else {
                    continue;
                };
                if !name.ends_with('!') {
                    continue;
                }
                let members = sets.members(*recv);
                let param = members
                    .iter()
                    .find(|var| param_vars.contains(var))
                    .map(|var| bindings.get(var.binding).name.clone());
                let touches_self = members.iter().any(|var| self_vars.contains(var));
                let live_alias: Option<EcoString> = members
                    .iter()
                    .find(|&&var| {
                        var != *recv
                            && !bindings.get(var.binding).synthetic
                            && liveness.live_after(graph, bindings, block, index, var)
                    })
                    .map(|var| bindings.get(var.binding).name.clone());

                let message = if let Some(param) = param {
                    format!("in-place `{name}` mutates a value shared with parameter `{param}`")
                } else if touches_self {
                    format!("in-place `{name}` mutates the method receiver")
                } else if let Some(other) = live_alias {
                    format!("in-place `{name}` mutates a value that `{other}` still reads")
                } else {
                    continue;
                };
                if analysis.ast.has_diagnostic(*node, DiagnosticKind::MutatedAlias) {
                    continue;
                }
                let span = analysis.ast.span(*node);
                analysis.ast.attach(
                    *node,
                    Diagnostic::warning(DiagnosticKind::MutatedAlias, message)
                        .with_hint("call `dup` first if the shared value must not change")
                        .with_span_opt(span),
                );
            }
        }

        analysis.liveness = Some(liveness);
        analysis.aliases = Some(sets);
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::control_flow::{convert_to_ssa, Dominators, EdgeKind, Graph};
    use crate::scope::Scopes;
    use crate::test_helpers::{int, program};
    use crate::tree::{Ast, NodeId};

    struct Fixture {
        ast: Ast,
        nodes: Vec<NodeId>,
        bindings: Bindings,
        scopes: Scopes,
    }

    fn fixture() -> Fixture {
        let ast = Ast::from_raw(program(vec![int(1), int(2), int(3), int(4)]));
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

        fn call(&mut self, recv: Operand, name: &str, node: NodeId) -> Inst {
            Inst::Call {
                dst: Var::unversioned(self.bindings.fresh_temp()),
                recv,
                name: name.into(),
                args: vec![],
                node,
            }
        }

        fn run(&mut self, graph: &mut Graph) {
            let doms = Dominators::compute(graph);
            convert_to_ssa(graph, &doms, &self.bindings);
            let mut analysis = MethodAnalysis::new(&mut self.ast, graph, &self.bindings);
            AliasPass.run(&mut analysis);
        }
    }

    fn line(graph: &mut Graph) -> crate::control_flow::BlockId {
        let body = graph.add_block();
        graph.add_edge(graph.entry(), body, EdgeKind::Sequential);
        graph.add_edge(body, graph.exit(), EdgeKind::Sequential);
        body
    }

    #[test]
    fn bang_send_to_a_parameter_warns() {
        let mut fx = fixture();
        let list = fx.local("list");
        let mut graph = Graph::new();
        let body = line(&mut graph);
        graph.append(
            body,
            Inst::Assign {
                dst: Var::unversioned(list),
                src: Operand::Arg(0),
                node: fx.nodes[0],
            },
        );
        let bang = fx.call(Operand::Var(Var::unversioned(list)), "sort!", fx.nodes[1]);
        graph.append(body, bang);
        fx.run(&mut graph);

        assert!(fx.ast.has_diagnostic(fx.nodes[1], DiagnosticKind::MutatedAlias));
        let diags = fx.ast.diagnostics_of(fx.nodes[1]);
        assert!(diags[0].message.contains("parameter `list`"));
        assert!(diags[0].hint.is_some());
    }

    #[test]
    fn dup_severs_the_parameter_alias() {
        let mut fx = fixture();
        let list = fx.local("list");
        let copy = fx.local("copy");
        let mut graph = Graph::new();
        let body = line(&mut graph);
        graph.append(
            body,
            Inst::Assign {
                dst: Var::unversioned(list),
                src: Operand::Arg(0),
                node: fx.nodes[0],
            },
        );
        graph.append(
            body,
            Inst::Call {
                dst: Var::unversioned(copy),
                recv: Operand::Var(Var::unversioned(list)),
                name: "dup".into(),
                args: vec![],
                node: fx.nodes[1],
            },
        );
        let bang = fx.call(Operand::Var(Var::unversioned(copy)), "sort!", fx.nodes[2]);
        graph.append(body, bang);
        fx.run(&mut graph);

        assert_eq!(fx.ast.all_diagnostics().count(), 0);
    }

    #[test]
    fn plain_copy_keeps_the_parameter_alias() {
        let mut fx = fixture();
        let list = fx.local("list");
        let same = fx.local("same");
        let mut graph = Graph::new();
        let body = line(&mut graph);
        graph.append(
            body,
            Inst::Assign {
                dst: Var::unversioned(list),
                src: Operand::Arg(0),
                node: fx.nodes[0],
            },
        );
        graph.append(
            body,
            Inst::Assign {
                dst: Var::unversioned(same),
                src: Operand::Var(Var::unversioned(list)),
                node: fx.nodes[1],
            },
        );
        let bang = fx.call(Operand::Var(Var::unversioned(same)), "sort!", fx.nodes[2]);
        graph.append(body, bang);
        fx.run(&mut graph);

        assert!(fx.ast.has_diagnostic(fx.nodes[2], DiagnosticKind::MutatedAlias));
    }

    #[test]
    fn unshared_local_is_not_flagged() {
        let mut fx = fixture();
        let list = fx.local("list");
        let mut graph = Graph::new();
        let body = line(&mut graph);
        graph.append(
            body,
            Inst::Construct {
                dst: Var::unversioned(list),
                class: "Array".into(),
                args: vec![],
                node: fx.nodes[0],
            },
        );
        let bang = fx.call(Operand::Var(Var::unversioned(list)), "sort!", fx.nodes[1]);
        graph.append(body, bang);
        fx.run(&mut graph);

        assert_eq!(fx.ast.all_diagnostics().count(), 0);
    }

    #[test]
    fn live_local_alias_is_flagged() {
        let mut fx = fixture();
        let a = fx.local("a");
        let b = fx.local("b");
        let mut graph = Graph::new();
        let body = line(&mut graph);
        graph.append(
            body,
            Inst::Construct {
                dst: Var::unversioned(a),
                class: "Array".into(),
                args: vec![],
                node: fx.nodes[0],
            },
        );
        graph.append(
            body,
            Inst::Assign {
                dst: Var::unversioned(b),
                src: Operand::Var(Var::unversioned(a)),
                node: fx.nodes[1],
            },
        );
        let bang = fx.call(Operand::Var(Var::unversioned(a)), "reverse!", fx.nodes[2]);
        graph.append(body, bang);
        let read = fx.call(Operand::Var(Var::unversioned(b)), "first", fx.nodes[3]);
        graph.append(body, read);
        fx.run(&mut graph);

        assert!(fx.ast.has_diagnostic(fx.nodes[2], DiagnosticKind::MutatedAlias));
        let diags = fx.ast.diagnostics_of(fx.nodes[2]);
        assert!(diags[0].message.contains("`b` still reads"));
    }

    #[test]
    fn may_alias_follows_copies_and_respects_dup() {
        let mut fx = fixture();
        let a = fx.local("a");
        let b = fx.local("b");
        let c = fx.local("c");
        let mut graph = Graph::new();
        let body = line(&mut graph);
        graph.append(
            body,
            Inst::Construct {
                dst: Var::unversioned(a),
                class: "Array".into(),
                args: vec![],
                node: fx.nodes[0],
            },
        );
        graph.append(
            body,
            Inst::Assign {
                dst: Var::unversioned(b),
                src: Operand::Var(Var::unversioned(a)),
                node: fx.nodes[1],
            },
        );
        graph.append(
            body,
            Inst::Call {
                dst: Var::unversioned(c),
                recv: Operand::Var(Var::unversioned(a)),
                name: "clone".into(),
                args: vec![],
                node: fx.nodes[2],
            },
        );
        let doms = Dominators::compute(&graph);
        convert_to_ssa(&mut graph, &doms, &fx.bindings);
        let mut analysis = MethodAnalysis::new(&mut fx.ast, &mut graph, &fx.bindings);
        AliasPass.run(&mut analysis);
        let sets = analysis.aliases.take().unwrap_or_default();

        let a1 = Var { binding: a, version: 1 };
        let b1 = Var { binding: b, version: 1 };
        let c1 = Var { binding: c, version: 1 };
        assert!(sets.may_alias(a1, b1));
        assert!(sets.may_alias(b1, a1));
        assert!(!sets.may_alias(c1, a1), "clone starts a fresh set");
    }
}
