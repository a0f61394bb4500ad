// Copyright 2026 James Casey
// SPDX-License-Identifier: Apache-2.0

//! Effect frequency: does a method always, sometimes, or never yield,
//! raise, or call super?
//!
//! Frequency is judged over reachable blocks only, so this runs after
//! unreachability has cleared the `reachable` flags. "Always" means no
//! path from entry to the normal exit avoids an effect site; a raise
//! that is itself rescued still counts, since the statement executes.

use std::collections::{BTreeSet, VecDeque};

use crate::control_flow::{Graph, Inst};

/// The observable effects a method body can have.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Effect {
    Yield,
    Raise,
    Super,
}

/// How often an effect occurs across the method's executions.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Frequency {
    /// Every path from entry to exit passes an effect site.
    Always,
    /// Some path hits a site and some path avoids it.
    Sometimes,
    /// No reachable site exists.
    Never,
}

/// Per-method effect summary.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct EffectSummary {
    pub yields: Frequency,
    pub raises: Frequency,
    pub supers: Frequency,
}

impl EffectSummary {
    #[must_use]
    pub fn of(graph: &Graph) -> Self {
        Self {
            yields: effect_frequency(graph, Effect::Yield),
            raises: effect_frequency(graph, Effect::Raise),
            supers: effect_frequency(graph, Effect::Super),
        }
    }
}

/// Classifies one effect for a graph.
#[must_use]
pub fn effect_frequency(graph: &Graph, effect: Effect) -> Frequency {
    let mut sites: BTreeSet<_> = BTreeSet::new();
    for block in graph.block_ids() {
        let data = graph.block(block);
        if data.reachable && data.insts.iter().any(|inst| is_effect(inst, effect)) {
            sites.insert(block);
        }
    }
    if sites.is_empty() {
        return Frequency::Never;
    }
    if sites.contains(&graph.entry()) {
        return Frequency::Always;
    }

    // Search for a path to the normal exit that avoids every site.
    let mut seen = BTreeSet::from([graph.entry()]);
    let mut queue = VecDeque::from([graph.entry()]);
    while let Some(block) = queue.pop_front() {
        if block == graph.exit() {
            return Frequency::Sometimes;
        }
        for &(succ, _) in &graph.block(block).succs {
            if graph.block(succ).reachable && !sites.contains(&succ) && seen.insert(succ) {
                queue.push_back(succ);
            }
        }
    }
    Frequency::Always
}

fn is_effect(inst: &Inst, effect: Effect) -> bool {
    matches!(
        (inst, effect),
        (Inst::Yield { .. }, Effect::Yield)
            | (Inst::Raise { .. }, Effect::Raise)
            | (Inst::Super { .. }, Effect::Super)
    )
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::control_flow::{EdgeKind, Operand, Var};
    use crate::scope::Bindings;
    use crate::test_helpers::program;
    use crate::tree::{Ast, NodeId};
    use crate::types::Ty;

    fn node() -> NodeId {
        Ast::from_raw(program(vec![])).root()
    }

    fn yield_inst(bindings: &mut Bindings, node: NodeId) -> Inst {
        Inst::Yield { dst: Var::unversioned(bindings.fresh_temp()), args: vec![], node }
    }

    #[test]
    fn no_sites_is_never() {
        let mut graph = Graph::new();
        let body = graph.add_block();
        graph.add_edge(graph.entry(), body, EdgeKind::Sequential);
        graph.add_edge(body, graph.exit(), EdgeKind::Sequential);
        assert_eq!(effect_frequency(&graph, Effect::Yield), Frequency::Never);
        let summary = EffectSummary::of(&graph);
        assert_eq!(summary.raises, Frequency::Never);
        assert_eq!(summary.supers, Frequency::Never);
    }

    #[test]
    fn straight_line_site_is_always() {
        let mut bindings = Bindings::default();
        let n = node();
        let mut graph = Graph::new();
        let body = graph.add_block();
        graph.add_edge(graph.entry(), body, EdgeKind::Sequential);
        graph.add_edge(body, graph.exit(), EdgeKind::Sequential);
        graph.append(body, yield_inst(&mut bindings, n));
        assert_eq!(effect_frequency(&graph, Effect::Yield), Frequency::Always);
    }

    #[test]
    fn one_arm_site_is_sometimes() {
        let mut bindings = Bindings::default();
        let n = node();
        let mut graph = Graph::new();
        let cond = graph.add_block();
        let then_arm = graph.add_block();
        let join = graph.add_block();
        graph.add_edge(graph.entry(), cond, EdgeKind::Sequential);
        graph.add_edge(cond, then_arm, EdgeKind::BranchTrue);
        graph.add_edge(cond, join, EdgeKind::BranchFalse);
        graph.add_edge(then_arm, join, EdgeKind::Sequential);
        graph.add_edge(join, graph.exit(), EdgeKind::Sequential);
        graph.append(cond, Inst::Test { cond: Operand::Opaque(Ty::Top), node: n });
        graph.append(then_arm, yield_inst(&mut bindings, n));
        assert_eq!(effect_frequency(&graph, Effect::Yield), Frequency::Sometimes);
    }

    #[test]
    fn both_arms_site_is_always() {
        let mut bindings = Bindings::default();
        let n = node();
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
        graph.append(cond, Inst::Test { cond: Operand::Opaque(Ty::Top), node: n });
        let super_site = |b: &mut Bindings| Inst::Super {
            dst: Var::unversioned(b.fresh_temp()),
            args: vec![],
            node: n,
        };
        graph.append(then_arm, super_site(&mut bindings));
        graph.append(else_arm, super_site(&mut bindings));
        assert_eq!(effect_frequency(&graph, Effect::Super), Frequency::Always);
        assert_eq!(effect_frequency(&graph, Effect::Yield), Frequency::Never);
    }

    #[test]
    fn unreachable_sites_do_not_count() {
        let mut bindings = Bindings::default();
        let n = node();
        let mut graph = Graph::new();
        let body = graph.add_block();
        let dead = graph.add_block();
        graph.add_edge(graph.entry(), body, EdgeKind::Sequential);
        graph.add_edge(body, graph.exit(), EdgeKind::Sequential);
        graph.append(dead, yield_inst(&mut bindings, n));
        graph.block_mut(dead).reachable = false;
        assert_eq!(effect_frequency(&graph, Effect::Yield), Frequency::Never);
    }
}
