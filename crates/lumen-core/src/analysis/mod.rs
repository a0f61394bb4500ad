// Copyright 2026 James Casey
// SPDX-License-Identifier: Apache-2.0

//! The per-method diagnostic battery.
//!
//! Each pass consumes a method's SSA graph through a shared
//! [`MethodAnalysis`] view and attaches diagnostics to the tree. Passes
//! run in dependency order, not alphabetically: constant propagation
//! computes the executable edges unreachability consumes, and liveness
//! feeds both the unused-variable and alias passes.
//!
//! # Adding a New Pass
//!
//! 1. Create `crates/lumen-core/src/analysis/<your_pass>.rs`.
//! 2. Declare `pub(crate) struct YourPass;` implementing [`FlowPass`].
//! 3. Add `mod your_pass;` below.
//! 4. Push `Box::new(your_pass::YourPass)` into `all_passes()` at the
//!    point its inputs are ready.

pub mod alias;
pub mod call_search;
pub mod catalog;
pub mod constant_propagation;
pub mod effects;
pub mod lifetime;
pub mod override_safety;
pub mod unreachability;
pub mod unused_variables;

use std::collections::{BTreeSet, HashMap};

use crate::control_flow::{BlockId, EdgeKind, Graph, Var};
use crate::scope::Bindings;
use crate::tree::Ast;

pub use alias::AliasSets;
pub use call_search::{find_raises, find_sends, find_supers, find_yields, SendSite};
pub use constant_propagation::Lattice;
pub use effects::{effect_frequency, Effect, EffectSummary, Frequency};
pub use lifetime::Liveness;
pub use override_safety::check_overrides;

/// Edges proven executable by constant propagation.
pub type EdgeSet = BTreeSet<(BlockId, BlockId, EdgeKind)>;

/// The shared view a pass works on: one method's tree slice, graph and
/// bindings, plus results earlier passes leave for later ones.
pub struct MethodAnalysis<'a> {
    pub ast: &'a mut Ast,
    pub graph: &'a mut Graph,
    pub bindings: &'a Bindings,
    /// Per-variable constancy, filled by constant propagation.
    pub constants: Option<HashMap<Var, Lattice>>,
    /// Executable edges, filled by constant propagation.
    pub executable: Option<EdgeSet>,
    /// Per-block live sets, filled by the lifetime pass.
    pub liveness: Option<Liveness>,
    /// May-alias sets, filled by the alias pass.
    pub aliases: Option<AliasSets>,
}

impl<'a> MethodAnalysis<'a> {
    #[must_use]
    pub fn new(ast: &'a mut Ast, graph: &'a mut Graph, bindings: &'a Bindings) -> Self {
        Self {
            ast,
            graph,
            bindings,
            constants: None,
            executable: None,
            liveness: None,
            aliases: None,
        }
    }
}

/// A single flow pass over one method.
pub(crate) trait FlowPass {
    fn run(&self, analysis: &mut MethodAnalysis<'_>);
}

/// The ordered list of all active passes.
fn all_passes() -> Vec<Box<dyn FlowPass>> {
    vec![
        Box::new(constant_propagation::ConstantPropagationPass),
        Box::new(unreachability::UnreachabilityPass),
        Box::new(lifetime::LifetimePass),
        Box::new(unused_variables::UnusedVariablePass),
        Box::new(alias::AliasPass),
    ]
}

/// Runs the full battery over one method.
pub fn run_battery(analysis: &mut MethodAnalysis<'_>) {
    for pass in all_passes() {
        pass.run(analysis);
    }
}
