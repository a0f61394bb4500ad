// Copyright 2026 James Casey
// SPDX-License-Identifier: Apache-2.0

//! One analysis run over one program.
//!
//! [`AnalysisSession::analyze`] wraps a raw tree and drives the pipeline
//! in order: seed the built-in catalog, collect every class, module and
//! method definition, lower each method body to a control flow graph in
//! SSA form, run the per-method diagnostic battery, classify effects,
//! check override safety, then evaluate the top level for real and probe
//! every other user method so each one carries at least one inferred
//! signature. A body the builder cannot lower marks that one method
//! unanalyzable; the rest of the program is unaffected.
//!
//! The session owns the tree, scopes, bindings and catalog afterwards, so
//! callers can query diagnostics, signatures, inferred types and call
//! sites without re-running anything.

use std::collections::BTreeMap;

use ecow::EcoString;

use crate::analysis::{
    check_overrides, find_sends, run_battery, EffectSummary, MethodAnalysis, SendSite,
};
use crate::control_flow::{build_method, convert_to_ssa, Dominators, Graph};
use crate::diagnostics::{Diagnostic, DiagnosticKind, Severity};
use crate::entity::{builtins, Catalog, EntityId, Method, MethodId, MethodKind, Signature};
use crate::infer::{Engine, EngineState};
use crate::scope::{Bindings, ScopeId, ScopeKind, Scopes};
use crate::source::SourceText;
use crate::tree::{Ast, NodeId, NodeKind, RawNode};
use crate::types::Ty;

/// The name under which top-level code is registered on `Object`.
const MAIN_NAME: &str = "__main__";

/// A completed analysis of one program.
pub struct AnalysisSession {
    ast: Ast,
    source: SourceText,
    scopes: Scopes,
    bindings: Bindings,
    catalog: Catalog,
    graphs: BTreeMap<MethodId, Graph>,
    effects: BTreeMap<MethodId, EffectSummary>,
    state: EngineState,
    main: MethodId,
}

impl AnalysisSession {
    /// Runs the full pipeline over a raw tree. Diagnostic spans index
    /// into `source`.
    #[must_use]
    pub fn analyze(root: RawNode, source: SourceText) -> Self {
        let mut ast = Ast::from_raw(root);
        let mut bindings = Bindings::default();
        let mut scopes = Scopes::new(&mut bindings);
        let mut catalog = builtins::seed(&mut scopes, &mut bindings);
        let object = match catalog.entity_by_path("Object") {
            Some(id) => id,
            None => {
                let global = scopes.global();
                catalog.define_class(&mut scopes, &mut bindings, "Object", None, global, None)
            }
        };

        {
            let mut collector = Collector {
                ast: &mut ast,
                scopes: &mut scopes,
                bindings: &mut bindings,
                catalog: &mut catalog,
            };
            let root_node = collector.ast.root();
            let global = collector.scopes.global();
            collector.collect_body(root_node, object, global);
        }

        // Top-level code becomes a synthetic method on Object whose body
        // is the whole program; the builder skips the definitions the
        // collector already registered.
        let main = catalog.add_method(Method::user(
            MAIN_NAME,
            object,
            MethodKind::Instance,
            Vec::new(),
            ast.root(),
            ast.root(),
            scopes.global(),
        ));

        let mut graphs = BTreeMap::new();
        for (_, _, mid) in catalog.defined_methods() {
            if catalog.method(mid).is_builtin() {
                continue;
            }
            match build_method(&mut ast, &mut scopes, &mut bindings, &mut catalog, mid) {
                Ok(mut graph) => {
                    let doms = Dominators::compute(&graph);
                    convert_to_ssa(&mut graph, &doms, &bindings);
                    graphs.insert(mid, graph);
                }
                Err(err) => {
                    catalog.method_mut(mid).unanalyzable = true;
                    let method = catalog.method(mid);
                    let name = method.name.clone();
                    let Some(def_node) = method.def_node else {
                        continue;
                    };
                    if ast.has_diagnostic(def_node, DiagnosticKind::UnanalyzableMethod) {
                        continue;
                    }
                    let span = ast.span(err.node()).or_else(|| ast.span(def_node));
                    ast.attach(
                        def_node,
                        Diagnostic::warning(
                            DiagnosticKind::UnanalyzableMethod,
                            format!("`{name}` is not analyzed: {err}"),
                        )
                        .with_span_opt(span),
                    );
                }
            }
        }

        for graph in graphs.values_mut() {
            let mut analysis = MethodAnalysis::new(&mut ast, graph, &bindings);
            run_battery(&mut analysis);
        }

        let mut effects = BTreeMap::new();
        for (&mid, graph) in &graphs {
            effects.insert(mid, EffectSummary::of(graph));
        }

        check_overrides(&mut ast, &catalog, &effects);

        let mut state = EngineState::new();
        {
            let mut engine = Engine {
                ast: &mut ast,
                bindings: &mut bindings,
                catalog: &mut catalog,
                graphs: &graphs,
                state: &mut state,
            };
            engine.return_type(main, Ty::instance("Object"), Vec::new());
        }

        // Synthetic probes: every user method gets at least one recorded
        // signature, with the owner instance as receiver and Top for each
        // argument. Probe shapes never count as predicate evidence.
        let probes: Vec<(MethodId, Ty, Vec<Ty>)> = catalog
            .defined_methods()
            .into_iter()
            .filter_map(|(owner, kind, mid)| {
                let method = catalog.method(mid);
                if method.is_builtin() || mid == main {
                    return None;
                }
                let recv = match kind {
                    MethodKind::Instance => Ty::instance(catalog.entity(owner).path.clone()),
                    MethodKind::Singleton => Ty::instance("Module"),
                };
                let args = vec![Ty::Top; method.params.len()];
                Some((mid, recv, args))
            })
            .collect();
        state.probing = true;
        {
            let mut engine = Engine {
                ast: &mut ast,
                bindings: &mut bindings,
                catalog: &mut catalog,
                graphs: &graphs,
                state: &mut state,
            };
            for (mid, recv, args) in probes {
                engine.return_type(mid, recv, args);
            }
        }
        state.probing = false;

        Self {
            ast,
            source,
            scopes,
            bindings,
            catalog,
            graphs,
            effects,
            state,
            main,
        }
    }

    #[must_use]
    pub fn ast(&self) -> &Ast {
        &self.ast
    }

    /// The text diagnostic spans point into.
    #[must_use]
    pub fn source(&self) -> &SourceText {
        &self.source
    }

    #[must_use]
    pub fn catalog(&self) -> &Catalog {
        &self.catalog
    }

    #[must_use]
    pub fn scopes(&self) -> &Scopes {
        &self.scopes
    }

    #[must_use]
    pub fn bindings(&self) -> &Bindings {
        &self.bindings
    }

    /// The synthetic method holding top-level code.
    #[must_use]
    pub fn main_method(&self) -> MethodId {
        self.main
    }

    /// Every diagnostic in the tree, in pre-order.
    pub fn diagnostics(&self) -> impl Iterator<Item = (NodeId, &Diagnostic)> {
        self.ast.all_diagnostics()
    }

    /// Does any diagnostic carry error severity?
    #[must_use]
    pub fn has_errors(&self) -> bool {
        self.ast
            .all_diagnostics()
            .any(|(_, d)| d.severity == Severity::Error)
    }

    /// The SSA graph of an analyzed method.
    #[must_use]
    pub fn graph(&self, method: MethodId) -> Option<&Graph> {
        self.graphs.get(&method)
    }

    /// The effect classification of an analyzed method.
    #[must_use]
    pub fn effect_summary(&self, method: MethodId) -> Option<EffectSummary> {
        self.effects.get(&method).copied()
    }

    /// Every send of `name` in reachable code, across all analyzed
    /// methods.
    #[must_use]
    pub fn find_method_calls(&self, name: &str) -> Vec<(MethodId, SendSite)> {
        let mut out = Vec::new();
        for (&mid, graph) in &self.graphs {
            for site in find_sends(graph, name) {
                if graph.block(site.block).reachable {
                    out.push((mid, site));
                }
            }
        }
        out
    }

    /// The return type of `class_path#name` for the given argument types.
    /// Runs as a probe, so the query leaves no predicate evidence behind.
    pub fn return_type_for_types(
        &mut self,
        class_path: &str,
        name: &str,
        args: Vec<Ty>,
    ) -> Option<Ty> {
        let entity = self.catalog.entity_by_path(class_path)?;
        let method = self.catalog.lookup_method(entity, name, MethodKind::Instance)?;
        let was_probing = self.state.probing;
        self.state.probing = true;
        let mut engine = Engine {
            ast: &mut self.ast,
            bindings: &mut self.bindings,
            catalog: &mut self.catalog,
            graphs: &self.graphs,
            state: &mut self.state,
        };
        let ty = engine.return_type(method, Ty::instance(class_path), args);
        self.state.probing = was_probing;
        Some(ty)
    }

    /// The recorded signatures of `class_path#name`.
    #[must_use]
    pub fn method_signatures(&self, class_path: &str, name: &str) -> Option<&[Signature]> {
        let entity = self.catalog.entity_by_path(class_path)?;
        let method = self.catalog.lookup_method(entity, name, MethodKind::Instance)?;
        Some(self.catalog.method(method).signatures.as_slice())
    }

    /// Methods whose observed call shapes never mixed truthy and falsy
    /// answers despite a `?`-suffixed name.
    pub fn incorrect_predicates(&self) -> impl Iterator<Item = MethodId> + '_ {
        self.catalog.incorrect_predicates()
    }
}

/// The definition pre-pass: registers classes, modules and methods before
/// any body is lowered, so mutually recursive definitions resolve in
/// either order.
struct Collector<'a> {
    ast: &'a mut Ast,
    scopes: &'a mut Scopes,
    bindings: &'a mut Bindings,
    catalog: &'a mut Catalog,
}

impl Collector<'_> {
    /// Walks one definition body. Definitions nested under control flow
    /// are runtime-conditional and are deliberately not collected.
    fn collect_body(&mut self, body: NodeId, owner: EntityId, naming_scope: ScopeId) {
        for child in self.ast.children(body) {
            match self.ast.kind(child) {
                NodeKind::ClassDef | NodeKind::ModuleDef => {
                    self.collect_entity(child, owner, naming_scope);
                }
                NodeKind::MethodDef => {
                    self.collect_method(child, owner, MethodKind::Instance);
                }
                NodeKind::SingletonMethodDef => {
                    self.collect_method(child, owner, MethodKind::Singleton);
                }
                _ => {}
            }
        }
    }

    fn collect_entity(&mut self, node: NodeId, outer: EntityId, naming_scope: ScopeId) {
        self.ast.set_scope(node, naming_scope);
        let raw = self.ast.raw_children(node).to_vec();
        let Some(&name_node) = raw.first() else {
            return;
        };
        let Some(text) = self.const_text(name_node) else {
            return;
        };
        let path = self.qualify(outer, &text);
        let entity = match self.ast.kind(node) {
            NodeKind::ModuleDef => self.catalog.define_module(
                self.scopes,
                self.bindings,
                &path,
                naming_scope,
                Some(node),
            ),
            _ => {
                let named_super = raw
                    .get(1)
                    .copied()
                    .filter(|&c| self.ast.kind(c) != NodeKind::StmtList);
                let superclass = match named_super {
                    Some(sup) => self
                        .const_text(sup)
                        .and_then(|t| self.resolve_entity(outer, &t)),
                    None => self.catalog.entity_by_path("Object"),
                };
                self.catalog.define_class(
                    self.scopes,
                    self.bindings,
                    &path,
                    superclass,
                    naming_scope,
                    Some(node),
                )
            }
        };
        let body = raw
            .iter()
            .copied()
            .find(|&c| self.ast.kind(c) == NodeKind::StmtList);
        if let Some(body) = body {
            let body_scope = self.catalog.entity(entity).scope;
            self.ast.set_scope(body, body_scope);
            self.collect_body(body, entity, body_scope);
        }
    }

    fn collect_method(&mut self, node: NodeId, owner: EntityId, kind: MethodKind) {
        let Some(name) = self.ast.name(node).cloned() else {
            return;
        };
        let raw = self.ast.raw_children(node).to_vec();
        let [param_list, body] = raw.as_slice() else {
            return;
        };
        let (param_list, body) = (*param_list, *body);
        let params: Vec<EcoString> = self
            .ast
            .raw_children(param_list)
            .iter()
            .filter_map(|&p| self.ast.name(p).cloned())
            .collect();
        let owner_scope = self.catalog.entity(owner).scope;
        // In a singleton method `self` is the class object.
        let self_ty = match kind {
            MethodKind::Instance => Ty::instance(self.catalog.entity(owner).path.clone()),
            MethodKind::Singleton => Ty::instance("Module"),
        };
        let scope = self.scopes.create(
            self.bindings,
            ScopeKind::Closed,
            owner_scope,
            self_ty,
            Some(owner),
        );
        let method = self
            .catalog
            .add_method(Method::user(name, owner, kind, params, body, node, scope));
        self.scopes.get_mut(scope).method = Some(method);
        self.ast.set_scope(node, scope);
        self.ast.set_scope(param_list, scope);
    }

    /// Flattens a constant reference subtree to its `::`-separated text.
    fn const_text(&self, node: NodeId) -> Option<EcoString> {
        match self.ast.kind(node) {
            NodeKind::ConstRef => self.ast.name(node).cloned(),
            NodeKind::TopConst => {
                let name = self.ast.name(node)?;
                Some(EcoString::from(format!("::{name}")))
            }
            NodeKind::ConstPath => {
                let children = self.ast.raw_children(node);
                let lhs = self.const_text(*children.first()?)?;
                let rhs = self.ast.name(*children.get(1)?)?;
                Some(EcoString::from(format!("{lhs}::{rhs}")))
            }
            _ => None,
        }
    }

    fn qualify(&self, outer: EntityId, text: &str) -> EcoString {
        if let Some(absolute) = text.strip_prefix("::") {
            return absolute.into();
        }
        let outer_path = &self.catalog.entity(outer).path;
        if outer_path == "Object" {
            return text.into();
        }
        EcoString::from(format!("{outer_path}::{text}"))
    }

    /// Resolves a superclass reference: the enclosing namespace first,
    /// then the top level.
    fn resolve_entity(&self, outer: EntityId, text: &str) -> Option<EntityId> {
        let qualified = self.qualify(outer, text);
        self.catalog
            .entity_by_path(&qualified)
            .or_else(|| self.catalog.entity_by_path(text.trim_start_matches("::")))
    }
}
