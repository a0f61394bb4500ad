// Copyright 2026 James Casey
// SPDX-License-Identifier: Apache-2.0

//! The analyzer's view of a parsed program.
//!
//! [`Ast`] wraps the externally produced [`RawNode`] tree into an arena of
//! numbered nodes with parent links, per-node diagnostics, a scope
//! annotation, and a write-once inferred-type slot. All analysis results
//! that concern a source location are attached here, so "does this node
//! carry an error of kind K whose message mentions P" is a direct query.

mod fold;
mod kind;
mod locate;
mod raw;

pub use fold::{ConstValue, constant_value, is_constant};
pub use kind::NodeKind;
pub use locate::source_span;
pub use raw::{Payload, RawNode};

use ecow::EcoString;

use crate::diagnostics::{Diagnostic, DiagnosticKind};
use crate::scope::ScopeId;
use crate::source::Span;
use crate::types::Ty;

/// Index of a node in the [`Ast`] arena.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct NodeId(u32);

impl NodeId {
    #[must_use]
    pub fn index(self) -> usize {
        self.0 as usize
    }
}

#[derive(Debug)]
struct NodeData {
    kind: NodeKind,
    payload: Payload,
    children: Vec<NodeId>,
    parent: Option<NodeId>,
    span: Option<Span>,
    scope: Option<ScopeId>,
    expr_type: Option<Ty>,
    diagnostics: Vec<Diagnostic>,
}

/// The wrapped syntax tree.
#[derive(Debug)]
pub struct Ast {
    nodes: Vec<NodeData>,
    root: NodeId,
}

impl Ast {
    /// Wraps a raw tree into the arena, assigning ids in pre-order.
    #[must_use]
    pub fn from_raw(root: RawNode) -> Self {
        let mut ast = Self {
            nodes: Vec::new(),
            root: NodeId(0),
        };
        let root_id = ast.insert(root, None);
        ast.root = root_id;
        ast
    }

    fn insert(&mut self, raw: RawNode, parent: Option<NodeId>) -> NodeId {
        let id = NodeId(u32::try_from(self.nodes.len()).unwrap_or(u32::MAX));
        self.nodes.push(NodeData {
            kind: raw.kind,
            payload: raw.payload,
            children: Vec::new(),
            parent,
            span: raw.span,
            scope: None,
            expr_type: None,
            diagnostics: Vec::new(),
        });
        let children: Vec<NodeId> = raw
            .children
            .into_iter()
            .map(|child| self.insert(child, Some(id)))
            .collect();
        self.nodes[id.index()].children = children;
        id
    }

    /// The root node.
    #[must_use]
    pub fn root(&self) -> NodeId {
        self.root
    }

    /// Number of nodes in the arena.
    #[must_use]
    pub fn len(&self) -> usize {
        self.nodes.len()
    }

    /// Returns true if the arena holds no nodes.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.nodes.is_empty()
    }

    #[must_use]
    pub fn kind(&self, id: NodeId) -> NodeKind {
        self.nodes[id.index()].kind
    }

    #[must_use]
    pub fn payload(&self, id: NodeId) -> &Payload {
        &self.nodes[id.index()].payload
    }

    /// The name payload, for nodes that carry one.
    #[must_use]
    pub fn name(&self, id: NodeId) -> Option<&EcoString> {
        self.nodes[id.index()].payload.as_name()
    }

    #[must_use]
    pub fn int_value(&self, id: NodeId) -> Option<i64> {
        match self.nodes[id.index()].payload {
            Payload::Int(value) => Some(value),
            _ => None,
        }
    }

    #[must_use]
    pub fn float_value(&self, id: NodeId) -> Option<f64> {
        match self.nodes[id.index()].payload {
            Payload::Float(value) => Some(value),
            _ => None,
        }
    }

    /// String literal contents, for `StrLit` nodes.
    #[must_use]
    pub fn text(&self, id: NodeId) -> Option<&EcoString> {
        match &self.nodes[id.index()].payload {
            Payload::Text(text) => Some(text),
            _ => None,
        }
    }

    /// The recorded span, if the producer supplied one.
    #[must_use]
    pub fn span(&self, id: NodeId) -> Option<Span> {
        self.nodes[id.index()].span
    }

    #[must_use]
    pub fn parent(&self, id: NodeId) -> Option<NodeId> {
        self.nodes[id.index()].parent
    }

    /// The node's children exactly as produced.
    #[must_use]
    pub fn raw_children(&self, id: NodeId) -> &[NodeId] {
        &self.nodes[id.index()].children
    }

    /// The node's children with synthetic `StmtList` wrappers flattened
    /// one level, so statement sequences read uniformly.
    #[must_use]
    pub fn children(&self, id: NodeId) -> Vec<NodeId> {
        let mut out = Vec::new();
        for &child in &self.nodes[id.index()].children {
            if self.kind(child) == NodeKind::StmtList {
                out.extend_from_slice(&self.nodes[child.index()].children);
            } else {
                out.push(child);
            }
        }
        out
    }

    /// Pre-order depth-first traversal from `from`.
    pub fn dfs(&self, from: NodeId, mut visit: impl FnMut(NodeId)) {
        let mut stack = vec![from];
        while let Some(id) = stack.pop() {
            visit(id);
            for &child in self.nodes[id.index()].children.iter().rev() {
                stack.push(child);
            }
        }
    }

    /// First node in pre-order under `from` (inclusive) satisfying the
    /// predicate.
    #[must_use]
    pub fn deep_find(&self, from: NodeId, mut pred: impl FnMut(NodeId) -> bool) -> Option<NodeId> {
        let mut stack = vec![from];
        while let Some(id) = stack.pop() {
            if pred(id) {
                return Some(id);
            }
            for &child in self.nodes[id.index()].children.iter().rev() {
                stack.push(child);
            }
        }
        None
    }

    /// The scope this node was resolved in, once definitions are collected.
    #[must_use]
    pub fn scope(&self, id: NodeId) -> Option<ScopeId> {
        self.nodes[id.index()].scope
    }

    pub fn set_scope(&mut self, id: NodeId, scope: ScopeId) {
        self.nodes[id.index()].scope = Some(scope);
    }

    /// The cached inferred type of this expression, if one was recorded.
    #[must_use]
    pub fn expr_type(&self, id: NodeId) -> Option<&Ty> {
        self.nodes[id.index()].expr_type.as_ref()
    }

    /// Records the inferred type of an expression. The slot is write-once:
    /// the first recorded type sticks and later writes are ignored.
    pub fn set_expr_type(&mut self, id: NodeId, ty: Ty) {
        let slot = &mut self.nodes[id.index()].expr_type;
        if slot.is_none() {
            *slot = Some(ty);
        }
    }

    /// Attaches a diagnostic to a node.
    pub fn attach(&mut self, id: NodeId, diagnostic: Diagnostic) {
        self.nodes[id.index()].diagnostics.push(diagnostic);
    }

    /// Diagnostics attached directly to this node.
    #[must_use]
    pub fn diagnostics_of(&self, id: NodeId) -> &[Diagnostic] {
        &self.nodes[id.index()].diagnostics
    }

    /// All diagnostics in the tree, in node-id (pre-order) order.
    pub fn all_diagnostics(&self) -> impl Iterator<Item = (NodeId, &Diagnostic)> {
        self.nodes.iter().enumerate().flat_map(|(idx, node)| {
            let id = NodeId(u32::try_from(idx).unwrap_or(u32::MAX));
            node.diagnostics.iter().map(move |diag| (id, diag))
        })
    }

    /// Does this node carry a diagnostic of the given kind?
    #[must_use]
    pub fn has_diagnostic(&self, id: NodeId, kind: DiagnosticKind) -> bool {
        self.diagnostics_of(id).iter().any(|d| d.kind == kind)
    }

    /// The testability contract: does this node carry a diagnostic of kind
    /// `kind` whose message contains `pattern`?
    #[must_use]
    pub fn has_error_matching(&self, id: NodeId, kind: DiagnosticKind, pattern: &str) -> bool {
        self.diagnostics_of(id)
            .iter()
            .any(|d| d.kind == kind && d.message.contains(pattern))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::diagnostics::Diagnostic;

    fn sample() -> RawNode {
        RawNode::new(NodeKind::Program).with_children(vec![
            RawNode::new(NodeKind::StmtList).with_children(vec![
                RawNode::named(NodeKind::Ident, "x"),
                RawNode::named(NodeKind::Ident, "y"),
            ]),
            RawNode::named(NodeKind::Ident, "z"),
        ])
    }

    #[test]
    fn children_flatten_statement_lists() {
        let ast = Ast::from_raw(sample());
        let children = ast.children(ast.root());
        assert_eq!(children.len(), 3, "StmtList is transparent");
        let names: Vec<_> = children
            .iter()
            .filter_map(|&c| ast.name(c).map(EcoString::as_str))
            .collect();
        assert_eq!(names, ["x", "y", "z"]);
    }

    #[test]
    fn raw_children_preserve_the_wrapper() {
        let ast = Ast::from_raw(sample());
        assert_eq!(ast.raw_children(ast.root()).len(), 2);
    }

    #[test]
    fn parent_links_point_upward() {
        let ast = Ast::from_raw(sample());
        let x = ast
            .deep_find(ast.root(), |id| {
                ast.name(id).is_some_and(|n| n.as_str() == "x")
            })
            .unwrap();
        let wrapper = ast.parent(x).unwrap();
        assert_eq!(ast.kind(wrapper), NodeKind::StmtList);
        assert_eq!(ast.parent(wrapper), Some(ast.root()));
        assert_eq!(ast.parent(ast.root()), None);
    }

    #[test]
    fn deep_find_returns_first_in_preorder() {
        let ast = Ast::from_raw(sample());
        let first = ast
            .deep_find(ast.root(), |id| ast.kind(id) == NodeKind::Ident)
            .unwrap();
        assert_eq!(ast.name(first).unwrap(), "x");
    }

    #[test]
    fn expr_type_is_write_once() {
        let mut ast = Ast::from_raw(sample());
        let root = ast.root();
        ast.set_expr_type(root, Ty::instance("String"));
        ast.set_expr_type(root, Ty::instance("Integer"));
        assert_eq!(ast.expr_type(root), Some(&Ty::instance("String")));
    }

    #[test]
    fn diagnostic_query_matches_kind_and_message() {
        let mut ast = Ast::from_raw(sample());
        let root = ast.root();
        ast.attach(
            root,
            Diagnostic::error(DiagnosticKind::ImproperOverrideType, "`to_s` should return String"),
        );
        assert!(ast.has_error_matching(root, DiagnosticKind::ImproperOverrideType, "to_s"));
        assert!(ast.has_error_matching(root, DiagnosticKind::ImproperOverrideType, "String"));
        assert!(!ast.has_error_matching(root, DiagnosticKind::ImproperOverrideType, "Integer"));
        assert!(!ast.has_error_matching(root, DiagnosticKind::DangerousOverride, "to_s"));
    }
}
