// Copyright 2026 James Casey
// SPDX-License-Identifier: Apache-2.0

//! The parser input contract.
//!
//! Lumen does not parse source text. An external parser produces a
//! [`RawNode`] tree plus the [`SourceText`](crate::source::SourceText), and
//! the analyzer wraps that tree into its own [`Ast`](crate::tree::Ast)
//! arena. This module documents the shape every producer must follow.
//!
//! # Child layouts
//!
//! Children are positional. Optional children are resolved by arity, never
//! by placeholder nodes.
//!
//! | Kind | Payload | Children |
//! |---|---|---|
//! | `Program` | (none) | statements |
//! | `StmtList` | (none) | statements |
//! | `ArgList` | (none) | argument expressions |
//! | `ParamList` | (none) | `Ident` parameters |
//! | `IntLit` | `Int` | (none) |
//! | `FloatLit` | `Float` | (none) |
//! | `StrLit` | `Text` | (none) |
//! | `SymLit` | `Name` | (none) |
//! | `ArrayLit` | (none) | element expressions |
//! | `HashLit` | (none) | alternating key, value (even count) |
//! | `RangeLit`, `RangeExclLit` | (none) | `[lo, hi]` |
//! | `Ident`, `ConstRef`, `TopConst`, `IvarRef`, `CvarRef`, `GvarRef` | `Name` (sigil included) | (none) |
//! | `ConstPath` | (none) | `[lhs, ConstRef]` |
//! | `Assign` | (none) | `[target, value]` |
//! | `Call` | `Name` (message) | `[ArgList]`, `[recv, ArgList]`, or either followed by a trailing `BlockLit` |
//! | `SuperCall`, `YieldExpr` | (none) | `[ArgList]` |
//! | `RaiseExpr` | (none) | `[]` or `[value]` |
//! | `ReturnExpr` | (none) | `[]` or `[value]` |
//! | `If` | (none) | `[cond, then]` or `[cond, then, else]` (arms are `StmtList`) |
//! | `While` | (none) | `[cond, StmtList]` |
//! | `Begin` | (none) | `[StmtList, RescueClause*, EnsureClause?]` |
//! | `RescueClause` | (none) | `[StmtList]` |
//! | `EnsureClause` | (none) | `[StmtList]` |
//! | `BlockLit` | (none) | `[ParamList, StmtList]` |
//! | `ClassDef` | (none) | `[name, StmtList]` or `[name, superclass, StmtList]` (name is `ConstRef`/`ConstPath`) |
//! | `ModuleDef` | (none) | `[name, StmtList]` |
//! | `MethodDef`, `SingletonMethodDef` | `Name` | `[ParamList, StmtList]` |
//! | `Paren` | (none) | `[inner]` |
//!
//! Spans are optional. When the producer omits one, the analyzer
//! reconstructs a best-effort span from child spans and delimiter searches
//! (see [`crate::tree::source_span`]), degrading to "no span" rather than
//! guessing wrong.

use ecow::EcoString;

use super::NodeKind;
use crate::source::Span;

/// The payload a raw node carries alongside its kind.
#[derive(Debug, Clone, PartialEq)]
pub enum Payload {
    None,
    /// An identifier, message, or symbol name.
    Name(EcoString),
    Int(i64),
    Float(f64),
    /// String literal contents.
    Text(EcoString),
}

impl Payload {
    /// The name payload, if this is a `Name`.
    #[must_use]
    pub fn as_name(&self) -> Option<&EcoString> {
        match self {
            Payload::Name(name) => Some(name),
            _ => None,
        }
    }
}

/// One node of the externally produced syntax tree.
#[derive(Debug, Clone, PartialEq)]
pub struct RawNode {
    pub kind: NodeKind,
    pub payload: Payload,
    pub children: Vec<RawNode>,
    pub span: Option<Span>,
}

impl RawNode {
    /// A node without payload, children, or span.
    #[must_use]
    pub fn new(kind: NodeKind) -> Self {
        Self {
            kind,
            payload: Payload::None,
            children: Vec::new(),
            span: None,
        }
    }

    /// A node carrying a name payload.
    #[must_use]
    pub fn named(kind: NodeKind, name: impl Into<EcoString>) -> Self {
        Self {
            kind,
            payload: Payload::Name(name.into()),
            children: Vec::new(),
            span: None,
        }
    }

    /// Attaches children.
    #[must_use]
    pub fn with_children(mut self, children: Vec<RawNode>) -> Self {
        self.children = children;
        self
    }

    /// Attaches a payload.
    #[must_use]
    pub fn with_payload(mut self, payload: Payload) -> Self {
        self.payload = payload;
        self
    }

    /// Attaches a source span.
    #[must_use]
    pub fn with_span(mut self, span: Span) -> Self {
        self.span = Some(span);
        self
    }
}
