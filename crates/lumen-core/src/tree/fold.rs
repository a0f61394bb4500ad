// Copyright 2026 James Casey
// SPDX-License-Identifier: Apache-2.0

//! Structural constant folding over the tree.
//!
//! A node is constant when its value is fully determined by the source
//! text: literals, collections of constants, and constant references whose
//! binding carries a folded value. Method calls are never constant, even
//! on literal receivers; the analyzer does not assume purity.

use std::fmt;

use ecow::EcoString;

use crate::scope::{Bindings, Scopes};
use crate::tree::{Ast, NodeId, NodeKind};
use crate::types::Ty;

/// The folded value of a constant expression.
#[derive(Debug, Clone, PartialEq)]
pub enum ConstValue {
    Nil,
    Bool(bool),
    Int(i64),
    Float(f64),
    Str(EcoString),
    Sym(EcoString),
    Array(Vec<ConstValue>),
    Hash(Vec<(ConstValue, ConstValue)>),
    Range {
        lo: Box<ConstValue>,
        hi: Box<ConstValue>,
        exclusive: bool,
    },
}

impl ConstValue {
    /// Truthiness under the analyzed language's rules: only `nil` and
    /// `false` are falsy.
    #[must_use]
    pub fn truthy(&self) -> bool {
        !matches!(self, ConstValue::Nil | ConstValue::Bool(false))
    }

    /// The class an instance of this value belongs to.
    #[must_use]
    pub fn class_path(&self) -> &'static str {
        match self {
            ConstValue::Nil => "NilClass",
            ConstValue::Bool(true) => "TrueClass",
            ConstValue::Bool(false) => "FalseClass",
            ConstValue::Int(_) => "Integer",
            ConstValue::Float(_) => "Float",
            ConstValue::Str(_) => "String",
            ConstValue::Sym(_) => "Symbol",
            ConstValue::Array(_) => "Array",
            ConstValue::Hash(_) => "Hash",
            ConstValue::Range { .. } => "Range",
        }
    }

    /// The corresponding type.
    #[must_use]
    pub fn ty(&self) -> Ty {
        Ty::instance(self.class_path())
    }
}

impl fmt::Display for ConstValue {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ConstValue::Nil => write!(f, "nil"),
            ConstValue::Bool(b) => write!(f, "{b}"),
            ConstValue::Int(n) => write!(f, "{n}"),
            ConstValue::Float(x) => write!(f, "{x}"),
            ConstValue::Str(s) => write!(f, "{s:?}"),
            ConstValue::Sym(s) => write!(f, ":{s}"),
            ConstValue::Array(items) => {
                write!(f, "[")?;
                for (i, item) in items.iter().enumerate() {
                    if i > 0 {
                        write!(f, ", ")?;
                    }
                    write!(f, "{item}")?;
                }
                write!(f, "]")
            }
            ConstValue::Hash(pairs) => {
                write!(f, "{{")?;
                for (i, (k, v)) in pairs.iter().enumerate() {
                    if i > 0 {
                        write!(f, ", ")?;
                    }
                    write!(f, "{k} => {v}")?;
                }
                write!(f, "}}")
            }
            ConstValue::Range { lo, hi, exclusive } => {
                write!(f, "{lo}{}{hi}", if *exclusive { "..." } else { ".." })
            }
        }
    }
}

/// Folds `node` to its constant value, or `None` when the node's value is
/// not determined by the source text alone. Constant references fold only
/// after scope annotation has attached a scope to the node.
#[must_use]
pub fn constant_value(
    ast: &Ast,
    scopes: &Scopes,
    bindings: &Bindings,
    node: NodeId,
) -> Option<ConstValue> {
    match ast.kind(node) {
        NodeKind::NilLit => Some(ConstValue::Nil),
        NodeKind::TrueLit => Some(ConstValue::Bool(true)),
        NodeKind::FalseLit => Some(ConstValue::Bool(false)),
        NodeKind::IntLit => ast.int_value(node).map(ConstValue::Int),
        NodeKind::FloatLit => ast.float_value(node).map(ConstValue::Float),
        NodeKind::StrLit => ast.text(node).map(|s| ConstValue::Str(s.clone())),
        NodeKind::SymLit => ast.text(node).map(|s| ConstValue::Sym(s.clone())),
        NodeKind::Paren => {
            let inner = *ast.raw_children(node).first()?;
            constant_value(ast, scopes, bindings, inner)
        }
        NodeKind::ArrayLit => {
            let items = ast
                .raw_children(node)
                .iter()
                .map(|&child| constant_value(ast, scopes, bindings, child))
                .collect::<Option<Vec<_>>>()?;
            Some(ConstValue::Array(items))
        }
        NodeKind::HashLit => {
            let children = ast.raw_children(node);
            if children.len() % 2 != 0 {
                return None;
            }
            let pairs = children
                .chunks(2)
                .map(|pair| {
                    let k = constant_value(ast, scopes, bindings, pair[0])?;
                    let v = constant_value(ast, scopes, bindings, pair[1])?;
                    Some((k, v))
                })
                .collect::<Option<Vec<_>>>()?;
            Some(ConstValue::Hash(pairs))
        }
        kind @ (NodeKind::RangeLit | NodeKind::RangeExclLit) => {
            let children = ast.raw_children(node);
            let lo = constant_value(ast, scopes, bindings, *children.first()?)?;
            let hi = constant_value(ast, scopes, bindings, *children.get(1)?)?;
            Some(ConstValue::Range {
                lo: Box::new(lo),
                hi: Box::new(hi),
                exclusive: kind == NodeKind::RangeExclLit,
            })
        }
        NodeKind::ConstRef => {
            let name = ast.name(node)?;
            let scope = ast.scope(node)?;
            let (binding, _) = scopes.find_constant_lexical(scope, name);
            bindings.get(binding?).const_value.clone()
        }
        _ => None,
    }
}

/// Whether `node` folds to a constant value.
#[must_use]
pub fn is_constant(ast: &Ast, scopes: &Scopes, bindings: &Bindings, node: NodeId) -> bool {
    constant_value(ast, scopes, bindings, node).is_some()
}
