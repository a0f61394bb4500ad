// Copyright 2026 James Casey
// SPDX-License-Identifier: Apache-2.0

//! Shared test helpers for use in lumen-core and dependent crate tests.
//!
//! Mostly shorthand constructors for [`RawNode`] trees, so tests read like
//! the source they stand for rather than nested struct literals. None of
//! these attach spans; tests that exercise span handling attach their own
//! with [`RawNode::with_span`].

use ecow::EcoString;

use crate::tree::{NodeKind, Payload, RawNode};

#[must_use]
pub fn program(statements: Vec<RawNode>) -> RawNode {
    RawNode::new(NodeKind::Program).with_children(statements)
}

#[must_use]
pub fn stmts(statements: Vec<RawNode>) -> RawNode {
    RawNode::new(NodeKind::StmtList).with_children(statements)
}

#[must_use]
pub fn nil() -> RawNode {
    RawNode::new(NodeKind::NilLit)
}

#[must_use]
pub fn true_lit() -> RawNode {
    RawNode::new(NodeKind::TrueLit)
}

#[must_use]
pub fn false_lit() -> RawNode {
    RawNode::new(NodeKind::FalseLit)
}

#[must_use]
pub fn int(value: i64) -> RawNode {
    RawNode::new(NodeKind::IntLit).with_payload(Payload::Int(value))
}

#[must_use]
pub fn float(value: f64) -> RawNode {
    RawNode::new(NodeKind::FloatLit).with_payload(Payload::Float(value))
}

#[must_use]
pub fn str_lit(text: &str) -> RawNode {
    RawNode::new(NodeKind::StrLit).with_payload(Payload::Text(text.into()))
}

#[must_use]
pub fn sym(name: &str) -> RawNode {
    RawNode::new(NodeKind::SymLit).with_payload(Payload::Name(name.into()))
}

#[must_use]
pub fn array(items: Vec<RawNode>) -> RawNode {
    RawNode::new(NodeKind::ArrayLit).with_children(items)
}

#[must_use]
pub fn hash(pairs: Vec<(RawNode, RawNode)>) -> RawNode {
    let mut children = Vec::with_capacity(pairs.len() * 2);
    for (key, value) in pairs {
        children.push(key);
        children.push(value);
    }
    RawNode::new(NodeKind::HashLit).with_children(children)
}

#[must_use]
pub fn range(lo: RawNode, hi: RawNode, exclusive: bool) -> RawNode {
    let kind = if exclusive {
        NodeKind::RangeExclLit
    } else {
        NodeKind::RangeLit
    };
    RawNode::new(kind).with_children(vec![lo, hi])
}

#[must_use]
pub fn self_ref() -> RawNode {
    RawNode::new(NodeKind::SelfRef)
}

#[must_use]
pub fn ident(name: &str) -> RawNode {
    RawNode::named(NodeKind::Ident, name)
}

#[must_use]
pub fn const_ref(name: &str) -> RawNode {
    RawNode::named(NodeKind::ConstRef, name)
}

#[must_use]
pub fn ivar(name: &str) -> RawNode {
    RawNode::named(NodeKind::IvarRef, name)
}

#[must_use]
pub fn cvar(name: &str) -> RawNode {
    RawNode::named(NodeKind::CvarRef, name)
}

#[must_use]
pub fn gvar(name: &str) -> RawNode {
    RawNode::named(NodeKind::GvarRef, name)
}

#[must_use]
pub fn assign(target: RawNode, value: RawNode) -> RawNode {
    RawNode::new(NodeKind::Assign).with_children(vec![target, value])
}

/// An assignment to a plain local.
#[must_use]
pub fn assign_local(name: &str, value: RawNode) -> RawNode {
    assign(ident(name), value)
}

fn arg_list(args: Vec<RawNode>) -> RawNode {
    RawNode::new(NodeKind::ArgList).with_children(args)
}

fn param_list(params: &[&str]) -> RawNode {
    RawNode::new(NodeKind::ParamList)
        .with_children(params.iter().map(|p| ident(p)).collect())
}

/// A message send. `recv: None` is an implicit self-send.
#[must_use]
pub fn call(recv: Option<RawNode>, name: &str, args: Vec<RawNode>) -> RawNode {
    let mut children = Vec::new();
    if let Some(recv) = recv {
        children.push(recv);
    }
    children.push(arg_list(args));
    RawNode::named(NodeKind::Call, name).with_children(children)
}

/// A message send with a trailing block.
#[must_use]
pub fn call_with_block(
    recv: Option<RawNode>,
    name: &str,
    args: Vec<RawNode>,
    block_params: &[&str],
    block_body: Vec<RawNode>,
) -> RawNode {
    let mut children = Vec::new();
    if let Some(recv) = recv {
        children.push(recv);
    }
    children.push(arg_list(args));
    children.push(
        RawNode::new(NodeKind::BlockLit)
            .with_children(vec![param_list(block_params), stmts(block_body)]),
    );
    RawNode::named(NodeKind::Call, name).with_children(children)
}

#[must_use]
pub fn super_call(args: Vec<RawNode>) -> RawNode {
    RawNode::new(NodeKind::SuperCall).with_children(vec![arg_list(args)])
}

#[must_use]
pub fn yield_expr(args: Vec<RawNode>) -> RawNode {
    RawNode::new(NodeKind::YieldExpr).with_children(vec![arg_list(args)])
}

#[must_use]
pub fn raise_expr(value: Option<RawNode>) -> RawNode {
    RawNode::new(NodeKind::RaiseExpr).with_children(value.into_iter().collect())
}

#[must_use]
pub fn ret(value: Option<RawNode>) -> RawNode {
    RawNode::new(NodeKind::ReturnExpr).with_children(value.into_iter().collect())
}

#[must_use]
pub fn if_expr(cond: RawNode, then: Vec<RawNode>, els: Option<Vec<RawNode>>) -> RawNode {
    let mut children = vec![cond, stmts(then)];
    if let Some(els) = els {
        children.push(stmts(els));
    }
    RawNode::new(NodeKind::If).with_children(children)
}

#[must_use]
pub fn while_expr(cond: RawNode, body: Vec<RawNode>) -> RawNode {
    RawNode::new(NodeKind::While).with_children(vec![cond, stmts(body)])
}

/// A begin/rescue/ensure unit. Each entry of `rescues` is one handler
/// body.
#[must_use]
pub fn begin(
    body: Vec<RawNode>,
    rescues: Vec<Vec<RawNode>>,
    ensure: Option<Vec<RawNode>>,
) -> RawNode {
    let mut children = vec![stmts(body)];
    for rescue_body in rescues {
        children.push(RawNode::new(NodeKind::RescueClause).with_children(vec![stmts(rescue_body)]));
    }
    if let Some(ensure_body) = ensure {
        children.push(RawNode::new(NodeKind::EnsureClause).with_children(vec![stmts(ensure_body)]));
    }
    RawNode::new(NodeKind::Begin).with_children(children)
}

#[must_use]
pub fn method_def(name: &str, params: &[&str], body: Vec<RawNode>) -> RawNode {
    RawNode::named(NodeKind::MethodDef, name)
        .with_children(vec![param_list(params), stmts(body)])
}

#[must_use]
pub fn singleton_method_def(name: &str, params: &[&str], body: Vec<RawNode>) -> RawNode {
    RawNode::named(NodeKind::SingletonMethodDef, name)
        .with_children(vec![param_list(params), stmts(body)])
}

#[must_use]
pub fn class_def(name: &str, superclass: Option<&str>, body: Vec<RawNode>) -> RawNode {
    let mut children = vec![const_ref(name)];
    if let Some(sup) = superclass {
        children.push(const_ref(sup));
    }
    children.push(stmts(body));
    RawNode::new(NodeKind::ClassDef).with_children(children)
}

#[must_use]
pub fn module_def(name: &str, body: Vec<RawNode>) -> RawNode {
    RawNode::new(NodeKind::ModuleDef).with_children(vec![const_ref(name), stmts(body)])
}

/// Renders a method name list as `EcoString`s, for asserting against
/// catalog tables.
#[must_use]
pub fn names(list: &[&str]) -> Vec<EcoString> {
    list.iter().map(|&n| n.into()).collect()
}
