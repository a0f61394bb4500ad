// Copyright 2026 James Casey
// SPDX-License-Identifier: Apache-2.0

//! Lowering of method bodies to control flow graphs.
//!
//! The builder walks a method body once, appending instructions to a
//! current block and splitting blocks at every branch, loop, return,
//! raise, and rescue boundary. Along the way it annotates every visited
//! node with its lexical scope, so later passes can fold constants and
//! answer scope queries without re-walking.
//!
//! A trailing block on a call lowers to a zero-or-more loop around the
//! block body: the branch out of the loop head carries no test, so both
//! the "runs never" and the "runs again" paths stay live for every
//! downstream analysis. The call instruction itself sits after the loop.
//!
//! Failures are values: any construct the builder cannot lower aborts
//! this one method with a [`GraphError`], and the session turns that into
//! an `unanalyzable` mark instead of poisoning the whole run.

use ecow::EcoString;

use super::{BlockId, EdgeKind, Graph, GraphError, Inst, Operand, Var};
use crate::diagnostics::{Diagnostic, DiagnosticKind};
use crate::entity::{Catalog, MethodId};
use crate::scope::{NameResolver, ScopeId, ScopeKind, Scopes, Bindings};
use crate::tree::{Ast, ConstValue, NodeId, NodeKind, constant_value};
use crate::types::Ty;

/// Builds the control flow graph for one method. Built-in stubs get a
/// trivial entry-to-exit graph.
pub fn build_method(
    ast: &mut Ast,
    scopes: &mut Scopes,
    bindings: &mut Bindings,
    catalog: &mut Catalog,
    method: MethodId,
) -> Result<Graph, GraphError> {
    let (body, def_node, scope, params) = {
        let m = catalog.method(method);
        (m.body, m.def_node, m.scope, m.params.clone())
    };
    let mut graph = Graph::new();
    let Some(body) = body else {
        let (entry, exit) = (graph.entry(), graph.exit());
        graph.add_edge(entry, exit, EdgeKind::Sequential);
        return Ok(graph);
    };
    let scope = scope.unwrap_or_else(|| scopes.global());
    let entry = graph.entry();
    let hoisted = ast.kind(body) == NodeKind::Program;
    let mut builder = Builder {
        ast,
        scopes,
        bindings,
        catalog,
        graph,
        current: entry,
        current_scope: scope,
        handler: None,
        hoisted,
    };

    let anchor = def_node.unwrap_or(body);
    for (i, name) in params.iter().enumerate() {
        let binding = match builder.scopes.find_local(scope, name) {
            Some(binding) => binding,
            None => builder.scopes.define_local(builder.bindings, scope, name.clone()),
        };
        builder.append(Inst::Assign {
            dst: Var::unversioned(binding),
            src: Operand::Arg(u32::try_from(i).unwrap_or(u32::MAX)),
            node: anchor,
        });
    }

    let value = builder.lower_stmts(body)?;
    if !builder.graph.is_terminated(builder.current) {
        builder.append(Inst::Return { value, node: body });
    }
    let (current, exit) = (builder.current, builder.graph.exit());
    builder.graph.add_edge(current, exit, EdgeKind::Sequential);
    Ok(builder.graph)
}

struct Builder<'a> {
    ast: &'a mut Ast,
    scopes: &'a mut Scopes,
    bindings: &'a mut Bindings,
    catalog: &'a mut Catalog,
    graph: Graph,
    current: BlockId,
    current_scope: ScopeId,
    /// Innermost target for exception edges; `None` means the method's
    /// exception exit.
    handler: Option<BlockId>,
    /// True when building the synthetic top-level method, whose
    /// definitions were already collected and must be skipped, not
    /// rejected.
    hoisted: bool,
}

impl Builder<'_> {
    fn resolver(&mut self) -> NameResolver<'_> {
        NameResolver {
            scopes: self.scopes,
            bindings: self.bindings,
            catalog: self.catalog,
        }
    }

    fn temp(&mut self) -> Var {
        Var::unversioned(self.bindings.fresh_temp())
    }

    /// Appends to the current block, wiring the exception edge when the
    /// instruction may raise.
    fn append(&mut self, inst: Inst) {
        let raises = inst.may_raise();
        self.graph.append(self.current, inst);
        if raises {
            let target = self.handler.unwrap_or_else(|| self.graph.exception_exit());
            self.graph.add_edge(self.current, target, EdgeKind::Exception);
        }
    }

    fn fresh_current(&mut self) -> BlockId {
        let block = self.graph.add_block();
        self.current = block;
        block
    }

    fn malformed(&self, node: NodeId, detail: &'static str) -> GraphError {
        GraphError::Malformed {
            kind: self.ast.kind(node),
            node,
            detail,
        }
    }

    fn scope_warning(&mut self, node: NodeId, message: String) {
        let span = self.ast.span(node);
        self.ast.attach(
            node,
            Diagnostic::warning(DiagnosticKind::ScopeResolution, message).with_span_opt(span),
        );
    }

    fn lower_stmts(&mut self, node: NodeId) -> Result<Operand, GraphError> {
        self.ast.set_scope(node, self.current_scope);
        let children = self.ast.children(node);
        let mut last = Operand::Const(ConstValue::Nil);
        for child in children {
            if self.hoisted && self.ast.kind(child).is_definition() {
                self.ast.set_scope(child, self.current_scope);
                last = Operand::Const(ConstValue::Nil);
                continue;
            }
            last = self.lower_expr(child)?;
        }
        Ok(last)
    }

    fn lower_expr(&mut self, node: NodeId) -> Result<Operand, GraphError> {
        self.ast.set_scope(node, self.current_scope);
        match self.ast.kind(node) {
            NodeKind::NilLit
            | NodeKind::TrueLit
            | NodeKind::FalseLit
            | NodeKind::IntLit
            | NodeKind::FloatLit
            | NodeKind::StrLit
            | NodeKind::SymLit => constant_value(self.ast, self.scopes, self.bindings, node)
                .map(Operand::Const)
                .ok_or_else(|| self.malformed(node, "literal without its payload")),
            NodeKind::ArrayLit | NodeKind::HashLit | NodeKind::RangeLit | NodeKind::RangeExclLit => {
                self.lower_collection(node)
            }
            NodeKind::FileKeyword => Ok(Operand::Opaque(Ty::instance("String"))),
            NodeKind::LineKeyword => Ok(Operand::Opaque(Ty::instance("Integer"))),
            NodeKind::SelfRef => Ok(Operand::SelfVal),
            NodeKind::Ident => self.lower_ident(node),
            NodeKind::IvarRef | NodeKind::CvarRef | NodeKind::GvarRef => self.lower_sigiled(node),
            NodeKind::ConstRef | NodeKind::TopConst | NodeKind::ConstPath => {
                self.lower_constant(node)
            }
            NodeKind::Assign => self.lower_assign(node),
            NodeKind::Call => self.lower_call(node),
            NodeKind::SuperCall => {
                let args = self.lower_arg_list_child(node, 0)?;
                let dst = self.temp();
                self.append(Inst::Super { dst, args, node });
                Ok(Operand::Var(dst))
            }
            NodeKind::YieldExpr => {
                let args = self.lower_arg_list_child(node, 0)?;
                let dst = self.temp();
                self.append(Inst::Yield { dst, args, node });
                Ok(Operand::Var(dst))
            }
            NodeKind::RaiseExpr => {
                let value = match self.ast.raw_children(node).first().copied() {
                    Some(child) => Some(self.lower_expr(child)?),
                    None => None,
                };
                self.append(Inst::Raise { value, node });
                self.fresh_current();
                Ok(Operand::Opaque(Ty::Bottom))
            }
            NodeKind::ReturnExpr => {
                let value = match self.ast.raw_children(node).first().copied() {
                    Some(child) => self.lower_expr(child)?,
                    None => Operand::Const(ConstValue::Nil),
                };
                self.append(Inst::Return { value, node });
                let (current, exit) = (self.current, self.graph.exit());
                self.graph.add_edge(current, exit, EdgeKind::Sequential);
                self.fresh_current();
                Ok(Operand::Opaque(Ty::Bottom))
            }
            NodeKind::If => self.lower_if(node),
            NodeKind::While => self.lower_while(node),
            NodeKind::Begin => self.lower_begin(node),
            NodeKind::Paren => {
                let inner = self
                    .ast
                    .raw_children(node)
                    .first()
                    .copied()
                    .ok_or_else(|| self.malformed(node, "empty parentheses"))?;
                self.lower_expr(inner)
            }
            NodeKind::StmtList => self.lower_stmts(node),
            kind @ (NodeKind::BlockLit
            | NodeKind::MethodDef
            | NodeKind::SingletonMethodDef
            | NodeKind::ClassDef
            | NodeKind::ModuleDef) => Err(GraphError::Unsupported { kind, node }),
            kind @ (NodeKind::Program
            | NodeKind::ArgList
            | NodeKind::ParamList
            | NodeKind::RescueClause
            | NodeKind::EnsureClause) => Err(GraphError::Malformed {
                kind,
                node,
                detail: "node outside its expected parent",
            }),
        }
    }

    fn lower_collection(&mut self, node: NodeId) -> Result<Operand, GraphError> {
        if let Some(value) = constant_value(self.ast, self.scopes, self.bindings, node) {
            return Ok(Operand::Const(value));
        }
        let class = match self.ast.kind(node) {
            NodeKind::ArrayLit => "Array",
            NodeKind::HashLit => "Hash",
            _ => "Range",
        };
        let children = self.ast.raw_children(node).to_vec();
        let args = children
            .into_iter()
            .map(|child| self.lower_expr(child))
            .collect::<Result<Vec<_>, _>>()?;
        let dst = self.temp();
        self.append(Inst::Construct {
            dst,
            class: class.into(),
            args,
            node,
        });
        Ok(Operand::Var(dst))
    }

    fn lower_ident(&mut self, node: NodeId) -> Result<Operand, GraphError> {
        let name = self
            .ast
            .name(node)
            .cloned()
            .ok_or_else(|| self.malformed(node, "identifier without a name"))?;
        if name == "self" {
            return Ok(Operand::SelfVal);
        }
        if let Some(binding) = self.scopes.find_local(self.current_scope, &name) {
            return Ok(Operand::Var(Var::unversioned(binding)));
        }
        // Not a known local: an implicit send to self.
        let dst = self.temp();
        self.append(Inst::Call {
            dst,
            recv: Operand::SelfVal,
            name,
            args: Vec::new(),
            node,
        });
        Ok(Operand::Var(dst))
    }

    fn lower_sigiled(&mut self, node: NodeId) -> Result<Operand, GraphError> {
        let name = self
            .ast
            .name(node)
            .cloned()
            .ok_or_else(|| self.malformed(node, "variable reference without a name"))?;
        let scope = self.current_scope;
        match self.resolver().lookup(scope, &name) {
            Ok(binding) => Ok(Operand::Var(Var::unversioned(binding))),
            Err(err) => {
                self.scope_warning(node, err.to_string());
                Ok(Operand::Opaque(Ty::Top))
            }
        }
    }

    /// Flattens a constant reference subtree to its `::`-separated text.
    fn const_path_text(&self, node: NodeId) -> Option<EcoString> {
        match self.ast.kind(node) {
            NodeKind::ConstRef => self.ast.name(node).cloned(),
            NodeKind::TopConst => {
                let name = self.ast.name(node)?;
                Some(EcoString::from(format!("::{name}")))
            }
            NodeKind::ConstPath => {
                let children = self.ast.raw_children(node);
                let lhs = self.const_path_text(*children.first()?)?;
                let rhs = self.ast.name(*children.get(1)?)?;
                Some(EcoString::from(format!("{lhs}::{rhs}")))
            }
            _ => None,
        }
    }

    fn lower_constant(&mut self, node: NodeId) -> Result<Operand, GraphError> {
        let path = self
            .const_path_text(node)
            .ok_or_else(|| self.malformed(node, "constant reference without a name"))?;
        let scope = self.current_scope;
        match self.resolver().lookup(scope, &path) {
            Ok(binding) => Ok(Operand::Var(Var::unversioned(binding))),
            Err(err) => {
                self.scope_warning(node, err.to_string());
                Ok(Operand::Opaque(Ty::Top))
            }
        }
    }

    fn lower_assign(&mut self, node: NodeId) -> Result<Operand, GraphError> {
        let children = self.ast.raw_children(node).to_vec();
        let [target, value] = children.as_slice() else {
            return Err(self.malformed(node, "assignment needs a target and a value"));
        };
        let (target, value) = (*target, *value);
        let src = self.lower_expr(value)?;
        self.ast.set_scope(target, self.current_scope);
        match self.ast.kind(target) {
            NodeKind::Ident => {
                let name = self
                    .ast
                    .name(target)
                    .cloned()
                    .ok_or_else(|| self.malformed(target, "identifier without a name"))?;
                let scope = self.current_scope;
                let binding = match self.resolver().lookup_or_create_local(scope, &name) {
                    Ok(binding) => binding,
                    Err(err) => {
                        self.scope_warning(target, err.to_string());
                        return Ok(src);
                    }
                };
                let dst = Var::unversioned(binding);
                self.append(Inst::Assign { dst, src, node });
                Ok(Operand::Var(dst))
            }
            NodeKind::IvarRef | NodeKind::CvarRef | NodeKind::GvarRef => {
                let name = self
                    .ast
                    .name(target)
                    .cloned()
                    .ok_or_else(|| self.malformed(target, "variable reference without a name"))?;
                let scope = self.current_scope;
                match self.resolver().lookup(scope, &name) {
                    Ok(binding) => {
                        let dst = Var::unversioned(binding);
                        self.append(Inst::Assign { dst, src, node });
                        Ok(Operand::Var(dst))
                    }
                    Err(err) => {
                        self.scope_warning(target, err.to_string());
                        Ok(src)
                    }
                }
            }
            NodeKind::ConstRef => {
                let name = self
                    .ast
                    .name(target)
                    .cloned()
                    .ok_or_else(|| self.malformed(target, "constant without a name"))?;
                let folded = constant_value(self.ast, self.scopes, self.bindings, value);
                let referent = match &src {
                    Operand::Var(var) => self.bindings.get(var.binding).referent,
                    _ => None,
                };
                let binding = self.scopes.define_constant(
                    self.bindings,
                    self.current_scope,
                    name,
                    referent,
                    folded,
                );
                let dst = Var::unversioned(binding);
                self.append(Inst::Assign { dst, src, node });
                Ok(Operand::Var(dst))
            }
            NodeKind::Call => {
                // Attribute assignment: `recv.name = value` sends `name=`.
                let target_children = self.ast.raw_children(target).to_vec();
                let name = self
                    .ast
                    .name(target)
                    .cloned()
                    .ok_or_else(|| self.malformed(target, "call without a message name"))?;
                let mut idx = 0;
                let recv = match target_children.first().copied() {
                    Some(first) if self.ast.kind(first) != NodeKind::ArgList => {
                        idx = 1;
                        self.lower_expr(first)?
                    }
                    _ => Operand::SelfVal,
                };
                let mut args = match target_children.get(idx).copied() {
                    Some(list) if self.ast.kind(list) == NodeKind::ArgList => {
                        self.lower_arg_list(list)?
                    }
                    _ => Vec::new(),
                };
                args.push(src.clone());
                let dst = self.temp();
                self.append(Inst::Call {
                    dst,
                    recv,
                    name: EcoString::from(format!("{name}=")),
                    args,
                    node,
                });
                Ok(src)
            }
            kind => Err(GraphError::Unsupported {
                kind,
                node: target,
            }),
        }
    }

    fn lower_arg_list(&mut self, list: NodeId) -> Result<Vec<Operand>, GraphError> {
        self.ast.set_scope(list, self.current_scope);
        let children = self.ast.raw_children(list).to_vec();
        children
            .into_iter()
            .map(|child| self.lower_expr(child))
            .collect()
    }

    fn lower_arg_list_child(&mut self, node: NodeId, index: usize) -> Result<Vec<Operand>, GraphError> {
        match self.ast.raw_children(node).get(index).copied() {
            Some(list) if self.ast.kind(list) == NodeKind::ArgList => self.lower_arg_list(list),
            _ => Ok(Vec::new()),
        }
    }

    fn lower_call(&mut self, node: NodeId) -> Result<Operand, GraphError> {
        let name = self
            .ast
            .name(node)
            .cloned()
            .ok_or_else(|| self.malformed(node, "call without a message name"))?;
        let children = self.ast.raw_children(node).to_vec();
        let mut idx = 0;
        let recv = match children.first().copied() {
            Some(first) if self.ast.kind(first) != NodeKind::ArgList => {
                idx = 1;
                Some(self.lower_expr(first)?)
            }
            _ => None,
        };
        let args = match children.get(idx).copied() {
            Some(list) if self.ast.kind(list) == NodeKind::ArgList => self.lower_arg_list(list)?,
            _ => return Err(self.malformed(node, "call without an argument list")),
        };
        let block = children
            .get(idx + 1)
            .copied()
            .filter(|&b| self.ast.kind(b) == NodeKind::BlockLit);
        if let Some(block) = block {
            return self.lower_block_call(recv, name, args, block, node);
        }
        let dst = self.temp();
        self.append(Inst::Call {
            dst,
            recv: recv.unwrap_or(Operand::SelfVal),
            name,
            args,
            node,
        });
        Ok(Operand::Var(dst))
    }

    /// Lowers `recv.m(args) { |params| body }` as a zero-or-more loop over
    /// the block body followed by the call itself. The loop head branches
    /// without a test: how often the callee yields is not ours to know.
    fn lower_block_call(
        &mut self,
        recv: Option<Operand>,
        name: EcoString,
        args: Vec<Operand>,
        block: NodeId,
        node: NodeId,
    ) -> Result<Operand, GraphError> {
        self.ast.set_scope(block, self.current_scope);
        let block_children = self.ast.raw_children(block).to_vec();
        let [params_node, body_node] = block_children.as_slice() else {
            return Err(self.malformed(block, "block needs a parameter list and a body"));
        };
        let (params_node, body_node) = (*params_node, *body_node);

        let head = self.graph.add_block();
        let body_block = self.graph.add_block();
        let done = self.graph.add_block();
        let current = self.current;
        self.graph.add_edge(current, head, EdgeKind::Sequential);
        self.graph.add_edge(head, body_block, EdgeKind::BranchTrue);
        self.graph.add_edge(head, done, EdgeKind::BranchFalse);

        let enclosing = self.scopes.get(self.current_scope);
        let self_ty = self.bindings.get(enclosing.self_binding).ty.clone();
        let self_entity = enclosing.self_entity;
        let block_scope = self.scopes.create(
            self.bindings,
            ScopeKind::Open,
            self.current_scope,
            self_ty,
            self_entity,
        );

        self.current = body_block;
        let saved_scope = self.current_scope;
        self.current_scope = block_scope;
        self.ast.set_scope(params_node, block_scope);
        let params = self.ast.raw_children(params_node).to_vec();
        for param in params {
            self.ast.set_scope(param, block_scope);
            let pname = self
                .ast
                .name(param)
                .cloned()
                .ok_or_else(|| self.malformed(param, "block parameter without a name"))?;
            let binding = self.scopes.define_local(self.bindings, block_scope, pname);
            self.append(Inst::Assign {
                dst: Var::unversioned(binding),
                src: Operand::Opaque(Ty::Top),
                node: param,
            });
        }
        self.lower_stmts(body_node)?;
        self.current_scope = saved_scope;
        let body_end = self.current;
        self.graph.add_edge(body_end, head, EdgeKind::LoopBack);

        self.current = done;
        let dst = self.temp();
        self.append(Inst::Call {
            dst,
            recv: recv.unwrap_or(Operand::SelfVal),
            name,
            args,
            node,
        });
        Ok(Operand::Var(dst))
    }

    fn lower_if(&mut self, node: NodeId) -> Result<Operand, GraphError> {
        let children = self.ast.raw_children(node).to_vec();
        if children.len() < 2 {
            return Err(self.malformed(node, "if needs a condition and a then arm"));
        }
        let cond = self.lower_expr(children[0])?;
        self.append(Inst::Test { cond, node });
        let cond_block = self.current;
        let result = self.temp();
        let join = self.graph.add_block();

        let then_block = self.graph.add_block();
        self.graph.add_edge(cond_block, then_block, EdgeKind::BranchTrue);
        self.current = then_block;
        let then_value = self.lower_stmts(children[1])?;
        self.append(Inst::Assign {
            dst: result,
            src: then_value,
            node,
        });
        let then_end = self.current;
        self.graph.add_edge(then_end, join, EdgeKind::Sequential);

        let else_block = self.graph.add_block();
        self.graph.add_edge(cond_block, else_block, EdgeKind::BranchFalse);
        self.current = else_block;
        let else_value = match children.get(2).copied() {
            Some(arm) => self.lower_stmts(arm)?,
            None => Operand::Const(ConstValue::Nil),
        };
        self.append(Inst::Assign {
            dst: result,
            src: else_value,
            node,
        });
        let else_end = self.current;
        self.graph.add_edge(else_end, join, EdgeKind::Sequential);

        self.current = join;
        Ok(Operand::Var(result))
    }

    fn lower_while(&mut self, node: NodeId) -> Result<Operand, GraphError> {
        let children = self.ast.raw_children(node).to_vec();
        let [cond_node, body_node] = children.as_slice() else {
            return Err(self.malformed(node, "while needs a condition and a body"));
        };
        let (cond_node, body_node) = (*cond_node, *body_node);

        let head = self.graph.add_block();
        let current = self.current;
        self.graph.add_edge(current, head, EdgeKind::Sequential);
        self.current = head;
        let cond = self.lower_expr(cond_node)?;
        self.append(Inst::Test { cond, node });
        let branch_src = self.current;

        let body = self.graph.add_block();
        let after = self.graph.add_block();
        self.graph.add_edge(branch_src, body, EdgeKind::BranchTrue);
        self.graph.add_edge(branch_src, after, EdgeKind::BranchFalse);

        self.current = body;
        self.lower_stmts(body_node)?;
        let body_end = self.current;
        self.graph.add_edge(body_end, head, EdgeKind::LoopBack);

        self.current = after;
        Ok(Operand::Const(ConstValue::Nil))
    }

    fn lower_begin(&mut self, node: NodeId) -> Result<Operand, GraphError> {
        let children = self.ast.raw_children(node).to_vec();
        let Some(&body_stmts) = children.first() else {
            return Err(self.malformed(node, "begin without a body"));
        };
        if self.ast.kind(body_stmts) != NodeKind::StmtList {
            return Err(self.malformed(node, "begin body must be a statement list"));
        }
        let rescues: Vec<NodeId> = children
            .iter()
            .copied()
            .filter(|&c| self.ast.kind(c) == NodeKind::RescueClause)
            .collect();
        let ensure_clause = children
            .iter()
            .copied()
            .find(|&c| self.ast.kind(c) == NodeKind::EnsureClause);
        if rescues.is_empty() && ensure_clause.is_none() {
            return self.lower_stmts(body_stmts);
        }

        let after = self.graph.add_block();
        let ensure_block = ensure_clause.map(|_| self.graph.add_block());
        let dispatch = if rescues.is_empty() {
            None
        } else {
            Some(self.graph.add_block())
        };
        let outer = self.handler;
        let result = self.temp();
        let normal_next = ensure_block.unwrap_or(after);

        // Protected body.
        let body_block = self.graph.add_block();
        let current = self.current;
        self.graph.add_edge(current, body_block, EdgeKind::Sequential);
        self.current = body_block;
        self.handler = dispatch.or(ensure_block).or(outer);
        let body_value = self.lower_stmts(body_stmts)?;
        self.append(Inst::Assign {
            dst: result,
            src: body_value,
            node,
        });
        self.handler = outer;
        let body_end = self.current;
        self.graph.add_edge(body_end, normal_next, EdgeKind::Sequential);

        // Exception dispatch and rescue arms.
        if let Some(dispatch) = dispatch {
            let unmatched = ensure_block
                .or(outer)
                .unwrap_or_else(|| self.graph.exception_exit());
            self.graph.add_edge(dispatch, unmatched, EdgeKind::Exception);
            for rescue in rescues {
                self.ast.set_scope(rescue, self.current_scope);
                let Some(&arm_stmts) = self.ast.raw_children(rescue).first() else {
                    return Err(self.malformed(rescue, "rescue without a body"));
                };
                let arm = self.graph.add_block();
                self.graph.add_edge(dispatch, arm, EdgeKind::RescueHandler);
                self.current = arm;
                self.handler = ensure_block.or(outer);
                let arm_value = self.lower_stmts(arm_stmts)?;
                self.append(Inst::Assign {
                    dst: result,
                    src: arm_value,
                    node,
                });
                self.handler = outer;
                let arm_end = self.current;
                self.graph.add_edge(arm_end, normal_next, EdgeKind::Sequential);
            }
        }

        // Ensure body runs on both paths; its exception edge models the
        // re-raise continuation after an exceptional entry.
        if let (Some(ensure_block), Some(clause)) = (ensure_block, ensure_clause) {
            self.ast.set_scope(clause, self.current_scope);
            let Some(&ensure_stmts) = self.ast.raw_children(clause).first() else {
                return Err(self.malformed(clause, "ensure without a body"));
            };
            self.current = ensure_block;
            self.handler = outer;
            self.lower_stmts(ensure_stmts)?;
            let ensure_end = self.current;
            self.graph.add_edge(ensure_end, after, EdgeKind::Sequential);
            let reraise = outer.unwrap_or_else(|| self.graph.exception_exit());
            self.graph.add_edge(ensure_end, reraise, EdgeKind::Exception);
        }

        self.current = after;
        Ok(Operand::Var(result))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::entity::{Method, MethodKind, builtins};
    use crate::test_helpers::{
        assign_local, begin, call, call_with_block, ident, if_expr, int, method_def, raise_expr,
        ret, str_lit, while_expr,
    };
    use crate::tree::RawNode;

    struct Built {
        ast: Ast,
        scopes: Scopes,
        bindings: Bindings,
        catalog: Catalog,
        result: Result<Graph, GraphError>,
    }

    /// Wraps `body` in a method on Object and builds its graph.
    fn build(body: Vec<RawNode>) -> Built {
        let mut bindings = Bindings::default();
        let mut scopes = Scopes::new(&mut bindings);
        let mut catalog = builtins::seed(&mut scopes, &mut bindings);
        let mut ast = Ast::from_raw(crate::test_helpers::program(vec![method_def(
            "subject", &[], body,
        )]));
        let def = ast.raw_children(ast.root())[0];
        let body_node = ast.raw_children(def)[1];
        let object = catalog.entity_by_path("Object").unwrap();
        let scope = scopes.create(
            &mut bindings,
            ScopeKind::Closed,
            scopes.global(),
            Ty::instance("Object"),
            Some(object),
        );
        let mid = catalog.add_method(Method::user(
            "subject",
            object,
            MethodKind::Instance,
            vec![],
            body_node,
            def,
            scope,
        ));
        let result = build_method(&mut ast, &mut scopes, &mut bindings, &mut catalog, mid);
        Built {
            ast,
            scopes,
            bindings,
            catalog,
            result,
        }
    }

    fn count_insts(graph: &Graph, pred: impl Fn(&Inst) -> bool) -> usize {
        graph
            .block_ids()
            .map(|b| graph.block(b).insts.iter().filter(|i| pred(i)).count())
            .sum()
    }

    #[test]
    fn straight_line_body_ends_with_implicit_return() {
        let built = build(vec![assign_local("x", int(1)), ident("x")]);
        let graph = built.result.expect("graph");
        assert_eq!(
            count_insts(&graph, |i| matches!(i, Inst::Return { .. })),
            1,
            "one implicit return of the last expression"
        );
        let returns_var = graph.block_ids().any(|b| {
            graph.block(b).insts.iter().any(|i| {
                matches!(i, Inst::Return { value: Operand::Var(_), .. })
            })
        });
        assert!(returns_var, "implicit return carries the last value");
    }

    #[test]
    fn if_forks_and_joins_through_a_result_temp() {
        let built = build(vec![if_expr(
            call(None, "gets", vec![]),
            vec![int(1)],
            Some(vec![int(2)]),
        )]);
        let graph = built.result.expect("graph");
        assert_eq!(count_insts(&graph, |i| matches!(i, Inst::Test { .. })), 1);
        // Both arms assign the same temp.
        let mut assigned = std::collections::BTreeSet::new();
        for b in graph.block_ids() {
            for inst in &graph.block(b).insts {
                if let Inst::Assign { dst, src: Operand::Const(_), .. } = inst {
                    if built.bindings.get(dst.binding).synthetic {
                        assigned.insert(dst.binding);
                    }
                }
            }
        }
        assert_eq!(assigned.len(), 1, "one shared result temp");
    }

    #[test]
    fn while_makes_a_loop_back_edge() {
        let built = build(vec![while_expr(call(None, "gets", vec![]), vec![int(1)])]);
        let graph = built.result.expect("graph");
        let has_loop_back = graph.block_ids().any(|b| {
            graph
                .block(b)
                .succs
                .iter()
                .any(|&(_, kind)| kind == EdgeKind::LoopBack)
        });
        assert!(has_loop_back);
    }

    #[test]
    fn raise_routes_to_exception_exit_when_unprotected() {
        let built = build(vec![raise_expr(Some(str_lit("boom"))), int(9)]);
        let graph = built.result.expect("graph");
        let raising_block = graph
            .block_ids()
            .find(|&b| graph.block(b).insts.iter().any(|i| matches!(i, Inst::Raise { .. })))
            .expect("raise block");
        assert!(
            graph
                .block(raising_block)
                .succs
                .iter()
                .any(|&(to, kind)| kind == EdgeKind::Exception && to == graph.exception_exit()),
            "unprotected raise exits exceptionally"
        );
    }

    #[test]
    fn begin_rescue_wires_dispatch_and_handler_edges() {
        let built = build(vec![begin(
            vec![call(None, "gets", vec![])],
            vec![vec![int(0)]],
            None,
        )]);
        let graph = built.result.expect("graph");
        let rescue_edges: usize = graph
            .block_ids()
            .map(|b| {
                graph
                    .block(b)
                    .succs
                    .iter()
                    .filter(|&&(_, kind)| kind == EdgeKind::RescueHandler)
                    .count()
            })
            .sum();
        assert_eq!(rescue_edges, 1, "one rescue arm, one handler edge");
        // The protected call's exception edge lands on dispatch, not on
        // the exception exit.
        let call_block = graph
            .block_ids()
            .find(|&b| graph.block(b).insts.iter().any(|i| matches!(i, Inst::Call { .. })))
            .expect("call block");
        assert!(
            graph
                .block(call_block)
                .succs
                .iter()
                .any(|&(to, kind)| kind == EdgeKind::Exception && to != graph.exception_exit()),
            "protected call routes to rescue dispatch"
        );
    }

    #[test]
    fn ensure_runs_on_both_paths() {
        let built = build(vec![begin(
            vec![call(None, "gets", vec![])],
            vec![],
            Some(vec![call(None, "puts", vec![str_lit("done")])]),
        )]);
        let graph = built.result.expect("graph");
        let ensure_kinds: usize = graph
            .block_ids()
            .map(|b| {
                graph
                    .block(b)
                    .succs
                    .iter()
                    .filter(|&&(to, kind)| {
                        kind == EdgeKind::Exception && to == graph.exception_exit()
                    })
                    .count()
            })
            .sum();
        assert!(ensure_kinds >= 1, "ensure block re-raises outward");
    }

    #[test]
    fn trailing_block_lowers_to_a_testless_loop() {
        let built = build(vec![call_with_block(
            Some(ident("xs")),
            "each",
            vec![],
            &["item"],
            vec![call(None, "puts", vec![ident("item")])],
        )]);
        // `xs` is not a local, so it lowers to an implicit self-send and
        // the build still succeeds.
        let graph = built.result.expect("graph");
        let head = graph
            .block_ids()
            .find(|&b| {
                let succs = &graph.block(b).succs;
                succs.iter().any(|&(_, k)| k == EdgeKind::BranchTrue)
                    && succs.iter().any(|&(_, k)| k == EdgeKind::BranchFalse)
                    && !graph.block(b).insts.iter().any(|i| matches!(i, Inst::Test { .. }))
            })
            .expect("testless loop head");
        assert!(
            graph.block(head).preds.len() >= 2,
            "loop head merges entry and loop back"
        );
    }

    #[test]
    fn block_parameters_live_in_an_open_scope() {
        let built = build(vec![
            assign_local("total", int(0)),
            call_with_block(
                Some(ident("total")),
                "times",
                vec![],
                &["i"],
                vec![assign_local("total", ident("i"))],
            ),
        ]);
        built.result.expect("graph");
        // The block scope saw `total` from the method scope: only one
        // binding named total exists.
        let totals = built
            .bindings
            .iter()
            .filter(|(_, b)| b.name == "total")
            .count();
        assert_eq!(totals, 1, "open scope re-used the enclosing local");
    }

    #[test]
    fn nested_method_definition_is_rejected() {
        let built = build(vec![method_def("inner", &[], vec![int(1)])]);
        let err = built.result.expect_err("nested def must fail");
        assert!(matches!(err, GraphError::Unsupported { .. }));
    }

    #[test]
    fn scopes_are_annotated_during_lowering() {
        let built = build(vec![assign_local("x", int(1))]);
        built.result.expect("graph");
        let def = built.ast.raw_children(built.ast.root())[0];
        let body = built.ast.raw_children(def)[1];
        let assign = built.ast.raw_children(body)[0];
        assert!(built.ast.scope(assign).is_some(), "nodes carry their scope");
        let _ = (&built.scopes, &built.catalog);
    }

    #[test]
    fn return_statement_edges_to_exit() {
        let built = build(vec![ret(Some(int(5))), int(6)]);
        let graph = built.result.expect("graph");
        let return_block = graph
            .block_ids()
            .find(|&b| graph.block(b).insts.iter().any(|i| matches!(i, Inst::Return { .. })))
            .expect("return block");
        assert!(
            graph
                .block(return_block)
                .succs
                .iter()
                .any(|&(to, kind)| to == graph.exit() && kind == EdgeKind::Sequential)
        );
    }
}
