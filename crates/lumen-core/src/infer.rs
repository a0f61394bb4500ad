// Copyright 2026 James Casey
// SPDX-License-Identifier: Apache-2.0

//! The memoized signature engine.
//!
//! A query asks: what does `method` return when called on a receiver of
//! type `recv` with arguments of types `args`? Answers are memoized per
//! call shape with a two-phase cache entry. On entry the key is marked
//! [`Pending`](MemoEntry::Pending); a re-entrant query for a Pending key
//! answers [`Ty::Bottom`], the recursion placeholder that joins away; on
//! completion the entry becomes `Resolved`. After the outermost query
//! returns, entries whose computation consumed a placeholder are
//! recomputed until the cache stops changing, so the final answer does
//! not depend on which call entered the cycle first.
//!
//! User methods are evaluated abstractly over their SSA graph: literals
//! have their literal class, `self` has the receiver type, parameters
//! take the actual argument types, phis join, and sends recurse through
//! the catalog. Built-in stubs answer from their seeded signatures.
//!
//! Every resolved query records a [`Signature`] on the method, checks
//! the conversion-method contracts (`to_s` must return a String, `!`
//! must return a boolean, and so on) and feeds the predicate registry.

use std::collections::{BTreeMap, BTreeSet, HashMap};

use crate::control_flow::{Dominators, Graph, Inst, Operand, Var};
use crate::diagnostics::{Diagnostic, DiagnosticKind};
use crate::entity::{Catalog, EntityId, MethodId, MethodKind, Signature};
use crate::scope::{BindingKind, Bindings};
use crate::tree::{Ast, NodeId};
use crate::types::Ty;

/// A call shape: receiver type plus argument types.
pub type SigKey = (Ty, Vec<Ty>);

/// Bound on post-query refinement rounds. Joins over a finite set of
/// class paths converge long before this.
const REFINE_ROUNDS: usize = 8;

#[derive(Debug, Clone, PartialEq)]
enum MemoEntry {
    /// The query is in flight; a re-entrant hit answers Bottom.
    Pending,
    Resolved(Ty),
}

/// Cross-query engine state, owned by the session and shared by every
/// method evaluation.
#[derive(Debug, Default)]
pub struct EngineState {
    memo: BTreeMap<(MethodId, SigKey), MemoEntry>,
    /// Keys whose computation consumed a Pending placeholder.
    tainted: BTreeSet<(MethodId, SigKey)>,
    /// One flag per query on the active stack; consulting a Pending
    /// entry taints every query currently in flight.
    taint_stack: Vec<bool>,
    /// Synthetic probe queries record signatures but skip predicate
    /// observation.
    pub probing: bool,
}

impl EngineState {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    fn mark_taint(&mut self) {
        for flag in &mut self.taint_stack {
            *flag = true;
        }
    }
}

/// A borrowed view of everything a query needs. The graphs map outlives
/// the engine so graph borrows can cross recursive queries.
pub struct Engine<'a> {
    pub ast: &'a mut Ast,
    pub bindings: &'a mut Bindings,
    pub catalog: &'a mut Catalog,
    pub graphs: &'a BTreeMap<MethodId, Graph>,
    pub state: &'a mut EngineState,
}

impl Engine<'_> {
    /// The public inference entry: the return type of `method` for the
    /// given call shape. Runs refinement rounds when the computation hit
    /// a recursive cycle, so repeated identical queries are stable.
    pub fn return_type(&mut self, method: MethodId, recv: Ty, args: Vec<Ty>) -> Ty {
        let mut result = self.query(method, recv.clone(), args.clone());
        if !self.state.taint_stack.is_empty() {
            return result;
        }
        for _ in 0..REFINE_ROUNDS {
            if self.state.tainted.is_empty() {
                break;
            }
            for key in std::mem::take(&mut self.state.tainted) {
                self.state.memo.remove(&key);
            }
            let next = self.query(method, recv.clone(), args.clone());
            if next == result {
                break;
            }
            result = next;
        }
        // Entries still listed were recomputed to the same values; the
        // cache is at a fixed point.
        self.state.tainted.clear();
        result
    }

    fn query(&mut self, method: MethodId, recv: Ty, args: Vec<Ty>) -> Ty {
        let key = (method, (recv.clone(), args.clone()));
        match self.state.memo.get(&key) {
            Some(MemoEntry::Resolved(ty)) => return ty.clone(),
            Some(MemoEntry::Pending) => {
                self.state.mark_taint();
                return Ty::Bottom;
            }
            None => {}
        }
        self.state.memo.insert(key.clone(), MemoEntry::Pending);
        self.state.taint_stack.push(false);
        let ret = self.compute(method, &recv, &args);
        let consumed_placeholder = self.state.taint_stack.pop().unwrap_or(false);
        if consumed_placeholder {
            self.state.tainted.insert(key.clone());
        }
        self.state.memo.insert(key, MemoEntry::Resolved(ret.clone()));
        self.record_and_check(method, &args, &ret);
        ret
    }

    fn compute(&mut self, method: MethodId, recv: &Ty, args: &[Ty]) -> Ty {
        if self.catalog.method(method).is_builtin() {
            return self.builtin_return(method, args);
        }
        if self.catalog.method(method).unanalyzable {
            return Ty::Top;
        }
        let graphs = self.graphs;
        let Some(graph) = graphs.get(&method) else {
            return Ty::Top;
        };
        self.eval_graph(graph, method, recv, args)
    }

    /// Built-in stubs answer from seeded signatures: join the return
    /// types of every signature the actual argument types satisfy.
    fn builtin_return(&self, method: MethodId, args: &[Ty]) -> Ty {
        if args.iter().any(|a| a.is_bottom()) {
            return Ty::Bottom;
        }
        let data = self.catalog.method(method);
        let ret = Ty::join_all(
            data.signatures
                .iter()
                .filter(|sig| {
                    sig.args.len() == args.len()
                        && args
                            .iter()
                            .zip(&sig.args)
                            .all(|(actual, expected)| actual.is_subtype(expected, self.catalog))
                })
                .map(|sig| sig.ret.clone()),
        );
        if ret.is_bottom() { Ty::Top } else { ret }
    }

    /// Abstract evaluation of a user method body over its SSA graph,
    /// iterated to a fixed point so loop phis see back-edge values. The
    /// method's return type is the join over every `Return` operand.
    fn eval_graph(&mut self, graph: &Graph, method: MethodId, recv: &Ty, args: &[Ty]) -> Ty {
        let order = Dominators::compute(graph).rpo().to_vec();
        let mut env: HashMap<Var, Ty> = HashMap::new();
        let mut node_types: BTreeMap<NodeId, Ty> = BTreeMap::new();
        let mut ret = Ty::Bottom;
        let cap = 2 * graph.len() + 16;
        let mut rounds = 0;
        loop {
            rounds += 1;
            if rounds > cap {
                ret = Ty::Top;
                break;
            }
            let mut changed = false;
            let mut round_ret = Ty::Bottom;
            for &block in &order {
                if !graph.block(block).reachable {
                    continue;
                }
                for inst in &graph.block(block).insts {
                    match inst {
                        Inst::Assign { dst, src, node } => {
                            let ty = self.operand_ty(&env, recv, args, src);
                            node_types.insert(*node, ty.clone());
                            self.write(&mut env, *dst, ty, &mut changed);
                        }
                        Inst::Construct { dst, class, node, .. } => {
                            let ty = Ty::instance(class.clone());
                            node_types.insert(*node, ty.clone());
                            self.write(&mut env, *dst, ty, &mut changed);
                        }
                        Inst::Call {
                            dst,
                            recv: recv_op,
                            name,
                            args: call_args,
                            node,
                        } => {
                            let recv_ty = self.operand_ty(&env, recv, args, recv_op);
                            let arg_tys: Vec<Ty> = call_args
                                .iter()
                                .map(|a| self.operand_ty(&env, recv, args, a))
                                .collect();
                            let ty = self.eval_call(recv_op, recv_ty, name, arg_tys);
                            node_types.insert(*node, ty.clone());
                            self.write(&mut env, *dst, ty, &mut changed);
                        }
                        Inst::Super {
                            dst,
                            args: call_args,
                            node,
                        } => {
                            let arg_tys: Vec<Ty> = call_args
                                .iter()
                                .map(|a| self.operand_ty(&env, recv, args, a))
                                .collect();
                            let ty = self.eval_super(method, recv, arg_tys);
                            node_types.insert(*node, ty.clone());
                            self.write(&mut env, *dst, ty, &mut changed);
                        }
                        Inst::Yield { dst, node, .. } => {
                            // The block's value is the caller's business.
                            node_types.insert(*node, Ty::Top);
                            self.write(&mut env, *dst, Ty::Top, &mut changed);
                        }
                        Inst::Test { .. } | Inst::Raise { .. } => {}
                        Inst::Return { value, .. } => {
                            round_ret = round_ret.join(self.operand_ty(&env, recv, args, value));
                        }
                        Inst::Phi { dst, args: phi_args, .. } => {
                            let ty = Ty::join_all(
                                phi_args.iter().map(|(_, var)| self.var_ty(&env, var)),
                            );
                            self.write(&mut env, *dst, ty, &mut changed);
                        }
                    }
                }
            }
            if round_ret != ret {
                ret = round_ret;
                changed = true;
            }
            if !changed {
                break;
            }
        }
        for (node, ty) in node_types {
            self.ast.set_expr_type(node, ty);
        }
        ret
    }

    fn operand_ty(&self, env: &HashMap<Var, Ty>, recv: &Ty, args: &[Ty], operand: &Operand) -> Ty {
        match operand {
            Operand::Var(var) => self.var_ty(env, var),
            Operand::Const(value) => value.ty(),
            Operand::SelfVal => recv.clone(),
            Operand::Arg(i) => args.get(*i as usize).cloned().unwrap_or(Ty::Top),
            Operand::Opaque(ty) => ty.clone(),
        }
    }

    fn var_ty(&self, env: &HashMap<Var, Ty>, var: &Var) -> Ty {
        let binding = self.bindings.get(var.binding);
        if matches!(binding.kind, BindingKind::Local) {
            if var.version == 0 {
                // Reading a local before any write yields nil.
                return Ty::nil();
            }
            return env.get(var).cloned().unwrap_or(Ty::Bottom);
        }
        if let Some(value) = &binding.const_value {
            return value.ty();
        }
        binding.ty.clone()
    }

    /// Locals update the evaluation environment; shared slots (instance
    /// variables, class variables, globals) accumulate on the binding,
    /// flow-insensitively.
    fn write(&mut self, env: &mut HashMap<Var, Ty>, dst: Var, ty: Ty, changed: &mut bool) {
        if matches!(self.bindings.get(dst.binding).kind, BindingKind::Local) {
            let merged = match env.get(&dst) {
                Some(old) => old.clone().join(ty),
                None => ty,
            };
            if env.get(&dst) != Some(&merged) {
                env.insert(dst, merged);
                *changed = true;
            }
            return;
        }
        let slot = &mut self.bindings.get_mut(dst.binding).ty;
        let merged = slot.clone().join(ty);
        if *slot != merged {
            *slot = merged;
            *changed = true;
        }
    }

    fn eval_call(&mut self, recv_op: &Operand, recv_ty: Ty, name: &str, args: Vec<Ty>) -> Ty {
        if recv_ty.is_bottom() || args.iter().any(|a| a.is_bottom()) {
            return Ty::Bottom;
        }
        // A send to a class object: `Point.new`, `Point.origin`.
        if let Operand::Var(var) = recv_op {
            let binding = self.bindings.get(var.binding);
            if matches!(binding.kind, BindingKind::Constant) {
                if let Some(entity) = binding.referent {
                    return self.class_send(entity, name, args);
                }
            }
        }
        if recv_ty.is_top() {
            return Ty::Top;
        }
        let Ty::Union(members) = recv_ty else {
            return Ty::Top;
        };
        let mut results = Vec::new();
        for member in &members {
            let Some(entity) = self.catalog.entity_by_path(member) else {
                results.push(Ty::Top);
                continue;
            };
            match self.catalog.lookup_method(entity, name, MethodKind::Instance) {
                Some(mid) => {
                    let ty = self.dispatch(mid, Ty::instance(member.clone()), args.clone(), name);
                    results.push(ty);
                }
                // An unknown message answers anything.
                None => results.push(Ty::Top),
            }
        }
        Ty::join_all(results)
    }

    fn dispatch(&mut self, method: MethodId, recv: Ty, args: Vec<Ty>, name: &str) -> Ty {
        // Identity-preserving built-ins: a copy has the original's type.
        if (name == "dup" || name == "clone") && self.catalog.method(method).is_builtin() {
            return recv;
        }
        self.query(method, recv, args)
    }

    fn class_send(&mut self, entity: EntityId, name: &str, args: Vec<Ty>) -> Ty {
        if name == "new" {
            let instance = Ty::instance(self.catalog.entity(entity).path.clone());
            // Evaluate a user-defined initialize for its signature and
            // its instance-variable effects.
            if let Some(init) =
                self.catalog.lookup_method(entity, "initialize", MethodKind::Instance)
            {
                if !self.catalog.method(init).is_builtin() {
                    let _ = self.query(init, instance.clone(), args);
                }
            }
            return instance;
        }
        match self.catalog.lookup_method(entity, name, MethodKind::Singleton) {
            // The class object's own protocol is Module's.
            Some(mid) => self.query(mid, Ty::instance("Module"), args),
            None => Ty::Top,
        }
    }

    /// `super` dispatches the current method's name starting above its
    /// owner in the superclass chain.
    fn eval_super(&mut self, method: MethodId, recv: &Ty, args: Vec<Ty>) -> Ty {
        let data = self.catalog.method(method);
        let name = data.name.clone();
        let kind = data.kind;
        let owner = data.owner;
        for ancestor in self.catalog.superclass_chain(owner).into_iter().skip(1) {
            let found = {
                let entity = self.catalog.entity(ancestor);
                let table = match kind {
                    MethodKind::Instance => &entity.methods,
                    MethodKind::Singleton => &entity.class_methods,
                };
                table.get(name.as_str()).copied()
            };
            if let Some(mid) = found {
                return self.dispatch(mid, recv.clone(), args, &name);
            }
        }
        Ty::Top
    }

    fn record_and_check(&mut self, method: MethodId, args: &[Ty], ret: &Ty) {
        // Built-in stubs keep their seeded signatures as the contract;
        // observed shapes are recorded on user methods only.
        if self.catalog.method(method).is_builtin() {
            return;
        }
        {
            let data = self.catalog.method_mut(method);
            let name = data.name.clone();
            data.add_signature(Signature {
                name,
                ret: ret.clone(),
                args: args.to_vec(),
            });
        }
        self.check_conversion_contract(method, ret);
        self.observe_predicate(method, ret);
    }

    /// Conversion methods promise a shape: an override whose inferred
    /// return type breaks the promise gets an error on its definition.
    fn check_conversion_contract(&mut self, method: MethodId, ret: &Ty) {
        let data = self.catalog.method(method);
        let Some(def_node) = data.def_node else {
            return;
        };
        let Some(required) = conversion_contract(&data.name) else {
            return;
        };
        if ret.is_top() || ret.is_subtype(&required, self.catalog) {
            return;
        }
        if self.ast.has_diagnostic(def_node, DiagnosticKind::ImproperOverrideType) {
            return;
        }
        let data = self.catalog.method(method);
        let owner = self.catalog.entity(data.owner).path.clone();
        let name = data.name.clone();
        let span = self.ast.span(def_node);
        self.ast.attach(
            def_node,
            Diagnostic::error(
                DiagnosticKind::ImproperOverrideType,
                format!("`{owner}#{name}` returns {ret}, but `{name}` must return {required}"),
            )
            .with_span_opt(span),
        );
    }

    /// Predicate reconciliation: a `?`-suffixed method is recorded as an
    /// incorrect predicate while every observed call shape has answered
    /// only-truthy, or every shape only-falsy. Evidence of both clears
    /// it for good.
    fn observe_predicate(&mut self, method: MethodId, ret: &Ty) {
        if self.state.probing || ret.is_bottom() {
            return;
        }
        if !self.catalog.method(method).name.ends_with('?') {
            return;
        }
        let (observed_truthy, observed_falsy) = {
            let data = self.catalog.method_mut(method);
            data.pred_observed = true;
            if ret.includes_truthy() {
                data.pred_truthy_seen = true;
            }
            if ret.includes_falsy() {
                data.pred_falsy_seen = true;
            }
            (data.pred_truthy_seen, data.pred_falsy_seen)
        };
        if observed_truthy && observed_falsy {
            self.catalog.clear_incorrect_predicate(method);
        } else {
            self.catalog.mark_incorrect_predicate(method);
        }
    }
}

/// The return contract a conversion-method name carries, if any.
fn conversion_contract(name: &str) -> Option<Ty> {
    match name {
        "to_s" | "to_str" => Some(Ty::instance("String")),
        "to_i" | "to_int" => Some(Ty::instance("Integer")),
        "to_f" => Some(Ty::instance("Float")),
        "to_a" | "to_ary" => Some(Ty::instance("Array")),
        "!" => Some(Ty::boolean()),
        _ => None,
    }
}
