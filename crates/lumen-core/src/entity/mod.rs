// Copyright 2026 James Casey
// SPDX-License-Identifier: Apache-2.0

//! The program entity model: modules, classes, methods and signatures.
//!
//! The [`Catalog`] is the session's single registry of every class and
//! module the program defines or the built-in seed provides. A class is a
//! module plus an optional superclass; nothing else is re-implemented for
//! classes. Each entity is registered exactly once per path; re-opening a
//! class or module yields the entity already registered.
//!
//! Methods are insert-or-replace: defining `to_s` twice on one class
//! leaves the last definition in the table. Signatures accumulate on a
//! method monotonically as the inference engine observes call shapes.

pub mod builtins;

use std::collections::{BTreeMap, BTreeSet};
use std::fmt;

use ecow::EcoString;

use crate::scope::{BindingId, ScopeId, Scopes, Bindings};
use crate::tree::NodeId;
use crate::types::Ty;

/// Index of an entity (class or module) in the catalog.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct EntityId(u32);

impl EntityId {
    #[must_use]
    pub fn index(self) -> usize {
        self.0 as usize
    }
}

/// Index of a method in the catalog.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct MethodId(u32);

impl MethodId {
    #[must_use]
    pub fn index(self) -> usize {
        self.0 as usize
    }
}

/// Module or class. The only difference is the superclass slot.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum EntityKind {
    Module,
    Class { superclass: Option<EntityId> },
}

/// Instance method or class-level (singleton) method.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub enum MethodKind {
    Instance,
    Singleton,
}

/// A class or module known to the catalog.
#[derive(Debug)]
pub struct Entity {
    /// Fully qualified constant path, e.g. `Outer::Widget`.
    pub path: EcoString,
    /// Last path segment.
    pub name: EcoString,
    pub kind: EntityKind,
    pub methods: BTreeMap<EcoString, MethodId>,
    pub class_methods: BTreeMap<EcoString, MethodId>,
    pub instance_variables: BTreeMap<EcoString, BindingId>,
    pub class_variables: BTreeMap<EcoString, BindingId>,
    /// The entity's body scope.
    pub scope: ScopeId,
    /// First definition site, if user-defined.
    pub def_node: Option<NodeId>,
}

impl Entity {
    /// The superclass, for classes that have one.
    #[must_use]
    pub fn superclass(&self) -> Option<EntityId> {
        match self.kind {
            EntityKind::Class { superclass } => superclass,
            EntityKind::Module => None,
        }
    }
}

/// One observed or seeded call shape of a method: argument types in,
/// return type out. Immutable once recorded.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Signature {
    pub name: EcoString,
    pub ret: Ty,
    pub args: Vec<Ty>,
}

impl fmt::Display for Signature {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}(", self.name)?;
        for (i, arg) in self.args.iter().enumerate() {
            if i > 0 {
                write!(f, ", ")?;
            }
            write!(f, "{arg}")?;
        }
        write!(f, ") -> {}", self.ret)
    }
}

/// A method definition (user code) or stub (built-in seed).
#[derive(Debug)]
pub struct Method {
    pub name: EcoString,
    pub owner: EntityId,
    pub kind: MethodKind,
    pub params: Vec<EcoString>,
    /// Body statement list; `None` for built-in stubs.
    pub body: Option<NodeId>,
    /// The definition node diagnostics attach to; `None` for built-ins.
    pub def_node: Option<NodeId>,
    /// The method's own scope, where its parameters live.
    pub scope: Option<ScopeId>,
    /// Purity is tracked but never assumed.
    pub pure: bool,
    /// Observed and seeded call shapes, monotonically growing.
    pub signatures: Vec<Signature>,
    /// Graph construction failed; analyses skip this method.
    pub unanalyzable: bool,
    /// Truthiness evidence for `?`-suffixed names, across observed shapes.
    pub pred_truthy_seen: bool,
    pub pred_falsy_seen: bool,
    pub pred_observed: bool,
}

impl Method {
    /// A user-defined method.
    #[must_use]
    pub fn user(
        name: impl Into<EcoString>,
        owner: EntityId,
        kind: MethodKind,
        params: Vec<EcoString>,
        body: NodeId,
        def_node: NodeId,
        scope: ScopeId,
    ) -> Self {
        Self {
            name: name.into(),
            owner,
            kind,
            params,
            body: Some(body),
            def_node: Some(def_node),
            scope: Some(scope),
            pure: false,
            signatures: Vec::new(),
            unanalyzable: false,
            pred_truthy_seen: false,
            pred_falsy_seen: false,
            pred_observed: false,
        }
    }

    fn stub(name: impl Into<EcoString>, owner: EntityId) -> Self {
        Self {
            name: name.into(),
            owner,
            kind: MethodKind::Instance,
            params: Vec::new(),
            body: None,
            def_node: None,
            scope: None,
            pure: false,
            signatures: Vec::new(),
            unanalyzable: false,
            pred_truthy_seen: false,
            pred_falsy_seen: false,
            pred_observed: false,
        }
    }

    /// True for built-in stubs answered from seeded signatures.
    #[must_use]
    pub fn is_builtin(&self) -> bool {
        self.body.is_none()
    }

    /// Records a call shape. A later shape with the same arguments
    /// replaces the earlier return type; distinct argument shapes
    /// accumulate.
    pub fn add_signature(&mut self, signature: Signature) {
        if let Some(existing) = self
            .signatures
            .iter_mut()
            .find(|s| s.name == signature.name && s.args == signature.args)
        {
            *existing = signature;
        } else {
            self.signatures.push(signature);
        }
    }
}

/// A read-only view of an entity's structural interface: every signature
/// its methods expose. Created eagerly when the entity is registered.
pub struct Protocol<'a> {
    catalog: &'a Catalog,
    entity: EntityId,
}

impl Protocol<'_> {
    /// All signatures of the entity's instance methods, in method-name
    /// order.
    pub fn signatures(&self) -> impl Iterator<Item = &Signature> {
        self.catalog
            .entity(self.entity)
            .methods
            .values()
            .flat_map(|&mid| self.catalog.method(mid).signatures.iter())
    }
}

/// The global class catalog. One per analysis session.
#[derive(Debug, Default)]
pub struct Catalog {
    entities: Vec<Entity>,
    methods: Vec<Method>,
    by_path: BTreeMap<EcoString, EntityId>,
    /// Entities in registration order; doubles as the protocol registry.
    registration_order: Vec<EntityId>,
    incorrect_predicates: BTreeSet<MethodId>,
}

impl Catalog {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    fn register(
        &mut self,
        scopes: &mut Scopes,
        bindings: &mut Bindings,
        path: &str,
        kind: EntityKind,
        naming_scope: ScopeId,
        def_node: Option<NodeId>,
    ) -> EntityId {
        let id = EntityId(u32::try_from(self.entities.len()).unwrap_or(u32::MAX));
        let name: EcoString = path.rsplit("::").next().unwrap_or(path).into();
        // The entity's body scope is closed; `self` there is the class
        // object, and instance variables vivified in the body land on the
        // entity itself.
        let scope = scopes.create(
            bindings,
            crate::scope::ScopeKind::Closed,
            naming_scope,
            Ty::instance("Module"),
            Some(id),
        );
        scopes.get_mut(scope).lexical_target = Some(id);
        self.entities.push(Entity {
            path: path.into(),
            name: name.clone(),
            kind,
            methods: BTreeMap::new(),
            class_methods: BTreeMap::new(),
            instance_variables: BTreeMap::new(),
            class_variables: BTreeMap::new(),
            scope,
            def_node,
        });
        self.by_path.insert(path.into(), id);
        self.registration_order.push(id);
        scopes.define_constant(bindings, naming_scope, name, Some(id), None);
        id
    }

    /// Registers a module, or returns the one already registered at
    /// `path`.
    pub fn define_module(
        &mut self,
        scopes: &mut Scopes,
        bindings: &mut Bindings,
        path: &str,
        naming_scope: ScopeId,
        def_node: Option<NodeId>,
    ) -> EntityId {
        if let Some(&existing) = self.by_path.get(path) {
            return existing;
        }
        self.register(scopes, bindings, path, EntityKind::Module, naming_scope, def_node)
    }

    /// Registers a class, or returns the one already registered at `path`.
    /// A re-open may supply a superclass the first definition omitted.
    pub fn define_class(
        &mut self,
        scopes: &mut Scopes,
        bindings: &mut Bindings,
        path: &str,
        superclass: Option<EntityId>,
        naming_scope: ScopeId,
        def_node: Option<NodeId>,
    ) -> EntityId {
        if let Some(&existing) = self.by_path.get(path) {
            if let EntityKind::Class { superclass: slot @ None } =
                &mut self.entities[existing.index()].kind
            {
                *slot = superclass;
            }
            return existing;
        }
        self.register(
            scopes,
            bindings,
            path,
            EntityKind::Class { superclass },
            naming_scope,
            def_node,
        )
    }

    #[must_use]
    pub fn entity(&self, id: EntityId) -> &Entity {
        &self.entities[id.index()]
    }

    pub fn entity_mut(&mut self, id: EntityId) -> &mut Entity {
        &mut self.entities[id.index()]
    }

    #[must_use]
    pub fn entity_by_path(&self, path: &str) -> Option<EntityId> {
        self.by_path.get(path).copied()
    }

    /// Entities in registration order.
    pub fn entities(&self) -> impl Iterator<Item = EntityId> + '_ {
        self.registration_order.iter().copied()
    }

    /// The entity's structural protocol view.
    #[must_use]
    pub fn protocol(&self, entity: EntityId) -> Protocol<'_> {
        Protocol {
            catalog: self,
            entity,
        }
    }

    /// The superclass chain starting at (and including) `id`. Safe on
    /// cyclic hierarchies: each entity appears at most once.
    #[must_use]
    pub fn superclass_chain(&self, id: EntityId) -> Vec<EntityId> {
        let mut chain = Vec::new();
        let mut seen = BTreeSet::new();
        let mut current = Some(id);
        while let Some(entity) = current {
            if !seen.insert(entity) {
                break;
            }
            chain.push(entity);
            current = self.entity(entity).superclass();
        }
        chain
    }

    /// Does `sub`'s superclass chain pass through `ancestor`?
    #[must_use]
    pub fn is_descendant_path(&self, sub: &str, ancestor: &str) -> bool {
        let (Some(sub), Some(ancestor)) = (self.entity_by_path(sub), self.entity_by_path(ancestor))
        else {
            return false;
        };
        self.superclass_chain(sub).contains(&ancestor)
    }

    /// Adds a method, replacing any previous definition of the same name
    /// and kind on the owner. The last definition wins.
    pub fn add_method(&mut self, method: Method) -> MethodId {
        let id = MethodId(u32::try_from(self.methods.len()).unwrap_or(u32::MAX));
        let owner = method.owner;
        let name = method.name.clone();
        let table = match method.kind {
            MethodKind::Instance => &mut self.entities[owner.index()].methods,
            MethodKind::Singleton => &mut self.entities[owner.index()].class_methods,
        };
        table.insert(name, id);
        self.methods.push(method);
        id
    }

    #[must_use]
    pub fn method(&self, id: MethodId) -> &Method {
        &self.methods[id.index()]
    }

    pub fn method_mut(&mut self, id: MethodId) -> &mut Method {
        &mut self.methods[id.index()]
    }

    /// Resolves a message against an entity, walking the superclass
    /// chain. Singleton sends fall back to `Module`'s instance methods,
    /// the way a class object answers `name` or `ancestors`.
    #[must_use]
    pub fn lookup_method(&self, entity: EntityId, name: &str, kind: MethodKind) -> Option<MethodId> {
        for ancestor in self.superclass_chain(entity) {
            let data = self.entity(ancestor);
            let table = match kind {
                MethodKind::Instance => &data.methods,
                MethodKind::Singleton => &data.class_methods,
            };
            if let Some(&mid) = table.get(name) {
                return Some(mid);
            }
        }
        if kind == MethodKind::Singleton {
            if let Some(module) = self.entity_by_path("Module") {
                return self.lookup_method(module, name, MethodKind::Instance);
            }
        }
        None
    }

    /// Every method currently reachable through an entity table, in
    /// deterministic (entity, kind, name) order. Replaced definitions are
    /// not included.
    #[must_use]
    pub fn defined_methods(&self) -> Vec<(EntityId, MethodKind, MethodId)> {
        let mut out = Vec::new();
        for &entity in &self.registration_order {
            for &mid in self.entity(entity).methods.values() {
                out.push((entity, MethodKind::Instance, mid));
            }
            for &mid in self.entity(entity).class_methods.values() {
                out.push((entity, MethodKind::Singleton, mid));
            }
        }
        out
    }

    /// Records a method in the incorrect-predicate registry.
    pub fn mark_incorrect_predicate(&mut self, id: MethodId) {
        self.incorrect_predicates.insert(id);
    }

    /// Clears a method from the incorrect-predicate registry.
    pub fn clear_incorrect_predicate(&mut self, id: MethodId) {
        self.incorrect_predicates.remove(&id);
    }

    /// Methods every observed call shape of which returned only-truthy or
    /// only-falsy despite a `?`-suffixed name.
    pub fn incorrect_predicates(&self) -> impl Iterator<Item = MethodId> + '_ {
        self.incorrect_predicates.iter().copied()
    }

    /// Registers a built-in stub method (idempotent) and records a seeded
    /// signature on it.
    pub fn seed_signature(
        &mut self,
        owner: EntityId,
        kind: MethodKind,
        name: &str,
        args: Vec<Ty>,
        ret: Ty,
    ) {
        let table = match kind {
            MethodKind::Instance => &self.entities[owner.index()].methods,
            MethodKind::Singleton => &self.entities[owner.index()].class_methods,
        };
        let mid = match table.get(name) {
            Some(&mid) => mid,
            None => {
                let mut method = Method::stub(name, owner);
                method.kind = kind;
                self.add_method(method)
            }
        };
        self.methods[mid.index()].add_signature(Signature {
            name: name.into(),
            ret,
            args,
        });
    }
}
