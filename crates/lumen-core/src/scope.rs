// Copyright 2026 James Casey
// SPDX-License-Identifier: Apache-2.0

//! Lexical scopes and name bindings.
//!
//! Scopes form a tree rooted at the session's single global scope. A scope
//! is either `Open` (a block body: local lookup falls through to the
//! parent) or `Closed` (a method or class body: local lookup stops at the
//! boundary). Every scope owns exactly one `self` binding, created with the
//! scope; re-pointing `self` means creating a scope with a different self,
//! never mutating the binding.
//!
//! Name resolution dispatches on the sigil of the queried name: `$` means
//! global, `@@` class variable, `@` instance variable, a `::` path walks
//! constant tables, a capitalized name is a constant, anything else is a
//! local. Globals and instance variables are auto-vivified on first
//! lookup, idempotently.

use std::collections::BTreeMap;

use ecow::EcoString;
use thiserror::Error;

use crate::entity::{Catalog, EntityId, MethodId};
use crate::tree::ConstValue;
use crate::types::Ty;

/// Index of a scope in the [`Scopes`] arena.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct ScopeId(u32);

impl ScopeId {
    #[must_use]
    pub fn index(self) -> usize {
        self.0 as usize
    }
}

/// Index of a binding in the [`Bindings`] arena.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct BindingId(u32);

impl BindingId {
    #[must_use]
    pub fn index(self) -> usize {
        self.0 as usize
    }
}

/// Whether local lookup may continue past this scope.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ScopeKind {
    /// Block scope: locals fall back to the parent chain.
    Open,
    /// Method or class-body scope: local lookup fails at the boundary.
    Closed,
}

/// What sort of slot a binding names.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum BindingKind {
    Local,
    /// An instance variable, owned by the class of the `self` it was
    /// resolved against.
    Instance { owner: EntityId },
    ClassVar { owner: EntityId },
    Global,
    Constant,
}

/// A named slot. Carries the analyzer's current knowledge of its type and,
/// for constants, its provably-constant value or the entity it names.
#[derive(Debug, Clone)]
pub struct Binding {
    pub name: EcoString,
    pub kind: BindingKind,
    pub ty: Ty,
    /// For constants whose value folds at analysis time.
    pub const_value: Option<ConstValue>,
    /// For constants that name a class or module.
    pub referent: Option<EntityId>,
    /// True for analyzer-made temporaries, which are exempt from
    /// unused-variable reporting.
    pub synthetic: bool,
}

impl Binding {
    fn local(name: impl Into<EcoString>) -> Self {
        Self {
            name: name.into(),
            kind: BindingKind::Local,
            ty: Ty::Top,
            const_value: None,
            referent: None,
            synthetic: false,
        }
    }
}

/// Arena of all bindings in a session.
#[derive(Debug, Default)]
pub struct Bindings {
    arena: Vec<Binding>,
    temp_counter: u32,
}

impl Bindings {
    pub fn alloc(&mut self, binding: Binding) -> BindingId {
        let id = BindingId(u32::try_from(self.arena.len()).unwrap_or(u32::MAX));
        self.arena.push(binding);
        id
    }

    /// A fresh synthetic temporary, used by graph construction.
    pub fn fresh_temp(&mut self) -> BindingId {
        let name = EcoString::from(format!("%t{}", self.temp_counter));
        self.temp_counter += 1;
        self.alloc(Binding {
            name,
            kind: BindingKind::Local,
            ty: Ty::Top,
            const_value: None,
            referent: None,
            synthetic: true,
        })
    }

    #[must_use]
    pub fn get(&self, id: BindingId) -> &Binding {
        &self.arena[id.index()]
    }

    pub fn get_mut(&mut self, id: BindingId) -> &mut Binding {
        &mut self.arena[id.index()]
    }

    #[must_use]
    pub fn len(&self) -> usize {
        self.arena.len()
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.arena.is_empty()
    }

    /// All bindings with their ids, in allocation order.
    pub fn iter(&self) -> impl Iterator<Item = (BindingId, &Binding)> {
        self.arena
            .iter()
            .enumerate()
            .map(|(i, b)| (BindingId(u32::try_from(i).unwrap_or(u32::MAX)), b))
    }
}

/// One lexical scope.
#[derive(Debug)]
pub struct Scope {
    pub kind: ScopeKind,
    pub parent: Option<ScopeId>,
    locals: BTreeMap<EcoString, BindingId>,
    constants: BTreeMap<EcoString, BindingId>,
    /// The class or module whose body this scope is, if any.
    pub lexical_target: Option<EntityId>,
    /// The method whose body this scope is, if any.
    pub method: Option<MethodId>,
    /// The scope's `self` binding. Exactly one, created with the scope.
    pub self_binding: BindingId,
    /// The entity instance variables resolve against in this scope.
    pub self_entity: Option<EntityId>,
}

/// Arena of scopes. Index 0 is the session's global scope.
#[derive(Debug)]
pub struct Scopes {
    arena: Vec<Scope>,
}

impl Scopes {
    /// Creates the scope arena with its global scope. The global scope is
    /// closed and its `self` is the main object.
    #[must_use]
    pub fn new(bindings: &mut Bindings) -> Self {
        let self_binding = bindings.alloc(Binding {
            ty: Ty::instance("Object"),
            ..Binding::local("self")
        });
        let mut locals = BTreeMap::new();
        locals.insert(EcoString::from("self"), self_binding);
        Self {
            arena: vec![Scope {
                kind: ScopeKind::Closed,
                parent: None,
                locals,
                constants: BTreeMap::new(),
                lexical_target: None,
                method: None,
                self_binding,
                self_entity: None,
            }],
        }
    }

    /// The global scope.
    #[must_use]
    pub fn global(&self) -> ScopeId {
        ScopeId(0)
    }

    /// Creates a child scope with its own `self` binding.
    pub fn create(
        &mut self,
        bindings: &mut Bindings,
        kind: ScopeKind,
        parent: ScopeId,
        self_ty: Ty,
        self_entity: Option<EntityId>,
    ) -> ScopeId {
        let self_binding = bindings.alloc(Binding {
            ty: self_ty,
            ..Binding::local("self")
        });
        let mut locals = BTreeMap::new();
        locals.insert(EcoString::from("self"), self_binding);
        let id = ScopeId(u32::try_from(self.arena.len()).unwrap_or(u32::MAX));
        self.arena.push(Scope {
            kind,
            parent: Some(parent),
            locals,
            constants: BTreeMap::new(),
            lexical_target: None,
            method: None,
            self_binding,
            self_entity,
        });
        id
    }

    #[must_use]
    pub fn get(&self, id: ScopeId) -> &Scope {
        &self.arena[id.index()]
    }

    pub fn get_mut(&mut self, id: ScopeId) -> &mut Scope {
        &mut self.arena[id.index()]
    }

    #[must_use]
    pub fn len(&self) -> usize {
        self.arena.len()
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.arena.is_empty()
    }

    /// Defines a local in exactly this scope. Defining `self` returns the
    /// scope's existing self binding.
    pub fn define_local(
        &mut self,
        bindings: &mut Bindings,
        scope: ScopeId,
        name: impl Into<EcoString>,
    ) -> BindingId {
        let name = name.into();
        if name == "self" {
            return self.arena[scope.index()].self_binding;
        }
        if let Some(&existing) = self.arena[scope.index()].locals.get(&name) {
            return existing;
        }
        let id = bindings.alloc(Binding::local(name.clone()));
        self.arena[scope.index()].locals.insert(name, id);
        id
    }

    /// Defines (or re-points) a constant in this scope.
    pub fn define_constant(
        &mut self,
        bindings: &mut Bindings,
        scope: ScopeId,
        name: impl Into<EcoString>,
        referent: Option<EntityId>,
        value: Option<ConstValue>,
    ) -> BindingId {
        let name = name.into();
        if let Some(&existing) = self.arena[scope.index()].constants.get(&name) {
            let binding = bindings.get_mut(existing);
            if binding.const_value.is_none() {
                binding.const_value = value;
            }
            if binding.referent.is_none() {
                binding.referent = referent;
            }
            return existing;
        }
        let id = bindings.alloc(Binding {
            name: name.clone(),
            kind: BindingKind::Constant,
            ty: Ty::Top,
            const_value: value,
            referent,
            synthetic: false,
        });
        self.arena[scope.index()].constants.insert(name, id);
        id
    }

    /// The binding a plain local name resolves to from `scope`, or `None`.
    /// Open scopes chain to their parents; a closed scope is a boundary.
    #[must_use]
    pub fn find_local(&self, scope: ScopeId, name: &str) -> Option<BindingId> {
        let mut current = scope;
        loop {
            let data = &self.arena[current.index()];
            if let Some(&binding) = data.locals.get(name) {
                return Some(binding);
            }
            if data.kind == ScopeKind::Closed {
                return None;
            }
            current = data.parent?;
        }
    }

    pub(crate) fn find_constant_lexical(
        &self,
        scope: ScopeId,
        name: &str,
    ) -> (Option<BindingId>, Option<EntityId>) {
        let mut current = Some(scope);
        let mut nearest_target = None;
        while let Some(id) = current {
            let data = &self.arena[id.index()];
            if let Some(&binding) = data.constants.get(name) {
                return (Some(binding), nearest_target);
            }
            if nearest_target.is_none() {
                nearest_target = data.lexical_target;
            }
            current = data.parent;
        }
        (None, nearest_target)
    }
}

/// A failed name resolution.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum ScopeError {
    #[error("no binding for `{name}` in scope")]
    LookupFailed { name: EcoString },
    #[error("`{path}` does not name a class or module")]
    NotAnEntity { path: EcoString },
}

/// Mutable view for name resolution. Lookup of globals and instance
/// variables creates the binding on first use, so resolution needs write
/// access to scopes, bindings and the catalog together.
pub struct NameResolver<'a> {
    pub scopes: &'a mut Scopes,
    pub bindings: &'a mut Bindings,
    pub catalog: &'a mut Catalog,
}

impl NameResolver<'_> {
    /// Resolves a name from `scope`, dispatching on its sigil.
    pub fn lookup(&mut self, scope: ScopeId, name: &str) -> Result<BindingId, ScopeError> {
        if name.starts_with('$') {
            return Ok(self.lookup_global(name));
        }
        if name.starts_with("@@") {
            return self.lookup_cvar(scope, name);
        }
        if name.starts_with('@') {
            return self.lookup_ivar(scope, name);
        }
        if name.starts_with("::") || name.contains("::") {
            return self.lookup_const_path(scope, name);
        }
        if name.chars().next().is_some_and(char::is_uppercase) {
            return self.lookup_const(scope, name);
        }
        self.scopes
            .find_local(scope, name)
            .ok_or_else(|| ScopeError::LookupFailed { name: name.into() })
    }

    /// Probes whether `name` resolves from `scope`, without vivifying
    /// anything.
    #[must_use]
    pub fn sees(&self, scope: ScopeId, name: &str) -> bool {
        if name.starts_with('$') {
            return self.scopes.get(self.scopes.global()).locals.contains_key(name);
        }
        if name.starts_with("@@") {
            return self
                .cvar_owner(scope)
                .is_some_and(|owner| self.catalog.entity(owner).class_variables.contains_key(name));
        }
        if name.starts_with('@') {
            return self.ivar_owner(scope).is_some_and(|owner| {
                self.catalog.entity(owner).instance_variables.contains_key(name)
            });
        }
        if name.contains("::") {
            return false;
        }
        if name.chars().next().is_some_and(char::is_uppercase) {
            let (found, nearest) = self.scopes.find_constant_lexical(scope, name);
            if found.is_some() {
                return true;
            }
            return self.find_constant_in_ancestors(nearest, name).is_some();
        }
        self.scopes.find_local(scope, name).is_some()
    }

    /// Resolves a plain local, creating it in `scope` when no enclosing
    /// scope already sees it. Non-local names fall back to [`Self::lookup`].
    pub fn lookup_or_create_local(
        &mut self,
        scope: ScopeId,
        name: &str,
    ) -> Result<BindingId, ScopeError> {
        let plain = !name.starts_with(['$', '@'])
            && !name.contains("::")
            && !name.chars().next().is_some_and(char::is_uppercase);
        if plain {
            if let Some(binding) = self.scopes.find_local(scope, name) {
                return Ok(binding);
            }
            return Ok(self.scopes.define_local(self.bindings, scope, name));
        }
        self.lookup(scope, name)
    }

    /// Globals live in the one global scope and are created on first
    /// lookup.
    pub fn lookup_global(&mut self, name: &str) -> BindingId {
        let global = self.scopes.global();
        if let Some(&binding) = self.scopes.get(global).locals.get(name) {
            return binding;
        }
        let id = self.bindings.alloc(Binding {
            name: name.into(),
            kind: BindingKind::Global,
            // An unset global reads nil; inference joins written types in.
            ty: Ty::nil(),
            const_value: None,
            referent: None,
            synthetic: false,
        });
        self.scopes
            .get_mut(global)
            .locals
            .insert(EcoString::from(name), id);
        id
    }

    fn ivar_owner(&self, scope: ScopeId) -> Option<EntityId> {
        self.scopes.get(scope).self_entity
    }

    fn cvar_owner(&self, scope: ScopeId) -> Option<EntityId> {
        let data = self.scopes.get(scope);
        data.lexical_target.or(data.self_entity)
    }

    /// Instance variables resolve against the runtime class of the current
    /// `self` and are vivified there on first lookup.
    pub fn lookup_ivar(&mut self, scope: ScopeId, name: &str) -> Result<BindingId, ScopeError> {
        let owner = self
            .ivar_owner(scope)
            .ok_or_else(|| ScopeError::LookupFailed { name: name.into() })?;
        if let Some(&binding) = self.catalog.entity(owner).instance_variables.get(name) {
            return Ok(binding);
        }
        let id = self.bindings.alloc(Binding {
            name: name.into(),
            kind: BindingKind::Instance { owner },
            // Unset instance variables read nil.
            ty: Ty::nil(),
            const_value: None,
            referent: None,
            synthetic: false,
        });
        self.catalog
            .entity_mut(owner)
            .instance_variables
            .insert(EcoString::from(name), id);
        Ok(id)
    }

    /// Class variables belong to the lexically enclosing class or module.
    pub fn lookup_cvar(&mut self, scope: ScopeId, name: &str) -> Result<BindingId, ScopeError> {
        let owner = self
            .cvar_owner(scope)
            .ok_or_else(|| ScopeError::LookupFailed { name: name.into() })?;
        if let Some(&binding) = self.catalog.entity(owner).class_variables.get(name) {
            return Ok(binding);
        }
        let id = self.bindings.alloc(Binding {
            name: name.into(),
            kind: BindingKind::ClassVar { owner },
            // Unset class variables read nil.
            ty: Ty::nil(),
            const_value: None,
            referent: None,
            synthetic: false,
        });
        self.catalog
            .entity_mut(owner)
            .class_variables
            .insert(EcoString::from(name), id);
        Ok(id)
    }

    fn find_constant_in_ancestors(&self, start: Option<EntityId>, name: &str) -> Option<BindingId> {
        let start = start?;
        for ancestor in self.catalog.superclass_chain(start) {
            let scope = self.catalog.entity(ancestor).scope;
            if let Some(&binding) = self.scopes.get(scope).constants.get(name) {
                return Some(binding);
            }
        }
        None
    }

    /// Resolves a capitalized constant: the lexical chain first, then the
    /// ancestors of the nearest lexical class or module.
    pub fn lookup_const(&mut self, scope: ScopeId, name: &str) -> Result<BindingId, ScopeError> {
        let (found, nearest) = self.scopes.find_constant_lexical(scope, name);
        if let Some(binding) = found {
            return Ok(binding);
        }
        self.find_constant_in_ancestors(nearest, name)
            .ok_or_else(|| ScopeError::LookupFailed { name: name.into() })
    }

    /// Resolves a `::`-separated constant path. A leading `::` anchors the
    /// first segment at the global scope.
    pub fn lookup_const_path(&mut self, scope: ScopeId, path: &str) -> Result<BindingId, ScopeError> {
        let (absolute, rest) = match path.strip_prefix("::") {
            Some(rest) => (true, rest),
            None => (false, path),
        };
        let mut segments = rest.split("::");
        let first = segments
            .next()
            .filter(|s| !s.is_empty())
            .ok_or_else(|| ScopeError::LookupFailed { name: path.into() })?;

        let mut current = if absolute {
            let global = self.scopes.global();
            self.scopes
                .get(global)
                .constants
                .get(first)
                .copied()
                .ok_or_else(|| ScopeError::LookupFailed { name: first.into() })?
        } else {
            self.lookup_const(scope, first)?
        };

        for segment in segments {
            let entity = self
                .bindings
                .get(current)
                .referent
                .ok_or_else(|| ScopeError::NotAnEntity {
                    path: self.bindings.get(current).name.clone(),
                })?;
            let entity_scope = self.catalog.entity(entity).scope;
            current = self
                .scopes
                .get(entity_scope)
                .constants
                .get(segment)
                .copied()
                .ok_or_else(|| ScopeError::LookupFailed { name: segment.into() })?;
        }
        Ok(current)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::entity::builtins;

    struct Fixture {
        scopes: Scopes,
        bindings: Bindings,
        catalog: Catalog,
    }

    fn fixture() -> Fixture {
        let mut bindings = Bindings::default();
        let mut scopes = Scopes::new(&mut bindings);
        let catalog = builtins::seed(&mut scopes, &mut bindings);
        Fixture {
            scopes,
            bindings,
            catalog,
        }
    }

    impl Fixture {
        fn resolver(&mut self) -> NameResolver<'_> {
            NameResolver {
                scopes: &mut self.scopes,
                bindings: &mut self.bindings,
                catalog: &mut self.catalog,
            }
        }
    }

    #[test]
    fn every_scope_has_exactly_one_self() {
        let mut fx = fixture();
        let global = fx.scopes.global();
        let self_binding = fx.scopes.get(global).self_binding;
        let again = fx.scopes.define_local(&mut fx.bindings, global, "self");
        assert_eq!(again, self_binding, "defining self re-uses the binding");
    }

    #[test]
    fn global_lookup_vivifies_idempotently() {
        let mut fx = fixture();
        let global = fx.scopes.global();
        let mut resolver = fx.resolver();
        let first = resolver.lookup(global, "$stderr").unwrap();
        let second = resolver.lookup(global, "$stderr").unwrap();
        assert_eq!(first, second, "same binding on repeat lookup");
        assert_eq!(resolver.bindings.get(first).kind, BindingKind::Global);
    }

    #[test]
    fn open_scope_chains_to_parent_for_locals() {
        let mut fx = fixture();
        let global = fx.scopes.global();
        let method = fx.scopes.create(
            &mut fx.bindings,
            ScopeKind::Closed,
            global,
            Ty::instance("Object"),
            None,
        );
        let x = fx.scopes.define_local(&mut fx.bindings, method, "x");
        let block = fx.scopes.create(
            &mut fx.bindings,
            ScopeKind::Open,
            method,
            Ty::instance("Object"),
            None,
        );
        assert_eq!(fx.scopes.find_local(block, "x"), Some(x));
    }

    #[test]
    fn closed_scope_is_a_boundary_for_locals() {
        let mut fx = fixture();
        let global = fx.scopes.global();
        fx.scopes.define_local(&mut fx.bindings, global, "hidden");
        let method = fx.scopes.create(
            &mut fx.bindings,
            ScopeKind::Closed,
            global,
            Ty::instance("Object"),
            None,
        );
        assert_eq!(fx.scopes.find_local(method, "hidden"), None);
        let mut resolver = fx.resolver();
        assert!(matches!(
            resolver.lookup(method, "hidden"),
            Err(ScopeError::LookupFailed { .. })
        ));
    }

    #[test]
    fn ivar_lookup_vivifies_on_self_entity() {
        let mut fx = fixture();
        let object = fx.catalog.entity_by_path("Object").unwrap();
        let global = fx.scopes.global();
        let scope = fx.scopes.create(
            &mut fx.bindings,
            ScopeKind::Closed,
            global,
            Ty::instance("Object"),
            Some(object),
        );
        let mut resolver = fx.resolver();
        let first = resolver.lookup(scope, "@name").unwrap();
        let second = resolver.lookup(scope, "@name").unwrap();
        assert_eq!(first, second);
        assert!(matches!(
            resolver.bindings.get(first).kind,
            BindingKind::Instance { .. }
        ));
    }

    #[test]
    fn class_variable_dispatches_before_instance_variable() {
        let mut fx = fixture();
        let object = fx.catalog.entity_by_path("Object").unwrap();
        let global = fx.scopes.global();
        let scope = fx.scopes.create(
            &mut fx.bindings,
            ScopeKind::Closed,
            global,
            Ty::instance("Object"),
            Some(object),
        );
        let mut resolver = fx.resolver();
        let cvar = resolver.lookup(scope, "@@count").unwrap();
        assert!(matches!(
            resolver.bindings.get(cvar).kind,
            BindingKind::ClassVar { .. }
        ));
    }

    #[test]
    fn constant_lookup_walks_lexical_chain() {
        let mut fx = fixture();
        let global = fx.scopes.global();
        let inner = fx.scopes.create(
            &mut fx.bindings,
            ScopeKind::Closed,
            global,
            Ty::instance("Object"),
            None,
        );
        let mut resolver = fx.resolver();
        let binding = resolver.lookup(inner, "String").unwrap();
        assert_eq!(resolver.bindings.get(binding).kind, BindingKind::Constant);
        assert!(resolver.bindings.get(binding).referent.is_some());
    }

    #[test]
    fn absolute_const_path_resolves_from_global_scope() {
        let mut fx = fixture();
        let global = fx.scopes.global();
        let mut resolver = fx.resolver();
        let relative = resolver.lookup(global, "Integer").unwrap();
        let absolute = resolver.lookup(global, "::Integer").unwrap();
        assert_eq!(relative, absolute);
    }

    #[test]
    fn sees_does_not_vivify() {
        let mut fx = fixture();
        let global = fx.scopes.global();
        {
            let resolver = fx.resolver();
            assert!(!resolver.sees(global, "$fresh"));
        }
        let before = fx.bindings.len();
        let resolver = fx.resolver();
        assert!(!resolver.sees(global, "$fresh"));
        assert_eq!(resolver.bindings.len(), before, "probe allocates nothing");
    }

    #[test]
    fn lookup_or_create_defines_in_current_scope() {
        let mut fx = fixture();
        let global = fx.scopes.global();
        let method = fx.scopes.create(
            &mut fx.bindings,
            ScopeKind::Closed,
            global,
            Ty::instance("Object"),
            None,
        );
        let mut resolver = fx.resolver();
        let created = resolver.lookup_or_create_local(method, "fresh").unwrap();
        let found = resolver.scopes.find_local(method, "fresh");
        assert_eq!(found, Some(created));
    }

    #[test]
    fn missing_constant_is_an_error_not_a_panic() {
        let mut fx = fixture();
        let global = fx.scopes.global();
        let mut resolver = fx.resolver();
        let err = resolver.lookup(global, "NoSuchThing").unwrap_err();
        assert_eq!(
            err,
            ScopeError::LookupFailed {
                name: "NoSuchThing".into()
            }
        );
    }

    #[test]
    fn synthetic_temps_are_marked() {
        let mut bindings = Bindings::default();
        let t0 = bindings.fresh_temp();
        let t1 = bindings.fresh_temp();
        assert_ne!(bindings.get(t0).name, bindings.get(t1).name);
        assert!(bindings.get(t0).synthetic);
    }
}
