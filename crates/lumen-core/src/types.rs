// Copyright 2026 James Casey
// SPDX-License-Identifier: Apache-2.0

//! The inference type lattice.
//!
//! A [`Ty`] is a join-semilattice value: `Bottom` (no value flows here, the
//! recursion placeholder), a finite union of class instances, or `Top`
//! (no information). Unions are kept sorted and deduplicated so equal types
//! compare equal and iteration order is deterministic.
//!
//! ```
//! use lumen_core::types::Ty;
//!
//! let a = Ty::instance("Integer");
//! let b = Ty::instance("Float");
//! assert_eq!(a.clone().join(b.clone()), b.join(a));
//! ```

use std::collections::BTreeSet;
use std::fmt;

use ecow::EcoString;

use crate::entity::Catalog;

/// An inferred type: a point in the analysis lattice.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub enum Ty {
    /// No value reaches this point (divergence, or a pending recursive
    /// query). Identity for [`Ty::join`].
    Bottom,
    /// An instance of one of these classes.
    Union(BTreeSet<EcoString>),
    /// Unknown. Absorbing for [`Ty::join`].
    Top,
}

impl Ty {
    /// An instance of a single class.
    #[must_use]
    pub fn instance(path: impl Into<EcoString>) -> Self {
        let mut set = BTreeSet::new();
        set.insert(path.into());
        Ty::Union(set)
    }

    /// A union over class paths. Empty input yields `Bottom`.
    #[must_use]
    pub fn union<I, S>(paths: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<EcoString>,
    {
        let set: BTreeSet<EcoString> = paths.into_iter().map(Into::into).collect();
        if set.is_empty() { Ty::Bottom } else { Ty::Union(set) }
    }

    /// The type of `nil`.
    #[must_use]
    pub fn nil() -> Self {
        Ty::instance("NilClass")
    }

    /// The boolean type, `TrueClass | FalseClass`.
    #[must_use]
    pub fn boolean() -> Self {
        Ty::union(["TrueClass", "FalseClass"])
    }

    #[must_use]
    pub fn is_top(&self) -> bool {
        matches!(self, Ty::Top)
    }

    #[must_use]
    pub fn is_bottom(&self) -> bool {
        matches!(self, Ty::Bottom)
    }

    /// Member class paths, for union types.
    #[must_use]
    pub fn members(&self) -> Option<&BTreeSet<EcoString>> {
        match self {
            Ty::Union(set) => Some(set),
            _ => None,
        }
    }

    /// Least upper bound. Commutative, associative, idempotent; `Top`
    /// absorbs and `Bottom` is the identity.
    #[must_use]
    pub fn join(self, other: Ty) -> Ty {
        match (self, other) {
            (Ty::Top, _) | (_, Ty::Top) => Ty::Top,
            (Ty::Bottom, t) | (t, Ty::Bottom) => t,
            (Ty::Union(mut a), Ty::Union(b)) => {
                a.extend(b);
                Ty::Union(a)
            }
        }
    }

    /// Joins an iterator of types; empty input yields `Bottom`.
    #[must_use]
    pub fn join_all(types: impl IntoIterator<Item = Ty>) -> Ty {
        types.into_iter().fold(Ty::Bottom, Ty::join)
    }

    /// Could a value of this type be truthy? `Top` can be anything.
    #[must_use]
    pub fn includes_truthy(&self) -> bool {
        match self {
            Ty::Top => true,
            Ty::Bottom => false,
            Ty::Union(set) => set
                .iter()
                .any(|p| p.as_str() != "NilClass" && p.as_str() != "FalseClass"),
        }
    }

    /// Could a value of this type be falsy (`nil` or `false`)?
    #[must_use]
    pub fn includes_falsy(&self) -> bool {
        match self {
            Ty::Top => true,
            Ty::Bottom => false,
            Ty::Union(set) => set.contains("NilClass") || set.contains("FalseClass"),
        }
    }

    /// Does the union contain `path` as a member?
    #[must_use]
    pub fn includes(&self, path: &str) -> bool {
        match self {
            Ty::Union(set) => set.contains(path),
            _ => false,
        }
    }

    /// Could a value of this type be `nil`?
    #[must_use]
    pub fn is_nilable(&self) -> bool {
        match self {
            Ty::Top => true,
            Ty::Bottom => false,
            Ty::Union(set) => set.contains("NilClass"),
        }
    }

    /// Is every possible value of `self` an instance of `other`, walking
    /// superclass chains through the catalog? `Bottom` vacuously is.
    /// `Top` never is (no positive knowledge).
    #[must_use]
    pub fn is_subtype(&self, other: &Ty, catalog: &Catalog) -> bool {
        match (self, other) {
            (Ty::Bottom, _) => true,
            (_, Ty::Top) => true,
            (Ty::Top, _) | (_, Ty::Bottom) => false,
            (Ty::Union(subs), Ty::Union(supers)) => subs.iter().all(|sub| {
                supers
                    .iter()
                    .any(|sup| sub == sup || catalog.is_descendant_path(sub, sup))
            }),
        }
    }
}

impl fmt::Display for Ty {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Ty::Top => write!(f, "unknown"),
            Ty::Bottom => write!(f, "none"),
            Ty::Union(set) => {
                let mut first = true;
                for path in set {
                    if !first {
                        write!(f, " | ")?;
                    }
                    write!(f, "{path}")?;
                    first = false;
                }
                Ok(())
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn join_merges_unions() {
        let joined = Ty::instance("Integer").join(Ty::instance("Float"));
        assert_eq!(joined, Ty::union(["Float", "Integer"]));
    }

    #[test]
    fn join_is_idempotent() {
        let ty = Ty::union(["String", "NilClass"]);
        assert_eq!(ty.clone().join(ty.clone()), ty);
    }

    #[test]
    fn top_absorbs_and_bottom_is_identity() {
        assert_eq!(Ty::Top.join(Ty::instance("String")), Ty::Top);
        assert_eq!(Ty::Bottom.join(Ty::instance("String")), Ty::instance("String"));
        assert_eq!(Ty::join_all(std::iter::empty()), Ty::Bottom);
    }

    #[test]
    fn truthiness_of_unions() {
        let stringy = Ty::instance("String");
        assert!(stringy.includes_truthy());
        assert!(!stringy.includes_falsy());

        let nilable = Ty::union(["String", "NilClass"]);
        assert!(nilable.includes_truthy());
        assert!(nilable.includes_falsy());
        assert!(nilable.is_nilable());

        assert!(Ty::boolean().includes_truthy());
        assert!(Ty::boolean().includes_falsy());
        assert!(!Ty::boolean().is_nilable());
    }

    #[test]
    fn bottom_has_no_values() {
        assert!(!Ty::Bottom.includes_truthy());
        assert!(!Ty::Bottom.includes_falsy());
    }

    #[test]
    fn display_renders_sorted_union() {
        let ty = Ty::union(["String", "Integer"]);
        assert_eq!(ty.to_string(), "Integer | String");
        assert_eq!(Ty::Top.to_string(), "unknown");
        assert_eq!(Ty::Bottom.to_string(), "none");
    }
}
