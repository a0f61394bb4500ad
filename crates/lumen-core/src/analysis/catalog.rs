// Copyright 2026 James Casey
// SPDX-License-Identifier: Apache-2.0

//! The override catalog: which base methods are dangerous to redefine
//! and which demand a guaranteed `super` from an override.
//!
//! Static configuration. The instance lists bind instance methods and
//! the class-level lists bind singleton methods; a user-defined
//! instance method named `inherited` is an ordinary method.

use crate::entity::MethodKind;

/// Reflective queries whose answers depend on the real call frame.
/// A redefinition breaks every caller that relies on them.
pub const DANGEROUS_INSTANCE: &[&str] = &[
    "block_given?",
    "iterator?",
    "binding",
    "callcc",
    "caller",
    "__method__",
    "__callee__",
];

/// Visibility and module plumbing. Redefined on a class, these change
/// what every later definition in the body means.
pub const DANGEROUS_SINGLETON: &[&str] = &["public", "private", "protected", "module_function"];

/// Fallback hooks that must delegate up or the default behavior
/// (raising `NoMethodError`, copying state) is silently lost.
pub const SUPER_REQUIRED_INSTANCE: &[&str] = &[
    "method_missing",
    "respond_to_missing?",
    "initialize_copy",
    "initialize_clone",
    "initialize_dup",
];

/// Class lifecycle hooks.
pub const SUPER_REQUIRED_SINGLETON: &[&str] = &[
    "inherited",
    "included",
    "extended",
    "prepended",
    "method_added",
    "method_removed",
    "method_undefined",
    "const_missing",
];

/// Whether defining `name` with this kind is flagged unconditionally.
#[must_use]
pub fn is_dangerous(kind: MethodKind, name: &str) -> bool {
    let list = match kind {
        MethodKind::Instance => DANGEROUS_INSTANCE,
        MethodKind::Singleton => DANGEROUS_SINGLETON,
    };
    list.contains(&name)
}

/// Whether an override of `name` must call `super` on every path.
#[must_use]
pub fn requires_super(kind: MethodKind, name: &str) -> bool {
    let list = match kind {
        MethodKind::Instance => SUPER_REQUIRED_INSTANCE,
        MethodKind::Singleton => SUPER_REQUIRED_SINGLETON,
    };
    list.contains(&name)
}
