// Copyright 2026 James Casey
// SPDX-License-Identifier: Apache-2.0

//! Dangerous-override and guaranteed-super checks.
//!
//! Runs once per session over every user-defined method, after the
//! per-method effect summaries exist. Dangerous names are flagged on
//! sight; super-required names are flagged unless the method's super
//! effect is "always". Methods whose graph could not be built are
//! skipped rather than guessed at.

use std::collections::BTreeMap;

use crate::diagnostics::{Diagnostic, DiagnosticKind};
use crate::entity::{Catalog, MethodId, MethodKind};
use crate::tree::Ast;

use super::catalog::{is_dangerous, requires_super};
use super::effects::{EffectSummary, Frequency};

/// Checks every user-defined method against the override catalog.
pub fn check_overrides(
    ast: &mut Ast,
    catalog: &Catalog,
    effects: &BTreeMap<MethodId, EffectSummary>,
) {
    for (owner, kind, method_id) in catalog.defined_methods() {
        let method = catalog.method(method_id);
        let Some(def_node) = method.def_node else {
            continue;
        };
        let name = method.name.as_str();
        let owner_path = &catalog.entity(owner).path;
        let shown = match kind {
            MethodKind::Instance => format!("{owner_path}#{name}"),
            MethodKind::Singleton => format!("{owner_path}.{name}"),
        };

        if is_dangerous(kind, name) {
            if ast.has_diagnostic(def_node, DiagnosticKind::DangerousOverride) {
                continue;
            }
            let span = ast.span(def_node);
            ast.attach(
                def_node,
                Diagnostic::error(
                    DiagnosticKind::DangerousOverride,
                    format!("`{shown}` redefines a method that is dangerous to override"),
                )
                .with_span_opt(span),
            );
        } else if requires_super(kind, name) {
            if method.unanalyzable {
                continue;
            }
            let guaranteed = effects
                .get(&method_id)
                .is_some_and(|summary| summary.supers == Frequency::Always);
            if guaranteed || ast.has_diagnostic(def_node, DiagnosticKind::OverrideWithoutSuper) {
                continue;
            }
            let span = ast.span(def_node);
            ast.attach(
                def_node,
                Diagnostic::error(
                    DiagnosticKind::OverrideWithoutSuper,
                    format!("`{shown}` must call `super` on every path"),
                )
                .with_hint("delegate with `super` so the default behavior still runs")
                .with_span_opt(span),
            );
        }
    }
}
