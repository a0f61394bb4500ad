// Copyright 2026 James Casey
// SPDX-License-Identifier: Apache-2.0

//! Diagnostic values attached to syntax nodes.
//!
//! Analysis communicates every user-facing finding as a [`Diagnostic`]
//! attached to the node it concerns; the analyzer itself never panics on
//! user input. Internal failures (an unsupported construct, a scope lookup
//! that cannot succeed) degrade to a diagnostic plus a conservative answer.

use std::fmt;

use ecow::EcoString;

use crate::source::Span;

/// Diagnostic severity level.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Severity {
    /// A finding that is wrong in every execution, such as a dangerous
    /// override.
    Error,
    /// A finding that should be addressed but may be intentional.
    Warning,
}

/// The closed set of findings lumen reports.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum DiagnosticKind {
    UnreachableCode,
    UnusedVariable,
    MutatedAlias,
    DangerousOverride,
    OverrideWithoutSuper,
    ImproperOverrideType,
    UnanalyzableMethod,
    ScopeResolution,
}

impl DiagnosticKind {
    /// Stable kebab-case label, used by the JSON output format.
    #[must_use]
    pub fn label(self) -> &'static str {
        match self {
            DiagnosticKind::UnreachableCode => "unreachable-code",
            DiagnosticKind::UnusedVariable => "unused-variable",
            DiagnosticKind::MutatedAlias => "mutated-alias",
            DiagnosticKind::DangerousOverride => "dangerous-override",
            DiagnosticKind::OverrideWithoutSuper => "override-without-super",
            DiagnosticKind::ImproperOverrideType => "improper-override-type",
            DiagnosticKind::UnanalyzableMethod => "unanalyzable-method",
            DiagnosticKind::ScopeResolution => "scope-resolution",
        }
    }
}

/// A single finding: what kind, how severe, where, and an optional hint.
#[derive(Debug, Clone, PartialEq)]
pub struct Diagnostic {
    pub severity: Severity,
    pub kind: DiagnosticKind,
    pub message: EcoString,
    /// Source location, when one could be recorded or reconstructed.
    pub span: Option<Span>,
    /// Optional hint for how to fix the issue.
    pub hint: Option<EcoString>,
}

impl Diagnostic {
    /// Creates a new error diagnostic.
    #[must_use]
    pub fn error(kind: DiagnosticKind, message: impl Into<EcoString>) -> Self {
        Self {
            severity: Severity::Error,
            kind,
            message: message.into(),
            span: None,
            hint: None,
        }
    }

    /// Creates a new warning diagnostic.
    #[must_use]
    pub fn warning(kind: DiagnosticKind, message: impl Into<EcoString>) -> Self {
        Self {
            severity: Severity::Warning,
            kind,
            message: message.into(),
            span: None,
            hint: None,
        }
    }

    /// Attaches a source span.
    #[must_use]
    pub fn with_span(mut self, span: Span) -> Self {
        self.span = Some(span);
        self
    }

    /// Attaches a span when one is available.
    #[must_use]
    pub fn with_span_opt(mut self, span: Option<Span>) -> Self {
        self.span = span;
        self
    }

    /// Attaches a fix hint.
    #[must_use]
    pub fn with_hint(mut self, hint: impl Into<EcoString>) -> Self {
        self.hint = Some(hint.into());
        self
    }
}

impl fmt::Display for Diagnostic {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let severity = match self.severity {
            Severity::Error => "error",
            Severity::Warning => "warning",
        };
        write!(f, "{severity}: {}", self.message)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn constructors_set_severity() {
        let err = Diagnostic::error(DiagnosticKind::DangerousOverride, "boom");
        assert_eq!(err.severity, Severity::Error);
        let warn = Diagnostic::warning(DiagnosticKind::UnusedVariable, "meh");
        assert_eq!(warn.severity, Severity::Warning);
    }

    #[test]
    fn display_prefixes_severity() {
        let diag = Diagnostic::warning(DiagnosticKind::UnreachableCode, "unreachable code");
        assert_eq!(diag.to_string(), "warning: unreachable code");
    }

    #[test]
    fn builder_attaches_span_and_hint() {
        let diag = Diagnostic::error(DiagnosticKind::OverrideWithoutSuper, "no super")
            .with_span(Span::new(1, 4))
            .with_hint("call super");
        assert_eq!(diag.span, Some(Span::new(1, 4)));
        assert_eq!(diag.hint.as_deref(), Some("call super"));
    }

    #[test]
    fn labels_are_kebab_case() {
        assert_eq!(DiagnosticKind::ImproperOverrideType.label(), "improper-override-type");
        assert_eq!(DiagnosticKind::UnreachableCode.label(), "unreachable-code");
    }
}
