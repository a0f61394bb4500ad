// Copyright 2026 James Casey
// SPDX-License-Identifier: Apache-2.0

//! Rich finding reports using miette.
//!
//! Converts lumen-core diagnostics into miette-formatted reports with:
//! - Source code context
//! - An arrow pointing at the finding's location
//! - A diagnostic code for easy reference
//! - An optional help footnote carrying the finding's hint

use lumen_core::diagnostics::{Diagnostic as Finding, Severity};
use miette::{Diagnostic, SourceSpan};

/// An analysis finding with rich formatting.
#[derive(Debug, Diagnostic, thiserror::Error)]
#[error("{message}")]
#[diagnostic(code(lumen::analyze))]
pub struct AnalyzeDiagnostic {
    /// Error or warning.
    pub severity: Severity,
    /// Human-readable message
    pub message: String,
    /// Source code for context
    #[source_code]
    pub src: miette::NamedSource<String>,
    /// Location of the finding
    #[label("{label}")]
    pub span: SourceSpan,
    /// Label for the span (interpolated by miette's derive macro)
    pub label: String,
    /// Optional fix suggestion
    #[help]
    pub hint: Option<String>,
}

impl AnalyzeDiagnostic {
    /// Create a rich report from a lumen-core finding. A finding without
    /// a span points at the start of the file.
    pub fn from_finding(finding: &Finding, source_path: &str, source: &str) -> Self {
        let label = match finding.severity {
            Severity::Error => "error here",
            Severity::Warning => "warning here",
        };

        Self {
            severity: finding.severity,
            message: finding.message.to_string(),
            src: miette::NamedSource::new(source_path, source.to_string()),
            span: finding.span.unwrap_or_default().into(),
            label: label.to_string(),
            hint: finding.hint.as_ref().map(ToString::to_string),
        }
    }
}
