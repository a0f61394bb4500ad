// Copyright 2026 James Casey
// SPDX-License-Identifier: Apache-2.0

//! Lumen analyzer core.
//!
//! This crate contains the whole analysis pipeline:
//! - Tree wrapping and traversal over parser output
//! - Scope, binding and constant resolution
//! - The program catalog (classes, modules, methods, protocols)
//! - Control flow graph construction and SSA conversion
//! - Flow-sensitive diagnostics and effect classification
//! - Memoized, bounded type inference with recorded signatures
//!
//! The analyzer is designed as a language service: one
//! [`session::AnalysisSession`] runs the passes in order over a program
//! and owns the results, so repeated queries cost nothing.

#![doc = include_str!("../../../README.md")]

pub mod analysis;
pub mod control_flow;
pub mod diagnostics;
pub mod entity;
pub mod infer;
pub mod scope;
pub mod session;
pub mod source;
pub mod test_helpers;
pub mod tree;
pub mod types;

#[cfg(test)]
mod pipeline_tests;

/// Re-export commonly used types.
pub mod prelude {
    pub use crate::diagnostics::{Diagnostic, DiagnosticKind, Severity};
    pub use crate::session::AnalysisSession;
    pub use crate::source::{SourceText, Span};
    pub use crate::tree::{Ast, NodeKind, RawNode};
    pub use crate::types::Ty;
}
