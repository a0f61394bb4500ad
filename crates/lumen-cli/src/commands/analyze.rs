// Copyright 2026 James Casey
// SPDX-License-Identifier: Apache-2.0

//! `lumen analyze`: run the analyzer over tree files and report findings.
//!
//! Each file is read with the bundled tree reader, analyzed in its own
//! session, and every finding is printed. The command exits non-zero if
//! any file fails to read or any finding carries error severity;
//! warnings alone leave the exit code at zero.

use camino::Utf8PathBuf;
use lumen_core::prelude::*;
use miette::{IntoDiagnostic, Result, WrapErr};
use tracing::debug;

use crate::diagnostic::AnalyzeDiagnostic;
use crate::reader;

/// Run a full analysis session over each file and print every finding.
pub fn run_analyze(files: &[String], format: OutputFormat) -> Result<()> {
    if files.is_empty() {
        miette::bail!("no input files");
    }

    let mut errors = 0usize;
    let mut warnings = 0usize;

    for file in files {
        let path = Utf8PathBuf::from(file);
        if path.extension() != Some("lum") {
            miette::bail!("file '{path}' is not a .lum tree file");
        }
        let text = std::fs::read_to_string(&path)
            .into_diagnostic()
            .wrap_err_with(|| format!("failed to read '{path}'"))?;

        let root = match reader::read_program(path.as_str(), &text) {
            Ok(root) => root,
            Err(err) => {
                errors += 1;
                match format {
                    OutputFormat::Text => eprintln!("{:?}", miette::Report::new(err)),
                    OutputFormat::Json => {
                        let json = serde_json::json!({
                            "file": path.as_str(),
                            "severity": "error",
                            "kind": "reader",
                            "message": err.message,
                        });
                        println!("{json}");
                    }
                }
                continue;
            }
        };

        debug!(file = path.as_str(), "analyzing");
        let session = AnalysisSession::analyze(root, SourceText::new(text));

        for (_, finding) in session.diagnostics() {
            match finding.severity {
                Severity::Error => errors += 1,
                Severity::Warning => warnings += 1,
            }
            report(&path, &session, finding, format);
        }
        debug!(
            file = path.as_str(),
            methods = session.catalog().defined_methods().len(),
            "session finished"
        );
    }

    if errors > 0 {
        let plural = if errors == 1 { "" } else { "s" };
        miette::bail!("{errors} error{plural} found in {} file(s)", files.len());
    }
    if warnings > 0 {
        debug!(warnings, "finished with warnings");
    }
    Ok(())
}

fn report(path: &Utf8PathBuf, session: &AnalysisSession, finding: &Diagnostic, format: OutputFormat) {
    match format {
        OutputFormat::Text => {
            if finding.span.is_some() {
                let rich =
                    AnalyzeDiagnostic::from_finding(finding, path.as_str(), session.source().text());
                eprintln!("{:?}", miette::Report::new(rich));
            } else {
                eprintln!("{path}: {finding}");
            }
        }
        OutputFormat::Json => {
            let json = serde_json::json!({
                "file": path.as_str(),
                "severity": severity_label(finding.severity),
                "kind": finding.kind.label(),
                "message": finding.message.as_str(),
                "span_start": finding.span.map(Span::start),
                "span_end": finding.span.map(Span::end),
                "hint": finding.hint.as_ref().map(|h| h.as_str()),
            });
            println!("{json}");
        }
    }
}

fn severity_label(severity: Severity) -> &'static str {
    match severity {
        Severity::Error => "error",
        Severity::Warning => "warning",
    }
}

/// Output format for findings.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum OutputFormat {
    /// Human-readable text output via miette (default).
    #[default]
    Text,
    /// Machine-readable JSON (one object per line).
    Json,
}

impl std::str::FromStr for OutputFormat {
    type Err = String;

    fn from_str(s: &str) -> std::result::Result<Self, Self::Err> {
        match s {
            "text" => Ok(Self::Text),
            "json" => Ok(Self::Json),
            other => Err(format!(
                "unknown format '{other}': expected 'text' or 'json'"
            )),
        }
    }
}
