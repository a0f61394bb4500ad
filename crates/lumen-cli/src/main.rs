// Copyright 2026 James Casey
// SPDX-License-Identifier: Apache-2.0

//! Lumen analyzer command-line interface.
//!
//! This is the main entry point for the `lumen` command.

use clap::{ArgAction, Parser, Subcommand};
use miette::Result;
use tracing_subscriber::EnvFilter;

mod commands;
mod diagnostic;
mod reader;

/// Lumen: a flow-sensitive static analyzer for a dynamic object language
#[derive(Debug, Parser)]
#[command(name = "lumen")]
#[command(version, about, long_about = None)]
struct Cli {
    /// Increase logging verbosity (-v: debug, -vv+: trace)
    #[arg(short, long, action = ArgAction::Count, global = true)]
    verbose: u8,

    #[command(subcommand)]
    command: Command,
}

#[derive(Debug, Subcommand)]
enum Command {
    /// Analyze tree files and report findings
    Analyze {
        /// Tree files to analyze
        #[arg(required = true)]
        files: Vec<String>,

        /// Output format: text or json
        #[arg(long, default_value = "text")]
        format: commands::analyze::OutputFormat,
    },
}

fn main() -> Result<()> {
    let cli = Cli::parse();
    init_tracing(cli.verbose);

    // Install miette's fancy error handler
    miette::set_hook(Box::new(|_| {
        Box::new(
            miette::MietteHandlerOpts::new()
                .terminal_links(true)
                .unicode(true)
                .context_lines(3)
                .build(),
        )
    }))?;

    let result = match cli.command {
        Command::Analyze { files, format } => commands::analyze::run_analyze(&files, format),
    };

    // Exit with appropriate code
    match result {
        Ok(()) => std::process::exit(0),
        Err(e) => {
            eprintln!("{e:?}");
            std::process::exit(1);
        }
    }
}

fn init_tracing(verbose: u8) {
    // Target must match the bin target's crate name (`lumen`).
    let default_directive = match verbose {
        0 => "lumen=warn,lumen_core=warn",
        1 => "lumen=debug,lumen_core=debug",
        _ => "lumen=trace,lumen_core=trace",
    };
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(default_directive)),
        )
        .with_writer(std::io::stderr)
        .init();
}
