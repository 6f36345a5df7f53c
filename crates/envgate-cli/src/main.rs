// SPDX-License-Identifier: PMPL-1.0-or-later
// Copyright (c) 2026 Jonathan D.A. Jewell (hyperpolymath) <jonathan.jewell@open.ac.uk>
//
// envgate — PIN-signed approvals gating access to a local secrets file.
//
// Entry point. Initialises logging, parses arguments, dispatches the command
// and turns any error into a human-readable line plus a distinct exit code.

mod cli;
mod commands;
mod prompt;
mod services;

use clap::Parser;
use envgate_core::human_errors::humanize_error;

use cli::Cli;

fn main() {
    // stderr only; stdout carries command output.
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new("warn")),
        )
        .with_writer(std::io::stderr)
        .init();

    let cli = Cli::parse();
    let code = match commands::run(cli) {
        Ok(code) => code,
        Err(e) => {
            tracing::debug!(error = ?e, "command failed");
            let human = humanize_error(&e);
            eprintln!("error: {}", human.message);
            if !human.suggestion.is_empty() {
                eprintln!("  {}", human.suggestion);
            }
            human.exit_code
        }
    };
    std::process::exit(code);
}
