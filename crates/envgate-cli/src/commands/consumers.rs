// SPDX-License-Identifier: PMPL-1.0-or-later
// Copyright (c) 2026 Jonathan D.A. Jewell (hyperpolymath) <jonathan.jewell@open.ac.uk>
//
// Gated operations and the decision log viewer.

use std::path::{Path, PathBuf};

use envgate_core::error::Result;
use envgate_gate::changed_files::changed_files as list_changed;
use envgate_gate::{ExportOptions, GateRequest, SecretLockGuard, SnapshotOptions, run_approved};

use crate::cli::PinArg;
use crate::services::context::GateContext;

pub fn decisions(ctx: &GateContext, limit: u32) -> Result<i32> {
    let Some(log) = ctx.decision_log() else {
        println!("Decision log unavailable.");
        return Ok(1);
    };
    let entries = log.recent(limit)?;
    if entries.is_empty() {
        println!("No decisions recorded.");
    }
    for entry in entries {
        println!(
            "{}\t{}\t{}\t{}\t{}\t{}",
            entry.timestamp,
            entry.operation,
            entry.mode,
            if entry.granted { "GRANTED" } else { "DENIED" },
            entry.approval_id.as_deref().unwrap_or("-"),
            entry.reason
        );
    }
    Ok(0)
}

pub fn lock(ctx: &GateContext) -> Result<i32> {
    let guard = SecretLockGuard::new(&ctx.paths.secrets_file);
    guard.lock()?;
    println!("Locked {}", guard.path().display());
    Ok(0)
}

pub fn unlock(ctx: &GateContext, approval_id: String, pin: &PinArg) -> Result<i32> {
    let request = GateRequest::new(Some(approval_id), pin.resolve(false)?);
    let log = ctx.decision_log();
    let guard = SecretLockGuard::new(&ctx.paths.secrets_file);
    let auth = guard.unlock(&ctx.gate(log.as_ref()), &request)?;
    println!(
        "Unlocked {} (approval {})",
        guard.path().display(),
        auth.approval_id
    );
    Ok(0)
}

pub fn changed_files(ctx: &GateContext, approval_id: Option<String>, pin: &PinArg) -> Result<i32> {
    // Without an id the gate refuses before any prompt.
    let pin = if approval_id.is_some() {
        pin.resolve(true)?
    } else {
        None
    };
    let request = GateRequest::new(approval_id, pin);
    let log = ctx.decision_log();
    let (auth, files) = list_changed(&ctx.gate(log.as_ref()), &request, &ctx.paths.root)?;
    eprintln!("approval {}", auth.approval_id);
    for file in files {
        println!("{file}");
    }
    Ok(0)
}

pub fn exec(
    ctx: &GateContext,
    approval_id: Option<String>,
    pin: &PinArg,
    dry_run: bool,
    command: &[String],
) -> Result<i32> {
    let request = GateRequest::new(approval_id, pin.resolve(false)?);
    let log = ctx.decision_log();
    let outcome = run_approved(&ctx.gate(log.as_ref()), &request, command, dry_run)?;
    match outcome.exit_code {
        None => {
            println!(
                "Dry run: approval {} would run: {}",
                outcome.authorization.approval_id,
                command.join(" ")
            );
            Ok(0)
        }
        Some(code) => Ok(code),
    }
}

pub fn export(
    ctx: &GateContext,
    output: &Path,
    include_secrets: bool,
    approval_id: Option<String>,
    pin: &PinArg,
) -> Result<i32> {
    let request = GateRequest::new(approval_id, pin.resolve(false)?);
    let options = ExportOptions::from_paths(&ctx.paths, output, include_secrets);
    let log = ctx.decision_log();
    let report = envgate_gate::export(&ctx.gate(log.as_ref()), &request, &options)?;

    println!(
        "Exported {} file(s) to {}",
        report.included.len(),
        report.bundle.display()
    );
    println!("Archive: {}", report.archive.display());
    if let Some(id) = &report.approval_id {
        println!("Secrets included under approval {id}");
    }
    for dup in &report.duplicates {
        println!("Duplicate name {}: {}", dup.name, dup.paths.join(", "));
    }
    Ok(0)
}

pub fn snapshot(
    ctx: &GateContext,
    output: &Path,
    approval_id: Option<String>,
    pin: &PinArg,
    include: Vec<PathBuf>,
) -> Result<i32> {
    let request = GateRequest::new(approval_id, pin.resolve(false)?);
    let options = SnapshotOptions::from_paths(&ctx.paths, output, include);
    let log = ctx.decision_log();
    let report = envgate_gate::snapshot(&ctx.gate(log.as_ref()), &request, &options)?;

    println!(
        "Snapshot of {} file(s) in {}",
        report.files.len(),
        report.directory.display()
    );
    println!("Archive: {}", report.archive.display());
    println!("Approval: {}", report.approval_id);
    Ok(0)
}
