// SPDX-License-Identifier: PMPL-1.0-or-later
// Copyright (c) 2026 Jonathan D.A. Jewell (hyperpolymath) <jonathan.jewell@open.ac.uk>
//
// PIN and approval management: set-pin, approve, list, verify, verify-pin.

use std::collections::BTreeSet;

use envgate_core::error::{GateError, Result};
use envgate_core::types::{ApprovalRecord, GateMode, LedgerEntry};
use envgate_gate::GateRequest;
use envgate_security::store::RECORD_EXTENSION;
use envgate_security::{ApprovalIssuer, ApprovalStore, CredentialStore, Ledger};
use tracing::info;

use crate::cli::PinArg;
use crate::prompt;
use crate::services::context::GateContext;

pub fn set_pin(ctx: &GateContext) -> Result<i32> {
    let credentials = CredentialStore::new(&ctx.store);
    let overwrite = credentials.is_configured()?;
    if overwrite && !prompt::confirm("A PIN is already configured and will be replaced.")? {
        return Err(GateError::AlreadyExists);
    }

    let pin = prompt::read_secret("New PIN: ")?;
    let again = prompt::read_secret("Confirm PIN: ")?;
    if pin != again {
        return Err(GateError::PinMismatch);
    }
    credentials.set_credential(&pin, overwrite)?;
    println!("PIN set.");
    Ok(0)
}

pub fn approve(ctx: &GateContext, message: &str, pin: &PinArg) -> Result<i32> {
    let pin = pin.resolve(true)?.ok_or(GateError::MissingPin)?;
    let record = ApprovalIssuer::new(&ctx.store).issue(&pin, message)?;
    println!("Approval created: {}", record.payload.id);
    Ok(0)
}

/// Stored records with their ledger status, then ledger entries that have no
/// stored record (those can never verify).
pub fn list(ctx: &GateContext) -> Result<i32> {
    let ledger = Ledger::new(&ctx.store);
    let records = ctx.store.list_records()?;
    let orphans: Vec<LedgerEntry> = {
        let mut seen = BTreeSet::new();
        ledger
            .entries()?
            .into_iter()
            .filter(|entry| !records.iter().any(|r| record_id(&r.name) == entry.id))
            .filter(|entry| seen.insert(entry.id.clone()))
            .collect()
    };
    if records.is_empty() && orphans.is_empty() {
        println!("No approvals.");
        return Ok(0);
    }

    for stored in &records {
        let name = record_id(&stored.name);
        match serde_json::from_slice::<ApprovalRecord>(&stored.bytes) {
            Ok(record) => {
                let marker = if ledger.contains(name)? {
                    "ledger"
                } else {
                    "NOT IN LEDGER"
                };
                println!(
                    "{name}\t{}\t{}\t{marker}",
                    record.payload.issued_at_display(),
                    record.payload.message
                );
            }
            Err(_) => println!("{name}\t(invalid)"),
        }
    }
    for entry in orphans {
        println!(
            "{}\t{}\t{}\tNO RECORD",
            entry.id, entry.recorded_at, entry.message
        );
    }
    Ok(0)
}

fn record_id(file_name: &str) -> &str {
    file_name
        .strip_suffix(RECORD_EXTENSION)
        .and_then(|stem| stem.strip_suffix('.'))
        .unwrap_or(file_name)
}

pub fn verify(ctx: &GateContext, approval_id: &str) -> Result<i32> {
    authorize_and_report(ctx, "verify", GateMode::Existence, GateRequest::approval(approval_id))
}

pub fn verify_pin(ctx: &GateContext, approval_id: &str, pin: &PinArg) -> Result<i32> {
    let request = GateRequest::new(Some(approval_id.to_owned()), pin.resolve(true)?);
    authorize_and_report(ctx, "verify-pin", GateMode::Strict, request)
}

fn authorize_and_report(
    ctx: &GateContext,
    operation: &str,
    mode: GateMode,
    request: GateRequest,
) -> Result<i32> {
    let log = ctx.decision_log();
    let auth = ctx.gate(log.as_ref()).authorize(operation, mode, &request)?;
    info!(approval_id = %auth.approval_id, %mode, "verified");
    println!("Approval {} verified ({mode}).", auth.approval_id);
    Ok(0)
}
