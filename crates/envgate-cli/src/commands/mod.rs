// SPDX-License-Identifier: PMPL-1.0-or-later
// Copyright (c) 2026 Jonathan D.A. Jewell (hyperpolymath) <jonathan.jewell@open.ac.uk>
//
// Command dispatch. Each handler returns the process exit code on success;
// errors are turned into messages and exit codes by `main`.

pub mod approvals;
pub mod consumers;

use envgate_core::error::Result;

use crate::cli::{Cli, Command};
use crate::services::context::GateContext;

pub fn run(cli: Cli) -> Result<i32> {
    let ctx = GateContext::open(cli.root.as_deref(), cli.config.as_deref())?;

    match cli.command {
        Command::SetPin => approvals::set_pin(&ctx),
        Command::Approve { message, pin } => approvals::approve(&ctx, &message, &pin),
        Command::List => approvals::list(&ctx),
        Command::Verify { approval_id } => approvals::verify(&ctx, &approval_id),
        Command::VerifyPin { approval_id, pin } => approvals::verify_pin(&ctx, &approval_id, &pin),
        Command::Decisions { limit } => consumers::decisions(&ctx, limit),
        Command::Lock => consumers::lock(&ctx),
        Command::Unlock { approval_id, pin } => consumers::unlock(&ctx, approval_id, &pin),
        Command::ChangedFiles { approval_id, pin } => {
            consumers::changed_files(&ctx, approval_id, &pin)
        }
        Command::Exec {
            approval_id,
            pin,
            dry_run,
            command,
        } => consumers::exec(&ctx, approval_id, &pin, dry_run, &command),
        Command::Export {
            output,
            include_secrets,
            approval_id,
            pin,
        } => consumers::export(&ctx, &output, include_secrets, approval_id, &pin),
        Command::Snapshot {
            output,
            approval_id,
            pin,
            include,
        } => consumers::snapshot(&ctx, &output, approval_id, &pin, include),
    }
}
