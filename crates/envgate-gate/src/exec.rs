// SPDX-License-Identifier: PMPL-1.0-or-later
// Copyright (c) 2026 Jonathan D.A. Jewell (hyperpolymath) <jonathan.jewell@open.ac.uk>
//
// Approved command execution. The gate runs before the command is even
// inspected, so a refused request has no side effects.

use std::process::Command;

use envgate_core::error::{GateError, Result};
use envgate_security::ApprovalStore;
use tracing::info;

use crate::gate::{Authorization, Gate, GateRequest};

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ExecOutcome {
    pub authorization: Authorization,
    /// `None` for a dry run.
    pub exit_code: Option<i32>,
}

pub fn run_approved<S: ApprovalStore + ?Sized>(
    gate: &Gate<'_, S>,
    request: &GateRequest,
    command: &[String],
    dry_run: bool,
) -> Result<ExecOutcome> {
    let authorization = gate.authorize("exec", request.preferred_mode(), request)?;
    let Some((program, args)) = command.split_first() else {
        return Err(GateError::Consumer("no command provided".into()));
    };

    if dry_run {
        info!(command = %command.join(" "), "dry run, command not executed");
        return Ok(ExecOutcome {
            authorization,
            exit_code: None,
        });
    }

    let status = Command::new(program)
        .args(args)
        .status()
        .map_err(|e| GateError::Consumer(format!("failed to run {program}: {e}")))?;
    // Signal-terminated children have no code.
    let code = status.code().unwrap_or(1);
    info!(command = %program, code, "approved command finished");
    Ok(ExecOutcome {
        authorization,
        exit_code: Some(code),
    })
}
