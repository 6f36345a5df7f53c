// SPDX-License-Identifier: PMPL-1.0-or-later
// Copyright (c) 2026 Jonathan D.A. Jewell (hyperpolymath) <jonathan.jewell@open.ac.uk>
//
// Changed-file listing behind a strict gate.

use std::path::Path;
use std::process::Command;

use envgate_core::error::{GateError, Result};
use envgate_core::types::GateMode;
use envgate_security::ApprovalStore;
use tracing::debug;

use crate::gate::{Authorization, Gate, GateRequest};

/// Paths from `git status --porcelain` output. Renames yield the new path.
pub fn parse_porcelain(output: &str) -> Vec<String> {
    output
        .lines()
        .filter_map(|line| line.get(3..))
        .map(|path| match path.split_once(" -> ") {
            Some((_, to)) => to,
            None => path,
        })
        .map(|path| path.trim().trim_matches('"').to_owned())
        .filter(|path| !path.is_empty())
        .collect()
}

/// Run `git status --porcelain` in `repo`.
pub fn list_changed_files(repo: &Path) -> Result<Vec<String>> {
    let output = Command::new("git")
        .args(["status", "--porcelain"])
        .current_dir(repo)
        .output()
        .map_err(|e| GateError::Consumer(format!("failed to run git: {e}")))?;
    if !output.status.success() {
        let stderr = String::from_utf8_lossy(&output.stderr);
        return Err(GateError::Consumer(format!(
            "git status failed: {}",
            stderr.trim()
        )));
    }
    let files = parse_porcelain(&String::from_utf8_lossy(&output.stdout));
    debug!(count = files.len(), "changed files listed");
    Ok(files)
}

/// Strict gate, then the listing. Git is never invoked on refusal.
pub fn changed_files<S: ApprovalStore + ?Sized>(
    gate: &Gate<'_, S>,
    request: &GateRequest,
    repo: &Path,
) -> Result<(Authorization, Vec<String>)> {
    let auth = gate.authorize("changed-files", GateMode::Strict, request)?;
    let files = list_changed_files(repo)?;
    Ok((auth, files))
}
