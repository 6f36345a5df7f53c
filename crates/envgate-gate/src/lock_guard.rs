// SPDX-License-Identifier: PMPL-1.0-or-later
// Copyright (c) 2026 Jonathan D.A. Jewell (hyperpolymath) <jonathan.jewell@open.ac.uk>
//
// Secrets-file lock: read-only while locked, owner read/write once an
// approval unlocks it. Locking never needs an approval.

use std::fs;
use std::path::{Path, PathBuf};

use envgate_core::error::{GateError, Result};
use envgate_security::ApprovalStore;
use tracing::info;

use crate::gate::{Authorization, Gate, GateRequest};

#[cfg(unix)]
const LOCKED_MODE: u32 = 0o400;
#[cfg(unix)]
const UNLOCKED_MODE: u32 = 0o600;

#[derive(Debug, Clone)]
pub struct SecretLockGuard {
    path: PathBuf,
}

impl SecretLockGuard {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self { path: path.into() }
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    pub fn lock(&self) -> Result<()> {
        self.require_file()?;
        set_locked(&self.path, true)?;
        info!(path = %self.path.display(), "secrets file locked");
        Ok(())
    }

    /// Unlock after the gate grants `request`. Strict when a PIN is supplied.
    pub fn unlock<S: ApprovalStore + ?Sized>(
        &self,
        gate: &Gate<'_, S>,
        request: &GateRequest,
    ) -> Result<Authorization> {
        let auth = gate.authorize("unlock", request.preferred_mode(), request)?;
        self.require_file()?;
        set_locked(&self.path, false)?;
        info!(path = %self.path.display(), approval_id = %auth.approval_id, "secrets file unlocked");
        Ok(auth)
    }

    pub fn is_locked(&self) -> Result<bool> {
        self.require_file()?;
        Ok(fs::metadata(&self.path)?.permissions().readonly())
    }

    fn require_file(&self) -> Result<()> {
        if self.path.is_file() {
            Ok(())
        } else {
            Err(GateError::Consumer(format!(
                "secrets file not found: {}",
                self.path.display()
            )))
        }
    }
}

#[cfg(unix)]
fn set_locked(path: &Path, locked: bool) -> Result<()> {
    use std::os::unix::fs::PermissionsExt;
    let mode = if locked { LOCKED_MODE } else { UNLOCKED_MODE };
    fs::set_permissions(path, fs::Permissions::from_mode(mode))?;
    Ok(())
}

#[cfg(not(unix))]
fn set_locked(path: &Path, locked: bool) -> Result<()> {
    let mut perms = fs::metadata(path)?.permissions();
    perms.set_readonly(locked);
    fs::set_permissions(path, perms)?;
    Ok(())
}
