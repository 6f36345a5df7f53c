// SPDX-License-Identifier: PMPL-1.0-or-later
// Copyright (c) 2026 Jonathan D.A. Jewell (hyperpolymath) <jonathan.jewell@open.ac.uk>
//
// Gate configuration.

use std::path::{Path, PathBuf};

use serde::{Deserialize, Serialize};

use crate::error::{GateError, Result};

/// Name of the optional config file looked up in the project root.
pub const CONFIG_FILE: &str = "envgate.json";

/// Persistent gate settings. Relative paths resolve against the project root.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct GateConfig {
    /// Directory holding the PIN hash, approval records and the write lock.
    pub secure_dir: PathBuf,
    /// Append-only approval ledger.
    pub ledger_file: PathBuf,
    /// The protected artifact.
    pub secrets_file: PathBuf,
    /// SQLite database recording every gate decision.
    pub decision_db: PathBuf,
    /// Files and directories listed in an export manifest.
    pub export_include: Vec<PathBuf>,
}

impl Default for GateConfig {
    fn default() -> Self {
        Self {
            secure_dir: PathBuf::from(".secure"),
            ledger_file: PathBuf::from("HISTORICAL_CHANGE_LOG.md"),
            secrets_file: PathBuf::from("ops/secrets.env"),
            decision_db: PathBuf::from(".secure/decisions.db"),
            export_include: vec![
                PathBuf::from("tools"),
                PathBuf::from("scripts"),
                PathBuf::from("README.md"),
            ],
        }
    }
}

impl GateConfig {
    /// Load configuration for `root`.
    ///
    /// An explicit path must exist. Without one, `<root>/envgate.json` is used
    /// when present and defaults otherwise. A file that exists but does not
    /// parse is an error rather than a silent fallback.
    pub fn load(root: &Path, explicit: Option<&Path>) -> Result<Self> {
        let path = match explicit {
            Some(path) => path.to_path_buf(),
            None => {
                let candidate = root.join(CONFIG_FILE);
                if !candidate.exists() {
                    return Ok(Self::default());
                }
                candidate
            }
        };

        let data = std::fs::read_to_string(&path)
            .map_err(|e| GateError::Config(format!("{}: {e}", path.display())))?;
        serde_json::from_str(&data)
            .map_err(|e| GateError::Config(format!("{}: {e}", path.display())))
    }

    /// Resolve every configured location against `root`.
    pub fn resolve(&self, root: &Path) -> GatePaths {
        let secure_dir = root.join(&self.secure_dir);
        GatePaths {
            root: root.to_path_buf(),
            credential_file: secure_dir.join("pin.hash"),
            approvals_dir: secure_dir.join("approvals"),
            lock_file: secure_dir.join(".write.lock"),
            secure_dir,
            ledger_file: root.join(&self.ledger_file),
            secrets_file: root.join(&self.secrets_file),
            decision_db: root.join(&self.decision_db),
            export_include: self.export_include.clone(),
        }
    }
}

/// Absolute locations derived from a [`GateConfig`].
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct GatePaths {
    pub root: PathBuf,
    pub secure_dir: PathBuf,
    pub credential_file: PathBuf,
    pub approvals_dir: PathBuf,
    pub lock_file: PathBuf,
    pub ledger_file: PathBuf,
    pub secrets_file: PathBuf,
    pub decision_db: PathBuf,
    /// Kept relative; consumers join them with `root`.
    pub export_include: Vec<PathBuf>,
}
