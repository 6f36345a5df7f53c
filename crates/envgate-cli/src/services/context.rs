// SPDX-License-Identifier: PMPL-1.0-or-later
// Copyright (c) 2026 Jonathan D.A. Jewell (hyperpolymath) <jonathan.jewell@open.ac.uk>
//
// Per-invocation context: resolved paths, the filesystem store, and the
// decision log.
//
// The decision log is best effort. If it cannot be opened the gate still
// decides, and the failure is only logged.

use std::path::{Path, PathBuf};

use envgate_core::config::{GateConfig, GatePaths};
use envgate_core::error::{GateError, Result};
use envgate_gate::Gate;
use envgate_security::{DecisionLog, FsStore};
use tracing::{debug, error};

pub struct GateContext {
    pub paths: GatePaths,
    pub store: FsStore,
}

impl GateContext {
    pub fn open(root: Option<&Path>, config: Option<&Path>) -> Result<Self> {
        let root = resolve_root(root)?;
        let config = GateConfig::load(&root, config)?;
        let paths = config.resolve(&root);
        debug!(root = %root.display(), "context opened");
        Ok(Self {
            store: FsStore::new(&paths),
            paths,
        })
    }

    pub fn decision_log(&self) -> Option<DecisionLog> {
        match DecisionLog::open(&self.paths.decision_db) {
            Ok(log) => Some(log),
            Err(e) => {
                error!(error = %e, "decision log unavailable, decisions will not be recorded");
                None
            }
        }
    }

    pub fn gate<'a>(&'a self, log: Option<&'a DecisionLog>) -> Gate<'a, FsStore> {
        let gate = Gate::new(&self.store);
        match log {
            Some(log) => gate.with_decision_log(log),
            None => gate,
        }
    }
}

/// `--root` (or `ENVGATE_ROOT`), else the current directory.
fn resolve_root(explicit: Option<&Path>) -> Result<PathBuf> {
    let root = match explicit {
        Some(path) => path.to_path_buf(),
        None => std::env::current_dir()?,
    };
    if root.is_dir() {
        Ok(root)
    } else {
        Err(GateError::Config(format!(
            "root {} is not a directory",
            root.display()
        )))
    }
}
