// SPDX-License-Identifier: PMPL-1.0-or-later
// Copyright (c) 2026 Jonathan D.A. Jewell (hyperpolymath) <jonathan.jewell@open.ac.uk>

//! envgate-gate — privileged operations behind the approval gate.
//!
//! [`Gate::authorize`] is the single entry point: it runs before any sensitive
//! resource is touched and returns an [`Authorization`] or the refusal reason.
//! The consumers here (secrets lock, changed-file listing, approved exec,
//! release export and secrets snapshot) are thin wrappers that call it first.
//! Consumers that produce artifacts build them in a [`staging::StagedDir`]
//! and only move them into place once complete.

pub mod changed_files;
pub mod exec;
pub mod export;
pub mod gate;
pub mod lock_guard;
pub mod snapshot;
pub mod staging;

pub use exec::{ExecOutcome, run_approved};
pub use export::{ExportOptions, ExportReport, ManifestEntry, export};
pub use gate::{Authorization, Gate, GateRequest};
pub use lock_guard::SecretLockGuard;
pub use snapshot::{SnapshotOptions, SnapshotReport, snapshot};
