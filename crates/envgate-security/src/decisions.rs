// SPDX-License-Identifier: PMPL-1.0-or-later
// Copyright (c) 2026 Jonathan D.A. Jewell (hyperpolymath) <jonathan.jewell@open.ac.uk>
//
// Decision log — append-only SQLite record of every gate decision, granted or
// denied. Separate from the approval ledger: the ledger says which approvals
// exist, this says which operations they were used for.
//
// Schema:
//   gate_decisions(
//     id           INTEGER PRIMARY KEY AUTOINCREMENT,
//     timestamp    TEXT    NOT NULL,   -- RFC 3339
//     operation    TEXT    NOT NULL,   -- e.g. "unlock", "export", "exec"
//     approval_id  TEXT,               -- as supplied; NULL when missing
//     mode         TEXT    NOT NULL,   -- "existence" | "strict"
//     granted      INTEGER NOT NULL,   -- 0 = denied, 1 = granted
//     reason       TEXT    NOT NULL
//   )

use std::path::Path;

use chrono::Utc;
use envgate_core::error::GateError;
use envgate_core::types::{GateDecision, GateMode};
use rusqlite::{Connection, params};
use serde::{Deserialize, Serialize};
use tracing::{debug, instrument};

/// Convert a `rusqlite::Error` into a `GateError::Database`.
fn db_err(e: rusqlite::Error) -> GateError {
    GateError::Database(e.to_string())
}

const SCHEMA: &str = "CREATE TABLE IF NOT EXISTS gate_decisions (
    id           INTEGER PRIMARY KEY AUTOINCREMENT,
    timestamp    TEXT    NOT NULL,
    operation    TEXT    NOT NULL,
    approval_id  TEXT,
    mode         TEXT    NOT NULL,
    granted      INTEGER NOT NULL,
    reason       TEXT    NOT NULL
);";

const COLUMNS: &str = "id, timestamp, operation, approval_id, mode, granted, reason";

/// A single row of the decision log.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct DecisionEntry {
    pub id: i64,
    pub timestamp: String,
    pub operation: String,
    pub approval_id: Option<String>,
    pub mode: String,
    pub granted: bool,
    pub reason: String,
}

impl DecisionEntry {
    fn from_row(row: &rusqlite::Row<'_>) -> rusqlite::Result<Self> {
        Ok(Self {
            id: row.get(0)?,
            timestamp: row.get(1)?,
            operation: row.get(2)?,
            approval_id: row.get(3)?,
            mode: row.get(4)?,
            granted: row.get::<_, i32>(5)? != 0,
            reason: row.get(6)?,
        })
    }
}

/// Append-only decision log backed by a SQLite database.
pub struct DecisionLog {
    conn: Connection,
}

impl DecisionLog {
    /// Open (or create) the decision database at `path`, in WAL mode.
    #[instrument(skip_all, fields(path = %path.as_ref().display()))]
    pub fn open(path: impl AsRef<Path>) -> Result<Self, GateError> {
        if let Some(parent) = path.as_ref().parent() {
            std::fs::create_dir_all(parent)?;
        }
        let conn = Connection::open(path).map_err(db_err)?;
        conn.execute_batch("PRAGMA journal_mode = WAL;")
            .map_err(db_err)?;
        conn.execute_batch(SCHEMA).map_err(db_err)?;

        debug!("decision log opened");
        Ok(Self { conn })
    }

    /// Open an in-memory decision database (useful for tests).
    pub fn open_in_memory() -> Result<Self, GateError> {
        let conn = Connection::open_in_memory().map_err(db_err)?;
        conn.execute_batch(SCHEMA).map_err(db_err)?;

        debug!("in-memory decision log opened");
        Ok(Self { conn })
    }

    /// Record the outcome of one gate check.
    #[instrument(skip(self, decision), fields(%operation, granted = decision.granted))]
    pub fn record(
        &self,
        operation: &str,
        approval_id: Option<&str>,
        mode: GateMode,
        decision: &GateDecision,
    ) -> Result<(), GateError> {
        let timestamp = Utc::now().to_rfc3339();
        let granted: i32 = if decision.granted { 1 } else { 0 };

        self.conn
            .execute(
                "INSERT INTO gate_decisions (timestamp, operation, approval_id, mode, granted, reason)
                 VALUES (?1, ?2, ?3, ?4, ?5, ?6)",
                params![
                    timestamp,
                    operation,
                    approval_id,
                    mode.as_str(),
                    granted,
                    decision.reason
                ],
            )
            .map_err(db_err)?;

        debug!("decision recorded");
        Ok(())
    }

    /// Every decision that referenced `approval_id`, oldest first.
    pub fn for_approval(&self, approval_id: &str) -> Result<Vec<DecisionEntry>, GateError> {
        let mut stmt = self
            .conn
            .prepare(&format!(
                "SELECT {COLUMNS} FROM gate_decisions WHERE approval_id = ?1 ORDER BY id ASC"
            ))
            .map_err(db_err)?;

        let rows = stmt
            .query_map(params![approval_id], DecisionEntry::from_row)
            .map_err(db_err)?;
        rows.collect::<rusqlite::Result<Vec<_>>>().map_err(db_err)
    }

    /// The most recent `limit` decisions, newest first.
    pub fn recent(&self, limit: u32) -> Result<Vec<DecisionEntry>, GateError> {
        let mut stmt = self
            .conn
            .prepare(&format!(
                "SELECT {COLUMNS} FROM gate_decisions ORDER BY id DESC LIMIT ?1"
            ))
            .map_err(db_err)?;

        let rows = stmt
            .query_map(params![limit], DecisionEntry::from_row)
            .map_err(db_err)?;
        rows.collect::<rusqlite::Result<Vec<_>>>().map_err(db_err)
    }

    pub fn count(&self) -> Result<u64, GateError> {
        self.conn
            .query_row("SELECT COUNT(*) FROM gate_decisions", [], |row| row.get(0))
            .map_err(db_err)
    }
}
