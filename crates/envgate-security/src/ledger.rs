// SPDX-License-Identifier: PMPL-1.0-or-later
// Copyright (c) 2026 Jonathan D.A. Jewell (hyperpolymath) <jonathan.jewell@open.ac.uk>
//
// Approval ledger — append-only, human-readable, one line per approval.
//
// The ledger answers "was this id ever granted", independently of whether the
// signed record still exists. Entries are never edited, removed or
// deduplicated here.

use envgate_core::error::Result;
use envgate_core::types::LedgerEntry;
use tracing::{debug, instrument};

use crate::store::ApprovalStore;

pub struct Ledger<'s, S: ApprovalStore + ?Sized> {
    store: &'s S,
}

impl<'s, S: ApprovalStore + ?Sized> Ledger<'s, S> {
    pub fn new(store: &'s S) -> Self {
        Self { store }
    }

    /// Append one entry: read the current text, concatenate, write back.
    ///
    /// The caller holds the store's write lock. A ledger that does not exist
    /// yet is created.
    #[instrument(skip_all, fields(id = %entry.id))]
    pub fn append(&self, entry: &LedgerEntry) -> Result<()> {
        let mut text = self.store.read_ledger()?.unwrap_or_default();
        if !text.is_empty() && !text.ends_with('\n') {
            text.push('\n');
        }
        text.push_str(&entry.to_line());
        self.store.write_ledger(&text)?;
        debug!("ledger entry appended");
        Ok(())
    }

    /// Whether `id` appears in the ledger.
    ///
    /// Works on the raw text so that hand-maintained ledgers keep working.
    /// Approval lines mention the id only through their `id=` field; any
    /// other line mentions it when it contains `id=<id>` bounded by
    /// whitespace or line ends. A missing ledger contains nothing.
    pub fn contains(&self, id: &str) -> Result<bool> {
        let id = id.trim();
        if id.is_empty() {
            return Ok(false);
        }
        let Some(text) = self.store.read_ledger()? else {
            return Ok(false);
        };
        Ok(text.lines().any(|line| line_mentions(line, id)))
    }

    /// Parsed approval lines, in ledger order. Other lines are skipped.
    pub fn entries(&self) -> Result<Vec<LedgerEntry>> {
        Ok(self
            .store
            .read_ledger()?
            .map(|text| text.lines().filter_map(LedgerEntry::parse_line).collect())
            .unwrap_or_default())
    }
}

/// Approval lines match only in their id slot, so a message quoting another
/// id never counts. Other lines fall back to a whole-token scan.
fn line_mentions(line: &str, id: &str) -> bool {
    if let Some(entry) = LedgerEntry::parse_line(line) {
        return entry.id == id;
    }
    let needle = format!("id={id}");
    let mut start = 0;
    while let Some(pos) = line[start..].find(&needle) {
        let at = start + pos;
        let end = at + needle.len();
        let before_ok = line[..at]
            .chars()
            .next_back()
            .is_none_or(char::is_whitespace);
        let after_ok = line[end..].chars().next().is_none_or(char::is_whitespace);
        if before_ok && after_ok {
            return true;
        }
        start = at + 1;
    }
    false
}
