// SPDX-License-Identifier: PMPL-1.0-or-later
// Copyright (c) 2026 Jonathan D.A. Jewell (hyperpolymath) <jonathan.jewell@open.ac.uk>
//
// Approval issuer — PIN check, mint, sign, persist, record in the ledger.
//
// A crash after the record is written but before the ledger append leaves an
// orphan record. Every verification mode denies orphans, so the failure is
// closed; it is not retried or repaired here.

use chrono::Utc;
use envgate_core::error::{GateError, Result};
use envgate_core::types::{ApprovalId, ApprovalPayload, ApprovalRecord, LedgerEntry, Pin};
use tracing::{info, instrument, warn};

use crate::credential::CredentialStore;
use crate::ledger::Ledger;
use crate::signing;
use crate::store::ApprovalStore;

pub struct ApprovalIssuer<'s, S: ApprovalStore + ?Sized> {
    store: &'s S,
}

impl<'s, S: ApprovalStore + ?Sized> ApprovalIssuer<'s, S> {
    pub fn new(store: &'s S) -> Self {
        Self { store }
    }

    /// Issue a new approval for `message`.
    ///
    /// Nothing is written unless the PIN verifies. An id that already names a
    /// stored record fails with `IdCollision`; the existing record is left
    /// untouched and no ledger entry is added.
    pub fn issue(&self, pin: &Pin, message: &str) -> Result<ApprovalRecord> {
        self.issue_with_id(pin, message, ApprovalId::new())
    }

    #[instrument(skip(self, pin, message), fields(%id))]
    pub(crate) fn issue_with_id(
        &self,
        pin: &Pin,
        message: &str,
        id: ApprovalId,
    ) -> Result<ApprovalRecord> {
        if message.trim().is_empty() {
            return Err(GateError::EmptyMessage);
        }
        if !CredentialStore::new(self.store).verify_credential(pin)? {
            warn!("approval refused: invalid PIN");
            return Err(GateError::InvalidPin);
        }

        let payload = ApprovalPayload::new(id, Utc::now(), message);
        let sig = signing::sign_payload(pin, &payload)?;
        let record = ApprovalRecord { payload, sig };
        let bytes = serde_json::to_vec_pretty(&record)?;
        let entry = LedgerEntry::for_payload(&record.payload);

        let _lock = self.store.write_lock()?;
        self.store.create_record(&id, &bytes)?;
        Ledger::new(self.store).append(&entry)?;

        info!("approval issued");
        Ok(record)
    }
}
