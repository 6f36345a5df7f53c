// SPDX-License-Identifier: PMPL-1.0-or-later
// Copyright (c) 2026 Jonathan D.A. Jewell (hyperpolymath) <jonathan.jewell@open.ac.uk>
//
// Approval verifier — fail-closed grant/deny over a persisted record and the
// ledger.
//
// Two strengths:
//   existence  record exists and parses, id is in the ledger
//   strict     signature recomputes under the supplied PIN, THEN ledger
//
// Both return a `GateDecision`; no failure path escapes as an error or a
// panic. Anything ambiguous is a denial.
//
// Trust boundary: anyone who can write the ledger can forge membership, and
// strict mode trusts whoever presents the PIN at verification time, whether
// or not they issued the approval.

use envgate_core::error::{GateError, Result};
use envgate_core::types::{ApprovalId, DenyReason, GateDecision, GateMode, Pin};
use serde_json::Value;
use tracing::{debug, instrument, warn};

use crate::ledger::Ledger;
use crate::signing;
use crate::store::ApprovalStore;

/// A record loaded for verification, kept as raw JSON so the signature is
/// checked over exactly what is on disk.
struct LoadedRecord {
    id: ApprovalId,
    payload: Value,
    sig: String,
}

pub struct ApprovalVerifier<'s, S: ApprovalStore + ?Sized> {
    store: &'s S,
}

impl<'s, S: ApprovalStore + ?Sized> ApprovalVerifier<'s, S> {
    pub fn new(store: &'s S) -> Self {
        Self { store }
    }

    /// Dispatch on `mode`. Strict mode without a PIN is denied.
    pub fn verify(&self, mode: GateMode, id: &str, pin: Option<&Pin>) -> GateDecision {
        match (mode, pin) {
            (GateMode::Existence, _) => self.verify_exists(id),
            (GateMode::Strict, Some(pin)) => self.verify_with_pin(id, pin),
            (GateMode::Strict, None) => GateDecision::deny(DenyReason::MissingPin),
        }
    }

    /// Existence mode. Proves that someone once obtained this approval, not
    /// that the caller holds the PIN.
    #[instrument(skip(self))]
    pub fn verify_exists(&self, id: &str) -> GateDecision {
        let outcome = self.load(id).and_then(|record| self.require_ledger(&record));
        conclude(outcome, "approval exists and is recorded")
    }

    /// Strict mode: signature first, ledger second, both required.
    #[instrument(skip(self, pin))]
    pub fn verify_with_pin(&self, id: &str, pin: &Pin) -> GateDecision {
        let outcome = self.load(id).and_then(|record| {
            signing::verify_signature(pin, &record.payload, &record.sig)?;
            debug!("signature verified");
            self.require_ledger(&record)
        });
        conclude(outcome, "signature verified with provided PIN and approval is recorded")
    }

    fn load(&self, raw_id: &str) -> Result<LoadedRecord> {
        let id = ApprovalId::parse(raw_id)?;
        let bytes = self
            .store
            .load_record(&id)?
            .ok_or_else(|| GateError::NotFound(id.to_string()))?;

        let mut value: Value = serde_json::from_slice(&bytes)
            .map_err(|e| GateError::MalformedRecord(format!("invalid JSON: {e}")))?;
        let Some(object) = value.as_object_mut() else {
            return Err(GateError::MalformedRecord("record is not a JSON object".into()));
        };

        let payload = match object.remove("payload") {
            Some(payload @ Value::Object(_)) => payload,
            Some(_) => return Err(GateError::MalformedRecord("payload is not an object".into())),
            None => return Err(GateError::MalformedRecord("missing payload".into())),
        };
        let sig = match object.get("sig").and_then(Value::as_str) {
            Some(sig) if !sig.trim().is_empty() => sig.to_owned(),
            _ => return Err(GateError::MalformedRecord("missing signature".into())),
        };

        let payload_id = payload.get("id").and_then(Value::as_str);
        if payload_id.and_then(|p| ApprovalId::parse(p).ok()) != Some(id) {
            return Err(GateError::MalformedRecord(
                "payload id does not match the record name".into(),
            ));
        }

        Ok(LoadedRecord { id, payload, sig })
    }

    fn require_ledger(&self, record: &LoadedRecord) -> Result<()> {
        let id = record.id.to_string();
        if Ledger::new(self.store).contains(&id)? {
            Ok(())
        } else {
            Err(GateError::NotInLedger(id))
        }
    }
}

fn conclude(outcome: Result<()>, granted: &str) -> GateDecision {
    match outcome {
        Ok(()) => {
            debug!("approval granted");
            GateDecision::grant(granted)
        }
        Err(err) => {
            let reason = DenyReason::from(err);
            warn!(%reason, "approval denied");
            GateDecision::deny(reason)
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::credential::CredentialStore;
    use crate::issuer::ApprovalIssuer;
    use crate::store::{FsStore, MemoryStore};
    use envgate_core::types::ApprovalRecord;

    const PIN: &str = "1234";

    fn issued(store: &MemoryStore) -> ApprovalRecord {
        CredentialStore::new(store)
            .set_credential(&Pin::new(PIN), false)
            .unwrap();
        ApprovalIssuer::new(store)
            .issue(&Pin::new(PIN), "test")
            .unwrap()
    }

    #[test]
    fn fresh_approval_passes_both_modes() {
        let store = MemoryStore::new();
        let id = issued(&store).payload.id.to_string();
        let verifier = ApprovalVerifier::new(&store);

        assert!(verifier.verify_exists(&id).granted);
        assert!(verifier.verify_with_pin(&id, &Pin::new(PIN)).granted);
    }

    #[test]
    fn wrong_pin_denied_but_existence_holds() {
        let store = MemoryStore::new();
        let id = issued(&store).payload.id.to_string();
        let verifier = ApprovalVerifier::new(&store);

        let decision = verifier.verify_with_pin(&id, &Pin::new("0000"));
        assert!(!decision.granted);
        assert_eq!(decision.denial, Some(DenyReason::SignatureMismatch));
        assert!(verifier.verify_exists(&id).granted);
    }

    #[test]
    fn tampered_payload_fails_strict_only() {
        let store = MemoryStore::new();
        let record = issued(&store);
        let id = record.payload.id;

        let mut value = serde_json::to_value(&record).unwrap();
        value["payload"]["message"] = Value::from("something else");
        store.replace_record(&id, &serde_json::to_vec(&value).unwrap());

        let verifier = ApprovalVerifier::new(&store);
        let strict = verifier.verify_with_pin(&id.to_string(), &Pin::new(PIN));
        assert_eq!(strict.denial, Some(DenyReason::SignatureMismatch));
        assert!(verifier.verify_exists(&id.to_string()).granted);
    }

    #[test]
    fn removed_ledger_line_fails_both_modes() {
        let store = MemoryStore::new();
        let keep = issued(&store).payload.id;
        let dropped = ApprovalIssuer::new(&store)
            .issue(&Pin::new(PIN), "second")
            .unwrap()
            .payload
            .id;

        let text = store.read_ledger().unwrap().unwrap();
        let pruned: String = text
            .lines()
            .filter(|l| !l.contains(&dropped.to_string()))
            .map(|l| format!("{l}\n"))
            .collect();
        store.write_ledger(&pruned).unwrap();

        let verifier = ApprovalVerifier::new(&store);
        let id = dropped.to_string();
        assert_eq!(
            verifier.verify_exists(&id).denial,
            Some(DenyReason::NotInLedger(id.clone()))
        );
        assert_eq!(
            verifier.verify_with_pin(&id, &Pin::new(PIN)).denial,
            Some(DenyReason::NotInLedger(id.clone()))
        );
        assert!(verifier.verify_with_pin(&keep.to_string(), &Pin::new(PIN)).granted);
    }

    #[test]
    fn ledger_only_is_not_enough() {
        let store = MemoryStore::new();
        let forged = ApprovalId::new();
        store
            .write_ledger(&format!("- [TEST] APPROVAL: id={forged} message=test\n"))
            .unwrap();

        let decision = ApprovalVerifier::new(&store).verify_exists(&forged.to_string());
        assert_eq!(decision.denial, Some(DenyReason::NotFound(forged.to_string())));
    }

    #[test]
    fn signature_checked_before_ledger() {
        let store = MemoryStore::new();
        let id = issued(&store).payload.id;
        store.write_ledger("").unwrap();

        // Wrong PIN and missing ledger line: the signature failure wins.
        let decision = ApprovalVerifier::new(&store).verify_with_pin(&id.to_string(), &Pin::new("9"));
        assert_eq!(decision.denial, Some(DenyReason::SignatureMismatch));
    }

    #[test]
    fn malformed_records_deny() {
        let store = MemoryStore::new();
        let record = issued(&store);
        let id = record.payload.id;
        let verifier = ApprovalVerifier::new(&store);
        let pin = Pin::new(PIN);

        let cases: Vec<Vec<u8>> = vec![
            b"not json".to_vec(),
            b"[1,2,3]".to_vec(),
            serde_json::to_vec(&serde_json::json!({ "sig": record.sig })).unwrap(),
            serde_json::to_vec(&serde_json::json!({ "payload": record.payload })).unwrap(),
            serde_json::to_vec(&serde_json::json!({ "payload": record.payload, "sig": "" })).unwrap(),
            serde_json::to_vec(&serde_json::json!({ "payload": "flat", "sig": record.sig })).unwrap(),
            serde_json::to_vec(&serde_json::json!({ "payload": record.payload, "sig": "not-hex" })).unwrap(),
        ];
        for bytes in cases {
            store.replace_record(&id, &bytes);
            let strict = verifier.verify_with_pin(&id.to_string(), &pin);
            assert!(!strict.granted);
            assert!(matches!(strict.denial, Some(DenyReason::MalformedRecord(_))), "{strict:?}");
        }
    }

    #[test]
    fn record_under_foreign_name_is_malformed() {
        let store = MemoryStore::new();
        let record = issued(&store);
        let other = ApprovalId::new();
        store.replace_record(&other, &serde_json::to_vec(&record).unwrap());
        store
            .write_ledger(&format!("- [x] APPROVAL: id={other} message=copy\n"))
            .unwrap();

        let decision = ApprovalVerifier::new(&store).verify_with_pin(&other.to_string(), &Pin::new(PIN));
        assert!(matches!(decision.denial, Some(DenyReason::MalformedRecord(_))));
    }

    #[test]
    fn unknown_and_garbage_ids_deny() {
        let store = MemoryStore::new();
        issued(&store);
        let verifier = ApprovalVerifier::new(&store);

        let unknown = ApprovalId::new().to_string();
        for id in ["", "not-a-uuid", "../../etc/passwd", unknown.as_str()] {
            let decision = verifier.verify_exists(id);
            assert!(matches!(decision.denial, Some(DenyReason::NotFound(_))), "{id}");
        }
    }

    #[test]
    fn orphan_record_is_denied() {
        let store = MemoryStore::new();
        let record = issued(&store);
        store.write_ledger("").unwrap();
        let verifier = ApprovalVerifier::new(&store);
        assert!(!verifier.verify_exists(&record.payload.id.to_string()).granted);
    }

    #[test]
    fn strict_dispatch_without_pin_denies() {
        let store = MemoryStore::new();
        let id = issued(&store).payload.id.to_string();
        let decision = ApprovalVerifier::new(&store).verify(GateMode::Strict, &id, None);
        assert_eq!(decision.denial, Some(DenyReason::MissingPin));
    }

    #[test]
    fn approvals_survive_reopening_the_store() {
        let dir = tempfile::tempdir().unwrap();
        let id = {
            let store = FsStore::with_root(dir.path());
            CredentialStore::new(&store)
                .set_credential(&Pin::new(PIN), false)
                .unwrap();
            ApprovalIssuer::new(&store)
                .issue(&Pin::new(PIN), "test")
                .unwrap()
                .payload
                .id
        };

        let reopened = FsStore::with_root(dir.path());
        let verifier = ApprovalVerifier::new(&reopened);
        assert!(verifier.verify_exists(&id.to_string()).granted);
        assert!(verifier.verify_with_pin(&id.to_string(), &Pin::new(PIN)).granted);
        assert!(!verifier.verify_with_pin(&id.to_string(), &Pin::new("0000")).granted);
    }

    #[test]
    fn tampering_on_disk_is_detected() {
        let dir = tempfile::tempdir().unwrap();
        let store = FsStore::with_root(dir.path());
        CredentialStore::new(&store)
            .set_credential(&Pin::new(PIN), false)
            .unwrap();
        let id = ApprovalIssuer::new(&store)
            .issue(&Pin::new(PIN), "backup")
            .unwrap()
            .payload
            .id;

        let path = store.record_path(&id);
        let text = std::fs::read_to_string(&path).unwrap();
        std::fs::write(&path, text.replace("backup", "export")).unwrap();

        let verifier = ApprovalVerifier::new(&store);
        assert!(!verifier.verify_with_pin(&id.to_string(), &Pin::new(PIN)).granted);
        assert!(verifier.verify_exists(&id.to_string()).granted);

        std::fs::remove_file(store.ledger_path()).unwrap();
        assert!(!verifier.verify_exists(&id.to_string()).granted);
    }
}
