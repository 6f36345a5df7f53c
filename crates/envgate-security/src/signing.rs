// SPDX-License-Identifier: PMPL-1.0-or-later
// Copyright (c) 2026 Jonathan D.A. Jewell (hyperpolymath) <jonathan.jewell@open.ac.uk>
//
// Approval signatures — HMAC-SHA256 over the canonical payload, keyed by the
// raw PIN bytes, never by the stored PBKDF2 key. Holding `pin.hash` alone is
// not enough to produce a valid signature.

use envgate_core::error::{GateError, Result};
use envgate_core::types::{ApprovalPayload, Pin};
use ring::hmac;
use serde_json::Value;

/// Deterministic JSON encoding: object keys sorted, no insignificant
/// whitespace. Independent of serde_json's map ordering features.
pub fn canonical_json(value: &Value) -> Result<Vec<u8>> {
    let mut out = Vec::new();
    write_canonical(value, &mut out)?;
    Ok(out)
}

fn write_canonical(value: &Value, out: &mut Vec<u8>) -> Result<()> {
    match value {
        Value::Object(map) => {
            let mut keys: Vec<&String> = map.keys().collect();
            keys.sort();
            out.push(b'{');
            for (i, key) in keys.into_iter().enumerate() {
                if i > 0 {
                    out.push(b',');
                }
                serde_json::to_writer(&mut *out, key)?;
                out.push(b':');
                write_canonical(&map[key.as_str()], out)?;
            }
            out.push(b'}');
        }
        Value::Array(items) => {
            out.push(b'[');
            for (i, item) in items.iter().enumerate() {
                if i > 0 {
                    out.push(b',');
                }
                write_canonical(item, out)?;
            }
            out.push(b']');
        }
        scalar => serde_json::to_writer(&mut *out, scalar)?,
    }
    Ok(())
}

fn key_for(pin: &Pin) -> hmac::Key {
    hmac::Key::new(hmac::HMAC_SHA256, pin.as_bytes())
}

/// Sign an arbitrary payload value; returns the lowercase hex tag.
pub fn sign_value(pin: &Pin, payload: &Value) -> Result<String> {
    let bytes = canonical_json(payload)?;
    Ok(hex::encode(hmac::sign(&key_for(pin), &bytes).as_ref()))
}

/// Sign a freshly minted payload.
pub fn sign_payload(pin: &Pin, payload: &ApprovalPayload) -> Result<String> {
    sign_value(pin, &serde_json::to_value(payload)?)
}

/// Recompute the tag over `payload` with `pin` and compare it to `sig_hex` in
/// constant time.
///
/// The payload is taken as raw JSON, not re-parsed into `ApprovalPayload`,
/// so an added or altered field anywhere invalidates the signature.
pub fn verify_signature(pin: &Pin, payload: &Value, sig_hex: &str) -> Result<()> {
    let tag = hex::decode(sig_hex.trim())
        .map_err(|_| GateError::MalformedRecord("signature is not hex".into()))?;
    let bytes = canonical_json(payload)?;
    hmac::verify(&key_for(pin), &bytes, &tag).map_err(|_| GateError::SignatureMismatch)
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::Utc;
    use envgate_core::types::ApprovalId;
    use serde_json::json;

    fn payload() -> ApprovalPayload {
        ApprovalPayload::new(ApprovalId::new(), Utc::now(), "Include secrets for backup")
    }

    #[test]
    fn canonical_json_sorts_keys() {
        let value = json!({ "ts": 1, "message": "m", "id": "x", "nested": { "b": [2, 1], "a": null } });
        let bytes = canonical_json(&value).unwrap();
        assert_eq!(
            String::from_utf8(bytes).unwrap(),
            r#"{"id":"x","message":"m","nested":{"a":null,"b":[2,1]},"ts":1}"#
        );
    }

    #[test]
    fn sign_and_verify() {
        let pin = Pin::new("1234");
        let p = payload();
        let sig = sign_payload(&pin, &p).unwrap();
        assert_eq!(sig.len(), 64);

        let value = serde_json::to_value(&p).unwrap();
        verify_signature(&pin, &value, &sig).unwrap();
    }

    #[test]
    fn wrong_pin_mismatches() {
        let p = payload();
        let sig = sign_payload(&Pin::new("1234"), &p).unwrap();
        let value = serde_json::to_value(&p).unwrap();
        assert!(matches!(
            verify_signature(&Pin::new("0000"), &value, &sig),
            Err(GateError::SignatureMismatch)
        ));
    }

    #[test]
    fn any_payload_mutation_mismatches() {
        let pin = Pin::new("1234");
        let p = payload();
        let sig = sign_payload(&pin, &p).unwrap();

        let mut changed = serde_json::to_value(&p).unwrap();
        changed["message"] = json!("Include secrets for everyone");
        assert!(verify_signature(&pin, &changed, &sig).is_err());

        let mut extra = serde_json::to_value(&p).unwrap();
        extra["scope"] = json!("all");
        assert!(verify_signature(&pin, &extra, &sig).is_err());
    }

    #[test]
    fn signature_is_not_keyed_by_the_credential_hash() {
        use crate::credential::{CredentialRecord, SALT_LEN};

        let pin = Pin::new("1234");
        let p = payload();
        let sig = sign_payload(&pin, &p).unwrap();
        let record = CredentialRecord::derive_with_salt(&pin, [9u8; SALT_LEN]);
        let as_pin = Pin::new(hex::encode(record.derived_key));
        let value = serde_json::to_value(&p).unwrap();
        assert!(verify_signature(&as_pin, &value, &sig).is_err());
    }

    #[test]
    fn non_hex_signature_is_malformed() {
        let value = serde_json::to_value(payload()).unwrap();
        assert!(matches!(
            verify_signature(&Pin::new("1234"), &value, "zz-not-hex"),
            Err(GateError::MalformedRecord(_))
        ));
    }
}
