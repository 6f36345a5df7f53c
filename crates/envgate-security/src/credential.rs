// SPDX-License-Identifier: PMPL-1.0-or-later
// Copyright (c) 2026 Jonathan D.A. Jewell (hyperpolymath) <jonathan.jewell@open.ac.uk>
//
// PIN credential — PBKDF2-HMAC-SHA256 over the PIN with a random salt.
//
// On-disk format: `salt (16 bytes) || derived key (32 bytes)`. The PIN itself
// is never written anywhere.

use std::num::NonZeroU32;

use envgate_core::error::{GateError, Result};
use envgate_core::types::Pin;
use ring::pbkdf2;
use ring::rand::{SecureRandom, SystemRandom};
use tracing::{debug, info, instrument, warn};

use crate::store::ApprovalStore;

pub const SALT_LEN: usize = 16;
pub const KEY_LEN: usize = 32;

/// Key-stretching work factor. Slow on purpose; do not lower.
pub const PBKDF2_ITERATIONS: u32 = 200_000;

fn iterations() -> NonZeroU32 {
    NonZeroU32::new(PBKDF2_ITERATIONS).unwrap_or(NonZeroU32::MIN)
}

/// Salt and derived key as persisted.
#[derive(Clone, PartialEq, Eq)]
pub struct CredentialRecord {
    pub salt: [u8; SALT_LEN],
    pub derived_key: [u8; KEY_LEN],
}

impl CredentialRecord {
    /// Derive a record for `pin` under a fresh random salt.
    pub fn derive(pin: &Pin) -> Result<Self> {
        let mut salt = [0u8; SALT_LEN];
        SystemRandom::new()
            .fill(&mut salt)
            .map_err(|_| GateError::Crypto("salt generation failed".into()))?;
        Ok(Self::derive_with_salt(pin, salt))
    }

    pub fn derive_with_salt(pin: &Pin, salt: [u8; SALT_LEN]) -> Self {
        let mut derived_key = [0u8; KEY_LEN];
        pbkdf2::derive(pbkdf2::PBKDF2_HMAC_SHA256, iterations(), &salt, pin.as_bytes(), &mut derived_key);
        Self { salt, derived_key }
    }

    /// Constant-time check of `pin` against this record.
    pub fn matches(&self, pin: &Pin) -> bool {
        pbkdf2::verify(
            pbkdf2::PBKDF2_HMAC_SHA256,
            iterations(),
            &self.salt,
            pin.as_bytes(),
            &self.derived_key,
        )
        .is_ok()
    }

    pub fn to_bytes(&self) -> Vec<u8> {
        let mut out = Vec::with_capacity(SALT_LEN + KEY_LEN);
        out.extend_from_slice(&self.salt);
        out.extend_from_slice(&self.derived_key);
        out
    }

    pub fn from_bytes(bytes: &[u8]) -> Result<Self> {
        if bytes.len() != SALT_LEN + KEY_LEN {
            return Err(GateError::MalformedCredential(format!(
                "expected {} bytes, found {}",
                SALT_LEN + KEY_LEN,
                bytes.len()
            )));
        }
        let mut salt = [0u8; SALT_LEN];
        let mut derived_key = [0u8; KEY_LEN];
        salt.copy_from_slice(&bytes[..SALT_LEN]);
        derived_key.copy_from_slice(&bytes[SALT_LEN..]);
        Ok(Self { salt, derived_key })
    }
}

impl std::fmt::Debug for CredentialRecord {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("CredentialRecord")
            .field("salt", &hex::encode(self.salt))
            .finish_non_exhaustive()
    }
}

/// The single PIN credential of a store.
pub struct CredentialStore<'s, S: ApprovalStore + ?Sized> {
    store: &'s S,
}

impl<'s, S: ApprovalStore + ?Sized> CredentialStore<'s, S> {
    pub fn new(store: &'s S) -> Self {
        Self { store }
    }

    pub fn is_configured(&self) -> Result<bool> {
        Ok(self.store.load_credential()?.is_some())
    }

    /// Set the PIN. An existing credential is only replaced when
    /// `confirm_overwrite` is true; otherwise `AlreadyExists`.
    #[instrument(skip(self, pin))]
    pub fn set_credential(&self, pin: &Pin, confirm_overwrite: bool) -> Result<()> {
        if pin.is_empty() {
            return Err(GateError::EmptyPin);
        }
        // Check and replace under one lock so concurrent callers serialise.
        let _lock = self.store.write_lock()?;
        if self.is_configured()? {
            if !confirm_overwrite {
                warn!("refusing to overwrite existing credential");
                return Err(GateError::AlreadyExists);
            }
            info!("overwriting existing credential");
        }

        let record = CredentialRecord::derive(pin)?;
        self.store.save_credential(&record.to_bytes())?;
        info!("credential set");
        Ok(())
    }

    /// Check `pin` against the stored credential.
    ///
    /// `Ok(false)` means wrong PIN; `Err(NotConfigured)` means no PIN was ever
    /// set.
    #[instrument(skip_all)]
    pub fn verify_credential(&self, pin: &Pin) -> Result<bool> {
        let bytes = self
            .store
            .load_credential()?
            .ok_or(GateError::NotConfigured)?;
        let record = CredentialRecord::from_bytes(&bytes)?;
        let ok = record.matches(pin);
        debug!(ok, "credential checked");
        Ok(ok)
    }
}
