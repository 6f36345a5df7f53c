// SPDX-License-Identifier: PMPL-1.0-or-later
// Copyright (c) 2026 Jonathan D.A. Jewell (hyperpolymath) <jonathan.jewell@open.ac.uk>

//! envgate-security — the approval gate itself.
//!
//! A PIN is stored only as a salted PBKDF2 hash. Approvals are uniquely
//! identified payloads signed with HMAC-SHA256 under the raw PIN, persisted one
//! file per approval and recorded on an append-only ledger line. Verification
//! is fail-closed and comes in two strengths: existence (record + ledger) and
//! strict (signature under the supplied PIN, then ledger).
//!
//! All persistent state goes through [`ApprovalStore`]; [`FsStore`] is the
//! production layout and [`MemoryStore`] the test double.

pub mod credential;
pub mod decisions;
pub mod flock;
pub mod integrity;
pub mod issuer;
pub mod ledger;
pub mod signing;
pub mod store;
pub mod verifier;

// PUBLIC API: Re-export gate primitives
pub use credential::CredentialStore;
pub use decisions::{DecisionEntry, DecisionLog};
pub use integrity::{hash_bytes, hash_file};
pub use issuer::ApprovalIssuer;
pub use ledger::Ledger;
pub use store::{ApprovalStore, FsStore, MemoryStore, StoredRecord};
pub use verifier::ApprovalVerifier;
