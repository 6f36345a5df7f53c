// SPDX-License-Identifier: PMPL-1.0-or-later
// Copyright (c) 2026 Jonathan D.A. Jewell (hyperpolymath) <jonathan.jewell@open.ac.uk>
//
// Unified error types for envgate.

use thiserror::Error;

/// Top-level error type for all envgate operations.
///
/// None of the variants carry PIN material; messages are safe to print and
/// to log.
#[derive(Debug, Error)]
pub enum GateError {
    // -- Credential errors --
    #[error("no PIN is configured")]
    NotConfigured,

    #[error("invalid PIN")]
    InvalidPin,

    #[error("a PIN is already configured")]
    AlreadyExists,

    #[error("PIN must not be empty")]
    EmptyPin,

    #[error("PINs do not match")]
    PinMismatch,

    #[error("stored credential is malformed: {0}")]
    MalformedCredential(String),

    // -- Approval errors --
    #[error("approval message must not be empty")]
    EmptyMessage,

    #[error("approval {0} not found")]
    NotFound(String),

    #[error("approval record is malformed: {0}")]
    MalformedRecord(String),

    #[error("approval signature does not match")]
    SignatureMismatch,

    #[error("approval {0} is not recorded in the ledger")]
    NotInLedger(String),

    #[error("approval id {0} collides with an existing record")]
    IdCollision(String),

    // -- Gate errors --
    #[error("operation requires an approval id")]
    MissingApproval,

    #[error("operation requires the PIN")]
    MissingPin,

    #[error("approval verification unavailable: {0}")]
    VerificationUnavailable(String),

    #[error("{0}")]
    Consumer(String),

    // -- Infrastructure --
    #[error("cryptographic operation failed: {0}")]
    Crypto(String),

    #[error("database error: {0}")]
    Database(String),

    #[error("configuration error: {0}")]
    Config(String),

    #[error("file I/O error: {0}")]
    Io(#[from] std::io::Error),

    #[error("serialization error: {0}")]
    Serialization(#[from] serde_json::Error),
}

/// Alias used throughout the codebase.
pub type Result<T> = std::result::Result<T, GateError>;
