// SPDX-License-Identifier: PMPL-1.0-or-later
// Copyright (c) 2026 Jonathan D.A. Jewell (hyperpolymath) <jonathan.jewell@open.ac.uk>
//
// Human-readable error messages and process exit codes.
//
// Every error maps to a one-line message, a suggestion, and a distinct
// non-zero exit code. Scripts that wrap envgate only look at the exit code.

use crate::error::GateError;

/// Exit code for a verification denial (missing, malformed, bad signature,
/// not in the ledger, no approval supplied).
pub const EXIT_DENIED: i32 = 2;
pub const EXIT_NOT_CONFIGURED: i32 = 3;
pub const EXIT_INVALID_PIN: i32 = 4;
pub const EXIT_ALREADY_EXISTS: i32 = 5;
pub const EXIT_BAD_INPUT: i32 = 6;
pub const EXIT_ID_COLLISION: i32 = 7;
pub const EXIT_CONFIG: i32 = 8;
pub const EXIT_OTHER: i32 = 1;

/// A human-readable error with plain message and actionable suggestion.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct HumanError {
    /// One-line summary.
    pub message: String,
    /// What the user should try next.
    pub suggestion: String,
    /// Process exit code.
    pub exit_code: i32,
}

impl HumanError {
    fn new(message: impl Into<String>, suggestion: impl Into<String>, exit_code: i32) -> Self {
        Self {
            message: message.into(),
            suggestion: suggestion.into(),
            exit_code,
        }
    }
}

/// Convert a `GateError` into a `HumanError`.
pub fn humanize_error(err: &GateError) -> HumanError {
    match err {
        // -- Credential errors --
        GateError::NotConfigured => HumanError::new(
            "No PIN is set.",
            "Run `envgate set-pin` first.",
            EXIT_NOT_CONFIGURED,
        ),

        GateError::InvalidPin => HumanError::new(
            "Invalid PIN.",
            "Check the PIN and try again. Nothing was recorded.",
            EXIT_INVALID_PIN,
        ),

        GateError::AlreadyExists => HumanError::new(
            "A PIN already exists.",
            "Re-run `envgate set-pin` and type YES when asked to overwrite.",
            EXIT_ALREADY_EXISTS,
        ),

        GateError::EmptyPin => HumanError::new(
            "The PIN must not be empty.",
            "Choose a non-empty PIN.",
            EXIT_BAD_INPUT,
        ),

        GateError::PinMismatch => HumanError::new(
            "PINs do not match.",
            "Enter the same PIN at both prompts.",
            EXIT_BAD_INPUT,
        ),

        GateError::MalformedCredential(detail) => HumanError::new(
            "The stored PIN hash is damaged.",
            format!("Reset it with `envgate set-pin`. ({detail})"),
            EXIT_OTHER,
        ),

        // -- Approval errors --
        GateError::EmptyMessage => HumanError::new(
            "An approval needs a message.",
            "Pass --message describing the action being approved.",
            EXIT_BAD_INPUT,
        ),

        GateError::NotFound(id) => HumanError::new(
            format!("Approval {id} not found."),
            "Check the id printed by `envgate approve`, or run `envgate list`.",
            EXIT_DENIED,
        ),

        GateError::MalformedRecord(detail) => HumanError::new(
            "The approval record is unreadable.",
            format!("Issue a new approval. ({detail})"),
            EXIT_DENIED,
        ),

        GateError::SignatureMismatch => HumanError::new(
            "Signature mismatch: wrong PIN or altered approval.",
            "Check the PIN. If it is correct, the approval record was modified.",
            EXIT_DENIED,
        ),

        GateError::NotInLedger(id) => HumanError::new(
            format!("Approval {id} is not recorded in the ledger."),
            "Only approvals issued by `envgate approve` are accepted.",
            EXIT_DENIED,
        ),

        GateError::IdCollision(id) => HumanError::new(
            format!("Generated approval id {id} already exists."),
            "Nothing was overwritten. Run the command again.",
            EXIT_ID_COLLISION,
        ),

        // -- Gate errors --
        GateError::MissingApproval => HumanError::new(
            "This operation requires an approval.",
            "Create one with `envgate approve --message ...` and pass --approval-id.",
            EXIT_DENIED,
        ),

        GateError::MissingPin => HumanError::new(
            "This operation requires the PIN.",
            "Pass --pin or run interactively to be prompted.",
            EXIT_DENIED,
        ),

        GateError::VerificationUnavailable(detail) => HumanError::new(
            "The approval could not be verified.",
            format!("Check the approval store is readable. ({detail})"),
            EXIT_DENIED,
        ),

        GateError::Consumer(detail) => HumanError::new(detail.clone(), "", EXIT_OTHER),

        // -- Infrastructure --
        GateError::Config(detail) => HumanError::new(
            "The configuration file is invalid.",
            format!("Fix or remove it. ({detail})"),
            EXIT_CONFIG,
        ),

        GateError::Crypto(detail) => HumanError::new(
            "A cryptographic operation failed.",
            format!("Try again. ({detail})"),
            EXIT_OTHER,
        ),

        GateError::Database(detail) => HumanError::new(
            "The decision log could not be updated.",
            format!("Check the database file permissions. ({detail})"),
            EXIT_OTHER,
        ),

        GateError::Io(e) => HumanError::new(
            "A file could not be read or written.",
            format!("Check permissions on the project directory. ({e})"),
            EXIT_OTHER,
        ),

        GateError::Serialization(e) => HumanError::new(
            "Data could not be encoded or decoded.",
            format!("({e})"),
            EXIT_OTHER,
        ),
    }
}
