// SPDX-License-Identifier: PMPL-1.0-or-later
// Copyright (c) 2026 Jonathan D.A. Jewell (hyperpolymath) <jonathan.jewell@open.ac.uk>
//
// Core domain types for the envgate approval gate.

use std::fmt;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;
use zeroize::{Zeroize, ZeroizeOnDrop};

use crate::error::GateError;

/// Timestamp layout used on ledger lines and in listings (always UTC).
pub const LEDGER_TIME_FORMAT: &str = "%Y-%m-%d %H:%M:%S";

/// Unique identifier for an approval.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct ApprovalId(pub Uuid);

impl ApprovalId {
    pub fn new() -> Self {
        Self(Uuid::new_v4())
    }

    /// Parse a caller-supplied id.
    ///
    /// Anything that is not a UUID can never name a stored record, so it is
    /// reported as `NotFound` rather than as a format error.
    pub fn parse(raw: &str) -> Result<Self, GateError> {
        Uuid::parse_str(raw.trim())
            .map(Self)
            .map_err(|_| GateError::NotFound(raw.to_owned()))
    }
}

impl Default for ApprovalId {
    fn default() -> Self {
        Self::new()
    }
}

impl fmt::Display for ApprovalId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0.hyphenated())
    }
}

/// A PIN held in memory only for as long as an operation needs it.
///
/// The buffer is zeroised on drop and `Debug` never prints the contents.
#[derive(Clone, Zeroize, ZeroizeOnDrop)]
pub struct Pin(String);

impl Pin {
    pub fn new(pin: impl Into<String>) -> Self {
        Self(pin.into())
    }

    pub fn as_bytes(&self) -> &[u8] {
        self.0.as_bytes()
    }

    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }
}

impl PartialEq for Pin {
    fn eq(&self, other: &Self) -> bool {
        bytes_eq(self.0.as_bytes(), other.0.as_bytes())
    }
}

impl fmt::Debug for Pin {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str("Pin(<redacted>)")
    }
}

/// Length-revealing but otherwise branch-free byte comparison, used only for
/// the interactive "enter twice" check.
fn bytes_eq(a: &[u8], b: &[u8]) -> bool {
    if a.len() != b.len() {
        return false;
    }
    a.iter().zip(b).fold(0u8, |acc, (x, y)| acc | (x ^ y)) == 0
}

/// The signed portion of an approval.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ApprovalPayload {
    pub id: ApprovalId,
    /// Issue time in seconds since the Unix epoch.
    #[serde(rename = "ts")]
    pub issued_at: i64,
    pub message: String,
}

impl ApprovalPayload {
    pub fn new(id: ApprovalId, issued_at: DateTime<Utc>, message: impl Into<String>) -> Self {
        Self {
            id,
            issued_at: issued_at.timestamp(),
            message: message.into(),
        }
    }

    /// Issue time formatted the way the ledger records it.
    pub fn issued_at_display(&self) -> String {
        format_unix_time(self.issued_at)
    }
}

/// An approval payload plus its hex-encoded HMAC-SHA256 signature, exactly as
/// persisted in `<id>.approval`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ApprovalRecord {
    pub payload: ApprovalPayload,
    pub sig: String,
}

/// Render a Unix timestamp with [`LEDGER_TIME_FORMAT`]; out-of-range values
/// fall back to the epoch.
pub fn format_unix_time(secs: i64) -> String {
    DateTime::<Utc>::from_timestamp(secs, 0)
        .unwrap_or(DateTime::UNIX_EPOCH)
        .format(LEDGER_TIME_FORMAT)
        .to_string()
}

/// One line of the human-readable ledger.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct LedgerEntry {
    pub recorded_at: String,
    pub id: String,
    pub message: String,
}

impl LedgerEntry {
    pub fn for_payload(payload: &ApprovalPayload) -> Self {
        Self {
            recorded_at: payload.issued_at_display(),
            id: payload.id.to_string(),
            message: payload.message.clone(),
        }
    }

    /// Render the entry as a single ledger line, including the trailing
    /// newline. Line breaks inside the message are flattened so that one
    /// approval always occupies exactly one line.
    pub fn to_line(&self) -> String {
        let message: String = self
            .message
            .chars()
            .map(|c| if c == '\n' || c == '\r' { ' ' } else { c })
            .collect();
        format!(
            "- [{}] APPROVAL: id={} message={}\n",
            self.recorded_at, self.id, message
        )
    }

    /// Parse a line written by [`LedgerEntry::to_line`]. Returns `None` for
    /// anything else (headings, prose, hand-written notes).
    pub fn parse_line(line: &str) -> Option<Self> {
        let rest = line.trim_end().strip_prefix("- [")?;
        let (recorded_at, rest) = rest.split_once("] APPROVAL: id=")?;
        let (id, message) = match rest.split_once(' ') {
            Some((id, tail)) => (id, tail.strip_prefix("message=").unwrap_or(tail)),
            None => (rest, ""),
        };
        if id.is_empty() {
            return None;
        }
        Some(Self {
            recorded_at: recorded_at.to_owned(),
            id: id.to_owned(),
            message: message.to_owned(),
        })
    }
}

/// Verification strength requested by a gate consumer.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum GateMode {
    /// Record exists and the id is in the ledger.
    Existence,
    /// Signature recomputes under the supplied PIN, then ledger membership.
    Strict,
}

impl GateMode {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Existence => "existence",
            Self::Strict => "strict",
        }
    }
}

impl fmt::Display for GateMode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Why a gate said no.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum DenyReason {
    MissingApproval,
    MissingPin,
    NotFound(String),
    MalformedRecord(String),
    SignatureMismatch,
    NotInLedger(String),
    /// Storage or configuration trouble; still a denial.
    Unavailable(String),
}

impl fmt::Display for DenyReason {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let err: GateError = self.clone().into();
        write!(f, "{err}")
    }
}

impl From<GateError> for DenyReason {
    fn from(err: GateError) -> Self {
        match err {
            GateError::MissingApproval => Self::MissingApproval,
            GateError::MissingPin => Self::MissingPin,
            GateError::NotFound(id) => Self::NotFound(id),
            GateError::MalformedRecord(detail) => Self::MalformedRecord(detail),
            GateError::Serialization(e) => Self::MalformedRecord(e.to_string()),
            GateError::SignatureMismatch => Self::SignatureMismatch,
            GateError::NotInLedger(id) => Self::NotInLedger(id),
            GateError::VerificationUnavailable(detail) => Self::Unavailable(detail),
            other => Self::Unavailable(other.to_string()),
        }
    }
}

impl From<DenyReason> for GateError {
    fn from(reason: DenyReason) -> Self {
        match reason {
            DenyReason::MissingApproval => Self::MissingApproval,
            DenyReason::MissingPin => Self::MissingPin,
            DenyReason::NotFound(id) => Self::NotFound(id),
            DenyReason::MalformedRecord(detail) => Self::MalformedRecord(detail),
            DenyReason::SignatureMismatch => Self::SignatureMismatch,
            DenyReason::NotInLedger(id) => Self::NotInLedger(id),
            DenyReason::Unavailable(detail) => Self::VerificationUnavailable(detail),
        }
    }
}

/// Outcome of a verification. Never persisted by the verifier itself.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct GateDecision {
    pub granted: bool,
    pub reason: String,
    pub denial: Option<DenyReason>,
}

impl GateDecision {
    pub fn grant(reason: impl Into<String>) -> Self {
        Self {
            granted: true,
            reason: reason.into(),
            denial: None,
        }
    }

    pub fn deny(reason: DenyReason) -> Self {
        Self {
            granted: false,
            reason: reason.to_string(),
            denial: Some(reason),
        }
    }

    pub fn into_result(self) -> Result<(), GateError> {
        match self.denial {
            None if self.granted => Ok(()),
            Some(reason) => Err(reason.into()),
            None => Err(GateError::VerificationUnavailable(self.reason)),
        }
    }
}
