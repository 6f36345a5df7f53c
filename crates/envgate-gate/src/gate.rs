// SPDX-License-Identifier: PMPL-1.0-or-later
// Copyright (c) 2026 Jonathan D.A. Jewell (hyperpolymath) <jonathan.jewell@open.ac.uk>
//
// The gate consumer contract.
//
// Every privileged operation calls `Gate::authorize` before touching a
// sensitive resource and aborts on `Err`. A successful call returns an
// `Authorization` naming the approval, which the operation echoes into its
// own output. Every decision, granted or denied, goes to the decision log
// when one is attached.

use envgate_core::error::Result;
use envgate_core::types::{DenyReason, GateDecision, GateMode, Pin};
use envgate_security::{ApprovalStore, ApprovalVerifier, DecisionLog};
use tracing::{error, info, instrument, warn};

/// What a caller hands to a privileged operation.
#[derive(Debug, Clone, Default)]
pub struct GateRequest {
    pub approval_id: Option<String>,
    pub pin: Option<Pin>,
}

impl GateRequest {
    pub fn new(approval_id: Option<String>, pin: Option<Pin>) -> Self {
        Self { approval_id, pin }
    }

    pub fn approval(id: impl Into<String>) -> Self {
        Self {
            approval_id: Some(id.into()),
            pin: None,
        }
    }

    pub fn with_pin(mut self, pin: Pin) -> Self {
        self.pin = Some(pin);
        self
    }

    /// Strict when the caller supplied a PIN, existence otherwise. Used by
    /// consumers where either strength is acceptable.
    pub fn preferred_mode(&self) -> GateMode {
        if self.pin.is_some() {
            GateMode::Strict
        } else {
            GateMode::Existence
        }
    }

    fn approval_id(&self) -> Option<&str> {
        self.approval_id
            .as_deref()
            .map(str::trim)
            .filter(|id| !id.is_empty())
    }
}

/// Proof that an operation was allowed to proceed.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Authorization {
    pub operation: String,
    pub approval_id: String,
    pub mode: GateMode,
}

pub struct Gate<'a, S: ApprovalStore + ?Sized> {
    store: &'a S,
    decisions: Option<&'a DecisionLog>,
}

impl<'a, S: ApprovalStore + ?Sized> Gate<'a, S> {
    pub fn new(store: &'a S) -> Self {
        Self {
            store,
            decisions: None,
        }
    }

    pub fn with_decision_log(mut self, log: &'a DecisionLog) -> Self {
        self.decisions = Some(log);
        self
    }

    /// Decide whether `operation` may proceed.
    ///
    /// No approval id means `MissingApproval`; strict mode without a PIN means
    /// `MissingPin`. Otherwise the verifier's decision stands.
    #[instrument(skip_all, fields(operation = %operation, mode = %mode))]
    pub fn authorize(
        &self,
        operation: &str,
        mode: GateMode,
        request: &GateRequest,
    ) -> Result<Authorization> {
        let approval_id = request.approval_id();
        let decision = match approval_id {
            None => GateDecision::deny(DenyReason::MissingApproval),
            Some(id) => ApprovalVerifier::new(self.store).verify(mode, id, request.pin.as_ref()),
        };
        self.log(operation, approval_id, mode, &decision);

        match approval_id {
            Some(id) if decision.granted => {
                info!(approval_id = id, "operation authorised");
                Ok(Authorization {
                    operation: operation.to_owned(),
                    approval_id: id.to_owned(),
                    mode,
                })
            }
            _ => {
                warn!(reason = %decision.reason, "operation refused");
                decision.into_result()?;
                Err(DenyReason::MissingApproval.into())
            }
        }
    }

    fn log(&self, operation: &str, approval_id: Option<&str>, mode: GateMode, decision: &GateDecision) {
        let Some(log) = self.decisions else {
            return;
        };
        if let Err(e) = log.record(operation, approval_id, mode, decision) {
            error!(error = %e, "failed to record gate decision");
        }
    }
}
