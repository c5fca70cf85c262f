// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! The approval registry (C5): idempotent decision recording and
//! fingerprint-based coalescing of duplicate inbound approval requests.

use chrono::Utc;
use serde_json::Value;
use sha2::{Digest, Sha256};

use crate::domain::{Approval, ApprovalDecision, ApprovalDecisionKind, ApprovalKind};
use crate::error::BridgeError;
use crate::store::Store;

/// The result of recording a decision: either this call was the one that
/// took effect, or an earlier call already recorded one.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RecordOutcome {
    Submitted,
    AlreadySubmitted,
}

/// Compute the dedup fingerprint over `(turnId, itemId, command, cwd)`.
/// Coalescing requires all four fields to be present; any missing field
/// disables coalescing for that request (return `None`), never a looser
/// or stricter key.
pub fn fingerprint(turn_id: Option<&str>, item_id: Option<&str>, command: Option<&str>, cwd: Option<&str>) -> Option<String> {
    let (turn_id, item_id, command, cwd) = (turn_id?, item_id?, command?, cwd?);
    if turn_id.is_empty() || item_id.is_empty() || command.is_empty() || cwd.is_empty() {
        return None;
    }
    let mut hasher = Sha256::new();
    hasher.update(turn_id.as_bytes());
    hasher.update(b"\0");
    hasher.update(item_id.as_bytes());
    hasher.update(b"\0");
    hasher.update(command.as_bytes());
    hasher.update(b"\0");
    hasher.update(cwd.as_bytes());
    Some(format!("{:x}", hasher.finalize()))
}

/// Normalize legacy spellings (e.g. `readOnly` vs `read-only`) for sandbox
/// and approval-policy values into the canonical kebab-case form this
/// codebase's agent protocol speaks on the wire. Defaults invalid input to
/// the safe default.
pub fn normalize_sandbox_value(raw: &str) -> String {
    match raw {
        "read-only" | "readOnly" | "read_only" => "read-only".to_string(),
        "workspace-write" | "workspaceWrite" | "workspace_write" => "workspace-write".to_string(),
        "danger-full-access" | "dangerFullAccess" | "danger_full_access" => "danger-full-access".to_string(),
        _ => "workspace-write".to_string(),
    }
}

pub fn normalize_approval_policy_value(raw: &str) -> String {
    match raw {
        "untrusted" => "untrusted".to_string(),
        "on-failure" | "onFailure" | "on_failure" => "on-failure".to_string(),
        "on-request" | "onRequest" | "on_request" => "on-request".to_string(),
        "never" => "never".to_string(),
        "unless-trusted" | "unlessTrusted" | "unless_trusted" => "unless-trusted".to_string(),
        _ => "on-request".to_string(),
    }
}

/// Parse a decision request body, accepting both camelCase and snake_case
/// field names.
pub fn parse_decision_kind(raw: &Value) -> Result<ApprovalDecisionKind, BridgeError> {
    let decision = raw
        .get("decision")
        .and_then(Value::as_str)
        .ok_or_else(|| BridgeError::bad_request("missing decision"))?;
    match decision {
        "accept" => Ok(ApprovalDecisionKind::Accept),
        "accept_for_session" | "acceptForSession" => Ok(ApprovalDecisionKind::AcceptForSession),
        "accept_with_execpolicy_amendment" | "acceptWithExecpolicyAmendment" => {
            Ok(ApprovalDecisionKind::AcceptWithExecpolicyAmendment)
        }
        "decline" => Ok(ApprovalDecisionKind::Decline),
        "cancel" => Ok(ApprovalDecisionKind::Cancel),
        other => Err(BridgeError::bad_request(format!("unknown decision: {other}"))),
    }
}

/// The approval registry itself: a thin layer over [`Store`] that enforces
/// idempotence and fingerprint coalescing. The orchestrator is responsible
/// for driving the job state machine off the outcome of `record`.
pub struct ApprovalRegistry {
    store: Store,
}

impl ApprovalRegistry {
    pub fn new(store: Store) -> Self {
        Self { store }
    }

    /// Register an inbound approval request from the agent. If an
    /// unresolved approval with the same fingerprint already exists, its
    /// `request_id` is updated to the latest one and the existing approval
    /// is returned with `coalesced = true` — the daemon must not emit a
    /// second `approval.required` envelope for it.
    pub async fn open(
        &self,
        id_factory: impl FnOnce() -> String,
        job_id: &str,
        thread_id: &str,
        kind: ApprovalKind,
        payload: Value,
        request_id: i64,
        fingerprint: Option<String>,
    ) -> Result<(Approval, bool), BridgeError> {
        if let Some(fp) = fingerprint.as_deref() {
            if let Some(existing) = self.store.find_open_approval_by_fingerprint(job_id, fp).await? {
                self.store.update_approval_request_id(&existing.id, request_id).await?;
                let mut refreshed = existing;
                refreshed.request_id = request_id;
                return Ok((refreshed, true));
            }
        }

        let id = id_factory();
        let approval = self
            .store
            .create_approval(&id, job_id, thread_id, kind, &payload, request_id, fingerprint.as_deref())
            .await?;
        Ok((approval, false))
    }

    /// Record a decision. Idempotent: if the approval is already resolved,
    /// returns `AlreadySubmitted` with the first decision and never touches
    /// the agent transport.
    pub async fn record(
        &self,
        approval_id: &str,
        kind: ApprovalDecisionKind,
        amendment: Option<Value>,
        decline_reason: Option<String>,
    ) -> Result<(Approval, RecordOutcome), BridgeError> {
        let decision = ApprovalDecision { kind, amendment, decline_reason, decided_at: Utc::now() };
        let wrote = self.store.record_decision_if_unresolved(approval_id, &decision).await?;
        let approval = self.store.get_approval(approval_id).await?;
        let outcome = if wrote { RecordOutcome::Submitted } else { RecordOutcome::AlreadySubmitted };
        Ok((approval, outcome))
    }

    pub async fn get(&self, approval_id: &str) -> Result<Approval, BridgeError> {
        self.store.get_approval(approval_id).await
    }

    /// All still-unresolved approvals for a job.
    pub async fn open_for_job(&self, job_id: &str) -> Result<Vec<Approval>, BridgeError> {
        self.store.find_open_approvals_for_job(job_id).await
    }
}

#[cfg(test)]
#[path = "approval_tests.rs"]
mod tests;
