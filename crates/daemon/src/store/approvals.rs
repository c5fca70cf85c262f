// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

use chrono::Utc;

use crate::domain::{Approval, ApprovalDecision, ApprovalDecisionKind, ApprovalKind};
use crate::error::{BridgeError, ErrorCode};

use super::Store;

#[derive(Debug, Clone, sqlx::FromRow)]
pub struct ApprovalRow {
    pub id: String,
    pub job_id: String,
    pub thread_id: String,
    pub kind: String,
    pub payload: String,
    pub decision: Option<String>,
    pub decision_at: Option<chrono::DateTime<Utc>>,
    pub request_id: i64,
    pub fingerprint: Option<String>,
}

impl TryFrom<ApprovalRow> for Approval {
    type Error = BridgeError;

    fn try_from(row: ApprovalRow) -> Result<Self, Self::Error> {
        let kind = match row.kind.as_str() {
            "command" => ApprovalKind::Command,
            "file_change" => ApprovalKind::FileChange,
            other => return Err(BridgeError::internal(format!("unknown approval kind: {other}"))),
        };
        let payload = serde_json::from_str(&row.payload).map_err(|e| BridgeError::internal(e.to_string()))?;
        let decision = match (&row.decision, row.decision_at) {
            (Some(raw), Some(at)) => Some(parse_decision(raw, at)?),
            _ => None,
        };
        Ok(Approval {
            id: row.id,
            job_id: row.job_id,
            thread_id: row.thread_id,
            kind,
            payload,
            decision,
            request_id: row.request_id,
            fingerprint: row.fingerprint,
        })
    }
}

fn parse_decision(raw: &str, decided_at: chrono::DateTime<Utc>) -> Result<ApprovalDecision, BridgeError> {
    let value: serde_json::Value = serde_json::from_str(raw).map_err(|e| BridgeError::internal(e.to_string()))?;
    let kind_str = value.get("kind").and_then(|v| v.as_str()).unwrap_or_default();
    let kind = match kind_str {
        "accept" => ApprovalDecisionKind::Accept,
        "accept_for_session" => ApprovalDecisionKind::AcceptForSession,
        "accept_with_execpolicy_amendment" => ApprovalDecisionKind::AcceptWithExecpolicyAmendment,
        "decline" => ApprovalDecisionKind::Decline,
        "cancel" => ApprovalDecisionKind::Cancel,
        "timeout" => ApprovalDecisionKind::Timeout,
        other => return Err(BridgeError::internal(format!("unknown decision kind in store: {other}"))),
    };
    Ok(ApprovalDecision {
        kind,
        amendment: value.get("amendment").cloned(),
        decline_reason: value.get("declineReason").and_then(|v| v.as_str()).map(str::to_string),
        decided_at,
    })
}

fn kind_str(kind: ApprovalKind) -> &'static str {
    match kind {
        ApprovalKind::Command => "command",
        ApprovalKind::FileChange => "file_change",
    }
}

fn decision_kind_str(kind: ApprovalDecisionKind) -> &'static str {
    match kind {
        ApprovalDecisionKind::Accept => "accept",
        ApprovalDecisionKind::AcceptForSession => "accept_for_session",
        ApprovalDecisionKind::AcceptWithExecpolicyAmendment => "accept_with_execpolicy_amendment",
        ApprovalDecisionKind::Decline => "decline",
        ApprovalDecisionKind::Cancel => "cancel",
        ApprovalDecisionKind::Timeout => "timeout",
    }
}

impl Store {
    pub async fn create_approval(
        &self,
        id: &str,
        job_id: &str,
        thread_id: &str,
        kind: ApprovalKind,
        payload: &serde_json::Value,
        request_id: i64,
        fingerprint: Option<&str>,
    ) -> Result<Approval, BridgeError> {
        let payload_text = serde_json::to_string(payload).map_err(|e| BridgeError::internal(e.to_string()))?;
        sqlx::query(
            "INSERT INTO approvals (id, job_id, thread_id, kind, payload, request_id, fingerprint)
             VALUES (?, ?, ?, ?, ?, ?, ?)",
        )
        .bind(id)
        .bind(job_id)
        .bind(thread_id)
        .bind(kind_str(kind))
        .bind(&payload_text)
        .bind(request_id)
        .bind(fingerprint)
        .execute(self.writer())
        .await
        .map_err(|e| BridgeError::internal(e.to_string()))?;

        self.get_approval(id).await
    }

    pub async fn get_approval(&self, id: &str) -> Result<Approval, BridgeError> {
        let row: ApprovalRow = sqlx::query_as("SELECT * FROM approvals WHERE id = ?")
            .bind(id)
            .fetch_one(self.reader())
            .await
            .map_err(|e| super::map_not_found(e, ErrorCode::ApprovalNotFound, "approval not found"))?;
        row.try_into()
    }

    /// Find an unresolved approval in `job_id` sharing `fingerprint`, used
    /// to coalesce duplicate inbound approval requests.
    pub async fn find_open_approval_by_fingerprint(&self, job_id: &str, fingerprint: &str) -> Result<Option<Approval>, BridgeError> {
        let row: Option<ApprovalRow> =
            sqlx::query_as("SELECT * FROM approvals WHERE job_id = ? AND fingerprint = ? AND decision IS NULL")
                .bind(job_id)
                .bind(fingerprint)
                .fetch_optional(self.reader())
                .await
                .map_err(|e| BridgeError::internal(e.to_string()))?;
        row.map(TryInto::try_into).transpose()
    }

    /// All still-unresolved approvals for a job, used to resolve them when
    /// the job is cancelled out from under them.
    pub async fn find_open_approvals_for_job(&self, job_id: &str) -> Result<Vec<Approval>, BridgeError> {
        let rows: Vec<ApprovalRow> = sqlx::query_as("SELECT * FROM approvals WHERE job_id = ? AND decision IS NULL")
            .bind(job_id)
            .fetch_all(self.reader())
            .await
            .map_err(|e| BridgeError::internal(e.to_string()))?;
        rows.into_iter().map(TryInto::try_into).collect()
    }

    /// Update the live agent request id a coalesced approval should respond
    /// to, so the response reaches the most recent duplicate request.
    pub async fn update_approval_request_id(&self, id: &str, request_id: i64) -> Result<(), BridgeError> {
        sqlx::query("UPDATE approvals SET request_id = ? WHERE id = ?")
            .bind(request_id)
            .bind(id)
            .execute(self.writer())
            .await
            .map_err(|e| BridgeError::internal(e.to_string()))?;
        Ok(())
    }

    /// Record a decision on an approval only if it is still unresolved.
    /// Returns `false` without writing when a decision already exists, so
    /// repeated submissions never overwrite the first.
    pub async fn record_decision_if_unresolved(&self, id: &str, decision: &ApprovalDecision) -> Result<bool, BridgeError> {
        let decision_json = serde_json::json!({
            "kind": decision_kind_str(decision.kind),
            "amendment": decision.amendment,
            "declineReason": decision.decline_reason,
        });
        let decision_text = serde_json::to_string(&decision_json).map_err(|e| BridgeError::internal(e.to_string()))?;

        let result = sqlx::query("UPDATE approvals SET decision = ?, decision_at = ? WHERE id = ? AND decision IS NULL")
            .bind(&decision_text)
            .bind(decision.decided_at)
            .bind(id)
            .execute(self.writer())
            .await
            .map_err(|e| BridgeError::internal(e.to_string()))?;

        Ok(result.rows_affected() > 0)
    }
}

#[cfg(test)]
#[path = "approvals_tests.rs"]
mod tests;
