// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! The envelope taxonomy: the closed set of event types that flow through
//! the event log, SSE stream, and thread projection.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// The closed set of envelope types. Unknown agent notifications are mapped
/// to [`EnvelopeType::Error`] by the normalizer rather than failing the job.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub enum EnvelopeType {
    #[serde(rename = "job.created")]
    JobCreated,
    #[serde(rename = "job.state")]
    JobState,
    #[serde(rename = "job.finished")]
    JobFinished,
    #[serde(rename = "turn.started")]
    TurnStarted,
    #[serde(rename = "turn.completed")]
    TurnCompleted,
    #[serde(rename = "item.started")]
    ItemStarted,
    #[serde(rename = "item.completed")]
    ItemCompleted,
    #[serde(rename = "item.agentMessage.delta")]
    ItemAgentMessageDelta,
    #[serde(rename = "item.commandExecution.outputDelta")]
    ItemCommandExecutionOutputDelta,
    #[serde(rename = "item.fileChange.outputDelta")]
    ItemFileChangeOutputDelta,
    #[serde(rename = "approval.required")]
    ApprovalRequired,
    #[serde(rename = "approval.resolved")]
    ApprovalResolved,
    #[serde(rename = "error")]
    Error,
    #[serde(rename = "thread.started")]
    ThreadStarted,
}

impl EnvelopeType {
    pub fn as_str(self) -> &'static str {
        match self {
            Self::JobCreated => "job.created",
            Self::JobState => "job.state",
            Self::JobFinished => "job.finished",
            Self::TurnStarted => "turn.started",
            Self::TurnCompleted => "turn.completed",
            Self::ItemStarted => "item.started",
            Self::ItemCompleted => "item.completed",
            Self::ItemAgentMessageDelta => "item.agentMessage.delta",
            Self::ItemCommandExecutionOutputDelta => "item.commandExecution.outputDelta",
            Self::ItemFileChangeOutputDelta => "item.fileChange.outputDelta",
            Self::ApprovalRequired => "approval.required",
            Self::ApprovalResolved => "approval.resolved",
            Self::Error => "error",
            Self::ThreadStarted => "thread.started",
        }
    }
}

/// One entry in a job's event log. `seq` is a per-job, zero-based,
/// strictly-increasing, gap-free sequence number. The
/// payload is kept as an open JSON value rather than a per-type struct, per
/// the "dynamic JSON payloads" design note: the taxonomy of envelope
/// *shapes* is closed, but their field sets are not.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Envelope {
    #[serde(rename = "type")]
    pub kind: EnvelopeType,
    pub ts: DateTime<Utc>,
    pub job_id: String,
    pub seq: u64,
    pub payload: serde_json::Value,
}

impl Envelope {
    pub fn new(kind: EnvelopeType, job_id: impl Into<String>, seq: u64, payload: serde_json::Value) -> Self {
        Self { kind, ts: Utc::now(), job_id: job_id.into(), seq, payload }
    }
}

#[cfg(test)]
#[path = "envelope_tests.rs"]
mod tests;
