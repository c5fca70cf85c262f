// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Core entity types shared by the store, orchestrator, and boundary layers.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// A conversation thread: the unit of continuity between the client and the
/// agent. At most one non-terminal job may exist per thread.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Thread {
    pub id: String,
    pub project_path: String,
    pub name: Option<String>,
    /// Short text snippet of the latest user input, for list views.
    pub preview: Option<String>,
    pub archived: bool,
    pub pending_approval_count: u32,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

/// Job lifecycle states. Terminal states are [`JobState::Done`],
/// [`JobState::Failed`], and [`JobState::Cancelled`].
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum JobState {
    Queued,
    Running,
    WaitingApproval,
    Done,
    Failed,
    Cancelled,
}

impl JobState {
    pub fn is_terminal(self) -> bool {
        matches!(self, Self::Done | Self::Failed | Self::Cancelled)
    }

    pub fn as_str(self) -> &'static str {
        match self {
            Self::Queued => "QUEUED",
            Self::Running => "RUNNING",
            Self::WaitingApproval => "WAITING_APPROVAL",
            Self::Done => "DONE",
            Self::Failed => "FAILED",
            Self::Cancelled => "CANCELLED",
        }
    }
}

/// A job: one turn-driven unit of agent work within a thread. Created by
/// starting a turn, destroyed only by retention policy on its events.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Job {
    pub id: String,
    pub thread_id: String,
    pub state: JobState,
    pub next_seq: u64,
    pub pending_approval_count: u32,
    pub error_message: Option<String>,
    pub created_at: DateTime<Utc>,
    pub finished_at: Option<DateTime<Utc>>,
}

impl Job {
    pub fn new(id: String, thread_id: String) -> Self {
        Self {
            id,
            thread_id,
            state: JobState::Queued,
            next_seq: 0,
            pending_approval_count: 0,
            error_message: None,
            created_at: Utc::now(),
            finished_at: None,
        }
    }
}

/// The kind of decision recorded against an approval request.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ApprovalDecisionKind {
    Accept,
    AcceptForSession,
    AcceptWithExecpolicyAmendment,
    Decline,
    Cancel,
    Timeout,
}

impl ApprovalDecisionKind {
    /// Whether this decision, once recorded, forces the owning job to a
    /// terminal state regardless of approval bookkeeping.
    pub fn forces_job_termination(self) -> bool {
        matches!(self, Self::Cancel)
    }
}

/// A recorded approval decision.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ApprovalDecision {
    pub kind: ApprovalDecisionKind,
    pub amendment: Option<serde_json::Value>,
    pub decline_reason: Option<String>,
    pub decided_at: DateTime<Utc>,
}

/// The kind of action an approval covers.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ApprovalKind {
    Command,
    FileChange,
}

/// An approval request raised by the agent, awaiting (or recording) a
/// decision from the client.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Approval {
    pub id: String,
    pub job_id: String,
    pub thread_id: String,
    pub kind: ApprovalKind,
    pub payload: serde_json::Value,
    pub decision: Option<ApprovalDecision>,
    /// The agent-assigned JSON-RPC request id this approval must respond to.
    /// Updated when a duplicate inbound request is coalesced so the reply
    /// lands on the most recent live request.
    pub request_id: i64,
    /// Dedup key over `(turnId, itemId, command, cwd)`, present only when
    /// all four fields were supplied on the inbound request.
    pub fingerprint: Option<String>,
}

impl Approval {
    pub fn is_resolved(&self) -> bool {
        self.decision.is_some()
    }
}

/// PTY/pipe transport selected when a terminal session was spawned.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum TransportMode {
    Pty,
    Pipe,
}

/// Run state of a terminal session's underlying child process.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum TerminalStatus {
    Running,
    Exited,
}

/// A terminal session's durable metadata. The live PTY/pipe handle, ring,
/// and attached-client set live only in the terminal manager's in-memory
/// state (see [`crate::terminal`]).
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct TerminalSessionInfo {
    pub id: String,
    pub thread_id: String,
    pub pid: i32,
    pub cwd: String,
    pub cols: u16,
    pub rows: u16,
    pub status: TerminalStatus,
    pub exit_code: Option<i32>,
    pub exit_signal: Option<String>,
    pub transport_mode: TransportMode,
    pub last_activity_at: DateTime<Utc>,
}

/// A registered push notification device.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct PushDevice {
    pub token: String,
    pub platform: String,
    pub bundle: String,
    pub environment: String,
    pub thread_scope: Option<String>,
}

#[cfg(test)]
#[path = "domain_tests.rs"]
mod tests;
