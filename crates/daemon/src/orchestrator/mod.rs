// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! The orchestrator (C6): owns jobs and envelopes exclusively, drives the
//! job state machine, normalizes inbound agent frames into envelopes, and
//! triggers push notifications on job completion.

mod normalize;

use std::collections::{HashMap, VecDeque};
use std::sync::Arc;
use std::time::Duration;

use serde_json::{json, Value};
use tokio::sync::{Mutex, RwLock};

use crate::agent::{AgentTransport, InboundFrame};
use crate::approval::{self, ApprovalRegistry, RecordOutcome};
use crate::domain::{ApprovalDecisionKind, ApprovalKind, Job, JobState};
use crate::envelope::EnvelopeType;
use crate::error::{BridgeError, ErrorCode};
use crate::hub::Hub;
use crate::push::PushSender;
use crate::store::Store;

pub use normalize::{normalize_notification, terminal_state_for_turn_status};

/// Per-job serialization: every state-changing operation for a job takes
/// this lock first, so a single writer appends envelopes and advances
/// state for any given job.
type JobLock = Arc<Mutex<()>>;

pub struct Orchestrator {
    store: Store,
    hub: Arc<Hub>,
    approvals: Arc<ApprovalRegistry>,
    agent: AgentTransport,
    push: Arc<dyn PushSender>,
    max_pending_message_bytes: usize,
    cancel_deadline: Duration,
    /// Zero disables the automatic `timeout` decision.
    approval_timeout: Duration,

    job_locks: Mutex<HashMap<String, JobLock>>,
    /// FIFO of job ids awaiting their `turn/started` acknowledgment, used
    /// to correlate the agent's `turnId` back to the job that started it.
    pending_turn_starts: Mutex<VecDeque<String>>,
    turn_to_job: RwLock<HashMap<String, String>>,
    pending_message_bytes: Mutex<HashMap<String, usize>>,
}

impl Orchestrator {
    pub fn new(
        store: Store,
        hub: Arc<Hub>,
        approvals: Arc<ApprovalRegistry>,
        agent: AgentTransport,
        push: Arc<dyn PushSender>,
        max_pending_message_bytes: usize,
        cancel_deadline: Duration,
        approval_timeout: Duration,
    ) -> Arc<Self> {
        Arc::new(Self {
            store,
            hub,
            approvals,
            agent,
            push,
            max_pending_message_bytes,
            cancel_deadline,
            approval_timeout,
            job_locks: Mutex::new(HashMap::new()),
            pending_turn_starts: Mutex::new(VecDeque::new()),
            turn_to_job: RwLock::new(HashMap::new()),
            pending_message_bytes: Mutex::new(HashMap::new()),
        })
    }

    async fn lock_for(&self, job_id: &str) -> JobLock {
        self.job_locks.lock().await.entry(job_id.to_string()).or_insert_with(|| Arc::new(Mutex::new(()))).clone()
    }

    /// Start a turn on `thread_id`. Fails with `THREAD_ARCHIVED` or
    /// `THREAD_HAS_ACTIVE_JOB` without writing any envelope.
    pub async fn start_turn(
        &self,
        thread_id: &str,
        job_id: &str,
        text: &str,
        approval_policy: &str,
        sandbox: &str,
        model: Option<&str>,
    ) -> Result<Job, BridgeError> {
        let thread = self.store.get_thread(thread_id).await?;
        if thread.archived {
            return Err(BridgeError::new(ErrorCode::ThreadArchived, "thread is archived"));
        }

        // One guarded insert, not check-then-insert: two concurrent turn
        // starts on the same thread must not both pass the active-job gate.
        let Some(job) = self.store.create_job_if_thread_idle(job_id, thread_id).await? else {
            return Err(BridgeError::new(ErrorCode::ThreadHasActiveJob, "thread already has an active job"));
        };
        self.store.set_thread_preview(thread_id, &preview_snippet(text)).await?;
        let lock = self.lock_for(job_id).await;
        let _guard = lock.lock().await;

        self.hub.append(thread_id, job_id, EnvelopeType::JobCreated, json!({"jobId": job_id})).await?;

        self.store.update_job_state(job_id, JobState::Running, 0, None).await?;
        self.hub.append(thread_id, job_id, EnvelopeType::JobState, json!({"state": JobState::Running.as_str()})).await?;

        self.pending_turn_starts.lock().await.push_back(job_id.to_string());

        let params = json!({
            "threadId": thread_id,
            "text": text,
            "approvalPolicy": approval::normalize_approval_policy_value(approval_policy),
            "sandbox": approval::normalize_sandbox_value(sandbox),
            "model": model,
        });
        if self.agent.notify("turn/start", params).is_err() {
            self.fail_job(&job, "transport-closed").await?;
            return Err(BridgeError::new(ErrorCode::AgentUnavailable, "agent transport closed"));
        }

        self.store.get_job(job_id).await
    }

    /// Drive the job state machine off one inbound agent frame. Intended to
    /// be called in a loop by `run.rs` against the channel returned from
    /// [`crate::agent::AgentTransport::spawn`].
    pub async fn handle_inbound(self: Arc<Self>, frame: InboundFrame) -> Result<(), BridgeError> {
        match frame {
            InboundFrame::Notification { method, params } => self.handle_notification(&method, params).await,
            InboundFrame::Request { id, method, params } => self.handle_request(id, &method, params).await,
        }
    }

    async fn handle_notification(&self, method: &str, params: Value) -> Result<(), BridgeError> {
        if method == "turn/started" {
            if let Some(turn_id) = params.get("turnId").and_then(Value::as_str) {
                if let Some(job_id) = self.pending_turn_starts.lock().await.pop_front() {
                    self.turn_to_job.write().await.insert(turn_id.to_string(), job_id);
                }
            }
        }

        let Some(job_id) = self.job_id_for_params(&params).await else {
            tracing::warn!(%method, "dropping notification with no resolvable job");
            return Ok(());
        };
        let job = self.store.get_job(&job_id).await?;
        if job.state.is_terminal() {
            return Ok(());
        }

        let lock = self.lock_for(&job_id).await;
        let _guard = lock.lock().await;

        if method == "item/agentMessage/delta" {
            if self.pending_bytes_exceeded(&job_id, &params).await {
                self.hub
                    .append(&job.thread_id, &job_id, EnvelopeType::Error, json!({"code": "PENDING_MESSAGE_TOO_LARGE"}))
                    .await?;
                return self.fail_job(&job, "pending-message-too-large").await;
            }
        }

        let (kind, payload) = normalize_notification(method, params);
        self.hub.append(&job.thread_id, &job_id, kind, payload.clone()).await?;

        if method == "turn/completed" {
            let status = payload.get("status").and_then(Value::as_str).unwrap_or("failed");
            let state = terminal_state_for_turn_status(status).unwrap_or(JobState::Failed);
            self.finish_job(&job, state, None).await?;
        }

        Ok(())
    }

    async fn handle_request(self: Arc<Self>, id: Value, method: &str, params: Value) -> Result<(), BridgeError> {
        let kind = match method {
            "item/commandExecution/requestApproval" => ApprovalKind::Command,
            "item/fileChange/requestApproval" => ApprovalKind::FileChange,
            _ => {
                let _ = self.agent.respond_error(id, -32601, "method not found");
                return Ok(());
            }
        };

        let Some(request_id) = id.as_i64() else {
            let _ = self.agent.respond_error(id, -32600, "non-integer request id");
            return Ok(());
        };

        let Some(job_id) = self.job_id_for_params(&params).await else {
            let _ = self.agent.respond_error(Value::from(request_id), -32001, "no job for approval request");
            return Ok(());
        };
        let job = self.store.get_job(&job_id).await?;

        let fp = approval::fingerprint(
            params.get("turnId").and_then(Value::as_str),
            params.get("itemId").and_then(Value::as_str),
            params.get("command").and_then(Value::as_str),
            params.get("cwd").and_then(Value::as_str),
        );

        let lock = self.lock_for(&job_id).await;
        let _guard = lock.lock().await;

        let (approval_record, coalesced) = self
            .approvals
            .open(|| uuid::Uuid::new_v4().to_string(), &job_id, &job.thread_id, kind, params.clone(), request_id, fp)
            .await?;

        if coalesced {
            return Ok(());
        }

        self.store.update_job_state(&job_id, JobState::WaitingApproval, job.pending_approval_count + 1, None).await?;
        self.store.set_thread_pending_approval_count(&job.thread_id, job.pending_approval_count + 1).await?;
        self.hub
            .append(
                &job.thread_id,
                &job_id,
                EnvelopeType::ApprovalRequired,
                json!({"approvalId": approval_record.id, "kind": kind, "payload": params}),
            )
            .await?;

        if !self.approval_timeout.is_zero() {
            let orchestrator = self.clone();
            let approval_id = approval_record.id.clone();
            let timeout = self.approval_timeout;
            tokio::spawn(async move {
                tokio::time::sleep(timeout).await;
                // Idempotent: a no-op if a real decision landed first.
                if let Err(e) = orchestrator.record_approval_decision(&approval_id, ApprovalDecisionKind::Timeout, None, None).await {
                    tracing::warn!(%approval_id, error = %e, "recording approval timeout decision failed");
                }
            });
        }

        Ok(())
    }

    /// Record an approval decision, forward it to the agent, and advance
    /// the owning job's state. Idempotent per [`ApprovalRegistry::record`].
    pub async fn record_approval_decision(
        &self,
        approval_id: &str,
        kind: ApprovalDecisionKind,
        amendment: Option<Value>,
        decline_reason: Option<String>,
    ) -> Result<RecordOutcome, BridgeError> {
        let (approval, outcome) = self.approvals.record(approval_id, kind, amendment.clone(), decline_reason.clone()).await?;
        if outcome == RecordOutcome::AlreadySubmitted {
            return Ok(outcome);
        }

        let job = self.store.get_job(&approval.job_id).await?;
        if job.state.is_terminal() {
            // Decision already recorded above for idempotence; nothing may
            // be appended after job.finished.
            return Ok(outcome);
        }
        let lock = self.lock_for(&approval.job_id).await;
        let _guard = lock.lock().await;

        let response_payload = json!({
            "decision": decision_wire_name(kind),
            "amendment": amendment,
            "declineReason": decline_reason,
        });
        let _ = self.agent.respond(Value::from(approval.request_id), response_payload);

        let remaining = job.pending_approval_count.saturating_sub(1);
        let forces_termination = kind.forces_job_termination();
        // A terminating decision skips the intermediate RUNNING hop; the job
        // goes straight to its terminal envelope after approval.resolved.
        let next_state = if forces_termination {
            job.state
        } else if remaining == 0 {
            JobState::Running
        } else {
            JobState::WaitingApproval
        };
        self.store.update_job_state(&job.id, next_state, remaining, None).await?;
        self.store.set_thread_pending_approval_count(&job.thread_id, remaining).await?;

        self.hub
            .append(&job.thread_id, &job.id, EnvelopeType::ApprovalResolved, json!({"approvalId": approval.id, "decision": decision_wire_name(kind)}))
            .await?;

        if forces_termination {
            let refreshed = self.store.get_job(&job.id).await?;
            self.finish_job(&refreshed, JobState::Cancelled, None).await?;
        } else if next_state != job.state {
            self.hub.append(&job.thread_id, &job.id, EnvelopeType::JobState, json!({"state": next_state.as_str()})).await?;
        }

        Ok(outcome)
    }

    /// Best-effort cancellation: resolve any approval the job is waiting on
    /// with a `cancel` decision, request an upstream interrupt, and force
    /// the job terminal after the agent confirms or the deadline elapses.
    pub async fn cancel_job(&self, job_id: &str) -> Result<(), BridgeError> {
        let job = self.store.get_job(job_id).await?;
        if job.state.is_terminal() {
            return Ok(());
        }

        for approval in self.approvals.open_for_job(job_id).await? {
            self.record_approval_decision(&approval.id, ApprovalDecisionKind::Cancel, None, None).await?;
        }

        let turn_id = self.turn_to_job.read().await.iter().find(|(_, v)| v.as_str() == job_id).map(|(k, _)| k.clone());
        if let Some(turn_id) = turn_id {
            let _ = self.agent.interrupt_turn(&turn_id).await;
        }

        let job = self.store.get_job(job_id).await?;
        if job.state.is_terminal() {
            return Ok(());
        }

        let deadline = self.cancel_deadline;
        let store = self.store.clone();
        let hub = self.hub.clone();
        let job_id = job_id.to_string();
        let thread_id = job.thread_id.clone();
        tokio::spawn(async move {
            tokio::time::sleep(deadline).await;
            if let Ok(job) = store.get_job(&job_id).await {
                if !job.state.is_terminal() {
                    let _ = store.update_job_state(&job_id, JobState::Cancelled, job.pending_approval_count, Some("cancel-deadline")).await;
                    let _ = hub.append(&thread_id, &job_id, EnvelopeType::JobFinished, json!({"state": "CANCELLED"})).await;
                }
            }
        });

        Ok(())
    }

    /// Fail every non-terminal job. Called when the agent transport
    /// closes: the child is fail-stop, so nothing will ever complete
    /// these turns.
    pub async fn fail_open_jobs(&self, reason: &str) -> Result<(), BridgeError> {
        for job in self.store.list_active_jobs().await? {
            let lock = self.lock_for(&job.id).await;
            let _guard = lock.lock().await;
            let refreshed = self.store.get_job(&job.id).await?;
            self.fail_job(&refreshed, reason).await?;
        }
        Ok(())
    }

    async fn finish_job(&self, job: &Job, state: JobState, error_message: Option<&str>) -> Result<(), BridgeError> {
        if job.state.is_terminal() {
            return Ok(());
        }
        self.store.update_job_state(&job.id, state, job.pending_approval_count, error_message).await?;
        self.hub.append(&job.thread_id, &job.id, EnvelopeType::JobFinished, json!({"state": state.as_str()})).await?;
        self.push.notify_job_finished(&job.thread_id, &job.id, state.as_str()).await;
        self.pending_message_bytes.lock().await.remove(&job.id);
        self.turn_to_job.write().await.retain(|_, v| v != &job.id);
        Ok(())
    }

    async fn fail_job(&self, job: &Job, reason: &str) -> Result<(), BridgeError> {
        self.finish_job(job, JobState::Failed, Some(reason)).await
    }

    async fn job_id_for_params(&self, params: &Value) -> Option<String> {
        if let Some(turn_id) = params.get("turnId").and_then(Value::as_str) {
            if let Some(job_id) = self.turn_to_job.read().await.get(turn_id) {
                return Some(job_id.clone());
            }
        }
        None
    }

    async fn pending_bytes_exceeded(&self, job_id: &str, params: &Value) -> bool {
        let delta_len = params.get("text").and_then(Value::as_str).map(str::len).unwrap_or(0);
        let mut pending = self.pending_message_bytes.lock().await;
        let total = pending.entry(job_id.to_string()).or_insert(0);
        *total += delta_len;
        *total > self.max_pending_message_bytes
    }
}

const PREVIEW_MAX_CHARS: usize = 160;

/// First line of the user's input, truncated for thread list views.
fn preview_snippet(text: &str) -> String {
    let first_line = text.lines().next().unwrap_or_default();
    first_line.chars().take(PREVIEW_MAX_CHARS).collect()
}

fn decision_wire_name(kind: ApprovalDecisionKind) -> &'static str {
    match kind {
        ApprovalDecisionKind::Accept => "accept",
        ApprovalDecisionKind::AcceptForSession => "accept_for_session",
        ApprovalDecisionKind::AcceptWithExecpolicyAmendment => "accept_with_execpolicy_amendment",
        ApprovalDecisionKind::Decline => "decline",
        ApprovalDecisionKind::Cancel => "cancel",
        ApprovalDecisionKind::Timeout => "timeout",
    }
}

#[cfg(test)]
#[path = "mod_tests.rs"]
mod tests;
