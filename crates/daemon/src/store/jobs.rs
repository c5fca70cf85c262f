// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

use chrono::{DateTime, Utc};

use crate::domain::{Job, JobState};
use crate::error::{BridgeError, ErrorCode};

use super::Store;

#[derive(Debug, Clone, sqlx::FromRow)]
pub struct JobRow {
    pub id: String,
    pub thread_id: String,
    pub state: String,
    pub next_seq: i64,
    pub pending_approvals: i64,
    pub error_message: Option<String>,
    pub created_at: DateTime<Utc>,
    pub finished_at: Option<DateTime<Utc>>,
}

impl JobRow {
    fn into_job(self) -> Result<Job, BridgeError> {
        let state = parse_state(&self.state)?;
        Ok(Job {
            id: self.id,
            thread_id: self.thread_id,
            state,
            next_seq: self.next_seq.max(0) as u64,
            pending_approval_count: self.pending_approvals.max(0) as u32,
            error_message: self.error_message,
            created_at: self.created_at,
            finished_at: self.finished_at,
        })
    }
}

fn parse_state(s: &str) -> Result<JobState, BridgeError> {
    match s {
        "QUEUED" => Ok(JobState::Queued),
        "RUNNING" => Ok(JobState::Running),
        "WAITING_APPROVAL" => Ok(JobState::WaitingApproval),
        "DONE" => Ok(JobState::Done),
        "FAILED" => Ok(JobState::Failed),
        "CANCELLED" => Ok(JobState::Cancelled),
        other => Err(BridgeError::internal(format!("unknown job state in store: {other}"))),
    }
}

impl Store {
    pub async fn create_job(&self, id: &str, thread_id: &str) -> Result<Job, BridgeError> {
        let now = Utc::now();
        sqlx::query(
            "INSERT INTO jobs (id, thread_id, state, next_seq, pending_approvals, created_at)
             VALUES (?, ?, 'QUEUED', 0, 0, ?)",
        )
        .bind(id)
        .bind(thread_id)
        .bind(now)
        .execute(self.writer())
        .await
        .map_err(|e| BridgeError::internal(e.to_string()))?;

        self.get_job(id).await
    }

    /// Create a job only if the thread has no other non-terminal job, as a
    /// single guarded insert so the active-job check and the insert cannot
    /// interleave with a concurrent turn start. Returns `None` when an
    /// active job already exists.
    pub async fn create_job_if_thread_idle(&self, id: &str, thread_id: &str) -> Result<Option<Job>, BridgeError> {
        let now = Utc::now();
        let result = sqlx::query(
            "INSERT INTO jobs (id, thread_id, state, next_seq, pending_approvals, created_at)
             SELECT ?, ?, 'QUEUED', 0, 0, ?
             WHERE NOT EXISTS (
                 SELECT 1 FROM jobs WHERE thread_id = ? AND state NOT IN ('DONE','FAILED','CANCELLED')
             )",
        )
        .bind(id)
        .bind(thread_id)
        .bind(now)
        .bind(thread_id)
        .execute(self.writer())
        .await
        .map_err(|e| BridgeError::internal(e.to_string()))?;

        if result.rows_affected() == 0 {
            return Ok(None);
        }
        Ok(Some(self.get_job(id).await?))
    }

    pub async fn get_job(&self, id: &str) -> Result<Job, BridgeError> {
        let row: JobRow = sqlx::query_as("SELECT * FROM jobs WHERE id = ?")
            .bind(id)
            .fetch_one(self.reader())
            .await
            .map_err(|e| super::map_not_found(e, ErrorCode::JobNotFound, "job not found"))?;
        row.into_job()
    }

    /// Every job not yet in a terminal state, across all threads.
    pub async fn list_active_jobs(&self) -> Result<Vec<Job>, BridgeError> {
        let rows: Vec<JobRow> = sqlx::query_as("SELECT * FROM jobs WHERE state NOT IN ('DONE','FAILED','CANCELLED')")
            .fetch_all(self.reader())
            .await
            .map_err(|e| BridgeError::internal(e.to_string()))?;
        rows.into_iter().map(JobRow::into_job).collect()
    }

    /// Update job state, pending-approval count, and optional error message
    /// in one statement, so the caller's per-job lock covers a single
    /// atomic write.
    pub async fn update_job_state(
        &self,
        id: &str,
        state: JobState,
        pending_approvals: u32,
        error_message: Option<&str>,
    ) -> Result<(), BridgeError> {
        let finished_at = state.is_terminal().then(Utc::now);
        sqlx::query(
            "UPDATE jobs SET state = ?, pending_approvals = ?, error_message = COALESCE(?, error_message), finished_at = COALESCE(?, finished_at)
             WHERE id = ?",
        )
        .bind(state.as_str())
        .bind(pending_approvals as i64)
        .bind(error_message)
        .bind(finished_at)
        .bind(id)
        .execute(self.writer())
        .await
        .map_err(|e| BridgeError::internal(e.to_string()))?;
        Ok(())
    }

}

#[cfg(test)]
#[path = "jobs_tests.rs"]
mod tests;
