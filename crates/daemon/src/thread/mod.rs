// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Thread projection & transfer (C7): paged event projection per thread,
//! agent-driven rehydration, and export/import packages for moving a
//! thread's history between daemons.

mod transfer;

use serde::Serialize;
use serde_json::Value;

use crate::agent::AgentTransport;
use crate::domain::JobState;
use crate::envelope::Envelope;
use crate::error::BridgeError;
use crate::store::Store;

pub use transfer::{ExportResult, ImportResult, ThreadTransfer};

/// A paged slice of a thread's event projection.
#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ThreadEventsPage {
    pub data: Vec<Envelope>,
    pub next_cursor: i64,
    pub has_more: bool,
    pub total: i64,
}

/// Projects a thread's full event history into a restartable page-able
/// view, and drives agent-side rehydration on activation.
pub struct ThreadProjector {
    store: Store,
    agent: AgentTransport,
}

impl ThreadProjector {
    pub fn new(store: Store, agent: AgentTransport) -> Self {
        Self { store, agent }
    }

    /// Ask the agent to rehydrate its authoritative state for this thread
    /// and, on success, rebuild the projection as a full replace from the
    /// returned turns. A failed rehydrate, or a response with
    /// no `envelopes`, falls back to serving the store's existing
    /// projection unchanged, which is what `list_events` already does.
    pub async fn activate(&self, thread_id: &str) -> Result<(), BridgeError> {
        let thread = self.store.get_thread(thread_id).await?;
        let result = match self.agent.request("thread/rehydrate", serde_json::json!({"threadId": thread_id, "projectPath": thread.project_path})).await {
            Ok(result) => result,
            Err(err) => {
                tracing::warn!(%thread_id, error = %err, "agent could not rehydrate thread, serving store projection");
                return Ok(());
            }
        };

        let Some(raw_envelopes) = result.get("envelopes").and_then(Value::as_array) else {
            return Ok(());
        };

        let job_id = format!("rehydrate-{}", uuid::Uuid::new_v4());
        self.store.create_job(&job_id, thread_id).await?;
        self.store.update_job_state(&job_id, JobState::Done, 0, None).await?;

        let mut envelopes = Vec::with_capacity(raw_envelopes.len());
        for raw in raw_envelopes {
            let mut envelope: Envelope =
                serde_json::from_value(raw.clone()).map_err(|e| BridgeError::internal(format!("invalid rehydrated envelope: {e}")))?;
            envelope.job_id = job_id.clone();
            envelopes.push(envelope);
        }

        self.store.replace_thread_events(thread_id, &job_id, &envelopes).await?;
        Ok(())
    }

    pub async fn list_events(&self, thread_id: &str, cursor: i64, limit: i64) -> Result<ThreadEventsPage, BridgeError> {
        let (data, next_cursor, has_more, total) = self.store.list_thread_events(thread_id, cursor, limit).await?;
        Ok(ThreadEventsPage { data, next_cursor, has_more, total })
    }
}

#[cfg(test)]
#[path = "mod_tests.rs"]
mod tests;
