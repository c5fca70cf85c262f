// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! The event log and SSE hub (C4): durable `append`, paged `list`, and a
//! live `subscribe` stream that replays stored envelopes then tails new
//! appends until the job finishes.

use std::collections::HashMap;
use std::sync::Arc;

use tokio::sync::{broadcast, RwLock};

use crate::envelope::{Envelope, EnvelopeType};
use crate::error::{BridgeError, ErrorCode};
use crate::store::Store;

const BROADCAST_CAPACITY: usize = 1024;

/// Returned by [`Hub::list`]: the envelopes newer than the requested
/// cursor, plus the cursor a follow-up call should use.
pub struct ListPage {
    pub envelopes: Vec<Envelope>,
    pub next_cursor: i64,
    pub first_retained_seq: i64,
}

/// In-process fan-out for live job subscribers, backed by the durable
/// event log in [`Store`]. One broadcast channel per job; channels for
/// finished jobs are pruned lazily on next access.
pub struct Hub {
    store: Store,
    event_retention: u64,
    channels: RwLock<HashMap<String, broadcast::Sender<Envelope>>>,
}

impl Hub {
    pub fn new(store: Store, event_retention: u64) -> Arc<Self> {
        Arc::new(Self { store, event_retention, channels: RwLock::new(HashMap::new()) })
    }

    async fn channel_for(&self, job_id: &str) -> broadcast::Sender<Envelope> {
        if let Some(tx) = self.channels.read().await.get(job_id) {
            return tx.clone();
        }
        let mut channels = self.channels.write().await;
        channels.entry(job_id.to_string()).or_insert_with(|| broadcast::channel(BROADCAST_CAPACITY).0).clone()
    }

    /// Durably append an envelope for `job_id` and publish it to live
    /// subscribers. The returned envelope carries its assigned `seq`.
    pub async fn append(&self, thread_id: &str, job_id: &str, kind: EnvelopeType, payload: serde_json::Value) -> Result<Envelope, BridgeError> {
        let appended = self.store.append_event(thread_id, job_id, kind, payload).await?;
        let tx = self.channel_for(job_id).await;
        let _ = tx.send(appended.envelope.clone());

        if appended.envelope.kind == EnvelopeType::JobFinished {
            self.channels.write().await.remove(job_id);
        }

        Ok(appended.envelope)
    }

    /// All envelopes for `job_id` with `seq > cursor`. Returns
    /// `CURSOR_EXPIRED` when the cursor predates the retention window.
    pub async fn list(&self, job_id: &str, cursor: Option<i64>) -> Result<ListPage, BridgeError> {
        let job = self.store.get_job(job_id).await?;
        let max_seq = job.next_seq as i64 - 1;
        let first_retained_seq = retention_floor(max_seq, self.event_retention);

        // No cursor means "snapshot from the retention floor", not
        // "replay everything from the beginning" — it never expires.
        let requested = match cursor {
            Some(c) => {
                if c < first_retained_seq {
                    return Err(BridgeError::new(ErrorCode::CursorExpired, "cursor predates retained event window"));
                }
                c
            }
            None => first_retained_seq - 1,
        };

        let envelopes = self.store.list_events_since(job_id, requested).await?;
        let next_cursor = envelopes.last().map(|e| e.seq as i64).unwrap_or(requested);
        Ok(ListPage { envelopes, next_cursor, first_retained_seq })
    }

    /// Subscribe to live envelopes for `job_id`, replaying anything newer
    /// than `cursor` first. The returned receiver yields [`Envelope`]s in
    /// order and closes once `job.finished` has been delivered; a frame may
    /// straddle the replay/live boundary, so stream consumers must drop
    /// live envelopes with `seq` at or below the replayed cursor.
    pub async fn subscribe(&self, job_id: &str, cursor: Option<i64>) -> Result<(ListPage, broadcast::Receiver<Envelope>), BridgeError> {
        let job = self.store.get_job(job_id).await?;
        let rx = if job.state.is_terminal() {
            // Finished jobs get a pre-closed receiver: everything is in the
            // replay page and registering a channel would never be pruned.
            broadcast::channel(1).1
        } else {
            self.channel_for(job_id).await.subscribe()
        };
        let page = self.list(job_id, cursor).await?;
        Ok((page, rx))
    }
}

/// The lowest `seq` a client may resume from, given the highest persisted
/// `seq` and the configured ring size. `CURSOR_EXPIRED` triggers when a
/// client's cursor falls strictly before this value.
fn retention_floor(max_seq: i64, event_retention: u64) -> i64 {
    if max_seq < 0 {
        return 0;
    }
    (max_seq + 1 - event_retention as i64).max(0)
}

#[cfg(test)]
#[path = "hub_tests.rs"]
mod tests;
