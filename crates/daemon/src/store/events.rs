// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

use chrono::{DateTime, Utc};
use sqlx::Row;

use crate::envelope::{Envelope, EnvelopeType};
use crate::error::BridgeError;

use super::Store;

#[derive(Debug, Clone, sqlx::FromRow)]
pub struct EventRow {
    pub thread_id: String,
    pub job_id: String,
    pub seq: i64,
    pub ts: DateTime<Utc>,
    #[sqlx(rename = "type")]
    pub kind: String,
    pub payload: String,
}

impl TryFrom<EventRow> for Envelope {
    type Error = BridgeError;

    fn try_from(row: EventRow) -> Result<Self, Self::Error> {
        let kind: EnvelopeType = serde_json::from_value(serde_json::Value::String(row.kind.clone()))
            .map_err(|_| BridgeError::internal(format!("unknown envelope type in store: {}", row.kind)))?;
        let payload = serde_json::from_str(&row.payload).map_err(|e| BridgeError::internal(e.to_string()))?;
        Ok(Envelope { kind, ts: row.ts, job_id: row.job_id, seq: row.seq.max(0) as u64, payload })
    }
}

/// Same shape as [`EventRow`] plus the table's implicit `rowid`, aliased as
/// `ordinal` — the insertion-order key [`Store::list_thread_events`] paginates
/// on, since `seq` alone is only unique within a single job.
#[derive(Debug, Clone, sqlx::FromRow)]
pub struct ThreadEventRow {
    pub ordinal: i64,
    pub thread_id: String,
    pub job_id: String,
    pub seq: i64,
    pub ts: DateTime<Utc>,
    #[sqlx(rename = "type")]
    pub kind: String,
    pub payload: String,
}

impl TryFrom<ThreadEventRow> for Envelope {
    type Error = BridgeError;

    fn try_from(row: ThreadEventRow) -> Result<Self, Self::Error> {
        let kind: EnvelopeType = serde_json::from_value(serde_json::Value::String(row.kind.clone()))
            .map_err(|_| BridgeError::internal(format!("unknown envelope type in store: {}", row.kind)))?;
        let payload = serde_json::from_str(&row.payload).map_err(|e| BridgeError::internal(e.to_string()))?;
        Ok(Envelope { kind, ts: row.ts, job_id: row.job_id, seq: row.seq.max(0) as u64, payload })
    }
}

/// The outcome of a successful [`Store::append_event`] call: the envelope
/// as persisted, and whether the job's state transitioned to terminal as
/// part of this write (informational only — the orchestrator decides state).
pub struct AppendedEvent {
    pub envelope: Envelope,
}

impl Store {
    /// Atomically reserve the job's next sequence number, insert the event
    /// row, and advance `jobs.next_seq`, keeping `seq` dense and gap-free
    /// under concurrent appends.
    pub async fn append_event(
        &self,
        thread_id: &str,
        job_id: &str,
        kind: EnvelopeType,
        payload: serde_json::Value,
    ) -> Result<AppendedEvent, BridgeError> {
        let mut tx = self.writer().begin().await.map_err(|e| BridgeError::internal(e.to_string()))?;

        let row = sqlx::query("SELECT next_seq FROM jobs WHERE id = ?")
            .bind(job_id)
            .fetch_one(&mut *tx)
            .await
            .map_err(|e| super::map_not_found(e, crate::error::ErrorCode::JobNotFound, "job not found"))?;
        let seq: i64 = row.try_get("next_seq").map_err(|e| BridgeError::internal(e.to_string()))?;

        let ts = Utc::now();
        let payload_text = serde_json::to_string(&payload).map_err(|e| BridgeError::internal(e.to_string()))?;
        let type_str = serde_json::to_value(kind)
            .ok()
            .and_then(|v| v.as_str().map(str::to_string))
            .unwrap_or_else(|| kind.as_str().to_string());

        sqlx::query("INSERT INTO events (thread_id, job_id, seq, ts, type, payload) VALUES (?, ?, ?, ?, ?, ?)")
            .bind(thread_id)
            .bind(job_id)
            .bind(seq)
            .bind(ts)
            .bind(&type_str)
            .bind(&payload_text)
            .execute(&mut *tx)
            .await
            .map_err(|e| BridgeError::internal(e.to_string()))?;

        sqlx::query("UPDATE jobs SET next_seq = ? WHERE id = ?")
            .bind(seq + 1)
            .bind(job_id)
            .execute(&mut *tx)
            .await
            .map_err(|e| BridgeError::internal(e.to_string()))?;

        tx.commit().await.map_err(|e| BridgeError::internal(e.to_string()))?;

        Ok(AppendedEvent { envelope: Envelope { kind, ts, job_id: job_id.to_string(), seq: seq.max(0) as u64, payload } })
    }

    /// All envelopes for `job_id` with `seq > cursor`, in order.
    pub async fn list_events_since(&self, job_id: &str, cursor: i64) -> Result<Vec<Envelope>, BridgeError> {
        let rows: Vec<EventRow> = sqlx::query_as("SELECT * FROM events WHERE job_id = ? AND seq > ? ORDER BY seq ASC")
            .bind(job_id)
            .bind(cursor)
            .fetch_all(self.reader())
            .await
            .map_err(|e| BridgeError::internal(e.to_string()))?;
        rows.into_iter().map(Envelope::try_from).collect()
    }

    /// Bulk-insert previously-assigned envelopes for a freshly created job,
    /// preserving their `seq` values, then advance `jobs.next_seq` past the
    /// highest one. Used only by thread import, where the seq sequence was
    /// already established by the exporting daemon.
    pub async fn import_events(&self, thread_id: &str, job_id: &str, envelopes: &[Envelope]) -> Result<(), BridgeError> {
        let mut tx = self.writer().begin().await.map_err(|e| BridgeError::internal(e.to_string()))?;

        let mut max_seq: i64 = -1;
        for (i, envelope) in envelopes.iter().enumerate() {
            let seq = i as i64;
            max_seq = max_seq.max(seq);
            let payload_text = serde_json::to_string(&envelope.payload).map_err(|e| BridgeError::internal(e.to_string()))?;
            let type_str = serde_json::to_value(envelope.kind)
                .ok()
                .and_then(|v| v.as_str().map(str::to_string))
                .unwrap_or_else(|| envelope.kind.as_str().to_string());

            sqlx::query("INSERT INTO events (thread_id, job_id, seq, ts, type, payload) VALUES (?, ?, ?, ?, ?, ?)")
                .bind(thread_id)
                .bind(job_id)
                .bind(seq)
                .bind(envelope.ts)
                .bind(&type_str)
                .bind(&payload_text)
                .execute(&mut *tx)
                .await
                .map_err(|e| BridgeError::internal(e.to_string()))?;
        }

        sqlx::query("UPDATE jobs SET next_seq = ? WHERE id = ?")
            .bind(max_seq + 1)
            .bind(job_id)
            .execute(&mut *tx)
            .await
            .map_err(|e| BridgeError::internal(e.to_string()))?;

        tx.commit().await.map_err(|e| BridgeError::internal(e.to_string()))?;
        Ok(())
    }

    /// Atomically discard a thread's entire event history and replace it
    /// with `envelopes` under `job_id`, which must already exist. Backs the
    /// full-replace projection rebuild `ThreadProjector::activate` performs
    /// when the agent successfully rehydrates a thread.
    pub async fn replace_thread_events(&self, thread_id: &str, job_id: &str, envelopes: &[Envelope]) -> Result<(), BridgeError> {
        let mut tx = self.writer().begin().await.map_err(|e| BridgeError::internal(e.to_string()))?;

        sqlx::query("DELETE FROM events WHERE thread_id = ?")
            .bind(thread_id)
            .execute(&mut *tx)
            .await
            .map_err(|e| BridgeError::internal(e.to_string()))?;

        let mut max_seq: i64 = -1;
        for (i, envelope) in envelopes.iter().enumerate() {
            let seq = i as i64;
            max_seq = max_seq.max(seq);
            let payload_text = serde_json::to_string(&envelope.payload).map_err(|e| BridgeError::internal(e.to_string()))?;
            let type_str = serde_json::to_value(envelope.kind)
                .ok()
                .and_then(|v| v.as_str().map(str::to_string))
                .unwrap_or_else(|| envelope.kind.as_str().to_string());

            sqlx::query("INSERT INTO events (thread_id, job_id, seq, ts, type, payload) VALUES (?, ?, ?, ?, ?, ?)")
                .bind(thread_id)
                .bind(job_id)
                .bind(seq)
                .bind(envelope.ts)
                .bind(&type_str)
                .bind(&payload_text)
                .execute(&mut *tx)
                .await
                .map_err(|e| BridgeError::internal(e.to_string()))?;
        }

        sqlx::query("UPDATE jobs SET next_seq = ? WHERE id = ?")
            .bind(max_seq + 1)
            .bind(job_id)
            .execute(&mut *tx)
            .await
            .map_err(|e| BridgeError::internal(e.to_string()))?;

        tx.commit().await.map_err(|e| BridgeError::internal(e.to_string()))?;
        Ok(())
    }

    /// Paged projection of all events for a thread across jobs, ordered by
    /// insertion order (`rowid`) rather than the per-job `seq` column: `seq`
    /// restarts at zero for every job (`PRIMARY KEY(job_id, seq)`), so a
    /// thread that has run more than one job needs a thread-wide ordinal to
    /// avoid interleaving distinct jobs' events out of order. Backs
    /// `listThreadEvents`; the returned cursor is opaque to callers.
    pub async fn list_thread_events(&self, thread_id: &str, cursor: i64, limit: i64) -> Result<(Vec<Envelope>, i64, bool, i64), BridgeError> {
        let total: i64 = sqlx::query("SELECT COUNT(*) as n FROM events WHERE thread_id = ?")
            .bind(thread_id)
            .fetch_one(self.reader())
            .await
            .map_err(|e| BridgeError::internal(e.to_string()))?
            .try_get("n")
            .map_err(|e| BridgeError::internal(e.to_string()))?;

        let rows: Vec<ThreadEventRow> = sqlx::query_as(
            "SELECT rowid AS ordinal, thread_id, job_id, seq, ts, type, payload FROM events \
             WHERE thread_id = ? AND rowid > ? ORDER BY rowid ASC LIMIT ?",
        )
        .bind(thread_id)
        .bind(cursor)
        .bind(limit)
        .fetch_all(self.reader())
        .await
        .map_err(|e| BridgeError::internal(e.to_string()))?;

        let next_cursor = rows.last().map(|r| r.ordinal).unwrap_or(cursor);
        let has_more = (rows.len() as i64) == limit
            && sqlx::query("SELECT COUNT(*) as n FROM events WHERE thread_id = ? AND rowid > ?")
                .bind(thread_id)
                .bind(next_cursor)
                .fetch_one(self.reader())
                .await
                .map_err(|e| BridgeError::internal(e.to_string()))?
                .try_get::<i64, _>("n")
                .map_err(|e| BridgeError::internal(e.to_string()))?
                > 0;

        let envelopes = rows.into_iter().map(Envelope::try_from).collect::<Result<Vec<_>, _>>()?;
        Ok((envelopes, next_cursor, has_more, total))
    }
}

#[cfg(test)]
#[path = "events_tests.rs"]
mod tests;
