// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Job routes: snapshot, the events feed (SSE when the client asks for
//! `text/event-stream`, a JSON batch otherwise), approve, and cancel.

use std::convert::Infallible;
use std::sync::Arc;
use std::time::Duration;

use axum::extract::{Path as AxumPath, Query, State};
use axum::http::{header, HeaderMap, StatusCode};
use axum::response::sse::{Event, KeepAlive, Sse};
use axum::response::{IntoResponse, Response};
use axum::routing::{get, post};
use axum::{Json, Router};
use futures_util::stream::{self, Stream, StreamExt};
use serde::Deserialize;
use serde_json::{json, Value};
use tokio::sync::broadcast;

use crate::envelope::Envelope;
use crate::error::BridgeError;

use super::state::AppState;

pub fn router() -> Router<Arc<AppState>> {
    Router::new()
        .route("/v1/jobs/{id}", get(get_job))
        .route("/v1/jobs/{id}/events", get(job_events))
        .route("/v1/jobs/{id}/approve", post(approve))
        .route("/v1/jobs/{id}/cancel", post(cancel))
}

async fn get_job(State(state): State<Arc<AppState>>, AxumPath(id): AxumPath<String>) -> Result<impl IntoResponse, BridgeError> {
    let job = state.store.get_job(&id).await?;
    Ok(Json(job))
}

#[derive(Debug, Deserialize)]
struct EventsQuery {
    cursor: Option<i64>,
}

fn wants_sse(headers: &HeaderMap) -> bool {
    headers.get(header::ACCEPT).and_then(|v| v.to_str().ok()).map(|v| v.contains("text/event-stream")).unwrap_or(false)
}

fn envelope_event(envelope: &Envelope) -> Result<Event, Infallible> {
    let data = serde_json::to_string(envelope).unwrap_or_else(|_| "{}".to_string());
    Ok(Event::default().id(envelope.seq.to_string()).event(envelope.kind.as_str()).data(data))
}

/// Tail live envelopes with `seq > after`. The lower bound drops any frame
/// that raced onto the broadcast channel while the replay page was being
/// read, so subscribers never see a seq twice. A subscriber that lags past
/// the channel's buffer is closed rather than served a gap; it reconnects
/// with its cursor.
fn live_stream(rx: broadcast::Receiver<Envelope>, after: i64) -> impl Stream<Item = Result<Event, Infallible>> {
    stream::unfold(rx, move |mut rx| async move {
        loop {
            match rx.recv().await {
                Ok(envelope) if (envelope.seq as i64) <= after => continue,
                Ok(envelope) => return Some((envelope_event(&envelope), rx)),
                Err(broadcast::error::RecvError::Lagged(_)) => return None,
                Err(broadcast::error::RecvError::Closed) => return None,
            }
        }
    })
}

async fn job_events(
    State(state): State<Arc<AppState>>,
    AxumPath(id): AxumPath<String>,
    Query(q): Query<EventsQuery>,
    headers: HeaderMap,
) -> Result<Response, BridgeError> {
    if !wants_sse(&headers) {
        let page = state.hub.list(&id, q.cursor).await?;
        return Ok(Json(json!({
            "events": page.envelopes,
            "nextCursor": page.next_cursor,
            "firstSeq": page.first_retained_seq,
        }))
        .into_response());
    }

    let (page, rx) = state.hub.subscribe(&id, q.cursor).await?;
    let snapshot = Ok(Event::default().event("snapshot").data(json!({"cursor": page.next_cursor}).to_string()));
    let replay: Vec<Result<Event, Infallible>> = page.envelopes.iter().map(envelope_event).collect();
    let combined = stream::once(async { snapshot }).chain(stream::iter(replay)).chain(live_stream(rx, page.next_cursor));

    let sse = Sse::new(combined).keep_alive(KeepAlive::new().interval(Duration::from_secs(15)).text("ping"));
    Ok(sse.into_response())
}

// Field names are accepted in both camelCase and snake_case, per the
// decision-input contract.
#[derive(Debug, Deserialize)]
struct ApproveRequest {
    #[serde(rename = "approvalId", alias = "approval_id")]
    approval_id: String,
    #[serde(flatten)]
    decision_body: Value,
}

async fn approve(State(state): State<Arc<AppState>>, AxumPath(id): AxumPath<String>, Json(req): Json<ApproveRequest>) -> Result<impl IntoResponse, BridgeError> {
    let approval = state.approvals.get(&req.approval_id).await?;
    if approval.job_id != id {
        return Err(BridgeError::new(crate::error::ErrorCode::ApprovalNotFound, "approval does not belong to this job"));
    }

    let kind = crate::approval::parse_decision_kind(&req.decision_body)?;
    let amendment = req.decision_body.get("amendment").cloned();
    let decline_reason = req
        .decision_body
        .get("declineReason")
        .or_else(|| req.decision_body.get("decline_reason"))
        .and_then(Value::as_str)
        .map(str::to_string);

    let outcome = state.orchestrator.record_approval_decision(&req.approval_id, kind, amendment, decline_reason).await?;
    let status = match outcome {
        crate::approval::RecordOutcome::Submitted => "submitted",
        crate::approval::RecordOutcome::AlreadySubmitted => "already_submitted",
    };
    Ok((StatusCode::OK, Json(json!({"status": status}))))
}

async fn cancel(State(state): State<Arc<AppState>>, AxumPath(id): AxumPath<String>) -> Result<impl IntoResponse, BridgeError> {
    state.orchestrator.cancel_job(&id).await?;
    Ok(Json(json!({"status": "cancelling"})))
}

#[cfg(test)]
#[path = "jobs_tests.rs"]
mod tests;
