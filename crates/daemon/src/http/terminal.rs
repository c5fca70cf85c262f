// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Terminal routes: resize/close REST control plus the WebSocket stream
//! that carries PTY input/output frames.

use std::sync::Arc;

use axum::extract::ws::{Message, WebSocket, WebSocketUpgrade};
use axum::extract::{Path as AxumPath, Query, State};
use axum::http::HeaderMap;
use axum::response::IntoResponse;
use axum::routing::post;
use axum::{Json, Router};
use base64::engine::general_purpose::STANDARD as BASE64;
use base64::Engine;
use bytes::Bytes;
use serde::Deserialize;
use serde_json::{json, Value};

use crate::error::BridgeError;
use crate::terminal::OutputFrame;

use super::auth::validate_ws_upgrade;
use super::state::AppState;

pub fn router() -> Router<Arc<AppState>> {
    Router::new()
        .route("/v1/terminals/{sid}/resize", post(resize))
        .route("/v1/terminals/{sid}/close", post(close))
        .route("/v1/terminals/{sid}/stream", axum::routing::get(stream))
}

#[derive(Debug, Deserialize)]
struct ResizeRequest {
    cols: u16,
    rows: u16,
}

async fn resize(State(state): State<Arc<AppState>>, AxumPath(sid): AxumPath<String>, Json(req): Json<ResizeRequest>) -> Result<impl IntoResponse, BridgeError> {
    state.terminal.resize(&sid, req.cols, req.rows).await?;
    Ok(Json(json!({"status": "ok"})))
}

#[derive(Debug, Deserialize, Default)]
struct CloseRequest {
    #[serde(default)]
    reason: Option<String>,
}

async fn close(State(state): State<Arc<AppState>>, AxumPath(sid): AxumPath<String>, Json(body): Json<CloseRequest>) -> impl IntoResponse {
    let reason = body.reason.unwrap_or_else(|| "client-requested".to_string());
    state.terminal.close_session(&sid, &reason).await;
    Json(json!({"status": "ok"}))
}

#[derive(Debug, Deserialize)]
struct StreamQuery {
    #[serde(rename = "fromSeq")]
    from_seq: Option<u64>,
    token: Option<String>,
}

async fn stream(
    ws: WebSocketUpgrade,
    State(state): State<Arc<AppState>>,
    AxumPath(sid): AxumPath<String>,
    Query(q): Query<StreamQuery>,
    headers: HeaderMap,
) -> Result<impl IntoResponse, BridgeError> {
    validate_ws_upgrade(&headers, q.token.as_deref(), state.config.auth_token.as_deref())
        .map_err(|code| BridgeError::new(code, "invalid or missing terminal auth token"))?;
    Ok(ws.on_upgrade(move |socket| run_session(socket, state, sid, q.from_seq)))
}

async fn run_session(mut socket: WebSocket, state: Arc<AppState>, sid: String, from_seq: Option<u64>) {
    // Attach after the upgrade so a stale cursor (or vanished session)
    // surfaces as an in-stream error frame the client can react to.
    let mut attach = match state.terminal.attach_client(&sid, from_seq).await {
        Ok(attach) => attach,
        Err(err) => {
            let frame = json!({"type": "error", "code": err.code.as_str(), "message": err.message});
            let _ = socket.send(Message::Text(frame.to_string().into())).await;
            return;
        }
    };

    let ready = json!({
        "type": "ready",
        "sessionId": attach.info.id,
        "threadId": attach.info.thread_id,
        "cwd": attach.info.cwd,
        "transportMode": attach.info.transport_mode,
    });
    if socket.send(Message::Text(ready.to_string().into())).await.is_err() {
        return;
    }

    // A frame can land in both the replay snapshot and the broadcast queue;
    // tracking the last delivered seq keeps delivery strictly increasing.
    let mut last_seq = attach.replay.last().map(|(seq, _)| *seq);
    for (seq, data) in attach.replay.drain(..) {
        let frame = json!({"type": "output", "seq": seq, "data": BASE64.encode(&data)});
        if socket.send(Message::Text(frame.to_string().into())).await.is_err() {
            return;
        }
    }

    let session_id = attach.info.id.clone();
    loop {
        tokio::select! {
            incoming = socket.recv() => {
                let Some(Ok(msg)) = incoming else { break };
                match msg {
                    Message::Text(text) => {
                        if !handle_client_frame(&mut socket, &state, &session_id, &text).await {
                            break;
                        }
                    }
                    Message::Close(_) => break,
                    _ => {}
                }
            }
            frame = attach.receiver.recv() => {
                match frame {
                    Ok(OutputFrame::Output { seq, data }) => {
                        if last_seq.is_some_and(|delivered| seq <= delivered) {
                            continue;
                        }
                        last_seq = Some(seq);
                        let frame = json!({"type": "output", "seq": seq, "data": BASE64.encode(&data)});
                        if socket.send(Message::Text(frame.to_string().into())).await.is_err() {
                            break;
                        }
                    }
                    Ok(OutputFrame::Exit { exit_code, exit_signal }) => {
                        let frame = json!({"type": "exit", "exitCode": exit_code, "signal": exit_signal});
                        let _ = socket.send(Message::Text(frame.to_string().into())).await;
                        break;
                    }
                    Err(tokio::sync::broadcast::error::RecvError::Lagged(_)) => {
                        // Fell behind the fan-out buffer; the client must
                        // reconnect and take a replay instead of a gap.
                        let frame = json!({"type": "error", "code": "TERMINAL_CURSOR_EXPIRED", "message": "client fell behind live output"});
                        let _ = socket.send(Message::Text(frame.to_string().into())).await;
                        break;
                    }
                    Err(tokio::sync::broadcast::error::RecvError::Closed) => break,
                }
            }
        }
    }
}

/// Handle one client→server frame. Returns `false` when the connection
/// should close (an explicit `detach`).
async fn handle_client_frame(socket: &mut WebSocket, state: &Arc<AppState>, session_id: &str, text: &str) -> bool {
    let Ok(value) = serde_json::from_str::<Value>(text) else {
        let _ = socket.send(Message::Text(json!({"type":"error","code":"BAD_REQUEST","message":"malformed frame"}).to_string().into())).await;
        return true;
    };
    let msg_type = value.get("type").and_then(Value::as_str).unwrap_or("");

    match msg_type {
        "input" => {
            if let Some(data) = value.get("data").and_then(Value::as_str) {
                if let Ok(decoded) = BASE64.decode(data) {
                    let _ = state.terminal.write_input(session_id, Bytes::from(decoded)).await;
                }
            }
            true
        }
        "resize" => {
            let cols = value.get("cols").and_then(Value::as_u64).unwrap_or(80) as u16;
            let rows = value.get("rows").and_then(Value::as_u64).unwrap_or(24) as u16;
            let _ = state.terminal.resize(session_id, cols, rows).await;
            true
        }
        "ping" => {
            let client_ts = value.get("clientTs").cloned().unwrap_or(Value::Null);
            let _ = socket.send(Message::Text(json!({"type": "pong", "clientTs": client_ts}).to_string().into())).await;
            true
        }
        "detach" => false,
        _ => true,
    }
}

#[cfg(test)]
#[path = "terminal_tests.rs"]
mod tests;
