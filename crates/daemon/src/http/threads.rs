// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Thread lifecycle routes: create/list/activate/events/turns/archive and
//! the export/import package endpoints.

use std::path::Path;
use std::sync::Arc;

use axum::extract::{Path as AxumPath, Query, State};
use axum::http::StatusCode;
use axum::response::IntoResponse;
use axum::routing::{get, post};
use axum::{Json, Router};
use serde::Deserialize;
use serde_json::{json, Value};

use crate::error::{BridgeError, ErrorCode};

use super::state::AppState;

pub fn router() -> Router<Arc<AppState>> {
    Router::new()
        .route("/v1/threads", post(create_thread).get(list_threads))
        .route("/v1/threads/import", post(import_thread))
        .route("/v1/threads/{id}/activate", post(activate_thread))
        .route("/v1/threads/{id}/events", get(list_events))
        .route("/v1/threads/{id}/turns", post(start_turn))
        .route("/v1/threads/{id}/archive", post(archive_thread))
        .route("/v1/threads/{id}/unarchive", post(unarchive_thread))
        .route("/v1/threads/{id}/export", post(export_thread))
        .route("/v1/threads/{id}/terminal", get(terminal_status))
        .route("/v1/threads/{id}/terminal/open", post(open_terminal))
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct CreateThreadRequest {
    project_path: String,
    thread_name: Option<String>,
}

async fn create_thread(State(state): State<Arc<AppState>>, Json(req): Json<CreateThreadRequest>) -> Result<impl IntoResponse, BridgeError> {
    if !state.config.path_allowed(Path::new(&req.project_path)) {
        return Err(BridgeError::new(ErrorCode::FsPathForbidden, "project path is not in the configured whitelist"));
    }
    let id = uuid::Uuid::new_v4().to_string();
    let thread = state.store.create_thread(&id, &req.project_path, req.thread_name.as_deref()).await?;
    Ok((StatusCode::CREATED, Json(thread)))
}

#[derive(Debug, Deserialize)]
struct ListThreadsQuery {
    #[serde(default)]
    archived: bool,
}

async fn list_threads(State(state): State<Arc<AppState>>, Query(q): Query<ListThreadsQuery>) -> Result<impl IntoResponse, BridgeError> {
    let threads = state.store.list_threads(q.archived).await?;
    Ok(Json(threads))
}

async fn activate_thread(State(state): State<Arc<AppState>>, AxumPath(id): AxumPath<String>) -> Result<impl IntoResponse, BridgeError> {
    state.projector.activate(&id).await?;
    let thread = state.store.get_thread(&id).await?;
    Ok(Json(thread))
}

#[derive(Debug, Deserialize)]
struct EventsQuery {
    #[serde(default)]
    cursor: i64,
    #[serde(default = "default_limit")]
    limit: i64,
}

fn default_limit() -> i64 {
    100
}

async fn list_events(
    State(state): State<Arc<AppState>>,
    AxumPath(id): AxumPath<String>,
    Query(q): Query<EventsQuery>,
) -> Result<impl IntoResponse, BridgeError> {
    let page = state.projector.list_events(&id, q.cursor, q.limit).await?;
    Ok(Json(page))
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct StartTurnRequest {
    text: String,
    #[serde(default = "default_approval_policy")]
    approval_policy: String,
    #[serde(default = "default_sandbox")]
    sandbox: String,
    model: Option<String>,
}

fn default_approval_policy() -> String {
    "on-request".to_string()
}

fn default_sandbox() -> String {
    "workspace-write".to_string()
}

async fn start_turn(
    State(state): State<Arc<AppState>>,
    AxumPath(id): AxumPath<String>,
    Json(req): Json<StartTurnRequest>,
) -> Result<impl IntoResponse, BridgeError> {
    let job_id = uuid::Uuid::new_v4().to_string();
    let job = state
        .orchestrator
        .start_turn(&id, &job_id, &req.text, &req.approval_policy, &req.sandbox, req.model.as_deref())
        .await?;
    Ok((StatusCode::ACCEPTED, Json(json!({"jobId": job.id}))))
}

async fn archive_thread(State(state): State<Arc<AppState>>, AxumPath(id): AxumPath<String>) -> Result<impl IntoResponse, BridgeError> {
    let thread = state.store.set_thread_archived(&id, true).await?;
    Ok(Json(thread))
}

async fn unarchive_thread(State(state): State<Arc<AppState>>, AxumPath(id): AxumPath<String>) -> Result<impl IntoResponse, BridgeError> {
    let thread = state.store.set_thread_archived(&id, false).await?;
    Ok(Json(thread))
}

async fn export_thread(State(state): State<Arc<AppState>>, AxumPath(id): AxumPath<String>) -> Result<impl IntoResponse, BridgeError> {
    let result = state.transfer.export(&id).await?;
    Ok(Json(json!({"path": result.package_path})))
}

#[derive(Debug, Deserialize)]
struct ImportThreadRequest {
    path: String,
}

async fn import_thread(State(state): State<Arc<AppState>>, Json(req): Json<ImportThreadRequest>) -> Result<impl IntoResponse, BridgeError> {
    let result = state.transfer.import(Path::new(&req.path)).await?;
    Ok((StatusCode::CREATED, Json(json!({"targetThreadId": result.thread_id, "path": result.package_path}))))
}

async fn terminal_status(State(state): State<Arc<AppState>>, AxumPath(id): AxumPath<String>) -> Result<impl IntoResponse, BridgeError> {
    let status: Option<Value> = state.terminal.status_for_thread(&id).await.map(|info| serde_json::to_value(info).unwrap_or(Value::Null));
    Ok(Json(status))
}

#[derive(Debug, Deserialize)]
struct OpenTerminalRequest {
    cwd: String,
    #[serde(default = "default_cols")]
    cols: u16,
    #[serde(default = "default_rows")]
    rows: u16,
}

fn default_cols() -> u16 {
    80
}

fn default_rows() -> u16 {
    24
}

async fn open_terminal(
    State(state): State<Arc<AppState>>,
    AxumPath(id): AxumPath<String>,
    Json(req): Json<OpenTerminalRequest>,
) -> Result<impl IntoResponse, BridgeError> {
    if !state.config.path_allowed(Path::new(&req.cwd)) {
        return Err(BridgeError::new(ErrorCode::FsPathForbidden, "terminal cwd is not in the configured whitelist"));
    }
    let info = state.terminal.open_session(&id, &req.cwd, req.cols, req.rows).await?;
    let ws_path = format!("/v1/terminals/{}/stream", info.id);
    Ok(Json(json!({"session": info, "wsPath": ws_path})))
}

#[cfg(test)]
#[path = "threads_tests.rs"]
mod tests;
