// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! The boundary (C9): axum router assembly, bearer auth, and the shared
//! error-response shape for REST, SSE, and WebSocket transports.

pub mod auth;
mod jobs;
mod misc;
mod push;
pub mod state;
mod terminal;
mod threads;

#[cfg(test)]
mod test_support;

use std::sync::Arc;

use axum::extract::State;
use axum::http::StatusCode;
use axum::middleware;
use axum::response::{IntoResponse, Response};
use axum::routing::get;
use axum::{Json, Router};
use serde::Serialize;
use serde_json::json;

use tower_http::cors::CorsLayer;
use tower_http::trace::TraceLayer;

use crate::error::{BridgeError, ErrorCode};
use state::AppState;

/// `{"error":{"code":"<SCREAMING_SNAKE>","message":"<human>"}}`.
#[derive(Debug, Serialize)]
pub struct ErrorResponse {
    pub error: ErrorBody,
}

#[derive(Debug, Serialize)]
pub struct ErrorBody {
    pub code: &'static str,
    pub message: String,
}

impl ErrorResponse {
    pub fn from_code(code: ErrorCode, message: impl Into<String>) -> Self {
        Self { error: ErrorBody { code: code.as_str(), message: message.into() } }
    }
}

impl IntoResponse for BridgeError {
    fn into_response(self) -> Response {
        let status = StatusCode::from_u16(self.code.http_status()).unwrap_or(StatusCode::INTERNAL_SERVER_ERROR);
        (status, Json(ErrorResponse::from_code(self.code, self.message))).into_response()
    }
}

async fn health(State(state): State<Arc<AppState>>) -> impl IntoResponse {
    Json(json!({"status": "ok", "authEnabled": state.config.auth_token.is_some()}))
}

/// Assemble the full router: every `/v1/...` route plus `/health`, with
/// bearer auth layered over everything except `/health`.
pub fn build_router(state: Arc<AppState>) -> Router {
    Router::new()
        .merge(threads::router())
        .merge(jobs::router())
        .merge(terminal::router())
        .merge(push::router())
        .merge(misc::router())
        .route("/health", get(health))
        .layer(middleware::from_fn_with_state(state.clone(), auth::auth_layer))
        .layer(CorsLayer::permissive())
        .layer(TraceLayer::new_for_http())
        .with_state(state)
}

#[cfg(test)]
#[path = "mod_tests.rs"]
mod tests;
