// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Bearer-token authentication: an HTTP middleware layered over the whole
//! router except `/health`, plus a WebSocket upgrade variant that also
//! accepts `?token=` since browser WebSocket clients cannot set headers.

use std::sync::Arc;

use axum::extract::State;
use axum::http::{HeaderMap, Request, StatusCode};
use axum::middleware::Next;
use axum::response::{IntoResponse, Response};

use crate::error::ErrorCode;
use crate::http::state::AppState;
use crate::http::ErrorResponse;

/// Constant-time comparison to avoid a timing side-channel on the token.
fn constant_time_eq(a: &str, b: &str) -> bool {
    let (a, b) = (a.as_bytes(), b.as_bytes());
    if a.len() != b.len() {
        return false;
    }
    let mut acc = 0u8;
    for (x, y) in a.iter().zip(b.iter()) {
        acc |= x ^ y;
    }
    acc == 0
}

/// Validate a `Bearer <token>` HTTP header. `Ok(())` when auth is disabled
/// (`expected` is `None`) or the header matches.
pub fn validate_bearer(headers: &HeaderMap, expected: Option<&str>) -> Result<(), ErrorCode> {
    let Some(expected) = expected else { return Ok(()) };
    let header = headers.get("authorization").and_then(|v| v.to_str().ok()).ok_or(ErrorCode::Unauthorized)?;
    let token = header.strip_prefix("Bearer ").ok_or(ErrorCode::Unauthorized)?;
    if constant_time_eq(token, expected) {
        Ok(())
    } else {
        Err(ErrorCode::Unauthorized)
    }
}

/// Validate a token carried in a WebSocket upgrade's `?token=...` query
/// param.
pub fn validate_ws_query(token: Option<&str>, expected: Option<&str>) -> Result<(), ErrorCode> {
    let Some(expected) = expected else { return Ok(()) };
    match token {
        Some(t) if constant_time_eq(t, expected) => Ok(()),
        _ => Err(ErrorCode::Unauthorized),
    }
}

/// Validate a WebSocket upgrade request, which may carry the token either
/// as a standard Bearer header or as `?token=` (browser WebSocket clients
/// cannot set headers).
pub fn validate_ws_upgrade(headers: &HeaderMap, token: Option<&str>, expected: Option<&str>) -> Result<(), ErrorCode> {
    validate_bearer(headers, expected).or_else(|_| validate_ws_query(token, expected))
}

/// Whether this path is the terminal WebSocket upgrade endpoint, which
/// performs its own header-or-query-token validation in the handler.
fn is_terminal_stream_path(path: &str) -> bool {
    path.starts_with("/v1/terminals/") && path.ends_with("/stream")
}

/// Axum middleware enforcing Bearer auth on every route except `/health`
/// and the terminal stream upgrade (validated in its handler). A no-op
/// when `config.auth_token` is unset.
pub async fn auth_layer(State(state): State<Arc<AppState>>, req: Request<axum::body::Body>, next: Next) -> Response {
    let path = req.uri().path();
    if path == "/health" || is_terminal_stream_path(path) {
        return next.run(req).await;
    }

    if let Err(code) = validate_bearer(req.headers(), state.config.auth_token.as_deref()) {
        let body = ErrorResponse::from_code(code, "missing or invalid bearer token");
        return (StatusCode::from_u16(code.http_status()).unwrap_or(StatusCode::UNAUTHORIZED), axum::Json(body)).into_response();
    }

    next.run(req).await
}

#[cfg(test)]
#[path = "auth_tests.rs"]
mod tests;
