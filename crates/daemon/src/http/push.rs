// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Push device registry routes.

use std::sync::Arc;

use axum::extract::State;
use axum::response::IntoResponse;
use axum::routing::post;
use axum::{Json, Router};
use serde::Deserialize;
use serde_json::json;

use crate::domain::PushDevice;
use crate::error::BridgeError;

use super::state::AppState;

pub fn router() -> Router<Arc<AppState>> {
    Router::new().route("/v1/push/devices/register", post(register)).route("/v1/push/devices/unregister", post(unregister))
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct RegisterRequest {
    token: String,
    platform: String,
    bundle: String,
    environment: String,
    thread_scope: Option<String>,
}

async fn register(State(state): State<Arc<AppState>>, Json(req): Json<RegisterRequest>) -> Result<impl IntoResponse, BridgeError> {
    let device = PushDevice { token: req.token, platform: req.platform, bundle: req.bundle, environment: req.environment, thread_scope: req.thread_scope };
    state.store.register_push_device(&device).await?;
    Ok(Json(json!({"status": "ok"})))
}

#[derive(Debug, Deserialize)]
struct UnregisterRequest {
    token: String,
}

async fn unregister(State(state): State<Arc<AppState>>, Json(req): Json<UnregisterRequest>) -> Result<impl IntoResponse, BridgeError> {
    state.store.unregister_push_device(&req.token).await?;
    Ok(Json(json!({"status": "ok"})))
}

#[cfg(test)]
#[path = "push_tests.rs"]
mod tests;
