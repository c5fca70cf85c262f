// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Miscellaneous routes: the configured project whitelist, and the
//! normalized model list proxied from the agent.

use std::sync::Arc;

use axum::extract::State;
use axum::response::IntoResponse;
use axum::routing::get;
use axum::{Json, Router};
use serde_json::{json, Value};

use crate::error::BridgeError;

use super::state::AppState;

pub fn router() -> Router<Arc<AppState>> {
    Router::new().route("/v1/projects", get(projects)).route("/v1/models", get(models))
}

async fn projects(State(state): State<Arc<AppState>>) -> impl IntoResponse {
    let paths: Vec<String> = state.config.project_whitelist.iter().map(|p| p.display().to_string()).collect();
    Json(json!({"projects": paths}))
}

async fn models(State(state): State<Arc<AppState>>) -> Result<impl IntoResponse, BridgeError> {
    let result = state.agent.request("models/list", json!({})).await.map_err(|e| BridgeError::new(crate::error::ErrorCode::AgentUnavailable, e.to_string()))?;
    let models = result.get("models").cloned().unwrap_or(Value::Array(Vec::new()));
    Ok(Json(json!({"models": models})))
}

#[cfg(test)]
#[path = "misc_tests.rs"]
mod tests;
