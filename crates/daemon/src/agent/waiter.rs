// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

use std::collections::HashMap;
use std::sync::Arc;

use serde_json::Value;
use tokio::sync::{oneshot, Mutex};

/// An error returned by an agent RPC call: either the agent's own
/// JSON-RPC error object, or a transport-level failure.
#[derive(Debug, Clone)]
pub enum AgentRpcError {
    Agent { code: i64, message: String },
    TransportClosed,
}

impl AgentRpcError {
    pub fn from_json(value: &Value) -> Self {
        let code = value.get("code").and_then(Value::as_i64).unwrap_or(-32000);
        let message = value.get("message").and_then(Value::as_str).unwrap_or("agent error").to_string();
        Self::Agent { code, message }
    }
}

impl std::fmt::Display for AgentRpcError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Agent { code, message } => write!(f, "agent error {code}: {message}"),
            Self::TransportClosed => write!(f, "agent transport closed"),
        }
    }
}

impl std::error::Error for AgentRpcError {}

type Waiter = oneshot::Sender<Result<Value, AgentRpcError>>;

/// Correlation table from outgoing request id to the waiter that should be
/// completed when a matching response frame arrives.
#[derive(Clone)]
pub struct WaiterTable {
    inner: Arc<Mutex<HashMap<i64, Waiter>>>,
}

impl WaiterTable {
    pub fn new() -> Self {
        Self { inner: Arc::new(Mutex::new(HashMap::new())) }
    }

    pub async fn register(&self, id: i64, tx: Waiter) {
        self.inner.lock().await.insert(id, tx);
    }

    pub async fn remove(&self, id: i64) {
        self.inner.lock().await.remove(&id);
    }

    pub async fn complete(&self, id: i64, outcome: Result<Value, AgentRpcError>) {
        if let Some(tx) = self.inner.lock().await.remove(&id) {
            let _ = tx.send(outcome);
        }
    }

    pub async fn fail_all(&self, error: AgentRpcError) {
        let mut waiters = self.inner.lock().await;
        for (_, tx) in waiters.drain() {
            let _ = tx.send(Err(error.clone()));
        }
    }
}

#[cfg(test)]
#[path = "waiter_tests.rs"]
mod tests;
