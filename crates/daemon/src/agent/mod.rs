// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! The agent transport: spawns the configured agent binary, frames its
//! stdio as JSON-RPC, and exposes request/notify/respond primitives plus an
//! inbound event surface for agent-initiated notifications and requests.
//!
//! Restart is never attempted: the child is fail-stop for the lifetime of
//! the daemon run. On transport close every outstanding waiter is failed
//! and the inbound channel is closed, which the orchestrator treats as a
//! signal to mark in-flight jobs `FAILED`.

mod waiter;

use std::path::Path;
use std::sync::atomic::{AtomicI64, Ordering};
use std::sync::Arc;

use futures_util::{SinkExt, StreamExt};
use serde_json::{json, Value};
use tokio::io::{AsyncBufReadExt, BufReader};
use tokio::process::{Child, Command};
use tokio::sync::{mpsc, oneshot, Mutex};
use tokio_util::codec::{FramedRead, FramedWrite};

use crate::codec::JsonRpcCodec;
use crate::error::BridgeError;

pub use waiter::AgentRpcError;
use waiter::WaiterTable;

/// A frame the agent sent without the daemon having asked for it: either a
/// fire-and-forget notification, or a request the daemon must answer.
#[derive(Debug, Clone)]
pub enum InboundFrame {
    Notification { method: String, params: Value },
    Request { id: Value, method: String, params: Value },
}

/// A handle to a running agent child process. Cheap to clone; the reader,
/// writer, and stderr-logging tasks are detached and keep the process alive
/// until it exits or [`AgentTransport::shutdown`] is called.
#[derive(Clone)]
pub struct AgentTransport {
    next_id: Arc<AtomicI64>,
    outbound_tx: mpsc::UnboundedSender<Value>,
    waiters: WaiterTable,
    child: Arc<Mutex<Option<Child>>>,
}

impl AgentTransport {
    /// Spawn `command` with `cwd` as its working directory, wire up the
    /// reader/writer tasks, perform the `initialize` handshake, and return
    /// the transport plus the channel of frames the agent sends unsolicited.
    pub async fn spawn(command: &[String], cwd: &Path) -> Result<(Self, mpsc::UnboundedReceiver<InboundFrame>), BridgeError> {
        let (program, args) = command.split_first().ok_or_else(|| BridgeError::internal("empty agent command"))?;

        let mut child = Command::new(program)
            .args(args)
            .current_dir(cwd)
            .stdin(std::process::Stdio::piped())
            .stdout(std::process::Stdio::piped())
            .stderr(std::process::Stdio::piped())
            .kill_on_drop(true)
            .spawn()
            .map_err(|e| BridgeError::internal(format!("spawning agent: {e}")))?;

        let stdin = child.stdin.take().ok_or_else(|| BridgeError::internal("agent child missing stdin"))?;
        let stdout = child.stdout.take().ok_or_else(|| BridgeError::internal("agent child missing stdout"))?;
        let stderr = child.stderr.take().ok_or_else(|| BridgeError::internal("agent child missing stderr"))?;

        let (outbound_tx, outbound_rx) = mpsc::unbounded_channel::<Value>();
        let (inbound_tx, inbound_rx) = mpsc::unbounded_channel::<InboundFrame>();
        let waiters = WaiterTable::new();

        tokio::spawn(writer_loop(FramedWrite::new(stdin, JsonRpcCodec::new()), outbound_rx));
        tokio::spawn(reader_loop(FramedRead::new(stdout, JsonRpcCodec::new()), waiters.clone(), inbound_tx));
        tokio::spawn(stderr_loop(stderr));

        let transport = Self {
            next_id: Arc::new(AtomicI64::new(1)),
            outbound_tx,
            waiters,
            child: Arc::new(Mutex::new(Some(child))),
        };

        transport.request("initialize", json!({})).await?;

        Ok((transport, inbound_rx))
    }

    /// Send a request and await its matched response.
    pub async fn request(&self, method: &str, params: Value) -> Result<Value, AgentRpcError> {
        let id = self.next_id.fetch_add(1, Ordering::SeqCst);
        let (tx, rx) = oneshot::channel();
        self.waiters.register(id, tx).await;

        let frame = json!({"jsonrpc": "2.0", "id": id, "method": method, "params": params});
        if self.outbound_tx.send(frame).is_err() {
            self.waiters.remove(id).await;
            return Err(AgentRpcError::TransportClosed);
        }

        rx.await.unwrap_or(Err(AgentRpcError::TransportClosed))
    }

    /// Send a fire-and-forget notification.
    pub fn notify(&self, method: &str, params: Value) -> Result<(), BridgeError> {
        let frame = json!({"jsonrpc": "2.0", "method": method, "params": params});
        self.outbound_tx.send(frame).map_err(|_| BridgeError::internal("agent transport closed"))
    }

    /// Answer a server-initiated request the agent sent us.
    pub fn respond(&self, id: Value, result: Value) -> Result<(), BridgeError> {
        let frame = json!({"jsonrpc": "2.0", "id": id, "result": result});
        self.outbound_tx.send(frame).map_err(|_| BridgeError::internal("agent transport closed"))
    }

    pub fn respond_error(&self, id: Value, code: i64, message: &str) -> Result<(), BridgeError> {
        let frame = json!({"jsonrpc": "2.0", "id": id, "error": {"code": code, "message": message}});
        self.outbound_tx.send(frame).map_err(|_| BridgeError::internal("agent transport closed"))
    }

    /// Best-effort interrupt signal to the agent, used by job cancellation.
    pub async fn interrupt_turn(&self, turn_id: &str) -> Result<Value, AgentRpcError> {
        self.request("turn/interrupt", json!({"turnId": turn_id})).await
    }

    pub async fn shutdown(&self) {
        if let Some(mut child) = self.child.lock().await.take() {
            let _ = child.start_kill();
        }
    }
}

async fn writer_loop(mut sink: FramedWrite<tokio::process::ChildStdin, JsonRpcCodec>, mut rx: mpsc::UnboundedReceiver<Value>) {
    while let Some(frame) = rx.recv().await {
        if sink.send(frame).await.is_err() {
            break;
        }
    }
}

async fn reader_loop(
    mut stream: FramedRead<tokio::process::ChildStdout, JsonRpcCodec>,
    waiters: WaiterTable,
    inbound_tx: mpsc::UnboundedSender<InboundFrame>,
) {
    while let Some(result) = stream.next().await {
        let Ok(value) = result else {
            tracing::warn!("agent transport framing error, treating as transport-closed");
            break;
        };

        let id = value.get("id").cloned();
        let has_result_or_error = value.get("result").is_some() || value.get("error").is_some();

        if let (Some(id), true) = (&id, has_result_or_error) {
            if let Some(int_id) = id.as_i64() {
                let outcome = match value.get("error") {
                    Some(err) => Err(AgentRpcError::from_json(err)),
                    None => Ok(value.get("result").cloned().unwrap_or(Value::Null)),
                };
                waiters.complete(int_id, outcome).await;
                continue;
            }
        }

        let method = value.get("method").and_then(|m| m.as_str()).map(str::to_string);
        match (method, id) {
            (Some(method), Some(id)) => {
                let params = value.get("params").cloned().unwrap_or(Value::Null);
                let _ = inbound_tx.send(InboundFrame::Request { id, method, params });
            }
            (Some(method), None) => {
                let params = value.get("params").cloned().unwrap_or(Value::Null);
                let _ = inbound_tx.send(InboundFrame::Notification { method, params });
            }
            _ => tracing::warn!(frame = %value, "unrecognized frame from agent"),
        }
    }

    waiters.fail_all(AgentRpcError::TransportClosed).await;
}

async fn stderr_loop(stderr: tokio::process::ChildStderr) {
    let mut lines = BufReader::new(stderr).lines();
    while let Ok(Some(line)) = lines.next_line().await {
        tracing::debug!(target: "agent.stderr", "{line}");
    }
}

#[cfg(test)]
#[path = "mod_tests.rs"]
mod tests;
