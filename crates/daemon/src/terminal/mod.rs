// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! The terminal manager (C8): long-lived PTY (or pipe-fallback) sessions
//! keyed by thread, with a per-session output ring for replay, frame
//! sequencing, idle reclaim, and multi-client fan-out.

pub mod nbio;
pub mod pty;
pub mod ring;
pub mod sweeper;

use std::collections::HashMap;
use std::path::Path;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;
use std::time::Duration;

use bytes::Bytes;
use chrono::{DateTime, Utc};
use tokio::sync::{broadcast, mpsc, Mutex, RwLock};

use crate::domain::{TerminalSessionInfo, TerminalStatus, TransportMode};
use crate::error::{BridgeError, ErrorCode};

use pty::{spawn_backend, Backend, ExitStatus};
use ring::OutputRing;

/// A frame fanned out to attached WebSocket clients.
#[derive(Debug, Clone)]
pub enum OutputFrame {
    Output { seq: u64, data: Bytes },
    Exit { exit_code: Option<i32>, exit_signal: Option<String> },
}

struct SessionState {
    status: TerminalStatus,
    exit_code: Option<i32>,
    exit_signal: Option<String>,
    last_activity_at: DateTime<Utc>,
    cols: u16,
    rows: u16,
}

struct Session {
    id: String,
    thread_id: String,
    cwd: String,
    pid: Option<u32>,
    transport_mode: TransportMode,
    created_at: DateTime<Utc>,
    state: Mutex<SessionState>,
    ring: Mutex<OutputRing>,
    broadcast_tx: broadcast::Sender<OutputFrame>,
    input_tx: mpsc::Sender<Bytes>,
    resize_tx: mpsc::Sender<(u16, u16)>,
    attached_clients: AtomicUsize,
}

impl Session {
    async fn info(&self) -> TerminalSessionInfo {
        let state = self.state.lock().await;
        TerminalSessionInfo {
            id: self.id.clone(),
            thread_id: self.thread_id.clone(),
            pid: self.pid.map(|p| p as i32).unwrap_or(-1),
            cwd: self.cwd.clone(),
            cols: state.cols,
            rows: state.rows,
            status: state.status,
            exit_code: state.exit_code,
            exit_signal: state.exit_signal.clone(),
            transport_mode: self.transport_mode,
            last_activity_at: state.last_activity_at,
        }
    }
}

/// A snapshot of a session's idle-eligibility-relevant state, used by the
/// sweeper without holding any session lock for the duration of a sweep.
pub struct SessionSnapshot {
    pub id: String,
    pub attached_clients: usize,
    pub idle_for: Duration,
}

/// RAII handle returned by [`TerminalManager::attach_client`]; dropping it
/// decrements the session's attached-client count (`detachClient`).
pub struct ClientAttachment {
    session: Arc<Session>,
}

impl std::fmt::Debug for ClientAttachment {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ClientAttachment").field("session_id", &self.session.id).finish()
    }
}

impl Drop for ClientAttachment {
    fn drop(&mut self) {
        self.session.attached_clients.fetch_sub(1, Ordering::SeqCst);
    }
}

#[derive(Debug)]
pub struct AttachResult {
    pub info: TerminalSessionInfo,
    pub replay: Vec<(u64, Bytes)>,
    pub receiver: broadcast::Receiver<OutputFrame>,
    pub attachment: ClientAttachment,
}

/// Manages one running terminal session per thread at most.
pub struct TerminalManager {
    sessions: RwLock<HashMap<String, Arc<Session>>>,
    by_thread: RwLock<HashMap<String, String>>,
    /// Serializes the lookup-or-spawn in [`Self::open_session`] per thread,
    /// so two concurrent opens cannot both miss the existing-session check
    /// and spawn twice.
    open_locks: Mutex<HashMap<String, Arc<Mutex<()>>>>,
    shell_command: Vec<String>,
    ring_bytes: usize,
}

impl TerminalManager {
    pub fn new(ring_bytes: usize) -> Arc<Self> {
        let shell = std::env::var("SHELL").unwrap_or_else(|_| "/bin/sh".to_string());
        Self::new_with_command(ring_bytes, vec![shell])
    }

    fn new_with_command(ring_bytes: usize, shell_command: Vec<String>) -> Arc<Self> {
        Arc::new(Self {
            sessions: RwLock::new(HashMap::new()),
            by_thread: RwLock::new(HashMap::new()),
            open_locks: Mutex::new(HashMap::new()),
            shell_command,
            ring_bytes,
        })
    }

    async fn open_lock_for(&self, thread_id: &str) -> Arc<Mutex<()>> {
        self.open_locks.lock().await.entry(thread_id.to_string()).or_insert_with(|| Arc::new(Mutex::new(()))).clone()
    }

    #[cfg(test)]
    pub fn for_test(ring_bytes: usize, command: Vec<String>) -> Arc<Self> {
        Self::new_with_command(ring_bytes, command)
    }

    /// Return the existing running session for `thread_id`, or spawn a new
    /// one (PTY first, pipe fallback). The whole lookup-or-spawn holds the
    /// thread's open lock, keeping sessions at one per thread.
    pub async fn open_session(self: &Arc<Self>, thread_id: &str, cwd: &str, cols: u16, rows: u16) -> Result<TerminalSessionInfo, BridgeError> {
        let open_lock = self.open_lock_for(thread_id).await;
        let _guard = open_lock.lock().await;

        if let Some(existing_id) = self.by_thread.read().await.get(thread_id).cloned() {
            if let Some(session) = self.sessions.read().await.get(&existing_id).cloned() {
                if session.state.lock().await.status == TerminalStatus::Running {
                    return Ok(session.info().await);
                }
            }
        }

        let (backend, transport_mode) =
            spawn_backend(&self.shell_command, Path::new(cwd), cols, rows).map_err(|e| BridgeError::internal(format!("spawning terminal: {e}")))?;
        let pid = backend.child_pid();

        let id = uuid::Uuid::new_v4().to_string();
        let (output_tx, output_rx) = mpsc::channel::<Bytes>(256);
        let (input_tx, input_rx) = mpsc::channel::<Bytes>(256);
        let (resize_tx, resize_rx) = mpsc::channel::<(u16, u16)>(8);
        let (broadcast_tx, _) = broadcast::channel(1024);

        let session = Arc::new(Session {
            id: id.clone(),
            thread_id: thread_id.to_string(),
            cwd: cwd.to_string(),
            pid,
            transport_mode,
            created_at: Utc::now(),
            state: Mutex::new(SessionState {
                status: TerminalStatus::Running,
                exit_code: None,
                exit_signal: None,
                last_activity_at: Utc::now(),
                cols,
                rows,
            }),
            ring: Mutex::new(OutputRing::new(self.ring_bytes)),
            broadcast_tx,
            input_tx,
            resize_tx,
            attached_clients: AtomicUsize::new(0),
        });

        self.sessions.write().await.insert(id.clone(), session.clone());
        self.by_thread.write().await.insert(thread_id.to_string(), id.clone());

        spawn_fanout(session.clone(), output_rx);
        spawn_runner(backend, session.clone(), output_tx, input_rx, resize_rx);

        Ok(session.info().await)
    }

    pub async fn attach_client(&self, session_id: &str, from_seq: Option<u64>) -> Result<AttachResult, BridgeError> {
        let session = self.get(session_id).await?;
        session.attached_clients.fetch_add(1, Ordering::SeqCst);
        let attachment = ClientAttachment { session: session.clone() };

        let receiver = session.broadcast_tx.subscribe();
        let ring = session.ring.lock().await;
        let effective_from = from_seq.unwrap_or_else(|| ring.oldest_seq().saturating_sub(1));
        if let Some(requested) = from_seq {
            if !ring.can_replay_from(requested) {
                drop(ring);
                return Err(BridgeError::new(ErrorCode::TerminalCursorExpired, "terminal output cursor has expired"));
            }
        }
        let replay = ring.replay_from(effective_from);
        drop(ring);

        Ok(AttachResult { info: session.info().await, replay, receiver, attachment })
    }

    pub async fn write_input(&self, session_id: &str, data: Bytes) -> Result<(), BridgeError> {
        let session = self.get(session_id).await?;
        session.state.lock().await.last_activity_at = Utc::now();
        session.input_tx.send(data).await.map_err(|_| BridgeError::new(ErrorCode::Gone, "terminal session has exited"))
    }

    /// No-op when the session's transport is `pipe`, per the pipe-transport
    /// contract; forwarded to the backend either way since `PipeBackend`
    /// discards resize requests itself.
    pub async fn resize(&self, session_id: &str, cols: u16, rows: u16) -> Result<(), BridgeError> {
        let session = self.get(session_id).await?;
        {
            let mut state = session.state.lock().await;
            state.cols = cols;
            state.rows = rows;
        }
        let _ = session.resize_tx.send((cols, rows)).await;
        Ok(())
    }

    pub async fn close_session(&self, session_id: &str, _reason: &str) {
        let Some(session) = self.sessions.write().await.remove(session_id) else {
            return;
        };
        self.by_thread.write().await.retain(|_, v| v != session_id);
        if let Some(pid) = session.pid {
            let _ = nix::sys::signal::kill(nix::unistd::Pid::from_raw(pid as i32), nix::sys::signal::Signal::SIGKILL);
        }
        let mut state = session.state.lock().await;
        state.status = TerminalStatus::Exited;
        let _ = session.broadcast_tx.send(OutputFrame::Exit { exit_code: state.exit_code, exit_signal: state.exit_signal.clone() });
    }

    /// The running session's status for a thread, if any (nullable per the
    /// `GET .../terminal` route contract).
    pub async fn status_for_thread(&self, thread_id: &str) -> Option<TerminalSessionInfo> {
        let session_id = self.by_thread.read().await.get(thread_id).cloned()?;
        let session = self.sessions.read().await.get(&session_id).cloned()?;
        Some(session.info().await)
    }

    async fn get(&self, session_id: &str) -> Result<Arc<Session>, BridgeError> {
        self.sessions.read().await.get(session_id).cloned().ok_or_else(|| BridgeError::not_found("terminal session not found"))
    }

    pub async fn snapshots(&self) -> Vec<SessionSnapshot> {
        let now = Utc::now();
        let sessions = self.sessions.read().await;
        let mut out = Vec::with_capacity(sessions.len());
        for session in sessions.values() {
            let state = session.state.lock().await;
            let idle_for = (now - state.last_activity_at).to_std().unwrap_or(Duration::ZERO);
            out.push(SessionSnapshot {
                id: session.id.clone(),
                attached_clients: session.attached_clients.load(Ordering::SeqCst),
                idle_for,
            });
        }
        out
    }

    /// Whether the session's shell currently has no descendant processes —
    /// eligibility condition (c) for idle reclaim. A dead or unknown shell
    /// counts as empty; on hosts without `/proc` the check degrades to
    /// "empty" and the byte-quiescence conditions carry the decision alone.
    pub async fn child_tree_empty(&self, session_id: &str) -> bool {
        let Some(session) = self.sessions.read().await.get(session_id).cloned() else {
            return true;
        };
        let Some(pid) = session.pid else {
            return true;
        };
        if nix::sys::signal::kill(nix::unistd::Pid::from_raw(pid as i32), None).is_err() {
            return true;
        }
        proc_children_empty(pid)
    }
}

fn proc_children_empty(pid: u32) -> bool {
    let path = format!("/proc/{pid}/task/{pid}/children");
    match std::fs::read_to_string(path) {
        Ok(children) => children.trim().is_empty(),
        Err(_) => true,
    }
}

fn spawn_fanout(session: Arc<Session>, mut output_rx: mpsc::Receiver<Bytes>) {
    tokio::spawn(async move {
        while let Some(chunk) = output_rx.recv().await {
            let seq = {
                let mut ring = session.ring.lock().await;
                ring.push(chunk.clone())
            };
            session.state.lock().await.last_activity_at = Utc::now();
            let _ = session.broadcast_tx.send(OutputFrame::Output { seq, data: chunk });
        }
    });
}

fn spawn_runner(
    mut backend: Box<dyn Backend>,
    session: Arc<Session>,
    output_tx: mpsc::Sender<Bytes>,
    input_rx: mpsc::Receiver<Bytes>,
    resize_rx: mpsc::Receiver<(u16, u16)>,
) {
    tokio::spawn(async move {
        let result = backend.run(output_tx, input_rx, resize_rx).await;
        let exit = result.unwrap_or(ExitStatus { code: None, signal: None });
        let mut state = session.state.lock().await;
        state.status = TerminalStatus::Exited;
        state.exit_code = exit.code;
        state.exit_signal = exit.signal.map(|s| s.to_string());
        let _ = session.broadcast_tx.send(OutputFrame::Exit { exit_code: exit.code, exit_signal: state.exit_signal.clone() });
    });
}

#[cfg(test)]
#[path = "mod_tests.rs"]
mod tests;
