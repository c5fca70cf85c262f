// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Top-level daemon wiring — shared by `main` and integration tests: builds
//! every subsystem, starts the background tasks that drive them, and serves
//! the HTTP/WS boundary until shutdown.

use std::sync::Arc;
use std::time::Duration;

use tokio::net::TcpListener;
use tracing::{error, info};
use tracing_subscriber::EnvFilter;

use crate::agent::AgentTransport;
use crate::approval::ApprovalRegistry;
use crate::config::Config;
use crate::hub::Hub;
use crate::http::state::AppState;
use crate::orchestrator::Orchestrator;
use crate::push::NullPushSender;
use crate::store::Store;
use crate::terminal::sweeper::{self, ByteQuiescenceProbe};
use crate::terminal::TerminalManager;
use crate::thread::{ThreadProjector, ThreadTransfer};

/// Initialize tracing from config. Uses `try_init` so it is safe to call
/// more than once, e.g. across integration test processes.
pub fn init_tracing(config: &Config) {
    use tracing_subscriber::fmt;

    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(&config.log_level));

    let result = match config.log_format.as_str() {
        "json" => fmt::fmt().with_env_filter(filter).json().try_init(),
        _ => fmt::fmt().with_env_filter(filter).try_init(),
    };
    drop(result);
}

/// A fully-assembled daemon, ready to serve. Exposed so integration tests
/// can build one against a bound ephemeral port without going through
/// `main`.
pub struct PreparedDaemon {
    pub state: Arc<AppState>,
    pub listener: TcpListener,
}

/// Assemble every subsystem per `config`: open the store, spawn the agent,
/// wire the orchestrator and terminal manager, and bind the HTTP listener.
/// Does not start serving; see [`PreparedDaemon::run`].
pub async fn prepare(config: Config) -> anyhow::Result<PreparedDaemon> {
    let store = Store::open(&config.db_path).await?;
    let hub = Hub::new(store.clone(), config.event_retention);
    let approvals = Arc::new(ApprovalRegistry::new(store.clone()));

    let cwd = std::env::current_dir()?;
    let (agent, mut inbound) = AgentTransport::spawn(&config.agent_command, &cwd).await?;

    let orchestrator = Orchestrator::new(
        store.clone(),
        hub.clone(),
        approvals.clone(),
        agent.clone(),
        Arc::new(NullPushSender),
        config.max_pending_message_bytes,
        Duration::from_millis(config.cancel_deadline_ms),
        Duration::from_millis(config.approval_timeout_ms),
    );
    {
        let orchestrator = orchestrator.clone();
        tokio::spawn(async move {
            while let Some(frame) = inbound.recv().await {
                if let Err(e) = orchestrator.clone().handle_inbound(frame).await {
                    error!("error handling inbound agent frame: {e}");
                }
            }
            info!("agent transport closed, failing in-flight jobs");
            if let Err(e) = orchestrator.fail_open_jobs("transport-closed").await {
                error!("failing in-flight jobs after transport close: {e}");
            }
        });
    }

    let projector = ThreadProjector::new(store.clone(), agent.clone());
    let transfer = ThreadTransfer::new(store.clone(), config.package_dir.clone());
    let terminal = TerminalManager::new(config.terminal_ring_bytes);
    {
        let terminal = terminal.clone();
        let idle_ttl = Duration::from_millis(config.terminal_idle_ttl_ms);
        let sweep_interval = Duration::from_millis(config.terminal_sweep_interval_ms);
        tokio::spawn(sweeper::run(terminal, idle_ttl, sweep_interval, Arc::new(ByteQuiescenceProbe)));
    }

    let state = Arc::new(AppState { config: Arc::new(config), store, hub, approvals, orchestrator, projector, transfer, terminal, agent });

    let addr = format!("{}:{}", state.config.host, state.config.port);
    let listener = TcpListener::bind(&addr).await?;
    info!("listening on {}", listener.local_addr()?);

    Ok(PreparedDaemon { state, listener })
}

impl PreparedDaemon {
    /// Serve the HTTP/WS boundary until a SIGINT/SIGTERM (or, on platforms
    /// without `signal`, ctrl-c) is received.
    pub async fn run(self) -> anyhow::Result<()> {
        let router = crate::http::build_router(self.state.clone());
        axum::serve(self.listener, router).with_graceful_shutdown(shutdown_signal()).await?;
        Ok(())
    }
}

async fn shutdown_signal() {
    #[cfg(unix)]
    {
        use tokio::signal::unix::{signal, SignalKind};
        let mut sigterm = signal(SignalKind::terminate()).ok();
        tokio::select! {
            _ = tokio::signal::ctrl_c() => {}
            _ = async {
                if let Some(ref mut s) = sigterm { s.recv().await } else { std::future::pending().await }
            } => {}
        }
    }
    #[cfg(not(unix))]
    {
        let _ = tokio::signal::ctrl_c().await;
    }
    info!("shutdown signal received");
}

/// Prepare and run a daemon to completion. The full production entry point.
pub async fn run(config: Config) -> anyhow::Result<()> {
    prepare(config).await?.run().await
}

#[cfg(test)]
#[path = "run_tests.rs"]
mod tests;
