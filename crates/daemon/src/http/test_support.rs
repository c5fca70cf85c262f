// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Shared black-box test scaffolding: builds a full [`AppState`] over an
//! in-memory store and a scripted `sh -c` stand-in for the agent process.

#![cfg(test)]

use std::ops::Deref;
use std::sync::Arc;
use std::time::Duration;

use axum_test::TestServer;
use clap::Parser;
use tempfile::TempDir;

use crate::agent::AgentTransport;
use crate::approval::ApprovalRegistry;
use crate::config::Config;
use crate::hub::Hub;
use crate::orchestrator::Orchestrator;
use crate::push::NullPushSender;
use crate::store::Store;
use crate::terminal::TerminalManager;
use crate::thread::{ThreadProjector, ThreadTransfer};

use super::state::AppState;

pub const IDLE_AGENT: &str = "read -r line\nwhile read -r line; do :; done\n";

/// Holds the state plus the temp directories it borrows from, so the
/// directories outlive the `TestServer` built from it.
pub struct TestContext {
    pub state: Arc<AppState>,
    _agent_dir: TempDir,
    _package_dir: TempDir,
}

impl Deref for TestContext {
    type Target = AppState;
    fn deref(&self) -> &AppState {
        &self.state
    }
}

pub async fn build_state(auth_token: Option<&str>) -> TestContext {
    build_state_with_agent(auth_token, IDLE_AGENT).await
}

pub async fn build_state_with_whitelist(whitelist: Vec<std::path::PathBuf>) -> TestContext {
    build_state_full(None, IDLE_AGENT, whitelist).await
}

pub async fn build_state_with_agent(auth_token: Option<&str>, agent_script: &str) -> TestContext {
    build_state_full(auth_token, agent_script, Vec::new()).await
}

pub async fn build_state_full(auth_token: Option<&str>, agent_script: &str, project_whitelist: Vec<std::path::PathBuf>) -> TestContext {
    let store = Store::open_in_memory().await.expect("open store");
    let hub = Hub::new(store.clone(), 2000);
    let approvals = Arc::new(ApprovalRegistry::new(store.clone()));
    let agent_dir = tempfile::tempdir().expect("tempdir");
    let (agent, mut inbound) = AgentTransport::spawn(&["sh".to_string(), "-c".to_string(), agent_script.to_string()], agent_dir.path())
        .await
        .expect("spawn agent");

    let orchestrator = Orchestrator::new(
        store.clone(),
        hub.clone(),
        approvals.clone(),
        agent.clone(),
        Arc::new(NullPushSender),
        5 * 1024 * 1024,
        Duration::from_millis(200),
        Duration::ZERO,
    );
    {
        let orchestrator = orchestrator.clone();
        tokio::spawn(async move {
            while let Some(frame) = inbound.recv().await {
                let _ = orchestrator.clone().handle_inbound(frame).await;
            }
            let _ = orchestrator.fail_open_jobs("transport-closed").await;
        });
    }

    let mut config = Config::parse_from(["bridged"]);
    config.auth_token = auth_token.map(|t| t.to_string());
    config.project_whitelist = project_whitelist;

    let projector = ThreadProjector::new(store.clone(), agent.clone());
    let package_dir = tempfile::tempdir().expect("tempdir");
    let transfer = ThreadTransfer::new(store.clone(), package_dir.path().to_path_buf());
    let terminal = TerminalManager::for_test(64 * 1024, vec!["sh".to_string()]);

    let state = Arc::new(AppState { config: Arc::new(config), store, hub, approvals, orchestrator, projector, transfer, terminal, agent });

    TestContext { state, _agent_dir: agent_dir, _package_dir: package_dir }
}

pub fn server_for(state: Arc<AppState>) -> TestServer {
    TestServer::new(super::build_router(state)).expect("build test server")
}
