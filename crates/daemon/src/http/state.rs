// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Shared application state passed to every handler via axum's `State`
//! extractor, mirroring this codebase's single `Store`-as-shared-state
//! pattern (here named `AppState` since `Store` already names the SQLite
//! layer).

use std::sync::Arc;

use crate::agent::AgentTransport;
use crate::approval::ApprovalRegistry;
use crate::config::Config;
use crate::hub::Hub;
use crate::orchestrator::Orchestrator;
use crate::store::Store;
use crate::terminal::TerminalManager;
use crate::thread::{ThreadProjector, ThreadTransfer};

pub struct AppState {
    pub config: Arc<Config>,
    pub store: Store,
    pub hub: Arc<Hub>,
    pub approvals: Arc<ApprovalRegistry>,
    pub orchestrator: Arc<Orchestrator>,
    pub projector: ThreadProjector,
    pub transfer: ThreadTransfer,
    pub terminal: Arc<TerminalManager>,
    pub agent: AgentTransport,
}
