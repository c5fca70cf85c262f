// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Startup configuration: CLI flags, environment variables, and an optional
//! TOML config file. Precedence (lowest to highest): config file, environment,
//! explicit CLI flag.

use std::path::PathBuf;

use clap::Parser;
use serde::Deserialize;

/// Local bridge daemon between a mobile client and an agentic coding runtime.
#[derive(Debug, Parser)]
#[command(name = "bridged", version, about)]
pub struct Config {
    /// Path to a TOML config file, applied before environment/CLI overrides.
    #[arg(long)]
    pub config: Option<PathBuf>,

    /// HTTP port to listen on.
    #[arg(long, env = "BRIDGED_PORT", default_value = "4875")]
    pub port: u16,

    /// Host address to bind to.
    #[arg(long, env = "BRIDGED_HOST", default_value = "127.0.0.1")]
    pub host: String,

    /// Bearer token for API and WebSocket authentication. Auth is disabled
    /// when unset.
    #[arg(long, env = "BRIDGED_AUTH_TOKEN")]
    pub auth_token: Option<String>,

    /// Colon-separated list of project directories new threads may be
    /// created under. Empty means unrestricted.
    #[arg(long, env = "BRIDGED_PROJECT_WHITELIST", value_delimiter = ':')]
    pub project_whitelist: Vec<PathBuf>,

    /// Path to the SQLite database file.
    #[arg(long, env = "BRIDGED_DB_PATH", default_value = "bridged.sqlite3")]
    pub db_path: PathBuf,

    /// Directory export/import packages are written to and read from.
    #[arg(long, env = "BRIDGED_PACKAGE_DIR", default_value = "bridged-packages")]
    pub package_dir: PathBuf,

    /// Number of envelopes retained per job for cursor replay.
    #[arg(long, env = "BRIDGED_EVENT_RETENTION", default_value = "2000")]
    pub event_retention: u64,

    /// Idle timeout (ms) before a terminal session is eligible for reclaim.
    #[arg(long, env = "BRIDGED_TERMINAL_IDLE_TTL_MS", default_value = "1800000")]
    pub terminal_idle_ttl_ms: u64,

    /// Interval (ms) between idle-reclaim sweeps.
    #[arg(long, env = "BRIDGED_TERMINAL_SWEEP_INTERVAL_MS", default_value = "30000")]
    pub terminal_sweep_interval_ms: u64,

    /// Per-session terminal output ring capacity, in bytes.
    #[arg(long, env = "BRIDGED_TERMINAL_RING_BYTES", default_value = "1048576")]
    pub terminal_ring_bytes: usize,

    /// Bound on pending assistant-message bytes buffered per job.
    #[arg(long, env = "BRIDGED_MAX_PENDING_MESSAGE_BYTES", default_value = "5242880")]
    pub max_pending_message_bytes: usize,

    /// Deadline (ms) for a pending approval before a `timeout` decision is
    /// recorded automatically.
    #[arg(long, env = "BRIDGED_APPROVAL_TIMEOUT_MS", default_value = "0")]
    pub approval_timeout_ms: u64,

    /// Deadline (ms) the daemon waits for `turn/completed(interrupted)` after
    /// requesting a cancel before forcing the job terminal.
    #[arg(long, env = "BRIDGED_CANCEL_DEADLINE_MS", default_value = "5000")]
    pub cancel_deadline_ms: u64,

    /// Log output format (json or text).
    #[arg(long, env = "BRIDGED_LOG_FORMAT", default_value = "json")]
    pub log_format: String,

    /// Log level (trace, debug, info, warn, error).
    #[arg(long, env = "BRIDGED_LOG_LEVEL", default_value = "info")]
    pub log_level: String,

    /// The agent binary to spawn, plus any fixed arguments (after `--`).
    #[arg(trailing_var_arg = true, allow_hyphen_values = true)]
    pub agent_command: Vec<String>,
}

/// Fields overridable from a TOML config file. Any field left unset in the
/// file falls through to CLI/environment defaults.
#[derive(Debug, Default, Deserialize)]
#[serde(rename_all = "snake_case")]
struct FileConfig {
    port: Option<u16>,
    host: Option<String>,
    auth_token: Option<String>,
    project_whitelist: Option<Vec<PathBuf>>,
    db_path: Option<PathBuf>,
    package_dir: Option<PathBuf>,
    event_retention: Option<u64>,
    terminal_idle_ttl_ms: Option<u64>,
    terminal_sweep_interval_ms: Option<u64>,
    terminal_ring_bytes: Option<usize>,
    max_pending_message_bytes: Option<usize>,
    approval_timeout_ms: Option<u64>,
    cancel_deadline_ms: Option<u64>,
    log_format: Option<String>,
    log_level: Option<String>,
    agent_command: Option<Vec<String>>,
}

impl Config {
    /// Load a config file (if `--config` was given) and apply its values
    /// under anything the user set explicitly via CLI/env, by re-parsing
    /// argv with the file's values as defaults.
    ///
    /// clap has already applied CLI/env precedence into `self`; a field is
    /// only overwritten by the file when it still holds clap's own default,
    /// i.e. the caller never supplied it and the environment didn't either.
    pub fn apply_file_overrides(&mut self) -> anyhow::Result<()> {
        let Some(path) = self.config.clone() else {
            return Ok(());
        };
        let text = std::fs::read_to_string(&path)
            .map_err(|e| anyhow::anyhow!("reading config file {}: {e}", path.display()))?;
        let file: FileConfig = toml::from_str(&text)
            .map_err(|e| anyhow::anyhow!("parsing config file {}: {e}", path.display()))?;

        let defaults = Config::parse_from::<_, String>([]);

        if self.port == defaults.port {
            if let Some(v) = file.port {
                self.port = v;
            }
        }
        if self.host == defaults.host {
            if let Some(v) = file.host {
                self.host = v;
            }
        }
        if self.auth_token.is_none() {
            self.auth_token = file.auth_token;
        }
        if self.project_whitelist.is_empty() {
            if let Some(v) = file.project_whitelist {
                self.project_whitelist = v;
            }
        }
        if self.db_path == defaults.db_path {
            if let Some(v) = file.db_path {
                self.db_path = v;
            }
        }
        if self.package_dir == defaults.package_dir {
            if let Some(v) = file.package_dir {
                self.package_dir = v;
            }
        }
        if self.event_retention == defaults.event_retention {
            if let Some(v) = file.event_retention {
                self.event_retention = v;
            }
        }
        if self.terminal_idle_ttl_ms == defaults.terminal_idle_ttl_ms {
            if let Some(v) = file.terminal_idle_ttl_ms {
                self.terminal_idle_ttl_ms = v;
            }
        }
        if self.terminal_sweep_interval_ms == defaults.terminal_sweep_interval_ms {
            if let Some(v) = file.terminal_sweep_interval_ms {
                self.terminal_sweep_interval_ms = v;
            }
        }
        if self.terminal_ring_bytes == defaults.terminal_ring_bytes {
            if let Some(v) = file.terminal_ring_bytes {
                self.terminal_ring_bytes = v;
            }
        }
        if self.max_pending_message_bytes == defaults.max_pending_message_bytes {
            if let Some(v) = file.max_pending_message_bytes {
                self.max_pending_message_bytes = v;
            }
        }
        if self.approval_timeout_ms == defaults.approval_timeout_ms {
            if let Some(v) = file.approval_timeout_ms {
                self.approval_timeout_ms = v;
            }
        }
        if self.cancel_deadline_ms == defaults.cancel_deadline_ms {
            if let Some(v) = file.cancel_deadline_ms {
                self.cancel_deadline_ms = v;
            }
        }
        if self.log_format == defaults.log_format {
            if let Some(v) = file.log_format {
                self.log_format = v;
            }
        }
        if self.log_level == defaults.log_level {
            if let Some(v) = file.log_level {
                self.log_level = v;
            }
        }
        if self.agent_command.is_empty() {
            if let Some(v) = file.agent_command {
                self.agent_command = v;
            }
        }

        Ok(())
    }

    /// Validate the configuration after parsing and file overrides.
    pub fn validate(&self) -> anyhow::Result<()> {
        if self.agent_command.is_empty() {
            anyhow::bail!("an agent command must be given after `--`");
        }
        Ok(())
    }

    /// Whether a path falls under the configured project whitelist.
    /// An empty whitelist permits any path.
    pub fn path_allowed(&self, path: &std::path::Path) -> bool {
        if self.project_whitelist.is_empty() {
            return true;
        }
        self.project_whitelist.iter().any(|root| path.starts_with(root))
    }
}

#[cfg(test)]
#[path = "config_tests.rs"]
mod tests;
