// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Test harness for end-to-end binary smoke tests.
//!
//! Spawns the real `bridged` binary as a subprocess, wired to a scripted
//! `sh -c` stand-in agent, and exercises it over HTTP, SSE, and WebSocket.

use std::path::{Path, PathBuf};
use std::process::{Child, Command, Stdio};
use std::time::Duration;

use tempfile::TempDir;

/// Resolve the path to the compiled `bridged` binary.
pub fn bridged_binary() -> PathBuf {
    let manifest = Path::new(env!("CARGO_MANIFEST_DIR"));
    // tests/specs → tests → workspace root
    let workspace = manifest.parent().and_then(|p| p.parent()).unwrap_or(manifest);
    workspace.join("target").join("debug").join("bridged")
}

/// Find a free TCP port by binding to :0 then releasing.
pub fn free_port() -> anyhow::Result<u16> {
    let listener = std::net::TcpListener::bind("127.0.0.1:0")?;
    Ok(listener.local_addr()?.port())
}

/// A running `bridged` process that is killed on drop.
pub struct BridgedProcess {
    child: Child,
    port: u16,
    _db_dir: TempDir,
    _package_dir: TempDir,
}

impl BridgedProcess {
    /// Spawn `bridged` with a scripted `sh -c` agent and an isolated
    /// database/package directory, with auth disabled.
    pub fn start(agent_script: &str) -> anyhow::Result<Self> {
        Self::start_with(agent_script, &[])
    }

    /// Spawn `bridged` with extra CLI flags inserted before the `--
    /// <agent command>` separator (e.g. `--event-retention`, `--auth-token`).
    pub fn start_with(agent_script: &str, extra_args: &[&str]) -> anyhow::Result<Self> {
        let binary = bridged_binary();
        anyhow::ensure!(binary.exists(), "bridged binary not found at {}", binary.display());

        let port = free_port()?;
        let db_dir = tempfile::tempdir()?;
        let package_dir = tempfile::tempdir()?;

        let mut args: Vec<String> = vec![
            "--host".into(),
            "127.0.0.1".into(),
            "--port".into(),
            port.to_string(),
            "--db-path".into(),
            db_dir.path().join("bridged.sqlite3").to_string_lossy().into_owned(),
            "--package-dir".into(),
            package_dir.path().to_string_lossy().into_owned(),
            "--log-format".into(),
            "text".into(),
            "--log-level".into(),
            "warn".into(),
        ];
        args.extend(extra_args.iter().map(|s| s.to_string()));
        args.push("--".into());
        args.extend(["sh".to_string(), "-c".to_string(), agent_script.to_string()]);

        let child = Command::new(&binary).args(&args).stdout(Stdio::null()).stderr(Stdio::null()).spawn()?;

        Ok(Self { child, port, _db_dir: db_dir, _package_dir: package_dir })
    }

    pub fn base_url(&self) -> String {
        format!("http://127.0.0.1:{}", self.port)
    }

    pub fn ws_base(&self) -> String {
        format!("ws://127.0.0.1:{}", self.port)
    }

    /// Poll `/health` until it responds, or fail after `timeout`.
    pub async fn wait_healthy(&self, timeout: Duration) -> anyhow::Result<()> {
        let deadline = tokio::time::Instant::now() + timeout;
        let client = reqwest::Client::new();
        let url = format!("{}/health", self.base_url());
        loop {
            if tokio::time::Instant::now() > deadline {
                anyhow::bail!("bridged did not become healthy within {timeout:?}");
            }
            if let Ok(resp) = client.get(&url).send().await {
                if resp.status().is_success() {
                    return Ok(());
                }
            }
            tokio::time::sleep(Duration::from_millis(50)).await;
        }
    }
}

impl Drop for BridgedProcess {
    fn drop(&mut self) {
        let _ = self.child.kill();
        let _ = self.child.wait();
    }
}

/// A happy-path agent: acknowledges `initialize`, then on every
/// subsequent line (a turn-start request) emits a scripted turn and waits
/// for the next request.
pub const HAPPY_TURN_AGENT: &str = r#"
read -r line
echo '{"jsonrpc":"2.0","id":1,"result":{}}'
while read -r line; do
  echo '{"jsonrpc":"2.0","method":"turn/started","params":{"turnId":"turn-1"}}'
  echo '{"jsonrpc":"2.0","method":"item/agentMessage/delta","params":{"turnId":"turn-1","text":"hi"}}'
  echo '{"jsonrpc":"2.0","method":"item/completed","params":{"turnId":"turn-1"}}'
  echo '{"jsonrpc":"2.0","method":"turn/completed","params":{"turnId":"turn-1","status":"completed"}}'
done
"#;

/// An agent that requests approval for a `npm test` command, then completes
/// once a decision is submitted.
pub const APPROVAL_AGENT: &str = r#"
read -r line
echo '{"jsonrpc":"2.0","id":1,"result":{}}'
while read -r line; do
  echo '{"jsonrpc":"2.0","method":"turn/started","params":{"turnId":"turn-1"}}'
  echo '{"jsonrpc":"2.0","id":99,"method":"item/commandExecution/requestApproval","params":{"turnId":"turn-1","itemId":"item-1","command":"npm test","cwd":"/repo"}}'
  read -r line
  echo '{"jsonrpc":"2.0","method":"turn/completed","params":{"turnId":"turn-1","status":"completed"}}'
done
"#;

/// An agent that requests approval and then never resumes on its own — used
/// to exercise cancel-while-waiting-for-approval.
pub const STALLING_APPROVAL_AGENT: &str = r#"
read -r line
echo '{"jsonrpc":"2.0","id":1,"result":{}}'
while read -r line; do
  echo '{"jsonrpc":"2.0","method":"turn/started","params":{"turnId":"turn-1"}}'
  echo '{"jsonrpc":"2.0","id":99,"method":"item/commandExecution/requestApproval","params":{"turnId":"turn-1","itemId":"item-1","command":"npm test","cwd":"/repo"}}'
  read -r decision_line
  read -r interrupt_line
  interrupt_id=$(printf '%s' "$interrupt_line" | sed -n 's/.*"id":\([0-9]*\).*/\1/p')
  echo "{\"jsonrpc\":\"2.0\",\"id\":$interrupt_id,\"result\":{}}"
  echo '{"jsonrpc":"2.0","method":"turn/completed","params":{"turnId":"turn-1","status":"interrupted"}}'
done
"#;

/// An agent that emits `count` deltas per turn, for cursor-retention tests.
pub fn deltas_agent(count: u32) -> String {
    let mut script = String::from("read -r line\necho '{\"jsonrpc\":\"2.0\",\"id\":1,\"result\":{}}'\nwhile read -r line; do\n");
    script.push_str("  echo '{\"jsonrpc\":\"2.0\",\"method\":\"turn/started\",\"params\":{\"turnId\":\"turn-1\"}}'\n");
    for _ in 0..count {
        script.push_str("  echo '{\"jsonrpc\":\"2.0\",\"method\":\"item/agentMessage/delta\",\"params\":{\"turnId\":\"turn-1\",\"text\":\"x\"}}'\n");
    }
    script.push_str("  echo '{\"jsonrpc\":\"2.0\",\"method\":\"turn/completed\",\"params\":{\"turnId\":\"turn-1\",\"status\":\"completed\"}}'\n");
    script.push_str("done\n");
    script
}

/// An idle agent that only acknowledges `initialize`, for terminal-focused
/// scenarios where no turn is ever started.
pub const IDLE_AGENT: &str = "read -r line\necho '{\"jsonrpc\":\"2.0\",\"id\":1,\"result\":{}}'\nwhile read -r line; do :; done\n";
