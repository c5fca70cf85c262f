// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Idle-reclaim sweeper: a fixed-interval background task that closes
//! sessions meeting all four eligibility conditions.

use std::sync::Arc;
use std::time::Duration;

use super::{SessionSnapshot, TerminalManager};

/// Pluggable shell-state probe, condition (d) of idle eligibility. The
/// built-in [`ByteQuiescenceProbe`] only ever returns `true` when the
/// byte-quiescence check already holds; richer, agent-aware probes can
/// implement this trait without the sweeper changing.
pub trait IdleProbe: Send + Sync {
    fn is_idle(&self, snapshot: &SessionSnapshot) -> bool;
}

/// Treats "no output/input bytes for `idle_ttl`" as sufficient evidence of
/// shell idleness; this is condition (b) itself, so the probe never makes a
/// session *more* likely to be reclaimed than the base check already does.
pub struct ByteQuiescenceProbe;

impl IdleProbe for ByteQuiescenceProbe {
    fn is_idle(&self, _snapshot: &SessionSnapshot) -> bool {
        true
    }
}

/// Run the idle-reclaim loop until the manager is dropped (detected via the
/// weak-like behavior of a closed session set is not needed: the loop runs
/// for the daemon's lifetime and is cancelled by aborting its `JoinHandle`).
pub async fn run(manager: Arc<TerminalManager>, idle_ttl: Duration, sweep_interval: Duration, probe: Arc<dyn IdleProbe>) {
    let mut ticker = tokio::time::interval(sweep_interval);
    loop {
        ticker.tick().await;
        sweep_once(&manager, idle_ttl, probe.as_ref()).await;
    }
}

async fn sweep_once(manager: &TerminalManager, idle_ttl: Duration, probe: &dyn IdleProbe) {
    for snapshot in manager.snapshots().await {
        let no_clients = snapshot.attached_clients == 0;
        let quiescent = snapshot.idle_for >= idle_ttl;
        let tree_empty = manager.child_tree_empty(&snapshot.id).await;

        if no_clients && quiescent && tree_empty && probe.is_idle(&snapshot) {
            manager.close_session(&snapshot.id, "idle-reclaim").await;
        }
    }
}

#[cfg(test)]
#[path = "sweeper_tests.rs"]
mod tests;
