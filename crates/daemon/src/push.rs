// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Push notification delivery: an ambient retry shape (idempotent HTTP to
//! an external push provider, exponential backoff, max 2 attempts on
//! 429/502-504/timeout) with no concrete provider wired up by default.

use std::time::Duration;

use async_trait::async_trait;

const MAX_ATTEMPTS: u32 = 2;
const BASE_BACKOFF: Duration = Duration::from_millis(250);

/// Delivers a job-finished push to whatever devices are scoped to a
/// thread. Implementations should be idempotent since the orchestrator may
/// call this more than once for the same job under retry.
#[async_trait]
pub trait PushSender: Send + Sync {
    async fn notify_job_finished(&self, thread_id: &str, job_id: &str, state: &str);
}

/// A `PushSender` that does nothing; the shipped default until a concrete
/// provider (APNs, FCM) is wired up.
pub struct NullPushSender;

#[async_trait]
impl PushSender for NullPushSender {
    async fn notify_job_finished(&self, _thread_id: &str, _job_id: &str, _state: &str) {}
}

/// Retry an idempotent delivery attempt with exponential backoff, per the
/// error-handling design's retry policy for push delivery. `should_retry`
/// inspects the error to decide if it is transient (429/502-504/timeout).
pub async fn with_backoff<F, Fut, E>(mut attempt: F, should_retry: impl Fn(&E) -> bool) -> Result<(), E>
where
    F: FnMut() -> Fut,
    Fut: std::future::Future<Output = Result<(), E>>,
{
    let mut attempt_no = 0;
    loop {
        match attempt().await {
            Ok(()) => return Ok(()),
            Err(e) => {
                attempt_no += 1;
                if attempt_no >= MAX_ATTEMPTS || !should_retry(&e) {
                    return Err(e);
                }
                tokio::time::sleep(BASE_BACKOFF * 2u32.pow(attempt_no - 1)).await;
            }
        }
    }
}

#[cfg(test)]
#[path = "push_tests.rs"]
mod tests;
