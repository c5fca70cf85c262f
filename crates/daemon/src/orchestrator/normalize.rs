// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Maps each agent notification method to exactly one envelope type. Unknown
//! methods become a typed `error` envelope without failing the job.

use serde_json::{json, Value};

use crate::domain::JobState;
use crate::envelope::EnvelopeType;

/// Normalize one inbound agent notification into the envelope it produces.
pub fn normalize_notification(method: &str, params: Value) -> (EnvelopeType, Value) {
    match method {
        "thread/started" => (EnvelopeType::ThreadStarted, params),
        "turn/started" => (EnvelopeType::TurnStarted, params),
        "turn/completed" => (EnvelopeType::TurnCompleted, params),
        "item/started" => (EnvelopeType::ItemStarted, params),
        "item/completed" => (EnvelopeType::ItemCompleted, params),
        "item/agentMessage/delta" => (EnvelopeType::ItemAgentMessageDelta, params),
        "item/commandExecution/outputDelta" => (EnvelopeType::ItemCommandExecutionOutputDelta, params),
        "item/fileChange/outputDelta" => (EnvelopeType::ItemFileChangeOutputDelta, params),
        other => (EnvelopeType::Error, json!({"originalMethod": other, "params": params})),
    }
}

/// The terminal status string carried by `turn/completed` params, mapped to
/// the job state it drives the job into.
pub fn terminal_state_for_turn_status(status: &str) -> Option<JobState> {
    match status {
        "completed" => Some(JobState::Done),
        "failed" => Some(JobState::Failed),
        "interrupted" => Some(JobState::Cancelled),
        _ => None,
    }
}

#[cfg(test)]
#[path = "normalize_tests.rs"]
mod tests;
