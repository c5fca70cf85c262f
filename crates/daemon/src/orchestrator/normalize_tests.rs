use super::*;
use serde_json::json;

#[test]
fn known_methods_map_to_their_envelope_type() {
    let (kind, _) = normalize_notification("turn/started", json!({"turnId": "t1"}));
    assert_eq!(kind, EnvelopeType::TurnStarted);

    let (kind, _) = normalize_notification("item/agentMessage/delta", json!({"text": "hi"}));
    assert_eq!(kind, EnvelopeType::ItemAgentMessageDelta);
}

#[test]
fn unknown_method_becomes_error_envelope_without_failing() {
    let (kind, payload) = normalize_notification("some/future/method", json!({"x": 1}));
    assert_eq!(kind, EnvelopeType::Error);
    assert_eq!(payload["originalMethod"], "some/future/method");
}

#[test]
fn turn_status_maps_to_terminal_job_state() {
    assert_eq!(terminal_state_for_turn_status("completed"), Some(JobState::Done));
    assert_eq!(terminal_state_for_turn_status("failed"), Some(JobState::Failed));
    assert_eq!(terminal_state_for_turn_status("interrupted"), Some(JobState::Cancelled));
    assert_eq!(terminal_state_for_turn_status("unknown"), None);
}
