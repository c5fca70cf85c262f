use super::*;
use crate::agent::AgentTransport;
use crate::envelope::EnvelopeType;

#[tokio::test]
async fn list_events_pages_across_jobs_in_seq_order() {
    let store = Store::open_in_memory().await.expect("open store");
    store.create_thread("t1", "/repo", None).await.expect("create thread");
    store.create_job("job-1", "t1").await.expect("create job");
    for _ in 0..3 {
        store.append_event("t1", "job-1", EnvelopeType::ItemStarted, serde_json::json!({})).await.expect("append");
    }

    let dir = tempfile::tempdir().expect("tempdir");
    let script = "read -r line; echo '{\"jsonrpc\":\"2.0\",\"id\":1,\"result\":{}}'; read -r line";
    let (agent, _inbound) = AgentTransport::spawn(&["sh".to_string(), "-c".to_string(), script.to_string()], dir.path())
        .await
        .expect("spawn agent");

    let projector = ThreadProjector::new(store, agent);
    let page = projector.list_events("t1", -1, 2).await.expect("list");
    assert_eq!(page.data.len(), 2);
    assert!(page.has_more);
    assert_eq!(page.total, 3);

    let rest = projector.list_events("t1", page.next_cursor, 2).await.expect("list rest");
    assert_eq!(rest.data.len(), 1);
    assert!(!rest.has_more);
}

#[tokio::test]
async fn activate_tolerates_agent_rehydrate_failure() {
    let store = Store::open_in_memory().await.expect("open store");
    store.create_thread("t1", "/repo", None).await.expect("create thread");

    let dir = tempfile::tempdir().expect("tempdir");
    let script = "read -r line; echo '{\"jsonrpc\":\"2.0\",\"id\":1,\"result\":{}}'; read -r line; echo '{\"jsonrpc\":\"2.0\",\"id\":2,\"error\":{\"code\":-32000,\"message\":\"no rehydrate support\"}}'";
    let (agent, _inbound) = AgentTransport::spawn(&["sh".to_string(), "-c".to_string(), script.to_string()], dir.path())
        .await
        .expect("spawn agent");

    let projector = ThreadProjector::new(store, agent);
    projector.activate("t1").await.expect("activate should not fail even if agent rejects rehydrate");
}

#[tokio::test]
async fn activate_replaces_projection_from_rehydrated_envelopes() {
    let store = Store::open_in_memory().await.expect("open store");
    store.create_thread("t1", "/repo", None).await.expect("create thread");
    store.create_job("job-1", "t1").await.expect("create job");
    store.append_event("t1", "job-1", EnvelopeType::ItemStarted, serde_json::json!({"stale": true})).await.expect("append");

    let rehydrated = serde_json::json!({
        "envelopes": [
            {"type": "turn.started", "ts": "2026-01-01T00:00:00Z", "jobId": "ignored", "seq": 0, "payload": {"turnId": "t-1"}},
            {"type": "item.completed", "ts": "2026-01-01T00:00:01Z", "jobId": "ignored", "seq": 1, "payload": {"itemId": "i-1"}},
        ]
    });
    let response = serde_json::json!({"jsonrpc": "2.0", "id": 1, "result": rehydrated}).to_string();

    let dir = tempfile::tempdir().expect("tempdir");
    let script = format!("read -r line; echo {}", shell_quote(&response));
    let (agent, _inbound) = AgentTransport::spawn(&["sh".to_string(), "-c".to_string(), script], dir.path())
        .await
        .expect("spawn agent");

    let projector = ThreadProjector::new(store, agent);
    projector.activate("t1").await.expect("activate");

    let page = projector.list_events("t1", 0, 10).await.expect("list");
    assert_eq!(page.total, 2);
    assert_eq!(page.data[0].kind, EnvelopeType::TurnStarted);
    assert_eq!(page.data[0].payload["turnId"], "t-1");
    assert_eq!(page.data[1].kind, EnvelopeType::ItemCompleted);
}

fn shell_quote(s: &str) -> String {
    format!("'{}'", s.replace('\'', "'\\''"))
}
