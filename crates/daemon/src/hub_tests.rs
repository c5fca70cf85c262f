use super::*;
use serde_json::json;

async fn setup(event_retention: u64) -> (Arc<Hub>, String) {
    let store = Store::open_in_memory().await.expect("open store");
    store.create_thread("t1", "/repo", None).await.expect("create thread");
    store.create_job("j1", "t1").await.expect("create job");
    (Hub::new(store, event_retention), "j1".to_string())
}

#[tokio::test]
async fn append_assigns_seq_and_list_replays_in_order() {
    let (hub, job_id) = setup(2000).await;
    hub.append("t1", &job_id, EnvelopeType::JobCreated, json!({})).await.expect("append 0");
    hub.append("t1", &job_id, EnvelopeType::JobState, json!({})).await.expect("append 1");

    let page = hub.list(&job_id, None).await.expect("list");
    assert_eq!(page.envelopes.len(), 2);
    assert_eq!(page.envelopes[0].seq, 0);
    assert_eq!(page.envelopes[1].seq, 1);
}

#[tokio::test]
async fn old_cursor_expires_once_retention_window_passes() {
    let (hub, job_id) = setup(5).await;
    for i in 0..10 {
        hub.append("t1", &job_id, EnvelopeType::ItemAgentMessageDelta, json!({"i": i})).await.expect("append");
    }

    let expired = hub.list(&job_id, Some(0)).await;
    assert!(matches!(expired, Err(e) if e.code == ErrorCode::CursorExpired));

    let snapshot = hub.list(&job_id, None).await.expect("snapshot");
    assert_eq!(snapshot.envelopes.len(), 5);
    assert_eq!(snapshot.first_retained_seq, 5);
    assert_eq!(snapshot.envelopes[0].seq, 5);
}

#[tokio::test]
async fn cursor_equal_to_first_retained_minus_one_is_expired() {
    let (hub, job_id) = setup(5).await;
    for i in 0..10 {
        hub.append("t1", &job_id, EnvelopeType::ItemAgentMessageDelta, json!({"i": i})).await.expect("append");
    }
    let expired = hub.list(&job_id, Some(4)).await;
    assert!(matches!(expired, Err(e) if e.code == ErrorCode::CursorExpired));

    let page = hub.list(&job_id, Some(5)).await.expect("exactly at retained floor");
    assert_eq!(page.envelopes.len(), 4);
}

#[tokio::test]
async fn cursor_equal_to_last_seq_returns_empty_with_same_next_cursor() {
    let (hub, job_id) = setup(2000).await;
    hub.append("t1", &job_id, EnvelopeType::JobCreated, json!({})).await.expect("append");
    let page = hub.list(&job_id, Some(0)).await.expect("list at last seq");
    assert!(page.envelopes.is_empty());
    assert_eq!(page.next_cursor, 0);
}

#[tokio::test]
async fn subscribe_replays_then_tails_live_appends() {
    let (hub, job_id) = setup(2000).await;
    hub.append("t1", &job_id, EnvelopeType::JobCreated, json!({})).await.expect("append 0");

    let (page, mut live) = hub.subscribe(&job_id, None).await.expect("subscribe");
    assert_eq!(page.envelopes.len(), 1);

    hub.append("t1", &job_id, EnvelopeType::JobFinished, json!({})).await.expect("append 1");
    let tailed = live.recv().await.expect("live envelope");
    assert_eq!(tailed.seq, 1);
    assert_eq!(tailed.kind, EnvelopeType::JobFinished);
}

#[tokio::test]
async fn subscribe_to_finished_job_closes_after_replay() {
    let (hub, job_id) = setup(2000).await;
    hub.append("t1", &job_id, EnvelopeType::JobCreated, json!({})).await.expect("append 0");
    hub.append("t1", &job_id, EnvelopeType::JobFinished, json!({})).await.expect("append 1");
    hub.store.update_job_state(&job_id, crate::domain::JobState::Done, 0, None).await.expect("finish job");

    let (page, mut live) = hub.subscribe(&job_id, None).await.expect("subscribe");
    assert_eq!(page.envelopes.len(), 2);
    assert!(matches!(live.recv().await, Err(tokio::sync::broadcast::error::RecvError::Closed)));
}
