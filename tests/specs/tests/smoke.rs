// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! End-to-end smoke tests that spawn the real `bridged` binary wired to a
//! scripted agent and exercise it over real HTTP, SSE, and WebSocket
//! connections.

use std::time::Duration;

use bridged_specs::{deltas_agent, BridgedProcess, APPROVAL_AGENT, HAPPY_TURN_AGENT, IDLE_AGENT, STALLING_APPROVAL_AGENT};
use futures_util::{SinkExt, StreamExt};
use serde_json::json;
use tokio_tungstenite::tungstenite::Message;

const TIMEOUT: Duration = Duration::from_secs(10);

async fn create_thread(client: &reqwest::Client, base: &str, project_path: &str) -> anyhow::Result<String> {
    let resp = client.post(format!("{base}/v1/threads")).json(&json!({"projectPath": project_path})).send().await?;
    anyhow::ensure!(resp.status() == 201, "create thread: {}", resp.status());
    let body: serde_json::Value = resp.json().await?;
    Ok(body["id"].as_str().expect("thread id").to_string())
}

async fn wait_for_job_state(client: &reqwest::Client, base: &str, job_id: &str, state: &str, timeout: Duration) -> anyhow::Result<serde_json::Value> {
    let deadline = tokio::time::Instant::now() + timeout;
    loop {
        let body: serde_json::Value = client.get(format!("{base}/v1/jobs/{job_id}")).send().await?.json().await?;
        if body["state"] == state {
            return Ok(body);
        }
        if tokio::time::Instant::now() > deadline {
            anyhow::bail!("job {job_id} never reached {state}, last seen: {body}");
        }
        tokio::time::sleep(Duration::from_millis(50)).await;
    }
}

// A full turn end to end: envelopes in order, job lands DONE.
#[tokio::test]
async fn happy_turn_reaches_done() -> anyhow::Result<()> {
    let bridged = BridgedProcess::start(HAPPY_TURN_AGENT)?;
    bridged.wait_healthy(TIMEOUT).await?;
    let client = reqwest::Client::new();
    let base = bridged.base_url();

    let thread_id = create_thread(&client, &base, "/repo").await?;

    let turn = client.post(format!("{base}/v1/threads/{thread_id}/turns")).json(&json!({"text": "hello"})).send().await?;
    assert_eq!(turn.status(), 202);
    let job_id = turn.json::<serde_json::Value>().await?["jobId"].as_str().expect("jobId").to_string();

    let job = wait_for_job_state(&client, &base, &job_id, "DONE", TIMEOUT).await?;
    assert_eq!(job["state"], "DONE");

    let events: serde_json::Value = client.get(format!("{base}/v1/jobs/{job_id}/events")).send().await?.json().await?;
    let kinds: Vec<String> = events["events"].as_array().expect("events array").iter().map(|e| e["type"].as_str().unwrap_or_default().to_string()).collect();
    assert_eq!(
        kinds,
        vec!["job.created", "job.state", "turn.started", "item.agentMessage.delta", "item.completed", "turn.completed", "job.finished"]
    );

    Ok(())
}

// Approval accept, then idempotent resubmission.
#[tokio::test]
async fn approval_accept_is_idempotent() -> anyhow::Result<()> {
    let bridged = BridgedProcess::start(APPROVAL_AGENT)?;
    bridged.wait_healthy(TIMEOUT).await?;
    let client = reqwest::Client::new();
    let base = bridged.base_url();

    let thread_id = create_thread(&client, &base, "/repo").await?;
    let turn = client.post(format!("{base}/v1/threads/{thread_id}/turns")).json(&json!({"text": "run tests"})).send().await?;
    let job_id = turn.json::<serde_json::Value>().await?["jobId"].as_str().expect("jobId").to_string();

    let job = wait_for_job_state(&client, &base, &job_id, "WAITING_APPROVAL", TIMEOUT).await?;
    assert_eq!(job["pendingApprovalCount"], 1);

    let events: serde_json::Value = client.get(format!("{base}/v1/jobs/{job_id}/events")).send().await?.json().await?;
    let approval = events["events"]
        .as_array()
        .expect("events")
        .iter()
        .find(|e| e["type"] == "approval.required")
        .expect("approval envelope")
        .clone();
    let approval_id = approval["payload"]["approvalId"].as_str().expect("approvalId").to_string();

    let first = client.post(format!("{base}/v1/jobs/{job_id}/approve")).json(&json!({"approvalId": approval_id, "decision": "accept"})).send().await?;
    assert_eq!(first.json::<serde_json::Value>().await?["status"], "submitted");

    let second = client.post(format!("{base}/v1/jobs/{job_id}/approve")).json(&json!({"approvalId": approval_id, "decision": "accept"})).send().await?;
    assert_eq!(second.json::<serde_json::Value>().await?["status"], "already_submitted");

    wait_for_job_state(&client, &base, &job_id, "DONE", TIMEOUT).await?;

    Ok(())
}

// Cursor expiration past a small retention window.
#[tokio::test]
async fn cursor_expiration_returns_409() -> anyhow::Result<()> {
    let bridged = BridgedProcess::start_with(&deltas_agent(10), &["--event-retention", "5"])?;
    bridged.wait_healthy(TIMEOUT).await?;
    let client = reqwest::Client::new();
    let base = bridged.base_url();

    let thread_id = create_thread(&client, &base, "/repo").await?;
    let turn = client.post(format!("{base}/v1/threads/{thread_id}/turns")).json(&json!({"text": "go"})).send().await?;
    let job_id = turn.json::<serde_json::Value>().await?["jobId"].as_str().expect("jobId").to_string();
    wait_for_job_state(&client, &base, &job_id, "DONE", TIMEOUT).await?;

    let expired = client.get(format!("{base}/v1/jobs/{job_id}/events?cursor=0")).send().await?;
    assert_eq!(expired.status(), 409);
    let body: serde_json::Value = expired.json().await?;
    assert_eq!(body["error"]["code"], "CURSOR_EXPIRED");

    let batch: serde_json::Value = client.get(format!("{base}/v1/jobs/{job_id}/events")).send().await?.json().await?;
    assert_eq!(batch["events"].as_array().expect("events").len(), 5);
    assert_eq!(batch["firstSeq"], 10);

    Ok(())
}

// Cancel while waiting for approval.
#[tokio::test]
async fn cancel_during_approval_resolves_then_finishes() -> anyhow::Result<()> {
    let bridged = BridgedProcess::start(STALLING_APPROVAL_AGENT)?;
    bridged.wait_healthy(TIMEOUT).await?;
    let client = reqwest::Client::new();
    let base = bridged.base_url();

    let thread_id = create_thread(&client, &base, "/repo").await?;
    let turn = client.post(format!("{base}/v1/threads/{thread_id}/turns")).json(&json!({"text": "run tests"})).send().await?;
    let job_id = turn.json::<serde_json::Value>().await?["jobId"].as_str().expect("jobId").to_string();

    wait_for_job_state(&client, &base, &job_id, "WAITING_APPROVAL", TIMEOUT).await?;

    let cancel = client.post(format!("{base}/v1/jobs/{job_id}/cancel")).send().await?;
    assert_eq!(cancel.status(), 200);

    let job = wait_for_job_state(&client, &base, &job_id, "CANCELLED", TIMEOUT).await?;
    assert_eq!(job["state"], "CANCELLED");

    let events: serde_json::Value = client.get(format!("{base}/v1/jobs/{job_id}/events")).send().await?.json().await?;
    let kinds: Vec<String> = events["events"].as_array().expect("events").iter().map(|e| e["type"].as_str().unwrap_or_default().to_string()).collect();
    assert!(kinds.contains(&"approval.required".to_string()));
    assert!(kinds.contains(&"approval.resolved".to_string()));
    assert_eq!(kinds.last().map(String::as_str), Some("job.finished"));

    // The cancel already resolved the approval; approving it again reports
    // the first decision instead of touching the agent.
    let approval = events["events"]
        .as_array()
        .expect("events")
        .iter()
        .find(|e| e["type"] == "approval.required")
        .expect("approval envelope")
        .clone();
    let approval_id = approval["payload"]["approvalId"].as_str().expect("approvalId");
    let approve = client.post(format!("{base}/v1/jobs/{job_id}/approve")).json(&json!({"approvalId": approval_id, "decision": "accept"})).send().await?;
    assert_eq!(approve.json::<serde_json::Value>().await?["status"], "already_submitted");

    // A subsequent cancel on the now-terminal job is a harmless no-op.
    let second_cancel = client.post(format!("{base}/v1/jobs/{job_id}/cancel")).send().await?;
    assert_eq!(second_cancel.status(), 200);

    Ok(())
}

// Terminal reconnect with replay.
#[tokio::test]
async fn terminal_reconnect_replays_from_cursor() -> anyhow::Result<()> {
    let bridged = BridgedProcess::start(IDLE_AGENT)?;
    bridged.wait_healthy(TIMEOUT).await?;
    let client = reqwest::Client::new();
    let base = bridged.base_url();
    let ws_base = bridged.ws_base();

    let thread_id = create_thread(&client, &base, "/repo").await?;

    let open: serde_json::Value =
        client.post(format!("{base}/v1/threads/{thread_id}/terminal/open")).json(&json!({"cwd": "/repo"})).send().await?.json().await?;
    let session_id = open["session"]["id"].as_str().expect("session id").to_string();

    let (mut ws, _) = tokio_tungstenite::connect_async(format!("{ws_base}/v1/terminals/{session_id}/stream")).await?;
    let ready = tokio::time::timeout(TIMEOUT, ws.next()).await?.expect("ready frame")?;
    let ready: serde_json::Value = serde_json::from_str(&ready.into_text()?)?;
    assert_eq!(ready["type"], "ready");

    ws.send(Message::Text(json!({"type": "input", "data": base64_encode(b"echo hi\n")}).to_string().into())).await?;

    let mut seqs = Vec::new();
    while seqs.len() < 2 {
        let msg = tokio::time::timeout(TIMEOUT, ws.next()).await?.expect("output frame")?;
        let frame: serde_json::Value = serde_json::from_str(&msg.into_text()?)?;
        if frame["type"] == "output" {
            seqs.push(frame["seq"].as_u64().expect("seq"));
        }
    }
    drop(ws);

    let reconnect_from = seqs[0];
    let (mut ws2, _) = tokio_tungstenite::connect_async(format!("{ws_base}/v1/terminals/{session_id}/stream?fromSeq={reconnect_from}")).await?;
    let ready2 = tokio::time::timeout(TIMEOUT, ws2.next()).await?.expect("ready frame")?;
    let ready2: serde_json::Value = serde_json::from_str(&ready2.into_text()?)?;
    assert_eq!(ready2["type"], "ready");

    let reopen: serde_json::Value =
        client.post(format!("{base}/v1/threads/{thread_id}/terminal/open")).json(&json!({"cwd": "/repo"})).send().await?.json().await?;
    assert_eq!(reopen["session"]["id"], session_id);

    Ok(())
}

fn base64_encode(data: &[u8]) -> String {
    use base64::engine::general_purpose::STANDARD;
    use base64::Engine;
    STANDARD.encode(data)
}

// Thread export/import round-trip.
#[tokio::test]
async fn export_import_round_trip_assigns_new_thread_id() -> anyhow::Result<()> {
    let bridged = BridgedProcess::start(HAPPY_TURN_AGENT)?;
    bridged.wait_healthy(TIMEOUT).await?;
    let client = reqwest::Client::new();
    let base = bridged.base_url();

    let thread_id = create_thread(&client, &base, "/repo").await?;
    let turn = client.post(format!("{base}/v1/threads/{thread_id}/turns")).json(&json!({"text": "hello"})).send().await?;
    let job_id = turn.json::<serde_json::Value>().await?["jobId"].as_str().expect("jobId").to_string();
    wait_for_job_state(&client, &base, &job_id, "DONE", TIMEOUT).await?;

    let export: serde_json::Value = client.post(format!("{base}/v1/threads/{thread_id}/export")).send().await?.json().await?;
    let package_path = export["path"].as_str().expect("path").to_string();

    let import: serde_json::Value = client.post(format!("{base}/v1/threads/import")).json(&json!({"path": package_path})).send().await?.json().await?;
    let new_thread_id = import["targetThreadId"].as_str().expect("targetThreadId").to_string();
    let target_package = import["path"].as_str().expect("target package path").to_string();
    assert_ne!(new_thread_id, thread_id);

    let new_events: serde_json::Value = client.get(format!("{base}/v1/threads/{new_thread_id}/events")).send().await?.json().await?;
    assert!(!new_events["data"].as_array().expect("data").is_empty());

    let session_text = tokio::fs::read_to_string(std::path::Path::new(&target_package).join("session.jsonl")).await?;
    assert!(!session_text.to_lowercase().contains(&thread_id.to_lowercase()));
    assert!(session_text.contains(&new_thread_id));

    Ok(())
}
