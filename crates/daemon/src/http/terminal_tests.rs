use serde_json::json;

use crate::http::test_support::{build_state, server_for};

#[tokio::test]
async fn open_terminal_then_resize_and_close() {
    let ctx = build_state(None).await;
    let server = server_for(ctx.state.clone());

    let thread = server.post("/v1/threads").json(&json!({"projectPath": "/repo"})).await;
    let thread: serde_json::Value = thread.json();
    let thread_id = thread["id"].as_str().unwrap().to_string();

    let open = server.post(&format!("/v1/threads/{thread_id}/terminal/open")).json(&json!({"cwd": "/repo"})).await;
    open.assert_status_ok();
    let open: serde_json::Value = open.json();
    let sid = open["session"]["id"].as_str().unwrap().to_string();
    assert!(open["wsPath"].as_str().unwrap().contains(&sid));

    let resize = server.post(&format!("/v1/terminals/{sid}/resize")).json(&json!({"cols": 100, "rows": 40})).await;
    resize.assert_status_ok();

    let close = server.post(&format!("/v1/terminals/{sid}/close")).json(&json!({})).await;
    close.assert_status_ok();
}

#[tokio::test]
async fn terminal_status_is_null_before_open() {
    let ctx = build_state(None).await;
    let server = server_for(ctx.state.clone());

    let thread = server.post("/v1/threads").json(&json!({"projectPath": "/repo"})).await;
    let thread: serde_json::Value = thread.json();
    let thread_id = thread["id"].as_str().unwrap().to_string();

    let status = server.get(&format!("/v1/threads/{thread_id}/terminal")).await;
    status.assert_status_ok();
    let status: serde_json::Value = status.json();
    assert!(status.is_null());
}

#[tokio::test]
async fn open_terminal_outside_whitelist_is_forbidden() {
    let ctx = crate::http::test_support::build_state_with_whitelist(vec!["/allowed".into()]).await;
    let server = server_for(ctx.state.clone());

    let thread = server.post("/v1/threads").json(&json!({"projectPath": "/allowed/repo"})).await;
    let thread: serde_json::Value = thread.json();
    let thread_id = thread["id"].as_str().unwrap().to_string();

    let open = server.post(&format!("/v1/threads/{thread_id}/terminal/open")).json(&json!({"cwd": "/elsewhere"})).await;
    open.assert_status(axum::http::StatusCode::FORBIDDEN);
}
