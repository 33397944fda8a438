use agentdeck_core::acp::{AcpConnection, AgentClient, WorkspaceClient};
use agentdeck_core::error::{AcpError, Error};
use agentdeck_core::sandbox::{TerminalLimits, WorkspaceRoot};
use agentdeck_core::types::SessionUpdate;
use agentdeck_testing::{FakeAgent, FakeAgentHandle, Step};
use pretty_assertions::assert_eq;
use serde_json::{json, Value};
use std::path::Path;
use std::sync::Arc;
use std::time::Duration;
use tempfile::tempdir;

fn client(root: &Path) -> Arc<dyn AgentClient> {
    Arc::new(WorkspaceClient::new(
        WorkspaceRoot::new(root).unwrap(),
        TerminalLimits::default(),
    ))
}

async fn connect(agent: FakeAgent, root: &Path, timeout: Duration) -> (AcpConnection, FakeAgentHandle) {
    agent.connect(client(root), timeout).await.unwrap()
}

fn request_id(handle: &FakeAgentHandle, method: &str) -> Value {
    handle
        .received()
        .into_iter()
        .find(|m| m["method"] == method)
        .map(|m| m["id"].clone())
        .unwrap()
}

#[tokio::test]
async fn test_timeout_rejects_and_purges() {
    let dir = tempdir().unwrap();
    let agent = FakeAgent::new().silent("session/prompt");
    let (connection, _handle) = connect(agent, dir.path(), Duration::from_millis(200)).await;
    let session_id = connection.create_session("/work").await.unwrap();

    let err = connection.prompt(&session_id, "hello").await.unwrap_err();
    match err {
        Error::Acp(AcpError::Timeout { method, .. }) => assert_eq!(method, "session/prompt"),
        other => panic!("expected timeout, got {:?}", other),
    }
    assert_eq!(connection.pending_count().await, 0);
}

#[tokio::test]
async fn test_late_response_is_discarded() {
    let dir = tempdir().unwrap();
    let agent = FakeAgent::new().silent("session/prompt");
    let (connection, handle) = connect(agent, dir.path(), Duration::from_millis(100)).await;
    let session_id = connection.create_session("/work").await.unwrap();
    assert!(connection.prompt(&session_id, "hello").await.is_err());

    let late_id = request_id(&handle, "session/prompt");
    handle.send_raw(json!({"jsonrpc": "2.0", "id": late_id, "result": {"stopReason": "end_turn"}}).to_string());

    // The connection keeps working and the late reply matched nothing.
    let again = connection.create_session("/work").await.unwrap();
    assert_ne!(again, session_id);
    assert_eq!(connection.pending_count().await, 0);
}

#[tokio::test]
async fn test_request_ids_increase() {
    let dir = tempdir().unwrap();
    let (connection, handle) = connect(FakeAgent::new(), dir.path(), Duration::from_secs(5)).await;

    let (a, b) = tokio::join!(connection.create_session("/a"), connection.create_session("/b"));
    assert_ne!(a.unwrap(), b.unwrap());

    let ids: Vec<u64> = handle
        .received()
        .iter()
        .filter_map(|m| m["id"].as_u64())
        .collect();
    assert_eq!(ids.len(), 3);
    let mut sorted = ids.clone();
    sorted.sort_unstable();
    sorted.dedup();
    assert_eq!(sorted.len(), 3);
    assert_eq!(sorted[0], 1);
}

fn session_number(session_id: &str) -> u64 {
    session_id.trim_start_matches("fake-session-").parse().unwrap()
}

#[tokio::test]
async fn test_pipelined_replies_matched_by_id() {
    let dir = tempdir().unwrap();
    let agent = FakeAgent::new().reverse_replies("session/new", 2);
    let (connection, handle) = connect(agent, dir.path(), Duration::from_secs(5)).await;

    let (a, b) = tokio::join!(connection.create_session("/a"), connection.create_session("/b"));
    let (a, b) = (a.unwrap(), b.unwrap());

    // The agent numbers sessions in arrival order but answers the later one first.
    let arrival: Vec<String> = handle
        .received()
        .iter()
        .filter(|m| m["method"] == "session/new")
        .map(|m| m["params"]["cwd"].as_str().unwrap().to_string())
        .collect();
    assert_eq!(arrival.len(), 2);
    let (first, second) = if arrival[0] == "/a" { (&a, &b) } else { (&b, &a) };
    assert!(session_number(first) < session_number(second), "{} / {}", first, second);
    assert_eq!(connection.pending_count().await, 0);
}

#[tokio::test]
async fn test_disconnect_rejects_pending_calls() {
    let dir = tempdir().unwrap();
    let agent = FakeAgent::new().on_prompt("kiro_default", vec![Step::Hang]);
    let (connection, _handle) = connect(agent, dir.path(), Duration::from_secs(30)).await;
    let connection = Arc::new(connection);
    let session_id = connection.create_session("/work").await.unwrap();

    let pending = {
        let connection = Arc::clone(&connection);
        tokio::spawn(async move { connection.prompt(&session_id, "hello").await })
    };
    while connection.pending_count().await == 0 {
        tokio::time::sleep(Duration::from_millis(5)).await;
    }

    connection.disconnect().await;
    let err = pending.await.unwrap().unwrap_err();
    assert!(matches!(err, Error::Acp(AcpError::Disconnected)), "got {:?}", err);
    assert_eq!(connection.active_session().await, None);
}

#[tokio::test]
async fn test_process_exit_fails_calls() {
    let dir = tempdir().unwrap();
    let agent = FakeAgent::new().on_prompt("kiro_default", vec![Step::text("partial"), Step::Exit]);
    let (connection, _handle) = connect(agent, dir.path(), Duration::from_secs(30)).await;
    let session_id = connection.create_session("/work").await.unwrap();

    let err = connection.prompt(&session_id, "hello").await.unwrap_err();
    assert!(err.is_retryable(), "got {:?}", err);

    tokio::time::timeout(Duration::from_secs(1), connection.closed())
        .await
        .unwrap();
    assert!(connection.is_closed());
    let err = connection.create_session("/work").await.unwrap_err();
    assert!(matches!(err, Error::Acp(AcpError::NotConnected)), "got {:?}", err);
}

#[tokio::test]
async fn test_updates_arrive_before_prompt_resolves() {
    let dir = tempdir().unwrap();
    let agent = FakeAgent::new().on_prompt(
        "kiro_default",
        vec![
            Step::text("Hi"),
            Step::Update(json!({
                "sessionUpdate": "tool_call",
                "toolCallId": "t1",
                "title": "read_file",
                "rawInput": {"path": "a.txt"}
            })),
            Step::Update(json!({"sessionUpdate": "plan", "entries": []})),
            Step::text(" there"),
        ],
    );
    let (connection, _handle) = connect(agent, dir.path(), Duration::from_secs(5)).await;
    let session_id = connection.create_session("/work").await.unwrap();

    let mut updates = connection.subscribe();
    let response = connection.prompt(&session_id, "hello").await.unwrap();
    assert_eq!(response.stop_reason.as_deref(), Some("end_turn"));

    let mut seen = Vec::new();
    while let Some(decoded) = updates.try_recv() {
        assert_eq!(decoded.session_id.as_deref(), Some(session_id.as_str()));
        seen.push(decoded.update);
    }
    assert_eq!(
        seen,
        vec![
            SessionUpdate::text("Hi"),
            SessionUpdate::ToolCall {
                name: "read_file".into(),
                status: "running".into(),
                args: Some(json!({"path": "a.txt"})),
            },
            SessionUpdate::text(" there"),
        ]
    );
}

#[tokio::test]
async fn test_malformed_lines_are_dropped() {
    let dir = tempdir().unwrap();
    let (connection, handle) = connect(FakeAgent::new(), dir.path(), Duration::from_secs(5)).await;

    handle.send_raw("this is not json");
    handle.send_raw("{\"jsonrpc\":\"2.0\",");
    assert!(connection.create_session("/work").await.is_ok());
    assert!(!connection.is_closed());
}

#[tokio::test]
async fn test_capability_requests_are_answered() {
    let dir = tempdir().unwrap();
    let workspace = dir.path().join("workspace");
    std::fs::create_dir(&workspace).unwrap();

    let agent = FakeAgent::new().on_prompt(
        "kiro_default",
        vec![
            Step::request("fs/write_text_file", json!({"path": "notes/a.txt", "content": "hi"})),
            Step::request("fs/readTextFile", json!({"path": "notes/a.txt"})),
            Step::request("fs/write_text_file", json!({"path": "../secret", "content": "x"})),
            Step::request("fs/listDirectory", json!({"path": "notes"})),
            Step::request("session/request_permission", json!({})),
        ],
    );
    let (connection, handle) = connect(agent, &workspace, Duration::from_secs(5)).await;
    let session_id = connection.create_session("/work").await.unwrap();
    connection.prompt(&session_id, "go").await.unwrap();

    let replies = handle.replies();
    assert_eq!(replies.len(), 5);
    assert!(replies[0]["result"].is_object());
    assert_eq!(replies[1]["result"]["content"], "hi");
    assert_eq!(replies[2]["error"]["code"], -32600);
    assert_eq!(
        replies[3]["result"]["entries"],
        json!([{"name": "a.txt", "isDirectory": false}])
    );
    assert_eq!(replies[4]["result"], json!({}));

    assert_eq!(std::fs::read_to_string(workspace.join("notes/a.txt")).unwrap(), "hi");
    assert!(!dir.path().join("secret").exists());
}
