use agentdeck_core::acp::{AgentClient, WorkspaceClient};
use agentdeck_core::sandbox::{TerminalLimits, WorkspaceRoot};
use agentdeck_core::{DeckConfig, Storage};
use agentdeck_server::{router, AppState};
use agentdeck_testing::{FakeAgent, FakeConnector, Step, DEFAULT_MODE};
use axum::body::Body;
use axum::http::{Method, Request, StatusCode};
use axum::Router;
use http_body_util::BodyExt;
use pretty_assertions::assert_eq;
use serde_json::{json, Value};
use std::sync::Arc;
use tempfile::TempDir;
use tower::ServiceExt;

struct TestApp {
    _dir: TempDir,
    state: AppState,
}

impl TestApp {
    fn new() -> Self {
        let dir = tempfile::tempdir().unwrap();
        let client: Arc<dyn AgentClient> = Arc::new(WorkspaceClient::new(
            WorkspaceRoot::new(dir.path()).unwrap(),
            TerminalLimits::default(),
        ));
        let agent = FakeAgent::new()
            .on_prompt("backend-agent", vec![Step::text("Hi"), Step::text(" there")])
            .on_prompt(DEFAULT_MODE, vec![Step::text("Hello! "), Step::text("What agent?")]);
        let connector = Arc::new(FakeConnector::new(agent, client));
        let config = DeckConfig {
            workspace_dir: dir.path().to_path_buf(),
            ..DeckConfig::default()
        };
        let storage = Arc::new(Storage::in_memory().unwrap());
        let state = AppState::from_parts(config, storage, connector);
        Self { _dir: dir, state }
    }

    fn router(&self) -> Router {
        router(self.state.clone())
    }

    async fn send(&self, method: Method, uri: &str, body: Option<Value>) -> (StatusCode, Vec<u8>) {
        let builder = Request::builder().method(method).uri(uri);
        let request = match body {
            Some(body) => builder
                .header("content-type", "application/json")
                .body(Body::from(body.to_string()))
                .unwrap(),
            None => builder.body(Body::empty()).unwrap(),
        };
        let response = self.router().oneshot(request).await.unwrap();
        let status = response.status();
        let bytes = response.into_body().collect().await.unwrap().to_bytes();
        (status, bytes.to_vec())
    }

    async fn json(&self, method: Method, uri: &str, body: Option<Value>) -> (StatusCode, Value) {
        let (status, bytes) = self.send(method, uri, body).await;
        let value = if bytes.is_empty() {
            Value::Null
        } else {
            serde_json::from_slice(&bytes).unwrap()
        };
        (status, value)
    }

    async fn create_agent(&self, name: &str, parent: Option<&str>) -> String {
        let mut body = json!({
            "name": name,
            "description": format!("{} description", name),
            "prompt": "You help."
        });
        if let Some(parent) = parent {
            body["parentAgentId"] = json!(parent);
        }
        let (status, meta) = self.json(Method::POST, "/api/agents", Some(body)).await;
        assert_eq!(status, StatusCode::CREATED, "{}", meta);
        meta["id"].as_str().unwrap().to_string()
    }
}

/// `data:` payloads of an SSE body, in order
fn sse_data(body: &[u8]) -> Vec<String> {
    String::from_utf8_lossy(body)
        .lines()
        .filter_map(|line| line.strip_prefix("data: ").or_else(|| line.strip_prefix("data:")))
        .map(str::to_string)
        .collect()
}

#[tokio::test]
async fn test_health_reports_database_and_sessions() {
    let app = TestApp::new();
    let (status, body) = app.json(Method::GET, "/api/health", None).await;

    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["status"], "healthy");
    assert_eq!(body["checks"]["database"], "ok");
    assert_eq!(body["checks"]["sessions"], "0 active");
    assert!(body["timestamp"].is_string());
}

#[tokio::test]
async fn test_agent_crud() {
    let app = TestApp::new();
    let parent = app.create_agent("dev-orchestrator", None).await;
    let child = app.create_agent("backend-agent", Some(&parent)).await;

    let (status, body) = app
        .json(
            Method::POST,
            "/api/agents",
            Some(json!({"name": "backend-agent", "description": "d", "prompt": "p"})),
        )
        .await;
    assert_eq!(status, StatusCode::CONFLICT);
    assert_eq!(body["error"]["code"], "AGENT_EXISTS");

    let (status, body) = app
        .json(
            Method::POST,
            "/api/agents",
            Some(json!({"name": "Bad Name", "description": "d", "prompt": "p"})),
        )
        .await;
    assert_eq!(status, StatusCode::BAD_REQUEST);
    assert_eq!(body["error"]["code"], "VALIDATION_ERROR");

    let (status, body) = app.json(Method::GET, "/api/agents", None).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["agents"].as_array().unwrap().len(), 2);

    let (status, body) = app.json(Method::GET, &format!("/api/agents/{}", parent), None).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["config"]["name"], "dev-orchestrator");
    assert_eq!(body["config"]["tools"], json!(["read", "write"]));
    assert_eq!(body["children"][0]["id"], child.as_str());

    let (status, body) = app
        .json(
            Method::PUT,
            &format!("/api/agents/{}", child),
            Some(json!({"name": "api-agent"})),
        )
        .await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["name"], "api-agent");
    assert_eq!(body["configPath"], ".kiro/agents/api-agent.json");

    let (status, _) = app.send(Method::DELETE, &format!("/api/agents/{}", child), None).await;
    assert_eq!(status, StatusCode::NO_CONTENT);
    let (status, body) = app.json(Method::GET, &format!("/api/agents/{}", child), None).await;
    assert_eq!(status, StatusCode::NOT_FOUND);
    assert_eq!(body["error"]["code"], "AGENT_NOT_FOUND");
}

#[tokio::test]
async fn test_chat_session_prompt_and_history() {
    let app = TestApp::new();
    let parent = app.create_agent("dev-orchestrator", None).await;
    let agent_id = app.create_agent("backend-agent", Some(&parent)).await;

    let (status, body) = app
        .json(Method::POST, "/api/chat/session", Some(json!({"agentId": "missing"})))
        .await;
    assert_eq!(status, StatusCode::NOT_FOUND);
    assert_eq!(body["error"]["code"], "AGENT_NOT_FOUND");

    let (status, session) = app
        .json(Method::POST, "/api/chat/session", Some(json!({"agentId": agent_id})))
        .await;
    assert_eq!(status, StatusCode::CREATED);
    assert_eq!(session["agentName"], "backend-agent");
    assert_eq!(session["model"], "claude-sonnet-4");
    assert_eq!(session["children"], json!([]));
    let session_id = session["sessionId"].as_str().unwrap().to_string();

    let (_, active) = app.json(Method::GET, "/api/chat/sessions", None).await;
    assert_eq!(active["sessions"][0]["sessionId"], session_id.as_str());

    let (status, body) = app
        .send(
            Method::POST,
            "/api/chat/prompt",
            Some(json!({"sessionId": session_id, "message": "hello agent"})),
        )
        .await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(
        sse_data(&body),
        vec![
            r#"{"type":"text","content":"Hi"}"#,
            r#"{"type":"text","content":" there"}"#,
            r#"{"type":"turn_end","stopReason":"end_turn"}"#,
            "[DONE]",
        ]
    );

    let (_, history) = app
        .json(Method::GET, &format!("/api/chat/history?sessionId={}", session_id), None)
        .await;
    let messages = history["messages"].as_array().unwrap();
    assert_eq!(messages.len(), 2);
    assert_eq!(messages[0]["role"], "user");
    assert_eq!(messages[1]["content"], "Hi there");

    let (_, listing) = app
        .json(Method::GET, &format!("/api/chat/history?agentId={}", agent_id), None)
        .await;
    assert_eq!(listing["sessions"][0]["title"], "hello agent");
    assert_eq!(listing["sessions"][0]["messageCount"], 2);

    let (status, _) = app
        .send(Method::DELETE, &format!("/api/chat/session/{}", session_id), None)
        .await;
    assert_eq!(status, StatusCode::NO_CONTENT);

    let (status, body) = app
        .json(
            Method::POST,
            "/api/chat/prompt",
            Some(json!({"sessionId": session_id, "message": "again"})),
        )
        .await;
    assert_eq!(status, StatusCode::NOT_FOUND);
    assert_eq!(body["error"]["code"], "SESSION_NOT_FOUND");
}

#[tokio::test]
async fn test_delete_history_requires_session_id() {
    let app = TestApp::new();

    let (status, body) = app.json(Method::DELETE, "/api/chat/history", Some(json!({}))).await;
    assert_eq!(status, StatusCode::BAD_REQUEST);
    assert_eq!(body["error"]["message"], "sessionId required");

    let (status, body) = app
        .json(Method::DELETE, "/api/chat/history", Some(json!({"sessionId": "gone"})))
        .await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body, json!({"ok": true}));
}

#[tokio::test]
async fn test_builder_streams_and_resets() {
    let app = TestApp::new();

    let (status, _) = app
        .json(Method::POST, "/api/builder/chat", Some(json!({"messages": []})))
        .await;
    assert_eq!(status, StatusCode::BAD_REQUEST);

    let (status, body) = app
        .send(
            Method::POST,
            "/api/builder/chat",
            Some(json!({"messages": [
                {"role": "assistant", "content": "Hi"},
                {"role": "user", "content": "I want a reviewer"}
            ]})),
        )
        .await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(
        sse_data(&body),
        vec![r#"{"text":"Hello! "}"#, r#"{"text":"What agent?"}"#, "[DONE]"]
    );
    assert!(app.state.builder.is_active().await);

    let (status, body) = app
        .json(Method::POST, "/api/builder/chat", Some(json!({"action": "reset"})))
        .await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body, json!({"ok": true}));
    assert!(!app.state.builder.is_active().await);
}

#[tokio::test]
async fn test_templates_listed() {
    let app = TestApp::new();
    let (status, body) = app.json(Method::GET, "/api/agents/templates", None).await;

    assert_eq!(status, StatusCode::OK);
    let templates = body["templates"].as_object().unwrap();
    assert_eq!(templates.len(), 5);
    assert_eq!(templates["orchestrator"]["name"], "orchestrator-agent");
    assert_eq!(templates["devops"]["tools"], json!(["read", "write", "shell", "aws"]));
}

#[tokio::test]
async fn test_draft_from_transcript_then_confirm() {
    let app = TestApp::new();

    let (status, body) = app
        .json(Method::POST, "/api/agents/from-voice", Some(json!({"transcript": "  "})))
        .await;
    assert_eq!(status, StatusCode::BAD_REQUEST);
    assert_eq!(body["error"]["code"], "MISSING_TRANSCRIPT");

    let transcript = "Create a changelog agent that reads git commits";
    let (status, draft) = app
        .json(Method::POST, "/api/agents/from-voice", Some(json!({"transcript": transcript})))
        .await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(draft["transcript"], transcript);
    assert_eq!(draft["needsConfirmation"], true);
    assert_eq!(draft["parsedConfig"]["name"], "changelog-agent");
    assert_eq!(draft["parsedConfig"]["tools"], json!(["read", "write", "@git"]));

    // Nothing is stored until the draft is confirmed.
    let (_, listing) = app.json(Method::GET, "/api/agents", None).await;
    assert_eq!(listing["agents"], json!([]));

    let (status, meta) = app
        .json(
            Method::POST,
            "/api/agents/confirm",
            Some(json!({"config": draft["parsedConfig"].clone()})),
        )
        .await;
    assert_eq!(status, StatusCode::CREATED);
    assert_eq!(meta["name"], "changelog-agent");

    let (status, meta) = app
        .json(
            Method::POST,
            "/api/agents/confirm",
            Some(json!({"name": "bare-agent", "description": "Bare", "prompt": "Go."})),
        )
        .await;
    assert_eq!(status, StatusCode::CREATED);
    assert_eq!(meta["name"], "bare-agent");

    let (status, body) = app
        .json(Method::POST, "/api/agents/confirm", Some(json!({"config": {"name": "x"}})))
        .await;
    assert_eq!(status, StatusCode::BAD_REQUEST);
    assert_eq!(body["error"]["code"], "VALIDATION_ERROR");
}
