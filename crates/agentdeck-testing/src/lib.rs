//! Test harness for AgentDeck
//!
//! [`FakeAgent`] speaks the agent side of ACP over an in-memory duplex
//! stream. Each persona (mode) has a script of [`Step`]s that is played
//! back on every `session/prompt` while that mode is active.

use agentdeck_core::acp::{AcpConnection, AgentClient, SessionConnector, Transport};
use agentdeck_core::types::ClientCapabilities;
use agentdeck_core::Result;
use async_trait::async_trait;
use serde_json::{json, Value};
use std::collections::{HashMap, HashSet};
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;
use tokio::io::{AsyncBufReadExt, AsyncWriteExt, BufReader};
use tokio::sync::{mpsc, oneshot, watch};
use tracing::debug;

static NEXT_SESSION: AtomicU64 = AtomicU64::new(1);

/// Mode a fresh fake session starts in
pub const DEFAULT_MODE: &str = "kiro_default";

/// One scripted action taken while answering a prompt
#[derive(Debug, Clone)]
pub enum Step {
    /// `agent_message_chunk` with this text
    Text(String),
    /// Raw `update` object, sent as-is
    Update(Value),
    /// Agent-to-client request; the script waits for the reply
    Request { method: String, params: Value },
    Delay(Duration),
    /// Stop here and never answer the prompt
    Hang,
    /// Close the stream as if the process died
    Exit,
}

impl Step {
    pub fn text(text: impl Into<String>) -> Self {
        Self::Text(text.into())
    }

    pub fn request(method: impl Into<String>, params: Value) -> Self {
        Self::Request {
            method: method.into(),
            params,
        }
    }
}

/// Scripted agent, cloned once per connection
#[derive(Debug, Clone, Default)]
pub struct FakeAgent {
    scripts: HashMap<String, Vec<Step>>,
    rejected_modes: HashSet<String>,
    silent_methods: HashSet<String>,
    held_replies: Option<(String, usize)>,
}

impl FakeAgent {
    pub fn new() -> Self {
        Self::default()
    }

    /// Play `steps` for every prompt answered while `mode` is active
    pub fn on_prompt(mut self, mode: &str, steps: Vec<Step>) -> Self {
        self.scripts.insert(mode.to_string(), steps);
        self
    }

    /// Fail `session/set_mode` for `mode`
    pub fn reject_mode(mut self, mode: &str) -> Self {
        self.rejected_modes.insert(mode.to_string());
        self
    }

    /// Never answer requests for `method`
    pub fn silent(mut self, method: &str) -> Self {
        self.silent_methods.insert(method.to_string());
        self
    }

    /// Hold replies to `method` until `count` are waiting, then send them
    /// newest first
    pub fn reverse_replies(mut self, method: &str, count: usize) -> Self {
        self.held_replies = Some((method.to_string(), count));
        self
    }

    /// Start the agent and return the client end as a transport
    pub fn spawn(self) -> (Transport, FakeAgentHandle) {
        let (client_io, agent_io) = tokio::io::duplex(64 * 1024);
        let (client_read, client_write) = tokio::io::split(client_io);
        let (agent_read, mut agent_write) = tokio::io::split(agent_io);

        let (out_tx, mut out_rx) = mpsc::unbounded_channel::<String>();
        let (kill_tx, kill_rx) = watch::channel(false);
        let kill_tx = Arc::new(kill_tx);
        let state = Arc::new(AgentState::default());

        let mut killed = kill_rx.clone();
        tokio::spawn(async move {
            loop {
                tokio::select! {
                    line = out_rx.recv() => {
                        let Some(line) = line else { break };
                        if agent_write.write_all(line.as_bytes()).await.is_err()
                            || agent_write.write_all(b"\n").await.is_err()
                        {
                            break;
                        }
                        let _ = agent_write.flush().await;
                    }
                    _ = async { let _ = killed.wait_for(|k| *k).await; } => break,
                }
            }
        });

        let runner = Runner {
            agent: Arc::new(self),
            state: Arc::clone(&state),
            out: out_tx.clone(),
            kill: Arc::clone(&kill_tx),
        };
        let mut killed = kill_rx;
        tokio::spawn(async move {
            let mut lines = BufReader::new(agent_read).lines();
            loop {
                tokio::select! {
                    line = lines.next_line() => match line {
                        Ok(Some(line)) => runner.handle_line(&line),
                        _ => break,
                    },
                    _ = killed.wait_for(|k| *k) => break,
                }
            }
            runner.kill.send_replace(true);
            debug!("Fake agent stopped");
        });

        let handle = FakeAgentHandle {
            state,
            out: out_tx,
            kill: kill_tx,
        };
        (Transport::from_io(client_read, client_write), handle)
    }

    /// Start the agent, wrap it in a connection and run `initialize`
    pub async fn connect(
        self,
        client: Arc<dyn AgentClient>,
        request_timeout: Duration,
    ) -> Result<(AcpConnection, FakeAgentHandle)> {
        let (transport, handle) = self.spawn();
        let connection = AcpConnection::with_transport(transport, client, request_timeout);
        connection.initialize(ClientCapabilities::default()).await?;
        Ok((connection, handle))
    }
}

#[derive(Default)]
struct AgentState {
    received: Mutex<Vec<Value>>,
    replies: Mutex<Vec<Value>>,
    mode: Mutex<Option<String>>,
    switches: Mutex<Vec<String>>,
    waiting: Mutex<HashMap<u64, oneshot::Sender<Value>>>,
    held: Mutex<Vec<Value>>,
    next_request: AtomicU64,
}

fn lock<T>(mutex: &Mutex<T>) -> std::sync::MutexGuard<'_, T> {
    mutex.lock().unwrap_or_else(|p| p.into_inner())
}

#[derive(Clone)]
struct Runner {
    agent: Arc<FakeAgent>,
    state: Arc<AgentState>,
    out: mpsc::UnboundedSender<String>,
    kill: Arc<watch::Sender<bool>>,
}

impl Runner {
    fn send(&self, message: Value) {
        let _ = self.out.send(message.to_string());
    }

    fn reply(&self, method: &str, id: &Value, result: Value) {
        self.respond(method, json!({"jsonrpc": "2.0", "id": id, "result": result}));
    }

    fn fail(&self, method: &str, id: &Value, code: i32, message: String) {
        self.respond(
            method,
            json!({"jsonrpc": "2.0", "id": id, "error": {"code": code, "message": message}}),
        );
    }

    fn respond(&self, method: &str, message: Value) {
        let Some((held_method, count)) = &self.agent.held_replies else {
            return self.send(message);
        };
        if held_method != method {
            return self.send(message);
        }
        let release = {
            let mut held = lock(&self.state.held);
            held.push(message);
            if held.len() < *count {
                return;
            }
            std::mem::take(&mut *held)
        };
        for message in release.into_iter().rev() {
            self.send(message);
        }
    }

    fn handle_line(&self, line: &str) {
        let Ok(message) = serde_json::from_str::<Value>(line) else {
            return;
        };
        let id = message.get("id").cloned().filter(|id| !id.is_null());
        let method = message.get("method").and_then(Value::as_str).map(String::from);

        match (method, id) {
            (Some(method), Some(id)) => {
                lock(&self.state.received).push(message.clone());
                if self.agent.silent_methods.contains(&method) {
                    return;
                }
                let params = message.get("params").cloned().unwrap_or(Value::Null);
                self.handle_request(&method, id, params);
            }
            (None, Some(id)) => {
                lock(&self.state.replies).push(message.clone());
                let waiter = id.as_u64().and_then(|id| lock(&self.state.waiting).remove(&id));
                if let Some(waiter) = waiter {
                    let _ = waiter.send(message);
                }
            }
            _ => lock(&self.state.received).push(message),
        }
    }

    fn handle_request(&self, method: &str, id: Value, params: Value) {
        match method {
            "initialize" => self.reply(
                method,
                &id,
                json!({"protocolVersion": 1, "agentCapabilities": {}}),
            ),
            "session/new" => {
                let session_id = format!("fake-session-{}", NEXT_SESSION.fetch_add(1, Ordering::SeqCst));
                *lock(&self.state.mode) = Some(DEFAULT_MODE.to_string());
                self.reply(method, &id, json!({"sessionId": session_id}));
            }
            "session/set_mode" => {
                let mode = params["modeId"].as_str().unwrap_or_default().to_string();
                if self.agent.rejected_modes.contains(&mode) {
                    self.fail(method, &id, -32000, format!("Unknown agent: {}", mode));
                    return;
                }
                lock(&self.state.switches).push(mode.clone());
                *lock(&self.state.mode) = Some(mode);
                self.reply(method, &id, json!({}));
            }
            "session/prompt" => {
                let session_id = params["sessionId"].clone();
                let mode = lock(&self.state.mode).clone().unwrap_or_else(|| DEFAULT_MODE.to_string());
                let steps = self.agent.scripts.get(&mode).cloned().unwrap_or_default();
                let runner = self.clone();
                tokio::spawn(async move { runner.play(id, session_id, steps).await });
            }
            "session/cancel" => self.reply(method, &id, json!({})),
            other => self.fail(other, &id, -32601, format!("Method not found: {}", other)),
        }
    }

    async fn play(self, id: Value, session_id: Value, steps: Vec<Step>) {
        for step in steps {
            match step {
                Step::Text(text) => self.notify(&session_id, json!({
                    "sessionUpdate": "agent_message_chunk",
                    "content": {"type": "text", "text": text}
                })),
                Step::Update(update) => self.notify(&session_id, update),
                Step::Request { method, params } => {
                    let request_id = 1000 + self.state.next_request.fetch_add(1, Ordering::SeqCst);
                    let (tx, rx) = oneshot::channel();
                    lock(&self.state.waiting).insert(request_id, tx);
                    self.send(json!({
                        "jsonrpc": "2.0",
                        "id": request_id,
                        "method": method,
                        "params": params
                    }));
                    let _ = rx.await;
                }
                Step::Delay(duration) => tokio::time::sleep(duration).await,
                Step::Hang => return,
                Step::Exit => {
                    self.kill.send_replace(true);
                    return;
                }
            }
        }
        self.reply("session/prompt", &id, json!({"stopReason": "end_turn"}));
    }

    fn notify(&self, session_id: &Value, update: Value) {
        self.send(json!({
            "jsonrpc": "2.0",
            "method": "session/update",
            "params": {"sessionId": session_id, "update": update}
        }));
    }
}

/// Test-side view of a running fake agent
#[derive(Clone)]
pub struct FakeAgentHandle {
    state: Arc<AgentState>,
    out: mpsc::UnboundedSender<String>,
    kill: Arc<watch::Sender<bool>>,
}

impl FakeAgentHandle {
    /// Every request and notification the client sent, in order
    pub fn received(&self) -> Vec<Value> {
        lock(&self.state.received).clone()
    }

    pub fn methods(&self) -> Vec<String> {
        self.received()
            .iter()
            .filter_map(|m| m.get("method").and_then(Value::as_str).map(String::from))
            .collect()
    }

    /// Client replies to the agent's own requests
    pub fn replies(&self) -> Vec<Value> {
        lock(&self.state.replies).clone()
    }

    /// Modes accepted through `session/set_mode`, in order
    pub fn mode_switches(&self) -> Vec<String> {
        lock(&self.state.switches).clone()
    }

    /// Write a raw line to the client
    pub fn send_raw(&self, line: impl Into<String>) {
        let _ = self.out.send(line.into());
    }

    /// Close the stream as if the process died
    pub fn kill(&self) {
        self.kill.send_replace(true);
    }
}

/// [`SessionConnector`] that starts a fresh [`FakeAgent`] per connection
pub struct FakeConnector {
    agent: FakeAgent,
    client: Arc<dyn AgentClient>,
    request_timeout: Duration,
    handles: Mutex<Vec<FakeAgentHandle>>,
}

impl FakeConnector {
    pub fn new(agent: FakeAgent, client: Arc<dyn AgentClient>) -> Self {
        Self {
            agent,
            client,
            request_timeout: Duration::from_secs(5),
            handles: Mutex::new(Vec::new()),
        }
    }

    pub fn with_request_timeout(mut self, timeout: Duration) -> Self {
        self.request_timeout = timeout;
        self
    }

    /// Handles of every agent started so far, oldest first
    pub fn handles(&self) -> Vec<FakeAgentHandle> {
        lock(&self.handles).clone()
    }
}

#[async_trait]
impl SessionConnector for FakeConnector {
    async fn connect(&self) -> Result<AcpConnection> {
        let (connection, handle) = self
            .agent
            .clone()
            .connect(Arc::clone(&self.client), self.request_timeout)
            .await?;
        lock(&self.handles).push(handle);
        Ok(connection)
    }
}
