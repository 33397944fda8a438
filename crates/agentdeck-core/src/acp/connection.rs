//! ACP Connection implementation
//!
//! One `AcpConnection` owns one agent process. Requests are correlated with
//! their responses through the pending map; `session/update` notifications
//! are decoded and fanned out to whoever subscribed for the current turn;
//! capability requests from the agent are answered by an [`AgentClient`].

use super::client_delegate::{dispatch, WorkspaceClient};
use super::decoder::{decode_session_update, DecodedUpdate};
use super::protocol::{AcpMessage, ProtocolHandler, METHOD_SESSION_UPDATE};
use super::traits::AgentClient;
use super::transport::{Transport, TransportEvent};
use crate::config::DeckConfig;
use crate::error::{AcpError, Error, Result};
use crate::sandbox::{TerminalLimits, WorkspaceRoot};
use crate::types::{ClientCapabilities, InitializeResult, JsonRpcRequest, JsonRpcResponse, PromptResponse};
use std::collections::HashMap;
use std::path::PathBuf;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use std::time::Duration;
use tokio::process::Child;
use tokio::sync::{mpsc, oneshot, watch, Mutex, RwLock};
use tracing::{debug, error, info, trace, warn};

type PendingMap = Arc<Mutex<HashMap<u64, oneshot::Sender<JsonRpcResponse>>>>;

/// Everything needed to start an agent process
#[derive(Debug, Clone)]
pub struct ConnectOptions {
    pub command: String,
    pub args: Vec<String>,
    /// Working directory of the agent and root of its capability sandbox
    pub workspace_dir: PathBuf,
    pub request_timeout: Duration,
    pub terminal: TerminalLimits,
}

impl ConnectOptions {
    pub fn from_config(config: &DeckConfig) -> Self {
        Self {
            command: config.agent_command.clone(),
            args: config.agent_args.clone(),
            workspace_dir: config.workspace_dir.clone(),
            request_timeout: config.request_timeout(),
            terminal: TerminalLimits {
                timeout: config.terminal_timeout(),
                max_output_bytes: config.terminal_max_output_bytes,
            },
        }
    }
}

/// ACP Connection for communicating with an agent
pub struct AcpConnection {
    protocol: ProtocolHandler,
    transport: Arc<Transport>,
    /// Pending requests (request_id -> response channel)
    pending_requests: PendingMap,
    subscribers: Arc<Subscribers>,
    /// Session created on this connection, if any
    active_session: RwLock<Option<String>>,
    request_timeout: Duration,
    closed_rx: watch::Receiver<bool>,
    /// Dropping or firing this stops the agent process
    kill_tx: std::sync::Mutex<Option<oneshot::Sender<()>>>,
    _message_task: tokio::task::JoinHandle<()>,
}

impl AcpConnection {
    /// Spawn the agent process and run the `initialize` handshake.
    pub async fn connect(options: &ConnectOptions) -> Result<Self> {
        info!("Connecting to agent: {} {:?}", options.command, options.args);

        let workspace = WorkspaceRoot::new(&options.workspace_dir)?;
        let (transport, child) =
            Transport::spawn(&options.command, &options.args, workspace.path()).await?;
        let client = Arc::new(WorkspaceClient::new(workspace, options.terminal));

        let connection = Self::with_transport(transport, client, options.request_timeout);
        connection.attach_child(child);

        connection.initialize(ClientCapabilities::default()).await?;
        Ok(connection)
    }

    /// Wrap an already established transport. No handshake is sent.
    pub fn with_transport(
        transport: Transport,
        client: Arc<dyn AgentClient>,
        request_timeout: Duration,
    ) -> Self {
        let transport = Arc::new(transport);
        let pending_requests: PendingMap = Arc::new(Mutex::new(HashMap::new()));
        let subscribers = Arc::new(Subscribers::default());
        let (closed_tx, closed_rx) = watch::channel(false);

        let message_task = tokio::spawn(Self::message_loop(
            Arc::clone(&transport),
            Arc::clone(&pending_requests),
            Arc::clone(&subscribers),
            client,
            closed_tx,
        ));

        Self {
            protocol: ProtocolHandler::new(),
            transport,
            pending_requests,
            subscribers,
            active_session: RwLock::new(None),
            request_timeout,
            closed_rx,
            kill_tx: std::sync::Mutex::new(None),
            _message_task: message_task,
        }
    }

    /// Hand the process to a reaper task that logs its exit and kills it on request.
    fn attach_child(&self, mut child: Child) {
        let (kill_tx, kill_rx) = oneshot::channel::<()>();
        let pid = child.id();
        tokio::spawn(async move {
            tokio::select! {
                status = child.wait() => match status {
                    Ok(status) => info!("Agent process {:?} exited with {}", pid, status),
                    Err(e) => warn!("Failed to wait for agent process {:?}: {}", pid, e),
                },
                _ = kill_rx => {
                    debug!("Killing agent process {:?}", pid);
                    if let Err(e) = child.kill().await {
                        warn!("Failed to kill agent process {:?}: {}", pid, e);
                    }
                }
            }
        });
        *self.kill_tx.lock().unwrap_or_else(|p| p.into_inner()) = Some(kill_tx);
    }

    /// Initialize the ACP connection
    pub async fn initialize(&self, capabilities: ClientCapabilities) -> Result<InitializeResult> {
        let request = self.protocol.create_initialize_request(capabilities)?;
        let response = self.call(request).await?;
        self.protocol.parse_initialize_response(response)
    }

    /// Open a protocol session; it becomes this connection's active session.
    pub async fn create_session(&self, cwd: &str) -> Result<String> {
        let request = self.protocol.create_session_new_request(cwd)?;
        let response = self.call(request).await?;
        let result = self.protocol.parse_session_new_response(response)?;
        *self.active_session.write().await = Some(result.session_id.clone());
        Ok(result.session_id)
    }

    /// Send one user utterance. Resolves when the agent ends its turn.
    pub async fn prompt(&self, session_id: &str, text: &str) -> Result<PromptResponse> {
        let request = self.protocol.create_session_prompt_request(session_id, text)?;
        let response = self.call(request).await?;
        self.protocol.parse_prompt_response(response)
    }

    /// Switch the persona answering in `session_id`
    pub async fn switch_agent(&self, session_id: &str, agent_name: &str) -> Result<()> {
        debug!("Switching session {} to agent {}", session_id, agent_name);
        let request = self.protocol.create_set_mode_request(session_id, agent_name)?;
        let response = self.call(request).await?;
        super::protocol::parse_result::<serde_json::Value>(response).map(|_| ())
    }

    /// Ask the agent to stop the current turn. The process is left running.
    pub async fn cancel(&self, session_id: &str) -> Result<()> {
        let request = self.protocol.create_cancel_request(session_id)?;
        let response = self.call(request).await?;
        super::protocol::parse_result::<serde_json::Value>(response).map(|_| ())
    }

    /// Kill the agent and fail every outstanding call with `Disconnected`.
    pub async fn disconnect(&self) {
        if let Some(kill_tx) = self.kill_tx.lock().unwrap_or_else(|p| p.into_inner()).take() {
            let _ = kill_tx.send(());
        }
        let rejected = reject_all(&self.pending_requests).await;
        if rejected > 0 {
            debug!("Rejected {} pending requests on disconnect", rejected);
        }
        *self.active_session.write().await = None;
    }

    /// Receive decoded updates until the subscription is dropped.
    pub fn subscribe(&self) -> UpdateSubscription {
        self.subscribers.subscribe()
    }

    pub async fn active_session(&self) -> Option<String> {
        self.active_session.read().await.clone()
    }

    /// True once the agent's output stream has ended.
    pub fn is_closed(&self) -> bool {
        *self.closed_rx.borrow()
    }

    /// Resolves when the agent's output stream ends.
    pub async fn closed(&self) {
        let mut rx = self.closed_rx.clone();
        let _ = rx.wait_for(|closed| *closed).await;
    }

    /// A handle that resolves on close without borrowing the connection.
    pub fn exit_signal(&self) -> watch::Receiver<bool> {
        self.closed_rx.clone()
    }

    pub async fn pending_count(&self) -> usize {
        self.pending_requests.lock().await.len()
    }

    /// Send request and wait for response
    async fn call(&self, request: JsonRpcRequest) -> Result<JsonRpcResponse> {
        let method = request.method.clone();
        let request_id = request
            .id
            .as_ref()
            .and_then(|v| v.as_u64())
            .ok_or_else(|| Error::Acp(AcpError::InvalidMessage("Request missing ID".to_string())))?;

        let (tx, rx) = oneshot::channel();
        self.pending_requests.lock().await.insert(request_id, tx);

        // The loop marks the connection closed before it drains the map, so
        // an entry inserted after the drain is caught here.
        if self.is_closed() {
            self.pending_requests.lock().await.remove(&request_id);
            return Err(Error::Acp(AcpError::NotConnected));
        }

        debug!("Sending request {} method={}", request_id, method);
        if let Err(e) = self.transport.write_line(&request).await {
            self.pending_requests.lock().await.remove(&request_id);
            return Err(e);
        }

        match tokio::time::timeout(self.request_timeout, rx).await {
            Ok(Ok(response)) => Ok(response),
            Ok(Err(_)) => Err(Error::Acp(AcpError::Disconnected)),
            Err(_) => {
                self.pending_requests.lock().await.remove(&request_id);
                warn!("Request {} ({}) timed out", request_id, method);
                Err(Error::Acp(AcpError::Timeout {
                    method,
                    secs: self.request_timeout.as_secs(),
                }))
            }
        }
    }

    /// Message processing loop
    async fn message_loop(
        transport: Arc<Transport>,
        pending_requests: PendingMap,
        subscribers: Arc<Subscribers>,
        client: Arc<dyn AgentClient>,
        closed_tx: watch::Sender<bool>,
    ) {
        let protocol = ProtocolHandler::new();

        loop {
            let value = match transport.recv().await {
                TransportEvent::Message(value) => value,
                TransportEvent::Closed => break,
            };

            match protocol.parse_message(value) {
                Ok(AcpMessage::Response(response)) => {
                    let Some(id) = response.id.as_ref().and_then(|v| v.as_u64()) else {
                        warn!("Dropping response without numeric id: {:?}", response.id);
                        continue;
                    };
                    let sender = pending_requests.lock().await.remove(&id);
                    match sender {
                        Some(tx) => {
                            trace!("Delivering response for request {}", id);
                            let _ = tx.send(response);
                        }
                        None => debug!("Discarding response for non-pending request {}", id),
                    }
                }
                Ok(AcpMessage::Notification { method, params }) => {
                    if method != METHOD_SESSION_UPDATE {
                        trace!("Ignoring notification {}", method);
                        continue;
                    }
                    if let Some(update) = decode_session_update(&params) {
                        subscribers.publish(update);
                    }
                }
                Ok(AcpMessage::AgentRequest(request)) => {
                    let transport = Arc::clone(&transport);
                    let client = Arc::clone(&client);
                    tokio::spawn(async move {
                        let response = dispatch(client.as_ref(), &request).await;
                        if let Err(e) = transport.write_line(&response).await {
                            error!("Failed to answer agent request {}: {}", request.method, e);
                        }
                    });
                }
                Err(e) => warn!("Failed to parse message: {}", e),
            }
        }

        info!("Agent connection closed");
        let _ = closed_tx.send(true);
        reject_all(&pending_requests).await;
        subscribers.close();
    }
}

impl Drop for AcpConnection {
    fn drop(&mut self) {
        self._message_task.abort();
    }
}

/// Drop every pending sender; each waiting call then sees `Disconnected`.
async fn reject_all(pending: &PendingMap) -> usize {
    let mut pending = pending.lock().await;
    let count = pending.len();
    pending.clear();
    count
}

// ============================================================================
// Update subscriptions
// ============================================================================

#[derive(Default)]
struct Subscribers {
    next_id: AtomicU64,
    senders: std::sync::Mutex<HashMap<u64, mpsc::UnboundedSender<DecodedUpdate>>>,
}

impl Subscribers {
    fn subscribe(self: &Arc<Self>) -> UpdateSubscription {
        let id = self.next_id.fetch_add(1, Ordering::Relaxed);
        let (tx, rx) = mpsc::unbounded_channel();
        self.lock().insert(id, tx);
        UpdateSubscription {
            id,
            rx,
            registry: Arc::downgrade(self),
        }
    }

    fn publish(&self, update: DecodedUpdate) {
        let senders = self.lock();
        if senders.is_empty() {
            trace!("No subscribers for session update");
        }
        for tx in senders.values() {
            let _ = tx.send(update.clone());
        }
    }

    fn unsubscribe(&self, id: u64) {
        self.lock().remove(&id);
    }

    /// End every subscription's stream.
    fn close(&self) {
        self.lock().clear();
    }

    fn lock(&self) -> std::sync::MutexGuard<'_, HashMap<u64, mpsc::UnboundedSender<DecodedUpdate>>> {
        self.senders.lock().unwrap_or_else(|p| p.into_inner())
    }
}

/// Decoded updates for one consumer, in emission order. Unsubscribes on drop.
pub struct UpdateSubscription {
    id: u64,
    rx: mpsc::UnboundedReceiver<DecodedUpdate>,
    registry: std::sync::Weak<Subscribers>,
}

impl UpdateSubscription {
    /// Next update; `None` once the connection has closed.
    pub async fn recv(&mut self) -> Option<DecodedUpdate> {
        self.rx.recv().await
    }

    /// An update that has already arrived, without waiting.
    pub fn try_recv(&mut self) -> Option<DecodedUpdate> {
        self.rx.try_recv().ok()
    }
}

impl Drop for UpdateSubscription {
    fn drop(&mut self) {
        if let Some(registry) = self.registry.upgrade() {
            registry.unsubscribe(self.id);
        }
    }
}
