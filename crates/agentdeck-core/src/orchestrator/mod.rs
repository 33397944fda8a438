//! Prompt turns and coordinator delegation
//!
//! A turn on an ordinary session relays the agent's updates as they come.
//! On a coordinator session the text goes through [`DelegationParser`]; if
//! it carries a `<delegate>` directive, the session is switched to the named
//! agent once the coordinator is done, the task is prompted there, and the
//! session is switched back. Every turn ends with exactly one `turn_end`.

mod parser;

pub use parser::{DelegationParser, Directive, ParseOutput};

use crate::acp::{AcpConnection, PooledSession, UpdateSubscription};
use crate::config::DeckConfig;
use crate::error::{Error, Result};
use crate::types::{DelegationStatus, NewMessage, PromptResponse, SessionUpdate};
use std::sync::Arc;
use tokio::sync::mpsc;
use tracing::{debug, info, warn};

/// Where finished messages of a turn are recorded
pub trait ChatTranscript: Send + Sync {
    fn save_message(&self, session_id: &str, message: NewMessage) -> Result<()>;
}

/// Transcript that records nothing
pub struct NoopTranscript;

impl ChatTranscript for NoopTranscript {
    fn save_message(&self, _session_id: &str, _message: NewMessage) -> Result<()> {
        Ok(())
    }
}

/// Runs prompt turns against pooled sessions
pub struct Orchestrator {
    coordinator_marker: String,
    max_held_bytes: usize,
    cancel_on_disconnect: bool,
    transcript: Arc<dyn ChatTranscript>,
}

/// Result of the first (coordinator or plain) phase of a turn
struct LeadTurn {
    /// Everything the agent said, or only the part before the directive
    text: String,
    directive: Option<Directive>,
    stop_reason: Option<String>,
}

impl Orchestrator {
    pub fn new(config: &DeckConfig, transcript: Arc<dyn ChatTranscript>) -> Self {
        Self {
            coordinator_marker: config.coordinator_marker.clone(),
            max_held_bytes: config.max_held_bytes,
            cancel_on_disconnect: config.cancel_on_disconnect,
            transcript,
        }
    }

    pub fn is_coordinator(&self, agent_name: &str) -> bool {
        agent_name.contains(&self.coordinator_marker)
    }

    /// Run one user turn and stream its updates into `sink`.
    ///
    /// Never fails: problems are reported as an `error` update, and the last
    /// update sent is always `turn_end`.
    pub async fn run_prompt(
        &self,
        session: &PooledSession,
        message: &str,
        sink: mpsc::Sender<SessionUpdate>,
    ) {
        let mut out = Emitter::new(sink);
        if self.cancel_on_disconnect {
            let connection = Arc::clone(&session.connection);
            let session_id = session.session_id.clone();
            out.on_disconnect(move || {
                tokio::spawn(async move {
                    if let Err(e) = connection.cancel(&session_id).await {
                        debug!("Cancel after caller disconnect failed: {}", e);
                    }
                });
            });
        }

        let stop_reason = match self.lead_turn(session, message, &mut out).await {
            Ok(LeadTurn {
                text,
                directive: None,
                stop_reason,
            }) => {
                self.record(session, NewMessage::assistant(text, &session.agent_name), false);
                stop_reason
            }
            Ok(LeadTurn {
                text,
                directive: Some(directive),
                ..
            }) => {
                // Only the text before the directive is the coordinator's message.
                self.record(
                    session,
                    NewMessage::assistant(text.trim(), &session.agent_name),
                    false,
                );
                self.delegate(session, directive, &mut out).await
            }
            Err(e) => {
                warn!("Prompt on session {} failed: {}", session.session_id, e);
                out.emit(SessionUpdate::error(e.to_string())).await;
                None
            }
        };

        out.emit(SessionUpdate::turn_end(stop_reason)).await;
    }

    async fn lead_turn(
        &self,
        session: &PooledSession,
        message: &str,
        out: &mut Emitter,
    ) -> Result<LeadTurn> {
        let mut parser = self
            .is_coordinator(&session.agent_name)
            .then(|| DelegationParser::new(self.max_held_bytes));
        let mut full_text = String::new();
        let mut shown = String::new();
        let mut found: Option<Directive> = None;

        let mut updates = session.connection.subscribe();
        let response = relay_until_done(
            &session.connection,
            &session.session_id,
            message,
            &mut updates,
            |update| {
                let content = match update {
                    SessionUpdate::Text { content } => content,
                    other => return Some(other),
                };
                full_text.push_str(&content);
                let Some(parser) = parser.as_mut() else {
                    shown.push_str(&content);
                    return Some(SessionUpdate::text(content));
                };
                let ParseOutput { forward, directive } = parser.push(&content);
                if let Some(directive) = directive {
                    info!(
                        "Session {} delegates to {}",
                        session.session_id, directive.agent
                    );
                    found = Some(directive);
                }
                if forward.is_empty() {
                    return None;
                }
                shown.push_str(&forward);
                Some(SessionUpdate::text(forward))
            },
            out,
        )
        .await;
        drop(updates);
        let response = response?;

        let Some(mut parser) = parser else {
            return Ok(LeadTurn {
                text: full_text,
                directive: None,
                stop_reason: response.stop_reason,
            });
        };

        if found.is_none() {
            // No directive after all: release any held tail.
            let held = parser.finish();
            if !held.is_empty() {
                out.emit(SessionUpdate::text(held)).await;
            }
            return Ok(LeadTurn {
                text: full_text,
                directive: None,
                stop_reason: response.stop_reason,
            });
        }

        Ok(LeadTurn {
            text: shown,
            directive: found,
            stop_reason: response.stop_reason,
        })
    }

    /// Hand `directive` to its agent and switch back. Returns the delegate's stop reason.
    async fn delegate(
        &self,
        session: &PooledSession,
        directive: Directive,
        out: &mut Emitter,
    ) -> Option<String> {
        let Directive { agent, task } = directive;
        self.record(session, NewMessage::delegation(task.clone(), agent.clone()), true);
        out.emit(SessionUpdate::Delegation {
            agent: agent.clone(),
            task: task.clone(),
            status: DelegationStatus::Start,
        })
        .await;

        let result = self.run_delegate(session, &agent, &task, out).await;
        match result {
            Ok(stop_reason) => stop_reason,
            Err(e) => {
                warn!("Delegation from session {} to {} failed: {}", session.session_id, agent, e);
                out.emit(SessionUpdate::error(Error::Delegation(e.to_string()).to_string()))
                    .await;
                if let Err(e) = session
                    .connection
                    .switch_agent(&session.session_id, &session.agent_name)
                    .await
                {
                    warn!("Could not switch session {} back to {}: {}", session.session_id, session.agent_name, e);
                }
                None
            }
        }
    }

    async fn run_delegate(
        &self,
        session: &PooledSession,
        agent: &str,
        task: &str,
        out: &mut Emitter,
    ) -> Result<Option<String>> {
        let connection = &session.connection;
        connection.switch_agent(&session.session_id, agent).await?;

        let mut delegated_text = String::new();
        let mut updates = connection.subscribe();
        let response = relay_until_done(
            connection,
            &session.session_id,
            task,
            &mut updates,
            |update| {
                if let SessionUpdate::Text { content } = &update {
                    delegated_text.push_str(content);
                }
                Some(update)
            },
            out,
        )
        .await;
        drop(updates);
        let response = response?;

        self.record(session, NewMessage::assistant(delegated_text, agent), false);
        out.emit(SessionUpdate::Delegation {
            agent: agent.to_string(),
            task: task.to_string(),
            status: DelegationStatus::End,
        })
        .await;

        connection
            .switch_agent(&session.session_id, &session.agent_name)
            .await?;
        Ok(response.stop_reason)
    }

    /// Append to the transcript. Blank messages are skipped unless `keep_blank`.
    fn record(&self, session: &PooledSession, message: NewMessage, keep_blank: bool) {
        if !keep_blank && message.content.trim().is_empty() {
            return;
        }
        if let Err(e) = self.transcript.save_message(&session.session_id, message) {
            warn!("Failed to save message for session {}: {}", session.session_id, e);
        }
    }
}

/// Prompt and relay updates until the prompt call resolves.
///
/// Updates already received when the call resolves are drained before
/// returning, so nothing the agent said during the turn is lost.
async fn relay_until_done<F>(
    connection: &AcpConnection,
    session_id: &str,
    text: &str,
    updates: &mut UpdateSubscription,
    mut filter: F,
    out: &mut Emitter,
) -> Result<PromptResponse>
where
    F: FnMut(SessionUpdate) -> Option<SessionUpdate>,
{
    let prompt = connection.prompt(session_id, text);
    tokio::pin!(prompt);

    let response = loop {
        tokio::select! {
            biased;
            Some(decoded) = updates.recv() => {
                if let Some(update) = accept(decoded, session_id).and_then(&mut filter) {
                    out.emit(update).await;
                }
            }
            response = &mut prompt => break response,
        }
    };

    while let Some(decoded) = updates.try_recv() {
        if let Some(update) = accept(decoded, session_id).and_then(&mut filter) {
            out.emit(update).await;
        }
    }

    response
}

/// Keep updates for this session; the closing `turn_end` is ours to send.
fn accept(decoded: crate::acp::DecodedUpdate, session_id: &str) -> Option<SessionUpdate> {
    if decoded
        .session_id
        .as_deref()
        .map_or(false, |id| id != session_id)
    {
        return None;
    }
    if decoded.update.is_turn_end() {
        return None;
    }
    Some(decoded.update)
}

/// Sends updates to the caller until the caller goes away.
struct Emitter {
    sink: mpsc::Sender<SessionUpdate>,
    open: bool,
    on_disconnect: Option<Box<dyn FnOnce() + Send>>,
}

impl Emitter {
    fn new(sink: mpsc::Sender<SessionUpdate>) -> Self {
        Self {
            sink,
            open: true,
            on_disconnect: None,
        }
    }

    fn on_disconnect(&mut self, hook: impl FnOnce() + Send + 'static) {
        self.on_disconnect = Some(Box::new(hook));
    }

    async fn emit(&mut self, update: SessionUpdate) {
        if !self.open {
            return;
        }
        if self.sink.send(update).await.is_err() {
            debug!("Update receiver dropped; continuing turn without a caller");
            self.open = false;
            if let Some(hook) = self.on_disconnect.take() {
                hook();
            }
        }
    }
}
