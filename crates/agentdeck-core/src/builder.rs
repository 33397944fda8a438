//! Conversational agent builder
//!
//! A single long-lived agent session that interviews the user and drafts an
//! agent config. The session is created on the first message, keeps its own
//! history (only the latest user message is sent each turn) and is dropped
//! on [`Builder::reset`] or when its process exits.

use crate::acp::{AcpConnection, SessionConnector};
use crate::config::DeckConfig;
use crate::error::Result;
use crate::types::SessionUpdate;
use std::sync::{Arc, Weak};
use tokio::sync::{mpsc, Mutex};
use tracing::{debug, info};

pub const VALID_TOOLS: &[&str] = &["read", "write", "shell", "aws", "@git", "@fetch"];

pub const VALID_MODELS: &[&str] = &[
    "claude-sonnet-4",
    "claude-sonnet-4.5",
    "claude-haiku-4.5",
    "claude-opus-4.5",
    "auto",
];

/// Instructions prepended to the first message of a builder conversation
pub fn system_prompt() -> String {
    format!(
        r#"You are the agent creation assistant for AgentDeck. Have a natural conversation to gather what's needed for an agent config.

Collect:
1. **name**: lowercase, hyphens only (e.g. "fullstack-agent")
2. **description**: 1-2 sentence summary
3. **prompt**: YOU write a detailed system prompt based on the conversation
4. **tools**: ONLY these are valid: {tools}. Default: ["read", "write"]. Suggest based on purpose.
5. **model**: ONLY these are valid: {models}. Default: "claude-sonnet-4"
6. **standalone or team**

Rules:
- Be concise. 1-2 questions at a time. Voice-first UX.
- Infer what you can. Don't ask obvious things.
- ONLY use tools from the valid list above. No others exist.
- ONLY use model IDs from the valid list above.
- When ready, output JSON in <agent_config>...</agent_config> tags.
- For teams, output JSON array in <team_config>...</team_config> tags.

Single agent example:
<agent_config>
{{"name":"fullstack-agent","description":"Full-stack development agent","prompt":"You are a full-stack developer...","tools":["read","write","shell"],"model":"claude-sonnet-4"}}
</agent_config>

Team example:
<team_config>
[
  {{"name":"dev-orchestrator","description":"Team orchestrator","prompt":"You coordinate...","tools":["read","write","shell"],"model":"claude-sonnet-4","role":"orchestrator"}},
  {{"name":"backend-agent","description":"Backend specialist","prompt":"You are a backend...","tools":["read","write","shell"],"model":"claude-sonnet-4","role":"member"}}
]
</team_config>

Start by greeting the user and asking what kind of agent they want."#,
        tools = VALID_TOOLS.join(", "),
        models = VALID_MODELS.join(", "),
    )
}

struct BuilderSession {
    connection: Arc<AcpConnection>,
    session_id: String,
    turn_count: u32,
}

/// Owner of the builder conversation
pub struct Builder {
    connector: Arc<dyn SessionConnector>,
    cwd: String,
    session: Arc<Mutex<Option<BuilderSession>>>,
}

impl Builder {
    pub fn new(config: &DeckConfig, connector: Arc<dyn SessionConnector>) -> Self {
        Self {
            connector,
            cwd: config.workspace_dir.to_string_lossy().to_string(),
            session: Arc::new(Mutex::new(None)),
        }
    }

    pub async fn is_active(&self) -> bool {
        self.session.lock().await.is_some()
    }

    /// Send one user message and stream the reply's text chunks into `sink`.
    ///
    /// Returns once the agent's turn is over. A dropped receiver does not
    /// stop the turn.
    pub async fn stream_prompt(&self, message: &str, sink: mpsc::Sender<String>) -> Result<()> {
        let (connection, session_id, prompt) = {
            let mut slot = self.session.lock().await;
            let session = match slot.take() {
                Some(session) => session,
                None => self.open().await?,
            };
            let session = slot.insert(session);

            let prompt = if session.turn_count == 0 {
                format!("{}\n\n---\n\nUser's first message: {}", system_prompt(), message)
            } else {
                message.to_string()
            };
            session.turn_count += 1;
            (
                Arc::clone(&session.connection),
                session.session_id.clone(),
                prompt,
            )
        };

        let mut updates = connection.subscribe();
        let reply = connection.prompt(&session_id, &prompt);
        tokio::pin!(reply);

        let mut open = true;
        let result = loop {
            tokio::select! {
                biased;
                Some(decoded) = updates.recv() => {
                    if let SessionUpdate::Text { content } = decoded.update {
                        open = open && sink.send(content).await.is_ok();
                    }
                }
                result = &mut reply => break result,
            }
        };
        while let Some(decoded) = updates.try_recv() {
            if let SessionUpdate::Text { content } = decoded.update {
                open = open && sink.send(content).await.is_ok();
            }
        }
        if !open {
            debug!("Builder receiver dropped before the turn ended");
        }

        result.map(|_| ())
    }

    /// Tear the builder conversation down. The next message starts over.
    pub async fn reset(&self) {
        let session = self.session.lock().await.take();
        if let Some(session) = session {
            info!("Resetting builder session {}", session.session_id);
            session.connection.disconnect().await;
        }
    }

    async fn open(&self) -> Result<BuilderSession> {
        let connection = Arc::new(self.connector.connect().await?);
        let session_id = match connection.create_session(&self.cwd).await {
            Ok(id) => id,
            Err(e) => {
                connection.disconnect().await;
                return Err(e);
            }
        };
        info!("Started builder session {}", session_id);

        self.watch_exit(&connection);
        Ok(BuilderSession {
            connection,
            session_id,
            turn_count: 0,
        })
    }

    fn watch_exit(&self, connection: &Arc<AcpConnection>) {
        let mut exit = connection.exit_signal();
        let watched = Arc::downgrade(connection);
        let slot: Weak<Mutex<Option<BuilderSession>>> = Arc::downgrade(&self.session);

        tokio::spawn(async move {
            if exit.wait_for(|closed| *closed).await.is_err() {
                return;
            }
            let Some(slot) = slot.upgrade() else { return };
            let mut slot = slot.lock().await;
            let same = slot.as_ref().map_or(false, |session| {
                Weak::ptr_eq(&Arc::downgrade(&session.connection), &watched)
            });
            if same {
                *slot = None;
                info!("Builder agent process exited; session cleared");
            }
        });
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_system_prompt_lists_valid_choices() {
        let prompt = system_prompt();
        assert!(prompt.contains("read, write, shell, aws, @git, @fetch"));
        assert!(prompt.contains("claude-haiku-4.5"));
        assert!(prompt.contains(r#"{"name":"fullstack-agent""#));
    }
}
