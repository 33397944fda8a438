//! Session pool for ACP
//!
//! Every chat gets its own agent process. The pool keeps at most `capacity`
//! of them alive, evicting the least recently used one to make room, and
//! drops an entry as soon as its process goes away.

use super::connection::{AcpConnection, ConnectOptions};
use crate::config::DeckConfig;
use crate::error::Result;
use async_trait::async_trait;
use chrono::{DateTime, Utc};
use serde::Serialize;
use std::collections::HashMap;
use std::sync::{Arc, Weak};
use tokio::sync::Mutex;
use tracing::{debug, info, warn};

/// Opens initialized connections to an agent runtime
#[async_trait]
pub trait SessionConnector: Send + Sync {
    async fn connect(&self) -> Result<AcpConnection>;
}

/// Spawns one agent process per connection
pub struct ProcessConnector {
    options: ConnectOptions,
}

impl ProcessConnector {
    pub fn new(options: ConnectOptions) -> Self {
        Self { options }
    }
}

#[async_trait]
impl SessionConnector for ProcessConnector {
    async fn connect(&self) -> Result<AcpConnection> {
        AcpConnection::connect(&self.options).await
    }
}

/// A live session handed out by the pool
#[derive(Clone)]
pub struct PooledSession {
    pub session_id: String,
    pub agent_name: String,
    pub created_at: DateTime<Utc>,
    pub connection: Arc<AcpConnection>,
}

/// Summary row for `list_active`
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ActiveSession {
    pub session_id: String,
    pub agent_name: String,
    pub created_at: DateTime<Utc>,
}

struct PoolEntry {
    session: PooledSession,
    last_activity: DateTime<Utc>,
    /// Logical clock reading of the last touch; unique per pool
    recency: u64,
}

#[derive(Default)]
struct PoolInner {
    sessions: HashMap<String, PoolEntry>,
    clock: u64,
}

impl PoolInner {
    fn tick(&mut self) -> u64 {
        self.clock += 1;
        self.clock
    }

    fn least_recent(&self) -> Option<String> {
        self.sessions
            .iter()
            .min_by_key(|(_, entry)| entry.recency)
            .map(|(id, _)| id.clone())
    }

    /// Remove least recently used entries until one more fits.
    fn evict_to_fit(&mut self, capacity: usize) -> Vec<PooledSession> {
        let mut evicted = Vec::new();
        while self.sessions.len() >= capacity {
            let Some(oldest) = self.least_recent() else { break };
            if let Some(entry) = self.sessions.remove(&oldest) {
                evicted.push(entry.session);
            }
        }
        evicted
    }
}

async fn disconnect_all(evicted: Vec<PooledSession>) {
    for old in evicted {
        info!("Evicting least recently used session {} ({})", old.session_id, old.agent_name);
        old.connection.disconnect().await;
    }
}

/// Bounded pool of agent sessions
pub struct SessionPool {
    connector: Arc<dyn SessionConnector>,
    cwd: String,
    default_agent: String,
    capacity: usize,
    inner: Arc<Mutex<PoolInner>>,
}

impl SessionPool {
    pub fn new(config: &DeckConfig) -> Self {
        let connector = Arc::new(ProcessConnector::new(ConnectOptions::from_config(config)));
        Self::with_connector(config, connector)
    }

    pub fn with_connector(config: &DeckConfig, connector: Arc<dyn SessionConnector>) -> Self {
        Self {
            connector,
            cwd: config.workspace_dir.to_string_lossy().to_string(),
            default_agent: config.default_agent.clone(),
            capacity: config.max_sessions.max(1),
            inner: Arc::new(Mutex::new(PoolInner::default())),
        }
    }

    pub fn capacity(&self) -> usize {
        self.capacity
    }

    /// Start a process, open a session on it and switch to `agent_name`.
    ///
    /// When the pool is full the least recently used session is torn down
    /// before the new process is started, so at most `capacity` agents run.
    pub async fn create_session(&self, agent_name: &str) -> Result<PooledSession> {
        let evicted = self.inner.lock().await.evict_to_fit(self.capacity);
        disconnect_all(evicted).await;

        let connection = Arc::new(self.connector.connect().await?);
        let session_id = match self.open(&connection, agent_name).await {
            Ok(id) => id,
            Err(e) => {
                connection.disconnect().await;
                return Err(e);
            }
        };

        let now = Utc::now();
        let session = PooledSession {
            session_id: session_id.clone(),
            agent_name: agent_name.to_string(),
            created_at: now,
            connection: Arc::clone(&connection),
        };

        {
            let mut inner = self.inner.lock().await;
            // Concurrent creates may have refilled the pool while we connected.
            let evicted = inner.evict_to_fit(self.capacity);
            disconnect_all(evicted).await;
            let recency = inner.tick();
            inner.sessions.insert(
                session_id.clone(),
                PoolEntry {
                    session: session.clone(),
                    last_activity: now,
                    recency,
                },
            );
        }

        self.watch_exit(&session);
        info!("Created session {} for agent {}", session_id, agent_name);
        Ok(session)
    }

    async fn open(&self, connection: &AcpConnection, agent_name: &str) -> Result<String> {
        let session_id = connection.create_session(&self.cwd).await?;
        if agent_name != self.default_agent {
            connection.switch_agent(&session_id, agent_name).await?;
        }
        Ok(session_id)
    }

    /// Purge the entry once its process is gone.
    fn watch_exit(&self, session: &PooledSession) {
        let mut exit = session.connection.exit_signal();
        let session_id = session.session_id.clone();
        let connection = Arc::downgrade(&session.connection);
        let inner: Weak<Mutex<PoolInner>> = Arc::downgrade(&self.inner);

        tokio::spawn(async move {
            if exit.wait_for(|closed| *closed).await.is_err() {
                // Connection dropped; whoever dropped it already removed the entry.
                return;
            }
            let Some(inner) = inner.upgrade() else { return };
            let mut inner = inner.lock().await;
            let same = inner
                .sessions
                .get(&session_id)
                .map_or(false, |entry| {
                    Weak::ptr_eq(&Arc::downgrade(&entry.session.connection), &connection)
                });
            if same {
                inner.sessions.remove(&session_id);
                warn!("Agent process for session {} exited; removed from pool", session_id);
            }
        });
    }

    /// Look up a session and mark it as just used.
    pub async fn get_session(&self, session_id: &str) -> Option<PooledSession> {
        let mut inner = self.inner.lock().await;
        let recency = inner.tick();
        let entry = inner.sessions.get_mut(session_id)?;
        entry.recency = recency;
        entry.last_activity = Utc::now();
        Some(entry.session.clone())
    }

    /// Tear down one session. Returns false if it was not pooled.
    pub async fn destroy_session(&self, session_id: &str) -> bool {
        let removed = self.inner.lock().await.sessions.remove(session_id);
        match removed {
            Some(entry) => {
                debug!("Destroying session {}", session_id);
                entry.session.connection.disconnect().await;
                true
            }
            None => false,
        }
    }

    pub async fn list_active(&self) -> Vec<ActiveSession> {
        let inner = self.inner.lock().await;
        let mut active: Vec<(u64, ActiveSession)> = inner
            .sessions
            .values()
            .map(|entry| {
                (
                    entry.recency,
                    ActiveSession {
                        session_id: entry.session.session_id.clone(),
                        agent_name: entry.session.agent_name.clone(),
                        created_at: entry.session.created_at,
                    },
                )
            })
            .collect();
        active.sort_by_key(|(recency, _)| std::cmp::Reverse(*recency));
        active.into_iter().map(|(_, session)| session).collect()
    }

    /// Wall-clock time of the last touch, for display
    pub async fn last_activity(&self, session_id: &str) -> Option<DateTime<Utc>> {
        let inner = self.inner.lock().await;
        inner.sessions.get(session_id).map(|entry| entry.last_activity)
    }

    pub async fn destroy_all(&self) {
        let drained: Vec<PoolEntry> = {
            let mut inner = self.inner.lock().await;
            inner.sessions.drain().map(|(_, entry)| entry).collect()
        };
        if !drained.is_empty() {
            info!("Destroying {} pooled sessions", drained.len());
        }
        for entry in drained {
            entry.session.connection.disconnect().await;
        }
    }

    pub async fn len(&self) -> usize {
        self.inner.lock().await.sessions.len()
    }

    pub async fn is_empty(&self) -> bool {
        self.len().await == 0
    }
}
