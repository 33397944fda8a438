//! Shared handler state

use agentdeck_core::acp::{ConnectOptions, ProcessConnector, SessionConnector, SessionPool};
use agentdeck_core::{AgentStore, Builder, DeckConfig, Orchestrator, Result, Storage};
use std::sync::Arc;
use tracing::info;

#[derive(Clone)]
pub struct AppState {
    pub config: Arc<DeckConfig>,
    pub pool: Arc<SessionPool>,
    pub orchestrator: Arc<Orchestrator>,
    pub storage: Arc<Storage>,
    pub agents: Arc<AgentStore>,
    pub builder: Arc<Builder>,
}

impl AppState {
    /// Open the database and spawn real agent processes on demand.
    pub fn new(config: DeckConfig) -> Result<Self> {
        let storage = Arc::new(Storage::open(config.db_path())?);
        let connector = Arc::new(ProcessConnector::new(ConnectOptions::from_config(&config)));
        Ok(Self::from_parts(config, storage, connector))
    }

    pub fn from_parts(
        config: DeckConfig,
        storage: Arc<Storage>,
        connector: Arc<dyn SessionConnector>,
    ) -> Self {
        let pool = SessionPool::with_connector(&config, Arc::clone(&connector));
        let orchestrator = Orchestrator::new(&config, storage.clone());
        let builder = Builder::new(&config, connector);
        let agents = AgentStore::new(config.agents_dir());

        Self {
            config: Arc::new(config),
            pool: Arc::new(pool),
            orchestrator: Arc::new(orchestrator),
            storage,
            agents: Arc::new(agents),
            builder: Arc::new(builder),
        }
    }

    /// Stop every agent process this server started.
    pub async fn shutdown(&self) {
        info!("Shutting down agent sessions");
        self.pool.destroy_all().await;
        self.builder.reset().await;
    }
}
