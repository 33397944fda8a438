//! File-backed agent config store
//!
//! Each agent lives in `<agents_dir>/<name>.json`; `.agent-index.json` maps
//! stable IDs to metadata. Index mutations are serialized through a fair
//! (FIFO) lock so concurrent writers never lose each other's updates.

use super::schema::{AgentConfig, AgentMeta, AgentRecord, CreateAgentRequest};
use crate::error::{AgentError, Error, Result, SandboxError};
use crate::sandbox::write_atomic;
use chrono::Utc;
use std::collections::BTreeMap;
use std::path::{Component, Path, PathBuf};
use tokio::fs;
use tokio::sync::Mutex;
use tracing::{info, warn};

const INDEX_FILE: &str = ".agent-index.json";

type AgentIndex = BTreeMap<String, AgentMeta>;

/// Agent configs stored under one directory
pub struct AgentStore {
    agents_dir: PathBuf,
    index_lock: Mutex<()>,
}

impl AgentStore {
    pub fn new(agents_dir: impl Into<PathBuf>) -> Self {
        Self {
            agents_dir: agents_dir.into(),
            index_lock: Mutex::new(()),
        }
    }

    pub fn agents_dir(&self) -> &Path {
        &self.agents_dir
    }

    /// All agents, most recently updated first
    pub async fn list_agents(&self) -> Result<Vec<AgentMeta>> {
        let mut agents: Vec<AgentMeta> = self.read_index().await?.into_values().collect();
        agents.sort_by(|a, b| b.updated_at.cmp(&a.updated_at));
        Ok(agents)
    }

    /// An agent and its config, or `None` if unknown or unreadable
    pub async fn get_agent(&self, id: &str) -> Result<Option<AgentRecord>> {
        let index = self.read_index().await?;
        self.load_record(&index, id).await
    }

    async fn load_record(&self, index: &AgentIndex, id: &str) -> Result<Option<AgentRecord>> {
        let Some(meta) = index.get(id).cloned() else {
            return Ok(None);
        };

        let path = self.safe_path(&meta.name)?;
        let raw = match fs::read_to_string(&path).await {
            Ok(raw) => raw,
            Err(e) => {
                warn!("Failed to read agent {}: {}", meta.name, e);
                return Ok(None);
            }
        };
        let parsed = serde_json::from_str(&raw)
            .map_err(Error::from)
            .and_then(AgentConfig::from_value);
        match parsed {
            Ok(config) => Ok(Some(AgentRecord { meta, config })),
            Err(e) => {
                warn!("Agent {} has an invalid config file: {}", meta.name, e);
                Ok(None)
            }
        }
    }

    pub async fn create_agent(&self, request: CreateAgentRequest) -> Result<AgentMeta> {
        request.validate()?;
        let config = request.config;
        let path = self.safe_path(&config.name)?;

        let _guard = self.index_lock.lock().await;
        if fs::try_exists(&path).await? {
            return Err(Error::Agent(AgentError::AlreadyExists(config.name)));
        }
        self.write_config(&path, &config).await?;

        let mut index = self.read_index().await?;
        let now = Utc::now();
        let meta = AgentMeta {
            id: uuid::Uuid::new_v4().to_string(),
            name: config.name.clone(),
            description: config.description.clone(),
            config_path: config_path(&config.name),
            parent_agent_id: request.parent_agent_id,
            created_at: now,
            updated_at: now,
        };
        index.insert(meta.id.clone(), meta.clone());
        self.write_index(&index).await?;

        info!("Created agent {} ({})", meta.name, meta.id);
        Ok(meta)
    }

    /// Merge `patch` into an agent's config. A rename moves the config file.
    pub async fn update_agent(
        &self,
        id: &str,
        patch: &serde_json::Map<String, serde_json::Value>,
    ) -> Result<Option<AgentMeta>> {
        // The read and merge happen under the same lock hold as the writes.
        let _guard = self.index_lock.lock().await;
        let mut index = self.read_index().await?;
        let Some(existing) = self.load_record(&index, id).await? else {
            return Ok(None);
        };
        let merged = existing.config.merged_with(patch)?;
        let path = self.safe_path(&merged.name)?;

        if merged.name != existing.meta.name {
            let taken = index
                .values()
                .any(|meta| meta.id != id && meta.name == merged.name);
            if taken {
                return Err(Error::Agent(AgentError::AlreadyExists(merged.name)));
            }
        }

        self.write_config(&path, &merged).await?;
        if merged.name != existing.meta.name {
            let old_path = self.safe_path(&existing.meta.name)?;
            if let Err(e) = fs::remove_file(&old_path).await {
                warn!("Failed to remove old config {:?}: {}", old_path, e);
            }
        }

        let Some(meta) = index.get_mut(id) else {
            return Ok(None);
        };
        meta.name = merged.name.clone();
        meta.description = merged.description.clone();
        meta.config_path = config_path(&merged.name);
        meta.updated_at = Utc::now();
        let meta = meta.clone();
        self.write_index(&index).await?;

        info!("Updated agent {} ({})", meta.name, meta.id);
        Ok(Some(meta))
    }

    /// Remove an agent and its config file. Returns false if unknown.
    pub async fn delete_agent(&self, id: &str) -> Result<bool> {
        let _guard = self.index_lock.lock().await;
        let mut index = self.read_index().await?;
        let Some(meta) = index.remove(id) else {
            return Ok(false);
        };

        let path = self.safe_path(&meta.name)?;
        if let Err(e) = fs::remove_file(&path).await {
            warn!("Failed to remove config {:?}: {}", path, e);
        }
        self.write_index(&index).await?;

        info!("Deleted agent {} ({})", meta.name, meta.id);
        Ok(true)
    }

    pub async fn get_child_agents(&self, parent_id: &str) -> Result<Vec<AgentMeta>> {
        let agents = self.list_agents().await?;
        Ok(agents
            .into_iter()
            .filter(|meta| meta.parent_agent_id.as_deref() == Some(parent_id))
            .collect())
    }

    /// Config file for `name`; the name must be a single path component.
    fn safe_path(&self, name: &str) -> Result<PathBuf> {
        let file_name = format!("{}.json", name);
        let mut components = Path::new(&file_name).components();
        match (components.next(), components.next()) {
            (Some(Component::Normal(_)), None) => Ok(self.agents_dir.join(file_name)),
            _ => Err(Error::Sandbox(SandboxError::PathTraversal(format!(
                "invalid agent name: {}",
                name
            )))),
        }
    }

    async fn read_index(&self) -> Result<AgentIndex> {
        let path = self.agents_dir.join(INDEX_FILE);
        let raw = match fs::read_to_string(&path).await {
            Ok(raw) => raw,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => return Ok(AgentIndex::new()),
            Err(e) => return Err(e.into()),
        };
        match serde_json::from_str(&raw) {
            Ok(index) => Ok(index),
            Err(e) => {
                warn!("Agent index {:?} is corrupt, treating as empty: {}", path, e);
                Ok(AgentIndex::new())
            }
        }
    }

    async fn write_index(&self, index: &AgentIndex) -> Result<()> {
        let bytes = serde_json::to_vec_pretty(index)?;
        write_atomic(&self.agents_dir.join(INDEX_FILE), bytes).await
    }

    async fn write_config(&self, path: &Path, config: &AgentConfig) -> Result<()> {
        let bytes = serde_json::to_vec_pretty(config)?;
        write_atomic(path, bytes).await
    }
}

fn config_path(name: &str) -> String {
    format!(".kiro/agents/{}.json", name)
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;
    use serde_json::json;
    use std::sync::Arc;
    use tempfile::tempdir;

    fn request(name: &str, parent: Option<&str>) -> CreateAgentRequest {
        let mut value = json!({
            "name": name,
            "description": format!("{} description", name),
            "prompt": "Do things."
        });
        if let Some(parent) = parent {
            value["parentAgentId"] = json!(parent);
        }
        serde_json::from_value(value).unwrap()
    }

    #[tokio::test]
    async fn test_create_get_and_collision() {
        let dir = tempdir().unwrap();
        let store = AgentStore::new(dir.path().join("agents"));

        let meta = store.create_agent(request("dev-orchestrator", None)).await.unwrap();
        assert_eq!(meta.config_path, ".kiro/agents/dev-orchestrator.json");
        assert!(dir.path().join("agents/dev-orchestrator.json").exists());

        let record = store.get_agent(&meta.id).await.unwrap().unwrap();
        assert_eq!(record.config.name, "dev-orchestrator");
        assert_eq!(record.config.tools, vec!["read", "write"]);

        let err = store
            .create_agent(request("dev-orchestrator", None))
            .await
            .unwrap_err();
        assert_eq!(err.to_string(), "Agent error: Agent \"dev-orchestrator\" already exists");
    }

    #[tokio::test]
    async fn test_update_renames_file() {
        let dir = tempdir().unwrap();
        let store = AgentStore::new(dir.path());
        let meta = store.create_agent(request("old-name", None)).await.unwrap();

        let patch = json!({"name": "new-name", "description": "Renamed"});
        let updated = store
            .update_agent(&meta.id, patch.as_object().unwrap())
            .await
            .unwrap()
            .unwrap();

        assert_eq!(updated.name, "new-name");
        assert_eq!(updated.description, "Renamed");
        assert!(updated.updated_at >= meta.updated_at);
        assert!(!dir.path().join("old-name.json").exists());
        assert!(dir.path().join("new-name.json").exists());

        let missing = store
            .update_agent("no-such-id", patch.as_object().unwrap())
            .await
            .unwrap();
        assert!(missing.is_none());
    }

    #[tokio::test]
    async fn test_delete_and_children() {
        let dir = tempdir().unwrap();
        let store = AgentStore::new(dir.path());
        let parent = store.create_agent(request("team-orchestrator", None)).await.unwrap();
        let child = store
            .create_agent(request("backend-agent", Some(&parent.id)))
            .await
            .unwrap();

        let children = store.get_child_agents(&parent.id).await.unwrap();
        assert_eq!(children, vec![child.clone()]);

        assert!(store.delete_agent(&child.id).await.unwrap());
        assert!(!store.delete_agent(&child.id).await.unwrap());
        assert!(!dir.path().join("backend-agent.json").exists());
        assert!(store.get_child_agents(&parent.id).await.unwrap().is_empty());
    }

    #[tokio::test]
    async fn test_concurrent_creates_all_land_in_index() {
        let dir = tempdir().unwrap();
        let store = Arc::new(AgentStore::new(dir.path()));

        let tasks: Vec<_> = (0..8)
            .map(|i| {
                let store = Arc::clone(&store);
                tokio::spawn(async move { store.create_agent(request(&format!("agent-{}", i), None)).await })
            })
            .collect();
        for task in tasks {
            task.await.unwrap().unwrap();
        }

        assert_eq!(store.list_agents().await.unwrap().len(), 8);
    }

    #[tokio::test(flavor = "multi_thread", worker_threads = 4)]
    async fn test_concurrent_updates_keep_both_patches() {
        let dir = tempdir().unwrap();
        let store = Arc::new(AgentStore::new(dir.path()));
        let meta = store.create_agent(request("busy-agent", None)).await.unwrap();

        for round in 0..20 {
            let description = json!({"description": format!("description {}", round)});
            let prompt = json!({"prompt": format!("prompt {}", round)});
            let (a, b) = tokio::join!(
                store.update_agent(&meta.id, description.as_object().unwrap()),
                store.update_agent(&meta.id, prompt.as_object().unwrap()),
            );
            a.unwrap().unwrap();
            b.unwrap().unwrap();

            let record = store.get_agent(&meta.id).await.unwrap().unwrap();
            assert_eq!(record.config.description, format!("description {}", round));
            assert_eq!(record.config.prompt, format!("prompt {}", round));
            assert_eq!(record.meta.description, format!("description {}", round));
        }
    }

    #[test]
    fn test_safe_path_rejects_separators() {
        let store = AgentStore::new("/tmp/agents");
        assert!(store.safe_path("ok-name").is_ok());
        assert!(store.safe_path("../escape").is_err());
        assert!(store.safe_path("a/b").is_err());
    }
}
