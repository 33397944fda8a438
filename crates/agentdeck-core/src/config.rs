//! Runtime configuration
//!
//! Loaded from an optional TOML file, then overridden by the environment
//! variables the agent runtime already understands (`KIRO_CLI_PATH`,
//! `KIRO_WORKSPACE_DIR`, `MAX_ACP_SESSIONS`).

use crate::error::{Error, Result};
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use std::time::Duration;
use tracing::warn;

/// Top-level configuration shared by the core and the server
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(default, rename_all = "snake_case")]
pub struct DeckConfig {
    /// Root the agent process runs in and capability requests are confined to
    pub workspace_dir: PathBuf,
    /// Executable speaking ACP on stdio
    pub agent_command: String,
    pub agent_args: Vec<String>,
    /// Agent persona a fresh session starts with; no mode switch is sent for it
    pub default_agent: String,
    pub max_sessions: usize,
    pub request_timeout_secs: u64,
    pub terminal_timeout_secs: u64,
    pub terminal_max_output_bytes: usize,
    /// Sessions whose agent name contains this string run delegation detection
    pub coordinator_marker: String,
    /// Held-back text past a delegation marker is released once it grows beyond this
    pub max_held_bytes: usize,
    pub cancel_on_disconnect: bool,
    /// Defaults to `<workspace>/.kiro/chat-history.db`
    pub database_path: Option<PathBuf>,
    pub listen_addr: String,
}

impl Default for DeckConfig {
    fn default() -> Self {
        Self {
            workspace_dir: std::env::current_dir().unwrap_or_else(|_| PathBuf::from(".")),
            agent_command: "kiro-cli".to_string(),
            agent_args: vec!["acp".to_string()],
            default_agent: "kiro_default".to_string(),
            max_sessions: 10,
            request_timeout_secs: 120,
            terminal_timeout_secs: 60,
            terminal_max_output_bytes: 5 * 1024 * 1024,
            coordinator_marker: "orchestrator".to_string(),
            max_held_bytes: 16 * 1024,
            cancel_on_disconnect: false,
            database_path: None,
            listen_addr: "127.0.0.1:3000".to_string(),
        }
    }
}

impl DeckConfig {
    /// Load configuration from a TOML file and apply environment overrides.
    pub fn load_from_path(path: impl AsRef<Path>) -> Result<Self> {
        let path = path.as_ref();
        let raw = std::fs::read_to_string(path).map_err(|e| {
            Error::Config(format!("failed to read {}: {}", path.display(), e))
        })?;
        let mut config = Self::from_toml_str(&raw)?;
        config.apply_env_overrides();
        config.validate()?;
        Ok(config)
    }

    /// Defaults plus environment overrides, for running without a config file.
    pub fn from_env() -> Result<Self> {
        let mut config = Self::default();
        config.apply_env_overrides();
        config.validate()?;
        Ok(config)
    }

    /// Parse configuration from a TOML string without touching the environment.
    pub fn from_toml_str(raw: &str) -> Result<Self> {
        let config: Self =
            toml::from_str(raw).map_err(|e| Error::Config(format!("invalid config: {}", e)))?;
        config.validate()?;
        Ok(config)
    }

    fn apply_env_overrides(&mut self) {
        if let Ok(cmd) = std::env::var("KIRO_CLI_PATH") {
            if !cmd.is_empty() {
                self.agent_command = cmd;
            }
        }
        if let Ok(dir) = std::env::var("KIRO_WORKSPACE_DIR") {
            if !dir.is_empty() {
                self.workspace_dir = PathBuf::from(dir);
            }
        }
        if let Ok(raw) = std::env::var("MAX_ACP_SESSIONS") {
            match raw.parse::<usize>() {
                Ok(n) => self.max_sessions = n,
                Err(_) => warn!("Ignoring invalid MAX_ACP_SESSIONS value: {}", raw),
            }
        }
    }

    fn validate(&self) -> Result<()> {
        if self.max_sessions == 0 {
            return Err(Error::Config("max_sessions must be at least 1".into()));
        }
        if self.request_timeout_secs == 0 || self.terminal_timeout_secs == 0 {
            return Err(Error::Config("timeouts must be greater than zero".into()));
        }
        if self.agent_command.trim().is_empty() {
            return Err(Error::Config("agent_command must not be empty".into()));
        }
        Ok(())
    }

    pub fn request_timeout(&self) -> Duration {
        Duration::from_secs(self.request_timeout_secs)
    }

    pub fn terminal_timeout(&self) -> Duration {
        Duration::from_secs(self.terminal_timeout_secs)
    }

    pub fn db_path(&self) -> PathBuf {
        self.database_path
            .clone()
            .unwrap_or_else(|| self.workspace_dir.join(".kiro").join("chat-history.db"))
    }

    pub fn agents_dir(&self) -> PathBuf {
        self.workspace_dir.join(".kiro").join("agents")
    }

    /// Whether sessions for `agent_name` should run delegation detection.
    pub fn is_coordinator(&self, agent_name: &str) -> bool {
        agent_name.contains(&self.coordinator_marker)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_defaults() {
        let config = DeckConfig::default();
        assert_eq!(config.agent_command, "kiro-cli");
        assert_eq!(config.agent_args, vec!["acp".to_string()]);
        assert_eq!(config.max_sessions, 10);
        assert_eq!(config.request_timeout(), Duration::from_secs(120));
        assert_eq!(config.terminal_max_output_bytes, 5 * 1024 * 1024);
    }

    #[test]
    fn test_from_toml_partial() {
        let config = DeckConfig::from_toml_str(
            r#"
            workspace_dir = "/tmp/ws"
            max_sessions = 3
            coordinator_marker = "lead"
            "#,
        )
        .unwrap();

        assert_eq!(config.workspace_dir, PathBuf::from("/tmp/ws"));
        assert_eq!(config.max_sessions, 3);
        assert!(config.is_coordinator("team-lead"));
        assert!(!config.is_coordinator("backend-agent"));
        assert_eq!(config.db_path(), PathBuf::from("/tmp/ws/.kiro/chat-history.db"));
        assert_eq!(config.agents_dir(), PathBuf::from("/tmp/ws/.kiro/agents"));
    }

    #[test]
    fn test_rejects_zero_capacity() {
        let result = DeckConfig::from_toml_str("max_sessions = 0");
        assert!(matches!(result, Err(Error::Config(_))));
    }

    #[test]
    fn test_rejects_unparseable() {
        let result = DeckConfig::from_toml_str("max_sessions = \"many\"");
        assert!(matches!(result, Err(Error::Config(_))));
    }
}
