//! Agent config file format (`.kiro/agents/<name>.json`)

use crate::error::{AgentError, Error, Result};
use crate::types::McpServerConfig;
use chrono::{DateTime, Utc};
use once_cell::sync::Lazy;
use regex::Regex;
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;

static NAME_RE: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"^[a-z0-9-]+$").expect("agent name pattern is valid"));

const MAX_NAME_LEN: usize = 64;
const MAX_DESCRIPTION_LEN: usize = 500;

fn default_tools() -> Vec<String> {
    vec!["read".to_string(), "write".to_string()]
}

fn default_model() -> String {
    "claude-sonnet-4".to_string()
}

/// One agent persona as the agent runtime reads it
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct AgentConfig {
    pub name: String,
    pub description: String,
    pub prompt: String,
    #[serde(default = "default_tools")]
    pub tools: Vec<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub allowed_tools: Option<Vec<String>>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub mcp_servers: Option<BTreeMap<String, McpServerConfig>>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub tool_aliases: Option<BTreeMap<String, String>>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub tools_settings: Option<BTreeMap<String, serde_json::Value>>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub resources: Option<Vec<serde_json::Value>>,
    #[serde(default = "default_model")]
    pub model: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub keyboard_shortcut: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub welcome_message: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub hooks: Option<serde_json::Value>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub include_mcp_json: Option<bool>,
}

impl AgentConfig {
    /// A config with default tools and model and every optional field unset
    pub fn new(
        name: impl Into<String>,
        description: impl Into<String>,
        prompt: impl Into<String>,
    ) -> Self {
        Self {
            name: name.into(),
            description: description.into(),
            prompt: prompt.into(),
            tools: default_tools(),
            allowed_tools: None,
            mcp_servers: None,
            tool_aliases: None,
            tools_settings: None,
            resources: None,
            model: default_model(),
            keyboard_shortcut: None,
            welcome_message: None,
            hooks: None,
            include_mcp_json: None,
        }
    }

    /// Check field constraints that serde cannot express
    pub fn validate(&self) -> Result<()> {
        let name_len = self.name.chars().count();
        if name_len == 0 || name_len > MAX_NAME_LEN {
            return Err(invalid(format!("name must be 1-{} characters", MAX_NAME_LEN)));
        }
        if !NAME_RE.is_match(&self.name) {
            return Err(invalid(
                "name may only contain lowercase letters, digits and hyphens",
            ));
        }

        let description_len = self.description.chars().count();
        if description_len == 0 || description_len > MAX_DESCRIPTION_LEN {
            return Err(invalid(format!(
                "description must be 1-{} characters",
                MAX_DESCRIPTION_LEN
            )));
        }

        if self.prompt.is_empty() {
            return Err(invalid("prompt must not be empty"));
        }

        Ok(())
    }

    /// Parse and validate a config from JSON
    pub fn from_value(value: serde_json::Value) -> Result<Self> {
        let config: Self =
            serde_json::from_value(value).map_err(|e| invalid(e.to_string()))?;
        config.validate()?;
        Ok(config)
    }

    /// Overlay the fields present in `patch` and validate the result
    pub fn merged_with(&self, patch: &serde_json::Map<String, serde_json::Value>) -> Result<Self> {
        let mut value = serde_json::to_value(self)?;
        if let Some(fields) = value.as_object_mut() {
            for (key, field) in patch {
                fields.insert(key.clone(), field.clone());
            }
        }
        Self::from_value(value)
    }
}

fn invalid(message: impl Into<String>) -> Error {
    Error::Agent(AgentError::InvalidConfig(message.into()))
}

/// Body of an agent create request
#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CreateAgentRequest {
    #[serde(flatten)]
    pub config: AgentConfig,
    #[serde(default)]
    pub parent_agent_id: Option<String>,
}

impl CreateAgentRequest {
    pub fn validate(&self) -> Result<()> {
        self.config.validate()?;
        if let Some(parent) = &self.parent_agent_id {
            uuid::Uuid::parse_str(parent)
                .map_err(|_| invalid("parentAgentId must be a UUID"))?;
        }
        Ok(())
    }
}

/// Index entry for one agent
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct AgentMeta {
    pub id: String,
    pub name: String,
    pub description: String,
    /// Workspace-relative path of the config file
    pub config_path: String,
    #[serde(default)]
    pub parent_agent_id: Option<String>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

/// An agent's index entry together with its config
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct AgentRecord {
    pub meta: AgentMeta,
    pub config: AgentConfig,
}
