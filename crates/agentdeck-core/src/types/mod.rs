//! Core type definitions for AgentDeck
//!
//! Wire-level ACP envelopes live in `acp_types`; everything else here is what
//! the rest of the crate (and the HTTP layer) consumes.

mod acp_types;

pub use acp_types::*;

use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;

/// Content block sent inside a prompt
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum ContentBlock {
    Text { text: String },
}

impl ContentBlock {
    pub fn text(text: impl Into<String>) -> Self {
        Self::Text { text: text.into() }
    }
}

/// Boundary marker for a delegated sub-agent turn
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum DelegationStatus {
    Start,
    End,
}

/// Decoded session update, the only shape the rest of the system sees.
///
/// Serialized form is what the SSE endpoint streams: `{"type":"text","content":"..."}`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum SessionUpdate {
    Text {
        content: String,
    },
    ToolCall {
        name: String,
        status: String,
        #[serde(skip_serializing_if = "Option::is_none")]
        args: Option<serde_json::Value>,
    },
    ToolCallUpdate {
        name: String,
        content: String,
    },
    TurnEnd {
        #[serde(rename = "stopReason", skip_serializing_if = "Option::is_none")]
        stop_reason: Option<String>,
    },
    Error {
        message: String,
    },
    Delegation {
        agent: String,
        task: String,
        status: DelegationStatus,
    },
}

impl SessionUpdate {
    pub fn text(content: impl Into<String>) -> Self {
        Self::Text {
            content: content.into(),
        }
    }

    pub fn error(message: impl Into<String>) -> Self {
        Self::Error {
            message: message.into(),
        }
    }

    pub fn turn_end(stop_reason: Option<String>) -> Self {
        Self::TurnEnd { stop_reason }
    }

    pub fn is_turn_end(&self) -> bool {
        matches!(self, Self::TurnEnd { .. })
    }
}

/// Directory entry returned to the agent
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct DirEntry {
    pub name: String,
    pub is_directory: bool,
}

/// Reply to `terminal/execute`; a failing command is still a normal result
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct TerminalExecuteResult {
    pub exit_code: i32,
    pub stdout: String,
    pub stderr: String,
}

/// Author of a transcript message
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum MessageRole {
    User,
    Assistant,
    /// A task handed from a coordinator to a sub-agent
    Delegation,
}

impl MessageRole {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::User => "user",
            Self::Assistant => "assistant",
            Self::Delegation => "delegation",
        }
    }

    pub fn parse(s: &str) -> Option<Self> {
        match s {
            "user" => Some(Self::User),
            "assistant" => Some(Self::Assistant),
            "delegation" => Some(Self::Delegation),
            _ => None,
        }
    }
}

/// A message about to be appended to a chat transcript
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct NewMessage {
    pub role: MessageRole,
    pub content: String,
    pub agent_name: Option<String>,
}

impl NewMessage {
    pub fn user(content: impl Into<String>) -> Self {
        Self {
            role: MessageRole::User,
            content: content.into(),
            agent_name: None,
        }
    }

    pub fn assistant(content: impl Into<String>, agent_name: impl Into<String>) -> Self {
        Self {
            role: MessageRole::Assistant,
            content: content.into(),
            agent_name: Some(agent_name.into()),
        }
    }

    pub fn delegation(task: impl Into<String>, agent_name: impl Into<String>) -> Self {
        Self {
            role: MessageRole::Delegation,
            content: task.into(),
            agent_name: Some(agent_name.into()),
        }
    }
}

/// MCP server entry in an agent config.
///
/// Only the stdio shape is understood; anything else round-trips untouched.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum McpServerConfig {
    Stdio(McpStdioServer),
    Opaque(serde_json::Value),
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct McpStdioServer {
    pub command: String,
    #[serde(default)]
    pub args: Vec<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub env: Option<BTreeMap<String, String>>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub timeout: Option<u64>,
}
