//! AgentDeck Core Library
//!
//! This crate provides the core functionality for AgentDeck, including:
//! - ACP (Agent Client Protocol) client over an agent process's stdio
//! - A bounded pool of agent sessions, one process each
//! - Coordinator delegation with streamed updates
//! - Workspace-confined file and terminal capabilities
//! - Agent config storage and SQLite chat history
//!
//! # Architecture
//!
//! ```text
//! ┌─────────────────────────────────────────────────────────────┐
//! │                     agentdeck-core                          │
//! ├─────────────────────────────────────────────────────────────┤
//! │  acp/          - Transport, RPC connection, session pool    │
//! │  orchestrator/ - Prompt turns and delegation                │
//! │  sandbox/      - Workspace root, files, terminal            │
//! │  agents/       - Agent config files and index               │
//! │  storage/      - SQLite database, queries                   │
//! │  builder.rs    - Agent builder conversation                 │
//! │  types/        - Shared type definitions                    │
//! │  error.rs      - Error types                                │
//! └─────────────────────────────────────────────────────────────┘
//! ```

pub mod acp;
pub mod agents;
pub mod builder;
pub mod config;
pub mod error;
pub mod orchestrator;
pub mod sandbox;
pub mod storage;
pub mod types;

// Re-export commonly used types
pub use config::DeckConfig;
pub use error::{Error, Result};
pub use types::*;

pub use acp::{
    AcpConnection, ActiveSession, AgentClient, ConnectOptions, PooledSession, ProcessConnector,
    SessionConnector, SessionPool, Transport, UpdateSubscription, WorkspaceClient,
};

pub use agents::{AgentConfig, AgentMeta, AgentRecord, AgentStore, AgentTemplate, CreateAgentRequest};
pub use builder::Builder;
pub use orchestrator::{ChatTranscript, NoopTranscript, Orchestrator};

pub use sandbox::{FileSystemHandler, TerminalHandler, TerminalLimits, WorkspaceRoot};

pub use storage::Storage;
