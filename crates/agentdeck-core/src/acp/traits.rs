//! Trait seams of the ACP client
//!
//! `AgentClient` is what the host offers the agent: the connection calls it
//! for every inbound capability request and turns the outcome into a reply.

use crate::error::Result;
use crate::types::{DirEntry, TerminalExecuteResult};
use async_trait::async_trait;

// ============================================================================
// Capability surface
// ============================================================================

/// Host capabilities an agent may call back into
#[async_trait]
pub trait AgentClient: Send + Sync {
    async fn read_text_file(&self, path: &str) -> Result<String>;

    async fn write_text_file(&self, path: &str, content: &str) -> Result<()>;

    async fn list_directory(&self, path: &str) -> Result<Vec<DirEntry>>;

    /// Run a shell command. Command failure is reported in the result, not as `Err`.
    async fn execute_command(
        &self,
        command: &str,
        cwd: Option<&str>,
    ) -> Result<TerminalExecuteResult>;
}
