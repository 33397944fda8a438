//! Capability server
//!
//! `WorkspaceClient` answers agent requests against the sandbox handlers, and
//! [`dispatch`] turns any inbound request into exactly one JSON-RPC reply.

use super::traits::AgentClient;
use crate::error::{Error, Result, SandboxError};
use crate::sandbox::{FileSystemHandler, TerminalHandler, TerminalLimits, WorkspaceRoot};
use crate::types::{
    DirEntry, FsListDirectoryParams, FsReadTextFileParams, FsWriteTextFileParams, JsonRpcRequest,
    JsonRpcResponse, TerminalExecuteParams, TerminalExecuteResult,
};
use async_trait::async_trait;
use serde::de::DeserializeOwned;
use serde_json::json;
use tracing::{debug, warn};

/// Default implementation of AgentClient backed by the workspace sandbox
pub struct WorkspaceClient {
    workspace: WorkspaceRoot,
    limits: TerminalLimits,
}

impl WorkspaceClient {
    pub fn new(workspace: WorkspaceRoot, limits: TerminalLimits) -> Self {
        Self { workspace, limits }
    }

    pub fn workspace(&self) -> &WorkspaceRoot {
        &self.workspace
    }
}

#[async_trait]
impl AgentClient for WorkspaceClient {
    async fn read_text_file(&self, path: &str) -> Result<String> {
        FileSystemHandler::read_text_file(&self.workspace, path).await
    }

    async fn write_text_file(&self, path: &str, content: &str) -> Result<()> {
        FileSystemHandler::write_text_file(&self.workspace, path, content).await
    }

    async fn list_directory(&self, path: &str) -> Result<Vec<DirEntry>> {
        FileSystemHandler::list_directory(&self.workspace, path).await
    }

    async fn execute_command(
        &self,
        command: &str,
        cwd: Option<&str>,
    ) -> Result<TerminalExecuteResult> {
        let cwd = match cwd {
            Some(dir) if !dir.is_empty() => self.workspace.resolve(dir)?,
            _ => self.workspace.path().to_path_buf(),
        };
        Ok(TerminalHandler::execute(&self.limits, command, &cwd).await)
    }
}

/// Answer one inbound request. Always produces a reply carrying the request's ID.
///
/// Unknown methods get an empty success result so a peer probing for
/// optional capabilities is not left waiting.
pub async fn dispatch(client: &dyn AgentClient, request: &JsonRpcRequest) -> JsonRpcResponse {
    let id = request.id.clone().unwrap_or(serde_json::Value::Null);
    let params = request.params.clone().unwrap_or_else(|| json!({}));
    debug!("Agent request {}: {}", id, request.method);

    let outcome = match request.method.as_str() {
        "fs/readTextFile" | "fs/read_text_file" => read_text_file(client, params).await,
        "fs/writeTextFile" | "fs/write_text_file" => write_text_file(client, params).await,
        "fs/listDirectory" | "fs/list_directory" => list_directory(client, params).await,
        "terminal/execute" => execute(client, params).await,
        other => {
            debug!("Answering unsupported agent method {} with empty result", other);
            Ok(json!({}))
        }
    };

    match outcome {
        Ok(result) => JsonRpcResponse::success(id, result),
        Err(e) => {
            warn!("Agent request {} failed: {}", request.method, e);
            JsonRpcResponse::failure(id, e.rpc_code(), e.to_string())
        }
    }
}

fn parse<T: DeserializeOwned>(params: serde_json::Value) -> Result<T> {
    serde_json::from_value(params)
        .map_err(|e| Error::Sandbox(SandboxError::MissingParam(format!("invalid params: {}", e))))
}

fn required(value: Option<String>, name: &str) -> Result<String> {
    value
        .filter(|v| !v.is_empty())
        .ok_or_else(|| Error::Sandbox(SandboxError::MissingParam(name.to_string())))
}

async fn read_text_file(client: &dyn AgentClient, params: serde_json::Value) -> Result<serde_json::Value> {
    let p: FsReadTextFileParams = parse(params)?;
    let path = required(p.path, "path")?;
    let content = client.read_text_file(&path).await?;
    Ok(json!({ "content": content }))
}

async fn write_text_file(client: &dyn AgentClient, params: serde_json::Value) -> Result<serde_json::Value> {
    let p: FsWriteTextFileParams = parse(params)?;
    let path = required(p.path, "path")?;
    // Empty content is a legitimate write; only absence is an error.
    let content = p
        .content
        .ok_or_else(|| Error::Sandbox(SandboxError::MissingParam("content".into())))?;
    client.write_text_file(&path, &content).await?;
    Ok(json!({}))
}

async fn list_directory(client: &dyn AgentClient, params: serde_json::Value) -> Result<serde_json::Value> {
    let p: FsListDirectoryParams = parse(params)?;
    let path = required(p.path, "path")?;
    let entries = client.list_directory(&path).await?;
    Ok(json!({ "entries": entries }))
}

async fn execute(client: &dyn AgentClient, params: serde_json::Value) -> Result<serde_json::Value> {
    let p: TerminalExecuteParams = parse(params)?;
    let command = p
        .command_line()
        .ok_or_else(|| Error::Sandbox(SandboxError::MissingParam("command".into())))?
        .to_string();
    let result = client.execute_command(&command, p.cwd.as_deref()).await?;
    Ok(serde_json::to_value(result)?)
}
