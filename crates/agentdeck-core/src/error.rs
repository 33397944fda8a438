//! Error types for AgentDeck Core

use thiserror::Error;

/// Main error type for AgentDeck operations
#[derive(Error, Debug)]
pub enum Error {
    #[error("ACP protocol error: {0}")]
    Acp(#[from] AcpError),

    #[error("Agent error: {0}")]
    Agent(#[from] AgentError),

    #[error("Storage error: {0}")]
    Storage(#[from] StorageError),

    #[error("Sandbox error: {0}")]
    Sandbox(#[from] SandboxError),

    #[error("Delegation failed: {0}")]
    Delegation(String),

    #[error("Configuration error: {0}")]
    Config(String),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),

    #[error("Internal error: {0}")]
    Internal(String),
}

impl Error {
    /// True when the caller should recreate its session and try again.
    pub fn is_retryable(&self) -> bool {
        matches!(
            self,
            Error::Acp(AcpError::Disconnected)
                | Error::Acp(AcpError::NotConnected)
                | Error::Acp(AcpError::SessionNotFound(_))
        )
    }
}

/// ACP-specific errors
#[derive(Error, Debug)]
pub enum AcpError {
    #[error("Not connected to agent process")]
    NotConnected,

    #[error("Connection failed: {0}")]
    ConnectionFailed(String),

    #[error("Request {method} timed out after {secs}s")]
    Timeout { method: String, secs: u64 },

    #[error("Connection closed while request was pending")]
    Disconnected,

    #[error("Malformed frame: {0}")]
    ProtocolDecode(String),

    #[error("Agent returned error {code}: {message}")]
    Remote { code: i32, message: String },

    #[error("Invalid message: {0}")]
    InvalidMessage(String),

    #[error("Session not found: {0}")]
    SessionNotFound(String),
}

/// Agent configuration errors
#[derive(Error, Debug)]
pub enum AgentError {
    #[error("Agent not found: {0}")]
    NotFound(String),

    #[error("Agent \"{0}\" already exists")]
    AlreadyExists(String),

    #[error("Invalid agent configuration: {0}")]
    InvalidConfig(String),
}

/// Storage errors
#[derive(Error, Debug)]
pub enum StorageError {
    #[error("Database error: {0}")]
    Database(String),

    #[error("Record not found: {0}")]
    NotFound(String),

    #[error("Migration failed: {0}")]
    MigrationFailed(String),

    #[error("Connection pool error: {0}")]
    Pool(String),
}

/// Sandbox/filesystem errors
#[derive(Error, Debug)]
pub enum SandboxError {
    #[error("Path traversal blocked: {0}")]
    PathTraversal(String),

    #[error("Missing parameter: {0}")]
    MissingParam(String),

    #[error("File not found: {0}")]
    FileNotFound(String),

    #[error("Directory not found: {0}")]
    DirectoryNotFound(String),

    #[error("Invalid path: {0}")]
    InvalidPath(String),
}

/// JSON-RPC error codes used in replies to agent requests
pub mod rpc_code {
    pub const INVALID_REQUEST: i32 = -32600;
    pub const METHOD_NOT_FOUND: i32 = -32601;
    pub const INVALID_PARAMS: i32 = -32602;
    pub const INTERNAL_ERROR: i32 = -32603;
    pub const SERVER_ERROR: i32 = -32000;
}

impl Error {
    /// JSON-RPC code for replying to an inbound capability request that failed
    pub fn rpc_code(&self) -> i32 {
        match self {
            Error::Sandbox(SandboxError::PathTraversal(_)) => rpc_code::INVALID_REQUEST,
            Error::Sandbox(SandboxError::MissingParam(_)) => rpc_code::INVALID_PARAMS,
            Error::Json(_) => rpc_code::INVALID_PARAMS,
            Error::Sandbox(_) | Error::Io(_) => rpc_code::SERVER_ERROR,
            _ => rpc_code::INTERNAL_ERROR,
        }
    }
}

impl From<rusqlite::Error> for Error {
    fn from(err: rusqlite::Error) -> Self {
        Error::Storage(StorageError::Database(err.to_string()))
    }
}

impl From<r2d2::Error> for Error {
    fn from(err: r2d2::Error) -> Self {
        Error::Storage(StorageError::Pool(err.to_string()))
    }
}

impl serde::Serialize for Error {
    fn serialize<S>(&self, serializer: S) -> std::result::Result<S::Ok, S::Error>
    where
        S: serde::Serializer,
    {
        serializer.serialize_str(&self.to_string())
    }
}

/// Result type alias using our Error type
pub type Result<T> = std::result::Result<T, Error>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_rpc_codes() {
        let traversal = Error::Sandbox(SandboxError::PathTraversal("../x".into()));
        assert_eq!(traversal.rpc_code(), -32600);

        let missing = Error::Sandbox(SandboxError::MissingParam("path".into()));
        assert_eq!(missing.rpc_code(), -32602);

        let io = Error::Io(std::io::Error::new(std::io::ErrorKind::NotFound, "gone"));
        assert_eq!(io.rpc_code(), -32000);

        assert_eq!(Error::Internal("x".into()).rpc_code(), -32603);
    }

    #[test]
    fn test_retryable() {
        assert!(Error::Acp(AcpError::Disconnected).is_retryable());
        assert!(Error::Acp(AcpError::SessionNotFound("s".into())).is_retryable());
        assert!(!Error::Acp(AcpError::Timeout {
            method: "session/prompt".into(),
            secs: 1
        })
        .is_retryable());
    }

    #[test]
    fn test_error_serializes_as_string() {
        let err = Error::Acp(AcpError::Remote {
            code: -32000,
            message: "boom".into(),
        });
        let json = serde_json::to_string(&err).unwrap();
        assert_eq!(json, "\"ACP protocol error: Agent returned error -32000: boom\"");
    }
}
