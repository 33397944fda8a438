//! ACP Protocol message handling

use crate::error::{AcpError, Error, Result};
use crate::types::{
    ClientCapabilities, ClientInfo, ContentBlock, InitializeParams, InitializeResult,
    JsonRpcRequest, JsonRpcResponse, PromptResponse, SessionCancelParams, SessionNewParams,
    SessionNewResult, SessionPromptParams, SessionSetModeParams, ACP_PROTOCOL_VERSION,
};
use serde::de::DeserializeOwned;
use serde::Serialize;
use std::sync::atomic::{AtomicU64, Ordering};
use tracing::debug;

pub const METHOD_INITIALIZE: &str = "initialize";
pub const METHOD_SESSION_NEW: &str = "session/new";
pub const METHOD_SESSION_PROMPT: &str = "session/prompt";
pub const METHOD_SESSION_SET_MODE: &str = "session/set_mode";
pub const METHOD_SESSION_CANCEL: &str = "session/cancel";
pub const METHOD_SESSION_UPDATE: &str = "session/update";

/// Protocol handler for ACP messages.
///
/// Owns the per-connection request ID counter: IDs start at 1 and only grow.
pub struct ProtocolHandler {
    request_id: AtomicU64,
}

impl ProtocolHandler {
    pub fn new() -> Self {
        Self {
            request_id: AtomicU64::new(1),
        }
    }

    /// Generate next request ID
    pub fn next_id(&self) -> u64 {
        self.request_id.fetch_add(1, Ordering::SeqCst)
    }

    fn request<P: Serialize>(&self, method: &str, params: P) -> Result<JsonRpcRequest> {
        Ok(JsonRpcRequest::new(
            self.next_id(),
            method,
            Some(serde_json::to_value(params)?),
        ))
    }

    /// Create initialize request
    pub fn create_initialize_request(
        &self,
        capabilities: ClientCapabilities,
    ) -> Result<JsonRpcRequest> {
        self.request(
            METHOD_INITIALIZE,
            InitializeParams {
                protocol_version: ACP_PROTOCOL_VERSION,
                client_capabilities: capabilities,
                client_info: ClientInfo::default(),
            },
        )
    }

    /// Create session/new request
    pub fn create_session_new_request(&self, cwd: &str) -> Result<JsonRpcRequest> {
        self.request(
            METHOD_SESSION_NEW,
            SessionNewParams {
                cwd: cwd.to_string(),
                mcp_servers: Vec::new(),
            },
        )
    }

    /// Create session/prompt request carrying a single text block
    pub fn create_session_prompt_request(
        &self,
        session_id: &str,
        text: &str,
    ) -> Result<JsonRpcRequest> {
        self.request(
            METHOD_SESSION_PROMPT,
            SessionPromptParams {
                session_id: session_id.to_string(),
                prompt: vec![ContentBlock::text(text)],
            },
        )
    }

    /// Create session/set_mode request (switches the agent persona)
    pub fn create_set_mode_request(&self, session_id: &str, mode_id: &str) -> Result<JsonRpcRequest> {
        self.request(
            METHOD_SESSION_SET_MODE,
            SessionSetModeParams {
                session_id: session_id.to_string(),
                mode_id: mode_id.to_string(),
            },
        )
    }

    /// Create session/cancel request
    pub fn create_cancel_request(&self, session_id: &str) -> Result<JsonRpcRequest> {
        self.request(
            METHOD_SESSION_CANCEL,
            SessionCancelParams {
                session_id: session_id.to_string(),
            },
        )
    }

    pub fn parse_initialize_response(&self, response: JsonRpcResponse) -> Result<InitializeResult> {
        let result: InitializeResult = parse_result(response)?;
        debug!(
            "Agent initialized (protocol version {:?})",
            result.protocol_version
        );
        Ok(result)
    }

    pub fn parse_session_new_response(&self, response: JsonRpcResponse) -> Result<SessionNewResult> {
        let result: SessionNewResult = parse_result(response)?;
        debug!("Session created: {}", result.session_id);
        Ok(result)
    }

    pub fn parse_prompt_response(&self, response: JsonRpcResponse) -> Result<PromptResponse> {
        parse_result(response)
    }

    /// Classify an inbound message.
    ///
    /// `method` + `id` is a request from the agent, `method` alone a
    /// notification, and `id` alone a response to one of ours.
    pub fn parse_message(&self, value: serde_json::Value) -> Result<AcpMessage> {
        let has_method = value.get("method").map_or(false, |m| m.is_string());
        let has_id = value.get("id").map_or(false, |id| !id.is_null());

        if has_method && has_id {
            let request: JsonRpcRequest = serde_json::from_value(value)?;
            return Ok(AcpMessage::AgentRequest(request));
        }

        if has_method {
            let method = value["method"].as_str().unwrap_or_default().to_string();
            let params = value
                .get("params")
                .cloned()
                .unwrap_or(serde_json::Value::Null);
            return Ok(AcpMessage::Notification { method, params });
        }

        if has_id {
            let response: JsonRpcResponse = serde_json::from_value(value)?;
            return Ok(AcpMessage::Response(response));
        }

        Err(Error::Acp(AcpError::InvalidMessage(format!(
            "Unknown message type: {}",
            value
        ))))
    }
}

impl Default for ProtocolHandler {
    fn default() -> Self {
        Self::new()
    }
}

/// Turn a response into its typed result, or the agent's error.
///
/// A missing or null `result` is read as `{}`; several agents answer
/// `session/set_mode` and `session/cancel` that way.
pub fn parse_result<T: DeserializeOwned>(response: JsonRpcResponse) -> Result<T> {
    if let Some(error) = response.error {
        return Err(Error::Acp(AcpError::Remote {
            code: error.code,
            message: error.message,
        }));
    }

    let result = match response.result {
        Some(serde_json::Value::Null) | None => serde_json::json!({}),
        Some(value) => value,
    };
    serde_json::from_value(result).map_err(|e| {
        Error::Acp(AcpError::InvalidMessage(format!("Unexpected result shape: {}", e)))
    })
}

/// Parsed ACP message types
#[derive(Debug, Clone)]
pub enum AcpMessage {
    /// Response to our request
    Response(JsonRpcResponse),
    /// Notification (no reply expected)
    Notification {
        method: String,
        params: serde_json::Value,
    },
    /// Request from agent (fs/*, terminal/*)
    AgentRequest(JsonRpcRequest),
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_protocol_handler_request_ids() {
        let handler = ProtocolHandler::new();
        assert_eq!(handler.next_id(), 1);
        assert_eq!(handler.next_id(), 2);
        assert_eq!(handler.next_id(), 3);
    }

    #[test]
    fn test_create_initialize_request() {
        let handler = ProtocolHandler::new();
        let request = handler
            .create_initialize_request(ClientCapabilities::default())
            .unwrap();

        assert_eq!(request.method, "initialize");
        assert_eq!(request.id, Some(json!(1)));
        let params = request.params.unwrap();
        assert_eq!(params["protocolVersion"], ACP_PROTOCOL_VERSION);
        assert_eq!(params["clientCapabilities"]["terminal"], true);
    }

    #[test]
    fn test_create_session_requests() {
        let handler = ProtocolHandler::new();

        let new = handler.create_session_new_request("/home/user").unwrap();
        assert_eq!(new.method, "session/new");
        let params = new.params.unwrap();
        assert_eq!(params["cwd"], "/home/user");
        assert_eq!(params["mcpServers"], json!([]));

        let prompt = handler.create_session_prompt_request("s1", "hello").unwrap();
        assert_eq!(
            prompt.params.unwrap(),
            json!({"sessionId": "s1", "prompt": [{"type": "text", "text": "hello"}]})
        );

        let mode = handler.create_set_mode_request("s1", "backend-agent").unwrap();
        assert_eq!(mode.method, "session/set_mode");
        assert_eq!(
            mode.params.unwrap(),
            json!({"sessionId": "s1", "modeId": "backend-agent"})
        );

        let cancel = handler.create_cancel_request("s1").unwrap();
        assert_eq!(cancel.method, "session/cancel");
        assert_eq!(cancel.id, Some(json!(4)));
    }

    #[test]
    fn test_parse_message_response() {
        let handler = ProtocolHandler::new();
        let msg = handler
            .parse_message(json!({"jsonrpc": "2.0", "id": 1, "result": {"sessionId": "s"}}))
            .unwrap();
        assert!(matches!(msg, AcpMessage::Response(_)));
    }

    #[test]
    fn test_parse_message_notification() {
        let handler = ProtocolHandler::new();
        let msg = handler
            .parse_message(json!({
                "jsonrpc": "2.0",
                "method": "session/update",
                "params": {"update": {"sessionUpdate": "agent_message_chunk"}}
            }))
            .unwrap();
        match msg {
            AcpMessage::Notification { method, params } => {
                assert_eq!(method, "session/update");
                assert!(params.get("update").is_some());
            }
            other => panic!("Expected notification, got {:?}", other),
        }
    }

    #[test]
    fn test_parse_message_agent_request() {
        let handler = ProtocolHandler::new();
        let msg = handler
            .parse_message(json!({
                "jsonrpc": "2.0",
                "id": 5,
                "method": "fs/readTextFile",
                "params": {"path": "a.txt"}
            }))
            .unwrap();
        assert!(matches!(msg, AcpMessage::AgentRequest(_)));
    }

    #[test]
    fn test_parse_message_garbage() {
        let handler = ProtocolHandler::new();
        assert!(handler.parse_message(json!({"hello": "world"})).is_err());
    }

    #[test]
    fn test_parse_result_remote_error() {
        let response = JsonRpcResponse::failure(json!(3), -32000, "no such mode");
        let err = parse_result::<serde_json::Value>(response).unwrap_err();
        assert!(matches!(
            err,
            Error::Acp(AcpError::Remote { code: -32000, ref message }) if message == "no such mode"
        ));
    }

    #[test]
    fn test_parse_result_null_is_empty_object() {
        let response = JsonRpcResponse {
            jsonrpc: "2.0".into(),
            id: Some(json!(2)),
            result: None,
            error: None,
        };
        let parsed: PromptResponse = parse_result(response).unwrap();
        assert_eq!(parsed.stop_reason, None);
    }
}
