//! Session update decoder
//!
//! The only place that looks at raw `session/update` params. Everything
//! downstream works with [`SessionUpdate`].

use crate::types::{SessionUpdate, SessionUpdateNotification, WireSessionUpdate};
use tracing::{debug, trace};

/// A decoded update and the session it was addressed to, if the agent said.
#[derive(Debug, Clone, PartialEq)]
pub struct DecodedUpdate {
    pub session_id: Option<String>,
    pub update: SessionUpdate,
}

/// Decode `session/update` params. Unknown or malformed variants yield `None`.
pub fn decode_session_update(params: &serde_json::Value) -> Option<DecodedUpdate> {
    let notification: SessionUpdateNotification = match serde_json::from_value(params.clone()) {
        Ok(n) => n,
        Err(e) => {
            debug!("Ignoring undecodable session/update: {}", e);
            return None;
        }
    };

    let update = match notification.update {
        WireSessionUpdate::AgentMessageChunk { content } => SessionUpdate::Text {
            content: content.and_then(|c| c.text).unwrap_or_default(),
        },
        WireSessionUpdate::ToolUse {
            name,
            status,
            input,
        } => SessionUpdate::ToolCall {
            name: name.unwrap_or_else(unknown),
            status: status.unwrap_or_else(running),
            args: input,
        },
        WireSessionUpdate::ToolCall {
            tool_call_id,
            title,
            status,
            raw_input,
        } => SessionUpdate::ToolCall {
            name: title.or(tool_call_id).unwrap_or_else(unknown),
            status: status.unwrap_or_else(running),
            args: raw_input,
        },
        WireSessionUpdate::ToolResult { name, content } => SessionUpdate::ToolCallUpdate {
            name: name.unwrap_or_else(unknown),
            content: content.as_ref().map(flatten_content).unwrap_or_default(),
        },
        WireSessionUpdate::ToolCallUpdate {
            tool_call_id,
            title,
            content,
        } => SessionUpdate::ToolCallUpdate {
            name: title.or(tool_call_id).unwrap_or_else(unknown),
            content: content.as_ref().map(flatten_content).unwrap_or_default(),
        },
        WireSessionUpdate::Unrecognized => {
            trace!("Ignoring unrecognized session update");
            return None;
        }
    };

    Some(DecodedUpdate {
        session_id: notification.session_id,
        update,
    })
}

fn unknown() -> String {
    "unknown".to_string()
}

fn running() -> String {
    "running".to_string()
}

/// Tool output arrives as a plain string or as ACP content blocks; collect the text.
fn flatten_content(value: &serde_json::Value) -> String {
    match value {
        serde_json::Value::String(s) => s.clone(),
        serde_json::Value::Array(items) => items
            .iter()
            .map(flatten_content)
            .filter(|s| !s.is_empty())
            .collect::<Vec<_>>()
            .join("\n"),
        serde_json::Value::Object(map) => {
            if let Some(text) = map.get("text").and_then(|t| t.as_str()) {
                text.to_string()
            } else if let Some(inner) = map.get("content") {
                flatten_content(inner)
            } else {
                value.to_string()
            }
        }
        serde_json::Value::Null => String::new(),
        other => other.to_string(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;
    use serde_json::json;

    fn decode(update: serde_json::Value) -> Option<SessionUpdate> {
        decode_session_update(&json!({"sessionId": "s1", "update": update})).map(|d| d.update)
    }

    #[test]
    fn test_message_chunk() {
        assert_eq!(
            decode(json!({"sessionUpdate": "agent_message_chunk", "content": {"type": "text", "text": "Hi"}})),
            Some(SessionUpdate::text("Hi"))
        );
        // Image chunks still count as a (empty) text event.
        assert_eq!(
            decode(json!({"sessionUpdate": "agent_message_chunk", "content": {"type": "image", "data": "..."}})),
            Some(SessionUpdate::text(""))
        );
    }

    #[test]
    fn test_tool_use_defaults() {
        assert_eq!(
            decode(json!({"sessionUpdate": "tool_use", "input": {"path": "a.rs"}})),
            Some(SessionUpdate::ToolCall {
                name: "unknown".into(),
                status: "running".into(),
                args: Some(json!({"path": "a.rs"})),
            })
        );
    }

    #[test]
    fn test_acp_tool_call_shapes() {
        assert_eq!(
            decode(json!({
                "sessionUpdate": "tool_call",
                "toolCallId": "call_1",
                "title": "Reading file",
                "status": "pending"
            })),
            Some(SessionUpdate::ToolCall {
                name: "Reading file".into(),
                status: "pending".into(),
                args: None,
            })
        );
        assert_eq!(
            decode(json!({
                "sessionUpdate": "tool_call_update",
                "toolCallId": "call_1",
                "content": [{"type": "content", "content": {"type": "text", "text": "done"}}]
            })),
            Some(SessionUpdate::ToolCallUpdate {
                name: "call_1".into(),
                content: "done".into(),
            })
        );
    }

    #[test]
    fn test_tool_result() {
        assert_eq!(
            decode(json!({"sessionUpdate": "tool_result", "name": "shell", "content": "ok"})),
            Some(SessionUpdate::ToolCallUpdate {
                name: "shell".into(),
                content: "ok".into(),
            })
        );
    }

    #[test]
    fn test_unknown_and_malformed_are_ignored() {
        assert_eq!(decode(json!({"sessionUpdate": "agent_thought_chunk"})), None);
        assert_eq!(decode(json!({"noTag": true})), None);
        assert_eq!(decode_session_update(&json!({"sessionId": "s1"})), None);
        assert_eq!(decode_session_update(&serde_json::Value::Null), None);
    }

    #[test]
    fn test_session_id_is_carried() {
        let decoded = decode_session_update(&json!({
            "sessionId": "abc",
            "update": {"sessionUpdate": "agent_message_chunk", "content": {"text": "x"}}
        }))
        .unwrap();
        assert_eq!(decoded.session_id.as_deref(), Some("abc"));
    }
}
