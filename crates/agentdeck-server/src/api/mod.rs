//! HTTP API
//!
//! JSON in, JSON out, except the two streaming endpoints, which answer with
//! server-sent events terminated by a literal `[DONE]`. Every error body has
//! the shape `{"error": {"code": ..., "message": ...}}`.

pub mod agents;
pub mod builder;
pub mod chat;
pub mod health;
pub mod history;

use agentdeck_core::error::{AcpError, AgentError, Error, SandboxError};
use axum::http::StatusCode;
use axum::response::sse::{Event, Sse};
use axum::response::{IntoResponse, Response};
use axum::Json;
use futures::{Stream, StreamExt};
use serde::Serialize;
use serde_json::json;
use std::convert::Infallible;
use tokio::sync::mpsc;
use tokio_stream::wrappers::ReceiverStream;
use tracing::{error, warn};

/// Failed request, rendered as a JSON error body
#[derive(Debug)]
pub struct ApiError {
    status: StatusCode,
    code: &'static str,
    message: String,
}

impl ApiError {
    pub fn new(status: StatusCode, code: &'static str, message: impl Into<String>) -> Self {
        Self {
            status,
            code,
            message: message.into(),
        }
    }

    pub fn bad_request(message: impl Into<String>) -> Self {
        Self::new(StatusCode::BAD_REQUEST, "BAD_REQUEST", message)
    }

    pub fn validation(message: impl Into<String>) -> Self {
        Self::new(StatusCode::BAD_REQUEST, "VALIDATION_ERROR", message)
    }

    pub fn agent_not_found() -> Self {
        Self::new(StatusCode::NOT_FOUND, "AGENT_NOT_FOUND", "Agent not found")
    }

    pub fn session_not_found() -> Self {
        Self::new(StatusCode::NOT_FOUND, "SESSION_NOT_FOUND", "Session not found")
    }

    /// The agent runtime could not be started or reached
    pub fn connection_failed(err: Error) -> Self {
        Self::new(
            StatusCode::SERVICE_UNAVAILABLE,
            "ACP_CONNECTION_FAILED",
            err.to_string(),
        )
    }

    pub fn status(&self) -> StatusCode {
        self.status
    }
}

impl From<Error> for ApiError {
    fn from(err: Error) -> Self {
        match &err {
            Error::Agent(AgentError::AlreadyExists(_)) => {
                Self::new(StatusCode::CONFLICT, "AGENT_EXISTS", err.to_string())
            }
            Error::Agent(AgentError::InvalidConfig(message)) => Self::validation(message.clone()),
            Error::Agent(AgentError::NotFound(_)) => Self::agent_not_found(),
            Error::Acp(AcpError::SessionNotFound(_)) => Self::session_not_found(),
            Error::Acp(AcpError::ConnectionFailed(_)) | Error::Acp(AcpError::NotConnected) => {
                Self::connection_failed(err)
            }
            Error::Sandbox(SandboxError::PathTraversal(_)) => Self::validation(err.to_string()),
            _ => {
                error!("Request failed: {}", err);
                Self::new(
                    StatusCode::INTERNAL_SERVER_ERROR,
                    "INTERNAL_ERROR",
                    err.to_string(),
                )
            }
        }
    }
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        let body = json!({"error": {"code": self.code, "message": self.message}});
        (self.status, Json(body)).into_response()
    }
}

pub type ApiResult<T> = std::result::Result<T, ApiError>;

/// `data: <json>` for one event
fn json_event<T: Serialize>(value: &T) -> Option<Event> {
    match serde_json::to_string(value) {
        Ok(json) => Some(Event::default().data(json)),
        Err(e) => {
            warn!("Failed to serialize stream event: {}", e);
            None
        }
    }
}

fn done_event() -> Event {
    Event::default().data("[DONE]")
}

/// Stream every value from `rx` as an event, then `[DONE]`
pub fn sse_until_done<T>(
    rx: mpsc::Receiver<T>,
) -> Sse<impl Stream<Item = Result<Event, Infallible>>>
where
    T: Serialize + Send + 'static,
{
    let events = ReceiverStream::new(rx)
        .filter_map(|value| async move { json_event(&value) })
        .chain(futures::stream::once(async { done_event() }))
        .map(Ok);
    Sse::new(events)
}
