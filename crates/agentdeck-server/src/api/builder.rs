//! Agent builder conversation

use super::{ApiError, ApiResult};
use crate::state::AppState;
use axum::extract::State;
use axum::response::sse::{Event, Sse};
use axum::response::{IntoResponse, Response};
use axum::Json;
use futures::StreamExt;
use serde::Deserialize;
use serde_json::json;
use std::convert::Infallible;
use tokio::sync::mpsc;
use tokio_stream::wrappers::ReceiverStream;
use tracing::warn;

#[derive(Debug, Deserialize)]
pub struct ChatMessage {
    pub role: String,
    pub content: String,
}

#[derive(Debug, Deserialize)]
pub struct BuilderRequest {
    #[serde(default)]
    pub messages: Vec<ChatMessage>,
    #[serde(default)]
    pub action: Option<String>,
}

/// POST /api/builder/chat
///
/// Only the latest user message is sent; the agent keeps the history.
/// Streams `{"text": ...}` chunks, then `[DONE]`, or `{"error": ...}` if
/// the turn failed.
pub async fn chat(
    State(state): State<AppState>,
    Json(request): Json<BuilderRequest>,
) -> ApiResult<Response> {
    if request.action.as_deref() == Some("reset") {
        state.builder.reset().await;
        return Ok(Json(json!({ "ok": true })).into_response());
    }

    if request.messages.is_empty() {
        return Err(ApiError::bad_request("messages required"));
    }
    let message = request
        .messages
        .into_iter()
        .rev()
        .find(|m| m.role == "user")
        .map(|m| m.content)
        .ok_or_else(|| ApiError::bad_request("no user message found"))?;

    let (tx, rx) = mpsc::channel::<Event>(64);
    let builder = state.builder.clone();
    tokio::spawn(async move {
        let (chunk_tx, mut chunk_rx) = mpsc::channel::<String>(64);
        let forward = async {
            while let Some(chunk) = chunk_rx.recv().await {
                let event = Event::default().data(json!({ "text": chunk }).to_string());
                if tx.send(event).await.is_err() {
                    break;
                }
            }
        };
        let (result, ()) = tokio::join!(builder.stream_prompt(&message, chunk_tx), forward);

        let last = match result {
            Ok(()) => Event::default().data("[DONE]"),
            Err(e) => {
                warn!("Builder turn failed: {}", e);
                Event::default().data(json!({ "error": e.to_string() }).to_string())
            }
        };
        let _ = tx.send(last).await;
    });

    let events = ReceiverStream::new(rx).map(Ok::<_, Infallible>);
    Ok(Sse::new(events).into_response())
}
