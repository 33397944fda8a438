//! Live chat sessions and streamed prompts

use super::{sse_until_done, ApiError, ApiResult};
use crate::state::AppState;
use agentdeck_core::storage;
use agentdeck_core::types::{NewMessage, SessionUpdate};
use agentdeck_core::ChatTranscript;
use axum::extract::{Path, State};
use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use axum::Json;
use serde::{Deserialize, Serialize};
use serde_json::json;
use tokio::sync::mpsc;
use tracing::{info, warn};

const TITLE_CHARS: usize = 100;

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CreateSessionRequest {
    pub agent_id: String,
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ChildAgent {
    pub id: String,
    pub name: String,
    pub description: String,
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct CreateSessionResponse {
    pub session_id: String,
    pub agent_name: String,
    pub description: String,
    pub tools: Vec<String>,
    pub model: String,
    pub children: Vec<ChildAgent>,
}

/// POST /api/chat/session
pub async fn create_session(
    State(state): State<AppState>,
    Json(request): Json<CreateSessionRequest>,
) -> ApiResult<(StatusCode, Json<CreateSessionResponse>)> {
    let record = state
        .agents
        .get_agent(&request.agent_id)
        .await?
        .ok_or_else(ApiError::agent_not_found)?;
    let children = state.agents.get_child_agents(&request.agent_id).await?;

    let config = record.config;
    let session = state
        .pool
        .create_session(&config.name)
        .await
        .map_err(|e| {
            warn!("Could not start a session for {}: {}", config.name, e);
            if matches!(e, agentdeck_core::Error::Acp(_)) {
                ApiError::connection_failed(e)
            } else {
                ApiError::from(e)
            }
        })?;

    let saved = state.storage.connection().and_then(|conn| {
        storage::create_chat_session(&conn, &session.session_id, &request.agent_id, &config.name)
    });
    if let Err(e) = saved {
        state.pool.destroy_session(&session.session_id).await;
        return Err(e.into());
    }

    info!("Chat session {} started with {}", session.session_id, config.name);
    Ok((
        StatusCode::CREATED,
        Json(CreateSessionResponse {
            session_id: session.session_id,
            agent_name: config.name,
            description: config.description,
            tools: config.tools,
            model: config.model,
            children: children
                .into_iter()
                .map(|child| ChildAgent {
                    id: child.id,
                    name: child.name,
                    description: child.description,
                })
                .collect(),
        }),
    ))
}

/// DELETE /api/chat/session/{id}
pub async fn destroy_session(
    State(state): State<AppState>,
    Path(session_id): Path<String>,
) -> ApiResult<StatusCode> {
    if state.pool.destroy_session(&session_id).await {
        Ok(StatusCode::NO_CONTENT)
    } else {
        Err(ApiError::session_not_found())
    }
}

/// GET /api/chat/sessions
pub async fn list_sessions(State(state): State<AppState>) -> Json<serde_json::Value> {
    let sessions = state.pool.list_active().await;
    Json(json!({ "sessions": sessions }))
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct PromptRequest {
    pub session_id: String,
    pub message: String,
}

/// POST /api/chat/prompt
pub async fn prompt(
    State(state): State<AppState>,
    Json(request): Json<PromptRequest>,
) -> ApiResult<Response> {
    if request.message.is_empty() {
        return Err(ApiError::validation("message must not be empty"));
    }
    let session = state
        .pool
        .get_session(&request.session_id)
        .await
        .ok_or_else(ApiError::session_not_found)?;

    if let Err(e) = state
        .storage
        .save_message(&session.session_id, NewMessage::user(request.message.clone()))
    {
        warn!("Failed to save user message for {}: {}", session.session_id, e);
    }
    let title: String = request.message.chars().take(TITLE_CHARS).collect();
    let titled = state
        .storage
        .connection()
        .and_then(|conn| storage::update_session_title(&conn, &session.session_id, &title));
    if let Err(e) = titled {
        warn!("Failed to set title for {}: {}", session.session_id, e);
    }

    let (tx, rx) = mpsc::channel::<SessionUpdate>(64);
    let orchestrator = state.orchestrator.clone();
    let message = request.message;
    tokio::spawn(async move {
        orchestrator.run_prompt(&session, &message, tx).await;
    });

    Ok(sse_until_done(rx).into_response())
}
