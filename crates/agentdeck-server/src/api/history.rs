//! Stored chat transcripts

use super::{ApiError, ApiResult};
use crate::state::AppState;
use agentdeck_core::storage;
use axum::extract::{Query, State};
use axum::Json;
use serde::Deserialize;
use serde_json::{json, Value};

const RECENT_LIMIT: usize = 30;
const PER_AGENT_LIMIT: usize = 100;

#[derive(Debug, Default, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct HistoryQuery {
    pub session_id: Option<String>,
    pub agent_id: Option<String>,
}

/// GET /api/chat/history
///
/// With `sessionId`, that session's messages; otherwise session summaries,
/// for one agent if `agentId` is given.
pub async fn get_history(
    State(state): State<AppState>,
    Query(query): Query<HistoryQuery>,
) -> ApiResult<Json<Value>> {
    let conn = state.storage.connection()?;

    if let Some(session_id) = query.session_id.filter(|id| !id.is_empty()) {
        let messages = storage::get_session_messages(&conn, &session_id)?;
        return Ok(Json(json!({ "messages": messages })));
    }

    let sessions = match query.agent_id.filter(|id| !id.is_empty()) {
        Some(agent_id) => storage::list_chat_sessions(&conn, Some(&agent_id), PER_AGENT_LIMIT)?,
        None => storage::get_recent_chats(&conn, RECENT_LIMIT)?,
    };
    Ok(Json(json!({ "sessions": sessions })))
}

#[derive(Debug, Default, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct DeleteHistoryRequest {
    pub session_id: Option<String>,
}

/// DELETE /api/chat/history
pub async fn delete_history(
    State(state): State<AppState>,
    Json(request): Json<DeleteHistoryRequest>,
) -> ApiResult<Json<Value>> {
    let session_id = request
        .session_id
        .filter(|id| !id.is_empty())
        .ok_or_else(|| ApiError::bad_request("sessionId required"))?;

    let conn = state.storage.connection()?;
    storage::delete_chat_session(&conn, &session_id)?;
    Ok(Json(json!({ "ok": true })))
}
