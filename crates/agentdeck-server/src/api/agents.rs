//! Agent config CRUD, templates and drafting from a transcript

use super::{ApiError, ApiResult};
use crate::state::AppState;
use agentdeck_core::agents::{config_from_transcript, AGENT_TEMPLATES};
use agentdeck_core::{AgentConfig, AgentMeta, AgentRecord, CreateAgentRequest};
use axum::extract::{Path, State};
use axum::http::StatusCode;
use axum::Json;
use serde::{Deserialize, Serialize};
use serde_json::{json, Map, Value};

/// GET /api/agents
pub async fn list_agents(State(state): State<AppState>) -> ApiResult<Json<Value>> {
    let agents = state.agents.list_agents().await?;
    Ok(Json(json!({ "agents": agents })))
}

/// POST /api/agents
pub async fn create_agent(
    State(state): State<AppState>,
    Json(body): Json<Value>,
) -> ApiResult<(StatusCode, Json<AgentMeta>)> {
    create_from_value(&state, body).await
}

/// POST /api/agents/confirm
///
/// Saves a draft the user accepted, sent either bare or as `{"config": ...}`.
pub async fn confirm_agent(
    State(state): State<AppState>,
    Json(mut body): Json<Value>,
) -> ApiResult<(StatusCode, Json<AgentMeta>)> {
    let nested = body.get_mut("config").map(Value::take);
    let draft = match nested {
        Some(config) if !config.is_null() => config,
        _ => body,
    };
    create_from_value(&state, draft).await
}

async fn create_from_value(
    state: &AppState,
    body: Value,
) -> ApiResult<(StatusCode, Json<AgentMeta>)> {
    let request: CreateAgentRequest =
        serde_json::from_value(body).map_err(|e| ApiError::validation(e.to_string()))?;
    let meta = state.agents.create_agent(request).await?;
    Ok((StatusCode::CREATED, Json(meta)))
}

/// GET /api/agents/templates
pub async fn list_templates() -> Json<Value> {
    let templates: Map<String, Value> = AGENT_TEMPLATES
        .iter()
        .map(|(key, template)| (key.to_string(), json!(template)))
        .collect();
    Json(json!({ "templates": templates }))
}

#[derive(Debug, Default, Deserialize)]
pub struct FromTranscriptRequest {
    #[serde(default)]
    pub transcript: Option<String>,
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct DraftResponse {
    pub transcript: String,
    pub parsed_config: AgentConfig,
    pub confidence: f64,
    pub needs_confirmation: bool,
}

/// POST /api/agents/from-voice
///
/// Drafts a config from transcribed text; nothing is saved until confirmed.
pub async fn from_transcript(
    Json(request): Json<FromTranscriptRequest>,
) -> ApiResult<Json<DraftResponse>> {
    let transcript = request
        .transcript
        .filter(|t| !t.trim().is_empty())
        .ok_or_else(|| {
            ApiError::new(
                StatusCode::BAD_REQUEST,
                "MISSING_TRANSCRIPT",
                "No transcript provided",
            )
        })?;
    let parsed_config = config_from_transcript(&transcript).map_err(|e| {
        ApiError::new(StatusCode::UNPROCESSABLE_ENTITY, "PARSE_FAILED", e.to_string())
    })?;

    Ok(Json(DraftResponse {
        transcript,
        parsed_config,
        confidence: 0.85,
        needs_confirmation: true,
    }))
}

#[derive(Debug, Serialize)]
pub struct AgentDetail {
    #[serde(flatten)]
    pub record: AgentRecord,
    pub children: Vec<AgentMeta>,
}

/// GET /api/agents/{id}
pub async fn get_agent(
    State(state): State<AppState>,
    Path(id): Path<String>,
) -> ApiResult<Json<AgentDetail>> {
    let record = state
        .agents
        .get_agent(&id)
        .await?
        .ok_or_else(ApiError::agent_not_found)?;
    let children = state.agents.get_child_agents(&id).await?;
    Ok(Json(AgentDetail { record, children }))
}

/// PUT /api/agents/{id}
pub async fn update_agent(
    State(state): State<AppState>,
    Path(id): Path<String>,
    Json(patch): Json<Map<String, Value>>,
) -> ApiResult<Json<AgentMeta>> {
    let meta = state
        .agents
        .update_agent(&id, &patch)
        .await?
        .ok_or_else(ApiError::agent_not_found)?;
    Ok(Json(meta))
}

/// DELETE /api/agents/{id}
pub async fn delete_agent(
    State(state): State<AppState>,
    Path(id): Path<String>,
) -> ApiResult<StatusCode> {
    if state.agents.delete_agent(&id).await? {
        Ok(StatusCode::NO_CONTENT)
    } else {
        Err(ApiError::agent_not_found())
    }
}
