//! Health check

use crate::state::AppState;
use axum::extract::State;
use axum::http::StatusCode;
use axum::Json;
use chrono::Utc;
use serde::Serialize;
use std::collections::BTreeMap;

#[derive(Debug, Serialize)]
pub struct HealthResponse {
    pub status: &'static str,
    pub checks: BTreeMap<&'static str, String>,
    pub timestamp: String,
}

/// GET /api/health
///
/// Degraded (503) when the database cannot be queried.
pub async fn health_check(State(state): State<AppState>) -> (StatusCode, Json<HealthResponse>) {
    let mut checks = BTreeMap::new();

    let database = match state.storage.ping() {
        Ok(()) => "ok".to_string(),
        Err(e) => format!("error: {}", e),
    };
    let healthy = database == "ok";
    checks.insert("database", database);
    checks.insert("sessions", format!("{} active", state.pool.len().await));

    let status = if healthy {
        StatusCode::OK
    } else {
        StatusCode::SERVICE_UNAVAILABLE
    };
    (
        status,
        Json(HealthResponse {
            status: if healthy { "healthy" } else { "degraded" },
            checks,
            timestamp: Utc::now().to_rfc3339(),
        }),
    )
}
