//! AgentDeck HTTP server
//!
//! Thin axum front end over `agentdeck-core`: chat sessions and streamed
//! prompts, stored history, agent config CRUD, the builder conversation and
//! a health check.

pub mod api;
pub mod state;

pub use state::AppState;

use axum::routing::{delete, get, post};
use axum::Router;

pub fn router(state: AppState) -> Router {
    Router::new()
        .route("/api/health", get(api::health::health_check))
        .route("/api/chat/session", post(api::chat::create_session))
        .route("/api/chat/session/{id}", delete(api::chat::destroy_session))
        .route("/api/chat/sessions", get(api::chat::list_sessions))
        .route("/api/chat/prompt", post(api::chat::prompt))
        .route(
            "/api/chat/history",
            get(api::history::get_history).delete(api::history::delete_history),
        )
        .route(
            "/api/agents",
            get(api::agents::list_agents).post(api::agents::create_agent),
        )
        .route("/api/agents/templates", get(api::agents::list_templates))
        .route("/api/agents/from-voice", post(api::agents::from_transcript))
        .route("/api/agents/confirm", post(api::agents::confirm_agent))
        .route(
            "/api/agents/{id}",
            get(api::agents::get_agent)
                .put(api::agents::update_agent)
                .delete(api::agents::delete_agent),
        )
        .route("/api/builder/chat", post(api::builder::chat))
        .with_state(state)
}
