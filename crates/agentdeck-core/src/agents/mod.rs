//! Agent configuration
//!
//! Persona definitions the agent runtime loads by name, plus an index that
//! gives each one a stable ID and an optional parent (team coordinator).
//! Built-in templates and a keyword parser help draft new configs.

mod intent;
mod schema;
mod store;
mod templates;

pub use intent::{config_from_transcript, config_prompt, KNOWN_TOOLS};
pub use schema::{AgentConfig, AgentMeta, AgentRecord, CreateAgentRequest};
pub use store::AgentStore;
pub use templates::{template, AgentTemplate, AGENT_TEMPLATES};
