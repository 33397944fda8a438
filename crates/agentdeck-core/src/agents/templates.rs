//! Built-in agent personas offered as starting points

use super::schema::AgentConfig;
use serde::Serialize;

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct AgentTemplate {
    pub name: &'static str,
    pub description: &'static str,
    pub prompt: &'static str,
    pub tools: &'static [&'static str],
    pub model: &'static str,
}

impl AgentTemplate {
    pub fn to_config(&self) -> AgentConfig {
        let mut config = AgentConfig::new(self.name, self.description, self.prompt);
        config.tools = self.tools.iter().map(|t| t.to_string()).collect();
        config.model = self.model.to_string();
        config
    }
}

/// Templates keyed by short name, in matching priority order
pub const AGENT_TEMPLATES: &[(&str, AgentTemplate)] = &[
    (
        "devops",
        AgentTemplate {
            name: "devops-agent",
            description: "AWS infrastructure and DevOps automation specialist",
            prompt: "You are a DevOps specialist. You help with AWS infrastructure, Terraform, \
                     CI/CD pipelines, Docker, and Kubernetes. Always follow security best practices.",
            tools: &["read", "write", "shell", "aws"],
            model: "claude-sonnet-4",
        },
    ),
    (
        "backend",
        AgentTemplate {
            name: "backend-agent",
            description: "Backend API development specialist",
            prompt: "You are a backend development expert. You help build REST APIs, database \
                     schemas, authentication, and server-side logic. Prefer TypeScript/Node.js \
                     unless told otherwise.",
            tools: &["read", "write", "shell"],
            model: "claude-sonnet-4",
        },
    ),
    (
        "frontend",
        AgentTemplate {
            name: "frontend-agent",
            description: "Frontend UI/UX development specialist",
            prompt: "You are a frontend specialist. You build React components, handle state \
                     management, implement responsive designs, and ensure accessibility compliance.",
            tools: &["read", "write", "shell"],
            model: "claude-sonnet-4",
        },
    ),
    (
        "data",
        AgentTemplate {
            name: "data-agent",
            description: "Data engineering and analytics specialist",
            prompt: "You are a data engineering expert. You help with ETL pipelines, SQL queries, \
                     data modeling, and analytics dashboards.",
            tools: &["read", "write", "shell", "aws"],
            model: "claude-sonnet-4",
        },
    ),
    (
        "orchestrator",
        AgentTemplate {
            name: "orchestrator-agent",
            description: "Multi-agent orchestrator that delegates to specialized agents",
            prompt: "You are an orchestrator agent. You analyze user requests and delegate tasks \
                     to the appropriate specialized agent. Available agents: devops-agent, \
                     backend-agent, frontend-agent, data-agent. To hand off work, end your reply \
                     with <delegate to=\"AGENT_NAME\">TASK</delegate>.",
            tools: &["*"],
            model: "claude-sonnet-4",
        },
    ),
];

pub fn template(key: &str) -> Option<&'static AgentTemplate> {
    AGENT_TEMPLATES
        .iter()
        .find(|(k, _)| *k == key)
        .map(|(_, template)| template)
}
