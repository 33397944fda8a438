//! Plain-text agent requests ("create a deployment agent that uses git")
//! turned into draft configs.
//!
//! Matching is keyword based: a built-in template wins if the text names
//! one, otherwise the name comes from the "create ... agent" phrase and
//! tools from keywords.

use super::schema::AgentConfig;
use super::templates::AGENT_TEMPLATES;
use crate::error::Result;
use once_cell::sync::Lazy;
use regex::Regex;

/// Tools and MCP prefixes an agent config may list
pub const KNOWN_TOOLS: &[&str] = &[
    "read", "write", "shell", "aws", "code", "knowledge", "@git", "@fetch", "@builtin",
];

const TOOL_KEYWORDS: &[(&str, &[&str])] = &[
    (
        "aws",
        &[
            "aws", "amazon", "s3", "lambda", "ec2", "dynamodb", "cloudformation", "terraform",
            "infrastructure", "devops",
        ],
    ),
    (
        "shell",
        &["shell", "bash", "terminal", "command", "script", "deploy", "docker", "kubernetes"],
    ),
    ("@git", &["git", "github", "version control", "commit", "repository"]),
    ("@fetch", &["fetch", "http", "api", "web", "url", "download"]),
    ("code", &["code", "lsp", "refactor", "analyze"]),
    ("knowledge", &["docs", "documentation", "knowledge", "search"]),
];

static NAME_PHRASE_RE: Lazy<Regex> = Lazy::new(|| {
    Regex::new(r"(?:create|build|make|set up|setup)\s+(?:a|an)?\s*(.+?)\s+agent")
        .expect("name phrase pattern is valid")
});
static NAME_STRIP_RE: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"[^a-z0-9\s-]").expect("name strip pattern is valid"));
static WHITESPACE_RE: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"\s+").expect("whitespace pattern is valid"));

const MAX_DESCRIPTION_CHARS: usize = 500;
/// Leaves room for the `-agent` suffix inside the 64 character name limit
const MAX_NAME_STEM_CHARS: usize = 58;

/// Draft a validated config from a spoken or typed request.
pub fn config_from_transcript(transcript: &str) -> Result<AgentConfig> {
    let lower = transcript.to_lowercase();

    for (key, template) in AGENT_TEMPLATES {
        let stem = template.name.trim_end_matches("-agent");
        if lower.contains(key) || lower.contains(stem) {
            let config = template.to_config();
            config.validate()?;
            return Ok(config);
        }
    }

    let mut config = AgentConfig::new(
        format!("{}-agent", name_stem(&lower)),
        description(transcript),
        format!(
            "You are a specialized AI agent created from the following description: \"{}\". \
             Follow the user's instructions precisely and use your available tools effectively.",
            transcript
        ),
    );
    for (tool, keywords) in TOOL_KEYWORDS {
        if keywords.iter().any(|kw| lower.contains(kw)) {
            config.tools.push(tool.to_string());
        }
    }
    config.validate()?;
    Ok(config)
}

/// Prompt asking an agent to produce the config JSON itself
pub fn config_prompt(transcript: &str) -> String {
    format!(
        r#"Parse the following voice command into a Kiro agent JSON configuration.

Voice command: "{transcript}"

Return ONLY valid JSON matching this schema:
{{
  "name": "lowercase-hyphenated-name",
  "description": "Brief description",
  "prompt": "System prompt for the agent",
  "tools": ["read", "write", ...],
  "model": "claude-sonnet-4"
}}

Available tools: {tools}
Available MCP server prefixes: @git, @fetch

Respond with ONLY the JSON, no markdown fences or explanation."#,
        transcript = transcript,
        tools = KNOWN_TOOLS.join(", "),
    )
}

fn name_stem(lower: &str) -> String {
    let raw = NAME_PHRASE_RE
        .captures(lower)
        .and_then(|caps| caps.get(1))
        .map(|m| m.as_str())
        .unwrap_or("custom");
    let cleaned = NAME_STRIP_RE.replace_all(raw.trim(), "");
    let hyphenated = WHITESPACE_RE.replace_all(cleaned.trim(), "-");
    let stem: String = hyphenated.chars().take(MAX_NAME_STEM_CHARS).collect();
    if stem.is_empty() {
        "custom".to_string()
    } else {
        stem
    }
}

fn description(transcript: &str) -> String {
    if transcript.chars().count() > MAX_DESCRIPTION_CHARS {
        let head: String = transcript.chars().take(MAX_DESCRIPTION_CHARS - 3).collect();
        format!("{}...", head)
    } else {
        transcript.to_string()
    }
}
