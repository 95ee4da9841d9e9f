//! Agent configuration consumed (read-only) by the turn pipeline.

use serde::{Deserialize, Serialize};
use uuid::Uuid;

/// Per-agent settings supplied with each turn.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct AgentConfig {
    pub agent_id: Uuid,
    pub name: String,
    pub model: String,
    #[serde(default = "default_temperature")]
    pub temperature: f64,
    #[serde(default = "default_max_output_tokens")]
    pub max_output_tokens: u32,
    /// Preferred reply language, e.g. `"he"`.
    #[serde(default)]
    pub language_hint: Option<String>,
    /// System prompt template. Supports `{agent_name}` and `{language_hint}`.
    pub system_prompt: String,
}

fn default_temperature() -> f64 {
    0.7
}

fn default_max_output_tokens() -> u32 {
    1024
}

impl AgentConfig {
    /// Render the system prompt template.
    pub fn render_system_prompt(&self) -> String {
        self.system_prompt
            .replace("{agent_name}", &self.name)
            .replace(
                "{language_hint}",
                self.language_hint.as_deref().unwrap_or("auto"),
            )
    }
}
