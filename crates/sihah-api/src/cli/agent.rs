//! Agent definitions loaded from TOML files for the CLI.
//!
//! ```toml
//! agent_id = "0190c6a2-7d3e-7b1a-9c55-3f2d8e41a001"
//! name = "נועה"
//! model = "gpt-4o-mini"
//! language_hint = "he"
//! system_prompt = "את {agent_name}, נציגת שירות. ענו ב-{language_hint}."
//! ```

use std::path::Path;

use anyhow::{Context, Result};

use sihah_types::agent::AgentConfig;

/// Read and parse an agent definition.
pub async fn load_agent(path: &Path) -> Result<AgentConfig> {
    let content = tokio::fs::read_to_string(path)
        .await
        .with_context(|| format!("reading agent file {}", path.display()))?;
    parse_agent(&content).with_context(|| format!("parsing agent file {}", path.display()))
}

fn parse_agent(content: &str) -> Result<AgentConfig> {
    let agent: AgentConfig = toml::from_str(content)?;
    anyhow::ensure!(!agent.name.trim().is_empty(), "agent name is empty");
    Ok(agent)
}
