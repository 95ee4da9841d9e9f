//! Global configuration types for Sihah.
//!
//! `GlobalConfig` represents the top-level `config.toml`. Every section and
//! field has a default so a partial (or empty) file is valid.

use serde::{Deserialize, Serialize};

/// Top-level configuration.
///
/// Loaded from `{data_dir}/config.toml`.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct GlobalConfig {
    #[serde(default)]
    pub pipeline: PipelineConfig,
    #[serde(default)]
    pub retry: RetryConfig,
    #[serde(default)]
    pub models: ModelsConfig,
    #[serde(default)]
    pub embedding: EmbeddingConfig,
    #[serde(default)]
    pub ingest: IngestConfig,
    #[serde(default)]
    pub events: EventsConfig,
}

/// Turn pipeline limits.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct PipelineConfig {
    /// Maximum number of prior messages included in a prompt.
    pub history_limit: usize,
    /// Character budget for the whole assembled prompt.
    pub max_context_chars: usize,
    pub retrieval_top_k: usize,
    /// Deadline bounding retrieval plus model invocation.
    pub turn_timeout_secs: u64,
}

impl Default for PipelineConfig {
    fn default() -> Self {
        Self {
            history_limit: 10,
            max_context_chars: 24_000,
            retrieval_top_k: 5,
            turn_timeout_secs: 60,
        }
    }
}

/// Exponential backoff for retryable model failures.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct RetryConfig {
    pub max_attempts: u32,
    pub initial_backoff_ms: u64,
    pub max_backoff_ms: u64,
    pub multiplier: f64,
}

impl Default for RetryConfig {
    fn default() -> Self {
        Self {
            max_attempts: 3,
            initial_backoff_ms: 500,
            max_backoff_ms: 8_000,
            multiplier: 2.0,
        }
    }
}

/// Chat model providers and the default model.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct ModelsConfig {
    /// Model used when a turn names an unregistered model.
    pub default_model: String,
    pub providers: Vec<ProviderConfig>,
}

impl Default for ModelsConfig {
    fn default() -> Self {
        Self {
            default_model: "gpt-4o-mini".to_string(),
            providers: vec![ProviderConfig {
                name: "openai".to_string(),
                base_url: "https://api.openai.com/v1".to_string(),
                api_key_env: Some("OPENAI_API_KEY".to_string()),
                models: vec!["gpt-4o-mini".to_string(), "gpt-4o".to_string()],
            }],
        }
    }
}

/// One OpenAI-compatible chat completion endpoint.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ProviderConfig {
    pub name: String,
    pub base_url: String,
    /// Environment variable holding the API key. `None` for local servers.
    #[serde(default)]
    pub api_key_env: Option<String>,
    /// Model ids served by this provider.
    #[serde(default)]
    pub models: Vec<String>,
}

/// Embedding endpoint used for retrieval and ingestion.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct EmbeddingConfig {
    pub model: String,
    pub dimension: usize,
    pub base_url: String,
    pub api_key_env: Option<String>,
}

impl Default for EmbeddingConfig {
    fn default() -> Self {
        Self {
            model: "text-embedding-3-small".to_string(),
            dimension: 1536,
            base_url: "https://api.openai.com/v1".to_string(),
            api_key_env: Some("OPENAI_API_KEY".to_string()),
        }
    }
}

/// Background ingestion worker pool.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct IngestConfig {
    pub workers: usize,
    /// Attempts before a job is dead-lettered.
    pub max_attempts: u32,
    pub poll_interval_ms: u64,
    /// A claimed job not acknowledged within this window is redelivered.
    pub visibility_timeout_secs: u64,
    pub chunk_chars: usize,
}

impl Default for IngestConfig {
    fn default() -> Self {
        Self {
            workers: 4,
            max_attempts: 5,
            poll_interval_ms: 500,
            visibility_timeout_secs: 120,
            chunk_chars: 512,
        }
    }
}

/// Real-time event fan-out.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct EventsConfig {
    /// Broadcast channel capacity; slow subscribers beyond it lag.
    pub capacity: usize,
}

impl Default for EventsConfig {
    fn default() -> Self {
        Self { capacity: 1024 }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_global_config_default_values() {
        let config = GlobalConfig::default();
        assert_eq!(config.pipeline.history_limit, 10);
        assert_eq!(config.retry.max_attempts, 3);
        assert_eq!(config.ingest.workers, 4);
        assert_eq!(config.events.capacity, 1024);
        assert_eq!(config.models.default_model, "gpt-4o-mini");
    }

    #[test]
    fn test_global_config_deserialize_with_defaults() {
        let config: GlobalConfig = toml::from_str("").unwrap();
        assert_eq!(config.pipeline.max_context_chars, 24_000);
        assert_eq!(config.embedding.dimension, 1536);
        assert_eq!(config.ingest.visibility_timeout_secs, 120);
    }

    #[test]
    fn test_global_config_partial_section() {
        let toml_str = r#"
[pipeline]
history_limit = 4

[retry]
max_attempts = 5
multiplier = 1.5

[models]
default_model = "local-llama"

[[models.providers]]
name = "ollama"
base_url = "http://localhost:11434/v1"
models = ["local-llama"]
"#;
        let config: GlobalConfig = toml::from_str(toml_str).unwrap();
        assert_eq!(config.pipeline.history_limit, 4);
        assert_eq!(config.pipeline.retrieval_top_k, 5);
        assert_eq!(config.retry.max_attempts, 5);
        assert_eq!(config.retry.initial_backoff_ms, 500);
        assert!((config.retry.multiplier - 1.5).abs() < f64::EPSILON);
        assert_eq!(config.models.providers.len(), 1);
        assert!(config.models.providers[0].api_key_env.is_none());
    }
}
