//! Configuration types and defaults for OpenAI-compatible chat endpoints.
//!
//! Hosted and self-hosted servers (OpenAI, Azure-style gateways, vLLM,
//! Ollama) all speak the same chat completions protocol and differ only in
//! base URL, key, and limits.

use secrecy::SecretString;
use sihah_types::config::ProviderConfig;
use sihah_types::llm::ProviderCapabilities;

/// Configuration for an [`super::OpenAiCompatibleProvider`].
pub struct OpenAiCompatConfig {
    /// Human-readable provider name (e.g., "openai", "ollama").
    pub provider_name: String,
    /// Base URL for the API (e.g., "https://api.openai.com/v1").
    pub base_url: String,
    /// `None` for local servers that accept unauthenticated requests.
    pub api_key: Option<SecretString>,
    /// Model sent when a request leaves `model` empty.
    pub model: String,
    pub capabilities: ProviderCapabilities,
}

/// OpenAI default configuration.
///
/// Base URL: `https://api.openai.com/v1`; 128K context, 16K output.
pub fn openai_defaults(api_key: SecretString, model: &str) -> OpenAiCompatConfig {
    OpenAiCompatConfig {
        provider_name: "openai".into(),
        base_url: "https://api.openai.com/v1".into(),
        api_key: Some(api_key),
        model: model.into(),
        capabilities: ProviderCapabilities {
            max_context_tokens: 128_000,
            max_output_tokens: 16_384,
        },
    }
}

/// Local Ollama server configuration.
///
/// Base URL: `http://localhost:11434/v1`, no key.
pub fn ollama_defaults(model: &str) -> OpenAiCompatConfig {
    OpenAiCompatConfig {
        provider_name: "ollama".into(),
        base_url: "http://localhost:11434/v1".into(),
        api_key: None,
        model: model.into(),
        capabilities: ProviderCapabilities {
            max_context_tokens: 32_768,
            max_output_tokens: 4_096,
        },
    }
}

/// Build a config from a `[[models.providers]]` entry.
///
/// The first listed model becomes the provider's default. Endpoints that
/// are not api.openai.com get conservative local-server limits.
pub fn from_provider_config(
    provider: &ProviderConfig,
    api_key: Option<SecretString>,
) -> OpenAiCompatConfig {
    let model = provider.models.first().cloned().unwrap_or_default();
    let capabilities = if provider.base_url.contains("api.openai.com") {
        ProviderCapabilities {
            max_context_tokens: 128_000,
            max_output_tokens: 16_384,
        }
    } else {
        ProviderCapabilities {
            max_context_tokens: 32_768,
            max_output_tokens: 4_096,
        }
    };

    OpenAiCompatConfig {
        provider_name: provider.name.clone(),
        base_url: provider.base_url.trim_end_matches('/').to_string(),
        api_key,
        model,
        capabilities,
    }
}
