//! Chat model provider implementations.
//!
//! Contains the OpenAI-compatible implementation of the [`LlmProvider`]
//! trait defined in `sihah-core`, a provider factory ([`create_provider`]),
//! and [`build_registry`], which turns the `[models]` config section into a
//! [`ModelRegistry`].
//!
//! [`LlmProvider`]: sihah_core::llm::provider::LlmProvider

pub mod openai_compat;

use secrecy::SecretString;

use sihah_core::llm::box_provider::BoxLlmProvider;
use sihah_core::llm::registry::ModelRegistry;
use sihah_types::config::{ModelsConfig, ProviderConfig};
use sihah_types::llm::LlmError;

use self::openai_compat::OpenAiCompatibleProvider;

/// Read an API key from the environment variable named `env_name`.
///
/// Returns `Ok(None)` when no variable is configured (local servers),
/// and `AuthenticationFailed` when one is configured but unset or empty.
pub fn resolve_api_key(env_name: Option<&str>) -> Result<Option<SecretString>, LlmError> {
    let Some(name) = env_name else {
        return Ok(None);
    };
    match std::env::var(name) {
        Ok(value) if !value.trim().is_empty() => Ok(Some(SecretString::from(value))),
        _ => Err(LlmError::AuthenticationFailed),
    }
}

/// Create a [`BoxLlmProvider`] from a [`ProviderConfig`].
///
/// # Errors
///
/// Returns `AuthenticationFailed` if the provider names a key variable
/// that is not set.
pub fn create_provider(config: &ProviderConfig) -> Result<BoxLlmProvider, LlmError> {
    let api_key = resolve_api_key(config.api_key_env.as_deref())?;
    let oai_config = openai_compat::config::from_provider_config(config, api_key);
    Ok(BoxLlmProvider::new(OpenAiCompatibleProvider::new(oai_config)))
}

/// Build the model registry from configuration.
///
/// A provider whose key cannot be resolved is skipped with a warning so
/// one missing credential does not take down the others. Requests for an
/// unregistered model then fall back to `default_model`.
pub fn build_registry(config: &ModelsConfig) -> ModelRegistry {
    let mut registry = ModelRegistry::new(config.default_model.clone());

    for provider in &config.providers {
        if provider.models.is_empty() {
            tracing::warn!(provider = %provider.name, "provider lists no models, skipping");
            continue;
        }
        match create_provider(provider) {
            Ok(boxed) => {
                tracing::debug!(
                    provider = %provider.name,
                    models = ?provider.models,
                    "registered chat provider"
                );
                registry.register(boxed, provider.models.iter().cloned());
            }
            Err(e) => {
                tracing::warn!(
                    provider = %provider.name,
                    key_env = ?provider.api_key_env,
                    error = %e,
                    "skipping chat provider"
                );
            }
        }
    }

    if !registry.contains(registry.default_model()) {
        tracing::warn!(
            default_model = %registry.default_model(),
            "default model is not served by any provider"
        );
    }
    registry
}
