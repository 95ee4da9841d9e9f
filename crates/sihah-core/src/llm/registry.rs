//! Model registry for runtime provider lookup.
//!
//! Maps model ids to the provider that serves them. A request for an
//! unregistered model resolves to the configured default model instead of
//! failing; the resolution reports that it fell back.

use std::collections::HashMap;
use std::sync::Arc;

use sihah_types::llm::LlmError;

use super::box_provider::BoxLlmProvider;

/// Outcome of resolving a model id.
#[derive(Debug, Clone)]
pub struct ResolvedModel {
    pub provider: Arc<BoxLlmProvider>,
    /// Model id that will actually be sent to the provider.
    pub model: String,
    /// True when the requested id was unknown and the default was used.
    pub fell_back: bool,
}

/// Registry of chat providers indexed by the model ids they serve.
pub struct ModelRegistry {
    models: HashMap<String, Arc<BoxLlmProvider>>,
    default_model: String,
}

impl ModelRegistry {
    /// Create an empty registry with the given default model id.
    pub fn new(default_model: impl Into<String>) -> Self {
        Self {
            models: HashMap::new(),
            default_model: default_model.into(),
        }
    }

    /// Register a provider for each of `model_ids`.
    ///
    /// A model id registered twice is served by the later provider.
    pub fn register(
        &mut self,
        provider: BoxLlmProvider,
        model_ids: impl IntoIterator<Item = impl Into<String>>,
    ) {
        let provider = Arc::new(provider);
        for id in model_ids {
            self.models.insert(id.into(), Arc::clone(&provider));
        }
    }

    pub fn default_model(&self) -> &str {
        &self.default_model
    }

    pub fn contains(&self, model: &str) -> bool {
        self.models.contains_key(model)
    }

    /// List all registered model ids, sorted.
    pub fn list_models(&self) -> Vec<&str> {
        let mut ids: Vec<&str> = self.models.keys().map(|s| s.as_str()).collect();
        ids.sort_unstable();
        ids
    }

    /// Resolve `model` to a provider, falling back to the default model.
    ///
    /// Fails with `NoProvider` only when neither the requested model nor the
    /// default model is registered.
    pub fn resolve(&self, model: &str) -> Result<ResolvedModel, LlmError> {
        if let Some(provider) = self.models.get(model) {
            return Ok(ResolvedModel {
                provider: Arc::clone(provider),
                model: model.to_string(),
                fell_back: false,
            });
        }
        match self.models.get(&self.default_model) {
            Some(provider) => Ok(ResolvedModel {
                provider: Arc::clone(provider),
                model: self.default_model.clone(),
                fell_back: true,
            }),
            None => Err(LlmError::NoProvider(model.to_string())),
        }
    }
}

impl std::fmt::Debug for ModelRegistry {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ModelRegistry")
            .field("models", &self.list_models())
            .field("default_model", &self.default_model)
            .finish()
    }
}
