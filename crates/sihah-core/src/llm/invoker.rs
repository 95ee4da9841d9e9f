//! Model invocation: one instrumented completion attempt.
//!
//! The invoker resolves the model through the registry and makes exactly
//! one provider call. It never retries; the orchestrator owns the retry
//! loop so retries stay visible and bounded by the turn deadline.

use std::sync::Arc;

use sihah_types::llm::{CompletionRequest, CompletionResponse, LlmError, Message};
use tracing::{Instrument, debug, info_span};

use super::registry::ModelRegistry;

/// Sampling parameters for one invocation.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct InvocationParams {
    pub temperature: f64,
    pub max_tokens: u32,
}

/// A successful invocation.
#[derive(Debug, Clone)]
pub struct Invocation {
    pub response: CompletionResponse,
    /// Model id that served the request.
    pub model: String,
    pub provider: String,
    pub fell_back: bool,
}

/// Invokes chat models through a shared [`ModelRegistry`].
#[derive(Debug, Clone)]
pub struct ModelInvoker {
    registry: Arc<ModelRegistry>,
}

impl ModelInvoker {
    pub fn new(registry: Arc<ModelRegistry>) -> Self {
        Self { registry }
    }

    pub fn registry(&self) -> &ModelRegistry {
        &self.registry
    }

    /// Send `messages` to `model_id` (or the default model) once.
    ///
    /// An empty or whitespace-only reply is reported as a retryable
    /// provider error.
    pub async fn invoke(
        &self,
        model_id: &str,
        messages: Vec<Message>,
        params: InvocationParams,
    ) -> Result<Invocation, LlmError> {
        let resolved = self.registry.resolve(model_id)?;
        if resolved.fell_back {
            debug!(
                requested = model_id,
                model = %resolved.model,
                "Unknown model, using default"
            );
        }

        let request = CompletionRequest {
            model: resolved.model.clone(),
            messages,
            max_tokens: params.max_tokens,
            temperature: Some(params.temperature),
        };

        let span = info_span!(
            "gen_ai.chat",
            gen_ai.system = resolved.provider.name(),
            gen_ai.request.model = %request.model,
            gen_ai.request.max_tokens = request.max_tokens,
            gen_ai.request.temperature = ?request.temperature,
            gen_ai.usage.input_tokens = tracing::field::Empty,
            gen_ai.usage.output_tokens = tracing::field::Empty,
        );

        let response = resolved
            .provider
            .complete(&request)
            .instrument(span.clone())
            .await?;

        span.record("gen_ai.usage.input_tokens", response.usage.input_tokens);
        span.record("gen_ai.usage.output_tokens", response.usage.output_tokens);

        if response.content.trim().is_empty() {
            return Err(LlmError::Provider {
                message: "provider returned an empty completion".to_string(),
            });
        }

        Ok(Invocation {
            response,
            model: resolved.model,
            provider: resolved.provider.name().to_string(),
            fell_back: resolved.fell_back,
        })
    }
}
