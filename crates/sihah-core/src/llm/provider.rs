//! LlmProvider trait definition.
//!
//! This is the core abstraction that all chat-completion providers
//! implement. Uses RPITIT for `complete`.

use sihah_types::llm::{CompletionRequest, CompletionResponse, LlmError, ProviderCapabilities};

/// Trait for chat-completion backends (OpenAI-compatible servers, mocks).
///
/// Uses native async fn in traits (RPITIT, Rust 2024 edition). Providers
/// make exactly one request per call: retries belong to the caller.
///
/// Implementations live in sihah-infra (e.g., `OpenAiCompatibleProvider`).
pub trait LlmProvider: Send + Sync {
    /// Human-readable provider name (e.g., "openai", "ollama").
    fn name(&self) -> &str;

    /// Context and output limits.
    fn capabilities(&self) -> &ProviderCapabilities;

    /// Send a completion request and receive the full response.
    fn complete(
        &self,
        request: &CompletionRequest,
    ) -> impl std::future::Future<Output = Result<CompletionResponse, LlmError>> + Send;
}
