//! Chat model abstractions for Sihah.
//!
//! - `LlmProvider`: RPITIT trait for concrete provider implementations
//! - `BoxLlmProvider`: Object-safe wrapper for dynamic dispatch
//! - `ModelRegistry`: model id to provider lookup with a default fallback
//! - `ModelInvoker`: one instrumented attempt against the resolved provider
//! - `RetryPolicy`: bounded exponential backoff applied by the orchestrator

pub mod box_provider;
pub mod invoker;
pub mod provider;
pub mod registry;
pub mod retry;
