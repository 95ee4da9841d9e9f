//! Knowledge base infrastructure.
//!
//! Provides the LanceDB vector index and an OpenAI-compatible embedding
//! client. The Arrow schema defines the knowledge table.

pub mod embedder;
pub mod lance;
pub mod schema;
