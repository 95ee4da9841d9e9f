//! Shared domain types for Sihah.
//!
//! This crate contains the types that flow through the conversation turn
//! pipeline: conversations and messages, text analysis, knowledge chunks,
//! LLM requests, events, configuration, and their error types.
//!
//! Zero infrastructure dependencies -- only serde, uuid, chrono, thiserror.

pub mod agent;
pub mod analysis;
pub mod chat;
pub mod config;
pub mod error;
pub mod event;
pub mod ingest;
pub mod knowledge;
pub mod llm;
pub mod turn;
