//! Conversation and message persistence abstractions.
//!
//! `ConversationRepository` is the store port the orchestrator writes
//! through; sihah-infra implements it on SQLite.
//! `InMemoryConversationRepository` backs tests and local experiments.

pub mod memory;
pub mod repository;
