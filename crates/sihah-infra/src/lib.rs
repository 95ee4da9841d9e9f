//! Infrastructure layer for Sihah.
//!
//! Contains implementations of the traits defined in `sihah-core`: SQLite
//! conversation storage and ingestion queue, the LanceDB knowledge index,
//! OpenAI-compatible chat and embedding clients, and the config loader.

pub mod config;
pub mod llm;
pub mod sqlite;
pub mod vector;
