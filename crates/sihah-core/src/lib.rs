//! Turn pipeline logic and port trait definitions for Sihah.
//!
//! This crate defines the "ports" (repository, queue, index, embedding and
//! chat provider traits) that the infrastructure layer implements, plus the
//! pipeline that drives them. It depends only on `sihah-types` -- never on
//! `sihah-infra` or any database/IO crate.

pub mod chat;
pub mod event;
pub mod ingest;
pub mod knowledge;
pub mod llm;
pub mod prompt;
pub mod text;
pub mod turn;

#[cfg(test)]
mod test_support;
