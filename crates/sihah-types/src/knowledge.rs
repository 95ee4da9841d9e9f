//! Knowledge base types: indexed chunks, vector search hits, and retrieved
//! context handed to the prompt assembler.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::chat::Metadata;

/// A chunk of an agent document stored in the vector index.
///
/// Points are scoped to one agent. `id` is derived from
/// `(document_id, chunk_index)` so re-ingesting a document overwrites its
/// points rather than duplicating them.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct VectorPoint {
    pub id: String,
    pub agent_id: Uuid,
    pub document_id: String,
    pub chunk_index: u32,
    pub text: String,
    pub embedding: Vec<f32>,
    #[serde(default)]
    pub metadata: Metadata,
}

impl VectorPoint {
    /// Deterministic point id for a document chunk.
    pub fn point_id(document_id: &str, chunk_index: u32) -> String {
        format!("{document_id}#{chunk_index:05}")
    }
}

/// Mandatory scoping for every vector index read.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct VectorFilter {
    pub agent_id: Uuid,
    /// Restrict to a single document.
    pub document_id: Option<String>,
}

impl VectorFilter {
    pub fn agent(agent_id: Uuid) -> Self {
        Self {
            agent_id,
            document_id: None,
        }
    }

    pub fn document(agent_id: Uuid, document_id: impl Into<String>) -> Self {
        Self {
            agent_id,
            document_id: Some(document_id.into()),
        }
    }
}

/// One nearest-neighbour match from the vector index.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SearchHit {
    pub point_id: String,
    pub document_id: String,
    pub text: String,
    /// Cosine similarity, higher is closer.
    pub score: f32,
    #[serde(default)]
    pub metadata: Metadata,
}

/// A retrieved piece of context for one turn.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ContextChunk {
    pub text: String,
    pub document_id: String,
    pub score: f32,
    #[serde(default)]
    pub metadata: Metadata,
}

impl From<SearchHit> for ContextChunk {
    fn from(hit: SearchHit) -> Self {
        Self {
            text: hit.text,
            document_id: hit.document_id,
            score: hit.score,
            metadata: hit.metadata,
        }
    }
}

/// A source document submitted for ingestion into an agent's knowledge base.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct KnowledgeDocument {
    pub agent_id: Uuid,
    pub document_id: String,
    pub text: String,
    #[serde(default)]
    pub metadata: Metadata,
    pub submitted_at: DateTime<Utc>,
}
