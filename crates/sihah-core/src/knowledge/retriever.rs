//! Context retrieval for a turn: embed the query, search the agent's
//! partition of the vector index.

use std::sync::Arc;

use sihah_types::error::RetrievalError;
use sihah_types::knowledge::{ContextChunk, VectorFilter};
use tracing::debug;
use uuid::Uuid;

use super::box_embedder::BoxEmbedder;
use super::box_index::BoxVectorIndex;

/// Retrieves ranked context chunks for a query.
#[derive(Debug, Clone)]
pub struct ContextRetriever {
    embedder: Arc<BoxEmbedder>,
    index: Arc<BoxVectorIndex>,
}

impl ContextRetriever {
    pub fn new(embedder: Arc<BoxEmbedder>, index: Arc<BoxVectorIndex>) -> Self {
        Self { embedder, index }
    }

    /// Top-`k` chunks for `query` from `agent_id`'s knowledge only.
    ///
    /// A blank query or `k == 0` returns an empty list without calling the
    /// embedder.
    pub async fn retrieve(
        &self,
        agent_id: Uuid,
        query: &str,
        k: usize,
    ) -> Result<Vec<ContextChunk>, RetrievalError> {
        if k == 0 || query.trim().is_empty() {
            return Ok(Vec::new());
        }

        let embedding = self.embedder.embed_one(query).await?;
        let hits = self
            .index
            .search(&embedding, k, &VectorFilter::agent(agent_id))
            .await?;

        debug!(
            agent_id = %agent_id,
            k,
            hits = hits.len(),
            top_score = hits.first().map(|h| h.score),
            "Retrieved context"
        );

        Ok(hits.into_iter().map(ContextChunk::from).collect())
    }
}
