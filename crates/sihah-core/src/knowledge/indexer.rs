//! Document indexing: chunk, embed, and replace a document's points.
//!
//! Re-indexing a document first deletes every point it previously had, then
//! upserts the new chunks under deterministic ids. Running the same job
//! twice leaves the index in the same state as running it once.

use std::sync::Arc;

use sihah_types::error::{IngestError, RetrievalError};
use sihah_types::knowledge::{KnowledgeDocument, VectorFilter, VectorPoint};
use tracing::{debug, info};
use uuid::Uuid;

use super::box_embedder::BoxEmbedder;
use super::box_index::BoxVectorIndex;
use super::chunker::chunk_text;

/// Texts sent to the embedder per request.
const EMBED_BATCH: usize = 32;

/// Writes documents into an agent's knowledge partition.
#[derive(Debug, Clone)]
pub struct DocumentIndexer {
    embedder: Arc<BoxEmbedder>,
    index: Arc<BoxVectorIndex>,
    chunk_chars: usize,
}

impl DocumentIndexer {
    pub fn new(embedder: Arc<BoxEmbedder>, index: Arc<BoxVectorIndex>, chunk_chars: usize) -> Self {
        Self {
            embedder,
            index,
            chunk_chars,
        }
    }

    /// Chunk, embed, and store `doc`, replacing any earlier version.
    ///
    /// Returns the number of chunks written. Embedding happens before the
    /// old points are deleted, so an embedding failure leaves the previous
    /// version searchable.
    pub async fn index_document(&self, doc: &KnowledgeDocument) -> Result<usize, IngestError> {
        let chunks = chunk_text(&doc.text, self.chunk_chars);
        if chunks.is_empty() {
            return Err(IngestError::EmptyDocument(doc.document_id.clone()));
        }

        let mut embeddings = Vec::with_capacity(chunks.len());
        for batch in chunks.chunks(EMBED_BATCH) {
            let vectors = self.embedder.embed(batch).await?;
            if vectors.len() != batch.len() {
                return Err(RetrievalError::Embedding(format!(
                    "expected {} vectors, got {}",
                    batch.len(),
                    vectors.len()
                ))
                .into());
            }
            embeddings.extend(vectors);
        }

        let points: Vec<VectorPoint> = chunks
            .into_iter()
            .zip(embeddings)
            .enumerate()
            .map(|(i, (text, embedding))| {
                let chunk_index = i as u32;
                let mut metadata = doc.metadata.clone();
                metadata.insert("chunk_index".to_string(), chunk_index.into());
                VectorPoint {
                    id: VectorPoint::point_id(&doc.document_id, chunk_index),
                    agent_id: doc.agent_id,
                    document_id: doc.document_id.clone(),
                    chunk_index,
                    text,
                    embedding,
                    metadata,
                }
            })
            .collect();

        let filter = VectorFilter::document(doc.agent_id, doc.document_id.clone());
        let removed = self.index.delete(&filter).await?;
        self.index.upsert(&points).await?;

        info!(
            agent_id = %doc.agent_id,
            document_id = %doc.document_id,
            chunks = points.len(),
            replaced = removed,
            "Indexed document"
        );
        Ok(points.len())
    }

    /// Remove every chunk of a document. Returns the number removed.
    pub async fn delete_document(&self, agent_id: Uuid, document_id: &str) -> Result<u64, IngestError> {
        let removed = self
            .index
            .delete(&VectorFilter::document(agent_id, document_id))
            .await?;
        debug!(agent_id = %agent_id, document_id, removed, "Deleted document chunks");
        Ok(removed)
    }

    /// Count chunks for an agent, or for one of its documents.
    pub async fn count_chunks(&self, agent_id: Uuid, document_id: Option<&str>) -> Result<u64, IngestError> {
        let filter = match document_id {
            Some(doc) => VectorFilter::document(agent_id, doc),
            None => VectorFilter::agent(agent_id),
        };
        Ok(self.index.count(&filter).await?)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::knowledge::memory_index::InMemoryVectorIndex;
    use crate::test_support::{HashEmbedder, document};

    fn indexer(chunk_chars: usize) -> DocumentIndexer {
        DocumentIndexer::new(
            Arc::new(BoxEmbedder::new(HashEmbedder::new(16))),
            Arc::new(BoxVectorIndex::new(InMemoryVectorIndex::new(16))),
            chunk_chars,
        )
    }

    #[tokio::test]
    async fn reindexing_is_idempotent() {
        let idx = indexer(40);
        let agent = Uuid::now_v7();
        let doc = document(agent, "faq", &"שאלה ותשובה על משלוחים. ".repeat(10));

        let first = idx.index_document(&doc).await.unwrap();
        let second = idx.index_document(&doc).await.unwrap();
        assert_eq!(first, second);
        assert_eq!(
            idx.count_chunks(agent, Some("faq")).await.unwrap(),
            first as u64
        );
    }

    #[tokio::test]
    async fn shrinking_document_drops_stale_chunks() {
        let idx = indexer(40);
        let agent = Uuid::now_v7();
        let long = document(agent, "faq", &"פסקה ארוכה מאוד על החזרות. ".repeat(10));
        idx.index_document(&long).await.unwrap();

        let short = document(agent, "faq", "קצר");
        assert_eq!(idx.index_document(&short).await.unwrap(), 1);
        assert_eq!(idx.count_chunks(agent, Some("faq")).await.unwrap(), 1);
    }

    #[tokio::test]
    async fn empty_document_rejected() {
        let idx = indexer(40);
        let err = idx
            .index_document(&document(Uuid::now_v7(), "blank", "   "))
            .await
            .unwrap_err();
        assert!(matches!(err, IngestError::EmptyDocument(d) if d == "blank"));
    }

    #[tokio::test]
    async fn delete_document_removes_only_that_document() {
        let idx = indexer(512);
        let agent = Uuid::now_v7();
        idx.index_document(&document(agent, "a", "ראשון")).await.unwrap();
        idx.index_document(&document(agent, "b", "שני")).await.unwrap();

        assert_eq!(idx.delete_document(agent, "a").await.unwrap(), 1);
        assert_eq!(idx.count_chunks(agent, None).await.unwrap(), 1);
        assert_eq!(idx.count_chunks(agent, Some("b")).await.unwrap(), 1);
    }
}
