//! Exact in-memory vector index.
//!
//! Brute-force cosine similarity over every point in the agent's partition.
//! Suitable for tests and small local knowledge bases.

use std::collections::HashMap;

use sihah_types::error::RetrievalError;
use sihah_types::knowledge::{SearchHit, VectorFilter, VectorPoint};
use tokio::sync::RwLock;
use uuid::Uuid;

use super::index::{VectorIndex, rank_hits};

/// Cosine similarity of two equal-length vectors. Zero vectors score 0.
pub fn cosine_similarity(a: &[f32], b: &[f32]) -> f32 {
    let mut dot = 0.0f32;
    let mut na = 0.0f32;
    let mut nb = 0.0f32;
    for (x, y) in a.iter().zip(b) {
        dot += x * y;
        na += x * x;
        nb += y * y;
    }
    if na == 0.0 || nb == 0.0 {
        return 0.0;
    }
    dot / (na.sqrt() * nb.sqrt())
}

/// In-memory [`VectorIndex`] keyed by `(agent_id, point_id)`.
#[derive(Debug)]
pub struct InMemoryVectorIndex {
    dimension: usize,
    points: RwLock<HashMap<(Uuid, String), VectorPoint>>,
}

impl InMemoryVectorIndex {
    pub fn new(dimension: usize) -> Self {
        Self {
            dimension,
            points: RwLock::new(HashMap::new()),
        }
    }

    fn check_dimension(&self, len: usize) -> Result<(), RetrievalError> {
        if len != self.dimension {
            return Err(RetrievalError::DimensionMismatch {
                expected: self.dimension,
                actual: len,
            });
        }
        Ok(())
    }
}

fn matches(point: &VectorPoint, filter: &VectorFilter) -> bool {
    point.agent_id == filter.agent_id
        && filter
            .document_id
            .as_deref()
            .is_none_or(|doc| doc == point.document_id)
}

impl VectorIndex for InMemoryVectorIndex {
    async fn upsert(&self, points: &[VectorPoint]) -> Result<(), RetrievalError> {
        for p in points {
            self.check_dimension(p.embedding.len())?;
        }
        let mut guard = self.points.write().await;
        for p in points {
            guard.insert((p.agent_id, p.id.clone()), p.clone());
        }
        Ok(())
    }

    async fn search(
        &self,
        query: &[f32],
        k: usize,
        filter: &VectorFilter,
    ) -> Result<Vec<SearchHit>, RetrievalError> {
        self.check_dimension(query.len())?;
        if k == 0 {
            return Ok(Vec::new());
        }
        let guard = self.points.read().await;
        let mut hits: Vec<SearchHit> = guard
            .values()
            .filter(|p| matches(p, filter))
            .map(|p| SearchHit {
                point_id: p.id.clone(),
                document_id: p.document_id.clone(),
                text: p.text.clone(),
                score: cosine_similarity(query, &p.embedding),
                metadata: p.metadata.clone(),
            })
            .collect();
        rank_hits(&mut hits);
        hits.truncate(k);
        Ok(hits)
    }

    async fn delete(&self, filter: &VectorFilter) -> Result<u64, RetrievalError> {
        let mut guard = self.points.write().await;
        let before = guard.len();
        guard.retain(|_, p| !matches(p, filter));
        Ok((before - guard.len()) as u64)
    }

    async fn count(&self, filter: &VectorFilter) -> Result<u64, RetrievalError> {
        let guard = self.points.read().await;
        Ok(guard.values().filter(|p| matches(p, filter)).count() as u64)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use sihah_types::chat::Metadata;

    fn point(agent: Uuid, doc: &str, idx: u32, v: [f32; 3]) -> VectorPoint {
        VectorPoint {
            id: VectorPoint::point_id(doc, idx),
            agent_id: agent,
            document_id: doc.into(),
            chunk_index: idx,
            text: format!("{doc}-{idx}"),
            embedding: v.to_vec(),
            metadata: Metadata::new(),
        }
    }

    #[test]
    fn cosine_basics() {
        assert!((cosine_similarity(&[1.0, 0.0], &[1.0, 0.0]) - 1.0).abs() < 1e-6);
        assert!(cosine_similarity(&[1.0, 0.0], &[0.0, 1.0]).abs() < 1e-6);
        assert_eq!(cosine_similarity(&[0.0, 0.0], &[1.0, 0.0]), 0.0);
    }

    #[tokio::test]
    async fn search_is_scoped_to_agent() {
        let index = InMemoryVectorIndex::new(3);
        let a = Uuid::now_v7();
        let b = Uuid::now_v7();
        index
            .upsert(&[
                point(a, "doc-a", 0, [1.0, 0.0, 0.0]),
                point(b, "doc-b", 0, [1.0, 0.0, 0.0]),
            ])
            .await
            .unwrap();

        let hits = index
            .search(&[1.0, 0.0, 0.0], 10, &VectorFilter::agent(a))
            .await
            .unwrap();
        assert_eq!(hits.len(), 1);
        assert_eq!(hits[0].document_id, "doc-a");
    }

    #[tokio::test]
    async fn empty_partition_returns_empty() {
        let index = InMemoryVectorIndex::new(3);
        let hits = index
            .search(&[1.0, 0.0, 0.0], 5, &VectorFilter::agent(Uuid::now_v7()))
            .await
            .unwrap();
        assert!(hits.is_empty());
    }

    #[tokio::test]
    async fn ranks_by_score_and_truncates() {
        let index = InMemoryVectorIndex::new(3);
        let a = Uuid::now_v7();
        index
            .upsert(&[
                point(a, "far", 0, [0.0, 1.0, 0.0]),
                point(a, "near", 0, [1.0, 0.1, 0.0]),
                point(a, "exact", 0, [1.0, 0.0, 0.0]),
            ])
            .await
            .unwrap();
        let hits = index
            .search(&[1.0, 0.0, 0.0], 2, &VectorFilter::agent(a))
            .await
            .unwrap();
        let docs: Vec<&str> = hits.iter().map(|h| h.document_id.as_str()).collect();
        assert_eq!(docs, vec!["exact", "near"]);
    }

    #[tokio::test]
    async fn upsert_replaces_same_point_id() {
        let index = InMemoryVectorIndex::new(3);
        let a = Uuid::now_v7();
        index.upsert(&[point(a, "d", 0, [1.0, 0.0, 0.0])]).await.unwrap();
        index.upsert(&[point(a, "d", 0, [0.0, 1.0, 0.0])]).await.unwrap();
        assert_eq!(index.count(&VectorFilter::agent(a)).await.unwrap(), 1);
    }

    #[tokio::test]
    async fn delete_by_document() {
        let index = InMemoryVectorIndex::new(3);
        let a = Uuid::now_v7();
        index
            .upsert(&[
                point(a, "keep", 0, [1.0, 0.0, 0.0]),
                point(a, "drop", 0, [1.0, 0.0, 0.0]),
                point(a, "drop", 1, [1.0, 0.0, 0.0]),
            ])
            .await
            .unwrap();
        let removed = index.delete(&VectorFilter::document(a, "drop")).await.unwrap();
        assert_eq!(removed, 2);
        assert_eq!(index.count(&VectorFilter::agent(a)).await.unwrap(), 1);
    }

    #[tokio::test]
    async fn rejects_wrong_dimension() {
        let index = InMemoryVectorIndex::new(4);
        let err = index
            .search(&[1.0, 0.0], 1, &VectorFilter::agent(Uuid::now_v7()))
            .await
            .unwrap_err();
        assert!(matches!(err, RetrievalError::DimensionMismatch { expected: 4, actual: 2 }));
    }
}
