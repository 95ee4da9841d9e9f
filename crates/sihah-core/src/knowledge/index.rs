//! Vector index trait.
//!
//! Every read and delete is scoped to one agent through [`VectorFilter`];
//! there is no unscoped query. Implementations live in sihah-infra
//! (LanceDB) and in [`super::memory_index`].

use sihah_types::error::RetrievalError;
use sihah_types::knowledge::{SearchHit, VectorFilter, VectorPoint};

/// Agent-scoped nearest-neighbour store.
///
/// Uses RPITIT (native async fn in traits, Rust 2024 edition).
pub trait VectorIndex: Send + Sync {
    /// Insert or replace points by id.
    fn upsert(
        &self,
        points: &[VectorPoint],
    ) -> impl std::future::Future<Output = Result<(), RetrievalError>> + Send;

    /// Top-`k` points by cosine similarity within `filter`.
    ///
    /// Results are ordered by descending score, ties broken by document id
    /// then point id. An empty partition yields an empty list.
    fn search(
        &self,
        query: &[f32],
        k: usize,
        filter: &VectorFilter,
    ) -> impl std::future::Future<Output = Result<Vec<SearchHit>, RetrievalError>> + Send;

    /// Delete every point matching `filter`. Returns the number removed.
    fn delete(
        &self,
        filter: &VectorFilter,
    ) -> impl std::future::Future<Output = Result<u64, RetrievalError>> + Send;

    /// Count points matching `filter`.
    fn count(
        &self,
        filter: &VectorFilter,
    ) -> impl std::future::Future<Output = Result<u64, RetrievalError>> + Send;
}

/// Sort hits into the canonical ranking order.
pub fn rank_hits(hits: &mut [SearchHit]) {
    hits.sort_by(|a, b| {
        b.score
            .total_cmp(&a.score)
            .then_with(|| a.document_id.cmp(&b.document_id))
            .then_with(|| a.point_id.cmp(&b.point_id))
    });
}

#[cfg(test)]
mod tests {
    use super::*;
    use sihah_types::chat::Metadata;

    fn hit(point: &str, doc: &str, score: f32) -> SearchHit {
        SearchHit {
            point_id: point.into(),
            document_id: doc.into(),
            text: String::new(),
            score,
            metadata: Metadata::new(),
        }
    }

    #[test]
    fn ties_break_by_document_then_point() {
        let mut hits = vec![
            hit("b#1", "b", 0.5),
            hit("a#2", "a", 0.5),
            hit("c#0", "c", 0.9),
            hit("a#1", "a", 0.5),
        ];
        rank_hits(&mut hits);
        let ids: Vec<&str> = hits.iter().map(|h| h.point_id.as_str()).collect();
        assert_eq!(ids, vec!["c#0", "a#1", "a#2", "b#1"]);
    }
}
