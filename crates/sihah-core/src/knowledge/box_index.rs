//! BoxVectorIndex -- object-safe dynamic dispatch wrapper for VectorIndex.
//!
//! Same blanket-impl pattern as `BoxLlmProvider` and `BoxEmbedder`.

use std::future::Future;
use std::pin::Pin;

use sihah_types::error::RetrievalError;
use sihah_types::knowledge::{SearchHit, VectorFilter, VectorPoint};

use super::index::VectorIndex;

type BoxFuture<'a, T> = Pin<Box<dyn Future<Output = Result<T, RetrievalError>> + Send + 'a>>;

/// Object-safe version of [`VectorIndex`] with boxed futures.
pub trait VectorIndexDyn: Send + Sync {
    fn upsert_boxed<'a>(&'a self, points: &'a [VectorPoint]) -> BoxFuture<'a, ()>;

    fn search_boxed<'a>(
        &'a self,
        query: &'a [f32],
        k: usize,
        filter: &'a VectorFilter,
    ) -> BoxFuture<'a, Vec<SearchHit>>;

    fn delete_boxed<'a>(&'a self, filter: &'a VectorFilter) -> BoxFuture<'a, u64>;

    fn count_boxed<'a>(&'a self, filter: &'a VectorFilter) -> BoxFuture<'a, u64>;
}

impl<T: VectorIndex> VectorIndexDyn for T {
    fn upsert_boxed<'a>(&'a self, points: &'a [VectorPoint]) -> BoxFuture<'a, ()> {
        Box::pin(self.upsert(points))
    }

    fn search_boxed<'a>(
        &'a self,
        query: &'a [f32],
        k: usize,
        filter: &'a VectorFilter,
    ) -> BoxFuture<'a, Vec<SearchHit>> {
        Box::pin(self.search(query, k, filter))
    }

    fn delete_boxed<'a>(&'a self, filter: &'a VectorFilter) -> BoxFuture<'a, u64> {
        Box::pin(self.delete(filter))
    }

    fn count_boxed<'a>(&'a self, filter: &'a VectorFilter) -> BoxFuture<'a, u64> {
        Box::pin(self.count(filter))
    }
}

/// Type-erased vector index for runtime backend selection.
pub struct BoxVectorIndex {
    inner: Box<dyn VectorIndexDyn + Send + Sync>,
}

impl BoxVectorIndex {
    /// Wrap a concrete `VectorIndex` in a type-erased box.
    pub fn new<T: VectorIndex + 'static>(index: T) -> Self {
        Self {
            inner: Box::new(index),
        }
    }

    pub async fn upsert(&self, points: &[VectorPoint]) -> Result<(), RetrievalError> {
        self.inner.upsert_boxed(points).await
    }

    pub async fn search(
        &self,
        query: &[f32],
        k: usize,
        filter: &VectorFilter,
    ) -> Result<Vec<SearchHit>, RetrievalError> {
        self.inner.search_boxed(query, k, filter).await
    }

    pub async fn delete(&self, filter: &VectorFilter) -> Result<u64, RetrievalError> {
        self.inner.delete_boxed(filter).await
    }

    pub async fn count(&self, filter: &VectorFilter) -> Result<u64, RetrievalError> {
        self.inner.count_boxed(filter).await
    }
}

impl std::fmt::Debug for BoxVectorIndex {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("BoxVectorIndex").finish_non_exhaustive()
    }
}
