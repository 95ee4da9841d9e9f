//! Agent knowledge base: embeddings, the vector index, retrieval, and
//! document indexing.
//!
//! - `Embedder` / `BoxEmbedder`: text to vectors
//! - `VectorIndex` / `BoxVectorIndex`: agent-scoped nearest-neighbour store
//! - `InMemoryVectorIndex`: exact cosine search, used for tests and local runs
//! - `ContextRetriever`: query embedding plus top-k search
//! - `DocumentIndexer`: chunk, embed, and replace a document's points

pub mod box_embedder;
pub mod box_index;
pub mod chunker;
pub mod embedder;
pub mod index;
pub mod indexer;
pub mod memory_index;
pub mod retriever;
