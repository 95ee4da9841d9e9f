//! Arrow schema for the LanceDB knowledge table.
//!
//! The vector width is fixed per table and comes from the configured
//! embedding model, so the schema is built at runtime.
//!
//! Arrow versions MUST match lancedb's transitive dependency (57.3 for lancedb 0.26).

use std::sync::Arc;

use arrow_schema::{DataType, Field, Schema};

/// Name of the single table holding every agent's knowledge chunks.
pub const KNOWLEDGE_TABLE: &str = "knowledge_chunks";

/// Schema for the knowledge chunk table.
///
/// `agent_id` partitions the table; every query filters on it.
/// `metadata` is the chunk's JSON metadata object.
pub fn knowledge_schema(dimension: i32) -> Schema {
    Schema::new(vec![
        Field::new("id", DataType::Utf8, false),
        Field::new("agent_id", DataType::Utf8, false),
        Field::new("document_id", DataType::Utf8, false),
        Field::new("chunk_index", DataType::Int32, false),
        Field::new("text", DataType::Utf8, false),
        Field::new("metadata", DataType::Utf8, false),
        Field::new(
            "vector",
            DataType::FixedSizeList(
                Arc::new(Field::new("item", DataType::Float32, true)),
                dimension,
            ),
            false,
        ),
    ])
}
