//! LanceDB-backed knowledge index.
//!
//! Implements `VectorIndex` from `sihah-core` on one LanceDB table shared by
//! all agents. Every read and delete carries an `agent_id` predicate, so one
//! agent's chunks never surface in another agent's search.
//!
//! Search uses cosine distance; the `_distance` column LanceDB appends is
//! converted back to a similarity score (`1 - distance`).

use std::path::PathBuf;
use std::sync::Arc;

use arrow_array::{
    Array, FixedSizeListArray, Float32Array, Int32Array, RecordBatch, RecordBatchIterator,
    StringArray,
};
use arrow_schema::{DataType, Field};
use futures_util::TryStreamExt;
use lancedb::query::{ExecutableQuery, QueryBase};
use sihah_core::knowledge::index::{VectorIndex, rank_hits};
use sihah_types::chat::Metadata;
use sihah_types::error::RetrievalError;
use sihah_types::knowledge::{SearchHit, VectorFilter, VectorPoint};

use super::schema::{KNOWLEDGE_TABLE, knowledge_schema};

/// Agent-scoped vector index stored in a LanceDB directory.
pub struct LanceVectorIndex {
    db: lancedb::Connection,
    base_path: PathBuf,
    dimension: usize,
}

impl LanceVectorIndex {
    /// Open or create a LanceDB store at `base_path`.
    ///
    /// Creates the directory if it does not exist. `dimension` must match
    /// the embedding model; mismatched vectors are rejected on write and
    /// on search.
    pub async fn open(base_path: PathBuf, dimension: usize) -> Result<Self, RetrievalError> {
        std::fs::create_dir_all(&base_path).map_err(|e| {
            RetrievalError::Index(format!(
                "failed to create {}: {e}",
                base_path.display()
            ))
        })?;

        let uri = base_path.to_str().ok_or_else(|| {
            RetrievalError::Index(format!(
                "path contains invalid UTF-8: {}",
                base_path.display()
            ))
        })?;

        let db = lancedb::connect(uri).execute().await.map_err(index_err)?;

        Ok(Self {
            db,
            base_path,
            dimension,
        })
    }

    pub fn base_path(&self) -> &PathBuf {
        &self.base_path
    }

    pub fn dimension(&self) -> usize {
        self.dimension
    }

    /// Open the knowledge table, creating it empty on first use.
    async fn table(&self) -> Result<lancedb::Table, RetrievalError> {
        match self.db.open_table(KNOWLEDGE_TABLE).execute().await {
            Ok(table) => Ok(table),
            Err(lancedb::Error::TableNotFound { .. }) => {
                let schema = Arc::new(knowledge_schema(self.dimension as i32));
                self.db
                    .create_empty_table(KNOWLEDGE_TABLE, schema)
                    .execute()
                    .await
                    .map_err(index_err)
            }
            Err(e) => Err(index_err(e)),
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

    /// Build one Arrow batch from `points`.
    fn build_record_batch(&self, points: &[VectorPoint]) -> Result<RecordBatch, RetrievalError> {
        let schema = Arc::new(knowledge_schema(self.dimension as i32));

        let ids = StringArray::from_iter_values(points.iter().map(|p| p.id.as_str()));
        let agents =
            StringArray::from_iter_values(points.iter().map(|p| p.agent_id.to_string()));
        let documents =
            StringArray::from_iter_values(points.iter().map(|p| p.document_id.as_str()));
        let chunk_indexes =
            Int32Array::from_iter_values(points.iter().map(|p| p.chunk_index as i32));
        let texts = StringArray::from_iter_values(points.iter().map(|p| p.text.as_str()));
        let mut metadata = Vec::with_capacity(points.len());
        for p in points {
            metadata.push(
                serde_json::to_string(&p.metadata)
                    .map_err(|e| RetrievalError::Index(format!("unserializable metadata: {e}")))?,
            );
        }
        let metadata = StringArray::from(metadata);

        let values = Float32Array::from_iter_values(
            points.iter().flat_map(|p| p.embedding.iter().copied()),
        );
        let field = Arc::new(Field::new("item", DataType::Float32, true));
        let vectors =
            FixedSizeListArray::try_new(field, self.dimension as i32, Arc::new(values), None)
                .map_err(|e| RetrievalError::Index(format!("failed to build vectors: {e}")))?;

        RecordBatch::try_new(
            schema,
            vec![
                Arc::new(ids),
                Arc::new(agents),
                Arc::new(documents),
                Arc::new(chunk_indexes),
                Arc::new(texts),
                Arc::new(metadata),
                Arc::new(vectors),
            ],
        )
        .map_err(|e| RetrievalError::Index(format!("failed to build record batch: {e}")))
    }
}

fn index_err(e: lancedb::Error) -> RetrievalError {
    RetrievalError::Index(e.to_string())
}

/// Quote a string for a LanceDB SQL predicate.
fn sql_literal(value: &str) -> String {
    format!("'{}'", value.replace('\'', "''"))
}

/// SQL predicate equivalent to `filter`.
fn filter_predicate(filter: &VectorFilter) -> String {
    let mut predicate = format!("agent_id = {}", sql_literal(&filter.agent_id.to_string()));
    if let Some(doc) = &filter.document_id {
        predicate.push_str(&format!(" AND document_id = {}", sql_literal(doc)));
    }
    predicate
}

fn string_column<'a>(batch: &'a RecordBatch, name: &str) -> Result<&'a StringArray, RetrievalError> {
    batch
        .column_by_name(name)
        .and_then(|c| c.as_any().downcast_ref::<StringArray>())
        .ok_or_else(|| RetrievalError::Index(format!("missing string column '{name}'")))
}

/// Convert one result batch into search hits.
fn batch_to_hits(batch: &RecordBatch) -> Result<Vec<SearchHit>, RetrievalError> {
    let ids = string_column(batch, "id")?;
    let documents = string_column(batch, "document_id")?;
    let texts = string_column(batch, "text")?;
    let metadata = string_column(batch, "metadata")?;
    let distances = batch
        .column_by_name("_distance")
        .and_then(|c| c.as_any().downcast_ref::<Float32Array>());

    let mut hits = Vec::with_capacity(batch.num_rows());
    for i in 0..batch.num_rows() {
        let distance = distances.map_or(0.0, |d| d.value(i));
        let metadata: Metadata = if metadata.is_null(i) {
            Metadata::new()
        } else {
            serde_json::from_str(metadata.value(i)).unwrap_or_default()
        };
        hits.push(SearchHit {
            point_id: ids.value(i).to_string(),
            document_id: documents.value(i).to_string(),
            text: texts.value(i).to_string(),
            score: 1.0 - distance,
            metadata,
        });
    }
    Ok(hits)
}

impl VectorIndex for LanceVectorIndex {
    async fn upsert(&self, points: &[VectorPoint]) -> Result<(), RetrievalError> {
        if points.is_empty() {
            return Ok(());
        }
        for p in points {
            self.check_dimension(p.embedding.len())?;
        }
        let table = self.table().await?;

        // Replace by id within each agent's partition, then append.
        let replaced: Vec<String> = points
            .iter()
            .map(|p| {
                format!(
                    "(agent_id = {} AND id = {})",
                    sql_literal(&p.agent_id.to_string()),
                    sql_literal(&p.id)
                )
            })
            .collect();
        table
            .delete(&replaced.join(" OR "))
            .await
            .map_err(index_err)?;

        let batch = self.build_record_batch(points)?;
        let schema = batch.schema();
        let reader = RecordBatchIterator::new(vec![Ok(batch)], schema);
        table.add(reader).execute().await.map_err(index_err)?;

        tracing::debug!(points = points.len(), "upserted knowledge points");
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
        let table = self.table().await?;

        let results = table
            .vector_search(query)
            .map_err(index_err)?
            .distance_type(lancedb::DistanceType::Cosine)
            .only_if(filter_predicate(filter))
            .limit(k)
            .execute()
            .await
            .map_err(index_err)?;

        let batches: Vec<RecordBatch> = results.try_collect().await.map_err(index_err)?;

        let mut hits = Vec::new();
        for batch in &batches {
            if batch.num_rows() > 0 {
                hits.extend(batch_to_hits(batch)?);
            }
        }
        rank_hits(&mut hits);
        hits.truncate(k);
        Ok(hits)
    }

    async fn delete(&self, filter: &VectorFilter) -> Result<u64, RetrievalError> {
        let table = self.table().await?;
        let predicate = filter_predicate(filter);

        let count = table
            .count_rows(Some(predicate.clone()))
            .await
            .map_err(index_err)? as u64;
        if count > 0 {
            table.delete(&predicate).await.map_err(index_err)?;
        }
        Ok(count)
    }

    async fn count(&self, filter: &VectorFilter) -> Result<u64, RetrievalError> {
        let table = self.table().await?;
        let count = table
            .count_rows(Some(filter_predicate(filter)))
            .await
            .map_err(index_err)?;
        Ok(count as u64)
    }
}
