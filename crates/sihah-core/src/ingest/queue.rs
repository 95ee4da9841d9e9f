//! WorkQueue trait definition.

use std::time::Duration;

use sihah_types::error::{IngestError, RepositoryError};
use sihah_types::ingest::{IngestJob, IngestJobStatus, IngestOperation};
use sihah_types::knowledge::KnowledgeDocument;
use uuid::Uuid;

/// Durable queue of ingestion jobs.
///
/// Implementations live in sihah-infra (e.g., `SqliteWorkQueue`).
/// Uses native async fn in traits (RPITIT, Rust 2024 edition).
///
/// A claimed job that is neither acknowledged nor failed within the
/// visibility timeout becomes claimable again, so a crashed worker's job is
/// redelivered.
pub trait WorkQueue: Send + Sync {
    /// Add a job in the `Queued` state.
    fn enqueue(
        &self,
        operation: IngestOperation,
    ) -> impl std::future::Future<Output = Result<IngestJob, RepositoryError>> + Send;

    /// Claim the oldest available job: queued, or running with an expired
    /// claim. Marks it `Running` and increments `attempts`.
    fn claim(
        &self,
        visibility_timeout: Duration,
    ) -> impl std::future::Future<Output = Result<Option<IngestJob>, RepositoryError>> + Send;

    /// Mark a claimed job `Done`.
    fn ack(
        &self,
        job_id: &Uuid,
    ) -> impl std::future::Future<Output = Result<(), RepositoryError>> + Send;

    /// Record a failure. The job goes back to `Queued`, or to `Failed` once
    /// `attempts >= max_attempts`. Returns the resulting status.
    fn fail(
        &self,
        job_id: &Uuid,
        error: &str,
        max_attempts: u32,
    ) -> impl std::future::Future<Output = Result<IngestJobStatus, RepositoryError>> + Send;

    fn get_job(
        &self,
        job_id: &Uuid,
    ) -> impl std::future::Future<Output = Result<Option<IngestJob>, RepositoryError>> + Send;
}

/// Queue a document for (re)indexing. Blank documents are rejected up front.
pub async fn submit_document<Q: WorkQueue>(
    queue: &Q,
    document: KnowledgeDocument,
) -> Result<IngestJob, IngestError> {
    if document.text.trim().is_empty() {
        return Err(IngestError::EmptyDocument(document.document_id));
    }
    if document.document_id.trim().is_empty() {
        return Err(IngestError::Payload("document id is empty".to_string()));
    }
    Ok(queue.enqueue(IngestOperation::Upsert { document }).await?)
}

/// Queue removal of a document's chunks.
pub async fn submit_delete<Q: WorkQueue>(
    queue: &Q,
    agent_id: Uuid,
    document_id: &str,
) -> Result<IngestJob, IngestError> {
    if document_id.trim().is_empty() {
        return Err(IngestError::Payload("document id is empty".to_string()));
    }
    Ok(queue
        .enqueue(IngestOperation::Delete {
            agent_id,
            document_id: document_id.to_string(),
        })
        .await?)
}
