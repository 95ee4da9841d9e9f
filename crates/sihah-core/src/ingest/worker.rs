//! Ingestion worker pool.
//!
//! Each worker loops: claim a job, run it through the [`DocumentIndexer`],
//! then ack or fail it. Transient failures are requeued until the job's
//! attempts are exhausted; permanent failures are dead-lettered at once.
//! Shutdown cancels the loops between jobs, so a job in progress finishes.

use std::sync::{Arc, Mutex, PoisonError};
use std::time::Duration;

use sihah_types::config::IngestConfig;
use sihah_types::error::IngestError;
use sihah_types::event::ConversationEvent;
use sihah_types::ingest::{IngestJob, IngestJobStatus, IngestOperation};
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};
use uuid::Uuid;

use crate::event::EventPublisher;
use crate::knowledge::indexer::DocumentIndexer;
use crate::turn::lifecycle::{Lifecycle, LifecycleState};

use super::queue::WorkQueue;

#[derive(Debug, Clone, PartialEq)]
pub struct IngestSettings {
    pub workers: usize,
    pub max_attempts: u32,
    pub poll_interval: Duration,
    pub visibility_timeout: Duration,
}

impl Default for IngestSettings {
    fn default() -> Self {
        Self::from(&IngestConfig::default())
    }
}

impl From<&IngestConfig> for IngestSettings {
    fn from(config: &IngestConfig) -> Self {
        Self {
            workers: config.workers.max(1),
            max_attempts: config.max_attempts.max(1),
            poll_interval: Duration::from_millis(config.poll_interval_ms.max(1)),
            visibility_timeout: Duration::from_secs(config.visibility_timeout_secs),
        }
    }
}

/// What happened to one claimed job.
#[derive(Debug, Clone, PartialEq)]
pub struct JobOutcome {
    pub job_id: Uuid,
    pub status: IngestJobStatus,
    /// Chunks written (upsert) or removed (delete).
    pub chunks: u64,
}

struct Shared<Q> {
    queue: Arc<Q>,
    indexer: Arc<DocumentIndexer>,
    events: Arc<dyn EventPublisher>,
    settings: IngestSettings,
}

fn is_permanent(err: &IngestError) -> bool {
    match err {
        IngestError::EmptyDocument(_) | IngestError::Payload(_) => true,
        IngestError::Retrieval(e) => !e.is_retryable(),
        IngestError::Queue(_) => false,
    }
}

impl<Q: WorkQueue> Shared<Q> {
    async fn process_next(&self) -> Result<Option<JobOutcome>, IngestError> {
        let Some(job) = self.queue.claim(self.settings.visibility_timeout).await? else {
            return Ok(None);
        };

        // Redelivered too often (e.g. workers crashing mid-job).
        if job.attempts > self.settings.max_attempts {
            let status = self
                .queue
                .fail(&job.id, "attempts exhausted", self.settings.max_attempts)
                .await?;
            warn!(job_id = %job.id, attempts = job.attempts, "Ingest job dead-lettered");
            return Ok(Some(JobOutcome {
                job_id: job.id,
                status,
                chunks: 0,
            }));
        }

        match self.execute(&job).await {
            Ok(chunks) => {
                self.queue.ack(&job.id).await?;
                Ok(Some(JobOutcome {
                    job_id: job.id,
                    status: IngestJobStatus::Done,
                    chunks,
                }))
            }
            Err(e) => {
                let max = if is_permanent(&e) {
                    0
                } else {
                    self.settings.max_attempts
                };
                let status = self.queue.fail(&job.id, &e.to_string(), max).await?;
                warn!(
                    job_id = %job.id,
                    document_id = job.operation.document_id(),
                    attempt = job.attempts,
                    %status,
                    error = %e,
                    "Ingest job failed"
                );
                Ok(Some(JobOutcome {
                    job_id: job.id,
                    status,
                    chunks: 0,
                }))
            }
        }
    }

    async fn execute(&self, job: &IngestJob) -> Result<u64, IngestError> {
        match &job.operation {
            IngestOperation::Upsert { document } => {
                let chunks = self.indexer.index_document(document).await?;
                info!(
                    agent_id = %document.agent_id,
                    document_id = %document.document_id,
                    chunks,
                    "Document ingested"
                );
                self.events.emit(ConversationEvent::DocumentIngested {
                    agent_id: document.agent_id,
                    document_id: document.document_id.clone(),
                    chunks,
                });
                Ok(chunks as u64)
            }
            IngestOperation::Delete {
                agent_id,
                document_id,
            } => {
                let removed = self.indexer.delete_document(*agent_id, document_id).await?;
                info!(agent_id = %agent_id, document_id = %document_id, removed, "Document removed");
                Ok(removed)
            }
        }
    }
}

/// A bounded pool of ingestion workers sharing one queue.
pub struct IngestWorkerPool<Q: WorkQueue + 'static> {
    shared: Arc<Shared<Q>>,
    cancel: CancellationToken,
    lifecycle: Lifecycle,
    handles: Mutex<Vec<JoinHandle<()>>>,
}

impl<Q: WorkQueue + 'static> IngestWorkerPool<Q> {
    pub fn new(
        queue: Arc<Q>,
        indexer: Arc<DocumentIndexer>,
        events: Arc<dyn EventPublisher>,
        settings: IngestSettings,
    ) -> Self {
        Self {
            shared: Arc::new(Shared {
                queue,
                indexer,
                events,
                settings,
            }),
            cancel: CancellationToken::new(),
            lifecycle: Lifecycle::new(),
            handles: Mutex::new(Vec::new()),
        }
    }

    pub fn state(&self) -> LifecycleState {
        self.lifecycle.state()
    }

    /// Claim and run a single job on the calling task.
    pub async fn process_next(&self) -> Result<Option<JobOutcome>, IngestError> {
        self.shared.process_next().await
    }

    /// Spawn the workers. Returns false if already started or shut down.
    pub fn start(&self) -> bool {
        if !self.lifecycle.advance(LifecycleState::Ready) {
            return false;
        }
        let workers = self.shared.settings.workers;
        let mut handles = self.handles.lock().unwrap_or_else(PoisonError::into_inner);
        for worker in 0..workers {
            let shared = Arc::clone(&self.shared);
            let cancel = self.cancel.clone();
            handles.push(tokio::spawn(run_worker(worker, shared, cancel)));
        }
        info!(workers, "Ingest workers started");
        true
    }

    /// Stop claiming new jobs and wait for running ones to finish.
    pub async fn shutdown(&self) {
        if !self.lifecycle.advance(LifecycleState::ShuttingDown) {
            return;
        }
        self.cancel.cancel();
        let handles: Vec<JoinHandle<()>> = self
            .handles
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .drain(..)
            .collect();
        for handle in handles {
            if let Err(e) = handle.await {
                warn!(error = %e, "Ingest worker panicked");
            }
        }
        self.lifecycle.advance(LifecycleState::Stopped);
        info!("Ingest workers stopped");
    }
}

async fn run_worker<Q: WorkQueue>(worker: usize, shared: Arc<Shared<Q>>, cancel: CancellationToken) {
    debug!(worker, "Ingest worker running");
    while !cancel.is_cancelled() {
        match shared.process_next().await {
            // More work may be waiting.
            Ok(Some(_)) => continue,
            Ok(None) => {}
            Err(e) => warn!(worker, error = %e, "Ingest queue unavailable"),
        }
        tokio::select! {
            () = cancel.cancelled() => break,
            () = tokio::time::sleep(shared.settings.poll_interval) => {}
        }
    }
    debug!(worker, "Ingest worker exiting");
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::event::EventBus;
    use crate::ingest::memory_queue::InMemoryWorkQueue;
    use crate::ingest::queue::{submit_delete, submit_document};
    use crate::knowledge::box_embedder::BoxEmbedder;
    use crate::knowledge::box_index::BoxVectorIndex;
    use crate::knowledge::memory_index::InMemoryVectorIndex;
    use crate::test_support::{FailingEmbedder, HashEmbedder, document};

    const DIM: usize = 32;

    fn settings() -> IngestSettings {
        IngestSettings {
            workers: 2,
            max_attempts: 2,
            poll_interval: Duration::from_millis(10),
            visibility_timeout: Duration::from_secs(60),
        }
    }

    fn pool_with(
        embedder: BoxEmbedder,
        bus: EventBus,
    ) -> (IngestWorkerPool<InMemoryWorkQueue>, Arc<InMemoryWorkQueue>, Arc<DocumentIndexer>) {
        let queue = Arc::new(InMemoryWorkQueue::new());
        let index = Arc::new(BoxVectorIndex::new(InMemoryVectorIndex::new(DIM)));
        let indexer = Arc::new(DocumentIndexer::new(Arc::new(embedder), index, 64));
        let pool = IngestWorkerPool::new(queue.clone(), indexer.clone(), Arc::new(bus), settings());
        (pool, queue, indexer)
    }

    fn pool() -> (IngestWorkerPool<InMemoryWorkQueue>, Arc<InMemoryWorkQueue>, Arc<DocumentIndexer>) {
        pool_with(BoxEmbedder::new(HashEmbedder::new(DIM)), EventBus::new(16))
    }

    #[tokio::test]
    async fn upsert_job_indexes_and_emits() {
        let bus = EventBus::new(16);
        let mut rx = bus.subscribe();
        let (pool, queue, indexer) = pool_with(BoxEmbedder::new(HashEmbedder::new(DIM)), bus);
        let agent = uuid::Uuid::now_v7();
        let job = submit_document(
            queue.as_ref(),
            document(agent, "returns", "ניתן להחזיר מוצר תוך 14 ימים עם קבלה"),
        )
        .await
        .unwrap();

        let outcome = pool.process_next().await.unwrap().unwrap();
        assert_eq!(outcome.job_id, job.id);
        assert_eq!(outcome.status, IngestJobStatus::Done);
        assert!(outcome.chunks >= 1);
        assert_eq!(
            indexer.count_chunks(agent, Some("returns")).await.unwrap(),
            outcome.chunks
        );

        let event = rx.try_recv().unwrap();
        assert!(matches!(
            event.event,
            ConversationEvent::DocumentIngested { ref document_id, .. } if document_id == "returns"
        ));
        assert!(pool.process_next().await.unwrap().is_none());
    }

    #[tokio::test]
    async fn redelivered_upsert_is_idempotent() {
        let (pool, queue, indexer) = pool();
        let agent = uuid::Uuid::now_v7();
        let doc = document(agent, "faq", "שאלות נפוצות על משלוחים והחזרות");
        submit_document(queue.as_ref(), doc.clone()).await.unwrap();
        submit_document(queue.as_ref(), doc).await.unwrap();

        let first = pool.process_next().await.unwrap().unwrap();
        let second = pool.process_next().await.unwrap().unwrap();
        assert_eq!(first.chunks, second.chunks);
        assert_eq!(indexer.count_chunks(agent, None).await.unwrap(), first.chunks);
    }

    #[tokio::test]
    async fn delete_job_removes_chunks() {
        let (pool, queue, indexer) = pool();
        let agent = uuid::Uuid::now_v7();
        submit_document(queue.as_ref(), document(agent, "old", "מידע ישן"))
            .await
            .unwrap();
        pool.process_next().await.unwrap();

        submit_delete(queue.as_ref(), agent, "old").await.unwrap();
        let outcome = pool.process_next().await.unwrap().unwrap();
        assert_eq!(outcome.status, IngestJobStatus::Done);
        assert_eq!(indexer.count_chunks(agent, None).await.unwrap(), 0);
    }

    #[tokio::test]
    async fn blank_document_rejected_at_submit() {
        let (_, queue, _) = pool();
        let err = submit_document(queue.as_ref(), document(uuid::Uuid::now_v7(), "x", "  "))
            .await
            .unwrap_err();
        assert!(matches!(err, IngestError::EmptyDocument(_)));
        assert_eq!(queue.job_count().await, 0);
    }

    #[tokio::test]
    async fn permanent_failure_dead_letters_immediately() {
        let (pool, queue, _) = pool();
        let job = queue
            .enqueue(IngestOperation::Upsert {
                document: document(uuid::Uuid::now_v7(), "blank", ""),
            })
            .await
            .unwrap();
        let outcome = pool.process_next().await.unwrap().unwrap();
        assert_eq!(outcome.status, IngestJobStatus::Failed);
        let stored = queue.get_job(&job.id).await.unwrap().unwrap();
        assert_eq!(stored.attempts, 1);
        assert!(stored.last_error.is_some());
    }

    #[tokio::test]
    async fn transient_failure_retried_until_exhausted() {
        let (pool, queue, _) = pool_with(
            BoxEmbedder::new(FailingEmbedder { dimension: DIM }),
            EventBus::new(4),
        );
        let job = submit_document(queue.as_ref(), document(uuid::Uuid::now_v7(), "d", "טקסט"))
            .await
            .unwrap();

        let first = pool.process_next().await.unwrap().unwrap();
        assert_eq!(first.status, IngestJobStatus::Queued);
        let second = pool.process_next().await.unwrap().unwrap();
        assert_eq!(second.status, IngestJobStatus::Failed);
        assert!(pool.process_next().await.unwrap().is_none());

        let stored = queue.get_job(&job.id).await.unwrap().unwrap();
        assert_eq!(stored.attempts, 2);
    }

    #[tokio::test]
    async fn workers_drain_queue_and_shut_down() {
        let (pool, queue, indexer) = pool();
        let agent = uuid::Uuid::now_v7();
        let mut jobs = Vec::new();
        for i in 0..4 {
            jobs.push(
                submit_document(queue.as_ref(), document(agent, &format!("doc-{i}"), "תוכן כלשהו"))
                    .await
                    .unwrap(),
            );
        }

        assert!(pool.start());
        assert!(!pool.start());
        tokio::time::timeout(Duration::from_secs(5), async {
            loop {
                let mut done = 0;
                for job in &jobs {
                    let stored = queue.get_job(&job.id).await.unwrap().unwrap();
                    if stored.status == IngestJobStatus::Done {
                        done += 1;
                    }
                }
                if done == jobs.len() {
                    break;
                }
                tokio::time::sleep(Duration::from_millis(10)).await;
            }
        })
        .await
        .unwrap();

        pool.shutdown().await;
        assert_eq!(pool.state(), LifecycleState::Stopped);
        assert_eq!(indexer.count_chunks(agent, None).await.unwrap(), 4);
    }
}
