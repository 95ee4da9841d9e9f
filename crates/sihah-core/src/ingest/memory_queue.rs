//! In-memory `WorkQueue` for tests and single-process use.

use std::time::Duration;

use chrono::Utc;
use sihah_types::error::RepositoryError;
use sihah_types::ingest::{IngestJob, IngestJobStatus, IngestOperation};
use tokio::sync::Mutex;
use uuid::Uuid;

use super::queue::WorkQueue;

/// Jobs kept in enqueue order.
#[derive(Debug, Default)]
pub struct InMemoryWorkQueue {
    jobs: Mutex<Vec<IngestJob>>,
}

impl InMemoryWorkQueue {
    pub fn new() -> Self {
        Self::default()
    }

    pub async fn job_count(&self) -> usize {
        self.jobs.lock().await.len()
    }
}

fn claim_expired(job: &IngestJob, visibility_timeout: Duration) -> bool {
    (Utc::now() - job.updated_at)
        .to_std()
        .is_ok_and(|elapsed| elapsed >= visibility_timeout)
}

impl WorkQueue for InMemoryWorkQueue {
    async fn enqueue(&self, operation: IngestOperation) -> Result<IngestJob, RepositoryError> {
        let job = IngestJob::new(operation);
        self.jobs.lock().await.push(job.clone());
        Ok(job)
    }

    async fn claim(&self, visibility_timeout: Duration) -> Result<Option<IngestJob>, RepositoryError> {
        let mut jobs = self.jobs.lock().await;
        let Some(job) = jobs.iter_mut().find(|j| match j.status {
            IngestJobStatus::Queued => true,
            IngestJobStatus::Running => claim_expired(j, visibility_timeout),
            _ => false,
        }) else {
            return Ok(None);
        };
        job.status = IngestJobStatus::Running;
        job.attempts += 1;
        job.updated_at = Utc::now();
        Ok(Some(job.clone()))
    }

    async fn ack(&self, job_id: &Uuid) -> Result<(), RepositoryError> {
        let mut jobs = self.jobs.lock().await;
        let job = jobs
            .iter_mut()
            .find(|j| j.id == *job_id)
            .ok_or(RepositoryError::NotFound)?;
        job.status = IngestJobStatus::Done;
        job.last_error = None;
        job.updated_at = Utc::now();
        Ok(())
    }

    async fn fail(
        &self,
        job_id: &Uuid,
        error: &str,
        max_attempts: u32,
    ) -> Result<IngestJobStatus, RepositoryError> {
        let mut jobs = self.jobs.lock().await;
        let job = jobs
            .iter_mut()
            .find(|j| j.id == *job_id)
            .ok_or(RepositoryError::NotFound)?;
        job.status = if job.attempts >= max_attempts {
            IngestJobStatus::Failed
        } else {
            IngestJobStatus::Queued
        };
        job.last_error = Some(error.to_string());
        job.updated_at = Utc::now();
        Ok(job.status)
    }

    async fn get_job(&self, job_id: &Uuid) -> Result<Option<IngestJob>, RepositoryError> {
        Ok(self
            .jobs
            .lock()
            .await
            .iter()
            .find(|j| j.id == *job_id)
            .cloned())
    }
}
