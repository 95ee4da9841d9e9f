//! SQLite-backed durable ingestion queue.
//!
//! Jobs survive restarts. A job claimed by a worker that dies stays `running`
//! until its visibility timeout passes, after which the next `claim` picks it
//! up again. Timestamps are stored as fixed-width RFC 3339 UTC strings so the
//! expiry comparison can run in SQL.

use std::time::Duration;

use chrono::{DateTime, SecondsFormat, Utc};
use sihah_core::ingest::queue::WorkQueue;
use sihah_types::error::RepositoryError;
use sihah_types::ingest::{IngestJob, IngestJobStatus, IngestOperation};
use sqlx::Row;
use uuid::Uuid;

use super::pool::DatabasePool;

/// SQLite-backed implementation of `WorkQueue`.
pub struct SqliteWorkQueue {
    pool: DatabasePool,
}

impl SqliteWorkQueue {
    pub fn new(pool: DatabasePool) -> Self {
        Self { pool }
    }

    /// Number of jobs in each status, for the CLI and health output.
    pub async fn status_counts(&self) -> Result<Vec<(IngestJobStatus, u64)>, RepositoryError> {
        let rows = sqlx::query(
            "SELECT status, COUNT(*) AS cnt FROM ingest_jobs GROUP BY status ORDER BY status",
        )
        .fetch_all(&self.pool.reader)
        .await
        .map_err(query_err)?;

        let mut counts = Vec::with_capacity(rows.len());
        for row in &rows {
            let status: String = row.try_get("status").map_err(query_err)?;
            let count: i64 = row.try_get("cnt").map_err(query_err)?;
            let status = status
                .parse()
                .map_err(|e: String| RepositoryError::Query(e))?;
            counts.push((status, count as u64));
        }
        Ok(counts)
    }
}

struct JobRow {
    id: String,
    payload: String,
    status: String,
    attempts: i64,
    last_error: Option<String>,
    enqueued_at: String,
    updated_at: String,
}

impl JobRow {
    fn from_row(row: &sqlx::sqlite::SqliteRow) -> Result<Self, sqlx::Error> {
        Ok(Self {
            id: row.try_get("id")?,
            payload: row.try_get("payload")?,
            status: row.try_get("status")?,
            attempts: row.try_get("attempts")?,
            last_error: row.try_get("last_error")?,
            enqueued_at: row.try_get("enqueued_at")?,
            updated_at: row.try_get("updated_at")?,
        })
    }

    fn into_job(self) -> Result<IngestJob, RepositoryError> {
        let id = Uuid::parse_str(&self.id)
            .map_err(|e| RepositoryError::Query(format!("invalid job id: {e}")))?;
        let operation: IngestOperation = serde_json::from_str(&self.payload)
            .map_err(|e| RepositoryError::Query(format!("invalid job payload: {e}")))?;
        let status: IngestJobStatus = self
            .status
            .parse()
            .map_err(|e: String| RepositoryError::Query(e))?;

        Ok(IngestJob {
            id,
            operation,
            status,
            attempts: self.attempts as u32,
            last_error: self.last_error,
            enqueued_at: parse_datetime(&self.enqueued_at)?,
            updated_at: parse_datetime(&self.updated_at)?,
        })
    }
}

fn parse_datetime(s: &str) -> Result<DateTime<Utc>, RepositoryError> {
    DateTime::parse_from_rfc3339(s)
        .map(|dt| dt.with_timezone(&Utc))
        .map_err(|e| RepositoryError::Query(format!("invalid datetime: {e}")))
}

fn format_datetime(dt: &DateTime<Utc>) -> String {
    dt.to_rfc3339_opts(SecondsFormat::Micros, true)
}

fn query_err(e: sqlx::Error) -> RepositoryError {
    RepositoryError::Query(e.to_string())
}

impl WorkQueue for SqliteWorkQueue {
    async fn enqueue(&self, operation: IngestOperation) -> Result<IngestJob, RepositoryError> {
        let job = IngestJob::new(operation);
        let payload = serde_json::to_string(&job.operation)
            .map_err(|e| RepositoryError::Query(format!("unserializable job payload: {e}")))?;

        sqlx::query(
            r#"INSERT INTO ingest_jobs (id, agent_id, document_id, payload, status, attempts, last_error, enqueued_at, updated_at)
               VALUES (?, ?, ?, ?, ?, 0, NULL, ?, ?)"#,
        )
        .bind(job.id.to_string())
        .bind(job.operation.agent_id().to_string())
        .bind(job.operation.document_id())
        .bind(payload)
        .bind(job.status.to_string())
        .bind(format_datetime(&job.enqueued_at))
        .bind(format_datetime(&job.updated_at))
        .execute(&self.pool.writer)
        .await
        .map_err(query_err)?;

        Ok(job)
    }

    async fn claim(&self, visibility_timeout: Duration) -> Result<Option<IngestJob>, RepositoryError> {
        let now = Utc::now();
        let expired_before = chrono::Duration::from_std(visibility_timeout)
            .ok()
            .and_then(|d| now.checked_sub_signed(d))
            .unwrap_or(DateTime::<Utc>::MIN_UTC);

        let mut tx = self.pool.writer.begin().await.map_err(query_err)?;
        let row = sqlx::query(
            r#"SELECT * FROM ingest_jobs
               WHERE status = 'queued' OR (status = 'running' AND updated_at <= ?)
               ORDER BY enqueued_at ASC, id ASC
               LIMIT 1"#,
        )
        .bind(format_datetime(&expired_before))
        .fetch_optional(&mut *tx)
        .await
        .map_err(query_err)?;

        let Some(row) = row else {
            return Ok(None);
        };
        let mut job = JobRow::from_row(&row).map_err(query_err)?.into_job()?;

        sqlx::query(
            "UPDATE ingest_jobs SET status = 'running', attempts = attempts + 1, updated_at = ? WHERE id = ?",
        )
        .bind(format_datetime(&now))
        .bind(job.id.to_string())
        .execute(&mut *tx)
        .await
        .map_err(query_err)?;
        tx.commit().await.map_err(query_err)?;

        job.status = IngestJobStatus::Running;
        job.attempts += 1;
        job.updated_at = now;
        Ok(Some(job))
    }

    async fn ack(&self, job_id: &Uuid) -> Result<(), RepositoryError> {
        let result = sqlx::query(
            "UPDATE ingest_jobs SET status = 'done', last_error = NULL, updated_at = ? WHERE id = ?",
        )
        .bind(format_datetime(&Utc::now()))
        .bind(job_id.to_string())
        .execute(&self.pool.writer)
        .await
        .map_err(query_err)?;

        if result.rows_affected() == 0 {
            return Err(RepositoryError::NotFound);
        }
        Ok(())
    }

    async fn fail(
        &self,
        job_id: &Uuid,
        error: &str,
        max_attempts: u32,
    ) -> Result<IngestJobStatus, RepositoryError> {
        let row = sqlx::query(
            r#"UPDATE ingest_jobs
               SET status = CASE WHEN attempts >= ? THEN 'failed' ELSE 'queued' END,
                   last_error = ?,
                   updated_at = ?
               WHERE id = ?
               RETURNING status"#,
        )
        .bind(max_attempts as i64)
        .bind(error)
        .bind(format_datetime(&Utc::now()))
        .bind(job_id.to_string())
        .fetch_optional(&self.pool.writer)
        .await
        .map_err(query_err)?
        .ok_or(RepositoryError::NotFound)?;

        let status: String = row.try_get("status").map_err(query_err)?;
        status.parse().map_err(|e: String| RepositoryError::Query(e))
    }

    async fn get_job(&self, job_id: &Uuid) -> Result<Option<IngestJob>, RepositoryError> {
        let row = sqlx::query("SELECT * FROM ingest_jobs WHERE id = ?")
            .bind(job_id.to_string())
            .fetch_optional(&self.pool.reader)
            .await
            .map_err(query_err)?;

        match row {
            Some(row) => Ok(Some(JobRow::from_row(&row).map_err(query_err)?.into_job()?)),
            None => Ok(None),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use sihah_types::chat::Metadata;
    use sihah_types::knowledge::KnowledgeDocument;

    async fn test_queue() -> SqliteWorkQueue {
        let dir = tempfile::tempdir().unwrap();
        let db_path = dir.path().join("queue.db");
        let url = format!("sqlite://{}?mode=rwc", db_path.display());
        // Leak tempdir so it lives for the test
        std::mem::forget(dir);
        SqliteWorkQueue::new(DatabasePool::new(&url).await.unwrap())
    }

    fn upsert(doc: &str) -> IngestOperation {
        IngestOperation::Upsert {
            document: KnowledgeDocument {
                agent_id: Uuid::now_v7(),
                document_id: doc.to_string(),
                text: "מדיניות החזרות: 14 יום".to_string(),
                metadata: Metadata::new(),
                submitted_at: Utc::now(),
            },
        }
    }

    const LONG: Duration = Duration::from_secs(3600);

    #[tokio::test]
    async fn test_enqueue_claim_ack() {
        let queue = test_queue().await;
        let job = queue.enqueue(upsert("returns")).await.unwrap();

        let claimed = queue.claim(LONG).await.unwrap().unwrap();
        assert_eq!(claimed.id, job.id);
        assert_eq!(claimed.attempts, 1);
        assert_eq!(claimed.operation, job.operation);
        assert!(queue.claim(LONG).await.unwrap().is_none());

        queue.ack(&job.id).await.unwrap();
        let stored = queue.get_job(&job.id).await.unwrap().unwrap();
        assert_eq!(stored.status, IngestJobStatus::Done);
        assert!(queue.claim(Duration::ZERO).await.unwrap().is_none());
    }

    #[tokio::test]
    async fn test_claims_oldest_first() {
        let queue = test_queue().await;
        let first = queue.enqueue(upsert("a")).await.unwrap();
        let second = queue.enqueue(upsert("b")).await.unwrap();

        assert_eq!(queue.claim(LONG).await.unwrap().unwrap().id, first.id);
        assert_eq!(queue.claim(LONG).await.unwrap().unwrap().id, second.id);
    }

    #[tokio::test]
    async fn test_expired_claim_redelivered() {
        let queue = test_queue().await;
        let job = queue.enqueue(upsert("a")).await.unwrap();
        queue.claim(LONG).await.unwrap().unwrap();

        let again = queue.claim(Duration::ZERO).await.unwrap().unwrap();
        assert_eq!(again.id, job.id);
        assert_eq!(again.attempts, 2);
    }

    #[tokio::test]
    async fn test_fail_requeues_then_dead_letters() {
        let queue = test_queue().await;
        let job = queue.enqueue(upsert("a")).await.unwrap();

        queue.claim(LONG).await.unwrap().unwrap();
        assert_eq!(
            queue.fail(&job.id, "embedding 503", 2).await.unwrap(),
            IngestJobStatus::Queued
        );
        queue.claim(LONG).await.unwrap().unwrap();
        assert_eq!(
            queue.fail(&job.id, "embedding 503", 2).await.unwrap(),
            IngestJobStatus::Failed
        );

        let stored = queue.get_job(&job.id).await.unwrap().unwrap();
        assert_eq!(stored.last_error.as_deref(), Some("embedding 503"));
        assert_eq!(stored.attempts, 2);

        let counts = queue.status_counts().await.unwrap();
        assert_eq!(counts, vec![(IngestJobStatus::Failed, 1)]);
    }

    #[tokio::test]
    async fn test_ack_unknown_job() {
        let queue = test_queue().await;
        assert!(matches!(
            queue.ack(&Uuid::now_v7()).await,
            Err(RepositoryError::NotFound)
        ));
        assert!(matches!(
            queue.fail(&Uuid::now_v7(), "x", 1).await,
            Err(RepositoryError::NotFound)
        ));
    }
}
