//! Durable ingestion job types.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use std::fmt;
use std::str::FromStr;

use crate::knowledge::KnowledgeDocument;

/// Lifecycle status of an ingestion job.
///
/// Maps to `CHECK (status IN ('queued', 'running', 'done', 'failed'))`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum IngestJobStatus {
    Queued,
    Running,
    Done,
    /// Dead-lettered after exhausting its attempts.
    Failed,
}

impl fmt::Display for IngestJobStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            IngestJobStatus::Queued => write!(f, "queued"),
            IngestJobStatus::Running => write!(f, "running"),
            IngestJobStatus::Done => write!(f, "done"),
            IngestJobStatus::Failed => write!(f, "failed"),
        }
    }
}

impl FromStr for IngestJobStatus {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_lowercase().as_str() {
            "queued" => Ok(IngestJobStatus::Queued),
            "running" => Ok(IngestJobStatus::Running),
            "done" => Ok(IngestJobStatus::Done),
            "failed" => Ok(IngestJobStatus::Failed),
            other => Err(format!("invalid ingest job status: '{other}'")),
        }
    }
}

/// What an ingestion job does with a document.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "op", rename_all = "snake_case")]
pub enum IngestOperation {
    Upsert { document: KnowledgeDocument },
    Delete { agent_id: Uuid, document_id: String },
}

impl IngestOperation {
    pub fn agent_id(&self) -> Uuid {
        match self {
            IngestOperation::Upsert { document } => document.agent_id,
            IngestOperation::Delete { agent_id, .. } => *agent_id,
        }
    }

    pub fn document_id(&self) -> &str {
        match self {
            IngestOperation::Upsert { document } => &document.document_id,
            IngestOperation::Delete { document_id, .. } => document_id,
        }
    }
}

/// A queued unit of ingestion work.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct IngestJob {
    pub id: Uuid,
    pub operation: IngestOperation,
    pub status: IngestJobStatus,
    /// Number of times this job has been claimed.
    pub attempts: u32,
    pub last_error: Option<String>,
    pub enqueued_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl IngestJob {
    pub fn new(operation: IngestOperation) -> Self {
        let now = Utc::now();
        Self {
            id: Uuid::now_v7(),
            operation,
            status: IngestJobStatus::Queued,
            attempts: 0,
            last_error: None,
            enqueued_at: now,
            updated_at: now,
        }
    }
}
