use serde::{Deserialize, Serialize};
use thiserror::Error;
use uuid::Uuid;

use crate::chat::ConversationStatus;
use crate::llm::LlmError;

/// Errors from repository operations (used by trait definitions in sihah-core).
#[derive(Debug, Error)]
pub enum RepositoryError {
    #[error("database connection error")]
    Connection,

    #[error("query error: {0}")]
    Query(String),

    #[error("entity not found")]
    NotFound,

    #[error("conflict: {0}")]
    Conflict(String),
}

/// Errors from the embedding provider or the vector index.
#[derive(Debug, Clone, Error)]
pub enum RetrievalError {
    #[error("embedding failed: {0}")]
    Embedding(String),

    #[error("vector index error: {0}")]
    Index(String),

    #[error("embedding dimension mismatch: expected {expected}, got {actual}")]
    DimensionMismatch { expected: usize, actual: usize },
}

impl RetrievalError {
    /// Transient provider/index failures may succeed on a later attempt.
    pub fn is_retryable(&self) -> bool {
        matches!(self, RetrievalError::Embedding(_) | RetrievalError::Index(_))
    }
}

/// Failure inside a language analysis provider.
///
/// Never surfaced to callers: the pipeline degrades to a neutral analysis.
#[derive(Debug, Clone, Error)]
pub enum AnalysisError {
    #[error("analysis provider failed: {0}")]
    Provider(String),

    #[error("lexicon unavailable: {0}")]
    Lexicon(String),
}

/// Errors from document ingestion.
#[derive(Debug, Error)]
pub enum IngestError {
    #[error("document '{0}' has no indexable text")]
    EmptyDocument(String),

    #[error(transparent)]
    Retrieval(#[from] RetrievalError),

    #[error(transparent)]
    Queue(#[from] RepositoryError),

    #[error("invalid job payload: {0}")]
    Payload(String),
}

/// The four outcomes every fatal turn path is reduced to.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum TurnErrorKind {
    RetryLater,
    ConversationUnavailable,
    InvalidRequest,
    Internal,
}

/// Errors from turn processing and conversation lifecycle operations.
#[derive(Debug, Error)]
pub enum TurnError {
    #[error("invalid request: {0}")]
    Validation(String),

    #[error("conversation {0} not found")]
    ConversationNotFound(Uuid),

    #[error("conversation {id} is {status} and does not accept turns")]
    ConversationNotActive { id: Uuid, status: ConversationStatus },

    #[error("conversation {id} cannot move from {from} to {to}")]
    IllegalTransition {
        id: Uuid,
        from: ConversationStatus,
        to: ConversationStatus,
    },

    #[error("model invocation failed after {attempts} attempt(s): {source}")]
    Llm {
        attempts: u32,
        #[source]
        source: LlmError,
    },

    #[error("turn deadline exceeded")]
    DeadlineExceeded,

    #[error("pipeline is not accepting work")]
    ShuttingDown,

    #[error("persistence failed: {0}")]
    Persistence(#[from] RepositoryError),
}

impl TurnError {
    pub fn kind(&self) -> TurnErrorKind {
        match self {
            TurnError::Validation(_) => TurnErrorKind::InvalidRequest,
            TurnError::ConversationNotFound(_)
            | TurnError::ConversationNotActive { .. }
            | TurnError::IllegalTransition { .. } => TurnErrorKind::ConversationUnavailable,
            TurnError::Llm { source, .. } => match source {
                LlmError::InvalidRequest(_) | LlmError::ContextLengthExceeded { .. } => {
                    TurnErrorKind::InvalidRequest
                }
                e if e.is_retryable() => TurnErrorKind::RetryLater,
                _ => TurnErrorKind::Internal,
            },
            TurnError::DeadlineExceeded | TurnError::ShuttingDown => TurnErrorKind::RetryLater,
            TurnError::Persistence(_) => TurnErrorKind::Internal,
        }
    }
}
