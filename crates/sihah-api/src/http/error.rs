//! Application error type mapping to HTTP status codes and envelope format.

use axum::Json;
use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};

use sihah_types::error::{IngestError, RepositoryError, TurnError, TurnErrorKind};

use crate::http::response::ApiResponse;

/// Application-level error that maps to HTTP responses.
#[derive(Debug)]
pub enum AppError {
    /// Turn pipeline or conversation lifecycle errors.
    Turn(TurnError),
    /// Document submission errors.
    Ingest(IngestError),
    /// Resource outside the pipeline (e.g. an ingest job) not found.
    NotFound(String),
    /// Validation error.
    Validation(String),
    /// Generic internal error.
    Internal(String),
}

impl From<TurnError> for AppError {
    fn from(e: TurnError) -> Self {
        AppError::Turn(e)
    }
}

impl From<IngestError> for AppError {
    fn from(e: IngestError) -> Self {
        AppError::Ingest(e)
    }
}

impl From<RepositoryError> for AppError {
    fn from(e: RepositoryError) -> Self {
        AppError::Internal(e.to_string())
    }
}

impl AppError {
    /// Status, machine-readable code, and message for the envelope.
    pub fn parts(&self) -> (StatusCode, &'static str, String) {
        match self {
            AppError::Turn(e @ TurnError::ConversationNotFound(_)) => {
                (StatusCode::NOT_FOUND, "CONVERSATION_NOT_FOUND", e.to_string())
            }
            AppError::Turn(e) => match e.kind() {
                TurnErrorKind::ConversationUnavailable => {
                    (StatusCode::CONFLICT, "CONVERSATION_UNAVAILABLE", e.to_string())
                }
                TurnErrorKind::RetryLater => {
                    (StatusCode::SERVICE_UNAVAILABLE, "RETRY_LATER", e.to_string())
                }
                TurnErrorKind::InvalidRequest => {
                    (StatusCode::BAD_REQUEST, "VALIDATION_ERROR", e.to_string())
                }
                // Internal details stay in the logs.
                TurnErrorKind::Internal => (
                    StatusCode::INTERNAL_SERVER_ERROR,
                    "INTERNAL_ERROR",
                    "Turn processing failed".to_string(),
                ),
            },
            AppError::Ingest(e @ (IngestError::EmptyDocument(_) | IngestError::Payload(_))) => {
                (StatusCode::BAD_REQUEST, "VALIDATION_ERROR", e.to_string())
            }
            AppError::Ingest(e) => {
                (StatusCode::INTERNAL_SERVER_ERROR, "INGEST_ERROR", e.to_string())
            }
            AppError::NotFound(msg) => (StatusCode::NOT_FOUND, "NOT_FOUND", msg.clone()),
            AppError::Validation(msg) => {
                (StatusCode::BAD_REQUEST, "VALIDATION_ERROR", msg.clone())
            }
            AppError::Internal(msg) => {
                (StatusCode::INTERNAL_SERVER_ERROR, "INTERNAL_ERROR", msg.clone())
            }
        }
    }
}

impl IntoResponse for AppError {
    fn into_response(self) -> Response {
        let (status, code, message) = self.parts();
        if status.is_server_error() {
            tracing::error!(error = ?self, code, "Request failed");
        }

        (status, Json(ApiResponse::error(code, &message))).into_response()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use sihah_types::chat::ConversationStatus;
    use sihah_types::llm::LlmError;
    use uuid::Uuid;

    #[test]
    fn not_found_maps_to_404() {
        let err = AppError::from(TurnError::ConversationNotFound(Uuid::now_v7()));
        let (status, code, _) = err.parts();
        assert_eq!(status, StatusCode::NOT_FOUND);
        assert_eq!(code, "CONVERSATION_NOT_FOUND");
    }

    #[test]
    fn ended_conversation_maps_to_409() {
        let err = AppError::from(TurnError::ConversationNotActive {
            id: Uuid::now_v7(),
            status: ConversationStatus::Ended,
        });
        assert_eq!(err.parts().0, StatusCode::CONFLICT);
    }

    #[test]
    fn retryable_llm_failure_maps_to_503() {
        let err = AppError::from(TurnError::Llm {
            attempts: 3,
            source: LlmError::Overloaded("busy".into()),
        });
        let (status, code, _) = err.parts();
        assert_eq!(status, StatusCode::SERVICE_UNAVAILABLE);
        assert_eq!(code, "RETRY_LATER");
    }

    #[test]
    fn persistence_failure_hides_details() {
        let err = AppError::from(TurnError::Persistence(RepositoryError::Query(
            "UNIQUE constraint failed".into(),
        )));
        let (status, _, message) = err.parts();
        assert_eq!(status, StatusCode::INTERNAL_SERVER_ERROR);
        assert!(!message.contains("UNIQUE"));
    }

    #[test]
    fn empty_document_is_a_client_error() {
        let err = AppError::from(IngestError::EmptyDocument("faq".into()));
        assert_eq!(err.parts().0, StatusCode::BAD_REQUEST);
    }
}
