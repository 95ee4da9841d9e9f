//! Knowledge document HTTP handlers.
//!
//! Endpoints:
//! - POST   /api/v1/agents/{id}/documents                - Queue a document for indexing
//! - DELETE /api/v1/agents/{id}/documents/{document_id}  - Queue removal of a document
//! - GET    /api/v1/ingest/jobs/{id}                     - Job status

use std::time::Instant;

use axum::Json;
use axum::extract::{Path, State};
use axum::http::StatusCode;
use chrono::Utc;
use serde::Deserialize;

use sihah_core::ingest::queue::{WorkQueue, submit_delete, submit_document};
use sihah_types::chat::Metadata;
use sihah_types::ingest::IngestJob;
use sihah_types::knowledge::KnowledgeDocument;

use crate::http::error::AppError;
use crate::http::handlers::conversation::parse_uuid;
use crate::http::response::ApiResponse;
use crate::state::AppState;

/// Request body for document submission.
#[derive(Debug, Deserialize)]
pub struct DocumentRequest {
    pub document_id: String,
    pub text: String,
    #[serde(default)]
    pub metadata: Metadata,
}

/// POST /api/v1/agents/{id}/documents
///
/// Returns 202 with the queued job. Resubmitting a document id replaces its
/// chunks once the job runs.
pub async fn submit(
    State(state): State<AppState>,
    Path(id): Path<String>,
    Json(body): Json<DocumentRequest>,
) -> Result<(StatusCode, Json<ApiResponse<IngestJob>>), AppError> {
    let start = Instant::now();
    let agent_id = parse_uuid(&id)?;

    let job = submit_document(
        state.queue.as_ref(),
        KnowledgeDocument {
            agent_id,
            document_id: body.document_id,
            text: body.text,
            metadata: body.metadata,
            submitted_at: Utc::now(),
        },
    )
    .await?;

    tracing::info!(
        job_id = %job.id,
        agent_id = %agent_id,
        document_id = job.operation.document_id(),
        "Document queued for ingestion"
    );

    let link = format!("/api/v1/ingest/jobs/{}", job.id);
    Ok((
        StatusCode::ACCEPTED,
        Json(ApiResponse::timed(job, start).with_link("job", &link)),
    ))
}

/// DELETE /api/v1/agents/{id}/documents/{document_id}
pub async fn delete(
    State(state): State<AppState>,
    Path((id, document_id)): Path<(String, String)>,
) -> Result<(StatusCode, Json<ApiResponse<IngestJob>>), AppError> {
    let start = Instant::now();
    let agent_id = parse_uuid(&id)?;

    let job = submit_delete(state.queue.as_ref(), agent_id, &document_id).await?;

    let link = format!("/api/v1/ingest/jobs/{}", job.id);
    Ok((
        StatusCode::ACCEPTED,
        Json(ApiResponse::timed(job, start).with_link("job", &link)),
    ))
}

/// GET /api/v1/ingest/jobs/{id}
pub async fn get_job(
    State(state): State<AppState>,
    Path(id): Path<String>,
) -> Result<Json<ApiResponse<IngestJob>>, AppError> {
    let start = Instant::now();
    let job_id = parse_uuid(&id)?;

    let job = state
        .queue
        .get_job(&job_id)
        .await?
        .ok_or_else(|| AppError::NotFound(format!("ingest job {job_id} not found")))?;

    Ok(Json(ApiResponse::timed(job, start)))
}
