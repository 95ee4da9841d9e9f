//! Conversation HTTP handlers.
//!
//! Endpoints:
//! - POST /api/v1/conversations/{id}/turns           - Process one user turn
//! - POST /api/v1/conversations/{id}/pause           - Pause an active conversation
//! - POST /api/v1/conversations/{id}/end             - End a conversation
//! - POST /api/v1/conversations/{id}/transfer        - Hand over to a target
//! - GET  /api/v1/conversations/{id}                 - Get a conversation
//! - GET  /api/v1/conversations/{id}/messages        - Ordered transcript
//! - PUT  /api/v1/conversations/{id}/metadata/{key}  - Set one metadata key

use std::time::Instant;

use axum::Json;
use axum::extract::{Path, Query, State};
use serde::Deserialize;
use uuid::Uuid;

use sihah_types::agent::AgentConfig;
use sihah_types::chat::{Conversation, ConversationMessage, Metadata};
use sihah_types::turn::TurnResult;

use crate::http::error::AppError;
use crate::http::response::ApiResponse;
use crate::state::AppState;
use crate::telemetry::traced_turn;

/// Request body for processing a turn.
#[derive(Debug, Deserialize)]
pub struct TurnRequest {
    pub agent: AgentConfig,
    pub input: String,
    #[serde(default)]
    pub metadata: Metadata,
}

/// Request body for pause and end.
#[derive(Debug, Default, Deserialize)]
pub struct ReasonRequest {
    #[serde(default)]
    pub reason: Option<String>,
}

/// Request body for transfer.
#[derive(Debug, Deserialize)]
pub struct TransferRequest {
    pub target: String,
    #[serde(default)]
    pub reason: Option<String>,
}

/// Query parameters for message listing.
#[derive(Debug, Deserialize)]
pub struct MessageListQuery {
    #[serde(default)]
    pub limit: Option<usize>,
    #[serde(default)]
    pub offset: Option<usize>,
}

/// Parse a UUID from a path parameter, returning a 400 error on invalid format.
pub(crate) fn parse_uuid(s: &str) -> Result<Uuid, AppError> {
    s.parse::<Uuid>()
        .map_err(|_| AppError::Validation(format!("Invalid UUID: {s}")))
}

/// POST /api/v1/conversations/{id}/turns
pub async fn process_turn(
    State(state): State<AppState>,
    Path(id): Path<String>,
    Json(body): Json<TurnRequest>,
) -> Result<Json<ApiResponse<TurnResult>>, AppError> {
    let start = Instant::now();
    let conversation_id = parse_uuid(&id)?;

    let result = traced_turn(
        conversation_id,
        &body.agent,
        state
            .orchestrator
            .process_turn(conversation_id, &body.agent, &body.input, body.metadata),
    )
    .await?;

    Ok(Json(
        ApiResponse::timed(result, start).with_link(
            "messages",
            &format!("/api/v1/conversations/{conversation_id}/messages"),
        ),
    ))
}

/// POST /api/v1/conversations/{id}/pause
pub async fn pause_conversation(
    State(state): State<AppState>,
    Path(id): Path<String>,
    body: Option<Json<ReasonRequest>>,
) -> Result<Json<ApiResponse<Conversation>>, AppError> {
    let start = Instant::now();
    let conversation_id = parse_uuid(&id)?;
    let reason = body.map(|Json(b)| b).unwrap_or_default().reason;

    let conversation = state
        .orchestrator
        .pause_conversation(conversation_id, reason.as_deref())
        .await?;

    Ok(Json(ApiResponse::timed(conversation, start)))
}

/// POST /api/v1/conversations/{id}/end
pub async fn end_conversation(
    State(state): State<AppState>,
    Path(id): Path<String>,
    body: Option<Json<ReasonRequest>>,
) -> Result<Json<ApiResponse<Conversation>>, AppError> {
    let start = Instant::now();
    let conversation_id = parse_uuid(&id)?;
    let reason = body.map(|Json(b)| b).unwrap_or_default().reason;

    let conversation = state
        .orchestrator
        .end_conversation(conversation_id, reason.as_deref())
        .await?;

    Ok(Json(ApiResponse::timed(conversation, start)))
}

/// POST /api/v1/conversations/{id}/transfer
pub async fn transfer_conversation(
    State(state): State<AppState>,
    Path(id): Path<String>,
    Json(body): Json<TransferRequest>,
) -> Result<Json<ApiResponse<Conversation>>, AppError> {
    let start = Instant::now();
    let conversation_id = parse_uuid(&id)?;

    let conversation = state
        .orchestrator
        .transfer_conversation(conversation_id, &body.target, body.reason.as_deref())
        .await?;

    Ok(Json(ApiResponse::timed(conversation, start)))
}

/// GET /api/v1/conversations/{id}
pub async fn get_conversation(
    State(state): State<AppState>,
    Path(id): Path<String>,
) -> Result<Json<ApiResponse<Conversation>>, AppError> {
    let start = Instant::now();
    let conversation_id = parse_uuid(&id)?;

    let conversation = state.orchestrator.get_conversation(conversation_id).await?;

    Ok(Json(
        ApiResponse::timed(conversation, start).with_link(
            "messages",
            &format!("/api/v1/conversations/{conversation_id}/messages"),
        ),
    ))
}

/// GET /api/v1/conversations/{id}/messages
///
/// Oldest first. `offset`/`limit` page through the transcript.
pub async fn list_messages(
    State(state): State<AppState>,
    Path(id): Path<String>,
    Query(query): Query<MessageListQuery>,
) -> Result<Json<ApiResponse<Vec<ConversationMessage>>>, AppError> {
    let start = Instant::now();
    let conversation_id = parse_uuid(&id)?;

    let messages = state.orchestrator.list_messages(conversation_id).await?;
    let page = messages
        .into_iter()
        .skip(query.offset.unwrap_or(0))
        .take(query.limit.unwrap_or(usize::MAX))
        .collect();

    Ok(Json(ApiResponse::timed(page, start)))
}

/// PUT /api/v1/conversations/{id}/metadata/{key}
///
/// The body is the raw JSON value to store under `key`.
pub async fn annotate_conversation(
    State(state): State<AppState>,
    Path((id, key)): Path<(String, String)>,
    Json(value): Json<serde_json::Value>,
) -> Result<Json<ApiResponse<Conversation>>, AppError> {
    let start = Instant::now();
    let conversation_id = parse_uuid(&id)?;

    let conversation = state
        .orchestrator
        .annotate_conversation(conversation_id, &key, value)
        .await?;

    Ok(Json(ApiResponse::timed(conversation, start)))
}
