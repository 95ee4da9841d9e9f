//! Axum router configuration with middleware.
//!
//! REST routes are under `/api/v1/`; `/health` and `/ws/events` sit at the
//! root. Middleware: CORS, tracing.

use axum::Router;
use axum::extract::State;
use axum::routing::{get, post, put};
use tower_http::cors::{Any, CorsLayer};
use tower_http::trace::TraceLayer;

use sihah_core::turn::lifecycle::LifecycleState;

use crate::http::handlers;
use crate::state::AppState;

/// Build the complete API router with all routes and middleware.
pub fn build_router(state: AppState) -> Router {
    let cors = CorsLayer::new()
        .allow_origin(Any)
        .allow_methods(Any)
        .allow_headers(Any);

    let api_routes = Router::new()
        // Conversations
        .route(
            "/conversations/{id}",
            get(handlers::conversation::get_conversation),
        )
        .route(
            "/conversations/{id}/turns",
            post(handlers::conversation::process_turn),
        )
        .route(
            "/conversations/{id}/messages",
            get(handlers::conversation::list_messages),
        )
        .route(
            "/conversations/{id}/pause",
            post(handlers::conversation::pause_conversation),
        )
        .route(
            "/conversations/{id}/end",
            post(handlers::conversation::end_conversation),
        )
        .route(
            "/conversations/{id}/transfer",
            post(handlers::conversation::transfer_conversation),
        )
        .route(
            "/conversations/{id}/metadata/{key}",
            put(handlers::conversation::annotate_conversation),
        )
        // Knowledge
        .route(
            "/agents/{id}/documents",
            post(handlers::document::submit),
        )
        .route(
            "/agents/{id}/documents/{document_id}",
            axum::routing::delete(handlers::document::delete),
        )
        .route("/ingest/jobs/{id}", get(handlers::document::get_job));

    Router::new()
        .nest("/api/v1", api_routes)
        .route("/ws/events", get(handlers::ws::ws_handler))
        .route("/health", get(health_check))
        .layer(cors)
        .layer(TraceLayer::new_for_http())
        .with_state(state)
}

/// GET /health - Reports whether the turn pipeline is accepting work.
async fn health_check(State(state): State<AppState>) -> axum::Json<serde_json::Value> {
    let pipeline = state.orchestrator.state();
    axum::Json(serde_json::json!({
        "status": if pipeline == LifecycleState::Ready { "ok" } else { "unavailable" },
        "pipeline": pipeline,
        "retrieval": state.indexer.is_some(),
        "version": env!("CARGO_PKG_VERSION"),
    }))
}
