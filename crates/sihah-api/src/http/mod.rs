//! HTTP/REST API layer for Sihah.
//!
//! Axum-based REST API at `/api/v1/` with envelope response format, CORS
//! support, and a WebSocket event stream at `/ws/events`.

pub mod error;
pub mod handlers;
pub mod response;
pub mod router;
