//! HTTP API server for external control (UI layer)
//!
//! This module provides a REST API for driving the capture pipeline:
//! - POST /sessions/start - Start a new recording session
//! - POST /sessions/stop/:id - Stop a session and persist its artifact
//! - GET /sessions/:id/status - Query live session status
//! - GET /metrics?window_ms= - Recency-weighted metric aggregation
//! - GET /recordings - List persisted recordings
//! - DELETE /recordings/:id - Delete a persisted recording
//! - GET /health - Health check

mod handlers;
mod routes;
mod state;

pub use routes::create_router;
pub use state::AppState;
