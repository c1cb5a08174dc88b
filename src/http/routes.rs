use super::handlers;
use super::state::AppState;
use axum::{
    routing::{delete, get, post},
    Router,
};
use tower_http::cors::CorsLayer;
use tower_http::trace::TraceLayer;

/// Create the HTTP router with all routes
pub fn create_router(state: AppState) -> Router {
    Router::new()
        // Health check
        .route("/health", get(handlers::health_check))
        // Session control
        .route("/sessions/start", post(handlers::start_session))
        .route("/sessions/stop/:session_id", post(handlers::stop_session))
        .route(
            "/sessions/:session_id/status",
            get(handlers::session_status),
        )
        // Aggregated metrics
        .route("/metrics", get(handlers::metrics_window))
        // Persisted recordings
        .route("/recordings", get(handlers::list_recordings))
        .route("/recordings/:id", delete(handlers::delete_recording))
        // Browser clients talk to this API directly
        .layer(CorsLayer::permissive())
        // Add tracing middleware for request logging
        .layer(TraceLayer::new_for_http())
        .with_state(state)
}
