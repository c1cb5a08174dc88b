use super::state::AppState;
use crate::audio::{CaptureBackendFactory, CaptureSource};
use crate::persistence::{ArtifactStore, RecordingMetadata, StoredRecording};
use crate::pipeline::{Pipeline, PipelineStatus};
use crate::session::SessionStats;
use axum::{
    extract::{Path, Query, State},
    http::StatusCode,
    response::{IntoResponse, Json},
};
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use tracing::{error, info, warn};

// ============================================================================
// Request/Response Types
// ============================================================================

#[derive(Debug, Deserialize)]
pub struct StartSessionRequest {
    /// Optional session ID (if not provided, generate UUID)
    pub session_id: Option<String>,

    /// Capture input override: "silence", "tone", or a path to a WAV file
    pub input: Option<String>,
}

#[derive(Debug, Serialize)]
pub struct StartSessionResponse {
    pub session_id: String,
    pub status: String,
    pub message: String,
}

#[derive(Debug, Serialize)]
pub struct StopSessionResponse {
    pub session_id: String,
    pub status: String,
    pub stats: SessionStats,
    /// Where the artifact landed, if one existed
    pub recording: Option<StoredRecording>,
    /// True when the upload fell back to the local cache
    pub degraded: bool,
}

#[derive(Debug, Deserialize)]
pub struct MetricsQuery {
    /// Aggregation window in milliseconds (default: 30 s)
    pub window_ms: Option<u64>,
}

#[derive(Debug, Serialize)]
pub struct ErrorResponse {
    pub error: String,
}

// ============================================================================
// Handlers
// ============================================================================

fn parse_capture_source(input: Option<&str>, sample_rate: u32) -> CaptureSource {
    match input {
        Some("tone") => CaptureSource::Tone {
            sample_rate,
            hz: 220.0,
        },
        Some("silence") | None => CaptureSource::Silence { sample_rate },
        Some(path) => CaptureSource::File(path.into()),
    }
}

/// POST /sessions/start
/// Start a new recording session
pub async fn start_session(
    State(state): State<AppState>,
    Json(req): Json<StartSessionRequest>,
) -> impl IntoResponse {
    let session_id = req
        .session_id
        .unwrap_or_else(|| format!("session-{}", uuid::Uuid::new_v4()));

    info!("Starting recording session: {}", session_id);

    {
        let sessions = state.sessions.read().await;
        if sessions.contains_key(&session_id) {
            return (
                StatusCode::CONFLICT,
                Json(ErrorResponse {
                    error: format!("Session {} is already recording", session_id),
                }),
            )
                .into_response();
        }
    }

    let pipeline_config = state.config.pipeline_config(session_id.clone());
    let capture_config = pipeline_config.capture.clone();
    let input = req.input.or_else(|| state.config.audio.input.clone());
    let source = parse_capture_source(input.as_deref(), state.config.audio.sample_rate);

    let backend = match CaptureBackendFactory::create(source, capture_config) {
        Ok(backend) => backend,
        Err(e) => {
            error!("Failed to create capture backend: {}", e);
            return (
                StatusCode::INTERNAL_SERVER_ERROR,
                Json(ErrorResponse {
                    error: format!("Failed to create capture backend: {}", e),
                }),
            )
                .into_response();
        }
    };

    let pipeline = Arc::new(Pipeline::new(
        pipeline_config,
        Arc::clone(&state.analyzer),
        Arc::clone(&state.history),
        Arc::clone(&state.live_epoch),
        Arc::clone(&state.telemetry),
    ));

    if let Err(e) = pipeline.start(backend).await {
        error!("Failed to start recording: {}", e);
        return (
            StatusCode::INTERNAL_SERVER_ERROR,
            Json(ErrorResponse {
                error: format!("Failed to start recording: {}", e),
            }),
        )
            .into_response();
    }

    {
        let mut sessions = state.sessions.write().await;
        sessions.insert(session_id.clone(), pipeline);
    }

    info!("Recording started successfully for session: {}", session_id);

    (
        StatusCode::OK,
        Json(StartSessionResponse {
            session_id: session_id.clone(),
            status: "recording".to_string(),
            message: format!("Recording started for session {}", session_id),
        }),
    )
        .into_response()
}

/// POST /sessions/stop/:session_id
/// Stop a recording session and persist its artifact
pub async fn stop_session(
    State(state): State<AppState>,
    Path(session_id): Path<String>,
) -> impl IntoResponse {
    info!("Stopping recording session: {}", session_id);

    let pipeline = {
        let mut sessions = state.sessions.write().await;
        sessions.remove(&session_id)
    };

    let Some(pipeline) = pipeline else {
        error!("Session {} not found", session_id);
        return (
            StatusCode::NOT_FOUND,
            Json(ErrorResponse {
                error: format!("Session {} not found", session_id),
            }),
        )
            .into_response();
    };

    let stats = match pipeline.stop().await {
        Ok(stats) => stats,
        Err(e) => {
            error!("Failed to stop recording: {}", e);
            return (
                StatusCode::INTERNAL_SERVER_ERROR,
                Json(ErrorResponse {
                    error: format!("Failed to stop recording: {}", e),
                }),
            )
                .into_response();
        }
    };

    // Persist whatever artifact the session produced; the session guarantees
    // a non-empty one unless it errored with no data at all.
    let mut recording = None;
    let mut degraded = false;
    if let Some(artifact) = pipeline.artifact() {
        let metadata = RecordingMetadata {
            duration_secs: artifact.duration_seconds(),
            analysis_summary: state.aggregator.average_over(30_000).await,
        };
        match state.store.upload_with_fallback(&artifact, &metadata).await {
            Ok((stored, was_degraded)) => {
                recording = Some(stored);
                degraded = was_degraded;
            }
            Err(e) => {
                // Non-fatal: the stop still succeeds, storage just failed.
                warn!("Failed to persist recording: {}", e);
            }
        }
    }

    info!("Recording stopped successfully for session: {}", session_id);

    (
        StatusCode::OK,
        Json(StopSessionResponse {
            session_id,
            status: stats.phase.clone(),
            stats,
            recording,
            degraded,
        }),
    )
        .into_response()
}

/// GET /sessions/:session_id/status
/// Live status of a recording session
pub async fn session_status(
    State(state): State<AppState>,
    Path(session_id): Path<String>,
) -> impl IntoResponse {
    let sessions = state.sessions.read().await;

    match sessions.get(&session_id) {
        Some(pipeline) => {
            let status: PipelineStatus = pipeline.status();
            (StatusCode::OK, Json(status)).into_response()
        }
        None => (
            StatusCode::NOT_FOUND,
            Json(ErrorResponse {
                error: format!("Session {} not found", session_id),
            }),
        )
            .into_response(),
    }
}

/// GET /metrics?window_ms=30000
/// Recency-weighted aggregation over the shared metrics history
pub async fn metrics_window(
    State(state): State<AppState>,
    Query(query): Query<MetricsQuery>,
) -> impl IntoResponse {
    let window_ms = query.window_ms.unwrap_or(30_000);

    match state.aggregator.average_over(window_ms).await {
        Some(window) => (StatusCode::OK, Json(window)).into_response(),
        None => (
            StatusCode::NOT_FOUND,
            Json(ErrorResponse {
                error: "No speech metrics recorded yet".to_string(),
            }),
        )
            .into_response(),
    }
}

/// GET /recordings
/// List persisted recordings
pub async fn list_recordings(State(state): State<AppState>) -> impl IntoResponse {
    match state.store.fetch_all().await {
        Ok(records) => (StatusCode::OK, Json(records)).into_response(),
        Err(e) => {
            error!("Failed to list recordings: {}", e);
            (
                StatusCode::INTERNAL_SERVER_ERROR,
                Json(ErrorResponse {
                    error: format!("Failed to list recordings: {}", e),
                }),
            )
                .into_response()
        }
    }
}

/// DELETE /recordings/:id
/// Delete a persisted recording
pub async fn delete_recording(
    State(state): State<AppState>,
    Path(id): Path<String>,
) -> impl IntoResponse {
    match state.store.delete(&id).await {
        Ok(()) => StatusCode::NO_CONTENT.into_response(),
        Err(crate::persistence::PersistenceError::NotFound(id)) => (
            StatusCode::NOT_FOUND,
            Json(ErrorResponse {
                error: format!("Recording {} not found", id),
            }),
        )
            .into_response(),
        Err(e) => {
            error!("Failed to delete recording: {}", e);
            (
                StatusCode::INTERNAL_SERVER_ERROR,
                Json(ErrorResponse {
                    error: format!("Failed to delete recording: {}", e),
                }),
            )
                .into_response()
        }
    }
}

/// GET /health
/// Health check endpoint
pub async fn health_check() -> impl IntoResponse {
    (StatusCode::OK, "OK")
}
