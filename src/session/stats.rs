use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// Statistics about a recording session
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SessionStats {
    /// Current lifecycle phase label
    pub phase: String,

    /// When the session was created
    pub started_at: DateTime<Utc>,

    /// Total duration in seconds
    pub duration_secs: f64,

    /// Number of audio chunks accumulated so far
    pub chunks_count: usize,

    /// Size of the finalized artifact in bytes (0 until finalized)
    pub artifact_bytes: usize,
}
