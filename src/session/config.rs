use serde::{Deserialize, Serialize};
use std::time::Duration;

/// Configuration for a recording session
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SessionConfig {
    /// Unique session identifier (e.g., "session-2026-08-07-practice")
    pub session_id: String,

    /// Sample rate used for the fallback artifact when no chunks arrived
    pub sample_rate: u32,

    /// Number of audio channels (1 = mono)
    pub channels: u16,

    /// Bounded wait for trailing chunks after the stop signal; some capture
    /// backends deliver the final chunk asynchronously
    pub flush_timeout: Duration,

    /// Duration of the synthesized silent artifact when the capture produced
    /// nothing usable
    pub fallback_silence_secs: f64,
}

impl Default for SessionConfig {
    fn default() -> Self {
        Self {
            session_id: format!("session-{}", uuid::Uuid::new_v4()),
            sample_rate: 16000,
            channels: 1,
            flush_timeout: Duration::from_millis(500),
            fallback_silence_secs: 1.0,
        }
    }
}
