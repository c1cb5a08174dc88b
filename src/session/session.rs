use chrono::Utc;
use std::sync::{Mutex, PoisonError};
use thiserror::Error;
use tracing::{info, warn};

use crate::audio::{encode_wav, silent_wav, AudioFrame, WavBlob};

use super::config::SessionConfig;
use super::stats::SessionStats;

/// Lifecycle phases of a recording session.
///
/// ```text
/// Idle ──begin_capture──▶ Capturing ──begin_stopping──▶ Stopping
///        Stopping ──finalize──▶ Finalizing ──▶ Ready
///        Capturing / Stopping ──fail──▶ Error
/// ```
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SessionPhase {
    Idle,
    Capturing,
    Stopping,
    Finalizing,
    Ready,
    Error,
}

impl SessionPhase {
    pub fn label(self) -> &'static str {
        match self {
            Self::Idle => "idle",
            Self::Capturing => "capturing",
            Self::Stopping => "stopping",
            Self::Finalizing => "finalizing",
            Self::Ready => "ready",
            Self::Error => "error",
        }
    }

    pub fn is_terminal(self) -> bool {
        matches!(self, Self::Ready | Self::Error)
    }
}

#[derive(Debug, Error)]
pub enum SessionError {
    #[error("invalid session transition from {from}")]
    InvalidTransition { from: &'static str },
    #[error("session is not accepting chunks (phase: {phase})")]
    NotCapturing { phase: &'static str },
    #[error("failed to assemble artifact: {0}")]
    Assembly(String),
}

struct SessionInner {
    phase: SessionPhase,
    chunks: Vec<AudioFrame>,
    artifact: Option<WavBlob>,
    error: Option<String>,
}

/// Owns the lifecycle of one recording attempt.
///
/// All transitions run under one mutex, so concurrent stop/start calls can
/// never double-finalize or lose an update. Once a terminal phase is reached
/// the session is inert; a new session replaces it rather than mutating it.
///
/// The finalize path guarantees a non-empty artifact: when the capture
/// produced nothing usable, a synthesized silent WAV of known duration
/// stands in.
pub struct RecordingSession {
    config: SessionConfig,
    epoch: u64,
    started_at: chrono::DateTime<Utc>,
    inner: Mutex<SessionInner>,
}

impl RecordingSession {
    pub fn new(config: SessionConfig, epoch: u64) -> Self {
        info!("Creating recording session: {}", config.session_id);
        Self {
            config,
            epoch,
            started_at: Utc::now(),
            inner: Mutex::new(SessionInner {
                phase: SessionPhase::Idle,
                chunks: Vec::new(),
                artifact: None,
                error: None,
            }),
        }
    }

    pub fn id(&self) -> &str {
        &self.config.session_id
    }

    /// Monotonically increasing identifier used to match analysis results to
    /// the session that requested them.
    pub fn epoch(&self) -> u64 {
        self.epoch
    }

    pub fn config(&self) -> &SessionConfig {
        &self.config
    }

    pub fn phase(&self) -> SessionPhase {
        self.lock().phase
    }

    /// Idle → Capturing. The caller acquires the device first, so a device
    /// failure leaves the session in Idle.
    pub fn begin_capture(&self) -> Result<(), SessionError> {
        let mut inner = self.lock();
        match inner.phase {
            SessionPhase::Idle => {
                inner.phase = SessionPhase::Capturing;
                info!("Session {} capturing", self.config.session_id);
                Ok(())
            }
            phase => Err(SessionError::InvalidTransition {
                from: phase.label(),
            }),
        }
    }

    /// Append one captured chunk. Accepted while Capturing, and also while
    /// Stopping so that trailing chunks delivered after the stop signal are
    /// still flushed into the artifact.
    pub fn push_chunk(&self, frame: AudioFrame) -> Result<(), SessionError> {
        let mut inner = self.lock();
        match inner.phase {
            SessionPhase::Capturing | SessionPhase::Stopping => {
                inner.chunks.push(frame);
                Ok(())
            }
            phase => Err(SessionError::NotCapturing {
                phase: phase.label(),
            }),
        }
    }

    /// Capturing → Stopping. Idempotent when already Stopping.
    pub fn begin_stopping(&self) -> Result<(), SessionError> {
        let mut inner = self.lock();
        match inner.phase {
            SessionPhase::Capturing => {
                inner.phase = SessionPhase::Stopping;
                info!("Session {} stopping", self.config.session_id);
                Ok(())
            }
            SessionPhase::Stopping => Ok(()),
            phase => Err(SessionError::InvalidTransition {
                from: phase.label(),
            }),
        }
    }

    /// Stopping → Finalizing → Ready. Assembles all accumulated chunks into
    /// one artifact; an empty capture yields the silent fallback instead of
    /// an empty result. Idempotent once Ready.
    pub fn finalize(&self) -> Result<WavBlob, SessionError> {
        let mut inner = self.lock();
        match inner.phase {
            SessionPhase::Ready => {
                // get-artifact after finalize: same artifact every time
                return inner
                    .artifact
                    .clone()
                    .ok_or_else(|| SessionError::Assembly("artifact missing".to_string()));
            }
            SessionPhase::Stopping => {}
            phase => {
                return Err(SessionError::InvalidTransition {
                    from: phase.label(),
                })
            }
        }

        inner.phase = SessionPhase::Finalizing;
        let blob = match Self::assemble(&self.config, &inner.chunks) {
            Ok(blob) => blob,
            Err(e) => {
                inner.phase = SessionPhase::Error;
                inner.error = Some(e.clone());
                return Err(SessionError::Assembly(e));
            }
        };

        info!(
            "Session {} finalized: {} chunks, {} bytes",
            self.config.session_id,
            inner.chunks.len(),
            blob.len()
        );
        inner.artifact = Some(blob.clone());
        inner.phase = SessionPhase::Ready;
        Ok(blob)
    }

    /// Unrecoverable failure while Capturing or Stopping. A partial artifact
    /// is synthesized from whatever chunks arrived, so retrieval may still
    /// succeed in the Error phase.
    pub fn fail(&self, reason: impl Into<String>) {
        let reason = reason.into();
        let mut inner = self.lock();
        if inner.phase.is_terminal() {
            return;
        }
        warn!(
            "Session {} failed during {}: {}",
            self.config.session_id,
            inner.phase.label(),
            reason
        );
        inner.phase = SessionPhase::Error;
        inner.error = Some(reason);

        if inner.artifact.is_none() && !inner.chunks.is_empty() {
            match Self::assemble(&self.config, &inner.chunks) {
                Ok(blob) => inner.artifact = Some(blob),
                Err(e) => warn!("Could not salvage partial artifact: {}", e),
            }
        }
    }

    /// The finalized artifact. Always available once Ready; available in
    /// Error when a partial artifact could be salvaged, `None` otherwise
    /// (the "no data" signal).
    pub fn artifact(&self) -> Option<WavBlob> {
        self.lock().artifact.clone()
    }

    pub fn error_message(&self) -> Option<String> {
        self.lock().error.clone()
    }

    pub fn stats(&self) -> SessionStats {
        let inner = self.lock();
        let duration = Utc::now().signed_duration_since(self.started_at);
        SessionStats {
            phase: inner.phase.label().to_string(),
            started_at: self.started_at,
            duration_secs: duration.num_milliseconds() as f64 / 1000.0,
            chunks_count: inner.chunks.len(),
            artifact_bytes: inner.artifact.as_ref().map_or(0, WavBlob::len),
        }
    }

    fn lock(&self) -> std::sync::MutexGuard<'_, SessionInner> {
        self.inner.lock().unwrap_or_else(PoisonError::into_inner)
    }

    /// Concatenate chunks at the first chunk's sample rate, or synthesize
    /// the silent fallback when nothing usable accumulated.
    fn assemble(config: &SessionConfig, chunks: &[AudioFrame]) -> Result<WavBlob, String> {
        let total: usize = chunks.iter().map(|c| c.samples.len()).sum();
        if total == 0 {
            warn!(
                "Session {} has no captured audio, synthesizing {}s of silence",
                config.session_id, config.fallback_silence_secs
            );
            return silent_wav(config.fallback_silence_secs, config.sample_rate)
                .map_err(|e| e.to_string());
        }

        let sample_rate = chunks
            .first()
            .map_or(config.sample_rate, |c| c.sample_rate);
        let mut samples = Vec::with_capacity(total);
        for chunk in chunks {
            samples.extend_from_slice(&chunk.samples);
        }
        encode_wav(&samples, sample_rate).map_err(|e| e.to_string())
    }
}
