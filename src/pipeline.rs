//! Per-session capture pipeline.
//!
//! One owned `Pipeline` per recording attempt: capture frames flow into the
//! local heuristics, the session's chunk buffer, and (on the dispatcher's
//! slower cadence) the remote analyzer. No free-standing module state
//! survives across sessions.

use anyhow::{Context, Result};
use serde::Serialize;
use std::collections::VecDeque;
use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::sync::{Arc, PoisonError, RwLock as StdRwLock};
use tokio::sync::{Mutex, RwLock};
use tokio::task::JoinHandle;
use tracing::{debug, info, warn};

use crate::analysis::{
    AnalysisDispatcher, AnalyzerClient, BreakerConfig, DispatcherConfig, DispatcherStats,
    GuardedAnalyzer,
};
use crate::audio::{
    syllable_rate_to_wpm, CaptureBackend, CaptureConfig, HeuristicsConfig, LocalEstimate,
    SpeechHeuristics, WavBlob,
};
use crate::metrics::MetricsHistory;
use crate::session::{RecordingSession, SessionConfig, SessionPhase, SessionStats};
use crate::telemetry::{FrameTelemetry, TelemetrySink};

static NEXT_EPOCH: AtomicU64 = AtomicU64::new(1);

/// Allocate the monotonically increasing epoch for a new session.
pub fn next_session_epoch() -> u64 {
    NEXT_EPOCH.fetch_add(1, Ordering::SeqCst)
}

/// Everything a pipeline needs to run one session.
#[derive(Debug, Clone)]
pub struct PipelineConfig {
    pub capture: CaptureConfig,
    pub heuristics: HeuristicsConfig,
    pub dispatcher: DispatcherConfig,
    pub breaker: BreakerConfig,
    pub session: SessionConfig,
    /// Length of the rolling sample window handed to the analyzer.
    pub analysis_window_secs: f64,
}

impl Default for PipelineConfig {
    fn default() -> Self {
        Self {
            capture: CaptureConfig::default(),
            heuristics: HeuristicsConfig::default(),
            dispatcher: DispatcherConfig::default(),
            breaker: BreakerConfig::default(),
            session: SessionConfig::default(),
            analysis_window_secs: 2.0,
        }
    }
}

impl PipelineConfig {
    pub fn with_session_id(mut self, session_id: impl Into<String>) -> Self {
        self.session.session_id = session_id.into();
        self
    }
}

/// Combined live status for one pipeline.
#[derive(Debug, Clone, Serialize)]
pub struct PipelineStatus {
    pub session: SessionStats,
    pub dispatcher: DispatcherStats,
    pub local_estimate: LocalEstimate,
}

/// Owns one recording session end to end: capture task, heuristics,
/// dispatcher, and the session state machine.
pub struct Pipeline {
    config: PipelineConfig,
    session: Arc<RecordingSession>,
    dispatcher: Arc<AnalysisDispatcher>,
    heuristics: SpeechHeuristics,
    local_estimate: Arc<StdRwLock<LocalEstimate>>,
    live_epoch: Arc<AtomicU64>,
    telemetry: Arc<dyn TelemetrySink>,
    backend: Mutex<Option<Box<dyn CaptureBackend>>>,
    consumer: Mutex<Option<JoinHandle<()>>>,
    stopping: Arc<AtomicBool>,
}

impl Pipeline {
    pub fn new(
        config: PipelineConfig,
        client: Arc<dyn AnalyzerClient>,
        history: Arc<RwLock<MetricsHistory>>,
        live_epoch: Arc<AtomicU64>,
        telemetry: Arc<dyn TelemetrySink>,
    ) -> Self {
        let epoch = next_session_epoch();
        let session = Arc::new(RecordingSession::new(config.session.clone(), epoch));
        let local_estimate = Arc::new(StdRwLock::new(LocalEstimate::default()));

        let guarded: Arc<dyn AnalyzerClient> = Arc::new(GuardedAnalyzer::new(
            client,
            config.breaker.clone(),
            Arc::clone(&history),
            Arc::clone(&local_estimate),
        ));
        let dispatcher = AnalysisDispatcher::new(
            config.dispatcher.clone(),
            guarded,
            history,
            epoch,
            Arc::clone(&live_epoch),
        );

        Self {
            heuristics: SpeechHeuristics::new(config.heuristics.clone()),
            config,
            session,
            dispatcher,
            local_estimate,
            live_epoch,
            telemetry,
            backend: Mutex::new(None),
            consumer: Mutex::new(None),
            stopping: Arc::new(AtomicBool::new(false)),
        }
    }

    pub fn id(&self) -> &str {
        self.session.id()
    }

    pub fn session(&self) -> &Arc<RecordingSession> {
        &self.session
    }

    pub fn artifact(&self) -> Option<WavBlob> {
        self.session.artifact()
    }

    pub fn status(&self) -> PipelineStatus {
        PipelineStatus {
            session: self.session.stats(),
            dispatcher: self.dispatcher.stats(),
            local_estimate: *self
                .local_estimate
                .read()
                .unwrap_or_else(PoisonError::into_inner),
        }
    }

    /// Acquire the capture device and start the frame loop. A device failure
    /// here leaves the session in Idle so the caller may retry with a new
    /// session.
    pub async fn start(&self, mut backend: Box<dyn CaptureBackend>) -> Result<()> {
        let mut rx = backend
            .start()
            .await
            .context("Failed to start audio capture")?;

        self.session.begin_capture()?;
        // This session is now the live one; stale results from replaced
        // sessions get filtered against this epoch.
        self.live_epoch.store(self.session.epoch(), Ordering::SeqCst);

        info!(
            "Pipeline started for session {} (backend: {})",
            self.session.id(),
            backend.name()
        );

        let session = Arc::clone(&self.session);
        let dispatcher = Arc::clone(&self.dispatcher);
        let heuristics = self.heuristics.clone();
        let local_estimate = Arc::clone(&self.local_estimate);
        let telemetry = Arc::clone(&self.telemetry);
        let stopping = Arc::clone(&self.stopping);
        let window_samples = (self.config.analysis_window_secs
            * self.config.session.sample_rate as f64)
            .max(1.0) as usize;

        let consumer = tokio::spawn(async move {
            let mut window: VecDeque<f32> = VecDeque::with_capacity(window_samples);
            let mut sequence: u64 = 0;

            while let Some(frame) = rx.recv().await {
                let verdict = heuristics.classify(&frame);
                {
                    let mut estimate = local_estimate
                        .write()
                        .unwrap_or_else(PoisonError::into_inner);
                    *estimate = LocalEstimate {
                        is_speech: verdict.is_speech,
                        rate_wpm: syllable_rate_to_wpm(verdict.rate_hint),
                        updated_ms: frame.timestamp_ms,
                    };
                }

                telemetry.try_publish(FrameTelemetry {
                    session_id: session.id().to_string(),
                    sequence,
                    timestamp_ms: frame.timestamp_ms,
                    is_speech: verdict.is_speech,
                    rate_hint: verdict.rate_hint,
                });

                window.extend(frame.samples.iter().copied());
                if window.len() > window_samples {
                    let excess = window.len() - window_samples;
                    window.drain(..excess);
                }

                let sample_rate = frame.sample_rate;
                if let Err(e) = session.push_chunk(frame) {
                    warn!("Dropping frame, session no longer accepting: {}", e);
                    break;
                }

                // The dispatcher enforces its own slower cadence; submitting
                // every tick never blocks this loop.
                dispatcher.submit(window.iter().copied().collect(), sample_rate);
                sequence += 1;
            }

            if !stopping.load(Ordering::SeqCst) && !session.phase().is_terminal() {
                session.fail("capture stream ended unexpectedly");
            }
            debug!("Frame consumer for session {} finished", session.id());
        });

        *self.backend.lock().await = Some(backend);
        *self.consumer.lock().await = Some(consumer);
        Ok(())
    }

    /// Stop capturing, flush trailing frames (bounded wait), cancel any
    /// in-flight analysis, and finalize the session artifact.
    pub async fn stop(&self) -> Result<SessionStats> {
        info!("Stopping pipeline for session {}", self.session.id());
        self.stopping.store(true, Ordering::SeqCst);

        if let Err(e) = self.session.begin_stopping() {
            debug!("Stop on session {}: {}", self.session.id(), e);
        }

        // Abort the in-flight analysis request and drop queued buffers;
        // results from this session must not outlive it.
        self.dispatcher.shutdown();

        let mut capture_error = None;
        if let Some(mut backend) = self.backend.lock().await.take() {
            if let Err(e) = backend.stop().await {
                warn!("Capture backend stop failed: {}", e);
            }
            capture_error = backend.error();
        }

        // Bounded flush: trailing frames may still be in the channel.
        if let Some(mut consumer) = self.consumer.lock().await.take() {
            let flush = tokio::time::timeout(self.config.session.flush_timeout, &mut consumer);
            if flush.await.is_err() {
                warn!(
                    "Flush wait exceeded {:?}, aborting frame consumer",
                    self.config.session.flush_timeout
                );
                consumer.abort();
            }
        }

        if let Some(e) = capture_error {
            self.session.fail(format!("capture device error: {e}"));
        }

        match self.session.phase() {
            SessionPhase::Stopping => {
                self.session.finalize()?;
            }
            SessionPhase::Error => {
                debug!("Session {} already in error state", self.session.id());
            }
            phase => {
                debug!(
                    "Session {} in unexpected phase {} at stop",
                    self.session.id(),
                    phase.label()
                );
            }
        }

        Ok(self.session.stats())
    }
}
