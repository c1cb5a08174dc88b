//! Best-effort telemetry boundary.
//!
//! Per-frame observations are low-priority: the sink must never block the
//! capture path, delivery is unordered, and frames may be dropped under
//! pressure. Transport mechanics live behind [`TelemetrySink`].

use serde::Serialize;
use tokio::sync::mpsc;
use tracing::debug;

/// One frame-level observation published while capturing.
#[derive(Debug, Clone, Serialize)]
pub struct FrameTelemetry {
    pub session_id: String,
    pub sequence: u64,
    pub timestamp_ms: u64,
    pub is_speech: bool,
    /// Local syllable-rate hint in syllables/second
    pub rate_hint: f64,
}

/// Non-blocking, lossy publisher for frame telemetry.
pub trait TelemetrySink: Send + Sync {
    fn try_publish(&self, frame: FrameTelemetry);
}

/// Discards everything.
pub struct NoopSink;

impl TelemetrySink for NoopSink {
    fn try_publish(&self, _frame: FrameTelemetry) {}
}

/// Forwards frames into a bounded channel; drops when the consumer lags.
pub struct ChannelSink {
    tx: mpsc::Sender<FrameTelemetry>,
}

impl ChannelSink {
    pub fn new(capacity: usize) -> (Self, mpsc::Receiver<FrameTelemetry>) {
        let (tx, rx) = mpsc::channel(capacity);
        (Self { tx }, rx)
    }
}

impl TelemetrySink for ChannelSink {
    fn try_publish(&self, frame: FrameTelemetry) {
        if self.tx.try_send(frame).is_err() {
            debug!("Telemetry frame dropped (consumer lagging or gone)");
        }
    }
}
