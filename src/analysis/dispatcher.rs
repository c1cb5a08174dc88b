use chrono::Utc;
use serde::Serialize;
use std::collections::VecDeque;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, Mutex, PoisonError};
use std::time::Duration;
use tokio::sync::{watch, RwLock};
use tokio::time::Instant;
use tracing::{debug, error, warn};

use crate::audio::encode_wav;
use crate::metrics::MetricsHistory;

use super::client::{AnalysisError, AnalyzerClient};
use super::types::AnalysisRequestConfig;

/// Dispatcher tuning.
#[derive(Debug, Clone)]
pub struct DispatcherConfig {
    /// Minimum spacing between sends.
    pub min_interval: Duration,
    /// Bounded overflow queue; submissions beyond this are dropped
    /// (newest-drop, to bound latency rather than keep everything).
    pub queue_capacity: usize,
    /// Per-request network timeout.
    pub request_timeout: Duration,
    /// Parameters forwarded with every analysis request.
    pub request: AnalysisRequestConfig,
}

impl Default for DispatcherConfig {
    fn default() -> Self {
        Self {
            min_interval: Duration::from_millis(500),
            queue_capacity: 5,
            request_timeout: Duration::from_secs(3),
            request: AnalysisRequestConfig::default(),
        }
    }
}

/// Dispatcher states. At most one request is in flight whenever the state is
/// `Sending`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub enum DispatchState {
    Idle,
    Sending,
}

/// What happened to a submission.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SubmitOutcome {
    Sent,
    Queued,
    Dropped,
}

/// Counters exposed for status reporting.
#[derive(Debug, Clone, Copy, Serialize)]
pub struct DispatcherStats {
    pub state: DispatchState,
    pub queued: usize,
    pub sent: u64,
    pub dropped: u64,
    pub failures: u64,
    pub no_speech: u64,
}

struct PendingAnalysis {
    samples: Vec<f32>,
    sample_rate: u32,
}

struct DispatchInner {
    state: DispatchState,
    queue: VecDeque<PendingAnalysis>,
    last_send: Option<Instant>,
}

/// Rate-limits outbound analysis calls: at most one in flight, bounded
/// overflow queue, minimum spacing between sends.
///
/// `submit` is synchronous and never blocks the capture path; network work
/// happens on spawned tasks. Submission order is not preserved under the
/// newest-drop overflow policy — an accepted trade-off favoring latency.
pub struct AnalysisDispatcher {
    config: DispatcherConfig,
    client: Arc<dyn AnalyzerClient>,
    history: Arc<RwLock<MetricsHistory>>,
    /// Epoch of the session this dispatcher belongs to.
    epoch: u64,
    /// Epoch of the most recently started session; results are discarded
    /// when the two no longer match.
    live_epoch: Arc<AtomicU64>,
    inner: Mutex<DispatchInner>,
    cancel: watch::Sender<bool>,
    sent: AtomicU64,
    dropped: AtomicU64,
    failures: AtomicU64,
    no_speech: AtomicU64,
}

impl AnalysisDispatcher {
    pub fn new(
        config: DispatcherConfig,
        client: Arc<dyn AnalyzerClient>,
        history: Arc<RwLock<MetricsHistory>>,
        epoch: u64,
        live_epoch: Arc<AtomicU64>,
    ) -> Arc<Self> {
        let (cancel, _) = watch::channel(false);
        Arc::new(Self {
            config,
            client,
            history,
            epoch,
            live_epoch,
            inner: Mutex::new(DispatchInner {
                state: DispatchState::Idle,
                queue: VecDeque::new(),
                last_send: None,
            }),
            cancel,
            sent: AtomicU64::new(0),
            dropped: AtomicU64::new(0),
            failures: AtomicU64::new(0),
            no_speech: AtomicU64::new(0),
        })
    }

    /// Submit a buffer for analysis. Never blocks: the buffer is either sent
    /// immediately, queued, or dropped when the queue is full.
    pub fn submit(self: &Arc<Self>, samples: Vec<f32>, sample_rate: u32) -> SubmitOutcome {
        if *self.cancel.borrow() {
            return SubmitOutcome::Dropped;
        }

        let pending = PendingAnalysis {
            samples,
            sample_rate,
        };

        let to_send = {
            let mut inner = self.lock_inner();
            let due = inner
                .last_send
                .map_or(true, |t| t.elapsed() >= self.config.min_interval);

            if inner.state == DispatchState::Sending || !due {
                if inner.queue.len() >= self.config.queue_capacity {
                    self.dropped.fetch_add(1, Ordering::SeqCst);
                    debug!("Analysis queue full, dropping newest submission");
                    return SubmitOutcome::Dropped;
                }
                inner.queue.push_back(pending);
                return SubmitOutcome::Queued;
            }

            // Due and idle: older queued buffers go out before this one.
            inner.queue.push_back(pending);
            let outcome = if inner.queue.len() == 1 {
                SubmitOutcome::Sent
            } else {
                SubmitOutcome::Queued
            };
            let Some(next) = inner.queue.pop_front() else {
                return outcome; // unreachable: just pushed
            };
            inner.state = DispatchState::Sending;
            inner.last_send = Some(Instant::now());
            (next, outcome)
        };

        let (next, outcome) = to_send;
        let this = Arc::clone(self);
        tokio::spawn(async move {
            this.send_loop(next).await;
        });
        outcome
    }

    /// Cancel the in-flight request (best effort), clear the queue, and
    /// refuse further submissions.
    pub fn shutdown(&self) {
        self.cancel.send_replace(true);
        let mut inner = self.lock_inner();
        let discarded = inner.queue.len();
        inner.queue.clear();
        if discarded > 0 {
            debug!("Discarded {} queued analysis buffers on shutdown", discarded);
        }
    }

    pub fn state(&self) -> DispatchState {
        self.lock_inner().state
    }

    pub fn queue_len(&self) -> usize {
        self.lock_inner().queue.len()
    }

    pub fn stats(&self) -> DispatcherStats {
        let inner = self.lock_inner();
        DispatcherStats {
            state: inner.state,
            queued: inner.queue.len(),
            sent: self.sent.load(Ordering::SeqCst),
            dropped: self.dropped.load(Ordering::SeqCst),
            failures: self.failures.load(Ordering::SeqCst),
            no_speech: self.no_speech.load(Ordering::SeqCst),
        }
    }

    fn lock_inner(&self) -> std::sync::MutexGuard<'_, DispatchInner> {
        self.inner.lock().unwrap_or_else(PoisonError::into_inner)
    }

    /// Drain loop: send the current buffer, then keep dequeuing the oldest
    /// queued buffer (re-checking the interval) until the queue is empty.
    async fn send_loop(self: Arc<Self>, mut pending: PendingAnalysis) {
        loop {
            self.send_one(pending).await;

            let next = {
                let mut inner = self.lock_inner();
                match inner.queue.pop_front() {
                    Some(next) => Some(next),
                    None => {
                        inner.state = DispatchState::Idle;
                        None
                    }
                }
            };
            let Some(next) = next else {
                return;
            };

            let wait = {
                let inner = self.lock_inner();
                inner.last_send.map_or(Duration::ZERO, |t| {
                    self.config.min_interval.saturating_sub(t.elapsed())
                })
            };
            if !wait.is_zero() {
                tokio::time::sleep(wait).await;
            }
            if *self.cancel.borrow() {
                let mut inner = self.lock_inner();
                inner.state = DispatchState::Idle;
                return;
            }
            {
                let mut inner = self.lock_inner();
                inner.last_send = Some(Instant::now());
            }
            pending = next;
        }
    }

    async fn send_one(&self, pending: PendingAnalysis) {
        if *self.cancel.borrow() {
            return;
        }
        let blob = match encode_wav(&pending.samples, pending.sample_rate) {
            Ok(blob) => blob,
            Err(e) => {
                error!("Failed to encode analysis buffer: {}", e);
                self.failures.fetch_add(1, Ordering::SeqCst);
                return;
            }
        };

        self.sent.fetch_add(1, Ordering::SeqCst);

        let mut cancel_rx = self.cancel.subscribe();
        let call = self.client.analyze(&blob, &self.config.request);
        let result = tokio::select! {
            res = tokio::time::timeout(self.config.request_timeout, call) => {
                match res {
                    Ok(inner) => inner,
                    Err(_) => Err(AnalysisError::Timeout),
                }
            }
            _ = cancel_rx.changed() => {
                debug!("In-flight analysis request aborted");
                return;
            }
        };

        match result {
            Ok(Some(analysis)) => {
                // Late responses from a cancelled or replaced session must
                // not touch the shared history.
                if *self.cancel.borrow() || self.live_epoch.load(Ordering::SeqCst) != self.epoch {
                    debug!("Discarding stale analysis result from epoch {}", self.epoch);
                    return;
                }
                let sample = analysis.into_sample(Utc::now());
                self.history.write().await.append(sample);
            }
            Ok(None) => {
                self.no_speech.fetch_add(1, Ordering::SeqCst);
                debug!("Analysis returned no speech");
            }
            Err(e) => {
                self.failures.fetch_add(1, Ordering::SeqCst);
                warn!("Analysis request failed: {}", e);
            }
        }
    }
}
