use async_trait::async_trait;
use std::sync::{Arc, Mutex, PoisonError, RwLock as StdRwLock};
use std::time::Duration;
use tokio::sync::RwLock;
use tokio::time::Instant;
use tracing::{debug, warn};

use crate::audio::{LocalEstimate, WavBlob};
use crate::metrics::MetricsHistory;

use super::client::{AnalysisError, AnalyzerClient};
use super::types::{
    clamp_wpm, AnalysisRequestConfig, AnalysisResult, CategoryScore, FluencyCategory,
    PronunciationCategory, TempoCategory, DEFAULT_COERCED_CONFIDENCE, WPM_MIN,
};

/// Circuit-breaker tuning.
#[derive(Debug, Clone)]
pub struct BreakerConfig {
    /// Consecutive failures before the remote capability is marked
    /// unavailable.
    pub failure_threshold: u32,
    /// How long the capability stays unavailable once tripped.
    pub cooldown: Duration,
}

impl Default for BreakerConfig {
    fn default() -> Self {
        Self {
            failure_threshold: 3,
            cooldown: Duration::from_secs(120),
        }
    }
}

#[derive(Debug, Default)]
struct BreakerState {
    consecutive_failures: u32,
    open_until: Option<Instant>,
}

/// Wraps an [`AnalyzerClient`] with a consecutive-failure circuit breaker.
///
/// After `failure_threshold` consecutive failures the remote capability is
/// marked unavailable for `cooldown`; while open, no network call is issued
/// and a locally synthesized result is returned instead, derived from
/// whatever partial data is available (the latest history sample, else the
/// live local estimate, else neutral defaults).
pub struct GuardedAnalyzer {
    inner: Arc<dyn AnalyzerClient>,
    config: BreakerConfig,
    state: Mutex<BreakerState>,
    history: Arc<RwLock<MetricsHistory>>,
    local_estimate: Arc<StdRwLock<LocalEstimate>>,
}

impl GuardedAnalyzer {
    pub fn new(
        inner: Arc<dyn AnalyzerClient>,
        config: BreakerConfig,
        history: Arc<RwLock<MetricsHistory>>,
        local_estimate: Arc<StdRwLock<LocalEstimate>>,
    ) -> Self {
        Self {
            inner,
            config,
            state: Mutex::new(BreakerState::default()),
            history,
            local_estimate,
        }
    }

    /// True while the breaker is open. Expired cooldowns are cleared here so
    /// the next call goes back out over the network.
    fn is_open(&self) -> bool {
        let mut state = self.state.lock().unwrap_or_else(PoisonError::into_inner);
        match state.open_until {
            Some(until) if Instant::now() < until => true,
            Some(_) => {
                debug!("Analyzer cooldown expired, retrying remote calls");
                state.open_until = None;
                state.consecutive_failures = 0;
                false
            }
            None => false,
        }
    }

    fn record_success(&self) {
        let mut state = self.state.lock().unwrap_or_else(PoisonError::into_inner);
        state.consecutive_failures = 0;
    }

    fn record_failure(&self) {
        let mut state = self.state.lock().unwrap_or_else(PoisonError::into_inner);
        state.consecutive_failures += 1;
        if state.consecutive_failures >= self.config.failure_threshold {
            warn!(
                "Remote analyzer unavailable after {} consecutive failures, cooling down for {:?}",
                state.consecutive_failures, self.config.cooldown
            );
            state.open_until = Some(Instant::now() + self.config.cooldown);
        }
    }

    pub fn consecutive_failures(&self) -> u32 {
        self.state
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .consecutive_failures
    }

    /// Synthesize a stand-in result from local data while the remote
    /// capability is unavailable.
    async fn synthesize(&self) -> AnalysisResult {
        if let Some(latest) = self.history.read().await.latest() {
            return AnalysisResult {
                fluency: latest.fluency,
                tempo: latest.tempo,
                pronunciation: latest.pronunciation,
                speech_rate_wpm: latest.speech_rate_wpm,
            };
        }

        let estimate = *self
            .local_estimate
            .read()
            .unwrap_or_else(PoisonError::into_inner);
        let rate = if estimate.rate_wpm > 0.0 {
            clamp_wpm(estimate.rate_wpm)
        } else {
            WPM_MIN
        };

        AnalysisResult {
            fluency: CategoryScore {
                category: FluencyCategory::default(),
                confidence: DEFAULT_COERCED_CONFIDENCE,
            },
            tempo: CategoryScore {
                category: TempoCategory::default(),
                confidence: DEFAULT_COERCED_CONFIDENCE,
            },
            pronunciation: CategoryScore {
                category: PronunciationCategory::default(),
                confidence: DEFAULT_COERCED_CONFIDENCE,
            },
            speech_rate_wpm: rate,
        }
    }
}

#[async_trait]
impl AnalyzerClient for GuardedAnalyzer {
    fn name(&self) -> &str {
        "guarded-analyzer"
    }

    async fn analyze(
        &self,
        audio: &WavBlob,
        request: &AnalysisRequestConfig,
    ) -> Result<Option<AnalysisResult>, AnalysisError> {
        if self.is_open() {
            debug!("Analyzer circuit open, returning synthesized result");
            return Ok(Some(self.synthesize().await));
        }

        match self.inner.analyze(audio, request).await {
            Ok(result) => {
                // "No speech" counts as a healthy round trip.
                self.record_success();
                Ok(result)
            }
            Err(e) => {
                self.record_failure();
                Err(e)
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::audio::encode_wav;
    use std::sync::atomic::{AtomicUsize, Ordering};

    struct FailingClient {
        calls: AtomicUsize,
    }

    #[async_trait]
    impl AnalyzerClient for FailingClient {
        fn name(&self) -> &str {
            "failing"
        }

        async fn analyze(
            &self,
            _audio: &WavBlob,
            _request: &AnalysisRequestConfig,
        ) -> Result<Option<AnalysisResult>, AnalysisError> {
            self.calls.fetch_add(1, Ordering::SeqCst);
            Err(AnalysisError::Network("connection refused".to_string()))
        }
    }

    fn guarded(client: Arc<FailingClient>) -> GuardedAnalyzer {
        GuardedAnalyzer::new(
            client,
            BreakerConfig {
                failure_threshold: 3,
                cooldown: Duration::from_secs(60),
            },
            Arc::new(RwLock::new(MetricsHistory::new())),
            Arc::new(StdRwLock::new(LocalEstimate::default())),
        )
    }

    #[tokio::test]
    async fn trips_after_three_failures_and_stops_calling() {
        let client = Arc::new(FailingClient {
            calls: AtomicUsize::new(0),
        });
        let analyzer = guarded(Arc::clone(&client));
        let audio = encode_wav(&[0.1; 1600], 16000).unwrap();
        let request = AnalysisRequestConfig::default();

        for _ in 0..3 {
            assert!(analyzer.analyze(&audio, &request).await.is_err());
        }
        assert_eq!(client.calls.load(Ordering::SeqCst), 3);

        // Fourth submission: circuit is open, no network call, synthetic result.
        let result = analyzer.analyze(&audio, &request).await.unwrap();
        assert!(result.is_some());
        assert_eq!(client.calls.load(Ordering::SeqCst), 3);
    }

    #[tokio::test]
    async fn synthesized_result_prefers_history() {
        use crate::analysis::SpeechMetricSample;
        use chrono::Utc;

        let history = Arc::new(RwLock::new(MetricsHistory::new()));
        history.write().await.append(SpeechMetricSample {
            timestamp: Utc::now(),
            fluency: CategoryScore::new(FluencyCategory::High, 0.9),
            tempo: CategoryScore::new(TempoCategory::Fast, 0.8),
            pronunciation: CategoryScore::new(PronunciationCategory::Clear, 0.85),
            speech_rate_wpm: 150.0,
        });

        let client = Arc::new(FailingClient {
            calls: AtomicUsize::new(0),
        });
        let analyzer = GuardedAnalyzer::new(
            client,
            BreakerConfig {
                failure_threshold: 1,
                cooldown: Duration::from_secs(60),
            },
            history,
            Arc::new(StdRwLock::new(LocalEstimate::default())),
        );

        let audio = encode_wav(&[0.1; 1600], 16000).unwrap();
        let request = AnalysisRequestConfig::default();
        assert!(analyzer.analyze(&audio, &request).await.is_err());

        let result = analyzer
            .analyze(&audio, &request)
            .await
            .unwrap()
            .expect("synthetic result");
        assert_eq!(result.fluency.category, FluencyCategory::High);
        assert_eq!(result.speech_rate_wpm, 150.0);
    }

    #[tokio::test]
    async fn synthesized_result_without_any_data_uses_defaults() {
        let client = Arc::new(FailingClient {
            calls: AtomicUsize::new(0),
        });
        let analyzer = GuardedAnalyzer::new(
            client,
            BreakerConfig {
                failure_threshold: 1,
                cooldown: Duration::from_secs(60),
            },
            Arc::new(RwLock::new(MetricsHistory::new())),
            Arc::new(StdRwLock::new(LocalEstimate::default())),
        );

        let audio = encode_wav(&[0.1; 1600], 16000).unwrap();
        let request = AnalysisRequestConfig::default();
        assert!(analyzer.analyze(&audio, &request).await.is_err());

        let result = analyzer
            .analyze(&audio, &request)
            .await
            .unwrap()
            .expect("synthetic result");
        assert_eq!(result.fluency.category, FluencyCategory::Medium);
        assert_eq!(result.speech_rate_wpm, WPM_MIN);
    }
}
