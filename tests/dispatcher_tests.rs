// Integration tests for the throttled analysis dispatcher
//
// These verify the at-most-one-in-flight guarantee, the bounded newest-drop
// queue, minimum send spacing, stale-epoch filtering, and shutdown abort.

use async_trait::async_trait;
use speech_pulse::analysis::{
    AnalysisDispatcher, AnalysisError, AnalysisRequestConfig, AnalysisResult, AnalyzerClient,
    CategoryScore, DispatcherConfig, FluencyCategory, PronunciationCategory, SubmitOutcome,
    TempoCategory,
};
use speech_pulse::audio::WavBlob;
use speech_pulse::metrics::MetricsHistory;
use std::sync::atomic::{AtomicU64, AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;
use tokio::sync::RwLock;
use tokio::time::Instant;

fn fixed_result() -> AnalysisResult {
    AnalysisResult {
        fluency: CategoryScore::new(FluencyCategory::High, 0.8),
        tempo: CategoryScore::new(TempoCategory::Medium, 0.7),
        pronunciation: CategoryScore::new(PronunciationCategory::Clear, 0.9),
        speech_rate_wpm: 130.0,
    }
}

/// Client that sleeps for a configured delay and records concurrency.
struct SlowClient {
    delay: Duration,
    calls: AtomicUsize,
    in_flight: AtomicUsize,
    max_in_flight: AtomicUsize,
    call_times: Mutex<Vec<Instant>>,
}

impl SlowClient {
    fn new(delay: Duration) -> Self {
        Self {
            delay,
            calls: AtomicUsize::new(0),
            in_flight: AtomicUsize::new(0),
            max_in_flight: AtomicUsize::new(0),
            call_times: Mutex::new(Vec::new()),
        }
    }
}

#[async_trait]
impl AnalyzerClient for SlowClient {
    fn name(&self) -> &str {
        "slow"
    }

    async fn analyze(
        &self,
        _audio: &WavBlob,
        _request: &AnalysisRequestConfig,
    ) -> Result<Option<AnalysisResult>, AnalysisError> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        self.call_times.lock().unwrap().push(Instant::now());

        let current = self.in_flight.fetch_add(1, Ordering::SeqCst) + 1;
        self.max_in_flight.fetch_max(current, Ordering::SeqCst);

        tokio::time::sleep(self.delay).await;

        self.in_flight.fetch_sub(1, Ordering::SeqCst);
        Ok(Some(fixed_result()))
    }
}

fn dispatcher_with(
    client: Arc<dyn AnalyzerClient>,
    config: DispatcherConfig,
) -> (
    Arc<AnalysisDispatcher>,
    Arc<RwLock<MetricsHistory>>,
    Arc<AtomicU64>,
) {
    let history = Arc::new(RwLock::new(MetricsHistory::new()));
    let live_epoch = Arc::new(AtomicU64::new(7));
    let dispatcher = AnalysisDispatcher::new(config, client, Arc::clone(&history), 7, Arc::clone(&live_epoch));
    (dispatcher, history, live_epoch)
}

fn buffer() -> Vec<f32> {
    vec![0.1_f32; 1600]
}

#[tokio::test]
async fn burst_of_ten_keeps_one_in_flight_and_bounds_the_queue() {
    let client = Arc::new(SlowClient::new(Duration::from_millis(50)));
    let config = DispatcherConfig {
        min_interval: Duration::from_millis(20),
        queue_capacity: 5,
        request_timeout: Duration::from_secs(3),
        request: AnalysisRequestConfig::default(),
    };
    let (dispatcher, history, _) = dispatcher_with(client.clone(), config);

    let mut sent = 0;
    let mut queued = 0;
    let mut dropped = 0;
    for _ in 0..10 {
        match dispatcher.submit(buffer(), 16000) {
            SubmitOutcome::Sent => sent += 1,
            SubmitOutcome::Queued => queued += 1,
            SubmitOutcome::Dropped => dropped += 1,
        }
    }

    assert_eq!(sent, 1, "exactly one submission goes straight out");
    assert_eq!(queued, 5, "queue holds at most five");
    assert_eq!(dropped, 4, "the rest are dropped, newest first to arrive over capacity");

    // Let the queue drain: 6 sends with delay + spacing.
    tokio::time::sleep(Duration::from_millis(1500)).await;

    assert_eq!(client.max_in_flight.load(Ordering::SeqCst), 1);
    assert_eq!(client.calls.load(Ordering::SeqCst), 6);
    assert_eq!(history.read().await.len(), 6);

    let stats = dispatcher.stats();
    assert_eq!(stats.dropped, 4);
    assert_eq!(stats.sent, 6);
}

#[tokio::test]
async fn sends_are_spaced_by_the_minimum_interval() {
    let client = Arc::new(SlowClient::new(Duration::from_millis(30)));
    let config = DispatcherConfig {
        min_interval: Duration::from_millis(200),
        queue_capacity: 5,
        request_timeout: Duration::from_secs(3),
        request: AnalysisRequestConfig::default(),
    };
    let (dispatcher, _, _) = dispatcher_with(client.clone(), config);

    assert_eq!(dispatcher.submit(buffer(), 16000), SubmitOutcome::Sent);
    assert_eq!(dispatcher.submit(buffer(), 16000), SubmitOutcome::Queued);

    tokio::time::sleep(Duration::from_millis(700)).await;

    let times = client.call_times.lock().unwrap();
    assert_eq!(times.len(), 2);
    let spacing = times[1].duration_since(times[0]);
    assert!(
        spacing >= Duration::from_millis(180),
        "second send arrived after only {:?}",
        spacing
    );
}

#[tokio::test]
async fn submissions_inside_the_interval_are_queued_not_sent() {
    let client = Arc::new(SlowClient::new(Duration::from_millis(1)));
    let config = DispatcherConfig {
        min_interval: Duration::from_millis(300),
        queue_capacity: 5,
        request_timeout: Duration::from_secs(3),
        request: AnalysisRequestConfig::default(),
    };
    let (dispatcher, _, _) = dispatcher_with(client.clone(), config);

    assert_eq!(dispatcher.submit(buffer(), 16000), SubmitOutcome::Sent);
    // First request completes almost immediately...
    tokio::time::sleep(Duration::from_millis(50)).await;
    // ...but a submission within the interval still may not go straight out.
    assert_eq!(dispatcher.submit(buffer(), 16000), SubmitOutcome::Queued);
}

#[tokio::test]
async fn stale_epoch_results_never_reach_the_history() {
    let client = Arc::new(SlowClient::new(Duration::from_millis(100)));
    let config = DispatcherConfig {
        min_interval: Duration::from_millis(10),
        queue_capacity: 5,
        request_timeout: Duration::from_secs(3),
        request: AnalysisRequestConfig::default(),
    };
    let (dispatcher, history, live_epoch) = dispatcher_with(client.clone(), config);

    assert_eq!(dispatcher.submit(buffer(), 16000), SubmitOutcome::Sent);
    // A newer session takes over while the request is in flight.
    live_epoch.store(8, Ordering::SeqCst);

    tokio::time::sleep(Duration::from_millis(300)).await;
    assert_eq!(client.calls.load(Ordering::SeqCst), 1);
    assert_eq!(history.read().await.len(), 0, "stale result must be discarded");
}

#[tokio::test]
async fn shutdown_aborts_in_flight_and_refuses_new_work() {
    let client = Arc::new(SlowClient::new(Duration::from_secs(10)));
    let config = DispatcherConfig {
        min_interval: Duration::from_millis(10),
        queue_capacity: 5,
        request_timeout: Duration::from_secs(30),
        request: AnalysisRequestConfig::default(),
    };
    let (dispatcher, history, _) = dispatcher_with(client.clone(), config);

    assert_eq!(dispatcher.submit(buffer(), 16000), SubmitOutcome::Sent);
    assert_eq!(dispatcher.submit(buffer(), 16000), SubmitOutcome::Queued);

    dispatcher.shutdown();
    tokio::time::sleep(Duration::from_millis(200)).await;

    assert_eq!(history.read().await.len(), 0);
    assert_eq!(dispatcher.queue_len(), 0);
    assert_eq!(dispatcher.submit(buffer(), 16000), SubmitOutcome::Dropped);
}

/// Client that reports the no-speech outcome.
struct NoSpeechClient;

#[async_trait]
impl AnalyzerClient for NoSpeechClient {
    fn name(&self) -> &str {
        "no-speech"
    }

    async fn analyze(
        &self,
        _audio: &WavBlob,
        _request: &AnalysisRequestConfig,
    ) -> Result<Option<AnalysisResult>, AnalysisError> {
        Ok(None)
    }
}

#[tokio::test]
async fn no_speech_is_counted_separately_from_failures() {
    let config = DispatcherConfig {
        min_interval: Duration::from_millis(10),
        queue_capacity: 5,
        request_timeout: Duration::from_secs(3),
        request: AnalysisRequestConfig::default(),
    };
    let (dispatcher, history, _) = dispatcher_with(Arc::new(NoSpeechClient), config);

    assert_eq!(dispatcher.submit(buffer(), 16000), SubmitOutcome::Sent);
    tokio::time::sleep(Duration::from_millis(100)).await;

    let stats = dispatcher.stats();
    assert_eq!(stats.no_speech, 1);
    assert_eq!(stats.failures, 0);
    assert_eq!(history.read().await.len(), 0);
}
