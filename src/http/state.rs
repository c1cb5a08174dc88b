use std::collections::HashMap;
use std::sync::atomic::AtomicU64;
use std::sync::Arc;
use tokio::sync::RwLock;

use crate::analysis::{AnalyzerClient, HttpAnalyzerClient};
use crate::config::Config;
use crate::metrics::{MetricsHistory, WeightedAggregator};
use crate::persistence::{FallbackStore, LocalArtifactStore, PersistenceError};
use crate::pipeline::Pipeline;
use crate::telemetry::{NoopSink, TelemetrySink};

/// Shared application state for HTTP handlers
#[derive(Clone)]
pub struct AppState {
    pub config: Arc<Config>,

    /// Active pipelines (session_id → pipeline)
    pub sessions: Arc<RwLock<HashMap<String, Arc<Pipeline>>>>,

    /// Shared speech-metric history, written by dispatcher completions
    pub history: Arc<RwLock<MetricsHistory>>,

    /// Epoch of the most recently started session
    pub live_epoch: Arc<AtomicU64>,

    pub aggregator: WeightedAggregator,

    /// Base analyzer client wrapped per-pipeline with the circuit breaker
    pub analyzer: Arc<dyn AnalyzerClient>,

    pub store: Arc<FallbackStore>,

    pub telemetry: Arc<dyn TelemetrySink>,
}

impl AppState {
    pub fn new(config: Config) -> Result<Self, PersistenceError> {
        let history = Arc::new(RwLock::new(MetricsHistory::with_capacity(
            config.metrics.history_capacity,
        )));
        let analyzer: Arc<dyn AnalyzerClient> = Arc::new(HttpAnalyzerClient::new(
            config.analyzer.endpoint.clone(),
            std::time::Duration::from_secs(config.analyzer.timeout_secs),
        ));
        let local = Arc::new(LocalArtifactStore::new(&config.storage.recordings_path)?);
        let store = Arc::new(FallbackStore::new(local.clone(), local));

        Ok(Self {
            config: Arc::new(config),
            sessions: Arc::new(RwLock::new(HashMap::new())),
            aggregator: WeightedAggregator::new(Arc::clone(&history)),
            history,
            live_epoch: Arc::new(AtomicU64::new(0)),
            analyzer,
            store,
            telemetry: Arc::new(NoopSink),
        })
    }

    /// Swap in a remote-backed store (the local store stays as the cache).
    pub fn with_store(mut self, store: Arc<FallbackStore>) -> Self {
        self.store = store;
        self
    }

    pub fn with_telemetry(mut self, telemetry: Arc<dyn TelemetrySink>) -> Self {
        self.telemetry = telemetry;
        self
    }
}
