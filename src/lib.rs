pub mod analysis;
pub mod audio;
pub mod config;
pub mod http;
pub mod metrics;
pub mod persistence;
pub mod pipeline;
pub mod session;
pub mod telemetry;

pub use analysis::{
    AnalysisDispatcher, AnalysisRequestConfig, AnalyzerClient, BreakerConfig, DispatcherConfig,
    GuardedAnalyzer, HttpAnalyzerClient, SpeechMetricSample,
};
pub use audio::{
    AudioFrame, CaptureBackend, CaptureBackendFactory, CaptureConfig, CaptureError, CaptureSource,
    SpeechHeuristics, WavBlob,
};
pub use config::Config;
pub use http::{create_router, AppState};
pub use metrics::{AggregatedWindow, MetricsHistory, WeightedAggregator};
pub use persistence::{ArtifactStore, FallbackStore, LocalArtifactStore, RecordingMetadata};
pub use pipeline::{Pipeline, PipelineConfig, PipelineStatus};
pub use session::{RecordingSession, SessionConfig, SessionPhase, SessionStats};
pub use telemetry::{ChannelSink, FrameTelemetry, NoopSink, TelemetrySink};
