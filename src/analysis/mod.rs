//! Remote speech analysis: wire types, HTTP client, throttled dispatch, and
//! the consecutive-failure circuit breaker.

pub mod breaker;
pub mod client;
pub mod dispatcher;
pub mod types;

pub use breaker::{BreakerConfig, GuardedAnalyzer};
pub use client::{AnalysisError, AnalyzerClient, HttpAnalyzerClient};
pub use dispatcher::{
    AnalysisDispatcher, DispatchState, DispatcherConfig, DispatcherStats, SubmitOutcome,
};
pub use types::{
    clamp_wpm, AnalysisRequestConfig, AnalysisResult, CategoryScore, FluencyCategory,
    PronunciationCategory, SpeechMetricSample, TempoCategory, DEFAULT_COERCED_CONFIDENCE,
    WPM_MAX, WPM_MIN,
};
