use anyhow::Result;
use serde::Deserialize;
use std::time::Duration;

use crate::analysis::{AnalysisRequestConfig, BreakerConfig, DispatcherConfig};
use crate::audio::CaptureConfig;
use crate::pipeline::PipelineConfig;
use crate::session::SessionConfig;

#[derive(Debug, Clone, Deserialize, Default)]
#[serde(default)]
pub struct Config {
    pub service: ServiceConfig,
    pub audio: AudioSettings,
    pub analyzer: AnalyzerSettings,
    pub metrics: MetricsSettings,
    pub storage: StorageSettings,
}

#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct ServiceConfig {
    pub name: String,
    pub http: HttpConfig,
}

#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct HttpConfig {
    pub bind: String,
    pub port: u16,
}

#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct AudioSettings {
    pub sample_rate: u32,
    pub frame_samples: usize,
    pub channel_capacity: usize,
    /// Optional WAV file streamed as the default capture input
    pub input: Option<String>,
}

#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct AnalyzerSettings {
    pub endpoint: String,
    pub confidence_threshold: f64,
    pub boost_sensitivity: bool,
    pub interval_ms: u64,
    pub timeout_secs: u64,
    pub queue_capacity: usize,
    pub failure_threshold: u32,
    pub cooldown_secs: u64,
    pub analysis_window_secs: f64,
}

#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct MetricsSettings {
    pub history_capacity: usize,
}

#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct StorageSettings {
    pub recordings_path: String,
}

impl Default for ServiceConfig {
    fn default() -> Self {
        Self {
            name: "speech-pulse".to_string(),
            http: HttpConfig::default(),
        }
    }
}

impl Default for HttpConfig {
    fn default() -> Self {
        Self {
            bind: "127.0.0.1".to_string(),
            port: 3030,
        }
    }
}

impl Default for AudioSettings {
    fn default() -> Self {
        Self {
            sample_rate: 16000,
            frame_samples: 4096, // ~256 ms frames at 16 kHz
            channel_capacity: 16,
            input: None,
        }
    }
}

impl Default for AnalyzerSettings {
    fn default() -> Self {
        Self {
            endpoint: "http://localhost:5001/api/analyze".to_string(),
            confidence_threshold: 0.2,
            boost_sensitivity: false,
            interval_ms: 500,
            timeout_secs: 3,
            queue_capacity: 5,
            failure_threshold: 3,
            cooldown_secs: 120,
            analysis_window_secs: 2.0,
        }
    }
}

impl Default for MetricsSettings {
    fn default() -> Self {
        Self {
            history_capacity: 100,
        }
    }
}

impl Default for StorageSettings {
    fn default() -> Self {
        Self {
            recordings_path: "./recordings".to_string(),
        }
    }
}

impl Config {
    pub fn load(path: &str) -> Result<Self> {
        let settings = config::Config::builder()
            .add_source(config::File::with_name(path))
            .build()?;

        Ok(settings.try_deserialize()?)
    }

    /// Assemble the per-session pipeline configuration.
    pub fn pipeline_config(&self, session_id: String) -> PipelineConfig {
        PipelineConfig {
            capture: CaptureConfig {
                frame_samples: self.audio.frame_samples,
                channel_capacity: self.audio.channel_capacity,
            },
            heuristics: Default::default(),
            dispatcher: DispatcherConfig {
                min_interval: Duration::from_millis(self.analyzer.interval_ms),
                queue_capacity: self.analyzer.queue_capacity,
                request_timeout: Duration::from_secs(self.analyzer.timeout_secs),
                request: AnalysisRequestConfig {
                    confidence_threshold: self.analyzer.confidence_threshold,
                    boost_sensitivity: self.analyzer.boost_sensitivity,
                },
            },
            breaker: BreakerConfig {
                failure_threshold: self.analyzer.failure_threshold,
                cooldown: Duration::from_secs(self.analyzer.cooldown_secs),
            },
            session: SessionConfig {
                session_id,
                sample_rate: self.audio.sample_rate,
                ..SessionConfig::default()
            },
            analysis_window_secs: self.analyzer.analysis_window_secs,
        }
    }
}
