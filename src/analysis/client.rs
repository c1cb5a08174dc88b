use async_trait::async_trait;
use serde::Deserialize;
use std::time::Duration;
use thiserror::Error;
use tracing::debug;

use crate::audio::WavBlob;

use super::types::{
    clamp_wpm, AnalysisRequestConfig, AnalysisResult, CategoryScore, FluencyCategory,
    PronunciationCategory, TempoCategory,
};

/// Failures talking to the remote analyzer.
///
/// A timeout is a soft failure handled exactly like a network error; the
/// "no speech detected" outcome is not an error at all and is reported as
/// `Ok(None)` by [`AnalyzerClient::analyze`].
#[derive(Debug, Error)]
pub enum AnalysisError {
    #[error("analysis request timed out")]
    Timeout,
    #[error("analysis request failed: {0}")]
    Network(String),
    #[error("analysis service error ({status}): {message}")]
    Service { status: u16, message: String },
    #[error("malformed analysis response: {0}")]
    MalformedResponse(String),
}

/// Boundary to the remote speech analyzer.
///
/// `Ok(Some(result))` is a usable analysis, `Ok(None)` means the service
/// found no clear speech in the submitted audio.
#[async_trait]
pub trait AnalyzerClient: Send + Sync {
    /// Client name for logging
    fn name(&self) -> &str;

    async fn analyze(
        &self,
        audio: &WavBlob,
        request: &AnalysisRequestConfig,
    ) -> Result<Option<AnalysisResult>, AnalysisError>;
}

#[derive(Debug, Deserialize)]
struct WireAxis {
    #[serde(default)]
    category: String,
    #[serde(default)]
    confidence: f64,
}

#[derive(Debug, Deserialize)]
struct WireCharacteristics {
    fluency: WireAxis,
    tempo: WireAxis,
    pronunciation: WireAxis,
}

#[derive(Debug, Deserialize)]
struct WireResponse {
    status: String,
    #[serde(default)]
    message: Option<String>,
    #[serde(default)]
    speech_rate: Option<f64>,
    #[serde(default)]
    speech_characteristics: Option<WireCharacteristics>,
}

/// HTTP implementation of [`AnalyzerClient`].
///
/// Posts the audio as a multipart form (`audio`, `confidence_threshold`,
/// optional `boost_sensitivity`) and parses the JSON analysis response.
pub struct HttpAnalyzerClient {
    endpoint: String,
    client: reqwest::Client,
    timeout: Duration,
}

impl HttpAnalyzerClient {
    pub fn new(endpoint: impl Into<String>, timeout: Duration) -> Self {
        Self {
            endpoint: endpoint.into(),
            client: reqwest::Client::new(),
            timeout,
        }
    }

    fn parse_response(status: u16, body: &str) -> Result<Option<AnalysisResult>, AnalysisError> {
        let wire: WireResponse = serde_json::from_str(body).map_err(|e| {
            AnalysisError::MalformedResponse(format!("invalid JSON ({e}): {body}"))
        })?;

        if wire.status != "success" {
            let message = wire.message.unwrap_or_else(|| "unknown error".to_string());
            // "No clear speech detected" is a valid nothing-to-report
            // outcome, not a failure.
            if message.to_lowercase().contains("no clear speech") {
                debug!("Analyzer reported no speech in submitted audio");
                return Ok(None);
            }
            return Err(AnalysisError::Service { status, message });
        }

        let characteristics = wire.speech_characteristics.ok_or_else(|| {
            AnalysisError::MalformedResponse("missing speech_characteristics".to_string())
        })?;
        let speech_rate = wire
            .speech_rate
            .ok_or_else(|| AnalysisError::MalformedResponse("missing speech_rate".to_string()))?;

        Ok(Some(AnalysisResult {
            fluency: CategoryScore::from_wire(
                "fluency",
                FluencyCategory::from_label(&characteristics.fluency.category),
                &characteristics.fluency.category,
                characteristics.fluency.confidence,
            ),
            tempo: CategoryScore::from_wire(
                "tempo",
                TempoCategory::from_label(&characteristics.tempo.category),
                &characteristics.tempo.category,
                characteristics.tempo.confidence,
            ),
            pronunciation: CategoryScore::from_wire(
                "pronunciation",
                PronunciationCategory::from_label(&characteristics.pronunciation.category),
                &characteristics.pronunciation.category,
                characteristics.pronunciation.confidence,
            ),
            speech_rate_wpm: clamp_wpm(speech_rate),
        }))
    }
}

#[async_trait]
impl AnalyzerClient for HttpAnalyzerClient {
    fn name(&self) -> &str {
        "http-analyzer"
    }

    async fn analyze(
        &self,
        audio: &WavBlob,
        request: &AnalysisRequestConfig,
    ) -> Result<Option<AnalysisResult>, AnalysisError> {
        let audio_part = reqwest::multipart::Part::bytes(audio.as_bytes().to_vec())
            .file_name("audio.wav")
            .mime_str("audio/wav")
            .map_err(|e| AnalysisError::Network(format!("invalid MIME type: {e}")))?;

        let mut form = reqwest::multipart::Form::new()
            .part("audio", audio_part)
            .text(
                "confidence_threshold",
                format!("{}", request.confidence_threshold),
            );
        if request.boost_sensitivity {
            form = form.text("boost_sensitivity", "true");
        }

        let response = self
            .client
            .post(&self.endpoint)
            .timeout(self.timeout)
            .multipart(form)
            .send()
            .await
            .map_err(|e| {
                if e.is_timeout() {
                    AnalysisError::Timeout
                } else {
                    AnalysisError::Network(e.to_string())
                }
            })?;

        let status = response.status().as_u16();
        let body = response.text().await.map_err(|e| {
            if e.is_timeout() {
                AnalysisError::Timeout
            } else {
                AnalysisError::Network(e.to_string())
            }
        })?;

        Self::parse_response(status, &body)
    }
}
