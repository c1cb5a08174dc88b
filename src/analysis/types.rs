use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use tracing::warn;

/// Confidence assigned when a remote category value fails validation and is
/// coerced to its default.
pub const DEFAULT_COERCED_CONFIDENCE: f64 = 0.0;

/// Bounds applied to remote speech-rate values, in words per minute.
pub const WPM_MIN: f64 = 60.0;
pub const WPM_MAX: f64 = 200.0;

/// Clamp a remote speech rate into the supported wpm range.
pub fn clamp_wpm(rate: f64) -> f64 {
    rate.clamp(WPM_MIN, WPM_MAX)
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum FluencyCategory {
    #[serde(rename = "High Fluency")]
    High,
    #[serde(rename = "Medium Fluency")]
    Medium,
    #[serde(rename = "Low Fluency")]
    Low,
}

impl FluencyCategory {
    pub const ALL: [Self; 3] = [Self::High, Self::Medium, Self::Low];

    pub fn label(self) -> &'static str {
        match self {
            Self::High => "High Fluency",
            Self::Medium => "Medium Fluency",
            Self::Low => "Low Fluency",
        }
    }

    pub fn from_label(label: &str) -> Option<Self> {
        Self::ALL.into_iter().find(|c| c.label() == label)
    }
}

impl Default for FluencyCategory {
    fn default() -> Self {
        Self::Medium
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum TempoCategory {
    #[serde(rename = "Fast Tempo")]
    Fast,
    #[serde(rename = "Medium Tempo")]
    Medium,
    #[serde(rename = "Slow Tempo")]
    Slow,
}

impl TempoCategory {
    pub const ALL: [Self; 3] = [Self::Fast, Self::Medium, Self::Slow];

    pub fn label(self) -> &'static str {
        match self {
            Self::Fast => "Fast Tempo",
            Self::Medium => "Medium Tempo",
            Self::Slow => "Slow Tempo",
        }
    }

    pub fn from_label(label: &str) -> Option<Self> {
        Self::ALL.into_iter().find(|c| c.label() == label)
    }
}

impl Default for TempoCategory {
    fn default() -> Self {
        Self::Medium
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum PronunciationCategory {
    #[serde(rename = "Clear Pronunciation")]
    Clear,
    #[serde(rename = "Unclear Pronunciation")]
    Unclear,
}

impl PronunciationCategory {
    pub const ALL: [Self; 2] = [Self::Clear, Self::Unclear];

    pub fn label(self) -> &'static str {
        match self {
            Self::Clear => "Clear Pronunciation",
            Self::Unclear => "Unclear Pronunciation",
        }
    }

    pub fn from_label(label: &str) -> Option<Self> {
        Self::ALL.into_iter().find(|c| c.label() == label)
    }
}

impl Default for PronunciationCategory {
    fn default() -> Self {
        Self::Unclear
    }
}

/// A category value paired with the analyzer's confidence in it.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct CategoryScore<C> {
    pub category: C,
    pub confidence: f64,
}

impl<C: Default> CategoryScore<C> {
    /// Build a score from an already validated category, clamping confidence
    /// into [0, 1].
    pub fn new(category: C, confidence: f64) -> Self {
        Self {
            category,
            confidence: confidence.clamp(0.0, 1.0),
        }
    }

    /// Build a score from a wire-format label. Unknown labels are coerced to
    /// the axis default with [`DEFAULT_COERCED_CONFIDENCE`] — a malformed
    /// remote value is never propagated as-is.
    pub fn from_wire(
        axis: &'static str,
        parsed: Option<C>,
        label: &str,
        confidence: f64,
    ) -> Self {
        match parsed {
            Some(category) => Self::new(category, confidence),
            None => {
                warn!(
                    "Unrecognized {} category {:?}, coercing to default",
                    axis, label
                );
                Self {
                    category: C::default(),
                    confidence: DEFAULT_COERCED_CONFIDENCE,
                }
            }
        }
    }
}

/// One reconciled speech-metric observation, as stored in the history.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SpeechMetricSample {
    pub timestamp: DateTime<Utc>,
    pub fluency: CategoryScore<FluencyCategory>,
    pub tempo: CategoryScore<TempoCategory>,
    pub pronunciation: CategoryScore<PronunciationCategory>,
    pub speech_rate_wpm: f64,
}

/// A successful analyzer response, validated and coerced, not yet stamped
/// with a local timestamp.
#[derive(Debug, Clone)]
pub struct AnalysisResult {
    pub fluency: CategoryScore<FluencyCategory>,
    pub tempo: CategoryScore<TempoCategory>,
    pub pronunciation: CategoryScore<PronunciationCategory>,
    pub speech_rate_wpm: f64,
}

impl AnalysisResult {
    pub fn into_sample(self, timestamp: DateTime<Utc>) -> SpeechMetricSample {
        SpeechMetricSample {
            timestamp,
            fluency: self.fluency,
            tempo: self.tempo,
            pronunciation: self.pronunciation,
            speech_rate_wpm: self.speech_rate_wpm,
        }
    }
}

/// Named, typed request parameters for the remote analyzer.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AnalysisRequestConfig {
    pub confidence_threshold: f64,
    pub boost_sensitivity: bool,
}

impl Default for AnalysisRequestConfig {
    fn default() -> Self {
        Self {
            confidence_threshold: 0.2,
            boost_sensitivity: false,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn labels_round_trip() {
        for c in FluencyCategory::ALL {
            assert_eq!(FluencyCategory::from_label(c.label()), Some(c));
        }
        for c in TempoCategory::ALL {
            assert_eq!(TempoCategory::from_label(c.label()), Some(c));
        }
        for c in PronunciationCategory::ALL {
            assert_eq!(PronunciationCategory::from_label(c.label()), Some(c));
        }
    }

    #[test]
    fn bogus_category_coerces_to_default() {
        let score = CategoryScore::from_wire(
            "fluency",
            FluencyCategory::from_label("Bogus"),
            "Bogus",
            0.9,
        );
        assert_eq!(score.category, FluencyCategory::Medium);
        assert_eq!(score.confidence, DEFAULT_COERCED_CONFIDENCE);
    }

    #[test]
    fn valid_category_keeps_confidence() {
        let score = CategoryScore::from_wire(
            "tempo",
            TempoCategory::from_label("Fast Tempo"),
            "Fast Tempo",
            0.8,
        );
        assert_eq!(score.category, TempoCategory::Fast);
        assert_eq!(score.confidence, 0.8);
    }

    #[test]
    fn confidence_is_clamped() {
        let score = CategoryScore::new(PronunciationCategory::Clear, 1.7);
        assert_eq!(score.confidence, 1.0);
        let score = CategoryScore::new(PronunciationCategory::Clear, -0.2);
        assert_eq!(score.confidence, 0.0);
    }

    #[test]
    fn wpm_clamp_bounds() {
        assert_eq!(clamp_wpm(30.0), WPM_MIN);
        assert_eq!(clamp_wpm(500.0), WPM_MAX);
        assert_eq!(clamp_wpm(120.0), 120.0);
    }

    #[test]
    fn serialized_labels_match_wire_format() {
        let json = serde_json::to_string(&FluencyCategory::High).unwrap();
        assert_eq!(json, "\"High Fluency\"");
        let json = serde_json::to_string(&PronunciationCategory::Unclear).unwrap();
        assert_eq!(json, "\"Unclear Pronunciation\"");
    }
}
