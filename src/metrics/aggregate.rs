use chrono::{DateTime, Duration as ChronoDuration, Utc};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::sync::Arc;
use tokio::sync::RwLock;

use crate::analysis::{
    FluencyCategory, PronunciationCategory, SpeechMetricSample, TempoCategory,
};

use super::history::MetricsHistory;

/// Below these window sizes, selection falls back to "last K samples" so a
/// steady real-time consumer is never starved by strict time filtering.
pub const CATEGORY_SMALL_WINDOW_MS: u64 = 5_000;
pub const RATE_SMALL_WINDOW_MS: u64 = 10_000;
pub const CATEGORY_LAST_K: usize = 5;
pub const RATE_LAST_K: usize = 8;

/// Recency-weighted aggregation over a time window.
///
/// Every category axis is always present in the output (zero-filled when
/// unobserved) so consumers see a consistent shape.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AggregatedWindow {
    pub fluency: BTreeMap<String, f64>,
    pub tempo: BTreeMap<String, f64>,
    pub pronunciation: BTreeMap<String, f64>,
    pub average_rate: f64,
    pub min_rate: f64,
    pub max_rate: f64,
    pub rate_variability: f64,
}

/// Reads the shared history and computes recency-weighted summaries.
#[derive(Clone)]
pub struct WeightedAggregator {
    history: Arc<RwLock<MetricsHistory>>,
}

impl WeightedAggregator {
    pub fn new(history: Arc<RwLock<MetricsHistory>>) -> Self {
        Self { history }
    }

    pub async fn average_over(&self, window_ms: u64) -> Option<AggregatedWindow> {
        let snapshot = self.history.read().await.snapshot();
        aggregate_samples(&snapshot, window_ms, Utc::now())
    }
}

/// Pure aggregation over an already snapshotted, insertion-ordered sample
/// slice. Returns `None` when there is nothing to aggregate.
pub fn aggregate_samples(
    samples: &[SpeechMetricSample],
    window_ms: u64,
    now: DateTime<Utc>,
) -> Option<AggregatedWindow> {
    if samples.is_empty() {
        return None;
    }

    let category_sel = select(
        samples,
        window_ms,
        now,
        CATEGORY_SMALL_WINDOW_MS,
        CATEGORY_LAST_K,
    );
    let rate_sel = select(samples, window_ms, now, RATE_SMALL_WINDOW_MS, RATE_LAST_K);

    let fluency = axis_distribution(
        category_sel,
        &FluencyCategory::ALL,
        |c| c.label(),
        |s| s.fluency.category,
    );
    let tempo = axis_distribution(
        category_sel,
        &TempoCategory::ALL,
        |c| c.label(),
        |s| s.tempo.category,
    );
    let pronunciation = axis_distribution(
        category_sel,
        &PronunciationCategory::ALL,
        |c| c.label(),
        |s| s.pronunciation.category,
    );

    let (average_rate, min_rate, max_rate, rate_variability) = rate_statistics(rate_sel);

    Some(AggregatedWindow {
        fluency,
        tempo,
        pronunciation,
        average_rate,
        min_rate,
        max_rate,
        rate_variability,
    })
}

/// Pick the samples to aggregate: last-K for small windows, otherwise a
/// strict time filter. A time filter that matches nothing also degrades to
/// last-K so a non-empty history never yields an empty selection.
fn select<'a>(
    samples: &'a [SpeechMetricSample],
    window_ms: u64,
    now: DateTime<Utc>,
    small_window_ms: u64,
    last_k: usize,
) -> &'a [SpeechMetricSample] {
    let tail = &samples[samples.len().saturating_sub(last_k)..];
    if window_ms <= small_window_ms {
        return tail;
    }

    let cutoff = now - ChronoDuration::milliseconds(window_ms as i64);
    match samples.iter().position(|s| s.timestamp >= cutoff) {
        Some(first) => &samples[first..],
        None => tail,
    }
}

/// Linear recency weight for index `i` of a selection of length `len`:
/// ranges from 1.0 (oldest) toward 2.0 (newest).
fn recency_weight(i: usize, len: usize) -> f64 {
    1.0 + i as f64 / len as f64
}

fn axis_distribution<C: Copy + PartialEq>(
    selection: &[SpeechMetricSample],
    all: &[C],
    label: fn(C) -> &'static str,
    pick: fn(&SpeechMetricSample) -> C,
) -> BTreeMap<String, f64> {
    let mut distribution: BTreeMap<String, f64> = all
        .iter()
        .map(|&c| (label(c).to_string(), 0.0))
        .collect();

    // Two samples or fewer: the most recent sample's value stands alone.
    if selection.len() <= 2 {
        if let Some(latest) = selection.last() {
            if let Some(weight) = distribution.get_mut(label(pick(latest))) {
                *weight = 1.0;
            }
        }
        return distribution;
    }

    let len = selection.len();
    let mut total = 0.0;
    for (i, sample) in selection.iter().enumerate() {
        let weight = recency_weight(i, len);
        total += weight;
        if let Some(entry) = distribution.get_mut(label(pick(sample))) {
            *entry += weight;
        }
    }
    for weight in distribution.values_mut() {
        *weight /= total;
    }
    distribution
}

/// Weighted mean, unweighted min/max, and weighted standard deviation of the
/// speech rate across the selection.
fn rate_statistics(selection: &[SpeechMetricSample]) -> (f64, f64, f64, f64) {
    match selection {
        [] => (0.0, 0.0, 0.0, 0.0),
        // Most-recent passthrough for tiny selections
        [.., latest] if selection.len() <= 2 => {
            let rate = latest.speech_rate_wpm;
            (rate, rate, rate, 0.0)
        }
        _ => {
            let len = selection.len();
            let mut total_weight = 0.0;
            let mut weighted_sum = 0.0;
            let mut min_rate = f64::INFINITY;
            let mut max_rate = f64::NEG_INFINITY;

            for (i, sample) in selection.iter().enumerate() {
                let weight = recency_weight(i, len);
                total_weight += weight;
                weighted_sum += weight * sample.speech_rate_wpm;
                min_rate = min_rate.min(sample.speech_rate_wpm);
                max_rate = max_rate.max(sample.speech_rate_wpm);
            }
            let mean = weighted_sum / total_weight;

            let mut weighted_var = 0.0;
            for (i, sample) in selection.iter().enumerate() {
                let weight = recency_weight(i, len);
                let delta = sample.speech_rate_wpm - mean;
                weighted_var += weight * delta * delta;
            }
            let variability = (weighted_var / total_weight).sqrt();

            (mean, min_rate, max_rate, variability)
        }
    }
}
