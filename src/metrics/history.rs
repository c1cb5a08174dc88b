use std::collections::VecDeque;

use crate::analysis::SpeechMetricSample;

/// Default bound on retained samples.
pub const HISTORY_CAPACITY: usize = 100;

/// Bounded, insertion-ordered store of speech-metric samples.
///
/// Pure storage: appending past capacity evicts the oldest sample (FIFO).
/// Aggregation policy lives elsewhere.
#[derive(Debug)]
pub struct MetricsHistory {
    samples: VecDeque<SpeechMetricSample>,
    capacity: usize,
}

impl MetricsHistory {
    pub fn new() -> Self {
        Self::with_capacity(HISTORY_CAPACITY)
    }

    pub fn with_capacity(capacity: usize) -> Self {
        assert!(capacity > 0, "history capacity must be > 0");
        Self {
            samples: VecDeque::with_capacity(capacity),
            capacity,
        }
    }

    pub fn append(&mut self, sample: SpeechMetricSample) {
        if self.samples.len() == self.capacity {
            self.samples.pop_front();
        }
        self.samples.push_back(sample);
    }

    /// Defensive copy of the stored samples, oldest first.
    pub fn snapshot(&self) -> Vec<SpeechMetricSample> {
        self.samples.iter().cloned().collect()
    }

    pub fn latest(&self) -> Option<&SpeechMetricSample> {
        self.samples.back()
    }

    pub fn len(&self) -> usize {
        self.samples.len()
    }

    pub fn is_empty(&self) -> bool {
        self.samples.is_empty()
    }

    pub fn capacity(&self) -> usize {
        self.capacity
    }
}

impl Default for MetricsHistory {
    fn default() -> Self {
        Self::new()
    }
}
