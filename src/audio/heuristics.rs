//! Local speech heuristics: energy-gated speech detection and a syllable-peak
//! speech-rate estimate.
//!
//! These run synchronously on every captured frame and act as a cheap local
//! proxy between remote analysis results. They are intentionally approximate:
//! the remote analyzer remains the authoritative source for speech rate.

use serde::Serialize;

use super::capture::AudioFrame;

/// Average syllables per English word, used to convert syllables/second into
/// words per minute.
pub const SYLLABLES_PER_WORD: f64 = 1.5;

/// Tuning constants for the frame classifier.
#[derive(Debug, Clone)]
pub struct HeuristicsConfig {
    /// RMS energy above which a frame counts as speech.
    pub rms_speech_threshold: f32,
    /// Moving-average window (samples) applied to the rectified signal.
    pub smoothing_window: usize,
    /// Minimum smoothed amplitude for a syllable peak.
    pub min_peak_height: f32,
    /// Minimum spacing between syllable peaks, in seconds.
    pub min_peak_distance_secs: f32,
    /// Smoothed amplitude below which a sample counts as silence.
    pub silence_amplitude: f32,
    /// Silence runs at least this long are excluded from speech duration.
    pub min_silence_secs: f32,
}

impl Default for HeuristicsConfig {
    fn default() -> Self {
        Self {
            rms_speech_threshold: 0.01,
            smoothing_window: 10,
            min_peak_height: 0.05,
            min_peak_distance_secs: 0.1,
            silence_amplitude: 0.01,
            min_silence_secs: 0.2,
        }
    }
}

/// Classification of a single frame.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct FrameVerdict {
    pub is_speech: bool,
    /// Instantaneous syllable rate in syllables/second; 0 when not speech or
    /// no peaks were found.
    pub rate_hint: f64,
}

impl FrameVerdict {
    fn silence() -> Self {
        Self {
            is_speech: false,
            rate_hint: 0.0,
        }
    }
}

/// The most recent locally derived estimate, shared with status reporting and
/// the analyzer fallback path.
#[derive(Debug, Clone, Copy, Default, Serialize)]
pub struct LocalEstimate {
    pub is_speech: bool,
    pub rate_wpm: f64,
    pub updated_ms: u64,
}

/// Convert a syllables/second hint to words per minute.
pub fn syllable_rate_to_wpm(syllables_per_sec: f64) -> f64 {
    syllables_per_sec * 60.0 / SYLLABLES_PER_WORD
}

/// Energy and syllable-peak classifier for captured frames.
#[derive(Debug, Clone, Default)]
pub struct SpeechHeuristics {
    config: HeuristicsConfig,
}

impl SpeechHeuristics {
    pub fn new(config: HeuristicsConfig) -> Self {
        Self { config }
    }

    /// Classify a frame as speech or silence and estimate its syllable rate.
    ///
    /// Silent frames short-circuit before any peak finding.
    pub fn classify(&self, frame: &AudioFrame) -> FrameVerdict {
        if frame.samples.is_empty() {
            return FrameVerdict::silence();
        }

        if rms(&frame.samples) <= self.config.rms_speech_threshold {
            return FrameVerdict::silence();
        }

        let smoothed = smooth_abs(&frame.samples, self.config.smoothing_window);

        let min_distance =
            (self.config.min_peak_distance_secs * frame.sample_rate as f32) as usize;
        let peaks = syllable_peaks(&smoothed, self.config.min_peak_height, min_distance.max(1));

        let min_silence_run =
            (self.config.min_silence_secs * frame.sample_rate as f32) as usize;
        let silent_samples =
            long_silence_samples(&smoothed, self.config.silence_amplitude, min_silence_run.max(1));

        let speech_samples = frame.samples.len().saturating_sub(silent_samples);
        let speech_duration = speech_samples as f64 / frame.sample_rate as f64;

        let rate_hint = if peaks == 0 || speech_duration <= 0.0 {
            0.0
        } else {
            peaks as f64 / speech_duration
        };

        FrameVerdict {
            is_speech: true,
            rate_hint,
        }
    }
}

fn rms(samples: &[f32]) -> f32 {
    let sum_sq: f64 = samples.iter().map(|&s| (s as f64) * (s as f64)).sum();
    (sum_sq / samples.len() as f64).sqrt() as f32
}

/// Symmetric moving average of the rectified signal (zero-padded at the
/// edges, matching a centered 'same'-mode convolution).
fn smooth_abs(samples: &[f32], window: usize) -> Vec<f32> {
    if window <= 1 {
        return samples.iter().map(|s| s.abs()).collect();
    }

    let half = window / 2;
    let mut smoothed = Vec::with_capacity(samples.len());
    for i in 0..samples.len() {
        let mut sum = 0.0_f32;
        for j in 0..window {
            let idx = i as isize + j as isize - half as isize;
            if idx >= 0 && (idx as usize) < samples.len() {
                sum += samples[idx as usize].abs();
            }
        }
        smoothed.push(sum / window as f32);
    }
    smoothed
}

/// Count syllable peaks: local maxima above `min_height`, spaced at least
/// `min_distance` samples apart.
///
/// When a candidate lands closer than `min_distance` to the previously kept
/// peak, the kept peak is replaced only if the candidate is strictly taller;
/// otherwise the candidate is dropped. A scan, not true non-maximum
/// suppression.
fn syllable_peaks(smoothed: &[f32], min_height: f32, min_distance: usize) -> usize {
    let mut peaks: Vec<(usize, f32)> = Vec::new();

    for i in 1..smoothed.len().saturating_sub(1) {
        let height = smoothed[i];
        if height < min_height || height <= smoothed[i - 1] || height < smoothed[i + 1] {
            continue;
        }

        match peaks.last_mut() {
            Some(last) if i - last.0 < min_distance => {
                if height > last.1 {
                    *last = (i, height);
                }
            }
            _ => peaks.push((i, height)),
        }
    }

    peaks.len()
}

/// Total samples covered by silence runs of at least `min_run` samples.
fn long_silence_samples(smoothed: &[f32], silence_amplitude: f32, min_run: usize) -> usize {
    let mut total = 0;
    let mut run = 0;
    for &s in smoothed {
        if s < silence_amplitude {
            run += 1;
        } else {
            if run >= min_run {
                total += run;
            }
            run = 0;
        }
    }
    if run >= min_run {
        total += run;
    }
    total
}
