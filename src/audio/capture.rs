use std::path::PathBuf;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex};
use thiserror::Error;
use tokio::sync::mpsc;
use tokio::task::JoinHandle;
use tokio::time::{Duration, MissedTickBehavior};
use tracing::{error, info, warn};

use super::wav::decode_wav_bytes;

/// Capture failures. Fatal to the current session, never to the process —
/// the caller may retry with a fresh session.
#[derive(Debug, Clone, Error)]
pub enum CaptureError {
    #[error("audio device unavailable: {0}")]
    Device(String),
    #[error("audio capture permission denied")]
    PermissionDenied,
    #[error("capture already running")]
    AlreadyRunning,
    #[error("failed to open audio source: {0}")]
    Open(String),
}

/// One frame of captured audio: normalized mono samples in [-1.0, 1.0].
///
/// Frames are copied out of the device buffer at capture time and then owned
/// by exactly one stage at a time.
#[derive(Debug, Clone)]
pub struct AudioFrame {
    pub samples: Vec<f32>,
    /// Sample rate in Hz
    pub sample_rate: u32,
    /// Number of channels (fixed at 1 in this pipeline)
    pub channels: u16,
    /// Milliseconds since capture started
    pub timestamp_ms: u64,
}

/// Configuration for frame capture.
#[derive(Debug, Clone)]
pub struct CaptureConfig {
    /// Samples per frame (4096 at 16 kHz ≈ 256 ms cadence)
    pub frame_samples: usize,
    /// Capacity of the frame hand-off channel
    pub channel_capacity: usize,
}

impl Default for CaptureConfig {
    fn default() -> Self {
        Self {
            frame_samples: 4096,
            channel_capacity: 16,
        }
    }
}

/// The device boundary. Sources typically reuse their internal buffer, so
/// the capturer copies every frame before handing it onward.
pub trait SampleSource: Send {
    fn sample_rate(&self) -> u32;

    /// Fill `buf` with the next samples. Returns the number of samples
    /// written; fewer than `buf.len()` means the source is exhausted.
    fn read_frame(&mut self, buf: &mut [f32]) -> Result<usize, CaptureError>;
}

/// Audio capture backend trait.
///
/// `start` returns a channel receiver that will receive audio frames until
/// the backend is stopped or the source ends.
#[async_trait::async_trait]
pub trait CaptureBackend: Send {
    async fn start(&mut self) -> Result<mpsc::Receiver<AudioFrame>, CaptureError>;

    async fn stop(&mut self) -> Result<(), CaptureError>;

    fn is_capturing(&self) -> bool;

    /// Device error observed by the producer task, if any.
    fn error(&self) -> Option<CaptureError>;

    /// Backend name for logging
    fn name(&self) -> &str;
}

/// Timer-driven capture backend: pulls one fixed-size frame per tick from a
/// [`SampleSource`] and pushes it into a bounded channel.
pub struct TimedCapture {
    config: CaptureConfig,
    source: Option<Box<dyn SampleSource>>,
    running: Arc<AtomicBool>,
    last_error: Arc<Mutex<Option<CaptureError>>>,
    task: Option<JoinHandle<()>>,
    name: String,
}

impl TimedCapture {
    pub fn new(source: Box<dyn SampleSource>, config: CaptureConfig, name: impl Into<String>) -> Self {
        Self {
            config,
            source: Some(source),
            running: Arc::new(AtomicBool::new(false)),
            last_error: Arc::new(Mutex::new(None)),
            task: None,
            name: name.into(),
        }
    }
}

#[async_trait::async_trait]
impl CaptureBackend for TimedCapture {
    async fn start(&mut self) -> Result<mpsc::Receiver<AudioFrame>, CaptureError> {
        if self.running.load(Ordering::SeqCst) {
            return Err(CaptureError::AlreadyRunning);
        }
        let mut source = self.source.take().ok_or(CaptureError::AlreadyRunning)?;

        let (tx, rx) = mpsc::channel(self.config.channel_capacity);
        let frame_samples = self.config.frame_samples;
        let sample_rate = source.sample_rate();
        let period = Duration::from_millis(frame_samples as u64 * 1000 / sample_rate as u64);

        self.running.store(true, Ordering::SeqCst);
        let running = Arc::clone(&self.running);
        let last_error = Arc::clone(&self.last_error);
        let name = self.name.clone();

        info!(
            "Starting capture backend {}: {} samples/frame at {} Hz (~{} ms cadence)",
            name,
            frame_samples,
            sample_rate,
            period.as_millis()
        );

        let task = tokio::spawn(async move {
            let mut interval = tokio::time::interval(period);
            interval.set_missed_tick_behavior(MissedTickBehavior::Delay);
            let started = tokio::time::Instant::now();

            loop {
                interval.tick().await;
                if !running.load(Ordering::SeqCst) {
                    break;
                }

                // Fresh buffer per tick: the frame owns its samples outright.
                let mut samples = vec![0.0_f32; frame_samples];
                let written = match source.read_frame(&mut samples) {
                    Ok(n) => n,
                    Err(e) => {
                        error!("Capture source failed: {}", e);
                        if let Ok(mut slot) = last_error.lock() {
                            *slot = Some(e);
                        }
                        break;
                    }
                };
                if written == 0 {
                    info!("Capture source exhausted, ending stream");
                    break;
                }
                samples.truncate(written);

                let frame = AudioFrame {
                    samples,
                    sample_rate,
                    channels: 1,
                    timestamp_ms: started.elapsed().as_millis() as u64,
                };

                if tx.send(frame).await.is_err() {
                    // Receiver dropped; nothing left to feed.
                    break;
                }
            }

            running.store(false, Ordering::SeqCst);
            info!("Capture task for {} stopped", name);
        });

        self.task = Some(task);
        Ok(rx)
    }

    async fn stop(&mut self) -> Result<(), CaptureError> {
        self.running.store(false, Ordering::SeqCst);
        if let Some(task) = self.task.take() {
            if let Err(e) = task.await {
                warn!("Capture task panicked: {}", e);
            }
        }
        Ok(())
    }

    fn is_capturing(&self) -> bool {
        self.running.load(Ordering::SeqCst)
    }

    fn error(&self) -> Option<CaptureError> {
        self.last_error.lock().ok().and_then(|slot| slot.clone())
    }

    fn name(&self) -> &str {
        &self.name
    }
}

/// Where frames come from.
#[derive(Debug, Clone)]
pub enum CaptureSource {
    /// All-zero frames (placeholder input)
    Silence { sample_rate: u32 },
    /// Continuous sine tone, useful for tests and demos
    Tone { sample_rate: u32, hz: f32 },
    /// Stream an existing WAV file as if it were live input
    File(PathBuf),
}

/// Capture backend factory.
pub struct CaptureBackendFactory;

impl CaptureBackendFactory {
    pub fn create(
        source: CaptureSource,
        config: CaptureConfig,
    ) -> Result<Box<dyn CaptureBackend>, CaptureError> {
        match source {
            CaptureSource::Silence { sample_rate } => Ok(Box::new(TimedCapture::new(
                Box::new(SilenceSource { sample_rate }),
                config,
                "silence",
            ))),
            CaptureSource::Tone { sample_rate, hz } => Ok(Box::new(TimedCapture::new(
                Box::new(ToneSource::new(sample_rate, hz)),
                config,
                "tone",
            ))),
            CaptureSource::File(path) => {
                let source = WavFileSource::open(&path)?;
                Ok(Box::new(TimedCapture::new(
                    Box::new(source),
                    config,
                    format!("file:{}", path.display()),
                )))
            }
        }
    }
}

/// Endless silence.
pub struct SilenceSource {
    pub sample_rate: u32,
}

impl SampleSource for SilenceSource {
    fn sample_rate(&self) -> u32 {
        self.sample_rate
    }

    fn read_frame(&mut self, buf: &mut [f32]) -> Result<usize, CaptureError> {
        buf.fill(0.0);
        Ok(buf.len())
    }
}

/// Continuous sine tone at a fixed frequency and amplitude.
pub struct ToneSource {
    sample_rate: u32,
    hz: f32,
    amplitude: f32,
    phase: f32,
}

impl ToneSource {
    pub fn new(sample_rate: u32, hz: f32) -> Self {
        Self {
            sample_rate,
            hz,
            amplitude: 0.3,
            phase: 0.0,
        }
    }
}

impl SampleSource for ToneSource {
    fn sample_rate(&self) -> u32 {
        self.sample_rate
    }

    fn read_frame(&mut self, buf: &mut [f32]) -> Result<usize, CaptureError> {
        let step = 2.0 * std::f32::consts::PI * self.hz / self.sample_rate as f32;
        for sample in buf.iter_mut() {
            *sample = self.amplitude * self.phase.sin();
            self.phase += step;
            if self.phase > 2.0 * std::f32::consts::PI {
                self.phase -= 2.0 * std::f32::consts::PI;
            }
        }
        Ok(buf.len())
    }
}

/// Streams samples from a WAV file, normalized to [-1.0, 1.0].
pub struct WavFileSource {
    samples: Vec<f32>,
    sample_rate: u32,
    position: usize,
}

impl WavFileSource {
    pub fn open(path: &PathBuf) -> Result<Self, CaptureError> {
        let bytes =
            std::fs::read(path).map_err(|e| CaptureError::Open(format!("{}: {}", path.display(), e)))?;
        let (pcm, sample_rate) =
            decode_wav_bytes(&bytes).map_err(|e| CaptureError::Open(e.to_string()))?;
        let samples = pcm.iter().map(|&s| s as f32 / 32768.0).collect();
        Ok(Self {
            samples,
            sample_rate,
            position: 0,
        })
    }
}

impl SampleSource for WavFileSource {
    fn sample_rate(&self) -> u32 {
        self.sample_rate
    }

    fn read_frame(&mut self, buf: &mut [f32]) -> Result<usize, CaptureError> {
        let remaining = self.samples.len() - self.position;
        let n = remaining.min(buf.len());
        buf[..n].copy_from_slice(&self.samples[self.position..self.position + n]);
        self.position += n;
        Ok(n)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn tone_source_fills_whole_buffer() {
        let mut source = ToneSource::new(16000, 220.0);
        let mut buf = vec![0.0_f32; 1024];
        let n = source.read_frame(&mut buf).unwrap();
        assert_eq!(n, 1024);
        assert!(buf.iter().any(|&s| s.abs() > 0.1));
        assert!(buf.iter().all(|&s| s.abs() <= 0.3 + 1e-6));
    }

    #[test]
    fn silence_source_is_all_zero() {
        let mut source = SilenceSource { sample_rate: 16000 };
        let mut buf = vec![1.0_f32; 64];
        assert_eq!(source.read_frame(&mut buf).unwrap(), 64);
        assert!(buf.iter().all(|&s| s == 0.0));
    }

    #[tokio::test]
    async fn timed_capture_delivers_copied_frames() {
        let config = CaptureConfig {
            frame_samples: 160, // 10 ms at 16 kHz to keep the test fast
            channel_capacity: 16,
        };
        let mut backend = TimedCapture::new(
            Box::new(ToneSource::new(16000, 220.0)),
            config,
            "test-tone",
        );

        let mut rx = backend.start().await.unwrap();
        let first = rx.recv().await.expect("first frame");
        let second = rx.recv().await.expect("second frame");
        assert_eq!(first.sample_rate, 16000);
        assert_eq!(first.channels, 1);
        assert_eq!(first.samples.len(), 160);
        assert!(second.timestamp_ms >= first.timestamp_ms);

        backend.stop().await.unwrap();
        assert!(!backend.is_capturing());
        assert!(backend.error().is_none());
    }

    #[tokio::test]
    async fn double_start_is_rejected() {
        let mut backend = TimedCapture::new(
            Box::new(SilenceSource { sample_rate: 16000 }),
            CaptureConfig::default(),
            "test-silence",
        );
        let _rx = backend.start().await.unwrap();
        assert!(matches!(
            backend.start().await,
            Err(CaptureError::AlreadyRunning)
        ));
        backend.stop().await.unwrap();
    }
}
