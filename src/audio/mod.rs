pub mod capture;
pub mod heuristics;
pub mod wav;

pub use capture::{
    AudioFrame, CaptureBackend, CaptureBackendFactory, CaptureConfig, CaptureError, CaptureSource,
    SampleSource, SilenceSource, TimedCapture, ToneSource, WavFileSource,
};
pub use heuristics::{
    syllable_rate_to_wpm, FrameVerdict, HeuristicsConfig, LocalEstimate, SpeechHeuristics,
};
pub use wav::{decode_wav, encode_wav, silent_wav, EncodingError, WavBlob};
