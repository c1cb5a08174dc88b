use hound::{SampleFormat, WavReader, WavSpec, WavWriter};
use std::io::Cursor;
use thiserror::Error;

/// Errors from WAV encode/decode.
///
/// Encoding operates on an in-memory cursor and cannot fail for well-formed
/// sample buffers; an `Encode` error indicates a programming error upstream.
#[derive(Debug, Error)]
pub enum EncodingError {
    #[error("failed to encode WAV data: {0}")]
    Encode(#[from] hound::Error),
    #[error("malformed WAV container: {0}")]
    Decode(String),
}

/// An immutable, fully assembled WAV container: 44-byte RIFF/WAVE header
/// followed by 16-bit little-endian mono PCM data.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct WavBlob {
    bytes: Vec<u8>,
    sample_rate: u32,
    sample_count: usize,
}

impl WavBlob {
    pub fn as_bytes(&self) -> &[u8] {
        &self.bytes
    }

    pub fn into_bytes(self) -> Vec<u8> {
        self.bytes
    }

    pub fn len(&self) -> usize {
        self.bytes.len()
    }

    pub fn is_empty(&self) -> bool {
        self.bytes.is_empty()
    }

    pub fn sample_rate(&self) -> u32 {
        self.sample_rate
    }

    pub fn sample_count(&self) -> usize {
        self.sample_count
    }

    pub fn duration_seconds(&self) -> f64 {
        if self.sample_rate == 0 {
            return 0.0;
        }
        self.sample_count as f64 / self.sample_rate as f64
    }
}

/// Convert a normalized float sample to 16-bit PCM.
///
/// Negative values scale by 32768, positive by 32767, so both -1.0 and 1.0
/// map onto the extremes of the i16 range without overflow.
pub fn sample_to_i16(sample: f32) -> i16 {
    let clamped = sample.clamp(-1.0, 1.0);
    let scaled = if clamped < 0.0 {
        clamped * 32768.0
    } else {
        clamped * 32767.0
    };
    scaled.round() as i16
}

/// Encode normalized float samples into a mono 16-bit PCM WAV container.
///
/// Deterministic: the same input always produces byte-identical output.
/// The sample rate is passed through unchanged; no resampling happens here.
pub fn encode_wav(samples: &[f32], sample_rate: u32) -> Result<WavBlob, EncodingError> {
    let spec = WavSpec {
        channels: 1,
        sample_rate,
        bits_per_sample: 16,
        sample_format: SampleFormat::Int,
    };

    let mut bytes = Vec::with_capacity(44 + samples.len() * 2);
    {
        let cursor = Cursor::new(&mut bytes);
        let mut writer = WavWriter::new(cursor, spec)?;
        for &sample in samples {
            writer.write_sample(sample_to_i16(sample))?;
        }
        writer.finalize()?;
    }

    Ok(WavBlob {
        bytes,
        sample_rate,
        sample_count: samples.len(),
    })
}

/// One second (by default) of encoded silence, used as the fallback artifact
/// when a recording session has nothing usable to finalize.
pub fn silent_wav(duration_secs: f64, sample_rate: u32) -> Result<WavBlob, EncodingError> {
    let sample_count = (duration_secs * sample_rate as f64).round() as usize;
    encode_wav(&vec![0.0; sample_count], sample_rate)
}

/// Decode a WAV container back into 16-bit samples and its sample rate.
pub fn decode_wav(blob: &WavBlob) -> Result<(Vec<i16>, u32), EncodingError> {
    decode_wav_bytes(blob.as_bytes())
}

pub fn decode_wav_bytes(bytes: &[u8]) -> Result<(Vec<i16>, u32), EncodingError> {
    let reader =
        WavReader::new(Cursor::new(bytes)).map_err(|e| EncodingError::Decode(e.to_string()))?;
    let sample_rate = reader.spec().sample_rate;
    let samples = reader
        .into_samples::<i16>()
        .collect::<Result<Vec<_>, _>>()
        .map_err(|e| EncodingError::Decode(e.to_string()))?;
    Ok((samples, sample_rate))
}
