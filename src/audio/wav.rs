//! RIFF/WAVE export of the accumulated signal.
//!
//! Output is always canonical 16-bit mono PCM with a 44-byte header:
//!
//! ```text
//! 0  "RIFF"  4  36+data  8  "WAVE"  12 "fmt "  16 16  20 1 (PCM)  22 1 (mono)
//! 24 rate    28 rate*2   32 2       34 16      36 "data"  40 data  44 samples
//! ```

use crate::defaults::WAV_BITS_PER_SAMPLE;
use crate::error::{PcmcastError, Result};
use std::io::Cursor;

/// Size of the canonical PCM header written by [`encode_wav`].
pub const WAV_HEADER_LEN: usize = 44;

/// Quantize one f32 sample to i16.
///
/// Negative values scale by 32768 and non-negative ones by 32767, so both
/// -1.0 and 1.0 land exactly on the i16 limits. NaN becomes silence.
pub fn quantize_sample(sample: f32) -> i16 {
    if sample.is_nan() {
        return 0;
    }
    let s = sample.clamp(-1.0, 1.0);
    if s < 0.0 {
        (s * 32768.0).round() as i16
    } else {
        (s * 32767.0).round() as i16
    }
}

/// Encode mono f32 samples as a 16-bit PCM WAV file in memory.
///
/// Pure: the same samples and rate always produce the same bytes.
pub fn encode_wav(samples: &[f32], sample_rate: u32) -> Result<Vec<u8>> {
    let spec = hound::WavSpec {
        channels: 1,
        sample_rate,
        bits_per_sample: WAV_BITS_PER_SAMPLE,
        sample_format: hound::SampleFormat::Int,
    };

    let mut cursor = Cursor::new(Vec::with_capacity(WAV_HEADER_LEN + samples.len() * 2));
    {
        let mut writer =
            hound::WavWriter::new(&mut cursor, spec).map_err(|e| PcmcastError::WavEncode {
                message: format!("Failed to write WAV header: {}", e),
            })?;

        for &s in samples {
            writer
                .write_sample(quantize_sample(s))
                .map_err(|e| PcmcastError::WavEncode {
                    message: format!("Failed to write WAV samples: {}", e),
                })?;
        }

        writer.finalize().map_err(|e| PcmcastError::WavEncode {
            message: format!("Failed to finalize WAV: {}", e),
        })?;
    }

    Ok(cursor.into_inner())
}

/// Basic facts about a WAV file received from the service.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct WavSummary {
    pub sample_rate: u32,
    pub channels: u16,
    pub bits_per_sample: u16,
    /// Frames per channel.
    pub frames: u32,
}

impl WavSummary {
    pub fn duration_secs(&self) -> f64 {
        self.frames as f64 / self.sample_rate as f64
    }
}

/// Parse the header of an encoded WAV file.
pub fn inspect_wav(bytes: &[u8]) -> Result<WavSummary> {
    let reader = hound::WavReader::new(Cursor::new(bytes)).map_err(|e| {
        PcmcastError::InvalidResponse {
            message: format!("Failed to parse WAV file: {}", e),
        }
    })?;
    let spec = reader.spec();
    Ok(WavSummary {
        sample_rate: spec.sample_rate,
        channels: spec.channels,
        bits_per_sample: spec.bits_per_sample,
        frames: reader.duration(),
    })
}

/// Decode a WAV file to mono `f32`, averaging channels.
///
/// Used to play the pre-encoded files of non-streaming synthesis.
pub fn decode_wav_mono(bytes: &[u8]) -> Result<(Vec<f32>, WavSummary)> {
    let parse_error = |e: hound::Error| PcmcastError::InvalidResponse {
        message: format!("Failed to parse WAV file: {}", e),
    };
    let mut reader = hound::WavReader::new(Cursor::new(bytes)).map_err(parse_error)?;
    let spec = reader.spec();
    let summary = WavSummary {
        sample_rate: spec.sample_rate,
        channels: spec.channels,
        bits_per_sample: spec.bits_per_sample,
        frames: reader.duration(),
    };

    let interleaved: Vec<f32> = match spec.sample_format {
        hound::SampleFormat::Float => reader
            .samples::<f32>()
            .collect::<std::result::Result<_, _>>()
            .map_err(parse_error)?,
        hound::SampleFormat::Int => {
            let scale = (1i64 << (spec.bits_per_sample.saturating_sub(1))) as f32;
            reader
                .samples::<i32>()
                .map(|s| s.map(|v| v as f32 / scale))
                .collect::<std::result::Result<_, _>>()
                .map_err(parse_error)?
        }
    };

    let channels = usize::from(spec.channels.max(1));
    let mono = if channels == 1 {
        interleaved
    } else {
        interleaved
            .chunks_exact(channels)
            .map(|frame| frame.iter().sum::<f32>() / channels as f32)
            .collect()
    };
    Ok((mono, summary))
}
