//! Signal retention and WAV export.

pub mod accumulator;
pub mod wav;

pub use accumulator::SignalBuffer;
pub use wav::{WavSummary, decode_wav_mono, encode_wav, inspect_wav, quantize_sample};
