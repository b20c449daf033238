//! pcmcast - Streaming playback for remote speech synthesis
//!
//! Plays raw PCM as it arrives from a synthesis service, gaplessly, and
//! exports the complete utterance as a 16-bit WAV file.

// Enforce error handling discipline
#![warn(clippy::unwrap_used)]
#![warn(clippy::expect_used)]
#![warn(clippy::let_underscore_must_use)]

pub mod audio;
#[cfg(feature = "cli")]
pub mod cli;
pub mod client;
pub mod config;
pub mod defaults;
pub mod error;
pub mod playback;
pub mod request;
pub mod session;
pub mod stream;

// Composition root - needs the sound card and the CLI types
#[cfg(all(feature = "cpal-audio", feature = "cli"))]
pub mod app;

// Core traits (source → schedule → device)
pub use playback::device::OutputDevice;
pub use stream::reader::ChunkSource;

// Pipeline
pub use session::{GenerateOutcome, Generated, PartialSignal, StreamSession, Streamer};

// Building blocks
pub use audio::accumulator::SignalBuffer;
pub use audio::wav::{encode_wav, quantize_sample};
pub use playback::scheduler::PlaybackScheduler;
pub use stream::aligner::SampleAligner;
pub use stream::chunk::AudioChunk;

// Service
pub use client::TtsClient;
pub use request::{SynthesisMode, TtsRequest};

// Error handling
pub use error::{PcmcastError, Result};

// Config
pub use config::{Config, PlaybackStrategy};

/// Build version string with optional git commit hash.
///
/// Returns `"0.1.0+abc1234"` when git hash is available, `"0.1.0"` otherwise.
pub fn version_string() -> String {
    let version = env!("CARGO_PKG_VERSION");
    match option_env!("GIT_HASH") {
        Some(hash) if !hash.is_empty() => format!("{}+{}", version, hash),
        _ => version.to_string(),
    }
}
