//! Default configuration constants for pcmcast.
//!
//! Shared by the config layer, the CLI and the streaming pipeline so the
//! same values are used everywhere.

/// Default sample rate of the synthesized stream in Hz.
///
/// The raw stream carries no header, so this rate is the only thing that
/// tells the player how fast to consume samples.
pub const SAMPLE_RATE: u32 = 22050;

/// Default base URL of the synthesis service.
pub const SERVER_URL: &str = "http://127.0.0.1:8000";

/// Default request timeout for non-streaming calls, in seconds.
///
/// Streaming reads are never bounded by this; a long utterance may take
/// arbitrarily long to arrive.
pub const REQUEST_TIMEOUT_SECS: u64 = 120;

/// Default speaking speed multiplier.
pub const SPEED: f32 = 1.0;

/// Size in bytes of one little-endian f32 sample on the wire.
pub const BYTES_PER_SAMPLE: usize = 4;

/// Bits per sample of the exported WAV container.
pub const WAV_BITS_PER_SAMPLE: u16 = 16;

/// Synthesis endpoint path.
pub const TTS_PATH: &str = "/v1/tts";

/// Health endpoint path.
pub const HEALTH_PATH: &str = "/v1/health";

/// Cached voice list endpoint path.
pub const VOICES_PATH: &str = "/v1/voices";

/// Built-in speaker list endpoint path.
pub const SPEAKERS_PATH: &str = "/v1/speakers";

/// Response header the service uses to advertise its output rate.
pub const SAMPLE_RATE_HEADER: &str = "x-sample-rate";

/// Fallback message when a failed synthesis response carries no `detail`.
pub const GENERIC_REQUEST_FAILURE: &str = "Synthesis request failed";

/// Fallback message when a failed streaming response carries no `detail`.
pub const GENERIC_STREAM_FAILURE: &str = "Streaming synthesis request failed";
