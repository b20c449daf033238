//! Error types for pcmcast.

use thiserror::Error;

#[derive(Error, Debug)]
pub enum PcmcastError {
    // Configuration errors
    #[error("Invalid configuration value for {key}: {message}")]
    ConfigInvalidValue { key: String, message: String },

    // Network errors. The message is surfaced to the user verbatim.
    #[error("{message}")]
    Transport { message: String },

    /// Raised internally when a read is abandoned by `stop()`. Never a failure.
    #[error("Stream cancelled")]
    Cancelled,

    #[error("Invalid synthesis request: {message}")]
    InvalidRequest { message: String },

    #[error("Invalid response from synthesis service: {message}")]
    InvalidResponse { message: String },

    // Audio output errors
    #[error("Audio device not found: {device}")]
    AudioDeviceNotFound { device: String },

    #[error("Audio playback failed: {message}")]
    AudioPlayback { message: String },

    #[error("WAV encoding failed: {message}")]
    WavEncode { message: String },

    // General I/O errors
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),
}

impl PcmcastError {
    /// Build a transport error from anything displayable.
    pub fn transport(message: impl Into<String>) -> Self {
        PcmcastError::Transport {
            message: message.into(),
        }
    }

    /// True for the internal cancellation signal, which callers must not
    /// report as an error.
    pub fn is_cancellation(&self) -> bool {
        matches!(self, PcmcastError::Cancelled)
    }
}

impl From<reqwest::Error> for PcmcastError {
    fn from(err: reqwest::Error) -> Self {
        PcmcastError::Transport {
            message: format!("Connection failed: {err}"),
        }
    }
}

pub type Result<T> = std::result::Result<T, PcmcastError>;
