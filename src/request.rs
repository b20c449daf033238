//! Synthesis request sent to the service.

use crate::defaults;
use crate::error::{PcmcastError, Result};
use serde::{Deserialize, Serialize};
use std::fmt;

/// Synthesis mode understood by the service.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Default)]
#[cfg_attr(feature = "cli", derive(clap::ValueEnum))]
#[serde(rename_all = "snake_case")]
pub enum SynthesisMode {
    /// Built-in speaker voices.
    #[default]
    Sft,
    /// Clone a voice from a short reference clip.
    ZeroShot,
    /// Clone a voice across languages.
    CrossLingual,
    /// Natural-language style instructions.
    Instruct,
    /// Voice conversion of an existing recording.
    Vc,
}

impl fmt::Display for SynthesisMode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            SynthesisMode::Sft => "sft",
            SynthesisMode::ZeroShot => "zero_shot",
            SynthesisMode::CrossLingual => "cross_lingual",
            SynthesisMode::Instruct => "instruct",
            SynthesisMode::Vc => "vc",
        };
        f.write_str(name)
    }
}

/// Body of `POST /v1/tts`.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct TtsRequest {
    pub text: String,
    pub mode: SynthesisMode,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub speaker: Option<String>,
    /// Cached voice id; takes priority over `speaker` on the service side.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub voice_id: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub prompt_text: Option<String>,
    /// Reference audio path, as seen by the service.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub prompt_wav_path: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub instruct_text: Option<String>,
    /// Audio to convert in `vc` mode, as seen by the service.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub source_wav_path: Option<String>,
    pub stream: bool,
    pub speed: f32,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub seed: Option<u64>,
}

impl Default for TtsRequest {
    fn default() -> Self {
        Self {
            text: String::new(),
            mode: SynthesisMode::default(),
            speaker: None,
            voice_id: None,
            prompt_text: None,
            prompt_wav_path: None,
            instruct_text: None,
            source_wav_path: None,
            stream: true,
            speed: defaults::SPEED,
            seed: None,
        }
    }
}

fn is_blank(value: &Option<String>) -> bool {
    value.as_deref().is_none_or(|v| v.trim().is_empty())
}

impl TtsRequest {
    pub fn new(text: impl Into<String>) -> Self {
        Self {
            text: text.into(),
            ..Self::default()
        }
    }

    pub fn with_mode(mut self, mode: SynthesisMode) -> Self {
        self.mode = mode;
        self
    }

    pub fn with_stream(mut self, stream: bool) -> Self {
        self.stream = stream;
        self
    }

    pub fn with_speed(mut self, speed: f32) -> Self {
        self.speed = speed;
        self
    }

    /// Cached voice the service looks up for this request, if any.
    ///
    /// Only `sft` and `zero_shot` resolve one; `voice_id` wins over `speaker`.
    pub fn cached_voice(&self) -> Option<&str> {
        match self.mode {
            SynthesisMode::Sft | SynthesisMode::ZeroShot => [&self.voice_id, &self.speaker]
                .into_iter()
                .find(|v| !is_blank(v))
                .and_then(|v| v.as_deref()),
            _ => None,
        }
    }

    /// Reject requests the service would fail on, before anything is sent.
    pub fn validate(&self) -> Result<()> {
        let invalid = |message: &str| {
            Err(PcmcastError::InvalidRequest {
                message: message.to_string(),
            })
        };

        if !self.speed.is_finite() || self.speed <= 0.0 {
            return invalid("speed must be a positive number");
        }

        match self.mode {
            SynthesisMode::Vc => {
                if is_blank(&self.source_wav_path) {
                    return invalid("vc mode needs source audio");
                }
                if is_blank(&self.prompt_wav_path) {
                    return invalid("vc mode needs prompt audio");
                }
                return Ok(());
            }
            SynthesisMode::Instruct => {
                if is_blank(&self.instruct_text) {
                    return invalid("instruct mode needs instruction text");
                }
                if is_blank(&self.prompt_wav_path) && is_blank(&self.speaker) {
                    return invalid("instruct mode needs prompt audio or a speaker");
                }
            }
            SynthesisMode::ZeroShot => {
                if self.cached_voice().is_none() {
                    if is_blank(&self.prompt_wav_path) {
                        return invalid("zero_shot mode needs prompt audio or a cached voice");
                    }
                    if is_blank(&self.prompt_text) {
                        return invalid("zero_shot prompt audio needs its transcript");
                    }
                }
            }
            SynthesisMode::CrossLingual => {
                if is_blank(&self.prompt_wav_path) {
                    return invalid("cross_lingual mode needs prompt audio");
                }
            }
            SynthesisMode::Sft => {}
        }

        if self.text.trim().is_empty() {
            return invalid("text is empty");
        }
        Ok(())
    }
}
