//! HTTP client for the speech-synthesis service.

use crate::config::ServerConfig;
use crate::defaults;
use crate::error::{PcmcastError, Result};
use crate::request::TtsRequest;
use crate::stream::reader::HttpChunkSource;
use base64::Engine;
use reqwest::header::CONTENT_TYPE;
use serde::Deserialize;
use std::time::Duration;

/// Response of `GET /v1/health`.
#[derive(Debug, Clone, Default, Deserialize, PartialEq)]
#[serde(default)]
pub struct HealthStatus {
    pub status: String,
    pub gpu: Option<bool>,
    pub model: Option<String>,
    pub sample_rate: Option<u32>,
    pub output_sample_rate: Option<u32>,
    pub voice_count: Option<u32>,
    pub vllm_enabled: Option<bool>,
}

impl HealthStatus {
    pub fn is_ok(&self) -> bool {
        self.status == "ok"
    }
}

/// One cached voice from `GET /v1/voices`.
#[derive(Debug, Clone, Default, Deserialize, PartialEq)]
#[serde(default)]
pub struct VoiceInfo {
    #[serde(alias = "voice_id")]
    pub id: Option<String>,
    pub name: Option<String>,
    pub prompt_text: Option<String>,
}

/// Response of `GET /v1/voices`.
#[derive(Debug, Clone, Default, Deserialize, PartialEq)]
#[serde(default)]
pub struct VoiceList {
    pub voices: Vec<VoiceInfo>,
    pub total: usize,
    pub default_voice_id: Option<String>,
}

#[derive(Debug, Default, Deserialize)]
#[serde(default)]
struct SpeakerList {
    speakers: Vec<String>,
}

#[derive(Debug, Deserialize)]
struct SynthesisBody {
    audio: String,
    sample_rate: u32,
}

/// A complete, already encoded utterance from the non-streaming endpoint.
#[derive(Debug, Clone, PartialEq)]
pub struct SynthesizedAudio {
    pub wav: Vec<u8>,
    pub sample_rate: u32,
}

/// An open streaming response whose status has been checked.
pub struct StreamResponse {
    pub source: HttpChunkSource,
    /// Rate advertised in the `X-Sample-Rate` header, if any.
    pub advertised_rate: Option<u32>,
}

/// Extract the human-readable `detail` from an error body.
///
/// String details are returned as-is; structured ones (validation errors)
/// are rendered as compact JSON.
pub fn detail_message(body: &[u8]) -> Option<String> {
    let value: serde_json::Value = serde_json::from_slice(body).ok()?;
    match value.get("detail")? {
        serde_json::Value::Null => None,
        serde_json::Value::String(s) if s.is_empty() => None,
        serde_json::Value::String(s) => Some(s.clone()),
        other => Some(other.to_string()),
    }
}

/// Client for one synthesis service.
#[derive(Debug, Clone)]
pub struct TtsClient {
    http: reqwest::Client,
    base_url: String,
    timeout: Duration,
}

impl TtsClient {
    pub fn new(base_url: &str, timeout: Duration) -> Self {
        Self {
            http: reqwest::Client::new(),
            base_url: base_url.trim_end_matches('/').to_string(),
            timeout,
        }
    }

    pub fn from_config(config: &ServerConfig) -> Self {
        Self::new(&config.url, Duration::from_secs(config.timeout_secs))
    }

    pub fn base_url(&self) -> &str {
        &self.base_url
    }

    fn url(&self, path: &str) -> String {
        format!("{}{}", self.base_url, path)
    }

    fn post_tts(&self, request: &TtsRequest) -> Result<reqwest::RequestBuilder> {
        let body = serde_json::to_vec(request).map_err(|e| PcmcastError::InvalidRequest {
            message: format!("Failed to serialize request: {e}"),
        })?;
        Ok(self
            .http
            .post(self.url(defaults::TTS_PATH))
            .header(CONTENT_TYPE, "application/json")
            .body(body))
    }

    /// Start a streaming synthesis and check its status before any body read.
    pub async fn open_stream(&self, request: &TtsRequest) -> Result<StreamResponse> {
        let request = request.clone().with_stream(true);
        let response = self.post_tts(&request)?.send().await?;
        let response = ensure_success(response, defaults::GENERIC_STREAM_FAILURE).await?;

        let advertised_rate = response
            .headers()
            .get(defaults::SAMPLE_RATE_HEADER)
            .and_then(|v| v.to_str().ok())
            .and_then(|v| v.trim().parse().ok());

        Ok(StreamResponse {
            source: HttpChunkSource::new(response),
            advertised_rate,
        })
    }

    /// Non-streaming synthesis: one response holding a complete WAV file.
    pub async fn synthesize(&self, request: &TtsRequest) -> Result<SynthesizedAudio> {
        let request = request.clone().with_stream(false);
        let response = self
            .post_tts(&request)?
            .timeout(self.timeout)
            .send()
            .await?;
        let response = ensure_success(response, defaults::GENERIC_REQUEST_FAILURE).await?;

        let body: SynthesisBody = read_json(response).await?;
        let wav = base64::engine::general_purpose::STANDARD
            .decode(body.audio.as_bytes())
            .map_err(|e| PcmcastError::InvalidResponse {
                message: format!("audio is not valid base64: {e}"),
            })?;

        Ok(SynthesizedAudio {
            wav,
            sample_rate: body.sample_rate,
        })
    }

    pub async fn health(&self) -> Result<HealthStatus> {
        self.get_json(defaults::HEALTH_PATH).await
    }

    pub async fn voices(&self) -> Result<VoiceList> {
        self.get_json(defaults::VOICES_PATH).await
    }

    pub async fn speakers(&self) -> Result<Vec<String>> {
        let list: SpeakerList = self.get_json(defaults::SPEAKERS_PATH).await?;
        Ok(list.speakers)
    }

    async fn get_json<T: serde::de::DeserializeOwned>(&self, path: &str) -> Result<T> {
        let response = self
            .http
            .get(self.url(path))
            .timeout(self.timeout)
            .send()
            .await?;
        let response = ensure_success(response, defaults::GENERIC_REQUEST_FAILURE).await?;
        read_json(response).await
    }
}

/// Turn a non-success response into a `Transport` error carrying the
/// server's `detail` when present.
async fn ensure_success(response: reqwest::Response, fallback: &str) -> Result<reqwest::Response> {
    let status = response.status();
    if status.is_success() {
        return Ok(response);
    }

    let body = response.bytes().await.unwrap_or_default();
    let message = detail_message(&body)
        .unwrap_or_else(|| format!("{fallback} (HTTP {})", status.as_u16()));
    tracing::debug!(status = status.as_u16(), %message, "service returned an error");
    Err(PcmcastError::Transport { message })
}

async fn read_json<T: serde::de::DeserializeOwned>(response: reqwest::Response) -> Result<T> {
    let body = response
        .bytes()
        .await
        .map_err(|e| PcmcastError::transport(format!("Failed to read response: {e}")))?;
    serde_json::from_slice(&body).map_err(|e| PcmcastError::InvalidResponse {
        message: format!("unexpected JSON: {e}"),
    })
}
