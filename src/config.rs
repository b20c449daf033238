use crate::defaults;
use crate::error::PcmcastError;
use crate::request::SynthesisMode;
use serde::{Deserialize, Serialize};
use std::fs;
use std::path::{Path, PathBuf};

/// Root configuration structure
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Default)]
#[serde(default)]
pub struct Config {
    pub server: ServerConfig,
    pub audio: AudioConfig,
    pub synthesis: SynthesisConfig,
}

/// Synthesis service connection
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(default)]
pub struct ServerConfig {
    pub url: String,
    /// Timeout for non-streaming calls. Streams are never cut off.
    pub timeout_secs: u64,
}

/// Playback configuration
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(default)]
pub struct AudioConfig {
    /// Rate of the raw sample stream. The stream itself does not carry it.
    pub sample_rate: u32,
    pub device: Option<String>,
    pub strategy: PlaybackStrategy,
}

/// How a streaming response is turned into sound
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Default)]
#[serde(rename_all = "lowercase")]
pub enum PlaybackStrategy {
    /// Schedule every chunk as it arrives, back to back.
    #[default]
    Gapless,
    /// Read the whole response, then play it in one piece.
    Buffered,
}

/// Defaults applied to every synthesis request
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(default)]
pub struct SynthesisConfig {
    pub mode: SynthesisMode,
    pub speaker: Option<String>,
    pub voice_id: Option<String>,
    pub speed: f32,
    pub stream: bool,
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            url: defaults::SERVER_URL.to_string(),
            timeout_secs: defaults::REQUEST_TIMEOUT_SECS,
        }
    }
}

impl Default for AudioConfig {
    fn default() -> Self {
        Self {
            sample_rate: defaults::SAMPLE_RATE,
            device: None,
            strategy: PlaybackStrategy::Gapless,
        }
    }
}

impl Default for SynthesisConfig {
    fn default() -> Self {
        Self {
            mode: SynthesisMode::Sft,
            speaker: None,
            voice_id: None,
            speed: defaults::SPEED,
            stream: true,
        }
    }
}

impl Config {
    /// Load configuration from a TOML file
    ///
    /// Returns an error if the file contains invalid TOML.
    /// Missing fields will use default values.
    pub fn load(path: &Path) -> anyhow::Result<Self> {
        let contents = fs::read_to_string(path)?;
        let config: Config = toml::from_str(&contents)?;
        Ok(config)
    }

    /// Load configuration from a file or return defaults if file doesn't exist
    ///
    /// Only returns defaults if the file is missing.
    /// Returns errors for invalid TOML.
    pub fn load_or_default(path: &Path) -> anyhow::Result<Self> {
        match Self::load(path) {
            Ok(config) => Ok(config),
            Err(e)
                if e.downcast_ref::<std::io::Error>()
                    .is_some_and(|io_err| io_err.kind() == std::io::ErrorKind::NotFound) =>
            {
                Ok(Self::default())
            }
            Err(e) => Err(e.context(format!("Failed to load config from {}", path.display()))),
        }
    }

    /// Apply environment variable overrides
    ///
    /// Supported environment variables:
    /// - PCMCAST_SERVER_URL → server.url
    /// - PCMCAST_AUDIO_DEVICE → audio.device
    /// - PCMCAST_SAMPLE_RATE → audio.sample_rate (ignored unless a positive integer)
    pub fn with_env_overrides(mut self) -> Self {
        if let Ok(url) = std::env::var("PCMCAST_SERVER_URL")
            && !url.is_empty()
        {
            self.server.url = url;
        }

        if let Ok(device) = std::env::var("PCMCAST_AUDIO_DEVICE")
            && !device.is_empty()
        {
            self.audio.device = Some(device);
        }

        if let Ok(rate) = std::env::var("PCMCAST_SAMPLE_RATE")
            && let Ok(rate) = rate.trim().parse::<u32>()
            && rate > 0
        {
            self.audio.sample_rate = rate;
        }

        self
    }

    /// Check values that would otherwise fail deep inside the pipeline.
    pub fn validate(&self) -> Result<(), PcmcastError> {
        if self.server.url.trim().is_empty() {
            return Err(PcmcastError::ConfigInvalidValue {
                key: "server.url".to_string(),
                message: "must not be empty".to_string(),
            });
        }
        if self.audio.sample_rate == 0 {
            return Err(PcmcastError::ConfigInvalidValue {
                key: "audio.sample_rate".to_string(),
                message: "must be positive".to_string(),
            });
        }
        if !self.synthesis.speed.is_finite() || self.synthesis.speed <= 0.0 {
            return Err(PcmcastError::ConfigInvalidValue {
                key: "synthesis.speed".to_string(),
                message: "must be a positive number".to_string(),
            });
        }
        Ok(())
    }

    /// Get the default configuration file path
    ///
    /// Returns ~/.config/pcmcast/config.toml on Linux
    pub fn default_path() -> PathBuf {
        dirs::config_dir()
            .unwrap_or_else(|| PathBuf::from(".config"))
            .join("pcmcast")
            .join("config.toml")
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;
    use std::sync::Mutex;
    use tempfile::NamedTempFile;

    // Mutex to serialize tests that modify environment variables
    static ENV_LOCK: Mutex<()> = Mutex::new(());

    // SAFETY: These helpers are only used in tests with ENV_LOCK held,
    // ensuring no concurrent access to environment variables.
    fn set_env(key: &str, value: &str) {
        unsafe { std::env::set_var(key, value) }
    }

    fn remove_env(key: &str) {
        unsafe { std::env::remove_var(key) }
    }

    fn clear_pcmcast_env() {
        remove_env("PCMCAST_SERVER_URL");
        remove_env("PCMCAST_AUDIO_DEVICE");
        remove_env("PCMCAST_SAMPLE_RATE");
    }

    #[test]
    fn test_default_config_has_correct_values() {
        let config = Config::default();

        assert_eq!(config.server.url, "http://127.0.0.1:8000");
        assert_eq!(config.server.timeout_secs, 120);

        assert_eq!(config.audio.sample_rate, 22050);
        assert_eq!(config.audio.device, None);
        assert_eq!(config.audio.strategy, PlaybackStrategy::Gapless);

        assert_eq!(config.synthesis.mode, SynthesisMode::Sft);
        assert_eq!(config.synthesis.speed, 1.0);
        assert!(config.synthesis.stream);
    }

    #[test]
    fn test_load_from_toml_file() {
        let toml_content = r#"
            [server]
            url = "http://tts.local:9000"
            timeout_secs = 30

            [audio]
            sample_rate = 24000
            device = "pulse"
            strategy = "buffered"

            [synthesis]
            mode = "zero_shot"
            voice_id = "alice"
            speed = 1.25
            stream = false
        "#;

        let mut temp_file = NamedTempFile::new().unwrap();
        temp_file.write_all(toml_content.as_bytes()).unwrap();

        let config = Config::load(temp_file.path()).unwrap();

        assert_eq!(config.server.url, "http://tts.local:9000");
        assert_eq!(config.server.timeout_secs, 30);
        assert_eq!(config.audio.sample_rate, 24000);
        assert_eq!(config.audio.device, Some("pulse".to_string()));
        assert_eq!(config.audio.strategy, PlaybackStrategy::Buffered);
        assert_eq!(config.synthesis.mode, SynthesisMode::ZeroShot);
        assert_eq!(config.synthesis.voice_id, Some("alice".to_string()));
        assert_eq!(config.synthesis.speed, 1.25);
        assert!(!config.synthesis.stream);
    }

    #[test]
    fn test_load_partial_config_uses_defaults() {
        let toml_content = r#"
            [audio]
            sample_rate = 16000
        "#;

        let mut temp_file = NamedTempFile::new().unwrap();
        temp_file.write_all(toml_content.as_bytes()).unwrap();

        let config = Config::load(temp_file.path()).unwrap();

        assert_eq!(config.audio.sample_rate, 16000);
        assert_eq!(config.audio.strategy, PlaybackStrategy::Gapless);
        assert_eq!(config.server, ServerConfig::default());
        assert_eq!(config.synthesis, SynthesisConfig::default());
    }

    #[test]
    fn test_env_override_url_and_device() {
        let _lock = ENV_LOCK.lock().unwrap();
        clear_pcmcast_env();

        set_env("PCMCAST_SERVER_URL", "http://gpu-box:8000");
        set_env("PCMCAST_AUDIO_DEVICE", "hw:1,0");
        let config = Config::default().with_env_overrides();

        assert_eq!(config.server.url, "http://gpu-box:8000");
        assert_eq!(config.audio.device, Some("hw:1,0".to_string()));
        assert_eq!(config.audio.sample_rate, 22050);

        clear_pcmcast_env();
    }

    #[test]
    fn test_env_override_sample_rate() {
        let _lock = ENV_LOCK.lock().unwrap();
        clear_pcmcast_env();

        set_env("PCMCAST_SAMPLE_RATE", "24000");
        assert_eq!(Config::default().with_env_overrides().audio.sample_rate, 24000);

        set_env("PCMCAST_SAMPLE_RATE", "fast");
        assert_eq!(Config::default().with_env_overrides().audio.sample_rate, 22050);

        set_env("PCMCAST_SAMPLE_RATE", "0");
        assert_eq!(Config::default().with_env_overrides().audio.sample_rate, 22050);

        clear_pcmcast_env();
    }

    #[test]
    fn test_env_override_empty_string_ignored() {
        let _lock = ENV_LOCK.lock().unwrap();
        clear_pcmcast_env();

        set_env("PCMCAST_SERVER_URL", "");
        let config = Config::default().with_env_overrides();
        assert_eq!(config.server.url, "http://127.0.0.1:8000");

        clear_pcmcast_env();
    }

    #[test]
    fn test_invalid_toml_returns_error() {
        let invalid_toml = r#"
            [audio
            device = "broken
        "#;

        let mut temp_file = NamedTempFile::new().unwrap();
        temp_file.write_all(invalid_toml.as_bytes()).unwrap();

        assert!(Config::load(temp_file.path()).is_err());
    }

    #[test]
    fn test_unknown_strategy_is_rejected() {
        let result: Result<Config, _> = toml::from_str("[audio]\nstrategy = \"turbo\"\n");
        assert!(result.is_err());
    }

    #[test]
    fn test_validate_rejects_bad_values() {
        let mut config = Config::default();
        assert!(config.validate().is_ok());

        config.audio.sample_rate = 0;
        assert!(matches!(
            config.validate(),
            Err(PcmcastError::ConfigInvalidValue { ref key, .. }) if key == "audio.sample_rate"
        ));

        let mut config = Config::default();
        config.synthesis.speed = -1.0;
        assert!(config.validate().is_err());

        let mut config = Config::default();
        config.server.url = "  ".to_string();
        assert!(config.validate().is_err());
    }

    #[test]
    fn test_default_path_ends_with_config_toml() {
        let path = Config::default_path();
        let path_str = path.to_string_lossy();

        assert!(path_str.contains("pcmcast"));
        assert!(path_str.ends_with("config.toml"));
    }

    #[test]
    fn test_load_or_default_returns_default_for_missing_file() {
        let missing_path = Path::new("/tmp/nonexistent_pcmcast_config_12345.toml");
        let config = Config::load_or_default(missing_path).unwrap();
        assert_eq!(config, Config::default());
    }

    #[test]
    fn test_load_or_default_errors_on_invalid_toml() {
        let mut temp_file = NamedTempFile::new().unwrap();
        temp_file.write_all(b"[audio\n").unwrap();

        let err = Config::load_or_default(temp_file.path()).unwrap_err();
        assert!(err.to_string().contains("Failed to load config"));
    }
}
