//! Configuration types for the voice session controller.

use serde::{Deserialize, Serialize};
use std::path::PathBuf;

/// Top-level configuration for a voice session.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct VoiceConfig {
    /// Audio capture/playback settings.
    pub audio: AudioConfig,
    /// Endpoint detection (silence-based utterance completion) settings.
    pub endpoint: EndpointConfig,
    /// Capture strategy settings.
    pub capture: CaptureConfig,
    /// Remote agent gateway settings.
    pub gateway: GatewayConfig,
}

/// Audio I/O configuration.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct AudioConfig {
    /// Sample rate the captured utterance is stored at, in Hz.
    pub input_sample_rate: u32,
    /// Output sample rate for reply playback, in Hz.
    pub output_sample_rate: u32,
    /// Input device name (None = system default).
    pub input_device: Option<String>,
    /// Output device name (None = system default).
    pub output_device: Option<String>,
    /// Analysis window length, in samples, for the spectral energy probe.
    pub analysis_window: usize,
}

impl Default for AudioConfig {
    fn default() -> Self {
        Self {
            input_sample_rate: 16_000,
            output_sample_rate: 24_000,
            input_device: None,
            output_device: None,
            analysis_window: 256,
        }
    }
}

/// Endpoint detection configuration.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct EndpointConfig {
    /// Band energy (0-255 scale) at or above which a tick counts as loud.
    pub silence_threshold: f32,
    /// Silence duration in ms after which the utterance is considered complete.
    pub silence_window_ms: u64,
    /// Sampling cadence of the detector task in ms.
    pub tick_interval_ms: u64,
}

impl Default for EndpointConfig {
    fn default() -> Self {
        Self {
            silence_threshold: 6.0,
            silence_window_ms: 1_500,
            tick_interval_ms: 16,
        }
    }
}

/// How a user utterance is captured.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum CaptureStrategy {
    /// Record raw audio continuously; the endpoint detector decides when
    /// the utterance has ended.
    #[default]
    RawAudioWithVad,
    /// Delegate segmentation to a platform recognition facility that emits
    /// one recognized-text result per session.
    NativeRecognition,
}

/// Capture strategy configuration.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct CaptureConfig {
    /// Which capture strategy to use.
    pub strategy: CaptureStrategy,
    /// Recognition language tag (static parameter, not negotiated).
    pub language: String,
}

impl Default for CaptureConfig {
    fn default() -> Self {
        Self {
            strategy: CaptureStrategy::RawAudioWithVad,
            language: "en-US".to_owned(),
        }
    }
}

/// Remote agent gateway configuration.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct GatewayConfig {
    /// Base URL of the agent service.
    pub base_url: String,
    /// Request timeout in seconds. Agent reasoning plus speech synthesis
    /// can take a while, so this is generous by default.
    pub timeout_secs: u64,
}

impl Default for GatewayConfig {
    fn default() -> Self {
        Self {
            base_url: "http://localhost:8000".to_owned(),
            timeout_secs: 60,
        }
    }
}

impl VoiceConfig {
    /// Load configuration from a TOML file, falling back to defaults for missing fields.
    ///
    /// # Errors
    ///
    /// Returns an error if the file cannot be read or parsed.
    pub fn from_file(path: &std::path::Path) -> crate::error::Result<Self> {
        let content = std::fs::read_to_string(path)?;
        toml::from_str(&content).map_err(|e| crate::error::VoiceError::Config(e.to_string()))
    }

    /// Save configuration to a TOML file, creating parent directories as needed.
    ///
    /// # Errors
    ///
    /// Returns an error if the file cannot be written or the config cannot be serialized.
    pub fn save_to_file(&self, path: &std::path::Path) -> crate::error::Result<()> {
        if let Some(parent) = path.parent() {
            std::fs::create_dir_all(parent)?;
        }
        let content = toml::to_string_pretty(self)
            .map_err(|e| crate::error::VoiceError::Config(e.to_string()))?;
        std::fs::write(path, content)?;
        Ok(())
    }

    /// Returns the default config file path: `<config dir>/seva/config.toml`.
    pub fn default_config_path() -> PathBuf {
        dirs::config_dir()
            .unwrap_or_else(|| PathBuf::from("/tmp"))
            .join("seva")
            .join("config.toml")
    }
}

#[cfg(test)]
mod tests {
    #![allow(clippy::unwrap_used, clippy::expect_used, clippy::panic)]

    use super::*;

    #[test]
    fn default_config_is_valid() {
        let config = VoiceConfig::default();
        assert!(config.audio.input_sample_rate > 0);
        assert!(config.audio.output_sample_rate > 0);
        assert!(config.audio.analysis_window.is_power_of_two());
        assert!(config.endpoint.silence_threshold > 0.0);
        assert!(config.endpoint.silence_window_ms > 0);
        assert!(config.endpoint.tick_interval_ms > 0);
        assert!(!config.capture.language.is_empty());
        assert!(!config.gateway.base_url.is_empty());
        assert!(config.gateway.timeout_secs > 0);
    }

    #[test]
    fn save_and_load_round_trip() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("config.toml");

        let mut config = VoiceConfig::default();
        config.endpoint.silence_window_ms = 2_000;
        config.capture.strategy = CaptureStrategy::NativeRecognition;
        config.gateway.base_url = "http://agent.local:9000".to_owned();

        config.save_to_file(&path).unwrap();
        assert!(path.exists());

        let loaded = VoiceConfig::from_file(&path).unwrap();
        assert_eq!(loaded.endpoint.silence_window_ms, 2_000);
        assert_eq!(loaded.capture.strategy, CaptureStrategy::NativeRecognition);
        assert_eq!(loaded.gateway.base_url, "http://agent.local:9000");
    }

    #[test]
    fn from_file_nonexistent_returns_error() {
        let result = VoiceConfig::from_file(std::path::Path::new("/nonexistent/path/config.toml"));
        assert!(result.is_err());
    }

    #[test]
    fn from_file_invalid_toml_returns_error() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("bad.toml");
        std::fs::write(&path, "this is not valid toml {{{").unwrap();

        let result = VoiceConfig::from_file(&path);
        assert!(result.is_err());
    }

    #[test]
    fn partial_file_falls_back_to_defaults() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("partial.toml");
        std::fs::write(&path, "[gateway]\nbase_url = \"http://example.com\"\n").unwrap();

        let loaded = VoiceConfig::from_file(&path).unwrap();
        assert_eq!(loaded.gateway.base_url, "http://example.com");
        assert_eq!(loaded.endpoint.silence_window_ms, 1_500);
        assert_eq!(loaded.capture.strategy, CaptureStrategy::RawAudioWithVad);
    }

    #[test]
    fn default_config_path_ends_with_config_toml() {
        let path = VoiceConfig::default_config_path();
        let path_str = path.to_string_lossy();
        assert!(path_str.ends_with("config.toml"));
        assert!(path_str.contains("seva"));
    }
}
