use crate::error::ConfigError;
use crate::types::CameraDescriptor;
use regex::Regex;
use serde::{Deserialize, Serialize};
use std::collections::HashSet;
use std::path::Path;
use std::time::Duration;

#[derive(Debug, Deserialize, Clone)]
pub struct AppConfig {
    #[serde(default)]
    pub general: GeneralConfig,

    #[serde(default)]
    pub audio: AudioConfig,

    #[serde(default)]
    pub recognition: RecognitionSettings,

    #[serde(default)]
    pub local: LocalConfig,

    #[serde(default)]
    pub camera: Vec<CameraDescriptor>,
}

#[derive(Debug, Deserialize, Clone)]
pub struct GeneralConfig {
    #[serde(default = "default_log_level")]
    pub log_level: String,
}

impl Default for GeneralConfig {
    fn default() -> Self {
        Self {
            log_level: default_log_level(),
        }
    }
}

#[derive(Debug, Deserialize, Clone)]
pub struct AudioConfig {
    #[serde(default = "default_device_name")]
    pub device_name: String,
}

impl Default for AudioConfig {
    fn default() -> Self {
        Self {
            device_name: default_device_name(),
        }
    }
}

/// The `[recognition]` section: the system-configuration record plus the
/// cloud backend's tuning knobs.
#[derive(Debug, Deserialize, Clone)]
pub struct RecognitionSettings {
    #[serde(default)]
    pub speech_api_key: Option<String>,

    #[serde(default = "default_voice_threshold")]
    pub voice_threshold: u8,

    #[serde(default = "default_true")]
    pub auto_switch_enabled: bool,

    #[serde(default = "default_language")]
    pub language: String,

    #[serde(default = "default_chunk_duration_ms")]
    pub chunk_duration_ms: u64,

    #[serde(default = "default_endpoint")]
    pub endpoint: String,
}

impl Default for RecognitionSettings {
    fn default() -> Self {
        Self {
            speech_api_key: None,
            voice_threshold: default_voice_threshold(),
            auto_switch_enabled: default_true(),
            language: default_language(),
            chunk_duration_ms: default_chunk_duration_ms(),
            endpoint: default_endpoint(),
        }
    }
}

impl RecognitionSettings {
    pub fn chunk_duration(&self) -> Duration {
        Duration::from_millis(self.chunk_duration_ms)
    }
}

#[derive(Debug, Deserialize, Clone)]
pub struct LocalConfig {
    #[serde(default = "default_local_engine")]
    pub engine: String,

    #[serde(default)]
    pub whisper: Option<WhisperConfig>,
}

impl Default for LocalConfig {
    fn default() -> Self {
        Self {
            engine: default_local_engine(),
            whisper: None,
        }
    }
}

#[derive(Debug, Deserialize, Serialize, Clone)]
pub struct WhisperConfig {
    pub model_path: String,

    #[serde(default = "default_threads")]
    pub threads: u32,
}

/// Read-only snapshot handed to the recognition pipeline on activation.
#[derive(Debug, Clone, PartialEq)]
pub struct RecognitionConfig {
    pub api_key: Option<String>,
    pub confidence_threshold: u8,
    pub auto_switch_enabled: bool,
}

impl RecognitionConfig {
    /// True when a non-empty speech service credential is configured.
    pub fn has_api_key(&self) -> bool {
        self.api_key.as_deref().is_some_and(|key| !key.is_empty())
    }
}

impl Default for RecognitionConfig {
    fn default() -> Self {
        Self {
            api_key: None,
            confidence_threshold: default_voice_threshold(),
            auto_switch_enabled: default_true(),
        }
    }
}

fn default_log_level() -> String {
    "info".to_string()
}

fn default_device_name() -> String {
    "default".to_string()
}

fn default_voice_threshold() -> u8 {
    85
}

fn default_true() -> bool {
    true
}

fn default_language() -> String {
    "pt-BR".to_string()
}

fn default_chunk_duration_ms() -> u64 {
    4000
}

fn default_endpoint() -> String {
    "https://speech.googleapis.com/v1/speech:recognize".to_string()
}

fn default_local_engine() -> String {
    "whisper".to_string()
}

fn default_threads() -> u32 {
    4
}

/// Interpolate `${VAR}` patterns with environment variable values.
fn interpolate_env_vars(input: &str) -> Result<String, ConfigError> {
    let re = Regex::new(r"\$\{([^}]+)\}").map_err(|e| ConfigError::Invalid(e.to_string()))?;
    let mut result = input.to_string();

    for cap in re.captures_iter(input) {
        let var_name = &cap[1];
        let val = std::env::var(var_name)
            .map_err(|_| ConfigError::EnvVarNotFound(var_name.to_string()))?;
        result = result.replace(&cap[0], &val);
    }

    Ok(result)
}

impl AppConfig {
    /// Load configuration from a TOML file, with environment variable interpolation.
    pub fn load_from_file(path: &Path) -> Result<Self, ConfigError> {
        let content = std::fs::read_to_string(path)?;
        let config = Self::from_toml_str(&content)?;
        tracing::debug!(path = ?path, cameras = config.camera.len(), "config loaded");
        Ok(config)
    }

    /// Parse configuration from a TOML string.
    pub fn from_toml_str(s: &str) -> Result<Self, ConfigError> {
        let interpolated = interpolate_env_vars(s)?;
        let config: AppConfig = toml::from_str(&interpolated)?;
        config.validate()?;
        Ok(config)
    }

    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.recognition.voice_threshold > 100 {
            return Err(ConfigError::Invalid(format!(
                "voice_threshold must be between 0 and 100, got {}",
                self.recognition.voice_threshold
            )));
        }
        if self.recognition.chunk_duration_ms == 0 {
            return Err(ConfigError::Invalid(
                "chunk_duration_ms must be greater than zero".to_string(),
            ));
        }

        let mut seen = HashSet::new();
        for camera in &self.camera {
            if !seen.insert(camera.id.as_str()) {
                return Err(ConfigError::Invalid(format!(
                    "duplicate camera id: {}",
                    camera.id
                )));
            }
        }
        Ok(())
    }

    /// Snapshot of the settings a recognition session is activated with.
    pub fn recognition_config(&self) -> RecognitionConfig {
        RecognitionConfig {
            api_key: self.recognition.speech_api_key.clone(),
            confidence_threshold: self.recognition.voice_threshold,
            auto_switch_enabled: self.recognition.auto_switch_enabled,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_config_parse_valid_toml() {
        let toml_str = r#"
[general]
log_level = "debug"

[audio]
device_name = "USB Microphone"

[recognition]
speech_api_key = "abc123"
voice_threshold = 70
auto_switch_enabled = false
chunk_duration_ms = 3000

[[camera]]
id = "cam1"
name = "Ipanema"
keywords = ["ipanema", "zona sul"]

[[camera]]
id = "cam2"
name = "Centro"
keywords = ["centro"]
is_active = true
"#;
        let config = AppConfig::from_toml_str(toml_str).unwrap();
        assert_eq!(config.general.log_level, "debug");
        assert_eq!(config.audio.device_name, "USB Microphone");
        assert_eq!(config.recognition.speech_api_key.as_deref(), Some("abc123"));
        assert_eq!(config.recognition.voice_threshold, 70);
        assert!(!config.recognition.auto_switch_enabled);
        assert_eq!(config.recognition.chunk_duration(), Duration::from_millis(3000));
        assert_eq!(config.camera.len(), 2);
        assert_eq!(config.camera[0].keywords, vec!["ipanema", "zona sul"]);
        assert!(!config.camera[0].is_active);
        assert!(config.camera[1].is_active);
    }

    #[test]
    fn test_config_default_values() {
        let config = AppConfig::from_toml_str("").unwrap();
        assert_eq!(config.general.log_level, "info");
        assert_eq!(config.audio.device_name, "default");
        assert!(config.recognition.speech_api_key.is_none());
        assert_eq!(config.recognition.voice_threshold, 85);
        assert!(config.recognition.auto_switch_enabled);
        assert_eq!(config.recognition.language, "pt-BR");
        assert_eq!(config.recognition.chunk_duration_ms, 4000);
        assert!(config.recognition.endpoint.starts_with("https://speech.googleapis.com"));
        assert_eq!(config.local.engine, "whisper");
        assert!(config.local.whisper.is_none());
        assert!(config.camera.is_empty());
    }

    #[test]
    fn test_config_env_var_interpolation() {
        std::env::set_var("VOXCAM_TEST_SPEECH_KEY", "secret123");
        let toml_str = r#"
[recognition]
speech_api_key = "${VOXCAM_TEST_SPEECH_KEY}"
"#;
        let config = AppConfig::from_toml_str(toml_str).unwrap();
        assert_eq!(config.recognition.speech_api_key.as_deref(), Some("secret123"));
        std::env::remove_var("VOXCAM_TEST_SPEECH_KEY");
    }

    #[test]
    fn test_config_missing_env_var_error() {
        let toml_str = r#"
[recognition]
speech_api_key = "${DEFINITELY_DOES_NOT_EXIST_12345}"
"#;
        let err = AppConfig::from_toml_str(toml_str).unwrap_err();
        assert!(err.to_string().contains("DEFINITELY_DOES_NOT_EXIST_12345"));
    }

    #[test]
    fn test_config_invalid_toml_error() {
        let result = AppConfig::from_toml_str("this is not valid toml [[[");
        assert!(matches!(result, Err(ConfigError::TomlParse(_))));
    }

    #[test]
    fn test_config_threshold_above_100_rejected() {
        let result = AppConfig::from_toml_str("[recognition]\nvoice_threshold = 101\n");
        match result {
            Err(ConfigError::Invalid(msg)) => assert!(msg.contains("voice_threshold")),
            other => panic!("expected Invalid, got {other:?}"),
        }
    }

    #[test]
    fn test_config_zero_chunk_duration_rejected() {
        let result = AppConfig::from_toml_str("[recognition]\nchunk_duration_ms = 0\n");
        assert!(matches!(result, Err(ConfigError::Invalid(_))));
    }

    #[test]
    fn test_config_duplicate_camera_ids_rejected() {
        let toml_str = r#"
[[camera]]
id = "cam1"

[[camera]]
id = "cam1"
"#;
        match AppConfig::from_toml_str(toml_str) {
            Err(ConfigError::Invalid(msg)) => assert!(msg.contains("cam1")),
            other => panic!("expected Invalid, got {other:?}"),
        }
    }

    #[test]
    fn test_config_load_from_file() {
        let dir = std::env::temp_dir().join("voxcam_test_config");
        std::fs::create_dir_all(&dir).unwrap();
        let path = dir.join("test.toml");
        std::fs::write(
            &path,
            r#"
[general]
log_level = "warn"

[[camera]]
id = "lobby"
keywords = ["lobby"]
"#,
        )
        .unwrap();

        let config = AppConfig::load_from_file(&path).unwrap();
        assert_eq!(config.general.log_level, "warn");
        assert_eq!(config.camera[0].id, "lobby");

        std::fs::remove_dir_all(&dir).unwrap();
    }

    #[test]
    fn test_config_load_from_file_not_found() {
        let result = AppConfig::load_from_file(Path::new("/nonexistent/path.toml"));
        assert!(result
            .unwrap_err()
            .to_string()
            .contains("failed to read config file"));
    }

    #[test]
    fn test_config_local_whisper_section() {
        let toml_str = r#"
[local]
engine = "whisper"

[local.whisper]
model_path = "./models/ggml-base.bin"
"#;
        let config = AppConfig::from_toml_str(toml_str).unwrap();
        let whisper = config.local.whisper.unwrap();
        assert_eq!(whisper.model_path, "./models/ggml-base.bin");
        assert_eq!(whisper.threads, 4);
    }

    #[test]
    fn test_recognition_config_snapshot() {
        let config = AppConfig::from_toml_str(
            r#"
[recognition]
speech_api_key = "k"
voice_threshold = 60
auto_switch_enabled = false
"#,
        )
        .unwrap();
        let snapshot = config.recognition_config();
        assert_eq!(snapshot.api_key.as_deref(), Some("k"));
        assert_eq!(snapshot.confidence_threshold, 60);
        assert!(!snapshot.auto_switch_enabled);
        assert!(snapshot.has_api_key());
    }

    #[test]
    fn test_has_api_key_empty_or_missing() {
        let mut config = RecognitionConfig::default();
        assert!(!config.has_api_key());
        config.api_key = Some(String::new());
        assert!(!config.has_api_key());
        config.api_key = Some("key".to_string());
        assert!(config.has_api_key());
    }

    #[test]
    fn test_example_config_loads_without_environment() {
        let config = AppConfig::from_toml_str(include_str!("../../../config.example.toml")).unwrap();
        assert!(!config.recognition_config().has_api_key());
        assert_eq!(config.recognition.voice_threshold, 85);
        assert_eq!(config.local.engine, "whisper");
        let ids: Vec<&str> = config.camera.iter().map(|c| c.id.as_str()).collect();
        assert_eq!(ids, vec!["cam1", "cam2"]);
    }
}
