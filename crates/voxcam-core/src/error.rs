use thiserror::Error;

#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("failed to read config file: {0}")]
    FileRead(#[from] std::io::Error),

    #[error("failed to parse TOML: {0}")]
    TomlParse(#[from] toml::de::Error),

    #[error("environment variable not found: {0}")]
    EnvVarNotFound(String),

    #[error("invalid configuration: {0}")]
    Invalid(String),
}

#[derive(Debug, Error)]
pub enum AudioError {
    #[error("microphone unavailable: {0}")]
    DeviceUnavailable(String),

    #[error("failed to enumerate devices: {0}")]
    DeviceEnumeration(String),

    #[error("failed to build stream: {0}")]
    StreamBuild(String),

    #[error("failed to encode audio: {0}")]
    Encoding(String),
}

#[derive(Debug, Clone, Error, PartialEq)]
pub enum RecognitionError {
    #[error("microphone unavailable: {0}")]
    DeviceUnavailable(String),

    #[error("recognition backend unsupported: {0}")]
    UnsupportedBackend(String),

    #[error("speech service error: {0}")]
    RemoteService(String),

    #[error("recognition engine initialization failed: {0}")]
    InitializationFailed(String),

    #[error("recognition processing failed: {0}")]
    ProcessingFailed(String),
}

impl From<AudioError> for RecognitionError {
    fn from(err: AudioError) -> Self {
        match err {
            AudioError::DeviceUnavailable(msg) => RecognitionError::DeviceUnavailable(msg),
            other => RecognitionError::DeviceUnavailable(other.to_string()),
        }
    }
}

#[derive(Debug, Error)]
pub enum SwitchError {
    #[error("camera not found: {0}")]
    CameraNotFound(String),

    #[error("camera switch failed: {0}")]
    SwitchFailed(String),
}
