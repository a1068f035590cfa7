pub mod config;
pub mod config_diff;
pub mod console_types;
pub mod error;
pub mod types;

pub use config::{AppConfig, RecognitionConfig};
pub use config_diff::ConfigDiff;
pub use console_types::{ConsoleEvent, ConsoleState, MonitorStatus, SessionCommand};
pub use error::{AudioError, ConfigError, RecognitionError, SwitchError};
pub use types::{
    AudioChunk, AudioEncoding, AudioFrame, CameraDescriptor, RecognitionMode, RecognitionResult,
    SessionId, SessionResult, SessionState,
};

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_audio_frame_creation() {
        let frame = AudioFrame {
            samples: vec![0.0, 0.5, -0.5, 1.0],
            sample_rate: 48000,
            channels: 1,
        };
        assert_eq!(frame.samples.len(), 4);
        assert_eq!(frame.sample_rate, 48000);
        assert_eq!(frame.channels, 1);
    }

    #[test]
    fn test_audio_encoding_api_names() {
        assert_eq!(AudioEncoding::WebmOpus.api_name(), "WEBM_OPUS");
        assert_eq!(AudioEncoding::Linear16.api_name(), "LINEAR16");
        assert!(AudioEncoding::WebmOpus.is_compressed());
        assert!(!AudioEncoding::Linear16.is_compressed());
        assert_eq!(AudioEncoding::Linear16.mime_type(), "audio/wav");
    }

    #[test]
    fn test_session_state_display() {
        assert_eq!(SessionState::Inactive.to_string(), "inactive");
        assert_eq!(
            SessionState::Running(RecognitionMode::Local).to_string(),
            "running (local)"
        );
        assert_eq!(SessionState::Running(RecognitionMode::Cloud).mode(), Some(RecognitionMode::Cloud));
        assert!(SessionState::Fallback.mode().is_none());
    }

    #[test]
    fn test_audio_error_maps_to_device_unavailable() {
        let err: RecognitionError = AudioError::DeviceUnavailable("denied".to_string()).into();
        assert_eq!(err, RecognitionError::DeviceUnavailable("denied".to_string()));

        let err: RecognitionError = AudioError::StreamBuild("busy".to_string()).into();
        match err {
            RecognitionError::DeviceUnavailable(msg) => assert!(msg.contains("busy")),
            other => panic!("expected DeviceUnavailable, got {other:?}"),
        }
    }

    #[test]
    fn test_camera_descriptor_deserialize_defaults() {
        let camera: CameraDescriptor = toml::from_str("id = \"cam1\"").unwrap();
        assert_eq!(camera.id, "cam1");
        assert!(camera.name.is_empty());
        assert!(camera.keywords.is_empty());
        assert!(!camera.is_active);
    }
}
