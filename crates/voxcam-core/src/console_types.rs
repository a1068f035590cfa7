use crate::types::{RecognitionMode, SessionState};

/// Availability of the level meter's microphone.
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub enum MonitorStatus {
    #[default]
    Inactive,
    Active,
    DeviceUnavailable(String),
}

/// Aggregate recognition state broadcast to the console via watch channel.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct ConsoleState {
    pub session: SessionState,
    pub fell_back: bool,
    pub last_confidence: f32,
    pub confidence_threshold: u8,
    pub auto_switch_enabled: bool,
    pub last_error: Option<String>,
    pub notices: Vec<String>,
}

impl ConsoleState {
    pub fn is_listening(&self) -> bool {
        self.session.is_running()
    }

    pub fn mode(&self) -> Option<RecognitionMode> {
        self.session.mode()
    }
}

/// Notifications pushed to the operator as they happen.
#[derive(Debug, Clone, PartialEq)]
pub enum ConsoleEvent {
    /// A result passed the confidence gate.
    TextRecognized { transcript: String, confidence: f32 },
    /// A voice command switched the active camera.
    CommandMatched {
        camera_id: String,
        camera_name: String,
        transcript: String,
        confidence: f32,
    },
    /// Passive, non-blocking notice (e.g. fallback to the local recognizer).
    Notice(String),
}

/// Commands sent to the recognition host.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SessionCommand {
    Activate,
    Deactivate,
    Shutdown,
}
