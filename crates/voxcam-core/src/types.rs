use serde::Deserialize;
use std::fmt;
use std::time::Duration;

use crate::config::RecognitionConfig;

/// Raw PCM as delivered by a capture stream.
#[derive(Debug, Clone)]
pub struct AudioFrame {
    pub samples: Vec<f32>,
    pub sample_rate: u32,
    pub channels: u16,
}

/// Container/codec of an encoded [`AudioChunk`].
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum AudioEncoding {
    WebmOpus,
    Linear16,
}

impl AudioEncoding {
    /// Encoding identifier understood by the speech service.
    pub fn api_name(&self) -> &'static str {
        match self {
            AudioEncoding::WebmOpus => "WEBM_OPUS",
            AudioEncoding::Linear16 => "LINEAR16",
        }
    }

    pub fn mime_type(&self) -> &'static str {
        match self {
            AudioEncoding::WebmOpus => "audio/webm;codecs=opus",
            AudioEncoding::Linear16 => "audio/wav",
        }
    }

    pub fn is_compressed(&self) -> bool {
        matches!(self, AudioEncoding::WebmOpus)
    }
}

/// A finalized chunk of encoded audio. Submitted once, then dropped.
#[derive(Debug, Clone)]
pub struct AudioChunk {
    pub data: Vec<u8>,
    pub encoding: AudioEncoding,
    pub duration: Duration,
    pub sequence: u64,
}

#[derive(Debug, Clone, PartialEq)]
pub struct RecognitionResult {
    pub transcript: String,
    /// 0–100.
    pub confidence: f32,
}

/// A recognized utterance together with the configuration snapshot of the
/// session that produced it.
#[derive(Debug, Clone, PartialEq)]
pub struct SessionResult {
    pub result: RecognitionResult,
    pub config: RecognitionConfig,
}

#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
pub struct CameraDescriptor {
    pub id: String,

    #[serde(default)]
    pub name: String,

    #[serde(default)]
    pub keywords: Vec<String>,

    #[serde(default)]
    pub is_active: bool,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum RecognitionMode {
    Local,
    Cloud,
}

impl RecognitionMode {
    /// Human-readable backend label for status displays.
    pub fn label(&self) -> &'static str {
        match self {
            RecognitionMode::Local => "local recognizer",
            RecognitionMode::Cloud => "cloud speech API",
        }
    }
}

impl fmt::Display for RecognitionMode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            RecognitionMode::Local => write!(f, "local"),
            RecognitionMode::Cloud => write!(f, "cloud"),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum SessionState {
    #[default]
    Inactive,
    Starting,
    Running(RecognitionMode),
    Fallback,
    Stopping,
}

impl SessionState {
    pub fn is_running(&self) -> bool {
        matches!(self, SessionState::Running(_))
    }

    pub fn mode(&self) -> Option<RecognitionMode> {
        match self {
            SessionState::Running(mode) => Some(*mode),
            _ => None,
        }
    }
}

impl fmt::Display for SessionState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            SessionState::Inactive => write!(f, "inactive"),
            SessionState::Starting => write!(f, "starting"),
            SessionState::Running(mode) => write!(f, "running ({mode})"),
            SessionState::Fallback => write!(f, "falling back"),
            SessionState::Stopping => write!(f, "stopping"),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct SessionId(pub u64);

impl fmt::Display for SessionId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "#{}", self.0)
    }
}
