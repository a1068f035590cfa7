pub mod cloud;
pub mod engine_trait;
pub mod host;
pub mod local;
pub mod registry;
pub mod segmenter;
pub mod selector;
pub mod speech_client;
#[cfg(feature = "whisper")]
pub mod whisper_engine;

pub use cloud::{CloudChunkedRecognizer, CloudHandle, CloudSettings};
pub use engine_trait::{LocalEngine, Transcript};
pub use host::RecognitionHost;
pub use local::{LocalHandle, LocalRecognitionAdapter, LocalSettings, LOCAL_CONFIDENCE};
pub use registry::EngineRegistry;
pub use segmenter::{SegmenterConfig, Utterance, UtteranceSegmenter};
pub use selector::{
    select_mode, ActiveBackend, AdapterEvent, RecognitionModeSelector, RecognitionSession,
};
pub use speech_client::{diagnose, parse_response, ApiError, GoogleSpeechClient, SpeechClient};
#[cfg(feature = "whisper")]
pub use whisper_engine::WhisperEngine;
