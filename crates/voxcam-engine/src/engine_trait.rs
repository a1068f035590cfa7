use async_trait::async_trait;
use tokio::sync::mpsc;
use voxcam_core::{AudioFrame, RecognitionError};

/// Text produced by a local engine. Interim transcripts may be revised; final
/// ones are settled.
#[derive(Debug, Clone, PartialEq)]
pub struct Transcript {
    pub text: String,
    pub is_final: bool,
}

/// A continuously fed, locally evaluated speech recognizer.
#[async_trait]
pub trait LocalEngine: Send + Sync {
    fn name(&self) -> &str;
    async fn initialize(&mut self, config: toml::Value) -> Result<(), RecognitionError>;
    async fn feed_audio(&self, frame: AudioFrame) -> Result<(), RecognitionError>;
    fn set_result_sender(&mut self, sender: mpsc::UnboundedSender<Transcript>);
    async fn shutdown(&self) -> Result<(), RecognitionError>;
}
