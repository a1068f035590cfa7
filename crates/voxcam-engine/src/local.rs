use crate::engine_trait::{LocalEngine, Transcript};
use crate::registry::EngineRegistry;
use crate::selector::AdapterEvent;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use tokio::sync::mpsc;
use tokio::task::JoinHandle;
use voxcam_audio::{CaptureConstraints, CaptureGuard, Microphone};
use voxcam_core::config::AppConfig;
use voxcam_core::{
    AudioFrame, RecognitionError, RecognitionMode, RecognitionResult, SessionId,
};

/// Local engines report no confidence; this stand-in is what gets gated.
pub const LOCAL_CONFIDENCE: f32 = 90.0;

#[derive(Debug, Clone)]
pub struct LocalSettings {
    pub engine: String,
    /// Engine-specific table, e.g. `[local.whisper]`.
    pub engine_config: toml::Value,
    pub language: String,
}

impl LocalSettings {
    pub fn from_config(config: &AppConfig) -> Self {
        let engine_config = match config.local.engine.as_str() {
            "whisper" => config
                .local
                .whisper
                .as_ref()
                .and_then(|w| toml::Value::try_from(w).ok()),
            _ => None,
        }
        .unwrap_or_else(|| toml::Value::Table(Default::default()));

        Self {
            engine: config.local.engine.clone(),
            engine_config,
            language: config.recognition.language.clone(),
        }
    }

    fn initialize_config(&self) -> toml::Value {
        let mut table = match &self.engine_config {
            toml::Value::Table(table) => table.clone(),
            _ => Default::default(),
        };
        table.insert(
            "language".to_string(),
            toml::Value::String(self.language.clone()),
        );
        table.insert("interim_results".to_string(), toml::Value::Boolean(false));
        toml::Value::Table(table)
    }
}

/// Runs a local engine against a voice-processed microphone stream.
pub struct LocalRecognitionAdapter {
    microphone: Arc<dyn Microphone>,
    registry: Arc<EngineRegistry>,
    settings: LocalSettings,
}

impl LocalRecognitionAdapter {
    pub fn new(
        microphone: Arc<dyn Microphone>,
        registry: Arc<EngineRegistry>,
        settings: LocalSettings,
    ) -> Self {
        Self {
            microphone,
            registry,
            settings,
        }
    }

    pub async fn start(
        &self,
        session: SessionId,
        events: mpsc::UnboundedSender<AdapterEvent>,
    ) -> Result<LocalHandle, RecognitionError> {
        let mut engine = self.registry.create(&self.settings.engine)?;
        let (transcript_tx, transcript_rx) = mpsc::unbounded_channel();
        engine.set_result_sender(transcript_tx);
        engine.initialize(self.settings.initialize_config()).await?;

        let stream = match self.microphone.acquire(CaptureConstraints::voice()).await {
            Ok(stream) => stream,
            Err(e) => {
                let _ = engine.shutdown().await;
                return Err(e.into());
            }
        };
        let (frames, guard) = stream.into_parts();

        let active = Arc::new(AtomicBool::new(true));
        let task = tokio::spawn(run_local(
            session,
            engine,
            frames,
            transcript_rx,
            events,
            Arc::clone(&active),
        ));

        tracing::info!(
            %session,
            engine = %self.settings.engine,
            language = %self.settings.language,
            "local recognizer listening"
        );
        Ok(LocalHandle {
            guard: Some(guard),
            active,
            task,
        })
    }
}

/// Exclusive ownership of a running local recognizer.
pub struct LocalHandle {
    guard: Option<CaptureGuard>,
    active: Arc<AtomicBool>,
    task: JoinHandle<()>,
}

impl LocalHandle {
    /// Stop listening immediately. Nothing is emitted afterwards.
    pub fn stop(mut self) {
        self.active.store(false, Ordering::SeqCst);
        if let Some(guard) = self.guard.take() {
            guard.release();
        }
        self.task.abort();
    }
}

impl Drop for LocalHandle {
    fn drop(&mut self) {
        self.active.store(false, Ordering::SeqCst);
        self.task.abort();
    }
}

async fn run_local(
    session: SessionId,
    engine: Box<dyn LocalEngine>,
    mut frames: mpsc::UnboundedReceiver<AudioFrame>,
    mut transcripts: mpsc::UnboundedReceiver<Transcript>,
    events: mpsc::UnboundedSender<AdapterEvent>,
    active: Arc<AtomicBool>,
) {
    loop {
        tokio::select! {
            frame = frames.recv() => match frame {
                Some(frame) => {
                    if let Err(e) = engine.feed_audio(frame).await {
                        tracing::error!(%session, "local engine feed error: {e}");
                    }
                }
                None => {
                    let _ = engine.shutdown().await;
                    if active.swap(false, Ordering::SeqCst) {
                        tracing::warn!(%session, "local recognizer lost its microphone stream");
                        let _ = events.send(AdapterEvent::LocalStopped {
                            session,
                            reason: "microphone stream closed".to_string(),
                        });
                    }
                    break;
                }
            },
            transcript = transcripts.recv() => match transcript {
                Some(transcript) => forward(session, transcript, &events, &active),
                None => break,
            },
        }
    }
}

fn forward(
    session: SessionId,
    transcript: Transcript,
    events: &mpsc::UnboundedSender<AdapterEvent>,
    active: &AtomicBool,
) {
    if !transcript.is_final || !active.load(Ordering::SeqCst) {
        return;
    }
    let text = transcript.text.trim();
    if text.is_empty() {
        return;
    }
    let _ = events.send(AdapterEvent::Recognized {
        session,
        mode: RecognitionMode::Local,
        result: RecognitionResult {
            transcript: text.to_string(),
            confidence: LOCAL_CONFIDENCE,
        },
    });
}
