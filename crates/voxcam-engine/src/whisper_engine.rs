use crate::engine_trait::{LocalEngine, Transcript};
use crate::segmenter::{SegmenterConfig, Utterance, UtteranceSegmenter};
use async_trait::async_trait;
use rubato::{
    Resampler, SincFixedIn, SincInterpolationParameters, SincInterpolationType, WindowFunction,
};
use std::sync::{Arc, Mutex};
use tokio::sync::mpsc;
use voxcam_core::{AudioFrame, RecognitionError};
use whisper_rs::{FullParams, SamplingStrategy, WhisperContext, WhisperContextParameters};

const WHISPER_SAMPLE_RATE: u32 = 16000;

/// Offline recognition with whisper.cpp. Utterances are cut by the energy
/// segmenter and transcribed one at a time, so every transcript is final.
pub struct WhisperEngine {
    context: Option<Arc<WhisperContext>>,
    language: String,
    threads: i32,
    segmenter: Mutex<UtteranceSegmenter>,
    result_sender: Mutex<Option<mpsc::UnboundedSender<Transcript>>>,
}

impl WhisperEngine {
    pub fn new() -> Self {
        Self {
            context: None,
            language: "pt".to_string(),
            threads: 4,
            segmenter: Mutex::new(UtteranceSegmenter::new(SegmenterConfig::default())),
            result_sender: Mutex::new(None),
        }
    }

    async fn transcribe(&self, utterance: Utterance) -> Result<(), RecognitionError> {
        let context = self.context.clone().ok_or_else(|| {
            RecognitionError::ProcessingFailed("whisper model not loaded".to_string())
        })?;
        let language = self.language.clone();
        let threads = self.threads;

        let text = tokio::task::spawn_blocking(move || {
            let audio =
                resample_audio(&utterance.samples, utterance.sample_rate, WHISPER_SAMPLE_RATE)?;
            run_whisper(&context, &audio, &language, threads)
        })
        .await
        .map_err(|e| RecognitionError::ProcessingFailed(e.to_string()))??;

        if text.is_empty() {
            return Ok(());
        }
        tracing::debug!(chars = text.len(), "whisper transcript ready");
        if let Ok(sender) = self.result_sender.lock() {
            if let Some(tx) = sender.as_ref() {
                let _ = tx.send(Transcript {
                    text,
                    is_final: true,
                });
            }
        }
        Ok(())
    }
}

impl Default for WhisperEngine {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl LocalEngine for WhisperEngine {
    fn name(&self) -> &str {
        "whisper"
    }

    async fn initialize(&mut self, config: toml::Value) -> Result<(), RecognitionError> {
        let model_path = config
            .get("model_path")
            .and_then(|v| v.as_str())
            .ok_or_else(|| {
                RecognitionError::InitializationFailed(
                    "missing 'model_path' in [local.whisper] config".to_string(),
                )
            })?
            .to_string();

        if let Some(language) = config.get("language").and_then(|v| v.as_str()) {
            self.language = whisper_language(language);
        }
        if let Some(threads) = config.get("threads").and_then(|v| v.as_integer()) {
            self.threads = threads.max(1) as i32;
        }
        if config
            .get("interim_results")
            .and_then(|v| v.as_bool())
            .unwrap_or(false)
        {
            tracing::debug!("whisper produces only final transcripts; interim results ignored");
        }

        let path = model_path.clone();
        let context = tokio::task::spawn_blocking(move || {
            WhisperContext::new_with_params(&path, WhisperContextParameters::default())
        })
        .await
        .map_err(|e| RecognitionError::InitializationFailed(e.to_string()))?
        .map_err(|e| {
            RecognitionError::InitializationFailed(format!(
                "failed to load whisper model '{model_path}': {e}"
            ))
        })?;
        self.context = Some(Arc::new(context));

        tracing::info!(
            model_path = %model_path,
            language = %self.language,
            threads = self.threads,
            "WhisperEngine initialized"
        );
        Ok(())
    }

    async fn feed_audio(&self, frame: AudioFrame) -> Result<(), RecognitionError> {
        let utterances = {
            let mut segmenter = self
                .segmenter
                .lock()
                .map_err(|e| RecognitionError::ProcessingFailed(e.to_string()))?;
            segmenter.push(&frame)
        };
        for utterance in utterances {
            self.transcribe(utterance).await?;
        }
        Ok(())
    }

    fn set_result_sender(&mut self, sender: mpsc::UnboundedSender<Transcript>) {
        if let Ok(mut slot) = self.result_sender.lock() {
            *slot = Some(sender);
        }
    }

    async fn shutdown(&self) -> Result<(), RecognitionError> {
        let pending = self
            .segmenter
            .lock()
            .map_err(|e| RecognitionError::ProcessingFailed(e.to_string()))?
            .flush();
        match pending {
            Some(utterance) => self.transcribe(utterance).await,
            None => Ok(()),
        }
    }
}

/// `pt-BR` → `pt`; whisper takes bare ISO 639-1 codes.
fn whisper_language(tag: &str) -> String {
    tag.split(['-', '_'])
        .next()
        .unwrap_or(tag)
        .to_ascii_lowercase()
}

fn resample_audio(input: &[f32], from_rate: u32, to_rate: u32) -> Result<Vec<f32>, RecognitionError> {
    if from_rate == to_rate || input.is_empty() {
        return Ok(input.to_vec());
    }

    let params = SincInterpolationParameters {
        sinc_len: 256,
        f_cutoff: 0.95,
        interpolation: SincInterpolationType::Linear,
        oversampling_factor: 256,
        window: WindowFunction::BlackmanHarris2,
    };

    let ratio = to_rate as f64 / from_rate as f64;
    let mut resampler = SincFixedIn::<f32>::new(ratio, 2.0, params, input.len(), 1)
        .map_err(|e| RecognitionError::ProcessingFailed(format!("resampler: {e}")))?;

    let waves_in = vec![input.to_vec()];
    let waves_out = resampler
        .process(&waves_in, None)
        .map_err(|e| RecognitionError::ProcessingFailed(format!("resample: {e}")))?;

    Ok(waves_out.into_iter().next().unwrap_or_default())
}

fn run_whisper(
    context: &WhisperContext,
    audio: &[f32],
    language: &str,
    threads: i32,
) -> Result<String, RecognitionError> {
    let failed = |e: whisper_rs::WhisperError| RecognitionError::ProcessingFailed(e.to_string());
    let mut state = context.create_state().map_err(failed)?;

    let mut params = FullParams::new(SamplingStrategy::Greedy { best_of: 1 });
    params.set_n_threads(threads);
    params.set_language(Some(language));
    params.set_print_progress(false);
    params.set_print_realtime(false);
    params.set_print_timestamps(false);

    state.full(params, audio).map_err(failed)?;

    let segments = state.full_n_segments().map_err(failed)?;
    let mut text = String::new();
    for i in 0..segments {
        if let Ok(segment) = state.full_get_segment_text(i) {
            text.push_str(&segment);
        }
    }
    Ok(text.trim().to_string())
}
