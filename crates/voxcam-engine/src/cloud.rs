use crate::selector::AdapterEvent;
use crate::speech_client::SpeechClient;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex, PoisonError};
use std::time::Duration;
use tokio::sync::mpsc;
use tokio::task::{JoinHandle, JoinSet};
use voxcam_audio::{CaptureConstraints, CaptureGuard, ChunkEncoder, EncoderSet, Microphone};
use voxcam_core::config::AppConfig;
use voxcam_core::{
    AudioChunk, AudioEncoding, AudioFrame, RecognitionError, RecognitionMode, SessionId,
};

type CaptureSlot = Arc<Mutex<Option<CaptureGuard>>>;

#[derive(Debug, Clone)]
pub struct CloudSettings {
    pub chunk_duration: Duration,
    /// Tried in order; the first encoding this build can produce wins.
    pub encoding_preference: Vec<AudioEncoding>,
}

impl CloudSettings {
    pub fn from_config(config: &AppConfig) -> Self {
        Self {
            chunk_duration: config.recognition.chunk_duration(),
            ..Default::default()
        }
    }
}

impl Default for CloudSettings {
    fn default() -> Self {
        Self {
            chunk_duration: Duration::from_millis(4000),
            encoding_preference: vec![AudioEncoding::WebmOpus, AudioEncoding::Linear16],
        }
    }
}

/// Records fixed-length chunks and sends each to the speech service, re-arming
/// the microphone right after every chunk while the session stays active.
pub struct CloudChunkedRecognizer {
    microphone: Arc<dyn Microphone>,
    client: Arc<dyn SpeechClient>,
    encoders: Arc<EncoderSet>,
    settings: CloudSettings,
}

impl CloudChunkedRecognizer {
    pub fn new(
        microphone: Arc<dyn Microphone>,
        client: Arc<dyn SpeechClient>,
        encoders: Arc<EncoderSet>,
        settings: CloudSettings,
    ) -> Self {
        Self {
            microphone,
            client,
            encoders,
            settings,
        }
    }

    /// Ready once the first capture stream is open.
    pub async fn start(
        &self,
        session: SessionId,
        api_key: &str,
        events: mpsc::UnboundedSender<AdapterEvent>,
    ) -> Result<CloudHandle, RecognitionError> {
        let encoder = self
            .encoders
            .select(&self.settings.encoding_preference)
            .ok_or_else(|| {
                RecognitionError::UnsupportedBackend("no usable chunk encoder".to_string())
            })?;

        let stream = self.microphone.acquire(CaptureConstraints::voice()).await?;
        let (frames, guard) = stream.into_parts();

        let slot: CaptureSlot = Arc::new(Mutex::new(Some(guard)));
        let active = Arc::new(AtomicBool::new(true));

        let cycle = ChunkCycle {
            session,
            api_key: Arc::from(api_key),
            microphone: Arc::clone(&self.microphone),
            client: Arc::clone(&self.client),
            encoder: Arc::clone(&encoder),
            chunk_duration: self.settings.chunk_duration,
            events,
            active: Arc::clone(&active),
            slot: Arc::clone(&slot),
        };
        let task = tokio::spawn(cycle.run(frames));

        tracing::info!(
            %session,
            encoding = encoder.encoding().api_name(),
            chunk_ms = self.settings.chunk_duration.as_millis() as u64,
            "cloud recognizer listening"
        );
        Ok(CloudHandle {
            slot,
            active,
            task: Some(task),
        })
    }
}

/// Exclusive ownership of a running cloud recognizer.
pub struct CloudHandle {
    slot: CaptureSlot,
    active: Arc<AtomicBool>,
    task: Option<JoinHandle<()>>,
}

impl CloudHandle {
    /// Release the microphone and abandon the cycle and its in-flight
    /// submissions. Does not wait on the network.
    pub fn stop(mut self) {
        self.halt();
    }

    pub fn is_active(&self) -> bool {
        self.active.load(Ordering::SeqCst)
    }

    fn halt(&mut self) {
        {
            let mut slot = self.slot.lock().unwrap_or_else(PoisonError::into_inner);
            self.active.store(false, Ordering::SeqCst);
            if let Some(guard) = slot.take() {
                guard.release();
            }
        }
        if let Some(task) = self.task.take() {
            task.abort();
        }
    }
}

impl Drop for CloudHandle {
    fn drop(&mut self) {
        self.halt();
    }
}

struct ChunkCycle {
    session: SessionId,
    api_key: Arc<str>,
    microphone: Arc<dyn Microphone>,
    client: Arc<dyn SpeechClient>,
    encoder: Arc<dyn ChunkEncoder>,
    chunk_duration: Duration,
    events: mpsc::UnboundedSender<AdapterEvent>,
    active: Arc<AtomicBool>,
    slot: CaptureSlot,
}

#[derive(Default)]
struct Recording {
    samples: Vec<f32>,
    sample_rate: u32,
    channels: u16,
    device_lost: bool,
}

impl ChunkCycle {
    async fn run(self, mut frames: mpsc::UnboundedReceiver<AudioFrame>) {
        let mut sequence = 0u64;
        let mut submissions = JoinSet::new();

        loop {
            let recording = record(&mut frames, self.chunk_duration).await;

            let guard = self
                .slot
                .lock()
                .unwrap_or_else(PoisonError::into_inner)
                .take();
            let Some(guard) = guard else {
                // Stopped from outside.
                break;
            };
            guard.release();

            if !self.active.load(Ordering::SeqCst) {
                break;
            }
            if recording.device_lost {
                self.fail(RecognitionError::DeviceUnavailable(
                    "microphone stream closed during recording".to_string(),
                ));
                break;
            }

            sequence += 1;
            if recording.samples.is_empty() {
                tracing::debug!(session = %self.session, sequence, "empty chunk, not submitted");
            } else {
                match self.encoder.encode(
                    &recording.samples,
                    recording.sample_rate,
                    recording.channels,
                ) {
                    Ok(data) => {
                        let chunk = AudioChunk {
                            data,
                            encoding: self.encoder.encoding(),
                            duration: self.chunk_duration,
                            sequence,
                        };
                        submissions.spawn(submit(
                            self.session,
                            Arc::clone(&self.api_key),
                            Arc::clone(&self.client),
                            chunk,
                            self.events.clone(),
                            Arc::clone(&self.active),
                        ));
                    }
                    Err(e) => {
                        self.fail(RecognitionError::ProcessingFailed(e.to_string()));
                        break;
                    }
                }
            }

            while let Some(finished) = submissions.try_join_next() {
                if let Err(e) = finished {
                    if e.is_panic() {
                        tracing::error!(session = %self.session, "chunk submission panicked");
                    }
                }
            }

            if !self.active.load(Ordering::SeqCst) {
                break;
            }

            match self.microphone.acquire(CaptureConstraints::voice()).await {
                Ok(stream) => {
                    let (next_frames, guard) = stream.into_parts();
                    let mut slot = self.slot.lock().unwrap_or_else(PoisonError::into_inner);
                    if !self.active.load(Ordering::SeqCst) {
                        drop(slot);
                        guard.release();
                        break;
                    }
                    *slot = Some(guard);
                    frames = next_frames;
                }
                Err(e) => {
                    self.fail(e.into());
                    break;
                }
            }
        }

        tracing::debug!(session = %self.session, chunks = sequence, "chunk cycle ended");
    }

    fn fail(&self, error: RecognitionError) {
        report_failure(self.session, error, &self.events, &self.active);
    }
}

async fn record(frames: &mut mpsc::UnboundedReceiver<AudioFrame>, duration: Duration) -> Recording {
    let deadline = tokio::time::sleep(duration);
    tokio::pin!(deadline);
    let mut recording = Recording::default();

    loop {
        tokio::select! {
            _ = &mut deadline => return recording,
            frame = frames.recv() => match frame {
                Some(frame) => {
                    recording.sample_rate = frame.sample_rate;
                    recording.channels = frame.channels;
                    recording.samples.extend_from_slice(&frame.samples);
                }
                None => {
                    recording.device_lost = true;
                    return recording;
                }
            },
        }
    }
}

async fn submit(
    session: SessionId,
    api_key: Arc<str>,
    client: Arc<dyn SpeechClient>,
    chunk: AudioChunk,
    events: mpsc::UnboundedSender<AdapterEvent>,
    active: Arc<AtomicBool>,
) {
    let sequence = chunk.sequence;
    match client.recognize(&api_key, &chunk).await {
        Ok(Some(result)) => {
            if active.load(Ordering::SeqCst) {
                tracing::debug!(%session, sequence, confidence = result.confidence, "chunk recognized");
                let _ = events.send(AdapterEvent::Recognized {
                    session,
                    mode: RecognitionMode::Cloud,
                    result,
                });
            }
        }
        Ok(None) => {
            tracing::trace!(%session, sequence, "no speech in chunk");
        }
        Err(error) => report_failure(session, error, &events, &active),
    }
}

/// Only the first failure of a run is reported.
fn report_failure(
    session: SessionId,
    error: RecognitionError,
    events: &mpsc::UnboundedSender<AdapterEvent>,
    active: &AtomicBool,
) {
    if active.swap(false, Ordering::SeqCst) {
        tracing::warn!(%session, "cloud recognition failed: {error}");
        let _ = events.send(AdapterEvent::CloudFailed { session, error });
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use async_trait::async_trait;
    use std::sync::atomic::AtomicU64;
    use voxcam_audio::CaptureStream;
    use voxcam_core::{AudioError, RecognitionResult};

    type Log = Arc<Mutex<Vec<String>>>;

    /// Each stream starts with one queued frame and stays open until released.
    struct ScriptedMicrophone {
        log: Log,
        next_id: AtomicU64,
        deny_from: Option<u64>,
        silent: bool,
    }

    impl ScriptedMicrophone {
        fn new(log: Log) -> Self {
            Self {
                log,
                next_id: AtomicU64::new(1),
                deny_from: None,
                silent: false,
            }
        }
    }

    #[async_trait]
    impl voxcam_audio::Microphone for ScriptedMicrophone {
        async fn acquire(
            &self,
            _constraints: CaptureConstraints,
        ) -> Result<CaptureStream, AudioError> {
            let id = self.next_id.fetch_add(1, Ordering::SeqCst);
            if self.deny_from.is_some_and(|from| id >= from) {
                return Err(AudioError::DeviceUnavailable("permission denied".to_string()));
            }
            self.log.lock().unwrap().push(format!("acquire {id}"));
            let (tx, rx) = mpsc::unbounded_channel();
            if !self.silent {
                tx.send(AudioFrame {
                    samples: vec![0.1; 1600],
                    sample_rate: 16000,
                    channels: 1,
                })
                .unwrap();
            }
            let log = Arc::clone(&self.log);
            Ok(CaptureStream::new(
                rx,
                CaptureGuard::new(move || {
                    drop(tx);
                    log.lock().unwrap().push(format!("release {id}"));
                }),
            ))
        }
    }

    struct SlowClient {
        log: Log,
        delay: Duration,
        fail_on: Option<u64>,
    }

    #[async_trait]
    impl SpeechClient for SlowClient {
        async fn recognize(
            &self,
            _api_key: &str,
            chunk: &AudioChunk,
        ) -> Result<Option<RecognitionResult>, RecognitionError> {
            let seq = chunk.sequence;
            self.log.lock().unwrap().push(format!("submit {seq}"));
            tokio::time::sleep(self.delay).await;
            self.log.lock().unwrap().push(format!("done {seq}"));
            if self.fail_on == Some(seq) {
                return Err(RecognitionError::RemoteService("boom".to_string()));
            }
            Ok(Some(RecognitionResult {
                transcript: format!("chunk {seq}"),
                confidence: 95.0,
            }))
        }
    }

    fn position(log: &Log, entry: &str) -> usize {
        log.lock()
            .unwrap()
            .iter()
            .position(|e| e == entry)
            .unwrap_or_else(|| panic!("missing log entry {entry}"))
    }

    fn count(log: &Log, prefix: &str) -> usize {
        log.lock()
            .unwrap()
            .iter()
            .filter(|e| e.starts_with(prefix))
            .count()
    }

    fn recognizer(mic: ScriptedMicrophone, client: SlowClient) -> CloudChunkedRecognizer {
        CloudChunkedRecognizer::new(
            Arc::new(mic),
            Arc::new(client),
            Arc::new(EncoderSet::default()),
            CloudSettings::default(),
        )
    }

    #[tokio::test(start_paused = true)]
    async fn test_next_chunk_starts_before_previous_response() {
        let log: Log = Default::default();
        let rec = recognizer(
            ScriptedMicrophone::new(log.clone()),
            SlowClient {
                log: log.clone(),
                delay: Duration::from_millis(3000),
                fail_on: None,
            },
        );
        let (tx, mut rx) = mpsc::unbounded_channel();
        let handle = rec.start(SessionId(1), "key", tx).await.unwrap();

        tokio::time::sleep(Duration::from_millis(12_500)).await;
        handle.stop();

        assert!(position(&log, "release 1") < position(&log, "acquire 2"));
        assert!(position(&log, "acquire 2") < position(&log, "done 1"));
        assert!(position(&log, "acquire 3") < position(&log, "done 2"));
        assert_eq!(count(&log, "acquire"), count(&log, "release"));

        match rx.recv().await.unwrap() {
            AdapterEvent::Recognized {
                session,
                mode,
                result,
            } => {
                assert_eq!(session, SessionId(1));
                assert_eq!(mode, RecognitionMode::Cloud);
                assert_eq!(result.transcript, "chunk 1");
            }
            other => panic!("unexpected event {other:?}"),
        }
    }

    #[tokio::test(start_paused = true)]
    async fn test_remote_failure_reported_once_and_stops_rearming() {
        let log: Log = Default::default();
        let rec = recognizer(
            ScriptedMicrophone::new(log.clone()),
            SlowClient {
                log: log.clone(),
                delay: Duration::from_millis(500),
                fail_on: Some(1),
            },
        );
        let (tx, mut rx) = mpsc::unbounded_channel();
        let handle = rec.start(SessionId(3), "key", tx).await.unwrap();

        match rx.recv().await.unwrap() {
            AdapterEvent::CloudFailed { session, error } => {
                assert_eq!(session, SessionId(3));
                assert_eq!(error, RecognitionError::RemoteService("boom".to_string()));
            }
            other => panic!("unexpected event {other:?}"),
        }
        assert!(!handle.is_active());

        tokio::time::sleep(Duration::from_millis(10_000)).await;
        handle.stop();

        // Chunk 2 was being recorded when chunk 1 failed; nothing after it.
        assert_eq!(count(&log, "acquire"), 2);
        assert_eq!(count(&log, "release"), 2);
        assert_eq!(count(&log, "submit"), 1);
        assert!(rx.try_recv().is_err());
    }

    #[tokio::test(start_paused = true)]
    async fn test_stop_discards_in_flight_result() {
        let log: Log = Default::default();
        let rec = recognizer(
            ScriptedMicrophone::new(log.clone()),
            SlowClient {
                log: log.clone(),
                delay: Duration::from_millis(3000),
                fail_on: None,
            },
        );
        let (tx, mut rx) = mpsc::unbounded_channel();
        let handle = rec.start(SessionId(1), "key", tx).await.unwrap();

        tokio::time::sleep(Duration::from_millis(5000)).await;
        assert_eq!(count(&log, "submit"), 1);
        handle.stop();
        tokio::time::sleep(Duration::from_millis(5000)).await;

        assert_eq!(count(&log, "done"), 0);
        assert_eq!(count(&log, "acquire"), count(&log, "release"));
        assert!(rx.try_recv().is_err());
    }

    #[tokio::test(start_paused = true)]
    async fn test_empty_chunks_are_not_submitted() {
        let log: Log = Default::default();
        let mut mic = ScriptedMicrophone::new(log.clone());
        mic.silent = true;
        let rec = recognizer(
            mic,
            SlowClient {
                log: log.clone(),
                delay: Duration::ZERO,
                fail_on: None,
            },
        );
        let (tx, _rx) = mpsc::unbounded_channel();
        let handle = rec.start(SessionId(1), "key", tx).await.unwrap();

        tokio::time::sleep(Duration::from_millis(8500)).await;
        handle.stop();

        assert_eq!(count(&log, "acquire"), 3);
        assert_eq!(count(&log, "submit"), 0);
    }

    #[tokio::test(start_paused = true)]
    async fn test_rearm_denied_is_cloud_failure() {
        let log: Log = Default::default();
        let mut mic = ScriptedMicrophone::new(log.clone());
        mic.deny_from = Some(2);
        let rec = recognizer(
            mic,
            SlowClient {
                log: log.clone(),
                delay: Duration::from_millis(100),
                fail_on: None,
            },
        );
        let (tx, mut rx) = mpsc::unbounded_channel();
        let _handle = rec.start(SessionId(1), "key", tx).await.unwrap();

        match rx.recv().await.unwrap() {
            AdapterEvent::CloudFailed { error, .. } => {
                assert!(matches!(error, RecognitionError::DeviceUnavailable(_)));
            }
            other => panic!("unexpected event {other:?}"),
        }
        assert_eq!(count(&log, "release"), 1);
    }

    #[tokio::test]
    async fn test_start_denied_microphone_fails() {
        let log: Log = Default::default();
        let mut mic = ScriptedMicrophone::new(log.clone());
        mic.deny_from = Some(1);
        let rec = recognizer(
            mic,
            SlowClient {
                log,
                delay: Duration::ZERO,
                fail_on: None,
            },
        );
        let (tx, _rx) = mpsc::unbounded_channel();
        assert!(matches!(
            rec.start(SessionId(1), "key", tx).await,
            Err(RecognitionError::DeviceUnavailable(_))
        ));
    }

    #[tokio::test]
    async fn test_start_without_encoder_fails() {
        let log: Log = Default::default();
        let rec = CloudChunkedRecognizer::new(
            Arc::new(ScriptedMicrophone::new(log.clone())),
            Arc::new(SlowClient {
                log: log.clone(),
                delay: Duration::ZERO,
                fail_on: None,
            }),
            Arc::new(EncoderSet::empty()),
            CloudSettings::default(),
        );
        let (tx, _rx) = mpsc::unbounded_channel();
        assert!(matches!(
            rec.start(SessionId(1), "key", tx).await,
            Err(RecognitionError::UnsupportedBackend(_))
        ));
        assert_eq!(count(&log, "acquire"), 0);
    }
}
