use crate::device::DeviceManager;
use async_trait::async_trait;
use cpal::traits::{DeviceTrait, StreamTrait};
use cpal::{Device, FromSample, Sample, SampleFormat, SizedSample, Stream, StreamConfig};
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, Mutex};
use tokio::sync::{mpsc, oneshot};
use voxcam_core::{AudioError, AudioFrame};

// ── CaptureConstraints ────────────────────────────────────────

/// What a consumer asks of a microphone stream.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct CaptureConstraints {
    /// `None` keeps the device's native layout.
    pub channel_count: Option<u16>,
    pub echo_cancellation: bool,
    pub noise_suppression: bool,
    pub auto_gain_control: bool,
}

impl CaptureConstraints {
    /// Device defaults, no processing. Used by the level meter.
    pub fn plain() -> Self {
        Self {
            channel_count: None,
            echo_cancellation: false,
            noise_suppression: false,
            auto_gain_control: false,
        }
    }

    /// Mono with echo cancellation, noise suppression and gain control.
    pub fn voice() -> Self {
        Self {
            channel_count: Some(1),
            echo_cancellation: true,
            noise_suppression: true,
            auto_gain_control: true,
        }
    }

    pub fn wants_voice_processing(&self) -> bool {
        self.echo_cancellation || self.noise_suppression || self.auto_gain_control
    }
}

// ── CaptureGuard ──────────────────────────────────────────────

/// Exclusive ownership of an open microphone stream. The stream is released
/// exactly once: on [`release`](Self::release) or on drop.
pub struct CaptureGuard {
    release: Option<Box<dyn FnOnce() + Send>>,
}

impl CaptureGuard {
    pub fn new<F>(release: F) -> Self
    where
        F: FnOnce() + Send + 'static,
    {
        Self {
            release: Some(Box::new(release)),
        }
    }

    pub fn release(mut self) {
        self.run_release();
    }

    fn run_release(&mut self) {
        if let Some(release) = self.release.take() {
            release();
        }
    }
}

impl Drop for CaptureGuard {
    fn drop(&mut self) {
        self.run_release();
    }
}

// ── CaptureStream ─────────────────────────────────────────────

/// An acquired microphone stream: frames arrive on the receiver until the
/// guard is released. A closed receiver while the guard is still held means
/// the device went away.
pub struct CaptureStream {
    frames: mpsc::UnboundedReceiver<AudioFrame>,
    guard: CaptureGuard,
}

impl CaptureStream {
    pub fn new(frames: mpsc::UnboundedReceiver<AudioFrame>, guard: CaptureGuard) -> Self {
        Self { frames, guard }
    }

    pub fn into_parts(self) -> (mpsc::UnboundedReceiver<AudioFrame>, CaptureGuard) {
        (self.frames, self.guard)
    }
}

/// Source of independent microphone streams. Acquiring twice yields two
/// streams that can be held at the same time.
#[async_trait]
pub trait Microphone: Send + Sync {
    async fn acquire(&self, constraints: CaptureConstraints) -> Result<CaptureStream, AudioError>;
}

// ── CpalMicrophone ────────────────────────────────────────────

type FrameSender = Arc<Mutex<Option<mpsc::UnboundedSender<AudioFrame>>>>;

/// Opens cpal input streams. Each stream lives on its own thread, which owns
/// the `cpal::Stream` and exits when the guard is released.
pub struct CpalMicrophone {
    device_name: String,
    next_id: AtomicU64,
}

impl CpalMicrophone {
    pub fn new(device_name: &str) -> Self {
        Self {
            device_name: device_name.to_string(),
            next_id: AtomicU64::new(1),
        }
    }
}

#[async_trait]
impl Microphone for CpalMicrophone {
    async fn acquire(&self, constraints: CaptureConstraints) -> Result<CaptureStream, AudioError> {
        let id = self.next_id.fetch_add(1, Ordering::Relaxed);
        let (frame_tx, frame_rx) = mpsc::unbounded_channel();
        let (init_tx, init_rx) = oneshot::channel();
        let (stop_tx, stop_rx) = std::sync::mpsc::channel::<()>();
        let device_name = self.device_name.clone();

        std::thread::Builder::new()
            .name(format!("voxcam-capture-{id}"))
            .spawn(move || run_capture_thread(&device_name, constraints, frame_tx, init_tx, stop_rx))
            .map_err(|e| AudioError::StreamBuild(e.to_string()))?;

        let (sample_rate, channels) = init_rx.await.map_err(|_| {
            AudioError::DeviceUnavailable("capture thread exited during start".to_string())
        })??;

        tracing::debug!(
            stream = id,
            device = %self.device_name,
            sample_rate,
            channels,
            "microphone stream opened"
        );

        let guard = CaptureGuard::new(move || {
            let _ = stop_tx.send(());
            tracing::debug!(stream = id, "microphone stream released");
        });
        Ok(CaptureStream::new(frame_rx, guard))
    }
}

fn run_capture_thread(
    device_name: &str,
    constraints: CaptureConstraints,
    frame_tx: mpsc::UnboundedSender<AudioFrame>,
    init_tx: oneshot::Sender<Result<(u32, u16), AudioError>>,
    stop_rx: std::sync::mpsc::Receiver<()>,
) {
    let (stream, sample_rate, channels) = match open_stream(device_name, constraints, frame_tx) {
        Ok(opened) => opened,
        Err(e) => {
            let _ = init_tx.send(Err(e));
            return;
        }
    };

    if let Err(e) = stream.play() {
        let _ = init_tx.send(Err(AudioError::DeviceUnavailable(e.to_string())));
        return;
    }
    let _ = init_tx.send(Ok((sample_rate, channels)));

    // Blocks until the guard sends or is dropped.
    let _ = stop_rx.recv();
    drop(stream);
}

fn open_stream(
    device_name: &str,
    constraints: CaptureConstraints,
    frame_tx: mpsc::UnboundedSender<AudioFrame>,
) -> Result<(Stream, u32, u16), AudioError> {
    let device = DeviceManager::new().get_input_device(device_name)?;
    let supported = device
        .default_input_config()
        .map_err(|e| AudioError::DeviceUnavailable(e.to_string()))?;

    let sample_rate = supported.sample_rate().0;
    let device_channels = supported.channels();
    let out_channels = match constraints.channel_count {
        Some(1) => 1,
        _ => device_channels,
    };

    if constraints.wants_voice_processing() {
        tracing::debug!(
            echo_cancellation = constraints.echo_cancellation,
            noise_suppression = constraints.noise_suppression,
            auto_gain_control = constraints.auto_gain_control,
            "voice processing requested; relying on the host input chain"
        );
    }

    let config: StreamConfig = supported.config();
    let sender: FrameSender = Arc::new(Mutex::new(Some(frame_tx)));
    let layout = StreamLayout {
        sample_rate,
        device_channels,
        out_channels,
    };

    let stream = match supported.sample_format() {
        SampleFormat::F32 => build_input::<f32>(&device, &config, layout, sender),
        SampleFormat::I16 => build_input::<i16>(&device, &config, layout, sender),
        SampleFormat::U16 => build_input::<u16>(&device, &config, layout, sender),
        other => Err(AudioError::StreamBuild(format!(
            "unsupported sample format: {other:?}"
        ))),
    }?;

    Ok((stream, sample_rate, out_channels))
}

#[derive(Clone, Copy)]
struct StreamLayout {
    sample_rate: u32,
    device_channels: u16,
    out_channels: u16,
}

fn build_input<T>(
    device: &Device,
    config: &StreamConfig,
    layout: StreamLayout,
    sender: FrameSender,
) -> Result<Stream, AudioError>
where
    T: SizedSample,
    f32: FromSample<T>,
{
    let err_sender = Arc::clone(&sender);
    let err_callback = move |err: cpal::StreamError| {
        tracing::error!("capture stream error: {}", err);
        if matches!(err, cpal::StreamError::DeviceNotAvailable) {
            // Closing the channel tells the consumer the device is gone.
            if let Ok(mut tx) = err_sender.lock() {
                tx.take();
            }
        }
    };

    device
        .build_input_stream(
            config,
            move |data: &[T], _: &cpal::InputCallbackInfo| {
                let samples = downmix(data, layout.device_channels, layout.out_channels);
                if let Ok(tx) = sender.lock() {
                    if let Some(tx) = tx.as_ref() {
                        let _ = tx.send(AudioFrame {
                            samples,
                            sample_rate: layout.sample_rate,
                            channels: layout.out_channels,
                        });
                    }
                }
            },
            err_callback,
            None,
        )
        .map_err(|e| AudioError::StreamBuild(e.to_string()))
}

/// Convert interleaved device samples to f32, averaging down to mono when asked.
fn downmix<T>(data: &[T], device_channels: u16, out_channels: u16) -> Vec<f32>
where
    T: Sample,
    f32: FromSample<T>,
{
    if out_channels == 1 && device_channels > 1 {
        data.chunks(device_channels as usize)
            .map(|frame| {
                frame.iter().map(|s| s.to_sample::<f32>()).sum::<f32>() / frame.len() as f32
            })
            .collect()
    } else {
        data.iter().map(|s| s.to_sample::<f32>()).collect()
    }
}
