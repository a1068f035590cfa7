use crate::capture::{CaptureConstraints, CaptureGuard, Microphone};
use ringbuf::traits::{Consumer, Observer, RingBuffer};
use ringbuf::HeapRb;
use rustfft::{num_complex::Complex, Fft, FftPlanner};
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::{mpsc, watch};
use tokio::task::JoinHandle;
use tokio::time::MissedTickBehavior;
use voxcam_core::{AudioError, AudioFrame, MonitorStatus};

/// FFT size of the level analysis; the level covers the most recent this-many samples.
pub const LEVEL_WINDOW: usize = 256;

/// Roughly one display frame at 60 Hz.
pub const LEVEL_TICK: Duration = Duration::from_micros(16_667);

const MIN_DECIBELS: f32 = -100.0;
const MAX_DECIBELS: f32 = -30.0;

/// Spectrum-based amplitude metric over a sliding window of samples.
///
/// Each bin magnitude is converted to dBFS and mapped from
/// `MIN_DECIBELS..MAX_DECIBELS` onto `0..=255`; the level is the mean over
/// the `LEVEL_WINDOW / 2` positive-frequency bins.
pub struct LevelAnalyser {
    fft: Arc<dyn Fft<f32>>,
    window: Vec<f32>,
    history: HeapRb<f32>,
}

impl LevelAnalyser {
    pub fn new() -> Self {
        let mut planner = FftPlanner::new();
        let fft = planner.plan_fft_forward(LEVEL_WINDOW);
        let window = (0..LEVEL_WINDOW)
            .map(|i| {
                0.5 * (1.0
                    - (2.0 * std::f32::consts::PI * i as f32 / (LEVEL_WINDOW - 1) as f32).cos())
            })
            .collect();

        Self {
            fft,
            window,
            history: HeapRb::new(LEVEL_WINDOW),
        }
    }

    /// Append mono samples, keeping only the last `LEVEL_WINDOW`.
    pub fn push(&mut self, samples: &[f32]) {
        self.history.push_slice_overwrite(samples);
    }

    /// Append a frame, averaging interleaved channels to mono.
    pub fn push_frame(&mut self, frame: &AudioFrame) {
        if frame.channels <= 1 {
            self.push(&frame.samples);
            return;
        }
        let mono: Vec<f32> = frame
            .samples
            .chunks(frame.channels as usize)
            .map(|c| c.iter().sum::<f32>() / c.len() as f32)
            .collect();
        self.push(&mono);
    }

    pub fn level(&self) -> f32 {
        let mut buffer: Vec<Complex<f32>> = vec![Complex::new(0.0, 0.0); LEVEL_WINDOW];
        // Right-align so a short history reads as leading silence.
        let offset = LEVEL_WINDOW - self.history.occupied_len();
        for (slot, (sample, w)) in buffer[offset..]
            .iter_mut()
            .zip(self.history.iter().zip(&self.window[offset..]))
        {
            *slot = Complex::new(sample * w, 0.0);
        }

        self.fft.process(&mut buffer);

        let bins = LEVEL_WINDOW / 2;
        let total: f32 = buffer[..bins]
            .iter()
            .map(|c| byte_scale(c.norm() / LEVEL_WINDOW as f32))
            .sum();
        total / bins as f32
    }
}

impl Default for LevelAnalyser {
    fn default() -> Self {
        Self::new()
    }
}

fn byte_scale(magnitude: f32) -> f32 {
    let db = 20.0 * magnitude.max(1e-12).log10();
    let scaled = 255.0 * (db - MIN_DECIBELS) / (MAX_DECIBELS - MIN_DECIBELS);
    scaled.clamp(0.0, 255.0)
}

// ── AudioLevelMonitor ─────────────────────────────────────────

/// Publishes a continuously refreshed input level for display. Runs
/// independently of the recognition session.
pub struct AudioLevelMonitor {
    microphone: Arc<dyn Microphone>,
    level_tx: Arc<watch::Sender<f32>>,
    status_tx: Arc<watch::Sender<MonitorStatus>>,
    guard: Option<CaptureGuard>,
    task: Option<JoinHandle<()>>,
}

impl AudioLevelMonitor {
    pub fn new(microphone: Arc<dyn Microphone>) -> Self {
        let (level_tx, _) = watch::channel(0.0);
        let (status_tx, _) = watch::channel(MonitorStatus::Inactive);
        Self {
            microphone,
            level_tx: Arc::new(level_tx),
            status_tx: Arc::new(status_tx),
            guard: None,
            task: None,
        }
    }

    pub fn levels(&self) -> watch::Receiver<f32> {
        self.level_tx.subscribe()
    }

    pub fn status(&self) -> watch::Receiver<MonitorStatus> {
        self.status_tx.subscribe()
    }

    /// False once the sampling task has lost its stream, even before `stop()`.
    pub fn is_active(&self) -> bool {
        self.guard.is_some() && *self.status_tx.borrow() == MonitorStatus::Active
    }

    pub async fn start(&mut self) -> Result<(), AudioError> {
        if self.is_active() {
            return Ok(());
        }
        // A stream lost mid-run still holds its capture handle.
        self.release_capture();

        let stream = match self.microphone.acquire(CaptureConstraints::plain()).await {
            Ok(stream) => stream,
            Err(e) => {
                tracing::warn!("level monitor could not open microphone: {}", e);
                let reason = e.to_string();
                self.status_tx
                    .send_replace(MonitorStatus::DeviceUnavailable(reason.clone()));
                return Err(AudioError::DeviceUnavailable(reason));
            }
        };

        let (frames, guard) = stream.into_parts();
        self.guard = Some(guard);
        self.status_tx.send_replace(MonitorStatus::Active);
        self.task = Some(tokio::spawn(run_sampling(
            frames,
            Arc::clone(&self.level_tx),
            Arc::clone(&self.status_tx),
        )));
        tracing::debug!("level monitor started");
        Ok(())
    }

    /// Release the microphone and reset the level. Safe to call when inactive.
    pub fn stop(&mut self) {
        let was_active = self.release_capture();
        self.level_tx.send_replace(0.0);
        self.status_tx.send_replace(MonitorStatus::Inactive);
        if was_active {
            tracing::debug!("level monitor stopped");
        }
    }

    fn release_capture(&mut self) -> bool {
        let held = self.guard.is_some();
        if let Some(guard) = self.guard.take() {
            guard.release();
        }
        if let Some(task) = self.task.take() {
            task.abort();
        }
        held
    }
}

impl Drop for AudioLevelMonitor {
    fn drop(&mut self) {
        self.stop();
    }
}

async fn run_sampling(
    mut frames: mpsc::UnboundedReceiver<AudioFrame>,
    level_tx: Arc<watch::Sender<f32>>,
    status_tx: Arc<watch::Sender<MonitorStatus>>,
) {
    let mut analyser = LevelAnalyser::new();
    let mut ticker = tokio::time::interval(LEVEL_TICK);
    ticker.set_missed_tick_behavior(MissedTickBehavior::Skip);

    loop {
        tokio::select! {
            frame = frames.recv() => match frame {
                Some(frame) => analyser.push_frame(&frame),
                None => {
                    tracing::warn!("level monitor lost its microphone stream");
                    level_tx.send_replace(0.0);
                    status_tx.send_replace(MonitorStatus::DeviceUnavailable(
                        "capture stream closed".to_string(),
                    ));
                    break;
                }
            },
            _ = ticker.tick() => {
                level_tx.send_replace(analyser.level());
            }
        }
    }
}
