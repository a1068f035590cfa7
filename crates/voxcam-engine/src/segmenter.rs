use std::time::Duration;
use voxcam_core::AudioFrame;

#[derive(Debug, Clone)]
pub struct SegmenterConfig {
    /// Frame RMS at or above this counts as speech.
    pub speech_threshold: f32,
    /// Trailing silence that closes an utterance.
    pub silence: Duration,
    /// Utterances with less speech than this are dropped.
    pub min_speech: Duration,
    pub max_utterance: Duration,
}

impl Default for SegmenterConfig {
    fn default() -> Self {
        Self {
            speech_threshold: 0.01,
            silence: Duration::from_millis(700),
            min_speech: Duration::from_millis(250),
            max_utterance: Duration::from_millis(15_000),
        }
    }
}

/// A completed span of mono speech.
#[derive(Debug, Clone)]
pub struct Utterance {
    pub samples: Vec<f32>,
    pub sample_rate: u32,
}

impl Utterance {
    pub fn duration(&self) -> Duration {
        if self.sample_rate == 0 {
            return Duration::ZERO;
        }
        Duration::from_secs_f64(self.samples.len() as f64 / self.sample_rate as f64)
    }
}

/// Energy-based endpointer: splits a continuous frame stream into utterances.
pub struct UtteranceSegmenter {
    config: SegmenterConfig,
    buffer: Vec<f32>,
    sample_rate: u32,
    in_speech: bool,
    speech_samples: usize,
    silence_samples: usize,
}

impl UtteranceSegmenter {
    pub fn new(config: SegmenterConfig) -> Self {
        Self {
            config,
            buffer: Vec::new(),
            sample_rate: 0,
            in_speech: false,
            speech_samples: 0,
            silence_samples: 0,
        }
    }

    pub fn is_in_speech(&self) -> bool {
        self.in_speech
    }

    /// Feed one frame and collect the utterances it closes, oldest first.
    /// A sample-rate change closes the pending utterance before the frame is
    /// taken, and a long enough frame can close another one by itself.
    pub fn push(&mut self, frame: &AudioFrame) -> Vec<Utterance> {
        let mut closed = Vec::new();
        if frame.sample_rate != self.sample_rate {
            closed.extend(self.flush());
            self.sample_rate = frame.sample_rate;
        }
        closed.extend(self.accept(frame));
        closed
    }

    /// Close the current utterance, if any, regardless of trailing silence.
    pub fn flush(&mut self) -> Option<Utterance> {
        if !self.in_speech {
            return None;
        }
        self.finish()
    }

    fn accept(&mut self, frame: &AudioFrame) -> Option<Utterance> {
        let mono = to_mono(frame);
        if mono.is_empty() {
            return None;
        }

        if rms(&mono) >= self.config.speech_threshold {
            self.in_speech = true;
            self.speech_samples += mono.len();
            self.silence_samples = 0;
            self.buffer.extend_from_slice(&mono);
        } else if self.in_speech {
            self.silence_samples += mono.len();
            self.buffer.extend_from_slice(&mono);
            if self.silence_samples >= self.samples_for(self.config.silence) {
                return self.finish();
            }
        } else {
            return None;
        }

        if self.buffer.len() >= self.samples_for(self.config.max_utterance) {
            return self.finish();
        }
        None
    }

    fn finish(&mut self) -> Option<Utterance> {
        let samples = std::mem::take(&mut self.buffer);
        let long_enough = self.speech_samples >= self.samples_for(self.config.min_speech);
        self.in_speech = false;
        self.speech_samples = 0;
        self.silence_samples = 0;

        if !long_enough {
            tracing::trace!(samples = samples.len(), "discarding short utterance");
            return None;
        }
        Some(Utterance {
            samples,
            sample_rate: self.sample_rate,
        })
    }

    fn samples_for(&self, duration: Duration) -> usize {
        (duration.as_millis() * self.sample_rate as u128 / 1000) as usize
    }
}

fn to_mono(frame: &AudioFrame) -> Vec<f32> {
    if frame.channels <= 1 {
        return frame.samples.clone();
    }
    frame
        .samples
        .chunks(frame.channels as usize)
        .map(|c| c.iter().sum::<f32>() / c.len() as f32)
        .collect()
}

fn rms(samples: &[f32]) -> f32 {
    let sum: f32 = samples.iter().map(|s| s * s).sum();
    (sum / samples.len() as f32).sqrt()
}

#[cfg(test)]
mod tests {
    use super::*;

    const RATE: u32 = 16000;

    /// 10 ms of constant-amplitude audio.
    fn frame(amplitude: f32) -> AudioFrame {
        AudioFrame {
            samples: vec![amplitude; (RATE / 100) as usize],
            sample_rate: RATE,
            channels: 1,
        }
    }

    fn feed(seg: &mut UtteranceSegmenter, amplitude: f32, ms: usize) -> Vec<Utterance> {
        (0..ms / 10).flat_map(|_| seg.push(&frame(amplitude))).collect()
    }

    #[test]
    fn test_silence_produces_nothing() {
        let mut seg = UtteranceSegmenter::new(SegmenterConfig::default());
        assert!(feed(&mut seg, 0.0, 2000).is_empty());
        assert!(!seg.is_in_speech());
        assert!(seg.flush().is_none());
    }

    #[test]
    fn test_speech_then_silence_closes_utterance() {
        let mut seg = UtteranceSegmenter::new(SegmenterConfig::default());
        assert!(feed(&mut seg, 0.2, 500).is_empty());
        assert!(seg.is_in_speech());

        // 690 ms of silence is not enough.
        assert!(feed(&mut seg, 0.0, 690).is_empty());
        let closed = feed(&mut seg, 0.0, 10);
        assert_eq!(closed.len(), 1);

        let utterance = &closed[0];
        assert_eq!(utterance.sample_rate, RATE);
        // Speech plus the trailing hangover: 500 ms + 700 ms.
        assert_eq!(utterance.samples.len(), 19_200);
        assert!(!seg.is_in_speech());
    }

    #[test]
    fn test_speech_resumes_within_hangover() {
        let mut seg = UtteranceSegmenter::new(SegmenterConfig::default());
        feed(&mut seg, 0.2, 300);
        feed(&mut seg, 0.0, 400);
        feed(&mut seg, 0.2, 300);
        let closed = feed(&mut seg, 0.0, 700);
        assert_eq!(closed.len(), 1);
        assert_eq!(closed[0].samples.len(), 27_200);
    }

    #[test]
    fn test_short_blip_is_dropped() {
        let mut seg = UtteranceSegmenter::new(SegmenterConfig::default());
        feed(&mut seg, 0.2, 100);
        assert!(feed(&mut seg, 0.0, 1000).is_empty());
    }

    #[test]
    fn test_max_utterance_forces_close() {
        let config = SegmenterConfig {
            max_utterance: Duration::from_millis(1000),
            ..Default::default()
        };
        let mut seg = UtteranceSegmenter::new(config);
        let closed = feed(&mut seg, 0.2, 2500);
        assert_eq!(closed.len(), 2);
        assert_eq!(closed[0].samples.len(), 16_000);
    }

    #[test]
    fn test_flush_returns_pending_speech() {
        let mut seg = UtteranceSegmenter::new(SegmenterConfig::default());
        feed(&mut seg, 0.2, 400);
        let utterance = seg.flush().unwrap();
        assert_eq!(utterance.samples.len(), 6_400);
        assert!(seg.flush().is_none());
    }

    #[test]
    fn test_stereo_frames_are_downmixed() {
        let mut seg = UtteranceSegmenter::new(SegmenterConfig::default());
        let stereo = AudioFrame {
            samples: vec![0.2; 320],
            sample_rate: RATE,
            channels: 2,
        };
        for _ in 0..30 {
            seg.push(&stereo);
        }
        let utterance = seg.flush().unwrap();
        assert_eq!(utterance.samples.len(), 30 * 160);
    }

    #[test]
    fn test_rate_change_keeps_both_utterances() {
        let config = SegmenterConfig {
            max_utterance: Duration::from_millis(500),
            ..Default::default()
        };
        let mut seg = UtteranceSegmenter::new(config);
        feed(&mut seg, 0.2, 400);

        // One second at 8 kHz: closes the 16 kHz speech and fills a whole utterance.
        let closed = seg.push(&AudioFrame {
            samples: vec![0.2; 8000],
            sample_rate: 8000,
            channels: 1,
        });
        assert_eq!(closed.len(), 2);
        assert_eq!(closed[0].sample_rate, RATE);
        assert_eq!(closed[0].samples.len(), 6_400);
        assert_eq!(closed[1].sample_rate, 8000);
        assert_eq!(closed[1].samples.len(), 8000);
        assert!(!seg.is_in_speech());
    }
}
