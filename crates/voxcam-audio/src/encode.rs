use hound::{SampleFormat, WavSpec, WavWriter};
use std::collections::HashMap;
use std::io::Cursor;
use std::sync::Arc;
use voxcam_core::{AudioEncoding, AudioError};

/// Turns captured PCM into the payload of an [`voxcam_core::AudioChunk`].
pub trait ChunkEncoder: Send + Sync {
    fn encoding(&self) -> AudioEncoding;

    fn encode(&self, samples: &[f32], sample_rate: u32, channels: u16)
        -> Result<Vec<u8>, AudioError>;
}

/// 16-bit PCM in a RIFF/WAV container (`LINEAR16`).
pub struct WavEncoder;

impl ChunkEncoder for WavEncoder {
    fn encoding(&self) -> AudioEncoding {
        AudioEncoding::Linear16
    }

    fn encode(
        &self,
        samples: &[f32],
        sample_rate: u32,
        channels: u16,
    ) -> Result<Vec<u8>, AudioError> {
        let spec = WavSpec {
            channels,
            sample_rate,
            bits_per_sample: 16,
            sample_format: SampleFormat::Int,
        };

        let mut buffer = Cursor::new(Vec::new());
        {
            let mut writer = WavWriter::new(&mut buffer, spec)
                .map_err(|e| AudioError::Encoding(format!("failed to create WAV writer: {e}")))?;

            for &sample in samples {
                let sample_i16 = (sample * 32767.0).clamp(-32768.0, 32767.0) as i16;
                writer
                    .write_sample(sample_i16)
                    .map_err(|e| AudioError::Encoding(format!("failed to write sample: {e}")))?;
            }

            writer
                .finalize()
                .map_err(|e| AudioError::Encoding(format!("failed to finalize WAV: {e}")))?;
        }

        Ok(buffer.into_inner())
    }
}

/// The encoders available in this build, keyed by the encoding they produce.
pub struct EncoderSet {
    encoders: HashMap<AudioEncoding, Arc<dyn ChunkEncoder>>,
}

impl EncoderSet {
    pub fn empty() -> Self {
        Self {
            encoders: HashMap::new(),
        }
    }

    pub fn register(&mut self, encoder: Arc<dyn ChunkEncoder>) {
        self.encoders.insert(encoder.encoding(), encoder);
    }

    pub fn supports(&self, encoding: AudioEncoding) -> bool {
        self.encoders.contains_key(&encoding)
    }

    /// First available encoder in preference order. Warns when a preferred
    /// compressed format has to be skipped.
    pub fn select(&self, preference: &[AudioEncoding]) -> Option<Arc<dyn ChunkEncoder>> {
        for encoding in preference {
            match self.encoders.get(encoding) {
                Some(encoder) => return Some(Arc::clone(encoder)),
                None if encoding.is_compressed() => {
                    tracing::warn!(
                        "{} encoding unavailable, falling back to the next format",
                        encoding.api_name()
                    );
                }
                None => {}
            }
        }
        None
    }
}

impl Default for EncoderSet {
    fn default() -> Self {
        let mut set = Self::empty();
        set.register(Arc::new(WavEncoder));
        set
    }
}
