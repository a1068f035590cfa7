use voxcam_core::RecognitionResult;

/// Drops results whose confidence is below the configured threshold.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ConfidenceGate {
    threshold: u8,
}

impl ConfidenceGate {
    pub fn new(threshold: u8) -> Self {
        Self { threshold }
    }

    pub fn threshold(&self) -> u8 {
        self.threshold
    }

    /// The boundary is inclusive: a confidence equal to the threshold passes.
    pub fn passes(&self, confidence: f32) -> bool {
        confidence >= f32::from(self.threshold)
    }

    pub fn forward(&self, result: RecognitionResult) -> Option<RecognitionResult> {
        if self.passes(result.confidence) {
            Some(result)
        } else {
            tracing::debug!(
                confidence = result.confidence,
                threshold = self.threshold,
                "result below confidence threshold"
            );
            None
        }
    }
}
