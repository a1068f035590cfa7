pub mod capture;
pub mod device;
pub mod encode;
pub mod level;

pub use capture::{CaptureConstraints, CaptureGuard, CaptureStream, CpalMicrophone, Microphone};
pub use device::DeviceManager;
pub use encode::{ChunkEncoder, EncoderSet, WavEncoder};
pub use level::{AudioLevelMonitor, LevelAnalyser, LEVEL_TICK, LEVEL_WINDOW};

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    #[ignore] // Requires audio hardware
    fn test_device_enumeration() {
        let manager = DeviceManager::new();
        let inputs = manager.list_input_devices().unwrap();
        println!("Input devices: {}", inputs.len());
        for (name, _) in &inputs {
            println!("  - {}", name);
        }
        println!("Default: {:?}", manager.default_input_name());
    }

    #[test]
    #[ignore] // Requires audio hardware
    fn test_missing_device_is_unavailable() {
        let manager = DeviceManager::new();
        let err = manager.get_input_device("no such microphone").err().unwrap();
        assert!(matches!(err, voxcam_core::AudioError::DeviceUnavailable(_)));
    }
}
