use crate::engine_trait::LocalEngine;
use std::collections::HashMap;
use voxcam_core::RecognitionError;

/// Local engines compiled into this build, by name.
pub struct EngineRegistry {
    factories: HashMap<String, fn() -> Box<dyn LocalEngine>>,
}

impl EngineRegistry {
    pub fn new() -> Self {
        #[allow(unused_mut)]
        let mut registry = Self::empty();
        #[cfg(feature = "whisper")]
        registry.register("whisper", || {
            Box::new(crate::whisper_engine::WhisperEngine::new())
        });
        registry
    }

    pub fn empty() -> Self {
        Self {
            factories: HashMap::new(),
        }
    }

    pub fn register(&mut self, name: &str, factory: fn() -> Box<dyn LocalEngine>) {
        self.factories.insert(name.to_string(), factory);
    }

    pub fn create(&self, name: &str) -> Result<Box<dyn LocalEngine>, RecognitionError> {
        self.factories.get(name).map(|f| f()).ok_or_else(|| {
            RecognitionError::UnsupportedBackend(format!(
                "no local engine named '{name}' in this build"
            ))
        })
    }

    pub fn list_engines(&self) -> Vec<&str> {
        self.factories.keys().map(|s| s.as_str()).collect()
    }
}

impl Default for EngineRegistry {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::engine_trait::Transcript;
    use async_trait::async_trait;
    use tokio::sync::mpsc;
    use voxcam_core::AudioFrame;

    struct SilentEngine;

    #[async_trait]
    impl LocalEngine for SilentEngine {
        fn name(&self) -> &str {
            "silent"
        }

        async fn initialize(&mut self, _config: toml::Value) -> Result<(), RecognitionError> {
            Ok(())
        }

        async fn feed_audio(&self, _frame: AudioFrame) -> Result<(), RecognitionError> {
            Ok(())
        }

        fn set_result_sender(&mut self, _sender: mpsc::UnboundedSender<Transcript>) {}

        async fn shutdown(&self) -> Result<(), RecognitionError> {
            Ok(())
        }
    }

    #[test]
    fn test_registry_create_unknown_is_unsupported() {
        let registry = EngineRegistry::empty();
        match registry.create("nope") {
            Err(RecognitionError::UnsupportedBackend(msg)) => assert!(msg.contains("nope")),
            Err(other) => panic!("expected UnsupportedBackend, got {other:?}"),
            Ok(_) => panic!("expected UnsupportedBackend"),
        }
    }

    #[test]
    fn test_registry_register_custom_engine() {
        let mut registry = EngineRegistry::empty();
        registry.register("silent", || Box::new(SilentEngine));
        let engine = registry.create("silent").unwrap();
        assert_eq!(engine.name(), "silent");
        assert_eq!(registry.list_engines(), vec!["silent"]);
    }

    #[cfg(feature = "whisper")]
    #[test]
    fn test_registry_new_has_whisper() {
        let registry = EngineRegistry::new();
        assert!(registry.list_engines().contains(&"whisper"));
    }

    #[cfg(not(feature = "whisper"))]
    #[test]
    fn test_registry_new_without_whisper_is_empty() {
        let registry = EngineRegistry::new();
        assert!(matches!(
            registry.create("whisper"),
            Err(RecognitionError::UnsupportedBackend(_))
        ));
    }
}
