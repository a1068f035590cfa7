use crate::config::AppConfig;

/// Describes what changed between two loaded configs and when each change
/// takes effect.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct ConfigDiff {
    /// Recognition settings picked up by the next activation.
    pub next_activation: Vec<String>,
    pub cameras_changed: bool,
    pub non_reloadable: Vec<String>,
}

impl ConfigDiff {
    /// Compare two configs and return the diff.
    /// Next activation: API key, threshold, auto-switch.
    /// Immediate: camera list.
    /// Non-reloadable: language, chunk duration, endpoint, log level, audio device, local engine.
    pub fn diff(old: &AppConfig, new: &AppConfig) -> Self {
        let mut result = Self::default();
        let (o, n) = (&old.recognition, &new.recognition);

        if o.speech_api_key != n.speech_api_key {
            let describe = |key: &Option<String>| match key.as_deref() {
                Some(k) if !k.is_empty() => "set",
                _ => "unset",
            };
            result.next_activation.push(format!(
                "speech_api_key changed ({} → {})",
                describe(&o.speech_api_key),
                describe(&n.speech_api_key)
            ));
        }
        if o.voice_threshold != n.voice_threshold {
            result.next_activation.push(format!(
                "voice_threshold changed ({} → {})",
                o.voice_threshold, n.voice_threshold
            ));
        }
        if o.auto_switch_enabled != n.auto_switch_enabled {
            result.next_activation.push(format!(
                "auto_switch_enabled changed ({} → {})",
                o.auto_switch_enabled, n.auto_switch_enabled
            ));
        }
        if o.language != n.language {
            result.non_reloadable.push(format!(
                "language changed ('{}' → '{}'), requires restart",
                o.language, n.language
            ));
        }
        if o.chunk_duration_ms != n.chunk_duration_ms {
            result.non_reloadable.push(format!(
                "chunk_duration_ms changed ({} → {}), requires restart",
                o.chunk_duration_ms, n.chunk_duration_ms
            ));
        }
        if o.endpoint != n.endpoint {
            result.non_reloadable.push(format!(
                "endpoint changed ('{}' → '{}'), requires restart",
                o.endpoint, n.endpoint
            ));
        }

        if old.camera != new.camera {
            result.cameras_changed = true;
        }

        if old.general.log_level != new.general.log_level {
            result.non_reloadable.push(format!(
                "log_level changed ('{}' → '{}'), requires restart",
                old.general.log_level, new.general.log_level
            ));
        }
        if old.audio.device_name != new.audio.device_name {
            result.non_reloadable.push(format!(
                "audio device changed ('{}' → '{}'), requires restart",
                old.audio.device_name, new.audio.device_name
            ));
        }
        if old.local.engine != new.local.engine {
            result.non_reloadable.push(format!(
                "local engine changed ('{}' → '{}'), requires restart",
                old.local.engine, new.local.engine
            ));
        }

        result
    }

    pub fn is_empty(&self) -> bool {
        self.next_activation.is_empty() && !self.cameras_changed && self.non_reloadable.is_empty()
    }
}
