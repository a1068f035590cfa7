use anyhow::{Context, Result};
use notify::{recommended_watcher, Event, RecommendedWatcher, RecursiveMode, Watcher};
use std::path::Path;
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::watch;
use voxcam_core::{AppConfig, ConfigDiff, RecognitionConfig};
use voxcam_dispatch::CameraRegistry;

/// Editors often write in several steps; wait before re-reading.
const SETTLE_DELAY: Duration = Duration::from_millis(100);

/// Reloads the config file on change. Dropping it stops the watch thread.
pub struct ConfigWatcher {
    _watcher: RecommendedWatcher,
}

impl ConfigWatcher {
    pub fn spawn(
        path: &Path,
        current: AppConfig,
        config_tx: watch::Sender<RecognitionConfig>,
        cameras: Arc<CameraRegistry>,
    ) -> Result<Self> {
        let path = std::fs::canonicalize(path)
            .with_context(|| format!("failed to resolve config path {path:?}"))?;
        let dir = path
            .parent()
            .map(Path::to_path_buf)
            .context("config path has no parent directory")?;

        let (tx, rx) = std::sync::mpsc::channel();
        let mut watcher = recommended_watcher(tx).context("failed to create config watcher")?;
        // The directory is watched so that replace-on-save editors are seen.
        watcher
            .watch(&dir, RecursiveMode::NonRecursive)
            .with_context(|| format!("failed to watch {dir:?}"))?;
        tracing::info!(path = ?path, "watching config for changes");

        std::thread::spawn(move || {
            let mut current = current;
            for event in rx {
                match event {
                    Ok(event) if touches(&event, &path) => {
                        std::thread::sleep(SETTLE_DELAY);
                        reload(&path, &mut current, &config_tx, &cameras);
                    }
                    Ok(_) => {}
                    Err(e) => tracing::warn!("config watcher error: {e}"),
                }
            }
            tracing::debug!("config watcher stopped");
        });

        Ok(Self { _watcher: watcher })
    }
}

fn touches(event: &Event, path: &Path) -> bool {
    (event.kind.is_modify() || event.kind.is_create())
        && event.paths.iter().any(|p| p.as_path() == path)
}

fn reload(
    path: &Path,
    current: &mut AppConfig,
    config_tx: &watch::Sender<RecognitionConfig>,
    cameras: &CameraRegistry,
) {
    match AppConfig::load_from_file(path) {
        Ok(new) => {
            apply_reload(current, new, config_tx, cameras);
        }
        Err(e) => tracing::warn!("config reload failed, keeping previous config: {e}"),
    }
}

/// Publish what can change at runtime and report the rest. `current` keeps
/// the running values for settings that need a restart.
pub fn apply_reload(
    current: &mut AppConfig,
    new: AppConfig,
    config_tx: &watch::Sender<RecognitionConfig>,
    cameras: &CameraRegistry,
) -> ConfigDiff {
    let diff = ConfigDiff::diff(current, &new);
    if diff.is_empty() {
        return diff;
    }

    for change in &diff.next_activation {
        tracing::info!("{change}, applies on next activation");
    }
    for change in &diff.non_reloadable {
        tracing::warn!("{change}");
    }

    let AppConfig {
        recognition, camera, ..
    } = new;
    if !diff.next_activation.is_empty() {
        current.recognition.speech_api_key = recognition.speech_api_key;
        current.recognition.voice_threshold = recognition.voice_threshold;
        current.recognition.auto_switch_enabled = recognition.auto_switch_enabled;
        config_tx.send_replace(current.recognition_config());
    }
    if diff.cameras_changed {
        current.camera = camera;
        cameras.replace(current.camera.clone());
    }
    diff
}
