use async_trait::async_trait;
use std::sync::{PoisonError, RwLock};
use voxcam_core::{CameraDescriptor, SwitchError};

/// The camera-management collaborator. The pipeline reads the camera list
/// and requests activation changes; it never edits the list itself.
#[async_trait]
pub trait CameraSwitcher: Send + Sync {
    fn name(&self) -> &str;
    /// Cameras in registry order, with `is_active` reflecting the current selection.
    fn cameras(&self) -> Vec<CameraDescriptor>;
    fn active_camera_id(&self) -> Option<String>;
    /// Make `camera_id` the active camera and return its descriptor.
    async fn switch_to(&self, camera_id: &str) -> Result<CameraDescriptor, SwitchError>;
}

struct RegistryState {
    cameras: Vec<CameraDescriptor>,
    active: Option<String>,
}

/// In-memory camera list loaded from the `[[camera]]` config entries.
pub struct CameraRegistry {
    state: RwLock<RegistryState>,
}

impl CameraRegistry {
    pub fn new(cameras: Vec<CameraDescriptor>) -> Self {
        let active = initial_active(&cameras, None);
        Self {
            state: RwLock::new(RegistryState { cameras, active }),
        }
    }

    /// Swap in a reloaded camera list. The active camera survives when its
    /// id is still present.
    pub fn replace(&self, cameras: Vec<CameraDescriptor>) {
        let mut state = self.state.write().unwrap_or_else(PoisonError::into_inner);
        let active = initial_active(&cameras, state.active.as_deref());
        tracing::info!(
            cameras = cameras.len(),
            camera_id = active.as_deref().unwrap_or("-"),
            "camera list replaced"
        );
        *state = RegistryState { cameras, active };
    }

    pub fn len(&self) -> usize {
        self.state
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .cameras
            .len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

fn initial_active(cameras: &[CameraDescriptor], keep: Option<&str>) -> Option<String> {
    keep.and_then(|id| cameras.iter().find(|c| c.id == id))
        .or_else(|| cameras.iter().find(|c| c.is_active))
        .or_else(|| cameras.first())
        .map(|c| c.id.clone())
}

#[async_trait]
impl CameraSwitcher for CameraRegistry {
    fn name(&self) -> &str {
        "registry"
    }

    fn cameras(&self) -> Vec<CameraDescriptor> {
        let state = self.state.read().unwrap_or_else(PoisonError::into_inner);
        state
            .cameras
            .iter()
            .map(|camera| CameraDescriptor {
                is_active: state.active.as_deref() == Some(camera.id.as_str()),
                ..camera.clone()
            })
            .collect()
    }

    fn active_camera_id(&self) -> Option<String> {
        self.state
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .active
            .clone()
    }

    async fn switch_to(&self, camera_id: &str) -> Result<CameraDescriptor, SwitchError> {
        let mut state = self.state.write().unwrap_or_else(PoisonError::into_inner);
        let camera = state
            .cameras
            .iter()
            .find(|c| c.id == camera_id)
            .cloned()
            .ok_or_else(|| SwitchError::CameraNotFound(camera_id.to_string()))?;
        state.active = Some(camera.id.clone());
        Ok(CameraDescriptor {
            is_active: true,
            ..camera
        })
    }
}
