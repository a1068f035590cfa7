use crate::switcher::CameraSwitcher;
use voxcam_core::{CameraDescriptor, SwitchError};

/// What a dispatch attempt did.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum DispatchOutcome {
    /// Auto-switch is turned off.
    Disabled,
    NoMatch,
    /// The matching camera is already on air.
    AlreadyActive { camera_id: String },
    Switched {
        camera_id: String,
        camera_name: String,
    },
}

/// First camera, in registry order, with a keyword contained in `transcript`.
/// Matching is case-insensitive and blank keywords never match.
pub fn find_camera<'a>(
    cameras: &'a [CameraDescriptor],
    transcript: &str,
) -> Option<&'a CameraDescriptor> {
    let transcript = transcript.to_lowercase();
    cameras.iter().find(|camera| {
        camera.keywords.iter().any(|keyword| {
            let keyword = keyword.trim();
            !keyword.is_empty() && transcript.contains(&keyword.to_lowercase())
        })
    })
}

/// Maps recognized speech onto camera switch requests.
#[derive(Debug, Clone, Copy)]
pub struct KeywordDispatcher {
    auto_switch: bool,
}

impl KeywordDispatcher {
    pub fn new(auto_switch: bool) -> Self {
        Self { auto_switch }
    }

    pub async fn dispatch(
        &self,
        transcript: &str,
        switcher: &dyn CameraSwitcher,
    ) -> Result<DispatchOutcome, SwitchError> {
        if !self.auto_switch {
            return Ok(DispatchOutcome::Disabled);
        }

        let cameras = switcher.cameras();
        let Some(camera) = find_camera(&cameras, transcript) else {
            return Ok(DispatchOutcome::NoMatch);
        };

        if switcher.active_camera_id().as_deref() == Some(camera.id.as_str()) {
            return Ok(DispatchOutcome::AlreadyActive {
                camera_id: camera.id.clone(),
            });
        }

        let switched = switcher.switch_to(&camera.id).await?;
        Ok(DispatchOutcome::Switched {
            camera_id: switched.id,
            camera_name: switched.name,
        })
    }
}
