pub mod dispatcher;
pub mod gate;
pub mod host;
pub mod switcher;

pub use dispatcher::{find_camera, DispatchOutcome, KeywordDispatcher};
pub use gate::ConfidenceGate;
pub use host::DispatchHost;
pub use switcher::{CameraRegistry, CameraSwitcher};
