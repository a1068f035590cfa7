use crate::cloud::{CloudChunkedRecognizer, CloudHandle};
use crate::local::{LocalHandle, LocalRecognitionAdapter};
use tokio::sync::{mpsc, watch};
use voxcam_core::{
    ConsoleEvent, ConsoleState, RecognitionConfig, RecognitionError, RecognitionMode,
    RecognitionResult, SessionId, SessionResult, SessionState,
};

/// Notices kept in [`ConsoleState::notices`].
const MAX_NOTICES: usize = 20;

/// What a running adapter reports back to the selector. Every event is
/// tagged so results from a stopped backend can be told apart.
#[derive(Debug, Clone, PartialEq)]
pub enum AdapterEvent {
    Recognized {
        session: SessionId,
        mode: RecognitionMode,
        result: RecognitionResult,
    },
    CloudFailed {
        session: SessionId,
        error: RecognitionError,
    },
    /// The local recognizer's microphone went away.
    LocalStopped { session: SessionId, reason: String },
}

pub enum ActiveBackend {
    Local(LocalHandle),
    Cloud(CloudHandle),
}

impl ActiveBackend {
    pub fn mode(&self) -> RecognitionMode {
        match self {
            ActiveBackend::Local(_) => RecognitionMode::Local,
            ActiveBackend::Cloud(_) => RecognitionMode::Cloud,
        }
    }

    fn stop(self) {
        match self {
            ActiveBackend::Local(handle) => handle.stop(),
            ActiveBackend::Cloud(handle) => handle.stop(),
        }
    }
}

/// Live state of one activation span.
pub struct RecognitionSession {
    pub id: SessionId,
    pub config: RecognitionConfig,
    /// Set once the session has been demoted from cloud to local.
    pub fell_back: bool,
    pub last_confidence: f32,
    backend: ActiveBackend,
}

impl RecognitionSession {
    pub fn mode(&self) -> RecognitionMode {
        self.backend.mode()
    }
}

/// Cloud when a non-empty API key is configured, otherwise local.
pub fn select_mode(config: &RecognitionConfig) -> RecognitionMode {
    if config.has_api_key() {
        RecognitionMode::Cloud
    } else {
        RecognitionMode::Local
    }
}

/// Drives exactly one recognizer per session and demotes cloud to local on failure.
pub struct RecognitionModeSelector {
    local: LocalRecognitionAdapter,
    cloud: CloudChunkedRecognizer,
    events_tx: mpsc::UnboundedSender<AdapterEvent>,
    console_tx: watch::Sender<ConsoleState>,
    notice_tx: Option<mpsc::UnboundedSender<ConsoleEvent>>,
    state: SessionState,
    session: Option<RecognitionSession>,
    next_session: u64,
}

impl RecognitionModeSelector {
    pub fn new(
        local: LocalRecognitionAdapter,
        cloud: CloudChunkedRecognizer,
    ) -> (Self, mpsc::UnboundedReceiver<AdapterEvent>) {
        let (events_tx, events_rx) = mpsc::unbounded_channel();
        let (console_tx, _) = watch::channel(ConsoleState::default());
        let selector = Self {
            local,
            cloud,
            events_tx,
            console_tx,
            notice_tx: None,
            state: SessionState::Inactive,
            session: None,
            next_session: 1,
        };
        (selector, events_rx)
    }

    /// Also push passive notices to the console as they happen.
    pub fn set_notice_sender(&mut self, sender: mpsc::UnboundedSender<ConsoleEvent>) {
        self.notice_tx = Some(sender);
    }

    pub fn subscribe(&self) -> watch::Receiver<ConsoleState> {
        self.console_tx.subscribe()
    }

    pub fn state(&self) -> SessionState {
        self.state
    }

    pub fn session(&self) -> Option<&RecognitionSession> {
        self.session.as_ref()
    }

    /// Start a session from `config`. A no-op returning the current mode
    /// while a session is running.
    pub async fn activate(
        &mut self,
        config: RecognitionConfig,
    ) -> Result<RecognitionMode, RecognitionError> {
        if let Some(session) = &self.session {
            return Ok(session.mode());
        }

        let id = SessionId(self.next_session);
        self.next_session += 1;
        let mode = select_mode(&config);
        self.console_tx.send_modify(|state| {
            state.last_error = None;
            state.fell_back = false;
            state.last_confidence = 0.0;
            state.confidence_threshold = config.confidence_threshold;
            state.auto_switch_enabled = config.auto_switch_enabled;
        });
        self.set_state(SessionState::Starting);
        tracing::info!(session = %id, %mode, "activating recognition");

        let (backend, fell_back) = match mode {
            RecognitionMode::Cloud => {
                let api_key = config.api_key.as_deref().unwrap_or_default();
                match self.cloud.start(id, api_key, self.events_tx.clone()).await {
                    Ok(handle) => (ActiveBackend::Cloud(handle), false),
                    Err(e) => {
                        tracing::warn!(session = %id, "cloud recognition could not start: {e}");
                        self.set_state(SessionState::Fallback);
                        self.notice(format!(
                            "Cloud recognition unavailable, using the local recognizer: {e}"
                        ));
                        (ActiveBackend::Local(self.start_local(id).await?), true)
                    }
                }
            }
            RecognitionMode::Local => (ActiveBackend::Local(self.start_local(id).await?), false),
        };

        let mode = backend.mode();
        self.session = Some(RecognitionSession {
            id,
            config,
            fell_back,
            last_confidence: 0.0,
            backend,
        });
        self.console_tx.send_modify(|state| state.fell_back = fell_back);
        self.set_state(SessionState::Running(mode));
        Ok(mode)
    }

    /// Stop the active backend synchronously. Safe to call when inactive.
    pub fn deactivate(&mut self) {
        let Some(session) = self.session.take() else {
            return;
        };
        self.set_state(SessionState::Stopping);
        session.backend.stop();
        self.set_state(SessionState::Inactive);
        tracing::info!(session = %session.id, "recognition stopped");
    }

    /// Apply an adapter event. Returns the result to forward downstream, if any.
    pub async fn handle_event(&mut self, event: AdapterEvent) -> Option<SessionResult> {
        match event {
            AdapterEvent::Recognized {
                session,
                mode,
                result,
            } => {
                let Some(current) = self.current(session, mode) else {
                    tracing::debug!(%session, %mode, "discarding stale result");
                    return None;
                };
                current.last_confidence = result.confidence;
                let config = current.config.clone();
                let confidence = result.confidence;
                self.console_tx
                    .send_modify(|state| state.last_confidence = confidence);
                Some(SessionResult { result, config })
            }
            AdapterEvent::CloudFailed { session, error } => {
                if self.current(session, RecognitionMode::Cloud).is_some() {
                    self.fall_back(error).await;
                } else {
                    tracing::debug!(%session, "discarding stale cloud failure");
                }
                None
            }
            AdapterEvent::LocalStopped { session, reason } => {
                if self.current(session, RecognitionMode::Local).is_some() {
                    self.deactivate();
                    self.record_error(format!("local recognizer stopped: {reason}"));
                }
                None
            }
        }
    }

    fn current(
        &mut self,
        session: SessionId,
        mode: RecognitionMode,
    ) -> Option<&mut RecognitionSession> {
        self.session
            .as_mut()
            .filter(|s| s.id == session && s.mode() == mode)
    }

    async fn fall_back(&mut self, error: RecognitionError) {
        let Some(RecognitionSession {
            id,
            config,
            last_confidence,
            backend,
            ..
        }) = self.session.take()
        else {
            return;
        };

        self.set_state(SessionState::Fallback);
        backend.stop();
        tracing::warn!(session = %id, "cloud recognition failed, falling back to local: {error}");
        self.notice(format!("Switched to the local recognizer: {error}"));

        match self.start_local(id).await {
            Ok(handle) => {
                self.session = Some(RecognitionSession {
                    id,
                    config,
                    fell_back: true,
                    last_confidence,
                    backend: ActiveBackend::Local(handle),
                });
                self.console_tx.send_modify(|state| state.fell_back = true);
                self.set_state(SessionState::Running(RecognitionMode::Local));
            }
            Err(e) => tracing::error!(session = %id, "fallback to local failed: {e}"),
        }
    }

    /// On failure the session is left inactive with the error recorded.
    async fn start_local(&mut self, id: SessionId) -> Result<LocalHandle, RecognitionError> {
        match self.local.start(id, self.events_tx.clone()).await {
            Ok(handle) => Ok(handle),
            Err(e) => {
                tracing::error!(session = %id, "local recognition could not start: {e}");
                self.set_state(SessionState::Inactive);
                self.record_error(e.to_string());
                Err(e)
            }
        }
    }

    fn set_state(&mut self, state: SessionState) {
        tracing::debug!(from = %self.state, to = %state, "session state");
        self.state = state;
        self.console_tx.send_modify(|console| console.session = state);
    }

    fn record_error(&mut self, message: String) {
        self.console_tx
            .send_modify(|state| state.last_error = Some(message));
    }

    fn notice(&mut self, message: String) {
        self.console_tx.send_modify(|state| {
            state.notices.push(message.clone());
            if state.notices.len() > MAX_NOTICES {
                state.notices.remove(0);
            }
        });
        if let Some(tx) = &self.notice_tx {
            let _ = tx.send(ConsoleEvent::Notice(message));
        }
    }
}

impl Drop for RecognitionModeSelector {
    fn drop(&mut self) {
        self.deactivate();
    }
}
