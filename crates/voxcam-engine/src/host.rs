use crate::selector::{AdapterEvent, RecognitionModeSelector};
use tokio::sync::{mpsc, watch};
use voxcam_core::{RecognitionConfig, SessionCommand, SessionResult};

/// Runs the selector on one task: operator commands and adapter events are
/// handled in arrival order, accepted results go out on the result channel.
pub struct RecognitionHost {
    selector: Option<RecognitionModeSelector>,
    events_rx: Option<mpsc::UnboundedReceiver<AdapterEvent>>,
    config_rx: watch::Receiver<RecognitionConfig>,
    command_tx: mpsc::UnboundedSender<SessionCommand>,
    command_rx: Option<mpsc::UnboundedReceiver<SessionCommand>>,
    result_tx: mpsc::UnboundedSender<SessionResult>,
    result_rx: Option<mpsc::UnboundedReceiver<SessionResult>>,
    task_handle: Option<tokio::task::JoinHandle<()>>,
}

impl RecognitionHost {
    pub fn new(
        selector: RecognitionModeSelector,
        events_rx: mpsc::UnboundedReceiver<AdapterEvent>,
        config_rx: watch::Receiver<RecognitionConfig>,
    ) -> Self {
        let (command_tx, command_rx) = mpsc::unbounded_channel();
        let (result_tx, result_rx) = mpsc::unbounded_channel();
        Self {
            selector: Some(selector),
            events_rx: Some(events_rx),
            config_rx,
            command_tx,
            command_rx: Some(command_rx),
            result_tx,
            result_rx: Some(result_rx),
            task_handle: None,
        }
    }

    pub fn take_result_receiver(&mut self) -> Option<mpsc::UnboundedReceiver<SessionResult>> {
        self.result_rx.take()
    }

    pub fn command_sender(&self) -> mpsc::UnboundedSender<SessionCommand> {
        self.command_tx.clone()
    }

    pub fn start(&mut self) {
        let (Some(mut selector), Some(mut events_rx), Some(mut command_rx)) = (
            self.selector.take(),
            self.events_rx.take(),
            self.command_rx.take(),
        ) else {
            tracing::warn!("recognition host already started");
            return;
        };
        let config_rx = self.config_rx.clone();
        let result_tx = self.result_tx.clone();

        let handle = tokio::spawn(async move {
            loop {
                tokio::select! {
                    command = command_rx.recv() => match command {
                        Some(SessionCommand::Activate) => {
                            // Snapshot taken per activation; later edits wait for the next one.
                            let config = config_rx.borrow().clone();
                            match selector.activate(config).await {
                                Ok(mode) => tracing::info!(%mode, "recognition running"),
                                Err(e) => tracing::error!("recognition could not start: {e}"),
                            }
                        }
                        Some(SessionCommand::Deactivate) => selector.deactivate(),
                        Some(SessionCommand::Shutdown) | None => {
                            selector.deactivate();
                            break;
                        }
                    },
                    Some(event) = events_rx.recv() => {
                        if let Some(result) = selector.handle_event(event).await {
                            let _ = result_tx.send(result);
                        }
                    }
                }
            }
            tracing::debug!("recognition host stopped");
        });
        self.task_handle = Some(handle);
    }

    pub async fn shutdown(&mut self) {
        let _ = self.command_tx.send(SessionCommand::Shutdown);
        if let Some(handle) = self.task_handle.take() {
            let _ = handle.await;
        }
    }
}
