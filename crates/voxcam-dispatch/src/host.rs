use crate::dispatcher::{DispatchOutcome, KeywordDispatcher};
use crate::gate::ConfidenceGate;
use crate::switcher::CameraSwitcher;
use std::sync::Arc;
use tokio::sync::mpsc;
use voxcam_core::{ConsoleEvent, SessionResult};

/// Consumes accepted session results: gate, notify, then dispatch.
pub struct DispatchHost {
    switcher: Arc<dyn CameraSwitcher>,
    console_tx: mpsc::UnboundedSender<ConsoleEvent>,
    result_rx: Option<mpsc::UnboundedReceiver<SessionResult>>,
    task_handle: Option<tokio::task::JoinHandle<()>>,
}

impl DispatchHost {
    pub fn new(
        result_rx: mpsc::UnboundedReceiver<SessionResult>,
        switcher: Arc<dyn CameraSwitcher>,
        console_tx: mpsc::UnboundedSender<ConsoleEvent>,
    ) -> Self {
        Self {
            switcher,
            console_tx,
            result_rx: Some(result_rx),
            task_handle: None,
        }
    }

    pub fn start(&mut self) {
        let Some(mut rx) = self.result_rx.take() else {
            tracing::warn!("dispatch host already started");
            return;
        };
        let switcher = Arc::clone(&self.switcher);
        let console_tx = self.console_tx.clone();

        let handle = tokio::spawn(async move {
            while let Some(result) = rx.recv().await {
                handle_result(result, switcher.as_ref(), &console_tx).await;
            }
            tracing::debug!("dispatch host stopped");
        });
        self.task_handle = Some(handle);
    }

    /// Waits for the result channel to close and the last result to be handled.
    pub async fn shutdown(&mut self) {
        if let Some(handle) = self.task_handle.take() {
            let _ = handle.await;
        }
    }
}

async fn handle_result(
    session_result: SessionResult,
    switcher: &dyn CameraSwitcher,
    console_tx: &mpsc::UnboundedSender<ConsoleEvent>,
) {
    let SessionResult { result, config } = session_result;
    let gate = ConfidenceGate::new(config.confidence_threshold);
    let Some(result) = gate.forward(result) else {
        return;
    };

    let _ = console_tx.send(ConsoleEvent::TextRecognized {
        transcript: result.transcript.clone(),
        confidence: result.confidence,
    });

    let dispatcher = KeywordDispatcher::new(config.auto_switch_enabled);
    match dispatcher.dispatch(&result.transcript, switcher).await {
        Ok(DispatchOutcome::Switched {
            camera_id,
            camera_name,
        }) => {
            tracing::info!(
                camera_id = %camera_id,
                confidence = result.confidence,
                transcript = %result.transcript,
                "voice command switched camera"
            );
            let _ = console_tx.send(ConsoleEvent::CommandMatched {
                camera_id,
                camera_name,
                transcript: result.transcript,
                confidence: result.confidence,
            });
        }
        Ok(DispatchOutcome::AlreadyActive { camera_id }) => {
            tracing::debug!(camera_id = %camera_id, "matched camera already active");
        }
        Ok(DispatchOutcome::NoMatch | DispatchOutcome::Disabled) => {}
        Err(e) => tracing::error!(switcher = switcher.name(), "camera switch failed: {e}"),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::switcher::CameraRegistry;
    use voxcam_core::{CameraDescriptor, RecognitionConfig, RecognitionResult};

    fn registry() -> Arc<CameraRegistry> {
        Arc::new(CameraRegistry::new(vec![
            CameraDescriptor {
                id: "cam1".to_string(),
                name: "Ipanema".to_string(),
                keywords: vec!["ipanema".to_string(), "zona sul".to_string()],
                is_active: false,
            },
            CameraDescriptor {
                id: "cam2".to_string(),
                name: "Centro".to_string(),
                keywords: vec!["centro".to_string()],
                is_active: true,
            },
        ]))
    }

    fn make_result(transcript: &str, confidence: f32, threshold: u8, auto: bool) -> SessionResult {
        SessionResult {
            result: RecognitionResult {
                transcript: transcript.to_string(),
                confidence,
            },
            config: RecognitionConfig {
                api_key: None,
                confidence_threshold: threshold,
                auto_switch_enabled: auto,
            },
        }
    }

    async fn run(results: Vec<SessionResult>, registry: Arc<CameraRegistry>) -> Vec<ConsoleEvent> {
        let (tx, rx) = mpsc::unbounded_channel();
        let (console_tx, mut console_rx) = mpsc::unbounded_channel();
        let mut host = DispatchHost::new(rx, registry, console_tx);
        host.start();
        for result in results {
            tx.send(result).unwrap();
        }
        drop(tx);

        tokio::time::timeout(std::time::Duration::from_secs(2), host.shutdown())
            .await
            .expect("shutdown timed out");
        drop(host);

        let mut events = Vec::new();
        while let Some(event) = console_rx.recv().await {
            events.push(event);
        }
        events
    }

    #[tokio::test]
    async fn test_host_switches_on_confident_match() {
        let cameras = registry();
        let events = run(
            vec![make_result("mude para ipanema", 90.0, 85, true)],
            cameras.clone(),
        )
        .await;

        assert_eq!(
            events,
            vec![
                ConsoleEvent::TextRecognized {
                    transcript: "mude para ipanema".to_string(),
                    confidence: 90.0,
                },
                ConsoleEvent::CommandMatched {
                    camera_id: "cam1".to_string(),
                    camera_name: "Ipanema".to_string(),
                    transcript: "mude para ipanema".to_string(),
                    confidence: 90.0,
                },
            ]
        );
        assert_eq!(cameras.active_camera_id().as_deref(), Some("cam1"));
    }

    #[tokio::test]
    async fn test_host_gates_low_confidence() {
        let cameras = registry();
        let events = run(
            vec![make_result("mude para ipanema", 80.0, 85, true)],
            cameras.clone(),
        )
        .await;
        assert!(events.is_empty());
        assert_eq!(cameras.active_camera_id().as_deref(), Some("cam2"));
    }

    #[tokio::test]
    async fn test_host_reports_text_without_switch_when_disabled() {
        let cameras = registry();
        let events = run(
            vec![make_result("mude para ipanema", 95.0, 85, false)],
            cameras.clone(),
        )
        .await;
        assert_eq!(events.len(), 1);
        assert!(matches!(events[0], ConsoleEvent::TextRecognized { .. }));
        assert_eq!(cameras.active_camera_id().as_deref(), Some("cam2"));
    }

    #[tokio::test]
    async fn test_host_uses_each_results_threshold() {
        let events = run(
            vec![
                make_result("bom dia", 70.0, 60, true),
                make_result("boa tarde", 70.0, 90, true),
            ],
            registry(),
        )
        .await;
        assert_eq!(
            events,
            vec![ConsoleEvent::TextRecognized {
                transcript: "bom dia".to_string(),
                confidence: 70.0,
            }]
        );
    }

    #[tokio::test]
    async fn test_host_shutdown_completes() {
        let events = run(Vec::new(), registry()).await;
        assert!(events.is_empty());
    }
}
