use anyhow::{Context, Result};
use std::sync::Arc;
use tokio::io::{AsyncBufReadExt, BufReader};
use tokio::sync::{mpsc, watch};
use voxcam_audio::AudioLevelMonitor;
use voxcam_core::{
    CameraDescriptor, ConsoleEvent, ConsoleState, MonitorStatus, SessionCommand,
};
use voxcam_dispatch::CameraSwitcher;

const LEVEL_BAR_WIDTH: usize = 32;

pub const HELP: &str = "\
commands:
  start | on       start listening for voice commands
  stop | off       stop listening
  status           recognition state and settings
  cameras          list cameras, * marks the active one
  switch <id>      select a camera by hand
  level            current microphone level
  help             this text
  quit | q         exit";

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ConsoleCommand {
    Start,
    Stop,
    Status,
    Cameras,
    Switch(String),
    Level,
    Help,
    Quit,
}

/// Parse one input line. Blank lines yield `Ok(None)`.
pub fn parse_command(line: &str) -> Result<Option<ConsoleCommand>, String> {
    let mut words = line.split_whitespace();
    let Some(head) = words.next() else {
        return Ok(None);
    };
    let command = match head.to_lowercase().as_str() {
        "start" | "on" => ConsoleCommand::Start,
        "stop" | "off" => ConsoleCommand::Stop,
        "status" => ConsoleCommand::Status,
        "cameras" => ConsoleCommand::Cameras,
        "switch" => match words.next() {
            Some(id) => ConsoleCommand::Switch(id.to_string()),
            None => return Err("usage: switch <camera id>".to_string()),
        },
        "level" => ConsoleCommand::Level,
        "help" | "?" => ConsoleCommand::Help,
        "quit" | "q" | "exit" => ConsoleCommand::Quit,
        other => return Err(format!("unknown command '{other}', try 'help'")),
    };
    if words.next().is_some() {
        return Err(format!("too many arguments for '{head}'"));
    }
    Ok(Some(command))
}

pub fn format_event(event: &ConsoleEvent) -> String {
    match event {
        ConsoleEvent::TextRecognized {
            transcript,
            confidence,
        } => format!("heard: \"{transcript}\" ({confidence:.0}%)"),
        ConsoleEvent::CommandMatched {
            camera_id,
            camera_name,
            transcript,
            confidence,
        } => format!(
            "switched to {camera_name} [{camera_id}] on \"{transcript}\" ({confidence:.0}%)"
        ),
        ConsoleEvent::Notice(message) => format!("notice: {message}"),
    }
}

pub fn format_status(state: &ConsoleState, monitor: &MonitorStatus) -> String {
    let mut lines = vec![format!("recognition: {}", state.session)];
    if let Some(mode) = state.mode() {
        let note = if state.fell_back { ", fell back" } else { "" };
        lines.push(format!("backend: {}{note}", mode.label()));
    }
    lines.push(format!(
        "threshold: {}%, last confidence: {:.0}%",
        state.confidence_threshold, state.last_confidence
    ));
    lines.push(format!(
        "auto-switch: {}",
        if state.auto_switch_enabled { "on" } else { "off" }
    ));
    lines.push(match monitor {
        MonitorStatus::Inactive => "level meter: off".to_string(),
        MonitorStatus::Active => "level meter: on".to_string(),
        MonitorStatus::DeviceUnavailable(reason) => format!("level meter: unavailable ({reason})"),
    });
    if let Some(error) = &state.last_error {
        lines.push(format!("last error: {error}"));
    }
    lines.join("\n")
}

pub fn format_cameras(cameras: &[CameraDescriptor]) -> String {
    if cameras.is_empty() {
        return "no cameras configured".to_string();
    }
    cameras
        .iter()
        .map(|camera| {
            format!(
                "{} {:<10} {:<20} {}",
                if camera.is_active { "*" } else { " " },
                camera.id,
                camera.name,
                camera.keywords.join(", ")
            )
        })
        .collect::<Vec<_>>()
        .join("\n")
}

/// Bar for a level on the 0..=255 scale.
pub fn level_bar(level: f32) -> String {
    let filled = ((level / 255.0).clamp(0.0, 1.0) * LEVEL_BAR_WIDTH as f32).round() as usize;
    format!(
        "[{}{}] {:>3.0}",
        "#".repeat(filled),
        ".".repeat(LEVEL_BAR_WIDTH - filled),
        level
    )
}

/// Line-based operator console over stdin.
pub struct Console {
    commands: mpsc::UnboundedSender<SessionCommand>,
    state: watch::Receiver<ConsoleState>,
    monitor: AudioLevelMonitor,
    cameras: Arc<dyn CameraSwitcher>,
}

impl Console {
    pub fn new(
        commands: mpsc::UnboundedSender<SessionCommand>,
        state: watch::Receiver<ConsoleState>,
        monitor: AudioLevelMonitor,
        cameras: Arc<dyn CameraSwitcher>,
    ) -> Self {
        Self {
            commands,
            state,
            monitor,
            cameras,
        }
    }

    /// Read commands until `quit`, end of input, or Ctrl-C, printing console
    /// events as they arrive.
    pub async fn run(&mut self, mut events: mpsc::UnboundedReceiver<ConsoleEvent>) -> Result<()> {
        let mut lines = BufReader::new(tokio::io::stdin()).lines();
        println!("{HELP}");

        loop {
            tokio::select! {
                line = lines.next_line() => {
                    let Some(line) = line.context("failed to read console input")? else {
                        break;
                    };
                    match parse_command(&line) {
                        Ok(Some(ConsoleCommand::Quit)) => break,
                        Ok(Some(command)) => self.execute(command).await,
                        Ok(None) => {}
                        Err(message) => println!("{message}"),
                    }
                }
                Some(event) = events.recv() => println!("{}", format_event(&event)),
                _ = tokio::signal::ctrl_c() => break,
            }
        }
        self.stop_listening();
        Ok(())
    }

    pub async fn execute(&mut self, command: ConsoleCommand) {
        match command {
            ConsoleCommand::Start => {
                if self.commands.send(SessionCommand::Activate).is_err() {
                    println!("recognition is not running");
                    return;
                }
                if let Err(e) = self.monitor.start().await {
                    tracing::warn!("level meter could not start: {e}");
                }
                println!("listening");
            }
            ConsoleCommand::Stop => {
                self.stop_listening();
                println!("stopped");
            }
            ConsoleCommand::Status => {
                let monitor = self.monitor.status().borrow().clone();
                println!("{}", format_status(&self.state.borrow(), &monitor));
                if let Some(id) = self.cameras.active_camera_id() {
                    println!("active camera: {id}");
                }
            }
            ConsoleCommand::Cameras => println!("{}", format_cameras(&self.cameras.cameras())),
            ConsoleCommand::Switch(id) => match self.cameras.switch_to(&id).await {
                Ok(camera) => {
                    tracing::info!(camera_id = %camera.id, "camera selected by operator");
                    println!("switched to {} [{}]", camera.name, camera.id);
                }
                Err(e) => println!("{e}"),
            },
            ConsoleCommand::Level => {
                if self.monitor.is_active() {
                    println!("{}", level_bar(*self.monitor.levels().borrow()));
                } else {
                    println!("level meter is off, use 'start'");
                }
            }
            ConsoleCommand::Help => println!("{HELP}"),
            ConsoleCommand::Quit => {}
        }
    }

    fn stop_listening(&mut self) {
        let _ = self.commands.send(SessionCommand::Deactivate);
        self.monitor.stop();
    }
}
