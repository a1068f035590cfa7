mod console;
mod watcher;

use anyhow::{Context, Result};
use clap::Parser;
use std::path::PathBuf;
use std::sync::Arc;
use tokio::sync::{mpsc, watch};
use tracing_subscriber::layer::SubscriberExt;
use tracing_subscriber::EnvFilter;
use voxcam_audio::{AudioLevelMonitor, CpalMicrophone, DeviceManager, EncoderSet, Microphone};
use voxcam_dispatch::{CameraRegistry, DispatchHost};
use voxcam_engine::{
    CloudChunkedRecognizer, CloudSettings, EngineRegistry, GoogleSpeechClient,
    LocalRecognitionAdapter, LocalSettings, RecognitionHost, RecognitionModeSelector,
    SpeechClient,
};

#[derive(Parser)]
#[command(name = "voxcam", about = "Voice-command camera switching console")]
struct Cli {
    /// Path to the configuration file
    #[arg(short, long, default_value = "config.toml")]
    config: PathBuf,

    /// Start listening for voice commands immediately
    #[arg(long)]
    listen: bool,

    /// Check the configured speech API key and exit
    #[arg(long)]
    validate_key: bool,

    /// List audio input devices and exit
    #[arg(long)]
    list_devices: bool,
}

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();

    if cli.list_devices {
        return list_devices();
    }

    let config = voxcam_core::AppConfig::load_from_file(&cli.config)
        .with_context(|| format!("failed to load config from {:?}", cli.config))?;

    let env_filter =
        EnvFilter::try_new(&config.general.log_level).unwrap_or_else(|_| EnvFilter::new("info"));

    let subscriber = tracing_subscriber::Registry::default().with(env_filter).with(
        tracing_subscriber::fmt::layer()
            .with_writer(std::io::stderr)
            .with_ansi(false),
    );

    tracing::subscriber::set_global_default(subscriber)
        .context("failed to set tracing subscriber")?;

    let speech_client = Arc::new(GoogleSpeechClient::new(
        &config.recognition.endpoint,
        &config.recognition.language,
    ));

    if cli.validate_key {
        let api_key = config.recognition.speech_api_key.as_deref().unwrap_or_default();
        return match speech_client.validate_key(api_key).await {
            Ok(()) => {
                println!("speech API key is valid");
                Ok(())
            }
            Err(e) => anyhow::bail!("speech API key check failed: {e}"),
        };
    }

    tracing::info!("voxcam starting");
    tracing::info!(device = %config.audio.device_name, "using input device");

    let microphone: Arc<dyn Microphone> = Arc::new(CpalMicrophone::new(&config.audio.device_name));
    let engines = Arc::new(EngineRegistry::new());
    if !engines.list_engines().contains(&config.local.engine.as_str()) {
        tracing::warn!(
            engine = %config.local.engine,
            "local engine not built in, sessions without a speech API key will not start"
        );
    }

    let local = LocalRecognitionAdapter::new(
        Arc::clone(&microphone),
        engines,
        LocalSettings::from_config(&config),
    );
    let client: Arc<dyn SpeechClient> = speech_client;
    let cloud = CloudChunkedRecognizer::new(
        Arc::clone(&microphone),
        client,
        Arc::new(EncoderSet::default()),
        CloudSettings::from_config(&config),
    );

    let (console_tx, console_rx) = mpsc::unbounded_channel();
    let (mut selector, events_rx) = RecognitionModeSelector::new(local, cloud);
    selector.set_notice_sender(console_tx.clone());
    let state_rx = selector.subscribe();

    let (config_tx, config_rx) = watch::channel(config.recognition_config());
    let mut recognition = RecognitionHost::new(selector, events_rx, config_rx);
    let result_rx = recognition
        .take_result_receiver()
        .context("recognition result receiver already taken")?;

    let cameras = Arc::new(CameraRegistry::new(config.camera.clone()));
    if cameras.is_empty() {
        tracing::warn!("no cameras configured, voice commands will never match");
    }

    let mut dispatch = DispatchHost::new(result_rx, cameras.clone(), console_tx);
    dispatch.start();
    recognition.start();

    let _watcher = match watcher::ConfigWatcher::spawn(
        &cli.config,
        config.clone(),
        config_tx,
        cameras.clone(),
    ) {
        Ok(w) => Some(w),
        Err(e) => {
            tracing::warn!("config reload disabled: {e:#}");
            None
        }
    };

    let monitor = AudioLevelMonitor::new(Arc::clone(&microphone));
    let mut console =
        console::Console::new(recognition.command_sender(), state_rx, monitor, cameras);

    if cli.listen {
        console.execute(console::ConsoleCommand::Start).await;
    }

    console.run(console_rx).await?;

    tracing::info!("shutting down");
    recognition.shutdown().await;
    // The dispatch task ends once every result sender is gone.
    drop(recognition);
    dispatch.shutdown().await;

    Ok(())
}

fn list_devices() -> Result<()> {
    let manager = DeviceManager::new();
    let default = manager.default_input_name();
    let devices = manager
        .list_input_devices()
        .context("failed to enumerate input devices")?;
    for (name, _) in devices {
        let marker = if default.as_deref() == Some(name.as_str()) {
            " (default)"
        } else {
            ""
        };
        println!("{name}{marker}");
    }
    Ok(())
}
