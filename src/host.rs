//! Desktop runner: replays frames from a directory through a full watch
//! session, reads host commands as JSON lines on stdin and writes UI events
//! as JSON lines on stdout.

use anyhow::{Context, Result};
use clap::{ArgAction, Parser};
use serde_json::json;
use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;
use tokio::io::{AsyncBufReadExt, BufReader};

use crate::audio::{AlertPlayer, AudioBackend, DeviceAudio, HeadlessDevice, RodioEngine};
use crate::capture::{CaptureGrant, DirectoryMirror, DisplayMetrics, ScreenMirror};
use crate::commands::{dispatch, HostCommand};
use crate::config::ScanConfig;
use crate::events::{UiBridge, UiReceiver};
use crate::service::{ActivationParams, ScanService};
use crate::settings::SettingsStore;

#[derive(Parser, Debug)]
#[command(
    name = "colorscan",
    version,
    about = "Watch one screen pixel and sound an alert when it turns the target color"
)]
pub struct Cli {
    /// Directory of PNG/JPEG/BMP frames, replayed in name order
    #[arg(long)]
    pub frames: PathBuf,

    /// Delay between replayed frames
    #[arg(long, default_value_t = 200)]
    pub interval_ms: u64,

    /// Settings file (created on first save)
    #[arg(long, default_value = "colorscan-settings.json")]
    pub settings: PathBuf,

    /// Target color as r,g,b; overrides and replaces the stored one
    #[arg(long)]
    pub rgb: Option<String>,

    #[arg(long, default_value_t = 1080)]
    pub screen_width: u32,

    #[arg(long, default_value_t = 2400)]
    pub screen_height: u32,

    /// Wait for a `start` command instead of starting immediately
    #[arg(long, action = ArgAction::SetTrue)]
    pub no_autostart: bool,

    /// Debug logging (same as COLORSCAN_DEBUG=1)
    #[arg(long, action = ArgAction::SetTrue)]
    pub debug: bool,
}

impl Cli {
    fn display(&self) -> DisplayMetrics {
        DisplayMetrics {
            width: self.screen_width,
            height: self.screen_height,
            density_dpi: 160,
        }
    }
}

pub async fn run_host(cli: Cli, config: ScanConfig) -> Result<()> {
    let settings = Arc::new(SettingsStore::new(cli.settings.clone()));
    let (ui, ui_rx) = UiBridge::channel();
    let alerts = Arc::new(AlertPlayer::new(
        Arc::new(RodioEngine::new()) as Arc<dyn AudioBackend>,
        Arc::new(HeadlessDevice::default()) as Arc<dyn DeviceAudio>,
        Arc::clone(&settings),
        ui.clone(),
    ));
    let service = ScanService::new(config, Arc::clone(&settings), alerts, ui);

    tokio::spawn(print_events(ui_rx));
    tokio::spawn(log_settings_changes(Arc::clone(&settings)));

    let frames = cli.frames.clone();
    let interval = Duration::from_millis(cli.interval_ms);
    let new_mirror = move || -> Box<dyn ScreenMirror> {
        Box::new(DirectoryMirror::new(frames.clone(), interval))
    };

    if !cli.no_autostart {
        let params = ActivationParams {
            grant: CaptureGrant::approved(Vec::new()),
            display: cli.display(),
            rgb_override: cli.rgb.clone(),
        };
        service
            .start(params, new_mirror())
            .await
            .context("failed to start watch session")?;
    }

    let mut lines = BufReader::new(tokio::io::stdin()).lines();
    loop {
        tokio::select! {
            line = lines.next_line() => {
                let Some(line) = line.context("failed to read stdin")? else {
                    log::info!("stdin closed; shutting down");
                    break;
                };
                if line.trim().is_empty() {
                    continue;
                }
                let reply = match serde_json::from_str::<HostCommand>(&line) {
                    Ok(command) => match dispatch(&service, command, &new_mirror).await {
                        Ok(value) => json!({ "reply": value }),
                        Err(err) => json!({ "error": err }),
                    },
                    Err(err) => json!({ "error": format!("invalid command: {err}") }),
                };
                println!("{reply}");
            }
            _ = tokio::signal::ctrl_c() => {
                log::info!("Interrupted; shutting down");
                break;
            }
        }
    }

    if service.is_active().await {
        service.stop().await?;
    }
    Ok(())
}

async fn print_events(mut rx: UiReceiver) {
    while let Some(event) = rx.recv().await {
        match serde_json::to_string(&event) {
            Ok(line) => println!("{line}"),
            Err(err) => log::error!("Failed to serialize UI event {event:?}: {err}"),
        }
    }
}

async fn log_settings_changes(settings: Arc<SettingsStore>) {
    let mut rx = settings.subscribe();
    while rx.changed().await.is_ok() {
        let snapshot = rx.borrow_and_update().clone();
        log::info!(
            "Settings updated: target={} countdown={}s monitor={:?} countdown_audio={:?}",
            snapshot.target_rgb,
            snapshot.countdown_duration,
            snapshot.monitor_audio_path,
            snapshot.countdown_audio_path
        );
    }
}
