pub mod device;
pub mod engine;

pub use device::{DeviceAudio, HeadlessDevice, RingerMode, VolumeSnapshot};
pub use engine::RodioEngine;

use anyhow::Result;
use serde::Serialize;
use std::path::Path;
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};

use crate::events::{UiBridge, UiEvent};
use crate::settings::SettingsStore;

// Set to true to enable verbose logging in this module
const ENABLE_LOGS: bool = true;

use crate::{log_debug, log_error, log_info, log_warn};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize)]
#[serde(rename_all = "camelCase")]
pub enum AlertChannel {
    /// Loops while the watched pixel matches.
    Monitor,
    /// Loops after a countdown runs out, until silenced.
    Countdown,
}

/// Looping playback of an audio file, one stream per channel.
pub trait AudioBackend: Send + Sync {
    /// Starts `path` looping on `channel`, replacing whatever it was playing.
    fn play_looping(&self, channel: AlertChannel, path: &Path) -> Result<()>;

    fn stop(&self, channel: AlertChannel) -> Result<()>;
}

/// Device volume override shared by both channels: the first channel to
/// sound takes the snapshot, the last one to stop puts it back.
#[derive(Default)]
struct VolumeHold {
    holders: usize,
    saved: Option<VolumeSnapshot>,
}

/// The two alert channels. While any of them sounds the device volume is
/// overridden; failures are logged and swallowed.
pub struct AlertPlayer {
    backend: Arc<dyn AudioBackend>,
    device: Arc<dyn DeviceAudio>,
    settings: Arc<SettingsStore>,
    ui: UiBridge,
    // Held across backend calls so start and stop on one channel never interleave.
    monitor: Mutex<bool>,
    countdown: Mutex<bool>,
    volume: Mutex<VolumeHold>,
}

impl AlertPlayer {
    pub fn new(
        backend: Arc<dyn AudioBackend>,
        device: Arc<dyn DeviceAudio>,
        settings: Arc<SettingsStore>,
        ui: UiBridge,
    ) -> Self {
        Self {
            backend,
            device,
            settings,
            ui,
            monitor: Mutex::new(false),
            countdown: Mutex::new(false),
            volume: Mutex::new(VolumeHold::default()),
        }
    }

    fn lock_channel(&self, channel: AlertChannel) -> MutexGuard<'_, bool> {
        let state = match channel {
            AlertChannel::Monitor => &self.monitor,
            AlertChannel::Countdown => &self.countdown,
        };
        state.lock().unwrap_or_else(PoisonError::into_inner)
    }

    pub fn is_playing(&self, channel: AlertChannel) -> bool {
        *self.lock_channel(channel)
    }

    /// Starts the channel's configured sound. Returns `true` only when this
    /// call started playback; a channel that is already sounding is left
    /// alone.
    pub fn start(&self, channel: AlertChannel) -> bool {
        let mut playing = self.lock_channel(channel);
        if *playing {
            log_debug!("{channel:?} alert already playing; ignoring start");
            return false;
        }

        let path = match channel {
            AlertChannel::Monitor => self.settings.monitor_audio_path(),
            AlertChannel::Countdown => self.settings.countdown_audio_path(),
        };
        if path.trim().is_empty() {
            log_warn!("No audio configured for {channel:?} alert; staying silent");
            return false;
        }

        self.hold_volume(channel);
        if let Err(err) = self.backend.play_looping(channel, Path::new(&path)) {
            log_error!("{channel:?} alert failed to start: {err:#}");
            self.release_volume(channel);
            return false;
        }
        *playing = true;

        log_info!("{channel:?} alert playing {path}");
        if channel == AlertChannel::Countdown {
            self.ui.emit(UiEvent::CountdownAlertActive { active: true });
        }
        true
    }

    /// Stops the channel if it is sounding. Returns `true` if it was.
    pub fn stop(&self, channel: AlertChannel) -> bool {
        let mut playing = self.lock_channel(channel);
        if !*playing {
            return false;
        }
        *playing = false;

        if let Err(err) = self.backend.stop(channel) {
            log_error!("Failed to stop {channel:?} alert: {err:#}");
        }
        self.release_volume(channel);

        log_info!("{channel:?} alert stopped");
        if channel == AlertChannel::Countdown {
            self.ui.emit(UiEvent::CountdownAlertActive { active: false });
        }
        true
    }

    /// Stops both channels, each attempted independently.
    pub fn release_all(&self) {
        self.stop(AlertChannel::Monitor);
        self.stop(AlertChannel::Countdown);
    }

    fn hold_volume(&self, channel: AlertChannel) {
        let mut hold = self.volume.lock().unwrap_or_else(PoisonError::into_inner);
        hold.holders += 1;
        if hold.holders > 1 {
            log_debug!("{channel:?} alert joins an existing volume override");
            return;
        }
        match device::force_audible(self.device.as_ref()) {
            Ok(snapshot) => hold.saved = Some(snapshot),
            Err(err) => log_error!("Failed to raise volume for {channel:?} alert: {err:#}"),
        }
    }

    fn release_volume(&self, channel: AlertChannel) {
        let mut hold = self.volume.lock().unwrap_or_else(PoisonError::into_inner);
        hold.holders = hold.holders.saturating_sub(1);
        if hold.holders > 0 {
            return;
        }
        if let Some(snapshot) = hold.saved.take() {
            if let Err(err) = device::restore(self.device.as_ref(), &snapshot) {
                log_error!("Failed to restore volume after {channel:?} alert: {err:#}");
            }
        }
    }
}
