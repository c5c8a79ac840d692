use anyhow::Result;
use serde::{Deserialize, Serialize};
use std::sync::atomic::{AtomicU32, AtomicU8, Ordering};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub enum RingerMode {
    Silent,
    Vibrate,
    Normal,
}

impl RingerMode {
    fn to_u8(self) -> u8 {
        match self {
            RingerMode::Silent => 0,
            RingerMode::Vibrate => 1,
            RingerMode::Normal => 2,
        }
    }

    fn from_u8(value: u8) -> RingerMode {
        match value {
            0 => RingerMode::Silent,
            1 => RingerMode::Vibrate,
            _ => RingerMode::Normal,
        }
    }
}

/// Platform media-volume and ringer controls.
pub trait DeviceAudio: Send + Sync {
    fn media_volume(&self) -> Result<u32>;
    fn max_media_volume(&self) -> Result<u32>;
    fn set_media_volume(&self, volume: u32) -> Result<()>;
    fn ringer_mode(&self) -> Result<RingerMode>;
    fn set_ringer_mode(&self, mode: RingerMode) -> Result<()>;
}

/// What an alert overrode, so it can be put back.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct VolumeSnapshot {
    pub media_volume: u32,
    pub ringer_mode: RingerMode,
}

/// Records the current volume and ringer mode, then forces maximum media
/// volume and normal ringer so silent/vibrate can't mute an alert.
///
/// Once the snapshot is taken it is always returned, so a partial override
/// still gets restored.
pub fn force_audible(device: &dyn DeviceAudio) -> Result<VolumeSnapshot> {
    let snapshot = VolumeSnapshot {
        media_volume: device.media_volume()?,
        ringer_mode: device.ringer_mode()?,
    };
    let volume = device
        .max_media_volume()
        .and_then(|max| device.set_media_volume(max));
    let ringer = device.set_ringer_mode(RingerMode::Normal);
    if let Err(err) = volume.and(ringer) {
        log::warn!("Could not fully override volume for alert: {err:#}");
    }
    Ok(snapshot)
}

/// Both settings are attempted even if the first fails.
pub fn restore(device: &dyn DeviceAudio, snapshot: &VolumeSnapshot) -> Result<()> {
    let volume = device.set_media_volume(snapshot.media_volume);
    let ringer = device.set_ringer_mode(snapshot.ringer_mode);
    volume.and(ringer)
}

/// In-memory controls for hosts without a media-volume or ringer API
/// (desktop runs). Keeps the values so the override/restore cycle is still
/// observable in logs.
#[derive(Debug)]
pub struct HeadlessDevice {
    volume: AtomicU32,
    max_volume: u32,
    ringer: AtomicU8,
}

impl HeadlessDevice {
    pub fn new(volume: u32, max_volume: u32, ringer: RingerMode) -> Self {
        Self {
            volume: AtomicU32::new(volume.min(max_volume)),
            max_volume,
            ringer: AtomicU8::new(ringer.to_u8()),
        }
    }
}

impl Default for HeadlessDevice {
    fn default() -> Self {
        Self::new(7, 15, RingerMode::Normal)
    }
}

impl DeviceAudio for HeadlessDevice {
    fn media_volume(&self) -> Result<u32> {
        Ok(self.volume.load(Ordering::Acquire))
    }

    fn max_media_volume(&self) -> Result<u32> {
        Ok(self.max_volume)
    }

    fn set_media_volume(&self, volume: u32) -> Result<()> {
        self.volume
            .store(volume.min(self.max_volume), Ordering::Release);
        log::debug!("media volume -> {volume}/{}", self.max_volume);
        Ok(())
    }

    fn ringer_mode(&self) -> Result<RingerMode> {
        Ok(RingerMode::from_u8(self.ringer.load(Ordering::Acquire)))
    }

    fn set_ringer_mode(&self, mode: RingerMode) -> Result<()> {
        self.ringer.store(mode.to_u8(), Ordering::Release);
        log::debug!("ringer mode -> {mode:?}");
        Ok(())
    }
}
