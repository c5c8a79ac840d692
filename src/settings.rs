use anyhow::{Context, Result};
use serde::{Deserialize, Serialize};
use std::{
    fs,
    path::{Path, PathBuf},
    sync::{Mutex, PoisonError},
};
use tokio::sync::watch;

pub const DEFAULT_COUNTDOWN_DURATION: &str = "5";
pub const DEFAULT_TARGET_RGB: &str = "13,22,33";

/// The four persisted preferences, stored as the raw strings the user entered.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct SettingsSnapshot {
    pub monitor_audio_path: String,
    pub countdown_audio_path: String,
    pub countdown_duration: String,
    pub target_rgb: String,
}

impl Default for SettingsSnapshot {
    fn default() -> Self {
        Self {
            monitor_audio_path: String::new(),
            countdown_audio_path: String::new(),
            countdown_duration: DEFAULT_COUNTDOWN_DURATION.into(),
            target_rgb: DEFAULT_TARGET_RGB.into(),
        }
    }
}

/// JSON-file backed preferences with a synchronous snapshot read and a push
/// subscription. Writes are last-write-wins.
pub struct SettingsStore {
    path: PathBuf,
    data: watch::Sender<SettingsSnapshot>,
    write_lock: Mutex<()>,
}

impl SettingsStore {
    /// Opens the store at `path`. Defaults stand in for a file that is missing
    /// or cannot be read and parsed; the file is only written on the first save.
    pub fn new(path: PathBuf) -> Self {
        let data = if path.exists() {
            Self::load(&path)
        } else {
            SettingsSnapshot::default()
        };

        let (tx, _rx) = watch::channel(data);
        Self {
            path,
            data: tx,
            write_lock: Mutex::new(()),
        }
    }

    fn load(path: &Path) -> SettingsSnapshot {
        let contents = match fs::read_to_string(path) {
            Ok(contents) => contents,
            Err(err) => {
                log::warn!(
                    "Settings file {} is unreadable ({err}); using defaults",
                    path.display()
                );
                return SettingsSnapshot::default();
            }
        };
        serde_json::from_str(&contents).unwrap_or_else(|err| {
            log::warn!(
                "Settings file {} is malformed ({err}); using defaults",
                path.display()
            );
            SettingsSnapshot::default()
        })
    }

    /// Last-known values, for callers that don't subscribe.
    pub fn snapshot(&self) -> SettingsSnapshot {
        self.data.borrow().clone()
    }

    /// Every write is pushed to all live receivers.
    pub fn subscribe(&self) -> watch::Receiver<SettingsSnapshot> {
        self.data.subscribe()
    }

    pub fn monitor_audio_path(&self) -> String {
        self.data.borrow().monitor_audio_path.clone()
    }

    pub fn countdown_audio_path(&self) -> String {
        self.data.borrow().countdown_audio_path.clone()
    }

    pub fn countdown_duration(&self) -> String {
        self.data.borrow().countdown_duration.clone()
    }

    pub fn target_rgb(&self) -> String {
        self.data.borrow().target_rgb.clone()
    }

    pub fn save_monitor_audio_path(&self, path: impl Into<String>) -> Result<()> {
        let path = path.into();
        self.update(|s| s.monitor_audio_path = path)
    }

    pub fn save_countdown_audio_path(&self, path: impl Into<String>) -> Result<()> {
        let path = path.into();
        self.update(|s| s.countdown_audio_path = path)
    }

    pub fn save_countdown_duration(&self, duration: impl Into<String>) -> Result<()> {
        let duration = duration.into();
        self.update(|s| s.countdown_duration = duration)
    }

    pub fn save_target_rgb(&self, rgb: impl Into<String>) -> Result<()> {
        let rgb = rgb.into();
        self.update(|s| s.target_rgb = rgb)
    }

    fn update(&self, apply: impl FnOnce(&mut SettingsSnapshot)) -> Result<()> {
        let _guard = self.write_lock.lock().unwrap_or_else(PoisonError::into_inner);
        let mut next = self.snapshot();
        apply(&mut next);
        self.persist(&next)?;
        self.data.send_replace(next);
        Ok(())
    }

    fn persist(&self, data: &SettingsSnapshot) -> Result<()> {
        let serialized = serde_json::to_string_pretty(data)?;
        fs::write(&self.path, serialized)
            .with_context(|| format!("Failed to write settings to {}", self.path.display()))
    }
}
