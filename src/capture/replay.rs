use anyhow::{bail, Context, Result};
use std::path::{Path, PathBuf};
use std::sync::{
    atomic::{AtomicBool, Ordering},
    Arc,
};
use std::thread::{self, JoinHandle};
use std::time::Duration;

use super::{
    frame::PlaneBuffer,
    mirror::{CaptureGrant, DisplayMetrics, FrameSink, ScreenMirror},
};

// Set to true to enable verbose logging in this module
const ENABLE_LOGS: bool = true;

use crate::{log_debug, log_info, log_warn};

const IMAGE_EXTENSIONS: &[&str] = &["png", "jpg", "jpeg", "bmp"];

/// Desktop stand-in for the platform mirror: cycles through the images in a
/// directory, delivering one every `interval` from a dedicated thread.
///
/// If the directory disappears or stops yielding decodable images the
/// session is invalidated, the same way a revoked projection would be.
pub struct DirectoryMirror {
    dir: PathBuf,
    interval: Duration,
    stop_flag: Arc<AtomicBool>,
    thread: Option<JoinHandle<()>>,
}

impl DirectoryMirror {
    pub fn new(dir: impl Into<PathBuf>, interval: Duration) -> Self {
        Self {
            dir: dir.into(),
            interval,
            stop_flag: Arc::new(AtomicBool::new(false)),
            thread: None,
        }
    }
}

impl ScreenMirror for DirectoryMirror {
    fn start(
        &mut self,
        _grant: &CaptureGrant,
        display: DisplayMetrics,
        sink: FrameSink,
    ) -> Result<()> {
        if self.thread.is_some() {
            bail!("directory mirror already started");
        }
        // Fail fast on an empty or missing directory.
        let initial = list_frames(&self.dir)?;
        if initial.is_empty() {
            bail!("no images found in {}", self.dir.display());
        }
        log_info!(
            "Replaying {} frame(s) from {} for a {}x{} display",
            initial.len(),
            self.dir.display(),
            display.width,
            display.height
        );

        let dir = self.dir.clone();
        let interval = self.interval;
        let stop_flag = Arc::clone(&self.stop_flag);

        let handle = thread::Builder::new()
            .name("frame-delivery".to_string())
            .spawn(move || delivery_loop(dir, interval, stop_flag, sink))
            .context("failed to spawn frame delivery thread")?;

        self.thread = Some(handle);
        Ok(())
    }

    fn stop_delivery(&mut self) {
        self.stop_flag.store(true, Ordering::Release);
    }

    fn release(&mut self) -> Result<()> {
        self.stop_delivery();
        if let Some(handle) = self.thread.take() {
            if handle.join().is_err() {
                bail!("frame delivery thread panicked");
            }
        }
        Ok(())
    }
}

fn delivery_loop(dir: PathBuf, interval: Duration, stop_flag: Arc<AtomicBool>, sink: FrameSink) {
    while !stop_flag.load(Ordering::Acquire) && sink.is_running() {
        let frames = match list_frames(&dir) {
            Ok(frames) if !frames.is_empty() => frames,
            Ok(_) => {
                sink.invalidate(format!("{} no longer contains frames", dir.display()));
                return;
            }
            Err(err) => {
                sink.invalidate(format!("{err:#}"));
                return;
            }
        };

        for path in frames {
            if stop_flag.load(Ordering::Acquire) || !sink.is_running() {
                return;
            }
            match load_plane(&path) {
                Ok(plane) => {
                    log_debug!("Delivering {}", path.display());
                    sink.deliver(plane);
                }
                Err(err) => log_warn!("Skipping unreadable frame {}: {err:#}", path.display()),
            }
            thread::sleep(interval);
        }
    }
}

fn list_frames(dir: &Path) -> Result<Vec<PathBuf>> {
    let mut frames = Vec::new();
    for entry in std::fs::read_dir(dir)
        .with_context(|| format!("failed to read frame directory {}", dir.display()))?
    {
        let path = entry?.path();
        let is_image = path
            .extension()
            .and_then(|ext| ext.to_str())
            .map(|ext| IMAGE_EXTENSIONS.contains(&ext.to_ascii_lowercase().as_str()))
            .unwrap_or(false);
        if is_image {
            frames.push(path);
        }
    }
    frames.sort();
    Ok(frames)
}

fn load_plane(path: &Path) -> Result<PlaneBuffer> {
    let image = image::open(path)
        .with_context(|| format!("failed to decode {}", path.display()))?
        .to_rgba8();
    let (width, height) = image.dimensions();
    Ok(PlaneBuffer::packed(width, height, image.into_raw()))
}
