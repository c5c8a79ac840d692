//! Fakes for the platform seams, shared by the unit tests.

use anyhow::{bail, Result};
use image::{Rgba, RgbaImage};
use std::path::Path;
use std::sync::{
    atomic::{AtomicBool, Ordering},
    Arc, Mutex,
};
use tempfile::TempDir;

use crate::audio::{AlertChannel, AlertPlayer, AudioBackend, HeadlessDevice, RingerMode};
use crate::capture::{
    CaptureFrame, CaptureGrant, DisplayMetrics, FrameSink, MatchObserver, PlaneBuffer,
    ScreenMirror,
};
use crate::events::{UiBridge, UiReceiver};
use crate::reticle::Point;
use crate::sampler::Rgb;
use crate::settings::SettingsStore;

pub fn solid_frame(width: u32, height: u32, rgb: Rgb) -> CaptureFrame {
    CaptureFrame::new(RgbaImage::from_pixel(
        width,
        height,
        Rgba([rgb.r, rgb.g, rgb.b, 255]),
    ))
}

pub fn solid_plane(width: u32, height: u32, rgb: Rgb) -> PlaneBuffer {
    let image = RgbaImage::from_pixel(width, height, Rgba([rgb.r, rgb.g, rgb.b, 255]));
    PlaneBuffer::packed(width, height, image.into_raw())
}

#[derive(Default)]
pub struct RecordingObserver {
    calls: Mutex<Vec<String>>,
}

impl RecordingObserver {
    pub fn calls(&self) -> Vec<String> {
        self.calls.lock().unwrap().clone()
    }
}

impl MatchObserver for RecordingObserver {
    fn on_enter(&self, at: Point) {
        self.calls.lock().unwrap().push(format!("enter({},{})", at.x, at.y));
    }

    fn on_matched_frame(&self) {
        self.calls.lock().unwrap().push("frame".into());
    }

    fn on_exit(&self) {
        self.calls.lock().unwrap().push("exit".into());
    }
}

#[derive(Default)]
struct MirrorShared {
    started: AtomicBool,
    delivery_stopped: AtomicBool,
    released: AtomicBool,
    sink: Mutex<Option<FrameSink>>,
}

/// A mirror that delivers nothing by itself; tests push frames through the
/// paired [`MirrorRemote`].
pub struct ScriptedMirror {
    shared: Arc<MirrorShared>,
    fail_start: bool,
    fail_release: bool,
}

#[derive(Clone)]
pub struct MirrorRemote {
    shared: Arc<MirrorShared>,
}

impl ScriptedMirror {
    pub fn new() -> (ScriptedMirror, MirrorRemote) {
        Self::build(false, false)
    }

    pub fn failing_start() -> (ScriptedMirror, MirrorRemote) {
        Self::build(true, false)
    }

    /// Releases its resources but reports an error doing so.
    pub fn failing_release() -> (ScriptedMirror, MirrorRemote) {
        Self::build(false, true)
    }

    fn build(fail_start: bool, fail_release: bool) -> (ScriptedMirror, MirrorRemote) {
        let shared = Arc::new(MirrorShared::default());
        let remote = MirrorRemote {
            shared: Arc::clone(&shared),
        };
        let mirror = ScriptedMirror {
            shared,
            fail_start,
            fail_release,
        };
        (mirror, remote)
    }
}

impl ScreenMirror for ScriptedMirror {
    fn start(
        &mut self,
        _grant: &CaptureGrant,
        _display: DisplayMetrics,
        sink: FrameSink,
    ) -> Result<()> {
        if self.fail_start {
            bail!("virtual display could not be created");
        }
        self.shared.started.store(true, Ordering::SeqCst);
        *self.shared.sink.lock().unwrap() = Some(sink);
        Ok(())
    }

    fn stop_delivery(&mut self) {
        self.shared.delivery_stopped.store(true, Ordering::SeqCst);
    }

    fn release(&mut self) -> Result<()> {
        self.shared.released.store(true, Ordering::SeqCst);
        self.shared.sink.lock().unwrap().take();
        if self.fail_release {
            bail!("virtual display was already gone");
        }
        Ok(())
    }
}

impl MirrorRemote {
    pub fn started(&self) -> bool {
        self.shared.started.load(Ordering::SeqCst)
    }

    pub fn delivery_stopped(&self) -> bool {
        self.shared.delivery_stopped.load(Ordering::SeqCst)
    }

    pub fn released(&self) -> bool {
        self.shared.released.load(Ordering::SeqCst)
    }

    /// Pushes a frame the way the platform callback would.
    pub fn deliver(&self, plane: PlaneBuffer) {
        if let Some(sink) = self.shared.sink.lock().unwrap().as_ref() {
            sink.deliver(plane);
        }
    }

    pub fn invalidate(&self, reason: &str) {
        if let Some(sink) = self.shared.sink.lock().unwrap().as_ref() {
            sink.invalidate(reason);
        }
    }
}

#[derive(Default)]
pub struct FakeBackend {
    plays: Mutex<Vec<AlertChannel>>,
    active: Mutex<Vec<AlertChannel>>,
    fail_next: AtomicBool,
}

impl FakeBackend {
    pub fn plays(&self, channel: AlertChannel) -> usize {
        self.plays.lock().unwrap().iter().filter(|c| **c == channel).count()
    }

    pub fn active(&self) -> Vec<AlertChannel> {
        self.active.lock().unwrap().clone()
    }

    pub fn fail_next_play(&self) {
        self.fail_next.store(true, Ordering::SeqCst);
    }
}

impl AudioBackend for FakeBackend {
    fn play_looping(&self, channel: AlertChannel, _path: &Path) -> Result<()> {
        if self.fail_next.swap(false, Ordering::SeqCst) {
            bail!("unsupported audio format");
        }
        self.plays.lock().unwrap().push(channel);
        let mut active = self.active.lock().unwrap();
        if !active.contains(&channel) {
            active.push(channel);
        }
        Ok(())
    }

    fn stop(&self, channel: AlertChannel) -> Result<()> {
        self.active.lock().unwrap().retain(|c| *c != channel);
        Ok(())
    }
}

pub struct AudioFixture {
    pub player: Arc<AlertPlayer>,
    pub backend: Arc<FakeBackend>,
    pub device: Arc<HeadlessDevice>,
    pub settings: Arc<SettingsStore>,
    pub bridge: UiBridge,
    pub ui: UiReceiver,
    pub dir: TempDir,
}

/// Alert player over fakes. The device starts quiet (volume 4/15, silent) so
/// the override is observable.
pub fn audio_fixture(monitor_path: &str, countdown_path: &str) -> AudioFixture {
    let dir = TempDir::new().unwrap();
    let settings = Arc::new(SettingsStore::new(dir.path().join("settings.json")));
    settings.save_monitor_audio_path(monitor_path).unwrap();
    settings.save_countdown_audio_path(countdown_path).unwrap();

    let backend = Arc::new(FakeBackend::default());
    let device = Arc::new(HeadlessDevice::new(4, 15, RingerMode::Silent));
    let (bridge, ui) = UiBridge::channel();
    let player = Arc::new(AlertPlayer::new(
        Arc::clone(&backend) as Arc<dyn AudioBackend>,
        Arc::clone(&device) as Arc<dyn crate::audio::DeviceAudio>,
        Arc::clone(&settings),
        bridge.clone(),
    ));

    AudioFixture {
        player,
        backend,
        device,
        settings,
        bridge,
        ui,
        dir,
    }
}
