use anyhow::{anyhow, Result};
use chrono::Utc;
use serde::{Deserialize, Serialize};
use std::sync::{
    atomic::{AtomicBool, Ordering},
    Arc, Weak,
};
use tokio::sync::{watch, Mutex};
use uuid::Uuid;

use crate::audio::{AlertChannel, AlertPlayer};
use crate::capture::{
    Analyzer, CaptureGrant, CaptureSession, CaptureState, DisplayMetrics, FrameStats,
    MatchObserver, ScreenMirror,
};
use crate::config::ScanConfig;
use crate::error::ScanError;
use crate::events::{SessionStatus, UiBridge, UiEvent};
use crate::reticle::{DraggableOverlay, Point, Reticle, Size};
use crate::sampler::{MatchTracker, Rgb};
use crate::settings::SettingsStore;
use crate::timer::{parse_duration, CountdownController, CountdownState};

// Set to true to enable verbose logging in this module
const ENABLE_LOGS: bool = true;

use crate::{log_error, log_info, log_warn};

/// What the hosting screen hands over when the user starts watching.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ActivationParams {
    pub grant: CaptureGrant,
    pub display: DisplayMetrics,
    /// Target color entered on the launching screen, `"r,g,b"`. Persisted
    /// before use when present.
    #[serde(default)]
    pub rgb_override: Option<String>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub enum OverlayKind {
    Reticle,
    Panel,
}

#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ServiceSnapshot {
    pub status: SessionStatus,
    pub session_id: Option<String>,
    pub target: Option<Rgb>,
    pub analysis_enabled: bool,
    pub matched: bool,
    pub reticle_center: Option<Point>,
    pub panel_anchor: Option<Point>,
    pub countdown: CountdownState,
    pub monitor_alert: bool,
    pub countdown_alert: bool,
}

/// Alert side effects of match transitions.
struct AlertReactions {
    alerts: Arc<AlertPlayer>,
    countdown: CountdownController,
    ui: UiBridge,
    broadcast_color_found: bool,
}

impl MatchObserver for AlertReactions {
    fn on_enter(&self, at: Point) {
        self.alerts.start(AlertChannel::Monitor);
        if self.broadcast_color_found {
            self.ui.emit(UiEvent::ColorFound {
                x: at.x,
                y: at.y,
                found_at: Utc::now(),
            });
        }
    }

    fn on_matched_frame(&self) {
        // The watched condition is already met; a pending reminder is moot.
        self.countdown.cancel();
        self.alerts.stop(AlertChannel::Countdown);
    }

    fn on_exit(&self) {
        self.alerts.stop(AlertChannel::Monitor);
    }
}

struct ActiveSession {
    id: String,
    target: Rgb,
    capture: CaptureSession,
    countdown: CountdownController,
    reticle: Reticle,
    panel: DraggableOverlay,
    analysis_enabled: Arc<AtomicBool>,
    tracker: Arc<MatchTracker>,
}

struct ServiceInner {
    config: ScanConfig,
    settings: Arc<SettingsStore>,
    alerts: Arc<AlertPlayer>,
    ui: UiBridge,
    session: Mutex<Option<ActiveSession>>,
}

/// Owns at most one watch session and everything that lives for its
/// duration: capture, overlays, countdown, and the alert reactions.
#[derive(Clone)]
pub struct ScanService {
    inner: Arc<ServiceInner>,
}

impl ScanService {
    pub fn new(
        config: ScanConfig,
        settings: Arc<SettingsStore>,
        alerts: Arc<AlertPlayer>,
        ui: UiBridge,
    ) -> Self {
        Self {
            inner: Arc::new(ServiceInner {
                config,
                settings,
                alerts,
                ui,
                session: Mutex::new(None),
            }),
        }
    }

    pub fn settings(&self) -> &Arc<SettingsStore> {
        &self.inner.settings
    }

    pub async fn is_active(&self) -> bool {
        self.inner.session.lock().await.is_some()
    }

    /// Starts a session and returns its id. Must run inside a tokio runtime.
    pub async fn start(
        &self,
        params: ActivationParams,
        mirror: Box<dyn ScreenMirror>,
    ) -> Result<String> {
        let inner = &self.inner;
        let mut guard = inner.session.lock().await;
        if guard.is_some() {
            return Err(ScanError::AlreadyActive.into());
        }

        if let Some(rgb) = params.rgb_override.as_deref() {
            if let Err(err) = inner.settings.save_target_rgb(rgb) {
                log_warn!("Could not persist target color {rgb:?}: {err:#}");
            }
        }
        let target = match params.rgb_override.as_deref() {
            Some(rgb) => Rgb::parse_or_default(rgb),
            None => Rgb::parse_or_default(&inner.settings.target_rgb()),
        };

        let display = params.display;
        let screen = Size::new(display.width as i32, display.height as i32);
        let mut reticle = Reticle::centered(screen, inner.config.reticle_size);
        if inner.config.reticle_snap {
            reticle = reticle.with_snap(inner.config.snap_threshold_px);
        }
        let panel = DraggableOverlay::right_edge(
            inner.config.panel_size,
            screen,
            Some(inner.config.snap_threshold_px),
        );

        let analysis_enabled = Arc::new(AtomicBool::new(true));
        let tracker = Arc::new(MatchTracker::new());
        let countdown = CountdownController::new(
            Arc::clone(&inner.alerts),
            inner.ui.clone(),
            inner.config.tick_interval,
        );

        let analyzer = Analyzer {
            target,
            tolerance: inner.config.tolerance,
            reticle: reticle.center_handle(),
            frame_offset: inner.config.frame_offset,
            analysis_enabled: Arc::clone(&analysis_enabled),
            tracker: Arc::clone(&tracker),
            observer: Arc::new(AlertReactions {
                alerts: Arc::clone(&inner.alerts),
                countdown: countdown.clone(),
                ui: inner.ui.clone(),
                broadcast_color_found: inner.config.broadcast_color_found,
            }),
            stats: Arc::new(FrameStats::default()),
        };

        let mut capture = CaptureSession::new();
        let state_rx = capture.subscribe();
        if let Err(err) = capture.start(mirror, &params.grant, display, analyzer) {
            countdown.shutdown();
            let status = match capture.state() {
                CaptureState::Failed(_) => SessionStatus::Failed,
                _ => SessionStatus::Idle,
            };
            log_error!("Capture session did not start: {err:#}");
            inner.ui.emit(UiEvent::SessionChanged {
                status,
                session_id: None,
                reason: Some(format!("{err:#}")),
            });
            return Err(err);
        }

        let id = Uuid::new_v4().to_string();
        log_info!("Session {id} watching for {target}");

        inner.ui.emit(UiEvent::SessionChanged {
            status: SessionStatus::Active,
            session_id: Some(id.clone()),
            reason: None,
        });
        inner.ui.emit(UiEvent::ReticleMoved {
            center: reticle.center(),
        });
        inner.ui.emit(UiEvent::PanelMoved {
            anchor: panel.anchor(),
        });

        tokio::spawn(supervise(Arc::downgrade(&self.inner), id.clone(), state_rx));

        *guard = Some(ActiveSession {
            id: id.clone(),
            target,
            capture,
            countdown,
            reticle,
            panel,
            analysis_enabled,
            tracker,
        });
        Ok(id)
    }

    /// Tears the running session down.
    pub async fn stop(&self) -> Result<()> {
        match teardown(&self.inner, None, None).await? {
            true => Ok(()),
            false => Err(ScanError::NotActive.into()),
        }
    }

    pub async fn set_analysis(&self, enabled: bool) -> Result<bool> {
        let guard = self.inner.session.lock().await;
        let session = guard.as_ref().ok_or(ScanError::NotActive)?;

        session.analysis_enabled.store(enabled, Ordering::Release);
        if !enabled {
            self.inner.alerts.stop(AlertChannel::Monitor);
            session.tracker.reset();
        }
        log_info!("Analysis {}", if enabled { "enabled" } else { "paused" });
        self.inner.ui.emit(UiEvent::AnalysisToggled { enabled });
        Ok(enabled)
    }

    pub async fn toggle_analysis(&self) -> Result<bool> {
        let enabled = {
            let guard = self.inner.session.lock().await;
            let session = guard.as_ref().ok_or(ScanError::NotActive)?;
            session.analysis_enabled.load(Ordering::Acquire)
        };
        self.set_analysis(!enabled).await
    }

    /// Starts a countdown for the stored duration. `Ok(false)` if one is
    /// already running.
    pub async fn start_countdown(&self) -> Result<bool> {
        let guard = self.inner.session.lock().await;
        let session = guard.as_ref().ok_or(ScanError::NotActive)?;
        let secs = parse_duration(&self.inner.settings.countdown_duration());
        session.countdown.start(secs)
    }

    pub async fn cancel_countdown(&self) -> Result<bool> {
        let guard = self.inner.session.lock().await;
        let session = guard.as_ref().ok_or(ScanError::NotActive)?;
        Ok(session.countdown.cancel())
    }

    /// Starts a countdown when idle, cancels it when running. Returns whether
    /// a countdown is running afterwards.
    pub async fn toggle_countdown(&self) -> Result<bool> {
        let running = {
            let guard = self.inner.session.lock().await;
            let session = guard.as_ref().ok_or(ScanError::NotActive)?;
            session.countdown.is_running()
        };
        if running {
            self.cancel_countdown().await?;
            Ok(false)
        } else {
            self.start_countdown().await
        }
    }

    /// The "stop" affordance shown while the countdown alert rings.
    pub fn stop_countdown_alert(&self) -> bool {
        self.inner.alerts.stop(AlertChannel::Countdown)
    }

    pub async fn press_overlay(&self, kind: OverlayKind, pointer: Point) -> Result<()> {
        let mut guard = self.inner.session.lock().await;
        let session = guard.as_mut().ok_or(ScanError::NotActive)?;
        match kind {
            OverlayKind::Reticle => session.reticle.press(pointer),
            OverlayKind::Panel => session.panel.press(pointer),
        }
        Ok(())
    }

    /// Returns the overlay's new position (reticle centre or panel anchor),
    /// or `None` if no drag was in progress.
    pub async fn drag_overlay(
        &self,
        kind: OverlayKind,
        pointer: Point,
    ) -> Result<Option<Point>> {
        let mut guard = self.inner.session.lock().await;
        let session = guard.as_mut().ok_or(ScanError::NotActive)?;
        let moved = match kind {
            OverlayKind::Reticle => session.reticle.drag_to(pointer),
            OverlayKind::Panel => session.panel.drag_to(pointer),
        };
        if let Some(position) = moved {
            self.publish_overlay(kind, position);
        }
        Ok(moved)
    }

    pub async fn release_overlay(&self, kind: OverlayKind) -> Result<Point> {
        let mut guard = self.inner.session.lock().await;
        let session = guard.as_mut().ok_or(ScanError::NotActive)?;
        let position = match kind {
            OverlayKind::Reticle => session.reticle.release(),
            OverlayKind::Panel => session.panel.release(),
        };
        self.publish_overlay(kind, position);
        Ok(position)
    }

    /// Layout reported a different rendered size. The anchor stays put; the
    /// reticle's sample point follows its new centre.
    pub async fn resize_overlay(&self, kind: OverlayKind, size: Size) -> Result<Point> {
        if size.width <= 0 || size.height <= 0 {
            return Err(anyhow!(
                "overlay size must be positive, got {}x{}",
                size.width,
                size.height
            ));
        }
        let mut guard = self.inner.session.lock().await;
        let session = guard.as_mut().ok_or(ScanError::NotActive)?;
        let position = match kind {
            OverlayKind::Reticle => session.reticle.resize(size),
            OverlayKind::Panel => {
                session.panel.resize(size);
                session.panel.anchor()
            }
        };
        self.publish_overlay(kind, position);
        Ok(position)
    }

    fn publish_overlay(&self, kind: OverlayKind, position: Point) {
        let event = match kind {
            OverlayKind::Reticle => UiEvent::ReticleMoved { center: position },
            OverlayKind::Panel => UiEvent::PanelMoved { anchor: position },
        };
        self.inner.ui.emit(event);
    }

    pub async fn snapshot(&self) -> ServiceSnapshot {
        let guard = self.inner.session.lock().await;
        let alerts = &self.inner.alerts;
        let mut snapshot = ServiceSnapshot {
            status: SessionStatus::Idle,
            session_id: None,
            target: None,
            analysis_enabled: false,
            matched: false,
            reticle_center: None,
            panel_anchor: None,
            countdown: CountdownState::default(),
            monitor_alert: alerts.is_playing(AlertChannel::Monitor),
            countdown_alert: alerts.is_playing(AlertChannel::Countdown),
        };
        if let Some(session) = guard.as_ref() {
            snapshot.status = match session.capture.state() {
                CaptureState::Failed(_) => SessionStatus::Failed,
                _ => SessionStatus::Active,
            };
            snapshot.session_id = Some(session.id.clone());
            snapshot.target = Some(session.target);
            snapshot.analysis_enabled = session.analysis_enabled.load(Ordering::Acquire);
            snapshot.matched = session.tracker.is_matched();
            snapshot.reticle_center = Some(session.reticle.center());
            snapshot.panel_anchor = Some(session.panel.anchor());
            snapshot.countdown = session.countdown.snapshot();
        }
        snapshot
    }
}

/// Watches one session's capture state and tears it down if the platform
/// invalidates it.
async fn supervise(
    inner: Weak<ServiceInner>,
    session_id: String,
    mut state_rx: watch::Receiver<CaptureState>,
) {
    while state_rx.changed().await.is_ok() {
        let state = state_rx.borrow_and_update().clone();
        if let CaptureState::Failed(reason) = state {
            log_warn!(
                "Session {session_id}: {}",
                ScanError::CaptureLost(reason.clone())
            );
            let Some(inner) = inner.upgrade() else {
                return;
            };
            if let Err(err) = teardown(&inner, Some(&session_id), Some(reason)).await {
                log_error!("Teardown after capture loss was incomplete: {err:#}");
            }
            return;
        }
    }
}

/// Runs every teardown step even if earlier ones fail. Returns `Ok(false)` if
/// there was nothing to tear down (or the session is no longer the one the
/// caller meant).
async fn teardown(
    inner: &ServiceInner,
    expected_id: Option<&str>,
    reason: Option<String>,
) -> Result<bool> {
    let mut guard = inner.session.lock().await;
    let matches = match (guard.as_ref(), expected_id) {
        (None, _) => false,
        (Some(session), Some(id)) => session.id == id,
        (Some(_), None) => true,
    };
    if !matches {
        return Ok(false);
    }
    let Some(mut session) = guard.take() else {
        return Ok(false);
    };

    let mut failures: Vec<String> = Vec::new();

    if let Err(err) = session.capture.stop_delivery().await {
        log_error!("Failed to stop frame delivery: {err:#}");
        failures.push(format!("stop delivery: {err:#}"));
    }

    session.countdown.shutdown();

    inner.alerts.release_all();

    inner.ui.emit(UiEvent::OverlaysRemoved);

    if let Err(err) = session.capture.release().await {
        log_error!("Failed to release capture resources: {err:#}");
        failures.push(format!("release capture: {err:#}"));
    }

    if let Some(reason) = reason.as_ref() {
        inner.ui.emit(UiEvent::SessionChanged {
            status: SessionStatus::Failed,
            session_id: Some(session.id.clone()),
            reason: Some(reason.clone()),
        });
    }
    inner.ui.emit(UiEvent::SessionChanged {
        status: SessionStatus::Idle,
        session_id: Some(session.id.clone()),
        reason: None,
    });
    log_info!("Session {} stopped", session.id);

    if failures.is_empty() {
        Ok(true)
    } else {
        Err(anyhow!("teardown incomplete: {}", failures.join("; ")))
    }
}
