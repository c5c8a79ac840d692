use anyhow::Result;
use serde::{Deserialize, Serialize};
use std::sync::{
    atomic::{AtomicBool, AtomicU64, Ordering},
    Arc,
};
use tokio::sync::watch;

use super::{frame::PlaneBuffer, slot::FrameSlot, CaptureState};
use crate::error::ScanError;

/// Result code the platform attaches to an approved screen-recording request.
pub const RESULT_OK: i32 = -1;

/// Opaque screen-recording grant handed over by the hosting process.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CaptureGrant {
    pub result_code: i32,
    pub data: Option<Vec<u8>>,
}

impl CaptureGrant {
    pub fn approved(data: Vec<u8>) -> Self {
        Self {
            result_code: RESULT_OK,
            data: Some(data),
        }
    }

    pub fn validate(&self) -> Result<(), ScanError> {
        if self.result_code != RESULT_OK {
            return Err(ScanError::PermissionDenied(format!(
                "screen capture refused (result code {})",
                self.result_code
            )));
        }
        if self.data.is_none() {
            return Err(ScanError::PermissionDenied(
                "screen capture grant carries no payload".into(),
            ));
        }
        Ok(())
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct DisplayMetrics {
    pub width: u32,
    pub height: u32,
    pub density_dpi: u32,
}

/// Platform screen-mirroring binding.
///
/// Implementations deliver frames from their own thread at whatever cadence
/// the platform produces them, and call [`FrameSink::invalidate`] if the
/// underlying handle is revoked.
pub trait ScreenMirror: Send {
    fn start(
        &mut self,
        grant: &CaptureGrant,
        display: DisplayMetrics,
        sink: FrameSink,
    ) -> Result<()>;

    /// Stop producing frames. Must be safe to call more than once.
    fn stop_delivery(&mut self);

    /// Release the virtual display, reader, and projection.
    fn release(&mut self) -> Result<()>;
}

#[derive(Debug, Default)]
pub struct FrameStats {
    pub delivered: AtomicU64,
    pub discarded_paused: AtomicU64,
    pub superseded: AtomicU64,
    pub analyzed: AtomicU64,
}

impl FrameStats {
    pub fn summary(&self) -> String {
        format!(
            "delivered={} paused={} superseded={} analyzed={}",
            self.delivered.load(Ordering::Relaxed),
            self.discarded_paused.load(Ordering::Relaxed),
            self.superseded.load(Ordering::Relaxed),
            self.analyzed.load(Ordering::Relaxed),
        )
    }
}

struct SinkShared {
    running: AtomicBool,
    analysis_enabled: Arc<AtomicBool>,
    slot: Arc<FrameSlot<PlaneBuffer>>,
    state: Arc<watch::Sender<CaptureState>>,
    stats: Arc<FrameStats>,
}

/// Where a [`ScreenMirror`] pushes frames. Cheap to clone.
#[derive(Clone)]
pub struct FrameSink {
    shared: Arc<SinkShared>,
}

impl FrameSink {
    pub(crate) fn new(
        analysis_enabled: Arc<AtomicBool>,
        slot: Arc<FrameSlot<PlaneBuffer>>,
        state: Arc<watch::Sender<CaptureState>>,
        stats: Arc<FrameStats>,
    ) -> Self {
        Self {
            shared: Arc::new(SinkShared {
                running: AtomicBool::new(true),
                analysis_enabled,
                slot,
                state,
                stats,
            }),
        }
    }

    /// Hands a frame to the analysis worker. Paused or stopped sessions drop
    /// it on the spot; a frame still waiting for the worker is replaced.
    pub fn deliver(&self, plane: PlaneBuffer) {
        let shared = &self.shared;
        if !shared.running.load(Ordering::Acquire) {
            return;
        }
        shared.stats.delivered.fetch_add(1, Ordering::Relaxed);

        if !shared.analysis_enabled.load(Ordering::Acquire) {
            shared.stats.discarded_paused.fetch_add(1, Ordering::Relaxed);
            return;
        }

        if shared.slot.post(plane) {
            shared.stats.superseded.fetch_add(1, Ordering::Relaxed);
        }
    }

    /// The platform handle is gone (permission revoked, display reconfigured).
    /// Moves the session to `Failed`; there is no retry.
    pub fn invalidate(&self, reason: impl Into<String>) {
        let reason = reason.into();
        self.shared.running.store(false, Ordering::Release);
        self.shared.slot.clear();
        self.shared.state.send_if_modified(|state| {
            if matches!(state, CaptureState::Active) {
                *state = CaptureState::Failed(reason.clone());
                true
            } else {
                false
            }
        });
    }

    pub fn is_running(&self) -> bool {
        self.shared.running.load(Ordering::Acquire)
    }

    pub(crate) fn close(&self) {
        self.shared.running.store(false, Ordering::Release);
        self.shared.slot.clear();
    }
}
