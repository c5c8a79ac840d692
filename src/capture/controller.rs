use anyhow::{Context, Result};
use log::{info, warn};
use std::sync::Arc;
use tokio::sync::watch;
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;

use super::{
    loop_worker::{analysis_loop, Analyzer},
    mirror::{CaptureGrant, DisplayMetrics, FrameSink, FrameStats, ScreenMirror},
    slot::FrameSlot,
    CaptureState,
};
use crate::error::ScanError;

/// Owns the platform mirror and the analysis worker for one capture session.
pub struct CaptureSession {
    state: Arc<watch::Sender<CaptureState>>,
    mirror: Option<Box<dyn ScreenMirror>>,
    sink: Option<FrameSink>,
    worker: Option<JoinHandle<()>>,
    cancel_token: Option<CancellationToken>,
    stats: Option<Arc<FrameStats>>,
}

impl CaptureSession {
    pub fn new() -> Self {
        let (tx, _rx) = watch::channel(CaptureState::Idle);
        Self {
            state: Arc::new(tx),
            mirror: None,
            sink: None,
            worker: None,
            cancel_token: None,
            stats: None,
        }
    }

    pub fn state(&self) -> CaptureState {
        self.state.borrow().clone()
    }

    pub fn subscribe(&self) -> watch::Receiver<CaptureState> {
        self.state.subscribe()
    }

    /// Validates the grant, starts the mirror and spawns the analysis worker.
    ///
    /// A refused grant leaves the session `Idle`. A mirror that fails to start
    /// leaves it `Failed`.
    pub fn start(
        &mut self,
        mut mirror: Box<dyn ScreenMirror>,
        grant: &CaptureGrant,
        display: DisplayMetrics,
        analyzer: Analyzer,
    ) -> Result<()> {
        if self.mirror.is_some() {
            return Err(ScanError::AlreadyActive.into());
        }
        grant.validate()?;

        let slot = Arc::new(FrameSlot::new());
        let stats = Arc::clone(&analyzer.stats);
        let sink = FrameSink::new(
            Arc::clone(&analyzer.analysis_enabled),
            Arc::clone(&slot),
            Arc::clone(&self.state),
            Arc::clone(&stats),
        );

        self.state.send_replace(CaptureState::Active);

        if let Err(err) = mirror.start(grant, display, sink.clone()) {
            sink.close();
            if let Err(release_err) = mirror.release() {
                warn!("Releasing mirror after failed start also failed: {release_err:#}");
            }
            self.state
                .send_replace(CaptureState::Failed(format!("{err:#}")));
            return Err(err).context("screen mirror failed to start");
        }

        let cancel_token = CancellationToken::new();
        let handle = tokio::spawn(analysis_loop(
            slot,
            Arc::new(analyzer),
            sink.clone(),
            cancel_token.clone(),
        ));

        info!(
            "Capture started at {}x{} ({} dpi)",
            display.width, display.height, display.density_dpi
        );

        self.mirror = Some(mirror);
        self.sink = Some(sink);
        self.worker = Some(handle);
        self.cancel_token = Some(cancel_token);
        self.stats = Some(stats);
        Ok(())
    }

    /// Stops frame intake and waits for the worker to exit. A frame already
    /// being analyzed is allowed to finish.
    pub async fn stop_delivery(&mut self) -> Result<()> {
        if let Some(sink) = &self.sink {
            sink.close();
        }
        if let Some(mirror) = self.mirror.as_mut() {
            mirror.stop_delivery();
        }
        if let Some(token) = self.cancel_token.take() {
            token.cancel();
        }

        if let Some(handle) = self.worker.take() {
            handle
                .await
                .context("analysis worker failed to join")?;
        }
        Ok(())
    }

    /// Releases the platform capture resources and returns to `Idle`. The
    /// mirror may block while its delivery thread winds down, so it is
    /// released off the async workers.
    pub async fn release(&mut self) -> Result<()> {
        self.sink = None;
        if let Some(stats) = self.stats.take() {
            info!("Capture finished: {}", stats.summary());
        }
        let result = match self.mirror.take() {
            Some(mut mirror) => tokio::task::spawn_blocking(move || mirror.release())
                .await
                .context("mirror release task failed")
                .and_then(|released| released),
            None => Ok(()),
        };
        self.state.send_replace(CaptureState::Idle);
        result
    }
}

impl Default for CaptureSession {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::reticle::{Point, SharedPoint};
    use crate::sampler::{MatchTracker, Rgb};
    use crate::test_support::{RecordingObserver, ScriptedMirror};
    use std::sync::atomic::AtomicBool;

    fn analyzer() -> Analyzer {
        Analyzer {
            target: Rgb::new(13, 22, 33),
            tolerance: 5,
            reticle: SharedPoint::new(Point::new(0, 0)),
            frame_offset: Point::new(0, 0),
            analysis_enabled: Arc::new(AtomicBool::new(true)),
            tracker: Arc::new(MatchTracker::new()),
            observer: Arc::new(RecordingObserver::default()),
            stats: Arc::new(FrameStats::default()),
        }
    }

    fn display() -> DisplayMetrics {
        DisplayMetrics {
            width: 1,
            height: 1,
            density_dpi: 160,
        }
    }

    #[tokio::test]
    async fn refused_grant_leaves_session_idle() {
        let (mirror, remote) = ScriptedMirror::new();
        let mut session = CaptureSession::new();

        let grant = CaptureGrant {
            result_code: 0,
            data: None,
        };
        assert!(session
            .start(Box::new(mirror), &grant, display(), analyzer())
            .is_err());

        assert_eq!(session.state(), CaptureState::Idle);
        assert!(!remote.started());
    }

    #[tokio::test]
    async fn start_stop_release_lifecycle() {
        let (mirror, remote) = ScriptedMirror::new();
        let mut session = CaptureSession::new();

        session
            .start(
                Box::new(mirror),
                &CaptureGrant::approved(vec![1]),
                display(),
                analyzer(),
            )
            .unwrap();
        assert_eq!(session.state(), CaptureState::Active);
        assert!(remote.started());

        let (second, _second_remote) = ScriptedMirror::new();
        let err = session
            .start(
                Box::new(second),
                &CaptureGrant::approved(vec![1]),
                display(),
                analyzer(),
            )
            .unwrap_err();
        assert!(matches!(
            err.downcast_ref::<ScanError>(),
            Some(ScanError::AlreadyActive)
        ));

        session.stop_delivery().await.unwrap();
        assert!(remote.delivery_stopped());
        session.release().await.unwrap();
        assert!(remote.released());
        assert_eq!(session.state(), CaptureState::Idle);
    }

    #[tokio::test]
    async fn failed_release_still_returns_to_idle() {
        let (mirror, remote) = ScriptedMirror::failing_release();
        let mut session = CaptureSession::new();
        session
            .start(
                Box::new(mirror),
                &CaptureGrant::approved(vec![1]),
                display(),
                analyzer(),
            )
            .unwrap();

        session.stop_delivery().await.unwrap();
        assert!(session.release().await.is_err());
        assert!(remote.released());
        assert_eq!(session.state(), CaptureState::Idle);

        // Nothing left to release.
        session.release().await.unwrap();
    }

    #[tokio::test]
    async fn mirror_start_failure_marks_failed() {
        let (mirror, remote) = ScriptedMirror::failing_start();
        let mut session = CaptureSession::new();

        let result = session.start(
            Box::new(mirror),
            &CaptureGrant::approved(vec![1]),
            display(),
            analyzer(),
        );

        assert!(result.is_err());
        assert!(matches!(session.state(), CaptureState::Failed(_)));
        assert!(remote.released());
    }
}
