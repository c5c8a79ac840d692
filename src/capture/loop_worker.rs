use anyhow::Result;
use std::sync::{
    atomic::{AtomicBool, Ordering},
    Arc,
};
use std::time::Instant;
use tokio_util::sync::CancellationToken;

use super::{
    frame::{CaptureFrame, PlaneBuffer},
    mirror::{FrameSink, FrameStats},
    slot::FrameSlot,
};
use crate::reticle::{Point, SharedPoint};
use crate::sampler::{sample, MatchTracker, Rgb, Transition};

// Set to true to enable verbose logging in this module
const ENABLE_LOGS: bool = true;

use crate::{log_debug, log_error, log_info};

/// Reactions to match-state changes. Called on the analysis worker, one frame
/// at a time and in frame-arrival order.
pub trait MatchObserver: Send + Sync {
    /// First matching frame after a non-match. `at` is the frame coordinate.
    fn on_enter(&self, at: Point);

    /// Every matching frame, including the entering one.
    fn on_matched_frame(&self);

    /// First non-matching frame after a match.
    fn on_exit(&self);
}

pub struct Analyzer {
    pub target: Rgb,
    pub tolerance: u8,
    pub reticle: SharedPoint,
    pub frame_offset: Point,
    pub analysis_enabled: Arc<AtomicBool>,
    pub tracker: Arc<MatchTracker>,
    pub observer: Arc<dyn MatchObserver>,
    pub stats: Arc<FrameStats>,
}

impl Analyzer {
    /// Decodes one frame, samples the reticle pixel and applies the verdict.
    /// Returns the observed color, `None` if the reticle is off-frame.
    pub fn analyze(&self, plane: PlaneBuffer) -> Result<Option<Rgb>> {
        let started = Instant::now();
        let at = self.reticle.load().offset(self.frame_offset);

        let frame = CaptureFrame::from_plane(&plane)?;
        drop(plane);
        let (width, height) = frame.dimensions();
        let observed = sample(&frame, at);
        drop(frame);

        self.stats.analyzed.fetch_add(1, Ordering::Relaxed);

        // Analysis may have been switched off while this frame was in flight.
        if !self.analysis_enabled.load(Ordering::Acquire) {
            return Ok(observed);
        }

        let matched = observed
            .map(|rgb| rgb.matches(&self.target, self.tolerance))
            .unwrap_or(false);

        log_debug!(
            "Sampled ({}, {}) in {}x{} frame: {:?} matched={} ({}us)",
            at.x,
            at.y,
            width,
            height,
            observed,
            matched,
            started.elapsed().as_micros()
        );

        match self.tracker.observe(matched) {
            Transition::Entered => {
                log_info!("Target color {} found at ({}, {})", self.target, at.x, at.y);
                self.observer.on_enter(at);
                self.observer.on_matched_frame();
            }
            Transition::Held => self.observer.on_matched_frame(),
            Transition::Exited => {
                log_info!("Target color {} lost at ({}, {})", self.target, at.x, at.y);
                self.observer.on_exit();
            }
            Transition::Idle => {}
        }

        // A pause that landed during dispatch found nothing to silence yet;
        // undo what this frame started so the alert cannot outlive it.
        if !self.analysis_enabled.load(Ordering::Acquire) && self.tracker.is_matched() {
            log_debug!("Analysis paused mid-frame; dropping match");
            self.tracker.reset();
            self.observer.on_exit();
        }

        Ok(observed)
    }
}

/// Pulls frames from `slot` and analyzes them one at a time until cancelled.
/// A decode failure is fatal: the sink is invalidated and the loop exits.
pub async fn analysis_loop(
    slot: Arc<FrameSlot<PlaneBuffer>>,
    analyzer: Arc<Analyzer>,
    sink: FrameSink,
    cancel_token: CancellationToken,
) {
    loop {
        tokio::select! {
            plane = slot.next() => {
                let analyzer = Arc::clone(&analyzer);
                match tokio::task::spawn_blocking(move || analyzer.analyze(plane)).await {
                    Ok(Ok(_)) => {}
                    Ok(Err(err)) => {
                        log_error!("frame analysis failed: {err:#}");
                        sink.invalidate(format!("{err:#}"));
                        break;
                    }
                    Err(join_err) => {
                        log_error!("frame analysis worker panicked: {join_err}");
                        sink.invalidate(format!("analysis worker failed: {join_err}"));
                        break;
                    }
                }
            }
            _ = cancel_token.cancelled() => {
                log_info!("analysis loop shutting down");
                break;
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::test_support::{solid_plane, RecordingObserver};

    fn analyzer(target: Rgb, reticle: Point, observer: Arc<RecordingObserver>) -> Analyzer {
        Analyzer {
            target,
            tolerance: 5,
            reticle: SharedPoint::new(reticle),
            frame_offset: Point::new(0, 0),
            analysis_enabled: Arc::new(AtomicBool::new(true)),
            tracker: Arc::new(MatchTracker::new()),
            observer,
            stats: Arc::new(FrameStats::default()),
        }
    }

    #[test]
    fn match_then_mismatch_reports_enter_then_exit() {
        let observer = Arc::new(RecordingObserver::default());
        let analyzer = analyzer(Rgb::new(13, 22, 33), Point::new(0, 0), Arc::clone(&observer));

        analyzer.analyze(solid_plane(1, 1, Rgb::new(13, 22, 33))).unwrap();
        analyzer.analyze(solid_plane(1, 1, Rgb::new(14, 20, 30))).unwrap();
        analyzer.analyze(solid_plane(1, 1, Rgb::new(200, 200, 200))).unwrap();
        analyzer.analyze(solid_plane(1, 1, Rgb::new(200, 200, 200))).unwrap();

        assert_eq!(observer.calls(), vec!["enter(0,0)", "frame", "frame", "exit"]);
    }

    #[test]
    fn off_frame_reticle_counts_as_mismatch() {
        let observer = Arc::new(RecordingObserver::default());
        let analyzer = analyzer(Rgb::new(13, 22, 33), Point::new(0, 0), Arc::clone(&observer));

        analyzer.analyze(solid_plane(2, 2, Rgb::new(13, 22, 33))).unwrap();
        analyzer.reticle.store(Point::new(5, 5));
        let observed = analyzer.analyze(solid_plane(2, 2, Rgb::new(13, 22, 33))).unwrap();

        assert_eq!(observed, None);
        assert_eq!(observer.calls(), vec!["enter(0,0)", "frame", "exit"]);
    }

    #[test]
    fn frame_offset_shifts_sample_point() {
        let observer = Arc::new(RecordingObserver::default());
        let mut analyzer = analyzer(Rgb::new(13, 22, 33), Point::new(0, 0), Arc::clone(&observer));
        analyzer.frame_offset = Point::new(0, 3);

        assert_eq!(analyzer.analyze(solid_plane(1, 3, Rgb::new(13, 22, 33))).unwrap(), None);
        assert!(analyzer.analyze(solid_plane(1, 4, Rgb::new(13, 22, 33))).unwrap().is_some());
        assert_eq!(observer.calls(), vec!["enter(0,3)", "frame"]);
    }

    #[test]
    fn paused_analysis_does_not_react() {
        let observer = Arc::new(RecordingObserver::default());
        let analyzer = analyzer(Rgb::new(13, 22, 33), Point::new(0, 0), Arc::clone(&observer));
        analyzer.analysis_enabled.store(false, Ordering::Release);

        analyzer.analyze(solid_plane(1, 1, Rgb::new(13, 22, 33))).unwrap();
        assert!(observer.calls().is_empty());
    }

    /// Switches analysis off from inside the entering reaction, as a pause
    /// command racing the worker would.
    struct PauseOnEnter {
        enabled: Arc<AtomicBool>,
        calls: RecordingObserver,
    }

    impl MatchObserver for PauseOnEnter {
        fn on_enter(&self, at: Point) {
            self.enabled.store(false, Ordering::Release);
            self.calls.on_enter(at);
        }

        fn on_matched_frame(&self) {
            self.calls.on_matched_frame();
        }

        fn on_exit(&self) {
            self.calls.on_exit();
        }
    }

    #[test]
    fn pause_landing_mid_frame_unwinds_the_match() {
        let mut analyzer = analyzer(
            Rgb::new(13, 22, 33),
            Point::new(0, 0),
            Arc::new(RecordingObserver::default()),
        );
        let observer = Arc::new(PauseOnEnter {
            enabled: Arc::clone(&analyzer.analysis_enabled),
            calls: RecordingObserver::default(),
        });
        analyzer.observer = Arc::clone(&observer) as Arc<dyn MatchObserver>;

        analyzer.analyze(solid_plane(1, 1, Rgb::new(13, 22, 33))).unwrap();

        assert_eq!(observer.calls.calls(), vec!["enter(0,0)", "frame", "exit"]);
        assert!(!analyzer.tracker.is_matched());

        // Once resumed, the next match is reported afresh.
        analyzer.analysis_enabled.store(true, Ordering::Release);
        analyzer.analyze(solid_plane(1, 1, Rgb::new(13, 22, 33))).unwrap();
        assert_eq!(observer.calls.calls()[3], "enter(0,0)");
    }

    #[tokio::test]
    async fn decode_failure_invalidates_session() {
        use crate::capture::CaptureState;
        use tokio::sync::watch;

        let observer = Arc::new(RecordingObserver::default());
        let analyzer = Arc::new(analyzer(Rgb::new(13, 22, 33), Point::new(0, 0), observer));
        let slot = Arc::new(FrameSlot::new());
        let (state_tx, mut state_rx) = watch::channel(CaptureState::Active);
        let sink = FrameSink::new(
            Arc::clone(&analyzer.analysis_enabled),
            Arc::clone(&slot),
            Arc::new(state_tx),
            Arc::clone(&analyzer.stats),
        );

        let worker = tokio::spawn(analysis_loop(
            Arc::clone(&slot),
            analyzer,
            sink.clone(),
            CancellationToken::new(),
        ));

        sink.deliver(PlaneBuffer::packed(4, 4, vec![0; 3]));
        state_rx.changed().await.unwrap();

        assert!(matches!(*state_rx.borrow(), CaptureState::Failed(_)));
        worker.await.unwrap();
    }
}
