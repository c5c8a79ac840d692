pub mod controller;
pub mod frame;
pub mod loop_worker;
pub mod mirror;
pub mod replay;
pub mod slot;

pub use controller::CaptureSession;
pub use frame::{CaptureFrame, PlaneBuffer};
pub use loop_worker::{Analyzer, MatchObserver};
pub use mirror::{CaptureGrant, DisplayMetrics, FrameSink, FrameStats, ScreenMirror, RESULT_OK};
pub use replay::DirectoryMirror;
pub use slot::FrameSlot;

/// Lifecycle of a capture session. `Failed` is terminal for the session; the
/// owner tears down and returns to `Idle`.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum CaptureState {
    Idle,
    Active,
    Failed(String),
}
