/// Failure kinds surfaced by a scan session.
///
/// None of these are retried. Permission problems stop the dependent feature
/// from starting, resource failures end the session, playback failures only
/// silence the affected alert.
#[derive(Debug, thiserror::Error)]
pub enum ScanError {
    #[error("permission denied: {0}")]
    PermissionDenied(String),

    #[error("capture source lost: {0}")]
    CaptureLost(String),

    #[error("frame decode failed: {0}")]
    Decode(String),

    #[error("alert playback failed: {0}")]
    Playback(String),

    #[error("a capture session is already active")]
    AlreadyActive,

    #[error("no capture session is active")]
    NotActive,
}
