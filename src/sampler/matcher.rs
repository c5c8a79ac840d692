use std::sync::atomic::{AtomicBool, Ordering};

/// What a single frame's verdict means relative to the previous one.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Transition {
    /// First matching frame after a non-match.
    Entered,
    /// Matched, and was already matched.
    Held,
    /// First non-matching frame after a match.
    Exited,
    /// Not matched, and wasn't before.
    Idle,
}

/// Edge detector over per-frame match verdicts. Shared between the analysis
/// worker and the analysis toggle, hence the atomic.
#[derive(Debug, Default)]
pub struct MatchTracker {
    matched: AtomicBool,
}

impl MatchTracker {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn observe(&self, matched: bool) -> Transition {
        let was = self.matched.swap(matched, Ordering::AcqRel);
        match (was, matched) {
            (false, true) => Transition::Entered,
            (true, true) => Transition::Held,
            (true, false) => Transition::Exited,
            (false, false) => Transition::Idle,
        }
    }

    pub fn is_matched(&self) -> bool {
        self.matched.load(Ordering::Acquire)
    }

    /// Forget the current state without reporting an exit.
    pub fn reset(&self) {
        self.matched.store(false, Ordering::Release);
    }
}
