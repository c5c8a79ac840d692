use std::sync::{Mutex, PoisonError};
use tokio::sync::Notify;

/// Single-slot handoff between frame delivery and analysis.
///
/// Posting while a value is still pending replaces (and drops) it; there is
/// never more than one frame waiting. The consumer takes ownership, so a frame
/// is released as soon as the consumer is done with it.
#[derive(Debug)]
pub struct FrameSlot<T> {
    pending: Mutex<Option<T>>,
    notify: Notify,
}

impl<T> FrameSlot<T> {
    pub fn new() -> Self {
        Self {
            pending: Mutex::new(None),
            notify: Notify::new(),
        }
    }

    /// Returns `true` when an older pending value was dropped.
    pub fn post(&self, value: T) -> bool {
        let replaced = self
            .pending
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .replace(value)
            .is_some();
        self.notify.notify_one();
        replaced
    }

    pub fn take(&self) -> Option<T> {
        self.pending
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .take()
    }

    /// Waits for the next posted value.
    pub async fn next(&self) -> T {
        loop {
            if let Some(value) = self.take() {
                return value;
            }
            // notify_one stores a permit when nobody is waiting, so a post
            // between take() and here is not lost.
            self.notify.notified().await;
        }
    }

    pub fn clear(&self) {
        drop(self.take());
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::Arc;
    use std::time::Duration;

    #[test]
    fn newer_post_replaces_pending() {
        let slot = FrameSlot::new();
        assert!(!slot.post(1));
        assert!(slot.post(2));
        assert!(slot.post(3));

        assert_eq!(slot.take(), Some(3));
        assert_eq!(slot.take(), None);
    }

    #[tokio::test]
    async fn next_wakes_on_post() {
        let slot = Arc::new(FrameSlot::new());
        let consumer = {
            let slot = Arc::clone(&slot);
            tokio::spawn(async move { slot.next().await })
        };

        tokio::time::sleep(Duration::from_millis(10)).await;
        slot.post("frame");

        let got = tokio::time::timeout(Duration::from_secs(1), consumer)
            .await
            .unwrap()
            .unwrap();
        assert_eq!(got, "frame");
    }

    #[tokio::test]
    async fn post_before_wait_is_not_lost() {
        let slot = FrameSlot::new();
        slot.post(7);
        let got = tokio::time::timeout(Duration::from_secs(1), slot.next())
            .await
            .unwrap();
        assert_eq!(got, 7);
    }

    #[test]
    fn clear_drops_pending() {
        let slot = FrameSlot::new();
        slot.post(vec![0u8; 16]);
        slot.clear();
        assert!(slot.take().is_none());
    }
}
