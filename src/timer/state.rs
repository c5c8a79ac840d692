use serde::Serialize;

#[derive(Debug, Clone, Copy, Serialize, PartialEq, Eq, Default)]
#[serde(rename_all = "camelCase")]
pub enum CountdownStatus {
    #[default]
    Idle,
    Running,
}

#[derive(Debug, Clone, Serialize, Default, PartialEq, Eq)]
#[serde(rename_all = "camelCase")]
pub struct CountdownState {
    pub status: CountdownStatus,
    pub remaining_secs: u64,
}

impl CountdownState {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn is_running(&self) -> bool {
        self.status == CountdownStatus::Running
    }

    pub fn begin(&mut self, duration_secs: u64) {
        *self = Self {
            status: CountdownStatus::Running,
            remaining_secs: duration_secs,
        };
    }

    /// One second elapsed. Returns the new remaining count, or `None` if the
    /// countdown was no longer running. Reaching zero ends it.
    pub fn tick(&mut self) -> Option<u64> {
        if !self.is_running() {
            return None;
        }
        self.remaining_secs = self.remaining_secs.saturating_sub(1);
        if self.remaining_secs == 0 {
            self.status = CountdownStatus::Idle;
        }
        Some(self.remaining_secs)
    }

    pub fn reset(&mut self) {
        *self = Self::default();
    }
}
