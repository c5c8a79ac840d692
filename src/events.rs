use chrono::{DateTime, Utc};
use serde::Serialize;
use tokio::sync::mpsc;

use crate::reticle::Point;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub enum SessionStatus {
    Idle,
    Active,
    Failed,
}

/// Display updates produced on background threads. The UI thread drains them
/// through [`UiReceiver`] and applies them in order.
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(tag = "event", rename_all = "kebab-case")]
pub enum UiEvent {
    #[serde(rename_all = "camelCase")]
    SessionChanged {
        status: SessionStatus,
        session_id: Option<String>,
        reason: Option<String>,
    },
    AnalysisToggled {
        enabled: bool,
    },
    #[serde(rename_all = "camelCase")]
    CountdownStarted {
        remaining_secs: u64,
    },
    #[serde(rename_all = "camelCase")]
    CountdownTick {
        remaining_secs: u64,
    },
    CountdownHidden,
    /// Visibility of the "silence countdown alert" affordance.
    CountdownAlertActive {
        active: bool,
    },
    #[serde(rename_all = "camelCase")]
    ColorFound {
        x: i32,
        y: i32,
        found_at: DateTime<Utc>,
    },
    ReticleMoved {
        center: Point,
    },
    PanelMoved {
        anchor: Point,
    },
    OverlaysRemoved,
}

/// Sending half handed to every component that publishes display state.
/// Sends never block; events emitted after the UI has gone away are dropped.
#[derive(Debug, Clone)]
pub struct UiBridge {
    tx: mpsc::UnboundedSender<UiEvent>,
}

pub type UiReceiver = mpsc::UnboundedReceiver<UiEvent>;

impl UiBridge {
    pub fn channel() -> (UiBridge, UiReceiver) {
        let (tx, rx) = mpsc::unbounded_channel();
        (UiBridge { tx }, rx)
    }

    pub fn emit(&self, event: UiEvent) {
        if self.tx.send(event).is_err() {
            log::trace!("UI receiver closed; dropping event");
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn events_serialize_with_kebab_tags() {
        let json = serde_json::to_value(UiEvent::CountdownTick { remaining_secs: 3 }).unwrap();
        assert_eq!(json["event"], "countdown-tick");
        assert_eq!(json["remainingSecs"], 3);

        let json = serde_json::to_value(UiEvent::SessionChanged {
            status: SessionStatus::Failed,
            session_id: None,
            reason: Some("projection stopped".into()),
        })
        .unwrap();
        assert_eq!(json["event"], "session-changed");
        assert_eq!(json["status"], "failed");
    }

    #[test]
    fn emit_after_receiver_dropped_is_silent() {
        let (bridge, rx) = UiBridge::channel();
        drop(rx);
        bridge.emit(UiEvent::CountdownHidden);
    }
}
