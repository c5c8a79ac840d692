use std::time::Duration;

use crate::reticle::{Point, Size};

/// Tunables for a scan session. Values come from `Default` and may be
/// overridden through `COLORSCAN_*` environment variables.
#[derive(Debug, Clone)]
pub struct ScanConfig {
    /// Max per-channel difference (exclusive) for a pixel to count as a match.
    pub tolerance: u8,

    /// Distance from a screen edge within which a released overlay snaps to it.
    pub snap_threshold_px: i32,

    /// Also snap the crosshair on release. Off by default so it can reach
    /// pixels near the edges.
    pub reticle_snap: bool,

    /// Rendered size of the crosshair overlay.
    pub reticle_size: Size,

    /// Rendered size of the floating control panel.
    pub panel_size: Size,

    /// Added to the reticle centre to get the frame coordinate. Devices whose
    /// mirrored frame includes the status bar need its height in `y`.
    pub frame_offset: Point,

    pub tick_interval: Duration,

    /// Publish a `color-found` UI event when a match starts.
    pub broadcast_color_found: bool,

    pub debug: bool,
}

impl Default for ScanConfig {
    fn default() -> Self {
        Self {
            tolerance: 5,
            snap_threshold_px: 40,
            reticle_snap: false,
            reticle_size: Size::new(48, 48),
            panel_size: Size::new(56, 168),
            frame_offset: Point::new(0, 0),
            tick_interval: Duration::from_secs(1),
            broadcast_color_found: true,
            debug: false,
        }
    }
}

impl ScanConfig {
    pub fn from_env() -> Self {
        Self::from_lookup(|key| std::env::var(key).ok())
    }

    fn from_lookup(lookup: impl Fn(&str) -> Option<String>) -> Self {
        let mut config = Self::default();

        if let Some(tolerance) = parse_var::<u8>(&lookup, "COLORSCAN_TOLERANCE") {
            config.tolerance = tolerance;
        }
        if let Some(snap) = parse_var::<i32>(&lookup, "COLORSCAN_SNAP_PX") {
            config.snap_threshold_px = snap;
        }
        if let Some(offset_y) = parse_var::<i32>(&lookup, "COLORSCAN_FRAME_OFFSET_Y") {
            config.frame_offset.y = offset_y;
        }
        config.reticle_snap = flag_var(&lookup, "COLORSCAN_RETICLE_SNAP");
        config.debug = flag_var(&lookup, "COLORSCAN_DEBUG");

        config
    }
}

fn parse_var<T: std::str::FromStr>(
    lookup: &impl Fn(&str) -> Option<String>,
    key: &str,
) -> Option<T> {
    let raw = lookup(key)?;
    match raw.trim().parse() {
        Ok(value) => Some(value),
        Err(_) => {
            log::warn!("Ignoring {key}={raw:?}: not a valid value");
            None
        }
    }
}

fn flag_var(lookup: &impl Fn(&str) -> Option<String>, key: &str) -> bool {
    lookup(key)
        .map(|value| value == "1" || value.eq_ignore_ascii_case("true"))
        .unwrap_or(false)
}
