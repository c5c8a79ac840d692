pub mod matcher;

pub use matcher::{MatchTracker, Transition};

use serde::{Deserialize, Serialize};
use std::fmt;

use crate::capture::CaptureFrame;
use crate::reticle::Point;

/// Target used when the configured string can't be parsed.
pub const FALLBACK_TARGET: Rgb = Rgb::new(13, 22, 33);

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct Rgb {
    pub r: u8,
    pub g: u8,
    pub b: u8,
}

impl Rgb {
    pub const fn new(r: u8, g: u8, b: u8) -> Self {
        Self { r, g, b }
    }

    /// Strict per-channel test: every `|observed - target|` must be below
    /// `tolerance`. A tolerance of 0 never matches.
    pub fn matches(&self, target: &Rgb, tolerance: u8) -> bool {
        self.r.abs_diff(target.r) < tolerance
            && self.g.abs_diff(target.g) < tolerance
            && self.b.abs_diff(target.b) < tolerance
    }

    /// Parses `"r,g,b"` (whitespace around parts allowed). Anything else,
    /// including out-of-range channels, yields [`FALLBACK_TARGET`].
    pub fn parse_or_default(raw: &str) -> Rgb {
        match Self::parse(raw) {
            Some(rgb) => rgb,
            None => {
                log::warn!("Unparseable target color {raw:?}; using {FALLBACK_TARGET}");
                FALLBACK_TARGET
            }
        }
    }

    pub fn parse(raw: &str) -> Option<Rgb> {
        let parts = raw
            .split(',')
            .map(|part| part.trim().parse::<u8>().ok())
            .collect::<Option<Vec<_>>>()?;
        match parts.as_slice() {
            [r, g, b] => Some(Rgb::new(*r, *g, *b)),
            _ => None,
        }
    }
}

impl fmt::Display for Rgb {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{},{},{}", self.r, self.g, self.b)
    }
}

/// Reads the pixel at `at`. Coordinates outside the frame yield `None`,
/// which callers treat as "no match".
pub fn sample(frame: &CaptureFrame, at: Point) -> Option<Rgb> {
    let (width, height) = frame.dimensions();
    if at.x < 0 || at.y < 0 || at.x as u32 >= width || at.y as u32 >= height {
        return None;
    }
    let [r, g, b, _a] = frame.image().get_pixel(at.x as u32, at.y as u32).0;
    Some(Rgb::new(r, g, b))
}
