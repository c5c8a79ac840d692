pub mod drag;
pub mod shared;

pub use drag::{DragState, DraggableOverlay};
pub use shared::SharedPoint;

use serde::{Deserialize, Serialize};

/// Screen coordinate in physical pixels. May sit slightly off-screen while an
/// overlay is being dragged.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
pub struct Point {
    pub x: i32,
    pub y: i32,
}

impl Point {
    pub const fn new(x: i32, y: i32) -> Self {
        Self { x, y }
    }

    pub fn offset(self, by: Point) -> Point {
        Point::new(self.x.saturating_add(by.x), self.y.saturating_add(by.y))
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
pub struct Size {
    pub width: i32,
    pub height: i32,
}

impl Size {
    pub const fn new(width: i32, height: i32) -> Self {
        Self { width, height }
    }
}

/// The crosshair the user parks over the pixel to watch.
///
/// Only the overlay's centre matters to the sampler; every position change is
/// published to a [`SharedPoint`] so the analysis worker can read it without
/// taking the overlay lock.
pub struct Reticle {
    overlay: DraggableOverlay,
    center: SharedPoint,
}

impl Reticle {
    /// Places the reticle so its centre sits at the centre of the screen.
    pub fn centered(screen: Size, size: Size) -> Self {
        let anchor = Point::new(
            screen.width / 2 - size.width / 2,
            screen.height / 2 - size.height / 2,
        );
        let overlay = DraggableOverlay::new(anchor, size, screen, None);
        let center = SharedPoint::new(overlay.center());
        Self { overlay, center }
    }

    pub fn with_snap(mut self, threshold: i32) -> Self {
        self.overlay.set_snap_threshold(Some(threshold));
        self
    }

    /// Read handle for the analysis worker.
    pub fn center_handle(&self) -> SharedPoint {
        self.center.clone()
    }

    pub fn center(&self) -> Point {
        self.overlay.center()
    }

    pub fn anchor(&self) -> Point {
        self.overlay.anchor()
    }

    pub fn press(&mut self, pointer: Point) {
        self.overlay.press(pointer);
    }

    /// Returns the new centre when the drag moved the reticle.
    pub fn drag_to(&mut self, pointer: Point) -> Option<Point> {
        self.overlay.drag_to(pointer)?;
        Some(self.publish())
    }

    pub fn release(&mut self) -> Point {
        self.overlay.release();
        self.publish()
    }

    /// Layout reported a different rendered size.
    pub fn resize(&mut self, size: Size) -> Point {
        self.overlay.resize(size);
        self.publish()
    }

    fn publish(&self) -> Point {
        let center = self.overlay.center();
        self.center.store(center);
        center
    }
}
