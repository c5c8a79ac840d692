use super::{Point, Size};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DragState {
    Idle,
    Dragging {
        /// Overlay anchor when the press landed.
        origin: Point,
        /// Pointer position when the press landed.
        press: Point,
    },
}

/// An always-on-top overlay positioned by its top-left anchor and moved by
/// press/move/release pointer events.
#[derive(Debug, Clone)]
pub struct DraggableOverlay {
    anchor: Point,
    size: Size,
    screen: Size,
    snap_threshold: Option<i32>,
    state: DragState,
}

impl DraggableOverlay {
    pub fn new(anchor: Point, size: Size, screen: Size, snap_threshold: Option<i32>) -> Self {
        Self {
            anchor,
            size,
            screen,
            snap_threshold,
            state: DragState::Idle,
        }
    }

    /// Flush against the right edge, vertically centred.
    pub fn right_edge(size: Size, screen: Size, snap_threshold: Option<i32>) -> Self {
        let anchor = Point::new(
            screen.width - size.width,
            screen.height / 2 - size.height / 2,
        );
        Self::new(anchor, size, screen, snap_threshold)
    }

    pub fn anchor(&self) -> Point {
        self.anchor
    }

    pub fn state(&self) -> DragState {
        self.state
    }

    pub fn center(&self) -> Point {
        Point::new(
            self.anchor.x.saturating_add(self.size.width / 2),
            self.anchor.y.saturating_add(self.size.height / 2),
        )
    }

    pub fn set_snap_threshold(&mut self, threshold: Option<i32>) {
        self.snap_threshold = threshold;
    }

    pub fn resize(&mut self, size: Size) {
        self.size = size;
    }

    pub fn press(&mut self, pointer: Point) {
        self.state = DragState::Dragging {
            origin: self.anchor,
            press: pointer,
        };
    }

    /// New anchor = anchor at press + total pointer travel since the press.
    /// Returns `None` when no press is in progress. Pointer coordinates come
    /// from the host unchecked, so the arithmetic saturates.
    pub fn drag_to(&mut self, pointer: Point) -> Option<Point> {
        let DragState::Dragging { origin, press } = self.state else {
            return None;
        };
        let travel = Point::new(
            pointer.x.saturating_sub(press.x),
            pointer.y.saturating_sub(press.y),
        );
        self.anchor = origin.offset(travel);
        Some(self.anchor)
    }

    /// Ends the drag, snapping to nearby edges when a threshold is set.
    pub fn release(&mut self) -> Point {
        let was_dragging = matches!(self.state, DragState::Dragging { .. });
        self.state = DragState::Idle;
        if was_dragging {
            if let Some(threshold) = self.snap_threshold {
                self.snap_to_edges(threshold);
            }
        }
        self.anchor
    }

    // Axes snap independently; the near (left/top) edge wins when both qualify.
    fn snap_to_edges(&mut self, threshold: i32) {
        let far_x = self.screen.width.saturating_sub(self.size.width);
        if self.anchor.x < threshold {
            self.anchor.x = 0;
        } else if far_x.saturating_sub(self.anchor.x) < threshold {
            self.anchor.x = far_x;
        }

        let far_y = self.screen.height.saturating_sub(self.size.height);
        if self.anchor.y < threshold {
            self.anchor.y = 0;
        } else if far_y.saturating_sub(self.anchor.y) < threshold {
            self.anchor.y = far_y;
        }
    }
}
