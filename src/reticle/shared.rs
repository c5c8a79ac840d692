use std::sync::{
    atomic::{AtomicU64, Ordering},
    Arc,
};

use super::Point;

/// A point readable from any thread with a single atomic load, so x and y
/// are never observed from two different updates.
#[derive(Debug, Clone)]
pub struct SharedPoint {
    packed: Arc<AtomicU64>,
}

impl SharedPoint {
    pub fn new(point: Point) -> Self {
        Self {
            packed: Arc::new(AtomicU64::new(pack(point))),
        }
    }

    pub fn load(&self) -> Point {
        unpack(self.packed.load(Ordering::Acquire))
    }

    pub fn store(&self, point: Point) {
        self.packed.store(pack(point), Ordering::Release);
    }
}

fn pack(point: Point) -> u64 {
    ((point.x as u32 as u64) << 32) | (point.y as u32 as u64)
}

fn unpack(packed: u64) -> Point {
    Point::new((packed >> 32) as u32 as i32, packed as u32 as i32)
}
