pub mod controller;
pub mod state;

pub use controller::{parse_duration, CountdownController};
pub use state::{CountdownState, CountdownStatus};
