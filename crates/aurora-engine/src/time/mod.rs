//! Frame pacing and timing.
//!
//! - `FrameScheduler` drives the render loop at a fixed target rate
//! - `FrameClock` turns clock readings into per-frame `FrameTime` for animation
//! - `Clock` abstracts the time source so pacing is testable with `ManualClock`

mod clock;
mod frame_clock;
mod scheduler;

pub use clock::{Clock, ManualClock, SystemClock};
pub use frame_clock::{FrameClock, FrameTime};
pub use scheduler::{FrameScheduler, FrameStats, SchedulerError};
