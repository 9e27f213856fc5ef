use std::time::Duration;

use super::{Clock, SystemClock};

/// Frame timing snapshot.
#[derive(Debug, Copy, Clone)]
pub struct FrameTime {
    /// Time elapsed since the previous frame tick, in seconds.
    pub dt: f32,

    /// Clock reading taken at the tick.
    pub now: Duration,

    /// Monotonic frame counter.
    pub frame_index: u64,
}

/// Frame clock producing `FrameTime` snapshots for animation.
///
/// Delta time is clamped to avoid pathological values when the application is paused
/// by the debugger, minimized, or stalls.
#[derive(Debug, Clone)]
pub struct FrameClock<C: Clock = SystemClock> {
    clock: C,
    last: Duration,
    frame_index: u64,
    dt_min: Duration,
    dt_max: Duration,
}

impl FrameClock<SystemClock> {
    pub fn new() -> Self {
        Self::with_clock(SystemClock::new())
    }
}

impl Default for FrameClock<SystemClock> {
    fn default() -> Self {
        Self::new()
    }
}

impl<C: Clock> FrameClock<C> {
    /// Creates a clock over `clock` with default clamps.
    ///
    /// Clamp rationale:
    /// - minimum prevents zero-dt behavior from tight loops on some platforms
    /// - maximum prevents animation jumps after long stalls
    pub fn with_clock(clock: C) -> Self {
        let last = clock.now();
        Self {
            clock,
            last,
            frame_index: 0,
            dt_min: Duration::from_micros(100), // 0.0001s
            dt_max: Duration::from_millis(250), // 0.25s
        }
    }

    /// Replaces the delta-time clamps.
    pub fn with_clamps(mut self, dt_min: Duration, dt_max: Duration) -> Self {
        debug_assert!(dt_min <= dt_max);
        self.dt_min = dt_min;
        self.dt_max = dt_max;
        self
    }

    /// Resets the clock baseline.
    pub fn reset(&mut self) {
        self.last = self.clock.now();
    }

    /// Advances the clock and returns a new `FrameTime`.
    pub fn tick(&mut self) -> FrameTime {
        let now = self.clock.now();
        let dt = now.saturating_sub(self.last).clamp(self.dt_min, self.dt_max);
        self.last = now;

        let ft = FrameTime {
            dt: dt.as_secs_f32(),
            now,
            frame_index: self.frame_index,
        };
        self.frame_index = self.frame_index.wrapping_add(1);
        ft
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::time::ManualClock;

    #[test]
    fn tick_reports_clamped_delta_and_counts_frames() {
        let clock = ManualClock::new();
        let mut fc = FrameClock::with_clock(clock.clone());

        clock.advance(Duration::from_millis(20));
        let a = fc.tick();
        assert_eq!(a.frame_index, 0);
        assert!((a.dt - 0.020).abs() < 1e-6);

        clock.advance(Duration::from_secs(5));
        let b = fc.tick();
        assert_eq!(b.frame_index, 1);
        assert!((b.dt - 0.25).abs() < 1e-6);

        let c = fc.tick();
        assert!((c.dt - 0.0001).abs() < 1e-6);
    }
}
