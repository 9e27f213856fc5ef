use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};
use std::time::Duration;

use thiserror::Error;

use super::{Clock, SystemClock};

#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum SchedulerError {
    #[error("target refresh rate must be at least 1 Hz")]
    ZeroRate,
}

/// Timing of one scheduler iteration.
#[derive(Debug, Copy, Clone, PartialEq, Eq)]
pub struct FrameStats {
    /// Time spent inside the render call.
    pub elapsed: Duration,
    /// Time slept afterwards to fill the budget.
    pub slept: Duration,
    pub over_budget: bool,
}

/// Fixed-rate frame loop.
///
/// Each iteration measures its own render time from its own start and sleeps
/// for whatever remains of the budget. There is no catch-up: an over-budget
/// frame simply does not sleep, and the next frame gets a fresh budget.
#[derive(Debug)]
pub struct FrameScheduler<C: Clock = SystemClock> {
    clock: C,
    budget: Duration,
    cancel: Option<Arc<AtomicBool>>,
    frames: u64,
}

impl FrameScheduler<SystemClock> {
    /// Scheduler targeting `rate_hz` frames per second on the wall clock.
    pub fn new(rate_hz: u32) -> Result<Self, SchedulerError> {
        Self::with_clock(rate_hz, SystemClock::new())
    }
}

impl<C: Clock> FrameScheduler<C> {
    pub fn with_clock(rate_hz: u32, clock: C) -> Result<Self, SchedulerError> {
        if rate_hz == 0 {
            return Err(SchedulerError::ZeroRate);
        }
        Ok(Self {
            clock,
            budget: Duration::from_nanos(1_000_000_000 / rate_hz as u64),
            cancel: None,
            frames: 0,
        })
    }

    /// Stops [`run`](Self::run) at the top of the next iteration once `flag`
    /// is set.
    pub fn with_cancel(mut self, flag: Arc<AtomicBool>) -> Self {
        self.cancel = Some(flag);
        self
    }

    pub fn budget(&self) -> Duration {
        self.budget
    }

    /// Iterations completed so far.
    pub fn frames(&self) -> u64 {
        self.frames
    }

    pub fn clock(&self) -> &C {
        &self.clock
    }

    /// Runs one frame: render, measure, sleep off the remaining budget.
    ///
    /// A render error is returned as-is and nothing is slept.
    pub fn step<E>(&mut self, render: impl FnOnce() -> Result<(), E>) -> Result<FrameStats, E> {
        let start = self.clock.now();
        render()?;
        let elapsed = self.clock.now().saturating_sub(start);
        self.frames += 1;

        log::debug!("render time: {}us", elapsed.as_micros());

        if elapsed < self.budget {
            let slept = self.budget - elapsed;
            self.clock.sleep(slept);
            Ok(FrameStats { elapsed, slept, over_budget: false })
        } else {
            log::warn!(
                "frame {} over budget: {}us > {}us",
                self.frames,
                elapsed.as_micros(),
                self.budget.as_micros()
            );
            Ok(FrameStats { elapsed, slept: Duration::ZERO, over_budget: true })
        }
    }

    /// Loops [`step`](Self::step) until `render` fails or the cancel flag is set.
    pub fn run<E>(&mut self, mut render: impl FnMut() -> Result<(), E>) -> Result<(), E> {
        loop {
            if self.is_cancelled() {
                log::info!("frame loop cancelled after {} frames", self.frames);
                return Ok(());
            }
            self.step(&mut render)?;
        }
    }

    fn is_cancelled(&self) -> bool {
        self.cancel
            .as_ref()
            .is_some_and(|flag| flag.load(Ordering::Relaxed))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::time::ManualClock;

    fn ms(v: u64) -> Duration {
        Duration::from_millis(v)
    }

    #[test]
    fn zero_rate_is_rejected() {
        assert_eq!(FrameScheduler::new(0).unwrap_err(), SchedulerError::ZeroRate);
    }

    #[test]
    fn budget_is_reciprocal_of_rate() {
        assert_eq!(FrameScheduler::new(10).unwrap().budget(), ms(100));
        assert_eq!(FrameScheduler::new(60).unwrap().budget(), Duration::from_nanos(16_666_666));
    }

    #[test]
    fn render_error_skips_sleep() {
        let clock = ManualClock::new();
        let mut s = FrameScheduler::with_clock(10, clock.clone()).unwrap();
        let err = s.step(|| Err::<(), _>("boom")).unwrap_err();
        assert_eq!(err, "boom");
        assert!(clock.sleeps().is_empty());
        assert_eq!(s.frames(), 0);
    }

    #[test]
    fn run_stops_on_first_error() {
        let clock = ManualClock::new();
        let mut s = FrameScheduler::with_clock(10, clock.clone()).unwrap();
        let mut n = 0;
        let result = s.run(|| {
            n += 1;
            if n == 3 { Err("third") } else { Ok(()) }
        });
        assert_eq!(result, Err("third"));
        assert_eq!(s.frames(), 2);
        assert_eq!(clock.sleeps(), vec![ms(100), ms(100)]);
    }

    #[test]
    fn run_honors_cancel_flag() {
        let flag = Arc::new(AtomicBool::new(false));
        let clock = ManualClock::new();
        let mut s = FrameScheduler::with_clock(10, clock)
            .unwrap()
            .with_cancel(flag.clone());

        let mut n = 0;
        let result: Result<(), ()> = s.run(|| {
            n += 1;
            if n == 2 {
                flag.store(true, Ordering::Relaxed);
            }
            Ok(())
        });
        assert_eq!(result, Ok(()));
        assert_eq!(s.frames(), 2);
    }
}
