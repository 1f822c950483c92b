//! Frame rate governor
//!
//! Deadlines follow a fixed cadence `t0 + k * interval` so scheduling error
//! never accumulates. When an iteration overruns its slot the cadence is
//! re-anchored at the current time instead of emitting a burst of catch-up
//! frames.

use std::time::{Duration, Instant};

/// Fixed-cadence frame scheduler
#[derive(Debug, Clone)]
pub struct RateGovernor {
    interval: Duration,
    deadline: Option<Instant>,
    overruns: u64,
}

impl RateGovernor {
    /// Create a governor for `target_fps` frames per second
    pub fn new(target_fps: u32) -> Self {
        Self::with_interval(Duration::from_secs(1) / target_fps.max(1))
    }

    /// Create a governor with an explicit frame interval
    pub fn with_interval(interval: Duration) -> Self {
        Self {
            interval,
            deadline: None,
            overruns: 0,
        }
    }

    /// Deadline that follows `last_deadline` on the fixed cadence
    pub fn next_deadline(last_deadline: Instant, interval: Duration) -> Instant {
        last_deadline + interval
    }

    /// Whether a frame due at `deadline` may be emitted at `now`
    pub fn should_emit_now(now: Instant, deadline: Instant) -> bool {
        now >= deadline
    }

    /// Frame interval
    pub fn interval(&self) -> Duration {
        self.interval
    }

    /// Current deadline; `None` until the first frame is scheduled
    pub fn deadline(&self) -> Option<Instant> {
        self.deadline
    }

    /// Number of times the cadence was re-anchored after an overrun
    pub fn overruns(&self) -> u64 {
        self.overruns
    }

    /// Whether the next frame is due. The first frame is always due.
    pub fn is_due(&self, now: Instant) -> bool {
        match self.deadline {
            Some(deadline) => Self::should_emit_now(now, deadline),
            None => true,
        }
    }

    /// Time to idle before the next frame is due, `None` if it is due now
    pub fn remaining(&self, now: Instant) -> Option<Duration> {
        let deadline = self.deadline?;
        if Self::should_emit_now(now, deadline) {
            None
        } else {
            Some(deadline - now)
        }
    }

    /// Schedule the frame after the one just emitted
    ///
    /// Call once per iteration, after the work for the current frame finished
    /// at `now`. Returns the new deadline.
    pub fn schedule_next(&mut self, now: Instant) -> Instant {
        let next = match self.deadline {
            Some(deadline) => Self::next_deadline(deadline, self.interval),
            None => now + self.interval,
        };

        let next = if next < now {
            self.overruns += 1;
            now
        } else {
            next
        };

        self.deadline = Some(next);
        next
    }

    /// Block the calling thread until the next frame is due
    pub fn idle_wait(&self) {
        if let Some(wait) = self.remaining(Instant::now()) {
            std::thread::sleep(wait);
        }
    }

    /// Forget the cadence; the next frame is due immediately
    pub fn reset(&mut self) {
        self.deadline = None;
    }
}
