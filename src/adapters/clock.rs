//! Monotonic clock adapter.
//!
//! Implements [`ClockPort`] over `std::time::Instant`.  Times are
//! milliseconds since the adapter was created.

use std::time::Instant;

use crate::app::ports::ClockPort;

pub struct MonotonicClock {
    start: Instant,
}

impl Default for MonotonicClock {
    fn default() -> Self {
        Self::new()
    }
}

impl MonotonicClock {
    pub fn new() -> Self {
        Self {
            start: Instant::now(),
        }
    }

    /// Seconds since start (monotonic).
    pub fn uptime_secs(&self) -> u64 {
        self.start.elapsed().as_secs()
    }
}

impl ClockPort for MonotonicClock {
    fn now_ms(&self) -> u64 {
        self.start.elapsed().as_millis() as u64
    }
}
