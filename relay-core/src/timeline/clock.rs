//! Wall Clocks
//!
//! The timeline anchors its logical time to a real-time reference supplied
//! by a `WallClock`. The timeline never sleeps on the clock; it only asks
//! what time it is. The host's run loop decides how to wait (an OS timer,
//! an async sleep, or a plain frame tick) using
//! [`Timeline::next_wakeup`](super::Timeline::next_wakeup).

use std::cell::Cell;
use std::rc::Rc;
use std::time::{Duration, Instant};

/// A source of monotonic real time.
pub trait WallClock {
    /// The current instant.
    fn now(&self) -> Instant;
}

/// The system's monotonic clock.
#[derive(Debug, Clone, Copy, Default)]
pub struct SystemClock;

impl SystemClock {
    /// Constructs a new `SystemClock`.
    pub fn new() -> Self {
        Self
    }
}

impl WallClock for SystemClock {
    fn now(&self) -> Instant {
        Instant::now()
    }
}

/// A clock advanced explicitly, for tests and headless batch runs.
///
/// Clones share the same offset, so a test can keep a handle while the
/// timeline owns another.
#[derive(Debug, Clone)]
pub struct ManualClock {
    base: Instant,
    offset: Rc<Cell<Duration>>,
}

impl ManualClock {
    /// A manual clock starting at the current instant.
    pub fn new() -> Self {
        Self {
            base: Instant::now(),
            offset: Rc::new(Cell::new(Duration::ZERO)),
        }
    }

    /// Advance the clock by the given duration.
    pub fn advance(&self, by: Duration) {
        self.offset.set(self.offset.get() + by);
    }
}

impl Default for ManualClock {
    fn default() -> Self {
        Self::new()
    }
}

impl WallClock for ManualClock {
    fn now(&self) -> Instant {
        self.base + self.offset.get()
    }
}
