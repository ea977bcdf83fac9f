//! Time source for the query timeout.

use std::time::Instant;

/// Monotonic clock consulted by the wait loop to enforce the hard timeout.
///
/// Injected so tests can drive the timeout without sleeping; see
/// `testing::ManualClock`.
pub trait Clock {
    fn now(&self) -> Instant;
}

/// The real monotonic clock.
#[derive(Debug, Clone, Copy, Default)]
pub struct SystemClock;

impl Clock for SystemClock {
    fn now(&self) -> Instant {
        Instant::now()
    }
}
