//! Monotonic clock abstraction.
//!
//! The state machines never read a clock themselves. Each tick is handed a
//! timestamp so the daemon can use [`std::time::Instant`] while tests and the
//! emulator drive a virtual clock.

use core::ops::Add;
use core::time::Duration;

/// Trait implemented by monotonic instant types used to drive the watchdog.
pub trait MonotonicInstant: Copy + Ord + Add<Duration, Output = Self> {
    /// Returns the saturating duration from `earlier` to `self`.
    fn saturating_duration_since(&self, earlier: Self) -> Duration;
}

#[cfg(feature = "std")]
impl MonotonicInstant for std::time::Instant {
    fn saturating_duration_since(&self, earlier: Self) -> Duration {
        std::time::Instant::saturating_duration_since(self, earlier)
    }
}
