//! Monotonic time and blocking delay capabilities.
//!
//! Every wait in the control loops goes through [`DelayNs`] so tests can swap
//! in a simulated clock. [`Clock`] supplies the millisecond timestamps used by
//! the debounce logic and telemetry.

use core::ops::{Add, AddAssign};
use core::time::Duration;

pub use embedded_hal::delay::DelayNs;

/// Millisecond instant measured from boot.
#[derive(Copy, Clone, Debug, Default, Eq, PartialEq, Ord, PartialOrd, Hash)]
pub struct Instant(u64);

impl Instant {
    /// Instant at boot.
    pub const ZERO: Self = Self(0);

    /// Creates an instant from milliseconds since boot.
    #[must_use]
    pub const fn from_millis(millis: u64) -> Self {
        Self(millis)
    }

    /// Returns the milliseconds elapsed since boot.
    #[must_use]
    pub const fn as_millis(self) -> u64 {
        self.0
    }

    /// Returns the elapsed time from `earlier` to `self`, or zero when `earlier` is later.
    #[must_use]
    pub const fn saturating_duration_since(self, earlier: Self) -> Duration {
        Duration::from_millis(self.0.saturating_sub(earlier.0))
    }
}

impl Add<Duration> for Instant {
    type Output = Self;

    fn add(self, rhs: Duration) -> Self::Output {
        Self(self.0.saturating_add(duration_millis_u64(rhs)))
    }
}

impl AddAssign<Duration> for Instant {
    fn add_assign(&mut self, rhs: Duration) {
        *self = *self + rhs;
    }
}

/// Source of monotonic timestamps.
pub trait Clock {
    /// Returns the current instant.
    fn now(&self) -> Instant;
}

impl<T: Clock + ?Sized> Clock for &T {
    fn now(&self) -> Instant {
        (**self).now()
    }
}

/// Blocks for `duration`, clamping to the `u32` millisecond range of [`DelayNs`].
pub fn block_for<D: DelayNs + ?Sized>(delay: &mut D, duration: Duration) {
    if duration.is_zero() {
        return;
    }
    delay.delay_ms(duration_millis_u32(duration));
}

/// Converts a duration to whole milliseconds, saturating at `u32::MAX`.
#[must_use]
pub fn duration_millis_u32(duration: Duration) -> u32 {
    u32::try_from(duration.as_millis()).unwrap_or(u32::MAX)
}

fn duration_millis_u64(duration: Duration) -> u64 {
    u64::try_from(duration.as_millis()).unwrap_or(u64::MAX)
}

#[cfg(test)]
pub(crate) mod sim {
    //! Simulated clock shared by unit tests: delays advance virtual time.

    use super::{Clock, DelayNs, Instant};
    use core::cell::Cell;

    #[derive(Default)]
    pub struct SimClock {
        now_ns: Cell<u64>,
        slept_ns: Cell<u64>,
    }

    impl SimClock {
        pub fn new() -> Self {
            Self::default()
        }

        pub fn elapsed_ms(&self) -> u64 {
            self.now_ns.get() / 1_000_000
        }

        pub fn slept_ms(&self) -> u64 {
            self.slept_ns.get() / 1_000_000
        }

        pub fn advance_ms(&self, ms: u64) {
            self.now_ns.set(self.now_ns.get() + ms * 1_000_000);
        }
    }

    impl Clock for SimClock {
        fn now(&self) -> Instant {
            Instant::from_millis(self.elapsed_ms())
        }
    }

    impl DelayNs for &SimClock {
        fn delay_ns(&mut self, ns: u32) {
            let ns = u64::from(ns);
            self.now_ns.set(self.now_ns.get() + ns);
            self.slept_ns.set(self.slept_ns.get() + ns);
        }
    }
}
