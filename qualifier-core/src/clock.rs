//! Time and power capabilities consumed by the harness.
//!
//! The RTC driver, the low-power primitives and the sub-second system clock
//! all live outside this crate. The traits below describe the contract the
//! sequencer relies on; firmware implements them over the STM32 peripherals
//! and [`crate::sim`] implements them for the host.

use core::time::Duration;

/// RTC wall time in whole seconds since the RTC epoch.
///
/// The value `0` doubles as the "no interval in progress" sentinel in the
/// persisted record, so a live RTC is expected to report non-zero times.
#[derive(Copy, Clone, Debug, Default, Eq, PartialEq, Ord, PartialOrd, Hash)]
pub struct Timestamp(u32);

impl Timestamp {
    /// Sentinel marking that no timed interval has begun.
    pub const UNSET: Self = Self(0);

    /// Creates a timestamp from raw RTC seconds.
    #[must_use]
    pub const fn from_secs(secs: u32) -> Self {
        Self(secs)
    }

    /// Returns the raw RTC seconds.
    #[must_use]
    pub const fn as_secs(self) -> u32 {
        self.0
    }

    /// Returns `true` for the sentinel value.
    #[must_use]
    pub const fn is_unset(self) -> bool {
        self.0 == 0
    }

    /// Seconds elapsed from `earlier` to `self`, or `None` when the clock
    /// reads earlier than `earlier`.
    #[must_use]
    pub const fn checked_secs_since(self, earlier: Self) -> Option<u32> {
        self.0.checked_sub(earlier.0)
    }

    /// Advances the timestamp by `secs`, saturating at `u32::MAX`.
    #[must_use]
    pub const fn saturating_add_secs(self, secs: u32) -> Self {
        Self(self.0.saturating_add(secs))
    }
}

/// Condition that ends a stop-mode sleep early.
#[derive(Copy, Clone, Debug, Eq, PartialEq)]
pub enum WakeSource {
    /// Only the sleep timer wakes the processor.
    Timer,
    /// The sleep timer or a change on the shared wake pin.
    TimerOrPin,
}

/// Capability interface over the real-time clock.
///
/// Implementations must be polled once per scheduling tick so that the alarm
/// flag and the cached time stay current.
pub trait TimeSource {
    /// Services the RTC driver.
    fn poll(&mut self);

    /// Current wall time with one-second precision.
    fn now(&self) -> Timestamp;

    /// Schedules a one-shot alarm `after` from now. When `wake_pin` is set the
    /// alarm also drives the shared wake pin.
    fn arm_alarm(&mut self, after: Duration, wake_pin: bool);

    /// Returns `true` once the armed alarm has fired.
    fn alarm_fired(&self) -> bool;

    /// Disarms the alarm and clears its interrupt flag.
    fn clear_alarm(&mut self);
}

/// Sub-second system clock used for throttling and polling loops.
pub trait Monotonic {
    /// Time since the current boot.
    fn uptime(&self) -> Duration;

    /// Blocks for `duration` without entering a low-power mode.
    fn delay(&mut self, duration: Duration);
}

/// Low-power primitives that return within the same process lifetime.
///
/// Deep sleep and enable-pin power-down never return and are therefore not
/// part of this trait; the sequencer hands them back to the runtime as a
/// [`crate::sequencer::SuspendRequest`].
pub trait PowerControl {
    /// Enters stop mode for up to `duration`, or until `wake` fires.
    fn stop_sleep(&mut self, duration: Duration, wake: WakeSource);

    /// Samples the level of the wake pin shared by the RTC and the watchdog.
    fn wake_pin_high(&self) -> bool;
}

/// Everything the sequencer needs from the board.
pub trait Board: TimeSource + Monotonic + PowerControl {}

impl<T> Board for T where T: TimeSource + Monotonic + PowerControl {}

/// Polling deadline measured against a [`Monotonic`] clock.
#[derive(Copy, Clone, Debug, Eq, PartialEq)]
pub struct Deadline {
    expires_at: Duration,
}

impl Deadline {
    /// Creates a deadline `timeout` from the current uptime.
    pub fn after<M: Monotonic + ?Sized>(clock: &M, timeout: Duration) -> Self {
        Self {
            expires_at: clock.uptime().saturating_add(timeout),
        }
    }

    /// Returns `true` once the deadline has passed.
    pub fn expired<M: Monotonic + ?Sized>(&self, clock: &M) -> bool {
        clock.uptime() >= self.expires_at
    }

    /// Time left until expiry, zero once expired.
    pub fn remaining<M: Monotonic + ?Sized>(&self, clock: &M) -> Duration {
        self.expires_at.saturating_sub(clock.uptime())
    }
}
