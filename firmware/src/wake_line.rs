//! Shared wake line between the RTC alarm output and the external watchdog.
//!
//! The EXTI task owns the pin, so the last observed level is mirrored here for
//! the board adapter to sample.

#![cfg_attr(not(target_os = "none"), allow(dead_code))]

use portable_atomic::{AtomicBool, Ordering};
use qualifier_core::watchdog::{PulsePin, WakeFlag, service_interrupt};

pub struct WakeLine {
    flag: WakeFlag,
    high: AtomicBool,
}

impl WakeLine {
    pub const fn new() -> Self {
        Self {
            flag: WakeFlag::new(),
            high: AtomicBool::new(false),
        }
    }

    /// Records an edge. Rising edges pet the watchdog and wake the sequencer.
    pub fn on_edge<P>(&self, high: bool, pulse: &mut P)
    where
        P: PulsePin + ?Sized,
    {
        self.high.store(high, Ordering::Release);
        if high {
            service_interrupt(&self.flag, pulse);
        }
    }

    pub fn is_high(&self) -> bool {
        self.high.load(Ordering::Acquire)
    }

    pub fn flag(&self) -> &WakeFlag {
        &self.flag
    }
}
