//! Interrupt-to-task handoff for the watchdog wake line.
//!
//! The wake pin interrupt pets the external watchdog by toggling its pulse
//! output and raises a [`WakeFlag`]. The sequencer consumes the flag once per
//! tick and reports it; nothing else touches it.

use portable_atomic::{AtomicBool, AtomicU32, Ordering};

/// Single-producer, single-consumer flag set from interrupt context.
pub struct WakeFlag {
    pending: AtomicBool,
    raised: AtomicU32,
}

impl WakeFlag {
    #[must_use]
    pub const fn new() -> Self {
        Self {
            pending: AtomicBool::new(false),
            raised: AtomicU32::new(0),
        }
    }

    /// Marks the flag. Safe to call from an interrupt handler.
    pub fn raise(&self) {
        self.raised.fetch_add(1, Ordering::Relaxed);
        self.pending.store(true, Ordering::Release);
    }

    /// Clears the flag, returning whether it was set.
    pub fn take(&self) -> bool {
        self.pending.swap(false, Ordering::AcqRel)
    }

    pub fn is_pending(&self) -> bool {
        self.pending.load(Ordering::Acquire)
    }

    /// Total number of raises since boot.
    pub fn raised_count(&self) -> u32 {
        self.raised.load(Ordering::Relaxed)
    }
}

impl Default for WakeFlag {
    fn default() -> Self {
        Self::new()
    }
}

/// Output that pets the external watchdog.
pub trait PulsePin {
    fn toggle(&mut self);
}

/// Interrupt body: pet the watchdog and hand the event to the sequencer.
pub fn service_interrupt<P>(flag: &WakeFlag, pulse: &mut P)
where
    P: PulsePin + ?Sized,
{
    pulse.toggle();
    flag.raise();
}

#[cfg(test)]
mod tests {
    use super::*;

    struct CountingPin {
        level: bool,
        toggles: u32,
    }

    impl PulsePin for CountingPin {
        fn toggle(&mut self) {
            self.level = !self.level;
            self.toggles += 1;
        }
    }

    #[test]
    fn interrupt_toggles_pulse_and_raises_flag() {
        let flag = WakeFlag::new();
        let mut pin = CountingPin {
            level: false,
            toggles: 0,
        };

        service_interrupt(&flag, &mut pin);
        service_interrupt(&flag, &mut pin);

        assert!(!pin.level);
        assert_eq!(pin.toggles, 2);
        assert_eq!(flag.raised_count(), 2);
        assert!(flag.take());
        assert!(!flag.take());
        assert!(!flag.is_pending());
    }
}
