//! Read-only status surface exposed to operators.

use core::fmt;

use crate::persist::TestRecord;
use crate::procedures::TestPlan;
use crate::sequencer::SequencerState;

/// Firmware release string reported by the `version` command.
pub const FIRMWARE_RELEASE: &str = env!("CARGO_PKG_VERSION");

/// Point-in-time view of the sequencer.
#[derive(Copy, Clone, Debug, Eq, PartialEq)]
pub struct StatusSnapshot {
    pub release: &'static str,
    pub plan: &'static str,
    pub state: SequencerState,
    pub current_index: u8,
    pub total: u8,
    pub pass_count: u8,
    pub duration_secs: u16,
    /// A timed interval has begun and not yet been verified.
    pub interval_open: bool,
    pub watchdog_wakes: u32,
}

impl StatusSnapshot {
    #[must_use]
    pub fn capture(plan: &TestPlan, record: &TestRecord, watchdog_wakes: u32) -> Self {
        Self {
            release: FIRMWARE_RELEASE,
            plan: plan.name(),
            state: SequencerState::from_index(record.current_index, plan),
            current_index: record.current_index,
            total: plan.len(),
            pass_count: record.pass_count,
            duration_secs: record.duration_secs,
            interval_open: record.interval_open(),
            watchdog_wakes,
        }
    }
}

impl fmt::Display for StatusSnapshot {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "release={} plan={} state={} index={}/{} passed={} duration={}s armed={} watchdog={}",
            self.release,
            self.plan,
            self.state,
            self.current_index,
            self.total,
            self.pass_count,
            self.duration_secs,
            if self.interval_open { "yes" } else { "no" },
            self.watchdog_wakes,
        )
    }
}
