//! Test catalog, plans and the procedure dispatcher.
//!
//! Every qualification test is one of three shapes:
//!
//! - synchronous: sleep in stop mode and verify the elapsed time in the same
//!   call ([`stop`]);
//! - polling: arm the RTC alarm and wait for it with a deadline ([`alarm`]);
//! - arm-then-suspend: persist the interval start, hand a suspend request to
//!   the runtime and verify on the next boot ([`suspend`]).

use core::fmt;
use core::time::Duration;

use crate::bench::TestBench;
use crate::clock::{Board, Timestamp};
use crate::config::HarnessConfig;
use crate::elapsed::ElapsedTimeVerifier;
use crate::notify::NotificationSink;
use crate::persist::PersistentRegion;

pub mod alarm;
pub mod stop;
pub mod suspend;

/// Longest plan the sequencer accepts.
pub const MAX_PLAN_LEN: usize = 16;

/// Identifier for each qualification test.
#[derive(Copy, Clone, Debug, Eq, PartialEq, Hash)]
pub enum TestId {
    StopSleep,
    RtcAlarm,
    InterruptWake,
    DeepSleep,
    PowerOff,
}

impl TestId {
    /// Catalog index for this test.
    #[must_use]
    pub const fn as_index(self) -> usize {
        match self {
            TestId::StopSleep => 0,
            TestId::RtcAlarm => 1,
            TestId::InterruptWake => 2,
            TestId::DeepSleep => 3,
            TestId::PowerOff => 4,
        }
    }

    #[must_use]
    pub const fn from_index(index: usize) -> Option<Self> {
        match index {
            0 => Some(TestId::StopSleep),
            1 => Some(TestId::RtcAlarm),
            2 => Some(TestId::InterruptWake),
            3 => Some(TestId::DeepSleep),
            4 => Some(TestId::PowerOff),
            _ => None,
        }
    }

    #[must_use]
    pub fn descriptor(self) -> &'static TestDescriptor {
        &ALL_TESTS[self.as_index()]
    }

    #[must_use]
    pub fn name(self) -> &'static str {
        self.descriptor().name
    }
}

impl fmt::Display for TestId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}

/// Control-flow shape of a test.
#[derive(Copy, Clone, Debug, Eq, PartialEq)]
pub enum ProcedureKind {
    /// Completes within one tick.
    Synchronous,
    /// Completes within one tick after a bounded polling loop.
    Polling,
    /// Suspends the processor and completes on the next boot.
    ArmThenSuspend,
}

/// Static metadata for a test.
#[derive(Copy, Clone, Debug, Eq, PartialEq)]
pub struct TestDescriptor {
    pub id: TestId,
    pub name: &'static str,
    pub kind: ProcedureKind,
    pub summary: &'static str,
}

/// All tests, indexed by [`TestId::as_index`].
pub static ALL_TESTS: [TestDescriptor; 5] = [
    TestDescriptor {
        id: TestId::StopSleep,
        name: "stop-sleep",
        kind: ProcedureKind::Synchronous,
        summary: "stop mode with timer wake",
    },
    TestDescriptor {
        id: TestId::RtcAlarm,
        name: "rtc-alarm",
        kind: ProcedureKind::Polling,
        summary: "RTC alarm flag and wake pin",
    },
    TestDescriptor {
        id: TestId::InterruptWake,
        name: "interrupt-wake",
        kind: ProcedureKind::Synchronous,
        summary: "stop mode with wake-pin interrupt",
    },
    TestDescriptor {
        id: TestId::DeepSleep,
        name: "deep-sleep",
        kind: ProcedureKind::ArmThenSuspend,
        summary: "deep sleep and reboot on alarm",
    },
    TestDescriptor {
        id: TestId::PowerOff,
        name: "power-off",
        kind: ProcedureKind::ArmThenSuspend,
        summary: "enable-pin power-off and restart",
    },
];

/// Reasons a custom plan is rejected.
#[derive(Copy, Clone, Debug, Eq, PartialEq)]
pub enum PlanError {
    Empty,
    TooLong { len: usize },
    Duplicate(TestId),
}

impl fmt::Display for PlanError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            PlanError::Empty => f.write_str("plan has no tests"),
            PlanError::TooLong { len } => {
                write!(f, "plan has {len} tests, limit is {MAX_PLAN_LEN}")
            }
            PlanError::Duplicate(id) => write!(f, "plan lists {id} more than once"),
        }
    }
}

/// Ordered list of tests run by the sequencer. Positions are 1-based.
#[derive(Copy, Clone, Debug, Eq, PartialEq)]
pub struct TestPlan {
    name: &'static str,
    tests: &'static [TestId],
}

impl TestPlan {
    /// Every test, in the order the board is qualified.
    pub const FULL: Self = Self {
        name: "full",
        tests: &[
            TestId::StopSleep,
            TestId::RtcAlarm,
            TestId::InterruptWake,
            TestId::DeepSleep,
            TestId::PowerOff,
        ],
    };

    /// Sleep-mode tests only, for boards without the enable-pin wiring.
    pub const STOP_MODE: Self = Self {
        name: "stop-mode",
        tests: &[TestId::StopSleep, TestId::InterruptWake, TestId::DeepSleep],
    };

    /// Validates a custom plan.
    pub fn new(name: &'static str, tests: &'static [TestId]) -> Result<Self, PlanError> {
        if tests.is_empty() {
            return Err(PlanError::Empty);
        }
        if tests.len() > MAX_PLAN_LEN {
            return Err(PlanError::TooLong { len: tests.len() });
        }
        for (position, id) in tests.iter().enumerate() {
            if tests[..position].contains(id) {
                return Err(PlanError::Duplicate(*id));
            }
        }

        Ok(Self { name, tests })
    }

    /// Looks up a built-in plan by name.
    #[must_use]
    pub fn named(name: &str) -> Option<Self> {
        [Self::FULL, Self::STOP_MODE]
            .into_iter()
            .find(|plan| plan.name.eq_ignore_ascii_case(name))
    }

    #[must_use]
    pub const fn name(&self) -> &'static str {
        self.name
    }

    #[must_use]
    pub const fn tests(&self) -> &'static [TestId] {
        self.tests
    }

    /// Number of tests, which never exceeds [`MAX_PLAN_LEN`].
    #[must_use]
    pub fn len(&self) -> u8 {
        u8::try_from(self.tests.len()).unwrap_or(u8::MAX)
    }

    #[must_use]
    pub const fn is_empty(&self) -> bool {
        self.tests.is_empty()
    }

    /// Test at 1-based `position`.
    #[must_use]
    pub fn at(&self, position: u8) -> Option<TestId> {
        usize::from(position)
            .checked_sub(1)
            .and_then(|index| self.tests.get(index))
            .copied()
    }
}

impl Default for TestPlan {
    fn default() -> Self {
        Self::FULL
    }
}

/// How the runtime gives up process continuity.
#[derive(Copy, Clone, Debug, Eq, PartialEq)]
pub enum SuspendMode {
    /// Deep sleep; the alarm reboots the processor.
    DeepSleep,
    /// Power removed through the enable pin; the alarm restores it.
    PowerOff,
}

impl fmt::Display for SuspendMode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            SuspendMode::DeepSleep => f.write_str("deep sleep"),
            SuspendMode::PowerOff => f.write_str("power off"),
        }
    }
}

/// Irreversible action the runtime must perform after the tick returns.
#[derive(Copy, Clone, Debug, Eq, PartialEq)]
pub struct SuspendRequest {
    pub mode: SuspendMode,
    /// Time until the armed alarm restarts the processor.
    pub wake_after: Duration,
}

/// Result of running a procedure for one tick.
#[derive(Copy, Clone, Debug, Eq, PartialEq)]
pub enum ProcedureOutcome {
    Completed { passed: bool },
    Suspend(SuspendRequest),
}

impl ProcedureOutcome {
    pub(crate) const FAILED: Self = Self::Completed { passed: false };

    pub(crate) const fn completed(passed: bool) -> Self {
        Self::Completed { passed }
    }
}

/// Inputs shared by every procedure.
#[derive(Copy, Clone, Debug)]
pub struct TestContext<'c> {
    pub config: &'c HarnessConfig,
    pub verifier: ElapsedTimeVerifier,
    pub duration_secs: u16,
    /// RTC time read right after the tick polled the board, before any
    /// notification was published.
    pub woke_at: Timestamp,
}

impl TestContext<'_> {
    /// Target duration of the timed interval.
    #[must_use]
    pub fn target(&self) -> Duration {
        Duration::from_secs(u64::from(self.duration_secs))
    }

    #[must_use]
    pub fn target_secs(&self) -> u32 {
        u32::from(self.duration_secs)
    }
}

/// Runs one tick of `test`.
pub fn run<B, R, S>(
    test: TestId,
    bench: &mut TestBench<B, R, S>,
    context: &TestContext<'_>,
) -> ProcedureOutcome
where
    B: Board,
    R: PersistentRegion,
    S: NotificationSink,
{
    match test {
        TestId::StopSleep => stop::stop_sleep(bench, context),
        TestId::RtcAlarm => alarm::rtc_alarm(bench, context),
        TestId::InterruptWake => stop::interrupt_wake(bench, context),
        TestId::DeepSleep => suspend::arm_then_suspend(SuspendMode::DeepSleep, bench, context),
        TestId::PowerOff => suspend::arm_then_suspend(SuspendMode::PowerOff, bench, context),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    static DUPLICATED: [TestId; 3] = [TestId::StopSleep, TestId::RtcAlarm, TestId::StopSleep];
    static CUSTOM: [TestId; 2] = [TestId::RtcAlarm, TestId::StopSleep];

    #[test]
    fn catalog_indices_round_trip() {
        for descriptor in &ALL_TESTS {
            let index = descriptor.id.as_index();
            assert_eq!(TestId::from_index(index), Some(descriptor.id));
            assert_eq!(descriptor.id.descriptor(), descriptor);
        }
        assert_eq!(TestId::from_index(ALL_TESTS.len()), None);
    }

    #[test]
    fn plan_positions_are_one_based() {
        let plan = TestPlan::FULL;
        assert_eq!(plan.len(), 5);
        assert_eq!(plan.at(0), None);
        assert_eq!(plan.at(1), Some(TestId::StopSleep));
        assert_eq!(plan.at(5), Some(TestId::PowerOff));
        assert_eq!(plan.at(6), None);
    }

    #[test]
    fn custom_plans_are_validated() {
        assert_eq!(TestPlan::new("none", &[]), Err(PlanError::Empty));
        assert_eq!(
            TestPlan::new("dup", &DUPLICATED),
            Err(PlanError::Duplicate(TestId::StopSleep))
        );
        let plan = TestPlan::new("custom", &CUSTOM).expect("valid plan");
        assert_eq!(plan.at(1), Some(TestId::RtcAlarm));
    }

    #[test]
    fn built_in_plans_resolve_by_name() {
        assert_eq!(TestPlan::named("FULL"), Some(TestPlan::FULL));
        assert_eq!(TestPlan::named("stop-mode"), Some(TestPlan::STOP_MODE));
        assert_eq!(TestPlan::named("other"), None);
    }
}
