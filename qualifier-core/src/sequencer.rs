//! Test sequencer: the persisted state machine that drives a qualification run.
//!
//! The state is derived entirely from the persisted current index:
//!
//! ```text
//! 0            Idle       announce the suite, advance to 1
//! 1..=len      Test(n)    run the procedure, record the verdict, advance
//! len + 1      Reporting  publish the tally, reset to 0
//! ```
//!
//! A test that must give up process continuity returns
//! [`TickOutcome::Suspend`] without advancing. The runtime performs the
//! suspend, and the next [`TestSequencer::boot`] finds the same index with the
//! interval still open and resumes the test.

use core::fmt;

use crate::bench::TestBench;
use crate::clock::{Board, Timestamp};
use crate::config::{self, ConfigError, HarnessConfig};
use crate::elapsed::ElapsedTimeVerifier;
use crate::notify::{NotificationSink, Publisher, Topic};
use crate::persist::{LayoutStatus, PersistentRegion, RecordStore, TestRecord};
use crate::procedures::{self, ProcedureKind, ProcedureOutcome, TestContext, TestId, TestPlan};
use crate::status::StatusSnapshot;
use crate::watchdog::WakeFlag;

pub use crate::procedures::{SuspendMode, SuspendRequest};

/// State derived from the persisted current index.
#[derive(Copy, Clone, Debug, Eq, PartialEq)]
pub enum SequencerState {
    Idle,
    Testing { position: u8, test: TestId },
    Reporting,
}

impl SequencerState {
    /// Maps `index` onto `plan`. Indices past the reporting slot read as idle.
    #[must_use]
    pub fn from_index(index: u8, plan: &TestPlan) -> Self {
        if index == 0 {
            return SequencerState::Idle;
        }
        match plan.at(index) {
            Some(test) => SequencerState::Testing {
                position: index,
                test,
            },
            None if index == plan.len().saturating_add(1) => SequencerState::Reporting,
            None => SequencerState::Idle,
        }
    }
}

impl fmt::Display for SequencerState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            SequencerState::Idle => f.write_str("idle"),
            SequencerState::Testing { position, test } => write!(f, "test {position} ({test})"),
            SequencerState::Reporting => f.write_str("reporting"),
        }
    }
}

/// Passed tests out of the plan length.
#[derive(Copy, Clone, Debug, Eq, PartialEq)]
pub struct Tally {
    pub passed: u8,
    pub total: u8,
}

impl fmt::Display for Tally {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{} of {} passed", self.passed, self.total)
    }
}

/// What a single tick did.
#[derive(Copy, Clone, Debug, Eq, PartialEq)]
pub enum TickOutcome {
    /// The suite was announced and the first test is next.
    Started,
    /// A test completed.
    Verdict { test: TestId, passed: bool },
    /// The tally was published and the record reset.
    Reported(Tally),
    /// The runtime must perform `SuspendRequest` now; the sequencer is done
    /// for this boot.
    Suspend(SuspendRequest),
}

/// Facts established while booting.
#[derive(Copy, Clone, Debug, Eq, PartialEq)]
pub struct BootReport {
    /// Record as loaded, after clamping.
    pub record: TestRecord,
    /// Test whose interval was open at boot.
    pub resumed: Option<TestId>,
    /// The persisted index was out of range and reset to 0.
    pub clamped: bool,
    /// The region held no record in the current layout and was initialized.
    pub layout_reset: bool,
    /// An open interval belonging to no suspending test was discarded.
    pub stale_interval: bool,
}

/// Drives the plan one tick at a time over a board, a persistent region and a
/// notification sink.
pub struct TestSequencer<'w, B, R, S> {
    bench: TestBench<B, R, S>,
    plan: TestPlan,
    config: HarnessConfig,
    verifier: ElapsedTimeVerifier,
    watchdog: &'w WakeFlag,
    record: TestRecord,
    boot: BootReport,
}

impl<'w, B, R, S> TestSequencer<'w, B, R, S>
where
    B: Board,
    R: PersistentRegion,
    S: NotificationSink,
{
    /// Builds the sequencer from persisted state at process start.
    pub fn boot(
        board: B,
        region: R,
        sink: S,
        watchdog: &'w WakeFlag,
        plan: TestPlan,
        config: HarnessConfig,
    ) -> Self {
        let store = RecordStore::open(region, plan.len());
        let layout_reset = store.layout() != LayoutStatus::Current;
        let clamped =
            !layout_reset && store.raw_index().is_some_and(|raw| raw > store.max_index());
        let mut record = store.load_record();

        let publisher = Publisher::new(sink, config.publish_interval);
        let mut bench = TestBench::new(board, store, publisher);

        if layout_reset {
            let written = bench.store.initialize(&record);
            let _ = bench.check_storage("fresh record", written);
        } else if clamped {
            let written = bench.store.store_index(record.current_index);
            let _ = bench.check_storage("current index", written);
        }

        let open_test = match SequencerState::from_index(record.current_index, &plan) {
            SequencerState::Testing { test, .. } if record.interval_open() => Some(test),
            _ => None,
        };
        let resumed =
            open_test.filter(|test| test.descriptor().kind == ProcedureKind::ArmThenSuspend);
        let stale_interval = record.interval_open() && resumed.is_none();
        if stale_interval {
            record.started_at = Timestamp::UNSET;
            let written = bench.store.store_started_at(Timestamp::UNSET);
            let _ = bench.check_storage("interval start", written);
        }

        Self {
            bench,
            plan,
            config,
            verifier: ElapsedTimeVerifier::new(config.tolerance_secs),
            watchdog,
            record,
            boot: BootReport {
                record,
                resumed,
                clamped,
                layout_reset,
                stale_interval,
            },
        }
    }

    /// Runs one step of the state machine.
    pub fn tick(&mut self) -> TickOutcome {
        self.bench.board.poll();
        let woke_at = self.bench.board.now();
        if self.watchdog.take() {
            let count = self.watchdog.raised_count();
            self.bench.notify(
                Topic::Watchdog,
                format_args!("wake interrupt serviced ({count} since boot)"),
            );
        }

        match self.state() {
            SequencerState::Idle => self.start_suite(),
            SequencerState::Testing { position, test } => self.run_test(position, test, woke_at),
            SequencerState::Reporting => self.report(),
        }
    }

    /// Parses, validates and persists a new per-test duration.
    ///
    /// On error nothing changes.
    pub fn set_test_duration(&mut self, input: &str) -> Result<u16, ConfigError> {
        let secs = config::parse_test_duration(input)?;
        self.apply_test_duration(secs);
        Ok(secs)
    }

    /// Validates and persists a duration that was already parsed.
    pub fn set_test_duration_secs(&mut self, secs: i64) -> Result<u16, ConfigError> {
        let secs = config::validate_test_duration(secs)?;
        self.apply_test_duration(secs);
        Ok(secs)
    }

    fn apply_test_duration(&mut self, secs: u16) {
        self.record.duration_secs = secs;
        let written = self.bench.store.store_duration(secs);
        let _ = self.bench.check_storage("test duration", written);
        self.bench
            .notify(Topic::Config, format_args!("test duration set to {secs}s"));
    }

    #[must_use]
    pub fn state(&self) -> SequencerState {
        SequencerState::from_index(self.record.current_index, &self.plan)
    }

    #[must_use]
    pub fn record(&self) -> &TestRecord {
        &self.record
    }

    #[must_use]
    pub fn plan(&self) -> &TestPlan {
        &self.plan
    }

    #[must_use]
    pub fn config(&self) -> &HarnessConfig {
        &self.config
    }

    #[must_use]
    pub fn boot_report(&self) -> &BootReport {
        &self.boot
    }

    #[must_use]
    pub fn status(&self) -> StatusSnapshot {
        StatusSnapshot::capture(
            &self.plan,
            &self.record,
            self.watchdog.raised_count(),
        )
    }

    pub fn board(&self) -> &B {
        &self.bench.board
    }

    pub fn board_mut(&mut self) -> &mut B {
        &mut self.bench.board
    }

    pub fn region(&self) -> &R {
        self.bench.store.region()
    }

    pub fn region_mut(&mut self) -> &mut R {
        self.bench.store.region_mut()
    }

    pub fn sink(&self) -> &S {
        self.bench.publisher.sink()
    }

    pub fn sink_mut(&mut self) -> &mut S {
        self.bench.publisher.sink_mut()
    }

    /// Returns the board, region and sink, e.g. to perform a reboot.
    pub fn into_parts(self) -> (B, R, S) {
        self.bench.into_parts()
    }

    fn start_suite(&mut self) -> TickOutcome {
        self.bench.notify(
            Topic::Suite,
            format_args!(
                "starting {} plan: {} tests, {}s each",
                self.plan.name(),
                self.plan.len(),
                self.record.duration_secs
            ),
        );
        self.record.current_index = 1;
        self.persist_index();
        TickOutcome::Started
    }

    fn run_test(&mut self, position: u8, test: TestId, woke_at: Timestamp) -> TickOutcome {
        let resuming = self.record.interval_open();
        self.bench.notify(
            Topic::Test,
            format_args!(
                "{}/{} {}{}",
                position,
                self.plan.len(),
                test,
                if resuming { " (resumed)" } else { "" }
            ),
        );

        let context = TestContext {
            config: &self.config,
            verifier: self.verifier,
            duration_secs: self.record.duration_secs,
            woke_at,
        };
        match procedures::run(test, &mut self.bench, &context) {
            ProcedureOutcome::Suspend(request) => {
                self.record.started_at = self.bench.store.load_started_at();
                TickOutcome::Suspend(request)
            }
            ProcedureOutcome::Completed { passed } => {
                self.record.started_at = Timestamp::UNSET;
                self.record.current_index = position.saturating_add(1);
                if passed {
                    self.record.pass_count = self.record.pass_count.saturating_add(1);
                }
                // Index first: losing power in between drops a pass rather
                // than counting one twice.
                self.persist_index();
                self.persist_pass_count();

                self.bench.notify(
                    Topic::Verdict,
                    format_args!(
                        "{test}: {} ({} of {position} passed)",
                        if passed { "PASS" } else { "FAIL" },
                        self.record.pass_count
                    ),
                );
                TickOutcome::Verdict { test, passed }
            }
        }
    }

    fn report(&mut self) -> TickOutcome {
        let tally = Tally {
            passed: self.record.pass_count,
            total: self.plan.len(),
        };
        self.bench.notify(Topic::Tally, format_args!("{tally}"));
        self.bench.board.delay(self.config.report_delay);

        self.record.current_index = 0;
        self.record.pass_count = 0;
        self.persist_index();
        self.persist_pass_count();
        TickOutcome::Reported(tally)
    }

    fn persist_index(&mut self) {
        let written = self.bench.store.store_index(self.record.current_index);
        let _ = self.bench.check_storage("current index", written);
    }

    fn persist_pass_count(&mut self) {
        let written = self.bench.store.store_pass_count(self.record.pass_count);
        let _ = self.bench.check_storage("pass count", written);
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::notify::NotificationLog;
    use crate::sim::{SimBoard, SimRegion};

    fn boot_fresh(
        watchdog: &WakeFlag,
    ) -> TestSequencer<'_, SimBoard, SimRegion, NotificationLog> {
        TestSequencer::boot(
            SimBoard::new(),
            SimRegion::erased(),
            NotificationLog::new(),
            watchdog,
            TestPlan::FULL,
            HarnessConfig::default(),
        )
    }

    #[test]
    fn state_follows_index() {
        let plan = TestPlan::STOP_MODE;
        assert_eq!(SequencerState::from_index(0, &plan), SequencerState::Idle);
        assert_eq!(
            SequencerState::from_index(2, &plan),
            SequencerState::Testing {
                position: 2,
                test: TestId::InterruptWake
            }
        );
        assert_eq!(
            SequencerState::from_index(4, &plan),
            SequencerState::Reporting
        );
        assert_eq!(SequencerState::from_index(9, &plan), SequencerState::Idle);
    }

    #[test]
    fn fresh_boot_initializes_layout() {
        let watchdog = WakeFlag::new();
        let sequencer = boot_fresh(&watchdog);

        assert!(sequencer.boot_report().layout_reset);
        assert_eq!(sequencer.boot_report().resumed, None);
        assert_eq!(*sequencer.record(), TestRecord::default());
        assert_eq!(sequencer.state(), SequencerState::Idle);
    }

    #[test]
    fn idle_tick_announces_and_advances() {
        let watchdog = WakeFlag::new();
        let mut sequencer = boot_fresh(&watchdog);

        assert_eq!(sequencer.tick(), TickOutcome::Started);
        assert_eq!(sequencer.record().current_index, 1);

        let latest = sequencer.sink().latest().expect("suite announcement");
        assert_eq!(latest.notification.topic, Topic::Suite);
    }

    #[test]
    fn watchdog_flag_is_reported_once() {
        let watchdog = WakeFlag::new();
        let mut sequencer = boot_fresh(&watchdog);

        watchdog.raise();
        sequencer.tick();
        sequencer.tick();

        let reports = sequencer
            .sink()
            .oldest_first()
            .filter(|entry| entry.notification.topic == Topic::Watchdog)
            .count();
        assert_eq!(reports, 1);
        assert!(!watchdog.is_pending());
    }

    #[test]
    fn invalid_duration_leaves_state_unchanged() {
        let watchdog = WakeFlag::new();
        let mut sequencer = boot_fresh(&watchdog);

        assert_eq!(
            sequencer.set_test_duration("3601"),
            Err(ConfigError::OutOfRange { requested: 3_601 })
        );
        assert_eq!(sequencer.record().duration_secs, 10);

        assert_eq!(sequencer.set_test_duration("30"), Ok(30));
        assert_eq!(sequencer.record().duration_secs, 30);
        let (_, region, _) = sequencer.into_parts();
        assert_eq!(RecordStore::open(region, 5).load_duration(), 30);
    }
}
