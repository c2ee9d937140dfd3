//! Elapsed-time verification across sleeps and reboots.
//!
//! A timed test records the RTC time when it begins. Because the start lives
//! in the persisted record, the check still works when the interval spans a
//! deep sleep or a power cycle and the verifying code runs on a later boot.

use core::fmt;

use crate::bench::TestBench;
use crate::clock::{Board, Timestamp};
use crate::notify::{NotificationSink, Topic};
use crate::persist::{PersistentRegion, RegionError};

/// Result of checking one timed interval.
#[derive(Copy, Clone, Debug, Eq, PartialEq)]
pub struct IntervalReport {
    pub target_secs: u32,
    /// Measured seconds, `None` when no valid start was recorded or the clock
    /// went backwards.
    pub elapsed_secs: Option<u32>,
    /// Undershoot accepted for this interval.
    pub tolerance_secs: u32,
    pub passed: bool,
}

impl IntervalReport {
    /// Applies the tolerance law `target - tolerance <= elapsed <= target`.
    #[must_use]
    pub fn evaluate(target_secs: u32, elapsed_secs: Option<u32>, tolerance_secs: u32) -> Self {
        let lower = target_secs.saturating_sub(tolerance_secs);
        let passed = elapsed_secs.is_some_and(|elapsed| (lower..=target_secs).contains(&elapsed));
        Self {
            target_secs,
            elapsed_secs,
            tolerance_secs,
            passed,
        }
    }
}

impl fmt::Display for IntervalReport {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let verdict = if self.passed { "PASS" } else { "FAIL" };
        match self.elapsed_secs {
            Some(elapsed) => write!(
                f,
                "{verdict}: slept {elapsed}s of {}s (-{}s)",
                self.target_secs, self.tolerance_secs
            ),
            None => write!(f, "{verdict}: no valid start for {}s", self.target_secs),
        }
    }
}

/// Begins and checks timed intervals against the persisted start time.
#[derive(Copy, Clone, Debug, Eq, PartialEq)]
pub struct ElapsedTimeVerifier {
    tolerance_secs: u32,
}

impl ElapsedTimeVerifier {
    #[must_use]
    pub const fn new(tolerance_secs: u32) -> Self {
        Self { tolerance_secs }
    }

    #[must_use]
    pub const fn tolerance_secs(&self) -> u32 {
        self.tolerance_secs
    }

    /// Persists the current RTC time as the interval start.
    pub fn begin<B, R, S>(&self, bench: &mut TestBench<B, R, S>) -> Result<Timestamp, RegionError>
    where
        B: Board,
        R: PersistentRegion,
        S: NotificationSink,
    {
        // `now()` may be cached from an earlier poll, with a throttled
        // publish in between.
        bench.board.poll();
        let now = bench.board.now();
        let stored = bench.store.store_started_at(now);
        bench.check_storage("interval start", stored)?;
        Ok(now)
    }

    /// Clears the persisted start and checks the time elapsed until now
    /// against `target_secs`. `allowance_secs` widens the tolerance for
    /// intervals that include a reboot.
    pub fn end<B, R, S>(
        &self,
        bench: &mut TestBench<B, R, S>,
        target_secs: u32,
        allowance_secs: u32,
    ) -> IntervalReport
    where
        B: Board,
        R: PersistentRegion,
        S: NotificationSink,
    {
        bench.board.poll();
        let now = bench.board.now();
        self.end_at(bench, now, target_secs, allowance_secs)
    }

    /// Like [`Self::end`], but measures up to `ended_at`, an RTC reading
    /// taken before anything that may block on the publisher.
    pub fn end_at<B, R, S>(
        &self,
        bench: &mut TestBench<B, R, S>,
        ended_at: Timestamp,
        target_secs: u32,
        allowance_secs: u32,
    ) -> IntervalReport
    where
        B: Board,
        R: PersistentRegion,
        S: NotificationSink,
    {
        let started_at = bench.store.load_started_at();
        let cleared = bench.store.store_started_at(Timestamp::UNSET);
        // A failed clear is reported; the verdict below still stands.
        let _ = bench.check_storage("interval start", cleared);

        let elapsed = if started_at.is_unset() {
            None
        } else {
            ended_at.checked_secs_since(started_at)
        };

        let report = IntervalReport::evaluate(
            target_secs,
            elapsed,
            self.tolerance_secs.saturating_add(allowance_secs),
        );
        bench.notify(Topic::Timing, format_args!("{report}"));
        report
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use core::time::Duration;

    use crate::clock::{Monotonic, TimeSource};
    use crate::notify::{NotificationLog, Publisher};
    use crate::persist::{RecordStore, TestRecord};
    use crate::sim::{LatchedRtc, SimBoard, SimRegion};

    fn bench_on<B: Board>(board: B) -> TestBench<B, SimRegion, NotificationLog> {
        let mut store = RecordStore::open(SimRegion::erased(), 5);
        store.initialize(&TestRecord::default()).unwrap();
        TestBench::new(
            board,
            store,
            Publisher::new(NotificationLog::new(), Duration::from_secs(1)),
        )
    }

    #[test]
    fn tolerance_window_is_inclusive() {
        for (elapsed, expected) in [(7, false), (8, true), (9, true), (10, true), (11, false)] {
            let report = IntervalReport::evaluate(10, Some(elapsed), 2);
            assert_eq!(report.passed, expected, "elapsed {elapsed}");
        }
    }

    #[test]
    fn missing_start_fails() {
        let report = IntervalReport::evaluate(10, None, 2);
        assert!(!report.passed);
    }

    #[test]
    fn short_targets_saturate_lower_bound() {
        assert!(IntervalReport::evaluate(1, Some(0), 2).passed);
        assert!(IntervalReport::evaluate(0, Some(0), 2).passed);
        assert!(!IntervalReport::evaluate(0, Some(1), 2).passed);
    }

    #[test]
    fn end_without_begin_fails_and_reports() {
        let verifier = ElapsedTimeVerifier::new(2);
        let mut bench = bench_on(SimBoard::new());

        let report = verifier.end(&mut bench, 10, 0);

        assert!(!report.passed);
        assert_eq!(report.elapsed_secs, None);
        assert!(bench.store.load_started_at().is_unset());
        let latest = bench.publisher.sink().latest().expect("timing notification");
        assert_eq!(latest.notification.topic, Topic::Timing);
        assert_eq!(
            latest.notification.payload.as_str(),
            "FAIL: no valid start for 10s"
        );
    }

    #[test]
    fn begin_and_end_read_a_fresh_clock() {
        let verifier = ElapsedTimeVerifier::new(2);
        let mut bench = bench_on(LatchedRtc::new(SimBoard::new()));
        let booted_at = bench.board.now();

        // Time passes without a poll, as while a publish waits out the limit.
        bench.board.delay(Duration::from_secs(3));
        let started_at = verifier.begin(&mut bench).unwrap();
        assert_eq!(started_at.checked_secs_since(booted_at), Some(3));

        bench.board.delay(Duration::from_secs(10));
        let report = verifier.end(&mut bench, 10, 0);
        assert_eq!(report.elapsed_secs, Some(10));
        assert!(report.passed);
    }

    #[test]
    fn end_at_measures_to_the_given_reading() {
        let verifier = ElapsedTimeVerifier::new(2);
        let mut bench = bench_on(SimBoard::new());

        verifier.begin(&mut bench).unwrap();
        bench.board.delay(Duration::from_secs(10));
        bench.board.poll();
        let woke_at = bench.board.now();
        bench.board.delay(Duration::from_secs(1));

        let report = verifier.end_at(&mut bench, woke_at, 10, 0);
        assert_eq!(report.elapsed_secs, Some(10));
        assert!(report.passed);
    }
}
