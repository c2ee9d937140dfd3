mod common;

use qualifier_core::config::HarnessConfig;
use qualifier_core::notify::{NotificationLog, Topic};
use qualifier_core::persist::{INDEX_OFFSET, RecordStore, TestRecord};
use qualifier_core::procedures::{TestId, TestPlan};
use qualifier_core::sequencer::{SequencerState, TestSequencer, TickOutcome};
use qualifier_core::sim::{SimBoard, SimFault, SimRegion};
use qualifier_core::watchdog::WakeFlag;

use common::run_suite;

fn board_with(fault: SimFault) -> SimBoard {
    let mut board = SimBoard::new();
    board.faults.toggle(fault);
    board
}

fn initialized_region(record: &TestRecord) -> SimRegion {
    let mut region = SimRegion::erased();
    RecordStore::open(&mut region, TestPlan::FULL.len())
        .initialize(record)
        .expect("initialize region");
    region
}

#[test]
fn rtc_alarm_needs_flag_and_wake_pin() {
    let run = run_suite(
        TestPlan::FULL,
        board_with(SimFault::AlarmFlag),
        SimRegion::erased(),
    );
    assert_eq!(run.failed(), vec![TestId::RtcAlarm]);
    assert!(
        run.payloads(Topic::Test)
            .iter()
            .any(|payload| payload == "FAIL: alarm flag missing, wake pin high")
    );

    let run = run_suite(
        TestPlan::FULL,
        board_with(SimFault::StuckPin),
        SimRegion::erased(),
    );
    assert_eq!(run.failed(), vec![TestId::RtcAlarm]);
    assert!(
        run.payloads(Topic::Test)
            .iter()
            .any(|payload| payload == "FAIL: alarm flag set, wake pin low")
    );
}

#[test]
fn early_wake_fails_both_stop_mode_tests() {
    let run = run_suite(
        TestPlan::FULL,
        board_with(SimFault::EarlyWake),
        SimRegion::erased(),
    );
    assert_eq!(
        run.failed(),
        vec![TestId::StopSleep, TestId::InterruptWake]
    );
    assert_eq!(run.payloads(Topic::Tally), vec!["3 of 5 passed"]);
}

#[test]
fn late_wake_is_caught_unless_the_pin_ends_the_sleep() {
    let run = run_suite(
        TestPlan::FULL,
        board_with(SimFault::LateWake),
        SimRegion::erased(),
    );
    assert_eq!(run.failed(), vec![TestId::StopSleep]);
}

#[test]
fn out_of_range_index_clamps_to_idle() {
    let mut region = initialized_region(&TestRecord::default());
    region.poke(INDEX_OFFSET, &[0xEE]);

    let watchdog = WakeFlag::new();
    let mut sequencer = TestSequencer::boot(
        SimBoard::new(),
        region,
        NotificationLog::<32>::new(),
        &watchdog,
        TestPlan::FULL,
        HarnessConfig::default(),
    );

    assert!(sequencer.boot_report().clamped);
    assert_eq!(sequencer.state(), SequencerState::Idle);
    assert_eq!(sequencer.region().bytes()[INDEX_OFFSET], 0);
    assert_eq!(sequencer.tick(), TickOutcome::Started);
}

#[test]
fn reporting_index_survives_reboot() {
    let mut record = TestRecord::default();
    record.current_index = TestPlan::FULL.len() + 1;
    record.pass_count = 2;
    let region = initialized_region(&record);

    let watchdog = WakeFlag::new();
    let sequencer = TestSequencer::boot(
        SimBoard::new(),
        region,
        NotificationLog::<32>::new(),
        &watchdog,
        TestPlan::FULL,
        HarnessConfig::default(),
    );

    assert!(!sequencer.boot_report().clamped);
    assert_eq!(sequencer.state(), SequencerState::Reporting);
}

#[test]
fn stale_interval_is_discarded_for_synchronous_tests() {
    let mut record = TestRecord::default();
    record.current_index = 1;
    record.started_at = qualifier_core::clock::Timestamp::from_secs(1_234);
    let region = initialized_region(&record);

    let watchdog = WakeFlag::new();
    let sequencer = TestSequencer::boot(
        SimBoard::new(),
        region,
        NotificationLog::<32>::new(),
        &watchdog,
        TestPlan::FULL,
        HarnessConfig::default(),
    );

    assert!(sequencer.boot_report().stale_interval);
    assert_eq!(sequencer.boot_report().resumed, None);
    assert!(!sequencer.record().interval_open());
}

#[test]
fn storage_failure_is_reported_and_the_run_continues() {
    let mut region = initialized_region(&TestRecord::default());
    region.set_fail_writes(true);

    let watchdog = WakeFlag::new();
    let mut sequencer = TestSequencer::boot(
        SimBoard::new(),
        region,
        NotificationLog::<32>::new(),
        &watchdog,
        TestPlan::FULL,
        HarnessConfig::default(),
    );

    assert_eq!(sequencer.tick(), TickOutcome::Started);
    assert_eq!(
        sequencer.state(),
        SequencerState::Testing {
            position: 1,
            test: TestId::StopSleep
        }
    );
    let storage = sequencer
        .sink()
        .oldest_first()
        .filter(|entry| entry.notification.topic == Topic::Storage)
        .count();
    assert_eq!(storage, 1);
}

#[test]
fn suspend_test_fails_instead_of_suspending_without_storage() {
    let mut record = TestRecord::default();
    record.current_index = 4;
    let mut region = initialized_region(&record);
    region.set_fail_writes(true);

    let watchdog = WakeFlag::new();
    let mut sequencer = TestSequencer::boot(
        SimBoard::new(),
        region,
        NotificationLog::<32>::new(),
        &watchdog,
        TestPlan::FULL,
        HarnessConfig::default(),
    );

    assert_eq!(
        sequencer.tick(),
        TickOutcome::Verdict {
            test: TestId::DeepSleep,
            passed: false
        }
    );
    assert!(!sequencer.board().alarm_pending());
}
