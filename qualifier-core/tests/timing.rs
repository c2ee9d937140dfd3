use qualifier_core::config::HarnessConfig;
use qualifier_core::notify::{NotificationLog, Topic};
use qualifier_core::procedures::{SuspendMode, TestId, TestPlan};
use qualifier_core::sequencer::{TestSequencer, TickOutcome};
use qualifier_core::sim::{LatchedRtc, SimBoard, SimRegion};
use qualifier_core::watchdog::WakeFlag;

type Log = NotificationLog<128>;

fn payloads(log: &Log, topic: Topic) -> Vec<String> {
    log.oldest_first()
        .filter(|entry| entry.notification.topic == topic)
        .map(|entry| entry.notification.payload.as_str().to_owned())
        .collect()
}

#[test]
fn full_plan_passes_when_the_rtc_is_read_only_on_poll() {
    let watchdog = WakeFlag::new();
    let mut board = SimBoard::new();
    let mut region = SimRegion::erased();
    let mut log = Log::new();
    let mut verdicts = Vec::new();

    'boots: for _ in 0..4 {
        let mut sequencer = TestSequencer::boot(
            LatchedRtc::new(board),
            region,
            log,
            &watchdog,
            TestPlan::FULL,
            HarnessConfig::default(),
        );

        let mut suspended = None;
        for _ in 0..16 {
            match sequencer.tick() {
                TickOutcome::Verdict { test, passed } => verdicts.push((test, passed)),
                TickOutcome::Suspend(request) => {
                    suspended = Some(request);
                    break;
                }
                TickOutcome::Reported(_) => {
                    let (_, _, final_log) = sequencer.into_parts();
                    log = final_log;
                    break 'boots;
                }
                TickOutcome::Started => {}
            }
        }

        let request = suspended.expect("suite neither suspended nor reported");
        let (rtc, next_region, next_log) = sequencer.into_parts();
        board = rtc.into_inner();
        board.resume_from(&request);
        region = next_region;
        log = next_log;
    }

    assert_eq!(
        verdicts,
        vec![
            (TestId::StopSleep, true),
            (TestId::RtcAlarm, true),
            (TestId::InterruptWake, true),
            (TestId::DeepSleep, true),
            (TestId::PowerOff, true),
        ]
    );
    assert_eq!(payloads(&log, Topic::Tally), vec!["5 of 5 passed"]);
}

#[test]
fn resumed_deep_sleep_passes_with_a_pending_wake_interrupt() {
    let watchdog = WakeFlag::new();
    let mut sequencer = TestSequencer::boot(
        SimBoard::new(),
        SimRegion::erased(),
        Log::new(),
        &watchdog,
        TestPlan::FULL,
        HarnessConfig::default(),
    );

    let request = loop {
        if let TickOutcome::Suspend(request) = sequencer.tick() {
            break request;
        }
    };
    assert_eq!(request.mode, SuspendMode::DeepSleep);

    let (mut board, region, log) = sequencer.into_parts();
    board.resume_from(&request);
    // The alarm drives the shared wake line, so the interrupt is pending at
    // boot and its notification is published ahead of the resumed test.
    watchdog.raise();

    let mut sequencer = TestSequencer::boot(
        board,
        region,
        log,
        &watchdog,
        TestPlan::FULL,
        HarnessConfig::default(),
    );
    assert_eq!(sequencer.boot_report().resumed, Some(TestId::DeepSleep));
    assert_eq!(
        sequencer.tick(),
        TickOutcome::Verdict {
            test: TestId::DeepSleep,
            passed: true
        }
    );

    let (_, _, log) = sequencer.into_parts();
    assert_eq!(payloads(&log, Topic::Watchdog).len(), 1);
    let timing = payloads(&log, Topic::Timing);
    assert!(
        timing.last().is_some_and(|line| line.contains("slept 10s")),
        "{timing:?}"
    );
}
