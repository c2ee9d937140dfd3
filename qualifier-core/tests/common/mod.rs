#![allow(dead_code)]

use qualifier_core::config::HarnessConfig;
use qualifier_core::notify::{NotificationLog, Topic};
use qualifier_core::procedures::{TestId, TestPlan};
use qualifier_core::sequencer::{TestSequencer, TickOutcome};
use qualifier_core::sim::{SimBoard, SimRegion};
use qualifier_core::watchdog::WakeFlag;

pub type Log = NotificationLog<256>;

const MAX_BOOTS: usize = 8;
const MAX_TICKS_PER_BOOT: usize = 16;

/// Everything left over after a suite ran to its tally.
pub struct SuiteRun {
    pub outcomes: Vec<TickOutcome>,
    pub board: SimBoard,
    pub region: SimRegion,
    pub log: Log,
    pub boots: usize,
}

impl SuiteRun {
    pub fn verdicts(&self) -> Vec<(TestId, bool)> {
        self.outcomes
            .iter()
            .filter_map(|outcome| match outcome {
                TickOutcome::Verdict { test, passed } => Some((*test, *passed)),
                _ => None,
            })
            .collect()
    }

    pub fn failed(&self) -> Vec<TestId> {
        self.verdicts()
            .into_iter()
            .filter(|(_, passed)| !passed)
            .map(|(test, _)| test)
            .collect()
    }

    pub fn payloads(&self, topic: Topic) -> Vec<String> {
        self.log
            .oldest_first()
            .filter(|entry| entry.notification.topic == topic)
            .map(|entry| entry.notification.payload.as_str().to_owned())
            .collect()
    }
}

/// Boots and ticks until the tally is reported, rebooting the simulated
/// board whenever a test suspends.
pub fn run_suite(plan: TestPlan, board: SimBoard, region: SimRegion) -> SuiteRun {
    let watchdog = WakeFlag::new();
    let mut board = board;
    let mut region = region;
    let mut log = Log::new();
    let mut outcomes = Vec::new();

    for boot in 1..=MAX_BOOTS {
        let mut sequencer = TestSequencer::boot(
            board,
            region,
            log,
            &watchdog,
            plan,
            HarnessConfig::default(),
        );

        let mut suspended = None;
        for _ in 0..MAX_TICKS_PER_BOOT {
            let outcome = sequencer.tick();
            outcomes.push(outcome);
            match outcome {
                TickOutcome::Suspend(request) => {
                    suspended = Some(request);
                    break;
                }
                TickOutcome::Reported(_) => {
                    let (board, region, log) = sequencer.into_parts();
                    return SuiteRun {
                        outcomes,
                        board,
                        region,
                        log,
                        boots: boot,
                    };
                }
                _ => {}
            }
        }

        let request = suspended.expect("suite stalled without suspending or reporting");
        let (next_board, next_region, next_log) = sequencer.into_parts();
        board = next_board;
        region = next_region;
        log = next_log;
        board.resume_from(&request);
    }

    panic!("suite did not report within {MAX_BOOTS} boots");
}
