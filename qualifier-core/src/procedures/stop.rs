//! Stop-mode sleep tests.

use crate::bench::TestBench;
use crate::clock::{Board, WakeSource};
use crate::notify::NotificationSink;
use crate::persist::PersistentRegion;

use super::{ProcedureOutcome, TestContext};

/// Sleeps in stop mode for the target duration with only the timer as a wake
/// source, then checks the RTC agrees.
pub fn stop_sleep<B, R, S>(
    bench: &mut TestBench<B, R, S>,
    context: &TestContext<'_>,
) -> ProcedureOutcome
where
    B: Board,
    R: PersistentRegion,
    S: NotificationSink,
{
    if context.verifier.begin(bench).is_err() {
        return ProcedureOutcome::FAILED;
    }

    bench.board.stop_sleep(context.target(), WakeSource::Timer);
    let report = context.verifier.end(bench, context.target_secs(), 0);
    ProcedureOutcome::completed(report.passed)
}

/// Arms the RTC alarm onto the wake pin and sleeps until the pin interrupt
/// ends stop mode.
pub fn interrupt_wake<B, R, S>(
    bench: &mut TestBench<B, R, S>,
    context: &TestContext<'_>,
) -> ProcedureOutcome
where
    B: Board,
    R: PersistentRegion,
    S: NotificationSink,
{
    bench.board.arm_alarm(context.target(), true);
    if context.verifier.begin(bench).is_err() {
        bench.board.clear_alarm();
        return ProcedureOutcome::FAILED;
    }

    bench
        .board
        .stop_sleep(context.target(), WakeSource::TimerOrPin);
    let report = context.verifier.end(bench, context.target_secs(), 0);
    bench.board.clear_alarm();
    ProcedureOutcome::completed(report.passed)
}
