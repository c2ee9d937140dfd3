//! Arm-then-suspend tests: deep sleep and enable-pin power-off.
//!
//! The first entry arms the RTC alarm, persists the interval start and asks
//! the runtime to suspend. The runtime never comes back to this call; the
//! next boot re-enters the same test and finds the interval open, so it
//! verifies instead of arming again.

use crate::bench::TestBench;
use crate::clock::Board;
use crate::notify::{NotificationSink, Topic};
use crate::persist::PersistentRegion;

use super::{ProcedureOutcome, SuspendMode, SuspendRequest, TestContext};

pub fn arm_then_suspend<B, R, S>(
    mode: SuspendMode,
    bench: &mut TestBench<B, R, S>,
    context: &TestContext<'_>,
) -> ProcedureOutcome
where
    B: Board,
    R: PersistentRegion,
    S: NotificationSink,
{
    if bench.store.load_started_at().is_unset() {
        return arm(mode, bench, context);
    }

    // The tick may have published and waited since the board woke.
    let report = context.verifier.end_at(
        bench,
        context.woke_at,
        context.target_secs(),
        context.config.boot_overhead_secs,
    );
    bench.board.clear_alarm();
    ProcedureOutcome::completed(report.passed)
}

fn arm<B, R, S>(
    mode: SuspendMode,
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
        // Without a persisted start the next boot could not verify anything.
        bench.board.clear_alarm();
        return ProcedureOutcome::FAILED;
    }

    bench.notify(
        Topic::Suspend,
        format_args!("{mode} for {}s", context.duration_secs),
    );
    ProcedureOutcome::Suspend(SuspendRequest {
        mode,
        wake_after: context.target(),
    })
}
