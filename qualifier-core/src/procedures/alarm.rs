//! RTC alarm test.
//!
//! Arms the alarm with the wake pin enabled and busy-waits without sleeping.
//! The test passes only when the RTC reports the alarm flag and the wake pin
//! is observed high; either alone means a wiring or configuration fault.

use crate::bench::TestBench;
use crate::clock::{Board, Deadline};
use crate::notify::{NotificationSink, Topic};
use crate::persist::PersistentRegion;

use super::{ProcedureOutcome, TestContext};

pub fn rtc_alarm<B, R, S>(
    bench: &mut TestBench<B, R, S>,
    context: &TestContext<'_>,
) -> ProcedureOutcome
where
    B: Board,
    R: PersistentRegion,
    S: NotificationSink,
{
    let timeout = context
        .target()
        .saturating_add(context.config.alarm_timeout_margin);

    bench.board.arm_alarm(context.target(), true);
    let deadline = Deadline::after(&bench.board, timeout);

    let fired = loop {
        bench.board.poll();
        if bench.board.alarm_fired() {
            break true;
        }
        if deadline.expired(&bench.board) {
            break false;
        }
        let step = context
            .config
            .alarm_poll_interval
            .min(deadline.remaining(&bench.board));
        bench.board.delay(step);
    };

    let pin_high = bench.board.wake_pin_high();
    bench.board.clear_alarm();

    let passed = fired && pin_high;
    bench.notify(
        Topic::Test,
        format_args!(
            "{}: alarm flag {}, wake pin {}",
            if passed { "PASS" } else { "FAIL" },
            if fired { "set" } else { "missing" },
            if pin_high { "high" } else { "low" },
        ),
    );
    ProcedureOutcome::completed(passed)
}
