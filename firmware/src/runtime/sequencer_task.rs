use embassy_futures::select::{Either, select};
use embassy_stm32::gpio::Output;
use embassy_time::{Duration, Timer};
use qualifier_core::console::SequencerConsole;
use qualifier_core::sequencer::{TestSequencer, TickOutcome};

use super::{CONSOLE_LINES, CONSOLE_REPLIES};
use crate::console;
use crate::hw::backup::BackupRegion;
use crate::hw::board::CarrierBoard;
use crate::hw::suspend;
use crate::logging::LogSink;

pub type FirmwareSequencer = TestSequencer<'static, CarrierBoard, BackupRegion, LogSink>;

/// Window between ticks in which console lines are serviced.
const TICK_INTERVAL: Duration = Duration::from_millis(100);
/// Lets the last log lines drain before the core goes dark.
const SUSPEND_SETTLE: Duration = Duration::from_millis(50);

#[embassy_executor::task]
pub async fn run(mut sequencer: FirmwareSequencer, mut enable: Output<'static>) -> ! {
    loop {
        match sequencer.tick() {
            TickOutcome::Suspend(request) => {
                Timer::after(SUSPEND_SETTLE).await;
                suspend::enter(&request, &mut enable);
            }
            TickOutcome::Verdict { test, passed } => {
                defmt::debug!("sequencer: {} passed={}", test.name(), passed);
            }
            TickOutcome::Started | TickOutcome::Reported(_) => {}
        }

        if let Either::Second(line) = select(Timer::after(TICK_INTERVAL), CONSOLE_LINES.receive()).await {
            let reply = console::respond(&mut SequencerConsole::new(&mut sequencer), &line);
            CONSOLE_REPLIES.send(reply).await;
        }
    }
}
