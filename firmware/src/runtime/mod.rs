use cortex_m::interrupt;
use cortex_m::register::primask;
use critical_section::{self, RawRestoreState};
use defmt_rtt as _;
use embassy_executor::{InterruptExecutor, Spawner};
use embassy_stm32 as hal;
use embassy_stm32::gpio::{Level, Output, Speed};
use embassy_stm32::interrupt::{InterruptExt, Priority};
use embassy_stm32::rtc::{Rtc, RtcConfig};
use embassy_sync::channel::Channel;
use qualifier_core::config::HarnessConfig;
use qualifier_core::procedures::TestPlan;
use qualifier_core::sequencer::TestSequencer;

use crate::console::{LineQueue, ReplyQueue};
use crate::hw::backup::BackupRegion;
use crate::hw::board::CarrierBoard;
use crate::hw::rtc::RtcClock;
use crate::logging::{LogSink, log_boot};
use crate::wake_line::WakeLine;

mod console_task;
mod sequencer_task;
mod wake_task;

critical_section::set_impl!(InterruptCriticalSection);

struct InterruptCriticalSection;

unsafe impl critical_section::Impl for InterruptCriticalSection {
    unsafe fn acquire() -> RawRestoreState {
        let primask = primask::read();
        interrupt::disable();
        primask.is_active()
    }

    unsafe fn release(restore_state: RawRestoreState) {
        if restore_state {
            unsafe {
                interrupt::enable();
            }
        }
    }
}

pub(super) static WAKE_LINE: WakeLine = WakeLine::new();
pub(super) static CONSOLE_LINES: LineQueue = Channel::new();
pub(super) static CONSOLE_REPLIES: ReplyQueue = Channel::new();

/// Runs the wake-line task above thread mode so it preempts blocking sleeps.
static WAKE_EXECUTOR: InterruptExecutor = InterruptExecutor::new();

#[hal::interrupt]
unsafe fn TIM7_LPTIM2() {
    unsafe { WAKE_EXECUTOR.on_interrupt() }
}

#[embassy_executor::main]
pub async fn main(spawner: Spawner) {
    let mut config = hal::Config::default();
    config.rcc.ls = hal::rcc::LsConfig::default_lse();
    let hal::Peripherals {
        RTC,
        PA0,
        EXTI0,
        PA2,
        PA3,
        PB5,
        PB6,
        USART2,
        ..
    } = hal::init(config);

    let rtc = Rtc::new(RTC, RtcConfig::default());
    let board = CarrierBoard::new(RtcClock::new(rtc), &WAKE_LINE);
    let watchdog_pulse = Output::new(PB5, Level::Low, Speed::Low);
    let enable = Output::new(PB6, Level::High, Speed::Low);

    hal::interrupt::TIM7_LPTIM2.set_priority(Priority::P2);
    let wake_spawner = WAKE_EXECUTOR.start(hal::interrupt::TIM7_LPTIM2);
    wake_spawner
        .spawn(wake_task::run(&WAKE_LINE, PA0, EXTI0, watchdog_pulse))
        .expect("failed to spawn wake line task");

    let sequencer = TestSequencer::boot(
        board,
        BackupRegion::new(),
        LogSink::new(),
        WAKE_LINE.flag(),
        TestPlan::FULL,
        HarnessConfig::default(),
    );
    log_boot(sequencer.boot_report());

    spawner
        .spawn(sequencer_task::run(sequencer, enable))
        .expect("failed to spawn sequencer task");

    spawner
        .spawn(console_task::run(USART2, PA2, PA3))
        .expect("failed to spawn console task");

    core::future::pending::<()>().await;
}
