//! Non-returning low-power exits.
//!
//! Both paths rely on the alarm armed before the request was issued: standby
//! wakes on the RTC alarm directly, and the alarm output re-enables the
//! carrier's regulator after a power-off.

use embassy_stm32::gpio::Output;
use embassy_stm32::pac;
use embassy_stm32::pac::pwr::vals::Lpms;
use qualifier_core::sequencer::{SuspendMode, SuspendRequest};

pub fn enter(request: &SuspendRequest, enable: &mut Output<'static>) -> ! {
    defmt::info!(
        "suspend: {} for {}s",
        defmt::Display2Format(&request.mode),
        request.wake_after.as_secs()
    );

    match request.mode {
        SuspendMode::DeepSleep => standby(),
        SuspendMode::PowerOff => {
            enable.set_low();
            // Falls through to standby when the rail is held up externally.
            standby()
        }
    }
}

fn standby() -> ! {
    pac::PWR.scr().write(|w| w.set_cwuf(0x3f));
    pac::PWR.cr1().modify(|w| w.set_lpms(Lpms::STANDBY));

    // Wakeup from standby is a reset, so this never returns.
    let mut scb = unsafe { cortex_m::Peripherals::steal() }.SCB;
    scb.set_sleepdeep();
    loop {
        cortex_m::asm::dsb();
        cortex_m::asm::wfi();
    }
}
