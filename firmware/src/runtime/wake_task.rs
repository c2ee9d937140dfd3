use embassy_stm32 as hal;
use embassy_stm32::Peri;
use embassy_stm32::exti::ExtiInput;
use embassy_stm32::gpio::{Output, Pull};
use qualifier_core::watchdog::PulsePin;

use crate::wake_line::WakeLine;

/// Watchdog pet output.
struct WatchdogPulse(Output<'static>);

impl PulsePin for WatchdogPulse {
    fn toggle(&mut self) {
        self.0.toggle();
    }
}

#[embassy_executor::task]
pub async fn run(
    line: &'static WakeLine,
    pin: Peri<'static, hal::peripherals::PA0>,
    channel: Peri<'static, hal::peripherals::EXTI0>,
    pulse: Output<'static>,
) -> ! {
    let mut input = ExtiInput::new(pin, channel, Pull::Down);
    let mut pulse = WatchdogPulse(pulse);
    line.on_edge(input.is_high(), &mut pulse);

    loop {
        input.wait_for_any_edge().await;
        line.on_edge(input.is_high(), &mut pulse);
    }
}
