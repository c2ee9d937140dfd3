use core::time::Duration;

use embassy_stm32::pac;
use embassy_stm32::pac::pwr::vals::Lpms;
use qualifier_core::clock::{Monotonic, PowerControl, TimeSource, Timestamp, WakeSource};

use super::calendar::wakeup_secs;
use super::rtc::RtcClock;
use crate::wake_line::WakeLine;

/// Qualification carrier: RTC, shared wake line and stop mode.
pub struct CarrierBoard {
    rtc: RtcClock,
    wake_line: &'static WakeLine,
}

impl CarrierBoard {
    pub fn new(rtc: RtcClock, wake_line: &'static WakeLine) -> Self {
        Self { rtc, wake_line }
    }
}

impl TimeSource for CarrierBoard {
    fn poll(&mut self) {
        self.rtc.refresh();
    }

    fn now(&self) -> Timestamp {
        self.rtc.now()
    }

    fn arm_alarm(&mut self, after: Duration, wake_pin: bool) {
        self.rtc.arm_alarm(after, wake_pin);
    }

    fn alarm_fired(&self) -> bool {
        self.rtc.alarm_fired()
    }

    fn clear_alarm(&mut self) {
        self.rtc.clear_alarm();
    }
}

impl Monotonic for CarrierBoard {
    fn uptime(&self) -> Duration {
        Duration::from_micros(embassy_time::Instant::now().as_micros())
    }

    fn delay(&mut self, duration: Duration) {
        let micros = u64::try_from(duration.as_micros()).unwrap_or(u64::MAX);
        embassy_time::block_for(embassy_time::Duration::from_micros(micros));
    }
}

impl PowerControl for CarrierBoard {
    fn stop_sleep(&mut self, duration: Duration, wake: WakeSource) {
        let secs = wakeup_secs(duration);
        if secs == 0 {
            // The timer cannot count less than one second.
            self.rtc.refresh();
            return;
        }
        self.rtc.start_wakeup_timer(secs);

        pac::PWR.cr1().modify(|w| w.set_lpms(Lpms::STOP1));
        // Only the sequencer task touches the system control block.
        let mut scb = unsafe { cortex_m::Peripherals::steal() }.SCB;
        scb.set_sevonpend();
        scb.set_sleepdeep();

        loop {
            cortex_m::asm::wfe();
            if self.rtc.wakeup_elapsed() {
                break;
            }
            if wake == WakeSource::TimerOrPin && self.wake_line.is_high() {
                defmt::debug!("stop: woken by wake line");
                break;
            }
        }

        scb.clear_sleepdeep();
        scb.clear_sevonpend();
        self.rtc.stop_wakeup_timer();
        self.rtc.refresh();
    }

    fn wake_pin_high(&self) -> bool {
        self.wake_line.is_high()
    }
}
