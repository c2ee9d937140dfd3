//! Calendar RTC adapter: wall time, alarm A and the wakeup timer.
//!
//! Embassy's driver owns initialization and the calendar; alarm A and the
//! wakeup timer are not exposed by it and are programmed through the PAC.

use core::time::Duration;

use embassy_stm32::pac;
use embassy_stm32::pac::rtc::vals::{AlrmrMsk, Calrf, Key, Osel, Pol, Wucksel};
use embassy_stm32::rtc::Rtc;
use qualifier_core::clock::Timestamp;

use super::calendar::{CalendarTime, bcd, time_of_day};

/// Alarm A matches on time of day only, so it must fire within this window.
const MAX_ALARM_SECS: u64 = 86_399;

pub struct RtcClock {
    rtc: Rtc,
    now: Timestamp,
}

impl RtcClock {
    pub fn new(rtc: Rtc) -> Self {
        let mut clock = Self {
            rtc,
            now: Timestamp::UNSET,
        };
        clock.refresh();
        clock
    }

    /// Re-reads the calendar registers.
    pub fn refresh(&mut self) {
        let secs = self.rtc.now().ok().and_then(|time| {
            CalendarTime {
                year: time.year(),
                month: time.month(),
                day: time.day(),
                hour: time.hour(),
                minute: time.minute(),
                second: time.second(),
            }
            .secs_since_2000()
        });

        match secs {
            Some(secs) => self.now = Timestamp::from_secs(secs),
            None => defmt::warn!("rtc: calendar read failed"),
        }
    }

    pub fn now(&self) -> Timestamp {
        self.now
    }

    /// Programs alarm A `after` from the cached time, optionally routing it to
    /// RTC_OUT so the shared wake line rises when it fires.
    ///
    /// The alarm fires at least one second out, so a suspend test with a zero
    /// duration always measures more than its target.
    pub fn arm_alarm(&mut self, after: Duration, wake_pin: bool) {
        self.refresh();
        let after = u32::try_from(after.as_secs().clamp(1, MAX_ALARM_SECS)).unwrap_or(1);
        let (hour, minute, second) = time_of_day(self.now.as_secs().wrapping_add(after));

        with_unlocked(|regs| {
            regs.cr().modify(|w| {
                w.set_alrae(false);
                w.set_alraie(false);
            });
            while !regs.icsr().read().alrawf() {}

            regs.alrmr(0).write(|w| {
                let (tens, units) = bcd(hour);
                w.set_ht(tens);
                w.set_hu(units);
                let (tens, units) = bcd(minute);
                w.set_mnt(tens);
                w.set_mnu(units);
                let (tens, units) = bcd(second);
                w.set_st(tens);
                w.set_su(units);
                w.set_msk1(AlrmrMsk::NOT_MASK);
                w.set_msk2(AlrmrMsk::NOT_MASK);
                w.set_msk3(AlrmrMsk::NOT_MASK);
                w.set_msk4(AlrmrMsk::MASK);
            });
            regs.scr().write(|w| w.set_calraf(Calrf::CLEAR));

            regs.cr().modify(|w| {
                w.set_osel(if wake_pin { Osel::ALARM_A } else { Osel::DISABLED });
                w.set_pol(Pol::HIGH);
                w.set_alraie(true);
                w.set_alrae(true);
            });
        });
    }

    pub fn alarm_fired(&self) -> bool {
        pac::RTC.sr().read().alraf()
    }

    pub fn clear_alarm(&mut self) {
        with_unlocked(|regs| {
            regs.cr().modify(|w| {
                w.set_alrae(false);
                w.set_alraie(false);
                w.set_osel(Osel::DISABLED);
            });
            regs.scr().write(|w| w.set_calraf(Calrf::CLEAR));
        });
    }

    /// Starts the 1 Hz wakeup timer for `secs` seconds.
    pub fn start_wakeup_timer(&mut self, secs: u16) {
        with_unlocked(|regs| {
            regs.cr().modify(|w| w.set_wute(false));
            while !regs.icsr().read().wutwf() {}

            regs.cr().modify(|w| w.set_wucksel(Wucksel::CLOCK_SPARE));
            regs.wutr().write(|w| w.set_wut(secs.saturating_sub(1)));
            regs.scr().write(|w| w.set_cwutf(Calrf::CLEAR));
            regs.cr().modify(|w| {
                w.set_wutie(true);
                w.set_wute(true);
            });
        });
    }

    pub fn wakeup_elapsed(&self) -> bool {
        pac::RTC.sr().read().wutf()
    }

    pub fn stop_wakeup_timer(&mut self) {
        with_unlocked(|regs| {
            regs.cr().modify(|w| {
                w.set_wute(false);
                w.set_wutie(false);
            });
            regs.scr().write(|w| w.set_cwutf(Calrf::CLEAR));
        });
    }
}

fn with_unlocked<R>(f: impl FnOnce(pac::rtc::Rtc) -> R) -> R {
    let regs = pac::RTC;
    regs.wpr().write(|w| w.set_key(Key::DEACTIVATE1));
    regs.wpr().write(|w| w.set_key(Key::DEACTIVATE2));
    let result = f(regs);
    regs.wpr().write(|w| w.set_key(Key::ACTIVATE));
    result
}
