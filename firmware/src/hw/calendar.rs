//! Conversions between the RTC calendar registers and linear seconds.
//!
//! The STM32 RTC counts a calendar starting at 2000-01-01 00:00:00; the
//! harness works in whole seconds from that instant.

#![cfg_attr(not(target_os = "none"), allow(dead_code))]

use core::time::Duration;

pub const SECS_PER_DAY: u32 = 86_400;

/// Broken-down calendar time as read from the RTC.
#[derive(Copy, Clone, Debug, Eq, PartialEq)]
pub struct CalendarTime {
    pub year: u16,
    pub month: u8,
    pub day: u8,
    pub hour: u8,
    pub minute: u8,
    pub second: u8,
}

impl CalendarTime {
    /// Seconds since 2000-01-01, or `None` for dates the RTC cannot hold.
    pub fn secs_since_2000(&self) -> Option<u32> {
        if !(2000..=2099).contains(&self.year) || !(1..=12).contains(&self.month) {
            return None;
        }
        if self.day == 0 || self.day > days_in_month(self.year, self.month) {
            return None;
        }

        let years = u32::from(self.year - 2000);
        // Every fourth year from 2000 is a leap year within the RTC range.
        let mut days = years * 365 + years.div_ceil(4);
        days += (1..self.month)
            .map(|month| u32::from(days_in_month(self.year, month)))
            .sum::<u32>();
        days += u32::from(self.day) - 1;

        Some(
            days * SECS_PER_DAY
                + u32::from(self.hour) * 3_600
                + u32::from(self.minute) * 60
                + u32::from(self.second),
        )
    }
}

/// Hour, minute and second of `secs` within its day.
pub fn time_of_day(secs: u32) -> (u8, u8, u8) {
    let within = secs % SECS_PER_DAY;
    // Bounded by the modulo above.
    #[allow(clippy::cast_possible_truncation)]
    (
        (within / 3_600) as u8,
        (within / 60 % 60) as u8,
        (within % 60) as u8,
    )
}

/// Wakeup timer period for `duration` in whole seconds, partial seconds
/// rounded up. Zero means no sleep is needed.
pub fn wakeup_secs(duration: Duration) -> u16 {
    let secs = duration
        .as_secs()
        .saturating_add(u64::from(duration.subsec_nanos() > 0));
    u16::try_from(secs).unwrap_or(u16::MAX)
}

/// Splits a two-digit value into BCD tens and units.
pub const fn bcd(value: u8) -> (u8, u8) {
    (value / 10, value % 10)
}

fn days_in_month(year: u16, month: u8) -> u8 {
    match month {
        2 if year % 4 == 0 => 29,
        2 => 28,
        4 | 6 | 9 | 11 => 30,
        _ => 31,
    }
}
