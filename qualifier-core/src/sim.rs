//! Simulated board and persistent region for host tests and the emulator.
//!
//! The simulated RTC keeps running across simulated reboots, the way the real
//! RTC does on its backup domain. Faults can be injected to exercise each
//! failure path of the procedures.

use core::fmt;
use core::time::Duration;

use crate::clock::{Monotonic, PowerControl, TimeSource, Timestamp, WakeSource};
use crate::persist::{PersistentRegion, RegionError};
use crate::procedures::SuspendRequest;

/// Size of the simulated backup region in bytes.
pub const SIM_REGION_LEN: usize = 32;

/// RTC reading at simulator power-up (2023-11-14T22:13:20Z).
pub const SIM_EPOCH_SECS: u32 = 1_700_000_000;

/// Offset applied by the early/late wake faults.
pub const SIM_WAKE_SKEW_SECS: i64 = 3;

/// In-memory persistent region.
#[derive(Clone, Debug, Eq, PartialEq)]
pub struct SimRegion {
    bytes: [u8; SIM_REGION_LEN],
    fail_writes: bool,
    writes: u32,
}

impl SimRegion {
    /// Region as shipped from the factory: every byte `0xFF`.
    #[must_use]
    pub const fn erased() -> Self {
        Self::filled(0xFF)
    }

    /// Region cleared to zero, as backup registers read after a domain reset.
    #[must_use]
    pub const fn zeroed() -> Self {
        Self::filled(0x00)
    }

    const fn filled(value: u8) -> Self {
        Self {
            bytes: [value; SIM_REGION_LEN],
            fail_writes: false,
            writes: 0,
        }
    }

    #[must_use]
    pub fn bytes(&self) -> &[u8] {
        &self.bytes
    }

    /// Overwrites raw bytes, bypassing the write fault.
    pub fn poke(&mut self, offset: usize, data: &[u8]) {
        if let Some(target) = self.bytes.get_mut(offset..offset + data.len()) {
            target.copy_from_slice(data);
        }
    }

    /// Makes every subsequent write fail with [`RegionError::Device`].
    pub fn set_fail_writes(&mut self, fail: bool) {
        self.fail_writes = fail;
    }

    #[must_use]
    pub fn fail_writes(&self) -> bool {
        self.fail_writes
    }

    /// Successful writes so far.
    #[must_use]
    pub fn writes(&self) -> u32 {
        self.writes
    }

    fn span(&self, offset: usize, len: usize) -> Result<core::ops::Range<usize>, RegionError> {
        match offset.checked_add(len) {
            Some(end) if end <= self.bytes.len() => Ok(offset..end),
            _ => Err(RegionError::OutOfBounds { offset, len }),
        }
    }
}

impl Default for SimRegion {
    fn default() -> Self {
        Self::erased()
    }
}

impl PersistentRegion for SimRegion {
    fn capacity(&self) -> usize {
        self.bytes.len()
    }

    fn read(&self, offset: usize, buf: &mut [u8]) -> Result<(), RegionError> {
        let span = self.span(offset, buf.len())?;
        buf.copy_from_slice(&self.bytes[span]);
        Ok(())
    }

    fn write(&mut self, offset: usize, data: &[u8]) -> Result<(), RegionError> {
        let span = self.span(offset, data.len())?;
        if self.fail_writes {
            return Err(RegionError::Device);
        }
        self.bytes[span].copy_from_slice(data);
        self.writes += 1;
        Ok(())
    }
}

/// Injectable board faults.
#[derive(Copy, Clone, Debug, Eq, PartialEq)]
pub enum SimFault {
    /// Stop-mode sleeps end [`SIM_WAKE_SKEW_SECS`] early.
    EarlyWake,
    /// Stop-mode sleeps end [`SIM_WAKE_SKEW_SECS`] late.
    LateWake,
    /// The RTC never reports the alarm flag.
    AlarmFlag,
    /// The wake pin never reads high.
    StuckPin,
}

impl SimFault {
    pub const ALL: [SimFault; 4] = [
        SimFault::EarlyWake,
        SimFault::LateWake,
        SimFault::AlarmFlag,
        SimFault::StuckPin,
    ];

    #[must_use]
    pub const fn name(self) -> &'static str {
        match self {
            SimFault::EarlyWake => "early-wake",
            SimFault::LateWake => "late-wake",
            SimFault::AlarmFlag => "alarm-flag",
            SimFault::StuckPin => "stuck-pin",
        }
    }

    #[must_use]
    pub fn from_name(name: &str) -> Option<Self> {
        Self::ALL
            .into_iter()
            .find(|fault| fault.name().eq_ignore_ascii_case(name))
    }
}

impl fmt::Display for SimFault {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}

/// Currently injected faults.
#[derive(Copy, Clone, Debug, Default, Eq, PartialEq)]
pub struct SimFaults {
    pub sleep_skew_secs: i64,
    pub alarm_flag_broken: bool,
    pub wake_pin_stuck_low: bool,
}

impl SimFaults {
    /// Toggles `fault`, returning whether it is now active.
    pub fn toggle(&mut self, fault: SimFault) -> bool {
        match fault {
            SimFault::EarlyWake => toggle_skew(&mut self.sleep_skew_secs, -SIM_WAKE_SKEW_SECS),
            SimFault::LateWake => toggle_skew(&mut self.sleep_skew_secs, SIM_WAKE_SKEW_SECS),
            SimFault::AlarmFlag => {
                self.alarm_flag_broken = !self.alarm_flag_broken;
                self.alarm_flag_broken
            }
            SimFault::StuckPin => {
                self.wake_pin_stuck_low = !self.wake_pin_stuck_low;
                self.wake_pin_stuck_low
            }
        }
    }
}

fn toggle_skew(skew: &mut i64, value: i64) -> bool {
    *skew = if *skew == value { 0 } else { value };
    *skew != 0
}

#[derive(Copy, Clone, Debug, Eq, PartialEq)]
struct SimAlarm {
    fires_at_millis: u64,
    wake_pin: bool,
    triggered: bool,
}

/// Board model covering the RTC, the uptime clock and stop-mode sleep.
#[derive(Clone, Debug, Eq, PartialEq)]
pub struct SimBoard {
    rtc_millis: u64,
    uptime: Duration,
    alarm: Option<SimAlarm>,
    boot_overhead: Duration,
    pub faults: SimFaults,
    pub alarms_armed: u32,
    pub stop_sleeps: u32,
    pub polls: u32,
    pub boots: u32,
}

impl SimBoard {
    #[must_use]
    pub fn new() -> Self {
        Self {
            rtc_millis: u64::from(SIM_EPOCH_SECS) * 1_000,
            uptime: Duration::ZERO,
            alarm: None,
            boot_overhead: Duration::from_millis(300),
            faults: SimFaults::default(),
            alarms_armed: 0,
            stop_sleeps: 0,
            polls: 0,
            boots: 1,
        }
    }

    /// Sets the time a simulated reboot takes before code runs again.
    #[must_use]
    pub fn with_boot_overhead(mut self, overhead: Duration) -> Self {
        self.boot_overhead = overhead;
        self
    }

    /// Sets the RTC to `secs`.
    pub fn set_rtc(&mut self, secs: u32) {
        self.rtc_millis = u64::from(secs) * 1_000;
    }

    /// Moves the RTC without touching the uptime clock.
    pub fn shift_rtc(&mut self, delta_secs: i64) {
        let delta_millis = delta_secs.saturating_mul(1_000);
        self.rtc_millis = self.rtc_millis.saturating_add_signed(delta_millis);
    }

    /// Returns `true` while an alarm is armed and has not fired.
    #[must_use]
    pub fn alarm_pending(&self) -> bool {
        self.alarm.is_some_and(|alarm| !alarm.triggered)
    }

    /// Simulates the reboot that follows a suspend request: the RTC advances
    /// to the armed alarm (or by `wake_after` if none is armed), then volatile
    /// state restarts.
    pub fn resume_from(&mut self, request: &SuspendRequest) {
        let wake_at = match self.alarm {
            Some(alarm) if !alarm.triggered => alarm.fires_at_millis,
            _ => self.rtc_millis.saturating_add(millis(request.wake_after)),
        };
        self.rtc_millis = self.rtc_millis.max(wake_at);
        self.latch_alarm();
        self.power_cycle();
    }

    /// Simulates a reset: uptime restarts after the boot overhead.
    pub fn power_cycle(&mut self) {
        self.rtc_millis = self.rtc_millis.saturating_add(millis(self.boot_overhead));
        self.uptime = Duration::ZERO;
        self.boots += 1;
        self.latch_alarm();
    }

    fn advance(&mut self, duration: Duration) {
        self.rtc_millis = self.rtc_millis.saturating_add(millis(duration));
        self.uptime = self.uptime.saturating_add(duration);
        self.latch_alarm();
    }

    fn latch_alarm(&mut self) {
        let now = self.rtc_millis;
        if let Some(alarm) = self.alarm.as_mut() {
            if now >= alarm.fires_at_millis {
                alarm.triggered = true;
            }
        }
    }

    fn pin_wake_at(&self) -> Option<u64> {
        self.alarm
            .filter(|alarm| alarm.wake_pin && !self.faults.wake_pin_stuck_low)
            .map(|alarm| alarm.fires_at_millis)
    }
}

impl Default for SimBoard {
    fn default() -> Self {
        Self::new()
    }
}

fn millis(duration: Duration) -> u64 {
    u64::try_from(duration.as_millis()).unwrap_or(u64::MAX)
}

impl TimeSource for SimBoard {
    fn poll(&mut self) {
        self.polls += 1;
        self.latch_alarm();
    }

    fn now(&self) -> Timestamp {
        let secs = self.rtc_millis / 1_000;
        Timestamp::from_secs(u32::try_from(secs).unwrap_or(u32::MAX))
    }

    fn arm_alarm(&mut self, after: Duration, wake_pin: bool) {
        self.alarms_armed += 1;
        // The RTC compares whole seconds, so the alarm lands on a second
        // boundary.
        let after_secs = after.as_secs() + u64::from(after.subsec_nanos() > 0);
        let fires_at_secs = (self.rtc_millis / 1_000).saturating_add(after_secs);
        self.alarm = Some(SimAlarm {
            fires_at_millis: fires_at_secs.saturating_mul(1_000),
            wake_pin,
            triggered: false,
        });
    }

    fn alarm_fired(&self) -> bool {
        !self.faults.alarm_flag_broken && self.alarm.is_some_and(|alarm| alarm.triggered)
    }

    fn clear_alarm(&mut self) {
        self.alarm = None;
    }
}

impl Monotonic for SimBoard {
    fn uptime(&self) -> Duration {
        self.uptime
    }

    fn delay(&mut self, duration: Duration) {
        self.advance(duration);
    }
}

impl PowerControl for SimBoard {
    fn stop_sleep(&mut self, duration: Duration, wake: WakeSource) {
        self.stop_sleeps += 1;

        let skew_millis = self.faults.sleep_skew_secs.saturating_mul(1_000);
        let timer_wake = self
            .rtc_millis
            .saturating_add(millis(duration))
            .saturating_add_signed(skew_millis);
        let wake_at = match (wake, self.pin_wake_at()) {
            (WakeSource::TimerOrPin, Some(pin)) if pin >= self.rtc_millis => timer_wake.min(pin),
            _ => timer_wake,
        };

        let slept = wake_at.saturating_sub(self.rtc_millis);
        self.advance(Duration::from_millis(slept));
    }

    fn wake_pin_high(&self) -> bool {
        !self.faults.wake_pin_stuck_low
            && self
                .alarm
                .is_some_and(|alarm| alarm.wake_pin && alarm.triggered)
    }
}

/// Wraps a board so `now()` returns the time latched at the last poll, alarm
/// arm or stop-mode wake, the way the firmware RTC driver caches it.
#[derive(Clone, Debug)]
pub struct LatchedRtc<B> {
    inner: B,
    latched: Timestamp,
}

impl<B: TimeSource> LatchedRtc<B> {
    pub fn new(inner: B) -> Self {
        let latched = inner.now();
        Self { inner, latched }
    }

    pub fn inner_mut(&mut self) -> &mut B {
        &mut self.inner
    }

    pub fn into_inner(self) -> B {
        self.inner
    }

    fn latch(&mut self) {
        self.latched = self.inner.now();
    }
}

impl<B: TimeSource> TimeSource for LatchedRtc<B> {
    fn poll(&mut self) {
        self.inner.poll();
        self.latch();
    }

    fn now(&self) -> Timestamp {
        self.latched
    }

    fn arm_alarm(&mut self, after: Duration, wake_pin: bool) {
        self.inner.arm_alarm(after, wake_pin);
        self.latch();
    }

    fn alarm_fired(&self) -> bool {
        self.inner.alarm_fired()
    }

    fn clear_alarm(&mut self) {
        self.inner.clear_alarm();
    }
}

impl<B: Monotonic> Monotonic for LatchedRtc<B> {
    fn uptime(&self) -> Duration {
        self.inner.uptime()
    }

    fn delay(&mut self, duration: Duration) {
        self.inner.delay(duration);
    }
}

impl<B: TimeSource + PowerControl> PowerControl for LatchedRtc<B> {
    fn stop_sleep(&mut self, duration: Duration, wake: WakeSource) {
        self.inner.stop_sleep(duration, wake);
        self.latch();
    }

    fn wake_pin_high(&self) -> bool {
        self.inner.wake_pin_high()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::procedures::SuspendMode;

    #[test]
    fn region_rejects_out_of_bounds_access() {
        let mut region = SimRegion::zeroed();
        let mut buf = [0u8; 4];
        assert_eq!(
            region.read(SIM_REGION_LEN - 2, &mut buf),
            Err(RegionError::OutOfBounds {
                offset: SIM_REGION_LEN - 2,
                len: 4
            })
        );
        assert!(region.write(SIM_REGION_LEN, &[1]).is_err());
        assert_eq!(region.writes(), 0);
    }

    #[test]
    fn failing_region_keeps_contents() {
        let mut region = SimRegion::zeroed();
        region.set_fail_writes(true);
        assert_eq!(region.write(0, &[7]), Err(RegionError::Device));
        assert_eq!(region.bytes()[0], 0);
    }

    #[test]
    fn alarm_latches_after_delay() {
        let mut board = SimBoard::new();
        board.arm_alarm(Duration::from_secs(2), true);
        board.delay(Duration::from_millis(1_900));
        assert!(!board.alarm_fired());

        board.delay(Duration::from_millis(100));
        assert!(board.alarm_fired());
        assert!(board.wake_pin_high());

        board.clear_alarm();
        assert!(!board.alarm_fired());
        assert!(!board.wake_pin_high());
    }

    #[test]
    fn pin_wake_ends_stop_sleep_at_alarm() {
        let mut board = SimBoard::new();
        board.faults.toggle(SimFault::LateWake);
        let start = board.now();

        board.arm_alarm(Duration::from_secs(5), true);
        board.stop_sleep(Duration::from_secs(5), WakeSource::TimerOrPin);
        assert_eq!(board.now().checked_secs_since(start), Some(5));

        board.stop_sleep(Duration::from_secs(5), WakeSource::Timer);
        assert_eq!(board.now().checked_secs_since(start), Some(13));
    }

    #[test]
    fn resume_jumps_to_armed_alarm_and_restarts_uptime() {
        let mut board = SimBoard::new().with_boot_overhead(Duration::ZERO);
        board.delay(Duration::from_secs(1));
        let start = board.now();
        board.arm_alarm(Duration::from_secs(30), true);

        board.resume_from(&SuspendRequest {
            mode: SuspendMode::DeepSleep,
            wake_after: Duration::from_secs(30),
        });

        assert_eq!(board.uptime(), Duration::ZERO);
        assert_eq!(board.boots, 2);
        assert_eq!(board.now().checked_secs_since(start), Some(30));
        assert!(board.alarm_fired());
    }

    #[test]
    fn faults_toggle_by_name() {
        let mut faults = SimFaults::default();
        let fault = SimFault::from_name("EARLY-WAKE").expect("known fault");
        assert!(faults.toggle(fault));
        assert_eq!(faults.sleep_skew_secs, -SIM_WAKE_SKEW_SECS);
        assert!(faults.toggle(SimFault::LateWake));
        assert_eq!(faults.sleep_skew_secs, SIM_WAKE_SKEW_SECS);
        assert!(!faults.toggle(SimFault::LateWake));
        assert_eq!(SimFault::from_name("meteor"), None);
    }
}
