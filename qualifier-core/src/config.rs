//! Harness tuning knobs and the runtime test-duration setting.
//!
//! Compile-time defaults live here as documented constants and are gathered
//! into [`HarnessConfig`]. The only value that can change at runtime is the
//! per-test duration, which is validated by [`parse_test_duration`] before the
//! sequencer persists it.

use core::fmt;
use core::time::Duration;

use crate::console::grammar;

/// Duration used when the persisted value is missing or out of range.
pub const DEFAULT_TEST_DURATION_SECS: u16 = 10;
/// Largest accepted test duration (one hour).
pub const MAX_TEST_DURATION_SECS: u16 = 3_600;
/// How far a timed interval may undershoot its target.
pub const DEFAULT_TOLERANCE_SECS: u32 = 2;
/// Extra undershoot allowance for tests that reboot the processor.
pub const DEFAULT_BOOT_OVERHEAD_SECS: u32 = 1;
/// Slack added to the target duration while waiting for the RTC alarm.
pub const DEFAULT_ALARM_TIMEOUT_MARGIN: Duration = Duration::from_secs(2);
/// Interval between RTC polls while waiting for the alarm.
pub const DEFAULT_ALARM_POLL_INTERVAL: Duration = Duration::from_millis(100);
/// Pause after publishing the tally before the suite restarts.
pub const DEFAULT_REPORT_DELAY: Duration = Duration::from_secs(5);
/// Minimum spacing between two notifications.
pub const DEFAULT_PUBLISH_INTERVAL: Duration = Duration::from_secs(1);

/// Static tuning for a harness run.
#[derive(Copy, Clone, Debug, Eq, PartialEq)]
pub struct HarnessConfig {
    /// Allowed undershoot for every timed test.
    pub tolerance_secs: u32,
    /// Additional undershoot allowed for deep-sleep and power-off tests.
    pub boot_overhead_secs: u32,
    /// Added to the target duration to form the alarm wait deadline.
    pub alarm_timeout_margin: Duration,
    /// Granularity of the alarm wait loop.
    pub alarm_poll_interval: Duration,
    /// Delay applied after the tally is published.
    pub report_delay: Duration,
    /// Rate limit for the notification channel.
    pub publish_interval: Duration,
}

impl HarnessConfig {
    /// Configuration populated with the documented defaults.
    #[must_use]
    pub const fn new() -> Self {
        Self {
            tolerance_secs: DEFAULT_TOLERANCE_SECS,
            boot_overhead_secs: DEFAULT_BOOT_OVERHEAD_SECS,
            alarm_timeout_margin: DEFAULT_ALARM_TIMEOUT_MARGIN,
            alarm_poll_interval: DEFAULT_ALARM_POLL_INTERVAL,
            report_delay: DEFAULT_REPORT_DELAY,
            publish_interval: DEFAULT_PUBLISH_INTERVAL,
        }
    }

    /// Returns a copy with a different report delay.
    #[must_use]
    pub const fn with_report_delay(mut self, delay: Duration) -> Self {
        self.report_delay = delay;
        self
    }

    /// Returns a copy with a different alarm poll interval.
    #[must_use]
    pub const fn with_alarm_poll_interval(mut self, interval: Duration) -> Self {
        self.alarm_poll_interval = interval;
        self
    }
}

impl Default for HarnessConfig {
    fn default() -> Self {
        Self::new()
    }
}

/// Reasons a duration update is rejected.
#[derive(Copy, Clone, Debug, Eq, PartialEq)]
pub enum ConfigError {
    /// The value parsed but lies outside `0..=3600` seconds.
    OutOfRange { requested: i64 },
    /// The input is not a decimal integer.
    Malformed,
}

impl ConfigError {
    /// Integer result code for callers that only understand numbers.
    #[must_use]
    pub const fn code(self) -> i32 {
        match self {
            ConfigError::OutOfRange { .. } => -1,
            ConfigError::Malformed => -2,
        }
    }
}

impl fmt::Display for ConfigError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ConfigError::OutOfRange { requested } => write!(
                f,
                "duration {requested}s outside 0..={MAX_TEST_DURATION_SECS}s"
            ),
            ConfigError::Malformed => f.write_str("duration must be a whole number of seconds"),
        }
    }
}

/// Checks that `secs` is an acceptable test duration.
pub fn validate_test_duration(secs: i64) -> Result<u16, ConfigError> {
    match u16::try_from(secs) {
        Ok(value) if value <= MAX_TEST_DURATION_SECS => Ok(value),
        _ => Err(ConfigError::OutOfRange { requested: secs }),
    }
}

/// Parses and validates a duration supplied as text, e.g. `"120"`.
pub fn parse_test_duration(input: &str) -> Result<u16, ConfigError> {
    let secs = grammar::parse_integer(input).map_err(|_| ConfigError::Malformed)?;
    validate_test_duration(secs)
}

/// Integer result code for a duration update (`0` on success).
#[must_use]
pub fn result_code<T>(result: &Result<T, ConfigError>) -> i32 {
    match result {
        Ok(_) => 0,
        Err(error) => error.code(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn duration_bounds_are_inclusive() {
        assert_eq!(parse_test_duration("0"), Ok(0));
        assert_eq!(parse_test_duration("3600"), Ok(3_600));
        assert_eq!(
            parse_test_duration("-1"),
            Err(ConfigError::OutOfRange { requested: -1 })
        );
        assert_eq!(
            parse_test_duration("3601"),
            Err(ConfigError::OutOfRange { requested: 3_601 })
        );
    }

    #[test]
    fn malformed_input_is_rejected() {
        assert_eq!(parse_test_duration(""), Err(ConfigError::Malformed));
        assert_eq!(parse_test_duration("ten"), Err(ConfigError::Malformed));
        assert_eq!(parse_test_duration("12s"), Err(ConfigError::Malformed));
    }

    #[test]
    fn surrounding_whitespace_is_ignored() {
        assert_eq!(parse_test_duration("  42 \r\n"), Ok(42));
    }

    #[test]
    fn result_codes_follow_cloud_function_convention() {
        assert_eq!(result_code(&parse_test_duration("30")), 0);
        assert_eq!(result_code(&parse_test_duration("9999")), -1);
        assert_eq!(result_code(&parse_test_duration("abc")), -2);
    }
}
