//! Notification sink that forwards everything to the log transport.
//!
//! On target the lines go out over defmt-rtt; host builds print them so the
//! glue can be exercised by unit tests.

#![cfg_attr(not(target_os = "none"), allow(dead_code))]

use qualifier_core::notify::{Notification, NotificationSink, Topic};
use qualifier_core::sequencer::BootReport;

/// Sink handed to the sequencer on hardware.
#[derive(Debug, Default)]
pub struct LogSink {
    emitted: u32,
}

impl LogSink {
    pub const fn new() -> Self {
        Self { emitted: 0 }
    }

    pub fn emitted(&self) -> u32 {
        self.emitted
    }
}

impl NotificationSink for LogSink {
    fn emit(&mut self, notification: &Notification) {
        self.emitted = self.emitted.wrapping_add(1);
        let level = match notification.topic {
            Topic::Storage => LogLevel::Warn,
            _ => LogLevel::Info,
        };
        emit_log(level, notification.topic.label(), notification.payload.as_str());
    }
}

#[derive(Copy, Clone, Debug, Eq, PartialEq)]
enum LogLevel {
    Info,
    Warn,
}

/// Logs what the sequencer found in persistent storage at boot.
pub fn log_boot(report: &BootReport) {
    if report.layout_reset {
        emit_log(LogLevel::Warn, "boot", "record layout reset");
    }
    if report.clamped {
        emit_log(LogLevel::Warn, "boot", "current index out of range, restarting");
    }
    if report.stale_interval {
        emit_log(LogLevel::Warn, "boot", "discarded stale interval");
    }
    if let Some(test) = report.resumed {
        emit_log(LogLevel::Info, "resume", test.name());
    }
}

#[cfg(target_os = "none")]
fn emit_log(level: LogLevel, label: &'static str, text: &str) {
    match level {
        LogLevel::Info => defmt::info!("qualifier:{} {}", label, text),
        LogLevel::Warn => defmt::warn!("qualifier:{} {}", label, text),
    }
}

#[cfg(not(target_os = "none"))]
fn emit_log(level: LogLevel, label: &'static str, text: &str) {
    match level {
        LogLevel::Info => println!("qualifier:{label} {text}"),
        LogLevel::Warn => println!("qualifier:{label} warning: {text}"),
    }
}
