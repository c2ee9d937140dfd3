//! Board adapters for the STM32G0 qualification carrier.
//!
//! The calendar math is target-independent and unit tested on the host; the
//! peripheral adapters only exist in the embedded build.

pub mod calendar;

#[cfg(target_os = "none")]
pub mod backup;
#[cfg(target_os = "none")]
pub mod board;
#[cfg(target_os = "none")]
pub mod rtc;
#[cfg(target_os = "none")]
pub mod suspend;
