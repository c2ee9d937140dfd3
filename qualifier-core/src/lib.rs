#![cfg_attr(not(test), no_std)]

// Shared logic for the carrier-board qualification harness.
//
// This crate stays portable across MCU firmware and host tooling by avoiding the
// Rust standard library and describing every board capability as a trait the
// other crates implement.

pub mod bench;
pub mod clock;
pub mod config;
pub mod console;
pub mod elapsed;
pub mod notify;
pub mod persist;
pub mod procedures;
pub mod sequencer;
pub mod sim;
pub mod status;
pub mod watchdog;
