//! Serial console plumbing shared by the UART and sequencer tasks.

#![cfg_attr(not(target_os = "none"), allow(dead_code))]

use core::fmt::Write as _;

use heapless::String;
use qualifier_core::console::{CommandDispatcher, ConsoleError, Line, execute_line};

/// Longest reply a single command may produce; `help` is the largest.
pub const REPLY_LEN: usize = 512;
/// Lines waiting for the sequencer.
pub const LINE_QUEUE_DEPTH: usize = 2;

pub type Reply = String<REPLY_LEN>;

#[cfg(target_os = "none")]
pub type LineQueue = embassy_sync::channel::Channel<
    embassy_sync::blocking_mutex::raw::CriticalSectionRawMutex,
    Line,
    LINE_QUEUE_DEPTH,
>;

#[cfg(target_os = "none")]
pub type ReplyQueue = embassy_sync::channel::Channel<
    embassy_sync::blocking_mutex::raw::CriticalSectionRawMutex,
    Reply,
    1,
>;

/// Runs `line` and renders the outcome, always ending with a prompt.
pub fn respond<D>(dispatcher: &mut D, line: &Line) -> Reply
where
    D: CommandDispatcher + ?Sized,
{
    let mut reply = Reply::new();
    if let Err(error) = execute_line(dispatcher, line.as_str(), &mut reply) {
        // A full reply buffer is reported as an output error; keep what fits.
        let _ = writeln!(reply, "error: {error}");
    }
    let _ = reply.push_str(PROMPT);
    reply
}

/// Renders an assembler error, e.g. an overlong line.
pub fn reject(error: ConsoleError) -> Reply {
    let mut reply = Reply::new();
    let _ = writeln!(reply, "error: {error}");
    let _ = reply.push_str(PROMPT);
    reply
}

pub const PROMPT: &str = "> ";

#[cfg(test)]
mod tests {
    use super::*;
    use qualifier_core::config::HarnessConfig;
    use qualifier_core::console::SequencerConsole;
    use qualifier_core::notify::NotificationLog;
    use qualifier_core::procedures::TestPlan;
    use qualifier_core::sequencer::TestSequencer;
    use qualifier_core::sim::{SimBoard, SimRegion};
    use qualifier_core::watchdog::WakeFlag;

    fn line(text: &str) -> Line {
        let mut line = Line::new();
        line.push_str(text).unwrap();
        line
    }

    fn reply_to(text: &str) -> Reply {
        let watchdog = WakeFlag::new();
        let mut sequencer = TestSequencer::boot(
            SimBoard::new(),
            SimRegion::erased(),
            NotificationLog::<8>::new(),
            &watchdog,
            TestPlan::FULL,
            HarnessConfig::default(),
        );
        respond(&mut SequencerConsole::new(&mut sequencer), &line(text))
    }

    #[test]
    fn successful_command_is_followed_by_prompt() {
        let reply = reply_to("duration 30");
        assert_eq!(reply.as_str(), "duration 30s (code 0)\n> ");
    }

    #[test]
    fn errors_are_rendered_inline() {
        let reply = reply_to("launch");
        assert!(reply.starts_with("error: "));
        assert!(reply.ends_with(PROMPT));

        let reply = reply_to("reboot");
        assert!(reply.starts_with("error: "));
    }

    #[test]
    fn device_help_fits_in_one_reply() {
        let reply = reply_to("help");
        assert!(reply.contains("duration"));
        assert!(reply.ends_with(PROMPT));
    }

    #[test]
    fn assembler_errors_are_reported() {
        let reply = reject(ConsoleError::LineOverflow);
        assert!(reply.starts_with("error: "));
    }
}
