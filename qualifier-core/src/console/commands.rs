//! Console commands backed by the test sequencer.

use core::fmt;

use crate::clock::Board;
use crate::config::result_code;
use crate::notify::NotificationSink;
use crate::persist::PersistentRegion;
use crate::sequencer::TestSequencer;
use crate::status::FIRMWARE_RELEASE;

use super::{Command, CommandDispatcher, DispatchError};

/// Where a command is available.
#[derive(Copy, Clone, Debug, Eq, PartialEq)]
pub enum CommandScope {
    /// Firmware and emulator.
    Device,
    /// Emulator only.
    Emulator,
}

/// Help entry for one command.
#[derive(Copy, Clone, Debug, Eq, PartialEq)]
pub struct HelpTopic {
    pub keyword: &'static str,
    pub usage: &'static str,
    pub summary: &'static str,
    pub scope: CommandScope,
}

pub const HELP_TOPICS: [HelpTopic; 9] = [
    HelpTopic {
        keyword: "duration",
        usage: "duration <secs>",
        summary: "set the per-test duration (0-3600 s)",
        scope: CommandScope::Device,
    },
    HelpTopic {
        keyword: "status",
        usage: "status",
        summary: "show sequencer state and persisted record",
        scope: CommandScope::Device,
    },
    HelpTopic {
        keyword: "version",
        usage: "version",
        summary: "show the firmware release",
        scope: CommandScope::Device,
    },
    HelpTopic {
        keyword: "help",
        usage: "help [topic]",
        summary: "list commands or describe one",
        scope: CommandScope::Device,
    },
    HelpTopic {
        keyword: "tick",
        usage: "tick [n]",
        summary: "run n sequencer ticks (default 1)",
        scope: CommandScope::Emulator,
    },
    HelpTopic {
        keyword: "cycle",
        usage: "cycle",
        summary: "run until the tally is reported",
        scope: CommandScope::Emulator,
    },
    HelpTopic {
        keyword: "watchdog",
        usage: "watchdog",
        summary: "fire the wake-pin interrupt",
        scope: CommandScope::Emulator,
    },
    HelpTopic {
        keyword: "fault",
        usage: "fault <early-wake|late-wake|alarm-flag|stuck-pin|storage>",
        summary: "toggle a simulated fault",
        scope: CommandScope::Emulator,
    },
    HelpTopic {
        keyword: "reboot",
        usage: "reboot",
        summary: "simulate a power cycle",
        scope: CommandScope::Emulator,
    },
];

/// Looks up the help entry for `keyword`.
#[must_use]
pub fn help_topic(keyword: &str) -> Option<&'static HelpTopic> {
    HELP_TOPICS
        .iter()
        .find(|topic| topic.keyword.eq_ignore_ascii_case(keyword))
}

/// Writes help for `topic`, or the command list for `scope` when `None`.
pub fn write_help(
    out: &mut dyn fmt::Write,
    topic: Option<&str>,
    scope: CommandScope,
) -> Result<(), DispatchError> {
    match topic {
        Some(keyword) => {
            let entry = help_topic(keyword)
                .filter(|entry| scope == CommandScope::Emulator || entry.scope == scope)
                .ok_or(DispatchError::UnknownTopic)?;
            writeln!(out, "{}: {}", entry.usage, entry.summary)?;
        }
        None => {
            for entry in HELP_TOPICS
                .iter()
                .filter(|entry| scope == CommandScope::Emulator || entry.scope == scope)
            {
                writeln!(out, "  {:<10} {}", entry.keyword, entry.summary)?;
            }
        }
    }
    Ok(())
}

/// Dispatcher for the device commands. Emulator-only commands come back as
/// [`DispatchError::Unsupported`] so a host wrapper can handle them.
pub struct SequencerConsole<'s, 'w, B, R, S> {
    sequencer: &'s mut TestSequencer<'w, B, R, S>,
}

impl<'s, 'w, B, R, S> SequencerConsole<'s, 'w, B, R, S>
where
    B: Board,
    R: PersistentRegion,
    S: NotificationSink,
{
    pub fn new(sequencer: &'s mut TestSequencer<'w, B, R, S>) -> Self {
        Self { sequencer }
    }
}

impl<B, R, S> CommandDispatcher for SequencerConsole<'_, '_, B, R, S>
where
    B: Board,
    R: PersistentRegion,
    S: NotificationSink,
{
    fn dispatch(
        &mut self,
        command: Command<'_>,
        out: &mut dyn fmt::Write,
    ) -> Result<(), DispatchError> {
        match command {
            Command::Duration(secs) => {
                let result = self.sequencer.set_test_duration_secs(secs);
                let code = result_code(&result);
                let applied = result?;
                writeln!(out, "duration {applied}s (code {code})")?;
            }
            Command::Status => writeln!(out, "{}", self.sequencer.status())?,
            Command::Version => writeln!(out, "{FIRMWARE_RELEASE}")?,
            Command::Help(topic) => write_help(out, topic, CommandScope::Device)?,
            other => return Err(DispatchError::Unsupported(other.keyword())),
        }
        Ok(())
    }
}
