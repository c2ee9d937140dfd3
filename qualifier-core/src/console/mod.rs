//! Operator console shared by the firmware UART and the emulator.
//!
//! Bytes are assembled into lines by [`LineAssembler`], parsed by
//! [`grammar::parse`] and handed to a [`CommandDispatcher`]. Responses are
//! written to any `core::fmt::Write` sink so the same code runs over a
//! `heapless::String` on the MCU and stdout on the host.

use core::fmt;
use core::str;

use heapless::{String, Vec};

use crate::config::ConfigError;

pub mod commands;
pub mod grammar;

pub use commands::{CommandScope, HELP_TOPICS, HelpTopic, SequencerConsole};
pub use grammar::{Command, GrammarError};

/// Maximum number of bytes accepted on a single line (excluding terminator).
pub const MAX_LINE_LEN: usize = 96;

/// A complete console line.
pub type Line = String<MAX_LINE_LEN>;

/// Errors returned by command dispatchers.
#[derive(Copy, Clone, Debug, Eq, PartialEq)]
pub enum DispatchError {
    /// The command exists but this console does not handle it.
    Unsupported(&'static str),
    /// `help` was asked about a topic it does not know.
    UnknownTopic,
    /// The new configuration value was rejected.
    Rejected(ConfigError),
    /// The response could not be written.
    Output,
}

impl fmt::Display for DispatchError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            DispatchError::Unsupported(keyword) => {
                write!(f, "`{keyword}` is not available on this console")
            }
            DispatchError::UnknownTopic => f.write_str("no help for that topic"),
            DispatchError::Rejected(error) => write!(f, "rejected: {error}"),
            DispatchError::Output => f.write_str("response truncated"),
        }
    }
}

impl From<fmt::Error> for DispatchError {
    fn from(_: fmt::Error) -> Self {
        DispatchError::Output
    }
}

impl From<ConfigError> for DispatchError {
    fn from(error: ConfigError) -> Self {
        DispatchError::Rejected(error)
    }
}

/// Errors surfaced while turning input into an executed command.
#[derive(Copy, Clone, Debug, Eq, PartialEq)]
pub enum ConsoleError {
    /// Input exceeded [`MAX_LINE_LEN`].
    LineOverflow,
    /// The line is not valid UTF-8.
    InvalidUtf8,
    /// The parser rejected the line.
    Grammar(GrammarError),
    /// The dispatcher rejected the command.
    Dispatch(DispatchError),
}

impl fmt::Display for ConsoleError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ConsoleError::LineOverflow => {
                write!(f, "line longer than {MAX_LINE_LEN} bytes")
            }
            ConsoleError::InvalidUtf8 => f.write_str("line is not valid UTF-8"),
            ConsoleError::Grammar(error) => write!(f, "{error}"),
            ConsoleError::Dispatch(error) => write!(f, "{error}"),
        }
    }
}

impl From<GrammarError> for ConsoleError {
    fn from(error: GrammarError) -> Self {
        ConsoleError::Grammar(error)
    }
}

impl From<DispatchError> for ConsoleError {
    fn from(error: DispatchError) -> Self {
        ConsoleError::Dispatch(error)
    }
}

/// Executes parsed commands.
pub trait CommandDispatcher {
    fn dispatch(
        &mut self,
        command: Command<'_>,
        out: &mut dyn fmt::Write,
    ) -> Result<(), DispatchError>;
}

/// Parses `line` and dispatches it.
pub fn execute_line<D>(
    dispatcher: &mut D,
    line: &str,
    out: &mut dyn fmt::Write,
) -> Result<(), ConsoleError>
where
    D: CommandDispatcher + ?Sized,
{
    let command = grammar::parse(line)?;
    dispatcher.dispatch(command, out)?;
    Ok(())
}

/// Collects bytes into lines, handling backspace and CR/LF terminators.
pub struct LineAssembler {
    buffer: Vec<u8, MAX_LINE_LEN>,
    overflowed: bool,
}

impl LineAssembler {
    #[must_use]
    pub const fn new() -> Self {
        Self {
            buffer: Vec::new(),
            overflowed: false,
        }
    }

    /// Feeds one byte. Returns a line once a terminator arrives; blank lines
    /// are skipped. After an overflow the rest of the line is discarded.
    pub fn push(&mut self, byte: u8) -> Result<Option<Line>, ConsoleError> {
        match byte {
            b'\r' | b'\n' => self.finish(),
            0x08 | 0x7f => {
                self.buffer.pop();
                Ok(None)
            }
            _ if self.overflowed => Ok(None),
            value => {
                if self.buffer.push(value).is_err() {
                    self.overflowed = true;
                    return Err(ConsoleError::LineOverflow);
                }
                Ok(None)
            }
        }
    }

    /// Discards any partial line.
    pub fn clear(&mut self) {
        self.buffer.clear();
        self.overflowed = false;
    }

    #[must_use]
    pub fn pending(&self) -> usize {
        self.buffer.len()
    }

    fn finish(&mut self) -> Result<Option<Line>, ConsoleError> {
        let overflowed = self.overflowed;
        let result = str::from_utf8(&self.buffer)
            .map_err(|_| ConsoleError::InvalidUtf8)
            .map(|text| {
                let mut line = Line::new();
                // Capacities match, so this cannot fail.
                let _ = line.push_str(text);
                line
            });
        self.clear();

        match result {
            _ if overflowed => Ok(None),
            Ok(line) if line.trim().is_empty() => Ok(None),
            Ok(line) => Ok(Some(line)),
            Err(error) => Err(error),
        }
    }
}

impl Default for LineAssembler {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[derive(Default)]
    struct RecordingDispatcher {
        hits: usize,
        last: Option<&'static str>,
    }

    impl CommandDispatcher for RecordingDispatcher {
        fn dispatch(
            &mut self,
            command: Command<'_>,
            out: &mut dyn fmt::Write,
        ) -> Result<(), DispatchError> {
            self.hits += 1;
            self.last = Some(command.keyword());
            out.write_str("ok")?;
            Ok(())
        }
    }

    fn feed(assembler: &mut LineAssembler, bytes: &[u8]) -> Vec<Line, 4> {
        let mut lines = Vec::new();
        for byte in bytes {
            if let Ok(Some(line)) = assembler.push(*byte) {
                lines.push(line).unwrap();
            }
        }
        lines
    }

    #[test]
    fn assembles_lines_and_skips_blanks() {
        let mut assembler = LineAssembler::new();
        let lines = feed(&mut assembler, b"status\r\n\r\nhelpx\x7f\n");
        assert_eq!(lines.len(), 2);
        assert_eq!(lines[0].as_str(), "status");
        assert_eq!(lines[1].as_str(), "help");
        assert_eq!(assembler.pending(), 0);
    }

    #[test]
    fn overflow_discards_rest_of_line() {
        let mut assembler = LineAssembler::new();
        for _ in 0..MAX_LINE_LEN {
            assert_eq!(assembler.push(b'a'), Ok(None));
        }
        assert_eq!(assembler.push(b'b'), Err(ConsoleError::LineOverflow));
        assert_eq!(assembler.push(b'c'), Ok(None));
        assert_eq!(assembler.push(b'\n'), Ok(None));

        let lines = feed(&mut assembler, b"version\n");
        assert_eq!(lines[0].as_str(), "version");
    }

    #[test]
    fn execute_line_routes_to_dispatcher() {
        let mut dispatcher = RecordingDispatcher::default();
        let mut out = std::string::String::new();

        execute_line(&mut dispatcher, "STATUS", &mut out).unwrap();
        assert_eq!(dispatcher.hits, 1);
        assert_eq!(dispatcher.last, Some("status"));
        assert_eq!(out, "ok");

        assert!(matches!(
            execute_line(&mut dispatcher, "bogus", &mut out),
            Err(ConsoleError::Grammar(GrammarError::Syntax { .. }))
        ));
        assert_eq!(dispatcher.hits, 1);
    }
}
