#![allow(clippy::module_name_repetitions)]

//! Line grammar for the operator console.
//!
//! Keywords are case-insensitive and separated from their arguments by
//! spaces or tabs. A trailing `\r`/`\n` is accepted. The parsers are plain
//! `winnow` combinators over `&str`, so they run unchanged on the MCU.

use core::fmt;

use winnow::ascii::{Caseless, dec_int, dec_uint, multispace0, space0, space1};
use winnow::combinator::{alt, delimited, opt, preceded};
use winnow::prelude::*;
use winnow::token::take_while;

/// Parsed console command. Borrowed arguments point into the input line.
#[derive(Copy, Clone, Debug, Eq, PartialEq)]
pub enum Command<'a> {
    /// `duration <secs>`: change the per-test duration.
    Duration(i64),
    /// `status`: print the status snapshot.
    Status,
    /// `version`: print the firmware release.
    Version,
    /// `help [topic]`.
    Help(Option<&'a str>),
    /// `tick [n]`: run `n` sequencer ticks (emulator only).
    Tick(u32),
    /// `cycle`: run until the tally is reported (emulator only).
    Cycle,
    /// `watchdog`: fire the wake-pin interrupt (emulator only).
    Watchdog,
    /// `fault <name>`: toggle a simulated fault (emulator only).
    Fault(&'a str),
    /// `reboot`: simulate a power cycle (emulator only).
    Reboot,
}

impl Command<'_> {
    /// Keyword that introduces the command.
    #[must_use]
    pub const fn keyword(&self) -> &'static str {
        match self {
            Command::Duration(_) => "duration",
            Command::Status => "status",
            Command::Version => "version",
            Command::Help(_) => "help",
            Command::Tick(_) => "tick",
            Command::Cycle => "cycle",
            Command::Watchdog => "watchdog",
            Command::Fault(_) => "fault",
            Command::Reboot => "reboot",
        }
    }
}

/// Errors reported for a console line.
#[derive(Copy, Clone, Debug, Eq, PartialEq)]
pub enum GrammarError {
    /// The line holds nothing but whitespace.
    Empty,
    /// Parsing stopped at byte `offset`.
    Syntax { offset: usize },
}

impl fmt::Display for GrammarError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            GrammarError::Empty => f.write_str("empty command"),
            GrammarError::Syntax { offset } => write!(f, "syntax error at column {}", offset + 1),
        }
    }
}

/// Parses one console line.
pub fn parse(line: &str) -> Result<Command<'_>, GrammarError> {
    if line.trim().is_empty() {
        return Err(GrammarError::Empty);
    }

    delimited(space0, command, multispace0)
        .parse(line)
        .map_err(|error| GrammarError::Syntax {
            offset: error.offset(),
        })
}

/// Parses a signed decimal integer surrounded by optional whitespace.
pub fn parse_integer(input: &str) -> Result<i64, GrammarError> {
    if input.trim().is_empty() {
        return Err(GrammarError::Empty);
    }

    delimited(space0, integer, multispace0)
        .parse(input)
        .map_err(|error| GrammarError::Syntax {
            offset: error.offset(),
        })
}

fn command<'a>(input: &mut &'a str) -> ModalResult<Command<'a>> {
    alt((
        duration, status, version, help, tick, cycle, watchdog, fault, reboot,
    ))
    .parse_next(input)
}

fn duration<'a>(input: &mut &'a str) -> ModalResult<Command<'a>> {
    preceded((Caseless("duration"), space1), integer)
        .map(Command::Duration)
        .parse_next(input)
}

fn status<'a>(input: &mut &'a str) -> ModalResult<Command<'a>> {
    Caseless("status").value(Command::Status).parse_next(input)
}

fn version<'a>(input: &mut &'a str) -> ModalResult<Command<'a>> {
    Caseless("version").value(Command::Version).parse_next(input)
}

fn help<'a>(input: &mut &'a str) -> ModalResult<Command<'a>> {
    preceded(Caseless("help"), opt(preceded(space1, word)))
        .map(Command::Help)
        .parse_next(input)
}

fn tick<'a>(input: &mut &'a str) -> ModalResult<Command<'a>> {
    preceded(Caseless("tick"), opt(preceded(space1, dec_uint::<_, u32, _>)))
        .map(|count| Command::Tick(count.unwrap_or(1)))
        .parse_next(input)
}

fn cycle<'a>(input: &mut &'a str) -> ModalResult<Command<'a>> {
    Caseless("cycle").value(Command::Cycle).parse_next(input)
}

fn watchdog<'a>(input: &mut &'a str) -> ModalResult<Command<'a>> {
    Caseless("watchdog").value(Command::Watchdog).parse_next(input)
}

fn fault<'a>(input: &mut &'a str) -> ModalResult<Command<'a>> {
    preceded((Caseless("fault"), space1), word)
        .map(Command::Fault)
        .parse_next(input)
}

fn reboot<'a>(input: &mut &'a str) -> ModalResult<Command<'a>> {
    Caseless("reboot").value(Command::Reboot).parse_next(input)
}

fn integer(input: &mut &str) -> ModalResult<i64> {
    dec_int.parse_next(input)
}

fn word<'a>(input: &mut &'a str) -> ModalResult<&'a str> {
    take_while(1.., |c: char| c.is_ascii_alphanumeric() || c == '-' || c == '_').parse_next(input)
}
