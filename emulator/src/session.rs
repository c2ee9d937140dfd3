use std::fmt;
use std::fs::{self, OpenOptions};
use std::io::{self, BufWriter, Write};
use std::path::{Path, PathBuf};
use std::time::{Duration, Instant as HostInstant};

use qualifier_core::clock::Monotonic;
use qualifier_core::config::HarnessConfig;
use qualifier_core::console::commands::write_help;
use qualifier_core::console::{
    Command, CommandDispatcher, CommandScope, ConsoleError, DispatchError, SequencerConsole,
    grammar,
};
use qualifier_core::notify::{NotificationId, NotificationLog};
use qualifier_core::procedures::{SuspendMode, TestPlan};
use qualifier_core::sequencer::{BootReport, TestSequencer, TickOutcome};
use qualifier_core::sim::{SimBoard, SimFault, SimRegion};
use qualifier_core::watchdog::{PulsePin, WakeFlag, service_interrupt};

/// Notifications retained between two commands.
pub type SessionLog = NotificationLog<256>;

type HostSequencer<'w> = TestSequencer<'w, SimBoard, SimRegion, SessionLog>;

/// Upper bound on ticks spent by a single `cycle`.
const MAX_CYCLE_TICKS: u32 = 64;

/// How the session is set up from the command line.
#[derive(Clone, Debug, Eq, PartialEq)]
pub struct SessionOptions {
    pub plan: TestPlan,
    pub duration_secs: Option<i64>,
    pub transcript: Option<PathBuf>,
}

impl Default for SessionOptions {
    fn default() -> Self {
        Self {
            plan: TestPlan::FULL,
            duration_secs: None,
            transcript: None,
        }
    }
}

/// Result of driving the suite until it reports.
#[derive(Copy, Clone, Debug, Eq, PartialEq)]
pub struct CycleSummary {
    pub passed: u8,
    pub total: u8,
}

impl CycleSummary {
    pub fn all_passed(&self) -> bool {
        self.passed == self.total
    }
}

/// Watchdog pulse output on the simulated carrier.
#[derive(Debug, Default)]
struct SimPulse {
    toggles: u32,
}

impl PulsePin for SimPulse {
    fn toggle(&mut self) {
        self.toggles += 1;
    }
}

pub struct Session<'w> {
    sequencer: Option<HostSequencer<'w>>,
    watchdog: &'w WakeFlag,
    plan: TestPlan,
    pulse: SimPulse,
    seen: NotificationId,
    transcript: Option<TranscriptLogger>,
    /// Markers for the transcript, keyed by the output line they precede.
    markers: Vec<(usize, TranscriptMarker)>,
    started_at: HostInstant,
}

impl<'w> Session<'w> {
    pub fn new(watchdog: &'w WakeFlag, options: &SessionOptions) -> io::Result<Self> {
        let transcript = match &options.transcript {
            Some(path) => Some(TranscriptLogger::new(path, options.plan.name())?),
            None => None,
        };

        let mut session = Self {
            sequencer: None,
            watchdog,
            plan: options.plan,
            pulse: SimPulse::default(),
            seen: 0,
            transcript,
            markers: Vec::new(),
            started_at: HostInstant::now(),
        };

        let board = SimBoard::new();
        session.mark(0, TranscriptMarker::Boot(board.boots));
        let mut lines = session.boot(board, SimRegion::erased(), SessionLog::new());
        if let Some(secs) = options.duration_secs {
            match session.sequencer_mut().set_test_duration_secs(secs) {
                Ok(applied) => lines.push(format!("duration {applied}s")),
                Err(error) => lines.push(format!("ERR duration {error}")),
            }
        }
        lines.extend(session.drain_notifications());
        session.record_output(&lines)?;
        Ok(session)
    }

    /// Runs one console line and returns the output to show.
    pub fn handle_command(&mut self, line: &str) -> io::Result<Vec<String>> {
        let trimmed = line.trim();
        if trimmed.is_empty() {
            return Ok(Vec::new());
        }
        self.record(TranscriptRole::Host, trimmed)?;

        let mut lines = match grammar::parse(trimmed) {
            Ok(command) => self.execute(command),
            Err(error) => vec![format!("ERR {}", ConsoleError::from(error))],
        };
        lines.extend(self.drain_notifications());

        self.record_output(&lines)?;
        Ok(lines)
    }

    /// Ticks until the tally is reported, following suspends across reboots.
    pub fn run_cycle(&mut self) -> io::Result<(Option<CycleSummary>, Vec<String>)> {
        let mut lines = Vec::new();
        let summary = self.cycle(&mut lines);
        lines.extend(self.drain_notifications());
        self.record_output(&lines)?;
        Ok((summary, lines))
    }

    pub fn board(&self) -> &SimBoard {
        self.sequencer().board()
    }

    fn execute(&mut self, command: Command<'_>) -> Vec<String> {
        let mut lines = Vec::new();
        match command {
            Command::Tick(count) => {
                for _ in 0..count.max(1) {
                    self.step(&mut lines);
                }
            }
            Command::Cycle => {
                if self.cycle(&mut lines).is_none() {
                    lines.push(format!("ERR no tally after {MAX_CYCLE_TICKS} ticks"));
                }
            }
            Command::Watchdog => {
                service_interrupt(self.watchdog, &mut self.pulse);
                lines.push(format!(
                    "wake interrupt raised (pulse toggles {})",
                    self.pulse.toggles
                ));
            }
            Command::Fault(name) => lines.push(self.toggle_fault(name)),
            Command::Reboot => {
                let (mut board, region, log) = self.take_parts();
                board.power_cycle();
                self.mark(lines.len(), TranscriptMarker::Boot(board.boots));
                lines.extend(self.boot(board, region, log));
            }
            Command::Help(topic) => {
                let mut out = String::new();
                match write_help(&mut out, topic, CommandScope::Emulator) {
                    Ok(()) => lines.extend(out.lines().map(str::to_owned)),
                    Err(error) => lines.push(format!("ERR {error}")),
                }
            }
            other => {
                let mut out = String::new();
                let mut console = SequencerConsole::new(self.sequencer_mut());
                match console.dispatch(other, &mut out) {
                    Ok(()) => lines.extend(out.lines().map(str::to_owned)),
                    Err(error) => lines.push(describe_dispatch_error(error)),
                }
            }
        }
        lines
    }

    fn cycle(&mut self, lines: &mut Vec<String>) -> Option<CycleSummary> {
        for _ in 0..MAX_CYCLE_TICKS {
            if let TickOutcome::Reported(tally) = self.step(lines) {
                return Some(CycleSummary {
                    passed: tally.passed,
                    total: tally.total,
                });
            }
        }
        None
    }

    fn step(&mut self, lines: &mut Vec<String>) -> TickOutcome {
        let sequencer = self.sequencer_mut();
        let uptime = sequencer.board().uptime();
        sequencer.sink_mut().set_uptime(uptime);

        let outcome = sequencer.tick();
        match outcome {
            TickOutcome::Started => lines.push(format!("tick: started {} plan", self.plan.name())),
            TickOutcome::Verdict { test, passed } => lines.push(format!(
                "tick: {} {}",
                test.name(),
                verdict_label(passed)
            )),
            TickOutcome::Reported(tally) => lines.push(format!("tick: tally {tally}")),
            TickOutcome::Suspend(request) => {
                self.mark(
                    lines.len(),
                    TranscriptMarker::Suspend {
                        mode: request.mode,
                        secs: request.wake_after.as_secs(),
                    },
                );
                lines.push(format!(
                    "tick: {} for {}s",
                    request.mode,
                    request.wake_after.as_secs()
                ));
                let (mut board, region, log) = self.take_parts();
                board.resume_from(&request);
                self.mark(lines.len(), TranscriptMarker::Boot(board.boots));
                lines.extend(self.boot(board, region, log));
            }
        }
        outcome
    }

    fn toggle_fault(&mut self, name: &str) -> String {
        if name.eq_ignore_ascii_case("storage") {
            let region = self.sequencer_mut().region_mut();
            let enabled = !region.fail_writes();
            region.set_fail_writes(enabled);
            return format!("fault storage {}", on_off(enabled));
        }

        match SimFault::from_name(name) {
            Some(fault) => {
                let enabled = self.sequencer_mut().board_mut().faults.toggle(fault);
                format!("fault {fault} {}", on_off(enabled))
            }
            None => format!("ERR unknown fault `{name}`"),
        }
    }

    fn boot(&mut self, board: SimBoard, region: SimRegion, log: SessionLog) -> Vec<String> {
        let boots = board.boots;
        let sequencer = TestSequencer::boot(
            board,
            region,
            log,
            self.watchdog,
            self.plan,
            HarnessConfig::default(),
        );
        let lines = describe_boot(boots, sequencer.boot_report());
        self.sequencer = Some(sequencer);
        lines
    }

    fn take_parts(&mut self) -> (SimBoard, SimRegion, SessionLog) {
        match self.sequencer.take() {
            Some(sequencer) => sequencer.into_parts(),
            None => unreachable!("session always holds a booted sequencer"),
        }
    }

    fn sequencer(&self) -> &HostSequencer<'w> {
        match self.sequencer.as_ref() {
            Some(sequencer) => sequencer,
            None => unreachable!("session always holds a booted sequencer"),
        }
    }

    fn sequencer_mut(&mut self) -> &mut HostSequencer<'w> {
        match self.sequencer.as_mut() {
            Some(sequencer) => sequencer,
            None => unreachable!("session always holds a booted sequencer"),
        }
    }

    fn drain_notifications(&mut self) -> Vec<String> {
        let log = self.sequencer().sink();
        let lines = log
            .since(self.seen)
            .map(|entry| {
                format!(
                    "[{:>7.1}s] {}",
                    entry.uptime.as_secs_f64(),
                    entry.notification
                )
            })
            .collect();
        self.seen = log.total();
        lines
    }

    fn record(&mut self, role: TranscriptRole, line: &str) -> io::Result<()> {
        let elapsed = self.started_at.elapsed();
        match self.transcript.as_mut() {
            Some(transcript) => transcript.append_line(elapsed, role, line),
            None => Ok(()),
        }
    }

    fn mark(&mut self, position: usize, marker: TranscriptMarker) {
        if self.transcript.is_some() {
            self.markers.push((position, marker));
        }
    }

    fn record_output(&mut self, lines: &[String]) -> io::Result<()> {
        let markers = std::mem::take(&mut self.markers);
        let mut markers = markers.into_iter().peekable();
        for (position, line) in lines.iter().enumerate() {
            while let Some((_, marker)) = markers.next_if(|(at, _)| *at <= position) {
                self.record_marker(&marker)?;
            }
            self.record(TranscriptRole::Emulator, line)?;
        }
        for (_, marker) in markers {
            self.record_marker(&marker)?;
        }
        Ok(())
    }

    fn record_marker(&mut self, marker: &TranscriptMarker) -> io::Result<()> {
        let elapsed = self.started_at.elapsed();
        match self.transcript.as_mut() {
            Some(transcript) => transcript.append_marker(elapsed, marker),
            None => Ok(()),
        }
    }
}

/// Returns `true` for output lines carrying a failing verdict.
pub fn is_failure(line: &str) -> bool {
    line.contains("FAIL") || line.starts_with("ERR")
}

/// Returns `true` for output lines carrying a passing verdict.
pub fn is_success(line: &str) -> bool {
    line.contains("PASS")
}

fn verdict_label(passed: bool) -> &'static str {
    if passed { "PASS" } else { "FAIL" }
}

fn on_off(enabled: bool) -> &'static str {
    if enabled { "on" } else { "off" }
}

fn describe_boot(boots: u32, report: &BootReport) -> Vec<String> {
    let mut lines = vec![format!(
        "boot {boots}: index {} passed {} duration {}s",
        report.record.current_index, report.record.pass_count, report.record.duration_secs
    )];
    if report.layout_reset {
        lines.push("boot: record layout reset".to_owned());
    }
    if report.clamped {
        lines.push("boot: index out of range, restarting suite".to_owned());
    }
    if report.stale_interval {
        lines.push("boot: discarded stale interval".to_owned());
    }
    if let Some(test) = report.resumed {
        lines.push(format!("boot: resuming {}", test.name()));
    }
    lines
}

fn describe_dispatch_error(error: DispatchError) -> String {
    match error {
        DispatchError::Rejected(config) => {
            format!("ERR {config} (code {})", config.code())
        }
        other => format!("ERR {other}"),
    }
}

struct TranscriptLogger {
    writer: BufWriter<std::fs::File>,
}

impl TranscriptLogger {
    fn new(path: &Path, plan: &str) -> io::Result<Self> {
        if let Some(parent) = path.parent() {
            fs::create_dir_all(parent)?;
        }

        let file = OpenOptions::new()
            .create(true)
            .write(true)
            .truncate(true)
            .open(path)?;

        let mut logger = Self {
            writer: BufWriter::new(file),
        };

        logger.write_header(plan)?;
        Ok(logger)
    }

    fn write_header(&mut self, plan: &str) -> io::Result<()> {
        writeln!(self.writer, "# Qualifier emulator transcript ({plan} plan)")?;
        writeln!(
            self.writer,
            "# Timestamps are milliseconds since session start"
        )?;
        writeln!(self.writer)?;
        self.writer.flush()
    }

    fn append_line(
        &mut self,
        elapsed: Duration,
        role: TranscriptRole,
        line: &str,
    ) -> io::Result<()> {
        writeln!(
            self.writer,
            "[+{:>6} ms] {} {}",
            elapsed.as_millis(),
            role.prefix(),
            line
        )?;
        self.writer.flush()
    }

    fn append_marker(&mut self, elapsed: Duration, marker: &TranscriptMarker) -> io::Result<()> {
        writeln!(self.writer, "[+{:>6} ms] ---- {marker} ----", elapsed.as_millis())?;
        self.writer.flush()
    }
}

/// Points in the board's life that the transcript calls out.
#[derive(Clone, Copy, Debug, Eq, PartialEq)]
enum TranscriptMarker {
    Boot(u32),
    Suspend { mode: SuspendMode, secs: u64 },
}

impl fmt::Display for TranscriptMarker {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            TranscriptMarker::Boot(boots) => write!(f, "boot {boots}"),
            TranscriptMarker::Suspend { mode, secs } => write!(f, "{mode} for {secs}s"),
        }
    }
}

#[derive(Clone, Copy)]
enum TranscriptRole {
    Host,
    Emulator,
}

impl TranscriptRole {
    fn prefix(self) -> &'static str {
        match self {
            TranscriptRole::Host => "HOST>",
            TranscriptRole::Emulator => "EMU <",
        }
    }
}
