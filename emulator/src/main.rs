mod session;

use std::env;
use std::io::{self, BufRead, Write};
use std::path::PathBuf;
use std::process;

use crossterm::style::Stylize;
use qualifier_core::procedures::TestPlan;
use qualifier_core::watchdog::WakeFlag;

use session::{Session, SessionOptions, is_failure, is_success};

const USAGE: &str = "Usage: qualifier-emulator [--plan <full|stop-mode>] [--duration <secs>] \
                     [--transcript <path>] [--cycles <n>]";

#[derive(Debug, Default, Eq, PartialEq)]
struct Options {
    session: SessionOptions,
    cycles: Option<u32>,
}

fn main() -> io::Result<()> {
    let options = parse_options(env::args().skip(1)).unwrap_or_else(|err| {
        eprintln!("{err}");
        eprintln!("{USAGE}");
        process::exit(2);
    });

    let watchdog = WakeFlag::new();
    let mut session = Session::new(&watchdog, &options.session)?;

    match options.cycles {
        Some(cycles) => {
            let all_passed = run_batch(&mut session, cycles)?;
            if !all_passed {
                process::exit(1);
            }
            Ok(())
        }
        None => run_interactive(&mut session),
    }
}

fn run_batch(session: &mut Session<'_>, cycles: u32) -> io::Result<bool> {
    let stdout = io::stdout();
    let mut writer = stdout.lock();
    let mut all_passed = true;

    for cycle in 1..=cycles {
        let (summary, lines) = session.run_cycle()?;
        print_lines(&mut writer, &lines)?;
        match summary {
            Some(summary) => {
                all_passed &= summary.all_passed();
                writeln!(
                    writer,
                    "cycle {cycle}: {} of {} passed",
                    summary.passed, summary.total
                )?;
            }
            None => {
                all_passed = false;
                writeln!(writer, "{}", format!("cycle {cycle}: no tally").red())?;
            }
        }
    }

    writeln!(
        writer,
        "{cycles} cycle(s) over {} boot(s)",
        session.board().boots
    )?;
    Ok(all_passed)
}

fn run_interactive(session: &mut Session<'_>) -> io::Result<()> {
    let stdin = io::stdin();
    let mut reader = stdin.lock();
    let stdout = io::stdout();
    let mut writer = stdout.lock();
    let mut line = String::new();

    writeln!(
        writer,
        "Qualifier Emulator ready. Type `help` for commands or `exit` to quit."
    )?;

    loop {
        line.clear();
        write!(writer, "> ")?;
        writer.flush()?;

        let bytes_read = reader.read_line(&mut line)?;
        if bytes_read == 0 {
            writeln!(writer)?;
            break;
        }

        let trimmed = line.trim();
        if trimmed.is_empty() {
            continue;
        }

        if should_terminate(trimmed) {
            writeln!(writer, "Session closed.")?;
            break;
        }

        let responses = session.handle_command(trimmed)?;
        print_lines(&mut writer, &responses)?;
    }

    Ok(())
}

fn print_lines(writer: &mut impl Write, lines: &[String]) -> io::Result<()> {
    for line in lines {
        if is_failure(line) {
            writeln!(writer, "{}", line.as_str().red())?;
        } else if is_success(line) {
            writeln!(writer, "{}", line.as_str().green())?;
        } else {
            writeln!(writer, "{line}")?;
        }
    }
    Ok(())
}

fn should_terminate(input: &str) -> bool {
    input.eq_ignore_ascii_case("exit") || input.eq_ignore_ascii_case("quit")
}

fn parse_options(args: impl IntoIterator<Item = String>) -> Result<Options, String> {
    let mut options = Options::default();
    let mut args = args.into_iter();

    while let Some(arg) = args.next() {
        let (flag, inline) = match arg.split_once('=') {
            Some((flag, value)) => (flag.to_string(), Some(value.to_string())),
            None => (arg, None),
        };
        let mut value = || {
            inline
                .clone()
                .or_else(|| args.next())
                .ok_or_else(|| format!("Expected value after {flag}"))
        };

        match flag.as_str() {
            "--plan" => {
                let name = value()?;
                options.session.plan =
                    TestPlan::named(&name).ok_or_else(|| format!("Unknown plan `{name}`"))?;
            }
            "--duration" => {
                let secs = value()?;
                options.session.duration_secs = Some(
                    secs.parse()
                        .map_err(|_| format!("Invalid duration `{secs}`"))?,
                );
            }
            "--transcript" => options.session.transcript = Some(PathBuf::from(value()?)),
            "--cycles" => {
                let count = value()?;
                options.cycles = Some(
                    count
                        .parse()
                        .map_err(|_| format!("Invalid cycle count `{count}`"))?,
                );
            }
            other => return Err(format!("Unknown argument `{other}`")),
        }
    }

    Ok(options)
}
