use std::io;
use std::path::PathBuf;

use qualifier_core::procedures::TestPlan;
use qualifier_core::watchdog::WakeFlag;

#[allow(dead_code)]
#[path = "../session.rs"]
mod session;

use session::{Session, SessionOptions};

const TRANSCRIPT_DIR: &str = "transcripts";

fn main() -> io::Result<()> {
    record("healthy", TestPlan::FULL, record_healthy)?;
    record("faults", TestPlan::FULL, record_faults)?;
    record("stop-mode", TestPlan::STOP_MODE, record_healthy)?;
    Ok(())
}

fn record(
    name: &str,
    plan: TestPlan,
    script: fn(&mut Session<'_>) -> io::Result<()>,
) -> io::Result<()> {
    let watchdog = WakeFlag::new();
    let options = SessionOptions {
        plan,
        duration_secs: Some(5),
        transcript: Some(PathBuf::from(TRANSCRIPT_DIR).join(format!("emulator-{name}.log"))),
    };
    let mut session = Session::new(&watchdog, &options)?;
    script(&mut session)
}

fn record_healthy(session: &mut Session<'_>) -> io::Result<()> {
    session.handle_command("status")?;
    session.handle_command("cycle")?;
    session.handle_command("status")?;
    Ok(())
}

fn record_faults(session: &mut Session<'_>) -> io::Result<()> {
    session.handle_command("fault early-wake")?;
    session.handle_command("fault stuck-pin")?;
    session.handle_command("watchdog")?;
    session.handle_command("cycle")?;
    session.handle_command("fault early-wake")?;
    session.handle_command("fault stuck-pin")?;
    session.handle_command("tick 2")?;
    session.handle_command("reboot")?;
    session.handle_command("fault storage")?;
    session.handle_command("tick")?;
    session.handle_command("duration 4000")?;
    Ok(())
}
