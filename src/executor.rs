use std::process::{Command as Process, ExitStatus};
use std::time::Instant;

use console::style;

use crate::error::WeaveError;
use crate::io::as_overhead;

/// Name of the Ninja executable.
pub const NINJA: &str = "ninja";

/// Run Ninja in the current directory with the given arguments.
pub fn run_ninja(args: &[String]) -> Result<ExitStatus, WeaveError> {
    let s = Instant::now();
    tracing::debug!("Running {NINJA} {}", args.join(" "));

    let status = Process::new(NINJA)
        .args(args)
        .status()
        .map_err(WeaveError::Ninja)?;

    if status.success() {
        eprintln!("{} {}", style("Finished build").green(), as_overhead(s));
    } else {
        eprintln!("{} {}", style("Build failed").red(), as_overhead(s));
    }
    Ok(status)
}

/// Process exit code mirroring a finished Ninja run.
pub fn exit_code(status: ExitStatus) -> u8 {
    match status.code() {
        Some(code) => u8::try_from(code).unwrap_or(1),
        None => 1,
    }
}
