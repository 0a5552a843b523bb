//! Subprocess helpers shared by hooks, toolchains and the merger.
//!
//! Every external tool is started through one of these functions so that
//! failures carry the same shape of message: what was run, where, and the
//! exit status or captured output.
//!
//! Callers pick the error variant by passing its constructor, e.g.
//! `run_command(cmd, "configure", BuildError::Configure)`.

use std::path::Path;
use std::process::{Command, Stdio};

use tracing::debug;

use crate::types::BuildError;

/// Runs `cmd` with inherited stdout/stderr and fails if it exits non-zero.
///
/// Used for long-running build steps whose output should stream to the
/// terminal.
pub fn run_command(
    mut cmd: Command,
    description: &str,
    error: fn(String) -> BuildError,
) -> Result<(), BuildError> {
    debug!(command = ?cmd, "running {}", description);
    let status = cmd
        .stdin(Stdio::null())
        .status()
        .map_err(|e| error(spawn_failure(&cmd, description, &e)))?;

    if !status.success() {
        return Err(error(format!(
            "{} failed.\n\n\
             Command: {}\n\
             Working directory: {}\n\
             Exit status: {}",
            description,
            render(&cmd),
            working_dir(&cmd),
            status
        )));
    }
    Ok(())
}

/// Runs `cmd` capturing its output and returns trimmed stdout on success.
///
/// Used for probes (`xcrun`, `lipo -info`) whose output is parsed rather
/// than shown.
pub fn capture_stdout(
    mut cmd: Command,
    description: &str,
    error: fn(String) -> BuildError,
) -> Result<String, BuildError> {
    debug!(command = ?cmd, "probing {}", description);
    let output = cmd
        .stdin(Stdio::null())
        .output()
        .map_err(|e| error(spawn_failure(&cmd, description, &e)))?;

    if !output.status.success() {
        let stdout = String::from_utf8_lossy(&output.stdout);
        let stderr = String::from_utf8_lossy(&output.stderr);
        return Err(error(format!(
            "{} failed.\n\n\
             Command: {}\n\
             Exit status: {}\n\n\
             Stdout:\n{}\n\n\
             Stderr:\n{}",
            description,
            render(&cmd),
            output.status,
            stdout.trim(),
            stderr.trim()
        )));
    }
    Ok(String::from_utf8_lossy(&output.stdout).trim().to_string())
}

/// Returns `true` if `cmd` starts and exits successfully. Output is discarded.
pub fn probe(mut cmd: Command) -> bool {
    cmd.stdin(Stdio::null())
        .stdout(Stdio::null())
        .stderr(Stdio::null())
        .status()
        .map(|s| s.success())
        .unwrap_or(false)
}

/// Creates a `make` command running in `dir`.
pub fn make(dir: &Path) -> Command {
    let mut cmd = Command::new("make");
    cmd.current_dir(dir);
    cmd
}

fn spawn_failure(cmd: &Command, description: &str, err: &std::io::Error) -> String {
    format!(
        "Failed to start {}.\n\n\
         Command: {}\n\
         Error: {}\n\n\
         Ensure the tool is installed and available on PATH.",
        description,
        render(cmd),
        err
    )
}

fn render(cmd: &Command) -> String {
    std::iter::once(cmd.get_program())
        .chain(cmd.get_args())
        .map(|s| s.to_string_lossy().into_owned())
        .collect::<Vec<_>>()
        .join(" ")
}

fn working_dir(cmd: &Command) -> String {
    cmd.get_current_dir()
        .map(|d| d.display().to_string())
        .unwrap_or_else(|| ".".to_string())
}
