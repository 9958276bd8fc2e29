use std::{process::Stdio, time::Duration};

use hilt_core::CliError;
use tokio::process::Command;
use tracing::trace;

pub fn cmd_program(program: &str, args: &[String]) -> Command {
    let mut cmd = Command::new(program);
    cmd.args(args.iter().map(|s| s.as_str()));
    cmd
}

/// Captured result of one finished process.
#[derive(Debug)]
pub struct Captured {
    pub code: Option<i32>,
    pub stdout: String,
}

impl Captured {
    pub fn success(&self) -> bool {
        self.code == Some(0)
    }
}

/// Run `program args...` to completion, killing it once `timeout` elapses.
pub async fn run_captured(
    program: &str,
    args: &[String],
    timeout: Duration,
) -> Result<Captured, CliError> {
    trace!(program, ?args, "spawn");
    let mut cmd = cmd_program(program, args);
    cmd.stdin(Stdio::null())
        .stdout(Stdio::piped())
        .stderr(Stdio::piped())
        .kill_on_drop(true);

    let child = cmd
        .spawn()
        .map_err(|e| CliError::Spawn(format!("{program}: {e}")))?;

    let out = tokio::time::timeout(timeout, child.wait_with_output())
        .await
        .map_err(|_| CliError::Timeout {
            after: timeout,
            expected: format!("{program} to exit"),
        })??;

    let mut stdout = String::from_utf8_lossy(&out.stdout).into_owned();
    if !out.status.success() {
        stdout.push_str(&String::from_utf8_lossy(&out.stderr));
    }
    Ok(Captured {
        code: out.status.code(),
        stdout,
    })
}

/// Like [`run_captured`] but a non-zero exit becomes an error.
pub async fn run_checked(
    program: &str,
    args: &[String],
    timeout: Duration,
) -> Result<Captured, CliError> {
    let out = run_captured(program, args, timeout).await?;
    match out.code {
        Some(0) => Ok(out),
        Some(code) => Err(CliError::NonZeroExit { code }),
        None => Err(CliError::Other(format!("{program} terminated by signal"))),
    }
}
