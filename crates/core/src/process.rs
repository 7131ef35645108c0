//! Thin wrapper around external tool invocations.
//!
//! Every external process (ffprobe, ffmpeg) goes through [`run_tool`], which
//! captures the exit status and the primary output stream. The diagnostic stream
//! is kept only as a short tail for human-readable logs.

use std::io;
use std::process::{Command, ExitStatus, Stdio};

/// Number of trailing stderr lines kept for log messages.
const STDERR_TAIL_LINES: usize = 3;

/// How an external process ended.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ToolExit {
    /// Exit code 0.
    Success,
    /// Non-zero exit code.
    Failed(i32),
    /// Killed by a signal (crash or external termination).
    Terminated,
}

impl ToolExit {
    pub fn from_status(status: ExitStatus) -> Self {
        if status.success() {
            ToolExit::Success
        } else {
            match status.code() {
                Some(code) => ToolExit::Failed(code),
                None => ToolExit::Terminated,
            }
        }
    }

    pub fn is_success(&self) -> bool {
        matches!(self, ToolExit::Success)
    }
}

impl std::fmt::Display for ToolExit {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            ToolExit::Success => write!(f, "exit code 0"),
            ToolExit::Failed(code) => write!(f, "exit code {}", code),
            ToolExit::Terminated => write!(f, "terminated by signal"),
        }
    }
}

/// Captured result of one external process run.
#[derive(Debug, Clone)]
pub struct ToolRun {
    pub exit: ToolExit,
    /// Primary output stream, the only one ever parsed.
    pub stdout: Vec<u8>,
    /// Last few lines of the diagnostic stream, informational only.
    pub stderr_tail: String,
}

/// Run a prepared command to completion and capture its outcome.
///
/// Fails only when the process could not be launched at all.
pub fn run_tool(cmd: &mut Command) -> io::Result<ToolRun> {
    let output = cmd.stdin(Stdio::null()).output()?;
    let stderr = String::from_utf8_lossy(&output.stderr);

    Ok(ToolRun {
        exit: ToolExit::from_status(output.status),
        stdout: output.stdout,
        stderr_tail: tail_lines(&stderr, STDERR_TAIL_LINES),
    })
}

/// Render a command as one line for logs, program first.
pub fn command_line(cmd: &Command) -> String {
    std::iter::once(cmd.get_program())
        .chain(cmd.get_args())
        .map(|part| part.to_string_lossy().into_owned())
        .collect::<Vec<_>>()
        .join(" ")
}

/// Keep the last `n` non-empty lines of `text`.
fn tail_lines(text: &str, n: usize) -> String {
    let lines: Vec<&str> = text
        .lines()
        .map(str::trim)
        .filter(|line| !line.is_empty())
        .collect();
    let start = lines.len().saturating_sub(n);
    lines[start..].join(" | ")
}
