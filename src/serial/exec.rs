//! Shell command execution with exit code capture.
//!
//! # Sentinel Protocol
//!
//! `run_sh_cmd_output()` sends `<cmd>; echo COMMAND_DONE=$?` and collects
//! lines until one carries `COMMAND_DONE=<N>`:
//! - A line holding both the sentinel and `<cmd>` is the terminal echoing
//!   what we typed and is skipped.
//! - Text before the sentinel on its line is the command's last output
//!   line (commands that don't end with a newline).
//!
//! `run_sh_cmd_async()` backgrounds `<cmd> &` and recovers its pid by
//! running `echo CREATED_PID=$!` through the same protocol.

use std::time::{Duration, Instant};

use once_cell::sync::Lazy;
use regex::Regex;
use serde::Serialize;
use tracing::{debug, warn};

use super::buffer::deadline_after;
use super::console::Console;
use crate::error::{ConsoleError, Result};

/// Marker echoed after a command with its exit status.
pub const COMMAND_DONE: &str = "COMMAND_DONE";

/// Marker echoed with the pid of the last background job.
pub const CREATED_PID: &str = "CREATED_PID";

/// Default budget for shell round trips.
pub const DEFAULT_COMMAND_TIMEOUT: Duration = Duration::from_secs(30);

static CREATED_PID_RE: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"CREATED_PID=(\d+)").expect("CREATED_PID pattern is valid"));

/// Result of a shell round trip.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct CommandResult {
    pub exit_code: i32,
    /// Output lines joined with `\n`, trimmed.
    pub output: String,
}

impl CommandResult {
    pub fn success(&self) -> bool {
        self.exit_code == 0
    }
}

impl Console {
    /// Run `cmd` in the remote shell and capture its output and exit code.
    ///
    /// Clears history first, so output from earlier commands never leaks in.
    /// Parses the bare line text even when history is a shared log.
    pub fn run_sh_cmd_output(&mut self, cmd: &str, timeout: Duration) -> Result<CommandResult> {
        let deadline = deadline_after(timeout);
        let marker = format!("{COMMAND_DONE}=");
        let timed_out = || ConsoleError::CommandTimeout {
            command: cmd.to_string(),
            timeout,
        };

        self.clear_history();
        self.write(&format!("{cmd}; echo {COMMAND_DONE}=$?"));

        let mut output: Vec<String> = Vec::new();
        loop {
            let remaining = match deadline {
                Some(deadline) => {
                    let remaining = deadline.saturating_duration_since(Instant::now());
                    if remaining.is_zero() {
                        return Err(timed_out());
                    }
                    Some(remaining)
                }
                None => None,
            };

            let line = match self.readline_entry(true, remaining) {
                Ok(line) => line.text,
                Err(ConsoleError::Empty) => return Err(timed_out()),
                Err(e) => return Err(e),
            };

            if line.contains(COMMAND_DONE) && line.contains(cmd) {
                continue;
            }

            if let Some((before, after)) = line.split_once(&marker) {
                output.push(before.trim().to_string());
                let exit_code = parse_exit_code(after).ok_or_else(|| {
                    ConsoleError::MalformedExitCode {
                        line: line.clone(),
                    }
                })?;
                let output = output.join("\n").trim().to_string();
                debug!(console = %self.name, cmd, exit_code, "shell command finished");
                return Ok(CommandResult { exit_code, output });
            }

            if line.contains(COMMAND_DONE) {
                warn!(console = %self.name, line = %line, "sentinel without exit code");
            }
            output.push(line);
        }
    }

    /// Start `cmd` as a background job and return its pid.
    pub fn run_sh_cmd_async(&mut self, cmd: &str, timeout: Duration) -> Result<u32> {
        self.clear_history();
        self.write(&format!("{cmd} &"));

        let result = self.run_sh_cmd_output(&format!("echo {CREATED_PID}=$!"), timeout)?;
        if !result.success() {
            return Err(ConsoleError::LaunchFailed {
                command: cmd.to_string(),
                exit_code: result.exit_code,
            });
        }

        CREATED_PID_RE
            .captures(&result.output)
            .and_then(|caps| caps[1].parse().ok())
            .ok_or(ConsoleError::PidNotFound {
                output: result.output,
            })
    }
}

/// First whitespace-separated token after the sentinel, as an exit code.
fn parse_exit_code(rest: &str) -> Option<i32> {
    rest.split_whitespace().next()?.parse().ok()
}
