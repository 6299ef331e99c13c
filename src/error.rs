//! Error types for the console core.
//!
//! Protocol failures (expectations, command timeouts) surface here.
//! Transport and log-file faults never do: the pump logs them and keeps going.

use std::time::Duration;

use crate::serial::Combine;

/// Result alias for console operations.
pub type Result<T> = std::result::Result<T, ConsoleError>;

#[derive(Debug, thiserror::Error)]
pub enum ConsoleError {
    /// A bounded wait on the line buffer expired, or nothing was available
    /// in non-blocking mode.
    #[error("no line available")]
    Empty,

    #[error("invalid argument: {0}")]
    InvalidArgument(String),

    /// `expect_any` / `expect_all` did not see the required patterns in time.
    #[error("Failed expect {mode}: {command}: {patterns:?}")]
    ExpectationFailed {
        mode: Combine,
        command: String,
        patterns: Vec<String>,
    },

    /// The completion sentinel did not arrive before the deadline.
    #[error("Timed out waiting for command to finish: '{command}' ({timeout:?})")]
    CommandTimeout { command: String, timeout: Duration },

    #[error("could not parse exit code from line: {line:?}")]
    MalformedExitCode { line: String },

    /// The pid query that follows a background launch did not exit 0.
    #[error("background launch of '{command}' failed: pid query exited with {exit_code}")]
    LaunchFailed { command: String, exit_code: i32 },

    #[error("no CREATED_PID in output: {output:?}")]
    PidNotFound { output: String },

    #[error("process {pid} still running after {timeout:?}")]
    ProcessTimeout { pid: u32, timeout: Duration },

    #[error("invalid pattern: {0}")]
    Regex(#[from] regex::Error),

    #[error(transparent)]
    Io(#[from] std::io::Error),
}

impl ConsoleError {
    /// True for the timeout-like failures a test might choose to retry.
    pub fn is_timeout(&self) -> bool {
        matches!(
            self,
            ConsoleError::Empty
                | ConsoleError::CommandTimeout { .. }
                | ConsoleError::ProcessTimeout { .. }
        )
    }
}

/// Convert a seconds value (config file, command line) into a timeout.
///
/// Negative, non-finite and out-of-range values are rejected with
/// `InvalidArgument`.
pub fn timeout_from_secs(secs: f64) -> Result<Duration> {
    Duration::try_from_secs_f64(secs).map_err(|e| {
        ConsoleError::InvalidArgument(format!(
            "'timeout' must be a non-negative number, got {secs}: {e}"
        ))
    })
}
