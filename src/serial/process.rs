//! Background processes on the remote side.
//!
//! `start_process()` launches a command as a background job with its
//! output redirected to a log file and its exit status written to a side
//! file (`<log>.exit`) when it ends. `wait_for_exit()` polls `kill -0 <pid>`
//! until the pid is gone, then reads the status back from the side file.
//!
//! Polling is racy by nature (pid reuse, poll granularity). It is good
//! enough for test targets that run a handful of processes.

use std::thread;
use std::time::{Duration, Instant};

use tracing::debug;

use super::buffer::deadline_after;
use super::console::Console;
use crate::error::{ConsoleError, Result};

/// Delay between `kill -0` checks.
pub const DEFAULT_POLL_INTERVAL: Duration = Duration::from_millis(500);

/// A command started in the background by `start_process()`.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PendingProcess {
    pub pid: u32,
    /// Remote path receiving the process' stdout and stderr.
    pub log_path: String,
    /// Budget used for each shell round trip made on behalf of this process.
    pub start_timeout: Duration,
}

impl PendingProcess {
    /// Remote path of the file holding the exit status once the process ends.
    pub fn exit_code_path(&self) -> String {
        format!("{}.exit", self.log_path)
    }
}

impl Console {
    /// Launch `cmd` in the background, logging to `log_path` on the target.
    pub fn start_process(
        &mut self,
        cmd: &str,
        log_path: &str,
        start_timeout: Duration,
    ) -> Result<PendingProcess> {
        let wrapped = format!("({cmd} > {log_path} 2>&1; echo $? > {log_path}.exit)");
        let pid = self.run_sh_cmd_async(&wrapped, start_timeout)?;
        debug!(console = %self.name, pid, cmd, "started background process");
        Ok(PendingProcess {
            pid,
            log_path: log_path.to_string(),
            start_timeout,
        })
    }

    /// Whether the pid of `process` is still alive on the target.
    pub fn is_running(&mut self, process: &PendingProcess) -> Result<bool> {
        let check = self.run_sh_cmd_output(
            &format!("kill -0 {} 2>/dev/null", process.pid),
            process.start_timeout,
        )?;
        Ok(check.success())
    }

    /// Wait until `process` exits and return its exit status.
    pub fn wait_for_exit(
        &mut self,
        process: &PendingProcess,
        timeout: Duration,
        poll_interval: Duration,
    ) -> Result<i32> {
        let deadline = deadline_after(timeout);
        while self.is_running(process)? {
            let out_of_time = deadline
                .is_some_and(|d| d.saturating_duration_since(Instant::now()) < poll_interval);
            if out_of_time {
                return Err(ConsoleError::ProcessTimeout {
                    pid: process.pid,
                    timeout,
                });
            }
            thread::sleep(poll_interval);
        }

        let status = self.run_sh_cmd_output(
            &format!("cat {}", process.exit_code_path()),
            process.start_timeout,
        )?;
        let exit_code = status
            .output
            .lines()
            .last()
            .and_then(|l| l.trim().parse().ok())
            .ok_or_else(|| ConsoleError::MalformedExitCode {
                line: status.output.clone(),
            })?;
        debug!(console = %self.name, pid = process.pid, exit_code, "background process exited");
        Ok(exit_code)
    }

    /// Everything the process wrote so far.
    pub fn process_log(&mut self, process: &PendingProcess) -> Result<String> {
        let result =
            self.run_sh_cmd_output(&format!("cat {}", process.log_path), process.start_timeout)?;
        Ok(result.output)
    }
}

#[cfg(test)]
mod tests {
    use super::super::testing::{shell_command, FakeShell};
    use super::*;
    use std::sync::atomic::{AtomicU32, Ordering};
    use std::sync::Arc;

    const TIMEOUT: Duration = Duration::from_secs(5);

    /// Shell where pid 77 survives `alive_checks` liveness checks.
    fn shell_with_process(alive_checks: u32) -> (FakeShell, Arc<AtomicU32>) {
        let checks = Arc::new(AtomicU32::new(0));
        let counter = Arc::clone(&checks);
        let shell = FakeShell::scripted(move |written| {
            let Some(cmd) = shell_command(written) else {
                return Vec::new();
            };
            match cmd {
                "echo CREATED_PID=$!" => vec!["CREATED_PID=77".into(), "COMMAND_DONE=0".into()],
                "kill -0 77 2>/dev/null" => {
                    let n = counter.fetch_add(1, Ordering::SeqCst);
                    let code = if n < alive_checks { 0 } else { 1 };
                    vec![format!("COMMAND_DONE={code}")]
                }
                "cat /tmp/app.log.exit" => vec!["3".into(), "COMMAND_DONE=0".into()],
                "cat /tmp/app.log" => vec!["hello from app".into(), "COMMAND_DONE=0".into()],
                _ => vec!["COMMAND_DONE=127".into()],
            }
        });
        (shell, checks)
    }

    #[test]
    fn test_start_process_wraps_command() {
        let (shell, _) = shell_with_process(0);
        let mut console = shell.console("t");

        let process = console.start_process("./app", "/tmp/app.log", TIMEOUT).unwrap();
        assert_eq!(process.pid, 77);
        assert_eq!(process.exit_code_path(), "/tmp/app.log.exit");
        assert_eq!(
            shell.sent()[0],
            "(./app > /tmp/app.log 2>&1; echo $? > /tmp/app.log.exit) &"
        );
    }

    #[test]
    fn test_wait_for_exit_polls_then_reads_status() {
        let (shell, checks) = shell_with_process(2);
        let mut console = shell.console("t");
        let process = console.start_process("./app", "/tmp/app.log", TIMEOUT).unwrap();

        let code = console
            .wait_for_exit(&process, TIMEOUT, Duration::from_millis(10))
            .unwrap();
        assert_eq!(code, 3);
        assert_eq!(checks.load(Ordering::SeqCst), 3);
        assert_eq!(console.process_log(&process).unwrap(), "hello from app");
    }

    #[test]
    fn test_wait_for_exit_times_out() {
        let (shell, _) = shell_with_process(u32::MAX);
        let mut console = shell.console("t");
        let process = console.start_process("./app", "/tmp/app.log", TIMEOUT).unwrap();

        let err = console
            .wait_for_exit(&process, Duration::from_millis(50), Duration::from_millis(20))
            .unwrap_err();
        assert!(matches!(err, ConsoleError::ProcessTimeout { pid: 77, .. }));
    }
}
