//! Executor trait for abstracting console backends.
//!
//! Test scenarios are written against this trait so they can run over a
//! piped subprocess, a QEMU serial console, or an in-memory fake.

use anyhow::Result;
use std::time::Duration;

use crate::serial::CommandResult;

/// Trait for executing shell commands on a target.
pub trait Executor {
    /// Execute a command and capture output + exit code.
    ///
    /// # Arguments
    /// * `cmd` - The command to run
    /// * `timeout` - Maximum time to wait for completion
    ///
    /// # Returns
    /// CommandResult containing exit code and output.
    fn exec(&mut self, cmd: &str, timeout: Duration) -> Result<CommandResult>;

    /// Execute a command that's expected to succeed.
    ///
    /// Returns the output on success, or an error if the command fails.
    fn exec_ok(&mut self, cmd: &str, timeout: Duration) -> Result<String> {
        let result = self.exec(cmd, timeout)?;
        if !result.success() {
            anyhow::bail!(
                "Command failed (exit {}): {}\nOutput: {}",
                result.exit_code,
                cmd,
                result.output
            );
        }
        Ok(result.output)
    }

    /// Start a command in the background and return its pid.
    fn exec_async(&mut self, cmd: &str, timeout: Duration) -> Result<u32>;

    /// Name used in logs and reports.
    fn name(&self) -> &str;
}

/// Run `commands` in order.
///
/// Stops after the first non-zero exit unless `keep_going` is set. The
/// failing command's result is included.
pub fn run_all(
    executor: &mut dyn Executor,
    commands: &[String],
    timeout: Duration,
    keep_going: bool,
) -> Result<Vec<(String, CommandResult)>> {
    let mut results = Vec::with_capacity(commands.len());
    for cmd in commands {
        let result = executor.exec(cmd, timeout)?;
        let failed = !result.success();
        results.push((cmd.clone(), result));
        if failed && !keep_going {
            break;
        }
    }
    Ok(results)
}

#[cfg(test)]
mod tests {
    use super::*;

    /// Executor answering from a fixed table.
    struct Table(Vec<(&'static str, i32, &'static str)>);

    impl Executor for Table {
        fn exec(&mut self, cmd: &str, _timeout: Duration) -> Result<CommandResult> {
            let (exit_code, output) = self
                .0
                .iter()
                .find(|(c, _, _)| *c == cmd)
                .map(|(_, code, out)| (*code, *out))
                .unwrap_or((127, "not found"));
            Ok(CommandResult {
                exit_code,
                output: output.to_string(),
            })
        }

        fn exec_async(&mut self, _cmd: &str, _timeout: Duration) -> Result<u32> {
            Ok(1)
        }

        fn name(&self) -> &str {
            "table"
        }
    }

    #[test]
    fn test_exec_ok_reports_failure() {
        let mut table = Table(vec![("true", 0, ""), ("cat missing", 1, "No such file")]);
        assert_eq!(table.exec_ok("true", Duration::from_secs(1)).unwrap(), "");
        let err = table
            .exec_ok("cat missing", Duration::from_secs(1))
            .unwrap_err();
        assert!(err.to_string().contains("exit 1"));
        assert!(err.to_string().contains("No such file"));
    }

    #[test]
    fn test_run_all_stops_at_first_failure() {
        let mut table = Table(vec![("a", 0, "A"), ("b", 2, "B"), ("c", 0, "C")]);
        let cmds: Vec<String> = ["a", "b", "c"].iter().map(|s| s.to_string()).collect();

        let results = run_all(&mut table, &cmds, Duration::from_secs(1), false).unwrap();
        assert_eq!(results.len(), 2);
        assert_eq!(results[1].1.exit_code, 2);

        let results = run_all(&mut table, &cmds, Duration::from_secs(1), true).unwrap();
        assert_eq!(results.len(), 3);
    }
}
