//! Expect and mark protocols.
//!
//! - `expect_any()` / `expect_all()`: run a command, then wait for patterns
//!   under ONE shared deadline. Failure is an error.
//! - `mark()`: run a command, then wait for each pattern in turn, each with
//!   its OWN fresh timeout, recording when it was seen. Missing patterns
//!   are reported as `None`, not as an error.

use std::time::Duration;

use chrono::{DateTime, Local};
use serde::Serialize;

use super::console::{Command, Console};
use super::line::Combine;
use crate::error::{ConsoleError, Result};

/// When a pattern was seen by `mark()`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct Mark {
    pub pattern: String,
    /// Read time of the line that matched, `None` if the pattern's budget ran out.
    pub at: Option<DateTime<Local>>,
}

impl Console {
    /// Run `cmd` and wait until any of `patterns` shows up.
    pub fn expect_any<'a, S: AsRef<str>>(
        &mut self,
        cmd: impl Into<Command<'a>>,
        patterns: &[S],
        timeout: Duration,
        is_regex: bool,
        clear_history: bool,
    ) -> Result<()> {
        self.expect(cmd.into(), patterns, timeout, is_regex, Combine::Any, clear_history)
    }

    /// Run `cmd` and wait until all of `patterns` have shown up, in any order.
    pub fn expect_all<'a, S: AsRef<str>>(
        &mut self,
        cmd: impl Into<Command<'a>>,
        patterns: &[S],
        timeout: Duration,
        is_regex: bool,
        clear_history: bool,
    ) -> Result<()> {
        self.expect(cmd.into(), patterns, timeout, is_regex, Combine::All, clear_history)
    }

    fn expect<S: AsRef<str>>(
        &mut self,
        cmd: Command<'_>,
        patterns: &[S],
        timeout: Duration,
        is_regex: bool,
        combine: Combine,
        clear_history: bool,
    ) -> Result<()> {
        if clear_history {
            self.clear_history();
        }
        let command = cmd.to_string();
        self.run_cmd(cmd);

        if self
            .line_reader
            .read_cond(patterns, timeout, is_regex, combine)?
        {
            return Ok(());
        }
        Err(ConsoleError::ExpectationFailed {
            mode: combine,
            command,
            patterns: patterns.iter().map(|p| p.as_ref().to_string()).collect(),
        })
    }

    /// Run `cmd` and record when each of `patterns` is seen, in order.
    ///
    /// Patterns are awaited one after another (substring match) and each
    /// gets the full `timeout`.
    pub fn mark<'a, S: AsRef<str>>(
        &mut self,
        cmd: impl Into<Command<'a>>,
        patterns: &[S],
        timeout: Duration,
        clear_history: bool,
    ) -> Result<Vec<Mark>> {
        if clear_history {
            self.clear_history();
        }
        self.run_cmd(cmd.into());

        let mut marks = Vec::with_capacity(patterns.len());
        for pattern in patterns {
            let pattern = pattern.as_ref();
            let hit = self
                .line_reader
                .read_cond_line(&[pattern], timeout, false, Combine::Any)?;
            marks.push(Mark {
                pattern: pattern.to_string(),
                at: hit.map(|line| line.timestamp),
            });
        }
        Ok(marks)
    }
}
