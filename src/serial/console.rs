//! Synchronous console API over a line pump and a write primitive.
//!
//! # STOP. READ. THEN ACT.
//!
//! This type is split across files:
//! - `console.rs` - construction, `write()`, `run_cmd()`, history access
//! - `exec.rs` - `run_sh_cmd_output()` / `run_sh_cmd_async()` (sentinel protocol)
//! - `expect.rs` - `expect_any()` / `expect_all()` / `mark()`
//! - `process.rs` - `start_process()` / `wait_for_exit()`
//!
//! Read all of them before adding new methods.

use std::fmt;
use std::time::Duration;

use super::line::LogLine;
use super::reader::{LineReader, LineSource, ReaderOptions};
use crate::error::Result;

/// Write primitive supplied by a transport.
///
/// Must never fail loudly: writes racing transport shutdown are expected.
pub trait LineSink: Send {
    fn write_line(&mut self, text: &str);
}

impl<F> LineSink for F
where
    F: FnMut(&str) + Send,
{
    fn write_line(&mut self, text: &str) {
        self(text)
    }
}

/// Something to do before waiting for output.
pub enum Command<'a> {
    /// Send nothing, just wait.
    Nothing,
    /// Text written verbatim to the console.
    Literal(String),
    /// Side-effecting action, e.g. power-cycling the target.
    Action(Box<dyn FnOnce() + 'a>),
}

impl<'a> Command<'a> {
    pub fn action<F: FnOnce() + 'a>(f: F) -> Self {
        Command::Action(Box::new(f))
    }
}

impl fmt::Display for Command<'_> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Command::Nothing => f.write_str("<none>"),
            Command::Literal(text) => f.write_str(text),
            Command::Action(_) => f.write_str("<action>"),
        }
    }
}

impl fmt::Debug for Command<'_> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "Command({self})")
    }
}

impl From<&str> for Command<'_> {
    fn from(text: &str) -> Self {
        Command::Literal(text.to_string())
    }
}

impl From<String> for Command<'_> {
    fn from(text: String) -> Self {
        Command::Literal(text)
    }
}

impl<T: Into<String>> From<Option<T>> for Command<'_> {
    fn from(text: Option<T>) -> Self {
        match text {
            Some(text) => Command::Literal(text.into()),
            None => Command::Nothing,
        }
    }
}

/// Console controller: one line pump plus one writer.
pub struct Console {
    pub(crate) name: String,
    pub(crate) writer: Box<dyn LineSink>,
    pub(crate) line_reader: LineReader,
}

impl Console {
    /// Create a console and start pumping `reader` immediately.
    pub fn new<R, W>(name: &str, reader: R, writer: W, options: ReaderOptions) -> Result<Self>
    where
        R: LineSource,
        W: LineSink + 'static,
    {
        let line_reader = LineReader::spawn(name, reader, options)?;
        Ok(Self {
            name: name.to_string(),
            writer: Box::new(writer),
            line_reader,
        })
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn line_reader(&self) -> &LineReader {
        &self.line_reader
    }

    pub fn print_logger(&self) -> bool {
        self.line_reader.print_logger()
    }

    pub fn set_print_logger(&self, enabled: bool) {
        self.line_reader.set_print_logger(enabled);
    }

    /// Pop the oldest buffered line as history sees it: the log record
    /// (`[ts] [name] - text`) with a shared log file, the bare text otherwise.
    pub fn readline(&self, block: bool, timeout: Option<Duration>) -> Result<String> {
        let line = self.readline_entry(block, timeout)?;
        Ok(self.line_reader.history_text(&line).into_owned())
    }

    /// Pop the oldest buffered line with its timestamp and source.
    pub fn readline_entry(&self, block: bool, timeout: Option<Duration>) -> Result<LogLine> {
        self.line_reader.get_line(block, timeout)
    }

    /// Send raw text. No line terminator is added here.
    pub fn write(&mut self, command: &str) {
        self.writer.write_line(command);
    }

    pub fn run_cmd(&mut self, cmd: Command<'_>) {
        match cmd {
            Command::Nothing => {}
            Command::Literal(text) => self.write(&text),
            Command::Action(action) => action(),
        }
    }

    pub fn add_expr_cbk<F>(&self, pattern: &str, callback: F, is_regex: bool) -> Result<()>
    where
        F: FnMut() + Send + 'static,
    {
        self.line_reader.add_expr_cbk(pattern, callback, is_regex)
    }

    pub fn clear_history(&self) {
        self.line_reader.clear_history();
    }
}

impl fmt::Debug for Console {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Console")
            .field("name", &self.name)
            .field("line_reader", &self.line_reader)
            .finish_non_exhaustive()
    }
}

#[cfg(test)]
mod tests {
    use super::super::testing::{quiet_options, FakeShell};
    use super::*;
    use std::cell::Cell;

    #[test]
    fn test_run_cmd_dispatches_on_variant() {
        let shell = FakeShell::new();
        let mut console = shell.console("t");

        console.run_cmd(Command::from("uname -a"));
        console.run_cmd(Command::Nothing);
        console.run_cmd(None::<String>.into());

        let ran = Cell::new(false);
        console.run_cmd(Command::action(|| ran.set(true)));
        assert!(ran.get());

        assert_eq!(shell.sent(), vec!["uname -a"]);
    }

    #[test]
    fn test_readline_returns_text() {
        let shell = FakeShell::new();
        let console = shell.console("t");
        shell.emit("hello");
        let line = console.readline(true, Some(Duration::from_secs(2))).unwrap();
        assert_eq!(line, "hello");
        assert!(console.readline(false, None).is_err());
    }

    #[test]
    fn test_readline_returns_record_with_shared_log() {
        let dir = tempfile::tempdir().unwrap();
        let options = ReaderOptions {
            logfile: Some(dir.path().join("console.log")),
            ..quiet_options()
        };
        let shell = FakeShell::new();
        let console = shell.console_with("Qemu", options);
        shell.emit("hello");

        let record = console.readline(true, Some(Duration::from_secs(2))).unwrap();
        assert!(record.starts_with('['), "{record}");
        assert!(record.ends_with("] [Qemu] - hello"), "{record}");
    }

    #[test]
    fn test_new_with_closures() {
        let (tx, rx) = std::sync::mpsc::channel::<String>();
        let mut console = Console::new(
            "closures",
            move || Ok(rx.recv().ok()),
            |_: &str| {},
            quiet_options(),
        )
        .unwrap();
        tx.send("line".to_string()).unwrap();
        console.write("ignored");
        assert_eq!(
            console.readline(true, Some(Duration::from_secs(2))).unwrap(),
            "line"
        );
    }

    #[test]
    fn test_command_display() {
        assert_eq!(Command::from("ls").to_string(), "ls");
        assert_eq!(Command::action(|| {}).to_string(), "<action>");
        assert_eq!(Command::Nothing.to_string(), "<none>");
    }
}
