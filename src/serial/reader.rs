//! Background line pump.
//!
//! A `LineReader` owns one worker thread that keeps calling a blocking
//! read primitive, normalizes each line, optionally persists it to a shared
//! log file, publishes it to the history buffer and fires pattern callbacks.
//!
//! # Threading
//!
//! - Callbacks run synchronously on the worker thread. A slow callback
//!   delays every line behind it.
//! - The callback registry is locked during dispatch: a callback must not
//!   register new callbacks on the same reader.
//! - With a log file, history holds lines from every console sharing it and
//!   `read_cond` matches the formatted record (`[ts] [name] - text`), so a
//!   pattern can pin the source console. Callbacks always see the bare text.
//! - There is no stop signal. The pump ends when the read primitive returns
//!   `Ok(None)` or an error, i.e. when the transport closes.

use std::borrow::Cow;
use std::io;
use std::path::PathBuf;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex, PoisonError};
use std::thread::{self, JoinHandle};
use std::time::{Duration, Instant};

use tracing::{debug, error, info};

use super::buffer::{deadline_after, LineBuffer, DEFAULT_CAPACITY};
use super::line::{normalize_line, Combine, LogLine, Matcher};
use super::registry::{LogRegistry, SharedLog};
use crate::error::{ConsoleError, Result};

/// Default budget for the `read_until*` family.
pub const DEFAULT_EXPECT_TIMEOUT: Duration = Duration::from_secs(90);

/// Blocking line-read primitive supplied by a transport.
///
/// `Ok(None)` means the channel is closed. Errors are treated the same way.
pub trait LineSource: Send + 'static {
    fn read_line(&mut self) -> io::Result<Option<String>>;
}

impl<F> LineSource for F
where
    F: FnMut() -> io::Result<Option<String>> + Send + 'static,
{
    fn read_line(&mut self) -> io::Result<Option<String>> {
        self()
    }
}

/// Zero-argument callback fired on the pump thread.
pub type Callback = Box<dyn FnMut() + Send + 'static>;

/// Reader lifecycle.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ReaderState {
    Running,
    Stopped,
}

/// Options for constructing a `LineReader`.
#[derive(Debug, Clone)]
pub struct ReaderOptions {
    /// Echo every line through `tracing`.
    pub print_logger: bool,
    /// Persist lines here and share history with other readers using it.
    pub logfile: Option<PathBuf>,
    /// History size in lines, 0 for unbounded.
    pub capacity: usize,
    pub registry: Arc<LogRegistry>,
}

impl Default for ReaderOptions {
    fn default() -> Self {
        Self {
            print_logger: true,
            logfile: None,
            capacity: DEFAULT_CAPACITY,
            registry: LogRegistry::global(),
        }
    }
}

struct CallbackEntry {
    pattern: String,
    is_regex: bool,
    matcher: Matcher,
    callbacks: Vec<Callback>,
}

/// Callbacks keyed by `(pattern, is_regex)`, in first-registration order.
#[derive(Default)]
struct CallbackRegistry {
    entries: Vec<CallbackEntry>,
}

impl CallbackRegistry {
    fn add(&mut self, pattern: &str, is_regex: bool, callback: Callback) -> Result<()> {
        let existing = self
            .entries
            .iter_mut()
            .find(|e| e.pattern == pattern && e.is_regex == is_regex);
        match existing {
            Some(entry) => entry.callbacks.push(callback),
            None => self.entries.push(CallbackEntry {
                pattern: pattern.to_string(),
                is_regex,
                matcher: Matcher::new(pattern, is_regex)?,
                callbacks: vec![callback],
            }),
        }
        Ok(())
    }

    fn dispatch(&mut self, text: &str) {
        for entry in &mut self.entries {
            if entry.matcher.is_match(text) {
                for callback in &mut entry.callbacks {
                    callback();
                }
            }
        }
    }
}

/// Everything the worker thread needs.
struct Pump {
    name: String,
    print_logger: Arc<AtomicBool>,
    buffer: Arc<LineBuffer<LogLine>>,
    shared_log: Option<Arc<SharedLog>>,
    callbacks: Arc<Mutex<CallbackRegistry>>,
}

impl Pump {
    fn run(self, mut source: Box<dyn LineSource>) {
        loop {
            let raw = match source.read_line() {
                Ok(Some(raw)) => raw,
                Ok(None) => {
                    debug!(console = %self.name, "line source closed");
                    break;
                }
                Err(e) => {
                    debug!(console = %self.name, error = %e, "line source failed, stopping");
                    break;
                }
            };

            let line = LogLine::new(&self.name, normalize_line(&raw));

            if self.print_logger.load(Ordering::Relaxed) {
                info!(target: "console", "[{}] {}", self.name, line.text);
            }

            match &self.shared_log {
                Some(log) => {
                    if let Err(e) = log.append(&line) {
                        error!(
                            console = %self.name,
                            path = %log.path().display(),
                            "Exception on write: {}",
                            e
                        );
                    }
                }
                None => self.buffer.put(line.clone()),
            }

            self.callbacks
                .lock()
                .unwrap_or_else(PoisonError::into_inner)
                .dispatch(&line.text);
        }
    }
}

/// Line pump over a blocking read primitive.
pub struct LineReader {
    name: String,
    print_logger: Arc<AtomicBool>,
    buffer: Arc<LineBuffer<LogLine>>,
    shared: bool,
    callbacks: Arc<Mutex<CallbackRegistry>>,
    worker: JoinHandle<()>,
}

impl LineReader {
    /// Start pumping `source` on a new thread.
    ///
    /// Fails if the log file cannot be opened or the thread cannot be spawned.
    pub fn spawn<S: LineSource>(name: &str, source: S, options: ReaderOptions) -> Result<Self> {
        let shared_log = match &options.logfile {
            Some(path) => Some(options.registry.acquire(path, options.capacity)?),
            None => None,
        };
        let buffer = match &shared_log {
            Some(log) => log.buffer(),
            None => Arc::new(LineBuffer::new(options.capacity)),
        };

        let shared = shared_log.is_some();
        let print_logger = Arc::new(AtomicBool::new(options.print_logger));
        let callbacks = Arc::new(Mutex::new(CallbackRegistry::default()));

        let pump = Pump {
            name: name.to_string(),
            print_logger: Arc::clone(&print_logger),
            buffer: Arc::clone(&buffer),
            shared_log,
            callbacks: Arc::clone(&callbacks),
        };
        let source: Box<dyn LineSource> = Box::new(source);
        let worker = thread::Builder::new()
            .name(format!("line-reader-{name}"))
            .spawn(move || pump.run(source))?;

        debug!(console = %name, "line reader started");

        Ok(Self {
            name: name.to_string(),
            print_logger,
            buffer,
            shared,
            callbacks,
            worker,
        })
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn state(&self) -> ReaderState {
        if self.worker.is_finished() {
            ReaderState::Stopped
        } else {
            ReaderState::Running
        }
    }

    /// True when history comes from a log file shared with other consoles.
    pub fn is_shared(&self) -> bool {
        self.shared
    }

    /// What history matching sees for `line`: the log record when shared,
    /// the bare text otherwise.
    pub fn history_text<'l>(&self, line: &'l LogLine) -> Cow<'l, str> {
        if self.shared {
            Cow::Owned(line.record())
        } else {
            Cow::Borrowed(&line.text)
        }
    }

    pub fn print_logger(&self) -> bool {
        self.print_logger.load(Ordering::Relaxed)
    }

    pub fn set_print_logger(&self, enabled: bool) {
        self.print_logger.store(enabled, Ordering::Relaxed);
    }

    /// Register `callback` to run for every line matching `pattern`.
    pub fn add_expr_cbk<F>(&self, pattern: &str, callback: F, is_regex: bool) -> Result<()>
    where
        F: FnMut() + Send + 'static,
    {
        self.callbacks
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .add(pattern, is_regex, Box::new(callback))
    }

    /// Pop the oldest buffered line. See [`LineBuffer::get`].
    pub fn get_line(&self, block: bool, timeout: Option<Duration>) -> Result<LogLine> {
        self.buffer.get(block, timeout)
    }

    /// Consume lines until the `combine` condition over `patterns` holds.
    ///
    /// The deadline is computed once on entry. A pattern stays matched for
    /// the rest of the call once any line has matched it. Returns `Ok(false)`
    /// when the budget runs out. Lines are matched via [`Self::history_text`].
    pub fn read_cond<S: AsRef<str>>(
        &self,
        patterns: &[S],
        timeout: Duration,
        is_regex: bool,
        combine: Combine,
    ) -> Result<bool> {
        Ok(self
            .read_cond_line(patterns, timeout, is_regex, combine)?
            .is_some())
    }

    /// Like `read_cond`, returning the line that completed the condition.
    pub fn read_cond_line<S: AsRef<str>>(
        &self,
        patterns: &[S],
        timeout: Duration,
        is_regex: bool,
        combine: Combine,
    ) -> Result<Option<LogLine>> {
        let matchers = Matcher::compile_all(patterns, is_regex)?;
        // `None` when the timeout is too large to represent: wait without one.
        let deadline = deadline_after(timeout);
        let mut seen = vec![false; matchers.len()];

        loop {
            let remaining = match deadline {
                Some(deadline) => {
                    let remaining = deadline.saturating_duration_since(Instant::now());
                    if remaining.is_zero() {
                        return Ok(None);
                    }
                    Some(remaining)
                }
                None => None,
            };
            let line = match self.get_line(true, remaining) {
                Ok(line) => line,
                Err(ConsoleError::Empty) => return Ok(None),
                Err(e) => return Err(e),
            };
            {
                let text = self.history_text(&line);
                for (flag, matcher) in seen.iter_mut().zip(&matchers) {
                    if matcher.is_match(&text) {
                        *flag = true;
                    }
                }
            }
            if combine.satisfied(&seen) {
                return Ok(Some(line));
            }
        }
    }

    pub fn read_until(&self, pattern: &str, timeout: Duration, is_regex: bool) -> Result<bool> {
        self.read_cond(&[pattern], timeout, is_regex, Combine::Any)
    }

    pub fn read_until_one_of<S: AsRef<str>>(
        &self,
        patterns: &[S],
        timeout: Duration,
        is_regex: bool,
    ) -> Result<bool> {
        self.read_cond(patterns, timeout, is_regex, Combine::Any)
    }

    pub fn read_until_all<S: AsRef<str>>(
        &self,
        patterns: &[S],
        timeout: Duration,
        is_regex: bool,
    ) -> Result<bool> {
        self.read_cond(patterns, timeout, is_regex, Combine::All)
    }

    pub fn read_until_expr(&self, pattern: &str, timeout: Duration) -> Result<bool> {
        self.read_until(pattern, timeout, true)
    }

    pub fn read_until_one_of_expr<S: AsRef<str>>(
        &self,
        patterns: &[S],
        timeout: Duration,
    ) -> Result<bool> {
        self.read_until_one_of(patterns, timeout, true)
    }

    pub fn read_until_all_expr<S: AsRef<str>>(
        &self,
        patterns: &[S],
        timeout: Duration,
    ) -> Result<bool> {
        self.read_until_all(patterns, timeout, true)
    }

    /// Drop buffered history. Callbacks and the pump are unaffected.
    pub fn clear_history(&self) {
        self.buffer.clear();
    }
}

impl std::fmt::Debug for LineReader {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("LineReader")
            .field("name", &self.name)
            .field("state", &self.state())
            .field("shared", &self.shared)
            .field("buffered", &self.buffer.len())
            .finish()
    }
}
