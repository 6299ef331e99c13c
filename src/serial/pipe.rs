//! Console over a child process' stdin/stdout.
//!
//! Used for QEMU started with `-serial stdio` and for plain subprocesses.
//!
//! - Reads deliver a line on `\n`, or as soon as pending output ends with
//!   the shell prompt `"# "`, so prompts that never get a newline still
//!   arrive promptly.
//! - Writes are best-effort: once the child has exited they are dropped,
//!   and I/O errors are only logged.

use std::io::{self, BufRead, BufReader, Write};
use std::ops::{Deref, DerefMut};
use std::process::{Child, ChildStdin, ChildStdout, ExitStatus};
use std::sync::{Arc, Mutex, PoisonError};

use tracing::debug;

use super::console::{Console, LineSink};
use super::decode::decode_line;
use super::reader::{LineSource, ReaderOptions};
use crate::error::{ConsoleError, Result};

/// Shell prompt that ends a line even without a newline.
///
/// Checked against what has been read so far, so a `"# "` in the middle of
/// a line splits it when a read happens to end right after it
/// (`echo a # note` arriving as `echo a # ` + `note`).
pub const PROMPT_MARKER: &[u8] = b"# ";

/// True once `pending` forms a deliverable unit: a full line or a prompt.
fn is_complete(pending: &[u8]) -> bool {
    pending.ends_with(b"\n") || pending.ends_with(PROMPT_MARKER)
}

/// Encode a command for the wire: the text plus a single newline.
fn encode_command(command: &str) -> Vec<u8> {
    let mut bytes = Vec::with_capacity(command.len() + 1);
    bytes.extend_from_slice(command.as_bytes());
    bytes.push(b'\n');
    bytes
}

/// Minimal view of a running process needed by the write primitive.
pub trait ProcessHandle: Send {
    /// True once the process has terminated.
    fn has_exited(&mut self) -> bool;
}

impl ProcessHandle for Child {
    fn has_exited(&mut self) -> bool {
        // An error from try_wait means we can no longer observe the child.
        !matches!(self.try_wait(), Ok(None))
    }
}

impl<P: ProcessHandle> ProcessHandle for Arc<Mutex<P>> {
    fn has_exited(&mut self) -> bool {
        self.lock()
            .unwrap_or_else(PoisonError::into_inner)
            .has_exited()
    }
}

/// Read primitive over any buffered byte stream.
pub struct PipeReader<R> {
    inner: R,
}

impl<R: BufRead> PipeReader<R> {
    pub fn new(inner: R) -> Self {
        Self { inner }
    }

    fn next_line(&mut self) -> io::Result<Option<String>> {
        let mut pending: Vec<u8> = Vec::new();
        loop {
            let available = self.inner.fill_buf()?;
            if available.is_empty() {
                // End of stream: flush a trailing partial line first.
                if pending.is_empty() {
                    return Ok(None);
                }
                return Ok(Some(decode_line(&pending)));
            }

            let (take, newline) = match available.iter().position(|b| *b == b'\n') {
                Some(pos) => (pos + 1, true),
                None => (available.len(), false),
            };
            pending.extend_from_slice(&available[..take]);
            self.inner.consume(take);

            if newline || is_complete(&pending) {
                return Ok(Some(decode_line(&pending)));
            }
        }
    }
}

impl<R: BufRead + Send + 'static> LineSource for PipeReader<R> {
    fn read_line(&mut self) -> io::Result<Option<String>> {
        self.next_line()
    }
}

/// Write primitive over a process' stdin.
pub struct PipeWriter<W, P> {
    stdin: W,
    process: P,
}

impl<W: Write + Send, P: ProcessHandle> PipeWriter<W, P> {
    pub fn new(stdin: W, process: P) -> Self {
        Self { stdin, process }
    }
}

impl<W: Write + Send, P: ProcessHandle> LineSink for PipeWriter<W, P> {
    fn write_line(&mut self, text: &str) {
        if self.process.has_exited() {
            return;
        }
        let written = self
            .stdin
            .write_all(&encode_command(text))
            .and_then(|()| self.stdin.flush());
        if let Err(e) = written {
            debug!(error = %e, "write to exited console dropped");
        }
    }
}

/// `Console` bound to a child process.
pub struct PipeConsole {
    console: Console,
    child: Arc<Mutex<Child>>,
}

impl PipeConsole {
    /// Take the child's stdin/stdout and start pumping its output.
    ///
    /// The child must have been spawned with piped stdin and stdout.
    pub fn spawn(name: &str, mut child: Child, options: ReaderOptions) -> Result<Self> {
        let stdin: ChildStdin = child.stdin.take().ok_or_else(|| {
            ConsoleError::InvalidArgument(format!("{name}: child stdin is not piped"))
        })?;
        let stdout: ChildStdout = child.stdout.take().ok_or_else(|| {
            ConsoleError::InvalidArgument(format!("{name}: child stdout is not piped"))
        })?;

        let child = Arc::new(Mutex::new(child));
        let reader = PipeReader::new(BufReader::new(stdout));
        let writer = PipeWriter::new(stdin, Arc::clone(&child));
        let console = Console::new(name, reader, writer, options)?;

        Ok(Self { console, child })
    }

    pub fn has_exited(&self) -> bool {
        self.child
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .has_exited()
    }

    pub fn id(&self) -> u32 {
        self.child
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .id()
    }

    /// Kill the child (if still running) and reap it.
    ///
    /// Closing the pipe is what stops the line pump.
    pub fn terminate(&self) -> Result<ExitStatus> {
        let mut child = self.child.lock().unwrap_or_else(PoisonError::into_inner);
        if let Some(status) = child.try_wait()? {
            return Ok(status);
        }
        child.kill()?;
        Ok(child.wait()?)
    }

    pub fn into_console(self) -> Console {
        self.console
    }
}

impl Deref for PipeConsole {
    type Target = Console;

    fn deref(&self) -> &Console {
        &self.console
    }
}

impl DerefMut for PipeConsole {
    fn deref_mut(&mut self) -> &mut Console {
        &mut self.console
    }
}

impl std::fmt::Debug for PipeConsole {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("PipeConsole")
            .field("console", &self.console)
            .field("pid", &self.id())
            .finish()
    }
}
