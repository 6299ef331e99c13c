//! Per-log-file shared state.
//!
//! Several consoles (e.g. the QEMU serial console and a host-side process)
//! may write to one log file. Every console configured with the same path
//! shares one file lock and one history buffer, so an expectation can match
//! lines coming from any of them.
//!
//! Entries are never removed: the registry lives as long as the process,
//! which is fine for short-lived test runs.

use std::collections::HashMap;
use std::fs::{File, OpenOptions};
use std::io::Write;
use std::path::{Path, PathBuf};
use std::sync::{Arc, Mutex, PoisonError};

use once_cell::sync::Lazy;

use super::buffer::LineBuffer;
use super::line::LogLine;

static GLOBAL: Lazy<Arc<LogRegistry>> = Lazy::new(|| Arc::new(LogRegistry::new()));

/// Registry of shared log files keyed by path.
#[derive(Debug, Default)]
pub struct LogRegistry {
    logs: Mutex<HashMap<PathBuf, Arc<SharedLog>>>,
}

impl LogRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// The process-wide registry used when none is injected.
    pub fn global() -> Arc<LogRegistry> {
        Arc::clone(&GLOBAL)
    }

    /// Get the shared log for `path`, opening the file on first use.
    ///
    /// `capacity` only applies to the buffer created by the first caller.
    pub fn acquire(&self, path: &Path, capacity: usize) -> std::io::Result<Arc<SharedLog>> {
        let mut logs = self.logs.lock().unwrap_or_else(PoisonError::into_inner);
        if let Some(log) = logs.get(path) {
            return Ok(Arc::clone(log));
        }

        let file = OpenOptions::new().create(true).append(true).open(path)?;
        let log = Arc::new(SharedLog {
            path: path.to_path_buf(),
            file: Mutex::new(file),
            buffer: Arc::new(LineBuffer::new(capacity)),
        });
        logs.insert(path.to_path_buf(), Arc::clone(&log));
        Ok(log)
    }

    pub fn len(&self) -> usize {
        self.logs.lock().unwrap_or_else(PoisonError::into_inner).len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

/// A log file plus the history buffer fed by every console writing to it.
#[derive(Debug)]
pub struct SharedLog {
    path: PathBuf,
    // Doubles as the exclusive-write lock for the file.
    file: Mutex<File>,
    buffer: Arc<LineBuffer<LogLine>>,
}

impl SharedLog {
    pub fn path(&self) -> &Path {
        &self.path
    }

    pub fn buffer(&self) -> Arc<LineBuffer<LogLine>> {
        Arc::clone(&self.buffer)
    }

    /// Append a record to the file and publish the line to the shared buffer.
    ///
    /// The line is published even when the write fails; the error is
    /// returned so the caller can report it.
    pub fn append(&self, line: &LogLine) -> std::io::Result<()> {
        let mut file = self.file.lock().unwrap_or_else(PoisonError::into_inner);
        let written = writeln!(file, "{} ", line.record()).and_then(|()| file.flush());
        self.buffer.put(line.clone());
        written
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_same_path_shares_log() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("console.log");
        let registry = LogRegistry::new();
        assert!(registry.is_empty());

        let a = registry.acquire(&path, 10).unwrap();
        let b = registry.acquire(&path, 99).unwrap();
        assert!(Arc::ptr_eq(&a, &b));
        assert_eq!(b.buffer().capacity(), 10);
        assert_eq!(registry.len(), 1);

        let other = registry.acquire(&dir.path().join("other.log"), 10).unwrap();
        assert!(!Arc::ptr_eq(&a, &other));
    }

    #[test]
    fn test_append_writes_record_and_buffers_line() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("console.log");
        let registry = LogRegistry::new();
        let log = registry.acquire(&path, 10).unwrap();

        log.append(&LogLine::new("Qemu", "hello".to_string())).unwrap();
        log.append(&LogLine::new("Host", "world".to_string())).unwrap();

        let contents = std::fs::read_to_string(&path).unwrap();
        let lines: Vec<&str> = contents.lines().collect();
        assert_eq!(lines.len(), 2);
        assert!(lines[0].ends_with("[Qemu] - hello "));
        assert!(lines[1].ends_with("[Host] - world "));

        let buffer = log.buffer();
        assert_eq!(buffer.get(false, None).unwrap().text, "hello");
        assert_eq!(buffer.get(false, None).unwrap().source, "Host");
    }

    #[cfg(unix)]
    #[test]
    fn test_append_buffers_line_when_write_fails() {
        let registry = LogRegistry::new();
        let log = registry.acquire(Path::new("/dev/full"), 10).unwrap();

        let err = log
            .append(&LogLine::new("Qemu", "lost".to_string()))
            .unwrap_err();
        assert_eq!(err.raw_os_error(), Some(28)); // ENOSPC
        assert_eq!(log.buffer().get(false, None).unwrap().text, "lost");
    }
}
