//! In-memory transport for console tests.

use std::sync::mpsc::{self, Receiver, Sender};
use std::sync::{Arc, Mutex};

use super::console::Console;
use super::reader::ReaderOptions;
use super::registry::LogRegistry;

type Responder = Box<dyn FnMut(&str) -> Vec<String> + Send>;

/// Fake remote shell: records everything written and answers through a
/// scripted responder.
pub(crate) struct FakeShell {
    tx: Sender<String>,
    rx: Mutex<Option<Receiver<String>>>,
    sent: Arc<Mutex<Vec<String>>>,
    responder: Arc<Mutex<Responder>>,
}

impl FakeShell {
    /// A shell that never answers on its own.
    pub(crate) fn new() -> Self {
        Self::scripted(|_| Vec::new())
    }

    /// A shell that answers each written command with the returned lines.
    pub(crate) fn scripted<F>(responder: F) -> Self
    where
        F: FnMut(&str) -> Vec<String> + Send + 'static,
    {
        let (tx, rx) = mpsc::channel();
        Self {
            tx,
            rx: Mutex::new(Some(rx)),
            sent: Arc::new(Mutex::new(Vec::new())),
            responder: Arc::new(Mutex::new(Box::new(responder))),
        }
    }

    /// Build a console bound to this shell. Only one console per shell.
    pub(crate) fn console(&self, name: &str) -> Console {
        self.console_with(name, quiet_options())
    }

    pub(crate) fn console_with(&self, name: &str, options: ReaderOptions) -> Console {
        let rx = self
            .rx
            .lock()
            .unwrap()
            .take()
            .expect("console already created for this shell");
        let tx = self.tx.clone();
        let sent = Arc::clone(&self.sent);
        let responder = Arc::clone(&self.responder);

        Console::new(
            name,
            move || Ok(rx.recv().ok()),
            move |cmd: &str| {
                sent.lock().unwrap().push(cmd.to_string());
                let replies = (responder.lock().unwrap())(cmd);
                for reply in replies {
                    let _ = tx.send(reply);
                }
            },
            options,
        )
        .unwrap()
    }

    /// Emit a line as if the remote side printed it.
    pub(crate) fn emit(&self, line: &str) {
        self.tx.send(line.to_string()).unwrap();
    }

    pub(crate) fn sent(&self) -> Vec<String> {
        self.sent.lock().unwrap().clone()
    }
}

pub(crate) fn quiet_options() -> ReaderOptions {
    ReaderOptions {
        print_logger: false,
        registry: Arc::new(LogRegistry::new()),
        ..ReaderOptions::default()
    }
}

/// Strip the `; echo COMMAND_DONE=$?` suffix added by `run_sh_cmd_output`.
pub(crate) fn shell_command(written: &str) -> Option<&str> {
    written.strip_suffix("; echo COMMAND_DONE=$?")
}
