//! Console driver for mw::com integration tests.
//!
//! This library provides the shared infrastructure for driving a target's
//! text console from test code:
//! - A line pump with bounded, blocking history (`serial::LineReader`)
//! - Shell round trips with exit code capture (`Console::run_sh_cmd_output`)
//! - Expect / mark protocols for waiting on output patterns
//! - A child-process transport (`PipeConsole`) for QEMU `-serial stdio`
//! - Executor trait for abstracting console backends
//!
//! Process and VM lifecycle (spawning QEMU, cleaning up shared memory) is
//! the caller's business; this crate only needs the child's pipes.

pub mod config;
pub mod error;
pub mod executor;
pub mod logging;
pub mod serial;

// Re-export commonly used items
pub use config::ConsoleConfig;
pub use error::{timeout_from_secs, ConsoleError, Result};
pub use executor::{run_all, Executor};
pub use serial::{
    Combine, Command, CommandResult, Console, LineReader, LogLine, LogRegistry, Mark,
    PendingProcess, PipeConsole, ReaderOptions,
};
