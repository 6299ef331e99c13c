//! Console configuration.
//!
//! Loaded from a TOML file; every field has a default, so an empty file
//! (or no file at all) is valid:
//!
//! ```toml
//! name = "Qemu"
//! logfile = "/tmp/itest/console.log"
//! print_logger = true
//! history_capacity = 400
//! command_timeout_secs = 30
//! expect_timeout_secs = 90
//! ```

use anyhow::{Context, Result};
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use std::time::Duration;

use crate::error::timeout_from_secs;
use crate::serial::{
    LogRegistry, ReaderOptions, DEFAULT_CAPACITY, DEFAULT_COMMAND_TIMEOUT, DEFAULT_EXPECT_TIMEOUT,
};

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct ConsoleConfig {
    /// Console name, used as the source tag in logs.
    pub name: String,
    /// Shared log file; consoles with the same path share history.
    pub logfile: Option<PathBuf>,
    /// Echo console output through the logger.
    pub print_logger: bool,
    /// Lines of history kept (0 = unbounded).
    pub history_capacity: usize,
    pub command_timeout_secs: f64,
    pub expect_timeout_secs: f64,
}

impl Default for ConsoleConfig {
    fn default() -> Self {
        Self {
            name: "console".to_string(),
            logfile: None,
            print_logger: true,
            history_capacity: DEFAULT_CAPACITY,
            command_timeout_secs: DEFAULT_COMMAND_TIMEOUT.as_secs_f64(),
            expect_timeout_secs: DEFAULT_EXPECT_TIMEOUT.as_secs_f64(),
        }
    }
}

impl ConsoleConfig {
    /// Load a config file.
    pub fn load(path: &Path) -> Result<Self> {
        let contents = std::fs::read_to_string(path)
            .with_context(|| format!("Reading {}", path.display()))?;
        Self::from_toml_str(&contents).with_context(|| format!("Parsing {}", path.display()))
    }

    /// Load `path` if given, defaults otherwise.
    pub fn load_or_default(path: Option<&Path>) -> Result<Self> {
        match path {
            Some(path) => Self::load(path),
            None => Ok(Self::default()),
        }
    }

    pub fn from_toml_str(contents: &str) -> Result<Self> {
        let config: Self = toml::from_str(contents)?;
        config.validate()?;
        Ok(config)
    }

    fn validate(&self) -> Result<()> {
        timeout_from_secs(self.command_timeout_secs).context("command_timeout_secs")?;
        timeout_from_secs(self.expect_timeout_secs).context("expect_timeout_secs")?;
        Ok(())
    }

    pub fn command_timeout(&self) -> Result<Duration> {
        Ok(timeout_from_secs(self.command_timeout_secs)?)
    }

    pub fn expect_timeout(&self) -> Result<Duration> {
        Ok(timeout_from_secs(self.expect_timeout_secs)?)
    }

    /// Reader options using the process-wide log registry.
    pub fn reader_options(&self) -> ReaderOptions {
        ReaderOptions {
            print_logger: self.print_logger,
            logfile: self.logfile.clone(),
            capacity: self.history_capacity,
            registry: LogRegistry::global(),
        }
    }
}
