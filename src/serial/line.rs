//! Line records and pattern matching.

use std::fmt;

use chrono::{DateTime, Local};
use regex::Regex;

/// One decoded line of console output.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct LogLine {
    /// When the pump read the line.
    pub timestamp: DateTime<Local>,
    /// Name of the console that produced it.
    pub source: String,
    pub text: String,
}

impl LogLine {
    pub fn new(source: &str, text: String) -> Self {
        Self {
            timestamp: Local::now(),
            source: source.to_string(),
            text,
        }
    }

    /// Render the line the way it is persisted in a shared log file:
    /// `[<timestamp>] [<source>] - <text>`. Empty lines render empty.
    pub fn record(&self) -> String {
        if self.text.is_empty() {
            return String::new();
        }
        format!(
            "[{}] [{}] - {}",
            self.timestamp.format("%Y-%m-%d %H:%M:%S%.6f"),
            self.source,
            self.text
        )
    }
}

impl fmt::Display for LogLine {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.text)
    }
}

/// Strip NUL characters and trailing whitespace from a raw line.
pub fn normalize_line(raw: &str) -> String {
    let mut line = raw.replace('\0', "");
    let trimmed = line.trim_end().len();
    line.truncate(trimmed);
    line
}

/// How per-pattern results are combined by `read_cond`.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Combine {
    /// Satisfied once any pattern has been seen.
    Any,
    /// Satisfied once every pattern has been seen.
    All,
}

impl Combine {
    pub fn satisfied(self, seen: &[bool]) -> bool {
        match self {
            Combine::Any => seen.iter().any(|s| *s),
            Combine::All => seen.iter().all(|s| *s),
        }
    }
}

impl fmt::Display for Combine {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Combine::Any => f.write_str("any"),
            Combine::All => f.write_str("all"),
        }
    }
}

/// A compiled pattern: substring or regex search.
#[derive(Debug, Clone)]
pub enum Matcher {
    Literal(String),
    Regex(Regex),
}

impl Matcher {
    pub fn new(pattern: &str, is_regex: bool) -> Result<Self, regex::Error> {
        if is_regex {
            Ok(Matcher::Regex(Regex::new(pattern)?))
        } else {
            Ok(Matcher::Literal(pattern.to_string()))
        }
    }

    pub fn compile_all<S: AsRef<str>>(
        patterns: &[S],
        is_regex: bool,
    ) -> Result<Vec<Self>, regex::Error> {
        patterns
            .iter()
            .map(|p| Matcher::new(p.as_ref(), is_regex))
            .collect()
    }

    pub fn is_match(&self, text: &str) -> bool {
        match self {
            Matcher::Literal(needle) => text.contains(needle.as_str()),
            Matcher::Regex(re) => re.is_match(text),
        }
    }
}
