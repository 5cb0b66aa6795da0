//! TeamCity service messages
//!
//! CI parses these lines byte-for-byte:
//! `##teamcity[testStarted timestamp='2024-05-01T10:00:00.000' name='A.b']`

use std::io::Write;

use chrono::{DateTime, Utc};

use super::context::LogEntry;
use super::listener::TestListener;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum MarkerKind {
    Started,
    Finished,
    Failed,
    Ignored,
}

impl MarkerKind {
    fn as_str(self) -> &'static str {
        match self {
            MarkerKind::Started => "testStarted",
            MarkerKind::Finished => "testFinished",
            MarkerKind::Failed => "testFailed",
            MarkerKind::Ignored => "testIgnored",
        }
    }
}

/// Escape a value with TeamCity's `|` rules
pub fn escape(value: &str) -> String {
    let mut out = String::with_capacity(value.len());
    for c in value.chars() {
        match c {
            '|' => out.push_str("||"),
            '\'' => out.push_str("|'"),
            '\n' => out.push_str("|n"),
            '\r' => out.push_str("|r"),
            '[' => out.push_str("|["),
            ']' => out.push_str("|]"),
            _ => out.push(c),
        }
    }
    out
}

pub fn timestamp(at: DateTime<Utc>) -> String {
    at.format("%Y-%m-%dT%H:%M:%S%.3f").to_string()
}

pub fn marker(kind: MarkerKind, name: &str, at: DateTime<Utc>) -> String {
    format!(
        "##teamcity[{} timestamp='{}' name='{}']",
        kind.as_str(),
        timestamp(at),
        escape(name)
    )
}

/// Listener that writes markers to a stream (stdout by default)
pub struct TeamCityReporter {
    out: Box<dyn Write>,
}

impl TeamCityReporter {
    pub fn stdout() -> Self {
        Self::new(Box::new(std::io::stdout()))
    }

    pub fn new(out: Box<dyn Write>) -> Self {
        Self { out }
    }

    fn emit(&mut self, kind: MarkerKind, name: &str) {
        // Nothing sensible to do if the console is gone
        let _ = writeln!(self.out, "{}", marker(kind, name, Utc::now()));
        let _ = self.out.flush();
    }
}

impl TestListener for TeamCityReporter {
    fn on_started(&mut self, name: &str) {
        self.emit(MarkerKind::Started, name);
    }

    fn on_passed(&mut self, name: &str, _logs: &[LogEntry]) {
        self.emit(MarkerKind::Finished, name);
    }

    fn on_ignored(&mut self, name: &str, _reason: &str) {
        self.emit(MarkerKind::Ignored, name);
    }

    fn on_failed(&mut self, name: &str, _logs: &[LogEntry]) {
        self.emit(MarkerKind::Failed, name);
    }
}
