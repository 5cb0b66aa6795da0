//! Per-run test state and captured logs

use chrono::{DateTime, Utc};
use std::fmt;
use std::time::Duration;

use crate::catalog::TargetResolution;

#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord)]
pub enum LogLevel {
    Info,
    Warning,
    Error,
    /// Failure raised by the test itself
    Exception,
}

impl LogLevel {
    /// Levels that fail the current test unless permitted
    pub fn is_error(self) -> bool {
        matches!(self, LogLevel::Error | LogLevel::Exception)
    }
}

impl fmt::Display for LogLevel {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            LogLevel::Info => "INFO",
            LogLevel::Warning => "WARN",
            LogLevel::Error => "ERROR",
            LogLevel::Exception => "EXCEPTION",
        };
        f.write_str(s)
    }
}

/// One captured log line
#[derive(Debug, Clone, PartialEq)]
pub struct LogEntry {
    pub level: LogLevel,
    pub message: String,
    /// Stack or source location, possibly empty
    pub stack: String,
    pub timestamp: DateTime<Utc>,
}

impl LogEntry {
    pub fn new(level: LogLevel, message: impl Into<String>) -> Self {
        Self {
            level,
            message: message.into(),
            stack: String::new(),
            timestamp: Utc::now(),
        }
    }

    pub fn with_stack(mut self, stack: impl Into<String>) -> Self {
        self.stack = stack.into();
        self
    }

    pub fn error(message: impl Into<String>) -> Self {
        Self::new(LogLevel::Error, message)
    }

    pub fn warning(message: impl Into<String>) -> Self {
        Self::new(LogLevel::Warning, message)
    }
}

impl fmt::Display for LogEntry {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "[{}] {}", self.level, self.message)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum TestState {
    #[default]
    NotStarted,
    InProgress,
    Failed,
    Success,
    Ignored,
}

impl TestState {
    pub fn is_terminal(self) -> bool {
        matches!(self, TestState::Failed | TestState::Success | TestState::Ignored)
    }
}

/// State of the method currently running. Reset for every method.
#[derive(Debug, Clone, Default)]
pub struct RunContext {
    pub test_name: String,
    pub state: TestState,
    /// Logs captured since the method started
    pub logs: Vec<LogEntry>,
    /// Wall-clock time spent running the body
    pub elapsed: Duration,
    pub resolution: Option<TargetResolution>,
}

impl RunContext {
    pub fn reset(&mut self, test_name: impl Into<String>) {
        self.test_name = test_name.into();
        self.state = TestState::NotStarted;
        self.logs.clear();
        self.elapsed = Duration::ZERO;
        self.resolution = None;
    }

    pub fn record(&mut self, entry: LogEntry) {
        self.logs.push(entry);
    }

    pub fn has_failed(&self) -> bool {
        self.state == TestState::Failed
    }

    /// Messages of error-level logs, for the results file
    pub fn error_messages(&self) -> Vec<String> {
        self.logs
            .iter()
            .filter(|l| l.level.is_error())
            .map(|l| l.message.clone())
            .collect()
    }

    pub fn log_lines(&self) -> Vec<String> {
        self.logs.iter().map(|l| l.to_string()).collect()
    }
}
