//! Test lifecycle notifications

use super::context::{LogEntry, LogLevel};
use super::results::RunSummary;

/// Receives lifecycle events from the suite runner. Names are fully
/// qualified (`Namespace.Class.method`).
pub trait TestListener {
    fn on_started(&mut self, name: &str);
    fn on_passed(&mut self, name: &str, logs: &[LogEntry]);
    fn on_ignored(&mut self, name: &str, reason: &str);
    fn on_failed(&mut self, name: &str, logs: &[LogEntry]);

    /// Called once when the queue is exhausted
    fn on_finished(&mut self, _summary: &RunSummary) {}
}

/// Human-readable progress on stdout
pub struct ConsoleReporter {
    verbose: bool,
    current_class: String,
}

impl ConsoleReporter {
    pub fn new(verbose: bool) -> Self {
        Self {
            verbose,
            current_class: String::new(),
        }
    }

    fn line(&mut self, name: &str, status: &str) {
        let (class, method) = name.rsplit_once('.').unwrap_or(("", name));
        if class != self.current_class {
            if !self.current_class.is_empty() {
                println!();
            }
            println!("{}", class);
            self.current_class = class.to_string();
        }
        let dots = ".".repeat(40 - method.len().min(39));
        println!("  {} {} {}", method, dots, status);
    }
}

impl TestListener for ConsoleReporter {
    fn on_started(&mut self, _name: &str) {}

    fn on_passed(&mut self, name: &str, logs: &[LogEntry]) {
        self.line(name, "PASS");
        if self.verbose {
            for log in logs {
                println!("    {}", log);
            }
        }
    }

    fn on_ignored(&mut self, name: &str, reason: &str) {
        self.line(name, &format!("IGNORED ({})", reason));
    }

    fn on_failed(&mut self, name: &str, logs: &[LogEntry]) {
        self.line(name, "FAIL");
        for log in logs {
            if self.verbose {
                println!("    {}", log);
                if !log.stack.is_empty() {
                    println!("      {}", log.stack.replace('\n', "\n      "));
                }
            } else if log.level >= LogLevel::Error {
                println!("    {}", log.message);
            }
        }
    }

    fn on_finished(&mut self, summary: &RunSummary) {
        println!("\n==============");
        println!(
            "Results: {} passed, {} failed, {} ignored ({} total)",
            summary.success, summary.failed, summary.ignored, summary.total
        );
    }
}
