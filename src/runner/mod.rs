//! Suite execution and reporting

pub mod context;
pub mod listener;
pub mod permitted;
pub mod results;
pub mod run_log;
pub mod suite;
pub mod teamcity;

pub use context::{LogEntry, LogLevel, RunContext, TestState};
pub use listener::{ConsoleReporter, TestListener};
pub use permitted::{MessageMatch, PermittedError, PermittedErrors, PermittedErrorsError};
pub use results::{FailedTestResult, ReportError, RunSummary, TestResults};
pub use run_log::RunLog;
pub use suite::{SuiteRunner, SuiteStatus};
pub use teamcity::{MarkerKind, TeamCityReporter};
