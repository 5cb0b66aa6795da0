//! Playtest - frame-driven UI test runner for Bevy games
//!
//! Tests are registered in a `TestCatalog` and run inside the game loop, one
//! suspension point per frame. Results are reported as TeamCity service
//! messages, a run log and a JSON summary.

pub mod capture;
pub mod catalog;
pub mod constants;
pub mod coroutine;
pub mod failure;
pub mod plugin;
pub mod runner;
pub mod sample;
pub mod selection;
pub mod settings;
pub mod stacktrace;

pub use capture::{CapturedLogs, LogSink, capture_layer};
pub use catalog::{
    CatalogBuilder, ClassBuilder, MethodTestSettings, QueuedTest, RunFilter, TargetResolution,
    TestCatalog, TestCatalogProvider, TestFixture,
};
pub use constants::*;
pub use coroutine::{
    AsyncCoroutine, Coroutine, CoroutineDriver, DriverOutcome, FrameTime, TestContext, YieldUnit,
    Yielded, from_iter, wait_frames,
};
pub use failure::{TestFailure, ensure};
pub use plugin::{PlayModeTestPlugin, run_headless};
pub use runner::{
    ConsoleReporter, LogEntry, LogLevel, PermittedErrors, RunSummary, SuiteRunner, SuiteStatus,
    TeamCityReporter, TestListener,
};
pub use selection::{RunMode, SelectedTests, SelectionQuery};
pub use settings::RunnerSettings;
pub use stacktrace::SourceTracer;
