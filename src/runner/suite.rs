//! Test suite runner
//!
//! Walks the run queue one method at a time, advancing at most one
//! coroutine step per host frame:
//!
//! ```text
//! Next -> SettingUp -> Running -> TearingDown -> Next -> ... -> Finished
//! ```
//!
//! Ignored methods are resolved inside `Next` without instantiating their
//! class. Synchronous bodies run to completion in the frame they start.

use std::collections::VecDeque;
use std::rc::Rc;
use std::time::Duration;

use bevy::prelude::*;

use super::context::{LogEntry, LogLevel, RunContext, TestState};
use super::listener::TestListener;
use super::permitted::PermittedErrors;
use super::results::{RunSummary, TestResults};
use super::run_log::RunLog;
use crate::capture::LogSink;
use crate::catalog::{ClassNode, QueuedTest, RunFilter, TestBody, TestCatalog, TestFixture};
use crate::constants::{DEFAULT_RESOLUTION, RESULTS_FILE, RUN_LOG_FILE};
use crate::coroutine::{CoroutineDriver, DriverOutcome, FrameTime};
use crate::failure::guard;
use crate::selection::SelectedTests;
use crate::settings::RunnerSettings;
use crate::stacktrace::SourceTracer;

const RUN_STOPPED: &str = "test run stopped";

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SuiteStatus {
    /// `begin` has not been called
    Idle,
    Running,
    Finished,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Phase {
    Idle,
    Next,
    SettingUp,
    Running,
    TearingDown,
    Finished,
}

/// Contiguous run of queued methods sharing one fixture instance
struct ClassBlock {
    class: Rc<ClassNode>,
    fixture: Option<Box<dyn TestFixture>>,
    /// Set when instantiation or one-time setup failed
    failure: Option<String>,
}

pub struct SuiteRunner {
    queue: VecDeque<QueuedTest>,
    total_queued: usize,
    current: Option<QueuedTest>,
    block: Option<ClassBlock>,
    setup_attempted: bool,
    timeout: Duration,
    phase: Phase,
    driver: CoroutineDriver,
    context: RunContext,
    results: TestResults,
    listeners: Vec<Box<dyn TestListener>>,
    permitted: PermittedErrors,
    sink: LogSink,
    run_log: RunLog,
    settings: RunnerSettings,
}

impl SuiteRunner {
    pub fn new(queue: Vec<QueuedTest>, settings: RunnerSettings) -> Self {
        let tracer = SourceTracer::new(
            settings.source_roots.clone(),
            settings.suspension_keyword.clone(),
        );
        Self {
            total_queued: queue.len(),
            queue: queue.into(),
            current: None,
            block: None,
            setup_attempted: false,
            timeout: settings.default_timeout(),
            phase: Phase::Idle,
            driver: CoroutineDriver::new(tracer),
            context: RunContext::default(),
            results: TestResults::new(settings.build.clone()),
            listeners: Vec::new(),
            permitted: PermittedErrors::default(),
            sink: LogSink::new(),
            run_log: RunLog::closed(),
            settings,
        }
    }

    /// Queue the catalog methods chosen by `selection`
    pub fn from_catalog(
        catalog: &TestCatalog,
        selection: &SelectedTests,
        settings: RunnerSettings,
    ) -> Self {
        let filter = RunFilter::from_selection(selection, selection.specific.as_deref());
        Self::new(catalog.queue(filter, selection.repeat_count), settings)
    }

    /// Share a sink with a capture layer
    pub fn with_log_sink(mut self, sink: LogSink) -> Self {
        self.sink = sink;
        self
    }

    pub fn with_permitted(mut self, permitted: PermittedErrors) -> Self {
        self.permitted = permitted;
        self
    }

    pub fn with_listener(mut self, listener: impl TestListener + 'static) -> Self {
        self.add_listener(Box::new(listener));
        self
    }

    pub fn add_listener(&mut self, listener: Box<dyn TestListener>) {
        self.listeners.push(listener);
    }

    pub fn log_sink(&self) -> LogSink {
        self.sink.clone()
    }

    /// Feed a log line as if it came from the engine
    pub fn on_log(&self, entry: LogEntry) {
        self.sink.push(entry);
    }

    pub fn context(&self) -> &RunContext {
        &self.context
    }

    pub fn results(&self) -> &TestResults {
        &self.results
    }

    pub fn summary(&self) -> RunSummary {
        self.results.summary()
    }

    pub fn total_queued(&self) -> usize {
        self.total_queued
    }

    pub fn is_finished(&self) -> bool {
        self.phase == Phase::Finished
    }

    pub fn status(&self) -> SuiteStatus {
        match self.phase {
            Phase::Idle => SuiteStatus::Idle,
            Phase::Finished => SuiteStatus::Finished,
            _ => SuiteStatus::Running,
        }
    }

    /// Start the run: reset the aggregate and open the run log
    pub fn begin(&mut self) {
        if self.phase != Phase::Idle {
            warn!("Test run already started");
            return;
        }
        self.results = TestResults::new(self.settings.build.clone());
        if self.settings.persist_reports {
            self.run_log = RunLog::open(self.settings.output_dir().join(RUN_LOG_FILE));
        }
        info!("Starting test run: {} queued", self.queue.len());
        self.phase = Phase::Next;
    }

    /// Advance by one host frame
    pub fn tick(&mut self, frame: FrameTime) -> SuiteStatus {
        let mut frame = Some(frame);
        loop {
            self.absorb_logs();
            match self.phase {
                Phase::Idle => return SuiteStatus::Idle,
                Phase::Finished => return SuiteStatus::Finished,
                Phase::Next => self.start_next(),
                Phase::SettingUp => self.set_up(),
                Phase::Running => {
                    if self.driver.is_active() {
                        // One coroutine step per frame
                        let Some(frame) = frame.take() else {
                            return SuiteStatus::Running;
                        };
                        self.drive(frame);
                    } else {
                        self.start_body();
                    }
                }
                Phase::TearingDown => self.tear_down(),
            }
        }
    }

    /// Abort the run (application stopping). The current method and every
    /// method still queued fail as stopped, then reports are written.
    pub fn stop(&mut self) {
        if matches!(self.phase, Phase::Idle | Phase::Finished) {
            return;
        }
        if self.current.is_some() {
            self.fail_current(RUN_STOPPED, "");
            if self.phase == Phase::TearingDown {
                self.tear_down();
            }
        }
        self.drop_queue();
        self.finish();
    }

    /// Record every queued method without running it
    fn drop_queue(&mut self) {
        let stopped = LogEntry::new(LogLevel::Exception, RUN_STOPPED);
        for test in std::mem::take(&mut self.queue) {
            let name = test.full_name();
            self.run_log.begin_test(&name);
            if let Some(reason) = test.method.settings.ignored.as_deref() {
                self.results.record_ignored(&name);
                for listener in &mut self.listeners {
                    listener.on_ignored(&name, reason);
                }
                continue;
            }
            self.run_log.append(&stopped);
            self.results
                .record_failure(&name, vec![RUN_STOPPED.to_string()]);
            for listener in &mut self.listeners {
                listener.on_failed(&name, std::slice::from_ref(&stopped));
            }
        }
    }

    fn start_next(&mut self) {
        self.close_block_if_leaving();

        let Some(test) = self.queue.pop_front() else {
            self.finish();
            return;
        };

        let name = test.full_name();
        self.context.reset(&name);
        self.run_log.begin_test(&name);

        if let Some(reason) = test.method.settings.ignored.as_deref() {
            debug!("{} ignored: {}", name, reason);
            self.context.state = TestState::Ignored;
            self.results.record_ignored(&name);
            for listener in &mut self.listeners {
                listener.on_ignored(&name, reason);
            }
            return;
        }

        let current = self.settings.resolution();
        let resolution = test
            .method
            .settings
            .resolve_target(current, DEFAULT_RESOLUTION.into());
        if resolution != current {
            info!("{} does not target {}, running at {}", name, current, resolution);
        }
        self.context.resolution = Some(resolution);
        self.context.state = TestState::InProgress;
        self.timeout = test
            .method
            .settings
            .timeout_or(self.settings.default_timeout());
        self.setup_attempted = false;

        debug!("{} started", name);
        for listener in &mut self.listeners {
            listener.on_started(&name);
        }
        self.current = Some(test);
        self.phase = Phase::SettingUp;
    }

    fn set_up(&mut self) {
        let Some(test) = self.current.clone() else {
            self.phase = Phase::Next;
            return;
        };

        if self.block.is_none() {
            self.block = Some(Self::enter_block(&test.class));
        }

        let block_failure = self.block.as_ref().and_then(|b| b.failure.clone());
        if let Some(reason) = block_failure {
            self.fail_current(&format!("one-time setup failed: {}", reason), "");
            return;
        }

        self.setup_attempted = true;
        let result = match self.block.as_mut().and_then(|b| b.fixture.as_mut()) {
            Some(fixture) => guard(|| fixture.setup()),
            None => Ok(()),
        };
        match result {
            Ok(()) => self.phase = Phase::Running,
            Err(failure) => self.fail_current(&format!("setup failed: {}", failure), ""),
        }
    }

    /// Create the fixture and run its one-time setup
    fn enter_block(class: &Rc<ClassNode>) -> ClassBlock {
        debug!("Entering {}", class.full_name());
        let mut block = ClassBlock {
            class: class.clone(),
            fixture: None,
            failure: None,
        };
        match guard(|| Ok(class.instantiate())) {
            Ok(mut fixture) => {
                if let Err(failure) = guard(|| fixture.one_time_setup()) {
                    block.failure = Some(failure.to_string());
                }
                block.fixture = Some(fixture);
            }
            Err(failure) => {
                block.failure = Some(format!("could not create {}: {}", class.full_name(), failure));
            }
        }
        block
    }

    fn start_body(&mut self) {
        let Some(test) = self.current.clone() else {
            self.phase = Phase::Next;
            return;
        };
        let Some(fixture) = self.block.as_mut().and_then(|b| b.fixture.as_mut()) else {
            self.fail_current("no fixture instance", "");
            return;
        };

        match &test.method.body {
            TestBody::Sync(body) => {
                let result = guard(|| body(fixture.as_mut()));
                match result {
                    Ok(()) => self.phase = Phase::TearingDown,
                    Err(failure) => self.fail_current(&failure.to_string(), ""),
                }
            }
            TestBody::Coroutine(body) => match guard(|| body(fixture.as_mut())) {
                Ok(routine) => {
                    self.context.elapsed = Duration::ZERO;
                    self.driver
                        .start(routine, &test.class.name, &test.method.name);
                }
                Err(failure) => self.fail_current(&failure.to_string(), ""),
            },
        }
    }

    fn drive(&mut self, frame: FrameTime) {
        self.context.elapsed += frame.real_delta;
        if self.context.elapsed >= self.timeout {
            let message = format!("timed out after {} ms", self.timeout.as_millis());
            self.fail_current(&message, "");
            return;
        }

        match self.driver.tick(frame) {
            DriverOutcome::Idle | DriverOutcome::Running => {}
            DriverOutcome::Completed | DriverOutcome::Stopped => {
                self.phase = Phase::TearingDown;
            }
            DriverOutcome::Failed(message) => {
                let (message, location) = message
                    .split_once('\n')
                    .unwrap_or((message.as_str(), ""));
                self.fail_current(message, location);
            }
        }
    }

    fn tear_down(&mut self) {
        if self.setup_attempted {
            self.setup_attempted = false;
            let result = match self.block.as_mut().and_then(|b| b.fixture.as_mut()) {
                Some(fixture) => guard(|| fixture.teardown()),
                None => Ok(()),
            };
            if let Err(failure) = result {
                self.fail_current(&format!("teardown failed: {}", failure), "");
            }
        }
        self.absorb_logs();
        self.finish_test();
    }

    /// Record the terminal state of the current method
    fn finish_test(&mut self) {
        let Some(test) = self.current.take() else {
            self.phase = Phase::Next;
            return;
        };
        let name = test.full_name();

        if self.context.has_failed() {
            self.results
                .record_failure(&name, self.context.error_messages());
            for listener in &mut self.listeners {
                listener.on_failed(&name, &self.context.logs);
            }
        } else {
            self.context.state = TestState::Success;
            self.results.record_success(&name);
            for listener in &mut self.listeners {
                listener.on_passed(&name, &self.context.logs);
            }
        }
        debug!("{} finished: {:?}", name, self.context.state);
        self.phase = Phase::Next;
    }

    /// Run one-time teardown if the next queued method belongs elsewhere
    fn close_block_if_leaving(&mut self) {
        let leaving = match (&self.block, self.queue.front()) {
            (None, _) => false,
            (Some(block), Some(next)) => !Rc::ptr_eq(&block.class, &next.class),
            (Some(_), None) => true,
        };
        if leaving {
            self.close_block();
        }
    }

    fn close_block(&mut self) {
        let Some(block) = self.block.take() else {
            return;
        };
        debug!("Leaving {}", block.class.full_name());
        if let Some(mut fixture) = block.fixture
            && let Err(failure) = guard(|| fixture.one_time_teardown())
        {
            let message = format!(
                "{}: one-time teardown failed: {}",
                block.class.full_name(),
                failure
            );
            warn!("{}", message);
            self.run_log
                .append(&LogEntry::new(LogLevel::Exception, message));
        }
    }

    /// Fail the current method. Abandons a running coroutine and moves on
    /// to teardown; later failures of the same method are only logged.
    fn fail_current(&mut self, message: &str, stack: &str) {
        let entry = LogEntry::new(LogLevel::Exception, message).with_stack(stack);
        self.run_log.append(&entry);
        self.context.record(entry);

        if self.context.state == TestState::InProgress {
            self.context.state = TestState::Failed;
            error!("{} failed: {}", self.context.test_name, message);
        }
        if self.driver.is_active() {
            self.driver.stop();
        }
        if matches!(self.phase, Phase::SettingUp | Phase::Running) {
            self.phase = Phase::TearingDown;
        }
    }

    /// Drain captured logs; an unpermitted error fails the current method
    fn absorb_logs(&mut self) {
        for entry in self.sink.drain() {
            self.run_log.append(&entry);
            if self.current.is_none() {
                continue;
            }
            let fatal = entry.level.is_error()
                && self.context.state == TestState::InProgress
                && !self.permitted.is_permitted(&entry.message, &entry.stack);
            let message = entry.message.clone();
            self.context.record(entry);
            if fatal {
                self.fail_current(&format!("unexpected error log: {}", message), "");
            }
        }
    }

    fn finish(&mut self) {
        self.close_block();
        self.driver.stop();

        let summary = self.results.summary();
        for listener in &mut self.listeners {
            listener.on_finished(&summary);
        }
        if self.settings.persist_reports {
            let path = self.settings.output_dir().join(RESULTS_FILE);
            if let Err(e) = self.results.write(&path) {
                warn!("{}", e);
            }
        }
        self.run_log.close();

        info!(
            "Test run finished: {} passed, {} failed, {} ignored",
            summary.success, summary.failed, summary.ignored
        );
        self.phase = Phase::Finished;
    }
}
