use std::cell::{Cell, RefCell};
use std::io::Write;
use std::rc::Rc;
use std::time::Duration;

use playtest::runner::{LogEntry, PermittedError, MessageMatch};
use playtest::{
    CatalogBuilder, ClassBuilder, FrameTime, PermittedErrors, RunnerSettings, SelectedTests,
    SuiteRunner, SuiteStatus, TeamCityReporter, TestCatalog, TestContext, TestFailure, TestFixture,
    TestListener, YieldUnit, Yielded, ensure, from_iter, wait_frames,
};

// =============================================================================
// HELPERS
// =============================================================================

fn quiet_settings() -> RunnerSettings {
    RunnerSettings {
        persist_reports: false,
        teamcity: false,
        ..Default::default()
    }
}

fn runner(catalog: &TestCatalog) -> SuiteRunner {
    SuiteRunner::from_catalog(catalog, &SelectedTests::default(), quiet_settings())
}

/// Tick with `frames` (cycled) until the run finishes; returns frames used
fn run(runner: &mut SuiteRunner, frames: &[FrameTime]) -> usize {
    runner.begin();
    for (count, frame) in frames.iter().cycle().take(100_000).enumerate() {
        if runner.tick(*frame) == SuiteStatus::Finished {
            return count + 1;
        }
    }
    panic!("suite never finished");
}

fn sixty_fps() -> [FrameTime; 1] {
    [FrameTime::uniform(1.0 / 60.0)]
}

#[derive(Clone, Default)]
struct SharedBuffer(Rc<RefCell<Vec<u8>>>);

impl Write for SharedBuffer {
    fn write(&mut self, buf: &[u8]) -> std::io::Result<usize> {
        self.0.borrow_mut().extend_from_slice(buf);
        Ok(buf.len())
    }

    fn flush(&mut self) -> std::io::Result<()> {
        Ok(())
    }
}

impl SharedBuffer {
    fn lines(&self) -> Vec<String> {
        String::from_utf8_lossy(&self.0.borrow())
            .lines()
            .map(str::to_string)
            .collect()
    }
}

/// Records lifecycle events as `kind:name` strings
#[derive(Clone, Default)]
struct Recorder {
    events: Rc<RefCell<Vec<String>>>,
    failure_logs: Rc<RefCell<Vec<LogEntry>>>,
}

impl TestListener for Recorder {
    fn on_started(&mut self, name: &str) {
        self.events.borrow_mut().push(format!("started:{}", name));
    }

    fn on_passed(&mut self, name: &str, _logs: &[LogEntry]) {
        self.events.borrow_mut().push(format!("passed:{}", name));
    }

    fn on_ignored(&mut self, name: &str, reason: &str) {
        self.events
            .borrow_mut()
            .push(format!("ignored:{}:{}", name, reason));
    }

    fn on_failed(&mut self, name: &str, logs: &[LogEntry]) {
        self.events.borrow_mut().push(format!("failed:{}", name));
        self.failure_logs.borrow_mut().extend_from_slice(logs);
    }
}

#[derive(Default)]
struct Plain;
impl TestFixture for Plain {}

// =============================================================================
// END TO END
// =============================================================================

#[test]
fn test_pass_fail_ignore_aggregate_and_teamcity_markers() {
    let catalog = CatalogBuilder::new()
        .class(
            ClassBuilder::<Plain>::new("EndToEnd")
                .test("a_asserts_true", |_| ensure(true, "never"))
                .coroutine("b_waits_then_asserts_false", |_| {
                    from_iter(vec![
                        Ok(Yielded::Frame),
                        Ok(Yielded::Frame),
                        Ok(Yielded::Frame),
                        Err(TestFailure::new("expected true but was false")),
                    ])
                })
                .test("c_flaky", |_| Ok(()))
                .ignore("flaky"),
        )
        .build();

    let markers = SharedBuffer::default();
    let mut runner = runner(&catalog)
        .with_listener(TeamCityReporter::new(Box::new(markers.clone())));
    run(&mut runner, &sixty_fps());

    let summary = runner.summary();
    assert_eq!(
        (summary.total, summary.success, summary.failed, summary.ignored),
        (3, 1, 1, 1)
    );
    assert_eq!(summary.success_tests_results, vec!["EndToEnd.a_asserts_true"]);
    assert_eq!(summary.ignore_tests_results, vec!["EndToEnd.c_flaky"]);
    let failed = &summary.failed_tests_results[0];
    assert_eq!(failed.name, "EndToEnd.b_waits_then_asserts_false");
    assert!(failed.error_messages.iter().any(|m| m.contains("expected true but was false")));

    let sequence: Vec<String> = markers
        .lines()
        .iter()
        .map(|line| {
            assert!(line.starts_with("##teamcity["), "{}", line);
            let kind = line["##teamcity[".len()..].split(' ').next().unwrap_or_default();
            let name = line.split("name='").nth(1).unwrap_or_default().trim_end_matches("']");
            format!("{}({})", kind, name)
        })
        .collect();
    assert_eq!(
        sequence,
        vec![
            "testStarted(EndToEnd.a_asserts_true)",
            "testFinished(EndToEnd.a_asserts_true)",
            "testStarted(EndToEnd.b_waits_then_asserts_false)",
            "testFailed(EndToEnd.b_waits_then_asserts_false)",
            "testIgnored(EndToEnd.c_flaky)",
        ]
    );
}

// =============================================================================
// ISOLATION
// =============================================================================

#[test]
fn test_panics_are_contained_to_their_test() {
    let catalog = CatalogBuilder::new()
        .class(
            ClassBuilder::<Plain>::new("Isolation")
                .test("sync_panics", |_| panic!("index out of range"))
                .coroutine("coroutine_panics", |_| panicking_after_one_frame())
                .test("still_runs", |_| Ok(())),
        )
        .build();

    let recorder = Recorder::default();
    let mut runner = runner(&catalog).with_listener(recorder.clone());
    run(&mut runner, &sixty_fps());

    assert_eq!(
        *recorder.events.borrow(),
        vec![
            "started:Isolation.sync_panics",
            "failed:Isolation.sync_panics",
            "started:Isolation.coroutine_panics",
            "failed:Isolation.coroutine_panics",
            "started:Isolation.still_runs",
            "passed:Isolation.still_runs",
        ]
    );
    let messages: Vec<String> = recorder
        .failure_logs
        .borrow()
        .iter()
        .map(|l| l.message.clone())
        .collect();
    assert!(messages.iter().any(|m| m.contains("index out of range")));
    assert!(messages.iter().any(|m| m.contains("dropdown vanished")));
}

fn panicking_after_one_frame() -> impl playtest::Coroutine {
    let mut step = 0;
    from_iter(std::iter::from_fn(move || {
        step += 1;
        match step {
            1 => Some(Yielded::Frame),
            _ => panic!("dropdown vanished"),
        }
    }))
}

// =============================================================================
// TIMEOUT
// =============================================================================

#[test]
fn test_timeout_uses_wall_clock_under_variable_deltas() {
    let catalog = CatalogBuilder::new()
        .class(
            ClassBuilder::<Plain>::new("Slow")
                .coroutine("never_ready", |_| {
                    from_iter(vec![Yielded::Unit(YieldUnit::until(|| false))])
                })
                .timeout_ms(2000),
        )
        .build();

    // Game time frozen, wall clock uneven: 0.25, 0.75, 1.5, 1.75, 2.25
    let frames = [
        FrameTime::new(Duration::ZERO, Duration::from_millis(250)),
        FrameTime::new(Duration::ZERO, Duration::from_millis(500)),
        FrameTime::new(Duration::ZERO, Duration::from_millis(750)),
    ];
    let mut runner = runner(&catalog);
    assert_eq!(run(&mut runner, &frames), 5);

    let summary = runner.summary();
    assert_eq!(summary.failed, 1);
    assert!(summary.failed_tests_results[0]
        .error_messages
        .iter()
        .any(|m| m.contains("timed out after 2000 ms")));
}

#[test]
fn test_long_game_time_wait_does_not_time_out() {
    let catalog = CatalogBuilder::new()
        .class(
            ClassBuilder::<Plain>::new("FastForward")
                .async_test("waits_fifty_game_seconds", |_, ctx| async move {
                    ctx.seconds(50.0).await;
                    Ok(())
                })
                .timeout_ms(2000),
        )
        .build();

    // Huge time scale: one game second per millisecond of wall clock
    let frames = [FrameTime::new(Duration::from_secs(1), Duration::from_millis(1))];
    let mut runner = runner(&catalog);
    assert_eq!(run(&mut runner, &frames), 51);
    assert_eq!(runner.summary().success, 1);
}

// =============================================================================
// SETUP / TEARDOWN
// =============================================================================

struct Ordered {
    journal: Rc<RefCell<Vec<String>>>,
    fail_setup_for: Option<&'static str>,
    fail_one_time_setup: bool,
    current: &'static str,
}

impl Ordered {
    fn log(&self, what: &str) {
        self.journal.borrow_mut().push(what.to_string());
    }
}

impl TestFixture for Ordered {
    fn one_time_setup(&mut self) -> Result<(), TestFailure> {
        self.log("one_time_setup");
        ensure(!self.fail_one_time_setup, "scene failed to load")
    }

    fn setup(&mut self) -> Result<(), TestFailure> {
        self.log("setup");
        ensure(self.fail_setup_for != Some(self.current), "setup exploded")
    }

    fn teardown(&mut self) -> Result<(), TestFailure> {
        self.log("teardown");
        Ok(())
    }

    fn one_time_teardown(&mut self) -> Result<(), TestFailure> {
        self.log("one_time_teardown");
        Ok(())
    }
}

fn ordered_class(
    name: &str,
    journal: &Rc<RefCell<Vec<String>>>,
    fail_setup_for: Option<&'static str>,
    fail_one_time_setup: bool,
) -> ClassBuilder<Ordered> {
    let journal = journal.clone();
    ClassBuilder::with_factory(name, move || {
        journal.borrow_mut().push("new".to_string());
        Ordered {
            journal: journal.clone(),
            fail_setup_for,
            fail_one_time_setup,
            // Setup runs before the body, so the first method is assumed
            current: "first",
        }
    })
    .test("first", |fx| {
        fx.log("body:first");
        fx.current = "second";
        Ok(())
    })
    .coroutine("second", |fx| {
        fx.log("body:second");
        wait_frames(1)
    })
}

#[test]
fn test_setup_and_teardown_order_per_class_block() {
    let journal = Rc::new(RefCell::new(Vec::new()));
    let catalog = CatalogBuilder::new()
        .class(ordered_class("Alpha", &journal, None, false))
        .class(ordered_class("Beta", &journal, Some("second"), false))
        .build();

    let mut runner = runner(&catalog);
    run(&mut runner, &sixty_fps());

    assert_eq!(
        *journal.borrow(),
        vec![
            // Alpha: one instance, one-time hooks around both methods
            "new",
            "one_time_setup",
            "setup",
            "body:first",
            "teardown",
            "setup",
            "body:second",
            "teardown",
            "one_time_teardown",
            // Beta: setup of `second` fails, its teardown still runs
            "new",
            "one_time_setup",
            "setup",
            "body:first",
            "teardown",
            "setup",
            "teardown",
            "one_time_teardown",
        ]
    );
    let summary = runner.summary();
    assert_eq!((summary.success, summary.failed), (3, 1));
    assert_eq!(summary.failed_tests_results[0].name, "Beta.second");
    assert!(summary.failed_tests_results[0].error_messages[0].contains("setup failed: setup exploded"));
}

#[test]
fn test_one_time_setup_failure_fails_whole_block() {
    let journal = Rc::new(RefCell::new(Vec::new()));
    let catalog = CatalogBuilder::new()
        .class(ordered_class("Broken", &journal, None, true))
        .build();

    let mut runner = runner(&catalog);
    run(&mut runner, &sixty_fps());

    assert_eq!(
        *journal.borrow(),
        vec!["new", "one_time_setup", "one_time_teardown"]
    );
    let summary = runner.summary();
    assert_eq!((summary.total, summary.failed), (2, 2));
    assert!(summary.failed_tests_results[1].error_messages[0].contains("scene failed to load"));
}

// =============================================================================
// PERMITTED ERRORS
// =============================================================================

fn five_frame_catalog() -> TestCatalog {
    CatalogBuilder::new()
        .class(ClassBuilder::<Plain>::new("Noisy").coroutine("waits", |_| wait_frames(5)))
        .build()
}

#[test]
fn test_permitted_error_mid_suspension_is_ignored() {
    let permitted = PermittedErrors::new()
        .contains("Audio device")
        .with(PermittedError {
            message: MessageMatch::Exact("Shader fallback".to_string()),
            stack: Some(MessageMatch::Contains("render::pipeline".to_string())),
        });
    let mut runner = runner(&five_frame_catalog()).with_permitted(permitted);
    runner.begin();
    runner.tick(FrameTime::uniform(0.016));
    runner.tick(FrameTime::uniform(0.016));

    // Logged from another thread, as a tracing layer would
    let sink = runner.log_sink();
    std::thread::spawn(move || {
        sink.push(LogEntry::error("Audio device lost"));
        sink.push(LogEntry::error("Shader fallback").with_stack("render::pipeline (pipeline.rs:10)"));
    })
    .join()
    .unwrap();

    let mut status = SuiteStatus::Running;
    for _ in 0..10 {
        status = runner.tick(FrameTime::uniform(0.016));
    }
    assert_eq!(status, SuiteStatus::Finished);
    assert_eq!(runner.summary().success, 1);
}

#[test]
fn test_unpermitted_error_mid_suspension_fails_immediately() {
    let permitted = PermittedErrors::new().exact("Shader fallback");
    let mut runner = runner(&five_frame_catalog()).with_permitted(permitted);
    runner.begin();
    runner.tick(FrameTime::uniform(0.016));

    runner.on_log(LogEntry::error("NullReference in InventoryPanel"));
    assert_eq!(runner.tick(FrameTime::uniform(0.016)), SuiteStatus::Finished);

    let summary = runner.summary();
    assert_eq!(summary.failed, 1);
    assert!(summary.failed_tests_results[0]
        .error_messages
        .iter()
        .any(|m| m.contains("unexpected error log: NullReference in InventoryPanel")));
}

#[test]
fn test_warnings_never_fail() {
    let mut runner = runner(&five_frame_catalog());
    runner.begin();
    runner.tick(FrameTime::ZERO);
    runner.on_log(LogEntry::warning("frame took 40ms"));
    run_remaining(&mut runner);
    assert_eq!(runner.summary().success, 1);
}

fn run_remaining(runner: &mut SuiteRunner) {
    for _ in 0..100 {
        if runner.tick(FrameTime::ZERO) == SuiteStatus::Finished {
            return;
        }
    }
    panic!("suite never finished");
}

// =============================================================================
// IGNORED
// =============================================================================

#[test]
fn test_ignored_tests_never_instantiate_and_take_no_frames() {
    let created = Rc::new(Cell::new(0));
    let counter = created.clone();
    let catalog = CatalogBuilder::new()
        .class(
            ClassBuilder::with_factory("Skipped", move || {
                counter.set(counter.get() + 1);
                Plain
            })
            .test("one", |_| Ok(()))
            .ignore("flaky")
            .coroutine("two", |_| wait_frames(100))
            .ignore("needs gamepad"),
        )
        .build();

    let recorder = Recorder::default();
    let mut runner = runner(&catalog).with_listener(recorder.clone());
    assert_eq!(run(&mut runner, &sixty_fps()), 1);

    assert_eq!(created.get(), 0);
    assert_eq!(
        *recorder.events.borrow(),
        vec!["ignored:Skipped.one:flaky", "ignored:Skipped.two:needs gamepad"]
    );
    assert_eq!(runner.summary().ignored, 2);
}

// =============================================================================
// SOURCE LOCATION
// =============================================================================

const CHECKOUT_SOURCE: &str = r#"impl CheckoutTests {
    async fn pays_with_card(&mut self, ctx: TestContext) -> Result<(), TestFailure> {
        ctx.next_frame().await;
        // ctx.seconds(1.0).await;
        ctx.frames(2).await;
        ensure(false, "card declined")
    }
}
"#;

#[derive(Default)]
struct CheckoutTests;
impl TestFixture for CheckoutTests {}

#[test]
fn test_failure_reports_source_line_of_last_suspension() {
    let dir = tempfile::tempdir().unwrap();
    std::fs::write(dir.path().join("checkout_tests.rs"), CHECKOUT_SOURCE).unwrap();

    let catalog = CatalogBuilder::new()
        .class(ClassBuilder::<CheckoutTests>::new("CheckoutTests").async_test(
            "pays_with_card",
            |_, ctx| async move {
                ctx.next_frame().await;
                ctx.frames(2).await;
                ensure(false, "card declined")
            },
        ))
        .build();

    let settings = RunnerSettings {
        source_roots: vec![dir.path().to_path_buf()],
        ..quiet_settings()
    };
    let recorder = Recorder::default();
    let mut runner = SuiteRunner::from_catalog(&catalog, &SelectedTests::default(), settings)
        .with_listener(recorder.clone());
    run(&mut runner, &sixty_fps());

    let logs = recorder.failure_logs.borrow();
    let failure = logs
        .iter()
        .find(|l| l.message.contains("card declined"))
        .expect("failure entry");
    assert!(
        failure.stack.contains("checkout_tests.rs:5: ctx.frames(2).await;"),
        "{}",
        failure.stack
    );
}

const DRAWER_SOURCE: &str = r#"impl DrawerTests {
    async fn opens(&mut self, ctx: TestContext) -> Result<(), TestFailure> {
        ctx.run(open_drawer).await;
        ctx.frames(2).await;
        ensure(false, "drawer closed")
    }
}

async fn open_drawer(ctx: TestContext) -> Result<(), TestFailure> {
    ctx.next_frame().await;
    ctx.seconds(0.1).await;
    Ok(())
}
"#;

#[derive(Default)]
struct DrawerTests;
impl TestFixture for DrawerTests {}

async fn open_drawer(ctx: TestContext) -> Result<(), TestFailure> {
    ctx.next_frame().await;
    ctx.seconds(0.1).await;
    Ok(())
}

#[test]
fn test_nested_helper_counts_as_one_suspension_in_source_line() {
    let dir = tempfile::tempdir().unwrap();
    std::fs::write(dir.path().join("drawer_tests.rs"), DRAWER_SOURCE).unwrap();

    let catalog = CatalogBuilder::new()
        .class(ClassBuilder::<DrawerTests>::new("DrawerTests").async_test(
            "opens",
            |_, ctx| async move {
                ctx.run(open_drawer).await;
                ctx.frames(2).await;
                ensure(false, "drawer closed")
            },
        ))
        .build();

    let settings = RunnerSettings {
        source_roots: vec![dir.path().to_path_buf()],
        ..quiet_settings()
    };
    let recorder = Recorder::default();
    let mut runner = SuiteRunner::from_catalog(&catalog, &SelectedTests::default(), settings)
        .with_listener(recorder.clone());
    run(&mut runner, &sixty_fps());

    let logs = recorder.failure_logs.borrow();
    let failure = logs
        .iter()
        .find(|l| l.message.contains("drawer closed"))
        .expect("failure entry");
    assert!(
        failure.stack.contains("drawer_tests.rs:4: ctx.frames(2).await;"),
        "{}",
        failure.stack
    );
}

// =============================================================================
// REPORTS
// =============================================================================

#[test]
fn test_run_log_and_results_file_are_written() {
    let dir = tempfile::tempdir().unwrap();
    let catalog = CatalogBuilder::new()
        .class(
            ClassBuilder::<Plain>::new("Reports")
                .coroutine("waits", |_| wait_frames(3))
                .test("breaks", |_| ensure(false, "scoreboard broken")),
        )
        .build();
    let settings = RunnerSettings {
        output_dir: Some(dir.path().join("out")),
        build: "ci-7".to_string(),
        persist_reports: true,
        ..quiet_settings()
    };
    let log_path = dir.path().join("out").join(playtest::RUN_LOG_FILE);
    let results_path = dir.path().join("out").join(playtest::RESULTS_FILE);

    let mut runner = SuiteRunner::from_catalog(&catalog, &SelectedTests::default(), settings);
    runner.begin();
    assert!(log_path.exists(), "run log opened at begin");
    assert!(!results_path.exists());

    runner.tick(FrameTime::uniform(0.016));
    runner.on_log(
        LogEntry::warning("texture streaming slow").with_stack("loader::stream (src/loader.rs:42)"),
    );
    for _ in 0..100 {
        if runner.tick(FrameTime::uniform(0.016)) == SuiteStatus::Finished {
            break;
        }
    }
    assert!(runner.is_finished());

    let log = std::fs::read_to_string(&log_path).unwrap();
    let lines: Vec<&str> = log.lines().collect();
    assert!(lines[0].starts_with("# run "), "{}", log);
    let warning = lines
        .iter()
        .position(|l| l.ends_with("[WARN] texture streaming slow"))
        .expect("captured warning");
    assert_eq!(lines[warning + 1], "    loader::stream (src/loader.rs:42)");
    let waits = lines.iter().position(|l| *l == "== Reports.waits").unwrap();
    let breaks = lines.iter().position(|l| *l == "== Reports.breaks").unwrap();
    assert!(waits < warning && warning < breaks);
    assert!(lines[breaks..]
        .iter()
        .any(|l| l.ends_with("[EXCEPTION] scoreboard broken")));

    let json: serde_json::Value =
        serde_json::from_str(&std::fs::read_to_string(&results_path).unwrap()).unwrap();
    assert_eq!(json["Build"], "ci-7");
    assert_eq!(json["Total"], 2);
    assert_eq!(json["Success"], 1);
    assert_eq!(json["Failed"], 1);
    assert_eq!(json["Ignored"], 0);
    assert_eq!(json["SuccessTestsResults"][0], "Reports.waits");
    assert_eq!(json["FailedTestsResults"][0]["Name"], "Reports.breaks");
    assert_eq!(
        json["FailedTestsResults"][0]["ErrorMessages"][0],
        "scoreboard broken"
    );
    assert!(json["IgnoreTestsResults"].as_array().unwrap().is_empty());
}
