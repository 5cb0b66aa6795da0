//! Bevy integration
//!
//! `PlayModeTestPlugin` owns the suite runner as a non-send resource and
//! advances it once per `Update` from the virtual (scaled) and real clocks.
//! When the queue is exhausted it requests `AppExit`, with a failure code if
//! any test failed.

use std::time::Duration;

use bevy::prelude::*;

use crate::capture::CapturedLogs;
use crate::catalog::TestCatalog;
use crate::coroutine::FrameTime;
use crate::runner::{ConsoleReporter, PermittedErrors, SuiteRunner, SuiteStatus, TeamCityReporter};
use crate::selection::SelectedTests;
use crate::settings::RunnerSettings;

pub struct PlayModeTestPlugin {
    pub catalog: fn() -> TestCatalog,
    pub settings: RunnerSettings,
    pub selection: SelectedTests,
    /// Print captured logs for every test, not just failures
    pub verbose: bool,
    /// Request `AppExit` once the run has finished
    pub exit_when_done: bool,
}

impl PlayModeTestPlugin {
    pub fn new(catalog: fn() -> TestCatalog) -> Self {
        Self {
            catalog,
            settings: RunnerSettings::default(),
            selection: SelectedTests::default(),
            verbose: false,
            exit_when_done: true,
        }
    }
}

/// Time scale applied to `Time<Virtual>` before the first test
#[derive(Resource, Clone, Copy)]
struct TestTimeScale(f32);

#[derive(Resource, Clone, Copy)]
struct ExitWhenDone(bool);

impl Plugin for PlayModeTestPlugin {
    fn build(&self, app: &mut App) {
        let catalog = (self.catalog)();
        let permitted = PermittedErrors::load_or_empty(&self.settings.permitted_errors_file);

        let mut runner =
            SuiteRunner::from_catalog(&catalog, &self.selection, self.settings.clone())
                .with_permitted(permitted)
                .with_listener(ConsoleReporter::new(self.verbose));
        if let Some(captured) = app.world().get_resource::<CapturedLogs>() {
            runner = runner.with_log_sink(captured.0.clone());
        } else {
            warn!("No log capture layer installed; engine errors will not fail tests");
        }
        if self.settings.teamcity {
            runner.add_listener(Box::new(TeamCityReporter::stdout()));
        }

        app.insert_non_send_resource(runner)
            .insert_resource(TestTimeScale(self.selection.default_time_scale))
            .insert_resource(ExitWhenDone(self.exit_when_done))
            .add_systems(Startup, (apply_time_scale, begin_test_suite).chain())
            .add_systems(Update, drive_test_suite);
    }
}

fn apply_time_scale(scale: Res<TestTimeScale>, mut time: ResMut<Time<Virtual>>) {
    if scale.0 > 0.0 && (scale.0 - 1.0).abs() > f32::EPSILON {
        info!("Running tests at time scale {}", scale.0);
        time.set_relative_speed(scale.0);
    }
}

fn begin_test_suite(mut runner: NonSendMut<SuiteRunner>) {
    runner.begin();
}

fn drive_test_suite(
    mut runner: NonSendMut<SuiteRunner>,
    virtual_time: Res<Time<Virtual>>,
    real_time: Res<Time<Real>>,
    exit_when_done: Res<ExitWhenDone>,
    mut exit: MessageWriter<AppExit>,
) {
    if runner.is_finished() {
        return;
    }
    let frame = FrameTime::new(virtual_time.delta(), real_time.delta());
    if runner.tick(frame) == SuiteStatus::Finished && exit_when_done.0 {
        if runner.results().has_failures() {
            exit.write(AppExit::from_code(1));
        } else {
            exit.write(AppExit::Success);
        }
    }
}

/// Step `app` with a fixed frame time until the run finishes or
/// `max_frames` pass. Both clocks advance by `frame`, so virtual time
/// follows the configured time scale.
///
/// Returns the number of frames stepped, or `None` if the run did not
/// finish.
pub fn run_headless(app: &mut App, frame: Duration, max_frames: usize) -> Option<usize> {
    app.finish();
    app.cleanup();
    app.world_mut().run_schedule(Startup);

    for frames in 1..=max_frames {
        app.world_mut().resource_mut::<Time<Real>>().advance_by(frame);
        let speed = app.world().resource::<Time<Virtual>>().relative_speed();
        app.world_mut()
            .resource_mut::<Time<Virtual>>()
            .advance_by(frame.mul_f32(speed));
        app.world_mut().run_schedule(Update);

        if app.world().non_send_resource::<SuiteRunner>().is_finished() {
            return Some(frames);
        }
    }
    None
}
