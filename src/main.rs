//! Play-mode test runner CLI
//!
//! Usage:
//!   cargo run                                   # Run the whole sample suite
//!   cargo run -- --smoke                        # Smoke tests only
//!   cargo run -- MainMenuTests                  # One class (or Class.method)
//!   cargo run -- --selected config/sel.json     # Use a selection file
//!   cargo run -- --sync config/sel.json         # Add new tests to a selection file and exit
//!   cargo run -- --output target/playtest       # Where reports are written
//!   cargo run -- --verbose                      # Show captured logs for every test

use std::env;
use std::path::{Path, PathBuf};
use std::time::Duration;

use bevy::app::ScheduleRunnerPlugin;
use bevy::log::{Level, LogPlugin};
use bevy::prelude::*;

use playtest::{
    PlayModeTestPlugin, RunMode, RunnerSettings, SELECTION_FILE, SelectedTests, capture_layer,
    sample::sample_catalog,
};

struct Args {
    smoke: bool,
    verbose: bool,
    selected: Option<PathBuf>,
    sync: Option<PathBuf>,
    output: Option<PathBuf>,
    filter: Option<String>,
}

fn parse_args() -> Result<Args, String> {
    let mut args = Args {
        smoke: false,
        verbose: false,
        selected: None,
        sync: None,
        output: None,
        filter: None,
    };

    let mut iter = env::args().skip(1);
    while let Some(arg) = iter.next() {
        match arg.as_str() {
            "--smoke" => args.smoke = true,
            "--verbose" | "-v" => args.verbose = true,
            "--selected" | "--sync" | "--output" => {
                let value = iter
                    .next()
                    .map(PathBuf::from)
                    .ok_or_else(|| format!("{} needs a path", arg))?;
                match arg.as_str() {
                    "--selected" => args.selected = Some(value),
                    "--sync" => args.sync = Some(value),
                    _ => args.output = Some(value),
                }
            }
            other if other.starts_with('-') => return Err(format!("unknown option {}", other)),
            other => args.filter = Some(other.to_string()),
        }
    }
    Ok(args)
}

/// Add catalog methods missing from the selection file and drop stale ones
fn sync_selection(path: &Path) -> AppExit {
    let mut selection = SelectedTests::load_or_default(path);
    let (added, removed) = selection.sync_with_catalog(&sample_catalog());
    match selection.save(path) {
        Ok(()) => {
            println!("{}: {} added, {} removed", path.display(), added, removed);
            AppExit::Success
        }
        Err(e) => {
            eprintln!("{}", e);
            AppExit::from_code(1)
        }
    }
}

fn main() -> AppExit {
    let args = match parse_args() {
        Ok(args) => args,
        Err(e) => {
            eprintln!("{}", e);
            return AppExit::from_code(2);
        }
    };

    if let Some(path) = &args.sync {
        return sync_selection(path);
    }

    let mut settings = RunnerSettings::load();
    if let Some(dir) = args.output {
        settings.output_dir = Some(dir);
    }

    let mut selection = match &args.selected {
        Some(path) => match SelectedTests::load(path) {
            Ok(selection) => selection,
            Err(e) => {
                eprintln!("{}", e);
                return AppExit::from_code(2);
            }
        },
        None => SelectedTests::load_or_default(SELECTION_FILE),
    };
    if args.smoke {
        selection.run_mode = RunMode::Smoke;
    }
    if let Some(filter) = args.filter {
        selection.run_mode = RunMode::Specific;
        selection.specific = Some(filter);
    }

    println!("Play-mode Tests");
    println!("===============\n");

    let mut app = App::new();
    app.add_plugins(MinimalPlugins.set(ScheduleRunnerPlugin::run_loop(
        Duration::from_secs_f32(1.0 / 60.0),
    )));
    app.add_plugins(LogPlugin {
        level: if args.verbose { Level::DEBUG } else { Level::WARN },
        custom_layer: capture_layer,
        ..default()
    });
    app.add_plugins(PlayModeTestPlugin {
        catalog: sample_catalog,
        settings,
        selection,
        verbose: args.verbose,
        exit_when_done: true,
    });
    app.run()
}
