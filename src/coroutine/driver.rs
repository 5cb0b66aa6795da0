//! Test scheduler / driver loop
//!
//! The single per-frame integration point. Holds at most one top-level
//! executor, decides what to wait for, and reports how the routine ended.

use std::time::Duration;

use bevy::log::debug;

use super::executor::{EnumeratorExecutor, Executor};
use super::unit::{Coroutine, WaitKind, YieldUnit};
use crate::constants::MAX_STEPS_PER_FRAME;
use crate::stacktrace::SourceTracer;

/// Time that passed during one host frame
#[derive(Debug, Clone, Copy, Default, PartialEq)]
pub struct FrameTime {
    /// Scaled game time
    pub delta: Duration,
    /// Wall-clock time, unaffected by time scale
    pub real_delta: Duration,
}

impl FrameTime {
    pub const ZERO: FrameTime = FrameTime {
        delta: Duration::ZERO,
        real_delta: Duration::ZERO,
    };

    pub fn new(delta: Duration, real_delta: Duration) -> Self {
        Self { delta, real_delta }
    }

    /// Frame where game and wall-clock time advance equally
    pub fn uniform(secs: f32) -> Self {
        let d = Duration::from_secs_f32(secs);
        Self::new(d, d)
    }
}

/// Result of one driver tick
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum DriverOutcome {
    /// Nothing installed
    Idle,
    /// Waiting on a unit or still working
    Running,
    /// Routine finished normally
    Completed,
    /// Routine failed; message includes the reconstructed source location
    Failed(String),
    /// Routine was force-cleared by `stop`
    Stopped,
}

impl DriverOutcome {
    pub fn is_done(&self) -> bool {
        !matches!(self, DriverOutcome::Idle | DriverOutcome::Running)
    }
}

/// A wait started for a surfaced unit
struct PendingWait {
    unit: YieldUnit,
    frames: u32,
    game: Duration,
    real: Duration,
}

impl PendingWait {
    fn new(unit: YieldUnit) -> Self {
        Self {
            unit,
            frames: 0,
            game: Duration::ZERO,
            real: Duration::ZERO,
        }
    }

    fn accumulate(&mut self, frame: FrameTime) {
        self.frames += 1;
        self.game += frame.delta;
        self.real += frame.real_delta;
    }

    fn is_satisfied(&self) -> bool {
        match &self.unit.kind {
            WaitKind::NextFrame => self.frames >= 1,
            WaitKind::Frames(count) => self.frames >= (*count).max(1),
            WaitKind::Seconds(duration) => self.game >= *duration,
            WaitKind::Realtime(duration) => self.real >= *duration,
            WaitKind::Until(predicate) => predicate(),
        }
    }
}

/// Drives one top-level routine a frame at a time
pub struct CoroutineDriver {
    executor: Option<EnumeratorExecutor>,
    pending: Option<PendingWait>,
    class_name: String,
    method_name: String,
    tracer: SourceTracer,
}

impl CoroutineDriver {
    pub fn new(tracer: SourceTracer) -> Self {
        Self {
            executor: None,
            pending: None,
            class_name: String::new(),
            method_name: String::new(),
            tracer,
        }
    }

    /// Install a fresh routine, replacing any previous one
    pub fn start(&mut self, routine: Box<dyn Coroutine>, class_name: &str, method_name: &str) {
        if self.executor.is_some() {
            debug!(
                "Replacing unfinished routine {}.{}",
                self.class_name, self.method_name
            );
        }
        self.executor = Some(EnumeratorExecutor::new(routine));
        self.pending = None;
        self.class_name = class_name.to_string();
        self.method_name = method_name.to_string();
    }

    /// Force-clear the active routine
    pub fn stop(&mut self) -> DriverOutcome {
        let was_active = self.executor.is_some();
        self.clear();
        if was_active {
            DriverOutcome::Stopped
        } else {
            DriverOutcome::Idle
        }
    }

    pub fn is_active(&self) -> bool {
        self.executor.is_some()
    }

    /// True while a surfaced unit is still being awaited
    pub fn is_waiting(&self) -> bool {
        self.pending.is_some()
    }

    /// Advance by one host frame
    pub fn tick(&mut self, frame: FrameTime) -> DriverOutcome {
        if let Some(wait) = self.pending.as_mut() {
            wait.accumulate(frame);
            if !wait.is_satisfied() {
                return DriverOutcome::Running;
            }
            self.pending = None;
        }

        // Taken out while advancing so a failing executor can never be
        // re-entered before cleanup
        let Some(mut executor) = self.executor.take() else {
            return DriverOutcome::Idle;
        };

        for _ in 0..MAX_STEPS_PER_FRAME {
            match executor.advance() {
                Ok(Some(unit)) => {
                    self.pending = Some(PendingWait::new(unit));
                    self.executor = Some(executor);
                    return DriverOutcome::Running;
                }
                Ok(None) => {
                    if !executor.is_not_completed() {
                        self.clear();
                        return DriverOutcome::Completed;
                    }
                }
                Err(error) => {
                    let location = self.tracer.reconstruct(
                        &self.class_name,
                        &self.method_name,
                        executor.suspension_index(),
                    );
                    self.clear();
                    return DriverOutcome::Failed(format!("{}\n{}", error.failure, location));
                }
            }
        }

        let message = format!(
            "{}.{} did not reach a suspension point within {} steps",
            self.class_name, self.method_name, MAX_STEPS_PER_FRAME
        );
        self.clear();
        DriverOutcome::Failed(message)
    }

    fn clear(&mut self) {
        self.executor = None;
        self.pending = None;
    }
}
