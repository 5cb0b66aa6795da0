//! Enumerator executor
//!
//! Drives one step-sequence to completion, one suspension point at a time.
//! Nested sequences and batches yielded by the body are delegated to an
//! inner executor until they finish, so the driver only ever sees a flat
//! stream of yield units.

use thiserror::Error;

use super::batch::EnumerableExecutor;
use super::unit::{Coroutine, UnitId, YieldUnit, Yielded};
use crate::failure::{TestFailure, guard};

/// A failure that originated inside a test body.
///
/// Applied exactly once, at the executor whose `resume` produced the
/// failure. Outer executors pass it through untouched.
#[derive(Debug, Clone, Error)]
#[error("{failure} (after suspension point {suspension_index})")]
pub struct TestBodyError {
    pub failure: TestFailure,
    /// Suspension points the failing sequence had passed
    pub suspension_index: usize,
}

/// Common interface of the enumerator and enumerable executors
pub trait Executor {
    /// Run until the next suspension point.
    ///
    /// `Ok(None)` means no wait is needed yet (work happened internally, or
    /// the executor just completed). `Ok(Some(unit))` must be awaited before
    /// the next call.
    fn advance(&mut self) -> Result<Option<YieldUnit>, TestBodyError>;

    fn is_not_completed(&self) -> bool;

    /// Distinct suspension points observed so far
    fn suspension_index(&self) -> usize;
}

/// Executor for a single step-sequence
pub struct EnumeratorExecutor {
    routine: Box<dyn Coroutine>,
    inner: Option<Box<dyn Executor>>,
    last_surfaced: Option<UnitId>,
    suspension_index: usize,
    completed: bool,
}

impl EnumeratorExecutor {
    pub fn new(routine: Box<dyn Coroutine>) -> Self {
        Self {
            routine,
            inner: None,
            last_surfaced: None,
            suspension_index: 0,
            completed: false,
        }
    }

    fn surface(&mut self, unit: YieldUnit) -> Option<YieldUnit> {
        // Re-yielding the pending wait object is not a new suspension
        if self.last_surfaced == Some(unit.id()) {
            return None;
        }
        self.last_surfaced = Some(unit.id());
        self.suspension_index += 1;
        Some(unit)
    }

    fn step(&mut self) -> Result<Option<Yielded>, TestFailure> {
        let routine = &mut self.routine;
        guard(|| routine.resume())
    }
}

impl Executor for EnumeratorExecutor {
    fn advance(&mut self) -> Result<Option<YieldUnit>, TestBodyError> {
        if self.completed {
            return Ok(None);
        }

        if let Some(inner) = self.inner.as_mut() {
            let unit = match inner.advance() {
                Ok(unit) => unit,
                Err(error) => {
                    self.inner = None;
                    self.completed = true;
                    return Err(error);
                }
            };
            if !inner.is_not_completed() {
                self.inner = None;
            }
            return Ok(unit);
        }

        match self.step() {
            Ok(None) => {
                self.completed = true;
                Ok(None)
            }
            Ok(Some(Yielded::Frame)) => Ok(self.surface(YieldUnit::next_frame())),
            Ok(Some(Yielded::Unit(unit))) => Ok(self.surface(unit)),
            Ok(Some(Yielded::Sequence(routine))) => {
                self.suspension_index += 1;
                self.last_surfaced = None;
                self.inner = Some(Box::new(EnumeratorExecutor::new(routine)));
                Ok(None)
            }
            Ok(Some(Yielded::Batch(routines))) => {
                self.suspension_index += 1;
                self.last_surfaced = None;
                self.inner = Some(Box::new(EnumerableExecutor::new(routines)));
                Ok(None)
            }
            Err(failure) => {
                self.completed = true;
                Err(TestBodyError {
                    failure,
                    suspension_index: self.suspension_index,
                })
            }
        }
    }

    fn is_not_completed(&self) -> bool {
        !self.completed
    }

    fn suspension_index(&self) -> usize {
        self.suspension_index
    }
}
