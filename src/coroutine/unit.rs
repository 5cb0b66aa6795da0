//! Suspension units and the step-sequence trait
//!
//! A `YieldUnit` is the runner's equivalent of the engine's per-frame wait
//! primitive. Coroutines produce `Yielded` values one step at a time; the
//! executors turn those into units and the driver waits on them.

use std::fmt;
use std::rc::Rc;
use std::sync::atomic::{AtomicU64, Ordering};
use std::time::Duration;

use crate::failure::TestFailure;

static NEXT_UNIT_ID: AtomicU64 = AtomicU64::new(1);

/// Identity of a yield unit (clones share it)
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct UnitId(u64);

impl UnitId {
    pub(crate) fn next() -> Self {
        UnitId(NEXT_UNIT_ID.fetch_add(1, Ordering::Relaxed))
    }
}

/// What a unit waits for
#[derive(Clone)]
pub enum WaitKind {
    /// Resume on the next frame
    NextFrame,
    /// Resume after this many frames
    Frames(u32),
    /// Resume after scaled game time has elapsed
    Seconds(Duration),
    /// Resume after wall-clock time has elapsed (ignores time scale)
    Realtime(Duration),
    /// Resume once the predicate returns true (checked once per frame)
    Until(Rc<dyn Fn() -> bool>),
}

impl fmt::Debug for WaitKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            WaitKind::NextFrame => write!(f, "NextFrame"),
            WaitKind::Frames(n) => write!(f, "Frames({})", n),
            WaitKind::Seconds(d) => write!(f, "Seconds({:.3})", d.as_secs_f32()),
            WaitKind::Realtime(d) => write!(f, "Realtime({:.3})", d.as_secs_f32()),
            WaitKind::Until(_) => write!(f, "Until(..)"),
        }
    }
}

/// One schedulable suspension
#[derive(Debug, Clone)]
pub struct YieldUnit {
    id: UnitId,
    pub kind: WaitKind,
}

impl YieldUnit {
    pub fn new(kind: WaitKind) -> Self {
        Self {
            id: UnitId::next(),
            kind,
        }
    }

    pub fn next_frame() -> Self {
        Self::new(WaitKind::NextFrame)
    }

    pub fn frames(count: u32) -> Self {
        Self::new(WaitKind::Frames(count))
    }

    pub fn seconds(secs: f32) -> Self {
        Self::new(WaitKind::Seconds(Duration::from_secs_f32(secs.max(0.0))))
    }

    pub fn realtime(secs: f32) -> Self {
        Self::new(WaitKind::Realtime(Duration::from_secs_f32(secs.max(0.0))))
    }

    pub fn until(predicate: impl Fn() -> bool + 'static) -> Self {
        Self::new(WaitKind::Until(Rc::new(predicate)))
    }

    pub fn id(&self) -> UnitId {
        self.id
    }

    /// True if both values are the same wait object
    pub fn same_as(&self, other: &YieldUnit) -> bool {
        self.id == other.id
    }
}

/// Value produced by one step of a coroutine
pub enum Yielded {
    /// Plain "wait one frame" (a bare yield)
    Frame,
    /// Wait on a specific unit
    Unit(YieldUnit),
    /// Run a nested sequence to completion before resuming
    Sequence(Box<dyn Coroutine>),
    /// Run a batch of sequences in order before resuming
    Batch(Vec<Box<dyn Coroutine>>),
}

impl Yielded {
    pub fn sequence(routine: impl Coroutine + 'static) -> Self {
        Yielded::Sequence(Box::new(routine))
    }
}

impl fmt::Debug for Yielded {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Yielded::Frame => write!(f, "Frame"),
            Yielded::Unit(unit) => write!(f, "Unit({:?})", unit.kind),
            Yielded::Sequence(_) => write!(f, "Sequence(..)"),
            Yielded::Batch(items) => write!(f, "Batch({} sequences)", items.len()),
        }
    }
}

impl From<YieldUnit> for Yielded {
    fn from(unit: YieldUnit) -> Self {
        Yielded::Unit(unit)
    }
}

/// A resumable step-sequence
///
/// Each `resume` runs the body up to its next suspension point. `Ok(None)`
/// means the sequence has finished.
pub trait Coroutine {
    fn resume(&mut self) -> Result<Option<Yielded>, TestFailure>;
}

/// Coroutine over an iterator of fallible steps
pub struct IterCoroutine<I> {
    steps: I,
}

impl<I> Coroutine for IterCoroutine<I>
where
    I: Iterator<Item = Result<Yielded, TestFailure>>,
{
    fn resume(&mut self) -> Result<Option<Yielded>, TestFailure> {
        self.steps.next().transpose()
    }
}

/// Wrap an iterator of `Yielded` (or `Result<Yielded, TestFailure>`) as a coroutine.
///
/// The iterator is lazy, so side effects placed in `map` closures run one
/// step at a time, exactly like a generator body.
pub fn from_iter<I, T>(steps: I) -> IterCoroutine<std::iter::Map<I::IntoIter, fn(T) -> Result<Yielded, TestFailure>>>
where
    I: IntoIterator<Item = T>,
    T: Into<StepResult>,
{
    fn lift<T: Into<StepResult>>(item: T) -> Result<Yielded, TestFailure> {
        item.into().0
    }
    IterCoroutine {
        steps: steps.into_iter().map(lift::<T> as fn(T) -> Result<Yielded, TestFailure>),
    }
}

/// Step produced by an iterator-backed coroutine
pub struct StepResult(Result<Yielded, TestFailure>);

impl From<Yielded> for StepResult {
    fn from(value: Yielded) -> Self {
        StepResult(Ok(value))
    }
}

impl From<Result<Yielded, TestFailure>> for StepResult {
    fn from(value: Result<Yielded, TestFailure>) -> Self {
        StepResult(value)
    }
}

/// A coroutine that waits `count` bare frames and finishes
pub fn wait_frames(count: usize) -> impl Coroutine {
    from_iter((0..count).map(|_| Yielded::Frame))
}
