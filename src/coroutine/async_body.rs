//! `async` test bodies
//!
//! Lets tests be written as ordinary `async` blocks. Each await on a
//! `TestContext` wait registers its unit with the context and returns
//! `Pending`; `AsyncCoroutine` turns that into a `Yielded::Unit` so the
//! executors and driver treat it like any other suspension point.
//!
//! Helpers that suspend several times should go through `TestContext::run`,
//! which hands them to the executor as one nested sequence. A plain
//! `helper(ctx).await` still works, but every await inside the helper then
//! counts as a suspension of the calling body.

use std::cell::RefCell;
use std::future::Future;
use std::pin::Pin;
use std::rc::Rc;
use std::task::{Context, Poll, Waker};

use super::unit::{Coroutine, UnitId, YieldUnit, Yielded};
use crate::failure::TestFailure;

/// Suspension registered by the most recent poll
enum Suspension {
    Unit(YieldUnit),
    Nested(UnitId, AsyncCoroutine),
}

#[derive(Default)]
struct WaitSlot {
    registered: Option<Suspension>,
    /// Surfaced to the executor, resolved on the next resume
    awaiting: Option<UnitId>,
    /// Wait the driver has finished with
    resolved: Option<UnitId>,
}

impl WaitSlot {
    fn take_resolved(&mut self, id: UnitId) -> bool {
        if self.resolved == Some(id) {
            self.resolved = None;
            return true;
        }
        false
    }
}

/// Handle given to `async` test bodies for suspending
#[derive(Clone, Default)]
pub struct TestContext {
    slot: Rc<RefCell<WaitSlot>>,
}

impl TestContext {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn next_frame(&self) -> WaitFuture {
        self.wait(YieldUnit::next_frame())
    }

    pub fn frames(&self, count: u32) -> WaitFuture {
        self.wait(YieldUnit::frames(count))
    }

    /// Wait scaled game time
    pub fn seconds(&self, secs: f32) -> WaitFuture {
        self.wait(YieldUnit::seconds(secs))
    }

    /// Wait wall-clock time
    pub fn realtime(&self, secs: f32) -> WaitFuture {
        self.wait(YieldUnit::realtime(secs))
    }

    pub fn until(&self, predicate: impl Fn() -> bool + 'static) -> WaitFuture {
        self.wait(YieldUnit::until(predicate))
    }

    /// Await an existing unit
    pub fn wait(&self, unit: YieldUnit) -> WaitFuture {
        WaitFuture {
            unit,
            slot: self.slot.clone(),
        }
    }

    /// Run an async helper as a single suspension point.
    ///
    /// The helper gets its own context and runs as a nested sequence; a
    /// failure inside it fails the calling body.
    pub fn run<F, Fut>(&self, helper: F) -> NestedFuture
    where
        F: FnOnce(TestContext) -> Fut,
        Fut: Future<Output = Result<(), TestFailure>> + 'static,
    {
        NestedFuture {
            id: UnitId::next(),
            routine: Some(AsyncCoroutine::new(helper)),
            slot: self.slot.clone(),
        }
    }
}

/// Future that completes once the driver has satisfied its unit
pub struct WaitFuture {
    unit: YieldUnit,
    slot: Rc<RefCell<WaitSlot>>,
}

impl Future for WaitFuture {
    type Output = ();

    fn poll(self: Pin<&mut Self>, _cx: &mut Context<'_>) -> Poll<()> {
        let mut slot = self.slot.borrow_mut();
        if slot.take_resolved(self.unit.id()) {
            return Poll::Ready(());
        }
        slot.registered = Some(Suspension::Unit(self.unit.clone()));
        Poll::Pending
    }
}

/// Future that completes once a nested helper has run to the end
pub struct NestedFuture {
    id: UnitId,
    routine: Option<AsyncCoroutine>,
    slot: Rc<RefCell<WaitSlot>>,
}

impl Future for NestedFuture {
    type Output = ();

    fn poll(self: Pin<&mut Self>, _cx: &mut Context<'_>) -> Poll<()> {
        let this = self.get_mut();
        let mut slot = this.slot.borrow_mut();
        if slot.take_resolved(this.id) {
            return Poll::Ready(());
        }
        if let Some(routine) = this.routine.take() {
            slot.registered = Some(Suspension::Nested(this.id, routine));
        }
        Poll::Pending
    }
}

type BodyFuture = Pin<Box<dyn Future<Output = Result<(), TestFailure>>>>;

/// Adapts an `async` body into a `Coroutine`, one poll per resume
pub struct AsyncCoroutine {
    future: BodyFuture,
    context: TestContext,
    finished: bool,
}

impl AsyncCoroutine {
    pub fn new<F, Fut>(body: F) -> Self
    where
        F: FnOnce(TestContext) -> Fut,
        Fut: Future<Output = Result<(), TestFailure>> + 'static,
    {
        let context = TestContext::new();
        let future: BodyFuture = Box::pin(body(context.clone()));
        Self {
            future,
            context,
            finished: false,
        }
    }
}

impl Coroutine for AsyncCoroutine {
    fn resume(&mut self) -> Result<Option<Yielded>, TestFailure> {
        if self.finished {
            return Ok(None);
        }

        // We are only resumed once the previously surfaced wait is satisfied
        {
            let mut slot = self.context.slot.borrow_mut();
            if let Some(id) = slot.awaiting.take() {
                slot.resolved = Some(id);
            }
        }

        let mut cx = Context::from_waker(Waker::noop());
        match self.future.as_mut().poll(&mut cx) {
            Poll::Ready(result) => {
                self.finished = true;
                result.map(|()| None)
            }
            Poll::Pending => {
                let mut slot = self.context.slot.borrow_mut();
                match slot.registered.take() {
                    Some(Suspension::Unit(unit)) => {
                        slot.awaiting = Some(unit.id());
                        Ok(Some(Yielded::Unit(unit)))
                    }
                    Some(Suspension::Nested(id, routine)) => {
                        slot.awaiting = Some(id);
                        Ok(Some(Yielded::Sequence(Box::new(routine))))
                    }
                    // Pending on something that is not ours: poll again next frame
                    None => Ok(Some(Yielded::Frame)),
                }
            }
        }
    }
}
