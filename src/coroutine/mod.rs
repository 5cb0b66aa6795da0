//! Frame-sliced execution of test bodies
//!
//! Test bodies are step-sequences that suspend on yield units. The
//! executors flatten nested sequences and batches into one stream of units;
//! the driver waits on each unit using frame counts, scaled game time,
//! wall-clock time or a predicate, and resumes the body once it is satisfied.

mod async_body;
mod batch;
mod driver;
mod executor;
mod unit;

pub use async_body::{AsyncCoroutine, NestedFuture, TestContext, WaitFuture};
pub use batch::EnumerableExecutor;
pub use driver::{CoroutineDriver, DriverOutcome, FrameTime};
pub use executor::{EnumeratorExecutor, Executor, TestBodyError};
pub use unit::{
    Coroutine, IterCoroutine, StepResult, UnitId, WaitKind, YieldUnit, Yielded, from_iter,
    wait_frames,
};
