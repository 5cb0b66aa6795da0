//! Test discovery: the class/method tree and the run queue built from it

mod builder;
mod node;
mod queue;

pub use builder::{CatalogBuilder, ClassBuilder, NamespaceBuilder};
pub use node::{
    AsAny, ClassNode, CoroutineBody, FixtureFactory, MethodNode, MethodTestSettings, SyncBody,
    TargetResolution, TestBody, TestCatalog, TestCatalogProvider, TestFixture, TestNode,
};
pub use queue::{QueuedTest, RunFilter};
