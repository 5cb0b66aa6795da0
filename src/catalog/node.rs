//! Test tree: namespaces, classes (fixtures) and methods

use std::any::Any;
use std::rc::Rc;
use std::time::Duration;

use crate::coroutine::Coroutine;
use crate::failure::TestFailure;

/// Upcast helper so fixtures can be recovered as their concrete type
pub trait AsAny: Any {
    fn as_any_mut(&mut self) -> &mut dyn Any;
}

impl<T: Any> AsAny for T {
    fn as_any_mut(&mut self) -> &mut dyn Any {
        self
    }
}

/// A test class instance. All hooks default to doing nothing.
pub trait TestFixture: AsAny + 'static {
    /// Runs once when the runner enters a block of this class's methods
    fn one_time_setup(&mut self) -> Result<(), TestFailure> {
        Ok(())
    }

    fn setup(&mut self) -> Result<(), TestFailure> {
        Ok(())
    }

    fn teardown(&mut self) -> Result<(), TestFailure> {
        Ok(())
    }

    /// Runs once after the last method of the block
    fn one_time_teardown(&mut self) -> Result<(), TestFailure> {
        Ok(())
    }
}

pub type SyncBody = Box<dyn Fn(&mut dyn TestFixture) -> Result<(), TestFailure>>;
pub type CoroutineBody = Box<dyn Fn(&mut dyn TestFixture) -> Result<Box<dyn Coroutine>, TestFailure>>;
pub type FixtureFactory = Box<dyn Fn() -> Box<dyn TestFixture>>;

/// How a method runs
pub enum TestBody {
    /// Runs and returns within one frame
    Sync(SyncBody),
    /// Produces a step-sequence driven across frames
    Coroutine(CoroutineBody),
}

impl TestBody {
    pub fn is_coroutine(&self) -> bool {
        matches!(self, TestBody::Coroutine(_))
    }
}

/// Screen resolution a method is meant for
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct TargetResolution {
    pub width: u32,
    pub height: u32,
}

impl TargetResolution {
    pub const fn new(width: u32, height: u32) -> Self {
        Self { width, height }
    }
}

impl From<(u32, u32)> for TargetResolution {
    fn from((width, height): (u32, u32)) -> Self {
        Self::new(width, height)
    }
}

impl std::fmt::Display for TargetResolution {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}x{}", self.width, self.height)
    }
}

/// Per-method settings, fixed when the catalog is built
#[derive(Debug, Clone, Default, PartialEq)]
pub struct MethodTestSettings {
    /// Overrides the runner's default timeout
    pub timeout: Option<Duration>,
    /// Reason the method is skipped
    pub ignored: Option<String>,
    pub smoke: bool,
    pub targets: Vec<TargetResolution>,
}

impl MethodTestSettings {
    pub fn is_ignored(&self) -> bool {
        self.ignored.is_some()
    }

    pub fn timeout_or(&self, default: Duration) -> Duration {
        self.timeout.unwrap_or(default)
    }

    /// Resolution to run at: `current` if unconstrained or listed, else `fallback`
    pub fn resolve_target(
        &self,
        current: TargetResolution,
        fallback: TargetResolution,
    ) -> TargetResolution {
        if self.targets.is_empty() || self.targets.contains(&current) {
            current
        } else {
            fallback
        }
    }
}

pub struct MethodNode {
    pub name: String,
    /// Fully-qualified name of the owning class
    pub class_name: String,
    pub settings: MethodTestSettings,
    pub body: TestBody,
}

impl MethodNode {
    pub fn full_name(&self) -> String {
        format!("{}.{}", self.class_name, self.name)
    }

    pub fn is_coroutine(&self) -> bool {
        self.body.is_coroutine()
    }
}

impl std::fmt::Debug for MethodNode {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("MethodNode")
            .field("name", &self.full_name())
            .field("coroutine", &self.is_coroutine())
            .field("settings", &self.settings)
            .finish()
    }
}

pub struct ClassNode {
    pub name: String,
    /// Dotted namespace path, empty at the root
    pub namespace: String,
    pub factory: FixtureFactory,
    pub methods: Vec<Rc<MethodNode>>,
}

impl ClassNode {
    pub fn full_name(&self) -> String {
        if self.namespace.is_empty() {
            self.name.clone()
        } else {
            format!("{}.{}", self.namespace, self.name)
        }
    }

    pub fn instantiate(&self) -> Box<dyn TestFixture> {
        (self.factory)()
    }
}

pub enum TestNode {
    Namespace { name: String, children: Vec<TestNode> },
    Class(Rc<ClassNode>),
}

/// The discovered test tree
#[derive(Default)]
pub struct TestCatalog {
    pub roots: Vec<TestNode>,
}

impl TestCatalog {
    /// Classes in declaration order, depth-first
    pub fn classes(&self) -> Vec<Rc<ClassNode>> {
        fn walk(nodes: &[TestNode], out: &mut Vec<Rc<ClassNode>>) {
            for node in nodes {
                match node {
                    TestNode::Namespace { children, .. } => walk(children, out),
                    TestNode::Class(class) => out.push(class.clone()),
                }
            }
        }
        let mut out = Vec::new();
        walk(&self.roots, &mut out);
        out
    }

    /// Fully-qualified names of every method
    pub fn method_names(&self) -> Vec<String> {
        self.classes()
            .iter()
            .flat_map(|c| c.methods.iter().map(|m| m.full_name()))
            .collect()
    }

    pub fn method_count(&self) -> usize {
        self.classes().iter().map(|c| c.methods.len()).sum()
    }
}

/// Source of the test tree (static registration, manifest, scanner...)
pub trait TestCatalogProvider {
    fn catalog(&self) -> TestCatalog;
}

impl<F> TestCatalogProvider for F
where
    F: Fn() -> TestCatalog,
{
    fn catalog(&self) -> TestCatalog {
        self()
    }
}
