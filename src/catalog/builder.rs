//! Static registration of test classes
//!
//! ```ignore
//! let catalog = CatalogBuilder::new()
//!     .namespace("Menus", |ns| {
//!         ns.class(
//!             ClassBuilder::<MainMenuTests>::new("MainMenuTests")
//!                 .test("title_is_shown", MainMenuTests::title_is_shown)
//!                 .async_test("opens_settings", MainMenuTests::opens_settings)
//!                 .timeout_ms(5_000)
//!                 .smoke(),
//!         )
//!     })
//!     .build();
//! ```
//!
//! Modifiers such as `ignore`, `timeout_ms`, `smoke` and `target` apply to
//! the most recently registered method.

use std::future::Future;
use std::marker::PhantomData;
use std::rc::Rc;
use std::time::Duration;

use bevy::log::warn;

use super::node::{
    ClassNode, MethodNode, MethodTestSettings, TargetResolution, TestBody, TestCatalog,
    TestFixture, TestNode,
};
use crate::coroutine::{AsyncCoroutine, Coroutine, TestContext};
use crate::failure::TestFailure;

fn downcast<T: TestFixture>(fixture: &mut dyn TestFixture) -> Result<&mut T, TestFailure> {
    fixture.as_any_mut().downcast_mut::<T>().ok_or_else(|| {
        TestFailure::new(format!(
            "fixture is not a {}",
            std::any::type_name::<T>()
        ))
    })
}

struct PendingMethod {
    name: String,
    settings: MethodTestSettings,
    body: TestBody,
}

/// Registers the methods of one fixture type
pub struct ClassBuilder<T> {
    name: String,
    factory: Rc<dyn Fn() -> T>,
    methods: Vec<PendingMethod>,
    _fixture: PhantomData<T>,
}

impl<T: TestFixture + Default> ClassBuilder<T> {
    pub fn new(name: impl Into<String>) -> Self {
        Self::with_factory(name, T::default)
    }
}

impl<T: TestFixture> ClassBuilder<T> {
    pub fn with_factory(name: impl Into<String>, factory: impl Fn() -> T + 'static) -> Self {
        Self {
            name: name.into(),
            factory: Rc::new(factory),
            methods: Vec::new(),
            _fixture: PhantomData,
        }
    }

    /// Register a method that runs to completion within one frame
    pub fn test(
        mut self,
        name: impl Into<String>,
        body: impl Fn(&mut T) -> Result<(), TestFailure> + 'static,
    ) -> Self {
        let body = TestBody::Sync(Box::new(move |fixture: &mut dyn TestFixture| {
            body(downcast::<T>(fixture)?)
        }));
        self.push(name.into(), body);
        self
    }

    /// Register a method returning a step-sequence
    pub fn coroutine<C>(
        mut self,
        name: impl Into<String>,
        body: impl Fn(&mut T) -> C + 'static,
    ) -> Self
    where
        C: Coroutine + 'static,
    {
        let body = TestBody::Coroutine(Box::new(move |fixture: &mut dyn TestFixture| {
            let routine = body(downcast::<T>(fixture)?);
            Ok(Box::new(routine) as Box<dyn Coroutine>)
        }));
        self.push(name.into(), body);
        self
    }

    /// Register an `async` method
    pub fn async_test<Fut>(
        mut self,
        name: impl Into<String>,
        body: impl Fn(&mut T, TestContext) -> Fut + 'static,
    ) -> Self
    where
        Fut: Future<Output = Result<(), TestFailure>> + 'static,
    {
        let body = TestBody::Coroutine(Box::new(move |fixture: &mut dyn TestFixture| {
            let fixture = downcast::<T>(fixture)?;
            let routine = AsyncCoroutine::new(|ctx| body(fixture, ctx));
            Ok(Box::new(routine) as Box<dyn Coroutine>)
        }));
        self.push(name.into(), body);
        self
    }

    pub fn ignore(self, reason: impl Into<String>) -> Self {
        let reason = reason.into();
        self.modify_last("ignore", |s| s.ignored = Some(reason))
    }

    pub fn timeout_ms(self, ms: u64) -> Self {
        self.modify_last("timeout_ms", |s| s.timeout = Some(Duration::from_millis(ms)))
    }

    pub fn smoke(self) -> Self {
        self.modify_last("smoke", |s| s.smoke = true)
    }

    pub fn target(self, width: u32, height: u32) -> Self {
        self.modify_last("target", |s| s.targets.push(TargetResolution::new(width, height)))
    }

    fn push(&mut self, name: String, body: TestBody) {
        self.methods.push(PendingMethod {
            name,
            settings: MethodTestSettings::default(),
            body,
        });
    }

    fn modify_last(mut self, what: &str, apply: impl FnOnce(&mut MethodTestSettings)) -> Self {
        match self.methods.last_mut() {
            Some(method) => apply(&mut method.settings),
            None => warn!("{}: `{}` used before any method was registered", self.name, what),
        }
        self
    }

    fn build(self, namespace: &str) -> ClassNode {
        let class_name = if namespace.is_empty() {
            self.name.clone()
        } else {
            format!("{}.{}", namespace, self.name)
        };
        let factory = self.factory;
        ClassNode {
            name: self.name,
            namespace: namespace.to_string(),
            factory: Box::new(move || Box::new(factory()) as Box<dyn TestFixture>),
            methods: self
                .methods
                .into_iter()
                .map(|m| {
                    Rc::new(MethodNode {
                        name: m.name,
                        class_name: class_name.clone(),
                        settings: m.settings,
                        body: m.body,
                    })
                })
                .collect(),
        }
    }
}

/// Children of one namespace
pub struct NamespaceBuilder {
    path: String,
    name: String,
    children: Vec<TestNode>,
}

impl NamespaceBuilder {
    fn new(parent: &str, name: String) -> Self {
        let path = if parent.is_empty() {
            name.clone()
        } else {
            format!("{}.{}", parent, name)
        };
        Self {
            path,
            name,
            children: Vec::new(),
        }
    }

    pub fn class<T: TestFixture>(mut self, class: ClassBuilder<T>) -> Self {
        self.children
            .push(TestNode::Class(Rc::new(class.build(&self.path))));
        self
    }

    pub fn namespace(
        mut self,
        name: impl Into<String>,
        build: impl FnOnce(NamespaceBuilder) -> NamespaceBuilder,
    ) -> Self {
        let child = build(NamespaceBuilder::new(&self.path, name.into()));
        self.children.push(child.into_node());
        self
    }

    fn into_node(self) -> TestNode {
        TestNode::Namespace {
            name: self.name,
            children: self.children,
        }
    }
}

/// Builds a `TestCatalog` from registered classes
#[derive(Default)]
pub struct CatalogBuilder {
    roots: Vec<TestNode>,
}

impl CatalogBuilder {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn class<T: TestFixture>(mut self, class: ClassBuilder<T>) -> Self {
        self.roots.push(TestNode::Class(Rc::new(class.build(""))));
        self
    }

    pub fn namespace(
        mut self,
        name: impl Into<String>,
        build: impl FnOnce(NamespaceBuilder) -> NamespaceBuilder,
    ) -> Self {
        let child = build(NamespaceBuilder::new("", name.into()));
        self.roots.push(child.into_node());
        self
    }

    pub fn build(self) -> TestCatalog {
        TestCatalog { roots: self.roots }
    }
}
