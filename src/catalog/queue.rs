//! Flattening the test tree into a run queue

use std::rc::Rc;

use super::node::{ClassNode, MethodNode, TestCatalog};
use crate::selection::{RunMode, SelectionQuery};

/// Which methods make it into the queue
#[derive(Clone, Copy)]
pub enum RunFilter<'a> {
    All,
    Smoke,
    Selected(&'a dyn SelectionQuery),
    /// A class or method name, fully-qualified or as a dotted suffix
    Specific(&'a str),
}

impl<'a> RunFilter<'a> {
    /// Filter for a selection's run mode
    pub fn from_selection(selection: &'a dyn SelectionQuery, specific: Option<&'a str>) -> Self {
        match selection.run_mode() {
            RunMode::All => RunFilter::All,
            RunMode::Smoke => RunFilter::Smoke,
            RunMode::Selected => RunFilter::Selected(selection),
            RunMode::Specific => match specific {
                Some(name) => RunFilter::Specific(name),
                None => RunFilter::All,
            },
        }
    }

    fn accepts(&self, class: &ClassNode, method: &MethodNode) -> bool {
        match self {
            RunFilter::All => true,
            RunFilter::Smoke => method.settings.smoke,
            RunFilter::Selected(selection) => selection.is_selected(&method.full_name()),
            RunFilter::Specific(name) => {
                let class_name = class.full_name();
                let method_name = method.full_name();
                [class_name.as_str(), method_name.as_str()]
                    .iter()
                    .any(|candidate| matches_name(candidate, name))
            }
        }
    }
}

/// Exact match, or `name` is a suffix starting at a dot boundary
fn matches_name(full: &str, name: &str) -> bool {
    full == name
        || full
            .strip_suffix(name)
            .is_some_and(|prefix| prefix.ends_with('.'))
}

/// One method scheduled to run
#[derive(Clone)]
pub struct QueuedTest {
    pub class: Rc<ClassNode>,
    pub method: Rc<MethodNode>,
}

impl QueuedTest {
    pub fn full_name(&self) -> String {
        self.method.full_name()
    }

    pub fn same_class(&self, other: &QueuedTest) -> bool {
        Rc::ptr_eq(&self.class, &other.class)
    }
}

impl TestCatalog {
    /// Methods accepted by `filter`, in declaration order, repeated
    /// `repeat` times (at least once)
    pub fn queue(&self, filter: RunFilter<'_>, repeat: u32) -> Vec<QueuedTest> {
        let mut once = Vec::new();
        for class in self.classes() {
            for method in &class.methods {
                if filter.accepts(&class, method) {
                    once.push(QueuedTest {
                        class: class.clone(),
                        method: method.clone(),
                    });
                }
            }
        }

        let repeat = repeat.max(1) as usize;
        let mut queue = Vec::with_capacity(once.len() * repeat);
        for _ in 0..repeat {
            queue.extend(once.iter().cloned());
        }
        queue
    }
}
