//! Routes engine warnings and errors into the test runner
//!
//! `capture_layer` plugs into `LogPlugin::custom_layer`. Every WARN or ERROR
//! event from outside the runner is queued in a shared `LogSink`, which the
//! suite runner drains each frame.

use std::fmt;
use std::sync::{Arc, Mutex};

use bevy::log::tracing::field::{Field, Visit};
use bevy::log::tracing::{self, Level, Subscriber};
use bevy::log::tracing_subscriber::Layer;
use bevy::log::tracing_subscriber::layer::Context;
use bevy::log::BoxedLayer;
use bevy::prelude::*;

use crate::runner::{LogEntry, LogLevel};

/// Targets whose events are never captured (the runner reports its own
/// failures directly)
const IGNORED_TARGETS: &[&str] = &[
    "playtest::runner",
    "playtest::coroutine",
    "playtest::plugin",
    "playtest::capture",
];

/// Thread-safe queue of captured log entries
#[derive(Clone, Default)]
pub struct LogSink(Arc<Mutex<Vec<LogEntry>>>);

impl LogSink {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn push(&self, entry: LogEntry) {
        if let Ok(mut queue) = self.0.lock() {
            queue.push(entry);
        }
    }

    /// Take everything queued so far, oldest first
    pub fn drain(&self) -> Vec<LogEntry> {
        match self.0.lock() {
            Ok(mut queue) => std::mem::take(&mut *queue),
            Err(_) => Vec::new(),
        }
    }

    pub fn is_empty(&self) -> bool {
        self.0.lock().map(|q| q.is_empty()).unwrap_or(true)
    }
}

/// The sink installed by `capture_layer`, picked up by the test plugin
#[derive(Resource, Clone)]
pub struct CapturedLogs(pub LogSink);

#[derive(Default)]
struct MessageVisitor {
    message: String,
    fields: Vec<String>,
}

impl Visit for MessageVisitor {
    fn record_str(&mut self, field: &Field, value: &str) {
        if field.name() == "message" {
            self.message = value.to_string();
        } else {
            self.fields.push(format!("{}={}", field.name(), value));
        }
    }

    fn record_debug(&mut self, field: &Field, value: &dyn fmt::Debug) {
        if field.name() == "message" {
            self.message = format!("{:?}", value);
        } else {
            self.fields.push(format!("{}={:?}", field.name(), value));
        }
    }
}

impl MessageVisitor {
    fn into_message(self) -> String {
        if self.fields.is_empty() {
            self.message
        } else {
            format!("{} {}", self.message, self.fields.join(" "))
        }
    }
}

struct CaptureLayer {
    sink: LogSink,
}

impl<S: Subscriber> Layer<S> for CaptureLayer {
    fn on_event(&self, event: &tracing::Event<'_>, _ctx: Context<'_, S>) {
        let metadata = event.metadata();
        let level = match *metadata.level() {
            Level::ERROR => LogLevel::Error,
            Level::WARN => LogLevel::Warning,
            _ => return,
        };
        let target = metadata.target();
        if IGNORED_TARGETS.iter().any(|t| target.starts_with(t)) {
            return;
        }

        let mut visitor = MessageVisitor::default();
        event.record(&mut visitor);

        let stack = match (metadata.file(), metadata.line()) {
            (Some(file), Some(line)) => format!("{} ({}:{})", target, file, line),
            _ => target.to_string(),
        };
        self.sink
            .push(LogEntry::new(level, visitor.into_message()).with_stack(stack));
    }
}

/// `LogPlugin::custom_layer` hook
pub fn capture_layer(app: &mut App) -> Option<BoxedLayer> {
    let sink = match app.world().get_resource::<CapturedLogs>() {
        Some(existing) => existing.0.clone(),
        None => {
            let sink = LogSink::new();
            app.insert_resource(CapturedLogs(sink.clone()));
            sink
        }
    };
    Some(CaptureLayer { sink }.boxed())
}
