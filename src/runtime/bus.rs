//! Event bus adapter.
//!
//! The bus has two sides: external subscribers (for example the
//! application's state reducer) that observe every published notification,
//! and the one-shot TAKE registrations of blocked tasks.

use crate::core::{Notification, Pattern, TaskId};

/// External observer of published notifications.
pub trait EventSink {
    fn on_notification(&mut self, notification: &Notification);
}

impl<F> EventSink for F
where
    F: FnMut(&Notification),
{
    fn on_notification(&mut self, notification: &Notification) {
        self(notification)
    }
}

#[derive(Debug)]
struct Taker {
    task: TaskId,
    pattern: Pattern,
}

/// Synchronous publish/subscribe surface owned by the scheduler.
#[derive(Default)]
pub struct EventBus {
    takers: Vec<Taker>,
    sinks: Vec<Box<dyn EventSink>>,
}

impl EventBus {
    pub(crate) fn new() -> Self {
        Self::default()
    }

    pub(crate) fn subscribe(&mut self, sink: Box<dyn EventSink>) {
        self.sinks.push(sink);
    }

    /// Register a one-shot TAKE for a blocked task.
    pub(crate) fn register(&mut self, task: TaskId, pattern: Pattern) {
        self.takers.push(Taker { task, pattern });
    }

    /// Remove a task's registration (it was cancelled).
    pub(crate) fn withdraw(&mut self, task: TaskId) {
        self.takers.retain(|t| t.task != task);
    }

    /// Publish a notification: external sinks observe it first, then every
    /// matching TAKE is removed and returned in registration order.
    pub(crate) fn publish(&mut self, notification: &Notification) -> Vec<TaskId> {
        for sink in &mut self.sinks {
            sink.on_notification(notification);
        }

        let mut matched = Vec::new();
        self.takers.retain(|taker| {
            if taker.pattern.matches(notification) {
                matched.push(taker.task);
                false
            } else {
                true
            }
        });
        matched
    }

    /// Number of TAKEs currently registered.
    pub fn pending_takers(&self) -> usize {
        self.takers.len()
    }
}
