//! External operations awaiting completion, and the virtual clock.
//!
//! Completions may be produced on any thread through a `Completer`, but
//! they are only applied when the scheduler drains them on its own thread.

use crate::core::{Failure, OperationId, TaskId, Value};
use std::collections::{BTreeMap, HashMap};
use std::sync::mpsc::{self, Receiver, Sender};
use std::time::Duration;

/// A completion waiting to be applied by the scheduler.
#[derive(Clone, Debug, PartialEq)]
pub(crate) struct Completion {
    pub id: OperationId,
    pub result: Result<Value, Failure>,
}

/// Thread-safe handle for completing pending operations.
///
/// Completions are queued; the scheduler applies them the next time it runs
/// (`run_until_idle`, `dispatch`, `advance`, ...).
#[derive(Clone, Debug)]
pub struct Completer {
    tx: Sender<Completion>,
}

impl Completer {
    /// Queue a completion. Returns `false` if the scheduler is gone.
    pub fn complete(&self, id: OperationId, result: Result<Value, Failure>) -> bool {
        self.tx.send(Completion { id, result }).is_ok()
    }
}

/// Who a completion belongs to.
#[derive(Clone, Copy, Debug, PartialEq)]
pub(crate) enum Resolution {
    Owner(TaskId),
    /// Issued, but discarded by cancellation or already completed.
    Stale,
    /// Never issued by this scheduler.
    Unknown,
}

/// Pending operation table.
#[derive(Debug)]
pub struct PendingOperations {
    next_id: u64,
    waiting: HashMap<OperationId, TaskId>,
    timers: BTreeMap<(Duration, u64), OperationId>,
    clock: Duration,
    tx: Sender<Completion>,
    rx: Receiver<Completion>,
}

impl PendingOperations {
    pub(crate) fn new() -> Self {
        let (tx, rx) = mpsc::channel();
        Self {
            next_id: 1,
            waiting: HashMap::new(),
            timers: BTreeMap::new(),
            clock: Duration::ZERO,
            tx,
            rx,
        }
    }

    pub(crate) fn defer(&mut self, task: TaskId) -> OperationId {
        let id = OperationId(self.next_id);
        self.next_id += 1;
        self.waiting.insert(id, task);
        id
    }

    pub(crate) fn schedule_timer(&mut self, task: TaskId, after: Duration) -> OperationId {
        let id = self.defer(task);
        self.timers.insert((self.clock + after, id.0), id);
        id
    }

    pub(crate) fn now(&self) -> Duration {
        self.clock
    }

    pub(crate) fn completer(&self) -> Completer {
        Completer {
            tx: self.tx.clone(),
        }
    }

    /// Number of operations still awaiting completion.
    pub fn len(&self) -> usize {
        self.waiting.len()
    }

    pub fn is_empty(&self) -> bool {
        self.waiting.is_empty()
    }

    pub(crate) fn is_waiting(&self, id: OperationId) -> bool {
        self.waiting.contains_key(&id)
    }

    /// Claim a completion: removes the operation and reports its owner.
    pub(crate) fn resolve(&mut self, id: OperationId) -> Resolution {
        match self.waiting.remove(&id) {
            Some(task) => {
                self.timers.retain(|_, op| *op != id);
                Resolution::Owner(task)
            }
            None if id.0 < self.next_id => Resolution::Stale,
            None => Resolution::Unknown,
        }
    }

    /// Drop an operation whose caller no longer waits for it.
    pub(crate) fn discard(&mut self, id: OperationId) {
        self.waiting.remove(&id);
        self.timers.retain(|_, op| *op != id);
    }

    pub(crate) fn next_deadline(&self) -> Option<Duration> {
        self.timers.keys().next().map(|(deadline, _)| *deadline)
    }

    /// Remove and return the earliest timer due at or before `until`.
    pub(crate) fn pop_due(&mut self, until: Duration) -> Option<(Duration, OperationId)> {
        let key = *self.timers.keys().next()?;
        if key.0 > until {
            return None;
        }
        self.timers.remove(&key).map(|id| (key.0, id))
    }

    pub(crate) fn set_clock(&mut self, now: Duration) {
        if now > self.clock {
            self.clock = now;
        }
    }

    pub(crate) fn try_recv(&self) -> Option<Completion> {
        self.rx.try_recv().ok()
    }
}
