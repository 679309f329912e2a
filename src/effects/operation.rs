//! External operations invoked through CALL.
//!
//! An operation either answers synchronously or hands back an
//! `OperationId` whose completion the host delivers later, on the
//! scheduler's thread, through `Scheduler::complete` or a `Completer`.

use crate::core::{Failure, OperationId, TaskId, Value};
use crate::runtime::{Completer, PendingOperations};
use std::fmt;
use std::sync::Arc;
use std::time::Duration;

/// What an operation reports when invoked.
#[derive(Clone, Debug, PartialEq)]
pub enum CallOutcome {
    /// Finished synchronously; the caller resumes in the same turn.
    Ready(Result<Value, Failure>),
    /// Completion will be delivered later for this id.
    Pending(OperationId),
}

impl CallOutcome {
    pub fn ok(value: impl Into<Value>) -> Self {
        Self::Ready(Ok(value.into()))
    }

    pub fn fail(failure: Failure) -> Self {
        Self::Ready(Err(failure))
    }
}

/// Access to the scheduler's pending-operation table while an operation runs.
pub struct OperationContext<'a> {
    pending: &'a mut PendingOperations,
    task: TaskId,
}

impl<'a> OperationContext<'a> {
    pub(crate) fn new(pending: &'a mut PendingOperations, task: TaskId) -> Self {
        Self { pending, task }
    }

    /// The task that issued the CALL.
    pub fn task(&self) -> TaskId {
        self.task
    }

    /// Register a completion the host will deliver later.
    pub fn defer(&mut self) -> OperationId {
        self.pending.defer(self.task)
    }

    /// Register a completion delivered by the scheduler's virtual clock
    /// once `after` has elapsed.
    pub fn timer(&mut self, after: Duration) -> OperationId {
        self.pending.schedule_timer(self.task, after)
    }

    /// Current reading of the virtual clock.
    pub fn now(&self) -> Duration {
        self.pending.now()
    }

    /// A thread-safe handle for delivering completions from elsewhere.
    pub fn completer(&self) -> Completer {
        self.pending.completer()
    }
}

type Invoke = dyn Fn(&[Value], &mut OperationContext<'_>) -> CallOutcome;

/// A named external function.
///
/// Equality is by name so that effects stay comparable as plain data.
///
/// # Example
///
/// ```rust
/// use sagaflow::effects::{Effect, Operation};
/// use sagaflow::core::Failure;
///
/// let fetch = Operation::sync("fetch_products", |_args| Err(Failure::new("offline")));
/// let effect = Effect::call(fetch, vec![]);
/// assert_eq!(effect.kind().name(), "CALL");
/// ```
#[derive(Clone)]
pub struct Operation {
    name: Arc<str>,
    invoke: Arc<Invoke>,
}

impl Operation {
    /// An operation with full access to the pending-operation table.
    pub fn new<F>(name: impl Into<Arc<str>>, invoke: F) -> Self
    where
        F: Fn(&[Value], &mut OperationContext<'_>) -> CallOutcome + 'static,
    {
        Self {
            name: name.into(),
            invoke: Arc::new(invoke),
        }
    }

    /// An operation that always answers synchronously.
    pub fn sync<F>(name: impl Into<Arc<str>>, f: F) -> Self
    where
        F: Fn(&[Value]) -> Result<Value, Failure> + 'static,
    {
        Self::new(name, move |args, _ctx| CallOutcome::Ready(f(args)))
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub(crate) fn invoke(&self, args: &[Value], ctx: &mut OperationContext<'_>) -> CallOutcome {
        (self.invoke)(args, ctx)
    }
}

impl fmt::Debug for Operation {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_tuple("Operation").field(&self.name).finish()
    }
}

impl PartialEq for Operation {
    fn eq(&self, other: &Self) -> bool {
        self.name == other.name
    }
}

/// Built-in timer operation: `CALL(delay, ms)` resumes with `Value::Unit`
/// once the virtual clock has advanced by `ms` milliseconds.
pub fn delay() -> Operation {
    Operation::new("delay", |args, ctx| {
        match args.first().and_then(Value::as_millis) {
            Some(ms) => CallOutcome::Pending(ctx.timer(Duration::from_millis(ms))),
            None => CallOutcome::fail(Failure::new("delay expects a duration in milliseconds")),
        }
    })
}
