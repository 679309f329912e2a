//! The scheduler: task arena, run queue and host entry points.
//!
//! Every host entry point runs the scheduler to quiescence before it
//! returns: the run queue is drained, completions queued through a
//! `Completer` are applied, and only tasks suspended on an external
//! condition (a TAKE, a pending CALL, a timer, ...) remain.
//!
//! Ordering is deterministic. Synchronous continuations go to the front of
//! the run queue so a task runs all its non-suspending effects in one
//! stretch; newly forked tasks and external completions go to the back and
//! are served FIFO.

use super::bus::{EventBus, EventSink};
use super::group::Group;
use super::pending::{Completer, Completion, PendingOperations, Resolution};
use super::task::{Role, Settled, Task, Wait};
use crate::builder::SchedulerConfig;
use crate::channel::{Channel, ChannelInfo};
use crate::core::{
    ChannelId, Failure, Notification, OperationId, ProtocolViolation, SagaError, SchedulerError,
    TaskId, TaskStatus, UnhandledFailure, Value,
};
use crate::effects::{Effect, Process, ProcessFn, Resume, Step};
use crate::snapshot::{TaskSnapshot, TaskTreeSnapshot};
use serde_json::Value as Json;
use std::collections::{HashMap, VecDeque};
use std::time::Duration;
use tracing::{debug, info, trace, warn};
use uuid::Uuid;

/// External state holder consulted by SELECT.
pub trait StateHolder {
    /// An immutable snapshot of the current application state.
    fn snapshot(&self) -> Json;
}

impl<F> StateHolder for F
where
    F: Fn() -> Json,
{
    fn snapshot(&self) -> Json {
        self()
    }
}

/// One entry of the dispatch journal.
#[derive(Clone, Debug, PartialEq)]
pub struct DispatchRecord {
    pub seq: u64,
    pub task: TaskId,
    pub effect: Effect,
}

/// Cooperative effect interpreter.
///
/// # Example
///
/// ```rust
/// use sagaflow::core::{Notification, TaskStatus, Value};
/// use sagaflow::effects::{delay, Effect, ProcessFn};
/// use sagaflow::runtime::Scheduler;
/// use std::time::Duration;
///
/// let increment_async = ProcessFn::script(
///     "increment_async",
///     vec![
///         Effect::call(delay(), vec![Value::from(1000u64)]),
///         Effect::put(Notification::new("INCREMENT")),
///     ],
/// );
///
/// let mut scheduler = Scheduler::new();
/// let task = scheduler.start(increment_async, vec![]).unwrap();
/// assert_eq!(scheduler.status(task), Some(TaskStatus::Waiting));
///
/// scheduler.advance(Duration::from_millis(1000)).unwrap();
/// assert_eq!(scheduler.status(task), Some(TaskStatus::Completed));
/// ```
pub struct Scheduler {
    pub(super) id: Uuid,
    pub(super) config: SchedulerConfig,
    pub(super) tasks: HashMap<TaskId, Task>,
    pub(super) settled: HashMap<TaskId, Settled>,
    settled_order: VecDeque<TaskId>,
    pub(super) queue: VecDeque<(TaskId, Resume)>,
    pub(super) bus: EventBus,
    pub(super) channels: HashMap<ChannelId, Channel>,
    pub(super) pending: PendingOperations,
    pub(super) groups: HashMap<u64, Group>,
    pub(super) state: Option<Box<dyn StateHolder>>,
    pub(super) unhandled: Vec<UnhandledFailure>,
    pub(super) journal: Vec<DispatchRecord>,
    pub(super) fault: Option<SchedulerError>,
    next_task: u64,
    pub(super) next_channel: u64,
    pub(super) next_group: u64,
    next_seq: u64,
}

impl Scheduler {
    /// A scheduler with the default configuration, no state holder and no
    /// external subscribers.
    pub fn new() -> Self {
        Self::with_parts(SchedulerConfig::default(), None, Vec::new())
    }

    pub(crate) fn with_parts(
        config: SchedulerConfig,
        state: Option<Box<dyn StateHolder>>,
        sinks: Vec<Box<dyn EventSink>>,
    ) -> Self {
        let mut bus = EventBus::new();
        for sink in sinks {
            bus.subscribe(sink);
        }
        Self {
            id: Uuid::new_v4(),
            config,
            tasks: HashMap::new(),
            settled: HashMap::new(),
            settled_order: VecDeque::new(),
            queue: VecDeque::new(),
            bus,
            channels: HashMap::new(),
            pending: PendingOperations::new(),
            groups: HashMap::new(),
            state,
            unhandled: Vec::new(),
            journal: Vec::new(),
            fault: None,
            next_task: 1,
            next_channel: 1,
            next_group: 1,
            next_seq: 0,
        }
    }

    pub fn id(&self) -> Uuid {
        self.id
    }

    pub fn config(&self) -> &SchedulerConfig {
        &self.config
    }

    // ------------------------------------------------------------------
    // Host entry points
    // ------------------------------------------------------------------

    /// Start `process` as a root task and run until quiescent.
    pub fn start(&mut self, process: ProcessFn, args: Vec<Value>) -> Result<TaskId, SchedulerError> {
        let id = self.spawn(&process, args, None, Role::Root);
        info!(scheduler = %self.id, task = %id, name = process.name(), "root task started");
        self.queue.push_back((id, Resume::Value(Value::Unit)));
        self.run()?;
        Ok(id)
    }

    /// Publish a notification from outside the task tree (a user intent)
    /// and run until quiescent.
    pub fn dispatch(&mut self, notification: Notification) -> Result<(), SchedulerError> {
        debug!(scheduler = %self.id, tag = notification.tag(), "host dispatch");
        for taker in self.bus.publish(&notification) {
            self.wake(taker, Resume::Value(Value::Notification(notification.clone())), false);
        }
        self.run()
    }

    /// Deliver the completion of a pending external operation and run
    /// until quiescent.
    pub fn complete(
        &mut self,
        operation: OperationId,
        result: Result<Value, Failure>,
    ) -> Result<(), SchedulerError> {
        self.apply_completion(Completion {
            id: operation,
            result,
        })?;
        self.run()
    }

    /// Advance the virtual clock by `by`, firing due timers in deadline
    /// order and running to quiescence after each.
    pub fn advance(&mut self, by: Duration) -> Result<(), SchedulerError> {
        self.run()?;
        let target = self.pending.now() + by;
        while let Some((deadline, operation)) = self.pending.pop_due(target) {
            self.pending.set_clock(deadline);
            trace!(scheduler = %self.id, op = %operation, "timer fired");
            self.apply_completion(Completion {
                id: operation,
                result: Ok(Value::Unit),
            })?;
            self.run()?;
        }
        self.pending.set_clock(target);
        Ok(())
    }

    /// Apply queued completions and run until quiescent.
    pub fn run_until_idle(&mut self) -> Result<(), SchedulerError> {
        self.run()
    }

    /// Cancel a task and its whole subtree. Cancelling a settled task is a
    /// no-op, even once its record was evicted; cancelling twice is the same
    /// as cancelling once.
    pub fn cancel(&mut self, task: TaskId) -> Result<(), SchedulerError> {
        if self.tasks.contains_key(&task) {
            info!(scheduler = %self.id, task = %task, "host cancel");
            self.cancel_tree(task);
        } else if !self.issued(task) {
            return Err(SchedulerError::host(ProtocolViolation::UnknownTask(task)));
        }
        self.run()
    }

    // ------------------------------------------------------------------
    // Queries
    // ------------------------------------------------------------------

    pub fn status(&self, task: TaskId) -> Option<TaskStatus> {
        self.tasks
            .get(&task)
            .map(|t| t.status)
            .or_else(|| self.settled.get(&task).map(|s| s.status))
    }

    /// Terminal result of a settled task. Cancelled tasks report
    /// `SagaError::Cancelled`. `None` once the record has been evicted.
    pub fn result(&self, task: TaskId) -> Option<&Result<Value, SagaError>> {
        self.settled.get(&task).map(|s| &s.result)
    }

    /// Live children of a task.
    pub fn children(&self, task: TaskId) -> Vec<TaskId> {
        self.tasks
            .get(&task)
            .map(|t| t.children.clone())
            .unwrap_or_default()
    }

    pub fn is_cancelling(&self, task: TaskId) -> bool {
        self.tasks.get(&task).is_some_and(|t| t.cancelling)
    }

    /// Number of tasks that have not settled yet.
    pub fn active_tasks(&self) -> usize {
        self.tasks.len()
    }

    pub fn pending_operations(&self) -> usize {
        self.pending.len()
    }

    pub fn pending_takers(&self) -> usize {
        self.bus.pending_takers()
    }

    pub fn channel(&self, channel: ChannelId) -> Option<ChannelInfo> {
        self.channels.get(&channel).map(Channel::info)
    }

    /// Current reading of the virtual clock.
    pub fn now(&self) -> Duration {
        self.pending.now()
    }

    /// Handle for completing operations from other threads.
    pub fn completer(&self) -> Completer {
        self.pending.completer()
    }

    /// Take the root failures collected so far.
    pub fn drain_unhandled(&mut self) -> Vec<UnhandledFailure> {
        std::mem::take(&mut self.unhandled)
    }

    /// Dispatched effects, when `record_dispatches` is enabled.
    pub fn journal(&self) -> &[DispatchRecord] {
        &self.journal
    }

    pub fn clear_journal(&mut self) {
        self.journal.clear();
    }

    /// Diagnostic snapshot of the live task tree.
    pub fn snapshot(&self) -> TaskTreeSnapshot {
        let mut ids: Vec<TaskId> = self.tasks.keys().copied().collect();
        ids.sort();
        let tasks = ids
            .into_iter()
            .filter_map(|id| self.tasks.get(&id))
            .map(|task| TaskSnapshot {
                id: task.id,
                name: task.name.clone(),
                parent: task.parent,
                children: task.children.clone(),
                status: task.status,
                waiting_on: task.wait.describe(),
                cancelling: task.cancelling,
                created_at: task.created_at,
            })
            .collect();

        let mut channels: Vec<ChannelInfo> = self.channels.values().map(Channel::info).collect();
        channels.sort_by_key(|c| c.id);

        TaskTreeSnapshot::new(
            self.id,
            self.pending.now(),
            tasks,
            channels,
            self.bus.pending_takers(),
            self.pending.len(),
        )
    }

    // ------------------------------------------------------------------
    // Run loop
    // ------------------------------------------------------------------

    fn run(&mut self) -> Result<(), SchedulerError> {
        let span = tracing::debug_span!("run", scheduler = %self.id);
        let _enter = span.enter();

        let limit = self.config.max_steps_per_run;
        let mut steps = 0usize;
        loop {
            while let Some(completion) = self.pending.try_recv() {
                self.apply_completion(completion)?;
            }
            let Some((task, input)) = self.queue.pop_front() else {
                return Ok(());
            };
            steps += 1;
            if steps > limit {
                self.queue.push_front((task, input));
                return Err(SchedulerError::StepBudgetExhausted { limit });
            }
            self.step(task, input);
            if let Some(fault) = self.fault.take() {
                return Err(fault);
            }
        }
    }

    fn step(&mut self, id: TaskId, input: Resume) {
        let Some(task) = self.tasks.get_mut(&id) else {
            return;
        };
        let Some(process) = task.process.as_mut() else {
            return;
        };
        task.status = TaskStatus::Running;
        task.wait = Wait::Nothing;
        trace!(task = %id, cancellation = input.is_cancellation(), "step");

        match process.step(input) {
            Step::Yield(effect) => self.dispatch_effect(id, effect),
            Step::Done(value) => self.finish(id, Ok(value)),
            Step::Failed(error) => self.finish(id, Err(error)),
        }
    }

    fn apply_completion(&mut self, completion: Completion) -> Result<(), SchedulerError> {
        match self.pending.resolve(completion.id) {
            Resolution::Owner(task) => {
                let input = match completion.result {
                    Ok(value) => Resume::Value(value),
                    Err(failure) => Resume::Error(failure.into()),
                };
                if self.tasks.get(&task).map(|t| t.wait) == Some(Wait::Operation(completion.id)) {
                    self.wake(task, input, false);
                }
                Ok(())
            }
            Resolution::Stale => {
                warn!(op = %completion.id, "ignoring completion of a discarded operation");
                Ok(())
            }
            Resolution::Unknown => Err(SchedulerError::host(
                ProtocolViolation::UnknownOperation(completion.id),
            )),
        }
    }

    // ------------------------------------------------------------------
    // Helpers shared with dispatch and lifecycle
    // ------------------------------------------------------------------

    pub(super) fn spawn(
        &mut self,
        process: &ProcessFn,
        args: Vec<Value>,
        parent: Option<TaskId>,
        role: Role,
    ) -> TaskId {
        let name = process.name().to_string();
        self.spawn_boxed(name, process.spawn(args), parent, role)
    }

    pub(super) fn spawn_boxed(
        &mut self,
        name: String,
        process: Box<dyn Process>,
        parent: Option<TaskId>,
        role: Role,
    ) -> TaskId {
        let id = TaskId(self.next_task);
        self.next_task += 1;
        if let Some(parent) = parent.and_then(|p| self.tasks.get_mut(&p)) {
            parent.children.push(id);
        }
        self.tasks.insert(id, Task::new(id, name, parent, role, process));
        id
    }

    /// Queue a task to continue. `now` continuations run before anything
    /// already queued.
    pub(super) fn wake(&mut self, task: TaskId, input: Resume, now: bool) {
        if let Some(t) = self.tasks.get_mut(&task) {
            t.wait = Wait::Nothing;
            t.status = TaskStatus::Running;
        }
        if now {
            self.queue.push_front((task, input));
        } else {
            self.queue.push_back((task, input));
        }
    }

    pub(super) fn suspend(&mut self, task: TaskId, wait: Wait) {
        if let Some(t) = self.tasks.get_mut(&task) {
            t.wait = wait;
            t.status = TaskStatus::Waiting;
        }
    }

    pub(super) fn record(&mut self, task: TaskId, effect: &Effect) {
        if self.config.record_dispatches {
            self.journal.push(DispatchRecord {
                seq: self.next_seq,
                task,
                effect: effect.clone(),
            });
            self.next_seq += 1;
        }
    }

    /// Whether this scheduler ever spawned `task`. An issued task that is
    /// not live has settled, whether or not its record is still kept.
    pub(super) fn issued(&self, task: TaskId) -> bool {
        task.0 >= 1 && task.0 < self.next_task
    }

    pub(super) fn remember(&mut self, id: TaskId, settled: Settled) {
        self.settled.insert(id, settled);
        self.settled_order.push_back(id);
        while self.settled_order.len() > self.config.max_settled_records {
            if let Some(old) = self.settled_order.pop_front() {
                self.settled.remove(&old);
            }
        }
    }
}

impl Default for Scheduler {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::effects::{delay, Operation};

    #[test]
    fn start_runs_synchronous_process_to_completion() {
        let mut scheduler = Scheduler::new();
        let process = ProcessFn::script("sync", vec![Effect::put(Notification::new("X"))]);
        let task = scheduler.start(process, vec![]).unwrap();
        assert_eq!(scheduler.status(task), Some(TaskStatus::Completed));
        assert_eq!(scheduler.result(task), Some(&Ok(Value::Unit)));
        assert_eq!(scheduler.active_tasks(), 0);
    }

    #[test]
    fn pending_call_waits_for_completion() {
        let mut scheduler = Scheduler::new();
        let fetch = Operation::new("fetch", |_, ctx| crate::effects::CallOutcome::Pending(ctx.defer()));
        let task = scheduler
            .start(ProcessFn::script("fetcher", vec![Effect::call(fetch, vec![])]), vec![])
            .unwrap();
        assert_eq!(scheduler.status(task), Some(TaskStatus::Waiting));
        assert_eq!(scheduler.pending_operations(), 1);

        scheduler
            .complete(OperationId(1), Ok(Value::from("products")))
            .unwrap();
        assert_eq!(scheduler.result(task), Some(&Ok(Value::from("products"))));
    }

    #[test]
    fn unknown_completion_is_a_violation() {
        let mut scheduler = Scheduler::new();
        let err = scheduler.complete(OperationId(42), Ok(Value::Unit)).unwrap_err();
        assert_eq!(
            err,
            SchedulerError::host(ProtocolViolation::UnknownOperation(OperationId(42)))
        );
    }

    #[test]
    fn advance_fires_timers_in_order() {
        let mut scheduler = Scheduler::new();
        let slow = ProcessFn::script("slow", vec![Effect::call(delay(), vec![Value::from(200u64)])]);
        let fast = ProcessFn::script("fast", vec![Effect::call(delay(), vec![Value::from(100u64)])]);
        let s = scheduler.start(slow, vec![]).unwrap();
        let f = scheduler.start(fast, vec![]).unwrap();

        scheduler.advance(Duration::from_millis(150)).unwrap();
        assert_eq!(scheduler.status(f), Some(TaskStatus::Completed));
        assert_eq!(scheduler.status(s), Some(TaskStatus::Waiting));
        assert_eq!(scheduler.now(), Duration::from_millis(150));

        scheduler.advance(Duration::from_millis(50)).unwrap();
        assert_eq!(scheduler.status(s), Some(TaskStatus::Completed));
    }

    #[test]
    fn step_budget_stops_runaway_process() {
        let config = SchedulerConfig {
            max_steps_per_run: 10,
            ..SchedulerConfig::default()
        };
        let mut scheduler = Scheduler::with_parts(config, None, Vec::new());
        let spin = ProcessFn::routine("spin", |_| (), |_, input| {
            input.into_value()?;
            Ok(Step::Yield(Effect::put(Notification::new("TICK"))))
        });
        let err = scheduler.start(spin, vec![]).unwrap_err();
        assert_eq!(err, SchedulerError::StepBudgetExhausted { limit: 10 });
    }

    #[test]
    fn settled_records_are_capped() {
        let config = SchedulerConfig {
            max_settled_records: 2,
            ..SchedulerConfig::default()
        };
        let mut scheduler = Scheduler::with_parts(config, None, Vec::new());
        let ids: Vec<TaskId> = (0..3)
            .map(|_| scheduler.start(ProcessFn::script("noop", vec![]), vec![]).unwrap())
            .collect();
        assert_eq!(scheduler.status(ids[0]), None);
        assert_eq!(scheduler.status(ids[2]), Some(TaskStatus::Completed));
    }

    #[test]
    fn journal_records_dispatches_when_enabled() {
        let config = SchedulerConfig {
            record_dispatches: true,
            ..SchedulerConfig::default()
        };
        let mut scheduler = Scheduler::with_parts(config, None, Vec::new());
        let task = scheduler
            .start(
                ProcessFn::script("one", vec![Effect::put(Notification::new("X"))]),
                vec![],
            )
            .unwrap();
        assert_eq!(
            scheduler.journal(),
            &[DispatchRecord {
                seq: 0,
                task,
                effect: Effect::put(Notification::new("X")),
            }]
        );
    }
}
