//! The effect dispatch table.

use super::group::{Group, GroupKind};
use super::scheduler::Scheduler;
use super::task::{Role, Wait};
use crate::channel::{BufferPolicy, Channel, PutOutcome, TakeOutcome};
use crate::core::{
    ChannelId, Notification, Pattern, ProtocolViolation, SagaError, TaskId, TaskStatus, Value,
};
use crate::effects::{
    validate, CallOutcome, CallTarget, Effect, OperationContext, ProcessFn, Resume, Script,
    Selector,
};
use serde_json::Value as Json;
use tracing::debug;

impl Scheduler {
    pub(super) fn dispatch_effect(&mut self, id: TaskId, effect: Effect) {
        if let Err(violation) = validate::check(&effect) {
            self.violate(id, violation);
            return;
        }
        self.record(id, &effect);
        debug!(task = %id, effect = %effect.kind(), "dispatch");

        match effect {
            Effect::Call { target, args } => self.handle_call(id, target, args),
            Effect::Put(notification) => self.handle_put(id, notification),
            Effect::Take(Pattern::Channel(channel)) => self.handle_channel_take(id, channel),
            Effect::Take(pattern) => {
                self.bus.register(id, pattern);
                self.suspend(id, Wait::Take);
            }
            Effect::Fork { process, args } => self.handle_fork(id, process, args),
            Effect::Join(target) => self.handle_join(id, target),
            Effect::Cancel(target) => self.handle_cancel(id, target),
            Effect::Cancelled => {
                let cancelled = self
                    .tasks
                    .get(&id)
                    .is_some_and(|t| t.cancelling && t.abort.is_none());
                self.wake(id, Resume::Value(Value::Bool(cancelled)), true);
            }
            Effect::All(effects) => {
                let branches = effects.into_iter().map(|e| (None, e)).collect();
                self.handle_group(id, GroupKind::All, branches);
            }
            Effect::Race(branches) => {
                let keys = branches.iter().map(|(k, _)| k.clone()).collect();
                let branches = branches.into_iter().map(|(k, e)| (Some(k), e)).collect();
                self.handle_group(id, GroupKind::Race(keys), branches);
            }
            Effect::Channel(policy) => self.handle_channel(id, policy),
            Effect::ChannelTake(channel) => self.handle_channel_take(id, channel),
            Effect::ChannelPut(channel, value) => self.handle_channel_put(id, channel, value),
            Effect::ChannelClose(channel) => self.handle_channel_close(id, channel),
            Effect::Select(selector) => self.handle_select(id, selector),
        }
    }

    /// Fail the task with a contract breach and stop the current run.
    pub(super) fn violate(&mut self, id: TaskId, violation: ProtocolViolation) {
        self.finish(id, Err(SagaError::Protocol(violation)));
    }

    fn handle_call(&mut self, id: TaskId, target: CallTarget, args: Vec<Value>) {
        match target {
            CallTarget::Operation(operation) => {
                let mut ctx = OperationContext::new(&mut self.pending, id);
                match operation.invoke(&args, &mut ctx) {
                    CallOutcome::Ready(Ok(value)) => self.wake(id, Resume::Value(value), true),
                    CallOutcome::Ready(Err(failure)) => {
                        self.wake(id, Resume::Error(failure.into()), true)
                    }
                    CallOutcome::Pending(op) => self.suspend(id, Wait::Operation(op)),
                }
            }
            CallTarget::Process(process) => {
                let child = self.spawn(&process, args, Some(id), Role::Called);
                self.suspend(id, Wait::Call(child));
                self.queue.push_front((child, Resume::Value(Value::Unit)));
            }
        }
    }

    fn handle_put(&mut self, id: TaskId, notification: Notification) {
        let takers = self.bus.publish(&notification);
        self.wake(id, Resume::Value(Value::Unit), true);
        for taker in takers.into_iter().rev() {
            self.wake(
                taker,
                Resume::Value(Value::Notification(notification.clone())),
                true,
            );
        }
    }

    fn handle_fork(&mut self, id: TaskId, process: ProcessFn, args: Vec<Value>) {
        let owner = self.attach_point(id);
        let child = self.spawn(&process, args, Some(owner), Role::Forked);
        debug!(parent = %owner, child = %child, name = process.name(), "forked");
        self.queue.push_back((child, Resume::Value(Value::Unit)));
        self.wake(id, Resume::Value(Value::Task(child)), true);
    }

    /// Forks issued from an ALL/RACE branch belong to the task that
    /// yielded the ALL/RACE.
    fn attach_point(&self, mut id: TaskId) -> TaskId {
        while let Some(task) = self.tasks.get(&id) {
            match (task.role, task.parent) {
                (Role::Branch { .. }, Some(parent)) => id = parent,
                _ => break,
            }
        }
        id
    }

    fn handle_join(&mut self, id: TaskId, target: TaskId) {
        if let Some(task) = self.tasks.get_mut(&target) {
            task.joiners.push(id);
            self.suspend(id, Wait::Join(target));
            return;
        }
        let input = match self.settled.get(&target) {
            Some(settled) => match (&settled.status, &settled.result) {
                (TaskStatus::Cancelled, _) => Resume::Error(SagaError::JoinedCancelled(target)),
                (_, Ok(value)) => Resume::Value(value.clone()),
                (_, Err(error)) => Resume::Error(error.clone()),
            },
            None if self.issued(target) => Resume::Error(SagaError::ResultEvicted(target)),
            None => {
                self.violate(id, ProtocolViolation::UnknownTask(target));
                return;
            }
        };
        self.wake(id, input, true);
    }

    fn handle_cancel(&mut self, id: TaskId, target: TaskId) {
        if !self.tasks.contains_key(&target) {
            if self.issued(target) {
                self.wake(id, Resume::Value(Value::Unit), true);
            } else {
                self.violate(id, ProtocolViolation::UnknownTask(target));
            }
            return;
        }

        // The caller continues after every signal has been delivered. A task
        // cancelling its own ancestor is itself part of the subtree.
        if !self.in_subtree(target, id) {
            self.wake(id, Resume::Value(Value::Unit), true);
        }
        self.cancel_tree(target);
    }

    fn in_subtree(&self, root: TaskId, mut id: TaskId) -> bool {
        loop {
            if id == root {
                return true;
            }
            match self.tasks.get(&id).and_then(|t| t.parent) {
                Some(parent) => id = parent,
                None => return false,
            }
        }
    }

    fn handle_group(&mut self, id: TaskId, kind: GroupKind, effects: Vec<(Option<String>, Effect)>) {
        if effects.is_empty() {
            self.wake(id, Resume::Value(Value::List(Vec::new())), true);
            return;
        }

        let group_id = self.next_group;
        self.next_group += 1;
        let mut group = Group::new(id, kind, effects.len());
        for (slot, (_, effect)) in effects.into_iter().enumerate() {
            let name = group.label(slot);
            let branch = self.spawn_boxed(
                name.clone(),
                Box::new(Script::new(name, vec![effect])),
                Some(id),
                Role::Branch {
                    group: group_id,
                    slot,
                },
            );
            group.branches.push(branch);
        }

        self.suspend(id, Wait::Group(group_id));
        for branch in group.branches.iter().rev() {
            self.queue.push_front((*branch, Resume::Value(Value::Unit)));
        }
        self.groups.insert(group_id, group);
    }

    fn handle_channel(&mut self, id: TaskId, policy: BufferPolicy) {
        let channel = ChannelId(self.next_channel);
        self.next_channel += 1;
        self.channels.insert(channel, Channel::new(channel, policy));
        debug!(task = %id, channel = %channel, "channel created");
        self.wake(id, Resume::Value(Value::Channel(channel)), true);
    }

    fn handle_channel_take(&mut self, id: TaskId, channel: ChannelId) {
        let Some(chan) = self.channels.get_mut(&channel) else {
            self.violate(id, ProtocolViolation::UnknownChannel(channel));
            return;
        };
        match chan.take(id) {
            TakeOutcome::Ready { value, unblocked } => {
                if let Some(putter) = unblocked {
                    self.wake(putter, Resume::Value(Value::Unit), true);
                }
                self.wake(id, Resume::Value(value), true);
            }
            TakeOutcome::Pending => self.suspend(id, Wait::ChannelTake(channel)),
            TakeOutcome::Closed => self.wake(id, Resume::Value(Value::Closed), true),
        }
    }

    fn handle_channel_put(&mut self, id: TaskId, channel: ChannelId, value: Value) {
        let Some(chan) = self.channels.get_mut(&channel) else {
            self.violate(id, ProtocolViolation::UnknownChannel(channel));
            return;
        };
        match chan.put(id, value) {
            PutOutcome::Delivered { taker, value } => {
                self.wake(id, Resume::Value(Value::Unit), true);
                self.wake(taker, Resume::Value(value), true);
            }
            PutOutcome::Buffered | PutOutcome::Dropped => {
                self.wake(id, Resume::Value(Value::Unit), true)
            }
            PutOutcome::Blocked => self.suspend(id, Wait::ChannelPut(channel)),
            PutOutcome::Overflowed { capacity } => self.wake(
                id,
                Resume::Error(SagaError::BufferOverflow { channel, capacity }),
                true,
            ),
        }
    }

    fn handle_channel_close(&mut self, id: TaskId, channel: ChannelId) {
        let Some(chan) = self.channels.get_mut(&channel) else {
            self.violate(id, ProtocolViolation::UnknownChannel(channel));
            return;
        };
        let woken = chan.close();
        self.wake(id, Resume::Value(Value::Unit), true);
        for putter in woken.putters.into_iter().rev() {
            self.wake(putter, Resume::Value(Value::Unit), true);
        }
        for taker in woken.takers.into_iter().rev() {
            self.wake(taker, Resume::Value(Value::Closed), true);
        }
    }

    fn handle_select(&mut self, id: TaskId, selector: Option<Selector>) {
        let state = self
            .state
            .as_ref()
            .map(|holder| holder.snapshot())
            .unwrap_or(Json::Null);
        let data = match selector {
            Some(selector) => selector.apply(&state),
            None => state,
        };
        self.wake(id, Resume::Value(Value::Data(data)), true);
    }
}
