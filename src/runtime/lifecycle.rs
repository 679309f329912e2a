//! Cancellation and settlement.
//!
//! A task settles only once its own process has returned and every child
//! has settled. Cancellation reaches the innermost descendants first, and
//! each cancelled process gets to run its cleanup before it settles.

use super::group::GroupUpdate;
use super::scheduler::Scheduler;
use super::task::{Role, Settled, Task, Wait};
use crate::core::{SagaError, SchedulerError, TaskId, TaskStatus, UnhandledFailure, Value};
use crate::effects::Resume;
use chrono::Utc;
use tracing::{debug, error, info, warn};

impl Scheduler {
    /// Record the end of a task's process and settle it if possible.
    pub(super) fn finish(&mut self, id: TaskId, outcome: Result<Value, SagaError>) {
        if let Err(SagaError::Protocol(violation)) = &outcome {
            error!(task = %id, %violation, "protocol violation");
            if self.fault.is_none() {
                self.fault = Some(SchedulerError::Protocol {
                    task: Some(id),
                    violation: violation.clone(),
                });
            }
        }

        let Some(task) = self.tasks.get_mut(&id) else {
            return;
        };
        task.process = None;
        task.wait = Wait::Children;
        task.status = TaskStatus::Waiting;

        let failed = match &outcome {
            Err(error) if task.cancelling => {
                if !error.is_cancellation() {
                    warn!(task = %id, %error, "cleanup failed while cancelling");
                }
                false
            }
            Err(_) => true,
            Ok(_) => false,
        };
        task.outcome = Some(outcome);

        if failed {
            // A failed task takes its forks down with it.
            for child in task.children.clone() {
                self.cancel_tree(child);
            }
        }
        self.try_settle(id);
    }

    /// Cancel `root` and its descendants, innermost first.
    pub(super) fn cancel_tree(&mut self, root: TaskId) {
        let mut order = Vec::new();
        self.post_order(root, &mut order);
        // Pushed to the front in reverse, so the innermost task runs first.
        for id in order.into_iter().rev() {
            self.signal_cancel(id);
        }
    }

    fn post_order(&self, id: TaskId, out: &mut Vec<TaskId>) {
        if let Some(task) = self.tasks.get(&id) {
            for child in &task.children {
                self.post_order(*child, out);
            }
            out.push(id);
        }
    }

    fn signal_cancel(&mut self, id: TaskId) {
        let Some(task) = self.tasks.get_mut(&id) else {
            return;
        };
        if task.cancelling {
            return;
        }
        task.cancelling = true;
        let wait = std::mem::replace(&mut task.wait, Wait::Nothing);
        let has_process = task.process.is_some();
        debug!(task = %id, "cancellation signal");

        self.withdraw(id, wait);
        self.queue.retain(|(queued, _)| *queued != id);
        if has_process {
            self.queue
                .push_front((id, Resume::Error(SagaError::Cancelled(id))));
        } else if let Some(task) = self.tasks.get_mut(&id) {
            task.wait = Wait::Children;
        }
    }

    /// Forget whatever the task was suspended on.
    fn withdraw(&mut self, id: TaskId, wait: Wait) {
        match wait {
            Wait::Nothing | Wait::Children | Wait::Call(_) => {}
            Wait::Take => self.bus.withdraw(id),
            Wait::Operation(op) => self.pending.discard(op),
            Wait::Join(target) => {
                if let Some(target) = self.tasks.get_mut(&target) {
                    target.joiners.retain(|j| *j != id);
                }
            }
            Wait::ChannelTake(channel) | Wait::ChannelPut(channel) => {
                if let Some(channel) = self.channels.get_mut(&channel) {
                    channel.withdraw(id);
                }
            }
            Wait::Group(group) => {
                self.groups.remove(&group);
            }
        }
    }

    /// Settle the task if its process returned and its children drained.
    pub(super) fn try_settle(&mut self, id: TaskId) {
        if !self.tasks.get(&id).is_some_and(Task::ready_to_settle) {
            return;
        }
        let Some(task) = self.tasks.remove(&id) else {
            return;
        };

        let status = task.final_status();
        let result = match (status, task.abort, task.outcome) {
            (TaskStatus::Cancelled, _, _) => Err(SagaError::Cancelled(id)),
            (_, Some(error), _) => Err(error),
            (_, None, Some(outcome)) => outcome,
            (_, None, None) => Ok(Value::Unit),
        };
        debug!(task = %id, status = %status, "settled");

        if let Some(parent) = task.parent.and_then(|p| self.tasks.get_mut(&p)) {
            parent.children.retain(|c| *c != id);
        }
        self.remember(
            id,
            Settled {
                name: task.name.clone(),
                parent: task.parent,
                status,
                result: result.clone(),
                created_at: task.created_at,
                settled_at: Utc::now(),
            },
        );

        for joiner in task.joiners.iter().rev() {
            if self.tasks.get(joiner).map(|t| t.wait) != Some(Wait::Join(id)) {
                continue;
            }
            let input = match (&status, &result) {
                (TaskStatus::Cancelled, _) => Resume::Error(SagaError::JoinedCancelled(id)),
                (_, Ok(value)) => Resume::Value(value.clone()),
                (_, Err(error)) => Resume::Error(error.clone()),
            };
            self.wake(*joiner, input, true);
        }

        match task.role {
            Role::Root => match &result {
                Err(error) if status == TaskStatus::Failed => {
                    error!(task = %id, name = %task.name, %error, "unhandled failure");
                    self.unhandled.push(UnhandledFailure {
                        task: id,
                        name: task.name.clone(),
                        error: error.clone(),
                    });
                }
                _ => info!(task = %id, name = %task.name, status = %status, "root task settled"),
            },
            Role::Forked => {
                if let (TaskStatus::Failed, Err(error), Some(parent)) =
                    (status, &result, task.parent)
                {
                    if task.joiners.is_empty() {
                        self.abort(parent, error.clone());
                    }
                }
            }
            Role::Branch { group, slot } => {
                if status != TaskStatus::Cancelled {
                    self.branch_settled(group, slot, result);
                }
            }
            Role::Called => {
                if let Some(caller) = task.parent {
                    if self.tasks.get(&caller).map(|t| t.wait) == Some(Wait::Call(id)) {
                        let input = match result {
                            Ok(value) => Resume::Value(value),
                            Err(_) if status == TaskStatus::Cancelled => {
                                Resume::Error(SagaError::JoinedCancelled(id))
                            }
                            Err(error) => Resume::Error(error),
                        };
                        self.wake(caller, input, true);
                    }
                }
            }
        }

        if let Some(parent) = task.parent {
            self.try_settle(parent);
        }
    }

    /// An unjoined forked child failed: tear down the parent's subtree and
    /// fail the parent with the child's error.
    fn abort(&mut self, parent: TaskId, error: SagaError) {
        let Some(task) = self.tasks.get_mut(&parent) else {
            return;
        };
        if task.cancelling || task.abort.is_some() {
            warn!(task = %parent, %error, "child failed while parent was already unwinding");
            return;
        }
        debug!(task = %parent, %error, "aborting after child failure");
        task.abort = Some(error);
        self.cancel_tree(parent);
    }

    fn branch_settled(&mut self, group_id: u64, slot: usize, result: Result<Value, SagaError>) {
        let Some(group) = self.groups.get_mut(&group_id) else {
            return;
        };
        let GroupUpdate::Resolved(input) = group.settle(slot, result) else {
            return;
        };
        let Some(group) = self.groups.remove(&group_id) else {
            return;
        };

        if self.tasks.get(&group.owner).map(|t| t.wait) == Some(Wait::Group(group_id)) {
            self.wake(group.owner, input, true);
        }
        for branch in group.branches {
            self.cancel_tree(branch);
        }
    }
}
