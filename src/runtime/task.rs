//! Task records kept in the scheduler's arena.

use crate::core::{ChannelId, OperationId, SagaError, TaskId, TaskStatus, Value};
use crate::effects::Process;
use chrono::{DateTime, Utc};

/// What a suspended task is waiting for.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub(crate) enum Wait {
    /// Runnable (queued or being stepped).
    Nothing,
    Take,
    Operation(OperationId),
    Join(TaskId),
    ChannelTake(ChannelId),
    ChannelPut(ChannelId),
    Group(u64),
    /// A CALLed sub-process.
    Call(TaskId),
    /// Own process finished; waiting for children to settle.
    Children,
}

impl Wait {
    pub(crate) fn describe(&self) -> Option<String> {
        match self {
            Self::Nothing => None,
            Self::Take => Some("take".to_string()),
            Self::Operation(op) => Some(format!("call {op}")),
            Self::Join(task) => Some(format!("join {task}")),
            Self::ChannelTake(chan) => Some(format!("take {chan}")),
            Self::ChannelPut(chan) => Some(format!("put {chan}")),
            Self::Group(group) => Some(format!("group {group}")),
            Self::Call(task) => Some(format!("call {task}")),
            Self::Children => Some("children".to_string()),
        }
    }
}

/// How a task's terminal outcome is consumed.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub(crate) enum Role {
    /// Started by the host; unhandled failures are surfaced to it.
    Root,
    /// Created by FORK; an unjoined failure aborts the parent.
    Forked,
    /// Runs one branch of an ALL/RACE group.
    Branch { group: u64, slot: usize },
    /// Runs a sub-process for a CALL; the parent waits on it.
    Called,
}

pub(crate) struct Task {
    pub id: TaskId,
    pub name: String,
    pub parent: Option<TaskId>,
    pub children: Vec<TaskId>,
    pub role: Role,
    /// `None` once the process returned.
    pub process: Option<Box<dyn Process>>,
    pub status: TaskStatus,
    pub wait: Wait,
    /// The cancellation signal has been delivered.
    pub cancelling: bool,
    /// Set when a child failure tore this task down; settles as Failed with it.
    pub abort: Option<SagaError>,
    /// The process's own result, held until the children settle.
    pub outcome: Option<Result<Value, SagaError>>,
    pub joiners: Vec<TaskId>,
    pub created_at: DateTime<Utc>,
}

impl Task {
    pub(crate) fn new(
        id: TaskId,
        name: String,
        parent: Option<TaskId>,
        role: Role,
        process: Box<dyn Process>,
    ) -> Self {
        Self {
            id,
            name,
            parent,
            children: Vec::new(),
            role,
            process: Some(process),
            status: TaskStatus::Running,
            wait: Wait::Nothing,
            cancelling: false,
            abort: None,
            outcome: None,
            joiners: Vec::new(),
            created_at: Utc::now(),
        }
    }

    /// Whether the task can settle now.
    pub(crate) fn ready_to_settle(&self) -> bool {
        self.process.is_none() && self.children.is_empty()
    }

    /// Terminal status this task settles with.
    pub(crate) fn final_status(&self) -> TaskStatus {
        if self.abort.is_some() {
            TaskStatus::Failed
        } else if self.cancelling {
            TaskStatus::Cancelled
        } else {
            match self.outcome {
                Some(Err(_)) => TaskStatus::Failed,
                _ => TaskStatus::Completed,
            }
        }
    }
}

/// What remains of a task after it settles and leaves the arena.
#[derive(Clone, Debug, PartialEq)]
pub(crate) struct Settled {
    pub name: String,
    pub parent: Option<TaskId>,
    pub status: TaskStatus,
    pub result: Result<Value, SagaError>,
    pub created_at: DateTime<Utc>,
    pub settled_at: DateTime<Utc>,
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::core::Failure;
    use crate::effects::Script;

    fn task() -> Task {
        Task::new(
            TaskId(1),
            "t".to_string(),
            None,
            Role::Root,
            Box::new(Script::new("t", vec![])),
        )
    }

    #[test]
    fn new_task_is_running_and_unsettleable() {
        let t = task();
        assert_eq!(t.status, TaskStatus::Running);
        assert!(!t.ready_to_settle());
    }

    #[test]
    fn final_status_prefers_abort_then_cancel() {
        let mut t = task();
        t.process = None;
        t.outcome = Some(Ok(Value::Unit));
        assert_eq!(t.final_status(), TaskStatus::Completed);

        t.cancelling = true;
        assert_eq!(t.final_status(), TaskStatus::Cancelled);

        t.abort = Some(Failure::new("child").into());
        assert_eq!(t.final_status(), TaskStatus::Failed);
    }

    #[test]
    fn wait_descriptions() {
        assert_eq!(Wait::Nothing.describe(), None);
        assert_eq!(Wait::Join(TaskId(2)).describe().as_deref(), Some("join task-2"));
    }
}
