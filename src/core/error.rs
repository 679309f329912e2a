//! Error taxonomy shared by processes and the scheduler.
//!
//! - `Failure`: what an external operation reports when it fails.
//! - `SagaError`: anything that can be thrown into a process.
//! - `ProtocolViolation`: a breach of the scheduler/process contract. Always fatal.

use super::ids::{ChannelId, OperationId, TaskId};
use serde::{Deserialize, Serialize};
use serde_json::Value as Json;
use std::fmt;
use thiserror::Error;

/// Failure reported by an external operation invoked through CALL.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct Failure {
    /// Human readable description
    pub message: String,
    /// Structured detail (for example an HTTP error body)
    #[serde(default)]
    pub detail: Json,
}

impl Failure {
    pub fn new(message: impl Into<String>) -> Self {
        Self {
            message: message.into(),
            detail: Json::Null,
        }
    }

    pub fn with_detail(message: impl Into<String>, detail: Json) -> Self {
        Self {
            message: message.into(),
            detail,
        }
    }
}

impl fmt::Display for Failure {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        if self.detail.is_null() {
            f.write_str(&self.message)
        } else {
            write!(f, "{} ({})", self.message, self.detail)
        }
    }
}

/// Errors delivered into a process through `throw_into`.
#[derive(Clone, Debug, PartialEq, Error)]
pub enum SagaError {
    /// An external CALL reported a failure.
    #[error("operation failed: {0}")]
    Operation(Failure),

    /// Cancellation signal. Not a real error: it unwinds the process so its
    /// cleanup runs. A process may observe it but cannot suppress it.
    #[error("{0} is being cancelled")]
    Cancelled(TaskId),

    /// The task targeted by a JOIN was cancelled before producing a result.
    #[error("joined {0} was cancelled")]
    JoinedCancelled(TaskId),

    /// The task targeted by a JOIN settled long enough ago that its result
    /// is no longer retained.
    #[error("{0} settled and its result was evicted")]
    ResultEvicted(TaskId),

    /// A fixed buffer with the `Fail` overflow policy was full.
    #[error("{channel} overflowed its buffer of {capacity}")]
    BufferOverflow { channel: ChannelId, capacity: usize },

    #[error(transparent)]
    Protocol(#[from] ProtocolViolation),
}

impl SagaError {
    /// Whether this is the cancellation control signal.
    pub fn is_cancellation(&self) -> bool {
        matches!(self, Self::Cancelled(_))
    }

    pub fn is_protocol_violation(&self) -> bool {
        matches!(self, Self::Protocol(_))
    }

    /// The operation failure, if this error carries one.
    pub fn as_failure(&self) -> Option<&Failure> {
        match self {
            Self::Operation(failure) => Some(failure),
            _ => None,
        }
    }
}

impl From<Failure> for SagaError {
    fn from(failure: Failure) -> Self {
        Self::Operation(failure)
    }
}

/// Breaches of the scheduler/process contract.
#[derive(Clone, Debug, PartialEq, Error)]
pub enum ProtocolViolation {
    #[error("process resumed after it already settled")]
    ProcessAlreadySettled,

    #[error("unknown task {0}")]
    UnknownTask(TaskId),

    #[error("unknown channel {0}")]
    UnknownChannel(ChannelId),

    #[error("completion for {0}, which was never issued")]
    UnknownOperation(OperationId),

    #[error("malformed effect: {}", .problems.join("; "))]
    MalformedEffect { problems: Vec<String> },

    #[error("expected a {expected} value, found {found}")]
    UnexpectedValue {
        expected: &'static str,
        found: &'static str,
    },
}

/// A failure that escaped a root task tree without being handled.
#[derive(Clone, Debug, PartialEq, Error)]
#[error("unhandled failure in root {task} ({name}): {error}")]
pub struct UnhandledFailure {
    pub task: TaskId,
    pub name: String,
    pub error: SagaError,
}

/// Errors returned to the hosting application by scheduler entry points.
#[derive(Clone, Debug, PartialEq, Error)]
pub enum SchedulerError {
    #[error("protocol violation in {}: {violation}", .task.map_or_else(|| "host".to_string(), |t| t.to_string()))]
    Protocol {
        task: Option<TaskId>,
        violation: ProtocolViolation,
    },

    /// A single run exceeded the configured number of process steps,
    /// which usually means a process loops without ever suspending.
    #[error("step budget of {limit} exhausted without reaching quiescence")]
    StepBudgetExhausted { limit: usize },
}

impl SchedulerError {
    pub(crate) fn host(violation: ProtocolViolation) -> Self {
        Self::Protocol {
            task: None,
            violation,
        }
    }
}
