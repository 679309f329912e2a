//! Task run status.
//!
//! A task moves from `Running`/`Waiting` to exactly one terminal status.
//! Terminal statuses are only assigned once every child of the task has
//! itself reached a terminal status.

use serde::{Deserialize, Serialize};
use std::fmt;

/// Scheduler-visible status of a task.
///
/// # Example
///
/// ```rust
/// use sagaflow::core::TaskStatus;
///
/// assert!(!TaskStatus::Waiting.is_terminal());
/// assert!(TaskStatus::Cancelled.is_terminal());
/// assert!(TaskStatus::Failed.is_error());
/// assert!(!TaskStatus::Cancelled.is_error());
/// ```
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum TaskStatus {
    /// Ready to be stepped, or currently being stepped.
    Running,
    /// Suspended on an effect (TAKE, pending CALL, JOIN, channel, ALL/RACE)
    /// or waiting for its children after its own process finished.
    Waiting,
    /// Process returned a value and all children settled.
    Completed,
    /// Process (or a child it did not handle) failed.
    Failed,
    /// Task was cancelled and its cleanup has finished.
    Cancelled,
}

impl TaskStatus {
    /// Status name for display/logging.
    pub fn name(&self) -> &'static str {
        match self {
            Self::Running => "Running",
            Self::Waiting => "Waiting",
            Self::Completed => "Completed",
            Self::Failed => "Failed",
            Self::Cancelled => "Cancelled",
        }
    }

    /// Check if this is a terminal status.
    ///
    /// Terminal tasks are never stepped again.
    pub fn is_terminal(&self) -> bool {
        matches!(self, Self::Completed | Self::Failed | Self::Cancelled)
    }

    /// Check if this status represents a failure.
    ///
    /// Cancellation is a control signal, not an error.
    pub fn is_error(&self) -> bool {
        matches!(self, Self::Failed)
    }
}

impl fmt::Display for TaskStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}
