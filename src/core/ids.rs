//! Identifiers for scheduler-owned resources.
//!
//! Tasks, channels and pending operations live in arenas owned by the
//! scheduler. Everything outside the scheduler refers to them by id, which
//! keeps the parent/child task tree free of ownership cycles.

use serde::{Deserialize, Serialize};
use std::fmt;

/// Identifier of a task in the scheduler's task table.
///
/// Ids are allocated in increasing order and never reused by the same
/// scheduler, so a stale id can always be told apart from a live one.
#[derive(Clone, Copy, Debug, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub struct TaskId(pub(crate) u64);

impl TaskId {
    /// Raw numeric value of the id.
    pub fn get(self) -> u64 {
        self.0
    }
}

impl fmt::Display for TaskId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "task-{}", self.0)
    }
}

/// Identifier of a channel created by a `CHANNEL` effect.
#[derive(Clone, Copy, Debug, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub struct ChannelId(pub(crate) u64);

impl ChannelId {
    pub fn get(self) -> u64 {
        self.0
    }
}

impl fmt::Display for ChannelId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "chan-{}", self.0)
    }
}

/// Identifier of an external operation whose completion is still pending.
#[derive(Clone, Copy, Debug, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub struct OperationId(pub(crate) u64);

impl OperationId {
    pub fn get(self) -> u64 {
        self.0
    }
}

impl fmt::Display for OperationId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "op-{}", self.0)
    }
}
