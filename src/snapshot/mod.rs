//! Diagnostic snapshots of a scheduler's live task tree.
//!
//! A snapshot is plain data: it can be logged, written as JSON, or stored
//! compactly with bincode. It does not capture process continuations, so
//! it cannot be used to resume a scheduler.

use crate::channel::ChannelInfo;
use crate::core::{TaskId, TaskStatus};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::fmt::Write;
use std::time::Duration;
use uuid::Uuid;

pub mod error;

pub use error::SnapshotError;

/// Version identifier for the snapshot format
pub const SNAPSHOT_VERSION: u32 = 1;

/// One live task.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct TaskSnapshot {
    pub id: TaskId,
    pub name: String,
    pub parent: Option<TaskId>,
    pub children: Vec<TaskId>,
    pub status: TaskStatus,
    /// What a suspended task is blocked on, e.g. `take` or `join task-3`.
    pub waiting_on: Option<String>,
    pub cancelling: bool,
    pub created_at: DateTime<Utc>,
}

/// Serializable view of every unsettled task, channel and pending
/// operation of one scheduler.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct TaskTreeSnapshot {
    /// Snapshot format version
    pub version: u32,

    /// Unique snapshot identifier
    pub id: Uuid,

    /// When the snapshot was taken
    pub taken_at: DateTime<Utc>,

    /// Instance id of the scheduler it was taken from
    pub scheduler: Uuid,

    /// Virtual clock reading in milliseconds
    pub clock_ms: u64,

    /// Live tasks ordered by id
    pub tasks: Vec<TaskSnapshot>,

    pub channels: Vec<ChannelInfo>,
    pub pending_takers: usize,
    pub pending_operations: usize,
}

impl TaskTreeSnapshot {
    pub(crate) fn new(
        scheduler: Uuid,
        clock: Duration,
        tasks: Vec<TaskSnapshot>,
        channels: Vec<ChannelInfo>,
        pending_takers: usize,
        pending_operations: usize,
    ) -> Self {
        Self {
            version: SNAPSHOT_VERSION,
            id: Uuid::new_v4(),
            taken_at: Utc::now(),
            scheduler,
            clock_ms: u64::try_from(clock.as_millis()).unwrap_or(u64::MAX),
            tasks,
            channels,
            pending_takers,
            pending_operations,
        }
    }

    pub fn task(&self, id: TaskId) -> Option<&TaskSnapshot> {
        self.tasks.iter().find(|t| t.id == id)
    }

    /// Tasks without a live parent.
    pub fn roots(&self) -> impl Iterator<Item = &TaskSnapshot> {
        self.tasks
            .iter()
            .filter(|t| t.parent.map_or(true, |p| self.task(p).is_none()))
    }

    pub fn to_json(&self) -> Result<String, SnapshotError> {
        serde_json::to_string_pretty(self)
            .map_err(|e| SnapshotError::SerializationFailed(e.to_string()))
    }

    pub fn from_json(json: &str) -> Result<Self, SnapshotError> {
        let snapshot: Self = serde_json::from_str(json)
            .map_err(|e| SnapshotError::DeserializationFailed(e.to_string()))?;
        snapshot.check_version()?;
        Ok(snapshot)
    }

    pub fn to_bytes(&self) -> Result<Vec<u8>, SnapshotError> {
        bincode::serialize(self).map_err(|e| SnapshotError::SerializationFailed(e.to_string()))
    }

    pub fn from_bytes(bytes: &[u8]) -> Result<Self, SnapshotError> {
        let snapshot: Self = bincode::deserialize(bytes)
            .map_err(|e| SnapshotError::DeserializationFailed(e.to_string()))?;
        snapshot.check_version()?;
        Ok(snapshot)
    }

    fn check_version(&self) -> Result<(), SnapshotError> {
        if self.version != SNAPSHOT_VERSION {
            return Err(SnapshotError::UnsupportedVersion {
                found: self.version,
                supported: SNAPSHOT_VERSION,
            });
        }
        Ok(())
    }

    /// Indented text rendering of the task tree, one task per line.
    ///
    /// ```text
    /// task-1 root [Waiting: children]
    ///   task-2 watch_every(X, worker) [Waiting: take]
    /// ```
    pub fn render_tree(&self) -> String {
        let mut out = String::new();
        for root in self.roots() {
            self.render_task(root, 0, &mut out);
        }
        out
    }

    fn render_task(&self, task: &TaskSnapshot, depth: usize, out: &mut String) {
        let _ = write!(out, "{}{} {} [{}", "  ".repeat(depth), task.id, task.name, task.status);
        if let Some(waiting_on) = &task.waiting_on {
            let _ = write!(out, ": {waiting_on}");
        }
        out.push(']');
        if task.cancelling {
            out.push_str(" (cancelling)");
        }
        out.push('\n');
        for child in task.children.iter().filter_map(|c| self.task(*c)) {
            self.render_task(child, depth + 1, out);
        }
    }
}
