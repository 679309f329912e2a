//! Effect descriptors.
//!
//! An `Effect` is pure data describing one requested operation. Building one
//! performs no work; the scheduler interprets it when a process yields it.

use super::operation::Operation;
use super::process::ProcessFn;
use crate::channel::BufferPolicy;
use crate::core::{ChannelId, Notification, Pattern, TaskId, Value};
use serde::{Deserialize, Serialize};
use serde_json::Value as Json;
use std::fmt;
use std::sync::Arc;

/// What a CALL invokes.
#[derive(Clone, Debug, PartialEq)]
pub enum CallTarget {
    /// An external operation (network, timer, storage).
    Operation(Operation),
    /// A sub-process run as a blocking child task.
    Process(ProcessFn),
}

impl CallTarget {
    pub fn name(&self) -> &str {
        match self {
            Self::Operation(op) => op.name(),
            Self::Process(process) => process.name(),
        }
    }
}

/// Named projection of the external state snapshot.
#[derive(Clone)]
pub struct Selector {
    name: Arc<str>,
    project: Arc<dyn Fn(&Json) -> Json>,
}

impl Selector {
    pub fn new<F>(name: impl Into<Arc<str>>, project: F) -> Self
    where
        F: Fn(&Json) -> Json + 'static,
    {
        Self {
            name: name.into(),
            project: Arc::new(project),
        }
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub(crate) fn apply(&self, state: &Json) -> Json {
        (self.project)(state)
    }
}

impl fmt::Debug for Selector {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_tuple("Selector").field(&self.name).finish()
    }
}

impl PartialEq for Selector {
    fn eq(&self, other: &Self) -> bool {
        self.name == other.name
    }
}

/// One requested operation. Matched exhaustively by the scheduler.
#[derive(Clone, Debug, PartialEq)]
pub enum Effect {
    Call { target: CallTarget, args: Vec<Value> },
    Put(Notification),
    Take(Pattern),
    Fork { process: ProcessFn, args: Vec<Value> },
    Join(TaskId),
    Cancel(TaskId),
    Cancelled,
    All(Vec<Effect>),
    /// Keys are kept in declaration order, which is also the tie-break order.
    Race(Vec<(String, Effect)>),
    Channel(BufferPolicy),
    ChannelTake(ChannelId),
    ChannelPut(ChannelId, Value),
    ChannelClose(ChannelId),
    Select(Option<Selector>),
}

impl Effect {
    pub fn call(operation: Operation, args: Vec<Value>) -> Self {
        Self::Call {
            target: CallTarget::Operation(operation),
            args,
        }
    }

    /// CALL a sub-process and wait for its result.
    pub fn call_process(process: ProcessFn, args: Vec<Value>) -> Self {
        Self::Call {
            target: CallTarget::Process(process),
            args,
        }
    }

    pub fn put(notification: Notification) -> Self {
        Self::Put(notification)
    }

    pub fn take(pattern: impl Into<Pattern>) -> Self {
        Self::Take(pattern.into())
    }

    pub fn fork(process: ProcessFn, args: Vec<Value>) -> Self {
        Self::Fork { process, args }
    }

    pub fn join(task: TaskId) -> Self {
        Self::Join(task)
    }

    pub fn cancel(task: TaskId) -> Self {
        Self::Cancel(task)
    }

    pub fn cancelled() -> Self {
        Self::Cancelled
    }

    pub fn all(effects: Vec<Effect>) -> Self {
        Self::All(effects)
    }

    pub fn race<K>(branches: Vec<(K, Effect)>) -> Self
    where
        K: Into<String>,
    {
        Self::Race(branches.into_iter().map(|(k, e)| (k.into(), e)).collect())
    }

    pub fn channel(policy: BufferPolicy) -> Self {
        Self::Channel(policy)
    }

    pub fn channel_take(channel: ChannelId) -> Self {
        Self::ChannelTake(channel)
    }

    pub fn channel_put(channel: ChannelId, value: impl Into<Value>) -> Self {
        Self::ChannelPut(channel, value.into())
    }

    pub fn channel_close(channel: ChannelId) -> Self {
        Self::ChannelClose(channel)
    }

    pub fn select() -> Self {
        Self::Select(None)
    }

    pub fn select_with(selector: Selector) -> Self {
        Self::Select(Some(selector))
    }

    pub fn kind(&self) -> EffectKind {
        match self {
            Self::Call { .. } => EffectKind::Call,
            Self::Put(_) => EffectKind::Put,
            Self::Take(_) => EffectKind::Take,
            Self::Fork { .. } => EffectKind::Fork,
            Self::Join(_) => EffectKind::Join,
            Self::Cancel(_) => EffectKind::Cancel,
            Self::Cancelled => EffectKind::Cancelled,
            Self::All(_) => EffectKind::All,
            Self::Race(_) => EffectKind::Race,
            Self::Channel(_) => EffectKind::Channel,
            Self::ChannelTake(_) => EffectKind::ChannelTake,
            Self::ChannelPut(..) => EffectKind::ChannelPut,
            Self::ChannelClose(_) => EffectKind::ChannelClose,
            Self::Select(_) => EffectKind::Select,
        }
    }
}

/// Kind tag of an effect.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum EffectKind {
    Call,
    Put,
    Take,
    Fork,
    Join,
    Cancel,
    Cancelled,
    All,
    Race,
    Channel,
    ChannelTake,
    ChannelPut,
    ChannelClose,
    Select,
}

impl EffectKind {
    pub fn name(&self) -> &'static str {
        match self {
            Self::Call => "CALL",
            Self::Put => "PUT",
            Self::Take => "TAKE",
            Self::Fork => "FORK",
            Self::Join => "JOIN",
            Self::Cancel => "CANCEL",
            Self::Cancelled => "CANCELLED",
            Self::All => "ALL",
            Self::Race => "RACE",
            Self::Channel => "CHANNEL",
            Self::ChannelTake => "CHANNEL_TAKE",
            Self::ChannelPut => "CHANNEL_PUT",
            Self::ChannelClose => "CHANNEL_CLOSE",
            Self::Select => "SELECT",
        }
    }
}

impl fmt::Display for EffectKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}
