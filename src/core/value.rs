//! Values exchanged between processes and the scheduler.

use super::error::{ProtocolViolation, SagaError};
use super::ids::{ChannelId, TaskId};
use serde::{Deserialize, Serialize};
use serde_json::Value as Json;

/// An application notification (an "action") published on the event bus.
///
/// Notifications are matched against TAKE patterns by their `tag`. The
/// payload is opaque to the scheduler.
///
/// # Example
///
/// ```rust
/// use sagaflow::core::Notification;
/// use serde_json::json;
///
/// let n = Notification::new("PRODUCTS_FAILED").with_payload(json!({"error": {"code": "E"}}));
/// assert_eq!(n.tag(), "PRODUCTS_FAILED");
/// assert_eq!(n.payload()["error"]["code"], "E");
/// ```
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct Notification {
    tag: String,
    #[serde(default)]
    payload: Json,
}

impl Notification {
    /// Create a notification with an empty payload.
    pub fn new(tag: impl Into<String>) -> Self {
        Self {
            tag: tag.into(),
            payload: Json::Null,
        }
    }

    /// Attach a payload.
    pub fn with_payload(mut self, payload: Json) -> Self {
        self.payload = payload;
        self
    }

    pub fn tag(&self) -> &str {
        &self.tag
    }

    pub fn payload(&self) -> &Json {
        &self.payload
    }
}

/// A value a process is resumed with, or returns on completion.
///
/// Plain data travels as JSON; scheduler resources (tasks, channels) travel
/// as ids so that processes never own them.
#[derive(Clone, Debug, PartialEq, Default)]
pub enum Value {
    /// No value (PUT, CANCEL and a completed `delay` resume with this).
    #[default]
    Unit,
    Bool(bool),
    Data(Json),
    Notification(Notification),
    /// Handle to a forked task.
    Task(TaskId),
    /// Handle to a channel.
    Channel(ChannelId),
    /// Ordered results of an ALL.
    List(Vec<Value>),
    /// Winner of a RACE: the winning key and its result.
    Keyed { key: String, value: Box<Value> },
    /// Delivered to channel takers once the channel is closed and drained.
    Closed,
}

impl Value {
    /// Short description of the variant, used in violation reports.
    pub fn kind(&self) -> &'static str {
        match self {
            Self::Unit => "unit",
            Self::Bool(_) => "bool",
            Self::Data(_) => "data",
            Self::Notification(_) => "notification",
            Self::Task(_) => "task",
            Self::Channel(_) => "channel",
            Self::List(_) => "list",
            Self::Keyed { .. } => "keyed",
            Self::Closed => "closed",
        }
    }

    pub fn as_bool(&self) -> Option<bool> {
        match self {
            Self::Bool(b) => Some(*b),
            _ => None,
        }
    }

    pub fn as_data(&self) -> Option<&Json> {
        match self {
            Self::Data(json) => Some(json),
            _ => None,
        }
    }

    pub fn as_notification(&self) -> Option<&Notification> {
        match self {
            Self::Notification(n) => Some(n),
            _ => None,
        }
    }

    pub fn as_task(&self) -> Option<TaskId> {
        match self {
            Self::Task(id) => Some(*id),
            _ => None,
        }
    }

    pub fn as_channel(&self) -> Option<ChannelId> {
        match self {
            Self::Channel(id) => Some(*id),
            _ => None,
        }
    }

    pub fn as_list(&self) -> Option<&[Value]> {
        match self {
            Self::List(items) => Some(items),
            _ => None,
        }
    }

    /// The winning key and value of a RACE result.
    pub fn as_keyed(&self) -> Option<(&str, &Value)> {
        match self {
            Self::Keyed { key, value } => Some((key, value)),
            _ => None,
        }
    }

    pub fn is_closed(&self) -> bool {
        matches!(self, Self::Closed)
    }

    /// Task handle, or an `UnexpectedValue` violation.
    ///
    /// Convenient inside process bodies that resumed from a FORK.
    pub fn expect_task(&self) -> Result<TaskId, SagaError> {
        self.as_task().ok_or_else(|| self.unexpected("task"))
    }

    /// Channel handle, or an `UnexpectedValue` violation.
    pub fn expect_channel(&self) -> Result<ChannelId, SagaError> {
        self.as_channel().ok_or_else(|| self.unexpected("channel"))
    }

    /// Notification, or an `UnexpectedValue` violation.
    pub fn expect_notification(&self) -> Result<&Notification, SagaError> {
        self.as_notification()
            .ok_or_else(|| self.unexpected("notification"))
    }

    /// Milliseconds carried as a JSON number.
    pub fn as_millis(&self) -> Option<u64> {
        self.as_data().and_then(Json::as_u64)
    }

    fn unexpected(&self, expected: &'static str) -> SagaError {
        ProtocolViolation::UnexpectedValue {
            expected,
            found: self.kind(),
        }
        .into()
    }
}

impl From<Json> for Value {
    fn from(json: Json) -> Self {
        Self::Data(json)
    }
}

impl From<bool> for Value {
    fn from(b: bool) -> Self {
        Self::Bool(b)
    }
}

impl From<u64> for Value {
    fn from(n: u64) -> Self {
        Self::Data(Json::from(n))
    }
}

impl From<i64> for Value {
    fn from(n: i64) -> Self {
        Self::Data(Json::from(n))
    }
}

impl From<&str> for Value {
    fn from(s: &str) -> Self {
        Self::Data(Json::from(s))
    }
}

impl From<String> for Value {
    fn from(s: String) -> Self {
        Self::Data(Json::from(s))
    }
}

impl From<Notification> for Value {
    fn from(n: Notification) -> Self {
        Self::Notification(n)
    }
}

impl From<TaskId> for Value {
    fn from(id: TaskId) -> Self {
        Self::Task(id)
    }
}

impl From<ChannelId> for Value {
    fn from(id: ChannelId) -> Self {
        Self::Channel(id)
    }
}
