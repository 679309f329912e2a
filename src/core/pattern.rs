//! TAKE patterns.
//!
//! A pattern decides which notifications a blocked TAKE accepts. Patterns are
//! pure: matching has no side effects and is deterministic.

use super::ids::ChannelId;
use super::value::Notification;
use std::fmt;
use std::sync::Arc;

/// Named predicate over notifications.
///
/// Two matchers are equal when their names are equal, which keeps effects
/// comparable in tests without comparing closures.
///
/// # Example
///
/// ```rust
/// use sagaflow::core::{Matcher, Notification};
///
/// let urgent = Matcher::new("urgent", |n: &Notification| n.payload()["urgent"] == true);
///
/// let n = Notification::new("JOB").with_payload(serde_json::json!({"urgent": true}));
/// assert!(urgent.check(&n));
/// assert!(!urgent.check(&Notification::new("JOB")));
/// ```
#[derive(Clone)]
pub struct Matcher {
    name: Arc<str>,
    predicate: Arc<dyn Fn(&Notification) -> bool + Send + Sync>,
}

impl Matcher {
    /// Create a matcher from a pure predicate.
    pub fn new<F>(name: impl Into<Arc<str>>, predicate: F) -> Self
    where
        F: Fn(&Notification) -> bool + Send + Sync + 'static,
    {
        Self {
            name: name.into(),
            predicate: Arc::new(predicate),
        }
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn check(&self, notification: &Notification) -> bool {
        (self.predicate)(notification)
    }
}

impl fmt::Debug for Matcher {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_tuple("Matcher").field(&self.name).finish()
    }
}

impl PartialEq for Matcher {
    fn eq(&self, other: &Self) -> bool {
        self.name == other.name
    }
}

/// What a TAKE waits for.
#[derive(Clone, Debug, PartialEq)]
pub enum Pattern {
    /// Exactly this tag.
    Tag(String),
    /// Any of these tags.
    AnyOf(Vec<String>),
    /// Every notification.
    Wildcard,
    /// A named predicate.
    Matching(Matcher),
    /// The next value of a channel instead of the bus.
    Channel(ChannelId),
}

impl Pattern {
    pub fn tag(tag: impl Into<String>) -> Self {
        Self::Tag(tag.into())
    }

    pub fn any_of<I, T>(tags: I) -> Self
    where
        I: IntoIterator<Item = T>,
        T: Into<String>,
    {
        Self::AnyOf(tags.into_iter().map(Into::into).collect())
    }

    /// Check whether a bus notification satisfies this pattern.
    ///
    /// Channel patterns never match bus notifications.
    pub fn matches(&self, notification: &Notification) -> bool {
        match self {
            Self::Tag(tag) => notification.tag() == tag,
            Self::AnyOf(tags) => tags.iter().any(|t| t == notification.tag()),
            Self::Wildcard => true,
            Self::Matching(matcher) => matcher.check(notification),
            Self::Channel(_) => false,
        }
    }
}

impl From<&str> for Pattern {
    fn from(tag: &str) -> Self {
        Self::Tag(tag.to_string())
    }
}

impl From<ChannelId> for Pattern {
    fn from(channel: ChannelId) -> Self {
        Self::Channel(channel)
    }
}

impl fmt::Display for Pattern {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Tag(tag) => f.write_str(tag),
            Self::AnyOf(tags) => write!(f, "[{}]", tags.join(", ")),
            Self::Wildcard => f.write_str("*"),
            Self::Matching(matcher) => write!(f, "<{}>", matcher.name()),
            Self::Channel(id) => write!(f, "{id}"),
        }
    }
}
