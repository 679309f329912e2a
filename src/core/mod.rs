//! Core scheduler data types.
//!
//! This module contains the pure data the rest of the crate is built on:
//! - Ids for tasks, channels and pending operations
//! - Task statuses
//! - Values and notifications exchanged with processes
//! - TAKE patterns
//! - The error taxonomy
//!
//! Nothing in this module performs work or touches scheduler state.

mod error;
mod ids;
mod pattern;
mod status;
mod value;

pub use error::{Failure, ProtocolViolation, SagaError, SchedulerError, UnhandledFailure};
pub use ids::{ChannelId, OperationId, TaskId};
pub use pattern::{Matcher, Pattern};
pub use status::TaskStatus;
pub use value::{Notification, Value};
