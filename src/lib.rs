//! Sagaflow: an effect-driven cooperative task scheduler
//!
//! Sagaflow runs suspendable processes that describe their work as a
//! sequence of declarative effects: call an external operation, wait for a
//! notification, publish one, fork a child task, race several operations,
//! cancel a subtree. Processes never perform side effects themselves; the
//! scheduler interprets every effect, which keeps ordering deterministic and
//! makes whole task trees testable without real I/O or real time.
//!
//! # Core Concepts
//!
//! - **Effect**: pure data describing one requested operation
//! - **Process**: a resumable state object that yields effects
//! - **Task**: the scheduler's record of a running process, with parent/child
//!   links for structured cancellation
//! - **Channel**: an ordered queue decoupling producers from consumers
//! - **EventBus**: the synchronous publish/subscribe surface for notifications
//! - **Watchers**: `watch_every`, `watch_latest` and `timeout`, built from the
//!   primitive effects
//!
//! # Example
//!
//! ```rust
//! use sagaflow::core::{Notification, TaskStatus, Value};
//! use sagaflow::effects::{delay, watch_every, Effect, ProcessFn};
//! use sagaflow::runtime::Scheduler;
//! use std::time::Duration;
//!
//! let increment_async = ProcessFn::script(
//!     "increment_async",
//!     vec![
//!         Effect::call(delay(), vec![Value::from(1000u64)]),
//!         Effect::put(Notification::new("INCREMENT")),
//!     ],
//! );
//!
//! let mut scheduler = Scheduler::new();
//! let watcher = scheduler
//!     .start(watch_every("INCREMENT_ASYNC", increment_async), vec![])
//!     .unwrap();
//!
//! scheduler.dispatch(Notification::new("INCREMENT_ASYNC")).unwrap();
//! assert_eq!(scheduler.children(watcher).len(), 1);
//!
//! scheduler.advance(Duration::from_millis(1000)).unwrap();
//! assert!(scheduler.children(watcher).is_empty());
//! assert_eq!(scheduler.status(watcher), Some(TaskStatus::Waiting));
//! ```

pub mod builder;
pub mod channel;
pub mod core;
pub mod effects;
pub mod runtime;
pub mod snapshot;

// Re-export commonly used types
pub use crate::builder::{SchedulerBuilder, SchedulerConfig};
pub use crate::core::{
    Failure, Notification, Pattern, SagaError, SchedulerError, TaskId, TaskStatus, Value,
};
pub use crate::effects::{Effect, Process, ProcessFn, Routine, Script, Step};
pub use crate::runtime::Scheduler;
