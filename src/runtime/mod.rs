//! The effect interpreter.
//!
//! `Scheduler` owns everything a running task tree touches: the task
//! arena, the run queue, the event bus, channels, pending external
//! operations and the virtual clock. Nothing is global; effect handlers
//! receive the scheduler explicitly.

mod bus;
mod dispatch;
mod group;
mod lifecycle;
mod pending;
mod scheduler;
mod task;

pub use bus::{EventBus, EventSink};
pub use pending::{Completer, PendingOperations};
pub use scheduler::{DispatchRecord, Scheduler, StateHolder};
