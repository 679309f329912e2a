//! Effects and the processes that yield them.
//!
//! This module holds everything a process author needs:
//!
//! - **Effects**: declarative descriptors (`Effect`) of CALL, PUT, TAKE, FORK,
//!   JOIN, CANCEL, CANCELLED, ALL, RACE, channel operations and SELECT
//! - **Operations**: named external functions invoked through CALL, answering
//!   synchronously or through a pending `OperationId`
//! - **Processes**: the `Process` trait plus the `Routine` and `Script`
//!   authoring helpers and the `ProcessFn` factory used by FORK
//! - **Watchers**: `watch_every`, `watch_latest` and `timeout`, built purely
//!   from the primitive effects
//!
//! Constructing an effect never performs work; only the scheduler does.

mod effect;
mod operation;
mod process;
pub mod validate;
pub mod watchers;

pub use effect::{CallTarget, Effect, EffectKind, Selector};
pub use operation::{delay, CallOutcome, Operation, OperationContext};
pub use process::{Process, ProcessFn, Resume, Routine, Script, Step};
pub use watchers::{timeout, timeout_result, watch_every, watch_latest, TimedOut};
