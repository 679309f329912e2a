//! Builder API for scheduler construction.
//!
//! Configuration is plain serde data, so it can come from a file or be
//! assembled with the fluent `SchedulerBuilder`.

pub mod config;
pub mod error;
pub mod scheduler;

pub use config::SchedulerConfig;
pub use error::BuildError;
pub use scheduler::SchedulerBuilder;
