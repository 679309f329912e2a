//! Build errors for the scheduler builder.

use thiserror::Error;

/// Errors that can occur when configuring a scheduler.
#[derive(Debug, Error)]
pub enum BuildError {
    #[error("Step budget must be at least 1. Set max_steps_per_run to a positive value")]
    ZeroStepBudget,

    #[error("Invalid scheduler configuration: {0}")]
    InvalidConfig(String),

    #[error("At least one settled task record must be kept. Set max_settled_records to a positive value")]
    ZeroSettledRecords,
}
