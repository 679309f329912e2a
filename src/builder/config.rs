//! Scheduler configuration.

use super::error::BuildError;
use serde::{Deserialize, Serialize};

/// Tunables of a `Scheduler`.
///
/// Every field has a default, so a partial JSON document is enough:
///
/// ```rust
/// use sagaflow::builder::SchedulerConfig;
///
/// let config = SchedulerConfig::from_json(r#"{"record_dispatches": true}"#).unwrap();
/// assert!(config.record_dispatches);
/// assert_eq!(config.max_steps_per_run, 100_000);
/// ```
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct SchedulerConfig {
    /// Process steps allowed in one run before it is aborted with
    /// `StepBudgetExhausted`.
    pub max_steps_per_run: usize,

    /// Record every dispatched effect in the journal.
    pub record_dispatches: bool,

    /// Settled tasks whose status and result stay queryable.
    pub max_settled_records: usize,
}

impl Default for SchedulerConfig {
    fn default() -> Self {
        Self {
            max_steps_per_run: 100_000,
            record_dispatches: false,
            max_settled_records: 10_000,
        }
    }
}

impl SchedulerConfig {
    pub fn from_json(json: &str) -> Result<Self, BuildError> {
        serde_json::from_str(json).map_err(|e| BuildError::InvalidConfig(e.to_string()))
    }

    pub fn to_json(&self) -> Result<String, BuildError> {
        serde_json::to_string_pretty(self).map_err(|e| BuildError::InvalidConfig(e.to_string()))
    }

    pub(crate) fn check(&self) -> Result<(), BuildError> {
        if self.max_steps_per_run == 0 {
            return Err(BuildError::ZeroStepBudget);
        }
        if self.max_settled_records == 0 {
            return Err(BuildError::ZeroSettledRecords);
        }
        Ok(())
    }
}
