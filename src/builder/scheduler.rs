//! Builder for constructing schedulers.

use crate::builder::config::SchedulerConfig;
use crate::builder::error::BuildError;
use crate::runtime::{EventSink, Scheduler, StateHolder};

/// Builder for constructing a `Scheduler` with a fluent API.
///
/// # Example
///
/// ```rust
/// use sagaflow::builder::SchedulerBuilder;
/// use sagaflow::core::Notification;
/// use serde_json::json;
///
/// let scheduler = SchedulerBuilder::new()
///     .max_steps_per_run(1_000)
///     .record_dispatches(true)
///     .state_holder(|| json!({"counter": 0}))
///     .subscribe(|n: &Notification| println!("{}", n.tag()))
///     .build()
///     .unwrap();
///
/// assert!(scheduler.config().record_dispatches);
/// ```
pub struct SchedulerBuilder {
    config: SchedulerConfig,
    state: Option<Box<dyn StateHolder>>,
    sinks: Vec<Box<dyn EventSink>>,
}

impl SchedulerBuilder {
    /// Create a new builder with the default configuration.
    pub fn new() -> Self {
        Self {
            config: SchedulerConfig::default(),
            state: None,
            sinks: Vec::new(),
        }
    }

    /// Replace the whole configuration.
    pub fn config(mut self, config: SchedulerConfig) -> Self {
        self.config = config;
        self
    }

    pub fn max_steps_per_run(mut self, steps: usize) -> Self {
        self.config.max_steps_per_run = steps;
        self
    }

    pub fn record_dispatches(mut self, record: bool) -> Self {
        self.config.record_dispatches = record;
        self
    }

    pub fn max_settled_records(mut self, records: usize) -> Self {
        self.config.max_settled_records = records;
        self
    }

    /// Set the state holder SELECT reads from.
    pub fn state_holder(mut self, holder: impl StateHolder + 'static) -> Self {
        self.state = Some(Box::new(holder));
        self
    }

    /// Add an external observer of every published notification.
    pub fn subscribe(mut self, sink: impl EventSink + 'static) -> Self {
        self.sinks.push(Box::new(sink));
        self
    }

    /// Build the scheduler.
    /// Returns an error if the configuration is invalid.
    pub fn build(self) -> Result<Scheduler, BuildError> {
        self.config.check()?;
        Ok(Scheduler::with_parts(self.config, self.state, self.sinks))
    }
}

impl Default for SchedulerBuilder {
    fn default() -> Self {
        Self::new()
    }
}
