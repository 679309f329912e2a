//! Helpers shared by the integration suites.

#![allow(dead_code)]

use sagaflow::core::Notification;
use sagaflow::runtime::Scheduler;
use sagaflow::SchedulerBuilder;
use std::cell::RefCell;
use std::rc::Rc;
use tracing_subscriber::EnvFilter;

/// Route scheduler logs to the test output. Honours `RUST_LOG`.
pub fn init_tracing() {
    let _ = tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::from_default_env())
        .with_test_writer()
        .try_init();
}

/// Every notification published on the bus, in order.
#[derive(Clone, Default)]
pub struct Published(Rc<RefCell<Vec<Notification>>>);

impl Published {
    pub fn tags(&self) -> Vec<String> {
        self.0.borrow().iter().map(|n| n.tag().to_string()).collect()
    }

    pub fn all(&self) -> Vec<Notification> {
        self.0.borrow().clone()
    }

    pub fn contains(&self, tag: &str) -> bool {
        self.0.borrow().iter().any(|n| n.tag() == tag)
    }
}

/// A journaling scheduler plus a record of everything published on its bus.
pub fn observed_scheduler() -> (Scheduler, Published) {
    init_tracing();
    let published = Published::default();
    let log = Rc::clone(&published.0);
    let scheduler = SchedulerBuilder::new()
        .record_dispatches(true)
        .subscribe(move |n: &Notification| log.borrow_mut().push(n.clone()))
        .build()
        .expect("default configuration is valid");
    (scheduler, published)
}
