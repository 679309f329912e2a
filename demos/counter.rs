//! Counter Store
//!
//! This example drives a small application store from sagas.
//!
//! Key concepts:
//! - The store observes every PUT as an event sink and exposes its state
//!   to SELECT as a state holder
//! - `watch_every` runs a delayed increment for each INCREMENT_ASYNC
//! - `watch_latest` keeps only the newest product fetch alive
//! - A channel spreads CHANNEL_TEST requests over a pool of three workers
//! - The root saga runs every watcher under one ALL
//! - The host drives time explicitly with `advance`
//!
//! Run with: cargo run --example counter

use sagaflow::channel::BufferPolicy;
use sagaflow::core::{ChannelId, Failure, Notification, Value};
use sagaflow::effects::{
    delay, watch_every, watch_latest, Effect, Operation, ProcessFn, Resume, Selector, Step,
};
use sagaflow::SchedulerBuilder;
use serde_json::{json, Value as Json};
use std::cell::RefCell;
use std::rc::Rc;
use std::time::Duration;

// Store state, updated by a reducer over published notifications
#[derive(Debug, Default)]
struct Store {
    count: i64,
    products: Vec<String>,
    handled: Vec<String>,
}

impl Store {
    fn reduce(&mut self, notification: &Notification) {
        match notification.tag() {
            "INCREMENT" => self.count += 1,
            "PRODUCTS_RECEIVED" => {
                self.products = serde_json::from_value(notification.payload().clone())
                    .unwrap_or_default();
            }
            "REQUEST_HANDLED" => {
                if let Some(line) = notification.payload().as_str() {
                    self.handled.push(line.to_string());
                }
            }
            _ => {}
        }
    }

    fn to_json(&self) -> Json {
        json!({ "count": self.count, "products": self.products })
    }
}

fn increment_async() -> ProcessFn {
    ProcessFn::routine("increment_async", |_| 0u8, |pc: &mut u8, input: Resume| {
        input.into_value()?;
        *pc += 1;
        Ok(match *pc {
            1 => Step::Yield(Effect::call(delay(), vec![Value::from(1000u64)])),
            2 => Step::Yield(Effect::put(Notification::new("INCREMENT"))),
            _ => Step::Done(Value::Unit),
        })
    })
}

fn fetch_products() -> ProcessFn {
    let api = Operation::sync("fetch_products", |args| {
        let page = args.first().and_then(Value::as_data).cloned().unwrap_or(Json::Null);
        match page.as_i64() {
            Some(count) if count >= 0 => Ok(Value::from(json!([
                format!("widget-{count}"),
                format!("gadget-{count}")
            ]))),
            _ => Err(Failure::new("count unavailable")),
        }
    });
    let count = Selector::new("count", |state: &Json| state["count"].clone());

    ProcessFn::routine("fetch_products", |_| 0u8, move |pc: &mut u8, input: Resume| {
        *pc += 1;
        match (*pc, input) {
            (1, _) => Ok(Step::Yield(Effect::select_with(count.clone()))),
            (2, input) => {
                let count = input.into_value()?;
                Ok(Step::Yield(Effect::call(api.clone(), vec![count])))
            }
            (3, Resume::Value(Value::Data(products))) => Ok(Step::Yield(Effect::put(
                Notification::new("PRODUCTS_RECEIVED").with_payload(products),
            ))),
            (3, Resume::Error(error)) => Ok(Step::Yield(Effect::put(
                Notification::new("PRODUCTS_FAILED").with_payload(json!(error.to_string())),
            ))),
            (_, input) => Ok(Step::Done(input.into_value()?)),
        }
    })
}

fn request_handler(index: usize) -> ProcessFn {
    ProcessFn::routine(
        "request_handler",
        |args: Vec<Value>| args.first().and_then(Value::as_channel),
        move |channel: &mut Option<ChannelId>, input: Resume| {
            let value = input.into_value()?;
            let Some(channel) = *channel else {
                return Ok(Step::Done(Value::Unit));
            };
            match value {
                Value::Closed => Ok(Step::Done(Value::Unit)),
                Value::Notification(request) => Ok(Step::Yield(Effect::put(
                    Notification::new("REQUEST_HANDLED")
                        .with_payload(json!(format!("handler {index} <- {}", request.payload()))),
                ))),
                _ => Ok(Step::Yield(Effect::channel_take(channel))),
            }
        },
    )
}

#[derive(Clone, Copy)]
enum PoolStage {
    Creating,
    Forking(usize),
    Listening,
    Forwarding,
}

/// Creates a channel, forks three handlers, then forwards every
/// CHANNEL_TEST notification into the channel.
fn request_pool() -> ProcessFn {
    ProcessFn::routine(
        "request_pool",
        |_| (PoolStage::Creating, None::<ChannelId>),
        |(stage, channel): &mut (PoolStage, Option<ChannelId>), input: Resume| {
            let value = input.into_value()?;
            let effect = match (*stage, *channel) {
                (PoolStage::Creating, None) => match value.as_channel() {
                    Some(created) => {
                        *channel = Some(created);
                        *stage = PoolStage::Forking(1);
                        Effect::fork(request_handler(0), vec![Value::Channel(created)])
                    }
                    None => Effect::channel(BufferPolicy::Unbounded),
                },
                (PoolStage::Forking(next), Some(chan)) if next < 3 => {
                    *stage = PoolStage::Forking(next + 1);
                    Effect::fork(request_handler(next), vec![Value::Channel(chan)])
                }
                (PoolStage::Listening, Some(chan)) if value.as_notification().is_some() => {
                    *stage = PoolStage::Forwarding;
                    Effect::channel_put(chan, value)
                }
                _ => {
                    *stage = PoolStage::Listening;
                    Effect::take("CHANNEL_TEST")
                }
            };
            Ok(Step::Yield(effect))
        },
    )
}

fn root() -> ProcessFn {
    ProcessFn::script(
        "root",
        vec![Effect::all(vec![
            Effect::call_process(watch_every("INCREMENT_ASYNC", increment_async()), vec![]),
            Effect::call_process(watch_latest("PRODUCTS_REQUESTED", fetch_products()), vec![]),
            Effect::call_process(request_pool(), vec![]),
        ])],
    )
}

fn main() -> Result<(), Box<dyn std::error::Error>> {
    tracing_subscriber::fmt()
        .with_env_filter(tracing_subscriber::EnvFilter::from_default_env())
        .init();

    println!("=== Counter Store Example ===\n");

    let store = Rc::new(RefCell::new(Store::default()));
    let reducer = Rc::clone(&store);
    let view = Rc::clone(&store);
    let mut scheduler = SchedulerBuilder::new()
        .subscribe(move |n: &Notification| reducer.borrow_mut().reduce(n))
        .state_holder(move || view.borrow().to_json())
        .build()?;

    let root = scheduler.start(root(), vec![])?;
    println!("Started root saga {root}");

    println!("\n--- Delayed increments ---");
    scheduler.dispatch(Notification::new("INCREMENT_ASYNC"))?;
    scheduler.dispatch(Notification::new("INCREMENT_ASYNC"))?;
    println!("Pending timers: {}", scheduler.pending_operations());
    println!("Count before the delay: {}", store.borrow().count);
    scheduler.advance(Duration::from_millis(1000))?;
    println!("Count after 1000ms: {}", store.borrow().count);

    println!("\n--- Latest fetch ---");
    scheduler.dispatch(Notification::new("PRODUCTS_REQUESTED"))?;
    println!("Products: {:?}", store.borrow().products);

    println!("\n--- Worker pool ---");
    for i in 0..5 {
        scheduler.dispatch(Notification::new("CHANNEL_TEST").with_payload(json!(i)))?;
    }
    for line in &store.borrow().handled {
        println!("  {line}");
    }

    println!("\n--- Task tree ---");
    print!("{}", scheduler.snapshot().render_tree());

    println!("\nCancelling the root saga");
    scheduler.cancel(root)?;
    println!("Root status: {:?}", scheduler.status(root));

    Ok(())
}
