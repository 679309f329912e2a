//! Channel semantics: fairness, buffering policies and closing.

mod common;

use common::observed_scheduler;
use sagaflow::channel::{BufferPolicy, Overflow};
use sagaflow::core::{ChannelId, Pattern, TaskStatus, Value};
use sagaflow::effects::{Effect, ProcessFn, Resume, Step};
use std::cell::RefCell;
use std::rc::Rc;

type Deliveries = Rc<RefCell<Vec<(String, Value)>>>;

/// Takes from the channel in `args[0]` forever, recording what it got.
fn taker(name: &str, deliveries: Deliveries) -> ProcessFn {
    let label = name.to_string();
    ProcessFn::routine(
        name,
        |args: Vec<Value>| (args.first().and_then(Value::as_channel), false),
        move |(channel, started): &mut (Option<ChannelId>, bool), input: Resume| {
            let value = input.into_value()?;
            if *started {
                deliveries.borrow_mut().push((label.clone(), value.clone()));
            }
            *started = true;
            match (*channel, value.is_closed()) {
                (Some(channel), false) => Ok(Step::Yield(Effect::channel_take(channel))),
                _ => Ok(Step::Done(Value::Unit)),
            }
        },
    )
}

/// Puts `0..count` into the channel in `args[0]`, then finishes.
fn producer(count: u64) -> ProcessFn {
    ProcessFn::routine(
        "producer",
        |args: Vec<Value>| (args.first().and_then(Value::as_channel), 0u64),
        move |(channel, next): &mut (Option<ChannelId>, u64), input: Resume| {
            input.into_value()?;
            match *channel {
                Some(channel) if *next < count => {
                    let value = Value::from(*next);
                    *next += 1;
                    Ok(Step::Yield(Effect::channel_put(channel, value)))
                }
                _ => Ok(Step::Done(Value::Unit)),
            }
        },
    )
}

/// Creates a channel, then forks each process with the channel handle.
fn with_channel(policy: BufferPolicy, workers: Vec<ProcessFn>) -> ProcessFn {
    ProcessFn::routine(
        "with_channel",
        |_| (None::<ChannelId>, 0usize),
        move |(channel, forked): &mut (Option<ChannelId>, usize), input: Resume| {
            let value = input.into_value()?;
            let Some(chan) = *channel else {
                if let Some(created) = value.as_channel() {
                    *channel = Some(created);
                    return Ok(Step::Yield(fork_next(&workers, forked, created)));
                }
                return Ok(Step::Yield(Effect::channel(policy)));
            };
            if *forked < workers.len() {
                Ok(Step::Yield(fork_next(&workers, forked, chan)))
            } else {
                Ok(Step::Done(Value::Channel(chan)))
            }
        },
    )
}

fn fork_next(workers: &[ProcessFn], forked: &mut usize, channel: ChannelId) -> Effect {
    let worker = workers[*forked].clone();
    *forked += 1;
    Effect::fork(worker, vec![Value::Channel(channel)])
}

fn received(deliveries: &Deliveries) -> Vec<(String, u64)> {
    deliveries
        .borrow()
        .iter()
        .filter_map(|(who, v)| v.as_millis().map(|n| (who.clone(), n)))
        .collect()
}

#[test]
fn five_values_three_takers_round_robin() {
    let deliveries = Deliveries::default();
    let (mut scheduler, _) = observed_scheduler();
    scheduler
        .start(
            with_channel(
                BufferPolicy::Unbounded,
                vec![
                    taker("t1", Rc::clone(&deliveries)),
                    taker("t2", Rc::clone(&deliveries)),
                    taker("t3", Rc::clone(&deliveries)),
                    producer(5),
                ],
            ),
            vec![],
        )
        .unwrap();

    assert_eq!(
        received(&deliveries),
        vec![
            ("t1".to_string(), 0),
            ("t2".to_string(), 1),
            ("t3".to_string(), 2),
            ("t1".to_string(), 3),
            ("t2".to_string(), 4),
        ]
    );
}

#[test]
fn buffered_values_drain_in_order() {
    let deliveries = Deliveries::default();
    let (mut scheduler, _) = observed_scheduler();
    // Producer runs before the taker exists.
    scheduler
        .start(
            with_channel(
                BufferPolicy::Unbounded,
                vec![producer(3), taker("late", Rc::clone(&deliveries))],
            ),
            vec![],
        )
        .unwrap();

    let values: Vec<u64> = received(&deliveries).into_iter().map(|(_, v)| v).collect();
    assert_eq!(values, vec![0, 1, 2]);
}

#[test]
fn sliding_buffer_keeps_newest_values() {
    let deliveries = Deliveries::default();
    let (mut scheduler, _) = observed_scheduler();
    scheduler
        .start(
            with_channel(
                BufferPolicy::fixed(2, Overflow::Slide),
                vec![producer(5), taker("late", Rc::clone(&deliveries))],
            ),
            vec![],
        )
        .unwrap();

    let values: Vec<u64> = received(&deliveries).into_iter().map(|(_, v)| v).collect();
    assert_eq!(values, vec![3, 4]);
}

#[test]
fn dropping_buffer_keeps_oldest_values() {
    let deliveries = Deliveries::default();
    let (mut scheduler, _) = observed_scheduler();
    scheduler
        .start(
            with_channel(
                BufferPolicy::fixed(2, Overflow::Drop),
                vec![producer(5), taker("late", Rc::clone(&deliveries))],
            ),
            vec![],
        )
        .unwrap();

    let values: Vec<u64> = received(&deliveries).into_iter().map(|(_, v)| v).collect();
    assert_eq!(values, vec![0, 1]);
}

#[test]
fn blocking_buffer_suspends_the_putter() {
    let (mut scheduler, _) = observed_scheduler();
    let root = scheduler
        .start(
            with_channel(BufferPolicy::fixed(1, Overflow::Block), vec![producer(3)]),
            vec![],
        )
        .unwrap();
    let producer_task = scheduler.children(root)[0];

    // One value buffered, the second put is blocked.
    assert_eq!(scheduler.status(producer_task), Some(TaskStatus::Waiting));
    let channel = match scheduler.snapshot().channels.first() {
        Some(info) => info.id,
        None => panic!("channel missing"),
    };
    let info = scheduler.channel(channel).unwrap();
    assert_eq!(info.buffered, 1);
    assert_eq!(info.blocked_putters, 1);

    // Cancelling the blocked putter withdraws its pending value.
    scheduler.cancel(producer_task).unwrap();
    assert_eq!(scheduler.status(producer_task), Some(TaskStatus::Cancelled));
    let info = scheduler.channel(channel).unwrap();
    assert_eq!(info.buffered, 1);
    assert_eq!(info.blocked_putters, 0);
}

#[test]
fn take_with_channel_pattern_reads_the_channel() {
    let got = Rc::new(RefCell::new(None));
    let out = Rc::clone(&got);
    let process = ProcessFn::routine(
        "pattern_take",
        |_| 0u8,
        move |pc: &mut u8, input: Resume| {
            *pc += 1;
            let value = input.into_value()?;
            Ok(match *pc {
                1 => Step::Yield(Effect::channel(BufferPolicy::Unbounded)),
                2 => {
                    let channel = value.expect_channel()?;
                    Step::Yield(Effect::all(vec![
                        Effect::take(Pattern::Channel(channel)),
                        Effect::channel_put(channel, "hello"),
                    ]))
                }
                _ => {
                    *out.borrow_mut() = Some(value);
                    Step::Done(Value::Unit)
                }
            })
        },
    );

    let (mut scheduler, _) = observed_scheduler();
    let task = scheduler.start(process, vec![]).unwrap();
    assert_eq!(scheduler.status(task), Some(TaskStatus::Completed));
    assert_eq!(
        *got.borrow(),
        Some(Value::List(vec![Value::from("hello"), Value::Unit]))
    );
}

#[test]
fn closing_wakes_takers_and_drains_buffer() {
    let deliveries = Deliveries::default();
    let closer = ProcessFn::routine(
        "closer",
        |args: Vec<Value>| args.first().and_then(Value::as_channel),
        |channel: &mut Option<ChannelId>, input: Resume| {
            input.into_value()?;
            match channel.take() {
                Some(channel) => Ok(Step::Yield(Effect::channel_close(channel))),
                None => Ok(Step::Done(Value::Unit)),
            }
        },
    );

    let (mut scheduler, _) = observed_scheduler();
    let root = scheduler
        .start(
            with_channel(
                BufferPolicy::Unbounded,
                vec![
                    taker("a", Rc::clone(&deliveries)),
                    taker("b", Rc::clone(&deliveries)),
                    closer,
                ],
            ),
            vec![],
        )
        .unwrap();

    let closed: Vec<String> = deliveries
        .borrow()
        .iter()
        .filter(|(_, v)| v.is_closed())
        .map(|(who, _)| who.clone())
        .collect();
    assert_eq!(closed, vec!["a", "b"]);
    assert_eq!(scheduler.status(root), Some(TaskStatus::Completed));
}
