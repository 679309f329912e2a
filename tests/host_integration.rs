//! Driving a scheduler from a host event loop with real asynchronous
//! completions.

mod common;

use common::init_tracing;
use sagaflow::core::{Failure, Notification, SagaError, TaskStatus, Value};
use sagaflow::effects::{CallOutcome, Effect, Operation, ProcessFn, Resume, Step};
use sagaflow::{Scheduler, SchedulerBuilder};
use serde_json::json;
use std::time::Duration;

/// Operation completed by a tokio task after a short sleep.
fn fetch_later(result: Result<Value, Failure>) -> Operation {
    Operation::new("fetch_later", move |_args, ctx| {
        let id = ctx.defer();
        let completer = ctx.completer();
        let result = result.clone();
        tokio::spawn(async move {
            tokio::time::sleep(Duration::from_millis(5)).await;
            completer.complete(id, result);
        });
        CallOutcome::Pending(id)
    })
}

/// Calls `operation` and PUTs FETCHED with the result, or FETCH_FAILED.
fn fetcher(operation: Operation) -> ProcessFn {
    ProcessFn::routine("fetcher", |_| 0u8, move |pc: &mut u8, input: Resume| {
        *pc += 1;
        match (*pc, input) {
            (1, _) => Ok(Step::Yield(Effect::call(operation.clone(), vec![]))),
            (2, Resume::Value(Value::Data(data))) => Ok(Step::Yield(Effect::put(
                Notification::new("FETCHED").with_payload(data),
            ))),
            (2, Resume::Error(SagaError::Operation(failure))) => Ok(Step::Yield(Effect::put(
                Notification::new("FETCH_FAILED").with_payload(json!(failure.message)),
            ))),
            (_, input) => Ok(Step::Done(input.into_value()?)),
        }
    })
}

async fn settle(scheduler: &mut Scheduler, task: sagaflow::TaskId) -> Option<TaskStatus> {
    for _ in 0..100 {
        scheduler.run_until_idle().unwrap();
        match scheduler.status(task) {
            Some(TaskStatus::Waiting) | Some(TaskStatus::Running) => {
                tokio::time::sleep(Duration::from_millis(2)).await;
            }
            other => return other,
        }
    }
    scheduler.status(task)
}

#[tokio::test]
async fn completion_from_a_tokio_task_resumes_the_caller() {
    init_tracing();
    let (mut scheduler, published) = common::observed_scheduler();
    let task = scheduler
        .start(fetcher(fetch_later(Ok(Value::from(json!([1, 2, 3]))))), vec![])
        .unwrap();

    assert_eq!(scheduler.status(task), Some(TaskStatus::Waiting));
    assert_eq!(scheduler.pending_operations(), 1);

    assert_eq!(settle(&mut scheduler, task).await, Some(TaskStatus::Completed));
    assert_eq!(published.tags(), vec!["FETCHED"]);
    assert_eq!(published.all()[0].payload(), &json!([1, 2, 3]));
    assert_eq!(scheduler.pending_operations(), 0);
}

#[tokio::test]
async fn failed_completion_is_thrown_into_the_caller() {
    init_tracing();
    let (mut scheduler, published) = common::observed_scheduler();
    let task = scheduler
        .start(fetcher(fetch_later(Err(Failure::new("offline")))), vec![])
        .unwrap();

    assert_eq!(settle(&mut scheduler, task).await, Some(TaskStatus::Completed));
    assert_eq!(published.tags(), vec!["FETCH_FAILED"]);
    assert_eq!(published.all()[0].payload(), &json!("offline"));
}

#[tokio::test]
async fn late_completion_after_cancellation_is_ignored() {
    init_tracing();
    let mut scheduler = SchedulerBuilder::new().build().unwrap();
    let task = scheduler
        .start(fetcher(fetch_later(Ok(Value::Unit))), vec![])
        .unwrap();

    scheduler.cancel(task).unwrap();
    assert_eq!(scheduler.status(task), Some(TaskStatus::Cancelled));

    tokio::time::sleep(Duration::from_millis(20)).await;
    // The completion arrives for a discarded operation and is dropped.
    scheduler.run_until_idle().unwrap();
    assert_eq!(scheduler.status(task), Some(TaskStatus::Cancelled));
}

#[test]
fn completer_works_across_threads() {
    init_tracing();
    let (tx, rx) = std::sync::mpsc::channel();
    let operation = Operation::new("threaded", move |_args, ctx| {
        let id = ctx.defer();
        let _ = tx.send((id, ctx.completer()));
        CallOutcome::Pending(id)
    });

    let mut scheduler = Scheduler::new();
    let task = scheduler.start(fetcher(operation), vec![]).unwrap();
    let (id, completer) = rx.recv().unwrap();

    let worker = std::thread::spawn(move || completer.complete(id, Ok(Value::from(json!(7)))));
    assert!(worker.join().unwrap());

    scheduler.run_until_idle().unwrap();
    assert_eq!(scheduler.status(task), Some(TaskStatus::Completed));
}
