//! Watcher combinators built from TAKE, FORK, CANCEL and RACE.
//!
//! None of these are scheduler primitives: each is an ordinary process (or
//! effect) assembled from the primitive effects, so their semantics follow
//! directly from those of TAKE/FORK/CANCEL/RACE.

use super::effect::Effect;
use super::operation::delay;
use super::process::{ProcessFn, Resume, Step};
use crate::core::{Pattern, SagaError, TaskId, Value};

/// Key of the RACE branch holding the guarded effect in `timeout`.
pub const RESULT_KEY: &str = "result";
/// Key of the RACE branch that wins when the deadline passes first.
pub const TIMED_OUT_KEY: &str = "timedOut";

#[derive(Clone, Copy, Debug, PartialEq)]
enum EveryStage {
    Listening,
    Forking,
}

/// Fork a new `worker` for every notification matching `pattern`.
///
/// The worker receives the watcher's arguments followed by the notification.
/// Any number of workers may be in flight. The watcher re-arms its TAKE in
/// the same scheduler turn it forks, so no notification is missed.
pub fn watch_every(pattern: impl Into<Pattern>, worker: ProcessFn) -> ProcessFn {
    let pattern = pattern.into();
    let name = format!("watch_every({pattern}, {})", worker.name());
    ProcessFn::routine(
        &name,
        |args: Vec<Value>| (EveryStage::Listening, args),
        move |(stage, args): &mut (EveryStage, Vec<Value>), input: Resume| {
            let value = input.into_value()?;
            let effect = match *stage {
                EveryStage::Listening if value.as_notification().is_some() => {
                    *stage = EveryStage::Forking;
                    let mut worker_args = args.clone();
                    worker_args.push(value);
                    Effect::fork(worker.clone(), worker_args)
                }
                EveryStage::Listening | EveryStage::Forking => {
                    *stage = EveryStage::Listening;
                    Effect::Take(pattern.clone())
                }
            };
            Ok(Step::Yield(effect))
        },
    )
}

#[derive(Clone, Debug, PartialEq)]
enum LatestStage {
    Listening,
    Cancelling(Value),
    Forking,
}

#[derive(Clone, Debug)]
struct LatestState {
    stage: LatestStage,
    args: Vec<Value>,
    current: Option<TaskId>,
}

/// Fork `worker` for every matching notification, cancelling the worker
/// forked for the previous one if it is still running.
///
/// The previous worker receives its cancellation signal, and runs any
/// synchronous cleanup, before the next worker is forked. A worker whose
/// cleanup suspends (for example on a pending CALL) is still Waiting when
/// its successor starts; it is already cancelling and settles Cancelled once
/// that cleanup finishes. At most one worker is in flight without having
/// been cancelled.
pub fn watch_latest(pattern: impl Into<Pattern>, worker: ProcessFn) -> ProcessFn {
    let pattern = pattern.into();
    let name = format!("watch_latest({pattern}, {})", worker.name());
    ProcessFn::routine(
        &name,
        |args: Vec<Value>| LatestState {
            stage: LatestStage::Listening,
            args,
            current: None,
        },
        move |state: &mut LatestState, input: Resume| {
            let value = input.into_value()?;
            let stage = std::mem::replace(&mut state.stage, LatestStage::Listening);
            let effect = match stage {
                LatestStage::Listening if value.as_notification().is_some() => {
                    match state.current.take() {
                        Some(previous) => {
                            state.stage = LatestStage::Cancelling(value);
                            Effect::cancel(previous)
                        }
                        None => fork_latest(state, &worker, value),
                    }
                }
                LatestStage::Cancelling(notification) => {
                    fork_latest(state, &worker, notification)
                }
                LatestStage::Forking => {
                    state.current = Some(value.expect_task()?);
                    Effect::Take(pattern.clone())
                }
                LatestStage::Listening => Effect::Take(pattern.clone()),
            };
            Ok(Step::Yield(effect))
        },
    )
}

fn fork_latest(state: &mut LatestState, worker: &ProcessFn, notification: Value) -> Effect {
    state.stage = LatestStage::Forking;
    let mut worker_args = state.args.clone();
    worker_args.push(notification);
    Effect::fork(worker.clone(), worker_args)
}

/// Race `effect` against a `delay` of `ms` milliseconds.
///
/// Resumes with `{result: value}` when the effect wins, or `{timedOut: ()}`
/// when the deadline wins; the losing branch has already been cancelled.
pub fn timeout(effect: Effect, ms: u64) -> Effect {
    Effect::race(vec![
        (RESULT_KEY, effect),
        (TIMED_OUT_KEY, Effect::call(delay(), vec![Value::from(ms)])),
    ])
}

/// Interpret the value a `timeout` resumed with: `Ok(result)` if the effect
/// won, `Err(TimedOut)` if the deadline passed.
pub fn timeout_result(value: Value) -> Result<Value, TimedOut> {
    match value {
        Value::Keyed { key, value } if key == RESULT_KEY => Ok(*value),
        _ => Err(TimedOut),
    }
}

/// Marker returned by `timeout_result` when the deadline won.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct TimedOut;

impl From<TimedOut> for SagaError {
    fn from(_: TimedOut) -> Self {
        SagaError::Operation(crate::core::Failure::new("timed out"))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::core::Notification;
    use crate::effects::Process;

    fn noop_worker() -> ProcessFn {
        ProcessFn::script("worker", vec![])
    }

    #[test]
    fn watch_every_alternates_take_and_fork() {
        let mut watcher = watch_every("X", noop_worker()).spawn(vec![]);
        assert_eq!(watcher.resume(Value::Unit), Step::Yield(Effect::take("X")));

        let n = Value::from(Notification::new("X"));
        assert_eq!(
            watcher.resume(n.clone()),
            Step::Yield(Effect::fork(noop_worker(), vec![n]))
        );
        assert_eq!(
            watcher.resume(Value::Task(TaskId(9))),
            Step::Yield(Effect::take("X"))
        );
    }

    #[test]
    fn watch_latest_cancels_previous_worker_before_forking() {
        let mut watcher = watch_latest("X", noop_worker()).spawn(vec![]);
        watcher.resume(Value::Unit);

        let first = Value::from(Notification::new("X"));
        assert!(matches!(
            watcher.resume(first),
            Step::Yield(Effect::Fork { .. })
        ));
        assert_eq!(
            watcher.resume(Value::Task(TaskId(5))),
            Step::Yield(Effect::take("X"))
        );

        let second = Value::from(Notification::new("X"));
        assert_eq!(
            watcher.resume(second.clone()),
            Step::Yield(Effect::cancel(TaskId(5)))
        );
        assert_eq!(
            watcher.resume(Value::Unit),
            Step::Yield(Effect::fork(noop_worker(), vec![second]))
        );
    }

    #[test]
    fn watchers_stop_on_cancellation() {
        let mut watcher = watch_every("X", noop_worker()).spawn(vec![]);
        watcher.resume(Value::Unit);
        let step = watcher.throw_into(SagaError::Cancelled(TaskId(1)));
        assert_eq!(step, Step::Failed(SagaError::Cancelled(TaskId(1))));
    }

    #[test]
    fn timeout_is_a_race_against_delay() {
        let effect = timeout(Effect::take("DONE"), 500);
        assert_eq!(
            effect,
            Effect::race(vec![
                ("result", Effect::take("DONE")),
                (
                    "timedOut",
                    Effect::call(delay(), vec![Value::from(500u64)])
                ),
            ])
        );
    }

    #[test]
    fn timeout_result_distinguishes_winner() {
        let won = Value::Keyed {
            key: RESULT_KEY.to_string(),
            value: Box::new(Value::from("ok")),
        };
        assert_eq!(timeout_result(won), Ok(Value::from("ok")));

        let lost = Value::Keyed {
            key: TIMED_OUT_KEY.to_string(),
            value: Box::new(Value::Unit),
        };
        assert_eq!(timeout_result(lost), Err(TimedOut));
    }
}
