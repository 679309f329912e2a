//! Suspendable processes.
//!
//! A process is an explicit resumable state object. The scheduler owns the
//! stepping: it calls `resume` with the result of the last effect, or
//! `throw_into` with an error, and the process answers with its next
//! effect or its terminal outcome.

use super::effect::Effect;
use crate::core::{ProtocolViolation, SagaError, Value};
use std::collections::VecDeque;
use std::fmt;
use std::sync::Arc;

/// Result of stepping a process once.
#[derive(Clone, Debug, PartialEq)]
pub enum Step {
    /// The process suspended on this effect.
    Yield(Effect),
    /// The process finished with a result.
    Done(Value),
    /// The process failed; the error escaped its own handlers.
    Failed(SagaError),
}

impl Step {
    pub fn is_terminal(&self) -> bool {
        !matches!(self, Self::Yield(_))
    }
}

/// The input a process is stepped with.
#[derive(Clone, Debug, PartialEq)]
pub enum Resume {
    Value(Value),
    Error(SagaError),
}

impl Resume {
    /// The resumed value, or the thrown error. Lets process bodies use `?`
    /// where they have no handler for the error.
    pub fn into_value(self) -> Result<Value, SagaError> {
        match self {
            Self::Value(value) => Ok(value),
            Self::Error(error) => Err(error),
        }
    }

    pub fn is_cancellation(&self) -> bool {
        matches!(self, Self::Error(e) if e.is_cancellation())
    }
}

/// A suspendable unit of control flow.
pub trait Process {
    /// Resume with the result of the last yielded effect.
    fn resume(&mut self, value: Value) -> Step;

    /// Deliver an error at the current suspension point so the process's
    /// own handlers (and cleanup) run.
    fn throw_into(&mut self, error: SagaError) -> Step;

    /// Process name for task tables and logs.
    fn name(&self) -> &str {
        "process"
    }

    /// Step with either input.
    fn step(&mut self, input: Resume) -> Step {
        match input {
            Resume::Value(value) => self.resume(value),
            Resume::Error(error) => self.throw_into(error),
        }
    }
}

type Body<S> = Box<dyn FnMut(&mut S, Resume) -> Result<Step, SagaError>>;

/// Process written as a closure over explicit state.
///
/// The body receives the state and the resume input, and returns the next
/// step. Returning `Err` fails the process, which makes `?` behave like an
/// uncaught throw. Resuming a settled routine reports
/// `ProcessAlreadySettled`.
///
/// # Example
///
/// ```rust
/// use sagaflow::core::{Notification, Value};
/// use sagaflow::effects::{delay, Effect, Process, Routine, Step};
///
/// let mut increment_async = Routine::new("increment_async", 0u8, |pc, input| {
///     input.into_value()?;
///     *pc += 1;
///     Ok(match *pc {
///         1 => Step::Yield(Effect::call(delay(), vec![Value::from(1000u64)])),
///         2 => Step::Yield(Effect::put(Notification::new("INCREMENT"))),
///         _ => Step::Done(Value::Unit),
///     })
/// });
///
/// assert_eq!(
///     increment_async.resume(Value::Unit),
///     Step::Yield(Effect::call(delay(), vec![Value::from(1000u64)]))
/// );
/// assert_eq!(
///     increment_async.resume(Value::Unit),
///     Step::Yield(Effect::put(Notification::new("INCREMENT")))
/// );
/// assert_eq!(increment_async.resume(Value::Unit), Step::Done(Value::Unit));
/// ```
pub struct Routine<S> {
    name: String,
    state: S,
    body: Body<S>,
    settled: bool,
}

impl<S> Routine<S> {
    pub fn new<F>(name: impl Into<String>, state: S, body: F) -> Self
    where
        F: FnMut(&mut S, Resume) -> Result<Step, SagaError> + 'static,
    {
        Self {
            name: name.into(),
            state,
            body: Box::new(body),
            settled: false,
        }
    }

    pub fn state(&self) -> &S {
        &self.state
    }

    pub fn is_settled(&self) -> bool {
        self.settled
    }

    fn advance(&mut self, input: Resume) -> Step {
        if self.settled {
            return Step::Failed(ProtocolViolation::ProcessAlreadySettled.into());
        }
        let step = (self.body)(&mut self.state, input).unwrap_or_else(Step::Failed);
        self.settled = step.is_terminal();
        step
    }
}

impl<S> Process for Routine<S> {
    fn resume(&mut self, value: Value) -> Step {
        self.advance(Resume::Value(value))
    }

    fn throw_into(&mut self, error: SagaError) -> Step {
        self.advance(Resume::Error(error))
    }

    fn name(&self) -> &str {
        &self.name
    }
}

/// Process that yields a fixed sequence of effects and finishes with the
/// result of the last one. Any thrown error fails it.
pub struct Script {
    name: String,
    effects: VecDeque<Effect>,
    last: Value,
    settled: bool,
}

impl Script {
    pub fn new(name: impl Into<String>, effects: Vec<Effect>) -> Self {
        Self {
            name: name.into(),
            effects: effects.into(),
            last: Value::Unit,
            settled: false,
        }
    }
}

impl Process for Script {
    fn resume(&mut self, value: Value) -> Step {
        if self.settled {
            return Step::Failed(ProtocolViolation::ProcessAlreadySettled.into());
        }
        self.last = value;
        match self.effects.pop_front() {
            Some(effect) => Step::Yield(effect),
            None => {
                self.settled = true;
                Step::Done(std::mem::take(&mut self.last))
            }
        }
    }

    fn throw_into(&mut self, error: SagaError) -> Step {
        if self.settled {
            return Step::Failed(ProtocolViolation::ProcessAlreadySettled.into());
        }
        self.settled = true;
        Step::Failed(error)
    }

    fn name(&self) -> &str {
        &self.name
    }
}

type Factory = dyn Fn(Vec<Value>) -> Box<dyn Process>;

/// Named process factory, the `fn` of FORK and CALL effects.
///
/// Equality is by name, like `Operation`.
#[derive(Clone)]
pub struct ProcessFn {
    name: Arc<str>,
    factory: Arc<Factory>,
}

impl ProcessFn {
    pub fn new<F>(name: impl Into<Arc<str>>, factory: F) -> Self
    where
        F: Fn(Vec<Value>) -> Box<dyn Process> + 'static,
    {
        Self {
            name: name.into(),
            factory: Arc::new(factory),
        }
    }

    /// Factory for `Routine`s: `init` builds the state from the arguments,
    /// `body` is cloned into every instance.
    pub fn routine<S, I, F>(name: &str, init: I, body: F) -> Self
    where
        S: 'static,
        I: Fn(Vec<Value>) -> S + 'static,
        F: FnMut(&mut S, Resume) -> Result<Step, SagaError> + Clone + 'static,
    {
        let routine_name = name.to_string();
        Self::new(name, move |args| {
            Box::new(Routine::new(routine_name.clone(), init(args), body.clone()))
        })
    }

    /// Factory for `Script`s yielding the same effects on every run.
    pub fn script(name: &str, effects: Vec<Effect>) -> Self {
        let script_name = name.to_string();
        Self::new(name, move |_args| {
            Box::new(Script::new(script_name.clone(), effects.clone()))
        })
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn spawn(&self, args: Vec<Value>) -> Box<dyn Process> {
        (self.factory)(args)
    }
}

impl fmt::Debug for ProcessFn {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_tuple("ProcessFn").field(&self.name).finish()
    }
}

impl PartialEq for ProcessFn {
    fn eq(&self, other: &Self) -> bool {
        self.name == other.name
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::core::{Failure, Notification, TaskId};

    #[test]
    fn routine_reports_already_settled() {
        let mut routine = Routine::new("once", (), |_, _| Ok(Step::Done(Value::Unit)));
        assert_eq!(routine.resume(Value::Unit), Step::Done(Value::Unit));
        assert!(routine.is_settled());
        assert_eq!(
            routine.resume(Value::Unit),
            Step::Failed(ProtocolViolation::ProcessAlreadySettled.into())
        );
    }

    #[test]
    fn routine_question_mark_fails_the_process() {
        let mut routine = Routine::new("strict", (), |_, input| {
            input.into_value()?;
            Ok(Step::Done(Value::Unit))
        });
        let err = SagaError::from(Failure::new("boom"));
        assert_eq!(routine.throw_into(err.clone()), Step::Failed(err));
    }

    #[test]
    fn routine_can_catch_failures() {
        let mut routine = Routine::new("catching", false, |caught, input| match input {
            Resume::Error(SagaError::Operation(_)) => {
                *caught = true;
                Ok(Step::Yield(Effect::put(Notification::new("FAILED"))))
            }
            other => {
                other.into_value()?;
                Ok(Step::Done(Value::Bool(*caught)))
            }
        });
        assert_eq!(
            routine.throw_into(Failure::new("x").into()),
            Step::Yield(Effect::put(Notification::new("FAILED")))
        );
        assert_eq!(routine.resume(Value::Unit), Step::Done(Value::Bool(true)));
    }

    #[test]
    fn script_yields_in_order_and_returns_last_result() {
        let mut script = Script::new(
            "two",
            vec![Effect::take("A"), Effect::put(Notification::new("B"))],
        );
        assert_eq!(script.resume(Value::Unit), Step::Yield(Effect::take("A")));
        assert_eq!(
            script.resume(Value::from("a")),
            Step::Yield(Effect::put(Notification::new("B")))
        );
        assert_eq!(script.resume(Value::from("b")), Step::Done(Value::from("b")));
    }

    #[test]
    fn script_fails_on_throw() {
        let mut script = Script::new("s", vec![Effect::take("A")]);
        script.resume(Value::Unit);
        let step = script.throw_into(SagaError::Cancelled(TaskId(1)));
        assert_eq!(step, Step::Failed(SagaError::Cancelled(TaskId(1))));
    }

    #[test]
    fn process_fn_builds_fresh_instances() {
        let factory = ProcessFn::routine(
            "echo",
            |args: Vec<Value>| args.into_iter().next().unwrap_or_default(),
            |arg: &mut Value, input| {
                input.into_value()?;
                Ok(Step::Done(std::mem::take(arg)))
            },
        );
        let mut first = factory.spawn(vec![Value::from("one")]);
        let mut second = factory.spawn(vec![Value::from("two")]);
        assert_eq!(first.name(), "echo");
        assert_eq!(first.resume(Value::Unit), Step::Done(Value::from("one")));
        assert_eq!(second.resume(Value::Unit), Step::Done(Value::from("two")));
    }

    #[test]
    fn resume_detects_cancellation() {
        assert!(Resume::Error(SagaError::Cancelled(TaskId(2))).is_cancellation());
        assert!(!Resume::Value(Value::Unit).is_cancellation());
    }
}
