//! Bookkeeping for ALL and RACE.
//!
//! Each sub-effect runs in its own branch task. The group collects branch
//! outcomes and decides when the owner can be resumed.

use crate::core::{SagaError, TaskId, Value};
use crate::effects::Resume;

#[derive(Clone, Debug, PartialEq)]
pub(crate) enum GroupKind {
    All,
    /// Branch keys in declaration order.
    Race(Vec<String>),
}

/// What a branch settlement means for the owner.
#[derive(Clone, Debug, PartialEq)]
pub(crate) enum GroupUpdate {
    Pending,
    /// The owner resumes with this input; remaining branches must be cancelled.
    Resolved(Resume),
}

#[derive(Debug)]
pub(crate) struct Group {
    pub owner: TaskId,
    pub kind: GroupKind,
    pub branches: Vec<TaskId>,
    results: Vec<Option<Value>>,
    remaining: usize,
}

impl Group {
    pub(crate) fn new(owner: TaskId, kind: GroupKind, size: usize) -> Self {
        Self {
            owner,
            kind,
            branches: Vec::with_capacity(size),
            results: vec![None; size],
            remaining: size,
        }
    }

    pub(crate) fn label(&self, slot: usize) -> String {
        match &self.kind {
            GroupKind::All => format!("ALL[{slot}]"),
            GroupKind::Race(keys) => match keys.get(slot) {
                Some(key) => format!("RACE[{key}]"),
                None => format!("RACE[{slot}]"),
            },
        }
    }

    /// Record the outcome of the branch in `slot`.
    ///
    /// ALL resolves on the first failure or once every slot succeeded.
    /// RACE resolves on the first outcome of either kind.
    pub(crate) fn settle(&mut self, slot: usize, outcome: Result<Value, SagaError>) -> GroupUpdate {
        match (&self.kind, outcome) {
            (_, Err(error)) => GroupUpdate::Resolved(Resume::Error(error)),
            (GroupKind::Race(keys), Ok(value)) => {
                let key = keys.get(slot).cloned().unwrap_or_default();
                GroupUpdate::Resolved(Resume::Value(Value::Keyed {
                    key,
                    value: Box::new(value),
                }))
            }
            (GroupKind::All, Ok(value)) => {
                if let Some(entry) = self.results.get_mut(slot) {
                    if entry.is_none() {
                        self.remaining = self.remaining.saturating_sub(1);
                    }
                    *entry = Some(value);
                }
                if self.remaining > 0 {
                    return GroupUpdate::Pending;
                }
                let values = self.results.iter_mut().map(|r| r.take().unwrap_or_default());
                GroupUpdate::Resolved(Resume::Value(Value::List(values.collect())))
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::core::Failure;

    #[test]
    fn all_waits_for_every_slot_and_keeps_order() {
        let mut group = Group::new(TaskId(1), GroupKind::All, 2);
        assert_eq!(group.settle(1, Ok(Value::from("b"))), GroupUpdate::Pending);
        assert_eq!(
            group.settle(0, Ok(Value::from("a"))),
            GroupUpdate::Resolved(Resume::Value(Value::List(vec![
                Value::from("a"),
                Value::from("b")
            ])))
        );
    }

    #[test]
    fn all_resolves_on_first_failure() {
        let mut group = Group::new(TaskId(1), GroupKind::All, 3);
        let error = SagaError::from(Failure::new("boom"));
        assert_eq!(
            group.settle(2, Err(error.clone())),
            GroupUpdate::Resolved(Resume::Error(error))
        );
    }

    #[test]
    fn race_resolves_with_winning_key() {
        let keys = vec!["a".to_string(), "b".to_string()];
        let mut group = Group::new(TaskId(1), GroupKind::Race(keys), 2);
        assert_eq!(
            group.settle(1, Ok(Value::from(2u64))),
            GroupUpdate::Resolved(Resume::Value(Value::Keyed {
                key: "b".to_string(),
                value: Box::new(Value::from(2u64)),
            }))
        );
        assert_eq!(group.label(0), "RACE[a]");
    }
}
