//! Channels: ordered queues decoupling producers from consumers.
//!
//! A channel holds either buffered values or pending takers, never both.
//! A put hands its value to the oldest pending taker if there is one, and
//! buffers it per the channel's `BufferPolicy` otherwise. Takers that come
//! back for more queue up behind the others, so concurrent takers are
//! served round-robin.
//!
//! Channels are only mutated by the scheduler on its own thread, so no
//! locking is involved.

mod buffer;

pub use buffer::{BufferPolicy, Overflow};

use crate::core::{ChannelId, TaskId, Value};
use serde::{Deserialize, Serialize};
use std::collections::VecDeque;

/// Result of a put, for the scheduler to act on.
#[derive(Clone, Debug, PartialEq)]
pub(crate) enum PutOutcome {
    /// Handed to this taker, which must be resumed with the value.
    Delivered { taker: TaskId, value: Value },
    Buffered,
    /// Discarded by the overflow policy (or because the channel is closed).
    Dropped,
    /// The putter must wait for a slot.
    Blocked,
    /// The putter must be thrown a `BufferOverflow`.
    Overflowed { capacity: usize },
}

/// Result of a take.
#[derive(Clone, Debug, PartialEq)]
pub(crate) enum TakeOutcome {
    /// A buffered value; `unblocked` is a putter whose value took the freed slot.
    Ready {
        value: Value,
        unblocked: Option<TaskId>,
    },
    /// The taker was queued.
    Pending,
    /// Closed and drained.
    Closed,
}

/// Tasks to resume when a channel closes.
#[derive(Clone, Debug, Default, PartialEq)]
pub(crate) struct ClosedWake {
    pub takers: Vec<TaskId>,
    pub putters: Vec<TaskId>,
}

/// An ordered, optionally bounded queue of values.
#[derive(Debug)]
pub struct Channel {
    id: ChannelId,
    policy: BufferPolicy,
    buffer: VecDeque<Value>,
    takers: VecDeque<TaskId>,
    putters: VecDeque<(TaskId, Value)>,
    closed: bool,
}

impl Channel {
    pub(crate) fn new(id: ChannelId, policy: BufferPolicy) -> Self {
        Self {
            id,
            policy,
            buffer: VecDeque::new(),
            takers: VecDeque::new(),
            putters: VecDeque::new(),
            closed: false,
        }
    }

    pub fn id(&self) -> ChannelId {
        self.id
    }

    pub fn policy(&self) -> BufferPolicy {
        self.policy
    }

    pub fn buffered(&self) -> usize {
        self.buffer.len()
    }

    pub fn pending_takers(&self) -> usize {
        self.takers.len()
    }

    pub fn blocked_putters(&self) -> usize {
        self.putters.len()
    }

    pub fn is_closed(&self) -> bool {
        self.closed
    }

    pub(crate) fn put(&mut self, putter: TaskId, value: Value) -> PutOutcome {
        if self.closed {
            return PutOutcome::Dropped;
        }
        if let Some(taker) = self.takers.pop_front() {
            return PutOutcome::Delivered { taker, value };
        }

        let outcome = match self.policy {
            BufferPolicy::Unbounded => {
                self.buffer.push_back(value);
                PutOutcome::Buffered
            }
            BufferPolicy::Fixed { capacity, .. } if self.buffer.len() < capacity => {
                self.buffer.push_back(value);
                PutOutcome::Buffered
            }
            BufferPolicy::Fixed { capacity, overflow } => match overflow {
                Overflow::Drop => PutOutcome::Dropped,
                Overflow::Slide => {
                    self.buffer.pop_front();
                    self.buffer.push_back(value);
                    PutOutcome::Buffered
                }
                Overflow::Block => {
                    self.putters.push_back((putter, value));
                    PutOutcome::Blocked
                }
                Overflow::Fail => PutOutcome::Overflowed { capacity },
            },
        };
        debug_assert!(self.takers.is_empty() || self.buffer.is_empty());
        outcome
    }

    pub(crate) fn take(&mut self, taker: TaskId) -> TakeOutcome {
        if let Some(value) = self.buffer.pop_front() {
            let unblocked = self.putters.pop_front().map(|(putter, value)| {
                self.buffer.push_back(value);
                putter
            });
            return TakeOutcome::Ready { value, unblocked };
        }
        if self.closed {
            return TakeOutcome::Closed;
        }
        self.takers.push_back(taker);
        TakeOutcome::Pending
    }

    /// Forget a task that is no longer waiting (it was cancelled).
    pub(crate) fn withdraw(&mut self, task: TaskId) {
        self.takers.retain(|t| *t != task);
        self.putters.retain(|(p, _)| *p != task);
    }

    /// Close the channel. Blocked putters' values stay buffered for draining.
    pub(crate) fn close(&mut self) -> ClosedWake {
        if self.closed {
            return ClosedWake::default();
        }
        self.closed = true;
        let putters = self
            .putters
            .drain(..)
            .map(|(putter, value)| {
                self.buffer.push_back(value);
                putter
            })
            .collect();
        ClosedWake {
            takers: self.takers.drain(..).collect(),
            putters,
        }
    }

    pub(crate) fn info(&self) -> ChannelInfo {
        ChannelInfo {
            id: self.id,
            policy: self.policy,
            buffered: self.buffer.len(),
            pending_takers: self.takers.len(),
            blocked_putters: self.putters.len(),
            closed: self.closed,
        }
    }
}

/// Read-only summary of a channel.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct ChannelInfo {
    pub id: ChannelId,
    pub policy: BufferPolicy,
    pub buffered: usize,
    pub pending_takers: usize,
    pub blocked_putters: usize,
    pub closed: bool,
}

#[cfg(test)]
mod tests {
    use super::*;

    fn chan(policy: BufferPolicy) -> Channel {
        Channel::new(ChannelId(1), policy)
    }

    #[test]
    fn put_without_takers_buffers() {
        let mut c = chan(BufferPolicy::Unbounded);
        assert_eq!(c.put(TaskId(1), Value::from(1u64)), PutOutcome::Buffered);
        assert_eq!(c.buffered(), 1);
        assert_eq!(
            c.take(TaskId(2)),
            TakeOutcome::Ready {
                value: Value::from(1u64),
                unblocked: None
            }
        );
    }

    #[test]
    fn put_serves_oldest_taker_first() {
        let mut c = chan(BufferPolicy::Unbounded);
        assert_eq!(c.take(TaskId(1)), TakeOutcome::Pending);
        assert_eq!(c.take(TaskId(2)), TakeOutcome::Pending);
        assert_eq!(
            c.put(TaskId(9), Value::from("a")),
            PutOutcome::Delivered {
                taker: TaskId(1),
                value: Value::from("a")
            }
        );
        assert_eq!(c.pending_takers(), 1);
        assert_eq!(c.buffered(), 0);
    }

    #[test]
    fn never_holds_values_and_takers_together() {
        let mut c = chan(BufferPolicy::Unbounded);
        c.take(TaskId(1));
        c.put(TaskId(9), Value::from(1u64));
        c.put(TaskId(9), Value::from(2u64));
        assert_eq!(c.pending_takers(), 0);
        assert_eq!(c.buffered(), 1);
    }

    #[test]
    fn fixed_drop_discards_new_values() {
        let mut c = chan(BufferPolicy::fixed(1, Overflow::Drop));
        c.put(TaskId(9), Value::from(1u64));
        assert_eq!(c.put(TaskId(9), Value::from(2u64)), PutOutcome::Dropped);
        assert!(matches!(c.take(TaskId(1)), TakeOutcome::Ready { value, .. } if value == Value::from(1u64)));
    }

    #[test]
    fn fixed_slide_discards_oldest() {
        let mut c = chan(BufferPolicy::fixed(1, Overflow::Slide));
        c.put(TaskId(9), Value::from(1u64));
        c.put(TaskId(9), Value::from(2u64));
        assert!(matches!(c.take(TaskId(1)), TakeOutcome::Ready { value, .. } if value == Value::from(2u64)));
    }

    #[test]
    fn fixed_fail_reports_overflow() {
        let mut c = chan(BufferPolicy::fixed(1, Overflow::Fail));
        c.put(TaskId(9), Value::Unit);
        assert_eq!(
            c.put(TaskId(9), Value::Unit),
            PutOutcome::Overflowed { capacity: 1 }
        );
    }

    #[test]
    fn fixed_block_releases_putter_on_take() {
        let mut c = chan(BufferPolicy::fixed(1, Overflow::Block));
        c.put(TaskId(8), Value::from(1u64));
        assert_eq!(c.put(TaskId(9), Value::from(2u64)), PutOutcome::Blocked);
        assert_eq!(
            c.take(TaskId(1)),
            TakeOutcome::Ready {
                value: Value::from(1u64),
                unblocked: Some(TaskId(9))
            }
        );
        assert_eq!(c.buffered(), 1);
        assert_eq!(c.blocked_putters(), 0);
    }

    #[test]
    fn close_wakes_takers_and_drains_buffer() {
        let mut c = chan(BufferPolicy::Unbounded);
        c.take(TaskId(1));
        let wake = c.close();
        assert_eq!(wake.takers, vec![TaskId(1)]);
        assert_eq!(c.take(TaskId(2)), TakeOutcome::Closed);
        assert_eq!(c.put(TaskId(3), Value::Unit), PutOutcome::Dropped);
        assert_eq!(c.close(), ClosedWake::default());
    }

    #[test]
    fn withdraw_forgets_cancelled_taker() {
        let mut c = chan(BufferPolicy::Unbounded);
        c.take(TaskId(1));
        c.withdraw(TaskId(1));
        assert_eq!(c.put(TaskId(9), Value::Unit), PutOutcome::Buffered);
    }
}
