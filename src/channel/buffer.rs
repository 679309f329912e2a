//! Channel buffer policies.

use serde::{Deserialize, Serialize};

/// What a fixed buffer does with a put when it is full.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub enum Overflow {
    /// Discard the new value.
    Drop,
    /// Discard the oldest buffered value to make room.
    Slide,
    /// Suspend the putter until a take frees a slot.
    Block,
    /// Throw `BufferOverflow` into the putter.
    Fail,
}

/// How a channel buffers values nobody is waiting for.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Default, Serialize, Deserialize)]
pub enum BufferPolicy {
    #[default]
    Unbounded,
    Fixed { capacity: usize, overflow: Overflow },
}

impl BufferPolicy {
    pub fn fixed(capacity: usize, overflow: Overflow) -> Self {
        Self::Fixed { capacity, overflow }
    }

    /// Maximum number of buffered values, if bounded.
    pub fn capacity(&self) -> Option<usize> {
        match self {
            Self::Unbounded => None,
            Self::Fixed { capacity, .. } => Some(*capacity),
        }
    }
}
