// This is the resizable circular buffer shared by producers and consumers

use crate::MPMC::Structs::Message;

/// Direction of a capacity change.
#[derive(Copy, Clone, Debug, PartialEq, Eq)]
pub enum ResizeDirection {
    Grow,
    Shrink,
}

/// Pending-resize descriptor carried by the queue.
///
/// `Idle -> Requested -> Applying -> Idle`. Only the control surface moves
/// `Idle -> Requested`; a consumer holding the queue lock does the rest.
/// `Applying` is only ever observed from inside that critical section.
#[derive(Copy, Clone, Debug, Default, PartialEq, Eq)]
pub enum ResizeState {
    #[default]
    Idle,
    Requested {
        direction: ResizeDirection,
        target: usize,
    },
    Applying {
        direction: ResizeDirection,
        target: usize,
    },
}

impl ResizeState {
    pub fn is_idle(&self) -> bool {
        matches!(self, ResizeState::Idle)
    }

    /// Direction and target of a request that has not settled yet.
    pub fn pending(&self) -> Option<(ResizeDirection, usize)> {
        match *self {
            ResizeState::Idle => None,
            ResizeState::Requested { direction, target }
            | ResizeState::Applying { direction, target } => Some((direction, target)),
        }
    }
}

/// A bounded FIFO of owned messages over a circular backing array.
///
/// The struct itself is not synchronized. It always lives behind the
/// exclusive lock of a [`SyncPolicy`](crate::MPMC::Policy::SyncPolicy), and
/// every method here assumes that lock is held.
///
/// ### Layout:
/// - `head` is the next slot to dequeue, `tail` the next slot to fill.
/// - `count` is tracked explicitly, so `head == tail` is unambiguous
///   (empty when `count == 0`, full when `count == capacity`).
/// - Occupied slots are `Some`, free slots are `None`.
pub struct BoundedQueue {
    /// Backing array; its length is the capacity.
    pub(crate) slots: Box<[Option<Message>]>,

    pub(crate) head: usize,

    pub(crate) tail: usize,

    pub(crate) count: usize,

    /// Ordinal of the last enqueue; monotonic for the session.
    pub(crate) total_enqueued: u64,

    /// Ordinal of the last dequeue; monotonic for the session.
    pub(crate) total_dequeued: u64,

    pub(crate) resize: ResizeState,
}
