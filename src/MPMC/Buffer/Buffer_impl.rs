use super::Buffer::{BoundedQueue, ResizeDirection, ResizeState};
use crate::error::{QueueError, QueueResult};
use crate::MPMC::Structs::Message;

use std::mem::size_of;

impl BoundedQueue {
    /// Create an empty queue with `capacity` slots.
    pub fn new(capacity: usize) -> QueueResult<Self> {
        if capacity == 0 {
            return Err(QueueError::InvalidCapacity { requested: 0 });
        }
        Ok(Self {
            slots: alloc_slots(capacity)?,
            head: 0,
            tail: 0,
            count: 0,
            total_enqueued: 0,
            total_dequeued: 0,
            resize: ResizeState::Idle,
        })
    }

    #[inline]
    pub fn capacity(&self) -> usize {
        self.slots.len()
    }

    #[inline]
    pub fn len(&self) -> usize {
        self.count
    }

    #[inline]
    pub fn is_empty(&self) -> bool {
        self.count == 0
    }

    #[inline]
    pub fn is_full(&self) -> bool {
        self.count == self.capacity()
    }

    #[inline]
    pub fn free_slots(&self) -> usize {
        self.capacity() - self.count
    }

    pub fn total_enqueued(&self) -> u64 {
        self.total_enqueued
    }

    pub fn total_dequeued(&self) -> u64 {
        self.total_dequeued
    }

    pub fn resize_state(&self) -> ResizeState {
        self.resize
    }

    /// Producer predicate: a slot is free and no resize is pending.
    #[inline]
    pub fn accepts_produce(&self) -> bool {
        self.count < self.capacity() && self.resize.is_idle()
    }

    /// True when a consumer holding the lock could apply the pending resize
    /// right now: any grow, or a shrink whose target fits the occupancy.
    pub fn resize_ready(&self) -> bool {
        match self.resize {
            ResizeState::Requested {
                direction: ResizeDirection::Grow,
                ..
            } => true,
            ResizeState::Requested {
                direction: ResizeDirection::Shrink,
                target,
            } => self.count <= target,
            _ => false,
        }
    }

    /// Write `msg` at `tail` and return the new `total_enqueued`.
    ///
    /// # Panics
    /// If the queue is full. Callers reserve a slot through the sync policy
    /// first, so reaching this is a bug.
    pub fn enqueue(&mut self, msg: Message) -> u64 {
        assert!(
            self.count < self.capacity(),
            "enqueue on a full queue ({}/{})",
            self.count,
            self.capacity()
        );
        debug_assert!(self.slots[self.tail].is_none());

        self.slots[self.tail] = Some(msg);
        self.tail = (self.tail + 1) % self.capacity();
        self.count += 1;
        self.total_enqueued += 1;
        self.total_enqueued
    }

    /// Take the message at `head` and return it with the new `total_dequeued`.
    ///
    /// # Panics
    /// If the queue is empty.
    pub fn dequeue(&mut self) -> (Message, u64) {
        assert!(self.count > 0, "dequeue on an empty queue");

        let msg = match self.slots[self.head].take() {
            Some(msg) => msg,
            None => unreachable!("occupied slot {} holds no message", self.head),
        };
        self.head = (self.head + 1) % self.capacity();
        self.count -= 1;
        self.total_dequeued += 1;
        (msg, self.total_dequeued)
    }

    /// Relocate the live entries into a backing array of `new_capacity`
    /// slots, oldest first at index 0.
    ///
    /// Refuses to drop entries: a target below the current occupancy fails
    /// with `WouldTruncate`. On any error the queue is left untouched.
    pub fn resize(&mut self, new_capacity: usize) -> QueueResult<()> {
        if new_capacity == 0 {
            return Err(QueueError::InvalidCapacity { requested: 0 });
        }
        if new_capacity < self.count {
            return Err(QueueError::WouldTruncate {
                target: new_capacity,
                count: self.count,
            });
        }

        let mut fresh = alloc_slots(new_capacity)?;
        let old_capacity = self.capacity();
        for (i, slot) in fresh.iter_mut().take(self.count).enumerate() {
            *slot = self.slots[(self.head + i) % old_capacity].take();
        }

        self.slots = fresh;
        self.head = 0;
        self.tail = self.count % new_capacity;
        Ok(())
    }

    /// Destroy every remaining message and release the backing array.
    /// Returns how many messages were dropped. Teardown only; the queue has
    /// no capacity afterwards.
    pub fn drain_and_destroy(&mut self) -> usize {
        let mut destroyed = 0;
        while self.count > 0 {
            let (msg, _) = self.dequeue();
            drop(msg);
            destroyed += 1;
        }
        self.slots = Box::new([]);
        self.head = 0;
        self.tail = 0;
        self.resize = ResizeState::Idle;
        destroyed
    }

    /// FIFO view of the live messages, oldest first.
    pub fn iter(&self) -> impl Iterator<Item = &Message> + '_ {
        let capacity = self.capacity();
        (0..self.count).filter_map(move |i| self.slots[(self.head + i) % capacity].as_ref())
    }
}

fn alloc_slots(capacity: usize) -> QueueResult<Box<[Option<Message>]>> {
    let mut slots: Vec<Option<Message>> = Vec::new();
    slots
        .try_reserve_exact(capacity)
        .map_err(|_| QueueError::AllocationFailure {
            bytes: capacity.saturating_mul(size_of::<Option<Message>>()),
        })?;
    slots.resize_with(capacity, || None);
    Ok(slots.into_boxed_slice())
}
