use std::fmt;
use crate::Core::CountingPermit;
use crate::MPMC::Buffer::BoundedQueue;
use crate::MPMC::Session;
use crate::MPMC::Structs::Message;

/// Debug function for BoundedQueue
///
/// Shows the ring indices and counters, not the stored messages:
/// - Capacity and occupancy
/// - Head / tail positions
/// - Lifetime enqueue and dequeue ordinals
/// - Pending resize, if any
pub fn debug_bounded_queue(queue: &BoundedQueue, f: &mut fmt::Formatter<'_>) -> fmt::Result {
    f.debug_struct("BoundedQueue")
        .field("capacity", &queue.capacity())
        .field("count", &queue.len())
        .field("head", &queue.head)
        .field("tail", &queue.tail)
        .field("total_enqueued", &queue.total_enqueued())
        .field("total_dequeued", &queue.total_dequeued())
        .field("resize", &queue.resize_state())
        .finish()
}

/// Debug function for Message
///
/// Payload bytes are summarized by length only
pub fn debug_message(msg: &Message, f: &mut fmt::Formatter<'_>) -> fmt::Result {
    f.debug_struct("Message")
        .field("type", &format_args!("0x{:02x}", msg.msg_type()))
        .field("size", &msg.size_field())
        .field("hash", &format_args!("0x{:04x}", msg.hash()))
        .field("len", &msg.len())
        .finish_non_exhaustive()
}

pub fn debug_counting_permit(permit: &CountingPermit, f: &mut fmt::Formatter<'_>) -> fmt::Result {
    f.debug_struct("CountingPermit")
        .field("available", &permit.available())
        .finish()
}

/// Debug function for Session
///
/// Takes a status snapshot, so it briefly locks the queue
pub fn debug_session(session: &Session, f: &mut fmt::Formatter<'_>) -> fmt::Result {
    let status = session.status();
    f.debug_struct("Session")
        .field("discipline", &status.discipline)
        .field("running", &session.is_running())
        .field("capacity", &status.capacity)
        .field("occupied", &status.occupied)
        .field("producers", &status.active_producers)
        .field("consumers", &status.active_consumers)
        .finish_non_exhaustive()
}
