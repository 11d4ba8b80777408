// Self-describing variable-length message with a 16-bit integrity hash.

use crate::error::{QueueError, QueueResult};

/// Largest logical payload a message can carry.
pub const MAX_PAYLOAD: usize = 256;

/// Type byte of a regular data message.
pub const DATA_TYPE: u8 = 0;

/// Type byte of the empty marker message (-1 as a byte).
pub const MARKER_TYPE: u8 = 0xFF;

/// Number of data bytes stored for a given size field, rounded up to a
/// 4-byte boundary.
#[inline]
pub const fn padded_len(size_field: u8) -> usize {
    ((size_field as usize + 1) + 3) & !3
}

/// A message as produced by a producer worker.
///
/// `size` holds the logical length minus one, so a `u8` covers 1..=256
/// bytes. The marker message reuses `size = 0` and is told apart by its type.
/// Only the first `len()` bytes of `data` carry meaning; the rest is zero
/// padding that is never hashed.
#[derive(Clone, PartialEq, Eq)]
pub struct Message {
    msg_type: u8,
    size: u8,
    hash: u16,
    data: Box<[u8]>,
}

impl Message {
    /// Builds a random message from the task-owned generator.
    ///
    /// A size draw of 256 yields the marker message (logical length 0).
    pub fn create(rng: &mut fastrand::Rng) -> QueueResult<Self> {
        let size_draw = rng.u16(0..=MAX_PAYLOAD as u16);

        let (msg_type, size, len) = if size_draw as usize == MAX_PAYLOAD {
            (MARKER_TYPE, 0u8, 0usize)
        } else {
            (DATA_TYPE, size_draw as u8, size_draw as usize + 1)
        };

        let mut data = alloc_data(padded_len(size))?;
        rng.fill(&mut data[..len]);

        Ok(Self::sealed(msg_type, size, data))
    }

    /// Builds a message around an explicit payload.
    ///
    /// Regular payloads must be 1..=256 bytes; the marker type takes none.
    pub fn from_payload(msg_type: u8, payload: &[u8]) -> QueueResult<Self> {
        let len = payload.len();
        let valid = if msg_type == MARKER_TYPE {
            len == 0
        } else {
            (1..=MAX_PAYLOAD).contains(&len)
        };
        if !valid {
            return Err(QueueError::InvalidPayload { len });
        }

        let size = len.saturating_sub(1) as u8;
        let mut data = alloc_data(padded_len(size))?;
        data[..len].copy_from_slice(payload);

        Ok(Self::sealed(msg_type, size, data))
    }

    fn sealed(msg_type: u8, size: u8, data: Vec<u8>) -> Self {
        let mut msg = Self {
            msg_type,
            size,
            hash: 0,
            data: data.into_boxed_slice(),
        };
        msg.hash = msg.calculate_hash();
        msg
    }

    /// XOR of type, size field and every payload byte, byte-swapped.
    /// The stored hash never takes part.
    pub fn calculate_hash(&self) -> u16 {
        let mut acc: u16 = 0;
        acc ^= self.msg_type as u16;
        acc ^= self.size as u16;
        for &byte in self.payload() {
            acc ^= byte as u16;
        }
        acc.swap_bytes()
    }

    /// Recomputes the hash and compares it with the stored one.
    pub fn verify(&self) -> bool {
        self.hash == self.calculate_hash()
    }

    /// Like [`verify`](Self::verify), but reports both hashes on mismatch.
    pub fn check_integrity(&self) -> QueueResult<()> {
        let computed = self.calculate_hash();
        if computed == self.hash {
            Ok(())
        } else {
            Err(QueueError::IntegrityMismatch {
                stored: self.hash,
                computed,
            })
        }
    }

    pub fn msg_type(&self) -> u8 {
        self.msg_type
    }

    pub fn size_field(&self) -> u8 {
        self.size
    }

    pub fn hash(&self) -> u16 {
        self.hash
    }

    pub fn is_marker(&self) -> bool {
        self.msg_type == MARKER_TYPE
    }

    /// Logical payload length in bytes.
    pub fn len(&self) -> usize {
        if self.is_marker() {
            0
        } else {
            self.size as usize + 1
        }
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    pub fn payload(&self) -> &[u8] {
        &self.data[..self.len()]
    }

    /// Mutable access to the payload without re-hashing. Any change shows up
    /// as an integrity mismatch on the next check.
    pub fn payload_mut(&mut self) -> &mut [u8] {
        let len = self.len();
        &mut self.data[..len]
    }

    /// The full stored data area including padding.
    pub fn padded_data(&self) -> &[u8] {
        &self.data
    }
}

fn alloc_data(len: usize) -> QueueResult<Vec<u8>> {
    let mut data: Vec<u8> = Vec::new();
    data.try_reserve_exact(len)
        .map_err(|_| QueueError::AllocationFailure { bytes: len })?;
    data.resize(len, 0);
    Ok(data)
}
