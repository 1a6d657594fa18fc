//! Carry-over store for partial frames.
//!
//! Bytes that could not be resolved into a frame wait here, in arrival order,
//! until the next delivery. No decoding happens in this module.

use crate::domain::error::{BridgeError, BridgeResult};
use heapless::Deque;
use tracing::warn;

/// Default capacity, enough for the largest frame plus a partial one.
pub const REASSEMBLY_CAPACITY: usize = 512;

pub struct ReassemblyBuffer<const N: usize = REASSEMBLY_CAPACITY> {
    bytes: Deque<u8, N>,
}

impl<const N: usize> ReassemblyBuffer<N> {
    pub fn new() -> Self {
        Self {
            bytes: Deque::new(),
        }
    }

    /// Append `bytes` after everything already buffered.
    ///
    /// If they do not all fit, nothing is appended, the buffer is reset and
    /// [`BridgeError::BufferOverflow`] is returned.
    pub fn ingest(&mut self, bytes: &[u8]) -> BridgeResult {
        if bytes.len() > N - self.bytes.len() {
            warn!(
                "Reassembly buffer overflow: {} buffered + {} incoming > {}, dropping buffer",
                self.bytes.len(),
                bytes.len(),
                N
            );
            self.reset();
            return Err(BridgeError::BufferOverflow { capacity: N });
        }

        for &b in bytes {
            // Capacity was checked above
            let _ = self.bytes.push_back(b);
        }
        Ok(())
    }

    /// Oldest buffered byte, or `None` when empty.
    pub fn drain_one(&mut self) -> Option<u8> {
        self.bytes.pop_front()
    }

    pub fn reset(&mut self) {
        self.bytes.clear();
    }

    pub fn len(&self) -> usize {
        self.bytes.len()
    }

    pub fn is_empty(&self) -> bool {
        self.bytes.is_empty()
    }
}

impl<const N: usize> Default for ReassemblyBuffer<N> {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_drain_in_arrival_order() {
        let mut buffer: ReassemblyBuffer<8> = ReassemblyBuffer::new();
        buffer.ingest(&[1, 2, 3]).unwrap();
        buffer.ingest(&[4]).unwrap();

        let drained: Vec<u8> = std::iter::from_fn(|| buffer.drain_one()).collect();

        assert_eq!(drained, vec![1, 2, 3, 4]);
        assert!(buffer.is_empty());
        assert_eq!(buffer.drain_one(), None);
    }

    #[test]
    fn test_fill_to_capacity() {
        let mut buffer: ReassemblyBuffer<4> = ReassemblyBuffer::new();
        buffer.ingest(&[1, 2]).unwrap();
        buffer.ingest(&[3, 4]).unwrap();
        assert_eq!(buffer.len(), 4);
    }

    #[test]
    fn test_overflow_resets() {
        let mut buffer: ReassemblyBuffer<4> = ReassemblyBuffer::new();
        buffer.ingest(&[1, 2, 3]).unwrap();

        let result = buffer.ingest(&[4, 5]);

        assert_eq!(result, Err(BridgeError::BufferOverflow { capacity: 4 }));
        assert!(buffer.is_empty());

        // Usable again after the reset
        buffer.ingest(&[9]).unwrap();
        assert_eq!(buffer.drain_one(), Some(9));
    }

    #[test]
    fn test_wraps_around() {
        let mut buffer: ReassemblyBuffer<4> = ReassemblyBuffer::new();
        for round in 0..5u8 {
            buffer.ingest(&[round, round + 1, round + 2]).unwrap();
            assert_eq!(buffer.drain_one(), Some(round));
            assert_eq!(buffer.drain_one(), Some(round + 1));
            assert_eq!(buffer.drain_one(), Some(round + 2));
        }
        assert!(buffer.is_empty());
    }
}
