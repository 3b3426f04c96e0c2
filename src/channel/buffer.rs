//! Offline outbound buffer.
//!
//! Holds encoded frames while the channel is not open. Bounded; when full,
//! new frames are rejected and existing frames are kept.

// ============================================================================
// Imports
// ============================================================================

use std::collections::VecDeque;

// ============================================================================
// BufferOutcome
// ============================================================================

/// Result of offering a frame to the buffer.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum BufferOutcome {
    /// Frame queued.
    Buffered,
    /// Buffer at capacity; frame dropped.
    Full,
}

// ============================================================================
// OutboundBuffer
// ============================================================================

/// Bounded FIFO of frames awaiting the next open.
#[derive(Debug, Clone)]
pub struct OutboundBuffer {
    frames: VecDeque<String>,
    capacity: usize,
}

impl OutboundBuffer {
    /// Creates an empty buffer.
    #[must_use]
    pub fn new(capacity: usize) -> Self {
        Self {
            frames: VecDeque::with_capacity(capacity),
            capacity,
        }
    }

    /// Appends a frame unless the buffer is full.
    pub fn push(&mut self, frame: String) -> BufferOutcome {
        if self.frames.len() >= self.capacity {
            return BufferOutcome::Full;
        }
        self.frames.push_back(frame);
        BufferOutcome::Buffered
    }

    /// Removes and returns every frame, oldest first.
    pub fn drain(&mut self) -> Vec<String> {
        self.frames.drain(..).collect()
    }

    /// Number of buffered frames.
    #[inline]
    #[must_use]
    pub fn len(&self) -> usize {
        self.frames.len()
    }

    /// Returns `true` when nothing is buffered.
    #[inline]
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.frames.is_empty()
    }

    /// Maximum number of frames held.
    #[inline]
    #[must_use]
    pub const fn capacity(&self) -> usize {
        self.capacity
    }
}

// ============================================================================
// Tests
// ============================================================================

#[cfg(test)]
mod tests {
    use super::*;

    use proptest::prelude::*;

    #[test]
    fn test_rejects_when_full() {
        let mut buffer = OutboundBuffer::new(2);
        assert_eq!(buffer.push("a".into()), BufferOutcome::Buffered);
        assert_eq!(buffer.push("b".into()), BufferOutcome::Buffered);
        assert_eq!(buffer.push("c".into()), BufferOutcome::Full);
        assert_eq!(buffer.drain(), vec!["a".to_string(), "b".to_string()]);
    }

    #[test]
    fn test_drain_empties() {
        let mut buffer = OutboundBuffer::new(4);
        buffer.push("x".into());
        assert_eq!(buffer.len(), 1);
        let _ = buffer.drain();
        assert!(buffer.is_empty());
        assert_eq!(buffer.capacity(), 4);
    }

    proptest! {
        #[test]
        fn prop_keeps_oldest_in_order(count in 0usize..250, capacity in 1usize..120) {
            let mut buffer = OutboundBuffer::new(capacity);
            let mut full = 0;
            for n in 0..count {
                if buffer.push(n.to_string()) == BufferOutcome::Full {
                    full += 1;
                }
            }

            let kept = count.min(capacity);
            let expected: Vec<String> = (0..kept).map(|n| n.to_string()).collect();
            prop_assert_eq!(full, count - kept);
            prop_assert_eq!(buffer.drain(), expected);
        }
    }
}
