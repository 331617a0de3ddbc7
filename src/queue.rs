//! FIFO of encoded buffers waiting to be played.

use alloc::collections::VecDeque;
use alloc::vec::Vec;

/// Pending encoded buffers, oldest first.
///
/// There is no capacity limit; memory use grows with whatever callers enqueue.
#[derive(Debug, Default, Clone)]
pub struct BufferQueue {
    buffers: VecDeque<Vec<u8>>,
}

impl BufferQueue {
    pub fn new() -> Self {
        Self::default()
    }

    /// Append a buffer to the back.
    pub fn enqueue(&mut self, buffer: Vec<u8>) {
        self.buffers.push_back(buffer);
    }

    /// Remove and return the front buffer. Never blocks.
    pub fn dequeue(&mut self) -> Option<Vec<u8>> {
        self.buffers.pop_front()
    }

    /// Discard every pending buffer and return how many were dropped.
    pub fn clear(&mut self) -> usize {
        let discarded = self.buffers.len();
        self.buffers.clear();
        discarded
    }

    #[must_use]
    pub fn len(&self) -> usize {
        self.buffers.len()
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.buffers.is_empty()
    }
}
