// ABOUTME: Outbound message queue for frames issued while disconnected
// ABOUTME: Unbounded FIFO of encoded frames, drained in insertion order on open

use std::collections::VecDeque;

/// Pending outbound frames
///
/// Frames are stored already encoded. Growth is unbounded.
#[derive(Debug, Default)]
pub(crate) struct OutboundQueue {
    frames: VecDeque<String>,
}

impl OutboundQueue {
    pub(crate) fn new() -> Self {
        Self::default()
    }

    pub(crate) fn push(&mut self, frame: String) {
        self.frames.push_back(frame);
    }

    pub(crate) fn pop(&mut self) -> Option<String> {
        self.frames.pop_front()
    }

    pub(crate) fn len(&self) -> usize {
        self.frames.len()
    }

    pub(crate) fn is_empty(&self) -> bool {
        self.frames.is_empty()
    }
}
