use std::collections::VecDeque;

use crate::protocol::MessageKind;

/// A serialized outbound frame waiting for the transport to open
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct QueuedFrame {
    pub kind: MessageKind,
    pub frame: String,
}

impl QueuedFrame {
    pub fn new(kind: MessageKind, frame: String) -> Self {
        Self { kind, frame }
    }
}

/// Unbounded in-memory FIFO of frames accumulated while disconnected. Frames
/// leave only through [`OutboundQueue::drain`], oldest first.
#[derive(Debug, Default)]
pub struct OutboundQueue {
    frames: VecDeque<QueuedFrame>,
}

impl OutboundQueue {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn push(&mut self, frame: QueuedFrame) {
        self.frames.push_back(frame);
    }

    pub fn drain(&mut self) -> Vec<QueuedFrame> {
        self.frames.drain(..).collect()
    }

    pub fn len(&self) -> usize {
        self.frames.len()
    }

    pub fn is_empty(&self) -> bool {
        self.frames.is_empty()
    }
}
