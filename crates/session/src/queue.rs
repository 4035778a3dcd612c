//! Outbound message queue
//!
//! Dumb bounded FIFO storage for commands submitted while the connection is
//! not yet established. The session actor decides routing; this type only
//! holds frames. Past capacity, `enqueue` rejects the new frame with an
//! explicit error instead of growing without bound or silently truncating.

use std::collections::VecDeque;

use codedeck_protocol::OutboundFrame;

use crate::error::SessionError;

#[derive(Debug)]
pub struct OutboundQueue {
    items: VecDeque<OutboundFrame>,
    capacity: usize,
}

impl OutboundQueue {
    pub fn new(capacity: usize) -> Self {
        Self {
            items: VecDeque::new(),
            capacity,
        }
    }

    pub fn enqueue(&mut self, frame: OutboundFrame) -> Result<(), SessionError> {
        if self.items.len() >= self.capacity {
            return Err(SessionError::QueueFull(self.capacity));
        }
        self.items.push_back(frame);
        Ok(())
    }

    /// Take everything in FIFO order, leaving the queue empty.
    pub fn drain(&mut self) -> VecDeque<OutboundFrame> {
        std::mem::take(&mut self.items)
    }

    pub fn len(&self) -> usize {
        self.items.len()
    }

    pub fn is_empty(&self) -> bool {
        self.items.is_empty()
    }
}
