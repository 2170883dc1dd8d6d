//! Pending queue of admitted but not yet dispatched messages.
//!
//! Ordered by priority (highest first); equal priorities keep admission
//! order via a sequence number.

use std::cmp::Reverse;

use crate::types::BroadcastMessage;

#[derive(Debug, Default)]
pub(crate) struct PendingQueue {
    items: Vec<(u64, BroadcastMessage)>,
    next_seq: u64,
}

impl PendingQueue {
    pub(crate) fn new() -> Self {
        Self::default()
    }

    /// Append and re-sort the whole queue.
    pub(crate) fn push(&mut self, message: BroadcastMessage) {
        let seq = self.next_seq;
        self.next_seq += 1;
        self.items.push((seq, message));
        self.items
            .sort_by_key(|(seq, msg)| (Reverse(msg.priority), *seq));
    }

    /// Remove the head (highest priority, earliest admitted).
    pub(crate) fn pop(&mut self) -> Option<BroadcastMessage> {
        if self.items.is_empty() {
            None
        } else {
            Some(self.items.remove(0).1)
        }
    }

    pub(crate) fn len(&self) -> usize {
        self.items.len()
    }

    #[cfg(test)]
    pub(crate) fn is_empty(&self) -> bool {
        self.items.is_empty()
    }
}
