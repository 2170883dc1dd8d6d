//! Bounded delivery history.
//!
//! FIFO ring of [`BroadcastHistoryEntry`]. `received_at` is clamped to be
//! non-decreasing, so evicting the front always removes the entry with the
//! smallest `received_at`.

use std::collections::VecDeque;

use chrono::{DateTime, Utc};

use crate::types::{BroadcastHistoryEntry, BroadcastMessage, BroadcastType};

#[derive(Debug)]
pub(crate) struct BroadcastHistory {
    entries: VecDeque<BroadcastHistoryEntry>,
    capacity: usize,
}

impl BroadcastHistory {
    pub(crate) fn new(capacity: usize) -> Self {
        Self {
            entries: VecDeque::with_capacity(capacity.min(1024)),
            capacity: capacity.max(1),
        }
    }

    /// Record a dispatched message. Returns the entry's `received_at`.
    pub(crate) fn push(&mut self, broadcast: BroadcastMessage, now: DateTime<Utc>) -> DateTime<Utc> {
        let received_at = match self.entries.back() {
            Some(last) if last.received_at > now => last.received_at,
            _ => now,
        };
        while self.entries.len() >= self.capacity {
            self.entries.pop_front();
        }
        self.entries.push_back(BroadcastHistoryEntry {
            broadcast,
            received_at,
            displayed_for: 0,
            user_action: None,
        });
        received_at
    }

    /// Most-recent-first, at most `limit` entries (all when `None`).
    pub(crate) fn recent(&self, limit: Option<usize>) -> Vec<BroadcastHistoryEntry> {
        let take = limit.unwrap_or(self.entries.len());
        self.entries.iter().rev().take(take).cloned().collect()
    }

    /// Most-recent-first messages of one type.
    pub(crate) fn recent_by_type(&self, kind: BroadcastType, limit: usize) -> Vec<BroadcastMessage> {
        self.entries
            .iter()
            .rev()
            .filter(|e| e.broadcast.broadcast_type == kind)
            .take(limit)
            .map(|e| e.broadcast.clone())
            .collect()
    }

    /// Latest entry for a message id.
    pub(crate) fn find_mut(&mut self, id: &str) -> Option<&mut BroadcastHistoryEntry> {
        self.entries.iter_mut().rev().find(|e| e.broadcast.id == id)
    }

    /// Change capacity, evicting the oldest entries if it shrank.
    pub(crate) fn set_capacity(&mut self, capacity: usize) {
        self.capacity = capacity.max(1);
        while self.entries.len() > self.capacity {
            self.entries.pop_front();
        }
    }

    pub(crate) fn clear(&mut self) {
        self.entries.clear();
    }

    pub(crate) fn len(&self) -> usize {
        self.entries.len()
    }

    pub(crate) fn capacity(&self) -> usize {
        self.capacity
    }
}
