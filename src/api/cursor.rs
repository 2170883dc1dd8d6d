//! Per-client poll cursors.
//!
//! Each client id maps to the server time of its last poll. Updates are
//! keyed, so concurrent polls from different clients never contend on a
//! shared lock. The registry is bounded: once it grows past
//! `max_clients`, idle cursors are purged first, then the least recently
//! polled ones. An evicted client simply falls back to its `since`
//! parameter on the next poll.

use chrono::{DateTime, Duration, Utc};
use dashmap::DashMap;
use tracing::debug;

#[derive(Debug)]
pub struct CursorRegistry {
    cursors: DashMap<String, DateTime<Utc>>,
    max_clients: usize,
    idle_timeout: Duration,
}

impl CursorRegistry {
    pub fn new(max_clients: usize, idle_timeout_secs: u64) -> Self {
        Self {
            cursors: DashMap::new(),
            max_clients: max_clients.max(1),
            idle_timeout: i64::try_from(idle_timeout_secs)
                .ok()
                .and_then(Duration::try_seconds)
                .unwrap_or(Duration::MAX),
        }
    }

    /// Last poll time recorded for `client_id`.
    pub fn get(&self, client_id: &str) -> Option<DateTime<Utc>> {
        self.cursors.get(client_id).map(|entry| *entry.value())
    }

    /// Record a poll at `now`, evicting other clients if over capacity.
    pub fn advance(&self, client_id: &str, now: DateTime<Utc>) {
        self.cursors.insert(client_id.to_string(), now);
        if self.cursors.len() > self.max_clients {
            self.evict(client_id, now);
        }
    }

    fn evict(&self, keep: &str, now: DateTime<Utc>) {
        let before = self.cursors.len();
        self.cursors
            .retain(|id, seen| id == keep || now.signed_duration_since(*seen) <= self.idle_timeout);

        let overflow = self.cursors.len().saturating_sub(self.max_clients);
        if overflow > 0 {
            let mut by_age: Vec<(String, DateTime<Utc>)> = self
                .cursors
                .iter()
                .filter(|entry| entry.key() != keep)
                .map(|entry| (entry.key().clone(), *entry.value()))
                .collect();
            by_age.sort_by_key(|(_, seen)| *seen);
            for (id, _) in by_age.into_iter().take(overflow) {
                self.cursors.remove(&id);
            }
        }

        debug!(
            evicted = before.saturating_sub(self.cursors.len()),
            tracked = self.cursors.len(),
            "Poll cursors evicted"
        );
    }

    pub fn len(&self) -> usize {
        self.cursors.len()
    }

    pub fn is_empty(&self) -> bool {
        self.cursors.is_empty()
    }
}
