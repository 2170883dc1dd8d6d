//! Bounded memory of already-reported occurrences.
//!
//! Two key spaces:
//! - flare ids, remembered for a sliding window (default 48 h)
//! - (rule, tier, calendar day) keys for storms and wind, kept for a few days
//!
//! All ages are measured against snapshot timestamps, never the wall clock,
//! so replaying the same snapshots reproduces the same decisions.

use chrono::{DateTime, Duration, NaiveDate, Utc};
use std::collections::{HashMap, HashSet};

use crate::types::EventSeverity;

/// Rule family that owns a tier/day key.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum TierRule {
    Storm,
    Wind,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
struct TierKey {
    rule: TierRule,
    tier: EventSeverity,
    day: NaiveDate,
}

#[derive(Debug, Clone, Default)]
pub struct DedupMemory {
    /// flare id → timestamp of the snapshot that first reported it
    flares: HashMap<String, DateTime<Utc>>,
    tiers: HashSet<TierKey>,
}

impl DedupMemory {
    pub fn new() -> Self {
        Self::default()
    }

    /// Drop flare ids older than `window` and tier keys older than
    /// `tier_retention_days` relative to `now`.
    pub fn prune(&mut self, now: DateTime<Utc>, window: Duration, tier_retention_days: i64) {
        self.flares.retain(|_, seen| now.signed_duration_since(*seen) <= window);
        let today = now.date_naive();
        self.tiers
            .retain(|k| (today - k.day).num_days() < tier_retention_days);
    }

    /// Record a flare id. Returns `true` the first time the id is seen.
    pub fn first_flare(&mut self, id: &str, seen_at: DateTime<Utc>) -> bool {
        if self.flares.contains_key(id) {
            return false;
        }
        self.flares.insert(id.to_string(), seen_at);
        true
    }

    /// Record a tier/day occurrence. Returns `true` the first time the key is seen.
    pub fn first_tier(&mut self, rule: TierRule, tier: EventSeverity, at: DateTime<Utc>) -> bool {
        self.tiers.insert(TierKey {
            rule,
            tier,
            day: at.date_naive(),
        })
    }

    pub fn flare_count(&self) -> usize {
        self.flares.len()
    }

    pub fn tier_count(&self) -> usize {
        self.tiers.len()
    }

    pub fn clear(&mut self) {
        self.flares.clear();
        self.tiers.clear();
    }
}
