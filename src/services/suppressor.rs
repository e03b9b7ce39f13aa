//! Short-term memory of user rejections.
//!
//! When the user skips a recommendation, signals with the same
//! (strategy, regime, side) context are gated for the TTL. Accepting a
//! recommendation clears the matching gate immediately.

use std::collections::HashMap;

use chrono::{DateTime, Duration as ChronoDuration, Utc};

use crate::meta::regime::Regime;
use crate::strategies::SignalKind;

#[derive(Clone, Debug, PartialEq, Eq, Hash)]
pub struct SuppressionKey {
    pub strategy: String,
    pub regime: Regime,
    pub side: SignalKind,
}

#[derive(Clone, Debug)]
pub struct SuppressionEntry {
    pub until: DateTime<Utc>,
    pub count: u32,
}

pub struct SignalSuppressor {
    ttl: ChronoDuration,
    entries: HashMap<SuppressionKey, SuppressionEntry>,
}

impl SignalSuppressor {
    pub fn new(ttl: std::time::Duration) -> Self {
        Self {
            ttl: ChronoDuration::from_std(ttl).unwrap_or_else(|_| ChronoDuration::minutes(15)),
            entries: HashMap::new(),
        }
    }

    /// True when no unexpired suppression matches the key. A key stays
    /// suppressed through the full TTL and releases the instant after.
    pub fn should_emit(&self, key: &SuppressionKey, now: DateTime<Utc>) -> bool {
        match self.entries.get(key) {
            Some(entry) => now > entry.until,
            None => true,
        }
    }

    /// Record the user's verdict. A rejection (re)arms the gate for the
    /// TTL; an acceptance clears it.
    pub fn record_decision(&mut self, key: SuppressionKey, accepted: bool, now: DateTime<Utc>) {
        if accepted {
            self.entries.remove(&key);
        } else {
            let until = now + self.ttl;
            let entry = self
                .entries
                .entry(key)
                .or_insert(SuppressionEntry { until, count: 0 });
            entry.until = until;
            entry.count += 1;
        }
    }

    /// Drop expired entries.
    pub fn tick(&mut self, now: DateTime<Utc>) {
        self.entries.retain(|_, entry| now <= entry.until);
    }

    pub fn active(&self) -> usize {
        self.entries.len()
    }
}
