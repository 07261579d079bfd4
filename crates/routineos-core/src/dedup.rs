//! Occurrence deduplication with a trailing TTL.

use chrono::{DateTime, Duration, Utc};
use dashmap::DashMap;
use dashmap::mapref::entry::Entry;
use tracing::debug;

/// Tracks which occurrences have already triggered a notification.
///
/// Process-local and ephemeral: a restart forgets everything. The TTL
/// window bounds how long an occurrence stays suppressed.
pub struct DedupStore {
    entries: DashMap<String, DateTime<Utc>>,
    ttl: Duration,
}

/// Reference suppression window: 10 minutes.
pub const DEFAULT_TTL_SECS: i64 = 600;

impl DedupStore {
    /// Create a store with the given TTL in seconds.
    pub fn new(ttl_secs: i64) -> Self {
        Self {
            entries: DashMap::new(),
            ttl: Duration::seconds(ttl_secs),
        }
    }

    /// Check-and-set for one occurrence key.
    ///
    /// Returns true iff no live entry exists for the key, recording `now`
    /// against it in the same map operation. Concurrent calls for the same
    /// key cannot both observe true: the entry lock makes the check and
    /// the write one atomic step.
    pub fn should_notify(&self, key: &str, now: DateTime<Utc>) -> bool {
        match self.entries.entry(key.to_string()) {
            Entry::Vacant(slot) => {
                slot.insert(now);
                true
            }
            Entry::Occupied(mut slot) => {
                if now - *slot.get() >= self.ttl {
                    slot.insert(now);
                    true
                } else {
                    debug!(key, "occurrence suppressed by dedup");
                    false
                }
            }
        }
    }

    /// Drop all entries whose TTL has lapsed.
    ///
    /// Lookup already ignores expired entries; this just reclaims memory
    /// and is safe to call at any cadence.
    pub fn sweep(&self, now: DateTime<Utc>) {
        self.entries.retain(|_, recorded| now - *recorded < self.ttl);
    }

    /// Number of live and expired entries currently held.
    pub fn len(&self) -> usize {
        self.entries.len()
    }

    /// Whether the store holds no entries.
    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }
}

impl Default for DedupStore {
    fn default() -> Self {
        Self::new(DEFAULT_TTL_SECS)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn at(secs: i64) -> DateTime<Utc> {
        DateTime::<Utc>::from_timestamp(1_736_150_000 + secs, 0).unwrap()
    }

    #[test]
    fn test_first_call_notifies_second_suppressed() {
        let store = DedupStore::new(600);
        assert!(store.should_notify("mon-08:00-Standup", at(0)));
        assert!(!store.should_notify("mon-08:00-Standup", at(5)));
    }

    #[test]
    fn test_notifies_again_after_ttl() {
        let store = DedupStore::new(600);
        assert!(store.should_notify("k", at(0)));
        assert!(!store.should_notify("k", at(599)));
        assert!(store.should_notify("k", at(600)));
        // The refreshed entry suppresses again.
        assert!(!store.should_notify("k", at(601)));
    }

    #[test]
    fn test_keys_are_independent() {
        let store = DedupStore::new(600);
        assert!(store.should_notify("a", at(0)));
        assert!(store.should_notify("b", at(0)));
        assert!(!store.should_notify("a", at(1)));
    }

    #[test]
    fn test_sweep_removes_only_expired() {
        let store = DedupStore::new(600);
        store.should_notify("old", at(0));
        store.should_notify("fresh", at(500));
        store.sweep(at(650));
        assert_eq!(store.len(), 1);
        // "old" was swept, so it may notify again.
        assert!(store.should_notify("old", at(651)));
        assert!(!store.should_notify("fresh", at(651)));
    }

    #[test]
    fn test_concurrent_same_key_single_winner() {
        let store = std::sync::Arc::new(DedupStore::new(600));
        let now = at(0);
        let handles: Vec<_> = (0..16)
            .map(|_| {
                let store = store.clone();
                std::thread::spawn(move || store.should_notify("contended", now))
            })
            .collect();
        let wins = handles
            .into_iter()
            .map(|h| h.join().unwrap())
            .filter(|won| *won)
            .count();
        assert_eq!(wins, 1);
    }
}
