//! In-flight deduplication via a bounded, time-expiring presence cache.
//!
//! The cache tracks presence only: a recorded hash blocks new submissions
//! sharing it until the in-flight request finishes processing and the worker
//! removes it. The TTL bounds staleness if a worker dies before the removal.

use std::time::{Duration, Instant};

use dashmap::{mapref::entry::Entry, DashMap};

/// Presence cache keyed by the application-supplied message hash.
pub(crate) struct DedupCache {
    entries: DashMap<String, Instant>,
    ttl: Duration,
    capacity: usize,
}

impl DedupCache {
    pub(crate) fn new(capacity: usize, ttl: Duration) -> Self {
        Self {
            entries: DashMap::new(),
            ttl,
            capacity,
        }
    }

    /// Atomically records `hash` unless a live entry already holds it.
    ///
    /// Returns `false` on a duplicate. An expired entry counts as absent and
    /// is refreshed in place.
    pub(crate) fn try_record(&self, hash: &str) -> bool {
        if self.entries.len() >= self.capacity && !self.entries.contains_key(hash) {
            self.make_room();
        }
        match self.entries.entry(hash.to_string()) {
            Entry::Occupied(mut occupied) => {
                if occupied.get().elapsed() < self.ttl {
                    false
                } else {
                    occupied.insert(Instant::now());
                    true
                }
            }
            Entry::Vacant(vacant) => {
                vacant.insert(Instant::now());
                true
            }
        }
    }

    /// Releases `hash`, re-admitting it for future submissions.
    pub(crate) fn remove(&self, hash: &str) {
        self.entries.remove(hash);
    }

    pub(crate) fn len(&self) -> usize {
        self.entries.len()
    }

    /// Drops expired entries, then the oldest live one if still at capacity.
    fn make_room(&self) {
        let ttl = self.ttl;
        self.entries.retain(|_, recorded_at| recorded_at.elapsed() < ttl);
        if self.entries.len() >= self.capacity {
            let oldest = self
                .entries
                .iter()
                .min_by_key(|entry| *entry.value())
                .map(|entry| entry.key().clone());
            if let Some(key) = oldest {
                self.entries.remove(&key);
            }
        }
    }
}
