//! Bounded seen-recently cache.
//!
//! A small dedupe guard with an explicit interface (`seen_recently` /
//! `mark_seen`) instead of ad hoc maps scattered through callers. Entries
//! expire after a TTL, and inserts over the capacity sweep expired entries
//! first and evict the oldest ones if the sweep is not enough.

use std::time::{Duration, Instant};

use dashmap::DashMap;

pub struct SeenCache {
    entries: DashMap<String, Instant>,
    ttl: Duration,
    max_entries: usize,
}

impl SeenCache {
    pub fn new(ttl: Duration, max_entries: usize) -> Self {
        Self {
            entries: DashMap::new(),
            ttl,
            max_entries,
        }
    }

    /// Whether the key was marked within the TTL.
    pub fn seen_recently(&self, key: &str) -> bool {
        self.entries
            .get(key)
            .is_some_and(|at| at.elapsed() < self.ttl)
    }

    /// Mark the key as seen now.
    pub fn mark_seen(&self, key: &str) {
        if self.entries.len() >= self.max_entries {
            self.sweep();
        }
        self.entries.insert(key.to_string(), Instant::now());
    }

    /// Current number of tracked keys.
    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    fn sweep(&self) {
        self.entries.retain(|_, at| at.elapsed() < self.ttl);

        // TTL sweep was not enough: evict oldest entries down to capacity.
        if self.entries.len() >= self.max_entries {
            let mut by_age: Vec<(String, Instant)> = self
                .entries
                .iter()
                .map(|e| (e.key().clone(), *e.value()))
                .collect();
            by_age.sort_by_key(|(_, at)| *at);
            let excess = self.entries.len() + 1 - self.max_entries;
            for (key, _) in by_age.into_iter().take(excess) {
                self.entries.remove(&key);
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn mark_then_seen() {
        let cache = SeenCache::new(Duration::from_secs(60), 100);
        assert!(!cache.seen_recently("a"));
        cache.mark_seen("a");
        assert!(cache.seen_recently("a"));
        assert!(!cache.seen_recently("b"));
    }

    #[test]
    fn expired_entries_are_not_seen() {
        let cache = SeenCache::new(Duration::from_millis(10), 100);
        cache.mark_seen("a");
        std::thread::sleep(Duration::from_millis(20));
        assert!(!cache.seen_recently("a"));
    }

    #[test]
    fn capacity_is_bounded() {
        let cache = SeenCache::new(Duration::from_secs(60), 10);
        for i in 0..50 {
            cache.mark_seen(&format!("key{i}"));
        }
        assert!(cache.len() <= 10, "cache grew to {}", cache.len());
        // The most recent key survives eviction.
        assert!(cache.seen_recently("key49"));
    }
}
