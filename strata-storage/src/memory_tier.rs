//! Bounded in-process tier.
//!
//! Eviction is strictly first-in-first-out: when the tier is full, the entry
//! inserted earliest is dropped, no matter how recently it was read.
//! Replacing an existing key keeps its original slot in the queue.

use std::collections::{HashMap, VecDeque};

use chrono::{DateTime, Utc};
use strata_core::CacheEntry;

/// Process-local store holding at most `max_size` entries.
#[derive(Debug)]
pub struct MemoryTier {
    max_size: usize,
    entries: HashMap<String, CacheEntry>,
    /// Keys in insertion order; always the same key set as `entries`.
    order: VecDeque<String>,
}

impl MemoryTier {
    /// Create an empty tier. A zero bound is raised to one.
    pub fn new(max_size: usize) -> Self {
        Self {
            max_size: max_size.max(1),
            entries: HashMap::new(),
            order: VecDeque::new(),
        }
    }

    pub fn max_size(&self) -> usize {
        self.max_size
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    /// Insert or fully replace an entry.
    ///
    /// Returns the key evicted to make room, if any.
    pub fn put(&mut self, entry: CacheEntry) -> Option<String> {
        if let Some(existing) = self.entries.get_mut(&entry.key) {
            *existing = entry;
            return None;
        }

        let evicted = if self.entries.len() >= self.max_size {
            self.evict_oldest()
        } else {
            None
        };

        self.order.push_back(entry.key.clone());
        self.entries.insert(entry.key.clone(), entry);
        evicted
    }

    /// Look up a readable entry, dropping it if it has expired.
    pub fn get(&mut self, key: &str, now: DateTime<Utc>) -> Option<&CacheEntry> {
        let readable = self.entries.get(key)?.is_readable(now);
        if !readable {
            self.remove(key);
            return None;
        }
        self.entries.get(key)
    }

    pub fn contains_key(&self, key: &str) -> bool {
        self.entries.contains_key(key)
    }

    pub fn remove(&mut self, key: &str) -> Option<CacheEntry> {
        let removed = self.entries.remove(key)?;
        self.order.retain(|k| k != key);
        Some(removed)
    }

    /// Remove every entry matching `predicate`, returning how many went.
    pub fn remove_where<F>(&mut self, mut predicate: F) -> usize
    where
        F: FnMut(&CacheEntry) -> bool,
    {
        let before = self.entries.len();
        self.entries.retain(|_, entry| !predicate(entry));
        let removed = before - self.entries.len();
        if removed > 0 {
            let entries = &self.entries;
            self.order.retain(|k| entries.contains_key(k));
        }
        removed
    }

    pub fn clear(&mut self) {
        self.entries.clear();
        self.order.clear();
    }

    /// Keys in eviction order, oldest first.
    pub fn keys(&self) -> impl Iterator<Item = &str> {
        self.order.iter().map(String::as_str)
    }

    fn evict_oldest(&mut self) -> Option<String> {
        let oldest = self.order.pop_front()?;
        self.entries.remove(&oldest);
        Some(oldest)
    }
}
