//! Response cache keyed by (source id, normalized sub-query text, seeds)
//!
//! Seeds are part of the key because sources may answer on seed ids as well
//! as on text.
//!
//! Only successful outcomes (`Fragment` or `Empty`) are cached so a transient
//! outage is retried on the next request. Entries expire after a TTL and the
//! oldest entry is evicted once the capacity is reached.

use super::types::{SourceOutcome, SubQuery};
use dashmap::DashMap;
use serde::Serialize;
use std::sync::atomic::{AtomicU64, Ordering};
use std::time::Duration;
use tokio::time::Instant;

#[derive(Debug, Clone, PartialEq, Eq, Hash)]
struct CacheKey {
    source_id: String,
    text: String,
    seeds: Vec<String>,
}

impl CacheKey {
    fn new(source_id: &str, query: &SubQuery) -> Self {
        Self {
            source_id: source_id.to_string(),
            text: query.normalized_text(),
            seeds: query.seeds.iter().map(|s| s.as_str().to_string()).collect(),
        }
    }
}

#[derive(Debug, Clone)]
struct CacheEntry {
    outcome: SourceOutcome,
    stored_at: Instant,
}

impl CacheEntry {
    fn is_expired(&self, ttl: Duration) -> bool {
        self.stored_at.elapsed() >= ttl
    }
}

/// Counters reported alongside diagnostics.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
pub struct CacheStats {
    pub hits: u64,
    pub misses: u64,
    pub expired: u64,
    pub evicted: u64,
    pub entries: usize,
}

/// Thread-safe TTL cache shared by every aggregation of an explorer.
pub struct ResponseCache {
    entries: DashMap<CacheKey, CacheEntry>,
    ttl: Duration,
    max_entries: usize,
    hits: AtomicU64,
    misses: AtomicU64,
    expired: AtomicU64,
    evicted: AtomicU64,
}

impl ResponseCache {
    pub fn new(ttl: Duration, max_entries: usize) -> Self {
        Self {
            entries: DashMap::new(),
            ttl,
            max_entries: max_entries.max(1),
            hits: AtomicU64::new(0),
            misses: AtomicU64::new(0),
            expired: AtomicU64::new(0),
            evicted: AtomicU64::new(0),
        }
    }

    /// Look up a cached outcome. Expired entries are removed on read.
    pub fn get(&self, source_id: &str, query: &SubQuery) -> Option<SourceOutcome> {
        let key = CacheKey::new(source_id, query);

        // The read guard must be released before `remove_if` touches the shard.
        let fresh = self
            .entries
            .get(&key)
            .and_then(|entry| (!entry.is_expired(self.ttl)).then(|| entry.outcome.clone()));

        if let Some(outcome) = fresh {
            self.hits.fetch_add(1, Ordering::Relaxed);
            return Some(outcome);
        }

        if self
            .entries
            .remove_if(&key, |_, entry| entry.is_expired(self.ttl))
            .is_some()
        {
            self.expired.fetch_add(1, Ordering::Relaxed);
        }
        self.misses.fetch_add(1, Ordering::Relaxed);
        None
    }

    /// Store an outcome. Failed outcomes are ignored; returns whether the
    /// outcome was stored.
    pub fn put(&self, source_id: &str, query: &SubQuery, outcome: &SourceOutcome) -> bool {
        if outcome.is_failed() {
            return false;
        }
        let key = CacheKey::new(source_id, query);
        let replacing = self.entries.contains_key(&key);
        if !replacing && self.entries.len() >= self.max_entries {
            self.evict_oldest();
        }
        self.entries.insert(
            key,
            CacheEntry {
                outcome: outcome.clone(),
                stored_at: Instant::now(),
            },
        );
        true
    }

    fn evict_oldest(&self) {
        let oldest = self
            .entries
            .iter()
            .min_by_key(|entry| entry.value().stored_at)
            .map(|entry| entry.key().clone());
        if let Some(key) = oldest {
            if self.entries.remove(&key).is_some() {
                self.evicted.fetch_add(1, Ordering::Relaxed);
            }
        }
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    pub fn clear(&self) {
        self.entries.clear();
    }

    pub fn stats(&self) -> CacheStats {
        CacheStats {
            hits: self.hits.load(Ordering::Relaxed),
            misses: self.misses.load(Ordering::Relaxed),
            expired: self.expired.load(Ordering::Relaxed),
            evicted: self.evicted.load(Ordering::Relaxed),
            entries: self.entries.len(),
        }
    }
}
