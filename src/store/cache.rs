//! TTL result cache keyed by (subject, provider).
//!
//! Staleness is detected lazily on read; there is no sweeper and entries
//! are never physically removed. `DashMap` shards the map so unrelated keys
//! never contend on one lock.

use chrono::{DateTime, Duration, Utc};
use dashmap::DashMap;
use tracing::debug;

#[derive(Debug, Clone)]
struct CacheEntry<V> {
    payload: V,
    captured_at: DateTime<Utc>,
}

pub struct ResultCache<V> {
    entries: DashMap<(String, String), CacheEntry<V>>,
    ttl: Duration,
}

impl<V: Clone> ResultCache<V> {
    pub fn new(ttl: Duration) -> Self {
        Self {
            entries: DashMap::new(),
            ttl,
        }
    }

    /// TTL in whole seconds, clamped to the largest span chrono accepts.
    pub fn with_ttl_secs(secs: u64) -> Self {
        let max = (i64::MAX / 1_000) as u64;
        Self::new(Duration::seconds(secs.min(max) as i64))
    }

    pub fn ttl(&self) -> Duration {
        self.ttl
    }

    pub fn get(&self, subject: &str, provider: &str) -> Option<V> {
        self.get_at(subject, provider, Utc::now())
    }

    /// Cached payload if `now - captured_at < ttl`.
    pub fn get_at(&self, subject: &str, provider: &str, now: DateTime<Utc>) -> Option<V> {
        let key = (subject.to_string(), provider.to_string());
        let hit = self.entries.get(&key).and_then(|entry| {
            if now - entry.captured_at < self.ttl {
                Some(entry.payload.clone())
            } else {
                None
            }
        });
        debug!(subject, provider, hit = hit.is_some(), "Cache lookup");
        hit
    }

    pub fn put(&self, subject: &str, provider: &str, payload: V) {
        self.put_at(subject, provider, payload, Utc::now());
    }

    /// Overwrites any existing entry for the key (last writer wins).
    pub fn put_at(&self, subject: &str, provider: &str, payload: V, captured_at: DateTime<Utc>) {
        self.entries.insert(
            (subject.to_string(), provider.to_string()),
            CacheEntry {
                payload,
                captured_at,
            },
        );
    }

    /// Entries held, stale ones included.
    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }
}
