//! Per-calendar snapshot cache.
//!
//! Entries are replaced wholesale, never patched, so every entry reflects one
//! consistent provider read. Expiry is logical: an entry older than the TTL
//! reads as absent but is not evicted.

use std::sync::Arc;

use async_trait::async_trait;
use chrono::Duration;
use dashmap::DashMap;

use crate::clock::Clock;
use crate::model::{Event, Instant, Span};

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CacheEntry {
    pub events: Vec<Event>,
    pub fetched_at: Instant,
    /// Provider window this snapshot was read for.
    pub window: Span,
}

impl CacheEntry {
    /// Whether reads for `query` can be answered from this snapshot alone.
    pub fn covers(&self, query: &Span) -> bool {
        self.window.contains_span(query)
    }
}

/// Key-value seam for snapshots keyed by provider calendar id.
#[async_trait]
pub trait SnapshotCache: Send + Sync {
    /// Absent if missing or older than the TTL.
    async fn get(&self, external_id: &str) -> Option<CacheEntry>;

    /// Unconditionally overwrite with a fresh snapshot stamped now.
    async fn set(&self, external_id: &str, window: Span, events: Vec<Event>);

    async fn invalidate(&self, external_id: &str);
}

pub struct EventCache {
    entries: DashMap<String, CacheEntry>,
    ttl: Duration,
    clock: Arc<dyn Clock>,
}

impl EventCache {
    pub fn new(ttl: std::time::Duration, clock: Arc<dyn Clock>) -> Self {
        Self {
            entries: DashMap::new(),
            ttl: Duration::from_std(ttl).unwrap_or(Duration::hours(1)),
            clock,
        }
    }

    pub fn ttl(&self) -> Duration {
        self.ttl
    }

    /// Freshness check against an explicit instant.
    pub fn get_at(&self, external_id: &str, now: Instant) -> Option<CacheEntry> {
        let entry = self.entries.get(external_id)?;
        if now - entry.fetched_at > self.ttl {
            return None;
        }
        Some(entry.value().clone())
    }

    /// Number of stored entries, expired ones included.
    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }
}

#[async_trait]
impl SnapshotCache for EventCache {
    async fn get(&self, external_id: &str) -> Option<CacheEntry> {
        let hit = self.get_at(external_id, self.clock.now());
        if hit.is_some() {
            metrics::counter!(crate::observability::CACHE_HITS_TOTAL).increment(1);
        } else {
            metrics::counter!(crate::observability::CACHE_MISSES_TOTAL).increment(1);
        }
        hit
    }

    async fn set(&self, external_id: &str, window: Span, events: Vec<Event>) {
        let entry = CacheEntry {
            events,
            fetched_at: self.clock.now(),
            window,
        };
        self.entries.insert(external_id.to_string(), entry);
    }

    async fn invalidate(&self, external_id: &str) {
        self.entries.remove(external_id);
    }
}
