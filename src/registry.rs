//! Alias registry: the administrator-maintained mapping from human room
//! aliases to provider calendar ids, plus the short-TTL resolver in front of it.

use std::collections::HashMap;
use std::sync::Arc;
use std::sync::atomic::{AtomicU64, Ordering};

use async_trait::async_trait;
use chrono::Duration;
use dashmap::DashMap;
use thiserror::Error;
use tokio::sync::RwLock;
use tracing::debug;

use crate::clock::Clock;
use crate::engine::EngineError;
use crate::model::{CalendarAlias, Instant};

#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum StoreError {
    #[error("no calendar with alias {0}")]
    NotFound(String),
    #[error("alias {0} already in use")]
    AlreadyExists(String),
    #[error("{0}")]
    Backend(String),
}

/// CRUD over registered calendars. Backed by a relational store in production.
#[async_trait]
pub trait AliasStore: Send + Sync {
    /// Every calendar, active or not, in registration order.
    async fn list(&self) -> Result<Vec<CalendarAlias>, StoreError>;

    async fn get(&self, alias: &str) -> Result<Option<CalendarAlias>, StoreError>;

    /// Register a calendar; the store assigns `seq`.
    async fn insert(&self, calendar: CalendarAlias) -> Result<CalendarAlias, StoreError>;

    /// Replace the record currently stored under `alias`. `calendar.alias` may differ (rename).
    async fn update(&self, alias: &str, calendar: CalendarAlias) -> Result<(), StoreError>;

    async fn remove(&self, alias: &str) -> Result<CalendarAlias, StoreError>;
}

pub struct InMemoryAliasStore {
    calendars: DashMap<String, CalendarAlias>,
    next_seq: AtomicU64,
}

impl Default for InMemoryAliasStore {
    fn default() -> Self {
        Self::new()
    }
}

impl InMemoryAliasStore {
    pub fn new() -> Self {
        Self {
            calendars: DashMap::new(),
            next_seq: AtomicU64::new(1),
        }
    }
}

#[async_trait]
impl AliasStore for InMemoryAliasStore {
    async fn list(&self) -> Result<Vec<CalendarAlias>, StoreError> {
        let mut all: Vec<CalendarAlias> = self.calendars.iter().map(|e| e.value().clone()).collect();
        all.sort_by_key(|c| c.seq);
        Ok(all)
    }

    async fn get(&self, alias: &str) -> Result<Option<CalendarAlias>, StoreError> {
        Ok(self.calendars.get(alias).map(|e| e.value().clone()))
    }

    async fn insert(&self, mut calendar: CalendarAlias) -> Result<CalendarAlias, StoreError> {
        use dashmap::mapref::entry::Entry;
        match self.calendars.entry(calendar.alias.clone()) {
            Entry::Occupied(_) => Err(StoreError::AlreadyExists(calendar.alias)),
            Entry::Vacant(slot) => {
                calendar.seq = self.next_seq.fetch_add(1, Ordering::Relaxed);
                slot.insert(calendar.clone());
                Ok(calendar)
            }
        }
    }

    async fn update(&self, alias: &str, calendar: CalendarAlias) -> Result<(), StoreError> {
        if !self.calendars.contains_key(alias) {
            return Err(StoreError::NotFound(alias.to_string()));
        }
        if calendar.alias != alias {
            if self.calendars.contains_key(&calendar.alias) {
                return Err(StoreError::AlreadyExists(calendar.alias));
            }
            self.calendars.remove(alias);
        }
        self.calendars.insert(calendar.alias.clone(), calendar);
        Ok(())
    }

    async fn remove(&self, alias: &str) -> Result<CalendarAlias, StoreError> {
        self.calendars
            .remove(alias)
            .map(|(_, c)| c)
            .ok_or_else(|| StoreError::NotFound(alias.to_string()))
    }
}

struct Memo {
    loaded_at: Instant,
    calendars: Arc<Vec<CalendarAlias>>,
}

/// Memoizes the full registry for a short TTL. A miss or expiry reloads
/// synchronously from the store.
pub struct AliasResolver {
    store: Arc<dyn AliasStore>,
    clock: Arc<dyn Clock>,
    ttl: Duration,
    memo: RwLock<Option<Memo>>,
}

impl AliasResolver {
    pub fn new(store: Arc<dyn AliasStore>, clock: Arc<dyn Clock>, ttl: std::time::Duration) -> Self {
        Self {
            store,
            clock,
            ttl: Duration::from_std(ttl).unwrap_or(Duration::seconds(30)),
            memo: RwLock::new(None),
        }
    }

    pub fn store(&self) -> &Arc<dyn AliasStore> {
        &self.store
    }

    /// All calendars in registration order, regardless of `active`.
    pub async fn calendars(&self) -> Result<Arc<Vec<CalendarAlias>>, EngineError> {
        let now = self.clock.now();
        {
            let memo = self.memo.read().await;
            if let Some(m) = memo.as_ref()
                && now - m.loaded_at <= self.ttl
            {
                return Ok(m.calendars.clone());
            }
        }
        let mut memo = self.memo.write().await;
        // Another caller may have reloaded while we waited for the write lock.
        if let Some(m) = memo.as_ref()
            && now - m.loaded_at <= self.ttl
        {
            return Ok(m.calendars.clone());
        }
        let calendars = Arc::new(self.store.list().await?);
        debug!("alias registry reloaded: {} calendars", calendars.len());
        metrics::counter!(crate::observability::ALIAS_RELOADS_TOTAL).increment(1);
        *memo = Some(Memo {
            loaded_at: now,
            calendars: calendars.clone(),
        });
        Ok(calendars)
    }

    /// alias → external id for active calendars (booking surfaces).
    pub async fn resolve(&self) -> Result<HashMap<String, String>, EngineError> {
        Ok(self
            .calendars()
            .await?
            .iter()
            .filter(|c| c.active)
            .map(|c| (c.alias.clone(), c.external_id.clone()))
            .collect())
    }

    /// alias → external id for every calendar (admin surfaces).
    pub async fn resolve_all(&self) -> Result<HashMap<String, String>, EngineError> {
        Ok(self
            .calendars()
            .await?
            .iter()
            .map(|c| (c.alias.clone(), c.external_id.clone()))
            .collect())
    }

    /// External id of an active calendar.
    pub async fn lookup(&self, alias: &str) -> Result<String, EngineError> {
        self.calendars()
            .await?
            .iter()
            .find(|c| c.active && c.alias == alias)
            .map(|c| c.external_id.clone())
            .ok_or_else(|| EngineError::NotFound(format!("calendar {alias}")))
    }

    /// Full record of any calendar, active or not.
    pub async fn lookup_any(&self, alias: &str) -> Result<CalendarAlias, EngineError> {
        self.calendars()
            .await?
            .iter()
            .find(|c| c.alias == alias)
            .cloned()
            .ok_or_else(|| EngineError::NotFound(format!("calendar {alias}")))
    }

    /// Drop the memo; the next call reloads.
    pub async fn invalidate(&self) {
        *self.memo.write().await = None;
    }
}
