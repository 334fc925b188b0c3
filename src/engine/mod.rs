mod availability;
mod conflict;
mod error;
mod mutations;
mod queries;
#[cfg(test)]
mod tests;

pub use availability::{busy_spans, merge_overlapping, subtract_intervals};
pub use conflict::find_conflicts;
pub use error::EngineError;

use std::sync::Arc;

use chrono::Duration;
use dashmap::DashMap;
use tokio::sync::{Mutex, OwnedMutexGuard};
use tracing::{debug, warn};

use crate::cache::SnapshotCache;
use crate::clock::Clock;
use crate::config::Config;
use crate::ledger::UsageLedger;
use crate::limits::max_query_window;
use crate::model::*;
use crate::provider::{timed, CalendarProvider};
use crate::registry::AliasResolver;

/// Coordinator knobs that come from configuration.
#[derive(Debug, Clone, Copy)]
pub struct CoordinatorSettings {
    /// Forward window re-read after every write and by the warmer.
    pub horizon: Duration,
    /// Hold a per-calendar mutex across availability check and insert.
    pub serialize_bookings: bool,
}

impl Default for CoordinatorSettings {
    fn default() -> Self {
        Self {
            horizon: Duration::days(30),
            serialize_bookings: true,
        }
    }
}

impl CoordinatorSettings {
    pub fn from_config(config: &Config) -> Self {
        let defaults = Self::default();
        Self {
            horizon: Duration::from_std(config.warm_horizon)
                .ok()
                .filter(|d| *d > Duration::zero() && *d <= max_query_window())
                .unwrap_or(defaults.horizon),
            serialize_bookings: config.serialize_bookings,
        }
    }
}

/// Owns every booking-path decision: resolves aliases, checks the provider,
/// writes, records usage and heals the cache.
pub struct BookingCoordinator {
    pub(super) provider: Arc<dyn CalendarProvider>,
    pub(super) resolver: Arc<AliasResolver>,
    pub(super) cache: Arc<dyn SnapshotCache>,
    pub(super) ledger: Arc<UsageLedger>,
    pub(super) clock: Arc<dyn Clock>,
    pub(super) settings: CoordinatorSettings,
    /// external id → check+insert lock
    write_locks: DashMap<String, Arc<Mutex<()>>>,
}

impl BookingCoordinator {
    pub fn new(
        provider: Arc<dyn CalendarProvider>,
        resolver: Arc<AliasResolver>,
        cache: Arc<dyn SnapshotCache>,
        ledger: Arc<UsageLedger>,
        clock: Arc<dyn Clock>,
        settings: CoordinatorSettings,
    ) -> Self {
        Self {
            provider,
            resolver,
            cache,
            ledger,
            clock,
            settings,
            write_locks: DashMap::new(),
        }
    }

    pub fn resolver(&self) -> &Arc<AliasResolver> {
        &self.resolver
    }

    pub fn cache(&self) -> &Arc<dyn SnapshotCache> {
        &self.cache
    }

    pub fn ledger(&self) -> &Arc<UsageLedger> {
        &self.ledger
    }

    pub fn settings(&self) -> CoordinatorSettings {
        self.settings
    }

    /// Conflict check straight against the provider. The cache is never
    /// consulted here: a stale snapshot could hide a real booking.
    pub async fn check_availability(&self, external_id: &str, span: Span) -> Result<AvailabilityReport, EngineError> {
        let events = self.provider_list(external_id, span).await?;
        let conflicts = find_conflicts(&events, &span);
        Ok(AvailabilityReport {
            available: conflicts.is_empty(),
            conflicts,
        })
    }

    /// Re-read the forward window from the provider and replace the cache
    /// entry wholesale. Returns the number of active events cached.
    pub async fn refresh_cache(&self, external_id: &str) -> Result<usize, EngineError> {
        let window = Span::forward(self.clock.now(), self.settings.horizon);
        let events = active_only(self.provider_list(external_id, window).await?);
        let count = events.len();
        self.cache.set(external_id, window, events).await;
        debug!("cache refreshed for {external_id}: {count} events");
        Ok(count)
    }

    /// Post-write refresh. A failure leaves no stale entry behind and never
    /// fails the write that triggered it.
    pub(super) async fn heal_cache(&self, alias: &str, external_id: &str) {
        if let Err(e) = self.refresh_cache(external_id).await {
            metrics::counter!(crate::observability::CACHE_REFRESH_FAILURES_TOTAL).increment(1);
            warn!("cache refresh for {alias} ({external_id}) failed: {e}");
            self.cache.invalidate(external_id).await;
        }
    }

    /// Queue a usage row. Failures degrade analytics only.
    pub(super) fn record_usage(&self, action: LedgerAction, alias: &str, span: Span) {
        if let Err(e) = self.ledger.record(LedgerEntry::new(action, alias, span)) {
            metrics::counter!(crate::observability::LEDGER_WRITE_FAILURES_TOTAL).increment(1);
            warn!("ledger {} for {alias} dropped: {e}", action.as_str());
        }
    }

    /// Per-calendar write lock, or `None` when serialization is disabled.
    pub(super) async fn lock_calendar(&self, external_id: &str) -> Option<OwnedMutexGuard<()>> {
        if !self.settings.serialize_bookings {
            return None;
        }
        let lock = self
            .write_locks
            .entry(external_id.to_string())
            .or_default()
            .value()
            .clone();
        Some(lock.lock_owned().await)
    }

    pub(super) fn forget_calendar(&self, external_id: &str) {
        self.write_locks.remove(external_id);
    }

    pub(super) async fn provider_list(&self, external_id: &str, window: Span) -> Result<Vec<Event>, EngineError> {
        let started = std::time::Instant::now();
        let result = self.provider.list_events(external_id, window).await;
        timed("list_events", started, &result);
        Ok(result?)
    }

    pub(super) async fn provider_get(&self, external_id: &str, event_id: &str) -> Result<Event, EngineError> {
        let started = std::time::Instant::now();
        let result = self.provider.get_event(external_id, event_id).await;
        timed("get_event", started, &result);
        Ok(result?)
    }
}
