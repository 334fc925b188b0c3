use std::io;
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};

use async_trait::async_trait;
use chrono::{Duration, TimeZone, Utc};

use super::*;
use crate::cache::EventCache;
use crate::clock::ManualClock;
use crate::ledger::{LedgerStore, UsageLedger};
use crate::provider::{InMemoryProvider, ProviderError};
use crate::registry::{AliasStore, InMemoryAliasStore};

fn at(day: u32, h: u32, m: u32) -> Instant {
    Utc.with_ymd_and_hms(2025, 3, day, h, m, 0).unwrap()
}

fn span(day: u32, h1: u32, m1: u32, h2: u32, m2: u32) -> Span {
    Span::new(at(day, h1, m1), at(day, h2, m2))
}

fn request(alias: &str, identity: &str, s: Span) -> BookingRequest {
    BookingRequest {
        alias: alias.into(),
        start: Some(s.start),
        end: Some(s.end),
        identity: identity.into(),
        title: None,
    }
}

struct Harness {
    coord: Arc<BookingCoordinator>,
    provider: Arc<InMemoryProvider>,
    cache: Arc<EventCache>,
    clock: Arc<ManualClock>,
    store: Arc<InMemoryAliasStore>,
}

/// C238-1 → ext-1 (active), C238-2 → ext-2 (active), C240 → ext-3 (inactive).
async fn seeded_store(provider: &InMemoryProvider) -> Arc<InMemoryAliasStore> {
    let store = Arc::new(InMemoryAliasStore::new());
    for (alias, ext, active) in [("C238-1", "ext-1", true), ("C238-2", "ext-2", true), ("C240", "ext-3", false)] {
        let mut cal = CalendarAlias::new(alias, ext);
        cal.active = active;
        store.insert(cal).await.unwrap();
        provider.add_calendar(ext);
    }
    store
}

fn build(
    provider: Arc<dyn CalendarProvider>,
    store: Arc<InMemoryAliasStore>,
    ledger: UsageLedger,
    settings: CoordinatorSettings,
) -> (Arc<BookingCoordinator>, Arc<EventCache>, Arc<ManualClock>) {
    let clock = Arc::new(ManualClock::new(at(10, 8, 0)));
    let resolver = Arc::new(AliasResolver::new(store, clock.clone(), std::time::Duration::from_secs(30)));
    let cache = Arc::new(EventCache::new(std::time::Duration::from_secs(3600), clock.clone()));
    let coord = BookingCoordinator::new(
        provider,
        resolver,
        cache.clone(),
        Arc::new(ledger),
        clock.clone(),
        settings,
    );
    (Arc::new(coord), cache, clock)
}

async fn harness_with(provider: InMemoryProvider, settings: CoordinatorSettings) -> Harness {
    let provider = Arc::new(provider);
    let store = seeded_store(&provider).await;
    let (coord, cache, clock) = build(provider.clone(), store.clone(), UsageLedger::in_memory(), settings);
    Harness {
        coord,
        provider,
        cache,
        clock,
        store,
    }
}

async fn harness() -> Harness {
    harness_with(InMemoryProvider::new(), CoordinatorSettings::default()).await
}

async fn ledger_rows(h: &Harness) -> Vec<(LedgerAction, String)> {
    h.coord
        .ledger()
        .entries()
        .await
        .unwrap()
        .into_iter()
        .map(|e| (e.action, e.calendar_alias))
        .collect()
}

/// Ledger store whose writes always fail.
struct DiskFull;

impl LedgerStore for DiskFull {
    fn append_buffered(&mut self, _: &LedgerEntry) -> io::Result<()> {
        Err(io::Error::other("no space left on device"))
    }
    fn flush_sync(&mut self) -> io::Result<()> {
        Ok(())
    }
    fn discard_pending(&mut self) -> io::Result<()> {
        Ok(())
    }
    fn load(&self) -> io::Result<Vec<LedgerEntry>> {
        Ok(Vec::new())
    }
}

/// Provider whose listings start failing once an insert has gone through.
struct ListsFailAfterInsert {
    inner: InMemoryProvider,
    tripped: AtomicBool,
}

#[async_trait]
impl CalendarProvider for ListsFailAfterInsert {
    async fn list_events(&self, calendar_id: &str, window: Span) -> Result<Vec<Event>, ProviderError> {
        if self.tripped.load(Ordering::SeqCst) {
            return Err(ProviderError::Unavailable("backend timeout".into()));
        }
        self.inner.list_events(calendar_id, window).await
    }
    async fn insert_event(&self, calendar_id: &str, event: NewEvent) -> Result<Event, ProviderError> {
        let created = self.inner.insert_event(calendar_id, event).await?;
        self.tripped.store(true, Ordering::SeqCst);
        Ok(created)
    }
    async fn delete_event(&self, calendar_id: &str, event_id: &str) -> Result<(), ProviderError> {
        self.inner.delete_event(calendar_id, event_id).await
    }
    async fn get_event(&self, calendar_id: &str, event_id: &str) -> Result<Event, ProviderError> {
        self.inner.get_event(calendar_id, event_id).await
    }
    async fn create_calendar(&self, summary: &str) -> Result<String, ProviderError> {
        self.inner.create_calendar(summary).await
    }
    async fn delete_calendar(&self, calendar_id: &str) -> Result<(), ProviderError> {
        self.inner.delete_calendar(calendar_id).await
    }
}

// ── Booking ──────────────────────────────────────────────

#[tokio::test]
async fn booking_succeeds_records_and_refreshes_cache() {
    let h = harness().await;
    let slot = span(10, 9, 0, 10, 0);
    let event = h.coord.create_booking(request("C238-1", "alice", slot)).await.unwrap();
    assert_eq!(event.owner, "alice");
    assert_eq!(event.span, slot);
    assert_eq!(event.title, "Reserved");

    let entry = h.cache.get_at("ext-1", h.clock.now()).unwrap();
    assert_eq!(entry.events, vec![event.clone()]);
    assert_eq!(entry.window, Span::forward(h.clock.now(), Duration::days(30)));

    let rows = h.coord.ledger().entries().await.unwrap();
    assert_eq!(rows.len(), 1);
    assert_eq!(rows[0].action, LedgerAction::Created);
    assert_eq!(rows[0].calendar_alias, "C238-1");
    assert_eq!(rows[0].event_start, "2025-03-10T09:00:00.000Z");
    assert_eq!(rows[0].event_end, "2025-03-10T10:00:00.000Z");
}

#[tokio::test]
async fn caller_title_is_kept() {
    let h = harness().await;
    let mut req = request("C238-1", "alice", span(10, 9, 0, 10, 0));
    req.title = Some("Thesis group".into());
    let event = h.coord.create_booking(req).await.unwrap();
    assert_eq!(event.title, "Thesis group");
}

#[tokio::test]
async fn overlapping_booking_is_rejected_with_conflicts() {
    let h = harness().await;
    let alice = h
        .coord
        .create_booking(request("C238-1", "alice", span(10, 9, 0, 10, 0)))
        .await
        .unwrap();
    let err = h
        .coord
        .create_booking(request("C238-1", "bob", span(10, 9, 30, 10, 30)))
        .await
        .unwrap_err();
    match err {
        EngineError::Conflict(conflicts) => {
            assert_eq!(conflicts.len(), 1);
            assert_eq!(conflicts[0].id, alice.id);
        }
        other => panic!("expected conflict, got {other:?}"),
    }
    assert_eq!(ledger_rows(&h).await.len(), 1);
}

#[tokio::test]
async fn touching_bookings_do_not_conflict() {
    let h = harness().await;
    h.coord
        .create_booking(request("C238-1", "alice", span(10, 9, 0, 10, 0)))
        .await
        .unwrap();
    h.coord
        .create_booking(request("C238-1", "bob", span(10, 10, 0, 11, 0)))
        .await
        .unwrap();
    h.coord
        .create_booking(request("C238-1", "carol", span(10, 8, 0, 9, 0)))
        .await
        .unwrap();
    assert_eq!(ledger_rows(&h).await.len(), 3);
}

#[tokio::test]
async fn same_slot_on_another_calendar_is_free() {
    let h = harness().await;
    let slot = span(10, 9, 0, 10, 0);
    h.coord.create_booking(request("C238-1", "alice", slot)).await.unwrap();
    h.coord.create_booking(request("C238-2", "alice", slot)).await.unwrap();
}

#[tokio::test]
async fn invalid_input_never_reaches_provider() {
    let h = harness().await;
    let mut missing_end = request("C238-1", "alice", span(10, 9, 0, 10, 0));
    missing_end.end = None;
    let inverted = BookingRequest {
        alias: "C238-1".into(),
        start: Some(at(10, 10, 0)),
        end: Some(at(10, 9, 0)),
        identity: "alice".into(),
        title: None,
    };
    let anonymous = request("C238-1", "", span(10, 9, 0, 10, 0));

    for req in [missing_end, inverted, anonymous] {
        let err = h.coord.create_booking(req).await.unwrap_err();
        assert_eq!(err.status_code(), 400);
    }
    assert_eq!(h.provider.list_calls(), 0);
}

#[tokio::test]
async fn unknown_or_inactive_alias_is_not_found() {
    let h = harness().await;
    let slot = span(10, 9, 0, 10, 0);
    let unknown = h.coord.create_booking(request("NOPE", "alice", slot)).await;
    assert!(matches!(unknown, Err(EngineError::NotFound(_))));
    let inactive = h.coord.create_booking(request("C240", "alice", slot)).await;
    assert!(matches!(inactive, Err(EngineError::NotFound(_))));
    assert_eq!(h.provider.list_calls(), 0);
}

#[tokio::test]
async fn availability_ignores_a_stale_empty_cache() {
    let h = harness().await;
    let slot = span(10, 9, 0, 10, 0);
    // Booked behind our back: the provider knows, the cache does not.
    let sneaky = h
        .provider
        .insert_event(
            "ext-1",
            NewEvent {
                title: "walk-in".into(),
                owner: "dave".into(),
                span: slot,
            },
        )
        .await
        .unwrap();
    h.cache
        .set("ext-1", Span::forward(h.clock.now(), Duration::days(30)), Vec::new())
        .await;

    let report = h.coord.check_availability("ext-1", slot).await.unwrap();
    assert!(!report.available);
    assert_eq!(report.conflicts[0].id, sneaky.id);

    let err = h.coord.create_booking(request("C238-1", "alice", slot)).await.unwrap_err();
    assert!(matches!(err, EngineError::Conflict(_)));
}

#[tokio::test]
async fn availability_on_empty_calendar() {
    let h = harness().await;
    let report = h.coord.check_availability("ext-2", span(10, 9, 0, 10, 0)).await.unwrap();
    assert!(report.available);
    assert!(report.conflicts.is_empty());
}

#[tokio::test]
async fn provider_failure_passes_message_through() {
    let h = harness().await;
    h.provider.fail_calendar("ext-1", "Rate Limit Exceeded");
    let err = h
        .coord
        .create_booking(request("C238-1", "alice", span(10, 9, 0, 10, 0)))
        .await
        .unwrap_err();
    assert_eq!(err, EngineError::Upstream("Rate Limit Exceeded".into()));
    assert_eq!(err.status_code(), 502);
    assert!(ledger_rows(&h).await.is_empty());
}

#[tokio::test]
async fn ledger_failure_does_not_fail_booking() {
    let provider = Arc::new(InMemoryProvider::new());
    let store = seeded_store(&provider).await;
    let (coord, cache, clock) = build(
        provider,
        store,
        UsageLedger::spawn(DiskFull),
        CoordinatorSettings::default(),
    );
    let slot = span(10, 9, 0, 10, 0);
    let event = coord.create_booking(request("C238-1", "alice", slot)).await.unwrap();
    coord.cancel_booking("C238-1", &event.id, "alice").await.unwrap();
    assert!(coord.ledger().entries().await.unwrap().is_empty());
    assert!(cache.get_at("ext-1", clock.now()).unwrap().events.is_empty());
}

#[tokio::test]
async fn failed_refresh_drops_cache_entry_but_keeps_booking() {
    let inner = InMemoryProvider::new();
    let store = seeded_store(&inner).await;
    let provider = Arc::new(ListsFailAfterInsert {
        inner,
        tripped: AtomicBool::new(false),
    });
    let (coord, cache, clock) = build(
        provider.clone(),
        store,
        UsageLedger::in_memory(),
        CoordinatorSettings::default(),
    );
    cache
        .set("ext-1", Span::forward(clock.now(), Duration::days(30)), Vec::new())
        .await;

    let event = coord
        .create_booking(request("C238-1", "alice", span(10, 9, 0, 10, 0)))
        .await
        .unwrap();
    assert!(cache.get_at("ext-1", clock.now()).is_none());
    assert_eq!(coord.ledger().entries().await.unwrap().len(), 1);
    let stored = provider.inner.get_event("ext-1", &event.id).await.unwrap();
    assert!(stored.is_active());
}

// ── Concurrency ──────────────────────────────────────────

async fn race(serialize_bookings: bool) -> usize {
    let h = harness_with(
        InMemoryProvider::new().with_latency(std::time::Duration::from_millis(20)),
        CoordinatorSettings {
            serialize_bookings,
            ..CoordinatorSettings::default()
        },
    )
    .await;
    let mut handles = Vec::new();
    for i in 0..8 {
        let coord = h.coord.clone();
        handles.push(tokio::spawn(async move {
            let slot = span(10, 9, i, 10, i);
            coord.create_booking(request("C238-1", &format!("user{i}"), slot)).await
        }));
    }
    let mut winners = 0;
    for handle in handles {
        match handle.await.unwrap() {
            Ok(_) => winners += 1,
            Err(EngineError::Conflict(_)) => {}
            Err(other) => panic!("unexpected error: {other:?}"),
        }
    }
    winners
}

#[tokio::test]
async fn serialized_overlapping_bookings_have_one_winner() {
    assert_eq!(race(true).await, 1);
}

#[tokio::test]
async fn unserialized_overlapping_bookings_race() {
    // Every request checks before any insert lands.
    assert!(race(false).await > 1);
}

// ── Cancellation ─────────────────────────────────────────

#[tokio::test]
async fn only_the_owner_may_cancel() {
    let h = harness().await;
    let event = h
        .coord
        .create_booking(request("C238-1", "alice", span(10, 9, 0, 10, 0)))
        .await
        .unwrap();

    let err = h.coord.cancel_booking("C238-1", &event.id, "bob").await.unwrap_err();
    assert!(matches!(err, EngineError::Forbidden(_)));
    assert_eq!(err.status_code(), 403);

    h.coord.cancel_booking("C238-1", &event.id, "alice").await.unwrap();
    let rows = ledger_rows(&h).await;
    assert_eq!(
        rows,
        vec![
            (LedgerAction::Created, "C238-1".to_string()),
            (LedgerAction::Deleted, "C238-1".to_string()),
        ]
    );
    let cached = h.cache.get_at("ext-1", h.clock.now()).unwrap();
    assert!(cached.events.iter().all(|e| e.id != event.id));
}

#[tokio::test]
async fn second_cancel_is_gone_without_ledger_row() {
    let h = harness().await;
    let event = h
        .coord
        .create_booking(request("C238-1", "alice", span(10, 9, 0, 10, 0)))
        .await
        .unwrap();
    h.coord.cancel_booking("C238-1", &event.id, "alice").await.unwrap();
    let err = h.coord.cancel_booking("C238-1", &event.id, "alice").await.unwrap_err();
    assert!(matches!(err, EngineError::Gone(_)));
    assert_eq!(err.status_code(), 410);
    let deleted = ledger_rows(&h)
        .await
        .into_iter()
        .filter(|(a, _)| *a == LedgerAction::Deleted)
        .count();
    assert_eq!(deleted, 1);
}

#[tokio::test]
async fn cancel_unknown_event_is_not_found() {
    let h = harness().await;
    let err = h.coord.cancel_booking("C238-1", "missing", "alice").await.unwrap_err();
    assert!(matches!(err, EngineError::NotFound(_)));
    let err = h.coord.cancel_booking("C238-1", "", "alice").await.unwrap_err();
    assert!(matches!(err, EngineError::InvalidInput(_)));
}

#[tokio::test]
async fn cancelled_slot_can_be_rebooked() {
    let h = harness().await;
    let slot = span(10, 9, 0, 10, 0);
    let event = h.coord.create_booking(request("C238-1", "alice", slot)).await.unwrap();
    h.coord.cancel_booking("C238-1", &event.id, "alice").await.unwrap();
    h.coord.create_booking(request("C238-1", "bob", slot)).await.unwrap();
}

#[tokio::test]
async fn owner_can_cancel_on_deactivated_calendar() {
    let h = harness().await;
    let event = h
        .coord
        .create_booking(request("C238-1", "alice", span(10, 9, 0, 10, 0)))
        .await
        .unwrap();
    h.coord.set_active("C238-1", false).await.unwrap();
    h.coord.cancel_booking("C238-1", &event.id, "alice").await.unwrap();
}

// ── Reads ────────────────────────────────────────────────

#[tokio::test]
async fn list_events_served_from_covering_cache() {
    let h = harness().await;
    h.coord
        .create_booking(request("C238-1", "alice", span(10, 9, 0, 10, 0)))
        .await
        .unwrap();
    let calls = h.provider.list_calls();

    let events = h.coord.list_events("C238-1", span(10, 8, 0, 18, 0)).await.unwrap();
    assert_eq!(events.len(), 1);
    assert_eq!(h.provider.list_calls(), calls);

    let events = h.coord.list_events("C238-1", span(10, 12, 0, 18, 0)).await.unwrap();
    assert!(events.is_empty());
    assert_eq!(h.provider.list_calls(), calls);
}

#[tokio::test]
async fn list_events_outside_cached_window_reads_provider() {
    let h = harness().await;
    h.coord.refresh_cache("ext-1").await.unwrap();
    let calls = h.provider.list_calls();
    // Starts before the cached window.
    h.coord.list_events("C238-1", span(10, 6, 0, 9, 0)).await.unwrap();
    assert_eq!(h.provider.list_calls(), calls + 1);
}

#[tokio::test]
async fn expired_cache_reads_provider_without_rewriting() {
    let h = harness().await;
    h.coord.refresh_cache("ext-1").await.unwrap();
    h.clock.advance(Duration::minutes(61));
    let calls = h.provider.list_calls();
    h.coord.list_events("C238-1", span(10, 10, 0, 11, 0)).await.unwrap();
    assert_eq!(h.provider.list_calls(), calls + 1);
    assert!(h.cache.get_at("ext-1", h.clock.now()).is_none());
}

#[tokio::test]
async fn list_events_hides_cancelled() {
    let h = harness().await;
    let keep = h
        .coord
        .create_booking(request("C238-1", "alice", span(10, 9, 0, 10, 0)))
        .await
        .unwrap();
    let gone = h
        .coord
        .create_booking(request("C238-1", "alice", span(10, 11, 0, 12, 0)))
        .await
        .unwrap();
    h.coord.cancel_booking("C238-1", &gone.id, "alice").await.unwrap();
    h.cache.invalidate("ext-1").await;

    let events = h.coord.list_events("C238-1", span(10, 8, 0, 18, 0)).await.unwrap();
    let ids: Vec<_> = events.into_iter().map(|e| e.id).collect();
    assert_eq!(ids, vec![keep.id]);
}

#[tokio::test]
async fn overly_wide_window_is_rejected() {
    let h = harness().await;
    let window = Span::new(at(10, 0, 0), at(10, 0, 0) + Duration::days(400));
    let err = h.coord.list_events("C238-1", window).await.unwrap_err();
    assert!(matches!(err, EngineError::InvalidInput(_)));
}

#[tokio::test]
async fn get_booking_is_owner_only() {
    let h = harness().await;
    let event = h
        .coord
        .create_booking(request("C238-2", "alice", span(10, 9, 0, 10, 0)))
        .await
        .unwrap();
    let info = h.coord.get_booking("C238-2", &event.id, "alice").await.unwrap();
    assert_eq!(info.alias, "C238-2");
    assert_eq!(info.event, event);

    let err = h.coord.get_booking("C238-2", &event.id, "bob").await.unwrap_err();
    assert!(matches!(err, EngineError::Forbidden(_)));

    h.coord.cancel_booking("C238-2", &event.id, "alice").await.unwrap();
    let err = h.coord.get_booking("C238-2", &event.id, "alice").await.unwrap_err();
    assert!(matches!(err, EngineError::Gone(_)));
}

#[tokio::test]
async fn user_bookings_span_calendars_in_start_order() {
    let h = harness().await;
    h.coord
        .create_booking(request("C238-2", "alice", span(10, 14, 0, 15, 0)))
        .await
        .unwrap();
    h.coord
        .create_booking(request("C238-1", "alice", span(10, 9, 0, 10, 0)))
        .await
        .unwrap();
    h.coord
        .create_booking(request("C238-1", "bob", span(10, 11, 0, 12, 0)))
        .await
        .unwrap();

    let mine = h.coord.user_bookings("alice", span(10, 0, 0, 23, 0)).await.unwrap();
    let labels: Vec<_> = mine.iter().map(|b| (b.alias.as_str(), b.event.span.start)).collect();
    assert_eq!(labels, vec![("C238-1", at(10, 9, 0)), ("C238-2", at(10, 14, 0))]);
}

#[tokio::test]
async fn busy_merges_and_skips_unknown_aliases() {
    let h = harness().await;
    h.coord
        .create_booking(request("C238-1", "alice", span(10, 9, 0, 10, 0)))
        .await
        .unwrap();
    h.coord
        .create_booking(request("C238-1", "bob", span(10, 10, 0, 11, 0)))
        .await
        .unwrap();

    let window = span(10, 8, 0, 18, 0);
    let aliases = vec!["C238-1".to_string(), "NOPE".to_string(), "C238-2".to_string()];
    let busy = h.coord.busy(&aliases, window).await.unwrap();
    assert_eq!(busy.len(), 2);
    assert_eq!(busy[0].alias, "C238-1");
    assert_eq!(busy[0].busy, vec![span(10, 9, 0, 11, 0)]);
    assert_eq!(busy[1].alias, "C238-2");
    assert!(busy[1].busy.is_empty());

    let err = h.coord.busy(&["NOPE".to_string()], window).await.unwrap_err();
    assert!(matches!(err, EngineError::InvalidInput(_)));
}

#[tokio::test]
async fn free_slots_subtract_bookings() {
    let h = harness().await;
    h.coord
        .create_booking(request("C238-1", "alice", span(10, 9, 0, 10, 0)))
        .await
        .unwrap();
    h.coord
        .create_booking(request("C238-1", "bob", span(10, 12, 0, 13, 30)))
        .await
        .unwrap();
    let free = h.coord.free_slots("C238-1", span(10, 8, 0, 18, 0)).await.unwrap();
    assert_eq!(
        free,
        vec![span(10, 8, 0, 9, 0), span(10, 10, 0, 12, 0), span(10, 13, 30, 18, 0)]
    );
}

// ── Administration ───────────────────────────────────────

#[tokio::test]
async fn new_calendar_starts_inactive() {
    let h = harness().await;
    let cal = h.coord.create_calendar("C241", None).await.unwrap();
    assert!(!cal.active);
    assert_eq!(cal.color, "blue");
    assert!(h.provider.has_calendar(&cal.external_id));
    assert_eq!(h.provider.calendar_summary(&cal.external_id).await.as_deref(), Some("C241"));

    let listed: Vec<_> = h.coord.list_calendars().await.unwrap().into_iter().map(|c| c.alias).collect();
    assert_eq!(listed, vec!["C238-1", "C238-2"]);

    h.coord.set_active("C241", true).await.unwrap();
    let listed: Vec<_> = h.coord.list_calendars().await.unwrap().into_iter().map(|c| c.alias).collect();
    assert_eq!(listed, vec!["C238-1", "C238-2", "C241"]);
    assert_eq!(h.coord.list_all_calendars().await.unwrap().len(), 4);

    h.coord
        .create_booking(request("C241", "alice", span(10, 9, 0, 10, 0)))
        .await
        .unwrap();
}

#[tokio::test]
async fn duplicate_alias_is_rejected_before_provider_call() {
    let h = harness().await;
    let err = h.coord.create_calendar("C238-1", Some("red")).await.unwrap_err();
    assert!(matches!(err, EngineError::AlreadyExists(_)));
    assert_eq!(h.store.list().await.unwrap().len(), 3);
}

#[tokio::test]
async fn rename_remembers_former_alias() {
    let h = harness().await;
    let renamed = h.coord.rename_calendar("C238-2", "C238-2B", Some("green")).await.unwrap();
    assert_eq!(renamed.alias, "C238-2B");
    assert_eq!(renamed.external_id, "ext-2");
    assert_eq!(renamed.color, "green");
    assert_eq!(renamed.former_aliases, vec!["C238-2"]);

    let clash = h.coord.rename_calendar("C238-2B", "C238-1", None).await.unwrap_err();
    assert!(matches!(clash, EngineError::AlreadyExists(_)));

    let err = h
        .coord
        .create_booking(request("C238-2", "alice", span(10, 9, 0, 10, 0)))
        .await
        .unwrap_err();
    assert!(matches!(err, EngineError::NotFound(_)));
    h.coord
        .create_booking(request("C238-2B", "alice", span(10, 9, 0, 10, 0)))
        .await
        .unwrap();
}

#[tokio::test]
async fn delete_calendar_drops_cache_but_keeps_ledger() {
    let h = harness().await;
    h.coord
        .create_booking(request("C238-2", "alice", span(10, 9, 0, 10, 0)))
        .await
        .unwrap();
    assert!(h.cache.get_at("ext-2", h.clock.now()).is_some());

    h.coord.delete_calendar("C238-2").await.unwrap();
    assert!(h.cache.get_at("ext-2", h.clock.now()).is_none());
    assert!(!h.provider.has_calendar("ext-2"));
    assert!(h.store.get("C238-2").await.unwrap().is_none());
    assert_eq!(ledger_rows(&h).await, vec![(LedgerAction::Created, "C238-2".to_string())]);

    let err = h.coord.delete_calendar("C238-2").await.unwrap_err();
    assert!(matches!(err, EngineError::NotFound(_)));
}

#[tokio::test]
async fn delete_calendar_surfaces_provider_outage() {
    let h = harness().await;
    h.provider.fail_calendar("ext-1", "backend error");
    let err = h.coord.delete_calendar("C238-1").await.unwrap_err();
    assert_eq!(err, EngineError::Upstream("backend error".into()));
    assert!(h.store.get("C238-1").await.unwrap().is_some());
}

#[tokio::test]
async fn set_active_unknown_alias_is_not_found() {
    let h = harness().await;
    let err = h.coord.set_active("NOPE", true).await.unwrap_err();
    assert!(matches!(err, EngineError::NotFound(_)));
}

#[tokio::test]
async fn refresh_cache_reports_active_count() {
    let h = harness().await;
    let a = h
        .coord
        .create_booking(request("C238-1", "alice", span(10, 9, 0, 10, 0)))
        .await
        .unwrap();
    h.coord
        .create_booking(request("C238-1", "alice", span(11, 9, 0, 10, 0)))
        .await
        .unwrap();
    h.coord.cancel_booking("C238-1", &a.id, "alice").await.unwrap();
    assert_eq!(h.coord.refresh_cache("ext-1").await.unwrap(), 1);
}

#[test]
fn settings_reject_horizon_beyond_query_window() {
    let config = crate::config::Config {
        warm_horizon: std::time::Duration::from_secs(u64::MAX / 2),
        ..Default::default()
    };
    assert_eq!(CoordinatorSettings::from_config(&config).horizon, Duration::days(30));
}

#[tokio::test]
async fn refresh_with_unbounded_horizon_does_not_panic() {
    let h = harness_with(
        InMemoryProvider::new(),
        CoordinatorSettings {
            horizon: Duration::MAX,
            ..CoordinatorSettings::default()
        },
    )
    .await;
    assert_eq!(h.coord.refresh_cache("ext-1").await.unwrap(), 0);
}
