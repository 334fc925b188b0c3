use std::sync::Arc;
use std::sync::atomic::{AtomicU64, Ordering};
use std::time::Duration;

use async_trait::async_trait;
use dashmap::DashMap;
use tokio::sync::RwLock;
use ulid::Ulid;

use crate::model::*;

use super::{CalendarProvider, ProviderError};

/// One provider-side calendar. Events are kept sorted by `span.start`;
/// cancelled events stay as tombstones.
#[derive(Debug, Default)]
struct CalendarState {
    summary: String,
    events: Vec<Event>,
}

impl CalendarState {
    fn insert_event(&mut self, event: Event) {
        let pos = self
            .events
            .binary_search_by_key(&event.span.start, |e| e.span.start)
            .unwrap_or_else(|e| e);
        self.events.insert(pos, event);
    }

    /// Everything at index >= right_bound starts at or after `query.end`.
    fn overlapping(&self, query: &Span) -> impl Iterator<Item = &Event> {
        let right_bound = self.events.partition_point(|e| e.span.start < query.end);
        self.events[..right_bound]
            .iter()
            .filter(move |e| e.span.end > query.start)
    }

    fn find(&self, event_id: &str) -> Option<&Event> {
        self.events.iter().find(|e| e.id == event_id)
    }

    fn find_mut(&mut self, event_id: &str) -> Option<&mut Event> {
        self.events.iter_mut().find(|e| e.id == event_id)
    }
}

/// Process-local stand-in for the remote calendar service.
pub struct InMemoryProvider {
    calendars: DashMap<String, Arc<RwLock<CalendarState>>>,
    /// calendar id → message returned by every call touching it
    failing: DashMap<String, String>,
    latency: Option<Duration>,
    list_calls: AtomicU64,
}

impl Default for InMemoryProvider {
    fn default() -> Self {
        Self::new()
    }
}

impl InMemoryProvider {
    pub fn new() -> Self {
        Self {
            calendars: DashMap::new(),
            failing: DashMap::new(),
            latency: None,
            list_calls: AtomicU64::new(0),
        }
    }

    /// Delay every call, widening the window between check and insert.
    pub fn with_latency(mut self, latency: Duration) -> Self {
        self.latency = Some(latency);
        self
    }

    /// Register a calendar under a caller-chosen id.
    pub fn add_calendar(&self, calendar_id: impl Into<String>) {
        self.calendars.entry(calendar_id.into()).or_default();
    }

    /// Make every call for `calendar_id` fail with `message` until healed.
    pub fn fail_calendar(&self, calendar_id: &str, message: impl Into<String>) {
        self.failing.insert(calendar_id.to_string(), message.into());
    }

    pub fn heal_calendar(&self, calendar_id: &str) {
        self.failing.remove(calendar_id);
    }

    /// Number of `list_events` calls served so far.
    pub fn list_calls(&self) -> u64 {
        self.list_calls.load(Ordering::Relaxed)
    }

    pub fn has_calendar(&self, calendar_id: &str) -> bool {
        self.calendars.contains_key(calendar_id)
    }

    /// Display name the calendar was created with.
    pub async fn calendar_summary(&self, calendar_id: &str) -> Option<String> {
        let cal = self.calendars.get(calendar_id).map(|e| e.value().clone())?;
        let guard = cal.read().await;
        Some(guard.summary.clone())
    }

    async fn enter(&self, calendar_id: &str) -> Result<Arc<RwLock<CalendarState>>, ProviderError> {
        if let Some(latency) = self.latency {
            tokio::time::sleep(latency).await;
        }
        if let Some(msg) = self.failing.get(calendar_id) {
            return Err(ProviderError::Unavailable(msg.value().clone()));
        }
        self.calendars
            .get(calendar_id)
            .map(|e| e.value().clone())
            .ok_or_else(|| ProviderError::NotFound(format!("calendar {calendar_id}")))
    }
}

#[async_trait]
impl CalendarProvider for InMemoryProvider {
    async fn list_events(&self, calendar_id: &str, window: Span) -> Result<Vec<Event>, ProviderError> {
        self.list_calls.fetch_add(1, Ordering::Relaxed);
        let cal = self.enter(calendar_id).await?;
        let guard = cal.read().await;
        Ok(guard.overlapping(&window).cloned().collect())
    }

    async fn insert_event(&self, calendar_id: &str, event: NewEvent) -> Result<Event, ProviderError> {
        let cal = self.enter(calendar_id).await?;
        let created = Event {
            id: Ulid::new().to_string().to_lowercase(),
            title: event.title,
            owner: event.owner,
            span: event.span,
            status: EventStatus::Active,
        };
        cal.write().await.insert_event(created.clone());
        Ok(created)
    }

    async fn delete_event(&self, calendar_id: &str, event_id: &str) -> Result<(), ProviderError> {
        let cal = self.enter(calendar_id).await?;
        let mut guard = cal.write().await;
        let event = guard
            .find_mut(event_id)
            .ok_or_else(|| ProviderError::NotFound(format!("event {event_id}")))?;
        if event.status == EventStatus::Cancelled {
            return Err(ProviderError::Gone(format!("event {event_id}")));
        }
        event.status = EventStatus::Cancelled;
        Ok(())
    }

    async fn get_event(&self, calendar_id: &str, event_id: &str) -> Result<Event, ProviderError> {
        let cal = self.enter(calendar_id).await?;
        let guard = cal.read().await;
        guard
            .find(event_id)
            .cloned()
            .ok_or_else(|| ProviderError::NotFound(format!("event {event_id}")))
    }

    async fn create_calendar(&self, summary: &str) -> Result<String, ProviderError> {
        if let Some(latency) = self.latency {
            tokio::time::sleep(latency).await;
        }
        let id = format!("{}@calendar.local", Ulid::new().to_string().to_lowercase());
        let state = CalendarState {
            summary: summary.to_string(),
            events: Vec::new(),
        };
        self.calendars.insert(id.clone(), Arc::new(RwLock::new(state)));
        Ok(id)
    }

    async fn delete_calendar(&self, calendar_id: &str) -> Result<(), ProviderError> {
        self.enter(calendar_id).await?;
        self.calendars.remove(calendar_id);
        Ok(())
    }
}
