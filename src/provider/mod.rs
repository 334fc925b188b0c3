//! Remote calendar provider boundary.
//!
//! The provider is the only source of truth for whether a booking exists.
//! Everything behind this trait is remote, fallible and possibly slow.

mod memory;

pub use memory::InMemoryProvider;

use async_trait::async_trait;
use thiserror::Error;

use crate::model::{Event, NewEvent, Span};

#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum ProviderError {
    #[error("not found: {0}")]
    NotFound(String),
    #[error("already gone: {0}")]
    Gone(String),
    #[error("{0}")]
    Unavailable(String),
}

#[async_trait]
pub trait CalendarProvider: Send + Sync {
    /// Events (cancelled included) overlapping `window`, ordered by start.
    async fn list_events(&self, calendar_id: &str, window: Span) -> Result<Vec<Event>, ProviderError>;

    async fn insert_event(&self, calendar_id: &str, event: NewEvent) -> Result<Event, ProviderError>;

    async fn delete_event(&self, calendar_id: &str, event_id: &str) -> Result<(), ProviderError>;

    async fn get_event(&self, calendar_id: &str, event_id: &str) -> Result<Event, ProviderError>;

    /// Create a calendar and return its provider-assigned id.
    async fn create_calendar(&self, summary: &str) -> Result<String, ProviderError>;

    async fn delete_calendar(&self, calendar_id: &str) -> Result<(), ProviderError>;
}

/// Record one provider call's latency labelled by operation and outcome.
pub(crate) fn timed<T>(op: &'static str, started: std::time::Instant, result: &Result<T, ProviderError>) {
    let status = match result {
        Ok(_) => "ok",
        Err(ProviderError::NotFound(_)) => "not_found",
        Err(ProviderError::Gone(_)) => "gone",
        Err(ProviderError::Unavailable(_)) => "error",
    };
    metrics::histogram!(crate::observability::PROVIDER_CALL_DURATION_SECONDS, "op" => op, "status" => status)
        .record(started.elapsed().as_secs_f64());
}
