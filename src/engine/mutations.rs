use tracing::{info, warn};

use crate::limits::DEFAULT_TITLE;
use crate::model::*;
use crate::observability::{outcome_label, BOOKINGS_TOTAL, CANCELLATIONS_TOTAL};
use crate::provider::{timed, ProviderError};
use crate::registry::StoreError;

use super::conflict::{validate_alias, validate_booking, validate_color, validate_identity};
use super::{BookingCoordinator, EngineError};

impl BookingCoordinator {
    /// Validate → check → insert → ledger → cache refresh.
    pub async fn create_booking(&self, req: BookingRequest) -> Result<Event, EngineError> {
        let result = self.create_booking_inner(req).await;
        metrics::counter!(BOOKINGS_TOTAL, "outcome" => outcome_label(&result)).increment(1);
        result
    }

    async fn create_booking_inner(&self, req: BookingRequest) -> Result<Event, EngineError> {
        let span = validate_booking(&req)?;
        let external_id = self.resolver.lookup(&req.alias).await?;

        let guard = self.lock_calendar(&external_id).await;
        let report = self.check_availability(&external_id, span).await?;
        if !report.available {
            return Err(EngineError::Conflict(report.conflicts));
        }

        let title = req
            .title
            .filter(|t| !t.trim().is_empty())
            .unwrap_or_else(|| DEFAULT_TITLE.to_string());
        let new_event = NewEvent {
            title,
            owner: req.identity,
            span,
        };
        let started = std::time::Instant::now();
        let result = self.provider.insert_event(&external_id, new_event).await;
        timed("insert_event", started, &result);
        let event = result?;
        drop(guard);

        info!(
            "booked {} on {} [{} .. {}) for {}",
            event.id,
            req.alias,
            to_iso(span.start),
            to_iso(span.end),
            event.owner
        );
        self.record_usage(LedgerAction::Created, &req.alias, span);
        self.heal_cache(&req.alias, &external_id).await;
        Ok(event)
    }

    /// Fetch → ownership check → delete → ledger → cache refresh.
    /// Works on deactivated calendars so owners can still release slots.
    pub async fn cancel_booking(&self, alias: &str, event_id: &str, identity: &str) -> Result<(), EngineError> {
        let result = self.cancel_booking_inner(alias, event_id, identity).await;
        metrics::counter!(CANCELLATIONS_TOTAL, "outcome" => outcome_label(&result)).increment(1);
        result
    }

    async fn cancel_booking_inner(&self, alias: &str, event_id: &str, identity: &str) -> Result<(), EngineError> {
        validate_identity(identity)?;
        validate_alias(alias)?;
        if event_id.trim().is_empty() {
            return Err(EngineError::InvalidInput("event id is required".into()));
        }
        let calendar = self.resolver.lookup_any(alias).await?;
        let external_id = calendar.external_id.as_str();

        let event = self.provider_get(external_id, event_id).await?;
        if !event.is_active() {
            return Err(EngineError::Gone(format!("event {event_id}")));
        }
        if !event.is_owned_by(identity) {
            return Err(EngineError::Forbidden(format!("event {event_id} belongs to another user")));
        }

        let started = std::time::Instant::now();
        let result = self.provider.delete_event(external_id, event_id).await;
        timed("delete_event", started, &result);
        result?;

        info!("cancelled {event_id} on {alias} for {identity}");
        self.record_usage(LedgerAction::Deleted, &calendar.alias, event.span);
        self.heal_cache(&calendar.alias, external_id).await;
        Ok(())
    }

    // ── Calendar administration ──────────────────────────────────

    /// Create a provider calendar and register it, inactive, under `alias`.
    pub async fn create_calendar(&self, alias: &str, color: Option<&str>) -> Result<CalendarAlias, EngineError> {
        validate_alias(alias)?;
        if let Some(c) = color {
            validate_color(c)?;
        }
        let store = self.resolver.store();
        if store.get(alias).await?.is_some() {
            return Err(EngineError::AlreadyExists(format!("alias {alias}")));
        }

        let started = std::time::Instant::now();
        let result = self.provider.create_calendar(alias).await;
        timed("create_calendar", started, &result);
        let external_id = result?;

        let mut calendar = CalendarAlias::new(alias, external_id.clone());
        if let Some(c) = color {
            calendar.color = c.to_string();
        }
        let calendar = match store.insert(calendar).await {
            Ok(c) => c,
            Err(e) => {
                // Lost a race for the alias; do not leave an orphaned provider calendar.
                if let Err(cleanup) = self.provider.delete_calendar(&external_id).await {
                    warn!("orphaned provider calendar {external_id}: {cleanup}");
                }
                return Err(e.into());
            }
        };
        self.resolver.invalidate().await;
        info!("calendar {alias} created as {external_id}");
        Ok(calendar)
    }

    /// Relabel a calendar. The old label is remembered so ledger rows
    /// written under it still count for this calendar.
    pub async fn rename_calendar(
        &self,
        alias: &str,
        new_alias: &str,
        color: Option<&str>,
    ) -> Result<CalendarAlias, EngineError> {
        validate_alias(alias)?;
        validate_alias(new_alias)?;
        if let Some(c) = color {
            validate_color(c)?;
        }
        let store = self.resolver.store();
        let current = store
            .get(alias)
            .await?
            .ok_or_else(|| EngineError::NotFound(format!("calendar {alias}")))?;
        if new_alias != alias && store.get(new_alias).await?.is_some() {
            return Err(EngineError::AlreadyExists(format!("alias {new_alias}")));
        }

        let mut updated = current.clone();
        if new_alias != alias {
            updated.former_aliases.retain(|a| a != new_alias);
            updated.former_aliases.push(alias.to_string());
            updated.alias = new_alias.to_string();
        }
        if let Some(c) = color {
            updated.color = c.to_string();
        }
        store.update(alias, updated.clone()).await?;
        self.resolver.invalidate().await;
        info!("calendar {alias} renamed to {new_alias}");
        Ok(updated)
    }

    pub async fn set_active(&self, alias: &str, active: bool) -> Result<CalendarAlias, EngineError> {
        let store = self.resolver.store();
        let mut calendar = store
            .get(alias)
            .await?
            .ok_or_else(|| EngineError::NotFound(format!("calendar {alias}")))?;
        calendar.active = active;
        store.update(alias, calendar.clone()).await?;
        self.resolver.invalidate().await;
        info!("calendar {alias} active={active}");
        Ok(calendar)
    }

    /// Remove the provider calendar and its registration. Ledger history stays.
    pub async fn delete_calendar(&self, alias: &str) -> Result<(), EngineError> {
        let store = self.resolver.store();
        let calendar = store
            .get(alias)
            .await?
            .ok_or_else(|| EngineError::NotFound(format!("calendar {alias}")))?;
        let external_id = calendar.external_id.as_str();

        let started = std::time::Instant::now();
        let result = self.provider.delete_calendar(external_id).await;
        timed("delete_calendar", started, &result);
        match result {
            Ok(()) => {}
            Err(ProviderError::NotFound(_)) | Err(ProviderError::Gone(_)) => {
                warn!("provider calendar {external_id} for {alias} already gone");
            }
            Err(e) => return Err(e.into()),
        }

        match store.remove(alias).await {
            Ok(_) | Err(StoreError::NotFound(_)) => {}
            Err(e) => return Err(e.into()),
        }
        self.cache.invalidate(external_id).await;
        self.forget_calendar(external_id);
        self.resolver.invalidate().await;
        info!("calendar {alias} deleted");
        Ok(())
    }
}
