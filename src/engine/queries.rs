use futures::future::try_join_all;
use tracing::debug;

use crate::model::*;

use super::availability::{busy_spans, subtract_intervals};
use super::conflict::{validate_alias, validate_identity, validate_window};
use super::{BookingCoordinator, EngineError};

impl BookingCoordinator {
    /// Active calendars in registration order.
    pub async fn list_calendars(&self) -> Result<Vec<CalendarAlias>, EngineError> {
        Ok(self.resolver.calendars().await?.iter().filter(|c| c.active).cloned().collect())
    }

    /// Every registered calendar, for administrators.
    pub async fn list_all_calendars(&self) -> Result<Vec<CalendarAlias>, EngineError> {
        Ok(self.resolver.calendars().await?.to_vec())
    }

    /// Active events of one calendar overlapping `window`, ordered by start.
    pub async fn list_events(&self, alias: &str, window: Span) -> Result<Vec<Event>, EngineError> {
        validate_alias(alias)?;
        validate_window(&window)?;
        let external_id = self.resolver.lookup(alias).await?;
        self.events_in(&external_id, window).await
    }

    /// Cached snapshot if fresh and wide enough, else a direct provider read.
    /// This path never writes the cache.
    pub(super) async fn events_in(&self, external_id: &str, window: Span) -> Result<Vec<Event>, EngineError> {
        if let Some(entry) = self.cache.get(external_id).await
            && entry.covers(&window)
        {
            let mut events = entry.events;
            events.retain(|e| e.is_active() && e.span.overlaps(&window));
            return Ok(events);
        }
        debug!("cache cannot answer {external_id}, reading provider");
        Ok(active_only(self.provider_list(external_id, window).await?))
    }

    /// One booking, visible to its owner only.
    pub async fn get_booking(&self, alias: &str, event_id: &str, identity: &str) -> Result<BookingInfo, EngineError> {
        validate_identity(identity)?;
        validate_alias(alias)?;
        let calendar = self.resolver.lookup_any(alias).await?;
        let event = self.provider_get(&calendar.external_id, event_id).await?;
        if !event.is_active() {
            return Err(EngineError::Gone(format!("event {event_id}")));
        }
        if !event.is_owned_by(identity) {
            return Err(EngineError::Forbidden(format!("event {event_id} belongs to another user")));
        }
        Ok(BookingInfo {
            alias: calendar.alias,
            event,
        })
    }

    /// The caller's active bookings across all active calendars, by start.
    pub async fn user_bookings(&self, identity: &str, window: Span) -> Result<Vec<BookingInfo>, EngineError> {
        validate_identity(identity)?;
        validate_window(&window)?;
        let calendars = self.list_calendars().await?;
        let per_calendar = try_join_all(calendars.iter().map(|c| async move {
            let events = self.events_in(&c.external_id, window).await?;
            Ok::<_, EngineError>(
                events
                    .into_iter()
                    .filter(|e| e.is_owned_by(identity))
                    .map(|event| BookingInfo {
                        alias: c.alias.clone(),
                        event,
                    })
                    .collect::<Vec<_>>(),
            )
        }))
        .await?;

        let mut bookings: Vec<BookingInfo> = per_calendar.into_iter().flatten().collect();
        bookings.sort_by_key(|b| b.event.span.start);
        Ok(bookings)
    }

    /// Merged busy spans per alias, read from the provider. Unknown or
    /// inactive aliases are skipped; if none remain the request is invalid.
    pub async fn busy(&self, aliases: &[String], window: Span) -> Result<Vec<BusyInfo>, EngineError> {
        validate_window(&window)?;
        let active = self.resolver.resolve().await?;
        let targets: Vec<(&String, &String)> = aliases
            .iter()
            .filter_map(|alias| match active.get(alias) {
                Some(external_id) => Some((alias, external_id)),
                None => {
                    debug!("busy: skipping unknown alias {alias}");
                    None
                }
            })
            .collect();
        if targets.is_empty() {
            return Err(EngineError::InvalidInput("no valid calendar aliases".into()));
        }

        try_join_all(targets.into_iter().map(|(alias, external_id)| async move {
            let events = self.provider_list(external_id, window).await?;
            Ok::<_, EngineError>(BusyInfo {
                alias: alias.clone(),
                busy: busy_spans(&events, &window),
            })
        }))
        .await
    }

    /// `window` minus every active booking on the calendar.
    pub async fn free_slots(&self, alias: &str, window: Span) -> Result<Vec<Span>, EngineError> {
        validate_alias(alias)?;
        validate_window(&window)?;
        let external_id = self.resolver.lookup(alias).await?;
        let events = self.provider_list(&external_id, window).await?;
        Ok(subtract_intervals(&[window], &busy_spans(&events, &window)))
    }
}
