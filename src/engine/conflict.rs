use crate::limits::*;
use crate::model::*;

use super::EngineError;

/// Active events overlapping `[span.start, span.end)`. Touching boundaries
/// are not conflicts.
pub fn find_conflicts(events: &[Event], span: &Span) -> Vec<Event> {
    events
        .iter()
        .filter(|e| e.is_active() && e.span.start < span.end && e.span.end > span.start)
        .cloned()
        .collect()
}

/// Input checks that need no I/O. Runs before any remote call.
pub(crate) fn validate_booking(req: &BookingRequest) -> Result<Span, EngineError> {
    validate_identity(&req.identity)?;
    validate_alias(&req.alias)?;
    let (Some(start), Some(end)) = (req.start, req.end) else {
        return Err(EngineError::InvalidInput("start and end are required".into()));
    };
    let span = Span::try_new(start, end)
        .ok_or_else(|| EngineError::InvalidInput("start must be before end".into()))?;
    if span.duration() > max_booking_duration() {
        return Err(EngineError::InvalidInput("booking too long".into()));
    }
    if let Some(title) = &req.title
        && title.len() > MAX_TITLE_LEN
    {
        return Err(EngineError::InvalidInput("title too long".into()));
    }
    Ok(span)
}

pub(crate) fn validate_identity(identity: &str) -> Result<(), EngineError> {
    if identity.trim().is_empty() {
        return Err(EngineError::InvalidInput("caller identity is required".into()));
    }
    if identity.len() > MAX_IDENTITY_LEN {
        return Err(EngineError::InvalidInput("caller identity too long".into()));
    }
    Ok(())
}

pub(crate) fn validate_alias(alias: &str) -> Result<(), EngineError> {
    if alias.trim().is_empty() {
        return Err(EngineError::InvalidInput("calendar alias is required".into()));
    }
    if alias.len() > MAX_ALIAS_LEN {
        return Err(EngineError::InvalidInput("calendar alias too long".into()));
    }
    Ok(())
}

pub(crate) fn validate_color(color: &str) -> Result<(), EngineError> {
    if color.trim().is_empty() || color.len() > MAX_COLOR_LEN {
        return Err(EngineError::InvalidInput("invalid color tag".into()));
    }
    Ok(())
}

/// Caller-supplied read window.
pub(crate) fn validate_window(window: &Span) -> Result<(), EngineError> {
    if window.duration() > max_query_window() {
        return Err(EngineError::InvalidInput("query window too wide".into()));
    }
    Ok(())
}
