use chrono::{DateTime, Duration, SecondsFormat, Utc};
use serde::{Deserialize, Serialize};
use ulid::Ulid;

/// UTC instant. The only time type inside the core.
pub type Instant = DateTime<Utc>;

/// Half-open interval `[start, end)`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct Span {
    pub start: Instant,
    pub end: Instant,
}

impl Span {
    pub fn new(start: Instant, end: Instant) -> Self {
        debug_assert!(start < end, "Span start must be before end");
        Self { start, end }
    }

    /// Checked constructor for caller-supplied bounds.
    pub fn try_new(start: Instant, end: Instant) -> Option<Self> {
        (start < end).then_some(Self { start, end })
    }

    /// `[from, from + horizon)`, saturating at the largest representable instant.
    pub fn forward(from: Instant, horizon: Duration) -> Self {
        let end = from.checked_add_signed(horizon).unwrap_or(DateTime::<Utc>::MAX_UTC);
        Self::new(from, end)
    }

    pub fn duration(&self) -> Duration {
        self.end - self.start
    }

    /// Touching boundaries do not overlap.
    pub fn overlaps(&self, other: &Span) -> bool {
        self.start < other.end && other.start < self.end
    }

    /// Returns true if `self` fully contains `other`.
    pub fn contains_span(&self, other: &Span) -> bool {
        self.start <= other.start && other.end <= self.end
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum EventStatus {
    Active,
    Cancelled,
}

/// Snapshot of one provider event.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Event {
    pub id: String,
    pub title: String,
    /// Identity of the creator, set once at insert time.
    pub owner: String,
    pub span: Span,
    pub status: EventStatus,
}

impl Event {
    pub fn is_active(&self) -> bool {
        self.status == EventStatus::Active
    }

    pub fn is_owned_by(&self, identity: &str) -> bool {
        self.owner == identity
    }
}

/// Insert payload handed to the provider.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct NewEvent {
    pub title: String,
    pub owner: String,
    pub span: Span,
}

/// Drop cancelled events and keep provider order by start.
pub fn active_only(mut events: Vec<Event>) -> Vec<Event> {
    events.retain(Event::is_active);
    events.sort_by_key(|e| e.span.start);
    events
}

/// A bookable calendar as registered by administrators.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CalendarAlias {
    pub alias: String,
    pub external_id: String,
    pub active: bool,
    pub color: String,
    /// Monotonic registration order, assigned by the store.
    #[serde(default)]
    pub seq: u64,
    /// Labels this calendar carried before renames.
    #[serde(default)]
    pub former_aliases: Vec<String>,
}

impl CalendarAlias {
    pub fn new(alias: impl Into<String>, external_id: impl Into<String>) -> Self {
        Self {
            alias: alias.into(),
            external_id: external_id.into(),
            active: false,
            color: DEFAULT_COLOR.to_string(),
            seq: 0,
            former_aliases: Vec::new(),
        }
    }

    /// True if ledger rows keyed by `label` belong to this calendar.
    pub fn answers_to(&self, label: &str) -> bool {
        self.alias == label || self.former_aliases.iter().any(|a| a == label)
    }
}

pub const DEFAULT_COLOR: &str = "blue";

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum LedgerAction {
    Created,
    Deleted,
}

impl LedgerAction {
    pub fn as_str(&self) -> &'static str {
        match self {
            LedgerAction::Created => "created",
            LedgerAction::Deleted => "deleted",
        }
    }
}

/// One immutable usage-ledger row. This is the ledger record format.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct LedgerEntry {
    pub id: Ulid,
    pub action: LedgerAction,
    pub calendar_alias: String,
    /// RFC 3339, UTC.
    pub event_start: String,
    /// RFC 3339, UTC.
    pub event_end: String,
}

impl LedgerEntry {
    pub fn new(action: LedgerAction, calendar_alias: impl Into<String>, span: Span) -> Self {
        Self {
            id: Ulid::new(),
            action,
            calendar_alias: calendar_alias.into(),
            event_start: to_iso(span.start),
            event_end: to_iso(span.end),
        }
    }

    pub fn start_instant(&self) -> Option<Instant> {
        parse_iso(&self.event_start)
    }
}

pub fn to_iso(t: Instant) -> String {
    t.to_rfc3339_opts(SecondsFormat::Millis, true)
}

/// Parse any RFC 3339 offset and normalize to UTC.
pub fn parse_iso(s: &str) -> Option<Instant> {
    DateTime::parse_from_rfc3339(s)
        .ok()
        .map(|t| t.with_timezone(&Utc))
}

// ── Request / result types ───────────────────────────────────────

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct BookingRequest {
    pub alias: String,
    pub start: Option<Instant>,
    pub end: Option<Instant>,
    pub identity: String,
    pub title: Option<String>,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct AvailabilityReport {
    pub available: bool,
    pub conflicts: Vec<Event>,
}

/// A booking as shown back to its owner.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct BookingInfo {
    pub alias: String,
    pub event: Event,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct BusyInfo {
    pub alias: String,
    pub busy: Vec<Span>,
}
