//! Read-only aggregates over the usage ledger.
//!
//! Every bucket is computed in one fixed civil timezone, never the host's.
//! Ledger rows carry the alias that was current when they were written;
//! drill-downs join them back to the registry's current labels.

use std::collections::{BTreeMap, HashMap};
use std::sync::Arc;

use chrono::{DateTime, Datelike, Timelike};
use chrono_tz::Tz;
use serde::Serialize;
use tracing::debug;

use crate::clock::Clock;
use crate::engine::EngineError;
use crate::ledger::UsageLedger;
use crate::model::{CalendarAlias, LedgerAction, LedgerEntry};
use crate::registry::AliasResolver;

/// Short month labels used by the admin dashboard, January first.
pub const MONTH_LABELS: [&str; 12] = [
    "Tammi", "Helmi", "Maalis", "Huhti", "Touko", "Kesä", "Heinä", "Elo", "Syys", "Loka", "Marras", "Joulu",
];

/// Coarse time bucket selector for drill-downs.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DrillDown {
    /// Local hour, 0..=23.
    Hour(u32),
    /// ISO weekday, 1 = Monday .. 7 = Sunday.
    Weekday(u32),
    /// Month of any year, 1..=12.
    Month(u32),
    YearMonth(i32, u32),
    All,
}

impl DrillDown {
    /// `kind` is `hour`, `weekday`, `month` or `all`. Month values are `MM`,
    /// `YYYY-MM` or a dashboard month label.
    pub fn parse(kind: &str, value: &str) -> Result<Self, EngineError> {
        let value = value.trim();
        let bad = || EngineError::InvalidInput(format!("bad {kind} bucket {value:?}"));
        match kind {
            "all" => Ok(DrillDown::All),
            "hour" => match value.parse::<u32>() {
                Ok(h) if h < 24 => Ok(DrillDown::Hour(h)),
                _ => Err(bad()),
            },
            "weekday" => match value.parse::<u32>() {
                Ok(d) if (1..=7).contains(&d) => Ok(DrillDown::Weekday(d)),
                _ => Err(bad()),
            },
            "month" => {
                if let Some((year, month)) = value.split_once('-') {
                    let year: i32 = year.parse().map_err(|_| bad())?;
                    let month: u32 = month.parse().map_err(|_| bad())?;
                    if year < 0 || !(1..=12).contains(&month) {
                        return Err(bad());
                    }
                    return Ok(DrillDown::YearMonth(year, month));
                }
                if let Some(i) = MONTH_LABELS.iter().position(|l| *l == value) {
                    return Ok(DrillDown::Month(i as u32 + 1));
                }
                match value.parse::<u32>() {
                    Ok(m) if (1..=12).contains(&m) => Ok(DrillDown::Month(m)),
                    _ => Err(bad()),
                }
            }
            _ => Err(EngineError::InvalidInput(format!("unknown bucket type {kind:?}"))),
        }
    }

    pub fn matches(&self, local: &DateTime<Tz>) -> bool {
        match *self {
            DrillDown::Hour(h) => local.hour() == h,
            DrillDown::Weekday(d) => local.weekday().number_from_monday() == d,
            DrillDown::Month(m) => local.month() == m,
            DrillDown::YearMonth(y, m) => local.year() == y && local.month() == m,
            DrillDown::All => true,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct CalendarCount {
    pub alias: String,
    pub count: u64,
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
pub struct EventTotals {
    pub created: u64,
    pub deleted: u64,
}

impl EventTotals {
    /// Bookings still standing.
    pub fn net(&self) -> i64 {
        self.created as i64 - self.deleted as i64
    }

    /// Share of bookings later cancelled. `None` before the first booking.
    pub fn cancellation_ratio(&self) -> Option<f64> {
        (self.created > 0).then(|| self.deleted as f64 / self.created as f64)
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct MonthlyDistribution {
    pub year: i32,
    /// January first.
    pub counts: [u64; 12],
}

// ── Pure bucketing ───────────────────────────────────────────────

fn local_start(entry: &LedgerEntry, tz: Tz) -> Option<DateTime<Tz>> {
    let start = entry.start_instant();
    if start.is_none() {
        debug!("ledger row {} has unreadable start {:?}", entry.id, entry.event_start);
    }
    start.map(|t| t.with_timezone(&tz))
}

/// Local start times of `created` rows.
fn created_starts(entries: &[LedgerEntry], tz: Tz) -> impl Iterator<Item = (&LedgerEntry, DateTime<Tz>)> {
    entries
        .iter()
        .filter(|e| e.action == LedgerAction::Created)
        .filter_map(move |e| local_start(e, tz).map(|t| (e, t)))
}

/// Sparse `"HH"` → count.
pub fn hour_buckets(entries: &[LedgerEntry], tz: Tz) -> BTreeMap<String, u64> {
    let mut buckets = BTreeMap::new();
    for (_, local) in created_starts(entries, tz) {
        *buckets.entry(format!("{:02}", local.hour())).or_insert(0) += 1;
    }
    buckets
}

/// ISO weekday → count, all seven present.
pub fn weekday_buckets(entries: &[LedgerEntry], tz: Tz) -> BTreeMap<u32, u64> {
    let mut buckets: BTreeMap<u32, u64> = (1..=7).map(|d| (d, 0)).collect();
    for (_, local) in created_starts(entries, tz) {
        *buckets.entry(local.weekday().number_from_monday()).or_insert(0) += 1;
    }
    buckets
}

pub fn month_buckets(entries: &[LedgerEntry], tz: Tz, year: i32) -> [u64; 12] {
    let mut counts = [0u64; 12];
    for (_, local) in created_starts(entries, tz) {
        if local.year() == year {
            counts[local.month0() as usize] += 1;
        }
    }
    counts
}

pub fn totals(entries: &[LedgerEntry]) -> EventTotals {
    entries.iter().fold(EventTotals::default(), |mut t, e| {
        match e.action {
            LedgerAction::Created => t.created += 1,
            LedgerAction::Deleted => t.deleted += 1,
        }
        t
    })
}

/// Index of the calendar a ledger label belongs to. A current alias wins
/// over a former one.
fn owner_index(label: &str, calendars: &[CalendarAlias]) -> Option<usize> {
    calendars
        .iter()
        .position(|c| c.alias == label)
        .or_else(|| calendars.iter().position(|c| c.answers_to(label)))
}

/// Per-calendar counts of matching `created` rows, in registration order.
/// Rows of deleted calendars are dropped. Zero counts appear only for `All`.
pub fn count_by_calendar(
    entries: &[LedgerEntry],
    calendars: &[CalendarAlias],
    selector: DrillDown,
    tz: Tz,
) -> Vec<CalendarCount> {
    let mut counts = vec![0u64; calendars.len()];
    let mut owners: HashMap<&str, Option<usize>> = HashMap::new();
    for (entry, local) in created_starts(entries, tz) {
        if !selector.matches(&local) {
            continue;
        }
        let label = entry.calendar_alias.as_str();
        let owner = *owners.entry(label).or_insert_with(|| owner_index(label, calendars));
        if let Some(i) = owner {
            counts[i] += 1;
        }
    }
    calendars
        .iter()
        .zip(counts)
        .filter(|(_, n)| selector == DrillDown::All || *n > 0)
        .map(|(c, count)| CalendarCount {
            alias: c.alias.clone(),
            count,
        })
        .collect()
}

// ── Aggregator ───────────────────────────────────────────────────

pub struct AnalyticsAggregator {
    ledger: Arc<UsageLedger>,
    resolver: Arc<AliasResolver>,
    tz: Tz,
    clock: Arc<dyn Clock>,
}

impl AnalyticsAggregator {
    pub fn new(ledger: Arc<UsageLedger>, resolver: Arc<AliasResolver>, tz: Tz, clock: Arc<dyn Clock>) -> Self {
        Self {
            ledger,
            resolver,
            tz,
            clock,
        }
    }

    pub fn timezone(&self) -> Tz {
        self.tz
    }

    async fn entries(&self) -> Result<Vec<LedgerEntry>, EngineError> {
        Ok(self.ledger.entries().await?)
    }

    pub async fn hour_distribution(&self) -> Result<BTreeMap<String, u64>, EngineError> {
        Ok(hour_buckets(&self.entries().await?, self.tz))
    }

    pub async fn weekday_distribution(&self) -> Result<BTreeMap<u32, u64>, EngineError> {
        Ok(weekday_buckets(&self.entries().await?, self.tz))
    }

    /// The current local year.
    pub async fn monthly_distribution(&self) -> Result<MonthlyDistribution, EngineError> {
        let year = self.clock.now().with_timezone(&self.tz).year();
        self.monthly_distribution_for(year).await
    }

    pub async fn monthly_distribution_for(&self, year: i32) -> Result<MonthlyDistribution, EngineError> {
        Ok(MonthlyDistribution {
            year,
            counts: month_buckets(&self.entries().await?, self.tz, year),
        })
    }

    pub async fn event_totals(&self) -> Result<EventTotals, EngineError> {
        Ok(totals(&self.entries().await?))
    }

    pub async fn drill_down(&self, selector: DrillDown) -> Result<Vec<CalendarCount>, EngineError> {
        let entries = self.entries().await?;
        let calendars = self.resolver.calendars().await?;
        Ok(count_by_calendar(&entries, &calendars, selector, self.tz))
    }
}
