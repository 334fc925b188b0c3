use chrono::Duration;

pub const MAX_ALIAS_LEN: usize = 64;
pub const MAX_TITLE_LEN: usize = 256;
pub const MAX_IDENTITY_LEN: usize = 320;
pub const MAX_COLOR_LEN: usize = 32;

/// Longest single booking accepted.
pub fn max_booking_duration() -> Duration {
    Duration::days(1)
}

/// Widest window a read query may ask the provider for.
pub fn max_query_window() -> Duration {
    Duration::days(366)
}

/// Pending ledger appends buffered before `record` starts dropping.
pub const LEDGER_CHANNEL_CAPACITY: usize = 4096;

/// Title used when the caller supplies none.
pub const DEFAULT_TITLE: &str = "Reserved";
