use std::path::PathBuf;
use std::str::FromStr;
use std::time::Duration;

use chrono_tz::Tz;
use thiserror::Error;
use tracing::warn;

use crate::limits::max_query_window;

#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("unknown timezone {0:?}")]
    InvalidTimezone(String),
}

/// Process configuration, read from `ROOMCAL_*` environment variables.
#[derive(Debug, Clone)]
pub struct Config {
    pub data_dir: PathBuf,
    /// EventCache freshness window.
    pub cache_ttl: Duration,
    /// AliasResolver memo lifetime.
    pub alias_ttl: Duration,
    /// Forward window fetched by the warmer and by post-write refreshes.
    pub warm_horizon: Duration,
    /// Periodic re-warm; `None` warms once at startup only.
    pub warm_interval: Option<Duration>,
    /// Civil timezone used for analytics buckets.
    pub timezone: Tz,
    /// Serialize check+insert per calendar.
    pub serialize_bookings: bool,
    pub seed_file: Option<PathBuf>,
    pub metrics_port: Option<u16>,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            data_dir: PathBuf::from("./data"),
            cache_ttl: Duration::from_secs(3600),
            alias_ttl: Duration::from_secs(30),
            warm_horizon: Duration::from_secs(30 * 86_400),
            warm_interval: Some(Duration::from_secs(900)),
            timezone: chrono_tz::Europe::Helsinki,
            serialize_bookings: true,
            seed_file: None,
            metrics_port: None,
        }
    }
}

impl Config {
    pub fn from_env() -> Result<Self, ConfigError> {
        Self::from_lookup(|key| std::env::var(key).ok())
    }

    /// Build from any key lookup. Malformed numbers fall back to defaults.
    pub fn from_lookup(lookup: impl Fn(&str) -> Option<String>) -> Result<Self, ConfigError> {
        let defaults = Self::default();

        let timezone = match lookup("ROOMCAL_TIMEZONE") {
            Some(name) => Tz::from_str(name.trim()).map_err(|_| ConfigError::InvalidTimezone(name))?,
            None => defaults.timezone,
        };

        let warm_interval = match parsed::<u64>(&lookup, "ROOMCAL_WARM_INTERVAL_SECS") {
            Some(0) => None,
            Some(secs) => Some(Duration::from_secs(secs)),
            None => defaults.warm_interval,
        };

        Ok(Self {
            data_dir: lookup("ROOMCAL_DATA_DIR")
                .map(PathBuf::from)
                .unwrap_or(defaults.data_dir),
            cache_ttl: parsed(&lookup, "ROOMCAL_CACHE_TTL_SECS")
                .map(Duration::from_secs)
                .unwrap_or(defaults.cache_ttl),
            alias_ttl: parsed(&lookup, "ROOMCAL_ALIAS_TTL_SECS")
                .map(Duration::from_secs)
                .unwrap_or(defaults.alias_ttl),
            warm_horizon: parsed::<u64>(&lookup, "ROOMCAL_WARM_HORIZON_DAYS")
                .and_then(horizon_days)
                .unwrap_or(defaults.warm_horizon),
            warm_interval,
            timezone,
            serialize_bookings: parsed(&lookup, "ROOMCAL_SERIALIZE_BOOKINGS")
                .unwrap_or(defaults.serialize_bookings),
            seed_file: lookup("ROOMCAL_SEED_FILE").map(PathBuf::from),
            metrics_port: parsed(&lookup, "ROOMCAL_METRICS_PORT"),
        })
    }

    pub fn ledger_path(&self) -> PathBuf {
        self.data_dir.join("usage.ledger")
    }
}

/// Warm horizon in days, bounded by the widest window a read may ask for.
fn horizon_days(days: u64) -> Option<Duration> {
    let max_days = max_query_window().num_days().unsigned_abs();
    if days == 0 || days > max_days {
        warn!("ROOMCAL_WARM_HORIZON_DAYS={days} outside 1..={max_days}, using default");
        return None;
    }
    Some(Duration::from_secs(days * 86_400))
}

fn parsed<T: FromStr>(lookup: &impl Fn(&str) -> Option<String>, key: &str) -> Option<T> {
    let raw = lookup(key)?;
    match raw.trim().parse() {
        Ok(v) => Some(v),
        Err(_) => {
            warn!("ignoring malformed {key}={raw:?}, using default");
            None
        }
    }
}
