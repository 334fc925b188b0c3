use std::path::Path;
use std::sync::Arc;

use serde::Deserialize;
use tracing::{info, warn};
use tracing_subscriber::EnvFilter;

use roomcal::analytics::AnalyticsAggregator;
use roomcal::clock::{Clock, SystemClock};
use roomcal::model::CalendarAlias;
use roomcal::provider::InMemoryProvider;
use roomcal::registry::{AliasResolver, AliasStore, InMemoryAliasStore};
use roomcal::warmer::{run_warmer, warm_cache};
use roomcal::{BookingCoordinator, Config, CoordinatorSettings, EventCache, UsageLedger};

/// One calendar in the seed file.
#[derive(Debug, Deserialize)]
struct SeedCalendar {
    alias: String,
    #[serde(default)]
    external_id: Option<String>,
    #[serde(default = "default_active")]
    active: bool,
    #[serde(default)]
    color: Option<String>,
}

fn default_active() -> bool {
    true
}

async fn seed(
    path: &Path,
    store: &InMemoryAliasStore,
    provider: &InMemoryProvider,
) -> Result<usize, Box<dyn std::error::Error>> {
    let raw = std::fs::read_to_string(path)?;
    let calendars: Vec<SeedCalendar> = serde_json::from_str(&raw)?;
    let count = calendars.len();
    for (i, seed) in calendars.into_iter().enumerate() {
        let external_id = seed
            .external_id
            .unwrap_or_else(|| format!("seed-{i}@calendar.local"));
        provider.add_calendar(external_id.clone());
        let mut calendar = CalendarAlias::new(seed.alias, external_id);
        calendar.active = seed.active;
        if let Some(color) = seed.color {
            calendar.color = color;
        }
        store.insert(calendar).await?;
    }
    Ok(count)
}

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")))
        .init();

    let config = Config::from_env()?;
    roomcal::observability::init(config.metrics_port)?;

    let clock: Arc<dyn Clock> = Arc::new(SystemClock);
    let ledger = Arc::new(UsageLedger::open_file(&config.ledger_path())?);
    let provider = Arc::new(InMemoryProvider::new());
    let store = Arc::new(InMemoryAliasStore::new());
    if let Some(path) = &config.seed_file {
        let n = seed(path, &store, &provider).await?;
        info!("seeded {n} calendars from {}", path.display());
    }

    let resolver = Arc::new(AliasResolver::new(store, clock.clone(), config.alias_ttl));
    let cache = Arc::new(EventCache::new(config.cache_ttl, clock.clone()));
    let coordinator = Arc::new(BookingCoordinator::new(
        provider,
        resolver.clone(),
        cache,
        ledger.clone(),
        clock.clone(),
        CoordinatorSettings::from_config(&config),
    ));

    info!("roomcal starting");
    info!("  ledger: {}", config.ledger_path().display());
    info!("  cache ttl: {}s", config.cache_ttl.as_secs());
    info!("  timezone: {}", config.timezone);
    info!("  serialize bookings: {}", config.serialize_bookings);
    info!(
        "  metrics: {}",
        config
            .metrics_port
            .map_or("disabled".to_string(), |p| format!("http://0.0.0.0:{p}/metrics"))
    );

    let analytics = AnalyticsAggregator::new(ledger.clone(), resolver, config.timezone, clock);
    match analytics.event_totals().await {
        Ok(totals) => info!("ledger holds {} created, {} deleted", totals.created, totals.deleted),
        Err(e) => warn!("ledger unreadable at startup: {e}"),
    }

    let report = warm_cache(&coordinator).await;
    info!("ready: {} calendars warmed, {} failed", report.warmed.len(), report.failed.len());

    let warmer = config
        .warm_interval
        .map(|period| tokio::spawn(run_warmer(coordinator.clone(), period)));

    // Graceful shutdown on SIGTERM/ctrl-c
    let ctrl_c = tokio::signal::ctrl_c();
    #[cfg(unix)]
    {
        let mut sigterm = tokio::signal::unix::signal(tokio::signal::unix::SignalKind::terminate())
            .expect("failed to register SIGTERM handler");
        tokio::select! {
            _ = ctrl_c => {}
            _ = sigterm.recv() => {}
        }
    }
    #[cfg(not(unix))]
    {
        ctrl_c.await.ok();
    }

    info!("shutdown signal received");
    if let Some(handle) = warmer {
        handle.abort();
    }
    info!("draining ledger...");
    ledger.drain().await;
    info!("roomcal stopped");
    Ok(())
}
