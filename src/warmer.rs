use std::sync::Arc;
use std::time::Duration;

use futures::future::join_all;
use tracing::{debug, info, warn};

use crate::engine::BookingCoordinator;

#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct WarmReport {
    /// Aliases whose snapshot was stored.
    pub warmed: Vec<String>,
    /// Aliases whose provider read failed.
    pub failed: Vec<String>,
}

/// Fill the cache for every registered calendar. Calendars are warmed
/// concurrently and independently; one failure never stops the rest.
pub async fn warm_cache(coordinator: &BookingCoordinator) -> WarmReport {
    let calendars = match coordinator.resolver().calendars().await {
        Ok(c) => c,
        Err(e) => {
            warn!("cache warm skipped, alias registry unavailable: {e}");
            return WarmReport::default();
        }
    };

    let results = join_all(calendars.iter().map(|c| async move {
        let outcome = coordinator.refresh_cache(&c.external_id).await;
        (c.alias.clone(), outcome)
    }))
    .await;

    let mut report = WarmReport::default();
    for (alias, outcome) in results {
        match outcome {
            Ok(count) => {
                debug!("warmed {alias}: {count} events");
                report.warmed.push(alias);
            }
            Err(e) => {
                metrics::counter!(crate::observability::CACHE_REFRESH_FAILURES_TOTAL).increment(1);
                warn!("cache warm failed for {alias}: {e}");
                report.failed.push(alias);
            }
        }
    }
    info!(
        "cache warm complete: {} warmed, {} failed",
        report.warmed.len(),
        report.failed.len()
    );
    report
}

/// Background task that re-warms the cache on a fixed period.
pub async fn run_warmer(coordinator: Arc<BookingCoordinator>, period: Duration) {
    let mut interval = tokio::time::interval(period);
    // The first tick fires immediately; startup already warmed.
    interval.tick().await;
    loop {
        interval.tick().await;
        warm_cache(&coordinator).await;
    }
}
