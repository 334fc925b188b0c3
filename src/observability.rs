use std::net::SocketAddr;

// ── RED metrics (request-driven) ────────────────────────────────

/// Counter: booking attempts. Labels: outcome.
pub const BOOKINGS_TOTAL: &str = "roomcal_bookings_total";

/// Counter: cancellation attempts. Labels: outcome.
pub const CANCELLATIONS_TOTAL: &str = "roomcal_cancellations_total";

/// Histogram: provider call latency in seconds. Labels: op, status.
pub const PROVIDER_CALL_DURATION_SECONDS: &str = "roomcal_provider_call_duration_seconds";

// ── Cache ───────────────────────────────────────────────────────

/// Counter: EventCache reads answered from a fresh entry.
pub const CACHE_HITS_TOTAL: &str = "roomcal_cache_hits_total";

/// Counter: EventCache reads that found nothing fresh.
pub const CACHE_MISSES_TOTAL: &str = "roomcal_cache_misses_total";

/// Counter: calendars whose warm-up or post-write refresh failed.
pub const CACHE_REFRESH_FAILURES_TOTAL: &str = "roomcal_cache_refresh_failures_total";

/// Counter: alias registry reloads from the store.
pub const ALIAS_RELOADS_TOTAL: &str = "roomcal_alias_reloads_total";

// ── Ledger ──────────────────────────────────────────────────────

/// Counter: ledger entries that were not written.
pub const LEDGER_WRITE_FAILURES_TOTAL: &str = "roomcal_ledger_write_failures_total";

/// Histogram: ledger group-commit flush duration in seconds.
pub const LEDGER_FLUSH_DURATION_SECONDS: &str = "roomcal_ledger_flush_duration_seconds";

/// Histogram: ledger group-commit batch size (entries per flush).
pub const LEDGER_FLUSH_BATCH_SIZE: &str = "roomcal_ledger_flush_batch_size";

/// Install Prometheus metrics exporter on the given port. No-op if port is None.
pub fn init(port: Option<u16>) -> Result<(), metrics_exporter_prometheus::BuildError> {
    let Some(port) = port else { return Ok(()) };
    let addr: SocketAddr = ([0, 0, 0, 0], port).into();
    metrics_exporter_prometheus::PrometheusBuilder::new()
        .with_http_listener(addr)
        .install()?;
    tracing::info!("metrics endpoint: http://0.0.0.0:{port}/metrics");
    Ok(())
}

/// Outcome label for a request result.
pub fn outcome_label<T>(result: &Result<T, crate::engine::EngineError>) -> &'static str {
    match result {
        Ok(_) => "ok",
        Err(e) => e.label(),
    }
}
