use std::net::SocketAddr;

// ── RED metrics (request-driven) ────────────────────────────────

/// Counter: appointments committed (confirmed or pending).
pub const BOOKINGS_TOTAL: &str = "turnos_bookings_total";

/// Counter: commits rejected by the ledger conflict check — lost races.
pub const BOOKING_CONFLICTS_TOTAL: &str = "turnos_booking_conflicts_total";

/// Counter: appointments cancelled (customer, admin or reaper).
pub const CANCELLATIONS_TOTAL: &str = "turnos_cancellations_total";

/// Counter: availability (slot grid) queries served.
pub const SLOT_QUERIES_TOTAL: &str = "turnos_slot_queries_total";

// ── USE metrics (resource utilization) ──────────────────────────

/// Gauge: registered barbers.
pub const BARBERS_ACTIVE: &str = "turnos_barbers_active";

/// Counter: stale pending appointments released by the reaper.
pub const REAPED_PENDING_TOTAL: &str = "turnos_reaped_pending_total";

/// Histogram: WAL group-commit flush duration in seconds.
pub const WAL_FLUSH_DURATION_SECONDS: &str = "turnos_wal_flush_duration_seconds";

/// Histogram: WAL group-commit batch size (events per flush).
pub const WAL_FLUSH_BATCH_SIZE: &str = "turnos_wal_flush_batch_size";

/// Install Prometheus metrics exporter on the given port. No-op if port is None.
pub fn init(port: Option<u16>) {
    let Some(port) = port else { return };
    let addr: SocketAddr = ([0, 0, 0, 0], port).into();
    metrics_exporter_prometheus::PrometheusBuilder::new()
        .with_http_listener(addr)
        .install()
        .expect("failed to install Prometheus metrics exporter");
    tracing::info!("metrics endpoint: http://0.0.0.0:{port}/metrics");
}
