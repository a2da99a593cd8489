use std::sync::Arc;
use std::time::Duration;

use tracing::info;

use crate::engine::Engine;

/// Background task that cancels pending appointments whose hold expired,
/// releasing their slots back to availability.
pub async fn run_reaper(engine: Arc<Engine>) {
    let mut interval = tokio::time::interval(Duration::from_secs(5));
    loop {
        interval.tick().await;
        let now = engine.now_local();
        let expired = engine.collect_expired_pending(now);
        for (appointment_id, _barber_id) in expired {
            match engine.cancel_appointment(appointment_id).await {
                Ok(_) => {
                    metrics::counter!(crate::observability::REAPED_PENDING_TOTAL).increment(1);
                    info!("reaped expired pending appointment {appointment_id}");
                }
                Err(e) => {
                    // May already have been confirmed or cancelled — that's fine
                    tracing::debug!("reaper skip {appointment_id}: {e}");
                }
            }
        }
    }
}

/// Background task that compacts the WAL once enough appends accumulate.
pub async fn run_compactor(engine: Arc<Engine>, threshold: u64) {
    let mut interval = tokio::time::interval(Duration::from_secs(60));
    loop {
        interval.tick().await;
        let appends = engine.wal_appends_since_compact().await;
        if appends >= threshold {
            match engine.compact_wal().await {
                Ok(()) => info!("compacted WAL after {appends} appends"),
                Err(e) => tracing::warn!("WAL compaction failed: {e}"),
            }
        }
    }
}
