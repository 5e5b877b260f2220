// src/ingest/scheduler.rs
use std::sync::Arc;
use std::time::Duration;

use tokio::task::JoinHandle;
use tokio::time::MissedTickBehavior;

use crate::ingest::IngestionService;

/// Refresh on a fixed cadence. The first tick fires immediately; a failed
/// cycle is logged and the loop keeps going.
pub fn spawn_refresh_loop(service: Arc<IngestionService>, every: Duration) -> JoinHandle<()> {
    tokio::spawn(async move {
        let mut ticker = tokio::time::interval(every);
        ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);
        loop {
            ticker.tick().await;
            match service.refresh_default().await {
                Ok(report) => tracing::debug!(
                    target: "ingest",
                    degraded = report.degraded(),
                    "scheduled refresh done"
                ),
                Err(e) => tracing::error!(target: "ingest", error = %e, "scheduled refresh failed"),
            }
        }
    })
}

/// Minutes from config; zero is bumped to one so the ticker never spins.
pub fn interval_from_minutes(minutes: u64) -> Duration {
    Duration::from_secs(minutes.max(1) * 60)
}
