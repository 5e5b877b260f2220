//! hazard-ingest: refresh the warning/forecast snapshot once or on a schedule.
//!
//! `hazard-ingest --once` runs a single cycle and exits non-zero if it fails.
//! Without flags the process refreshes every `refresh_interval_minutes` until Ctrl-C.

use std::sync::Arc;

use anyhow::Context;
use hazard_ingest::ingest::scheduler::{interval_from_minutes, spawn_refresh_loop};
use hazard_ingest::{telemetry, IngestionService, Settings, SnapshotStore, SqliteStore};

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    // Load .env in local/dev; no-op when absent.
    let _ = dotenvy::dotenv();
    telemetry::init_tracing();

    let once = std::env::args().skip(1).any(|a| a == "--once");
    let settings = Arc::new(Settings::load().context("loading settings")?);

    if let Some(addr) = settings.metrics_addr.as_deref() {
        let bound = telemetry::install_prometheus(addr)?;
        tracing::info!(%bound, "prometheus exporter listening");
    }

    let store: Arc<dyn SnapshotStore> = Arc::new(
        SqliteStore::open(&settings.database_path)
            .with_context(|| format!("opening {}", settings.database_path.display()))?,
    );
    let service = Arc::new(IngestionService::new(settings.clone(), store)?);

    if once {
        let report = service.refresh_default().await?;
        tracing::info!(
            warnings = report.warnings_written,
            forecast_points = report.forecast_points_written,
            status_error = report.status_error().unwrap_or_default(),
            "single refresh complete"
        );
        return Ok(());
    }

    let every = interval_from_minutes(settings.refresh_interval_minutes);
    tracing::info!(every_secs = every.as_secs(), "starting refresh loop");
    let handle = spawn_refresh_loop(service, every);

    tokio::signal::ctrl_c().await.context("waiting for ctrl-c")?;
    tracing::info!("shutting down");
    handle.abort();
    Ok(())
}
