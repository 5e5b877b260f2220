// src/ingest/mod.rs
pub mod extract;
pub mod http;
pub mod providers;
pub mod scheduler;
pub mod selector;
pub mod types;

use std::fmt;
use std::sync::Arc;
use std::time::Instant;

use chrono::{DateTime, Utc};
use metrics::{counter, describe_counter, describe_gauge, describe_histogram, gauge, histogram};
use once_cell::sync::OnceCell;
use serde::Serialize;
use thiserror::Error;
use tokio::sync::Mutex;

use crate::ai_adapter::build_augmenter;
use crate::config::Settings;
use crate::error::{ErrorKind, IngestError, StoreError};
use crate::ingest::providers::SyntheticProvider;
use crate::ingest::types::{ForecastProvider, IngestionContext, WarningProvider};
use crate::store::SnapshotStore;

/// Refresh-status row written by every cycle.
pub const PIPELINE_INGESTION: &str = "ingestion";

/// One-time metrics registration (so series show up on /metrics).
fn ensure_metrics_described() {
    static ONCE: OnceCell<()> = OnceCell::new();
    ONCE.get_or_init(|| {
        describe_counter!("ingest_cycles_total", "Ingestion cycles started.");
        describe_counter!(
            "ingest_cycle_failures_total",
            "Cycles that ended without persisting a snapshot."
        );
        describe_counter!(
            "ingest_fallback_total",
            "Feeds replaced by synthetic data after a provider failure."
        );
        describe_counter!(
            "ingest_provider_errors_total",
            "Provider fetch/parse errors."
        );
        describe_counter!("ingest_events_total", "Records parsed from upstream providers.");
        describe_counter!(
            "ingest_ai_applied_total",
            "Bulletin records overridden by the AI augmenter."
        );
        describe_counter!("ingest_warnings_written_total", "Warnings persisted.");
        describe_counter!(
            "ingest_forecast_points_written_total",
            "Forecast points persisted."
        );
        describe_histogram!("ingest_cycle_ms", "Cycle wall time in milliseconds.");
        describe_histogram!("ingest_parse_ms", "Bulletin parse time in milliseconds.");
        describe_gauge!(
            "ingest_last_success_ts",
            "Unix ts of the last cycle that persisted a snapshot."
        );
    });
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum Feed {
    Warning,
    Forecast,
}

impl Feed {
    pub fn as_str(&self) -> &'static str {
        match self {
            Feed::Warning => "warning",
            Feed::Forecast => "forecast",
        }
    }
}

impl fmt::Display for Feed {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// A feed that was served from synthetic data because its provider failed.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct FallbackNote {
    pub feed: Feed,
    pub kind: ErrorKind,
    pub message: String,
}

impl FallbackNote {
    pub fn new(feed: Feed, err: &IngestError) -> Self {
        Self {
            feed,
            kind: err.kind(),
            message: err.to_string(),
        }
    }
}

impl fmt::Display for FallbackNote {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{} provider failed: {}", self.feed, self.message)
    }
}

#[derive(Debug, Clone, Serialize)]
pub struct CycleReport {
    pub started_at: DateTime<Utc>,
    pub finished_at: DateTime<Utc>,
    pub warnings_written: usize,
    pub forecast_points_written: usize,
    pub fallback_notes: Vec<FallbackNote>,
}

impl CycleReport {
    /// True when at least one feed was served from synthetic data.
    pub fn degraded(&self) -> bool {
        !self.fallback_notes.is_empty()
    }

    /// Notes joined by "; ", or `None` for a clean cycle.
    pub fn status_error(&self) -> Option<String> {
        if self.fallback_notes.is_empty() {
            return None;
        }
        Some(
            self.fallback_notes
                .iter()
                .map(ToString::to_string)
                .collect::<Vec<_>>()
                .join("; "),
        )
    }
}

#[derive(Debug, Error)]
pub enum CycleError {
    #[error("{feed} provider failed: {source}")]
    Feed {
        feed: Feed,
        #[source]
        source: IngestError,
    },

    #[error("snapshot persistence failed: {0}")]
    Persistence(#[from] StoreError),
}

/// Fetch, fall back, persist, record status. One cycle at a time per service.
pub struct IngestionService {
    settings: Arc<Settings>,
    store: Arc<dyn SnapshotStore>,
    warnings: Arc<dyn WarningProvider>,
    forecast: Arc<dyn ForecastProvider>,
    fallback: SyntheticProvider,
    cycle_lock: Mutex<()>,
}

impl IngestionService {
    /// Builds the HTTP client, augmenter and both providers from `settings`.
    pub fn new(settings: Arc<Settings>, store: Arc<dyn SnapshotStore>) -> Result<Self, IngestError> {
        let client = http::build_client(settings.http_timeout_seconds)?;
        let augmenter = build_augmenter(&settings.ai, client.clone());
        let warnings = selector::build_warning_provider(&settings, &client, augmenter);
        let forecast = selector::build_forecast_provider(&settings, &client);
        tracing::info!(
            target: "ingest",
            warning_provider = warnings.name(),
            forecast_provider = forecast.name(),
            fallback = settings.fallback_on_failure,
            "providers selected"
        );
        Ok(Self::with_providers(settings, store, warnings, forecast))
    }

    pub fn with_providers(
        settings: Arc<Settings>,
        store: Arc<dyn SnapshotStore>,
        warnings: Arc<dyn WarningProvider>,
        forecast: Arc<dyn ForecastProvider>,
    ) -> Self {
        Self {
            settings,
            store,
            warnings,
            forecast,
            fallback: SyntheticProvider::new(),
            cycle_lock: Mutex::new(()),
        }
    }

    /// Replace the synthetic generator used for fallback (tests pin its clock).
    pub fn with_fallback(mut self, fallback: SyntheticProvider) -> Self {
        self.fallback = fallback;
        self
    }

    pub fn settings(&self) -> &Settings {
        &self.settings
    }

    pub fn default_context(&self) -> IngestionContext {
        let loc = &self.settings.default_location;
        IngestionContext::new(loc.lat, loc.lon, loc.region.clone(), loc.label.clone())
    }

    pub async fn refresh_default(&self) -> Result<CycleReport, CycleError> {
        let ctx = self.default_context();
        self.refresh(&ctx).await
    }

    pub async fn refresh(&self, ctx: &IngestionContext) -> Result<CycleReport, CycleError> {
        ensure_metrics_described();
        let _cycle = self.cycle_lock.lock().await;

        let started_at = Utc::now();
        let t0 = Instant::now();
        counter!("ingest_cycles_total").increment(1);
        tracing::info!(
            target: "ingest",
            region = %ctx.region,
            lat = ctx.lat,
            lon = ctx.lon,
            "ingestion cycle started"
        );

        let (fetched_warnings, fetched_points) = tokio::join!(
            self.warnings.fetch_warnings(ctx),
            self.forecast.fetch_forecast(ctx)
        );

        let mut notes = Vec::new();
        let warnings = self.settle(
            Feed::Warning,
            self.warnings.name(),
            fetched_warnings,
            &mut notes,
            || SyntheticProvider::warnings_at(ctx, self.fallback.now()),
        );
        let points = self.settle(
            Feed::Forecast,
            self.forecast.name(),
            fetched_points,
            &mut notes,
            || SyntheticProvider::forecast_at(ctx, self.fallback.now()),
        );

        let (warnings, points) = match (warnings, points) {
            (Ok(w), Ok(p)) => (w, p),
            (Err(err), _) | (Ok(_), Err(err)) => {
                self.record_failure(&err.to_string(), t0);
                return Err(err);
            }
        };

        let persisted = self
            .store
            .replace_warnings(&warnings)
            .and_then(|_| self.store.replace_forecast(&points));
        if let Err(err) = persisted {
            tracing::error!(target: "ingest", error = %err, "snapshot persistence failed");
            self.record_failure(&err.to_string(), t0);
            return Err(CycleError::Persistence(err));
        }

        let report = CycleReport {
            started_at,
            finished_at: Utc::now(),
            warnings_written: warnings.len(),
            forecast_points_written: points.len(),
            fallback_notes: notes,
        };
        let status_error = report.status_error();
        if let Err(err) =
            self.store
                .update_refresh_status(PIPELINE_INGESTION, status_error.as_deref(), true)
        {
            tracing::error!(target: "ingest", error = %err, "refresh status update failed");
            self.record_failure(&err.to_string(), t0);
            return Err(CycleError::Persistence(err));
        }

        counter!("ingest_warnings_written_total").increment(report.warnings_written as u64);
        counter!("ingest_forecast_points_written_total")
            .increment(report.forecast_points_written as u64);
        gauge!("ingest_last_success_ts").set(report.finished_at.timestamp() as f64);
        histogram!("ingest_cycle_ms").record(t0.elapsed().as_secs_f64() * 1_000.0);

        tracing::info!(
            target: "ingest",
            warnings = report.warnings_written,
            forecast_points = report.forecast_points_written,
            degraded = report.degraded(),
            "ingestion cycle finished"
        );
        Ok(report)
    }

    /// Pass rows through, or substitute synthetic output when fallback is allowed.
    fn settle<T>(
        &self,
        feed: Feed,
        provider: &'static str,
        fetched: Result<Vec<T>, IngestError>,
        notes: &mut Vec<FallbackNote>,
        substitute: impl FnOnce() -> Vec<T>,
    ) -> Result<Vec<T>, CycleError> {
        let err = match fetched {
            Ok(rows) => return Ok(rows),
            Err(err) => err,
        };
        counter!("ingest_provider_errors_total", "provider" => provider).increment(1);

        if !self.settings.fallback_on_failure || !err.allows_fallback() {
            tracing::error!(target: "ingest", %feed, provider, error = %err, "provider failed");
            return Err(CycleError::Feed { feed, source: err });
        }

        tracing::warn!(
            target: "ingest",
            %feed,
            provider,
            kind = %err.kind(),
            error = %err,
            "provider failed; serving synthetic data"
        );
        counter!("ingest_fallback_total", "feed" => feed.as_str()).increment(1);
        notes.push(FallbackNote::new(feed, &err));
        Ok(substitute())
    }

    /// Count a fatal cycle and store its error; `last_success_at` stays put.
    fn record_failure(&self, message: &str, t0: Instant) {
        counter!("ingest_cycle_failures_total").increment(1);
        histogram!("ingest_cycle_ms").record(t0.elapsed().as_secs_f64() * 1_000.0);
        if let Err(e) = self
            .store
            .update_refresh_status(PIPELINE_INGESTION, Some(message), false)
        {
            tracing::warn!(target: "ingest", error = %e, "could not record refresh failure");
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn note_display_names_the_feed() {
        let note = FallbackNote::new(
            Feed::Forecast,
            &IngestError::transport("http://127.0.0.1:9/forecast", "connection refused"),
        );
        assert_eq!(note.kind, ErrorKind::Transport);
        assert_eq!(
            note.to_string(),
            "forecast provider failed: request to http://127.0.0.1:9/forecast failed: connection refused"
        );
    }

    #[test]
    fn status_error_joins_notes() {
        let now = Utc::now();
        let mut report = CycleReport {
            started_at: now,
            finished_at: now,
            warnings_written: 0,
            forecast_points_written: 0,
            fallback_notes: vec![],
        };
        assert_eq!(report.status_error(), None);
        report.fallback_notes = vec![
            FallbackNote::new(Feed::Warning, &IngestError::config("missing key")),
            FallbackNote::new(Feed::Forecast, &IngestError::config("missing key")),
        ];
        assert_eq!(
            report.status_error().unwrap(),
            "warning provider failed: configuration error: missing key; \
             forecast provider failed: configuration error: missing key"
        );
    }

    #[test]
    fn cycle_error_matches_note_text() {
        let err = CycleError::Feed {
            feed: Feed::Warning,
            source: IngestError::config("missing key"),
        };
        assert_eq!(
            err.to_string(),
            "warning provider failed: configuration error: missing key"
        );
    }
}
