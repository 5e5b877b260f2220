// tests/ingest_cycle.rs
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use chrono::{DateTime, TimeZone, Utc};
use hazard_ingest::config::Settings;
use hazard_ingest::error::{ErrorKind, IngestError, StoreError};
use hazard_ingest::ingest::providers::SyntheticProvider;
use hazard_ingest::ingest::types::{ForecastProvider, IngestionContext, WarningProvider};
use hazard_ingest::model::{ForecastPoint, HazardWarning};
use hazard_ingest::store::{SnapshotStore, SqliteStore};
use hazard_ingest::{CycleError, Feed, IngestionService, PIPELINE_INGESTION};

struct FailingProvider(fn() -> IngestError);

#[async_trait]
impl WarningProvider for FailingProvider {
    async fn fetch_warnings(&self, _ctx: &IngestionContext) -> Result<Vec<HazardWarning>, IngestError> {
        Err((self.0)())
    }
    fn name(&self) -> &'static str {
        "failing"
    }
}

#[async_trait]
impl ForecastProvider for FailingProvider {
    async fn fetch_forecast(&self, _ctx: &IngestionContext) -> Result<Vec<ForecastPoint>, IngestError> {
        Err((self.0)())
    }
    fn name(&self) -> &'static str {
        "failing"
    }
}

fn refused() -> IngestError {
    IngestError::transport("http://127.0.0.1:9/warnings", "connection refused")
}

/// Delegates to SQLite but refuses to write forecasts.
struct BrokenForecastStore(Arc<SqliteStore>);

impl SnapshotStore for BrokenForecastStore {
    fn replace_warnings(&self, warnings: &[HazardWarning]) -> Result<(), StoreError> {
        self.0.replace_warnings(warnings)
    }
    fn replace_forecast(&self, _points: &[ForecastPoint]) -> Result<(), StoreError> {
        Err(StoreError::Poisoned)
    }
    fn update_refresh_status(
        &self,
        pipeline: &str,
        error: Option<&str>,
        succeeded: bool,
    ) -> Result<(), StoreError> {
        self.0.update_refresh_status(pipeline, error, succeeded)
    }
    fn get_last_refresh(&self, pipeline: &str) -> Result<Option<DateTime<Utc>>, StoreError> {
        self.0.get_last_refresh(pipeline)
    }
}

/// Delegates to SQLite but cannot record a successful status row.
struct BrokenStatusStore(Arc<SqliteStore>);

impl SnapshotStore for BrokenStatusStore {
    fn replace_warnings(&self, warnings: &[HazardWarning]) -> Result<(), StoreError> {
        self.0.replace_warnings(warnings)
    }
    fn replace_forecast(&self, points: &[ForecastPoint]) -> Result<(), StoreError> {
        self.0.replace_forecast(points)
    }
    fn update_refresh_status(
        &self,
        pipeline: &str,
        error: Option<&str>,
        succeeded: bool,
    ) -> Result<(), StoreError> {
        if succeeded {
            return Err(StoreError::Poisoned);
        }
        self.0.update_refresh_status(pipeline, error, succeeded)
    }
    fn get_last_refresh(&self, pipeline: &str) -> Result<Option<DateTime<Utc>>, StoreError> {
        self.0.get_last_refresh(pipeline)
    }
}

/// Always returns the same warning rows.
struct FixedWarnings(Vec<HazardWarning>);

#[async_trait]
impl WarningProvider for FixedWarnings {
    async fn fetch_warnings(&self, _ctx: &IngestionContext) -> Result<Vec<HazardWarning>, IngestError> {
        Ok(self.0.clone())
    }
    fn name(&self) -> &'static str {
        "fixed"
    }
}

/// Synthetic data after a short delay, tracking how many fetches overlap.
struct SlowProvider {
    in_flight: AtomicUsize,
    max_seen: AtomicUsize,
}

#[async_trait]
impl WarningProvider for SlowProvider {
    async fn fetch_warnings(&self, ctx: &IngestionContext) -> Result<Vec<HazardWarning>, IngestError> {
        let now = self.in_flight.fetch_add(1, Ordering::SeqCst) + 1;
        self.max_seen.fetch_max(now, Ordering::SeqCst);
        tokio::time::sleep(Duration::from_millis(50)).await;
        self.in_flight.fetch_sub(1, Ordering::SeqCst);
        Ok(SyntheticProvider::warnings_at(ctx, Utc::now()))
    }
    fn name(&self) -> &'static str {
        "slow"
    }
}

fn fixed_now() -> DateTime<Utc> {
    Utc.with_ymd_and_hms(2024, 6, 1, 2, 0, 0).unwrap()
}

fn ctx() -> IngestionContext {
    IngestionContext::new(39.90421234, 116.40741234, "北京", "北京")
}

fn settings(fallback: bool) -> Arc<Settings> {
    let mut s = Settings::default();
    s.fallback_on_failure = fallback;
    Arc::new(s)
}

fn service(
    fallback: bool,
    store: Arc<dyn SnapshotStore>,
    warnings: Arc<dyn WarningProvider>,
    forecast: Arc<dyn ForecastProvider>,
) -> IngestionService {
    IngestionService::with_providers(settings(fallback), store, warnings, forecast)
        .with_fallback(SyntheticProvider::at(fixed_now()))
}

fn sorted_titles(rows: &[HazardWarning]) -> Vec<String> {
    let mut t: Vec<String> = rows.iter().map(|w| w.title.clone()).collect();
    t.sort();
    t
}

#[tokio::test]
async fn synthetic_cycle_writes_full_snapshot() {
    let store = Arc::new(SqliteStore::open_in_memory().unwrap());
    let synthetic = Arc::new(SyntheticProvider::at(fixed_now()));
    let svc = service(true, store.clone(), synthetic.clone(), synthetic);

    let report = svc.refresh(&ctx()).await.unwrap();
    assert_eq!(report.warnings_written, 11);
    assert_eq!(report.forecast_points_written, 56);
    assert!(!report.degraded());
    assert!(report.finished_at >= report.started_at);

    assert_eq!(store.list_warnings(None).unwrap().len(), 11);
    assert_eq!(store.list_forecast(39.9042, 116.4074).unwrap().len(), 56);
    let status = store.get_refresh_status(PIPELINE_INGESTION).unwrap().unwrap();
    assert!(status.last_error.is_none());
    assert!(status.last_success_at.is_some());
}

#[tokio::test]
async fn failed_warning_feed_is_replaced_by_synthetic_output() {
    let store = Arc::new(SqliteStore::open_in_memory().unwrap());
    let forecast = Arc::new(SyntheticProvider::at(fixed_now()));
    let svc = service(true, store.clone(), Arc::new(FailingProvider(refused)), forecast);

    let report = svc.refresh(&ctx()).await.unwrap();
    assert_eq!(report.fallback_notes.len(), 1);
    let note = &report.fallback_notes[0];
    assert_eq!(note.feed, Feed::Warning);
    assert_eq!(note.kind, ErrorKind::Transport);

    let expected = SyntheticProvider::warnings_at(&ctx(), fixed_now());
    assert_eq!(
        sorted_titles(&store.list_warnings(None).unwrap()),
        sorted_titles(&expected)
    );

    let status = store.get_refresh_status(PIPELINE_INGESTION).unwrap().unwrap();
    let err = status.last_error.unwrap();
    assert!(err.starts_with("warning provider failed: "), "{err}");
    assert!(err.contains("connection refused"));
    // degraded success still counts as a refresh
    assert!(status.last_success_at.is_some());
}

#[tokio::test]
async fn both_feeds_fall_back_with_joined_notes() {
    let store = Arc::new(SqliteStore::open_in_memory().unwrap());
    let failing = Arc::new(FailingProvider(|| IngestError::config("key missing")));
    let svc = service(true, store.clone(), failing.clone(), failing);

    let report = svc.refresh(&ctx()).await.unwrap();
    assert_eq!(report.forecast_points_written, 56);
    let status = store.get_refresh_status(PIPELINE_INGESTION).unwrap().unwrap();
    assert_eq!(
        status.last_error.as_deref(),
        Some(
            "warning provider failed: configuration error: key missing; \
             forecast provider failed: configuration error: key missing"
        )
    );
}

#[tokio::test]
async fn without_fallback_a_failure_keeps_previous_snapshot() {
    let store = Arc::new(SqliteStore::open_in_memory().unwrap());
    let synthetic = Arc::new(SyntheticProvider::at(fixed_now()));
    let good = service(false, store.clone(), synthetic.clone(), synthetic.clone());
    good.refresh(&ctx()).await.unwrap();
    let before = sorted_titles(&store.list_warnings(None).unwrap());
    let last_ok = store.get_last_refresh(PIPELINE_INGESTION).unwrap();

    let bad = service(false, store.clone(), Arc::new(FailingProvider(refused)), synthetic);
    let err = bad.refresh(&ctx()).await.unwrap_err();
    match &err {
        CycleError::Feed { feed, source } => {
            assert_eq!(*feed, Feed::Warning);
            assert_eq!(source.kind(), ErrorKind::Transport);
        }
        other => panic!("unexpected error: {other}"),
    }

    assert_eq!(sorted_titles(&store.list_warnings(None).unwrap()), before);
    assert_eq!(store.list_forecast(39.9042, 116.4074).unwrap().len(), 56);
    let status = store.get_refresh_status(PIPELINE_INGESTION).unwrap().unwrap();
    assert_eq!(status.last_error, Some(err.to_string()));
    assert_eq!(status.last_success_at, last_ok);
}

#[tokio::test]
async fn without_fallback_warning_failure_wins_when_both_fail() {
    let store = Arc::new(SqliteStore::open_in_memory().unwrap());
    let svc = service(
        false,
        store.clone(),
        Arc::new(FailingProvider(refused)),
        Arc::new(FailingProvider(|| IngestError::malformed("payload", "bad"))),
    );
    match svc.refresh(&ctx()).await {
        Err(CycleError::Feed { feed, .. }) => assert_eq!(feed, Feed::Warning),
        other => panic!("expected feed error, got {other:?}"),
    }
    assert!(store.get_last_refresh(PIPELINE_INGESTION).unwrap().is_none());
    assert!(store.list_warnings(None).unwrap().is_empty());
}

#[tokio::test]
async fn persistence_failure_is_fatal_and_recorded() {
    let inner = Arc::new(SqliteStore::open_in_memory().unwrap());
    let synthetic = Arc::new(SyntheticProvider::at(fixed_now()));
    service(true, inner.clone(), synthetic.clone(), synthetic.clone())
        .refresh(&ctx())
        .await
        .unwrap();
    let old_forecast = inner.list_forecast(39.9042, 116.4074).unwrap();
    let last_ok = inner.get_last_refresh(PIPELINE_INGESTION).unwrap();
    assert_eq!(old_forecast.len(), 56);
    assert!(last_ok.is_some());

    let mut fresh = SyntheticProvider::warnings_at(&ctx(), fixed_now());
    fresh.truncate(1);
    fresh[0].title = "暴雨红色预警".into();
    let store = Arc::new(BrokenForecastStore(inner.clone()));
    let svc = service(true, store, Arc::new(FixedWarnings(fresh)), synthetic);

    let err = svc.refresh(&ctx()).await.unwrap_err();
    assert!(matches!(err, CycleError::Persistence(StoreError::Poisoned)));

    // warnings were replaced in their own transaction; forecast was not
    assert_eq!(
        sorted_titles(&inner.list_warnings(None).unwrap()),
        vec!["暴雨红色预警".to_string()]
    );
    assert_eq!(inner.list_forecast(39.9042, 116.4074).unwrap(), old_forecast);

    let status = inner.get_refresh_status(PIPELINE_INGESTION).unwrap().unwrap();
    assert_eq!(status.last_success_at, last_ok);
    assert_eq!(status.last_error, Some(StoreError::Poisoned.to_string()));
}

#[tokio::test]
async fn status_update_failure_is_fatal_and_recorded() {
    let inner = Arc::new(SqliteStore::open_in_memory().unwrap());
    let store = Arc::new(BrokenStatusStore(inner.clone()));
    let synthetic = Arc::new(SyntheticProvider::at(fixed_now()));
    let svc = service(true, store, synthetic.clone(), synthetic);

    let err = svc.refresh(&ctx()).await.unwrap_err();
    assert!(matches!(err, CycleError::Persistence(StoreError::Poisoned)));

    // snapshot landed, but the cycle is recorded as failed
    assert_eq!(inner.list_warnings(None).unwrap().len(), 11);
    let status = inner.get_refresh_status(PIPELINE_INGESTION).unwrap().unwrap();
    assert!(status.last_success_at.is_none());
    assert_eq!(status.last_error, Some(StoreError::Poisoned.to_string()));
}

#[tokio::test]
async fn unreachable_bulletin_source_falls_back() {
    let store = Arc::new(SqliteStore::open_in_memory().unwrap());
    let mut s = Settings::default();
    s.warning_provider = "bulletin".into();
    s.bulletin_source_urls = "http://127.0.0.1:9/bulletin.html".into();
    s.http_timeout_seconds = 2;
    let svc = IngestionService::new(Arc::new(s), store.clone()).unwrap();

    let report = svc.refresh(&ctx()).await.unwrap();
    assert_eq!(report.fallback_notes.len(), 1);
    assert_eq!(report.fallback_notes[0].feed, Feed::Warning);
    assert_eq!(report.fallback_notes[0].kind, ErrorKind::Transport);
    assert_eq!(report.warnings_written, 11);
}

#[tokio::test]
async fn qweather_without_key_falls_back_for_both_feeds() {
    let store = Arc::new(SqliteStore::open_in_memory().unwrap());
    let mut s = Settings::default();
    s.warning_provider = "qweather".into();
    s.forecast_provider = "qweather".into();
    s.qweather_api_key = None;
    let svc = IngestionService::new(Arc::new(s), store.clone()).unwrap();

    let report = svc.refresh_default().await.unwrap();
    let kinds: Vec<_> = report.fallback_notes.iter().map(|n| (n.feed, n.kind)).collect();
    assert_eq!(
        kinds,
        vec![(Feed::Warning, ErrorKind::Config), (Feed::Forecast, ErrorKind::Config)]
    );
}

#[tokio::test]
async fn overlapping_cycles_run_one_at_a_time() {
    let store = Arc::new(SqliteStore::open_in_memory().unwrap());
    let slow = Arc::new(SlowProvider {
        in_flight: AtomicUsize::new(0),
        max_seen: AtomicUsize::new(0),
    });
    let svc = service(
        true,
        store,
        slow.clone(),
        Arc::new(SyntheticProvider::at(fixed_now())),
    );

    let c = ctx();
    let (a, b) = tokio::join!(svc.refresh(&c), svc.refresh(&c));
    a.unwrap();
    b.unwrap();
    assert_eq!(slow.max_seen.load(Ordering::SeqCst), 1);
}

#[tokio::test]
async fn last_refresh_is_stable_between_cycles() {
    let store = Arc::new(SqliteStore::open_in_memory().unwrap());
    let synthetic = Arc::new(SyntheticProvider::at(fixed_now()));
    let svc = service(true, store.clone(), synthetic.clone(), synthetic);
    let report = svc.refresh(&ctx()).await.unwrap();

    let a = store.get_last_refresh(PIPELINE_INGESTION).unwrap();
    let b = store.get_last_refresh(PIPELINE_INGESTION).unwrap();
    assert!(a.is_some_and(|t| t >= report.started_at));
    assert_eq!(a, b);
}
