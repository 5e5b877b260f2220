// src/ingest/providers/bulletin.rs
use async_trait::async_trait;
use chrono::{DateTime, Duration, Utc};
use metrics::{counter, histogram};

use crate::ai_adapter::{DisabledAugmenter, DynAugmenter};
use crate::error::IngestError;
use crate::ingest::extract::extract_bulletin;
use crate::ingest::http::get_text;
use crate::ingest::types::{IngestionContext, WarningProvider};
use crate::model::HazardWarning;

pub const SOURCE_BULLETIN: &str = "bulletin";
pub const AUGMENTED_SUFFIX: &str = "+ai";
pub const DEFAULT_CONFIDENCE: f64 = 0.75;
const VALIDITY_HOURS: i64 = 12;

/// How the scraper treats AI results.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct AugmentPolicy {
    pub enabled: bool,
    pub confidence_threshold: f64,
}

impl Default for AugmentPolicy {
    fn default() -> Self {
        Self {
            enabled: false,
            confidence_threshold: 1.0,
        }
    }
}

/// Scrapes configured bulletin pages and fans each page out into one warning per region.
pub struct BulletinProvider {
    urls: Vec<String>,
    client: reqwest::Client,
    augmenter: DynAugmenter,
    policy: AugmentPolicy,
}

impl BulletinProvider {
    pub fn new(urls: Vec<String>, client: reqwest::Client) -> Self {
        Self {
            urls,
            client,
            augmenter: std::sync::Arc::new(DisabledAugmenter),
            policy: AugmentPolicy::default(),
        }
    }

    pub fn with_augmenter(mut self, augmenter: DynAugmenter, policy: AugmentPolicy) -> Self {
        self.augmenter = augmenter;
        self.policy = policy;
        self
    }

    /// Turn one fetched page into warnings. Augmenter errors propagate.
    pub async fn warnings_from_page(
        &self,
        ctx: &IngestionContext,
        source_url: &str,
        body: &str,
        now: DateTime<Utc>,
    ) -> Result<Vec<HazardWarning>, IngestError> {
        let t0 = std::time::Instant::now();
        let extract = extract_bulletin(body, &ctx.region);

        let mut level = extract.level;
        let mut hazard_kind = extract.hazard_kind;
        let mut summary = extract.summary;
        let mut confidence = DEFAULT_CONFIDENCE;
        let mut source = SOURCE_BULLETIN.to_string();

        if self.policy.enabled {
            let result = self
                .augmenter
                .extract(source_url, &extract.title, &extract.plain_text)
                .await?;
            match result {
                Some(ai) if ai.confidence >= self.policy.confidence_threshold => {
                    summary = ai.summary;
                    level = ai.level;
                    hazard_kind = ai.hazard_kind;
                    confidence = ai.confidence;
                    source.push_str(AUGMENTED_SUFFIX);
                    counter!("ingest_ai_applied_total").increment(1);
                }
                Some(ai) => {
                    tracing::debug!(
                        source_url,
                        confidence = ai.confidence,
                        threshold = self.policy.confidence_threshold,
                        "AI result below threshold; keeping heuristics"
                    );
                }
                None => {}
            }
        }

        let out = extract
            .regions
            .into_iter()
            .map(|region| {
                HazardWarning {
                    source: source.clone(),
                    title: extract.title.clone(),
                    level,
                    hazard_kind: hazard_kind.clone(),
                    region,
                    issued_at: now,
                    expires_at: Some(now + Duration::hours(VALIDITY_HOURS)),
                    detail_url: source_url.to_string(),
                    summary: summary.clone(),
                    confidence,
                }
                .normalized()
            })
            .collect();

        histogram!("ingest_parse_ms").record(t0.elapsed().as_secs_f64() * 1_000.0);
        Ok(out)
    }
}

#[async_trait]
impl WarningProvider for BulletinProvider {
    async fn fetch_warnings(
        &self,
        ctx: &IngestionContext,
    ) -> Result<Vec<HazardWarning>, IngestError> {
        let now = Utc::now();
        let mut rows = Vec::new();
        for url in &self.urls {
            let body = get_text(&self.client, url).await?;
            let mut page = self.warnings_from_page(ctx, url, &body, now).await?;
            tracing::debug!(url = %url, warnings = page.len(), "bulletin page parsed");
            rows.append(&mut page);
        }
        counter!("ingest_events_total", "provider" => "bulletin").increment(rows.len() as u64);
        Ok(rows)
    }

    fn name(&self) -> &'static str {
        "bulletin"
    }
}
