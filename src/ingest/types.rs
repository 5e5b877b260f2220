// src/ingest/types.rs
use crate::error::IngestError;
use crate::model::{ForecastPoint, HazardWarning};

/// Point of interest for one refresh cycle.
#[derive(Debug, Clone, PartialEq)]
pub struct IngestionContext {
    pub lat: f64,
    pub lon: f64,
    pub region: String, // e.g. "北京"
    pub label: String,  // display label for the location
}

impl IngestionContext {
    pub fn new(lat: f64, lon: f64, region: impl Into<String>, label: impl Into<String>) -> Self {
        Self {
            lat,
            lon,
            region: region.into(),
            label: label.into(),
        }
    }
}

#[async_trait::async_trait]
pub trait WarningProvider: Send + Sync {
    async fn fetch_warnings(&self, ctx: &IngestionContext)
        -> Result<Vec<HazardWarning>, IngestError>;
    fn name(&self) -> &'static str;
}

#[async_trait::async_trait]
pub trait ForecastProvider: Send + Sync {
    async fn fetch_forecast(&self, ctx: &IngestionContext)
        -> Result<Vec<ForecastPoint>, IngestError>;
    fn name(&self) -> &'static str;
}
