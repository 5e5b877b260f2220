// src/ingest/providers/open_meteo.rs
use async_trait::async_trait;
use chrono::{DateTime, FixedOffset, NaiveDateTime, TimeZone, Utc};
use metrics::counter;
use serde::Deserialize;

use crate::error::IngestError;
use crate::ingest::http::{endpoint, get_json};
use crate::ingest::types::{ForecastProvider, IngestionContext};
use crate::model::ForecastPoint;

pub const SOURCE_OPEN_METEO: &str = "open-meteo";
const TIMEZONE: &str = "Asia/Shanghai";
const SHANGHAI_OFFSET_SECS: i32 = 8 * 3600;
const FORECAST_DAYS: u32 = 7;
const STEP: usize = 3;

#[derive(Debug, Deserialize)]
pub struct ForecastPayload {
    #[serde(default)]
    pub utc_offset_seconds: Option<i32>,
    #[serde(default)]
    pub hourly: Hourly,
}

#[derive(Debug, Default, Deserialize)]
pub struct Hourly {
    #[serde(default)]
    pub time: Vec<String>,
    #[serde(default)]
    pub temperature_2m: Vec<Option<f64>>,
    #[serde(default)]
    pub relative_humidity_2m: Vec<Option<f64>>,
}

pub struct OpenMeteoProvider {
    api_base: String,
    client: reqwest::Client,
}

impl OpenMeteoProvider {
    pub fn new(api_base: impl Into<String>, client: reqwest::Client) -> Self {
        Self {
            api_base: api_base.into(),
            client,
        }
    }
}

/// Keep every third hourly sample; stop at the end of the shorter metric array.
pub fn map_forecast(
    payload: &ForecastPayload,
    ctx: &IngestionContext,
) -> Result<Vec<ForecastPoint>, IngestError> {
    let offset_secs = payload.utc_offset_seconds.unwrap_or(SHANGHAI_OFFSET_SECS);
    let offset = FixedOffset::east_opt(offset_secs)
        .ok_or_else(|| IngestError::malformed("open-meteo payload", "utc_offset_seconds out of range"))?;
    let hourly = &payload.hourly;

    let mut out = Vec::with_capacity(hourly.time.len() / STEP + 1);
    for (idx, raw_time) in hourly.time.iter().enumerate().step_by(STEP) {
        let (Some(temp), Some(hum)) = (
            hourly.temperature_2m.get(idx),
            hourly.relative_humidity_2m.get(idx),
        ) else {
            break;
        };
        let temperature = temp.filter(|t| t.is_finite()).ok_or_else(|| {
            IngestError::malformed("open-meteo payload", format!("missing temperature at index {idx}"))
        })?;
        let humidity = hum.filter(|h| h.is_finite()).ok_or_else(|| {
            IngestError::malformed("open-meteo payload", format!("missing humidity at index {idx}"))
        })?;
        out.push(ForecastPoint::new(
            ctx.lat,
            ctx.lon,
            ctx.label.clone(),
            ctx.region.clone(),
            parse_local_time(raw_time, offset)?,
            temperature,
            humidity,
            SOURCE_OPEN_METEO,
        ));
    }
    Ok(out)
}

/// Accepts RFC 3339 or offset-less local times ("2024-06-01T00:00").
fn parse_local_time(raw: &str, offset: FixedOffset) -> Result<DateTime<Utc>, IngestError> {
    if let Ok(dt) = DateTime::parse_from_rfc3339(raw) {
        return Ok(dt.with_timezone(&Utc));
    }
    let naive = NaiveDateTime::parse_from_str(raw, "%Y-%m-%dT%H:%M")
        .or_else(|_| NaiveDateTime::parse_from_str(raw, "%Y-%m-%dT%H:%M:%S"))
        .map_err(|e| IngestError::malformed("open-meteo time", format!("{raw:?}: {e}")))?;
    offset
        .from_local_datetime(&naive)
        .single()
        .map(|dt| dt.with_timezone(&Utc))
        .ok_or_else(|| IngestError::malformed("open-meteo time", format!("{raw:?} is ambiguous")))
}

#[async_trait]
impl ForecastProvider for OpenMeteoProvider {
    async fn fetch_forecast(
        &self,
        ctx: &IngestionContext,
    ) -> Result<Vec<ForecastPoint>, IngestError> {
        let url = endpoint(&self.api_base, "forecast");
        let query = [
            ("latitude", ctx.lat.to_string()),
            ("longitude", ctx.lon.to_string()),
            (
                "hourly",
                "temperature_2m,relative_humidity_2m".to_string(),
            ),
            ("forecast_days", FORECAST_DAYS.to_string()),
            ("timezone", TIMEZONE.to_string()),
        ];
        let payload: ForecastPayload = get_json(&self.client, &url, &query).await?;
        let points = map_forecast(&payload, ctx)?;
        counter!("ingest_events_total", "provider" => "open-meteo").increment(points.len() as u64);
        Ok(points)
    }

    fn name(&self) -> &'static str {
        "open-meteo"
    }
}
