// src/ingest/providers/qweather.rs
use async_trait::async_trait;
use chrono::{DateTime, Duration, FixedOffset, NaiveDate, TimeZone, Utc};
use metrics::counter;
use serde::Deserialize;
use serde_json::Value;

use crate::error::IngestError;
use crate::ingest::http::{endpoint, get_json};
use crate::ingest::types::{ForecastProvider, IngestionContext, WarningProvider};
use crate::model::{ForecastPoint, HazardWarning, SeverityLevel};

pub const SOURCE_QWEATHER: &str = "qweather";
const DEFAULT_TITLE: &str = "气象预警";
const DEFAULT_HAZARD: &str = "综合风险";
const DEFAULT_DETAIL_URL: &str = "https://dev.qweather.com";
const DEFAULT_VALIDITY_HOURS: i64 = 12;
const CHINA_OFFSET_SECS: i32 = 8 * 3600;
/// Samples per day: tempMax for the morning slots, tempMin for the evening ones.
const DAY_SLOTS: [i64; 4] = [0, 6, 12, 18];

#[derive(Debug, Deserialize)]
pub struct WarningPayload {
    #[serde(default)]
    pub code: Option<String>,
    #[serde(default, rename = "fxLink")]
    pub fx_link: Option<String>,
    #[serde(default)]
    pub warning: Vec<WarningItem>,
}

#[derive(Debug, Deserialize)]
pub struct WarningItem {
    #[serde(default)]
    pub title: Option<String>,
    #[serde(default, rename = "pubTime")]
    pub pub_time: Option<String>,
    #[serde(default, rename = "endTime")]
    pub end_time: Option<String>,
    #[serde(default, rename = "severityColor")]
    pub severity_color: Option<String>,
    #[serde(default, rename = "typeName")]
    pub type_name: Option<String>,
    #[serde(default)]
    pub text: Option<String>,
}

#[derive(Debug, Deserialize)]
pub struct DailyPayload {
    #[serde(default)]
    pub code: Option<String>,
    #[serde(default)]
    pub daily: Vec<DailyItem>,
}

#[derive(Debug, Deserialize)]
pub struct DailyItem {
    #[serde(default, rename = "fxDate")]
    pub fx_date: Option<String>,
    #[serde(default, rename = "tempMax")]
    pub temp_max: Value,
    #[serde(default, rename = "tempMin")]
    pub temp_min: Value,
    #[serde(default)]
    pub humidity: Value,
}

/// QWeather warnings + 7-day forecast. Needs an API key.
pub struct QWeatherProvider {
    api_base: String,
    api_key: Option<String>,
    client: reqwest::Client,
}

impl QWeatherProvider {
    pub fn new(api_base: impl Into<String>, api_key: Option<String>, client: reqwest::Client) -> Self {
        Self {
            api_base: api_base.into(),
            api_key,
            client,
        }
    }

    /// Fails before any network call when the key is absent.
    fn require_key(&self) -> Result<&str, IngestError> {
        self.api_key
            .as_deref()
            .filter(|k| !k.trim().is_empty())
            .ok_or_else(|| IngestError::config("QWeather API key is required but missing"))
    }

    fn query(ctx: &IngestionContext, key: &str) -> [(&'static str, String); 3] {
        [
            ("location", format!("{},{}", ctx.lon, ctx.lat)),
            ("lang", "zh".to_string()),
            ("key", key.to_string()),
        ]
    }
}

/// QWeather reports API errors in-band through `code`.
fn check_code(url: &str, code: Option<&str>) -> Result<(), IngestError> {
    match code {
        None | Some("200") => Ok(()),
        Some(other) => Err(IngestError::status(url, format!("api code {other}"))),
    }
}

fn parse_time(raw: Option<&str>) -> Option<DateTime<Utc>> {
    let raw = raw?.trim();
    let normalized = raw.replace('Z', "+00:00");
    DateTime::parse_from_rfc3339(&normalized)
        .or_else(|_| DateTime::parse_from_str(&normalized, "%Y-%m-%dT%H:%M%:z"))
        .ok()
        .map(|dt| dt.with_timezone(&Utc))
}

/// Numbers arrive as JSON strings ("24") or numbers; missing counts as 0.
fn lenient_f64(v: &Value, field: &str) -> Result<f64, IngestError> {
    let n = match v {
        Value::Null => return Ok(0.0),
        Value::Number(n) => n
            .as_f64()
            .ok_or_else(|| IngestError::malformed("qweather daily", format!("{field} out of range")))?,
        Value::String(s) => s.trim().parse::<f64>().map_err(|e| {
            IngestError::malformed("qweather daily", format!("{field}={s:?}: {e}"))
        })?,
        other => {
            return Err(IngestError::malformed(
                "qweather daily",
                format!("{field} has unexpected type: {other}"),
            ))
        }
    };
    // "NaN" and "inf" parse as f64 but cannot be stored
    if !n.is_finite() {
        return Err(IngestError::malformed("qweather daily", format!("{field} is not finite: {n}")));
    }
    Ok(n)
}

pub fn map_warnings(
    payload: WarningPayload,
    ctx: &IngestionContext,
    now: DateTime<Utc>,
) -> Vec<HazardWarning> {
    let detail_url = payload
        .fx_link
        .filter(|l| !l.trim().is_empty())
        .unwrap_or_else(|| DEFAULT_DETAIL_URL.to_string());
    payload
        .warning
        .into_iter()
        .map(|item| {
            let issued_at = parse_time(item.pub_time.as_deref()).unwrap_or(now);
            let expires_at = parse_time(item.end_time.as_deref())
                .unwrap_or(issued_at + Duration::hours(DEFAULT_VALIDITY_HOURS));
            HazardWarning {
                source: SOURCE_QWEATHER.to_string(),
                title: item.title.unwrap_or_else(|| DEFAULT_TITLE.to_string()),
                level: SeverityLevel::from_label(item.severity_color.as_deref().unwrap_or("")),
                hazard_kind: item
                    .type_name
                    .filter(|t| !t.trim().is_empty())
                    .unwrap_or_else(|| DEFAULT_HAZARD.to_string()),
                region: ctx.region.clone(),
                issued_at,
                expires_at: Some(expires_at),
                detail_url: detail_url.clone(),
                summary: item.text.unwrap_or_default(),
                confidence: 1.0,
            }
            .normalized()
        })
        .collect()
}

pub fn map_daily(
    payload: &DailyPayload,
    ctx: &IngestionContext,
) -> Result<Vec<ForecastPoint>, IngestError> {
    let offset = FixedOffset::east_opt(CHINA_OFFSET_SECS)
        .ok_or_else(|| IngestError::malformed("qweather daily", "bad offset"))?;
    let mut out = Vec::with_capacity(payload.daily.len() * DAY_SLOTS.len());
    for day in &payload.daily {
        let Some(date_text) = day.fx_date.as_deref().filter(|d| !d.trim().is_empty()) else {
            continue;
        };
        let date = NaiveDate::parse_from_str(date_text.trim(), "%Y-%m-%d").map_err(|e| {
            IngestError::malformed("qweather daily", format!("fxDate={date_text:?}: {e}"))
        })?;
        let midnight = date
            .and_hms_opt(0, 0, 0)
            .and_then(|n| offset.from_local_datetime(&n).single())
            .ok_or_else(|| IngestError::malformed("qweather daily", "invalid fxDate"))?;

        let temp_max = lenient_f64(&day.temp_max, "tempMax")?;
        let temp_min = lenient_f64(&day.temp_min, "tempMin")?;
        let humidity = lenient_f64(&day.humidity, "humidity")?;

        for hour in DAY_SLOTS {
            out.push(ForecastPoint::new(
                ctx.lat,
                ctx.lon,
                ctx.label.clone(),
                ctx.region.clone(),
                (midnight + Duration::hours(hour)).with_timezone(&Utc),
                if hour < 12 { temp_max } else { temp_min },
                humidity,
                SOURCE_QWEATHER,
            ));
        }
    }
    Ok(out)
}

#[async_trait]
impl WarningProvider for QWeatherProvider {
    async fn fetch_warnings(
        &self,
        ctx: &IngestionContext,
    ) -> Result<Vec<HazardWarning>, IngestError> {
        let key = self.require_key()?;
        let url = endpoint(&self.api_base, "warning/now");
        let payload: WarningPayload = get_json(&self.client, &url, &Self::query(ctx, key)).await?;
        check_code(&url, payload.code.as_deref())?;
        let rows = map_warnings(payload, ctx, Utc::now());
        counter!("ingest_events_total", "provider" => "qweather").increment(rows.len() as u64);
        Ok(rows)
    }

    fn name(&self) -> &'static str {
        "qweather"
    }
}

#[async_trait]
impl ForecastProvider for QWeatherProvider {
    async fn fetch_forecast(
        &self,
        ctx: &IngestionContext,
    ) -> Result<Vec<ForecastPoint>, IngestError> {
        let key = self.require_key()?;
        let url = endpoint(&self.api_base, "weather/7d");
        let payload: DailyPayload = get_json(&self.client, &url, &Self::query(ctx, key)).await?;
        check_code(&url, payload.code.as_deref())?;
        let rows = map_daily(&payload, ctx)?;
        counter!("ingest_events_total", "provider" => "qweather").increment(rows.len() as u64);
        Ok(rows)
    }

    fn name(&self) -> &'static str {
        "qweather"
    }
}
