// src/model.rs
//! Common schema every source client normalizes into.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// Coordinates are compared after rounding to this many decimal places.
pub const COORD_DECIMALS: i32 = 4;
const COORD_SCALE: f64 = 10_000.0;

/// Round a latitude/longitude to the precision used for location matching.
pub fn round_coord(v: f64) -> f64 {
    (v * COORD_SCALE).round() / COORD_SCALE
}

/// Integer form of a rounded coordinate; the store matches on this.
pub fn coord_key(v: f64) -> i64 {
    (v * COORD_SCALE).round() as i64
}

pub fn coord_from_key(k: i64) -> f64 {
    k as f64 / COORD_SCALE
}

/// Warning color vocabulary.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum SeverityLevel {
    Red,
    Orange,
    Yellow,
    Blue,
    Unknown,
}

impl SeverityLevel {
    /// Lenient parse: Chinese color labels or English names, anything else is `Unknown`.
    pub fn from_label(raw: &str) -> Self {
        let t = raw.trim();
        match t {
            "红色" | "红" => return SeverityLevel::Red,
            "橙色" | "橙" => return SeverityLevel::Orange,
            "黄色" | "黄" => return SeverityLevel::Yellow,
            "蓝色" | "蓝" => return SeverityLevel::Blue,
            _ => {}
        }
        match t.to_ascii_lowercase().as_str() {
            "red" => SeverityLevel::Red,
            "orange" => SeverityLevel::Orange,
            "yellow" => SeverityLevel::Yellow,
            "blue" => SeverityLevel::Blue,
            _ => SeverityLevel::Unknown,
        }
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            SeverityLevel::Red => "red",
            SeverityLevel::Orange => "orange",
            SeverityLevel::Yellow => "yellow",
            SeverityLevel::Blue => "blue",
            SeverityLevel::Unknown => "unknown",
        }
    }
}

/// One hazard advisory, detected or synthesized.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct HazardWarning {
    pub source: String,
    pub title: String,
    pub level: SeverityLevel,
    pub hazard_kind: String,
    pub region: String,
    pub issued_at: DateTime<Utc>,
    pub expires_at: Option<DateTime<Utc>>,
    pub detail_url: String,
    pub summary: String,
    pub confidence: f64,
}

impl HazardWarning {
    /// Clamp confidence into [0,1] and keep `expires_at` from preceding `issued_at`.
    pub fn normalized(mut self) -> Self {
        self.confidence = clamp_confidence(self.confidence);
        if let Some(exp) = self.expires_at {
            if exp < self.issued_at {
                self.expires_at = Some(self.issued_at);
            }
        }
        self
    }
}

/// Non-finite values map to 0.0.
pub fn clamp_confidence(v: f64) -> f64 {
    if v.is_finite() {
        v.clamp(0.0, 1.0)
    } else {
        0.0
    }
}

/// One forecast sample for a location.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ForecastPoint {
    pub lat: f64,
    pub lon: f64,
    pub location_label: String,
    pub region: String,
    pub forecast_at: DateTime<Utc>,
    pub temperature_c: f64,
    pub humidity_pct: f64,
    pub source: String,
}

impl ForecastPoint {
    /// Build a point with coordinates already rounded for matching.
    #[allow(clippy::too_many_arguments)]
    pub fn new(
        lat: f64,
        lon: f64,
        location_label: impl Into<String>,
        region: impl Into<String>,
        forecast_at: DateTime<Utc>,
        temperature_c: f64,
        humidity_pct: f64,
        source: impl Into<String>,
    ) -> Self {
        Self {
            lat: round_coord(lat),
            lon: round_coord(lon),
            location_label: location_label.into(),
            region: region.into(),
            forecast_at,
            temperature_c,
            humidity_pct,
            source: source.into(),
        }
    }
}

/// Bookkeeping row for one named pipeline.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RefreshStatus {
    pub pipeline: String,
    pub last_success_at: Option<DateTime<Utc>>,
    pub last_error: Option<String>,
    pub updated_at: DateTime<Utc>,
}
