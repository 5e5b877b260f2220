// src/config/mod.rs
//! Process-wide settings: built once at startup and shared as `Arc<Settings>`.

pub mod ai;

use anyhow::{anyhow, Context, Result};
use serde::{Deserialize, Serialize};
use std::fs;
use std::path::{Path, PathBuf};

pub use ai::AiSettings;

pub const ENV_CONFIG_PATH: &str = "HAZARD_INGEST_CONFIG";
pub const DEFAULT_CONFIG_PATH: &str = "config/ingest.toml";

const DEFAULT_BULLETIN_URLS: &str = "https://www.nmc.cn/publish/weatherperday/index.htm,\
https://www.nmc.cn/publish/country/warning/dust.html,\
https://www.nmc.cn/publish/weather-bulletin/index.htm";

/// Point of interest used by the startup/scheduled refresh.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(default)]
pub struct DefaultLocation {
    pub lat: f64,
    pub lon: f64,
    pub region: String,
    pub label: String,
}

impl Default for DefaultLocation {
    fn default() -> Self {
        Self {
            lat: 39.9042,
            lon: 116.4074,
            region: "北京".to_string(),
            label: "北京".to_string(),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(default)]
pub struct Settings {
    pub database_path: PathBuf,
    pub refresh_interval_minutes: u64,
    pub http_timeout_seconds: u64,

    /// synthetic | bulletin | qweather (aliases accepted, see `ProviderKind::parse`)
    pub warning_provider: String,
    /// synthetic | openmeteo | qweather
    pub forecast_provider: String,
    pub fallback_on_failure: bool,

    /// Comma-separated bulletin page URLs.
    pub bulletin_source_urls: String,

    pub qweather_api_base: String,
    pub qweather_api_key: Option<String>,
    pub openmeteo_api_base: String,

    pub ai: AiSettings,
    pub default_location: DefaultLocation,

    /// Optional Prometheus listener, e.g. "0.0.0.0:9000".
    pub metrics_addr: Option<String>,
}

impl Default for Settings {
    fn default() -> Self {
        Self {
            database_path: PathBuf::from("weather.db"),
            refresh_interval_minutes: 30,
            http_timeout_seconds: 20,
            warning_provider: "synthetic".to_string(),
            forecast_provider: "synthetic".to_string(),
            fallback_on_failure: true,
            bulletin_source_urls: DEFAULT_BULLETIN_URLS.to_string(),
            qweather_api_base: "https://devapi.qweather.com/v7".to_string(),
            qweather_api_key: None,
            openmeteo_api_base: "https://api.open-meteo.com/v1".to_string(),
            ai: AiSettings::default(),
            default_location: DefaultLocation::default(),
            metrics_addr: None,
        }
    }
}

impl Settings {
    /// Load settings:
    /// 1) TOML from $HAZARD_INGEST_CONFIG (must exist if set)
    /// 2) else config/ingest.toml if present
    /// 3) else defaults
    ///
    /// then apply environment overrides.
    pub fn load() -> Result<Self> {
        let mut settings = if let Ok(p) = std::env::var(ENV_CONFIG_PATH) {
            let pb = PathBuf::from(p);
            if !pb.exists() {
                return Err(anyhow!(
                    "{ENV_CONFIG_PATH} points to non-existent path {}",
                    pb.display()
                ));
            }
            Self::load_from_file(&pb)?
        } else {
            let default_path = PathBuf::from(DEFAULT_CONFIG_PATH);
            if default_path.exists() {
                Self::load_from_file(&default_path)?
            } else {
                Self::default()
            }
        };
        settings.apply_env(|k| std::env::var(k).ok())?;
        Ok(settings)
    }

    pub fn load_from_file(path: &Path) -> Result<Self> {
        let content = fs::read_to_string(path)
            .with_context(|| format!("reading settings from {}", path.display()))?;
        Self::from_toml_str(&content).with_context(|| format!("parsing {}", path.display()))
    }

    pub fn from_toml_str(s: &str) -> Result<Self> {
        let mut settings: Settings = toml::from_str(s)?;
        settings.sanitize();
        Ok(settings)
    }

    /// Override fields from an environment-like lookup. Unparsable values are errors.
    pub fn apply_env<F>(&mut self, lookup: F) -> Result<()>
    where
        F: Fn(&str) -> Option<String>,
    {
        let get = |key: &str| lookup(key).filter(|v| !v.trim().is_empty());

        if let Some(v) = get("DATABASE_PATH") {
            self.database_path = PathBuf::from(v.trim());
        }
        if let Some(v) = get("REFRESH_INTERVAL_MINUTES") {
            self.refresh_interval_minutes = parse_num("REFRESH_INTERVAL_MINUTES", &v)?;
        }
        if let Some(v) = get("HTTP_TIMEOUT_SECONDS") {
            self.http_timeout_seconds = parse_num("HTTP_TIMEOUT_SECONDS", &v)?;
        }
        if let Some(v) = get("WARNING_PROVIDER") {
            self.warning_provider = v.trim().to_string();
        }
        if let Some(v) = get("FORECAST_PROVIDER") {
            self.forecast_provider = v.trim().to_string();
        }
        if let Some(v) = get("FALLBACK_ON_FAILURE") {
            self.fallback_on_failure = parse_bool("FALLBACK_ON_FAILURE", &v)?;
        }
        if let Some(v) = get("BULLETIN_SOURCE_URLS") {
            self.bulletin_source_urls = v;
        }
        if let Some(v) = get("QWEATHER_API_BASE") {
            self.qweather_api_base = v.trim().to_string();
        }
        if let Some(v) = get("QWEATHER_API_KEY") {
            self.qweather_api_key = Some(v.trim().to_string());
        }
        if let Some(v) = get("OPENMETEO_API_BASE") {
            self.openmeteo_api_base = v.trim().to_string();
        }
        if let Some(v) = get("AI_PROVIDER") {
            self.ai.provider = v;
        }
        if let Some(v) = get("AI_ENABLED_FOR_BULLETIN") {
            self.ai.enabled_for_bulletin = parse_bool("AI_ENABLED_FOR_BULLETIN", &v)?;
        }
        if let Some(v) = get("AI_CONFIDENCE_THRESHOLD") {
            self.ai.confidence_threshold = parse_num("AI_CONFIDENCE_THRESHOLD", &v)?;
        }
        if let Some(v) = get("OPENAI_API_BASE") {
            self.ai.api_base = v.trim().to_string();
        }
        if let Some(v) = get("OPENAI_API_KEY") {
            self.ai.api_key = Some(v.trim().to_string());
        }
        if let Some(v) = get("OPENAI_MODEL") {
            self.ai.model = v.trim().to_string();
        }
        if let Some(v) = get("DEFAULT_LAT") {
            self.default_location.lat = parse_num("DEFAULT_LAT", &v)?;
        }
        if let Some(v) = get("DEFAULT_LON") {
            self.default_location.lon = parse_num("DEFAULT_LON", &v)?;
        }
        if let Some(v) = get("DEFAULT_REGION") {
            self.default_location.region = v.trim().to_string();
        }
        if let Some(v) = get("DEFAULT_LABEL") {
            self.default_location.label = v.trim().to_string();
        }
        if let Some(v) = get("METRICS_ADDR") {
            self.metrics_addr = Some(v.trim().to_string());
        }

        self.sanitize();
        Ok(())
    }

    /// Bulletin URLs split on commas, trimmed, blanks dropped.
    pub fn bulletin_urls(&self) -> Vec<String> {
        self.bulletin_source_urls
            .split(',')
            .map(str::trim)
            .filter(|s| !s.is_empty())
            .map(str::to_string)
            .collect()
    }

    fn sanitize(&mut self) {
        self.ai.sanitize();
        if self
            .qweather_api_key
            .as_deref()
            .is_some_and(|k| k.trim().is_empty())
        {
            self.qweather_api_key = None;
        }
        if self.http_timeout_seconds == 0 {
            self.http_timeout_seconds = 20;
        }
        if self.refresh_interval_minutes == 0 {
            self.refresh_interval_minutes = 30;
        }
    }
}

fn parse_num<T>(key: &str, raw: &str) -> Result<T>
where
    T: std::str::FromStr,
    T::Err: std::fmt::Display,
{
    raw.trim()
        .parse::<T>()
        .map_err(|e| anyhow!("invalid value for {key}: {raw:?} ({e})"))
}

fn parse_bool(key: &str, raw: &str) -> Result<bool> {
    match raw.trim().to_ascii_lowercase().as_str() {
        "1" | "true" | "yes" | "on" => Ok(true),
        "0" | "false" | "no" | "off" => Ok(false),
        _ => Err(anyhow!("invalid boolean for {key}: {raw:?}")),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashMap;

    #[test]
    fn bulletin_urls_are_trimmed_and_blank_free() {
        let s = Settings {
            bulletin_source_urls: " https://a.test/x , ,https://b.test/y,".into(),
            ..Default::default()
        };
        assert_eq!(
            s.bulletin_urls(),
            vec!["https://a.test/x".to_string(), "https://b.test/y".to_string()]
        );
        assert_eq!(Settings::default().bulletin_urls().len(), 3);
    }

    #[test]
    fn env_overrides_and_bool_parsing() {
        let env: HashMap<&str, &str> = [
            ("WARNING_PROVIDER", "bulletin"),
            ("FALLBACK_ON_FAILURE", "off"),
            ("HTTP_TIMEOUT_SECONDS", "5"),
            ("OPENAI_API_KEY", "sk-x"),
            ("AI_PROVIDER", "OpenAI"),
            ("QWEATHER_API_KEY", ""),
        ]
        .into_iter()
        .collect();
        let mut s = Settings::default();
        s.apply_env(|k| env.get(k).map(|v| v.to_string())).unwrap();
        assert_eq!(s.warning_provider, "bulletin");
        assert!(!s.fallback_on_failure);
        assert_eq!(s.http_timeout_seconds, 5);
        assert!(s.ai.is_active());
        assert_eq!(s.qweather_api_key, None);
    }

    #[test]
    fn bad_numbers_name_the_key() {
        let mut s = Settings::default();
        let err = s
            .apply_env(|k| (k == "DEFAULT_LAT").then(|| "north".to_string()))
            .unwrap_err();
        assert!(err.to_string().contains("DEFAULT_LAT"));
    }
}
