// src/ingest/selector.rs
//! Configuration → concrete source clients, chosen once per capability.

use std::sync::Arc;

use crate::ai_adapter::DynAugmenter;
use crate::config::Settings;
use crate::ingest::providers::bulletin::AugmentPolicy;
use crate::ingest::providers::{BulletinProvider, OpenMeteoProvider, QWeatherProvider, SyntheticProvider};
use crate::ingest::types::{ForecastProvider, WarningProvider};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ProviderKind {
    Synthetic,
    Bulletin,
    OpenMeteo,
    QWeather,
}

impl ProviderKind {
    /// Case-insensitive; unknown values select `Synthetic`.
    pub fn parse(raw: &str) -> Self {
        match raw.trim().to_ascii_lowercase().as_str() {
            "bulletin" | "scrape" | "nmc" => ProviderKind::Bulletin,
            "openmeteo" | "open-meteo" | "rest-api-a" => ProviderKind::OpenMeteo,
            "qweather" | "rest-api-b" => ProviderKind::QWeather,
            "synthetic" | "mock" | "" => ProviderKind::Synthetic,
            other => {
                tracing::warn!(provider = other, "unknown provider; using synthetic");
                ProviderKind::Synthetic
            }
        }
    }
}

/// Warnings: bulletin scraper or QWeather; anything else is synthetic.
pub fn build_warning_provider(
    settings: &Settings,
    client: &reqwest::Client,
    augmenter: DynAugmenter,
) -> Arc<dyn WarningProvider> {
    match ProviderKind::parse(&settings.warning_provider) {
        ProviderKind::Bulletin => {
            let policy = AugmentPolicy {
                enabled: settings.ai.enabled_for_bulletin,
                confidence_threshold: settings.ai.confidence_threshold,
            };
            Arc::new(
                BulletinProvider::new(settings.bulletin_urls(), client.clone())
                    .with_augmenter(augmenter, policy),
            )
        }
        ProviderKind::QWeather => Arc::new(QWeatherProvider::new(
            settings.qweather_api_base.clone(),
            settings.qweather_api_key.clone(),
            client.clone(),
        )),
        ProviderKind::OpenMeteo => {
            tracing::warn!("open-meteo has no warning feed; using synthetic warnings");
            Arc::new(SyntheticProvider::new())
        }
        ProviderKind::Synthetic => Arc::new(SyntheticProvider::new()),
    }
}

/// Forecasts: Open-Meteo or QWeather; anything else is synthetic.
pub fn build_forecast_provider(
    settings: &Settings,
    client: &reqwest::Client,
) -> Arc<dyn ForecastProvider> {
    match ProviderKind::parse(&settings.forecast_provider) {
        ProviderKind::OpenMeteo => Arc::new(OpenMeteoProvider::new(
            settings.openmeteo_api_base.clone(),
            client.clone(),
        )),
        ProviderKind::QWeather => Arc::new(QWeatherProvider::new(
            settings.qweather_api_base.clone(),
            settings.qweather_api_key.clone(),
            client.clone(),
        )),
        ProviderKind::Bulletin => {
            tracing::warn!("bulletin scraper has no forecast feed; using synthetic forecast");
            Arc::new(SyntheticProvider::new())
        }
        ProviderKind::Synthetic => Arc::new(SyntheticProvider::new()),
    }
}
