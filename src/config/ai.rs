// src/config/ai.rs
use serde::{Deserialize, Serialize};

fn default_provider() -> String {
    "none".to_string()
}
fn default_enabled_for_bulletin() -> bool {
    true
}
fn default_confidence_threshold() -> f64 {
    0.65
}
fn default_api_base() -> String {
    "https://api.openai.com/v1".to_string()
}
fn default_model() -> String {
    "gpt-4.1-mini".to_string()
}

/// Settings for the chat-completion augmenter.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct AiSettings {
    /// "openai" enables augmentation; anything else (default "none") disables it.
    #[serde(default = "default_provider")]
    pub provider: String,
    /// Per-source switch for the bulletin scraper.
    #[serde(default = "default_enabled_for_bulletin")]
    pub enabled_for_bulletin: bool,
    /// Minimum self-reported confidence for a result to override the heuristics.
    #[serde(default = "default_confidence_threshold")]
    pub confidence_threshold: f64,
    #[serde(default = "default_api_base")]
    pub api_base: String,
    #[serde(default)]
    pub api_key: Option<String>,
    #[serde(default = "default_model")]
    pub model: String,
}

impl Default for AiSettings {
    fn default() -> Self {
        Self {
            provider: default_provider(),
            enabled_for_bulletin: default_enabled_for_bulletin(),
            confidence_threshold: default_confidence_threshold(),
            api_base: default_api_base(),
            api_key: None,
            model: default_model(),
        }
    }
}

impl AiSettings {
    /// Provider is OpenAI-compatible and a non-blank key is present.
    pub fn is_active(&self) -> bool {
        self.provider.trim().eq_ignore_ascii_case("openai")
            && self
                .api_key
                .as_deref()
                .is_some_and(|k| !k.trim().is_empty())
    }

    /// Keep the threshold inside [0,1]; out-of-range values fall back to the default.
    pub(crate) fn sanitize(&mut self) {
        self.provider = self.provider.trim().to_lowercase();
        if !self.confidence_threshold.is_finite() || !(0.0..=1.0).contains(&self.confidence_threshold)
        {
            self.confidence_threshold = default_confidence_threshold();
        }
        if self.api_key.as_deref().is_some_and(|k| k.trim().is_empty()) {
            self.api_key = None;
        }
    }
}
